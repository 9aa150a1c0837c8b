use std::io::IsTerminal;

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use serde_json::json;
use utrpc_wire::{action_name, Envelope};

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

/// Print one envelope with its traffic direction (`send` / `recv`).
pub fn print_envelope(direction: &str, envelope: &Envelope, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let out = json!({
                "direction": direction,
                "id": envelope.id,
                "method": envelope.method,
                "action": envelope.action,
                "error": envelope.error,
                "data": envelope.data,
            });
            println!("{out}");
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["DIR", "METHOD", "ACTION", "PAYLOAD"])
                .add_row(vec![
                    direction.to_string(),
                    envelope.method.clone(),
                    envelope
                        .action
                        .as_deref()
                        .map(action_label)
                        .unwrap_or_default(),
                    payload_preview(envelope),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!(
                "{direction} method={} action={} payload={}",
                envelope.method,
                envelope.action.as_deref().map(action_label).unwrap_or_default(),
                payload_preview(envelope)
            );
        }
    }
}

fn action_label(action: &str) -> String {
    match action_name(action) {
        "UNKNOWN" => action.to_string(),
        name => name.to_string(),
    }
}

fn payload_preview(envelope: &Envelope) -> String {
    match (&envelope.error, &envelope.data) {
        (Some(error), _) => format!("{error}"),
        (None, Some(data)) => data.to_string(),
        (None, None) => String::new(),
    }
}
