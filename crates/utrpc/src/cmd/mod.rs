use clap::{Args, Subcommand};

use crate::exit::CliResult;
use crate::output::OutputFormat;

pub mod demo;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a scripted client/server session over the in-memory hub.
    Demo(DemoArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Demo(args) => demo::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug)]
pub struct DemoArgs {
    /// Number of echo calls to make.
    #[arg(long, default_value = "3")]
    pub calls: u32,
    /// Disable the server's validation gate.
    #[arg(long)]
    pub skip_validation: bool,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}
