use std::fmt;

use utrpc_client::ClientError;
use utrpc_server::ServerError;
use utrpc_wire::{CODE_PARSE_ERROR, CODE_TIMEOUT};

pub const SUCCESS: i32 = 0;
pub const FAILURE: i32 = 1;
pub const DATA_INVALID: i32 = 60;
#[allow(dead_code)]
pub const USAGE: i32 = 64;
pub const TIMEOUT: i32 = 124;
pub const INTERNAL: i32 = 125;

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug)]
pub struct CliError {
    pub code: i32,
    pub message: String,
}

impl CliError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

pub fn client_error(context: &str, err: ClientError) -> CliError {
    let code = match &err {
        ClientError::Timeout(_) => TIMEOUT,
        ClientError::Call(error) if error.code == CODE_PARSE_ERROR => DATA_INVALID,
        ClientError::Call(_) => FAILURE,
        ClientError::Wire(_) => DATA_INVALID,
        ClientError::Transport(_) => FAILURE,
    };
    CliError::new(code, format!("{context}: {err}"))
}

pub fn server_error(context: &str, err: ServerError) -> CliError {
    let code = match &err {
        ServerError::Call(error) if error.code == CODE_TIMEOUT => TIMEOUT,
        ServerError::Call(error) if error.code == CODE_PARSE_ERROR => DATA_INVALID,
        ServerError::Call(_) => FAILURE,
        ServerError::Wire(_) => DATA_INVALID,
        ServerError::Transport(_) => FAILURE,
    };
    CliError::new(code, format!("{context}: {err}"))
}
