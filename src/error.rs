use std::{io, result::Result as StdResult};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Protocol error: {0}")]
    Protocol(String),
    #[error("Unexpected end of stream on {0}")]
    UnexpectedEof(&'static str),
}

pub type Result<T> = StdResult<T, Error>;
