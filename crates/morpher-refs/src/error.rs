//! Error types for morpher-refs

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Refs advertisement is malformed")]
    Malformed,

    #[error("Protocol error: {0}")]
    Protocol(String),
}

pub type Result<T> = std::result::Result<T, Error>;
