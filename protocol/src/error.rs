//! Protocol error types

use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("Invalid validation token: {0:?} (expected 8 lowercase hex characters)")]
    InvalidToken(String),

    #[error("Unknown game variant: {0}")]
    UnknownVariant(String),
}
