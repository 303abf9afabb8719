use thiserror::Error;

use crate::connector::transport::TransportError;

#[derive(Error, Debug)]
pub enum EnrichError {
    #[error("Invalid configuration: {0}")]
    Configuration(String),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Invalid data type: {0}")]
    InvalidDataType(String),

    #[error("Schema error: {0}")]
    Schema(String),

    #[error("Source error: {0}")]
    Source(#[from] anyhow::Error),

    #[error("Sink error: {0}")]
    Sink(String),

    #[error("Completion abandoned before a result was delivered")]
    Abandoned,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl EnrichError {
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode(message.into())
    }
}

pub type Result<T> = std::result::Result<T, EnrichError>;
