// src/errors.rs

//! Crate-wide error type and result alias.

use thiserror::Error;

use crate::job::JobId;

#[derive(Error, Debug)]
pub enum EtlError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Job state store error: {0}")]
    StoreError(String),

    #[error("Object store error at '{path}': {reason}")]
    ObjectStoreError { path: String, reason: String },

    #[error("Failed to rehydrate payload for job {job}: {reason}")]
    RehydrationError { job: JobId, reason: String },

    #[error("Telemetry error: {0}")]
    TelemetryError(String),

    #[error("Unsupported processor: {0}")]
    UnsupportedProcessor(String),

    #[error("Job {0} was cancelled")]
    Cancelled(JobId),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl EtlError {
    pub fn store(reason: impl Into<String>) -> Self {
        EtlError::StoreError(reason.into())
    }

    pub fn object_store(path: impl Into<String>, reason: impl ToString) -> Self {
        EtlError::ObjectStoreError {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    pub fn rehydration(job: JobId, reason: impl Into<String>) -> Self {
        EtlError::RehydrationError {
            job,
            reason: reason.into(),
        }
    }
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, EtlError>;
