//! Error types for the load generator.

use crate::remote::RemoteError;
use fleetload_types::{AccountId, NetworkError, TemplateError};
use std::path::PathBuf;
use thiserror::Error;

/// Errors from template and record stores.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The template store holds nothing.
    #[error("no transaction template stored")]
    NoTemplate,

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid JSON in {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error(transparent)]
    Template(#[from] TemplateError),

    #[error(transparent)]
    Remote(#[from] RemoteError),
}

/// Errors from the load generator and its collaborators.
#[derive(Debug, Error)]
pub enum GeneratorError {
    #[error("no more identities")]
    NoMoreIdentities,

    #[error("no transaction template stored")]
    NoTemplate,

    #[error("endpoint list is empty")]
    NoEndpoints,

    #[error("all {0} endpoints have been tried")]
    EndpointsExhausted(usize),

    #[error(transparent)]
    Network(#[from] NetworkError),

    /// Nonce conflicted again after being re-fetched from the network.
    #[error("sequence number {nonce} of {fee_payer} conflicted after refresh")]
    SequenceConflict {
        fee_payer: AccountId,
        nonce: u64,
        #[source]
        cause: NetworkError,
    },

    #[error("submission failed after {attempts} attempts")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        cause: Box<GeneratorError>,
    },

    #[error("transaction {hash} was not included after {retries} retries")]
    InclusionTimeout {
        hash: String,
        retries: u32,
        #[source]
        cause: Box<GeneratorError>,
    },

    #[error("still pending after {attempts} status checks")]
    StillPending { attempts: u32 },

    #[error("transaction {hash} failed: {reason}")]
    TransactionFailed { hash: String, reason: String },

    #[error("unknown load: {0}")]
    UnknownLoad(String),

    #[error("invalid load configuration: {0}")]
    InvalidLoad(String),

    #[error(transparent)]
    Template(#[from] TemplateError),

    #[error(transparent)]
    Store(StoreError),

    #[error(transparent)]
    Remote(#[from] RemoteError),
}

impl From<StoreError> for GeneratorError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NoTemplate => GeneratorError::NoTemplate,
            other => GeneratorError::Store(other),
        }
    }
}

impl GeneratorError {
    /// Retryable transport failure reported by the network.
    pub fn is_retryable(&self) -> bool {
        matches!(self, GeneratorError::Network(err) if err.is_retryable())
    }
}
