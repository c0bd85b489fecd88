//! Types exchanged with the transaction-processing network.

use crate::Endpoint;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use thiserror::Error;

/// A template instance signed for one submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignedTransaction {
    /// Wire form accepted by the node.
    pub payload: Value,
}

/// Opaque handle of a submitted transaction.
///
/// Persisted by the record stores between the send and wait phases.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionHandle {
    /// Transaction hash as reported by the node.
    pub hash: String,

    /// Endpoint the transaction was submitted to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<Endpoint>,

    /// Node-specific receipt kept for the inclusion check.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
}

impl SubmissionHandle {
    pub fn new(hash: impl Into<String>) -> Self {
        Self {
            hash: hash.into(),
            endpoint: None,
            payload: None,
        }
    }

    pub fn with_endpoint(mut self, endpoint: Endpoint) -> Self {
        self.endpoint = Some(endpoint);
        self
    }

    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = Some(payload);
        self
    }
}

impl fmt::Display for SubmissionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.hash)
    }
}

/// Inclusion state of a submitted transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum InclusionStatus {
    Pending,
    Included,
    /// Included in a block but failed to apply.
    Failed { reason: String },
}

/// On-chain account state relevant to sending.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountState {
    /// Sequence number of the next transaction the chain will accept.
    pub nonce: u64,

    /// Nonce including the node's pending pool.
    #[serde(alias = "inferredNonce")]
    pub inferred_nonce: u64,

    /// Total balance in the smallest currency unit.
    pub balance: u64,
}

impl AccountState {
    /// True when the node's pool holds transactions for the account that the
    /// chain has not applied yet.
    pub fn has_nonce_gap(&self) -> bool {
        self.nonce != self.inferred_nonce
    }
}

/// Class of a transport-level failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusClass {
    /// Request timed out (locally or HTTP 408).
    Timeout,
    /// Node-side error (HTTP 5xx).
    ServerError,
    /// Node asked us to slow down (HTTP 429).
    RateLimited,
    /// Connection could not be established or was dropped.
    Connection,
}

impl fmt::Display for StatusClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StatusClass::Timeout => "timeout",
            StatusClass::ServerError => "server error",
            StatusClass::RateLimited => "rate limited",
            StatusClass::Connection => "connection",
        };
        f.write_str(name)
    }
}

/// Failures reported by network collaborators.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum NetworkError {
    #[error("transport failure ({status_class}): {message}")]
    Transport {
        retryable: bool,
        status_class: StatusClass,
        message: String,
    },

    /// Duplicate or invalid sequence number.
    #[error("sequence number conflict: {0}")]
    SequenceConflict(String),

    #[error("transaction rejected: {0}")]
    Rejected(String),

    #[error("malformed response: {0}")]
    Malformed(String),
}

impl NetworkError {
    /// Retryable timeout.
    pub fn timeout(message: impl Into<String>) -> Self {
        NetworkError::Transport {
            retryable: true,
            status_class: StatusClass::Timeout,
            message: message.into(),
        }
    }

    /// Retryable connection failure.
    pub fn connection(message: impl Into<String>) -> Self {
        NetworkError::Transport {
            retryable: true,
            status_class: StatusClass::Connection,
            message: message.into(),
        }
    }

    /// Classify a non-2xx HTTP status and its error message.
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        let transport = |status_class| NetworkError::Transport {
            retryable: true,
            status_class,
            message: format!("HTTP {status}: {message}"),
        };
        match status {
            408 => transport(StatusClass::Timeout),
            429 => transport(StatusClass::RateLimited),
            500..=599 => transport(StatusClass::ServerError),
            409 => NetworkError::SequenceConflict(message),
            _ if is_nonce_message(&message) => NetworkError::SequenceConflict(message),
            _ => NetworkError::Rejected(format!("HTTP {status}: {message}")),
        }
    }

    /// Whether resubmitting the same transaction may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            NetworkError::Transport {
                retryable: true,
                ..
            }
        )
    }

    pub fn is_sequence_conflict(&self) -> bool {
        matches!(self, NetworkError::SequenceConflict(_))
    }
}

fn is_nonce_message(message: &str) -> bool {
    let message = message.to_ascii_lowercase();
    message.contains("nonce") || message.contains("duplicate")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_status_classification() {
        assert!(NetworkError::from_status(408, "slow").is_retryable());
        assert!(NetworkError::from_status(503, "busy").is_retryable());
        assert!(NetworkError::from_status(429, "later").is_retryable());
        assert!(NetworkError::from_status(409, "conflict").is_sequence_conflict());
        assert!(NetworkError::from_status(400, "Invalid_nonce").is_sequence_conflict());
        assert!(NetworkError::from_status(400, "Duplicate transaction").is_sequence_conflict());

        let rejected = NetworkError::from_status(400, "bad fee");
        assert!(!rejected.is_retryable());
        assert!(matches!(rejected, NetworkError::Rejected(_)));
    }

    #[test]
    fn test_handle_wire_form() {
        let handle = SubmissionHandle::new("5Jabc").with_endpoint(Endpoint::new("http://n1"));
        assert_eq!(
            serde_json::to_value(&handle).unwrap(),
            json!({"hash": "5Jabc", "endpoint": "http://n1"})
        );
        let bare: SubmissionHandle = serde_json::from_value(json!({"hash": "5J"})).unwrap();
        assert_eq!(bare.endpoint, None);
        assert_eq!(bare.payload, None);

        let handle = SubmissionHandle::new("5Jdef").with_payload(json!({"slot": 12}));
        let stored = serde_json::to_string(&handle).unwrap();
        let restored: SubmissionHandle = serde_json::from_str(&stored).unwrap();
        assert_eq!(restored, handle);
    }

    #[test]
    fn test_inclusion_status_wire_form() {
        let failed: InclusionStatus =
            serde_json::from_value(json!({"status": "failed", "reason": "overflow"})).unwrap();
        assert_eq!(
            failed,
            InclusionStatus::Failed {
                reason: "overflow".into()
            }
        );
        let pending: InclusionStatus =
            serde_json::from_value(json!({"status": "pending"})).unwrap();
        assert_eq!(pending, InclusionStatus::Pending);
    }
}
