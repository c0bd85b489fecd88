//! Wire types of the node HTTP API.

use fleetload_types::{AccountId, Identity};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Request to build a transaction body.
#[derive(Debug, Serialize, Deserialize)]
pub struct BuildTransactionRequest {
    pub fee_payer: Identity,
    pub body: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fee: Option<u64>,
}

/// Built (and proven) transaction.
#[derive(Debug, Serialize, Deserialize)]
pub struct BuildTransactionResponse {
    pub tx: Value,
}

/// Request to sign a template instance.
#[derive(Debug, Serialize, Deserialize)]
pub struct SignTransactionRequest {
    pub tx: Value,
    pub signers: Vec<Identity>,
}

/// Signed transaction in node wire form.
#[derive(Debug, Serialize, Deserialize)]
pub struct SignTransactionResponse {
    pub transaction: Value,
}

/// Request to submit a transaction.
#[derive(Debug, Serialize, Deserialize)]
pub struct SubmitTransactionRequest {
    pub transaction: Value,
}

/// Response from transaction submission.
#[derive(Debug, Serialize, Deserialize)]
pub struct SubmitTransactionResponse {
    pub accepted: bool,
    #[serde(default)]
    pub hash: String,
    #[serde(default)]
    pub error: Option<String>,
    /// Opaque receipt carried on the submission handle.
    #[serde(default)]
    pub receipt: Option<Value>,
}

/// Request to derive the public account of a key.
#[derive(Debug, Serialize, Deserialize)]
pub struct ResolveAccountRequest {
    pub key: Identity,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ResolveAccountResponse {
    pub account: AccountId,
}
