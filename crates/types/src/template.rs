//! Re-signable transaction templates.
//!
//! A template is the expensive part of a transaction (body, proofs, deferred
//! authorizations) produced once by the authoring collaborator. It is
//! re-signed with a different sequence number for every submission, so a
//! single generate phase can feed any number of sends.
//!
//! The stored form is `{"tx": <opaque>, "signers": [<key material>]}`. The
//! `tx` document is kept as-is, including key order and any
//! `lazyAuthorization` markers, so a template read back from disk signs to
//! exactly the same artifact as the one that was written.

use crate::{AccountId, Identity};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// JSON pointer of the fee payer's public key inside `tx`.
pub const FEE_PAYER_POINTER: &str = "/feePayer/body/publicKey";

/// JSON pointer of the fee payer body, where nonce and validity are set.
const FEE_PAYER_BODY_POINTER: &str = "/feePayer/body";

/// Errors about template structure.
#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("transaction body has no fee payer at {FEE_PAYER_POINTER}")]
    MissingFeePayer,

    #[error("transaction template JSON is invalid: {0}")]
    Json(#[from] serde_json::Error),
}

/// Immutable, re-signable transaction skeleton.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawTemplate", into = "RawTemplate")]
pub struct TransactionTemplate {
    tx: Value,
    signers: Vec<Identity>,
    fee_payer: AccountId,
}

#[derive(Serialize, Deserialize)]
struct RawTemplate {
    tx: Value,
    signers: Vec<Identity>,
}

impl TryFrom<RawTemplate> for TransactionTemplate {
    type Error = TemplateError;

    fn try_from(raw: RawTemplate) -> Result<Self, Self::Error> {
        TransactionTemplate::new(raw.tx, raw.signers)
    }
}

impl From<TransactionTemplate> for RawTemplate {
    fn from(template: TransactionTemplate) -> Self {
        RawTemplate {
            tx: template.tx,
            signers: template.signers,
        }
    }
}

impl TransactionTemplate {
    /// Build a template from an authored transaction and its signers.
    ///
    /// Fails if the body does not name a fee payer.
    pub fn new(tx: Value, signers: Vec<Identity>) -> Result<Self, TemplateError> {
        let fee_payer = tx
            .pointer(FEE_PAYER_POINTER)
            .and_then(Value::as_str)
            .map(AccountId::from)
            .ok_or(TemplateError::MissingFeePayer)?;
        Ok(Self {
            tx,
            signers,
            fee_payer,
        })
    }

    /// The opaque transaction body.
    pub fn tx(&self) -> &Value {
        &self.tx
    }

    /// Identities that sign every instance of this template.
    pub fn signers(&self) -> &[Identity] {
        &self.signers
    }

    /// Account paying fees, derived from the body.
    pub fn fee_payer(&self) -> &AccountId {
        &self.fee_payer
    }

    /// Body instance for one submission.
    ///
    /// Sets the fee payer nonce and, if given, the validity bound. Everything
    /// else is copied untouched.
    pub fn instantiate(&self, nonce: u64, valid_until: Option<u64>) -> Value {
        let mut tx = self.tx.clone();
        if let Some(Value::Object(body)) = tx.pointer_mut(FEE_PAYER_BODY_POINTER) {
            body.insert("nonce".to_string(), Value::String(nonce.to_string()));
            if let Some(valid_until) = valid_until {
                body.insert(
                    "validUntil".to_string(),
                    Value::String(valid_until.to_string()),
                );
            }
        }
        tx
    }

    /// Serialize to the stored `{tx, signers}` document.
    pub fn to_json(&self) -> Result<String, TemplateError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parse a stored `{tx, signers}` document.
    pub fn from_json(json: &str) -> Result<Self, TemplateError> {
        Ok(serde_json::from_str(json)?)
    }
}
