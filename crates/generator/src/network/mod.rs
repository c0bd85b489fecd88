//! Collaborators the generator talks to.
//!
//! [`Network`] signs, submits and tracks transactions and reports account
//! state; [`TransactionAuthor`] turns load-specific transaction data into a
//! re-signable template. Both are object safe so the binary can plug in the
//! HTTP implementations and tests can plug in scripted ones.

mod http;
mod types;

pub use http::{HttpAuthor, HttpNetwork};
pub use types::{
    BuildTransactionRequest, BuildTransactionResponse, ResolveAccountRequest,
    ResolveAccountResponse, SignTransactionRequest, SignTransactionResponse,
    SubmitTransactionRequest, SubmitTransactionResponse,
};

use crate::error::GeneratorError;
use crate::loads::TransactionData;
use async_trait::async_trait;
use fleetload_types::{
    AccountId, AccountState, Endpoint, Identity, InclusionStatus, NetworkError,
    SignedTransaction, SubmissionHandle, TransactionTemplate,
};
use std::future::Future;
use std::time::Duration;

/// Network submission and account-state collaborator.
#[async_trait]
pub trait Network: Send + Sync {
    /// Public account of an identity.
    async fn account_id(
        &self,
        endpoint: &Endpoint,
        identity: &Identity,
    ) -> Result<AccountId, NetworkError>;

    /// Current on-chain state of an account.
    async fn get_account(
        &self,
        endpoint: &Endpoint,
        account: &AccountId,
    ) -> Result<AccountState, NetworkError>;

    /// Sign an instance of `template` with the given sequence number.
    async fn sign(
        &self,
        endpoint: &Endpoint,
        template: &TransactionTemplate,
        nonce: u64,
        validity: Option<Duration>,
    ) -> Result<SignedTransaction, NetworkError>;

    /// Submit a signed transaction.
    async fn submit(
        &self,
        endpoint: &Endpoint,
        transaction: &SignedTransaction,
    ) -> Result<SubmissionHandle, NetworkError>;

    /// Inclusion state of a submitted transaction.
    async fn check_inclusion(
        &self,
        endpoint: &Endpoint,
        handle: &SubmissionHandle,
    ) -> Result<InclusionStatus, NetworkError>;
}

/// Transaction authoring collaborator.
#[async_trait]
pub trait TransactionAuthor: Send + Sync {
    /// Build (and prove) a template paid for by `fee_payer`.
    async fn create_template(
        &self,
        endpoint: &Endpoint,
        fee_payer: &Identity,
        data: TransactionData,
    ) -> Result<TransactionTemplate, GeneratorError>;
}

/// Bound a network call by `timeout`.
///
/// Elapsing is reported as a retryable transport failure.
pub async fn with_timeout<T>(
    timeout: Duration,
    what: &str,
    call: impl Future<Output = Result<T, NetworkError>>,
) -> Result<T, NetworkError> {
    match tokio::time::timeout(timeout, call).await {
        Ok(result) => result,
        Err(_) => Err(NetworkError::timeout(format!(
            "{what} timed out after {timeout:?}"
        ))),
    }
}
