//! HTTP implementations of the network and authoring collaborators.

use super::types::*;
use super::{Network, TransactionAuthor};
use crate::error::GeneratorError;
use crate::loads::TransactionData;
use async_trait::async_trait;
use fleetload_types::{
    AccountId, AccountState, Endpoint, ErrorBody, Identity, InclusionStatus, NetworkError,
    SignedTransaction, SubmissionHandle, TransactionTemplate,
};
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{debug, trace};

/// Node client speaking the JSON node API.
#[derive(Clone, Debug)]
pub struct HttpNetwork {
    client: Client,
}

impl HttpNetwork {
    /// Create a client; every request is bounded by `timeout`.
    pub fn new(timeout: Duration) -> Result<Self, NetworkError> {
        Ok(Self {
            client: build_client(timeout)?,
        })
    }
}

fn build_client(timeout: Duration) -> Result<Client, NetworkError> {
    Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| NetworkError::connection(format!("failed to build HTTP client: {e}")))
}

fn classify(err: reqwest::Error) -> NetworkError {
    if err.is_timeout() {
        NetworkError::timeout(err.to_string())
    } else if err.is_decode() {
        NetworkError::Malformed(err.to_string())
    } else if let Some(status) = err.status() {
        NetworkError::from_status(status.as_u16(), err.to_string())
    } else {
        NetworkError::connection(err.to_string())
    }
}

async fn call<T: DeserializeOwned>(request: RequestBuilder) -> Result<T, NetworkError> {
    let response = request.send().await.map_err(classify)?;
    let status = response.status();
    if !status.is_success() {
        let text = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ErrorBody>(&text)
            .map(|body| body.error)
            .unwrap_or(text);
        return Err(NetworkError::from_status(status.as_u16(), message));
    }
    response.json().await.map_err(classify)
}

fn valid_until(validity: Duration) -> u64 {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    (now + validity).as_secs()
}

#[async_trait]
impl Network for HttpNetwork {
    async fn account_id(
        &self,
        endpoint: &Endpoint,
        identity: &Identity,
    ) -> Result<AccountId, NetworkError> {
        let request = ResolveAccountRequest {
            key: identity.clone(),
        };
        let response: ResolveAccountResponse = call(
            self.client
                .post(endpoint.join("/accounts/resolve"))
                .json(&request),
        )
        .await?;
        Ok(response.account)
    }

    async fn get_account(
        &self,
        endpoint: &Endpoint,
        account: &AccountId,
    ) -> Result<AccountState, NetworkError> {
        trace!(%account, %endpoint, "fetching account");
        call(self.client.get(endpoint.join(&format!("/accounts/{account}")))).await
    }

    async fn sign(
        &self,
        endpoint: &Endpoint,
        template: &TransactionTemplate,
        nonce: u64,
        validity: Option<Duration>,
    ) -> Result<SignedTransaction, NetworkError> {
        let request = SignTransactionRequest {
            tx: template.instantiate(nonce, validity.map(valid_until)),
            signers: template.signers().to_vec(),
        };
        let response: SignTransactionResponse = call(
            self.client
                .post(endpoint.join("/transactions/sign"))
                .json(&request),
        )
        .await?;
        Ok(SignedTransaction {
            payload: response.transaction,
        })
    }

    async fn submit(
        &self,
        endpoint: &Endpoint,
        transaction: &SignedTransaction,
    ) -> Result<SubmissionHandle, NetworkError> {
        let request = SubmitTransactionRequest {
            transaction: transaction.payload.clone(),
        };
        let response: SubmitTransactionResponse =
            call(self.client.post(endpoint.join("/transactions")).json(&request)).await?;
        if !response.accepted {
            let reason = response
                .error
                .unwrap_or_else(|| "rejected without reason".to_string());
            return Err(NetworkError::from_status(400, reason));
        }
        debug!(hash = %response.hash, %endpoint, "transaction accepted");
        let handle = SubmissionHandle::new(response.hash).with_endpoint(endpoint.clone());
        Ok(match response.receipt {
            Some(receipt) => handle.with_payload(receipt),
            None => handle,
        })
    }

    async fn check_inclusion(
        &self,
        endpoint: &Endpoint,
        handle: &SubmissionHandle,
    ) -> Result<InclusionStatus, NetworkError> {
        call(
            self.client
                .get(endpoint.join(&format!("/transactions/{}", handle.hash))),
        )
        .await
    }
}

/// Authoring collaborator backed by the node's build endpoint.
#[derive(Clone, Debug)]
pub struct HttpAuthor {
    client: Client,
}

impl HttpAuthor {
    pub fn new(timeout: Duration) -> Result<Self, NetworkError> {
        Ok(Self {
            client: build_client(timeout)?,
        })
    }
}

#[async_trait]
impl TransactionAuthor for HttpAuthor {
    async fn create_template(
        &self,
        endpoint: &Endpoint,
        fee_payer: &Identity,
        data: TransactionData,
    ) -> Result<TransactionTemplate, GeneratorError> {
        let request = BuildTransactionRequest {
            fee_payer: fee_payer.clone(),
            body: data.body,
            fee: data.fee,
        };
        let response: BuildTransactionResponse = call(
            self.client
                .post(endpoint.join("/transactions/build"))
                .json(&request),
        )
        .await?;

        let mut signers = data.signers;
        signers.push(fee_payer.clone());
        Ok(TransactionTemplate::new(response.tx, signers)?)
    }
}
