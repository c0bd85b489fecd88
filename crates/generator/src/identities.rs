//! Sources of account identities.
//!
//! Every identity is handed out at most once per source. The static source
//! can optionally check that an account is funded and has no pending
//! transactions before handing it out; identities failing that check are
//! dropped for good.

use crate::error::GeneratorError;
use crate::network::{with_timeout, Network};
use crate::remote::RemoteService;
use async_trait::async_trait;
use fleetload_types::{Endpoint, Identity, NetworkError};
use serde::Deserialize;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Minimum balance accepted by default (1,000,000 whole units).
pub const DEFAULT_MIN_BALANCE: u64 = 1_000_000 * 1_000_000_000;

/// Hands out identities, each at most once.
#[async_trait]
pub trait IdentitySource: Send {
    /// Next unused identity; [`GeneratorError::NoMoreIdentities`] when
    /// exhausted.
    async fn next_identity(&mut self) -> Result<Identity, GeneratorError>;
}

/// Account checks applied before an identity is handed out.
#[derive(Clone)]
pub struct IdentityValidation {
    network: Arc<dyn Network>,
    endpoint: Endpoint,
    min_balance: u64,
    timeout: Duration,
}

impl IdentityValidation {
    pub fn new(network: Arc<dyn Network>, endpoint: Endpoint) -> Self {
        Self {
            network,
            endpoint,
            min_balance: DEFAULT_MIN_BALANCE,
            timeout: Duration::from_secs(60),
        }
    }

    pub fn with_min_balance(mut self, min_balance: u64) -> Self {
        self.min_balance = min_balance;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Whether `identity` may be used; lookup failures count as unusable.
    async fn accepts(&self, identity: &Identity) -> bool {
        match self.check(identity).await {
            Ok(Some(reason)) => {
                info!(identity = %identity, reason, "discarding identity");
                false
            }
            Ok(None) => true,
            Err(e) => {
                warn!(identity = %identity, error = %e, "account lookup failed, discarding identity");
                false
            }
        }
    }

    async fn check(&self, identity: &Identity) -> Result<Option<&'static str>, NetworkError> {
        let account = with_timeout(
            self.timeout,
            "account_id",
            self.network.account_id(&self.endpoint, identity),
        )
        .await?;
        let state = with_timeout(
            self.timeout,
            "get_account",
            self.network.get_account(&self.endpoint, &account),
        )
        .await?;

        if state.balance < self.min_balance {
            return Ok(Some("insufficient balance"));
        }
        if state.has_nonce_gap() {
            return Ok(Some("pending transactions"));
        }
        debug!(%account, balance = state.balance, "identity validated");
        Ok(None)
    }
}

/// In-memory identity list.
pub struct StaticIdentities {
    pending: VecDeque<Identity>,
    validation: Option<IdentityValidation>,
}

impl StaticIdentities {
    pub fn new(identities: impl IntoIterator<Item = Identity>) -> Self {
        Self {
            pending: identities.into_iter().collect(),
            validation: None,
        }
    }

    pub fn with_validation(mut self, validation: IdentityValidation) -> Self {
        self.validation = Some(validation);
        self
    }

    /// Identities not yet handed out or discarded.
    pub fn remaining(&self) -> usize {
        self.pending.len()
    }
}

#[async_trait]
impl IdentitySource for StaticIdentities {
    async fn next_identity(&mut self) -> Result<Identity, GeneratorError> {
        while let Some(identity) = self.pending.pop_front() {
            match &self.validation {
                Some(validation) if !validation.accepts(&identity).await => continue,
                _ => return Ok(identity),
            }
        }
        Err(GeneratorError::NoMoreIdentities)
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum AccountResponse {
    Key(Identity),
    Object {
        #[serde(rename = "privateKey")]
        private_key: Identity,
    },
}

/// Identities popped from the data service.
pub struct RemoteIdentities {
    remote: RemoteService,
}

impl RemoteIdentities {
    pub fn new(remote: RemoteService) -> Self {
        Self { remote }
    }
}

#[async_trait]
impl IdentitySource for RemoteIdentities {
    async fn next_identity(&mut self) -> Result<Identity, GeneratorError> {
        match self.remote.get::<AccountResponse>("/account").await {
            Ok(AccountResponse::Key(identity)) => Ok(identity),
            Ok(AccountResponse::Object { private_key }) => Ok(private_key),
            Err(e) if e.is_not_found() => Err(GeneratorError::NoMoreIdentities),
            Err(e) => Err(e.into()),
        }
    }
}
