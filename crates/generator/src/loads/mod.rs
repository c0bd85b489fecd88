//! Load descriptors: what transactions a worker sends.
//!
//! A load descriptor produces the transaction data for one account: an
//! optional one-time setup transaction and the repeatable transaction that
//! becomes the template. Descriptors are created by name from a
//! [`LoadRegistry`] built at startup and passed by reference to whoever
//! needs it.

mod fixed;
mod transfer;

pub use fixed::FixedLoad;
pub use transfer::{SelectionMode, TransferLoad};

use crate::error::GeneratorError;
use async_trait::async_trait;
use fleetload_types::{AccountId, Identity};
use serde_json::Value;
use std::collections::BTreeMap;

/// Load-specific transaction content handed to the authoring collaborator.
#[derive(Debug, Clone, PartialEq)]
pub struct TransactionData {
    /// Opaque body understood by the authoring collaborator.
    pub body: Value,

    /// Fee, if the load wants a specific one.
    pub fee: Option<u64>,

    /// Signers in addition to the fee payer.
    pub signers: Vec<Identity>,
}

impl TransactionData {
    pub fn new(body: Value) -> Self {
        Self {
            body,
            fee: None,
            signers: Vec::new(),
        }
    }

    pub fn with_fee(mut self, fee: u64) -> Self {
        self.fee = Some(fee);
        self
    }

    pub fn with_signers(mut self, signers: Vec<Identity>) -> Self {
        self.signers = signers;
        self
    }
}

/// Trait for describing a transaction load.
#[async_trait]
pub trait LoadDescriptor: Send + Sync {
    /// One-time transaction that must be included before the load starts.
    async fn setup_transaction(
        &self,
        account: &AccountId,
    ) -> Result<Option<TransactionData>, GeneratorError>;

    /// Repeatable transaction sent by `account`.
    async fn transaction(&self, account: &AccountId) -> Result<TransactionData, GeneratorError>;
}

/// Builds a descriptor from job data.
pub type LoadFactory =
    Box<dyn Fn(&Value) -> Result<Box<dyn LoadDescriptor>, GeneratorError> + Send + Sync>;

/// Named load descriptors known to this process.
#[derive(Default)]
pub struct LoadRegistry {
    factories: BTreeMap<String, LoadFactory>,
}

impl LoadRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the loads shipped in this crate.
    pub fn with_builtin_loads() -> Self {
        let mut registry = Self::new();
        registry.register("fixed", |data| Ok(Box::new(FixedLoad::from_data(data)?)));
        registry.register("transfer", |data| {
            Ok(Box::new(TransferLoad::from_data(data)?))
        });
        registry
    }

    /// Register a load under `name`, replacing any previous registration.
    pub fn register<F>(&mut self, name: impl Into<String>, factory: F)
    where
        F: Fn(&Value) -> Result<Box<dyn LoadDescriptor>, GeneratorError> + Send + Sync + 'static,
    {
        self.factories.insert(name.into(), Box::new(factory));
    }

    /// Instantiate the load registered under `name`.
    pub fn create(&self, name: &str, data: &Value) -> Result<Box<dyn LoadDescriptor>, GeneratorError> {
        let factory = self
            .factories
            .get(name)
            .ok_or_else(|| GeneratorError::UnknownLoad(name.to_string()))?;
        factory(data)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }
}
