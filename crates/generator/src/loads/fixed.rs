//! Load sending a body given verbatim in the job data.

use super::{LoadDescriptor, TransactionData};
use crate::error::GeneratorError;
use async_trait::async_trait;
use fleetload_types::AccountId;
use serde::Deserialize;
use serde_json::Value;

/// Placeholder replaced by the sending account in bodies.
const ACCOUNT_PLACEHOLDER: &str = "$account";

#[derive(Debug, Deserialize)]
struct FixedLoadData {
    body: Value,
    #[serde(default)]
    setup: Option<Value>,
    #[serde(default)]
    fee: Option<u64>,
}

/// Sends the same body for every account.
///
/// Job data: `{"body": ..., "setup": ...?, "fee": ...?}`. Any string equal to
/// `"$account"` inside a body is replaced by the sending account.
#[derive(Debug, Clone)]
pub struct FixedLoad {
    body: Value,
    setup: Option<Value>,
    fee: Option<u64>,
}

impl FixedLoad {
    pub fn new(body: Value) -> Self {
        Self {
            body,
            setup: None,
            fee: None,
        }
    }

    pub fn with_setup(mut self, setup: Value) -> Self {
        self.setup = Some(setup);
        self
    }

    pub fn with_fee(mut self, fee: u64) -> Self {
        self.fee = Some(fee);
        self
    }

    /// Parse the job data.
    pub fn from_data(data: &Value) -> Result<Self, GeneratorError> {
        let data: FixedLoadData = serde_json::from_value(data.clone())
            .map_err(|e| GeneratorError::InvalidLoad(format!("fixed: {e}")))?;
        Ok(Self {
            body: data.body,
            setup: data.setup,
            fee: data.fee,
        })
    }

    fn data_for(&self, body: &Value, account: &AccountId) -> TransactionData {
        let data = TransactionData::new(substitute(body, account));
        match self.fee {
            Some(fee) => data.with_fee(fee),
            None => data,
        }
    }
}

fn substitute(value: &Value, account: &AccountId) -> Value {
    match value {
        Value::String(s) if s == ACCOUNT_PLACEHOLDER => Value::String(account.0.clone()),
        Value::Array(items) => Value::Array(items.iter().map(|v| substitute(v, account)).collect()),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), substitute(v, account)))
                .collect(),
        ),
        other => other.clone(),
    }
}

#[async_trait]
impl LoadDescriptor for FixedLoad {
    async fn setup_transaction(
        &self,
        account: &AccountId,
    ) -> Result<Option<TransactionData>, GeneratorError> {
        Ok(self.setup.as_ref().map(|setup| self.data_for(setup, account)))
    }

    async fn transaction(&self, account: &AccountId) -> Result<TransactionData, GeneratorError> {
        Ok(self.data_for(&self.body, account))
    }
}
