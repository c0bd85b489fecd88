//! Scripted network and authoring collaborators for engine tests.

#![allow(dead_code)]

use async_trait::async_trait;
use fleetload_generator::{GeneratorError, Network, TransactionAuthor, TransactionData};
use fleetload_types::{
    AccountId, AccountState, Endpoint, Identity, InclusionStatus, NetworkError,
    SignedTransaction, SubmissionHandle, TransactionTemplate,
};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::time::Duration;

/// Account id the mocks derive from an identity.
pub fn account_of(identity: &Identity) -> AccountId {
    AccountId(format!("B62{}", identity.expose()))
}

/// A submission the mock accepted.
#[derive(Debug, Clone)]
pub struct Submitted {
    pub endpoint: Endpoint,
    pub fee_payer: String,
    pub nonce: u64,
    pub hash: String,
}

#[derive(Default)]
struct State {
    accounts: HashMap<AccountId, AccountState>,
    submit_failures: VecDeque<NetworkError>,
    inclusion_script: VecDeque<Result<InclusionStatus, NetworkError>>,
    submitted: Vec<Submitted>,
    account_lookups: usize,
    inclusion_checks: Vec<(String, Endpoint)>,
}

/// In-memory network with scriptable failures.
///
/// Submissions succeed unless a failure is queued; every accepted
/// submission advances the fee payer's inferred nonce. Inclusion checks
/// follow the queued script and report `Included` once it runs out.
#[derive(Default)]
pub struct MockNetwork {
    state: Mutex<State>,
}

impl MockNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_account(self, account: AccountId, nonce: u64) -> Self {
        self.state.lock().accounts.insert(
            account,
            AccountState {
                nonce,
                inferred_nonce: nonce,
                balance: u64::MAX,
            },
        );
        self
    }

    pub fn fail_next_submit(&self, error: NetworkError) {
        self.state.lock().submit_failures.push_back(error);
    }

    pub fn script_inclusion(&self, result: Result<InclusionStatus, NetworkError>) {
        self.state.lock().inclusion_script.push_back(result);
    }

    pub fn submitted(&self) -> Vec<Submitted> {
        self.state.lock().submitted.clone()
    }

    pub fn account_lookups(&self) -> usize {
        self.state.lock().account_lookups
    }

    pub fn inclusion_checks(&self) -> Vec<(String, Endpoint)> {
        self.state.lock().inclusion_checks.clone()
    }
}

/// Deterministic stand-in for a signature over a body instance.
pub fn test_signature(tx: &Value, signers: &[Identity]) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(tx.to_string().as_bytes());
    for signer in signers {
        hasher.update(signer.expose().as_bytes());
    }
    hasher.finalize().to_hex().to_string()
}

pub fn conflict() -> NetworkError {
    NetworkError::from_status(409, "nonce already used")
}

pub fn unavailable() -> NetworkError {
    NetworkError::from_status(503, "node unavailable")
}

#[async_trait]
impl Network for MockNetwork {
    async fn account_id(
        &self,
        _endpoint: &Endpoint,
        identity: &Identity,
    ) -> Result<AccountId, NetworkError> {
        Ok(account_of(identity))
    }

    async fn get_account(
        &self,
        _endpoint: &Endpoint,
        account: &AccountId,
    ) -> Result<AccountState, NetworkError> {
        let mut state = self.state.lock();
        state.account_lookups += 1;
        Ok(state.accounts.get(account).copied().unwrap_or(AccountState {
            nonce: 0,
            inferred_nonce: 0,
            balance: 0,
        }))
    }

    async fn sign(
        &self,
        _endpoint: &Endpoint,
        template: &TransactionTemplate,
        nonce: u64,
        _validity: Option<Duration>,
    ) -> Result<SignedTransaction, NetworkError> {
        let tx = template.instantiate(nonce, None);
        let signature = test_signature(&tx, template.signers());
        Ok(SignedTransaction {
            payload: json!({
                "tx": tx,
                "feePayer": template.fee_payer(),
                "nonce": nonce,
                "signature": signature,
            }),
        })
    }

    async fn submit(
        &self,
        endpoint: &Endpoint,
        transaction: &SignedTransaction,
    ) -> Result<SubmissionHandle, NetworkError> {
        let mut state = self.state.lock();
        if let Some(error) = state.submit_failures.pop_front() {
            return Err(error);
        }

        let fee_payer = transaction.payload["feePayer"]
            .as_str()
            .unwrap_or_default()
            .to_string();
        let nonce = transaction.payload["nonce"].as_u64().unwrap_or_default();
        let hash = blake3::hash(transaction.payload.to_string().as_bytes())
            .to_hex()
            .to_string();

        let account = state
            .accounts
            .entry(AccountId(fee_payer.clone()))
            .or_insert(AccountState {
                nonce: 0,
                inferred_nonce: 0,
                balance: 0,
            });
        account.inferred_nonce = account.inferred_nonce.max(nonce + 1);

        state.submitted.push(Submitted {
            endpoint: endpoint.clone(),
            fee_payer,
            nonce,
            hash: hash.clone(),
        });
        Ok(SubmissionHandle::new(hash).with_endpoint(endpoint.clone()))
    }

    async fn check_inclusion(
        &self,
        endpoint: &Endpoint,
        handle: &SubmissionHandle,
    ) -> Result<InclusionStatus, NetworkError> {
        let mut state = self.state.lock();
        state
            .inclusion_checks
            .push((handle.hash.clone(), endpoint.clone()));
        state
            .inclusion_script
            .pop_front()
            .unwrap_or(Ok(InclusionStatus::Included))
    }
}

/// Author producing a minimal body with a fee payer.
#[derive(Default)]
pub struct MockAuthor {
    authored: Mutex<Vec<Value>>,
}

impl MockAuthor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn authored(&self) -> Vec<Value> {
        self.authored.lock().clone()
    }
}

#[async_trait]
impl TransactionAuthor for MockAuthor {
    async fn create_template(
        &self,
        _endpoint: &Endpoint,
        fee_payer: &Identity,
        data: TransactionData,
    ) -> Result<TransactionTemplate, GeneratorError> {
        let tx = json!({
            "feePayer": {
                "body": {"publicKey": account_of(fee_payer), "fee": data.fee.unwrap_or(0)},
                "lazyAuthorization": {"kind": "lazy-signature"},
            },
            "body": data.body,
        });
        self.authored.lock().push(tx.clone());
        let mut signers = data.signers;
        signers.push(fee_payer.clone());
        Ok(TransactionTemplate::new(tx, signers)?)
    }
}

/// Template paid for by `fee_payer`, built without the author.
pub fn template_for(fee_payer: &Identity) -> TransactionTemplate {
    TransactionTemplate::new(
        json!({"feePayer": {"body": {"publicKey": account_of(fee_payer)}}, "body": {}}),
        vec![fee_payer.clone()],
    )
    .unwrap()
}

pub fn endpoints(n: usize) -> Vec<Endpoint> {
    (0..n)
        .map(|i| Endpoint::new(format!("http://node{i}")))
        .collect()
}
