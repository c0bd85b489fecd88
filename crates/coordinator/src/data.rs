//! Data service backing the remote stores of the workers.
//!
//! Serves the node list, hands out identities one at a time, and keeps
//! templates and submission records per worker so that the generate, send
//! and wait phases can run as separate processes.

use crate::server::{healthcheck, ApiError, CallerId};
use axum::extract::rejection::JsonRejection;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use dashmap::DashMap;
use fleetload_types::{AccountId, Endpoint, Identity, SubmissionHandle, TransactionTemplate};
use parking_lot::Mutex;
use serde::Deserialize;
use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Settings of the data service.
#[derive(Clone, Debug, Default)]
pub struct DataServiceConfig {
    /// Hand templates of other workers round-robin to workers that stored
    /// none of their own.
    pub share_templates: bool,

    /// File the records are written to on commit.
    pub records_path: Option<PathBuf>,
}

impl DataServiceConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_share_templates(mut self, share: bool) -> Self {
        self.share_templates = share;
        self
    }

    pub fn with_records_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.records_path = Some(path.into());
        self
    }
}

/// Templates stored by one caller, one per fee payer.
#[derive(Debug, Default)]
struct CallerTemplates {
    entries: Vec<TransactionTemplate>,
    cursor: usize,
}

impl CallerTemplates {
    fn insert(&mut self, template: TransactionTemplate) {
        match self
            .entries
            .iter_mut()
            .find(|t| t.fee_payer() == template.fee_payer())
        {
            Some(existing) => *existing = template,
            None => self.entries.push(template),
        }
    }

    /// Entry paid for by `sender`, else the next entry round-robin.
    fn pick(&mut self, sender: Option<&AccountId>) -> Option<TransactionTemplate> {
        pick(&self.entries, &mut self.cursor, sender)
    }
}

fn pick(
    entries: &[TransactionTemplate],
    cursor: &mut usize,
    sender: Option<&AccountId>,
) -> Option<TransactionTemplate> {
    if entries.is_empty() {
        return None;
    }
    if let Some(t) = sender.and_then(|s| entries.iter().find(|t| t.fee_payer() == s)) {
        return Some(t.clone());
    }
    let template = entries[*cursor % entries.len()].clone();
    *cursor = cursor.wrapping_add(1);
    Some(template)
}

/// State of the data service.
pub struct DataService {
    config: DataServiceConfig,
    nodes: Mutex<VecDeque<Endpoint>>,
    accounts: Mutex<VecDeque<Identity>>,
    templates: DashMap<String, CallerTemplates>,
    shared_cursor: Mutex<usize>,
    records: DashMap<String, Vec<SubmissionHandle>>,
}

impl DataService {
    pub fn new(nodes: Vec<Endpoint>, accounts: Vec<Identity>, config: DataServiceConfig) -> Self {
        info!(
            nodes = nodes.len(),
            accounts = accounts.len(),
            share_templates = config.share_templates,
            "data service created"
        );
        Self {
            config,
            nodes: Mutex::new(nodes.into()),
            accounts: Mutex::new(accounts.into()),
            templates: DashMap::new(),
            shared_cursor: Mutex::new(0),
            records: DashMap::new(),
        }
    }

    /// Current node list, rotated by one for the next caller.
    pub fn nodes(&self) -> Vec<Endpoint> {
        let mut nodes = self.nodes.lock();
        let current: Vec<Endpoint> = nodes.iter().cloned().collect();
        if !nodes.is_empty() {
            nodes.rotate_left(1);
        }
        current
    }

    /// Take the next identity out of the pool.
    pub fn take_account(&self) -> Option<Identity> {
        let account = self.accounts.lock().pop_front();
        if account.is_none() {
            debug!("account pool exhausted");
        }
        account
    }

    pub fn remaining_accounts(&self) -> usize {
        self.accounts.lock().len()
    }

    /// Store `template` for `caller`, replacing the entry of its fee payer.
    pub fn set_template(&self, caller: &str, template: TransactionTemplate) {
        debug!(caller, fee_payer = %template.fee_payer(), "template stored");
        self.templates
            .entry(caller.to_string())
            .or_default()
            .insert(template);
    }

    /// Template of `caller`, or a shared one when sharing is enabled.
    ///
    /// An entry paid for by `sender` is preferred; otherwise the stored
    /// entries are handed out round-robin.
    pub fn template(&self, caller: &str, sender: Option<&AccountId>) -> Option<TransactionTemplate> {
        let own = self
            .templates
            .get_mut(caller)
            .and_then(|mut own| own.pick(sender));
        if own.is_some() || !self.config.share_templates {
            return own;
        }

        let mut callers: Vec<String> = self.templates.iter().map(|e| e.key().clone()).collect();
        callers.sort();
        let shared: Vec<TransactionTemplate> = callers
            .iter()
            .filter_map(|c| self.templates.get(c).map(|t| t.entries.clone()))
            .flatten()
            .collect();
        pick(&shared, &mut self.shared_cursor.lock(), sender)
    }

    /// Whether `template` would return something for `caller`.
    pub fn has_template(&self, caller: &str) -> bool {
        let stored = |t: &CallerTemplates| !t.entries.is_empty();
        self.templates.get(caller).is_some_and(|t| stored(t.value()))
            || (self.config.share_templates && self.templates.iter().any(|e| stored(e.value())))
    }

    pub fn add_record(&self, caller: &str, handle: SubmissionHandle) {
        self.records
            .entry(caller.to_string())
            .or_default()
            .push(handle);
    }

    /// Records of `caller`, oldest first.
    pub fn records(&self, caller: &str) -> Vec<SubmissionHandle> {
        self.records
            .get(caller)
            .map(|r| r.clone())
            .unwrap_or_default()
    }

    /// All records, grouped by caller in caller order.
    pub fn all_records(&self) -> Vec<SubmissionHandle> {
        let mut callers: Vec<String> = self.records.iter().map(|e| e.key().clone()).collect();
        callers.sort();
        callers
            .iter()
            .flat_map(|caller| self.records(caller))
            .collect()
    }

    /// Write every record to the records file, when one is configured.
    pub async fn commit(&self) -> std::io::Result<usize> {
        let records = self.all_records();
        let Some(path) = &self.config.records_path else {
            return Ok(records.len());
        };
        let bytes = serde_json::to_vec_pretty(&records)?;
        let tmp = path.with_extension("tmp");
        tokio::fs::write(&tmp, &bytes).await?;
        tokio::fs::rename(&tmp, path).await?;
        info!(path = %path.display(), records = records.len(), "records committed");
        Ok(records.len())
    }

    /// Routes of the data service.
    pub fn router(self: Arc<Self>) -> Router {
        Router::new()
            .route("/nodes", get(nodes))
            .route("/account", get(account))
            .route(
                "/transaction",
                get(get_transaction)
                    .head(head_transaction)
                    .post(post_transaction),
            )
            .route("/transaction-id", post(post_record))
            .route("/transaction-ids", get(get_records))
            .route("/transaction-ids/commit", post(commit))
            .route("/healthcheck", get(healthcheck))
            .with_state(self)
    }
}

#[derive(Debug, Deserialize)]
struct TemplateQuery {
    sender: Option<AccountId>,
}

fn bad_request(rejection: JsonRejection) -> ApiError {
    ApiError::BadRequest(rejection.body_text())
}

async fn nodes(State(data): State<Arc<DataService>>) -> Json<Vec<Endpoint>> {
    Json(data.nodes())
}

async fn account(State(data): State<Arc<DataService>>) -> Result<Json<Identity>, ApiError> {
    data.take_account()
        .map(Json)
        .ok_or_else(|| ApiError::NotFound("no accounts left".to_string()))
}

async fn get_transaction(
    State(data): State<Arc<DataService>>,
    CallerId(caller): CallerId,
    Query(query): Query<TemplateQuery>,
) -> Result<Json<TransactionTemplate>, ApiError> {
    data.template(&caller, query.sender.as_ref())
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("no transaction stored for {caller}")))
}

async fn head_transaction(
    State(data): State<Arc<DataService>>,
    CallerId(caller): CallerId,
) -> StatusCode {
    if data.has_template(&caller) {
        StatusCode::OK
    } else {
        StatusCode::NOT_FOUND
    }
}

async fn post_transaction(
    State(data): State<Arc<DataService>>,
    CallerId(caller): CallerId,
    payload: Result<Json<TransactionTemplate>, JsonRejection>,
) -> Result<Json<bool>, ApiError> {
    let Json(template) = payload.map_err(bad_request)?;
    data.set_template(&caller, template);
    Ok(Json(true))
}

async fn post_record(
    State(data): State<Arc<DataService>>,
    CallerId(caller): CallerId,
    payload: Result<Json<SubmissionHandle>, JsonRejection>,
) -> Result<Json<bool>, ApiError> {
    let Json(handle) = payload.map_err(bad_request)?;
    data.add_record(&caller, handle);
    Ok(Json(true))
}

async fn get_records(
    State(data): State<Arc<DataService>>,
    CallerId(caller): CallerId,
) -> Json<Vec<SubmissionHandle>> {
    Json(data.records(&caller))
}

async fn commit(State(data): State<Arc<DataService>>) -> Result<Json<usize>, ApiError> {
    data.commit().await.map(Json).map_err(|e| {
        warn!(error = %e, "failed to commit records");
        ApiError::Internal(format!("failed to commit records: {e}"))
    })
}
