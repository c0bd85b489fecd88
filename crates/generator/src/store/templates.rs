//! Transaction template stores.

use super::{read_optional, write_atomic};
use crate::error::StoreError;
use crate::remote::RemoteService;
use async_trait::async_trait;
use fleetload_types::{AccountId, TransactionTemplate};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Where generated templates are kept for the send phase.
#[async_trait]
pub trait TemplateStore: Send {
    /// Store `template`, replacing any template with the same fee payer.
    async fn set_transaction(&mut self, template: TransactionTemplate) -> Result<(), StoreError>;

    /// Template paid for by `sender`, or any stored template when there is
    /// no such entry. [`StoreError::NoTemplate`] when the store is empty.
    async fn get_transaction(
        &mut self,
        sender: Option<&AccountId>,
    ) -> Result<TransactionTemplate, StoreError>;
}

/// In-memory templates keyed by fee payer.
///
/// Lookups without a matching sender cycle through the stored entries.
#[derive(Debug, Default)]
pub struct LocalTemplateStore {
    templates: Vec<TransactionTemplate>,
    cursor: usize,
}

impl LocalTemplateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }
}

#[async_trait]
impl TemplateStore for LocalTemplateStore {
    async fn set_transaction(&mut self, template: TransactionTemplate) -> Result<(), StoreError> {
        match self
            .templates
            .iter_mut()
            .find(|t| t.fee_payer() == template.fee_payer())
        {
            Some(existing) => *existing = template,
            None => self.templates.push(template),
        }
        Ok(())
    }

    async fn get_transaction(
        &mut self,
        sender: Option<&AccountId>,
    ) -> Result<TransactionTemplate, StoreError> {
        pick(&self.templates, &mut self.cursor, sender)
    }
}

/// Entry paid for by `sender`, else the next entry round-robin.
fn pick(
    templates: &[TransactionTemplate],
    cursor: &mut usize,
    sender: Option<&AccountId>,
) -> Result<TransactionTemplate, StoreError> {
    if templates.is_empty() {
        return Err(StoreError::NoTemplate);
    }
    if let Some(t) = sender.and_then(|s| templates.iter().find(|t| t.fee_payer() == s)) {
        return Ok(t.clone());
    }
    let template = templates[*cursor % templates.len()].clone();
    *cursor = (*cursor + 1) % templates.len();
    Ok(template)
}

/// On-disk layout: one `{tx, signers}` document, or an array of them when
/// several fee payers are stored.
#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum TemplateFile {
    Many(Vec<TransactionTemplate>),
    One(TransactionTemplate),
}

/// Templates persisted as JSON, one entry per fee payer.
#[derive(Debug, Clone)]
pub struct FileTemplateStore {
    path: PathBuf,
    cursor: usize,
}

impl FileTemplateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            cursor: 0,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(&self) -> Result<Vec<TransactionTemplate>, StoreError> {
        let Some(contents) = read_optional(&self.path).await? else {
            return Ok(Vec::new());
        };
        let file = serde_json::from_str(&contents).map_err(|source| StoreError::Json {
            path: self.path.clone(),
            source,
        })?;
        Ok(match file {
            TemplateFile::Many(templates) => templates,
            TemplateFile::One(template) => vec![template],
        })
    }
}

#[async_trait]
impl TemplateStore for FileTemplateStore {
    async fn set_transaction(&mut self, template: TransactionTemplate) -> Result<(), StoreError> {
        let fee_payer = template.fee_payer().clone();
        let mut templates = self.load().await?;
        match templates.iter_mut().find(|t| t.fee_payer() == &fee_payer) {
            Some(existing) => *existing = template,
            None => templates.push(template),
        }

        let file = match templates.len() {
            1 => TemplateFile::One(templates.remove(0)),
            _ => TemplateFile::Many(templates),
        };
        let json = serde_json::to_vec(&file).map_err(|source| StoreError::Json {
            path: self.path.clone(),
            source,
        })?;
        write_atomic(&self.path, &json).await?;
        debug!(path = %self.path.display(), %fee_payer, "template saved");
        Ok(())
    }

    async fn get_transaction(
        &mut self,
        sender: Option<&AccountId>,
    ) -> Result<TransactionTemplate, StoreError> {
        let templates = self.load().await?;
        pick(&templates, &mut self.cursor, sender)
    }
}

/// Templates kept by the data service under this worker's id.
#[derive(Debug, Clone)]
pub struct RemoteTemplateStore {
    remote: RemoteService,
}

impl RemoteTemplateStore {
    pub fn new(remote: RemoteService) -> Self {
        Self { remote }
    }

    /// Whether the service holds a template for this worker.
    pub async fn has_transaction(&self) -> Result<bool, StoreError> {
        Ok(self.remote.head("/transaction").await?)
    }
}

#[async_trait]
impl TemplateStore for RemoteTemplateStore {
    async fn set_transaction(&mut self, template: TransactionTemplate) -> Result<(), StoreError> {
        self.remote.post("/transaction", &template).await?;
        Ok(())
    }

    async fn get_transaction(
        &mut self,
        sender: Option<&AccountId>,
    ) -> Result<TransactionTemplate, StoreError> {
        let query: Vec<(&str, &str)> = sender.map(|s| ("sender", s.0.as_str())).into_iter().collect();
        match self.remote.get_with_query("/transaction", &query).await {
            Ok(template) => Ok(template),
            Err(e) if e.is_not_found() => Err(StoreError::NoTemplate),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleetload_types::Identity;
    use serde_json::json;

    fn template(fee_payer: &str, memo: &str) -> TransactionTemplate {
        TransactionTemplate::new(
            json!({"feePayer": {"body": {"publicKey": fee_payer}}, "memo": memo}),
            vec![Identity::from("key")],
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_local_store_replaces_by_fee_payer() {
        let mut store = LocalTemplateStore::new();
        assert!(matches!(
            store.get_transaction(None).await,
            Err(StoreError::NoTemplate)
        ));

        store.set_transaction(template("A", "one")).await.unwrap();
        store.set_transaction(template("A", "two")).await.unwrap();
        assert_eq!(store.len(), 1);

        let got = store
            .get_transaction(Some(&AccountId::from("A")))
            .await
            .unwrap();
        assert_eq!(got.tx()["memo"], "two");
    }

    #[tokio::test]
    async fn test_local_store_cycles_without_sender_match() {
        let mut store = LocalTemplateStore::new();
        for payer in ["A", "B", "C"] {
            store.set_transaction(template(payer, "")).await.unwrap();
        }

        let mut payers = Vec::new();
        for _ in 0..4 {
            let t = store
                .get_transaction(Some(&AccountId::from("Z")))
                .await
                .unwrap();
            payers.push(t.fee_payer().to_string());
        }
        assert_eq!(payers, ["A", "B", "C", "A"]);
    }

    #[tokio::test]
    async fn test_file_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = FileTemplateStore::new(dir.path().join("run-template.json"));
        assert!(matches!(
            store.get_transaction(None).await,
            Err(StoreError::NoTemplate)
        ));

        let original = template("A", "stored");
        store.set_transaction(original.clone()).await.unwrap();
        let loaded = FileTemplateStore::new(store.path())
            .get_transaction(None)
            .await
            .unwrap();
        assert_eq!(loaded, original);
    }

    #[tokio::test]
    async fn test_file_store_keeps_one_entry_per_fee_payer() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run-template.json");
        let mut store = FileTemplateStore::new(&path);
        store.set_transaction(template("A", "one")).await.unwrap();
        store.set_transaction(template("B", "one")).await.unwrap();
        store.set_transaction(template("A", "two")).await.unwrap();

        let mut reopened = FileTemplateStore::new(&path);
        let mut payers = Vec::new();
        for _ in 0..3 {
            payers.push(reopened.get_transaction(None).await.unwrap().fee_payer().to_string());
        }
        assert_eq!(payers, ["A", "B", "A"]);

        let a = reopened
            .get_transaction(Some(&AccountId::from("A")))
            .await
            .unwrap();
        assert_eq!(a.tx()["memo"], "two");
    }
}
