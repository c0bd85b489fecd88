//! Submission record stores.

use super::{read_optional, write_atomic};
use crate::error::StoreError;
use crate::remote::RemoteService;
use async_trait::async_trait;
use fleetload_types::SubmissionHandle;
use serde_json::json;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Append-only log of submitted transactions.
#[async_trait]
pub trait RecordStore: Send {
    /// Append a handle.
    async fn add_record(&mut self, handle: SubmissionHandle) -> Result<(), StoreError>;

    /// Snapshot of all handles in submission order. Never removes records.
    async fn get_records(&self) -> Result<Vec<SubmissionHandle>, StoreError>;

    /// Flush buffered records, if the store buffers.
    async fn commit(&mut self) -> Result<(), StoreError> {
        Ok(())
    }
}

/// In-memory records.
#[derive(Debug, Default)]
pub struct LocalRecordStore {
    records: Vec<SubmissionHandle>,
}

impl LocalRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[async_trait]
impl RecordStore for LocalRecordStore {
    async fn add_record(&mut self, handle: SubmissionHandle) -> Result<(), StoreError> {
        self.records.push(handle);
        Ok(())
    }

    async fn get_records(&self) -> Result<Vec<SubmissionHandle>, StoreError> {
        Ok(self.records.clone())
    }
}

/// Records persisted as a JSON array, rewritten on every append.
#[derive(Debug)]
pub struct FileRecordStore {
    path: PathBuf,
    records: Vec<SubmissionHandle>,
}

impl FileRecordStore {
    /// Open `path`, loading records already in it.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let records = match read_optional(&path).await? {
            Some(contents) if !contents.trim().is_empty() => serde_json::from_str(&contents)
                .map_err(|source| StoreError::Json {
                    path: path.clone(),
                    source,
                })?,
            _ => Vec::new(),
        };
        debug!(path = %path.display(), records = records.len(), "record store opened");
        Ok(Self { path, records })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn persist(&self) -> Result<(), StoreError> {
        let json = serde_json::to_vec_pretty(&self.records).map_err(|source| StoreError::Json {
            path: self.path.clone(),
            source,
        })?;
        write_atomic(&self.path, &json).await
    }
}

#[async_trait]
impl RecordStore for FileRecordStore {
    async fn add_record(&mut self, handle: SubmissionHandle) -> Result<(), StoreError> {
        self.records.push(handle);
        if let Err(e) = self.persist().await {
            self.records.pop();
            return Err(e);
        }
        Ok(())
    }

    async fn get_records(&self) -> Result<Vec<SubmissionHandle>, StoreError> {
        Ok(self.records.clone())
    }

    async fn commit(&mut self) -> Result<(), StoreError> {
        self.persist().await
    }
}

/// Records kept by the data service under this worker's id.
#[derive(Debug, Clone)]
pub struct RemoteRecordStore {
    remote: RemoteService,
}

impl RemoteRecordStore {
    pub fn new(remote: RemoteService) -> Self {
        Self { remote }
    }
}

#[async_trait]
impl RecordStore for RemoteRecordStore {
    async fn add_record(&mut self, handle: SubmissionHandle) -> Result<(), StoreError> {
        self.remote.post("/transaction-id", &handle).await?;
        Ok(())
    }

    async fn get_records(&self) -> Result<Vec<SubmissionHandle>, StoreError> {
        Ok(self.remote.get("/transaction-ids").await?)
    }

    async fn commit(&mut self) -> Result<(), StoreError> {
        self.remote.post("/transaction-ids/commit", &json!({})).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_local_records_snapshot() {
        let mut store = LocalRecordStore::new();
        store.add_record(SubmissionHandle::new("h1")).await.unwrap();
        store.add_record(SubmissionHandle::new("h2")).await.unwrap();

        let first = store.get_records().await.unwrap();
        let second = store.get_records().await.unwrap();
        assert_eq!(first, second);
        assert_eq!(store.len(), 2);
    }

    #[tokio::test]
    async fn test_file_records_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run-ids.json");

        let mut store = FileRecordStore::open(&path).await.unwrap();
        store.add_record(SubmissionHandle::new("h1")).await.unwrap();
        store.add_record(SubmissionHandle::new("h2")).await.unwrap();
        drop(store);

        let mut reopened = FileRecordStore::open(&path).await.unwrap();
        reopened.add_record(SubmissionHandle::new("h3")).await.unwrap();
        let hashes: Vec<String> = reopened
            .get_records()
            .await
            .unwrap()
            .into_iter()
            .map(|h| h.hash)
            .collect();
        assert_eq!(hashes, ["h1", "h2", "h3"]);
    }

    #[tokio::test]
    async fn test_file_records_reject_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, "not json").unwrap();
        assert!(matches!(
            FileRecordStore::open(&path).await,
            Err(StoreError::Json { .. })
        ));
    }
}
