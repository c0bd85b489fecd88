//! Template and record storage shared between the workflow phases.
//!
//! The generate phase writes templates, the send phase reads them and
//! appends submission handles, and the wait phase reads the handles back.
//! Each store comes in a local (in-memory), file and remote (data service)
//! flavour so the phases can run in one process, across processes, or
//! across machines.

mod records;
mod templates;

pub use records::{FileRecordStore, LocalRecordStore, RecordStore, RemoteRecordStore};
pub use templates::{FileTemplateStore, LocalTemplateStore, RemoteTemplateStore, TemplateStore};

use crate::error::StoreError;
use std::path::{Path, PathBuf};

/// Replace `path` with `contents` through a temp file and a rename.
pub(crate) async fn write_atomic(path: &Path, contents: &[u8]) -> Result<(), StoreError> {
    let tmp = temp_path(path);
    tokio::fs::write(&tmp, contents)
        .await
        .map_err(|source| StoreError::Io {
            path: tmp.clone(),
            source,
        })?;
    tokio::fs::rename(&tmp, path)
        .await
        .map_err(|source| StoreError::Io {
            path: path.to_path_buf(),
            source,
        })
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Read `path`, or `None` if it does not exist.
pub(crate) async fn read_optional(path: &Path) -> Result<Option<String>, StoreError> {
    match tokio::fs::read_to_string(path).await {
        Ok(contents) => Ok(Some(contents)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(source) => Err(StoreError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}
