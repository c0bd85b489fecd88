//! Loading jobs, accounts and nodes for the coordinator services.
//!
//! Jobs come from a JSON or TOML file holding one job, a list of jobs, or a
//! `[[job]]` table array. Accounts and nodes come from JSON arrays or from
//! newline-separated lists; accounts may also be `{"privateKey": ...}`
//! objects.

use crate::session::{CoordinatorSession, SessionError};
use fleetload_types::{Endpoint, Identity, JobConfiguration};
use serde::Deserialize;
use serde_json::Value;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors that can occur while loading coordinator configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid TOML: {0}")]
    Toml(#[from] toml::de::Error),

    /// An element of an accounts or nodes list has the wrong shape.
    #[error("invalid {list} entry at index {index}: {reason}")]
    InvalidEntry {
        list: &'static str,
        index: usize,
        reason: String,
    },

    #[error("invalid job configuration: {0}")]
    InvalidJobs(String),

    #[error(transparent)]
    Session(#[from] SessionError),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum JobsDocument {
    Table {
        #[serde(alias = "jobs")]
        job: Vec<JobConfiguration>,
    },
    Many(Vec<JobConfiguration>),
    Single(JobConfiguration),
}

impl From<JobsDocument> for Vec<JobConfiguration> {
    fn from(document: JobsDocument) -> Self {
        match document {
            JobsDocument::Table { job } => job,
            JobsDocument::Many(jobs) => jobs,
            JobsDocument::Single(job) => vec![job],
        }
    }
}

fn validate_jobs(jobs: Vec<JobConfiguration>) -> Result<Vec<JobConfiguration>, ConfigError> {
    if jobs.is_empty() {
        return Err(ConfigError::InvalidJobs("no jobs configured".into()));
    }
    if let Some(index) = jobs.iter().position(|job| job.name.trim().is_empty()) {
        return Err(ConfigError::InvalidJobs(format!(
            "job at index {index} has an empty name"
        )));
    }
    Ok(jobs)
}

/// Parse jobs from a JSON document.
pub fn parse_jobs_json(text: &str) -> Result<Vec<JobConfiguration>, ConfigError> {
    let document: JobsDocument = serde_json::from_str(text)?;
    validate_jobs(document.into())
}

/// Parse jobs from a TOML document.
pub fn parse_jobs_toml(text: &str) -> Result<Vec<JobConfiguration>, ConfigError> {
    let document: JobsDocument = toml::from_str(text)?;
    validate_jobs(document.into())
}

/// Load jobs from `path`; `.toml` files are TOML, everything else JSON.
pub fn load_jobs(path: &Path) -> Result<Vec<JobConfiguration>, ConfigError> {
    let text = read(path)?;
    if path.extension().is_some_and(|ext| ext == "toml") {
        parse_jobs_toml(&text)
    } else {
        parse_jobs_json(&text)
    }
}

/// Parse an accounts list: strings or `{"privateKey": string}` objects.
pub fn parse_accounts(value: &Value) -> Result<Vec<Identity>, ConfigError> {
    let entries = as_list(value, "accounts")?;
    entries
        .iter()
        .enumerate()
        .map(|(index, entry)| {
            let key = match entry {
                Value::String(key) => Some(key.as_str()),
                Value::Object(object) => object.get("privateKey").and_then(Value::as_str),
                _ => None,
            };
            key.filter(|key| !key.is_empty())
                .map(Identity::from)
                .ok_or_else(|| ConfigError::InvalidEntry {
                    list: "accounts",
                    index,
                    reason: "expected a key string or an object with a privateKey".into(),
                })
        })
        .collect()
}

/// Parse a nodes list: an array of endpoint strings.
pub fn parse_nodes(value: &Value) -> Result<Vec<Endpoint>, ConfigError> {
    let entries = as_list(value, "nodes")?;
    entries
        .iter()
        .enumerate()
        .map(|(index, entry)| match entry {
            Value::String(url) if !url.is_empty() => Ok(Endpoint::new(url.as_str())),
            _ => Err(ConfigError::InvalidEntry {
                list: "nodes",
                index,
                reason: "expected an endpoint string".into(),
            }),
        })
        .collect()
}

/// Read a list file as JSON.
///
/// Files starting with `[` are parsed as JSON arrays; anything else is read
/// one entry per line, skipping blank lines and `#` comments.
pub fn read_list(path: &Path) -> Result<Value, ConfigError> {
    parse_list(&read(path)?)
}

fn parse_list(text: &str) -> Result<Value, ConfigError> {
    if text.trim_start().starts_with('[') {
        return Ok(serde_json::from_str(text)?);
    }
    Ok(Value::Array(
        text.lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .map(|line| Value::String(line.to_string()))
            .collect(),
    ))
}

pub fn load_accounts(path: &Path) -> Result<Vec<Identity>, ConfigError> {
    parse_accounts(&read_list(path)?)
}

pub fn load_nodes(path: &Path) -> Result<Vec<Endpoint>, ConfigError> {
    parse_nodes(&read_list(path)?)
}

fn as_list<'a>(value: &'a Value, list: &'static str) -> Result<&'a Vec<Value>, ConfigError> {
    value.as_array().ok_or(ConfigError::InvalidEntry {
        list,
        index: 0,
        reason: "expected an array".into(),
    })
}

fn read(path: &Path) -> Result<String, ConfigError> {
    std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Everything a coordinator session is built from.
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    pub listen: SocketAddr,
    pub jobs: Vec<JobConfiguration>,
    pub accounts: Vec<Identity>,
    pub nodes: Vec<Endpoint>,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            listen: SocketAddr::from(([0, 0, 0, 0], 3000)),
            jobs: Vec::new(),
            accounts: Vec::new(),
            nodes: Vec::new(),
        }
    }
}

impl CoordinatorConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_listen(mut self, listen: SocketAddr) -> Self {
        self.listen = listen;
        self
    }

    pub fn with_jobs(mut self, jobs: Vec<JobConfiguration>) -> Self {
        self.jobs = jobs;
        self
    }

    pub fn with_accounts(mut self, accounts: Vec<Identity>) -> Self {
        self.accounts = accounts;
        self
    }

    pub fn with_nodes(mut self, nodes: Vec<Endpoint>) -> Self {
        self.nodes = nodes;
        self
    }

    /// Load jobs, accounts and nodes from their files.
    pub fn from_files(jobs: &Path, accounts: &Path, nodes: &Path) -> Result<Self, ConfigError> {
        Ok(Self::new()
            .with_jobs(load_jobs(jobs)?)
            .with_accounts(load_accounts(accounts)?)
            .with_nodes(load_nodes(nodes)?))
    }

    /// Start a session over this configuration.
    pub fn session(&self) -> Result<CoordinatorSession, ConfigError> {
        let jobs = validate_jobs(self.jobs.clone())?;
        Ok(CoordinatorSession::new(
            jobs,
            self.accounts.clone(),
            self.nodes.clone(),
        )?)
    }
}
