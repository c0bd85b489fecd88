//! Transaction load generator.
//!
//! Drives controlled load against a transaction-processing network. The
//! engine builds a re-signable template per identity, signs and submits
//! instances of it with fresh sequence numbers, and tracks inclusion of
//! everything it sent.
//!
//! # Features
//!
//! - **Pluggable loads**: transaction content comes from a [`LoadDescriptor`]
//!   looked up by name in a [`LoadRegistry`]
//! - **Pacing**: count, duration or open-ended sending with packs per tick
//! - **Endpoint rotation**: per tick, and on transport failures
//! - **Resumable phases**: templates and records live in local, file or
//!   remote stores, so generate, send and wait can run separately
//! - **Coordination**: workers take assignments from the coordinator and
//!   meet at ready and done barriers
//!
//! # Example
//!
//! ```no_run
//! use fleetload_generator::{
//!     EndpointPool, GeneratorConfig, HttpAuthor, HttpNetwork, LoadGenerator, LoadRegistry,
//!     LocalRecordStore, LocalTemplateStore, SendConfig,
//! };
//! use fleetload_types::{Endpoint, Identity};
//! use serde_json::json;
//! use std::sync::Arc;
//! use std::time::Duration;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = GeneratorConfig::default();
//! let network = Arc::new(HttpNetwork::new(config.request_timeout)?);
//! let author = Arc::new(HttpAuthor::new(config.request_timeout)?);
//! let pool = EndpointPool::single(Endpoint::from("http://localhost:8080"));
//! let mut generator = LoadGenerator::new(network, author, pool, config);
//!
//! let registry = LoadRegistry::with_builtin_loads();
//! let load = registry.create("transfer", &json!({"receivers": ["B62qreceiver"]}))?;
//!
//! let mut templates = LocalTemplateStore::new();
//! let mut records = LocalRecordStore::new();
//! generator
//!     .generate(load.as_ref(), &mut templates, &Identity::from("EKE..."))
//!     .await?;
//!
//! let send = SendConfig::duration(Duration::from_secs(60)).with_interval(Duration::from_secs(1));
//! let report = generator
//!     .send_all(&mut templates, &mut records, &send, &CancellationToken::new())
//!     .await?;
//! report.print();
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod config;
pub mod endpoints;
pub mod error;
pub mod generator;
pub mod identities;
pub mod loads;
pub mod network;
pub mod remote;
pub mod report;
pub mod shutdown;
pub mod store;
pub mod worker;

pub use client::CoordinatorClient;
pub use config::{GeneratorConfig, SendConfig, StopPolicy, WaitConfig};
pub use endpoints::{fetch_remote_endpoints, EndpointPool, RotationPolicy};
pub use error::{GeneratorError, StoreError};
pub use generator::LoadGenerator;
pub use identities::{IdentitySource, IdentityValidation, RemoteIdentities, StaticIdentities};
pub use loads::{LoadDescriptor, LoadRegistry, TransactionData};
pub use network::{HttpAuthor, HttpNetwork, Network, TransactionAuthor};
pub use remote::{RemoteError, RemoteService};
pub use report::{SendReport, WaitReport};
pub use store::{
    FileRecordStore, FileTemplateStore, LocalRecordStore, LocalTemplateStore, RecordStore,
    RemoteRecordStore, RemoteTemplateStore, TemplateStore,
};
pub use worker::{run_worker, WorkerError, WorkerOptions, WorkerSummary};
