//! Shared data model for fleetload.
//!
//! Types in this crate cross process boundaries: the coordinator hands out
//! [`WorkerAssignment`]s, workers persist [`TransactionTemplate`]s and
//! [`SubmissionHandle`]s between phases, and network collaborators report
//! [`NetworkError`]s classified for the retry policy.

mod identifiers;
mod job;
mod network;
mod template;

pub use identifiers::{AccountId, Endpoint, Identity};
pub use job::{ErrorBody, InitResponse, JobConfiguration, WorkerAssignment, WORKER_ID_HEADER};
pub use network::{
    AccountState, InclusionStatus, NetworkError, SignedTransaction, StatusClass,
    SubmissionHandle,
};
pub use template::{TemplateError, TransactionTemplate, FEE_PAYER_POINTER};
