//! Coordination services for a fleet of load-generating workers.
//!
//! The coordinator hands each worker an identity, a starting endpoint and a
//! job, then synchronizes the fleet at two barriers: every worker reports
//! ready before anyone sends, and every worker reports done before the run
//! is complete. Workers claim work units of their job one at a time.
//!
//! The data service is a separate surface backing the remote stores of the
//! generator: node list, identity pool, templates and submission records.

pub mod config;
pub mod data;
pub mod server;
pub mod session;
pub mod shutdown;

pub use config::{
    load_accounts, load_jobs, load_nodes, parse_accounts, parse_nodes, read_list, ConfigError,
    CoordinatorConfig,
};
pub use data::{DataService, DataServiceConfig};
pub use server::{router, serve, ApiError, CallerId};
pub use session::{CoordinatorSession, Phase, SessionError, SessionStatus};
pub use shutdown::install_shutdown_handler;
