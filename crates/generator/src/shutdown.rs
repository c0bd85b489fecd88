use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Exit code used when a second interrupt forces the process down.
pub const FORCED_EXIT_CODE: i32 = 2;

/// Install a Ctrl-C handler.
///
/// The first interrupt cancels the returned token so the send loop can stop
/// at the next tick and flush its records. A second interrupt exits the
/// process immediately.
pub fn install_interrupt_handler() -> CancellationToken {
    let token = CancellationToken::new();
    let token_clone = token.clone();

    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for interrupts");
            return;
        }
        info!("caught interrupt, stopping after the current tick");
        token_clone.cancel();

        if tokio::signal::ctrl_c().await.is_ok() {
            info!("caught second interrupt, forcing exit");
            std::process::exit(FORCED_EXIT_CODE);
        }
    });

    token
}
