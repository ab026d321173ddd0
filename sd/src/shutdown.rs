//! Signal handling for a clean stop between ticks

use tokio::signal::unix::{SignalKind, signal};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Install a handler that cancels the returned token on SIGTERM or SIGINT
///
/// The dispatcher checks the token only while it waits between ticks, so a
/// tick in progress always finishes.
pub fn install_shutdown_handler() -> CancellationToken {
    let token = CancellationToken::new();
    let token_clone = token.clone();

    tokio::spawn(async move {
        let (mut sigterm, mut sigint) = match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
            (Ok(term), Ok(int)) => (term, int),
            (Err(e), _) | (_, Err(e)) => {
                warn!(error = %e, "Failed to install signal handlers; only natural completion will stop the loop");
                return;
            }
        };

        tokio::select! {
            _ = sigterm.recv() => {
                info!("Received SIGTERM, stopping after the current tick");
            }
            _ = sigint.recv() => {
                info!("Received SIGINT, stopping after the current tick");
            }
        }

        token_clone.cancel();
    });

    token
}
