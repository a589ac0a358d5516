//! Graceful shutdown on signals
//!
//! The first SIGINT, SIGTERM or SIGHUP cancels the shared token so running
//! transfers stop at their next suspension point. A watchdog then exits the
//! process with the interrupted code if work has not wound down within the
//! grace period; a second Ctrl+C exits immediately.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::exit_code::ExitCode;

/// Spawn signal listeners that cancel `token`
pub fn install(token: CancellationToken, grace: Duration) {
    let hits = Arc::new(AtomicUsize::new(0));
    {
        let token = token.clone();
        tokio::spawn(async move {
            while tokio::signal::ctrl_c().await.is_ok() {
                if hits.fetch_add(1, Ordering::Relaxed) == 0 {
                    eprintln!("Interrupted, stopping (press Ctrl+C again to force)");
                    token.cancel();
                } else {
                    std::process::exit(ExitCode::Interrupted.as_i32());
                }
            }
        });
    }

    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        for kind in [SignalKind::terminate(), SignalKind::hangup()] {
            let token = token.clone();
            tokio::spawn(async move {
                if let Ok(mut stream) = signal(kind) {
                    stream.recv().await;
                    tracing::debug!("Termination signal received");
                    token.cancel();
                }
            });
        }
    }

    tokio::spawn(async move {
        token.cancelled().await;
        tokio::time::sleep(grace).await;
        eprintln!("Shutdown grace period elapsed, exiting");
        std::process::exit(ExitCode::Interrupted.as_i32());
    });
}
