//! # Shutdown requests.
//!
//! A graceful shutdown is requested either programmatically (the runtime's shutdown
//! token) or, when `Config::handle_os_signals` is set, by a termination signal:
//!
//! - **Unix**: `SIGINT` (Ctrl-C), `SIGTERM`, `SIGQUIT`
//! - **Other platforms**: Ctrl-C via [`tokio::signal::ctrl_c`]
//!
//! If signal listeners cannot be registered the runtime falls back to the token alone.

use tokio_util::sync::CancellationToken;

/// Completes when `token` is cancelled or (with `os_signals`) a termination signal arrives.
pub(crate) async fn requested(token: &CancellationToken, os_signals: bool) {
    if !os_signals {
        token.cancelled().await;
        return;
    }
    tokio::select! {
        _ = token.cancelled() => {}
        res = wait_for_signal() => {
            if let Err(e) = res {
                eprintln!("[rtvisor] signal handlers unavailable: {e}");
                token.cancelled().await;
            }
        }
    }
}

#[cfg(unix)]
async fn wait_for_signal() -> std::io::Result<()> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigquit = signal(SignalKind::quit())?;

    tokio::select! {
        _ = sigint.recv() => {},
        _ = sigterm.recv() => {},
        _ = sigquit.recv() => {},
    }
    Ok(())
}

#[cfg(not(unix))]
async fn wait_for_signal() -> std::io::Result<()> {
    tokio::signal::ctrl_c().await
}
