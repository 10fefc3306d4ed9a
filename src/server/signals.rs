//! Process signal handling.
//!
//! SIGHUP reloads the runtime-adjustable configuration, SIGUSR1 and
//! SIGUSR2 dump the current configuration to the log, and
//! SIGINT/SIGQUIT/SIGTERM end the process immediately, abandoning
//! in-flight tunnels.

use std::io;
use std::sync::Arc;

use log::{error, info};

use super::Server;

/// Watch the reload and dump signals for the lifetime of the process.
#[cfg(unix)]
pub(crate) async fn run_signal_loop(server: Arc<Server>) -> io::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut hangup = signal(SignalKind::hangup())?;
    let mut user1 = signal(SignalKind::user_defined1())?;
    let mut user2 = signal(SignalKind::user_defined2())?;

    loop {
        tokio::select! {
            _ = hangup.recv() => {
                info!("SIGHUP received, reloading configuration");
                if let Err(e) = server.reload() {
                    error!("configuration reload failed, keeping previous values: {}", e);
                }
            }
            _ = user1.recv() => {
                info!("current configuration:\n{}", server.dump_config());
            }
            _ = user2.recv() => {
                info!("current configuration:\n{}", server.dump_config());
            }
        }
    }
}

#[cfg(not(unix))]
pub(crate) async fn run_signal_loop(_server: Arc<Server>) -> io::Result<()> {
    std::future::pending::<()>().await;
    Ok(())
}

/// Resolves when a termination signal arrives.
#[cfg(unix)]
pub async fn shutdown_signal() -> io::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut interrupt = signal(SignalKind::interrupt())?;
    let mut quit = signal(SignalKind::quit())?;
    let mut terminate = signal(SignalKind::terminate())?;

    tokio::select! {
        _ = interrupt.recv() => info!("SIGINT received"),
        _ = quit.recv() => info!("SIGQUIT received"),
        _ = terminate.recv() => info!("SIGTERM received"),
    }
    Ok(())
}

#[cfg(not(unix))]
pub async fn shutdown_signal() -> io::Result<()> {
    tokio::signal::ctrl_c().await?;
    info!("interrupt received");
    Ok(())
}
