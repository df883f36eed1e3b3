//! # Process shutdown.
//!
//! [`wait_for_shutdown_signal`] completes when the process receives a termination
//! signal; [`run_until_shutdown`] ties it to an agent and its connection.
//!
//! ## Signals
//! **Unix platforms:**
//! - `SIGINT` (Ctrl-C in terminal)
//! - `SIGTERM` (default kill signal, used by systemd/Kubernetes)
//! - `SIGQUIT` (quit signal, often used for core dumps or hard stop)
//!
//! **Windows platforms:**
//! - `Ctrl-C` via [`tokio::signal::ctrl_c`]

use super::lifecycle::AgentHandle;
use crate::error::AgentError;
use crate::transport::ConnectionRef;

/// Waits for a termination signal.
///
/// Each call creates independent signal listeners.
///
/// Returns `Ok(())` when any signal is received, or `Err` if signal registration fails.
#[cfg(unix)]
pub async fn wait_for_shutdown_signal() -> std::io::Result<()> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigquit = signal(SignalKind::quit())?;

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {},
        _ = sigint.recv()  => {},
        _ = sigterm.recv() => {},
        _ = sigquit.recv() => {},
    }
    Ok(())
}

/// Waits for a termination signal.
///
/// Each call creates independent signal listeners.
///
/// Returns `Ok(())` when any signal is received, or `Err` if signal registration fails.
#[cfg(not(unix))]
pub async fn wait_for_shutdown_signal() -> std::io::Result<()> {
    tokio::signal::ctrl_c().await
}

/// Runs `agent` until a termination signal arrives or the connection is lost.
///
/// Either way the agent is disposed exactly once, then `conn` is drained.
/// Connection loss is returned as [`AgentError::ConnectionLost`].
pub async fn run_until_shutdown(agent: AgentHandle, conn: ConnectionRef) -> Result<(), AgentError> {
    run_until(agent, conn, wait_for_shutdown_signal()).await
}

pub(crate) async fn run_until<S>(
    agent: AgentHandle,
    conn: ConnectionRef,
    signal: S,
) -> Result<(), AgentError>
where
    S: Future<Output = std::io::Result<()>>,
{
    let outcome = tokio::select! {
        res = signal => res.map_err(AgentError::from),
        _ = agent.connection_lost() => Err(AgentError::ConnectionLost {
            service: agent.identity().name().to_string(),
        }),
    };

    agent.dispose().await;
    if !conn.is_closed() {
        conn.drain().await?;
    }
    outcome
}
