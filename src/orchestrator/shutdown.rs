//! # OS signals that end an orchestration session.
//!
//! **Unix:** `SIGINT`, `SIGTERM`, `SIGQUIT`, Ctrl-C. **Windows:** Ctrl-C.

/// Completes when the process receives a termination signal and names it.
///
/// Returns `Err` if a listener cannot be registered.
#[cfg(unix)]
pub async fn wait_for_shutdown_signal() -> std::io::Result<&'static str> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut interrupt = signal(SignalKind::interrupt())?;
    let mut terminate = signal(SignalKind::terminate())?;
    let mut quit = signal(SignalKind::quit())?;

    let name = tokio::select! {
        res = tokio::signal::ctrl_c() => { res?; "ctrl_c" }
        _ = interrupt.recv() => "SIGINT",
        _ = terminate.recv() => "SIGTERM",
        _ = quit.recv() => "SIGQUIT",
    };
    Ok(name)
}

#[cfg(not(unix))]
pub async fn wait_for_shutdown_signal() -> std::io::Result<&'static str> {
    tokio::signal::ctrl_c().await?;
    Ok("ctrl_c")
}
