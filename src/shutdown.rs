use tokio::sync::broadcast;

pub type ShutdownSender = broadcast::Sender<()>;
pub type ShutdownReceiver = broadcast::Receiver<()>;

#[must_use]
pub fn shutdown_channel() -> (ShutdownSender, ShutdownReceiver) {
    // One buffered notification is enough: receivers only care that
    // shutdown happened, not how many times it was requested.
    broadcast::channel(1)
}

/// Relays Ctrl-C (plus SIGTERM on unix) into the shutdown channel. The task
/// retires on its own once anything else broadcasts shutdown first.
pub fn setup_signal_shutdown_handler(shutdown_tx: &ShutdownSender) -> tokio::task::JoinHandle<()> {
    let shutdown_tx = shutdown_tx.clone();
    tokio::spawn(async move {
        let mut shutdown_rx = shutdown_tx.subscribe();
        tokio::select! {
            _ = shutdown_rx.recv() => {}
            () = wait_for_termination_signal() => {
                drop(shutdown_tx.send(()));
            }
        }
    })
}

#[cfg(unix)]
async fn wait_for_termination_signal() {
    use tokio::signal::unix::{SignalKind, signal};
    use tracing::warn;

    match signal(SignalKind::terminate()) {
        Ok(mut term) => {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = term.recv() => {}
            }
        }
        Err(err) => {
            warn!("SIGTERM handler unavailable ({}); watching Ctrl-C only", err);
            drop(tokio::signal::ctrl_c().await);
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_termination_signal() {
    drop(tokio::signal::ctrl_c().await);
}
