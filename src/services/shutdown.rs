use std::time::Duration;
use tokio::sync::watch;

/// Creates a linked trigger and signal.
pub fn channel() -> (ShutdownTrigger, Shutdown) {
    let (tx, rx) = watch::channel(false);
    (ShutdownTrigger { tx }, Shutdown { rx })
}

/// Signal that fires on Ctrl-C.
pub fn on_ctrl_c(process: &'static str) -> Shutdown {
    let (trigger, shutdown) = channel();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(process, error = %e, "Cannot listen for Ctrl-C, running until killed");
            // Dropping the trigger would stop the loops.
            std::future::pending::<()>().await;
        }
        tracing::info!(process, "Shutdown signal received, finishing current work");
        trigger.trigger();
    });
    shutdown
}

/// Asks worker loops to stop.
pub struct ShutdownTrigger {
    tx: watch::Sender<bool>,
}

impl ShutdownTrigger {
    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }
}

/// Stop signal observed by worker loops between messages.
///
/// A dropped trigger counts as a stop request.
#[derive(Clone)]
pub struct Shutdown {
    rx: watch::Receiver<bool>,
}

impl Shutdown {
    pub fn is_triggered(&self) -> bool {
        *self.rx.borrow() || self.rx.has_changed().is_err()
    }

    /// Waits for `duration` or until stop is requested, whichever comes first.
    /// Returns whether stop was requested.
    pub async fn sleep(&mut self, duration: Duration) -> bool {
        if self.is_triggered() {
            return true;
        }
        tokio::select! {
            _ = tokio::time::sleep(duration) => {}
            _ = self.rx.wait_for(|stop| *stop) => {}
        }
        self.is_triggered()
    }
}
