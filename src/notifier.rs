//! Notification collaborator seam and the pipeline-to-notifier bridge.
//!
//! The pipeline thread is synchronous; notification transports are
//! I/O-bound and async. The bridge hands confirmed alerts across that
//! boundary as fire-and-forget task submissions onto the notifier's own
//! single-threaded runtime, so delivery latency can never stall frame
//! processing. An unbound bridge (notifier loop not up yet) degrades to a
//! logged no-op.

use crate::frame::Frame;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::runtime::Handle;
use tracing::{info, warn};

/// Errors surfaced by notification delivery or runtime setup.
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("Notifier runtime failed: {0}")]
    Runtime(String),

    #[error("Delivery failed: {0}")]
    Delivery(String),
}

/// Chat-notification capability consumed by the core.
///
/// Implementations run on the notifier runtime and are best-effort; the
/// pipeline never observes their outcome.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send_text(&self, message: &str) -> Result<(), NotifyError>;

    async fn send_alert(&self, message: &str, frame: &Frame) -> Result<(), NotifyError>;
}

/// Notifier that logs each delivery instead of talking to a chat service.
///
/// Keeps the recipient-iteration shape of a real transport (one send per
/// recipient, small delay between sends) so swapping in a live backend is a
/// drop-in change.
pub struct LogNotifier {
    recipients: Vec<String>,
    send_delay: Duration,
}

impl LogNotifier {
    pub fn new(recipients: Vec<String>, send_delay: Duration) -> Self {
        Self {
            recipients,
            send_delay,
        }
    }
}

#[async_trait]
impl Notifier for LogNotifier {
    async fn send_text(&self, message: &str) -> Result<(), NotifyError> {
        for recipient in &self.recipients {
            info!(recipient = %recipient, message, "Alert text delivered");
            tokio::time::sleep(self.send_delay).await;
        }
        Ok(())
    }

    async fn send_alert(&self, message: &str, frame: &Frame) -> Result<(), NotifyError> {
        self.send_text(message).await?;
        for recipient in &self.recipients {
            info!(
                recipient = %recipient,
                width = frame.width(),
                height = frame.height(),
                "Alert snapshot delivered"
            );
            tokio::time::sleep(self.send_delay).await;
        }
        Ok(())
    }
}

struct BridgeInner {
    handle: Handle,
    notifier: Arc<dyn Notifier>,
}

/// Thread-safe handoff from the pipeline thread to the notifier runtime.
#[derive(Clone, Default)]
pub struct NotifierBridge {
    inner: Arc<RwLock<Option<BridgeInner>>>,
}

impl NotifierBridge {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach the notifier and the runtime its deliveries run on.
    pub fn bind(&self, handle: Handle, notifier: Arc<dyn Notifier>) {
        *self.inner.write() = Some(BridgeInner { handle, notifier });
    }

    pub fn is_bound(&self) -> bool {
        self.inner.read().is_some()
    }

    /// Submit an alert for asynchronous delivery and return immediately.
    ///
    /// Safe to call from any thread. If no notifier is bound yet the alert
    /// is dropped with a warning; the pipeline must not fail over it.
    pub fn notify(&self, message: &str, frame: Arc<Frame>) {
        let (handle, notifier) = {
            let guard = self.inner.read();
            match guard.as_ref() {
                Some(inner) => (inner.handle.clone(), inner.notifier.clone()),
                None => {
                    warn!("Notifier not ready, dropping alert notification");
                    return;
                }
            }
        };

        let message = message.to_string();
        handle.spawn(async move {
            if let Err(e) = notifier.send_alert(&message, &frame).await {
                warn!(error = %e, "Alert notification delivery failed");
            }
        });
    }
}

/// Dedicated single-threaded runtime for notification I/O.
///
/// Owns its thread; dropping the shutdown handle ends the loop. Tasks are
/// submitted from foreign threads through the runtime [`Handle`].
pub struct NotifierRuntime {
    handle: Handle,
    shutdown: Option<tokio::sync::oneshot::Sender<()>>,
    thread: Option<std::thread::JoinHandle<()>>,
}

impl NotifierRuntime {
    /// Spawn the runtime thread and wait until its handle is available.
    pub fn spawn() -> Result<Self, NotifyError> {
        let (handle_tx, handle_rx) = std::sync::mpsc::channel();
        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();

        let thread = std::thread::Builder::new()
            .name("notifier".to_string())
            .spawn(move || {
                let runtime = match tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                {
                    Ok(rt) => rt,
                    Err(e) => {
                        let _ = handle_tx.send(Err(NotifyError::Runtime(e.to_string())));
                        return;
                    }
                };

                let _ = handle_tx.send(Ok(runtime.handle().clone()));

                // Park on the shutdown signal; submitted delivery tasks run
                // on this thread in the meantime.
                runtime.block_on(async {
                    let _ = shutdown_rx.await;
                });
            })
            .map_err(|e| NotifyError::Runtime(e.to_string()))?;

        let handle = handle_rx
            .recv()
            .map_err(|_| NotifyError::Runtime("Runtime thread exited during setup".to_string()))??;

        Ok(Self {
            handle,
            shutdown: Some(shutdown_tx),
            thread: Some(thread),
        })
    }

    /// Handle for submitting delivery tasks onto this runtime.
    pub fn handle(&self) -> Handle {
        self.handle.clone()
    }

    /// Stop the runtime and join its thread. In-flight deliveries are
    /// abandoned; alerts are best-effort by design.
    pub fn shutdown(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}
