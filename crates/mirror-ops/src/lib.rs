//! Operational helpers: logging and cooperative shutdown.

use std::{sync::Arc, time::Duration};

use mirror_types::{config::OpsConfig, MirrorError, Result};
use tokio::sync::watch;
use tracing::debug;
use tracing_subscriber::{fmt, EnvFilter};

pub fn init_tracing(config: &OpsConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.log_level.clone()))
        .or_else(|_| EnvFilter::try_new("info"))
        .map_err(|err| MirrorError::Ops(format!("failed to create log filter: {err}")))?;

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init()
        .map_err(|err| MirrorError::Ops(format!("tracing init error: {err}")))?;
    Ok(())
}

/// Process-wide stop flag shared by the acquisition and dispatch units.
#[derive(Clone, Debug)]
pub struct StopSignal {
    tx: Arc<watch::Sender<bool>>,
}

impl Default for StopSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl StopSignal {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    pub fn stop(&self) {
        if !self.tx.send_replace(true) {
            debug!("stop signal raised");
        }
    }

    pub fn is_stopped(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolves once `stop` has been called.
    pub async fn stopped(&self) {
        let mut rx = self.tx.subscribe();
        let _ = rx.wait_for(|stopped| *stopped).await;
    }

    /// Sleeps for `duration`; returns `false` if woken early by a stop.
    pub async fn sleep(&self, duration: Duration) -> bool {
        tokio::select! {
            _ = self.stopped() => false,
            _ = tokio::time::sleep(duration) => !self.is_stopped(),
        }
    }
}
