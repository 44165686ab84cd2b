//! Control-session establishment and recovery.

use std::{
    sync::{Arc, RwLock},
    time::{Duration, Instant},
};

use async_trait::async_trait;
use mirror_types::{
    config::{DeviceConfig, SessionConfig},
    Result,
};
use tokio::{sync::Mutex, time::sleep};
use tracing::{debug, info, warn};

use crate::{DeviceApi, Session, SessionProvider};

/// Serializes session attachment and holds the active handle.
///
/// Attachment waits for a manual unlock and never targets the home screen
/// process by bundle id.
pub struct SessionManager<A> {
    api: A,
    target_bundle: Option<String>,
    home_bundle: String,
    config: SessionConfig,
    gate: Mutex<()>,
    current: RwLock<Option<Arc<Session>>>,
}

impl<A: DeviceApi> SessionManager<A> {
    pub fn new(api: A, device: &DeviceConfig, config: SessionConfig) -> Self {
        Self {
            api,
            target_bundle: device.target_bundle.clone(),
            home_bundle: device.home_bundle.clone(),
            config,
            gate: Mutex::new(()),
            current: RwLock::new(None),
        }
    }

    pub fn api(&self) -> &A {
        &self.api
    }

    pub async fn ensure_session(&self) -> Result<Arc<Session>> {
        let _guard = self.gate.lock().await;
        self.establish().await
    }

    async fn establish(&self) -> Result<Arc<Session>> {
        if !self.wait_until_unlocked().await {
            warn!("device still locked after waiting; attaching a session anyway");
        }

        let target = self.resolve_target().await;
        let session = match self.attach(target.as_deref()).await {
            Ok(session) => session,
            Err(err) => {
                warn!(error = %err, "session attach failed; retrying with the default session");
                sleep(Duration::from_millis(self.config.attach_retry_delay_ms)).await;
                self.api.create_session(None).await?
            }
        };

        let session = Arc::new(session);
        self.replace_current(session.clone());
        info!(
            session_id = %session.id,
            bundle = session.bundle_id.as_deref().unwrap_or("(frontmost)"),
            "control session ready"
        );
        Ok(session)
    }

    fn replace_current(&self, session: Arc<Session>) {
        let mut guard = match self.current.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *guard = Some(session);
    }

    /// Polls the lock state until unlocked or the wait budget runs out.
    /// A failed lock query counts as unlocked.
    async fn wait_until_unlocked(&self) -> bool {
        let started = Instant::now();
        let timeout = Duration::from_millis(self.config.unlock_timeout_ms);
        let poll = Duration::from_millis(self.config.unlock_poll_ms);
        let mut hinted = false;

        while started.elapsed() < timeout {
            if !self.locked().await {
                return true;
            }
            if !hinted {
                warn!("device is locked; unlock it with Face ID, Touch ID or the passcode to continue");
                hinted = true;
            }
            sleep(poll).await;
        }
        !self.locked().await
    }

    async fn locked(&self) -> bool {
        match self.api.is_locked().await {
            Ok(locked) => locked,
            Err(err) => {
                debug!(error = %err, "lock state unavailable; assuming unlocked");
                false
            }
        }
    }

    async fn resolve_target(&self) -> Option<String> {
        if let Some(bundle) = &self.target_bundle {
            return Some(bundle.clone());
        }
        match self.api.active_app().await {
            Ok(app) => app.bundle_id,
            Err(err) => {
                debug!(error = %err, "active app lookup failed");
                None
            }
        }
    }

    async fn attach(&self, target: Option<&str>) -> Result<Session> {
        match target {
            Some(bundle) if bundle != self.home_bundle => {
                info!(bundle, "attaching session");
                self.api.create_session(Some(bundle)).await
            }
            _ => {
                info!("attaching session to the frontmost app");
                self.api.create_session(None).await
            }
        }
    }
}

#[async_trait]
impl<A: DeviceApi> SessionProvider for SessionManager<A> {
    fn current(&self) -> Option<Arc<Session>> {
        match self.current.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    async fn refresh(&self, stale: Option<&Session>) -> Result<Arc<Session>> {
        let _guard = self.gate.lock().await;
        if let (Some(stale), Some(current)) = (stale, self.current()) {
            if current.id != stale.id {
                debug!(session_id = %current.id, "session already refreshed");
                return Ok(current);
            }
        }
        self.establish().await
    }
}
