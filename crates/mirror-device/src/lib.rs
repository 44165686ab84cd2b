//! WebDriverAgent client and control-session management.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mirror_types::{geometry::DeviceSize, MirrorError, Result};
use serde::{Deserialize, Serialize};

pub mod actions;
pub mod session;
pub mod wda;

pub use session::SessionManager;
pub use wda::WdaClient;

/// Opaque handle to a control session on the device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    /// Bundle the session was attached to; `None` for the frontmost app.
    pub bundle_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Session {
    pub fn new(id: impl Into<String>, bundle_id: Option<String>) -> Self {
        Self {
            id: id.into(),
            bundle_id,
            created_at: Utc::now(),
        }
    }
}

/// Foreground application as reported by the automation service.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppInfo {
    #[serde(rename = "bundleId")]
    pub bundle_id: Option<String>,
    pub name: Option<String>,
    pub pid: Option<i64>,
}

/// Device-level queries needed to establish a session.
#[async_trait]
pub trait DeviceApi: Send + Sync {
    async fn status(&self) -> Result<serde_json::Value>;
    async fn is_locked(&self) -> Result<bool>;
    async fn active_app(&self) -> Result<AppInfo>;
    async fn create_session(&self, bundle_id: Option<&str>) -> Result<Session>;
    async fn window_size(&self, session: &Session) -> Result<DeviceSize>;
}

/// Shared access to the active session for dispatch workers.
#[async_trait]
pub trait SessionProvider: Send + Sync {
    fn current(&self) -> Option<Arc<Session>>;

    /// Replaces the session. A `stale` handle that was already replaced by a
    /// concurrent refresh returns the newer session without re-attaching.
    async fn refresh(&self, stale: Option<&Session>) -> Result<Arc<Session>>;
}

pub fn device_error(message: impl Into<String>) -> MirrorError {
    MirrorError::Device(message.into())
}

pub fn session_error(message: impl Into<String>) -> MirrorError {
    MirrorError::Session(message.into())
}
