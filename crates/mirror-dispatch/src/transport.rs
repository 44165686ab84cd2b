use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use mirror_device::{Session, WdaClient};
use mirror_types::{geometry::DevicePoint, Result};

use crate::CommandTransport;

/// Direct calls to the agent's tap and drag endpoints.
pub struct RawEndpointTransport {
    client: WdaClient,
}

impl RawEndpointTransport {
    pub fn new(client: WdaClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl CommandTransport for RawEndpointTransport {
    fn name(&self) -> &'static str {
        "raw"
    }

    async fn send_tap(&self, session: &Session, at: DevicePoint) -> Result<()> {
        self.client.tap(&session.id, at).await
    }

    async fn send_swipe(
        &self,
        session: &Session,
        from: DevicePoint,
        to: DevicePoint,
        duration: Duration,
    ) -> Result<()> {
        self.client.drag(&session.id, from, to, duration).await
    }
}

/// Touch input as W3C pointer actions on the session.
pub struct SessionActionsTransport {
    client: WdaClient,
}

impl SessionActionsTransport {
    pub fn new(client: WdaClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl CommandTransport for SessionActionsTransport {
    fn name(&self) -> &'static str {
        "session"
    }

    async fn send_tap(&self, session: &Session, at: DevicePoint) -> Result<()> {
        self.client.session_tap(&session.id, at).await
    }

    async fn send_swipe(
        &self,
        session: &Session,
        from: DevicePoint,
        to: DevicePoint,
        duration: Duration,
    ) -> Result<()> {
        self.client
            .session_swipe(&session.id, from, to, duration)
            .await
    }
}

/// Both transports, preferred one first.
pub fn ordered_transports(client: &WdaClient, prefer_raw: bool) -> Vec<Arc<dyn CommandTransport>> {
    let raw: Arc<dyn CommandTransport> = Arc::new(RawEndpointTransport::new(client.clone()));
    let session: Arc<dyn CommandTransport> =
        Arc::new(SessionActionsTransport::new(client.clone()));
    if prefer_raw {
        vec![raw, session]
    } else {
        vec![session, raw]
    }
}
