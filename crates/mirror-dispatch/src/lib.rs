//! Asynchronous touch-command dispatch with transport fallback and session recovery.

use std::time::Duration;

use async_trait::async_trait;
use mirror_device::Session;
use mirror_types::{
    geometry::DevicePoint,
    gesture::Command,
    MirrorError, Result,
};

pub mod dispatcher;
pub mod pool;
pub mod transport;

pub use dispatcher::{DispatchOutcome, DispatchRequest, Dispatcher, RetryPolicy};
pub use pool::{CommandSender, DispatchPool};
pub use transport::{ordered_transports, RawEndpointTransport, SessionActionsTransport};

/// One way of delivering touch input to the device.
#[async_trait]
pub trait CommandTransport: Send + Sync {
    fn name(&self) -> &'static str;

    async fn send_tap(&self, session: &Session, at: DevicePoint) -> Result<()>;

    async fn send_swipe(
        &self,
        session: &Session,
        from: DevicePoint,
        to: DevicePoint,
        duration: Duration,
    ) -> Result<()>;

    async fn send(&self, session: &Session, command: &Command) -> Result<()> {
        match *command {
            Command::Tap { at } => self.send_tap(session, at).await,
            Command::Swipe { from, to, duration } => {
                self.send_swipe(session, from, to, duration).await
            }
        }
    }
}

pub fn dispatch_error(message: impl Into<String>) -> MirrorError {
    MirrorError::Dispatch(message.into())
}
