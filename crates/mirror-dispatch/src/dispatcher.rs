use std::{
    sync::{Arc, Mutex},
    time::Instant,
};

use chrono::Utc;
use mirror_device::{Session, SessionProvider};
use mirror_ops::StopSignal;
use mirror_types::{
    gesture::Command,
    telemetry::{DispatchMetrics, LatencySample},
    MirrorError, Result,
};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{dispatch_error, CommandTransport};

/// A classified command waiting for delivery.
#[derive(Debug, Clone)]
pub struct DispatchRequest {
    pub id: Uuid,
    pub command: Command,
    pub queued_at: Instant,
}

impl DispatchRequest {
    pub fn new(command: Command) -> Self {
        Self {
            id: Uuid::new_v4(),
            command,
            queued_at: Instant::now(),
        }
    }
}

/// How many session recoveries one command may trigger before it is dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub recovery_attempts: u8,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            recovery_attempts: 1,
        }
    }
}

#[derive(Debug)]
pub enum DispatchOutcome {
    Delivered {
        transport: &'static str,
        recovered: bool,
    },
    Dropped {
        error: MirrorError,
    },
    Cancelled,
}

/// Delivers commands through an ordered transport list.
///
/// Every transport is tried in preference order; when all of them fail the
/// session is refreshed and the whole list is tried again, up to the policy's
/// recovery budget.
pub struct Dispatcher {
    transports: Vec<Arc<dyn CommandTransport>>,
    sessions: Arc<dyn SessionProvider>,
    policy: RetryPolicy,
    stop: StopSignal,
    metrics: Arc<Mutex<DispatchMetrics>>,
}

impl Dispatcher {
    pub fn new(
        transports: Vec<Arc<dyn CommandTransport>>,
        sessions: Arc<dyn SessionProvider>,
        policy: RetryPolicy,
        stop: StopSignal,
    ) -> Self {
        Self {
            transports,
            sessions,
            policy,
            stop,
            metrics: Arc::new(Mutex::new(DispatchMetrics::default())),
        }
    }

    pub fn metrics(&self) -> DispatchMetrics {
        self.metrics.lock().map(|m| m.clone()).unwrap_or_default()
    }

    pub async fn dispatch(&self, request: DispatchRequest) -> DispatchOutcome {
        let started = Instant::now();
        let mut session = self.sessions.current();
        let mut recoveries = 0u8;

        loop {
            if self.stop.is_stopped() {
                debug!(id = %request.id, "shutdown requested; command not sent");
                return DispatchOutcome::Cancelled;
            }

            let attempt = match session.as_deref() {
                Some(active) => self.attempt(active, &request.command).await,
                None => Err(dispatch_error("no active session")),
            };
            let error = match attempt {
                Ok(transport) => {
                    self.record_delivery(&request, started);
                    log_delivery(&request.command, recoveries > 0);
                    return DispatchOutcome::Delivered {
                        transport,
                        recovered: recoveries > 0,
                    };
                }
                Err(err) => err,
            };

            if recoveries >= self.policy.recovery_attempts {
                return self.drop_command(&request, error);
            }
            recoveries += 1;
            info!(
                id = %request.id,
                kind = request.command.kind(),
                error = %error,
                "all transports failed; refreshing session"
            );
            self.record(|metrics| metrics.recoveries += 1);
            match self.sessions.refresh(session.as_deref()).await {
                Ok(fresh) => session = Some(fresh),
                Err(err) => return self.drop_command(&request, err),
            }
        }
    }

    async fn attempt(&self, session: &Session, command: &Command) -> Result<&'static str> {
        let mut last_error = dispatch_error("no transports configured");
        for (index, transport) in self.transports.iter().enumerate() {
            match transport.send(session, command).await {
                Ok(()) => {
                    if index > 0 {
                        self.record(|metrics| metrics.fallbacks += 1);
                    }
                    return Ok(transport.name());
                }
                Err(err) => {
                    debug!(transport = transport.name(), error = %err, "transport failed");
                    last_error = err;
                }
            }
        }
        Err(last_error)
    }

    fn drop_command(&self, request: &DispatchRequest, error: MirrorError) -> DispatchOutcome {
        warn!(
            id = %request.id,
            kind = request.command.kind(),
            error = %error,
            "command dropped after retry"
        );
        self.record(|metrics| metrics.dropped += 1);
        DispatchOutcome::Dropped { error }
    }

    fn record_delivery(&self, request: &DispatchRequest, started: Instant) {
        let queued_ms = started.duration_since(request.queued_at).as_millis() as u64;
        let delivery_ms = started.elapsed().as_millis() as u64;
        self.record(|metrics| {
            metrics.delivered += 1;
            metrics.last_latency = Some(LatencySample {
                queued_ms,
                delivery_ms,
                total_ms: request.queued_at.elapsed().as_millis() as u64,
                captured_at: Utc::now(),
            });
        });
    }

    fn record(&self, update: impl FnOnce(&mut DispatchMetrics)) {
        if let Ok(mut guard) = self.metrics.lock() {
            update(&mut guard);
        }
    }
}

fn log_delivery(command: &Command, recovered: bool) {
    match command {
        Command::Tap { at } => info!(recovered, "TAP @ ({:.1}, {:.1}) pt", at.x, at.y),
        Command::Swipe { from, to, duration } => info!(
            recovered,
            "SWIPE {:.2}s: ({:.1}, {:.1}) -> ({:.1}, {:.1}) pt",
            duration.as_secs_f64(),
            from.x,
            from.y,
            to.x,
            to.y
        ),
    }
}


#[cfg(test)]
mod tests {
    use std::time::Duration;

    use mirror_types::geometry::DevicePoint;

    use super::testing::{FakeSessions, FakeTransport};
    use super::*;

    fn tap() -> DispatchRequest {
        DispatchRequest::new(Command::Tap {
            at: DevicePoint::new(100.0, 200.0),
        })
    }

    fn dispatcher(
        transports: Vec<Arc<FakeTransport>>,
        sessions: Arc<FakeSessions>,
        stop: StopSignal,
    ) -> Dispatcher {
        let transports = transports
            .into_iter()
            .map(|transport| transport as Arc<dyn CommandTransport>)
            .collect();
        Dispatcher::new(transports, sessions, RetryPolicy::default(), stop)
    }

    #[tokio::test]
    async fn second_transport_covers_first_failure() {
        let raw = Arc::new(FakeTransport::failing("raw"));
        let session = Arc::new(FakeTransport::new("session"));
        let sessions = Arc::new(FakeSessions::with_session("s1"));
        let dispatcher = dispatcher(
            vec![raw.clone(), session.clone()],
            sessions.clone(),
            StopSignal::new(),
        );

        let outcome = dispatcher.dispatch(tap()).await;
        assert!(matches!(
            outcome,
            DispatchOutcome::Delivered {
                transport: "session",
                recovered: false
            }
        ));
        assert_eq!(sessions.refreshes(), 0);
        assert_eq!(raw.calls(), 1);
        assert_eq!(session.sent().len(), 1);

        let metrics = dispatcher.metrics();
        assert_eq!(metrics.delivered, 1);
        assert_eq!(metrics.fallbacks, 1);
        assert!(metrics.last_latency.is_some());
    }

    #[tokio::test]
    async fn preferred_transport_success_skips_the_rest() {
        let raw = Arc::new(FakeTransport::new("raw"));
        let session = Arc::new(FakeTransport::new("session"));
        let dispatcher = dispatcher(
            vec![raw.clone(), session.clone()],
            Arc::new(FakeSessions::with_session("s1")),
            StopSignal::new(),
        );

        let outcome = dispatcher.dispatch(tap()).await;
        assert!(matches!(
            outcome,
            DispatchOutcome::Delivered { transport: "raw", .. }
        ));
        assert_eq!(session.calls(), 0);
        assert_eq!(dispatcher.metrics().fallbacks, 0);
    }

    #[tokio::test]
    async fn total_failure_recovers_once_then_drops() {
        let raw = Arc::new(FakeTransport::failing("raw"));
        let session = Arc::new(FakeTransport::failing("session"));
        let sessions = Arc::new(FakeSessions::with_session("s1"));
        let dispatcher = dispatcher(
            vec![raw.clone(), session.clone()],
            sessions.clone(),
            StopSignal::new(),
        );

        let outcome = dispatcher.dispatch(tap()).await;
        assert!(matches!(outcome, DispatchOutcome::Dropped { .. }));
        assert_eq!(sessions.refreshes(), 1);
        assert_eq!(raw.calls(), 2);
        assert_eq!(session.calls(), 2);

        let metrics = dispatcher.metrics();
        assert_eq!(metrics.dropped, 1);
        assert_eq!(metrics.recoveries, 1);
        assert_eq!(metrics.delivered, 0);
    }

    #[tokio::test]
    async fn fresh_session_delivers_after_recovery() {
        let stale_only = |name| FakeTransport {
            fail_sessions: vec!["s1".into()],
            ..FakeTransport::new(name)
        };
        let raw = Arc::new(stale_only("raw"));
        let session = Arc::new(stale_only("session"));
        let sessions = Arc::new(FakeSessions::with_session("s1"));
        let dispatcher = dispatcher(
            vec![raw.clone(), session.clone()],
            sessions.clone(),
            StopSignal::new(),
        );

        let outcome = dispatcher.dispatch(tap()).await;
        assert!(matches!(
            outcome,
            DispatchOutcome::Delivered {
                transport: "raw",
                recovered: true
            }
        ));
        assert_eq!(sessions.refreshes(), 1);
        assert_eq!(raw.sent().len(), 1);
    }

    #[tokio::test]
    async fn failed_recovery_drops_command() {
        let raw = Arc::new(FakeTransport::failing("raw"));
        let sessions = Arc::new(FakeSessions {
            fail_refresh: true,
            ..FakeSessions::with_session("s1")
        });
        let dispatcher = dispatcher(vec![raw.clone()], sessions.clone(), StopSignal::new());

        let outcome = dispatcher.dispatch(tap()).await;
        assert!(matches!(outcome, DispatchOutcome::Dropped { .. }));
        assert_eq!(sessions.refreshes(), 1);
        assert_eq!(raw.calls(), 1);
        assert_eq!(dispatcher.metrics().dropped, 1);
    }

    #[tokio::test]
    async fn missing_session_is_established_first() {
        let raw = Arc::new(FakeTransport::new("raw"));
        let sessions = Arc::new(FakeSessions {
            current: Mutex::new(None),
            ..FakeSessions::with_session("unused")
        });
        let dispatcher = dispatcher(vec![raw.clone()], sessions.clone(), StopSignal::new());

        let outcome = dispatcher.dispatch(tap()).await;
        assert!(matches!(outcome, DispatchOutcome::Delivered { .. }));
        assert_eq!(sessions.refreshes(), 1);
    }

    #[tokio::test]
    async fn stop_cancels_before_sending() {
        let raw = Arc::new(FakeTransport::new("raw"));
        let stop = StopSignal::new();
        stop.stop();
        let dispatcher = dispatcher(
            vec![raw.clone()],
            Arc::new(FakeSessions::with_session("s1")),
            stop,
        );

        let outcome = dispatcher.dispatch(tap()).await;
        assert!(matches!(outcome, DispatchOutcome::Cancelled));
        assert_eq!(raw.calls(), 0);
    }

    #[tokio::test]
    async fn swipe_reaches_transport_unchanged() {
        let raw = Arc::new(FakeTransport::new("raw"));
        let dispatcher = dispatcher(
            vec![raw.clone()],
            Arc::new(FakeSessions::with_session("s1")),
            StopSignal::new(),
        );
        let swipe = Command::Swipe {
            from: DevicePoint::new(10.0, 600.0),
            to: DevicePoint::new(10.0, 100.0),
            duration: Duration::from_millis(120),
        };

        dispatcher.dispatch(DispatchRequest::new(swipe)).await;
        assert_eq!(raw.sent(), vec![swipe]);
    }
}
