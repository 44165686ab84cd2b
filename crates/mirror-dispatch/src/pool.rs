//! Bounded worker pool between the render loop and the dispatcher.

use std::{sync::Arc, time::Duration};

use mirror_ops::StopSignal;
use mirror_types::gesture::Command;
use tokio::{
    sync::{mpsc, Semaphore},
    task::JoinHandle,
};
use tracing::{debug, info, warn};

use crate::{DispatchRequest, Dispatcher};

/// Non-blocking handle the render loop uses to queue commands.
#[derive(Clone)]
pub struct CommandSender {
    tx: mpsc::Sender<DispatchRequest>,
}

impl CommandSender {
    /// Queues `command`; returns `false` if it was dropped.
    pub fn submit(&self, command: Command) -> bool {
        match self.tx.try_send(DispatchRequest::new(command)) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(request)) => {
                warn!(
                    kind = request.command.kind(),
                    "dispatch queue full; gesture dropped"
                );
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!("dispatch pool closed; gesture ignored");
                false
            }
        }
    }
}

pub struct DispatchPool {
    sender: CommandSender,
    intake: JoinHandle<()>,
    permits: Arc<Semaphore>,
    workers: usize,
    stop: StopSignal,
}

impl DispatchPool {
    /// Starts the intake task. At most `workers` commands are in flight at once;
    /// up to `capacity` more wait in the queue.
    pub fn spawn(
        dispatcher: Arc<Dispatcher>,
        workers: usize,
        capacity: usize,
        stop: StopSignal,
    ) -> Self {
        let workers = workers.max(1);
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let permits = Arc::new(Semaphore::new(workers));
        let intake = tokio::spawn(intake(rx, dispatcher, permits.clone(), stop.clone()));
        Self {
            sender: CommandSender { tx },
            intake,
            permits,
            workers,
            stop,
        }
    }

    pub fn submitter(&self) -> CommandSender {
        self.sender.clone()
    }

    /// Stops accepting work and gives in-flight commands up to `grace` to finish.
    /// Returns `true` if every worker finished in time.
    pub async fn shutdown(self, grace: Duration) -> bool {
        self.stop.stop();
        drop(self.sender);
        if let Err(err) = self.intake.await {
            warn!(error = %err, "dispatch intake task panicked");
        }

        let drained = tokio::time::timeout(grace, self.permits.acquire_many(self.workers as u32))
            .await
            .map(|acquired| acquired.is_ok())
            .unwrap_or(false);
        if drained {
            info!("dispatch pool drained");
        } else {
            warn!(
                in_flight = self.workers - self.permits.available_permits(),
                grace_ms = grace.as_millis() as u64,
                "dispatch workers still busy after grace period"
            );
        }
        drained
    }
}

async fn intake(
    mut rx: mpsc::Receiver<DispatchRequest>,
    dispatcher: Arc<Dispatcher>,
    permits: Arc<Semaphore>,
    stop: StopSignal,
) {
    loop {
        let request = tokio::select! {
            biased;
            _ = stop.stopped() => break,
            request = rx.recv() => match request {
                Some(request) => request,
                None => break,
            },
        };
        let permit = tokio::select! {
            biased;
            _ = stop.stopped() => break,
            permit = permits.clone().acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => break,
            },
        };

        let dispatcher = dispatcher.clone();
        tokio::spawn(async move {
            let _permit = permit;
            dispatcher.dispatch(request).await;
        });
    }

    rx.close();
    let mut discarded = 0usize;
    while rx.try_recv().is_ok() {
        discarded += 1;
    }
    if discarded > 0 {
        debug!(discarded, "queued gestures discarded at shutdown");
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use mirror_device::SessionProvider;
    use mirror_types::geometry::DevicePoint;

    use super::*;
    use crate::{
        dispatcher::testing::{FakeSessions, FakeTransport},
        CommandTransport, RetryPolicy,
    };

    fn tap(x: f64) -> Command {
        Command::Tap {
            at: DevicePoint::new(x, 10.0),
        }
    }

    fn pool_with(
        transport: Arc<FakeTransport>,
        workers: usize,
        capacity: usize,
    ) -> (DispatchPool, Arc<Dispatcher>) {
        let stop = StopSignal::new();
        let sessions: Arc<dyn SessionProvider> = Arc::new(FakeSessions::with_session("s1"));
        let transports: Vec<Arc<dyn CommandTransport>> = vec![transport];
        let dispatcher = Arc::new(Dispatcher::new(
            transports,
            sessions,
            RetryPolicy::default(),
            stop.clone(),
        ));
        let pool = DispatchPool::spawn(dispatcher.clone(), workers, capacity, stop);
        (pool, dispatcher)
    }

    async fn wait_delivered(dispatcher: &Dispatcher, expected: u64) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while dispatcher.metrics().delivered < expected {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("commands delivered");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrency_is_bounded_by_worker_count() {
        let transport = Arc::new(FakeTransport {
            delay: Duration::from_millis(30),
            ..FakeTransport::new("raw")
        });
        let (pool, dispatcher) = pool_with(transport.clone(), 2, 32);
        let sender = pool.submitter();

        for i in 0..8 {
            assert!(sender.submit(tap(i as f64)));
        }
        wait_delivered(&dispatcher, 8).await;

        assert!(transport.max_in_flight.load(Ordering::SeqCst) <= 2);
        assert_eq!(transport.sent().len(), 8);
        assert!(pool.shutdown(Duration::from_secs(1)).await);
    }

    #[tokio::test]
    async fn single_worker_preserves_submission_order() {
        let transport = Arc::new(FakeTransport::new("raw"));
        let (pool, dispatcher) = pool_with(transport.clone(), 1, 16);
        let sender = pool.submitter();

        for i in 0..5 {
            sender.submit(tap(i as f64));
        }
        wait_delivered(&dispatcher, 5).await;

        let expected: Vec<_> = (0..5).map(|i| tap(i as f64)).collect();
        assert_eq!(transport.sent(), expected);
        pool.shutdown(Duration::from_millis(200)).await;
    }

    #[tokio::test]
    async fn full_queue_rejects_without_blocking() {
        let transport = Arc::new(FakeTransport::new("raw"));
        let (pool, _dispatcher) = pool_with(transport, 1, 1);
        let sender = pool.submitter();

        assert!(sender.submit(tap(1.0)));
        assert!(!sender.submit(tap(2.0)));
        pool.shutdown(Duration::from_millis(200)).await;
    }

    #[tokio::test]
    async fn submissions_after_shutdown_are_ignored() {
        let transport = Arc::new(FakeTransport::new("raw"));
        let (pool, _dispatcher) = pool_with(transport.clone(), 2, 4);
        let sender = pool.submitter();

        assert!(pool.shutdown(Duration::from_millis(200)).await);
        assert!(!sender.submit(tap(3.0)));
        assert_eq!(transport.calls(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn shutdown_reports_workers_past_grace() {
        let transport = Arc::new(FakeTransport {
            delay: Duration::from_millis(500),
            ..FakeTransport::new("raw")
        });
        let (pool, _dispatcher) = pool_with(transport.clone(), 1, 4);
        pool.submitter().submit(tap(1.0));

        tokio::time::timeout(Duration::from_secs(2), async {
            while transport.calls() == 0 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("command started");
        assert!(!pool.shutdown(Duration::from_millis(20)).await);
    }
}
