//! Concurrent command dispatcher.
//!
//! One dispatcher is shared by every in-flight request on the node.
//! Each request submits its fan-out (remote commands plus the local
//! operation) as a single batch; tasks run on the tokio runtime but
//! wait on a shared semaphore, so total fan-out concurrency stays
//! bounded no matter how many requests are in flight.

use futures::future::BoxFuture;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinSet;
use tokio::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Running,
    Draining,
    Stopped,
}

#[derive(Debug)]
pub struct Dispatcher {
    permits: Arc<Semaphore>,
    stage: watch::Sender<Stage>,
    active_batches: Arc<AtomicUsize>,
}

struct BatchGuard(Arc<AtomicUsize>);

impl Drop for BatchGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

impl Dispatcher {
    pub fn new(fan_out_permits: usize) -> Self {
        let (stage, _) = watch::channel(Stage::Running);
        Self {
            permits: Arc::new(Semaphore::new(fan_out_permits.max(1))),
            stage,
            active_batches: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Run a batch of tasks concurrently and collect their results.
    ///
    /// Results arrive in completion order; callers must not rely on
    /// submission order. A task that fails resolves to whatever negative
    /// value it produces itself — nothing a task does can cancel its
    /// siblings, so a full batch always yields `tasks.len()` results.
    /// Fewer results come back only while the pool is shutting down, and
    /// a pool that has already begun draining returns an empty batch.
    pub async fn process<T: Send + 'static>(&self, tasks: Vec<BoxFuture<'static, T>>) -> Vec<T> {
        if *self.stage.borrow() != Stage::Running {
            return Vec::new();
        }
        self.active_batches.fetch_add(1, Ordering::AcqRel);
        let _guard = BatchGuard(self.active_batches.clone());

        let capacity = tasks.len();
        let mut set = JoinSet::new();
        for task in tasks {
            let permits = self.permits.clone();
            set.spawn(async move {
                match permits.acquire_owned().await {
                    Ok(_permit) => Some(task.await),
                    // Semaphore closed: the pool is past its grace period.
                    Err(_) => None,
                }
            });
        }

        let mut stage_rx = self.stage.subscribe();
        let mut results = Vec::with_capacity(capacity);
        loop {
            tokio::select! {
                joined = set.join_next() => match joined {
                    None => break,
                    Some(Ok(Some(value))) => results.push(value),
                    Some(Ok(None)) => {}
                    Some(Err(err)) if err.is_panic() => {
                        tracing::error!(error = %err, "dispatched task panicked");
                    }
                    Some(Err(_)) => {}
                },
                _ = async { let _ = stage_rx.wait_for(|stage| *stage == Stage::Stopped).await; } => {
                    set.abort_all();
                    while let Some(joined) = set.join_next().await {
                        if let Ok(Some(value)) = joined {
                            results.push(value);
                        }
                    }
                    break;
                }
            }
        }
        results
    }

    /// Graceful shutdown: stop accepting new batches immediately, give
    /// in-flight batches up to `grace` to finish, then force-cancel the
    /// rest. Interrupted batches return whatever completed.
    pub async fn shutdown(&self, grace: Duration) {
        self.stage.send_replace(Stage::Draining);

        let deadline = tokio::time::Instant::now() + grace;
        while self.active_batches.load(Ordering::Acquire) > 0
            && tokio::time::Instant::now() < deadline
        {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        self.permits.close();
        self.stage.send_replace(Stage::Stopped);

        let stragglers = self.active_batches.load(Ordering::Acquire);
        if stragglers > 0 {
            tracing::warn!(batches = stragglers, "force-cancelled in-flight batches");
        }
    }
}
