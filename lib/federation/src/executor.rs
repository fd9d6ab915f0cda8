use crate::error::FederationError;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::{oneshot, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, warn};

/// How long [`RestExecutor::shutdown`] waits for running calls.
pub const SHUTDOWN_GRACE_PERIOD: Duration = Duration::from_secs(10);

/// Runs REST calls on the runtime with a bound on how many are in flight.
///
/// Calls keep running when the caller stops waiting for them. Their results are dropped.
#[derive(Debug)]
pub struct RestExecutor {
    permits: Arc<Semaphore>,
    capacity: usize,
    tasks: Mutex<Option<JoinSet<()>>>,
}

impl RestExecutor {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            permits: Arc::new(Semaphore::new(capacity)),
            capacity,
            tasks: Mutex::new(Some(JoinSet::new())),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Schedules `call`. The returned receiver yields its output once a permit was available and
    /// the call finished.
    pub fn submit<T, F>(&self, call: F) -> Result<oneshot::Receiver<T>, FederationError>
    where
        T: Send + 'static,
        F: Future<Output = T> + Send + 'static,
    {
        let mut tasks = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(tasks) = tasks.as_mut() else {
            return Err(FederationError::ExecutorShutdown);
        };
        while tasks.try_join_next().is_some() {}

        let (sender, receiver) = oneshot::channel();
        let permits = Arc::clone(&self.permits);
        tasks.spawn(async move {
            let Ok(_permit) = permits.acquire_owned().await else {
                return;
            };
            if sender.send(call.await).is_err() {
                debug!("Dropping result of an abandoned REST call");
            }
        });
        Ok(receiver)
    }

    /// Stops accepting calls, lets running calls finish within `grace` and aborts the rest.
    /// Calls still waiting for a permit are never started.
    pub async fn shutdown(&self, grace: Duration) {
        let tasks = self
            .tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(mut tasks) = tasks else {
            return;
        };
        self.permits.close();

        let drained = tokio::time::timeout(grace, async {
            while tasks.join_next().await.is_some() {}
        })
        .await;
        if drained.is_err() {
            warn!(
                remaining = tasks.len(),
                "REST calls did not finish in time, aborting"
            );
            tasks.abort_all();
            while tasks.join_next().await.is_some() {}
        }
    }

    pub fn is_shut_down(&self) -> bool {
        self.tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }
}

/// Waits for a submitted call.
pub async fn receive<T>(receiver: oneshot::Receiver<T>) -> Result<T, FederationError> {
    receiver
        .await
        .map_err(|_| FederationError::ExecutorShutdown)
}
