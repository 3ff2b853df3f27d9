//! Task lifecycle management
//!
//! Tracked task spawning with a shared cancellation token. Tasks receive a
//! child token and are expected to finish on their own once it fires;
//! `shutdown_all` aborts whatever is still running after the timeout.

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::errors::types::{Error, Result};

/// Handle to a tracked task
#[derive(Debug)]
pub struct TaskHandle {
    id: usize,
    name: String,
    handle: JoinHandle<()>,
    started_at: Instant,
}

impl TaskHandle {
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    pub fn runtime(&self) -> Duration {
        self.started_at.elapsed()
    }
}

/// Tracks the tasks of one component so they can be shut down together
pub struct TaskManager {
    next_task_id: AtomicUsize,
    tasks: Mutex<Vec<TaskHandle>>,
    cancel_token: CancellationToken,
    active_count: Arc<AtomicUsize>,
    name: String,
    shutdown_timeout: Duration,
}

impl TaskManager {
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_timeout(name, Duration::from_secs(5))
    }

    pub fn with_timeout(name: impl Into<String>, shutdown_timeout: Duration) -> Self {
        Self {
            next_task_id: AtomicUsize::new(0),
            tasks: Mutex::new(Vec::new()),
            cancel_token: CancellationToken::new(),
            active_count: Arc::new(AtomicUsize::new(0)),
            name: name.into(),
            shutdown_timeout,
        }
    }

    /// Token cancelled by [`cancel_all`](Self::cancel_all)
    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel_token
    }

    pub fn is_shutting_down(&self) -> bool {
        self.cancel_token.is_cancelled()
    }

    /// Spawn a tracked task; `task` receives a child of the manager's token
    pub async fn spawn_tracked<F, Fut>(&self, name: impl Into<String>, task: F) -> Result<usize>
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        if self.is_shutting_down() {
            return Err(Error::Internal(format!("{} is shutting down", self.name)));
        }

        let task_name = name.into();
        let task_id = self.next_task_id.fetch_add(1, Ordering::SeqCst);
        let future = task(self.cancel_token.child_token());

        let active = self.active_count.clone();
        let manager = self.name.clone();
        let label = task_name.clone();
        active.fetch_add(1, Ordering::SeqCst);

        let handle = tokio::spawn(async move {
            debug!("Task started: {} [{}] in {}", label, task_id, manager);
            future.await;
            active.fetch_sub(1, Ordering::SeqCst);
            debug!("Task finished: {} [{}] in {}", label, task_id, manager);
        });

        let mut tasks = self.tasks.lock().await;
        tasks.retain(|t| !t.is_finished());
        tasks.push(TaskHandle {
            id: task_id,
            name: task_name,
            handle,
            started_at: Instant::now(),
        });

        Ok(task_id)
    }

    pub fn active_task_count(&self) -> usize {
        self.active_count.load(Ordering::SeqCst)
    }

    /// Cancel every task's token without waiting
    pub fn cancel_all(&self) {
        debug!("Cancelling all tasks in {}", self.name);
        self.cancel_token.cancel();
    }

    /// Cancel all tasks, wait for them up to the shutdown timeout, then abort the rest
    pub async fn shutdown_all(&self) {
        let start = Instant::now();
        debug!("Shutting down {} with {} active tasks", self.name, self.active_task_count());

        self.cancel_all();

        let drained = tokio::time::timeout(self.shutdown_timeout, self.wait_for_completion()).await;
        match drained {
            Ok(()) => debug!("{} shut down gracefully in {:?}", self.name, start.elapsed()),
            Err(_) => {
                warn!("{} shutdown timed out after {:?}, aborting", self.name, self.shutdown_timeout);
                self.abort_all().await;
            }
        }

        self.tasks.lock().await.clear();
    }

    async fn wait_for_completion(&self) {
        while self.active_task_count() > 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    async fn abort_all(&self) {
        let tasks = self.tasks.lock().await;
        for task in tasks.iter().filter(|t| !t.is_finished()) {
            warn!("Force aborting task: {} [{}] after {:?}", task.name, task.id, task.runtime());
            task.handle.abort();
        }
    }
}
