//! Durable task queue backed by the `tasks` table.
//!
//! One queue (`process-report`) with a concurrency bound of one: a task is
//! claimed only while no other task of the queue holds a live lock, so two
//! reports are never processed at the same time, even across processes
//! sharing the database. A running task's lock is refreshed while its
//! handler works; locks older than the lock lifetime are treated as
//! abandoned and the task is redelivered.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::Instrument;

use crate::db::task_repo::{self, TaskRow};
use crate::db::Database;
use crate::error::QueueError;
use crate::job::store::format_timestamp;

pub const QUEUE_NAME: &str = "process-report";

pub type TaskId = String;

/// Error a handler reports back; logged by the queue, never retried.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// A claimed unit of work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Task {
    pub id: TaskId,
    pub job_id: String,
    pub enqueued_at: String,
    /// The previous claim's lock expired before the task was acknowledged.
    pub redelivered: bool,
}

#[async_trait]
pub trait TaskHandler: Send + Sync {
    async fn handle(&self, task: &Task) -> Result<(), HandlerError>;
}

#[derive(Debug, Clone)]
pub struct QueueOptions {
    pub poll_interval: Duration,
    pub lock_lifetime: Duration,
}

impl Default for QueueOptions {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
            lock_lifetime: Duration::from_secs(600),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueState {
    /// Constructed; neither enqueueing nor processing yet.
    NotStarted,
    /// Enqueue-only handle.
    Producer,
    /// Poll loop running.
    Running,
    Stopped,
}

struct QueueInner {
    db: Database,
    options: QueueOptions,
    owner: String,
    state: Mutex<QueueState>,
    shutdown_tx: watch::Sender<bool>,
    loop_handle: tokio::sync::Mutex<Option<JoinHandle<()>>>,
}

/// Handle to the queue. Cloning is cheap and shares state.
#[derive(Clone)]
pub struct TaskQueue {
    inner: Arc<QueueInner>,
}

impl TaskQueue {
    pub fn new(db: Database, options: QueueOptions) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        let owner = format!(
            "worker-{}-{}",
            std::process::id(),
            &uuid::Uuid::new_v4().simple().to_string()[..8]
        );
        Self {
            inner: Arc::new(QueueInner {
                db,
                options,
                owner,
                state: Mutex::new(QueueState::NotStarted),
                shutdown_tx,
                loop_handle: tokio::sync::Mutex::new(None),
            }),
        }
    }

    pub fn state(&self) -> QueueState {
        *self.lock_state()
    }

    /// Lock owner name written into claimed tasks.
    pub fn owner(&self) -> &str {
        &self.inner.owner
    }

    fn lock_state(&self) -> MutexGuard<'_, QueueState> {
        match self.inner.state.lock() {
            Ok(g) => g,
            Err(poisoned) => {
                log::warn!("Queue state lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    /// Opens the queue for enqueueing without processing anything.
    pub fn attach(&self) -> Result<(), QueueError> {
        let mut state = self.lock_state();
        match *state {
            QueueState::NotStarted => {
                *state = QueueState::Producer;
                Ok(())
            }
            QueueState::Producer | QueueState::Running => Ok(()),
            QueueState::Stopped => Err(QueueError::Stopped),
        }
    }

    /// Starts the background poll loop.
    pub fn start(&self, handler: Arc<dyn TaskHandler>) -> Result<(), QueueError> {
        {
            let mut state = self.lock_state();
            match *state {
                QueueState::NotStarted | QueueState::Producer => *state = QueueState::Running,
                QueueState::Running => return Err(QueueError::AlreadyStarted),
                QueueState::Stopped => return Err(QueueError::Stopped),
            }
        }

        let queue = self.clone();
        let shutdown_rx = self.inner.shutdown_tx.subscribe();
        let handle = tokio::spawn(async move { queue.poll_loop(handler, shutdown_rx).await });

        match self.inner.loop_handle.try_lock() {
            Ok(mut slot) => *slot = Some(handle),
            Err(_) => log::warn!("Queue loop handle busy; shutdown will not await the loop"),
        }

        log::info!(
            "Queue '{}' started (poll every {:?}, owner {})",
            QUEUE_NAME,
            self.inner.options.poll_interval,
            self.inner.owner
        );
        Ok(())
    }

    /// Persists a task for `job_id`.
    pub fn enqueue(&self, job_id: &str) -> Result<TaskId, QueueError> {
        match self.state() {
            QueueState::NotStarted => return Err(QueueError::NotStarted),
            QueueState::Stopped => return Err(QueueError::Stopped),
            QueueState::Producer | QueueState::Running => {}
        }

        let now = format_timestamp(Utc::now());
        let task = TaskRow {
            id: uuid::Uuid::new_v4().to_string(),
            queue: QUEUE_NAME.to_string(),
            job_id: job_id.to_string(),
            enqueued_at: now.clone(),
            next_run_at: now,
            locked_at: None,
            locked_by: None,
        };
        task_repo::insert(&self.inner.db, &task)?;
        log::debug!("Enqueued task {} for report {}", task.id, job_id);
        Ok(task.id)
    }

    /// Tasks waiting or in flight.
    pub fn pending_count(&self) -> Result<u64, QueueError> {
        Ok(task_repo::count(&self.inner.db, QUEUE_NAME)?)
    }

    /// Runs every due task once, one at a time, and returns how many ran.
    ///
    /// Handler errors are logged; the task is acknowledged either way.
    pub async fn run_pending(&self, handler: &dyn TaskHandler) -> Result<usize, QueueError> {
        let mut processed = 0;

        while self.state() != QueueState::Stopped {
            let Some(task) = self.claim()? else {
                break;
            };

            if task.redelivered {
                log::warn!(
                    "Task {} for report {} is being redelivered after an expired lock",
                    task.id,
                    task.job_id
                );
            }

            let span = tracing::info_span!("queue.task", task_id = %task.id, job_id = %task.job_id);
            let work = handler.handle(&task).instrument(span);
            tokio::pin!(work);

            let mut heartbeat = tokio::time::interval(self.heartbeat_period());
            heartbeat.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            heartbeat.tick().await;

            let result = loop {
                tokio::select! {
                    result = &mut work => break result,
                    _ = heartbeat.tick() => self.refresh_lock(&task),
                }
            };

            match result {
                Ok(()) => log::debug!("Task {} done", task.id),
                Err(e) => log::error!("Task {} for report {} failed: {}", task.id, task.job_id, e),
            }

            if !task_repo::delete(&self.inner.db, &task.id, &self.inner.owner)? {
                log::warn!(
                    "Task {} was taken over by another worker before it was acknowledged",
                    task.id
                );
            }
            processed += 1;
        }

        Ok(processed)
    }

    /// How often a running task's lock is refreshed: three times per
    /// lock lifetime.
    fn heartbeat_period(&self) -> Duration {
        (self.inner.options.lock_lifetime / 3).max(Duration::from_millis(10))
    }

    fn refresh_lock(&self, task: &Task) {
        let now = format_timestamp(Utc::now());
        match task_repo::touch_lock(&self.inner.db, &task.id, &self.inner.owner, &now) {
            Ok(true) => {}
            Ok(false) => log::warn!(
                "Lock on task {} for report {} is no longer held by {}",
                task.id,
                task.job_id,
                self.inner.owner
            ),
            Err(e) => log::error!("Failed to refresh lock on task {}: {}", task.id, e),
        }
    }

    fn claim(&self) -> Result<Option<Task>, QueueError> {
        let now = Utc::now();
        let lifetime = chrono::Duration::milliseconds(
            i64::try_from(self.inner.options.lock_lifetime.as_millis()).unwrap_or(i64::MAX),
        );
        let stale_before = now.checked_sub_signed(lifetime).unwrap_or(now);

        let claimed = task_repo::claim_next(
            &self.inner.db,
            QUEUE_NAME,
            &self.inner.owner,
            &format_timestamp(now),
            &format_timestamp(stale_before),
        )?;

        Ok(claimed.map(|c| Task {
            id: c.task.id,
            job_id: c.task.job_id,
            enqueued_at: c.task.enqueued_at,
            redelivered: c.reclaimed,
        }))
    }

    async fn poll_loop(&self, handler: Arc<dyn TaskHandler>, mut shutdown_rx: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.inner.options.poll_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.run_pending(handler.as_ref()).await {
                        log::error!("Queue poll failed: {}", e);
                    }
                }
                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        break;
                    }
                }
            }
        }

        log::info!("Queue '{}' poll loop stopped", QUEUE_NAME);
    }

    /// Stops the poll loop after the in-flight task, if any, finishes.
    pub async fn shutdown(&self) {
        {
            let mut state = self.lock_state();
            if *state == QueueState::Stopped {
                return;
            }
            *state = QueueState::Stopped;
        }

        let _ = self.inner.shutdown_tx.send(true);

        let handle = self.inner.loop_handle.lock().await.take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                log::error!("Queue poll loop panicked: {}", e);
            }
        }

        match task_repo::release_owned(&self.inner.db, QUEUE_NAME, &self.inner.owner) {
            Ok(0) => {}
            Ok(n) => log::warn!("Released {} task lock(s) held at shutdown", n),
            Err(e) => log::error!("Failed to release task locks: {}", e),
        }

        log::info!("Queue '{}' shut down", QUEUE_NAME);
    }
}
