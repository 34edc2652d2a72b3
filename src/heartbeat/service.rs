//! Heartbeat loop implementation.
//!
//! [`HeartbeatLoop`] owns at most one background task. The task sends a
//! heartbeat, records the outcome, then waits for the interval or the stop
//! signal, whichever comes first. Failures (errors and panics) are logged and
//! counted but never end the loop.
//!
//! State lives behind a synchronous mutex that is only held for bookkeeping.
//! It is never held across an await, a network call, or a hook.
//!
//! A task that outlives a bounded [`HeartbeatLoop::stop`] is kept as an
//! orphan. The next task waits for it before its first beat, so at most one
//! beat is ever in flight.

use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::FutureExt;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::error::{RegistryError, Result};

/// Intervals below this are raised to it.
pub const MIN_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(1);

static NEXT_LOOP_ID: AtomicU64 = AtomicU64::new(1);

tokio::task_local! {
    /// Id of the heartbeat loop whose task is currently executing.
    static ACTIVE_LOOP: u64;
}

/// What the loop heartbeats on behalf of.
#[async_trait]
pub trait HeartbeatSource: Send + Sync + 'static {
    /// Send one heartbeat, including any signal dispatch.
    async fn beat(self: Arc<Self>) -> Result<()>;

    /// How long to wait after this beat before the next one.
    async fn interval(&self) -> Duration;
}

/// Lifecycle of the heartbeat loop. `Stopped` is idle: a new start is allowed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    NotStarted,
    Running,
    Stopping,
    Stopped,
}

/// Counters describing what the loop has done since it was created.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoopStats {
    pub attempts: u64,
    pub successes: u64,
    pub failures: u64,
    pub consecutive_failures: u64,
    pub last_error: Option<String>,
    pub last_success_at: Option<DateTime<Utc>>,
}

impl LoopStats {
    fn record_success(&mut self) {
        self.attempts += 1;
        self.successes += 1;
        if self.consecutive_failures > 0 {
            info!(
                previous_failures = self.consecutive_failures,
                "Heartbeat recovered"
            );
        }
        self.consecutive_failures = 0;
        self.last_success_at = Some(Utc::now());
    }

    fn record_failure(&mut self, reason: String) {
        self.attempts += 1;
        self.failures += 1;
        self.consecutive_failures += 1;
        self.last_error = Some(reason);
    }
}

struct LoopShared {
    state: LoopState,
    generation: u64,
    stop_tx: Option<watch::Sender<bool>>,
    handle: Option<JoinHandle<()>>,
    /// Task of an earlier run that did not exit within the join timeout.
    orphan: Option<JoinHandle<()>>,
    stats: LoopStats,
}

/// Single-instance, cancellable heartbeat task.
pub struct HeartbeatLoop {
    id: u64,
    join_timeout: Duration,
    shared: Arc<Mutex<LoopShared>>,
}

impl HeartbeatLoop {
    /// Create an idle loop. `join_timeout` bounds how long [`stop`](Self::stop)
    /// waits for the task to finish.
    pub fn new(join_timeout: Duration) -> Self {
        Self {
            id: NEXT_LOOP_ID.fetch_add(1, Ordering::Relaxed),
            join_timeout,
            shared: Arc::new(Mutex::new(LoopShared {
                state: LoopState::NotStarted,
                generation: 0,
                stop_tx: None,
                handle: None,
                orphan: None,
                stats: LoopStats::default(),
            })),
        }
    }

    /// Start the loop in the background.
    ///
    /// Returns `Ok(false)` without spawning anything if the loop is already
    /// running or still stopping. Requires a tokio runtime.
    pub fn start<S: HeartbeatSource>(&self, source: Weak<S>) -> Result<bool> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| {
            RegistryError::Config("heartbeat loop requires a tokio runtime".to_string())
        })?;

        let mut shared = self.lock();
        match shared.state {
            LoopState::Running => {
                debug!("Heartbeat loop already running");
                return Ok(false);
            }
            LoopState::Stopping => {
                warn!("Heartbeat loop is still stopping, ignoring start");
                return Ok(false);
            }
            LoopState::NotStarted | LoopState::Stopped => {}
        }

        let (stop_tx, stop_rx) = watch::channel(false);
        shared.generation += 1;
        let generation = shared.generation;

        let predecessor = shared.orphan.take();
        let task = run(
            source,
            Arc::clone(&self.shared),
            stop_rx,
            generation,
            predecessor,
        );
        shared.handle = Some(runtime.spawn(ACTIVE_LOOP.scope(self.id, task)));
        shared.stop_tx = Some(stop_tx);
        shared.state = LoopState::Running;

        info!(generation, "Heartbeat loop started");
        Ok(true)
    }

    /// Stop the loop and wait (bounded) for the task to exit.
    ///
    /// Returns `false` if the loop was not running. Called from inside the
    /// loop's own task (e.g. from a drain hook) it only signals the task and
    /// returns immediately.
    pub async fn stop(&self) -> bool {
        let in_loop = self.is_current_task();
        let Some((generation, handle)) = self.begin_stop(!in_loop) else {
            return false;
        };

        if in_loop {
            debug!("Stop requested from inside the heartbeat task");
            return true;
        }

        if let Some(mut handle) = handle {
            match tokio::time::timeout(self.join_timeout, &mut handle).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!("Heartbeat task ended abnormally: {}", e),
                Err(_) => {
                    debug!(
                        "Heartbeat task did not exit within {:?}, leaving it to finish on its own",
                        self.join_timeout
                    );
                    self.lock().orphan = Some(handle);
                }
            }
        }

        self.finish(generation);
        info!(generation, "Heartbeat loop stopped");
        true
    }

    /// Signal the loop to stop without waiting for the task.
    ///
    /// Safe from synchronous contexts such as `Drop`.
    pub fn request_stop(&self) -> bool {
        self.begin_stop(false).is_some()
    }

    pub fn state(&self) -> LoopState {
        self.lock().state
    }

    pub fn is_running(&self) -> bool {
        self.state() == LoopState::Running
    }

    pub fn stats(&self) -> LoopStats {
        self.lock().stats.clone()
    }

    fn is_current_task(&self) -> bool {
        ACTIVE_LOOP.try_with(|id| *id == self.id).unwrap_or(false)
    }

    /// Running -> Stopping and fire the stop signal. Takes the join handle
    /// when `take_handle` is set.
    fn begin_stop(&self, take_handle: bool) -> Option<(u64, Option<JoinHandle<()>>)> {
        let mut shared = self.lock();
        if shared.state != LoopState::Running {
            return None;
        }
        shared.state = LoopState::Stopping;
        if let Some(stop_tx) = shared.stop_tx.as_ref() {
            stop_tx.send_replace(true);
        }
        let handle = if take_handle {
            shared.handle.take()
        } else {
            None
        };
        Some((shared.generation, handle))
    }

    fn finish(&self, generation: u64) {
        finish(&self.shared, generation);
    }

    fn lock(&self) -> MutexGuard<'_, LoopShared> {
        lock(&self.shared)
    }
}

impl Drop for HeartbeatLoop {
    fn drop(&mut self) {
        self.request_stop();
    }
}

fn lock(shared: &Mutex<LoopShared>) -> MutexGuard<'_, LoopShared> {
    shared.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Stopping -> Stopped for `generation`. A newer generation is left alone.
fn finish(shared: &Mutex<LoopShared>, generation: u64) {
    let mut shared = lock(shared);
    if shared.generation == generation && shared.state == LoopState::Stopping {
        shared.state = LoopState::Stopped;
        shared.stop_tx = None;
        shared.handle = None;
    }
}

async fn run<S: HeartbeatSource>(
    source: Weak<S>,
    shared: Arc<Mutex<LoopShared>>,
    mut stop_rx: watch::Receiver<bool>,
    generation: u64,
    predecessor: Option<JoinHandle<()>>,
) {
    // Never overlap a beat still running in an earlier task.
    if let Some(predecessor) = predecessor {
        debug!(generation, "Waiting for previous heartbeat task to exit");
        if let Err(e) = predecessor.await {
            warn!("Previous heartbeat task ended abnormally: {}", e);
        }
    }

    loop {
        if *stop_rx.borrow() {
            break;
        }
        let Some(source) = source.upgrade() else {
            debug!("Heartbeat source dropped, ending loop");
            break;
        };

        let outcome = AssertUnwindSafe(Arc::clone(&source).beat())
            .catch_unwind()
            .await;
        match outcome {
            Ok(Ok(())) => {
                debug!("Heartbeat sent");
                lock(&shared).stats.record_success();
            }
            Ok(Err(e)) => {
                warn!("Heartbeat failed: {}", e);
                lock(&shared).stats.record_failure(e.to_string());
            }
            Err(_) => {
                error!("Heartbeat panicked");
                lock(&shared)
                    .stats
                    .record_failure("heartbeat panicked".to_string());
            }
        }

        let interval = source.interval().await.max(MIN_HEARTBEAT_INTERVAL);
        drop(source);

        let stopped = tokio::select! {
            _ = tokio::time::sleep(interval) => false,
            // Err means the sender is gone, which also ends the loop.
            _ = stop_rx.wait_for(|stop| *stop) => true,
        };
        if stopped {
            break;
        }
    }

    // A source drop ends the loop without anyone calling stop.
    {
        let mut guard = lock(&shared);
        if guard.generation == generation && guard.state == LoopState::Running {
            guard.state = LoopState::Stopping;
        }
    }
    finish(&shared, generation);
    debug!(generation, "Heartbeat task exited");
}
