//! Named, single-slot job queues drained on a fixed polling interval.

use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures_util::future::{BoxFuture, FutureExt};
use mosaic_logging::{mosaic_debug, mosaic_error, mosaic_info};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

pub type JobId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Queued,
    Running,
    Completed,
    Failed,
}

impl JobState {
    fn is_finished(self) -> bool {
        matches!(self, JobState::Completed | JobState::Failed)
    }
}

type ExecutorFn<P, R> = Arc<dyn Fn(P) -> BoxFuture<'static, anyhow::Result<R>> + Send + Sync>;
type SuccessFn<P, R> = Arc<dyn Fn(&P, &R) + Send + Sync>;
type ErrorFn<P> = Arc<dyn Fn(&anyhow::Error, &P) + Send + Sync>;

const RETAINED_STATES: usize = 1024;

struct QueueState<P> {
    pending: Mutex<VecDeque<(JobId, P)>>,
    states: Mutex<HashMap<JobId, JobState>>,
    running: AtomicBool,
    next_id: AtomicU64,
    stop: Mutex<Option<CancellationToken>>,
}

/// At most one job of a queue runs at a time; jobs start in enqueue order.
///
/// A failed job is reported to the error callback and the queue moves on.
pub struct QueueExecutor<P, R> {
    name: String,
    interval: Duration,
    executor: ExecutorFn<P, R>,
    on_success: Option<SuccessFn<P, R>>,
    on_error: Option<ErrorFn<P>>,
    state: Arc<QueueState<P>>,
}

impl<P, R> Clone for QueueExecutor<P, R> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            interval: self.interval,
            executor: self.executor.clone(),
            on_success: self.on_success.clone(),
            on_error: self.on_error.clone(),
            state: self.state.clone(),
        }
    }
}

impl<P, R> QueueExecutor<P, R>
where
    P: Clone + Send + Sync + 'static,
    R: Send + 'static,
{
    pub fn new<F, Fut>(name: impl Into<String>, executor: F) -> Self
    where
        F: Fn(P) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<R>> + Send + 'static,
    {
        Self {
            name: name.into(),
            interval: Duration::from_millis(1000),
            executor: Arc::new(move |payload| executor(payload).boxed()),
            on_success: None,
            on_error: None,
            state: Arc::new(QueueState {
                pending: Mutex::new(VecDeque::new()),
                states: Mutex::new(HashMap::new()),
                running: AtomicBool::new(false),
                next_id: AtomicU64::new(1),
                stop: Mutex::new(None),
            }),
        }
    }

    pub fn on_success(mut self, callback: impl Fn(&P, &R) + Send + Sync + 'static) -> Self {
        self.on_success = Some(Arc::new(callback));
        self
    }

    pub fn on_error(mut self, callback: impl Fn(&anyhow::Error, &P) + Send + Sync + 'static) -> Self {
        self.on_error = Some(Arc::new(callback));
        self
    }

    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn enqueue(&self, payload: P) -> JobId {
        let id = self.state.next_id.fetch_add(1, Ordering::SeqCst);
        self.states().insert(id, JobState::Queued);
        lock(&self.state.pending).push_back((id, payload));
        mosaic_debug!("{}: queued job {}", self.name, id);
        id
    }

    pub fn pending(&self) -> usize {
        lock(&self.state.pending).len()
    }

    pub fn is_running(&self) -> bool {
        self.state.running.load(Ordering::SeqCst)
    }

    pub fn state_of(&self, id: JobId) -> Option<JobState> {
        self.states().get(&id).copied()
    }

    /// Start the polling loop. Calling it again while started does nothing.
    pub fn start(&self) {
        let token = {
            let mut stop = lock(&self.state.stop);
            if stop.is_some() {
                return;
            }
            let token = CancellationToken::new();
            *stop = Some(token.clone());
            token
        };
        mosaic_info!("{}: started, polling every {:?}", self.name, self.interval);

        let queue = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(queue.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => queue.poll(),
                }
            }
            mosaic_info!("{}: stopped", queue.name);
        });
    }

    /// Stop polling. A job already running finishes; queued jobs stay queued.
    pub fn stop(&self) {
        if let Some(token) = lock(&self.state.stop).take() {
            token.cancel();
        }
    }

    fn poll(&self) {
        if self
            .state
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return;
        }
        let Some((id, payload)) = lock(&self.state.pending).pop_front() else {
            self.state.running.store(false, Ordering::SeqCst);
            return;
        };
        self.states().insert(id, JobState::Running);

        let queue = self.clone();
        tokio::spawn(async move {
            let _slot = SlotRelease(&queue.state.running);
            let outcome = AssertUnwindSafe((queue.executor)(payload.clone()))
                .catch_unwind()
                .await
                .unwrap_or_else(|_| Err(anyhow::anyhow!("job panicked")));
            match outcome {
                Ok(result) => {
                    queue.finish(id, JobState::Completed);
                    if let Some(callback) = &queue.on_success {
                        callback(&payload, &result);
                    }
                }
                Err(err) => {
                    mosaic_error!("{}: job {} failed: {:#}", queue.name, id, err);
                    queue.finish(id, JobState::Failed);
                    if let Some(callback) = &queue.on_error {
                        callback(&err, &payload);
                    }
                }
            }
        });
    }

    fn finish(&self, id: JobId, state: JobState) {
        let mut states = self.states();
        states.insert(id, state);
        if states.len() > RETAINED_STATES {
            states.retain(|_, state| !state.is_finished());
        }
    }

    fn states(&self) -> MutexGuard<'_, HashMap<JobId, JobState>> {
        lock(&self.state.states)
    }
}

/// Frees the single job slot when the job task ends, even if a callback panics.
struct SlotRelease<'a>(&'a AtomicBool);

impl Drop for SlotRelease<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
