//! Background, delayed, and periodic tasks.
//!
//! A background task runs outside its session's exclusion scope and
//! re-acquires it only to apply its completion, so long-running work never
//! holds up foreground events. Completion after the session has been cleared
//! or expired is a logged no-op; the work has no interested party left.
//!
//! Delayed and periodic tasks own their timers; the returned [`TaskHandle`]
//! is the explicit cancellation handle. Stopping is best-effort: the task
//! stops before its next firing, not mid-execution.

use crate::dispatch::HandlerValue;
use crate::engine::Engine;
use crate::error::{EngineError, SessionError, TaskError};
use crate::state::StateInstance;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

fn task_id() -> String {
    format!("task_{}", Uuid::new_v4().simple())
}

/// Handle to a scheduled (delayed or periodic) task.
pub struct TaskHandle {
    id: String,
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl TaskHandle {
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Request the task to stop. Takes effect before the next scheduled
    /// firing; an execution already in progress runs to completion.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Wait for the task to wind down.
    pub async fn join(self) -> Result<(), TaskError> {
        self.handle
            .await
            .map_err(|source| TaskError::Join(source.to_string()))
    }
}

/// Run `work` once after `delay`, unless stopped first.
pub fn delayed<F>(delay: Duration, work: F) -> TaskHandle
where
    F: Future<Output = ()> + Send + 'static,
{
    let id = task_id();
    let cancel = CancellationToken::new();
    let child = cancel.clone();
    let handle = tokio::spawn(async move {
        tokio::select! {
            () = child.cancelled() => {}
            () = tokio::time::sleep(delay) => work.await,
        }
    });
    TaskHandle { id, cancel, handle }
}

/// Run `work` every `interval` (first run immediately), until stopped or
/// `max_runs` executions have happened.
pub fn periodic<F, Fut>(interval: Duration, max_runs: Option<u64>, mut work: F) -> TaskHandle
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let id = task_id();
    let cancel = CancellationToken::new();
    let child = cancel.clone();
    let handle = tokio::spawn(async move {
        let mut timer = tokio::time::interval(interval);
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut runs = 0u64;
        loop {
            tokio::select! {
                () = child.cancelled() => break,
                _ = timer.tick() => {
                    work().await;
                    runs += 1;
                    if max_runs.is_some_and(|limit| runs >= limit) {
                        break;
                    }
                }
            }
        }
    });
    TaskHandle { id, cancel, handle }
}

/// Launch long-running work for a session without blocking its events.
///
/// `work` executes outside the session's exclusion scope. When it resolves,
/// the scope is re-acquired and `on_complete` applied to the state instance;
/// the resulting delta and actions flow out through the session's outbound
/// channel. There is no implicit cancellation on session expiry: the work
/// runs to completion and its result is dropped if the session is gone.
pub fn background<W, T, C>(
    engine: Arc<Engine>,
    session_id: impl Into<String>,
    state_type: impl Into<String>,
    work: W,
    on_complete: C,
) -> JoinHandle<()>
where
    W: Future<Output = T> + Send + 'static,
    T: Send + 'static,
    C: FnOnce(&mut StateInstance, T) -> anyhow::Result<HandlerValue> + Send + 'static,
{
    let session_id = session_id.into();
    let state_type = state_type.into();
    let id = task_id();
    tokio::spawn(async move {
        let value = work.await;
        let applied = engine
            .mutate(&session_id, &state_type, move |instance| {
                on_complete(instance, value)
            })
            .await;
        match applied {
            Ok(_) => {}
            Err(EngineError::Session(SessionError::Gone { .. })) => {
                tracing::debug!(
                    task = %id,
                    session = %session_id,
                    "background completion dropped; session gone"
                );
            }
            Err(error) => {
                tracing::warn!(task = %id, "background completion failed: {error}");
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};
    use tokio::time::sleep;

    #[tokio::test]
    async fn delayed_task_fires_after_the_delay() {
        let counter = Arc::new(AtomicU64::new(0));
        let task_counter = Arc::clone(&counter);
        let handle = delayed(Duration::from_millis(10), async move {
            task_counter.fetch_add(1, Ordering::SeqCst);
        });
        handle.join().await.unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn stopped_delayed_task_never_fires() {
        let counter = Arc::new(AtomicU64::new(0));
        let task_counter = Arc::clone(&counter);
        let handle = delayed(Duration::from_millis(50), async move {
            task_counter.fetch_add(1, Ordering::SeqCst);
        });
        handle.stop();
        handle.join().await.unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn periodic_task_respects_max_runs() {
        let counter = Arc::new(AtomicU64::new(0));
        let task_counter = Arc::clone(&counter);
        let handle = periodic(Duration::from_millis(5), Some(3), move || {
            let counter = Arc::clone(&task_counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        });
        handle.join().await.unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn stopped_periodic_task_stops_firing() {
        let counter = Arc::new(AtomicU64::new(0));
        let task_counter = Arc::clone(&counter);
        let handle = periodic(Duration::from_millis(5), None, move || {
            let counter = Arc::clone(&task_counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        });
        sleep(Duration::from_millis(20)).await;
        handle.stop();
        handle.join().await.unwrap();
        let frozen = counter.load(Ordering::SeqCst);
        assert!(frozen >= 1);

        sleep(Duration::from_millis(30)).await;
        assert_eq!(counter.load(Ordering::SeqCst), frozen);
    }
}
