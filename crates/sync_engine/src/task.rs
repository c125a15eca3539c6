//! Cancellable periodic background task owned by an aligner.

use std::future::Future;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, warn};

/// When the first tick fires
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FirstTick {
    /// Right after spawning
    Immediate,
    /// One full period after spawning
    AfterPeriod,
}

/// Handle to a periodic tokio task.
///
/// `cancel()` aborts the task synchronously and is idempotent; dropping the
/// handle cancels as well.
#[derive(Debug)]
pub struct ScheduledTask {
    name: &'static str,
    period: Duration,
    handle: Option<JoinHandle<()>>,
}

impl ScheduledTask {
    /// Spawn `tick` every `period` on the current tokio runtime.
    ///
    /// Returns `None` (and logs) when called outside a runtime; the owner then
    /// runs without background maintenance.
    pub fn spawn_periodic<F, Fut>(
        name: &'static str,
        period: Duration,
        first_tick: FirstTick,
        mut tick: F,
    ) -> Option<Self>
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(_) => {
                warn!(task = name, "no tokio runtime available, periodic task disabled");
                return None;
            }
        };

        let period = period.max(Duration::from_millis(1));
        let handle = runtime.spawn(async move {
            let start = match first_tick {
                FirstTick::Immediate => Instant::now(),
                FirstTick::AfterPeriod => Instant::now() + period,
            };
            let mut interval = tokio::time::interval_at(start, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                // A panicking tick is logged; the schedule keeps going.
                let mut current = AbortOnDrop(tokio::spawn(tick()));
                if let Err(error) = (&mut current.0).await {
                    if error.is_panic() {
                        error!(task = name, %error, "periodic task tick panicked");
                    }
                }
            }
        });

        debug!(task = name, period_ms = period.as_millis() as u64, "periodic task started");
        Some(Self {
            name,
            period,
            handle: Some(handle),
        })
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn is_active(&self) -> bool {
        self.handle
            .as_ref()
            .map(|handle| !handle.is_finished())
            .unwrap_or(false)
    }

    pub fn cancel(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
            debug!(task = self.name, "periodic task cancelled");
        }
    }
}

/// Aborts an in-flight tick when the periodic loop itself is aborted.
struct AbortOnDrop(JoinHandle<()>);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

impl Drop for ScheduledTask {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_spawn_without_runtime_is_none() {
        let task = ScheduledTask::spawn_periodic(
            "noop",
            Duration::from_millis(10),
            FirstTick::Immediate,
            || async {},
        );
        assert!(task.is_none());
    }

    #[tokio::test]
    async fn test_ticks_and_cancel() {
        let ticks = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&ticks);
        let mut task = ScheduledTask::spawn_periodic(
            "counter",
            Duration::from_millis(5),
            FirstTick::Immediate,
            move || {
                let counter = Arc::clone(&counter);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                }
            },
        )
        .unwrap();

        tokio::time::sleep(Duration::from_millis(40)).await;
        assert!(ticks.load(Ordering::SeqCst) >= 2);

        task.cancel();
        task.cancel();
        tokio::task::yield_now().await;
        let after_cancel = ticks.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), after_cancel);
        assert!(!task.is_active());
    }

    #[tokio::test]
    async fn test_panicking_tick_does_not_stop_schedule() {
        let ticks = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&ticks);
        let mut task = ScheduledTask::spawn_periodic(
            "flaky",
            Duration::from_millis(5),
            FirstTick::Immediate,
            move || {
                let counter = Arc::clone(&counter);
                async move {
                    if counter.fetch_add(1, Ordering::SeqCst) % 2 == 0 {
                        panic!("tick failure");
                    }
                }
            },
        )
        .unwrap();

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(ticks.load(Ordering::SeqCst) >= 3);
        assert!(task.is_active());
        task.cancel();
    }
}
