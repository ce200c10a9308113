use std::time::Duration;

/// A deferred unit of work handed to a [`Scheduler`].
pub type Action = Box<dyn FnOnce() + Send + 'static>;

/// A source of deferred execution.
///
/// Implementations run `action` once, no earlier than `delay` after `schedule` was called,
/// outside the call stack of `schedule`. Running `action` inline is not allowed, even for a
/// zero `delay`: [`Throttled`](crate::Throttled) relies on its callback never running
/// synchronously within a call.
pub trait Scheduler: Send + Sync + 'static {
    /// Runs `action` after `delay` has elapsed.
    fn schedule(&self, delay: Duration, action: Action);
}

type Queue = std::collections::BTreeMap<(Duration, u64), Action>;

#[derive(Default)]
struct Clock {
    now: Duration,
    next_sequence: u64,
    queue: Queue,
}

/// A simulated clock that only moves when told to.
///
/// Scheduled actions are kept in a queue ordered by due time, ties broken by the order in
/// which they were scheduled, and run from [`advance`](Self::advance). Clones share the same
/// clock, so a test can keep one clone and hand another to the code under test.
#[derive(Clone, Default)]
pub struct ManualScheduler {
    clock: std::sync::Arc<std::sync::Mutex<Clock>>,
}

impl std::fmt::Debug for ManualScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let clock = self.clock();
        f.debug_struct("ManualScheduler")
            .field("now", &clock.now)
            .field("pending", &clock.queue.len())
            .finish()
    }
}

impl ManualScheduler {
    /// Creates a clock at time zero with nothing scheduled.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    // No user code runs while the lock is held, so a poisoned clock is still consistent.
    fn clock(&self) -> std::sync::MutexGuard<'_, Clock> {
        self.clock
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Time elapsed on the simulated clock since it was created.
    #[must_use]
    pub fn now(&self) -> Duration {
        self.clock().now
    }

    /// Number of actions that have been scheduled but not run yet.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.clock().queue.len()
    }

    /// Moves the clock forward by `by`, running every action that falls due on the way.
    ///
    /// Actions run in due-time order with the clock set to their due time. Actions that are
    /// scheduled while advancing run too if they fall due within the advanced span.
    ///
    /// # Panics
    ///
    /// Re-raises a panic from a scheduled action. The clock then stays at that action's due
    /// time and the remaining actions stay queued.
    pub fn advance(&self, by: Duration) {
        let target = self.clock().now.saturating_add(by);
        tracing::trace!("Advancing manual clock to {target:?}");
        loop {
            let action = {
                let mut clock = self.clock();
                let is_due = clock
                    .queue
                    .first_key_value()
                    .is_some_and(|((due, _), _)| *due <= target);
                if !is_due {
                    break;
                }
                let Some(((due, _), action)) = clock.queue.pop_first() else {
                    break;
                };
                clock.now = due;
                action
            };
            action();
        }
        self.clock().now = target;
    }

    /// Runs everything that is already due without moving the clock.
    pub fn run_pending(&self) {
        self.advance(Duration::ZERO);
    }
}

impl Scheduler for ManualScheduler {
    fn schedule(&self, delay: Duration, action: Action) {
        let mut clock = self.clock();
        let due = clock.now.saturating_add(delay);
        let sequence = clock.next_sequence;
        clock.next_sequence += 1;
        tracing::trace!("Scheduling action #{sequence} for {due:?}");
        clock.queue.insert((due, sequence), action);
    }
}

/// Runs deferred actions as tasks on a tokio runtime.
///
/// Each scheduled action gets its own task that sleeps for the delay and then runs the
/// action. The runtime must have its time driver enabled.
#[cfg(feature = "tokio")]
#[derive(Debug, Clone)]
pub struct TokioScheduler {
    handle: tokio::runtime::Handle,
}

#[cfg(feature = "tokio")]
impl TokioScheduler {
    /// Creates a scheduler that spawns onto the runtime behind `handle`.
    #[must_use]
    pub fn new(handle: tokio::runtime::Handle) -> Self {
        Self { handle }
    }

    /// Creates a scheduler for the runtime the current thread is running in.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoRuntime`](crate::Error::NoRuntime) when called outside of a tokio
    /// runtime.
    pub fn try_current() -> Result<Self, crate::Error> {
        Ok(Self::new(tokio::runtime::Handle::try_current()?))
    }
}

#[cfg(feature = "tokio")]
impl Scheduler for TokioScheduler {
    fn schedule(&self, delay: Duration, action: Action) {
        tracing::trace!("Spawning deferred action in {delay:?}");
        // Detached: the task owns the action and nothing ever cancels it.
        drop(self.handle.spawn(async move {
            tokio::time::sleep(delay).await;
            action();
        }));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type Log = std::sync::Arc<std::sync::Mutex<Vec<(&'static str, Duration)>>>;

    fn logging_action(log: &Log, clock: &ManualScheduler, name: &'static str) -> Action {
        let log = log.clone();
        let clock = clock.clone();
        Box::new(move || log.lock().unwrap().push((name, clock.now())))
    }

    mod manual {
        use pretty_assertions::assert_eq;

        use super::*;

        #[test]
        fn test_schedule_does_not_run_action_inline() {
            let clock = ManualScheduler::new();
            let log = Log::default();

            clock.schedule(Duration::ZERO, logging_action(&log, &clock, "zero"));

            assert!(log.lock().unwrap().is_empty());
            assert_eq!(clock.pending(), 1);
        }

        #[test]
        fn test_run_pending_runs_zero_delay_actions() {
            let clock = ManualScheduler::new();
            let log = Log::default();
            clock.schedule(Duration::ZERO, logging_action(&log, &clock, "zero"));

            clock.run_pending();

            assert_eq!(*log.lock().unwrap(), vec![("zero", Duration::ZERO)]);
            assert_eq!(clock.pending(), 0);
        }

        #[test]
        fn test_advance_runs_only_due_actions() {
            let clock = ManualScheduler::new();
            let log = Log::default();
            clock.schedule(
                Duration::from_millis(100),
                logging_action(&log, &clock, "early"),
            );
            clock.schedule(
                Duration::from_millis(300),
                logging_action(&log, &clock, "late"),
            );

            clock.advance(Duration::from_millis(200));

            assert_eq!(
                *log.lock().unwrap(),
                vec![("early", Duration::from_millis(100))]
            );
            assert_eq!(clock.now(), Duration::from_millis(200));
            assert_eq!(clock.pending(), 1);
        }

        #[test]
        fn test_actions_run_in_due_order_then_schedule_order() {
            let clock = ManualScheduler::new();
            let log = Log::default();
            clock.schedule(Duration::from_millis(50), logging_action(&log, &clock, "c"));
            clock.schedule(Duration::from_millis(10), logging_action(&log, &clock, "a"));
            clock.schedule(Duration::from_millis(50), logging_action(&log, &clock, "d"));
            clock.schedule(Duration::from_millis(10), logging_action(&log, &clock, "b"));

            clock.advance(Duration::from_millis(50));

            assert_eq!(
                *log.lock().unwrap(),
                vec![
                    ("a", Duration::from_millis(10)),
                    ("b", Duration::from_millis(10)),
                    ("c", Duration::from_millis(50)),
                    ("d", Duration::from_millis(50)),
                ]
            );
        }

        #[test]
        fn test_actions_scheduled_while_advancing_run_when_due() {
            let clock = ManualScheduler::new();
            let log = Log::default();
            let inner_clock = clock.clone();
            let inner_log = log.clone();
            clock.schedule(
                Duration::from_millis(10),
                Box::new(move || {
                    let action = logging_action(&inner_log, &inner_clock, "nested");
                    inner_clock.schedule(Duration::from_millis(20), action);
                }),
            );

            clock.advance(Duration::from_millis(40));

            assert_eq!(
                *log.lock().unwrap(),
                vec![("nested", Duration::from_millis(30))]
            );
        }

        #[test]
        fn test_delay_is_measured_from_current_time() {
            let clock = ManualScheduler::new();
            let log = Log::default();
            clock.advance(Duration::from_millis(150));

            clock.schedule(
                Duration::from_millis(100),
                logging_action(&log, &clock, "late"),
            );
            clock.advance(Duration::from_millis(99));
            assert!(log.lock().unwrap().is_empty());
            clock.advance(Duration::from_millis(1));

            assert_eq!(
                *log.lock().unwrap(),
                vec![("late", Duration::from_millis(250))]
            );
        }

        #[test]
        fn test_panicking_action_leaves_remaining_queue_intact() {
            let clock = ManualScheduler::new();
            let log = Log::default();
            clock.schedule(Duration::from_millis(10), Box::new(|| panic!("boom")));
            clock.schedule(
                Duration::from_millis(20),
                logging_action(&log, &clock, "after"),
            );

            let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                clock.advance(Duration::from_millis(30));
            }));

            assert!(result.is_err());
            assert_eq!(clock.now(), Duration::from_millis(10));
            assert_eq!(clock.pending(), 1);

            clock.advance(Duration::from_millis(20));
            assert_eq!(
                *log.lock().unwrap(),
                vec![("after", Duration::from_millis(20))]
            );
        }
    }

    #[cfg(feature = "tokio")]
    mod tokio_tests {
        use super::*;

        #[test]
        fn test_try_current_fails_outside_runtime() {
            let result = TokioScheduler::try_current();

            assert!(matches!(result, Err(crate::Error::NoRuntime(_))));
        }

        #[tokio::test(flavor = "current_thread", start_paused = true)]
        async fn test_action_runs_after_delay() {
            let scheduler = TokioScheduler::try_current().unwrap();
            let (tx, rx) = tokio::sync::oneshot::channel();
            let delay = Duration::from_millis(100);

            let start = tokio::time::Instant::now();
            scheduler.schedule(
                delay,
                Box::new(move || {
                    let _ = tx.send(tokio::time::Instant::now());
                }),
            );
            let fired_at = rx.await.unwrap();

            assert!(fired_at - start >= delay);
        }

        #[tokio::test(flavor = "current_thread", start_paused = true)]
        async fn test_zero_delay_is_not_inline() {
            let scheduler = TokioScheduler::try_current().unwrap();
            let fired = std::sync::Arc::new(std::sync::atomic::AtomicBool::new(false));
            let (tx, rx) = tokio::sync::oneshot::channel();

            let flag = fired.clone();
            scheduler.schedule(
                Duration::ZERO,
                Box::new(move || {
                    flag.store(true, std::sync::atomic::Ordering::SeqCst);
                    let _ = tx.send(());
                }),
            );
            assert!(!fired.load(std::sync::atomic::Ordering::SeqCst));

            rx.await.unwrap();
            assert!(fired.load(std::sync::atomic::Ordering::SeqCst));
        }
    }
}
