use crate::{Error, Scheduler, ThrottleState};

type Callback<Args> = Box<dyn Fn(Args) + Send + Sync + 'static>;

struct Shared<Args, S> {
    callback: Callback<Args>,
    delay: std::time::Duration,
    scheduler: S,
    state: std::sync::Mutex<ThrottleState<Args>>,
}

impl<Args: Send + 'static, S: Scheduler> Shared<Args, S> {
    // The lock is never held across user code, so a poisoned state is still consistent.
    fn state(&self) -> std::sync::MutexGuard<'_, ThrottleState<Args>> {
        self.state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn open_window(self: &std::sync::Arc<Self>) {
        let shared = std::sync::Arc::clone(self);
        self.scheduler
            .schedule(self.delay, Box::new(move || shared.close_window()));
    }

    fn close_window(self: &std::sync::Arc<Self>) {
        let guard = WindowGuard { shared: self };
        let args = self.state().take_args();
        let Some(args) = args else {
            tracing::debug!("Window closed with nothing to deliver");
            return;
        };
        tracing::debug!("Window closed, invoking callback");
        (self.callback)(args);
        drop(guard);
    }
}

/// Resets the state once the callback has returned or unwound.
struct WindowGuard<'a, Args: Send + 'static, S: Scheduler> {
    shared: &'a std::sync::Arc<Shared<Args, S>>,
}

impl<Args: Send + 'static, S: Scheduler> Drop for WindowGuard<'_, Args, S> {
    fn drop(&mut self) {
        if std::thread::panicking() {
            tracing::warn!("Callback panicked, releasing the window");
        }
        let must_reschedule = self.shared.state().finish();
        if must_reschedule {
            tracing::debug!("Calls arrived during delivery, opening another window");
            self.shared.open_window();
        }
    }
}

/// A callback wrapped in a trailing-edge throttle.
///
/// A call made while the wrapper is idle opens a window of length `delay`. Calls made
/// while the window is open only overwrite the saved arguments. When the window closes
/// the callback runs once, on the [`Scheduler`], with the arguments of the last call.
///
/// The callback is never run from within [`call`](Self::call), not even with a zero
/// delay. If it panics the window is still released, so the wrapper keeps working.
/// Calls made while the callback is running are delivered in a following window.
///
/// Clones share the same window. A pending window still fires after every handle has
/// been dropped.
pub struct Throttled<Args, S> {
    shared: std::sync::Arc<Shared<Args, S>>,
}

impl<Args, S> Clone for Throttled<Args, S> {
    fn clone(&self) -> Self {
        Self {
            shared: std::sync::Arc::clone(&self.shared),
        }
    }
}

impl<Args: Send + 'static, S: Scheduler + std::fmt::Debug> std::fmt::Debug
    for Throttled<Args, S>
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Throttled")
            .field("delay", &self.shared.delay)
            .field("is_throttled", &self.is_throttled())
            .field("scheduler", &self.shared.scheduler)
            .finish_non_exhaustive()
    }
}

impl<Args: Send + 'static, S: Scheduler> Throttled<Args, S> {
    /// Wraps `callback` so that it runs at most once per `delay`, on `scheduler`.
    ///
    /// Whatever `callback` returns is discarded. A callback that needs more than one
    /// argument takes a tuple.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NegativeDelay`] if `delay` is negative.
    pub fn new<F, R>(callback: F, delay: chrono::Duration, scheduler: S) -> Result<Self, Error>
    where
        F: Fn(Args) -> R + Send + Sync + 'static,
    {
        let std_delay = delay.to_std().map_err(|_| Error::NegativeDelay(delay))?;
        Ok(Self::from_std(callback, std_delay, scheduler))
    }

    /// Wraps `callback` with a zero delay.
    ///
    /// The callback still runs on a later turn of `scheduler`, so calls made within the
    /// same turn are coalesced.
    #[must_use]
    pub fn immediate<F, R>(callback: F, scheduler: S) -> Self
    where
        F: Fn(Args) -> R + Send + Sync + 'static,
    {
        Self::from_std(callback, std::time::Duration::ZERO, scheduler)
    }

    fn from_std<F, R>(callback: F, delay: std::time::Duration, scheduler: S) -> Self
    where
        F: Fn(Args) -> R + Send + Sync + 'static,
    {
        Self {
            shared: std::sync::Arc::new(Shared {
                callback: Box::new(move |args| {
                    let _ = callback(args);
                }),
                delay,
                scheduler,
                state: std::sync::Mutex::new(ThrottleState::new()),
            }),
        }
    }

    /// Records a call with `args`, opening a window if none is open.
    pub fn call(&self, args: Args) {
        let opened = self.shared.state().record(args);
        if opened {
            tracing::debug!("Opening a {delay:?} window", delay = self.shared.delay);
            self.shared.open_window();
        } else {
            tracing::trace!("Window already open, coalescing call");
        }
    }

    /// Whether a window is currently open.
    #[must_use]
    pub fn is_throttled(&self) -> bool {
        self.shared.state().is_throttled()
    }

    #[must_use]
    pub fn delay(&self) -> std::time::Duration {
        self.shared.delay
    }
}

/// Wraps `callback` in a [`Throttled`] that closes its windows on `scheduler`.
///
/// # Errors
///
/// Returns [`Error::NegativeDelay`] if `delay` is negative.
pub fn throttle_with<Args, F, R, S>(
    scheduler: S,
    callback: F,
    delay: chrono::Duration,
) -> Result<Throttled<Args, S>, Error>
where
    Args: Send + 'static,
    F: Fn(Args) -> R + Send + Sync + 'static,
    S: Scheduler,
{
    Throttled::new(callback, delay, scheduler)
}

/// Wraps `callback` in a [`Throttled`] that closes its windows on the current tokio runtime.
///
/// # Errors
///
/// Returns [`Error::NoRuntime`] outside of a tokio runtime and [`Error::NegativeDelay`]
/// if `delay` is negative.
#[cfg(feature = "tokio")]
pub fn throttle<Args, F, R>(
    callback: F,
    delay: chrono::Duration,
) -> Result<Throttled<Args, crate::TokioScheduler>, Error>
where
    Args: Send + 'static,
    F: Fn(Args) -> R + Send + Sync + 'static,
{
    Throttled::new(callback, delay, crate::TokioScheduler::try_current()?)
}
