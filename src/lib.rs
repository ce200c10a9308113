//! # Lastword
//!
//! `lastword` provides a trailing-edge throttle: a wrapper around a callback that
//! lets at most one invocation through per delay window.
//!
//! The main type is [`Throttled`]. The first call made while the wrapper is idle opens
//! a window of length `delay`. Every call made before the window closes overwrites the
//! saved arguments, and when the window closes the callback runs exactly once with the
//! arguments of the *last* of those calls. Intermediate calls are coalesced, never
//! queued, and the window is never extended by later calls (this is not a debounce).
//!
//! The callback is never run inline. When the window closes is decided by a
//! [`Scheduler`]: [`TokioScheduler`] runs deferred actions on a tokio runtime and
//! [`ManualScheduler`] is a simulated clock that is advanced by hand.
//!
//! Rust has no implicit receiver, so there is no saved "calling context". Anything the
//! callback needs besides its arguments must be captured by the callback closure.

mod error;
mod scheduler;
mod state;
mod throttled;

pub use error::*;
pub use scheduler::*;
pub use state::*;
pub use throttled::*;
