/// Internal state of a throttle wrapper.
///
/// `is_throttled` is set while a window is open, that is from the call that opened the
/// window until the deferred action has finished running the callback. `saved_args` holds
/// the arguments of the latest call that has not been delivered yet.
///
/// This type does no scheduling on its own. [`Throttled`](crate::Throttled) drives it and
/// acts on the values it returns.
#[derive(Debug, Clone, PartialEq)]
pub struct ThrottleState<Args> {
    is_throttled: bool,
    saved_args: Option<Args>,
}

impl<Args> Default for ThrottleState<Args> {
    fn default() -> Self {
        Self {
            is_throttled: false,
            saved_args: None,
        }
    }
}

impl<Args> ThrottleState<Args> {
    /// Creates an idle state with nothing saved.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a call, overwriting any arguments saved earlier in the window.
    ///
    /// Returns `true` if the state was idle, in which case the caller must schedule the
    /// deferred action that closes the window.
    pub fn record(&mut self, args: Args) -> bool {
        self.saved_args = Some(args);
        if self.is_throttled {
            return false;
        }
        self.is_throttled = true;
        true
    }

    /// Moves the saved arguments out for delivery. The window stays open.
    pub fn take_args(&mut self) -> Option<Args> {
        debug_assert!(self.is_throttled);
        self.saved_args.take()
    }

    /// Ends the delivery started by [`take_args`](Self::take_args).
    ///
    /// Returns `true` if calls were recorded while the callback ran. The window is then
    /// kept open and the caller must schedule another deferred action for them.
    pub fn finish(&mut self) -> bool {
        if self.saved_args.is_some() {
            return true;
        }
        self.is_throttled = false;
        false
    }

    #[must_use]
    pub fn is_throttled(&self) -> bool {
        self.is_throttled
    }

    #[must_use]
    pub fn has_saved_args(&self) -> bool {
        self.saved_args.is_some()
    }
}
