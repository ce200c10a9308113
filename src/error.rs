/// Errors that can occur when constructing a [`Throttled`](crate::Throttled) wrapper.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The requested window length was negative.
    #[error("Delay must not be negative, got {0}")]
    NegativeDelay(chrono::Duration),
    /// No tokio runtime is running on the current thread.
    #[cfg(feature = "tokio")]
    #[error("No tokio runtime available")]
    NoRuntime(#[from] tokio::runtime::TryCurrentError),
}
