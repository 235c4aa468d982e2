//! Error types for the push engine.

use std::sync::Arc;

/// The main error type for the push engine.
///
/// Errors never unwind through the engine: they are delivered to the
/// consumer's `on_error` callback.
#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    /// `request(n)` was called with `n <= 0`
    #[error("request(n) requires n > 0, got {requested}")]
    InvalidDemand { requested: i64 },

    /// A producer failed to generate an item
    #[error("Producer error: {0}")]
    Producer(Arc<dyn std::error::Error + Send + Sync>),

    /// A mapping function failed to build or transform an item
    #[error("Processor error: {0}")]
    Processor(Arc<dyn std::error::Error + Send + Sync>),

    /// A single-consumer publisher was subscribed to a second time
    #[error("Publisher already has a subscriber")]
    AlreadySubscribed,

    /// A channel was closed before a terminal signal arrived
    #[error("Channel was closed unexpectedly")]
    ChannelClosed,

    /// A custom error with a message
    #[error("{0}")]
    Custom(String),
}

// Convenience constructors
impl Error {
    /// Create a producer error from any error type
    pub fn producer<E: std::error::Error + Send + Sync + 'static>(error: E) -> Self {
        Error::Producer(Arc::new(error))
    }

    /// Create a processor error from any error type
    pub fn processor<E: std::error::Error + Send + Sync + 'static>(error: E) -> Self {
        Error::Processor(Arc::new(error))
    }

    /// Create an invalid demand error
    pub fn invalid_demand(requested: i64) -> Self {
        Error::InvalidDemand { requested }
    }

    /// Create a custom error with a message
    pub fn custom<S: Into<String>>(message: S) -> Self {
        Error::Custom(message.into())
    }

    /// Whether this error is a protocol violation rather than a failure
    pub fn is_protocol_violation(&self) -> bool {
        matches!(self, Error::InvalidDemand { .. })
    }
}

impl From<tokio::sync::oneshot::error::RecvError> for Error {
    fn from(_: tokio::sync::oneshot::error::RecvError) -> Self {
        Error::ChannelClosed
    }
}

impl From<Box<dyn std::error::Error + Send + Sync>> for Error {
    fn from(e: Box<dyn std::error::Error + Send + Sync>) -> Self {
        Error::Producer(Arc::from(e))
    }
}

impl From<String> for Error {
    fn from(s: String) -> Self {
        Error::Custom(s)
    }
}

impl From<&str> for Error {
    fn from(s: &str) -> Self {
        Error::Custom(s.to_string())
    }
}

/// Convenience type alias for Results in this crate
pub type Result<T> = std::result::Result<T, Error>;

/// Helper trait for converting foreign errors into our Error type
pub trait IntoError<T> {
    fn into_producer_error(self) -> Result<T>;
    fn into_processor_error(self) -> Result<T>;
}

impl<T, E> IntoError<T> for std::result::Result<T, E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn into_producer_error(self) -> Result<T> {
        self.map_err(Error::producer)
    }

    fn into_processor_error(self) -> Result<T> {
        self.map_err(Error::processor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_demand_display() {
        let err = Error::invalid_demand(0);
        assert_eq!(err.to_string(), "request(n) requires n > 0, got 0");
        assert!(err.is_protocol_violation());
    }

    #[test]
    fn test_into_producer_error() {
        let parsed: std::result::Result<i32, _> = "x".parse::<i32>();
        let err = parsed.into_producer_error().unwrap_err();
        assert!(matches!(err, Error::Producer(_)));
        assert!(!err.is_protocol_violation());
        assert!(err.to_string().starts_with("Producer error:"));
    }

    #[test]
    fn test_string_conversions() {
        assert!(matches!(Error::from("boom"), Error::Custom(m) if m == "boom"));
        assert!(matches!(Error::from(String::from("bang")), Error::Custom(m) if m == "bang"));
    }
}
