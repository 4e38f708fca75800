//! Error handling for layerkit
//!
//! Provides error types for every failure the reactive layer can observe:
//! - Decode errors (malformed inbound payloads, dropped per event)
//! - Handler errors (subscriber failures, isolated per handler)
//! - Sink errors (outbound command delivery failures)
//! - Ramp errors (rejected ramp requests)
//!
//! None of these are fatal: the dispatcher and the ramp controller log them
//! and keep going. All error types use `thiserror`.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use thiserror::Error;

/// Inbound payload could not be decoded.
///
/// The event is dropped and no handler runs for it.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DecodeError {
    /// Payload is not valid JSON
    #[error("Malformed payload on topic '{topic}': {reason}")]
    Malformed {
        /// Topic the payload arrived on.
        topic: String,
        /// Parser message.
        reason: String,
    },

    /// Payload bytes are not valid UTF-8 text
    #[error("Payload on topic '{topic}' is not UTF-8")]
    NotUtf8 {
        /// Topic the payload arrived on.
        topic: String,
    },
}

/// Subscriber or topic handler failure.
///
/// Isolated to the failing handler; sibling handlers still run.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum HandlerError {
    /// A required field is absent from the payload
    #[error("Missing field '{field}'")]
    MissingField {
        /// Name of the missing field.
        field: String,
    },

    /// A field is present but has the wrong shape
    #[error("Invalid field '{field}': {reason}")]
    InvalidField {
        /// Name of the offending field.
        field: String,
        /// What was wrong with it.
        reason: String,
    },

    /// The handler panicked; the panic was caught at the call site
    #[error("Handler panicked: {message}")]
    Panicked {
        /// Panic payload, if it was a string.
        message: String,
    },

    /// Generic handler failure
    #[error("Handler failed: {message}")]
    Other {
        /// The error message.
        message: String,
    },
}

impl HandlerError {
    /// Shorthand for a missing payload field
    pub fn missing(field: impl Into<String>) -> Self {
        HandlerError::MissingField {
            field: field.into(),
        }
    }

    /// Shorthand for a malformed payload field
    pub fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        HandlerError::InvalidField {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Create an error from a string message
    pub fn other(msg: impl Into<String>) -> Self {
        HandlerError::Other {
            message: msg.into(),
        }
    }

    /// Run one handler invocation, turning a panic into
    /// [`HandlerError::Panicked`] so the caller can move on to the next one.
    ///
    /// `AssertUnwindSafe` is used: state behind a lock the handler held when
    /// it panicked may be left half-updated.
    pub fn catch<F>(invoke: F) -> HandlerResult
    where
        F: FnOnce() -> HandlerResult,
    {
        std::panic::catch_unwind(AssertUnwindSafe(invoke))
            .unwrap_or_else(|panic| Err(HandlerError::from_panic(panic.as_ref())))
    }

    fn from_panic(panic: &(dyn Any + Send)) -> Self {
        let message = if let Some(msg) = panic.downcast_ref::<&'static str>() {
            (*msg).to_string()
        } else if let Some(msg) = panic.downcast_ref::<String>() {
            msg.clone()
        } else {
            "unknown panic".to_string()
        };
        HandlerError::Panicked { message }
    }
}

/// Outbound command delivery failure.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SinkError {
    /// Transport is not available
    #[error("Transport unavailable: {reason}")]
    Unavailable {
        /// Why the transport could not be used.
        reason: String,
    },

    /// Request document could not be rendered
    #[error("Failed to render request: {reason}")]
    Serialization {
        /// Serializer message.
        reason: String,
    },

    /// Transport accepted the call but reported a failure
    #[error("Publish to '{topic}' failed: {reason}")]
    PublishFailed {
        /// Destination topic.
        topic: String,
        /// Transport message.
        reason: String,
    },
}

/// A ramp request was rejected before it became active.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RampError {
    /// Speed bound is NaN or infinite
    #[error("Ramp speed {name} must be finite, got {value}")]
    NonFiniteSpeed {
        /// Which bound was bad.
        name: &'static str,
        /// The offending value.
        value: f64,
    },

    /// Step is NaN or infinite
    #[error("Ramp step must be finite, got {0}")]
    NonFiniteStep(f64),

    /// Target layer does not lie after the start layer
    #[error("Ramp target layer {target} must be greater than start layer {start}")]
    EmptyLayerRange {
        /// Start layer of the request.
        start: i32,
        /// Target layer of the request.
        target: i32,
    },
}

/// Main error type for layerkit
///
/// A unified error type that can represent any error from all layers.
#[derive(Error, Debug)]
pub enum Error {
    /// Decode error
    #[error(transparent)]
    Decode(#[from] DecodeError),

    /// Handler error
    #[error(transparent)]
    Handler(#[from] HandlerError),

    /// Sink error
    #[error(transparent)]
    Sink(#[from] SinkError),

    /// Ramp error
    #[error(transparent)]
    Ramp(#[from] RampError),

    /// Standard I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create an error from a string message
    pub fn other(msg: impl Into<String>) -> Self {
        Error::Other(msg.into())
    }

    /// Check if this is a decode error
    pub fn is_decode_error(&self) -> bool {
        matches!(self, Error::Decode(_))
    }

    /// Check if this is a sink error
    pub fn is_sink_error(&self) -> bool {
        matches!(self, Error::Sink(_))
    }
}

/// Result type using Error
pub type Result<T> = std::result::Result<T, Error>;

/// Return type of every subscriber and topic handler
pub type HandlerResult = std::result::Result<(), HandlerError>;
