//! Errors delivered through an observable's error channel.

use core::fmt::Display;
use core::time::Duration;

use thiserror::Error;

/// Error carried by the `error` notification of a stream.
///
/// Errors never unwind across a subscription boundary. Anything that fails
/// inside a producer or an operator is converted into one of these and sent
/// downstream, exactly like a value.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RxError {
    #[error("{0}")]
    Message(String),

    #[error("no elements in sequence")]
    EmptySequence,

    #[error("argument out of range: index {index}")]
    ArgumentOutOfRange { index: usize },

    #[error("timeout after {0:?}")]
    Timeout(Duration),

    #[error("callback failed: {0}")]
    Callback(String),
}

impl RxError {
    /// Build a [`RxError::Message`] from anything printable.
    pub fn msg(message: impl Display) -> Self {
        Self::Message(message.to_string())
    }
}
