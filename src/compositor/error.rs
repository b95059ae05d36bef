//! Compositor error types

use thiserror::Error;
use x11rb::errors::{ConnectionError, ReplyError, ReplyOrIdError};
use x11rb::protocol::xproto::Window;

#[derive(Debug, Error)]
pub enum CompError {
    /// Connection to the X server is gone; the main loop exits
    #[error("X connection lost: {0}")]
    Connection(#[from] ConnectionError),

    /// The server answered a request with an error
    #[error("X protocol error: {0}")]
    Protocol(String),

    /// A window's contents could not be bound for painting
    #[error("binding contents of window {window:#x} failed: {reason}")]
    BindFailed { window: Window, reason: String },

    /// A required extension or version is missing
    #[error("unsupported server: {0}")]
    Unsupported(String),

    /// Another compositing manager owns the screen
    #[error("another compositing manager is already running")]
    AlreadyRunning,
}

impl CompError {
    /// Errors after which the compositor cannot continue
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            CompError::Connection(_) | CompError::Unsupported(_) | CompError::AlreadyRunning
        )
    }
}

impl From<ReplyError> for CompError {
    fn from(e: ReplyError) -> Self {
        match e {
            ReplyError::ConnectionError(c) => CompError::Connection(c),
            ReplyError::X11Error(x) => CompError::Protocol(format!("{:?}", x.error_kind)),
        }
    }
}

impl From<ReplyOrIdError> for CompError {
    fn from(e: ReplyOrIdError) -> Self {
        match e {
            ReplyOrIdError::ConnectionError(c) => CompError::Connection(c),
            ReplyOrIdError::X11Error(x) => CompError::Protocol(format!("{:?}", x.error_kind)),
            ReplyOrIdError::IdsExhausted => CompError::Protocol("resource ids exhausted".into()),
        }
    }
}

pub type CompResult<T> = std::result::Result<T, CompError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_connection_level_errors_are_fatal() {
        assert!(CompError::Connection(ConnectionError::UnknownError).is_fatal());
        assert!(CompError::AlreadyRunning.is_fatal());
        assert!(!CompError::Protocol("BadWindow".into()).is_fatal());
        assert!(
            !CompError::BindFailed {
                window: 1,
                reason: "BadMatch".into()
            }
            .is_fatal()
        );
    }
}
