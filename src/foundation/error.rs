/// Result alias used across the bridge.
pub type BridgeResult<T> = Result<T, BridgeError>;

/// Error taxonomy of the bridge.
///
/// `Argument` is always raised synchronously at the call site, before any background work is
/// scheduled. `Engine` raised inside an async work unit travels back through the completion
/// callback instead of unwinding on the worker thread.
#[derive(thiserror::Error, Debug)]
pub enum BridgeError {
    /// Malformed or missing inputs.
    #[error("argument error: {0}")]
    Argument(String),

    /// Use of a destroyed, foreign, or never-issued resource handle.
    #[error("invalid handle: {0}")]
    InvalidHandle(String),

    /// Failure inside the wrapped engine call.
    #[error("engine error: {0}")]
    Engine(String),

    /// Conflicting search session transition.
    #[error("session busy: {0}")]
    SessionBusy(String),

    /// Anything else (IO, image decoding, ...).
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl BridgeError {
    /// Build a [`BridgeError::Argument`] value.
    pub fn argument(msg: impl Into<String>) -> Self {
        Self::Argument(msg.into())
    }

    /// Build a [`BridgeError::InvalidHandle`] value.
    pub fn invalid_handle(msg: impl Into<String>) -> Self {
        Self::InvalidHandle(msg.into())
    }

    /// Build a [`BridgeError::Engine`] value.
    pub fn engine(msg: impl Into<String>) -> Self {
        Self::Engine(msg.into())
    }

    /// Build a [`BridgeError::SessionBusy`] value.
    pub fn session_busy(msg: impl Into<String>) -> Self {
        Self::SessionBusy(msg.into())
    }
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/error.rs"]
mod tests;
