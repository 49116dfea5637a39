use thiserror::Error;

/// Errors raised by the routing engine.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RoutingError {
    /// The capture stream for an application could not be opened or read
    /// (permission denied, device busy, app not capturable).
    #[error("capture stream error: {0}")]
    CaptureStream(String),

    #[error("output stream error: {0}")]
    OutputStream(String),

    /// Attach/switch targeting a key that is already attached to the session.
    #[error("output {0} is already attached")]
    DuplicateOutput(String),

    #[error("already routing {0}")]
    AlreadyRouting(String),

    #[error("not routing {0}")]
    NotRouting(String),

    #[error("invalid application id: {0:?}")]
    InvalidApplication(String),

    #[error("session has no outputs")]
    NoOutputs,

    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("configuration failed: {0}")]
    Configuration(String),
}

/// Errors delivered to callers of a [`ControlPlane`](crate::ControlPlane).
///
/// Transport details stay inside the control-plane implementation; callers
/// only learn whether the command ran and what it printed.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ControlError {
    #[error("control plane not connected")]
    NotConnected,

    #[error("command failed: {0}")]
    Failed(String),

    #[error("command exited with status {code}: {output}")]
    Exit { code: i32, output: String },

    #[error("timed out waiting for command result")]
    Timeout,

    /// The control plane went away before producing a result.
    #[error("control plane unavailable")]
    Unavailable,
}

/// Failure reading or writing persisted preferences.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("storage error: {0}")]
pub struct StorageError(pub String);
