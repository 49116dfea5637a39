use thiserror::Error;

use soundmaster_core::ControlError;

/// Errors raised inside the ADB control plane.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AdbError {
    /// Key bytes were empty, not PKCS#8/PKCS#1, or not a 2048-bit RSA key.
    #[error("key import failed: {0}")]
    KeyImport(String),

    #[error("discovery failed: {0}")]
    Discovery(String),

    /// The daemon rejected or never accepted our key.
    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("connect failed: {0}")]
    Connect(String),

    #[error("command failed: {0}")]
    Command(String),

    #[error("command exited with status {code}")]
    CommandExit { code: i32, output: String },

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("not connected")]
    NotConnected,

    #[error("connection closed")]
    Closed,
}

impl AdbError {
    /// Whether the failure leaves the connection unusable.
    pub fn is_transport(&self) -> bool {
        !matches!(self, Self::CommandExit { .. } | Self::KeyImport(_) | Self::Discovery(_))
    }
}

impl From<std::io::Error> for AdbError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e.to_string())
    }
}

impl From<AdbError> for ControlError {
    fn from(e: AdbError) -> Self {
        match e {
            AdbError::NotConnected => ControlError::NotConnected,
            AdbError::CommandExit { code, output } => ControlError::Exit { code, output },
            other => ControlError::Failed(other.to_string()),
        }
    }
}
