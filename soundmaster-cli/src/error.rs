//! CLI error type and process exit codes.

use std::path::PathBuf;

use thiserror::Error;

use soundmaster_adb::AdbError;
use soundmaster_core::{ControlError, RoutingError, StorageError};

pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const CONFIG: i32 = 2;
    pub const AUTH: i32 = 3;
    pub const NOT_FOUND: i32 = 4;
    pub const CONNECTION: i32 = 7;
    pub const COMMAND: i32 = 8;
}

#[derive(Debug, Error)]
pub enum CliError {
    #[error("{0}")]
    Adb(#[from] AdbError),

    #[error("{0}")]
    Control(#[from] ControlError),

    #[error("{0}")]
    Routing(#[from] RoutingError),

    #[error("{0}")]
    Storage(#[from] StorageError),

    #[error("cannot read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("could not connect to adbd: {0}")]
    Connection(String),

    #[error("{0}")]
    NotFound(String),
}

impl CliError {
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Adb(AdbError::Auth(_)) | Self::Adb(AdbError::KeyImport(_)) => exit_code::AUTH,
            Self::Adb(AdbError::Discovery(_)) | Self::NotFound(_) => exit_code::NOT_FOUND,
            Self::Adb(_) | Self::Connection(_) | Self::Control(ControlError::NotConnected) => exit_code::CONNECTION,
            Self::Control(_) => exit_code::COMMAND,
            Self::Config(_) | Self::Read { .. } | Self::Routing(_) => exit_code::CONFIG,
            Self::Storage(_) => exit_code::GENERAL,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_by_kind() {
        assert_eq!(CliError::from(AdbError::Auth("rejected".into())).exit_code(), exit_code::AUTH);
        assert_eq!(CliError::from(ControlError::NotConnected).exit_code(), exit_code::CONNECTION);
        assert_eq!(
            CliError::from(ControlError::Exit {
                code: 1,
                output: String::new()
            })
            .exit_code(),
            exit_code::COMMAND
        );
        assert_eq!(CliError::NotFound("no daemon".into()).exit_code(), exit_code::NOT_FOUND);
    }
}
