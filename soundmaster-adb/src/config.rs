use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration for the ADB control plane.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdbConfig {
    /// Daemon host (default: 127.0.0.1). The daemon runs on the same device.
    pub host: String,

    /// Name appended to the public key; shown in the device's auth prompt.
    pub identity: String,

    /// mDNS service type browsed for the daemon port.
    pub service_type: String,

    pub connect_timeout_ms: u64,

    /// Per-read/write socket timeout once connected.
    pub io_timeout_ms: u64,

    /// How long to wait for the user to accept a new key on the device.
    pub auth_timeout_ms: u64,

    /// Largest payload we advertise in CNXN.
    pub max_payload: u32,

    /// Use the `shell,v2` service when the daemon supports it, to learn exit codes.
    pub prefer_shell_v2: bool,
}

impl AdbConfig {
    pub const DEFAULT_SERVICE_TYPE: &'static str = "_adb._tcp.local.";

    pub fn validate(&self) -> Result<(), String> {
        if self.host.is_empty() {
            return Err("host must not be empty".into());
        }
        if self.identity.is_empty() || self.identity.contains('\0') {
            return Err("identity must be non-empty text".into());
        }
        if !self.service_type.ends_with(".local.") {
            return Err(format!("service type {:?} must end in .local.", self.service_type));
        }
        if self.max_payload < 1024 {
            return Err(format!("max payload {} is too small", self.max_payload));
        }
        Ok(())
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn io_timeout(&self) -> Duration {
        Duration::from_millis(self.io_timeout_ms)
    }

    pub fn auth_timeout(&self) -> Duration {
        Duration::from_millis(self.auth_timeout_ms)
    }
}

impl Default for AdbConfig {
    fn default() -> Self {
        let host = std::env::var("HOSTNAME").unwrap_or_else(|_| "localhost".into());
        Self {
            host: "127.0.0.1".into(),
            identity: format!("soundmaster@{host}"),
            service_type: Self::DEFAULT_SERVICE_TYPE.into(),
            connect_timeout_ms: 3000,
            io_timeout_ms: 10_000,
            auth_timeout_ms: 60_000,
            max_payload: 1024 * 1024,
            prefer_shell_v2: true,
        }
    }
}
