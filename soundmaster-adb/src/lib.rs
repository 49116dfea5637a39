//! # soundmaster-adb
//!
//! ADB remote-shell control plane for soundmaster.
//!
//! Provides:
//! - `AdbKey` / `KeyStore`: the client's RSA identity and its persistence
//! - `DaemonDiscovery`: finds a plain-TCP (`adb tcpip`) daemon port over mDNS
//! - `AdbConnection`: one authenticated transport to `adbd`
//! - `ShellExecutor`: serialized shell commands; implements `ControlPlane`
//!
//! ## Usage
//! ```ignore
//! use std::sync::Arc;
//! use soundmaster_adb::{AdbConfig, MdnsBrowser, ShellExecutor};
//! use soundmaster_core::MemoryPreferences;
//!
//! let executor = ShellExecutor::new(
//!     AdbConfig::default(),
//!     Arc::new(MemoryPreferences::new()),
//!     Arc::new(MdnsBrowser::new()),
//! )?;
//! let _discovery = executor.auto_connect()?;
//! ```

pub mod auth;
pub mod config;
pub mod connection;
pub mod discovery;
pub mod error;
pub mod executor;
pub mod protocol;

#[cfg(test)]
mod test_support;

pub use auth::adb_key::AdbKey;
pub use auth::key_store::KeyStore;
pub use config::AdbConfig;
pub use connection::AdbConnection;
pub use discovery::{DaemonDiscovery, DiscoveryHandle, MdnsBrowser, ServiceBrowser};
pub use error::AdbError;
pub use executor::ShellExecutor;
pub use protocol::shell_v2::CommandOutput;
