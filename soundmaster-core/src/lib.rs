//! # soundmaster-core
//!
//! Per-application audio routing engine.
//!
//! Captures one application's output, denies its direct playback over an
//! authenticated control plane, and fans the captured frames out to one or
//! more output devices, each with its own volume, balance and equalizer.
//! Platform audio, the device catalog and the control plane are injected
//! through the traits in [`traits`].
//!
//! ## Architecture
//!
//! ```text
//! soundmaster-core (this crate)
//! ├── traits/       ← AudioBackend, Catalog, ControlPlane, StatusReporter, SystemMixer
//! ├── models/       ← RoutingError, SessionState, RoutingConfig, LatencyReport, shell commands
//! ├── processing/   ← PCM conversion, StereoGain, Equalizer
//! ├── session/      ← CaptureSession, OutputSink, RoutingManager
//! └── storage/      ← PreferenceStore (memory and JSON file)
//! ```

pub mod models;
pub mod processing;
pub mod session;
pub mod storage;
pub mod traits;

#[cfg(test)]
mod test_support;

// Re-export key types at crate root for convenience.
pub use models::audio_models::{
    Application, ApplicationId, AudioLevels, AudioUsage, DeviceKind, OutputDevice, OutputKey, StreamFormat,
};
pub use models::config::RoutingConfig;
pub use models::error::{ControlError, RoutingError, StorageError};
pub use models::report::{LatencyReport, SessionSample};
pub use models::shell::{MediaKey, VolumeDirection};
pub use models::state::{ConnectionState, SessionState};
pub use processing::equalizer::Equalizer;
pub use processing::stereo_gain::StereoGain;
pub use session::capture_session::CaptureSession;
pub use session::output_sink::{OutputSink, SinkSettings};
pub use session::routing::RoutingManager;
pub use storage::preferences::{JsonFilePreferences, MemoryPreferences, PreferenceStore, PreferenceValue};
pub use traits::audio_backend::{AudioBackend, CaptureStream, Catalog, OutputStream};
pub use traits::control_plane::{CommandHandle, CommandReply, CommandResult, ControlPlane};
pub use traits::status_reporter::StatusReporter;
pub use traits::system_mixer::SystemMixer;
