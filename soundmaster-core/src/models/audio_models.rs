use std::fmt;

use serde::{Deserialize, Serialize};

use super::error::RoutingError;

/// Audio usage categories a capture stream matches on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AudioUsage {
    Media,
    Game,
    Alarm,
    Notification,
    Assistant,
    Unknown,
    VoiceCommunication,
}

impl AudioUsage {
    /// Usages matched by every capture stream.
    ///
    /// Broad on purpose: an app that plays through an unexpected usage would
    /// otherwise keep sounding through its muted direct path.
    pub const CAPTURED: [AudioUsage; 7] = [
        AudioUsage::Media,
        AudioUsage::Game,
        AudioUsage::Alarm,
        AudioUsage::Notification,
        AudioUsage::Assistant,
        AudioUsage::Unknown,
        AudioUsage::VoiceCommunication,
    ];
}

/// Hardware category of an output device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceKind {
    BuiltinSpeaker,
    BluetoothA2dp,
    WiredHeadphones,
    WiredHeadset,
    UsbHeadset,
    Other,
}

impl DeviceKind {
    /// Whether captured audio may be routed to this kind of device.
    pub fn is_routable(&self) -> bool {
        !matches!(self, Self::Other)
    }
}

/// An output device reported by the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputDevice {
    pub id: i32,
    pub display_name: String,
    pub kind: DeviceKind,
}

impl OutputDevice {
    pub fn key(&self) -> OutputKey {
        OutputKey::Device(self.id)
    }
}

/// An installed application reported by the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Application {
    pub id: String,
    pub display_name: String,
}

/// Identifies an output sink inside a capture session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OutputKey {
    /// The system default output.
    Default,
    Device(i32),
}

impl OutputKey {
    pub fn for_device(device: Option<&OutputDevice>) -> Self {
        device.map_or(Self::Default, OutputDevice::key)
    }
}

impl fmt::Display for OutputKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Default => f.write_str("default"),
            Self::Device(id) => write!(f, "device:{id}"),
        }
    }
}

/// Validated application (package) id.
///
/// Ids end up inside shell commands, so only the characters a package name
/// may contain are accepted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ApplicationId(String);

impl ApplicationId {
    pub fn parse(id: &str) -> Result<Self, RoutingError> {
        let mut chars = id.chars();
        let starts_ok = chars.next().is_some_and(|c| c.is_ascii_alphabetic());
        let rest_ok = chars.all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '_');
        if starts_ok && rest_ok {
            Ok(Self(id.to_string()))
        } else {
            Err(RoutingError::InvalidApplication(id.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ApplicationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for ApplicationId {
    type Error = RoutingError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<ApplicationId> for String {
    fn from(id: ApplicationId) -> Self {
        id.0
    }
}

/// PCM stream format shared by capture and output streams.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamFormat {
    pub sample_rate: u32,
    pub channels: u16,
    /// Bytes per read/write cycle.
    pub frame_bytes: usize,
}

impl StreamFormat {
    /// Bytes per sample frame (all channels, 16-bit PCM).
    pub fn block_align(&self) -> usize {
        usize::from(self.channels) * 2
    }
}

/// Real-time audio level metering (RMS and peak, 0.0–1.0).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct AudioLevels {
    pub rms: f32,
    pub peak: f32,
}
