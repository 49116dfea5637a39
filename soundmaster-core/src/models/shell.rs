//! Shell command lines issued over the control plane.

use serde::{Deserialize, Serialize};

use super::audio_models::ApplicationId;

/// AppOps operation gating an application's direct audio output.
pub const PLAY_AUDIO_OP: &str = "PLAY_AUDIO";

/// `appops set <app> PLAY_AUDIO allow|deny`
pub fn set_play_audio(app: &ApplicationId, allow: bool) -> String {
    let mode = if allow { "allow" } else { "deny" };
    format!("appops set {app} {PLAY_AUDIO_OP} {mode}")
}

/// `appops get <app> PLAY_AUDIO`
pub fn get_play_audio(app: &ApplicationId) -> String {
    format!("appops get {app} {PLAY_AUDIO_OP}")
}

/// Whether `appops get` output reports the op as denied.
pub fn reports_denied(output: &str) -> bool {
    output.contains("deny")
}

/// Media keys forwarded to the device as key events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKey {
    Play,
    Pause,
    PlayPause,
    Stop,
    Next,
    Previous,
}

impl MediaKey {
    /// Android `KeyEvent` code for this key.
    pub fn keycode(&self) -> u32 {
        match self {
            Self::PlayPause => 85,
            Self::Stop => 86,
            Self::Next => 87,
            Self::Previous => 88,
            Self::Play => 126,
            Self::Pause => 127,
        }
    }

    /// `input keyevent <code>`
    pub fn command(&self) -> String {
        format!("input keyevent {}", self.keycode())
    }
}

/// Direction of a relative system-volume adjustment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VolumeDirection {
    Lower,
    Same,
    Raise,
}
