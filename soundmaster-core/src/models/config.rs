use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::audio_models::{AudioUsage, StreamFormat};

/// Configuration for the routing engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoutingConfig {
    /// Capture and playback sample rate in Hz (default: 48000).
    pub sample_rate: u32,

    /// Interleaved channel count (default: 2). Valid values: 1, 2.
    pub channels: u16,

    /// Bytes moved per capture cycle (default: 8192).
    pub frame_bytes: usize,

    /// Latency sampling period in milliseconds (default: 1000).
    pub sample_interval_ms: u64,

    /// Delay before re-denying direct output after a play key (default: 500).
    pub replay_redeny_delay_ms: u64,

    /// How long teardown waits for a control-plane command (default: 5000).
    pub control_timeout_ms: u64,

    /// Usages matched by capture streams.
    pub usages: Vec<AudioUsage>,

    /// Centre frequencies of the equalizer bands in Hz.
    pub band_centers_hz: Vec<f32>,
}

impl RoutingConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.sample_rate == 0 {
            return Err("sample rate must be positive".into());
        }
        if ![1, 2].contains(&self.channels) {
            return Err(format!("unsupported channel count: {}", self.channels));
        }
        let block_align = usize::from(self.channels) * 2;
        if self.frame_bytes == 0 || self.frame_bytes % block_align != 0 {
            return Err(format!(
                "frame size {} is not a multiple of {block_align} bytes",
                self.frame_bytes
            ));
        }
        if self.sample_interval_ms == 0 {
            return Err("sample interval must be positive".into());
        }
        if self.usages.is_empty() {
            return Err("at least one capture usage is required".into());
        }
        let nyquist = self.sample_rate as f32 / 2.0;
        if let Some(bad) = self.band_centers_hz.iter().find(|f| **f <= 0.0 || **f >= nyquist) {
            return Err(format!("band centre {bad} Hz outside (0, {nyquist})"));
        }
        Ok(())
    }

    pub fn stream_format(&self) -> StreamFormat {
        StreamFormat {
            sample_rate: self.sample_rate,
            channels: self.channels,
            frame_bytes: self.frame_bytes,
        }
    }

    pub fn sample_interval(&self) -> Duration {
        Duration::from_millis(self.sample_interval_ms)
    }

    pub fn replay_redeny_delay(&self) -> Duration {
        Duration::from_millis(self.replay_redeny_delay_ms)
    }

    pub fn control_timeout(&self) -> Duration {
        Duration::from_millis(self.control_timeout_ms)
    }
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48000,
            channels: 2,
            frame_bytes: 8192,
            sample_interval_ms: 1000,
            replay_redeny_delay_ms: 500,
            control_timeout_ms: 5000,
            usages: AudioUsage::CAPTURED.to_vec(),
            band_centers_hz: vec![60.0, 230.0, 910.0, 3600.0, 14000.0],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert_eq!(RoutingConfig::default().validate(), Ok(()));
    }

    #[test]
    fn rejects_misaligned_frames() {
        let config = RoutingConfig {
            frame_bytes: 8190,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_band_above_nyquist() {
        let config = RoutingConfig {
            sample_rate: 16000,
            ..Default::default()
        };
        assert!(config.validate().unwrap_err().contains("14000"));
    }

    #[test]
    fn partial_json_falls_back_to_defaults() {
        let config: RoutingConfig = serde_json::from_str(r#"{"frame_bytes": 4096}"#).unwrap();
        assert_eq!(config.frame_bytes, 4096);
        assert_eq!(config.sample_rate, 48000);
        assert_eq!(config.usages.len(), 7);
    }
}
