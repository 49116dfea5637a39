use serde::{Deserialize, Serialize};

use crate::models::audio_models::{OutputDevice, OutputKey, StreamFormat};
use crate::models::error::RoutingError;
use crate::processing::equalizer::Equalizer;
use crate::processing::pcm;
use crate::processing::stereo_gain::StereoGain;
use crate::traits::audio_backend::{AudioBackend, OutputStream};

/// Per-output settings carried across a device switch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SinkSettings {
    pub volume: f32,
    pub balance: f32,
    pub bands: Vec<f32>,
}

impl SinkSettings {
    pub fn new(volume: f32) -> Self {
        Self {
            volume,
            balance: 0.0,
            bands: Vec::new(),
        }
    }
}

/// One output stream plus its processing chain.
///
/// Frames flow: PCM → equalizer → volume/balance → PCM → stream.
pub struct OutputSink {
    key: OutputKey,
    stream: Box<dyn OutputStream>,
    channels: usize,
    gain: StereoGain,
    equalizer: Equalizer,
    scratch: Vec<u8>,
    stopped: bool,
}

impl OutputSink {
    /// Open an output stream on `device` and apply `settings`.
    pub fn open(
        backend: &dyn AudioBackend,
        device: Option<&OutputDevice>,
        format: &StreamFormat,
        band_centers_hz: &[f32],
        settings: &SinkSettings,
    ) -> Result<Self, RoutingError> {
        let stream = backend.open_output_stream(device, format)?;
        let mut sink = Self {
            key: OutputKey::for_device(device),
            stream,
            channels: usize::from(format.channels),
            gain: StereoGain::new(settings.volume, settings.balance),
            equalizer: Equalizer::new(format.sample_rate, format.channels, band_centers_hz),
            scratch: Vec::with_capacity(format.frame_bytes),
            stopped: false,
        };
        for (band, gain) in settings.bands.iter().enumerate() {
            sink.equalizer.set_gain(band, *gain);
        }
        Ok(sink)
    }

    pub fn key(&self) -> OutputKey {
        self.key
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    /// Process and play one frame. Ignored once stopped.
    pub fn write(&mut self, frame: &[u8]) -> Result<(), RoutingError> {
        if self.stopped {
            return Ok(());
        }
        if self.equalizer.is_flat() && self.gain == StereoGain::default() {
            return self.stream.write(frame);
        }

        let mut samples = pcm::decode_pcm16(frame);
        self.equalizer.process(&mut samples);
        self.gain.apply(&mut samples, self.channels);

        self.scratch.clear();
        pcm::encode_pcm16(&samples, &mut self.scratch);
        self.stream.write(&self.scratch)
    }

    /// Close the output stream. Safe to call more than once.
    pub fn stop(&mut self) -> Result<(), RoutingError> {
        if self.stopped {
            return Ok(());
        }
        self.stopped = true;
        self.stream.close()
    }

    pub fn volume(&self) -> f32 {
        self.gain.volume()
    }

    pub fn set_volume(&mut self, volume: f32) {
        self.gain.set_volume(volume);
    }

    pub fn balance(&self) -> f32 {
        self.gain.balance()
    }

    pub fn set_balance(&mut self, balance: f32) {
        self.gain.set_balance(balance);
    }

    pub fn band(&self, band: usize) -> Option<f32> {
        self.equalizer.gain(band)
    }

    pub fn bands(&self) -> Vec<f32> {
        self.equalizer.gains().to_vec()
    }

    /// Returns `false` for an unknown band.
    pub fn set_band(&mut self, band: usize, gain_db: f32) -> bool {
        self.equalizer.set_gain(band, gain_db)
    }

    pub fn settings(&self) -> SinkSettings {
        SinkSettings {
            volume: self.volume(),
            balance: self.balance(),
            bands: self.bands(),
        }
    }
}

impl std::fmt::Debug for OutputSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutputSink")
            .field("key", &self.key)
            .field("gain", &self.gain)
            .field("bands", &self.equalizer.gains())
            .field("stopped", &self.stopped)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{pcm_frame, MockBackend};
    use crate::models::audio_models::DeviceKind;

    const CENTERS: [f32; 5] = [60.0, 230.0, 910.0, 3600.0, 14000.0];

    fn format() -> StreamFormat {
        StreamFormat {
            sample_rate: 48000,
            channels: 2,
            frame_bytes: 8,
        }
    }

    fn device(id: i32) -> OutputDevice {
        OutputDevice {
            id,
            display_name: format!("dev{id}"),
            kind: DeviceKind::WiredHeadphones,
        }
    }

    #[test]
    fn unity_settings_pass_frames_through() {
        let backend = MockBackend::new();
        let mut sink = OutputSink::open(&backend, None, &format(), &CENTERS, &SinkSettings::new(100.0)).unwrap();
        let frame = pcm_frame(&[1000, -1000, 2000, -2000]);
        sink.write(&frame).unwrap();

        assert_eq!(sink.key(), OutputKey::Default);
        assert_eq!(backend.output(OutputKey::Default).written(), vec![frame]);
    }

    #[test]
    fn volume_and_balance_scale_samples() {
        let backend = MockBackend::new();
        let settings = SinkSettings {
            volume: 50.0,
            balance: 100.0,
            bands: Vec::new(),
        };
        let mut sink = OutputSink::open(&backend, Some(&device(3)), &format(), &CENTERS, &settings).unwrap();
        sink.write(&pcm_frame(&[1000, 1000, -2000, -2000])).unwrap();

        let written = backend.output(OutputKey::Device(3)).written();
        assert_eq!(written, vec![pcm_frame(&[0, 500, 0, -1000])]);
    }

    #[test]
    fn bands_are_applied_from_settings() {
        let backend = MockBackend::new();
        let settings = SinkSettings {
            volume: 80.0,
            balance: -20.0,
            bands: vec![0.0, 3.0, 0.0, -6.0, 0.0],
        };
        let sink = OutputSink::open(&backend, None, &format(), &CENTERS, &settings).unwrap();
        assert_eq!(sink.settings(), settings);
        assert_eq!(sink.band(3), Some(-6.0));
        assert_eq!(sink.band(9), None);
    }

    #[test]
    fn writes_after_stop_are_ignored_and_stop_is_idempotent() {
        let backend = MockBackend::new();
        let mut sink = OutputSink::open(&backend, None, &format(), &CENTERS, &SinkSettings::new(100.0)).unwrap();
        sink.stop().unwrap();
        sink.stop().unwrap();
        sink.write(&pcm_frame(&[1, 2, 3, 4])).unwrap();

        let output = backend.output(OutputKey::Default);
        assert!(output.written().is_empty());
        assert_eq!(output.close_count(), 1);
        assert!(sink.is_stopped());
    }
}
