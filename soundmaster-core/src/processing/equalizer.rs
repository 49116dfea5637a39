use std::f32::consts::PI;

/// Largest boost or cut a band accepts, in dB.
pub const MAX_BAND_GAIN_DB: f32 = 15.0;

/// Bandwidth of every peaking band.
const BAND_Q: f32 = 1.0;

/// One second-order section (RBJ peaking EQ), direct form I.
#[derive(Debug, Clone, Copy, Default)]
struct Biquad {
    b0: f32,
    b1: f32,
    b2: f32,
    a1: f32,
    a2: f32,
    x1: f32,
    x2: f32,
    y1: f32,
    y2: f32,
}

impl Biquad {
    fn peaking(sample_rate: f32, center_hz: f32, gain_db: f32) -> Self {
        let a = 10f32.powf(gain_db / 40.0);
        let w0 = 2.0 * PI * center_hz / sample_rate;
        let alpha = w0.sin() / (2.0 * BAND_Q);
        let cos_w0 = w0.cos();

        let a0 = 1.0 + alpha / a;
        Self {
            b0: (1.0 + alpha * a) / a0,
            b1: (-2.0 * cos_w0) / a0,
            b2: (1.0 - alpha * a) / a0,
            a1: (-2.0 * cos_w0) / a0,
            a2: (1.0 - alpha / a) / a0,
            ..Self::default()
        }
    }

    /// Swap in new coefficients, keeping the filter history.
    fn retune(&mut self, other: &Biquad) {
        self.b0 = other.b0;
        self.b1 = other.b1;
        self.b2 = other.b2;
        self.a1 = other.a1;
        self.a2 = other.a2;
    }

    fn process(&mut self, x: f32) -> f32 {
        let y = self.b0 * x + self.b1 * self.x1 + self.b2 * self.x2 - self.a1 * self.y1 - self.a2 * self.y2;
        self.x2 = self.x1;
        self.x1 = x;
        self.y2 = self.y1;
        self.y1 = y;
        y
    }
}

/// Fixed-band graphic equalizer applied to interleaved samples.
///
/// Each band is a peaking filter at a fixed centre frequency with a
/// per-band gain in dB. Bands at 0 dB are bypassed entirely, so a flat
/// equalizer passes samples through untouched.
#[derive(Debug, Clone)]
pub struct Equalizer {
    sample_rate: f32,
    channels: usize,
    centers_hz: Vec<f32>,
    gains_db: Vec<f32>,
    // filters[band][channel]
    filters: Vec<Vec<Biquad>>,
}

impl Equalizer {
    pub fn new(sample_rate: u32, channels: u16, centers_hz: &[f32]) -> Self {
        let channels = usize::from(channels.max(1));
        let sample_rate = sample_rate as f32;
        Self {
            sample_rate,
            channels,
            centers_hz: centers_hz.to_vec(),
            gains_db: vec![0.0; centers_hz.len()],
            filters: centers_hz
                .iter()
                .map(|&f| vec![Biquad::peaking(sample_rate, f, 0.0); channels])
                .collect(),
        }
    }

    pub fn band_count(&self) -> usize {
        self.gains_db.len()
    }

    pub fn gain(&self, band: usize) -> Option<f32> {
        self.gains_db.get(band).copied()
    }

    pub fn gains(&self) -> &[f32] {
        &self.gains_db
    }

    /// Set one band's gain, clamped to ±[`MAX_BAND_GAIN_DB`].
    ///
    /// Returns `false` if `band` does not exist.
    pub fn set_gain(&mut self, band: usize, gain_db: f32) -> bool {
        let Some(center) = self.centers_hz.get(band).copied() else {
            return false;
        };
        let gain_db = if gain_db.is_nan() { 0.0 } else { gain_db.clamp(-MAX_BAND_GAIN_DB, MAX_BAND_GAIN_DB) };
        self.gains_db[band] = gain_db;
        let tuned = Biquad::peaking(self.sample_rate, center, gain_db);
        for filter in &mut self.filters[band] {
            filter.retune(&tuned);
        }
        true
    }

    pub fn is_flat(&self) -> bool {
        self.gains_db.iter().all(|g| *g == 0.0)
    }

    /// Run every active band over interleaved `samples` in place.
    pub fn process(&mut self, samples: &mut [f32]) {
        if self.is_flat() {
            return;
        }
        for frame in samples.chunks_exact_mut(self.channels) {
            for (band, filters) in self.filters.iter_mut().enumerate() {
                if self.gains_db[band] == 0.0 {
                    continue;
                }
                for (sample, filter) in frame.iter_mut().zip(filters.iter_mut()) {
                    *sample = filter.process(*sample);
                }
            }
        }
    }
}
