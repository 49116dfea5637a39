/// Volume and stereo-balance stage.
///
/// `volume` in `[0, 100]` maps linearly to a gain of `[0.0, 1.0]`.
/// `balance` in `[-100, 100]` attenuates the opposite channel proportionally:
/// positive values pull the image right by attenuating the left channel,
/// negative values attenuate the right channel, ±100 mutes one side.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StereoGain {
    volume: f32,
    balance: f32,
}

impl StereoGain {
    pub const MAX_VOLUME: f32 = 100.0;
    pub const MAX_BALANCE: f32 = 100.0;

    pub fn new(volume: f32, balance: f32) -> Self {
        let mut gain = Self {
            volume: Self::MAX_VOLUME,
            balance: 0.0,
        };
        gain.set_volume(volume);
        gain.set_balance(balance);
        gain
    }

    pub fn volume(&self) -> f32 {
        self.volume
    }

    pub fn balance(&self) -> f32 {
        self.balance
    }

    /// Set volume, clamped to `[0, 100]`. NaN is treated as 0.
    pub fn set_volume(&mut self, volume: f32) {
        self.volume = if volume.is_nan() { 0.0 } else { volume.clamp(0.0, Self::MAX_VOLUME) };
    }

    /// Set balance, clamped to `[-100, 100]`. NaN is treated as centred.
    pub fn set_balance(&mut self, balance: f32) {
        self.balance = if balance.is_nan() {
            0.0
        } else {
            balance.clamp(-Self::MAX_BALANCE, Self::MAX_BALANCE)
        };
    }

    /// Linear gains for the (left, right) channels.
    pub fn channel_gains(&self) -> (f32, f32) {
        let master = self.volume / Self::MAX_VOLUME;
        let left = if self.balance > 0.0 { 1.0 - self.balance / Self::MAX_BALANCE } else { 1.0 };
        let right = if self.balance < 0.0 { 1.0 + self.balance / Self::MAX_BALANCE } else { 1.0 };
        (master * left, master * right)
    }

    /// Apply to interleaved samples. Mono input only gets the volume.
    pub fn apply(&self, samples: &mut [f32], channels: usize) {
        let (left, right) = self.channel_gains();
        if channels < 2 {
            let master = self.volume / Self::MAX_VOLUME;
            samples.iter_mut().for_each(|s| *s *= master);
            return;
        }
        for frame in samples.chunks_exact_mut(channels) {
            frame[0] *= left;
            frame[1] *= right;
        }
    }
}

impl Default for StereoGain {
    fn default() -> Self {
        Self::new(Self::MAX_VOLUME, 0.0)
    }
}
