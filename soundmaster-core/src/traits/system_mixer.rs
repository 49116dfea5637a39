use crate::models::shell::VolumeDirection;

/// The OS master volume for the music stream.
pub trait SystemMixer: Send + Sync {
    fn max_volume(&self) -> u32;

    fn volume(&self) -> u32;

    /// Step the volume one notch; returns the new level.
    fn adjust_volume(&self, direction: VolumeDirection) -> u32;
}
