pub mod audio_backend;
pub mod control_plane;
pub mod status_reporter;
pub mod system_mixer;
