pub mod audio_models;
pub mod config;
pub mod error;
pub mod report;
pub mod shell;
pub mod state;
