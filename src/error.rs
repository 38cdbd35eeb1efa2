//! Error types for PetalMix

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PetalMixError {
    #[error("Audio device error: {0}")]
    AudioDevice(String),

    #[error("Audio format error: {0}")]
    AudioFormat(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Audio loading error: {0}")]
    AudioLoading(String),

    #[error("Playback backend error: {0}")]
    Backend(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Thread error: {0}")]
    Thread(String),
}

pub type Result<T> = std::result::Result<T, PetalMixError>;
