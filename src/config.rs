//! Configuration for PetalMix

use crate::error::{PetalMixError, Result};

/// Tunables for the mixer, the voice pool and the music streamer.
///
/// The distance and fade constants are tuned for a 2D scene where 500 world units
/// is roughly "one screen away"; change them to match a different world scale.
#[derive(Debug, Clone)]
pub struct PetalMixConfig {
    /// Output sample rate. Sounds are resampled to this rate when loaded.
    pub sample_rate: u32,
    /// Frames per cpal callback.
    pub block_size: usize,
    /// Hard ceiling on simultaneously playing voices.
    pub max_sources: usize,
    /// Master volume right after construction.
    pub initial_volume: f64,
    /// Factor converting world units to normalised distance units.
    pub distance_scale: f64,
    /// Voices whose position changed less than this are not repositioned.
    pub move_tolerance: f64,
    /// Interleaved stereo samples per music chunk.
    pub music_chunk_samples: usize,
    /// Stream buffers the backend cycles through for music.
    pub music_buffers: usize,
    /// Decoded chunks each music track keeps ready ahead of the consumer.
    pub music_ring_chunks: usize,
    /// Length of a music crossfade, in samples.
    pub fade_length: u32,
    /// File extensions treated as sound effects during asset discovery.
    pub sound_extensions: Vec<String>,
    /// File extensions treated as music during asset discovery.
    pub music_extensions: Vec<String>,
}

impl Default for PetalMixConfig {
    fn default() -> Self {
        Self {
            sample_rate: 44100,
            block_size: 512,
            max_sources: 255,
            initial_volume: 0.125,
            distance_scale: 0.002,
            move_tolerance: 0.0,
            music_chunk_samples: 32768,
            music_buffers: 3,
            music_ring_chunks: 2,
            fade_length: 65536,
            sound_extensions: vec!["wav".to_string()],
            music_extensions: vec!["mp3".to_string()],
        }
    }
}

impl PetalMixConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sample_rate(mut self, rate: u32) -> Self {
        self.sample_rate = rate;
        self
    }

    pub fn block_size(mut self, size: usize) -> Self {
        self.block_size = size;
        self
    }

    pub fn max_sources(mut self, max: usize) -> Self {
        self.max_sources = max;
        self
    }

    pub fn initial_volume(mut self, volume: f64) -> Self {
        self.initial_volume = volume;
        self
    }

    pub fn distance_scale(mut self, scale: f64) -> Self {
        self.distance_scale = scale;
        self
    }

    pub fn move_tolerance(mut self, tolerance: f64) -> Self {
        self.move_tolerance = tolerance;
        self
    }

    pub fn music_chunk_samples(mut self, samples: usize) -> Self {
        self.music_chunk_samples = samples;
        self
    }

    pub fn music_buffers(mut self, buffers: usize) -> Self {
        self.music_buffers = buffers;
        self
    }

    pub fn music_ring_chunks(mut self, chunks: usize) -> Self {
        self.music_ring_chunks = chunks;
        self
    }

    pub fn fade_length(mut self, samples: u32) -> Self {
        self.fade_length = samples;
        self
    }

    pub fn sound_extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.sound_extensions = extensions.into_iter().map(Into::into).collect();
        self
    }

    pub fn music_extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.music_extensions = extensions.into_iter().map(Into::into).collect();
        self
    }

    /// Rejects settings the mixer cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.sample_rate == 0 {
            return Err(PetalMixError::Configuration(
                "Sample rate must be greater than 0".to_string(),
            ));
        }
        if self.music_chunk_samples == 0 || self.music_chunk_samples % 2 != 0 {
            return Err(PetalMixError::Configuration(format!(
                "Music chunk must hold a positive, even number of samples (got {})",
                self.music_chunk_samples
            )));
        }
        if self.music_buffers == 0 || self.music_ring_chunks == 0 {
            return Err(PetalMixError::Configuration(
                "Music buffer counts must be greater than 0".to_string(),
            ));
        }
        if self.fade_length == 0 {
            return Err(PetalMixError::Configuration(
                "Fade length must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}
