//! Decoded audio and the decoder collaborator.
//!
//! Short sounds are decoded completely into [`AudioData`]; music is read
//! incrementally through a [`PcmStream`]. Both come from a [`SoundDecoder`], with
//! [`SymphoniaDecoder`] as the default implementation.

mod decoder;
mod load_options;
mod resampler;
mod symphonia_decoder;

pub use decoder::{PcmStream, SoundDecoder};
pub use load_options::LoadOptions;
pub use resampler::{AudioResampler, StreamResampler};
pub use symphonia_decoder::SymphoniaDecoder;

use crate::error::{PetalMixError, Result};
use std::sync::Arc;
use std::time::Duration;

/// Decoded PCM shared by reference count.
///
/// Samples are f32 and interleaved: `[L0, R0, L1, R1, ...]` for stereo.
#[derive(Debug, Clone)]
pub struct AudioData {
    inner: Arc<AudioDataInner>,
}

#[derive(Debug)]
struct AudioDataInner {
    samples: Vec<f32>,
    sample_rate: u32,
    channels: u16,
    total_frames: usize,
}

impl AudioData {
    pub fn new(samples: Vec<f32>, sample_rate: u32, channels: u16) -> Result<Self> {
        if channels == 0 {
            return Err(PetalMixError::AudioFormat(
                "Channel count must be greater than 0".to_string(),
            ));
        }
        if sample_rate == 0 {
            return Err(PetalMixError::AudioFormat(
                "Sample rate must be greater than 0".to_string(),
            ));
        }

        let total_frames = samples.len() / channels as usize;
        Ok(Self {
            inner: Arc::new(AudioDataInner {
                samples,
                sample_rate,
                channels,
                total_frames,
            }),
        })
    }

    pub fn sample_rate(&self) -> u32 {
        self.inner.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.inner.channels
    }

    pub fn samples(&self) -> &[f32] {
        &self.inner.samples
    }

    pub fn total_frames(&self) -> usize {
        self.inner.total_frames
    }

    pub fn duration(&self) -> Duration {
        Duration::from_secs_f64(self.inner.total_frames as f64 / self.inner.sample_rate as f64)
    }

    pub fn is_empty(&self) -> bool {
        self.inner.samples.is_empty()
    }

    /// Sample of `channel` at `frame`, folding extra channels onto the last one.
    pub fn sample(&self, frame: usize, channel: usize) -> f32 {
        let channels = self.inner.channels as usize;
        let channel = channel.min(channels - 1);
        self.inner
            .samples
            .get(frame * channels + channel)
            .copied()
            .unwrap_or(0.0)
    }

    /// Downmix to a single channel by averaging.
    pub fn to_mono(&self) -> Result<Self> {
        if self.inner.channels == 1 {
            return Ok(self.clone());
        }

        let channels = self.inner.channels as usize;
        let mono: Vec<f32> = self
            .inner
            .samples
            .chunks(channels)
            .map(|frame| frame.iter().sum::<f32>() / channels as f32)
            .collect();
        Self::new(mono, self.inner.sample_rate, 1)
    }

    /// Resample to a different sample rate using rubato
    pub fn resample(&self, target_sample_rate: u32) -> Result<Self> {
        if target_sample_rate == self.inner.sample_rate {
            return Ok(self.clone());
        }

        let resampler = AudioResampler::new(
            self.inner.sample_rate,
            target_sample_rate,
            self.inner.channels,
            Some(1024),
        )?;
        let resampled = resampler.resample_interleaved(&self.inner.samples)?;
        Self::new(resampled, target_sample_rate, self.inner.channels)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frames_and_duration() {
        let data = AudioData::new(vec![0.0; 88200], 44100, 2).unwrap();
        assert_eq!(data.total_frames(), 44100);
        assert_eq!(data.duration(), Duration::from_secs(1));
    }

    #[test]
    fn test_sample_lookup_folds_channels() {
        let data = AudioData::new(vec![0.1, 0.2, 0.3], 44100, 1).unwrap();
        assert_eq!(data.sample(1, 0), 0.2);
        assert_eq!(data.sample(1, 1), 0.2);
        assert_eq!(data.sample(9, 0), 0.0);
    }

    #[test]
    fn test_to_mono_averages() {
        let data = AudioData::new(vec![1.0, 0.0, 0.5, 0.5], 44100, 2).unwrap();
        let mono = data.to_mono().unwrap();
        assert_eq!(mono.channels(), 1);
        assert_eq!(mono.samples(), &[0.5, 0.5]);
    }

    #[test]
    fn test_rejects_zero_channels() {
        assert!(AudioData::new(vec![0.0], 44100, 0).is_err());
        assert!(AudioData::new(vec![0.0], 0, 1).is_err());
    }
}
