use crate::error::{PetalMixError, Result};
use rubato::{FastFixedIn, FftFixedIn, PolynomialDegree, Resampler};

/// Splits interleaved frames into one buffer per channel.
fn deinterleave(interleaved: &[f32], channels: usize) -> Vec<Vec<f32>> {
    let frames = interleaved.len() / channels;
    let mut waves = vec![Vec::with_capacity(frames); channels];
    for frame in interleaved.chunks_exact(channels) {
        for (wave, &sample) in waves.iter_mut().zip(frame) {
            wave.push(sample);
        }
    }
    waves
}

fn interleave(waves: &[Vec<f32>], frames: usize) -> Vec<f32> {
    let mut interleaved = Vec::with_capacity(frames * waves.len());
    for frame in 0..frames {
        interleaved.extend(waves.iter().map(|wave| wave.get(frame).copied().unwrap_or(0.0)));
    }
    interleaved
}

/// Offline resampler for whole sound effects.
///
/// All channels go through one FFT resampler in fixed-size passes; the last pass is
/// zero-padded and the padding's output trimmed off.
pub struct AudioResampler {
    source_sample_rate: u32,
    target_sample_rate: u32,
    channels: usize,
    chunk_frames: usize,
}

impl AudioResampler {
    pub fn new(
        source_sample_rate: u32,
        target_sample_rate: u32,
        channels: u16,
        chunk_frames: Option<usize>,
    ) -> Result<Self> {
        if source_sample_rate == 0 || target_sample_rate == 0 {
            return Err(PetalMixError::AudioFormat(
                "Sample rates must be greater than 0".to_string(),
            ));
        }
        if channels == 0 {
            return Err(PetalMixError::AudioFormat(
                "Channel count must be greater than 0".to_string(),
            ));
        }

        Ok(Self {
            source_sample_rate,
            target_sample_rate,
            channels: channels as usize,
            chunk_frames: chunk_frames.unwrap_or(1024).max(1),
        })
    }

    /// Resamples interleaved frames, returning interleaved frames at the target rate.
    pub fn resample_interleaved(&self, interleaved: &[f32]) -> Result<Vec<f32>> {
        if self.source_sample_rate == self.target_sample_rate {
            return Ok(interleaved.to_vec());
        }

        let mut resampler = FftFixedIn::<f32>::new(
            self.source_sample_rate as usize,
            self.target_sample_rate as usize,
            self.chunk_frames,
            2,
            self.channels,
        )
        .map_err(|e| PetalMixError::AudioLoading(format!("Failed to create resampler: {}", e)))?;

        let waves_in = deinterleave(interleaved, self.channels);
        let frames_in = waves_in.first().map_or(0, Vec::len);
        let frames_out = (frames_in as f64 * self.ratio()).ceil() as usize;
        let mut waves_out: Vec<Vec<f32>> =
            vec![Vec::with_capacity(frames_out + self.chunk_frames); self.channels];

        let mut pass: Vec<Vec<f32>> = vec![vec![0.0; self.chunk_frames]; self.channels];
        let mut offset = 0;
        while offset < frames_in {
            let len = self.chunk_frames.min(frames_in - offset);
            for (buffer, wave) in pass.iter_mut().zip(&waves_in) {
                buffer[..len].copy_from_slice(&wave[offset..offset + len]);
                buffer[len..].fill(0.0);
            }

            let output = resampler
                .process(&pass, None)
                .map_err(|e| PetalMixError::AudioLoading(format!("Resampling error: {}", e)))?;
            for (wave, chunk) in waves_out.iter_mut().zip(output) {
                wave.extend_from_slice(&chunk);
            }
            offset += len;
        }

        let frames = frames_out.min(waves_out.first().map_or(0, Vec::len));
        Ok(interleave(&waves_out, frames))
    }

    pub fn target_sample_rate(&self) -> u32 {
        self.target_sample_rate
    }

    pub fn source_sample_rate(&self) -> u32 {
        self.source_sample_rate
    }

    /// Output frames per input frame.
    pub fn ratio(&self) -> f64 {
        self.target_sample_rate as f64 / self.source_sample_rate as f64
    }
}

/// Fixed-input streaming resampler for music decoded on the fly.
///
/// Every call consumes exactly [`input_frames`](StreamResampler::input_frames) frames
/// and produces a variable number of output frames.
pub struct StreamResampler {
    resampler: FastFixedIn<f32>,
    channels: usize,
    input_frames: usize,
}

impl StreamResampler {
    pub fn new(
        source_sample_rate: u32,
        target_sample_rate: u32,
        channels: u16,
        input_frames: usize,
    ) -> Result<Self> {
        if source_sample_rate == 0 || target_sample_rate == 0 {
            return Err(PetalMixError::AudioFormat(
                "Sample rates must be greater than 0".to_string(),
            ));
        }
        if channels == 0 || input_frames == 0 {
            return Err(PetalMixError::AudioFormat(
                "Channels and input frames must be greater than 0".to_string(),
            ));
        }

        log::debug!(
            "Creating stream resampler: {} Hz -> {} Hz ({} frames per pass)",
            source_sample_rate,
            target_sample_rate,
            input_frames
        );

        let resampler = FastFixedIn::new(
            target_sample_rate as f64 / source_sample_rate as f64,
            1.0,
            PolynomialDegree::Cubic,
            input_frames,
            channels as usize,
        )
        .map_err(|e| {
            PetalMixError::AudioLoading(format!("Failed to create stream resampler: {}", e))
        })?;

        Ok(Self {
            resampler,
            channels: channels as usize,
            input_frames,
        })
    }

    pub fn input_frames(&self) -> usize {
        self.input_frames
    }

    /// Resamples exactly `input_frames` interleaved frames.
    pub fn process_interleaved(&mut self, input: &[f32]) -> Result<Vec<f32>> {
        let frames = input.len() / self.channels;
        if frames != self.input_frames {
            return Err(PetalMixError::AudioFormat(format!(
                "Input size mismatch: expected {} frames, got {} frames",
                self.input_frames, frames
            )));
        }

        let waves_in = deinterleave(input, self.channels);
        let waves_out = self
            .resampler
            .process(&waves_in, None)
            .map_err(|e| PetalMixError::AudioLoading(format!("Streaming resampling error: {}", e)))?;

        let out_frames = waves_out.first().map_or(0, Vec::len);
        Ok(interleave(&waves_out, out_frames))
    }

    pub fn reset(&mut self) {
        self.resampler.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resampler_creation() {
        let resampler = AudioResampler::new(44100, 48000, 2, None).unwrap();
        assert_eq!(resampler.source_sample_rate(), 44100);
        assert_eq!(resampler.target_sample_rate(), 48000);
    }

    #[test]
    fn test_same_rate_passes_through() {
        let resampler = AudioResampler::new(44100, 44100, 2, None).unwrap();
        let samples = vec![0.1, 0.2, 0.3, 0.4];
        assert_eq!(resampler.resample_interleaved(&samples).unwrap(), samples);
    }

    #[test]
    fn test_resampled_length_follows_ratio() {
        let resampler = AudioResampler::new(22050, 44100, 2, None).unwrap();
        let samples = vec![0.0f32; 4410 * 2];
        let result = resampler.resample_interleaved(&samples).unwrap();
        assert_eq!(result.len(), 8820 * 2);
    }

    #[test]
    fn test_interleave_round_trip() {
        let frames = [1.0, -1.0, 2.0, -2.0, 3.0, -3.0];
        let waves = deinterleave(&frames, 2);
        assert_eq!(waves, vec![vec![1.0, 2.0, 3.0], vec![-1.0, -2.0, -3.0]]);
        assert_eq!(interleave(&waves, 3), frames.to_vec());
    }

    #[test]
    fn test_invalid_sample_rates() {
        assert!(AudioResampler::new(0, 48000, 2, None).is_err());
        assert!(AudioResampler::new(44100, 0, 2, None).is_err());
        assert!(AudioResampler::new(44100, 48000, 0, None).is_err());
        assert!(StreamResampler::new(44100, 48000, 2, 0).is_err());
    }

    #[test]
    fn test_stream_resampler_rejects_wrong_input_size() {
        let mut resampler = StreamResampler::new(48000, 44100, 2, 256).unwrap();
        assert!(resampler.process_interleaved(&[0.0; 100]).is_err());
        let out = resampler.process_interleaved(&vec![0.0; 512]).unwrap();
        assert_eq!(out.len() % 2, 0);
    }
}
