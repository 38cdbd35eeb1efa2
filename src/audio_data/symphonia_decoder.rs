use crate::audio_data::{AudioData, LoadOptions, PcmStream, SoundDecoder, StreamResampler};
use crate::error::{PetalMixError, Result};
use std::collections::VecDeque;
use std::fs::File;
use std::path::Path;
use symphonia::{
    core::{
        audio::SampleBuffer,
        codecs::{Decoder, DecoderOptions},
        errors::Error,
        formats::{FormatOptions, FormatReader},
        io::MediaSourceStream,
        meta::MetadataOptions,
        probe::Hint,
    },
    default::{get_codecs, get_probe},
};

/// Frames fed to the stream resampler per pass.
const STREAM_RESAMPLE_FRAMES: usize = 1024;

/// Default decoder built on the Symphonia library.
///
/// Supports the formats enabled in symphonia's feature set (WAV, FLAC, OGG/Vorbis,
/// MP3, ...).
#[derive(Debug, Clone, Copy, Default)]
pub struct SymphoniaDecoder;

struct OpenedTrack {
    format: Box<dyn FormatReader>,
    decoder: Box<dyn Decoder>,
    track_id: u32,
    sample_rate: u32,
}

fn open_track(path: &Path) -> Result<OpenedTrack> {
    let file = File::open(path)?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| {
            PetalMixError::AudioLoading(format!(
                "Failed to probe audio format of {}: {:?}",
                path.display(),
                e
            ))
        })?;

    let format = probed.format;
    let track = format.default_track().ok_or_else(|| {
        PetalMixError::AudioLoading(format!("No default audio track in {}", path.display()))
    })?;

    let track_id = track.id;
    let sample_rate = track.codec_params.sample_rate.ok_or_else(|| {
        PetalMixError::AudioLoading(format!("Sample rate not found in {}", path.display()))
    })?;

    let decoder = get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| PetalMixError::AudioLoading(format!("Failed to create decoder: {:?}", e)))?;

    Ok(OpenedTrack {
        format,
        decoder,
        track_id,
        sample_rate,
    })
}

/// Result of pulling one packet through the decoder.
enum Packet {
    /// Interleaved f32 samples and their channel count
    Samples(Vec<f32>, usize),
    /// Packet skipped (other track or recoverable corruption)
    Skipped,
    EndOfStream,
}

impl OpenedTrack {
    fn next_samples(&mut self) -> Result<Packet> {
        let packet = match self.format.next_packet() {
            Ok(packet) => packet,
            Err(Error::IoError(_)) => return Ok(Packet::EndOfStream),
            Err(e) => {
                return Err(PetalMixError::AudioLoading(format!(
                    "Error reading packet: {:?}",
                    e
                )));
            }
        };

        if packet.track_id() != self.track_id {
            return Ok(Packet::Skipped);
        }

        let decoded = match self.decoder.decode(&packet) {
            Ok(decoded) => decoded,
            Err(Error::IoError(_)) => return Ok(Packet::EndOfStream),
            Err(Error::DecodeError(e)) => {
                log::trace!("Skipping corrupt packet: {}", e);
                return Ok(Packet::Skipped);
            }
            Err(e) => {
                return Err(PetalMixError::AudioLoading(format!(
                    "Error decoding packet: {:?}",
                    e
                )));
            }
        };

        let spec = *decoded.spec();
        let channels = spec.channels.count();
        let mut tmp = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
        tmp.copy_interleaved_ref(decoded);
        Ok(Packet::Samples(tmp.samples().to_vec(), channels))
    }
}

impl SoundDecoder for SymphoniaDecoder {
    fn decode(&self, path: &Path, options: &LoadOptions) -> Result<AudioData> {
        let mut track = open_track(path)?;
        let mut samples: Vec<f32> = Vec::new();
        let mut channels = 0usize;

        loop {
            match track.next_samples()? {
                Packet::Samples(chunk, chunk_channels) => {
                    if channels == 0 {
                        channels = chunk_channels;
                    } else if channels != chunk_channels {
                        return Err(PetalMixError::AudioFormat(format!(
                            "Channel count changed mid-stream in {}",
                            path.display()
                        )));
                    }
                    samples.extend_from_slice(&chunk);
                }
                Packet::Skipped => continue,
                Packet::EndOfStream => break,
            }
        }

        if channels == 0 {
            return Err(PetalMixError::AudioLoading(format!(
                "No audio decoded from {}",
                path.display()
            )));
        }

        let mut audio_data = AudioData::new(samples, track.sample_rate, channels as u16)?;
        if options.convert_to_mono {
            audio_data = audio_data.to_mono()?;
        }
        if let Some(target_rate) = options.target_sample_rate {
            audio_data = audio_data.resample(target_rate)?;
        }

        log::debug!(
            "Decoded {} ({} ch, {} Hz, {:.2}s)",
            path.display(),
            audio_data.channels(),
            audio_data.sample_rate(),
            audio_data.duration().as_secs_f64()
        );
        Ok(audio_data)
    }

    fn open_stream(&self, path: &Path, options: &LoadOptions) -> Result<Box<dyn PcmStream>> {
        let track = open_track(path)?;
        let resampler = match options.target_sample_rate {
            Some(rate) if rate != track.sample_rate => Some(StreamResampler::new(
                track.sample_rate,
                rate,
                2,
                STREAM_RESAMPLE_FRAMES,
            )?),
            _ => None,
        };

        Ok(Box::new(SymphoniaStream {
            track,
            resampler,
            pending: Vec::new(),
            ready: VecDeque::new(),
            finished: false,
        }))
    }
}

/// Streaming cursor producing interleaved stereo i16.
struct SymphoniaStream {
    track: OpenedTrack,
    resampler: Option<StreamResampler>,
    /// Stereo f32 at the source rate, waiting for a full resampler pass
    pending: Vec<f32>,
    ready: VecDeque<i16>,
    finished: bool,
}

fn to_i16(sample: f32) -> i16 {
    (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16
}

/// Folds any channel layout onto interleaved stereo.
fn to_stereo(samples: &[f32], channels: usize) -> Vec<f32> {
    match channels {
        0 => Vec::new(),
        1 => samples.iter().flat_map(|&s| [s, s]).collect(),
        2 => samples.to_vec(),
        n => samples
            .chunks(n)
            .flat_map(|frame| [frame[0], frame[1]])
            .collect(),
    }
}

impl SymphoniaStream {
    fn push_stereo(&mut self, stereo: Vec<f32>) -> Result<()> {
        match self.resampler.as_mut() {
            Some(resampler) => {
                self.pending.extend_from_slice(&stereo);
                let pass = resampler.input_frames() * 2;
                while self.pending.len() >= pass {
                    let input: Vec<f32> = self.pending.drain(..pass).collect();
                    let output = resampler.process_interleaved(&input)?;
                    self.ready.extend(output.into_iter().map(to_i16));
                }
            }
            None => self.ready.extend(stereo.into_iter().map(to_i16)),
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        if let Some(resampler) = self.resampler.as_mut() {
            if !self.pending.is_empty() {
                let pass = resampler.input_frames() * 2;
                let real = self.pending.len();
                self.pending.resize(pass, 0.0);
                let input = std::mem::take(&mut self.pending);
                let output = resampler.process_interleaved(&input)?;
                // Keep only the share of output that came from real input
                let keep = ((output.len() as f64) * real as f64 / pass as f64) as usize & !1;
                self.ready
                    .extend(output.into_iter().take(keep).map(to_i16));
            }
        }
        Ok(())
    }
}

impl PcmStream for SymphoniaStream {
    fn read(&mut self, out: &mut [i16]) -> Result<usize> {
        while self.ready.len() < out.len() && !self.finished {
            match self.track.next_samples()? {
                Packet::Samples(samples, channels) => {
                    self.push_stereo(to_stereo(&samples, channels))?;
                }
                Packet::Skipped => {}
                Packet::EndOfStream => {
                    self.flush()?;
                    self.finished = true;
                }
            }
        }

        let count = self.ready.len().min(out.len());
        for (slot, sample) in out.iter_mut().zip(self.ready.drain(..count)) {
            *slot = sample;
        }
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_stereo_duplicates_mono() {
        assert_eq!(to_stereo(&[0.1, 0.2], 1), vec![0.1, 0.1, 0.2, 0.2]);
    }

    #[test]
    fn test_to_stereo_drops_surround_channels() {
        let frame = [0.1, 0.2, 0.3, 0.4, 0.5, 0.6];
        assert_eq!(to_stereo(&frame, 6), vec![0.1, 0.2]);
    }

    #[test]
    fn test_to_i16_clamps() {
        assert_eq!(to_i16(2.0), i16::MAX);
        assert_eq!(to_i16(-2.0), -i16::MAX);
        assert_eq!(to_i16(0.0), 0);
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let decoder = SymphoniaDecoder;
        let result = decoder.decode(Path::new("does/not/exist.wav"), &LoadOptions::default());
        assert!(result.is_err());
    }
}
