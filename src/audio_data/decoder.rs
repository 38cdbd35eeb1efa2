use crate::audio_data::{AudioData, LoadOptions};
use crate::error::Result;
use std::path::Path;

/// Trait for turning files into PCM.
///
/// The catalog's loader thread calls [`decode`](SoundDecoder::decode) for sound
/// effects, and each music worker calls [`open_stream`](SoundDecoder::open_stream)
/// for the track it is playing, so implementations must be shareable across threads.
///
/// # Example
///
/// ```ignore
/// use petalmix::audio_data::{AudioData, LoadOptions, PcmStream, SoundDecoder};
/// use petalmix::error::Result;
/// use std::path::Path;
///
/// struct SilenceDecoder;
///
/// impl SoundDecoder for SilenceDecoder {
///     fn decode(&self, _path: &Path, options: &LoadOptions) -> Result<AudioData> {
///         AudioData::new(vec![0.0; 4410], options.target_sample_rate.unwrap_or(44100), 1)
///     }
///
///     fn open_stream(&self, _path: &Path, _options: &LoadOptions) -> Result<Box<dyn PcmStream>> {
///         todo!()
///     }
/// }
/// ```
pub trait SoundDecoder: Send + Sync {
    /// Decodes a whole file.
    fn decode(&self, path: &Path, options: &LoadOptions) -> Result<AudioData>;

    /// Opens an incremental decode cursor producing interleaved stereo i16 samples.
    fn open_stream(&self, path: &Path, options: &LoadOptions) -> Result<Box<dyn PcmStream>>;
}

/// Incremental decode cursor for streamed music.
pub trait PcmStream: Send {
    /// Fills `out` with interleaved stereo samples.
    ///
    /// Returns the number of samples written. A return of 0 signals the end of the
    /// stream; anything shorter than `out.len()` may simply mean the stream is about to
    /// end.
    fn read(&mut self, out: &mut [i16]) -> Result<usize>;
}
