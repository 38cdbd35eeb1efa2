//! Playback backend collaborator.
//!
//! The mixer core only ever talks to hardware through [`PlaybackBackend`]: it creates a
//! bounded number of channels, binds decoded sounds to them, positions them, and feeds
//! a queue of PCM buffers for music. [`CpalBackend`] is a software implementation that
//! renders everything into a cpal output stream.

mod cpal_backend;

pub use cpal_backend::CpalBackend;

use crate::audio_data::AudioData;
use crate::error::Result;
use crate::math::DVec3;

/// Handle to one backend playback channel.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChannelId(pub u32);

impl std::fmt::Display for ChannelId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ChannelId({})", self.0)
    }
}

/// Narrow surface the mixer needs from an audio output.
///
/// All methods are called from the thread that owns the [`Audio`](crate::Audio)
/// facade. Runtime calls are infallible: a backend that cannot honour one should log
/// and carry on.
pub trait PlaybackBackend {
    /// Opens the output device. Called once from `Audio::init`.
    fn open(&mut self) -> Result<()> {
        Ok(())
    }

    /// Closes the output device. Called from `Audio::quit`.
    fn close(&mut self) {}

    /// Creates a new hardware channel.
    ///
    /// Failing here tells the voice pool it has reached the real hardware limit.
    fn create_channel(&mut self) -> Result<ChannelId>;

    fn destroy_channel(&mut self, channel: ChannelId);

    /// Attaches decoded samples to a channel, rewinding it.
    fn bind(&mut self, channel: ChannelId, data: &AudioData, looping: bool);

    /// Moves a channel to a listener-relative position.
    fn set_position(&mut self, channel: ChannelId, position: DVec3);

    /// Starts the channel from the beginning of its samples.
    fn play(&mut self, channel: ChannelId);

    fn stop(&mut self, channel: ChannelId);

    /// True once the channel is no longer playing.
    fn is_finished(&self, channel: ChannelId) -> bool;

    fn set_master_gain(&mut self, gain: f32);

    /// Number of music buffers fully played since the last call.
    fn processed_stream_buffers(&mut self) -> usize;

    /// Appends a buffer of interleaved stereo i16 to the music queue.
    fn queue_stream_buffer(&mut self, pcm: &[i16]);

    /// Restarts music playback if the queue ran dry and stopped it.
    fn ensure_stream_playing(&mut self);
}

/// Stereo gains for a channel at `position` relative to the listener.
///
/// Inverse-distance attenuation with a reference distance of 1, and an equal-power pan
/// driven by the x component. The listener faces +z with +x to the right.
pub fn stereo_gains(position: DVec3) -> (f32, f32) {
    let distance = position.length();
    if distance <= f64::EPSILON {
        return (std::f32::consts::FRAC_1_SQRT_2, std::f32::consts::FRAC_1_SQRT_2);
    }

    let attenuation = 1.0 / distance.max(1.0);
    let pan = (position.x / distance).clamp(-1.0, 1.0);
    let angle = (pan + 1.0) * std::f64::consts::FRAC_PI_4;
    (
        (angle.cos() * attenuation) as f32,
        (angle.sin() * attenuation) as f32,
    )
}
