//! PetalMix: a frame-synchronised positional sound mixer for 2D games.
//!
//! Game code asks for sounds by name, requests them each frame at world positions, and
//! calls [`Audio::step`] once per frame. All requests for the same sound within a frame
//! merge into one voice whose position is the loudness-weighted centre of the emitters.
//! Voices come from a fixed pool of backend channels; when it runs out, new requests
//! are dropped rather than cutting off what is already playing. Music streams from disk
//! on worker threads and crossfades between tracks.
//!
//! ```ignore
//! use petalmix::{Audio, DVec2, PetalMixConfig};
//!
//! let mut audio = Audio::with_default_output(PetalMixConfig::default())?;
//! audio.init(&["assets"])?;
//! let laser = audio.get("weapons/laser");
//!
//! // every frame
//! audio.update(player_position);
//! audio.play_at(&laser, DVec2::new(120.0, -40.0));
//! audio.step();
//! ```

pub mod assets;
pub mod audio;
pub mod audio_data;
pub mod backend;
pub mod catalog;
pub mod config;
pub mod error;
pub mod math;
pub mod music;
pub mod queue;
pub mod spatial;
pub mod voice;

#[cfg(test)]
mod testing;

pub use assets::{AssetEntry, AssetSource, DirectoryAssets};
pub use audio::Audio;
pub use audio_data::{AudioData, LoadOptions, PcmStream, SoundDecoder, SymphoniaDecoder};
pub use backend::{ChannelId, CpalBackend, PlaybackBackend};
pub use catalog::{SoundHandle, SoundId, SoundResource};
pub use config::PetalMixConfig;
pub use error::{PetalMixError, Result};
pub use math::{DVec2, DVec3};
pub use queue::SoundPlayer;
