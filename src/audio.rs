//! The [`Audio`] facade: one object owning the catalog, the request queue, the voice
//! pool, the music streamer and the playback backend.

use crate::assets::{AssetSource, DirectoryAssets};
use crate::audio_data::{LoadOptions, SoundDecoder, SymphoniaDecoder};
use crate::backend::{CpalBackend, PlaybackBackend};
use crate::catalog::{SoundCatalog, SoundHandle};
use crate::config::PetalMixConfig;
use crate::error::{PetalMixError, Result};
use crate::math::DVec2;
use crate::music::MusicStreamer;
use crate::queue::{RequestQueue, SoundPlayer};
use crate::voice::VoicePool;
use std::path::Path;
use std::sync::Arc;

/// Positional sound effects and streamed music for a 2D game.
///
/// Methods taking `&mut self` belong to the thread that owns the `Audio`; call
/// [`update`](Audio::update) and [`step`](Audio::step) once per frame from it. Other
/// threads request sounds through a [`SoundPlayer`] from [`player`](Audio::player).
///
/// Nothing plays until [`init`](Audio::init) succeeds; before that, requests are
/// ignored.
pub struct Audio {
    config: PetalMixConfig,
    backend: Box<dyn PlaybackBackend>,
    decoder: Arc<dyn SoundDecoder>,
    catalog: SoundCatalog,
    requests: RequestQueue,
    voices: VoicePool,
    music: Option<MusicStreamer>,
    initialized: bool,
    shut_down: bool,
}

impl Audio {
    pub fn new(
        config: PetalMixConfig,
        backend: Box<dyn PlaybackBackend>,
        decoder: Arc<dyn SoundDecoder>,
    ) -> Result<Self> {
        config.validate()?;

        Ok(Self {
            catalog: SoundCatalog::new(
                decoder.clone(),
                LoadOptions::for_sounds(config.sample_rate),
            ),
            requests: RequestQueue::new(config.distance_scale, config.initial_volume),
            voices: VoicePool::new(config.max_sources, config.move_tolerance),
            music: None,
            initialized: false,
            shut_down: false,
            backend,
            decoder,
            config,
        })
    }

    /// Audio on the default output device, decoding with Symphonia.
    pub fn with_default_output(config: PetalMixConfig) -> Result<Self> {
        let backend = CpalBackend::new(&config);
        Self::new(config, Box::new(backend), Arc::new(SymphoniaDecoder))
    }

    /// Opens the output and starts loading every sound found under `<source>/sounds/`.
    ///
    /// Later sources override same-named files from earlier ones.
    pub fn init<P: AsRef<Path>>(&mut self, sources: &[P]) -> Result<()> {
        let assets = DirectoryAssets::new(sources)
            .sound_extensions(&self.config.sound_extensions)
            .music_extensions(&self.config.music_extensions);
        self.init_with(&assets)
    }

    pub fn init_with(&mut self, assets: &dyn AssetSource) -> Result<()> {
        if self.shut_down {
            return Err(PetalMixError::Configuration(
                "Audio cannot be initialized again after quit".into(),
            ));
        }
        if self.initialized {
            log::warn!("Audio already initialized");
            return Ok(());
        }

        let sounds = assets.sounds()?;
        let tracks = assets.music()?;

        self.backend.open()?;
        self.backend.set_master_gain(self.requests.volume() as f32);

        let mut music = MusicStreamer::new(&self.config, self.decoder.clone())?;
        music.set_library(&tracks);
        music.prime(self.backend.as_mut());
        self.music = Some(music);

        for entry in &sounds {
            self.catalog.register(entry);
        }
        self.catalog.load_all();

        self.requests.set_initialized(true);
        self.initialized = true;
        log::info!(
            "Audio initialized: {} sounds, {} music tracks, up to {} voices",
            sounds.len(),
            tracks.len(),
            self.config.max_sources
        );
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Fraction of sound loading done, in `[0, 1]`.
    pub fn progress(&self) -> f64 {
        self.catalog.progress()
    }

    pub fn volume(&self) -> f64 {
        self.requests.volume()
    }

    /// Sets the master volume, clamped to `[0, 1]`. At 0 new requests are ignored.
    pub fn set_volume(&mut self, level: f64) {
        let level = self.requests.set_volume(level);
        self.backend.set_master_gain(level as f32);
    }

    /// Handle for the sound called `name`, loading it in the background if needed.
    ///
    /// Unknown names get a handle that never plays.
    pub fn get(&self, name: &str) -> SoundHandle {
        self.catalog.get(name)
    }

    /// A handle other threads can use to request sounds.
    pub fn player(&self) -> SoundPlayer {
        self.requests.player()
    }

    pub fn listener(&self) -> DVec2 {
        self.requests.listener()
    }

    /// Moves the listener and takes in everything other threads requested since the
    /// last update.
    pub fn update(&mut self, listener: DVec2) {
        if !self.initialized {
            return;
        }
        self.requests.update(listener);
    }

    /// Requests `sound` at the listener for the coming frame.
    pub fn play(&mut self, sound: &SoundHandle) {
        self.requests.push(sound);
    }

    /// Requests `sound` at a world position for the coming frame.
    pub fn play_at(&mut self, sound: &SoundHandle, position: DVec2) {
        self.requests.push_at(sound, position);
    }

    /// Crossfades to the music track `name`; an empty name fades out.
    pub fn play_music(&mut self, name: &str) {
        if let Some(music) = self.music.as_mut() {
            music.play_music(name);
        }
    }

    /// Name of the selected music track, if any.
    pub fn current_music(&self) -> Option<&str> {
        self.music
            .as_ref()
            .map(MusicStreamer::current_name)
            .filter(|name| !name.is_empty())
    }

    /// Starts this frame's sounds and refills the music stream.
    pub fn step(&mut self) {
        if !self.initialized {
            return;
        }

        let queued = self.requests.take();
        self.voices.step(self.backend.as_mut(), queued);

        if let Some(music) = self.music.as_mut() {
            music.step(self.backend.as_mut());
        }
    }

    pub fn voices(&self) -> &VoicePool {
        &self.voices
    }

    /// Stops loading, stops the music workers and releases every channel.
    ///
    /// Blocks until the background threads exit. Safe to call more than once.
    pub fn quit(&mut self) {
        if self.shut_down {
            return;
        }
        self.shut_down = true;
        self.initialized = false;
        self.requests.set_initialized(false);
        self.requests.clear();

        self.catalog.quit();
        if let Some(mut music) = self.music.take() {
            music.shutdown();
        }
        self.voices.release_all(self.backend.as_mut());
        self.backend.close();
        log::info!("Audio shut down");
    }
}

impl Drop for Audio {
    fn drop(&mut self) {
        self.quit();
    }
}
