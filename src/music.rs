//! Streaming music with crossfade.
//!
//! Two [`MusicTrack`]s each own a worker thread that decodes ahead into a small bounded
//! channel. [`MusicStreamer`] pulls one chunk per backend stream buffer that finished
//! playing and blends the outgoing track into the incoming one while a fade is running.

use crate::assets::AssetEntry;
use crate::audio_data::{LoadOptions, PcmStream, SoundDecoder};
use crate::backend::PlaybackBackend;
use crate::config::PetalMixConfig;
use crate::error::{PetalMixError, Result};
use crossbeam_channel::{Receiver, Sender, bounded};
use parking_lot::{Condvar, Mutex};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::JoinHandle;

/// What a track's worker should be decoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackSource {
    Silence,
    Streaming { name: String, path: PathBuf },
}

/// Decoded interleaved stereo samples tagged with the source generation they belong to.
#[derive(Debug)]
pub struct MusicChunk {
    pub generation: u64,
    pub samples: Vec<i16>,
}

#[derive(Debug)]
struct TrackControl {
    source: TrackSource,
    generation: u64,
    shutdown: bool,
}

struct TrackShared {
    control: Mutex<TrackControl>,
    wake: Condvar,
}

impl TrackShared {
    fn is_current(&self, generation: u64) -> bool {
        let control = self.control.lock();
        !control.shutdown && control.generation == generation
    }
}

/// How a worker's pass over one source ended.
enum StreamEnd {
    /// A newer source was set
    Superseded,
    /// The stream could not be opened or read; wait for a new source
    Failed,
    /// The consumer hung up
    Disconnected,
}

struct TrackWorker {
    shared: Arc<TrackShared>,
    decoder: Arc<dyn SoundDecoder>,
    options: LoadOptions,
    chunk_samples: usize,
    tx: Sender<MusicChunk>,
}

impl TrackWorker {
    fn run(self) {
        let mut failed_generation = None;

        loop {
            let (generation, name, path) = {
                let mut control = self.shared.control.lock();
                loop {
                    if control.shutdown {
                        return;
                    }
                    let job = match &control.source {
                        TrackSource::Streaming { name, path }
                            if failed_generation != Some(control.generation) =>
                        {
                            Some((control.generation, name.clone(), path.clone()))
                        }
                        _ => None,
                    };
                    match job {
                        Some(job) => break job,
                        None => self.shared.wake.wait(&mut control),
                    }
                }
            };

            log::debug!("Streaming music {} from {}", name, path.display());
            match self.stream(generation, &name, &path) {
                StreamEnd::Superseded => {}
                StreamEnd::Failed => failed_generation = Some(generation),
                StreamEnd::Disconnected => return,
            }
        }
    }

    fn open(&self, name: &str, path: &Path) -> Option<Box<dyn PcmStream>> {
        match self.decoder.open_stream(path, &self.options) {
            Ok(stream) => Some(stream),
            Err(e) => {
                log::error!("Failed to open music {} at {}: {}", name, path.display(), e);
                None
            }
        }
    }

    fn stream(&self, generation: u64, name: &str, path: &Path) -> StreamEnd {
        let Some(mut stream) = self.open(name, path) else {
            return StreamEnd::Failed;
        };
        let mut read_since_open = 0usize;

        loop {
            if !self.shared.is_current(generation) {
                return StreamEnd::Superseded;
            }

            let mut samples = vec![0i16; self.chunk_samples];
            let mut filled = 0;
            while filled < samples.len() {
                match stream.read(&mut samples[filled..]) {
                    Ok(0) if read_since_open == 0 => {
                        log::error!("Music {} contains no audio", name);
                        return StreamEnd::Failed;
                    }
                    Ok(0) => {
                        // Loop back to the start of the file
                        let Some(reopened) = self.open(name, path) else {
                            return StreamEnd::Failed;
                        };
                        stream = reopened;
                        read_since_open = 0;
                    }
                    Ok(count) => {
                        filled += count;
                        read_since_open += count;
                    }
                    Err(e) => {
                        log::error!("Error decoding music {}: {}", name, e);
                        return StreamEnd::Failed;
                    }
                }
            }

            if self.tx.send(MusicChunk { generation, samples }).is_err() {
                return StreamEnd::Disconnected;
            }
        }
    }
}

/// One music voice: a control block plus a worker decoding into a bounded channel.
pub struct MusicTrack {
    shared: Arc<TrackShared>,
    chunks: Option<Receiver<MusicChunk>>,
    worker: Option<JoinHandle<()>>,
    generation: u64,
    name: String,
    streaming: bool,
}

impl MusicTrack {
    /// Starts a parked worker.
    pub fn spawn(config: &PetalMixConfig, decoder: Arc<dyn SoundDecoder>) -> Result<Self> {
        let shared = Arc::new(TrackShared {
            control: Mutex::new(TrackControl {
                source: TrackSource::Silence,
                generation: 0,
                shutdown: false,
            }),
            wake: Condvar::new(),
        });
        let (tx, rx) = bounded(config.music_ring_chunks.max(1));

        let worker = TrackWorker {
            shared: shared.clone(),
            decoder,
            options: LoadOptions::for_music(config.sample_rate),
            chunk_samples: config.music_chunk_samples,
            tx,
        };
        let handle = std::thread::Builder::new()
            .name("petalmix-music".into())
            .spawn(move || worker.run())
            .map_err(|e| PetalMixError::Thread(format!("Failed to spawn music worker: {}", e)))?;

        Ok(Self {
            shared,
            chunks: Some(rx),
            worker: Some(handle),
            generation: 0,
            name: String::new(),
            streaming: false,
        })
    }

    /// Switches the track to `path`, or to silence when `path` is `None`.
    ///
    /// `name` is remembered either way. Never blocks on decoding.
    pub fn set_source(&mut self, name: &str, path: Option<PathBuf>) {
        self.streaming = path.is_some();
        self.name = name.to_string();
        let source = match path {
            Some(path) => TrackSource::Streaming {
                name: name.to_string(),
                path,
            },
            None => TrackSource::Silence,
        };

        {
            let mut control = self.shared.control.lock();
            control.generation += 1;
            control.source = source;
            self.generation = control.generation;
        }
        self.shared.wake.notify_one();

        // Make room so a worker blocked on a full channel notices the switch
        if let Some(chunks) = self.chunks.as_ref() {
            while chunks.try_recv().is_ok() {}
        }
    }

    /// Next decoded chunk of the current source, if one is ready.
    pub fn next_chunk(&mut self) -> Option<Vec<i16>> {
        let chunks = self.chunks.as_ref()?;
        while let Ok(chunk) = chunks.try_recv() {
            if chunk.generation == self.generation {
                return Some(chunk.samples);
            }
        }
        None
    }

    /// Name of the selected track; empty for silence.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_streaming(&self) -> bool {
        self.streaming
    }

    pub fn source(&self) -> TrackSource {
        self.shared.control.lock().source.clone()
    }

    /// Stops the worker and waits for it to exit. Safe to call more than once.
    pub fn shutdown(&mut self) {
        self.shared.control.lock().shutdown = true;
        self.shared.wake.notify_all();
        // Unblocks a worker waiting on a full channel
        self.chunks = None;

        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                log::error!("Music worker thread panicked");
            }
        }
    }
}

impl Drop for MusicTrack {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Blends `outgoing` into `incoming` while `fade` counts down, appending to `out`.
///
/// Each output sample is weighted `fade / fade_length` toward the outgoing track, and
/// `fade` drops by one per sample. Missing samples count as silence.
fn crossfade(incoming: &[i16], outgoing: &[i16], fade: &mut u32, fade_length: u32, out: &mut Vec<i16>) {
    let length = fade_length.max(1) as i64;
    for i in 0..incoming.len().max(outgoing.len()) {
        let a = incoming.get(i).copied().unwrap_or(0) as i64;
        if *fade == 0 {
            out.push(a as i16);
            continue;
        }

        let b = outgoing.get(i).copied().unwrap_or(0) as i64;
        let f = (*fade).min(fade_length) as i64;
        out.push(((a * (length - f) + b * f) / length) as i16);
        *fade -= 1;
    }
}

/// Current and previous music tracks plus the crossfade between them.
pub struct MusicStreamer {
    current: MusicTrack,
    previous: MusicTrack,
    library: HashMap<String, PathBuf>,
    fade: u32,
    fade_length: u32,
    chunk_samples: usize,
    buffers: usize,
}

impl MusicStreamer {
    pub fn new(config: &PetalMixConfig, decoder: Arc<dyn SoundDecoder>) -> Result<Self> {
        Ok(Self {
            current: MusicTrack::spawn(config, decoder.clone())?,
            previous: MusicTrack::spawn(config, decoder)?,
            library: HashMap::new(),
            fade: 0,
            fade_length: config.fade_length,
            chunk_samples: config.music_chunk_samples,
            buffers: config.music_buffers,
        })
    }

    /// Replaces the known music tracks.
    pub fn set_library(&mut self, entries: &[AssetEntry]) {
        self.library = entries
            .iter()
            .map(|entry| (entry.name.clone(), entry.path.clone()))
            .collect();
        log::info!("Music library has {} tracks", self.library.len());
    }

    pub fn library_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.library.keys().map(String::as_str).collect();
        names.sort();
        names
    }

    /// Queues the initial silent buffers that keep the backend's stream cycling.
    pub fn prime(&self, backend: &mut dyn PlaybackBackend) {
        let silence = vec![0i16; self.chunk_samples];
        for _ in 0..self.buffers {
            backend.queue_stream_buffer(&silence);
        }
        backend.ensure_stream_playing();
    }

    /// Crossfades to `name`. An empty name fades to silence.
    pub fn play_music(&mut self, name: &str) {
        if name == self.current.name() {
            return;
        }

        let path = if name.is_empty() {
            None
        } else {
            let path = self.library.get(name).cloned();
            if path.is_none() {
                log::warn!("Unknown music track {}, playing silence", name);
            }
            path
        };

        log::info!(
            "Music: {} -> {}",
            display_name(self.current.name()),
            display_name(name)
        );
        std::mem::swap(&mut self.current, &mut self.previous);
        self.fade = self.fade_length;
        self.current.set_source(name, path);
    }

    /// Refills every stream buffer the backend finished playing.
    pub fn step(&mut self, backend: &mut dyn PlaybackBackend) {
        let processed = backend.processed_stream_buffers();
        for _ in 0..processed {
            let chunk = self.next_mixed_chunk();
            backend.queue_stream_buffer(&chunk);
        }
        backend.ensure_stream_playing();
    }

    fn next_mixed_chunk(&mut self) -> Vec<i16> {
        let incoming = self.current.next_chunk().unwrap_or_else(|| {
            if self.current.is_streaming() {
                log::warn!("Music underrun on {}", self.current.name());
            }
            vec![0; self.chunk_samples]
        });
        if self.fade == 0 {
            return incoming;
        }

        let outgoing = self.previous.next_chunk().unwrap_or_else(|| {
            if self.previous.is_streaming() {
                log::debug!("Outgoing music {} has no data", self.previous.name());
            }
            vec![0; self.chunk_samples]
        });

        let mut mixed = Vec::with_capacity(self.chunk_samples);
        crossfade(&incoming, &outgoing, &mut self.fade, self.fade_length, &mut mixed);
        if self.fade == 0 {
            log::debug!("Fade finished, releasing {}", display_name(self.previous.name()));
            self.previous.set_source("", None);
        }
        mixed
    }

    pub fn current_name(&self) -> &str {
        self.current.name()
    }

    /// Remaining fade steps; 0 when no fade is running.
    pub fn fade(&self) -> u32 {
        self.fade
    }

    pub fn shutdown(&mut self) {
        self.current.shutdown();
        self.previous.shutdown();
    }
}

fn display_name(name: &str) -> &str {
    if name.is_empty() { "<silence>" } else { name }
}
