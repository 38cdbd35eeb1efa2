//! Test doubles shared by the unit tests.

use crate::audio_data::{AudioData, LoadOptions, PcmStream, SoundDecoder};
use crate::backend::{ChannelId, PlaybackBackend};
use crate::catalog::{SoundHandle, SoundResource};
use crate::error::{PetalMixError, Result};
use crate::math::DVec3;
use crossbeam_channel::{Receiver, Sender, unbounded};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

fn short_clip(sample_rate: u32) -> AudioData {
    AudioData::new(vec![0.5; 64], sample_rate, 1).unwrap()
}

/// A loaded one-shot sound.
pub(crate) fn sound(id: u64, name: &str) -> SoundHandle {
    let resource = SoundResource::with_raw_id(id, name);
    resource.publish(short_clip(44100), false);
    Arc::new(resource)
}

pub(crate) fn looping_sound(id: u64, name: &str) -> SoundHandle {
    let resource = SoundResource::with_raw_id(id, name);
    resource.publish(short_clip(44100), true);
    Arc::new(resource)
}

pub(crate) fn unloaded_sound(id: u64, name: &str) -> SoundHandle {
    Arc::new(SoundResource::with_raw_id(id, name))
}

fn stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

#[derive(Debug, Default)]
struct MockChannel {
    bound: bool,
    looping: bool,
    playing: bool,
    plays: usize,
    position: Option<DVec3>,
    position_updates: usize,
}

#[derive(Debug, Default)]
struct MockState {
    channels: HashMap<u32, MockChannel>,
    next_id: u32,
    limit: Option<usize>,
    create_attempts: usize,
    master_gain: Option<f32>,
    stream_buffers: Vec<Vec<i16>>,
    processed: usize,
    ensure_calls: usize,
    opened: bool,
    closed: bool,
}

/// Recording backend. Clones share state, so a test can keep one while the facade
/// owns another.
#[derive(Debug, Clone, Default)]
pub(crate) struct MockBackend {
    state: Arc<Mutex<MockState>>,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Backend that refuses to create more than `limit` live channels.
    pub fn with_channel_limit(limit: usize) -> Self {
        let backend = Self::default();
        backend.state.lock().limit = Some(limit);
        backend
    }

    pub fn channel_count(&self) -> usize {
        self.state.lock().channels.len()
    }

    pub fn create_attempts(&self) -> usize {
        self.state.lock().create_attempts
    }

    pub fn play_count(&self, channel: ChannelId) -> usize {
        self.state.lock().channels.get(&channel.0).map_or(0, |c| c.plays)
    }

    pub fn is_playing(&self, channel: ChannelId) -> bool {
        self.state.lock().channels.get(&channel.0).is_some_and(|c| c.playing)
    }

    pub fn is_looping(&self, channel: ChannelId) -> bool {
        self.state.lock().channels.get(&channel.0).is_some_and(|c| c.looping)
    }

    pub fn position(&self, channel: ChannelId) -> Option<DVec3> {
        self.state.lock().channels.get(&channel.0).and_then(|c| c.position)
    }

    pub fn position_updates(&self, channel: ChannelId) -> usize {
        self.state
            .lock()
            .channels
            .get(&channel.0)
            .map_or(0, |c| c.position_updates)
    }

    /// Total `play` calls across all live channels.
    pub fn total_plays(&self) -> usize {
        self.state.lock().channels.values().map(|c| c.plays).sum()
    }

    /// Simulates a one-shot channel reaching the end of its samples.
    pub fn finish(&self, channel: ChannelId) {
        if let Some(c) = self.state.lock().channels.get_mut(&channel.0) {
            c.playing = false;
        }
    }

    pub fn master_gain(&self) -> Option<f32> {
        self.state.lock().master_gain
    }

    /// Simulates the device playing through `count` music buffers.
    pub fn complete_stream_buffers(&self, count: usize) {
        self.state.lock().processed += count;
    }

    pub fn stream_buffers(&self) -> Vec<Vec<i16>> {
        self.state.lock().stream_buffers.clone()
    }

    pub fn ensure_calls(&self) -> usize {
        self.state.lock().ensure_calls
    }

    pub fn is_open(&self) -> bool {
        let state = self.state.lock();
        state.opened && !state.closed
    }

    pub fn was_closed(&self) -> bool {
        self.state.lock().closed
    }
}

impl PlaybackBackend for MockBackend {
    fn open(&mut self) -> Result<()> {
        self.state.lock().opened = true;
        Ok(())
    }

    fn close(&mut self) {
        self.state.lock().closed = true;
    }

    fn create_channel(&mut self) -> Result<ChannelId> {
        let mut state = self.state.lock();
        state.create_attempts += 1;
        if state.limit.is_some_and(|limit| state.channels.len() >= limit) {
            return Err(PetalMixError::Backend("out of channels".into()));
        }
        let id = state.next_id;
        state.next_id += 1;
        state.channels.insert(id, MockChannel::default());
        Ok(ChannelId(id))
    }

    fn destroy_channel(&mut self, channel: ChannelId) {
        self.state.lock().channels.remove(&channel.0);
    }

    fn bind(&mut self, channel: ChannelId, _data: &AudioData, looping: bool) {
        if let Some(c) = self.state.lock().channels.get_mut(&channel.0) {
            c.bound = true;
            c.looping = looping;
            c.playing = false;
        }
    }

    fn set_position(&mut self, channel: ChannelId, position: DVec3) {
        if let Some(c) = self.state.lock().channels.get_mut(&channel.0) {
            c.position = Some(position);
            c.position_updates += 1;
        }
    }

    fn play(&mut self, channel: ChannelId) {
        if let Some(c) = self.state.lock().channels.get_mut(&channel.0) {
            c.playing = c.bound;
            c.plays += 1;
        }
    }

    fn stop(&mut self, channel: ChannelId) {
        if let Some(c) = self.state.lock().channels.get_mut(&channel.0) {
            c.playing = false;
        }
    }

    fn is_finished(&self, channel: ChannelId) -> bool {
        !self.is_playing(channel)
    }

    fn set_master_gain(&mut self, gain: f32) {
        self.state.lock().master_gain = Some(gain);
    }

    fn processed_stream_buffers(&mut self) -> usize {
        std::mem::take(&mut self.state.lock().processed)
    }

    fn queue_stream_buffer(&mut self, pcm: &[i16]) {
        self.state.lock().stream_buffers.push(pcm.to_vec());
    }

    fn ensure_stream_playing(&mut self) {
        self.state.lock().ensure_calls += 1;
    }
}

/// Decoder that fabricates audio from file names.
///
/// Every sound decodes to a short mono clip. Music streams are a constant sample value,
/// configurable per file stem.
#[derive(Debug, Default)]
pub(crate) struct MemoryDecoder {
    failing: HashSet<String>,
    streams: HashMap<String, (i16, usize)>,
    delay: Option<Duration>,
}

impl MemoryDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes files with this stem fail to decode or open.
    pub fn failing(mut self, stem: &str) -> Self {
        self.failing.insert(stem.to_string());
        self
    }

    /// Sleeps this long in every `decode` call.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Streams `len` samples of `value` for files with this stem.
    pub fn with_stream(mut self, stem: &str, value: i16, len: usize) -> Self {
        self.streams.insert(stem.to_string(), (value, len));
        self
    }
}

impl SoundDecoder for MemoryDecoder {
    fn decode(&self, path: &Path, options: &LoadOptions) -> Result<AudioData> {
        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }
        if self.failing.contains(&stem(path)) {
            return Err(PetalMixError::AudioLoading(format!(
                "cannot decode {}",
                path.display()
            )));
        }
        Ok(short_clip(options.target_sample_rate.unwrap_or(44100)))
    }

    fn open_stream(&self, path: &Path, _options: &LoadOptions) -> Result<Box<dyn PcmStream>> {
        let stem = stem(path);
        if self.failing.contains(&stem) {
            return Err(PetalMixError::AudioLoading(format!(
                "cannot open {}",
                path.display()
            )));
        }
        let (value, remaining) = self.streams.get(&stem).copied().unwrap_or((1000, 4096));
        Ok(Box::new(ConstantStream { value, remaining }))
    }
}

struct ConstantStream {
    value: i16,
    remaining: usize,
}

impl PcmStream for ConstantStream {
    fn read(&mut self, out: &mut [i16]) -> Result<usize> {
        let count = out.len().min(self.remaining);
        out[..count].fill(self.value);
        self.remaining -= count;
        Ok(count)
    }
}

/// Decoder whose `decode` calls block until the test releases them.
pub(crate) struct GatedDecoder {
    tx: Sender<()>,
    rx: Receiver<()>,
}

impl GatedDecoder {
    pub fn new() -> Self {
        let (tx, rx) = unbounded();
        Self { tx, rx }
    }

    /// Lets `count` more decodes complete.
    pub fn release(&self, count: usize) {
        for _ in 0..count {
            let _ = self.tx.send(());
        }
    }
}

impl SoundDecoder for GatedDecoder {
    fn decode(&self, _path: &Path, options: &LoadOptions) -> Result<AudioData> {
        self.rx
            .recv()
            .map_err(|e| PetalMixError::Thread(e.to_string()))?;
        Ok(short_clip(options.target_sample_rate.unwrap_or(44100)))
    }

    fn open_stream(&self, path: &Path, _options: &LoadOptions) -> Result<Box<dyn PcmStream>> {
        Err(PetalMixError::AudioLoading(format!(
            "no streams for {}",
            path.display()
        )))
    }
}
