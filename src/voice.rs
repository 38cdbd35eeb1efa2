//! Fixed-capacity pool of backend channels.
//!
//! Each frame the pool reaps voices that are done, then binds this frame's requests to
//! channels oldest-first. A sound never holds more than one voice: a repeated request
//! retriggers the voice it already has. When the pool is full, further requests are
//! dropped and voices already playing are left alone.

use crate::backend::{ChannelId, PlaybackBackend};
use crate::catalog::{SoundHandle, SoundId};
use crate::math::DVec3;
use crate::queue::QueuedSound;
use crate::spatial::Placement;
use std::collections::HashMap;

/// A sound bound to a backend channel.
#[derive(Debug)]
pub struct Voice {
    sound: SoundHandle,
    channel: ChannelId,
    last_position: Option<DVec3>,
}

impl Voice {
    pub fn sound(&self) -> &SoundHandle {
        &self.sound
    }

    pub fn channel(&self) -> ChannelId {
        self.channel
    }

    /// Position last sent to the backend.
    pub fn position(&self) -> Option<DVec3> {
        self.last_position
    }

    /// Repositions the channel unless it moved by no more than `tolerance`.
    ///
    /// A tolerance of 0 always repositions.
    fn move_to(&mut self, backend: &mut dyn PlaybackBackend, placement: Placement, tolerance: f64) {
        let position = placement.position();
        let unchanged = self
            .last_position
            .is_some_and(|last| tolerance > 0.0 && last.distance(position) <= tolerance);
        if unchanged {
            return;
        }

        backend.set_position(self.channel, position);
        self.last_position = Some(position);
    }
}

pub struct VoicePool {
    voices: Vec<Voice>,
    recycled: Vec<ChannelId>,
    /// Channels created on the backend so far
    created: usize,
    max_sources: usize,
    move_tolerance: f64,
}

impl VoicePool {
    pub fn new(max_sources: usize, move_tolerance: f64) -> Self {
        Self {
            voices: Vec::new(),
            recycled: Vec::new(),
            created: 0,
            max_sources,
            move_tolerance,
        }
    }

    /// Maps this frame's requests onto channels.
    ///
    /// `queue` must be in request order; earlier requests win channels first.
    pub fn step(&mut self, backend: &mut dyn PlaybackBackend, queue: Vec<QueuedSound>) {
        let mut index: HashMap<SoundId, usize> = HashMap::with_capacity(queue.len());
        let mut requests: Vec<Option<QueuedSound>> = Vec::with_capacity(queue.len());
        for queued in queue {
            index.insert(queued.sound.id(), requests.len());
            requests.push(Some(queued));
        }

        self.reap(backend, &index, &mut requests);

        for queued in requests.into_iter().flatten() {
            self.allocate(backend, queued);
        }
    }

    fn reap(
        &mut self,
        backend: &mut dyn PlaybackBackend,
        index: &HashMap<SoundId, usize>,
        requests: &mut [Option<QueuedSound>],
    ) {
        let tolerance = self.move_tolerance;
        let mut kept = Vec::with_capacity(self.voices.len());

        for mut voice in self.voices.drain(..) {
            if voice.sound.is_looping() {
                let request = index
                    .get(&voice.sound.id())
                    .and_then(|&i| requests[i].take());
                match request.and_then(|queued| queued.weight.placement()) {
                    Some(placement) => {
                        voice.move_to(backend, placement, tolerance);
                        kept.push(voice);
                    }
                    None => {
                        log::trace!("Looping sound {} no longer requested", voice.sound.name());
                        backend.stop(voice.channel);
                        self.recycled.push(voice.channel);
                    }
                }
            } else if backend.is_finished(voice.channel) {
                self.recycled.push(voice.channel);
            } else {
                kept.push(voice);
            }
        }

        self.voices = kept;
    }

    fn allocate(&mut self, backend: &mut dyn PlaybackBackend, queued: QueuedSound) {
        let Some(placement) = queued.weight.placement() else {
            return;
        };
        let Some(data) = queued.sound.samples() else {
            log::trace!("Sound {} not loaded yet, skipping", queued.sound.name());
            return;
        };

        let tolerance = self.move_tolerance;
        if let Some(voice) = self
            .voices
            .iter_mut()
            .find(|voice| voice.sound.id() == queued.sound.id())
        {
            voice.move_to(backend, placement, tolerance);
            backend.play(voice.channel);
            return;
        }

        let Some(channel) = self.acquire_channel(backend) else {
            log::debug!(
                "All {} voices busy, dropping {}",
                self.max_sources,
                queued.sound.name()
            );
            return;
        };

        backend.bind(channel, data, queued.sound.is_looping());
        let mut voice = Voice {
            sound: queued.sound,
            channel,
            last_position: None,
        };
        voice.move_to(backend, placement, tolerance);
        backend.play(channel);
        self.voices.push(voice);
    }

    fn acquire_channel(&mut self, backend: &mut dyn PlaybackBackend) -> Option<ChannelId> {
        if let Some(channel) = self.recycled.pop() {
            return Some(channel);
        }
        if self.created >= self.max_sources {
            return None;
        }

        match backend.create_channel() {
            Ok(channel) => {
                self.created += 1;
                Some(channel)
            }
            Err(e) => {
                log::warn!(
                    "Backend refused channel {} ({}), capping voices at {}",
                    self.created + 1,
                    e,
                    self.created
                );
                self.max_sources = self.created;
                None
            }
        }
    }

    /// Stops and destroys every channel the pool owns.
    pub fn release_all(&mut self, backend: &mut dyn PlaybackBackend) {
        for voice in self.voices.drain(..) {
            backend.stop(voice.channel);
            backend.destroy_channel(voice.channel);
        }
        for channel in self.recycled.drain(..) {
            backend.destroy_channel(channel);
        }
        self.created = 0;
    }

    pub fn active_voices(&self) -> &[Voice] {
        &self.voices
    }

    pub fn voice_for(&self, id: SoundId) -> Option<&Voice> {
        self.voices.iter().find(|voice| voice.sound.id() == id)
    }

    pub fn recycled_len(&self) -> usize {
        self.recycled.len()
    }

    /// Current ceiling on channels; lowered if the backend refuses to create more.
    pub fn capacity(&self) -> usize {
        self.max_sources
    }

    pub fn created(&self) -> usize {
        self.created
    }
}
