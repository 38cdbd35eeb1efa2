//! Per-frame playback requests.
//!
//! Requests made through `&mut Audio` go straight into the live map. Requests from other
//! threads go through a [`SoundPlayer`] into a mutex-guarded deferred map, which is
//! folded into the live map on the next `update`. Either way, repeated requests for the
//! same sound within one frame merge into a single [`SpatialWeight`].

use crate::catalog::{SoundHandle, SoundId};
use crate::math::DVec2;
use crate::spatial::SpatialWeight;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// One sound requested this frame, with everything merged into it so far.
#[derive(Debug, Clone)]
pub struct QueuedSound {
    pub sound: SoundHandle,
    pub weight: SpatialWeight,
    /// Sequence number of the first request for this sound in the frame.
    pub order: u64,
}

#[derive(Debug, Default)]
struct RequestMap {
    requests: HashMap<SoundId, QueuedSound>,
    next_order: u64,
}

impl RequestMap {
    fn merge(&mut self, sound: &SoundHandle, weight: SpatialWeight) {
        match self.requests.entry(sound.id()) {
            Entry::Occupied(mut entry) => entry.get_mut().weight.merge(&weight),
            Entry::Vacant(entry) => {
                entry.insert(QueuedSound {
                    sound: sound.clone(),
                    weight,
                    order: self.next_order,
                });
                self.next_order += 1;
            }
        }
    }

    fn drain_ordered(&mut self) -> Vec<QueuedSound> {
        let mut drained: Vec<QueuedSound> = self.requests.drain().map(|(_, q)| q).collect();
        drained.sort_by_key(|queued| queued.order);
        self.next_order = 0;
        drained
    }
}

#[derive(Debug, Default)]
struct DeferredState {
    map: RequestMap,
    listener: DVec2,
}

#[derive(Debug)]
struct SharedRequests {
    deferred: Mutex<DeferredState>,
    /// Master volume as `f64` bits
    volume: AtomicU64,
    initialized: AtomicBool,
    distance_scale: f64,
}

impl SharedRequests {
    fn accepts(&self) -> bool {
        self.initialized.load(Ordering::Acquire) && self.volume() > 0.0
    }

    fn volume(&self) -> f64 {
        f64::from_bits(self.volume.load(Ordering::Relaxed))
    }
}

/// Cloneable handle for requesting sounds from any thread.
///
/// Requests are buffered and take effect on the owner's next `update`.
#[derive(Debug, Clone)]
pub struct SoundPlayer {
    shared: Arc<SharedRequests>,
}

impl SoundPlayer {
    /// Requests `sound` at the listener's position.
    pub fn play(&self, sound: &SoundHandle) {
        if !self.shared.accepts() {
            return;
        }
        let weight = SpatialWeight::at(DVec2::ZERO, self.shared.distance_scale);
        self.shared.deferred.lock().map.merge(sound, weight);
    }

    /// Requests `sound` at an absolute world position.
    pub fn play_at(&self, sound: &SoundHandle, position: DVec2) {
        if !self.shared.accepts() {
            return;
        }
        let mut deferred = self.shared.deferred.lock();
        let weight = SpatialWeight::at(position - deferred.listener, self.shared.distance_scale);
        deferred.map.merge(sound, weight);
    }

    pub fn volume(&self) -> f64 {
        self.shared.volume()
    }
}

/// The owning thread's side of the request queue.
#[derive(Debug)]
pub struct RequestQueue {
    live: RequestMap,
    listener: DVec2,
    shared: Arc<SharedRequests>,
}

impl RequestQueue {
    pub fn new(distance_scale: f64, initial_volume: f64) -> Self {
        Self {
            live: RequestMap::default(),
            listener: DVec2::ZERO,
            shared: Arc::new(SharedRequests {
                deferred: Mutex::new(DeferredState::default()),
                volume: AtomicU64::new(initial_volume.clamp(0.0, 1.0).to_bits()),
                initialized: AtomicBool::new(false),
                distance_scale,
            }),
        }
    }

    pub fn player(&self) -> SoundPlayer {
        SoundPlayer {
            shared: self.shared.clone(),
        }
    }

    pub fn set_initialized(&self, initialized: bool) {
        self.shared.initialized.store(initialized, Ordering::Release);
    }

    pub fn volume(&self) -> f64 {
        self.shared.volume()
    }

    /// Stores `level` clamped to `[0, 1]` and returns the stored value.
    pub fn set_volume(&self, level: f64) -> f64 {
        let level = if level.is_nan() { 0.0 } else { level.clamp(0.0, 1.0) };
        self.shared.volume.store(level.to_bits(), Ordering::Relaxed);
        level
    }

    pub fn listener(&self) -> DVec2 {
        self.listener
    }

    /// Requests `sound` at the listener's position.
    pub fn push(&mut self, sound: &SoundHandle) {
        self.push_offset(sound, DVec2::ZERO);
    }

    /// Requests `sound` at an absolute world position.
    pub fn push_at(&mut self, sound: &SoundHandle, position: DVec2) {
        self.push_offset(sound, position - self.listener);
    }

    fn push_offset(&mut self, sound: &SoundHandle, offset: DVec2) {
        if !self.shared.accepts() {
            return;
        }
        let weight = SpatialWeight::at(offset, self.shared.distance_scale);
        self.live.merge(sound, weight);
    }

    /// Publishes a new listener position and folds in every deferred request.
    pub fn update(&mut self, listener: DVec2) {
        self.listener = listener;

        let deferred = {
            let mut deferred = self.shared.deferred.lock();
            deferred.listener = listener;
            deferred.map.drain_ordered()
        };

        for queued in deferred {
            self.live.merge(&queued.sound, queued.weight);
        }
    }

    /// Takes this frame's requests, oldest first.
    pub fn take(&mut self) -> Vec<QueuedSound> {
        self.live.drain_ordered()
    }

    /// Number of distinct sounds in the live map.
    pub fn len(&self) -> usize {
        self.live.requests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.live.requests.is_empty()
    }

    /// Merged weight of `id` in the live map.
    pub fn pending(&self, id: SoundId) -> Option<SpatialWeight> {
        self.live.requests.get(&id).map(|queued| queued.weight)
    }

    /// Drops all live and deferred requests.
    pub fn clear(&mut self) {
        self.live.drain_ordered();
        self.shared.deferred.lock().map.drain_ordered();
    }
}
