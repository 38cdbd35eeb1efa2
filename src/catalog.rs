//! Named sound resources and their background loader.
//!
//! Handles are handed out immediately, even for sounds whose samples are still being
//! decoded. A dedicated loader thread works through the load queue and publishes the
//! samples into each handle once; playing a handle before that is a silent no-op.

use crate::assets::AssetEntry;
use crate::audio_data::{AudioData, LoadOptions, SoundDecoder};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet, VecDeque};
use std::path::PathBuf;
use std::sync::{Arc, OnceLock};
use std::thread::JoinHandle;

/// Stable identity of a sound resource.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SoundId(u64);

impl std::fmt::Display for SoundId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SoundId({})", self.0)
    }
}

#[derive(Debug)]
struct LoadedSound {
    data: AudioData,
    looping: bool,
}

/// A sound effect known to the catalog.
///
/// Created on first lookup, possibly long before its samples exist. Samples are set
/// exactly once by the loader and never change afterwards.
#[derive(Debug)]
pub struct SoundResource {
    id: SoundId,
    name: String,
    loaded: OnceLock<LoadedSound>,
}

/// Shared handle to a catalog entry.
pub type SoundHandle = Arc<SoundResource>;

impl SoundResource {
    fn placeholder(id: SoundId, name: &str) -> Self {
        Self {
            id,
            name: name.to_string(),
            loaded: OnceLock::new(),
        }
    }

    pub fn id(&self) -> SoundId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Decoded samples, once the loader has produced them.
    pub fn samples(&self) -> Option<&AudioData> {
        self.loaded.get().map(|loaded| &loaded.data)
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded.get().is_some()
    }

    /// Looping sounds play for as long as they keep being requested every frame.
    pub fn is_looping(&self) -> bool {
        self.loaded.get().is_some_and(|loaded| loaded.looping)
    }

    #[cfg(test)]
    pub(crate) fn with_raw_id(raw: u64, name: &str) -> Self {
        Self::placeholder(SoundId(raw), name)
    }

    /// Attaches samples. Returns false if samples were already present.
    pub(crate) fn publish(&self, data: AudioData, looping: bool) -> bool {
        self.loaded.set(LoadedSound { data, looping }).is_ok()
    }
}

struct KnownPath {
    path: PathBuf,
    looping: bool,
}

#[derive(Default)]
struct CatalogState {
    sounds: HashMap<String, SoundHandle>,
    paths: HashMap<String, KnownPath>,
    /// Names waiting to be decoded. The front entry stays queued while it loads.
    queue: VecDeque<String>,
    queued: HashSet<String>,
    /// Names whose file failed to decode. They are never queued again.
    failed: HashSet<String>,
    loaded: usize,
    next_id: u64,
    worker: Option<JoinHandle<()>>,
    /// Cleared by the loader in the same critical section that sees the empty queue.
    running: bool,
    closed: bool,
}

impl CatalogState {
    fn handle(&mut self, name: &str) -> SoundHandle {
        if let Some(handle) = self.sounds.get(name) {
            return handle.clone();
        }

        let id = SoundId(self.next_id);
        self.next_id += 1;
        let handle = Arc::new(SoundResource::placeholder(id, name));
        self.sounds.insert(name.to_string(), handle.clone());
        handle
    }

    /// Queues `name` if it has a known path and is neither resident nor queued.
    fn enqueue(&mut self, name: &str) -> bool {
        if self.closed
            || self.queued.contains(name)
            || self.failed.contains(name)
            || !self.paths.contains_key(name)
        {
            return false;
        }
        if self.sounds.get(name).is_some_and(|sound| sound.is_loaded()) {
            return false;
        }

        self.queue.push_back(name.to_string());
        self.queued.insert(name.to_string());
        true
    }
}

struct CatalogShared {
    state: Mutex<CatalogState>,
    decoder: Arc<dyn SoundDecoder>,
    options: LoadOptions,
}

/// Maps sound names to handles and loads their samples in the background.
pub struct SoundCatalog {
    shared: Arc<CatalogShared>,
}

impl SoundCatalog {
    pub fn new(decoder: Arc<dyn SoundDecoder>, options: LoadOptions) -> Self {
        Self {
            shared: Arc::new(CatalogShared {
                state: Mutex::new(CatalogState::default()),
                decoder,
                options,
            }),
        }
    }

    /// Records where a sound's file lives. Does not start loading it.
    pub fn register(&self, entry: &AssetEntry) {
        let mut state = self.shared.state.lock();
        state.failed.remove(&entry.name);
        if let Some(previous) = state.paths.insert(
            entry.name.clone(),
            KnownPath {
                path: entry.path.clone(),
                looping: entry.looping,
            },
        ) {
            log::debug!(
                "Sound {} at {} overrides {}",
                entry.name,
                entry.path.display(),
                previous.path.display()
            );
        }
    }

    /// Queues every registered sound that is not loaded yet and starts the loader.
    pub fn load_all(&self) {
        let mut state = self.shared.state.lock();
        let mut names: Vec<String> = state.paths.keys().cloned().collect();
        names.sort();

        let mut queued = 0;
        for name in &names {
            state.handle(name);
            if state.enqueue(name) {
                queued += 1;
            }
        }

        log::info!("Queued {} sounds for background loading", queued);
        if queued > 0 {
            self.ensure_worker(&mut state);
        }
    }

    /// Returns the handle for `name`, creating a placeholder on first use.
    ///
    /// If a file is known for the name and it is not resident, it is queued for
    /// loading.
    pub fn get(&self, name: &str) -> SoundHandle {
        let mut state = self.shared.state.lock();
        let handle = state.handle(name);
        if state.enqueue(name) {
            self.ensure_worker(&mut state);
        }
        handle
    }

    /// Fraction of queued work that is done, in `[0, 1]`.
    pub fn progress(&self) -> f64 {
        let state = self.shared.state.lock();
        if state.queue.is_empty() {
            return 1.0;
        }

        let done = state.loaded as f64;
        let total = done + state.queue.len() as f64;
        done / total
    }

    pub fn loaded_count(&self) -> usize {
        self.shared.state.lock().loaded
    }

    pub fn pending_count(&self) -> usize {
        self.shared.state.lock().queue.len()
    }

    /// Number of distinct sound names seen so far.
    pub fn len(&self) -> usize {
        self.shared.state.lock().sounds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drops pending loads and waits for the loader thread to exit.
    ///
    /// A file that is being decoded when this is called finishes first; nothing after
    /// it is started. Safe to call more than once.
    pub fn quit(&self) {
        let worker = {
            let mut state = self.shared.state.lock();
            state.closed = true;
            if !state.queue.is_empty() {
                log::info!("Dropping {} pending sound loads", state.queue.len());
            }
            state.queue.clear();
            state.queued.clear();
            state.worker.take()
        };

        if let Some(worker) = worker {
            if worker.join().is_err() {
                log::error!("Sound loader thread panicked");
            }
        }
    }

    fn ensure_worker(&self, state: &mut CatalogState) {
        if state.running {
            return;
        }
        // A previous loader has already left its loop and only needs reaping
        if let Some(finished) = state.worker.take() {
            if finished.join().is_err() {
                log::error!("Sound loader thread panicked");
            }
        }

        let shared = self.shared.clone();
        match std::thread::Builder::new()
            .name("petalmix-loader".into())
            .spawn(move || shared.run_loader())
        {
            Ok(worker) => {
                state.worker = Some(worker);
                state.running = true;
            }
            Err(e) => log::error!("Failed to spawn sound loader thread: {}", e),
        }
    }
}

impl CatalogShared {
    fn run_loader(&self) {
        log::debug!("Sound loader started");

        loop {
            let (name, path, looping, handle) = {
                let mut state = self.state.lock();
                let Some(name) = state.queue.front().cloned() else {
                    state.running = false;
                    break;
                };
                let known = state
                    .paths
                    .get(&name)
                    .map(|known| (known.path.clone(), known.looping));
                let Some((path, looping)) = known else {
                    state.queue.pop_front();
                    state.queued.remove(&name);
                    continue;
                };
                let handle = state.handle(&name);
                (name, path, looping, handle)
            };

            // Decode without holding the lock
            let result = self.decoder.decode(&path, &self.options);

            let mut state = self.state.lock();
            match result {
                Ok(data) => {
                    if handle.publish(data, looping) {
                        state.loaded += 1;
                    }
                }
                Err(e) => {
                    log::error!("Failed to load sound {} from {}: {}", name, path.display(), e);
                    state.failed.insert(name.clone());
                }
            }
            // quit() may have cleared the queue in the meantime
            if state.queue.front() == Some(&name) {
                state.queue.pop_front();
                state.queued.remove(&name);
            }
        }

        log::debug!("Sound loader finished");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{GatedDecoder, MemoryDecoder};
    use std::time::{Duration, Instant};

    fn entry(name: &str) -> AssetEntry {
        AssetEntry {
            name: name.to_string(),
            path: PathBuf::from(format!("sounds/{}.wav", name)),
            looping: false,
        }
    }

    fn wait_until(mut condition: impl FnMut() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !condition() {
            assert!(Instant::now() < deadline, "condition not reached in time");
            std::thread::sleep(Duration::from_millis(2));
        }
    }

    #[test]
    fn test_get_returns_stable_handle() {
        let catalog = SoundCatalog::new(Arc::new(MemoryDecoder::new()), LoadOptions::default());
        let a = catalog.get("laser");
        let b = catalog.get("laser");
        assert!(Arc::ptr_eq(&a, &b));
        assert_ne!(a.id(), catalog.get("engine").id());
        assert!(!a.is_loaded());
        assert_eq!(catalog.len(), 2);
    }

    #[test]
    fn test_progress_is_one_when_nothing_pending() {
        let catalog = SoundCatalog::new(Arc::new(MemoryDecoder::new()), LoadOptions::default());
        assert_eq!(catalog.progress(), 1.0);
        catalog.get("unknown");
        assert_eq!(catalog.progress(), 1.0);
    }

    #[test]
    fn test_background_load_publishes_samples() {
        let catalog = SoundCatalog::new(Arc::new(MemoryDecoder::new()), LoadOptions::default());
        catalog.register(&entry("blaster"));
        catalog.register(&AssetEntry {
            name: "engine".to_string(),
            path: PathBuf::from("sounds/engine~.wav"),
            looping: true,
        });
        catalog.load_all();

        let blaster = catalog.get("blaster");
        let engine = catalog.get("engine");
        wait_until(|| blaster.is_loaded() && engine.is_loaded());
        assert!(!blaster.is_looping());
        assert!(engine.is_looping());
        assert_eq!(catalog.loaded_count(), 2);
        assert_eq!(catalog.progress(), 1.0);
        catalog.quit();
    }

    #[test]
    fn test_progress_counts_loaded_over_total() {
        let decoder = Arc::new(GatedDecoder::new());
        let catalog = SoundCatalog::new(decoder.clone(), LoadOptions::default());
        for name in ["a", "b", "c", "d"] {
            catalog.register(&entry(name));
        }
        catalog.load_all();
        assert_eq!(catalog.progress(), 0.0);

        decoder.release(1);
        wait_until(|| catalog.loaded_count() == 1);
        assert_eq!(catalog.pending_count(), 3);
        assert_eq!(catalog.progress(), 0.25);

        decoder.release(3);
        wait_until(|| catalog.progress() == 1.0);
        assert_eq!(catalog.loaded_count(), 4);
        catalog.quit();
    }

    #[test]
    fn test_failed_load_is_skipped_and_others_continue() {
        let decoder = MemoryDecoder::new().failing("broken");
        let catalog = SoundCatalog::new(Arc::new(decoder), LoadOptions::default());
        catalog.register(&entry("broken"));
        catalog.register(&entry("fine"));
        catalog.load_all();

        let fine = catalog.get("fine");
        wait_until(|| fine.is_loaded() && catalog.pending_count() == 0);
        assert!(!catalog.get("broken").is_loaded());
        assert_eq!(catalog.loaded_count(), 1);
        catalog.quit();
    }

    #[test]
    fn test_get_does_not_requeue_failed_sound() {
        let decoder = MemoryDecoder::new().failing("broken");
        let catalog = SoundCatalog::new(Arc::new(decoder), LoadOptions::default());
        catalog.register(&entry("broken"));
        catalog.load_all();
        wait_until(|| catalog.pending_count() == 0);

        for _ in 0..5 {
            assert!(!catalog.get("broken").is_loaded());
            assert_eq!(catalog.pending_count(), 0);
        }
        assert_eq!(catalog.progress(), 1.0);
        catalog.quit();
    }

    #[test]
    fn test_get_after_queue_drains_starts_new_loader() {
        let catalog = SoundCatalog::new(Arc::new(MemoryDecoder::new()), LoadOptions::default());
        catalog.register(&entry("a"));
        catalog.register(&entry("b"));

        let a = catalog.get("a");
        wait_until(|| a.is_loaded() && !catalog.shared.state.lock().running);

        // Stand in for a loader that saw the empty queue but has not returned yet
        {
            let mut state = catalog.shared.state.lock();
            if let Some(worker) = state.worker.take() {
                worker.join().unwrap();
            }
            state.worker = Some(std::thread::spawn(|| {
                std::thread::sleep(Duration::from_millis(50));
            }));
        }

        let b = catalog.get("b");
        wait_until(|| b.is_loaded());
        assert_eq!(catalog.pending_count(), 0);
        assert_eq!(catalog.progress(), 1.0);
        catalog.quit();
    }

    #[test]
    fn test_get_restarts_loader_for_known_sound() {
        let catalog = SoundCatalog::new(Arc::new(MemoryDecoder::new()), LoadOptions::default());
        catalog.register(&entry("late"));
        let late = catalog.get("late");
        wait_until(|| late.is_loaded());
        catalog.quit();
    }

    #[test]
    fn test_quit_with_pending_loads_terminates() {
        let decoder = MemoryDecoder::new().with_delay(Duration::from_millis(20));
        let catalog = SoundCatalog::new(Arc::new(decoder), LoadOptions::default());
        for i in 0..100 {
            catalog.register(&entry(&format!("sound{}", i)));
        }
        catalog.load_all();

        let started = Instant::now();
        catalog.quit();
        assert!(started.elapsed() < Duration::from_secs(2));
        assert!(catalog.loaded_count() < 100);
        assert_eq!(catalog.progress(), 1.0);
        assert!(catalog.shared.state.lock().worker.is_none());

        // Nothing is queued once the catalog is closed
        catalog.get("sound99");
        assert_eq!(catalog.pending_count(), 0);
        catalog.quit();
    }
}
