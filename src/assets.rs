//! Discovery of sound and music files.

use crate::error::Result;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Marks a looping sound when it ends the file stem.
const LOOP_MARKER: char = '~';

/// A named asset file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetEntry {
    /// Path relative to the `sounds` folder, `/`-separated, without extension or loop
    /// marker.
    pub name: String,
    pub path: PathBuf,
    pub looping: bool,
}

/// Supplies the files the catalog and the music library are built from.
///
/// Only consulted during `Audio::init`. When two entries share a name, the later one
/// wins.
pub trait AssetSource {
    fn sounds(&self) -> Result<Vec<AssetEntry>>;

    fn music(&self) -> Result<Vec<AssetEntry>>;
}

/// Scans `<root>/sounds/` under each root directory, in order.
#[derive(Debug, Clone)]
pub struct DirectoryAssets {
    roots: Vec<PathBuf>,
    sound_extensions: Vec<String>,
    music_extensions: Vec<String>,
}

impl DirectoryAssets {
    pub fn new<I, P>(roots: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        Self {
            roots: roots.into_iter().map(|p| p.as_ref().to_path_buf()).collect(),
            sound_extensions: vec!["wav".to_string()],
            music_extensions: vec!["mp3".to_string()],
        }
    }

    pub fn sound_extensions(mut self, extensions: &[String]) -> Self {
        self.sound_extensions = extensions.to_vec();
        self
    }

    pub fn music_extensions(mut self, extensions: &[String]) -> Self {
        self.music_extensions = extensions.to_vec();
        self
    }

    fn scan(&self, extensions: &[String], allow_looping: bool) -> Result<Vec<AssetEntry>> {
        let mut entries = Vec::new();

        for root in &self.roots {
            let folder = root.join("sounds");
            if !folder.is_dir() {
                log::debug!("No sounds folder in {}", root.display());
                continue;
            }

            let mut found = Vec::new();
            for entry in WalkDir::new(&folder).follow_links(true) {
                let entry = match entry {
                    Ok(entry) => entry,
                    Err(e) => {
                        log::warn!("Skipping unreadable entry under {}: {}", folder.display(), e);
                        continue;
                    }
                };
                if !entry.file_type().is_file() {
                    continue;
                }

                let path = entry.path();
                let matches = path
                    .extension()
                    .and_then(|e| e.to_str())
                    .is_some_and(|ext| extensions.iter().any(|x| x.eq_ignore_ascii_case(ext)));
                if !matches {
                    continue;
                }

                if let Some(asset) = asset_entry(&folder, path, allow_looping) {
                    found.push(asset);
                }
            }

            found.sort_by(|a, b| a.name.cmp(&b.name));
            entries.extend(found);
        }

        Ok(entries)
    }
}

/// Builds the catalog entry for `path` found under `folder`.
fn asset_entry(folder: &Path, path: &Path, allow_looping: bool) -> Option<AssetEntry> {
    let relative = path.strip_prefix(folder).ok()?.with_extension("");
    let mut name = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/");

    let looping = allow_looping && name.ends_with(LOOP_MARKER);
    if looping {
        name.pop();
    }
    if name.is_empty() {
        return None;
    }

    Some(AssetEntry {
        name,
        path: path.to_path_buf(),
        looping,
    })
}

impl AssetSource for DirectoryAssets {
    fn sounds(&self) -> Result<Vec<AssetEntry>> {
        self.scan(&self.sound_extensions, true)
    }

    fn music(&self) -> Result<Vec<AssetEntry>> {
        self.scan(&self.music_extensions, false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn touch(root: &Path, relative: &str) {
        let path = root.join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, b"").unwrap();
    }

    fn names(entries: &[AssetEntry]) -> Vec<&str> {
        entries.iter().map(|e| e.name.as_str()).collect()
    }

    #[test]
    fn test_scans_sounds_folder() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "sounds/laser.wav");
        touch(dir.path(), "sounds/weapons/blaster.WAV");
        touch(dir.path(), "sounds/readme.txt");
        touch(dir.path(), "images/laser.wav");

        let assets = DirectoryAssets::new([dir.path()]);
        let sounds = assets.sounds().unwrap();
        assert_eq!(names(&sounds), vec!["laser", "weapons/blaster"]);
        assert!(sounds.iter().all(|e| !e.looping));
    }

    #[test]
    fn test_tilde_marks_looping_sound() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "sounds/engine~.wav");

        let sounds = DirectoryAssets::new([dir.path()]).sounds().unwrap();
        assert_eq!(sounds.len(), 1);
        assert_eq!(sounds[0].name, "engine");
        assert!(sounds[0].looping);
        assert!(sounds[0].path.ends_with("engine~.wav"));
    }

    #[test]
    fn test_music_uses_its_own_extensions() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "sounds/ambient/calm.mp3");
        touch(dir.path(), "sounds/laser.wav");

        let assets = DirectoryAssets::new([dir.path()]);
        assert_eq!(names(&assets.music().unwrap()), vec!["ambient/calm"]);
        assert_eq!(names(&assets.sounds().unwrap()), vec!["laser"]);
    }

    #[test]
    fn test_roots_are_scanned_in_order() {
        let base = TempDir::new().unwrap();
        let plugin = TempDir::new().unwrap();
        let missing = base.path().join("nowhere");
        touch(base.path(), "sounds/laser.wav");
        touch(plugin.path(), "sounds/laser.wav");

        let assets = DirectoryAssets::new([base.path(), missing.as_path(), plugin.path()]);
        let sounds = assets.sounds().unwrap();
        assert_eq!(sounds.len(), 2);
        assert!(sounds[1].path.starts_with(plugin.path()));
    }

    #[test]
    fn test_custom_extensions() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "sounds/hit.ogg");
        touch(dir.path(), "sounds/hit.wav");

        let assets = DirectoryAssets::new([dir.path()]).sound_extensions(&["ogg".to_string()]);
        let sounds = assets.sounds().unwrap();
        assert_eq!(sounds.len(), 1);
        assert!(sounds[0].path.ends_with("hit.ogg"));
    }
}
