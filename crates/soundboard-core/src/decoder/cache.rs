//! Control-side cache of decoded sounds

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use basedrop::{Handle, Shared};

use super::{decode_file, resample_stereo, DecodeResult, SoundAsset};
use crate::engine::gc_handle;
use crate::types::{AssetId, StereoBuffer};

/// A decoded sound shared between the cache and playing voices
///
/// Dropping the last clone on the audio thread only enqueues the buffer;
/// the GC thread frees it.
pub type SharedAsset = Shared<SoundAsset>;

/// Decoded sounds keyed by id and by canonical path
///
/// Loading the same file twice returns the same asset. Evicting a sound
/// only removes the cache's reference: voices still playing it keep it alive.
pub struct SoundCache {
    sample_rate: u32,
    handle: Handle,
    next_id: u64,
    assets: HashMap<AssetId, SharedAsset>,
    by_path: HashMap<PathBuf, AssetId>,
}

impl SoundCache {
    /// Create an empty cache producing assets at `sample_rate`
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            handle: gc_handle(),
            next_id: 1,
            assets: HashMap::new(),
            by_path: HashMap::new(),
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Change the rate assets are produced at
    ///
    /// Cached assets were converted for the old rate, so the cache is cleared.
    pub fn set_sample_rate(&mut self, sample_rate: u32) {
        if sample_rate != self.sample_rate {
            log::info!(
                "Sound cache rate {} -> {} Hz, dropping {} cached sounds",
                self.sample_rate,
                sample_rate,
                self.assets.len()
            );
            self.sample_rate = sample_rate;
            self.clear();
        }
    }

    /// Decode a file, or return the cached asset for it
    pub fn load(&mut self, path: impl AsRef<Path>) -> DecodeResult<SharedAsset> {
        let path = path.as_ref();
        let key = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());

        if let Some(asset) = self.by_path.get(&key).and_then(|id| self.assets.get(id)) {
            return Ok(asset.clone());
        }

        let decoded = decode_file(&key, self.sample_rate)?;
        let name = key
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| key.display().to_string());

        let id = self.allocate_id();
        let asset = SoundAsset::from_decoded(id, name, key.clone(), decoded);
        log::info!(
            "Loaded {} as {} ({:.2}s)",
            key.display(),
            id,
            asset.duration_secs()
        );

        self.by_path.insert(key, id);
        Ok(self.store(asset))
    }

    /// Register frames built in memory (tones, recordings, tests)
    ///
    /// Frames at a different rate are converted first.
    pub fn insert(
        &mut self,
        name: impl Into<String>,
        frames: StereoBuffer,
        sample_rate: u32,
    ) -> DecodeResult<SharedAsset> {
        let frames = resample_stereo(&frames, sample_rate, self.sample_rate)?;
        let id = self.allocate_id();
        let asset = SoundAsset::from_frames(id, name, frames, self.sample_rate);
        Ok(self.store(asset))
    }

    pub fn get(&self, id: AssetId) -> Option<SharedAsset> {
        self.assets.get(&id).cloned()
    }

    /// Look up a previously loaded file
    pub fn get_by_path(&self, path: impl AsRef<Path>) -> Option<SharedAsset> {
        let path = path.as_ref();
        let key = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
        self.by_path.get(&key).and_then(|id| self.get(*id))
    }

    /// Remove a sound from the cache. Returns whether it was present.
    pub fn evict(&mut self, id: AssetId) -> bool {
        self.by_path.retain(|_, cached| *cached != id);
        self.assets.remove(&id).is_some()
    }

    pub fn clear(&mut self) {
        self.assets.clear();
        self.by_path.clear();
    }

    pub fn len(&self) -> usize {
        self.assets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assets.is_empty()
    }

    /// Cached assets in id order
    pub fn assets(&self) -> Vec<SharedAsset> {
        let mut assets: Vec<_> = self.assets.values().cloned().collect();
        assets.sort_by_key(|a| a.id);
        assets
    }

    fn allocate_id(&mut self) -> AssetId {
        let id = AssetId(self.next_id);
        self.next_id += 1;
        id
    }

    fn store(&mut self, asset: SoundAsset) -> SharedAsset {
        let shared = Shared::new(&self.handle, asset);
        self.assets.insert(shared.id, shared.clone());
        shared
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::tests::write_wav;
    use crate::decoder::DecodeError;
    use crate::types::StereoSample;
    use tempfile::TempDir;

    #[test]
    fn test_load_is_cached_by_path() {
        let dir = TempDir::new().unwrap();
        let path = write_wav(dir.path(), "kick.wav", 48000, 2, 2400);

        let mut cache = SoundCache::new(48000);
        let first = cache.load(&path).unwrap();
        let second = cache.load(&path).unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(first.name, "kick");
        assert_eq!(cache.len(), 1);
        assert!(cache.get_by_path(&path).is_some());
    }

    #[test]
    fn test_evicted_asset_outlives_cache_entry() {
        let mut cache = SoundCache::new(48000);
        let asset = cache
            .insert("beep", StereoBuffer::from_vec(vec![StereoSample::mono(0.5); 100]), 48000)
            .unwrap();

        assert!(cache.evict(asset.id));
        assert!(!cache.evict(asset.id));
        assert!(cache.get(asset.id).is_none());

        // A voice holding a clone still reads valid frames
        assert_eq!(asset.frame_count(), 100);
        assert_eq!(asset.frames[99], StereoSample::mono(0.5));
    }

    #[test]
    fn test_insert_converts_rate() {
        let mut cache = SoundCache::new(48000);
        let asset = cache
            .insert("tone", StereoBuffer::silence(24000), 24000)
            .unwrap();

        assert_eq!(asset.sample_rate, 48000);
        assert_eq!(asset.frame_count(), 48000);
    }

    #[test]
    fn test_rate_change_clears_cache() {
        let mut cache = SoundCache::new(48000);
        cache.insert("a", StereoBuffer::silence(10), 48000).unwrap();
        cache.insert("b", StereoBuffer::silence(10), 48000).unwrap();
        assert_eq!(cache.assets().len(), 2);

        cache.set_sample_rate(44100);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_failed_load_leaves_cache_untouched() {
        let dir = TempDir::new().unwrap();
        let bogus = dir.path().join("notes.wav");
        std::fs::write(&bogus, b"definitely not a wav file").unwrap();

        let mut cache = SoundCache::new(48000);
        let err = cache.load(&bogus).err().expect("garbage should not decode");
        assert!(matches!(err, DecodeError::UnsupportedFormat(_)));
        assert!(cache.is_empty());
    }
}
