use crate::paths;
use bytes::Bytes;
use parking_lot::RwLock;
use serde::Deserialize;
use std::collections::{HashMap, VecDeque};

pub const DEFAULT_CAPACITY: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum CacheMode {
    Session,
    Memory,
    #[default]
    Disabled,
}

/// Generated thumbnails keyed by store path.
pub trait ThumbnailStore: Send + Sync {
    fn get(&self, path: &str) -> Option<Bytes>;
    fn put(&self, path: &str, data: Bytes);
    /// Drops `path` and everything cached below it.
    fn remove(&self, path: &str);
}

#[derive(Default)]
struct Entries {
    data: HashMap<String, Bytes>,
    order: VecDeque<String>,
}

/// Bounded in-memory store. The oldest entry goes first once full.
pub struct MemoryThumbnails {
    capacity: usize,
    entries: RwLock<Entries>,
}

impl MemoryThumbnails {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: RwLock::new(Entries::default()),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.read().data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for MemoryThumbnails {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }
}

impl ThumbnailStore for MemoryThumbnails {
    fn get(&self, path: &str) -> Option<Bytes> {
        self.entries.read().data.get(path).cloned()
    }

    fn put(&self, path: &str, data: Bytes) {
        let mut entries = self.entries.write();
        if entries.data.insert(path.to_string(), data).is_some() {
            return;
        }
        entries.order.push_back(path.to_string());
        while entries.data.len() > self.capacity {
            match entries.order.pop_front() {
                Some(oldest) => {
                    entries.data.remove(&oldest);
                }
                None => break,
            }
        }
    }

    fn remove(&self, path: &str) {
        let mut entries = self.entries.write();
        entries.data.retain(|key, _| !paths::is_within(key, path));
        entries.order.retain(|key| !paths::is_within(key, path));
    }
}

/// Store used for a cache mode. The connector keeps one volume per process,
/// so a session cache lives as long as the process, same as memory.
pub fn store_for(mode: CacheMode) -> Option<Box<dyn ThumbnailStore>> {
    match mode {
        CacheMode::Session | CacheMode::Memory => Some(Box::<MemoryThumbnails>::default()),
        CacheMode::Disabled => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_mode_has_no_store() {
        assert!(store_for(CacheMode::Disabled).is_none());
        assert!(store_for(CacheMode::Session).is_some());
    }

    #[test]
    fn remove_drops_the_entry() {
        let store = MemoryThumbnails::default();
        store.put("a.png", Bytes::from_static(b"tmb"));
        assert!(store.get("a.png").is_some());
        store.remove("a.png");
        assert!(store.get("a.png").is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn remove_drops_a_whole_directory() {
        let store = MemoryThumbnails::default();
        store.put("album/a.png", Bytes::from_static(b"a"));
        store.put("album/sub/b.png", Bytes::from_static(b"b"));
        store.put("albums.png", Bytes::from_static(b"c"));
        store.remove("album");
        assert!(store.get("album/a.png").is_none());
        assert!(store.get("album/sub/b.png").is_none());
        assert!(store.get("albums.png").is_some());
    }

    #[test]
    fn oldest_entry_is_evicted_when_full() {
        let store = MemoryThumbnails::with_capacity(2);
        store.put("a", Bytes::from_static(b"a"));
        store.put("b", Bytes::from_static(b"b"));
        store.put("a", Bytes::from_static(b"a2"));
        store.put("c", Bytes::from_static(b"c"));
        assert_eq!(store.len(), 2);
        assert!(store.get("a").is_none());
        assert_eq!(store.get("b"), Some(Bytes::from_static(b"b")));
        assert_eq!(store.get("c"), Some(Bytes::from_static(b"c")));
    }
}
