//! Audio cache: normalized prompt text -> playable audio.
//!
//! Populated only from successful remote synthesis. Unbounded unless a cap is
//! configured, in which case the oldest insertion is evicted first.

use crate::utils::{gen_id, normalize_text};
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

/// In-memory reference to audio content ready for playback.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AudioHandle {
    id: String,
    content_type: String,
    data: Arc<[u8]>,
}

impl AudioHandle {
    pub fn new(content_type: impl Into<String>, data: impl Into<Arc<[u8]>>) -> Self {
        Self {
            id: gen_id(),
            content_type: content_type.into(),
            data: data.into(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

#[derive(Debug)]
struct CacheEntry {
    handle: AudioHandle,
    seq: u64,
}

#[derive(Debug, Default)]
pub struct AudioCache {
    entries: DashMap<String, CacheEntry>,
    max_entries: Option<usize>,
    seq: AtomicU64,
}

impl AudioCache {
    pub fn new(max_entries: Option<usize>) -> Self {
        Self {
            entries: DashMap::new(),
            max_entries,
            seq: AtomicU64::new(0),
        }
    }

    pub fn unbounded() -> Self {
        Self::new(None)
    }

    pub fn get(&self, text: &str) -> Option<AudioHandle> {
        self.entries
            .get(&normalize_text(text))
            .map(|entry| entry.handle.clone())
    }

    pub fn contains(&self, text: &str) -> bool {
        self.entries.contains_key(&normalize_text(text))
    }

    pub fn insert(&self, text: &str, handle: AudioHandle) {
        let key = normalize_text(text);
        if key.is_empty() {
            return;
        }
        if let Some(max) = self.max_entries {
            if max == 0 {
                return;
            }
            if !self.entries.contains_key(&key) && self.entries.len() >= max {
                self.evict_oldest();
            }
        }
        let seq = self.seq.fetch_add(1, Ordering::Relaxed);
        self.entries.insert(key, CacheEntry { handle, seq });
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn evict_oldest(&self) {
        let oldest = self
            .entries
            .iter()
            .min_by_key(|entry| entry.value().seq)
            .map(|entry| entry.key().clone());
        if let Some(key) = oldest {
            debug!(target: "narration", key = %key, "Evicting cached audio");
            self.entries.remove(&key);
        }
    }
}
