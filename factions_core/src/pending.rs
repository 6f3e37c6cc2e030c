use std::collections::HashMap;
use std::hash::Hash;

use thiserror::Error;

use crate::identity::{CellPos, FactionId, Timestamp};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PendingError {
    #[error("no pending action")]
    Missing,
    #[error("pending action expired")]
    Expired,
}

#[derive(Debug, Clone)]
struct PendingEntry<P> {
    created: Timestamp,
    payload: P,
}

/// Two-step confirmation store. Entries expire lazily: an entry read after
/// its TTL behaves as if it were never stored.
#[derive(Debug, Clone)]
pub struct PendingActions<K, P> {
    entries: HashMap<K, PendingEntry<P>>,
    ttl_millis: u64,
}

impl<K, P> PendingActions<K, P>
where
    K: Eq + Hash,
{
    pub fn new(ttl_millis: u64) -> Self {
        Self {
            entries: HashMap::new(),
            ttl_millis,
        }
    }

    pub fn ttl_millis(&self) -> u64 {
        self.ttl_millis
    }

    /// Stores `payload`, replacing any earlier entry for `key`.
    pub fn put(&mut self, key: K, payload: P, now: Timestamp) {
        self.entries.insert(
            key,
            PendingEntry {
                created: now,
                payload,
            },
        );
    }

    pub fn get(&self, key: &K, now: Timestamp) -> Option<&P> {
        self.entries
            .get(key)
            .filter(|entry| self.is_live(entry, now))
            .map(|entry| &entry.payload)
    }

    pub fn contains(&self, key: &K, now: Timestamp) -> bool {
        self.get(key, now).is_some()
    }

    /// Removes and returns the payload. An expired entry is removed as well,
    /// so a second `take` reports `Missing`.
    pub fn take(&mut self, key: &K, now: Timestamp) -> Result<P, PendingError> {
        let entry = self.entries.remove(key).ok_or(PendingError::Missing)?;
        if self.is_live(&entry, now) {
            Ok(entry.payload)
        } else {
            Err(PendingError::Expired)
        }
    }

    pub fn remove(&mut self, key: &K) -> Option<P> {
        self.entries.remove(key).map(|entry| entry.payload)
    }

    pub fn retain<F>(&mut self, mut keep: F)
    where
        F: FnMut(&K, &P) -> bool,
    {
        self.entries.retain(|key, entry| keep(key, &entry.payload));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[inline]
    fn is_live(&self, entry: &PendingEntry<P>, now: Timestamp) -> bool {
        now <= entry.created.plus_millis(self.ttl_millis)
    }
}

/// Claim awaiting the first-claim confirmation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimRequest {
    pub faction: FactionId,
    pub dimension: String,
    pub origin: CellPos,
    pub size: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnclaimScope {
    Cell { dimension: String, cell: CellPos },
    Area { dimension: String, origin: CellPos, size: u32 },
    All,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnclaimRequest {
    pub faction: FactionId,
    pub scope: UnclaimScope,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WarRequest {
    pub source: FactionId,
    pub target: FactionId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeaceRequest {
    pub requester: FactionId,
}
