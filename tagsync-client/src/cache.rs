//! Per-row image cache
//!
//! Entries start `Absent` when a row table arrives, become `Pending` once
//! requested and settle as `Ready` or `Failed` when the server answers. A new
//! row table resets everything to `Absent`; a lost connection sends every
//! `Pending` entry back to `Absent`.

use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum CacheEntry {
    #[default]
    Absent,
    Pending,
    Ready(Vec<u8>),
    Failed(String),
}

#[derive(Debug, Default)]
pub struct ImageCache {
    entries: Vec<CacheEntry>,
}

impl ImageCache {
    pub fn new(data_cnt: usize) -> Self {
        Self {
            entries: vec![CacheEntry::Absent; data_cnt],
        }
    }

    /// Drop every entry and resize for `data_cnt` rows
    pub fn reset(&mut self, data_cnt: usize) {
        debug!("Image cache reset for {} rows", data_cnt);
        self.entries.clear();
        self.entries.resize(data_cnt, CacheEntry::Absent);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, row: u32) -> Option<&CacheEntry> {
        self.entries.get(row as usize)
    }

    /// Mark `row` pending if nothing is cached or in flight for it
    ///
    /// Returns whether the caller should send a request.
    pub fn claim(&mut self, row: u32) -> bool {
        match self.entries.get_mut(row as usize) {
            Some(entry) if matches!(entry, CacheEntry::Absent) => {
                *entry = CacheEntry::Pending;
                true
            }
            _ => false,
        }
    }

    /// Undo a claim whose request never went out
    pub fn release(&mut self, row: u32) {
        if let Some(entry) = self.entries.get_mut(row as usize) {
            if matches!(entry, CacheEntry::Pending) {
                *entry = CacheEntry::Absent;
            }
        }
    }

    /// Forget every request still in flight
    ///
    /// Returns how many rows went back to `Absent`.
    pub fn release_pending(&mut self) -> usize {
        let mut released = 0;
        for entry in self.entries.iter_mut() {
            if matches!(entry, CacheEntry::Pending) {
                *entry = CacheEntry::Absent;
                released += 1;
            }
        }
        released
    }

    /// Rows with nothing cached and nothing in flight, marked pending
    pub fn claim_all(&mut self) -> Vec<u32> {
        (0..self.entries.len() as u32)
            .filter(|row| self.claim(*row))
            .collect()
    }

    /// Store a response; `false` when the row is unknown
    pub fn fill(&mut self, row: u32, entry: CacheEntry) -> bool {
        match self.entries.get_mut(row as usize) {
            Some(slot) => {
                *slot = entry;
                true
            }
            None => false,
        }
    }
}
