use std::sync::Mutex;

use crate::types::Spike;

/// Per-thread spike buffers: each pool thread appends into its own slot
/// during cell-group advance, so inserts never contend; the slots are
/// concatenated at exchange time.
#[derive(Debug, Default)]
pub struct SpikeStore {
    slots: Vec<Mutex<Vec<Spike>>>,
}

impl SpikeStore {
    pub fn new(num_slots: usize) -> Self {
        Self {
            slots: (0..num_slots).map(|_| Mutex::new(Vec::new())).collect(),
        }
    }

    pub fn insert(&self, slot: usize, spikes: &[Spike]) {
        self.slots[slot].lock().unwrap().extend_from_slice(spikes);
    }

    /// Concatenation of all slots, in slot order.
    pub fn gather(&self) -> Vec<Spike> {
        let mut out = Vec::new();
        for slot in &self.slots {
            out.extend_from_slice(&slot.lock().unwrap());
        }
        out
    }

    pub fn clear(&self) {
        for slot in &self.slots {
            slot.lock().unwrap().clear();
        }
    }

    pub fn len(&self) -> usize {
        self.slots.iter().map(|s| s.lock().unwrap().len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// The engine's current/previous pair of spike stores, swapped at each
/// epoch boundary.
#[derive(Debug)]
pub struct SpikeDoubleBuffer {
    stores: [SpikeStore; 2],
    current: usize,
}

impl SpikeDoubleBuffer {
    pub fn new(num_slots: usize) -> Self {
        Self {
            stores: [SpikeStore::new(num_slots), SpikeStore::new(num_slots)],
            current: 0,
        }
    }

    pub fn exchange(&mut self) {
        self.current = 1 - self.current;
    }

    pub fn current(&self) -> &SpikeStore {
        &self.stores[self.current]
    }

    pub fn previous(&self) -> &SpikeStore {
        &self.stores[1 - self.current]
    }

    pub fn clear_all(&mut self) {
        self.stores[0].clear();
        self.stores[1].clear();
    }
}
