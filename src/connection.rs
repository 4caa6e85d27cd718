use crate::event::Event;
use crate::types::{CellMember, Spike, Time};

/// A resolved synaptic connection, stored on the rank that owns the
/// destination cell.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Connection {
    pub source: CellMember,
    pub destination: CellMember,
    pub weight: f32,
    pub delay: Time,
    /// Local cell-group index of the destination.
    pub group_index: u32,
}

impl Connection {
    pub fn make_event(&self, spike: &Spike) -> Event {
        Event::new(self.destination, spike.time + self.delay, self.weight)
    }

    /// Sort key for the per-domain partitions: source-major, so spike
    /// matching can walk runs of equal sources.
    pub fn order_key(&self) -> (CellMember, CellMember) {
        (self.source, self.destination)
    }
}
