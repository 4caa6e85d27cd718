use std::cmp::Ordering;
use std::fmt;

use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};

pub type HashMap<K, V> = FxHashMap<K, V>;
pub type HashSet<K> = FxHashSet<K>;

/// Simulated time in milliseconds.
pub type Time = f64;

/// Globally unique cell identifier.
pub type Gid = u32;

/// Index of a source or target within one cell.
pub type Lid = u32;

pub const TERMINAL_TIME: Time = f64::MAX;

/// Address of a spike source or event target: a cell plus a local index on
/// that cell (detector index for sources, synapse index for targets).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CellMember {
    pub gid: Gid,
    pub index: Lid,
}

impl CellMember {
    pub fn new(gid: Gid, index: Lid) -> Self {
        Self { gid, index }
    }
}

impl Ord for CellMember {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.gid, self.index).cmp(&(other.gid, other.index))
    }
}

impl PartialOrd for CellMember {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for CellMember {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}:{}", self.gid, self.index)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Spike {
    pub source: CellMember,
    pub time: Time,
}

impl Spike {
    pub fn new(source: CellMember, time: Time) -> Self {
        Self { source, time }
    }
}

/// A half-open integration window [t_begin, t_end). Cell groups integrate
/// over an epoch without external input; events generated during epoch E are
/// delivered no earlier than epoch E+1.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Epoch {
    pub id: u32,
    pub t_begin: Time,
    pub t_end: Time,
}

impl Epoch {
    pub fn new(id: u32, t_begin: Time, t_end: Time) -> Self {
        Self { id, t_begin, t_end }
    }

    pub fn first(t_end: Time) -> Self {
        Self {
            id: 0,
            t_begin: 0.0,
            t_end,
        }
    }

    pub fn advance(&self, t_end: Time) -> Self {
        Self {
            id: self.id + 1,
            t_begin: self.t_end,
            t_end,
        }
    }

    /// Lane buffer selector for this epoch; the sibling buffer belongs to
    /// the next epoch.
    pub fn buffer_index(&self) -> usize {
        self.id as usize % 2
    }
}
