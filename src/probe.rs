use std::sync::{Arc, Mutex};

use crate::morphology::Location;
use crate::types::{Gid, Lid, Time};

/// Address of one probe: the cell plus the cell-local probe index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProbeAddress {
    pub gid: Gid,
    pub index: u32,
}

impl ProbeAddress {
    pub fn new(gid: Gid, index: u32) -> Self {
        Self { gid, index }
    }
}

/// What a probe measures.
#[derive(Debug, Clone, PartialEq)]
pub enum ProbeKind {
    /// Membrane voltage at a location, mV.
    MembraneVoltage { location: Location },
    /// A state variable of the point mechanism behind a synapse target,
    /// e.g. the conductance of an `expsyn`.
    PointState {
        target: Lid,
        mechanism: String,
        state: String,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProbeMetadata {
    pub address: ProbeAddress,
    pub kind: ProbeKind,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    pub time: Time,
    pub value: f64,
}

/// Which probes a sampler association applies to.
#[derive(Debug, Clone, PartialEq)]
pub enum ProbeSelector {
    All,
    One(ProbeAddress),
    List(Vec<ProbeAddress>),
}

impl ProbeSelector {
    pub fn matches(&self, address: ProbeAddress) -> bool {
        match self {
            ProbeSelector::All => true,
            ProbeSelector::One(a) => *a == address,
            ProbeSelector::List(list) => list.contains(&address),
        }
    }
}

/// Sampler callbacks are shared across the cell groups that hold matching
/// probes; groups fire them sequentially from their own advance.
pub type SamplerFn = Arc<Mutex<dyn FnMut(&ProbeMetadata, &[Sample]) + Send>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SamplerHandle(pub u64);
