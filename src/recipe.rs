use serde::{Deserialize, Serialize};

use crate::cable_cell::{BenchmarkCell, CableCell, LifCell};
use crate::generator::EventGenerator;
use crate::label::LidSelectionPolicy;
use crate::probe::{ProbeAddress, ProbeKind};
use crate::schedule::Schedule;
use crate::types::{Gid, Time};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CellKind {
    Cable,
    Lif,
    SpikeSource,
    Benchmark,
}

/// Cell-kind-specific description, as a tagged union of the built-in kinds.
#[derive(Debug, Clone)]
pub enum CellDescription {
    Cable(Box<CableCell>),
    Lif(LifCell),
    SpikeSource(Schedule),
    Benchmark(BenchmarkCell),
}

impl CellDescription {
    pub fn kind(&self) -> CellKind {
        match self {
            CellDescription::Cable(_) => CellKind::Cable,
            CellDescription::Lif(_) => CellKind::Lif,
            CellDescription::SpikeSource(_) => CellKind::SpikeSource,
            CellDescription::Benchmark(_) => CellKind::Benchmark,
        }
    }
}

/// An incoming connection of a cell, addressed by labels: the source is a
/// detector label on the presynaptic cell, the destination a synapse label
/// on the cell the recipe was asked about.
#[derive(Debug, Clone)]
pub struct ConnectionDesc {
    pub source_gid: Gid,
    pub source_label: String,
    pub source_policy: LidSelectionPolicy,
    pub dest_label: String,
    pub dest_policy: LidSelectionPolicy,
    pub weight: f32,
    /// Propagation delay, ms; must be positive and at or above the
    /// network's minimum delay.
    pub delay: Time,
}

impl ConnectionDesc {
    pub fn new(
        source_gid: Gid,
        source_label: impl Into<String>,
        dest_label: impl Into<String>,
        weight: f32,
        delay: Time,
    ) -> Self {
        Self {
            source_gid,
            source_label: source_label.into(),
            source_policy: LidSelectionPolicy::RoundRobin,
            dest_label: dest_label.into(),
            dest_policy: LidSelectionPolicy::RoundRobin,
            weight,
            delay,
        }
    }
}

/// One side of a gap junction, from the perspective of the queried cell.
#[derive(Debug, Clone)]
pub struct GapJunctionDesc {
    /// Gap-junction site label on the queried cell.
    pub local_label: String,
    pub peer_gid: Gid,
    pub peer_label: String,
    /// Junction conductance, µS.
    pub g: f64,
}

impl GapJunctionDesc {
    pub fn new(
        local_label: impl Into<String>,
        peer_gid: Gid,
        peer_label: impl Into<String>,
        g: f64,
    ) -> Self {
        Self {
            local_label: local_label.into(),
            peer_gid,
            peer_label: peer_label.into(),
            g,
        }
    }
}

/// The declarative model description the engine is built from. All queries
/// must be pure: the engine may call them from any thread, in any order,
/// any number of times.
pub trait Recipe: Send + Sync {
    fn num_cells(&self) -> usize;

    fn cell_kind(&self, gid: Gid) -> CellKind;

    fn cell_description(&self, gid: Gid) -> CellDescription;

    /// Connections terminating on `gid`.
    fn connections_on(&self, _gid: Gid) -> Vec<ConnectionDesc> {
        Vec::new()
    }

    /// Gap junctions attached to `gid`; each junction should be reported by
    /// both of its cells.
    fn gap_junctions_on(&self, _gid: Gid) -> Vec<GapJunctionDesc> {
        Vec::new()
    }

    fn num_probes(&self, _gid: Gid) -> usize {
        0
    }

    fn get_probe(&self, _address: ProbeAddress) -> Option<ProbeKind> {
        None
    }

    fn event_generators(&self, _gid: Gid) -> Vec<EventGenerator> {
        Vec::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct TwoKinds;

    impl Recipe for TwoKinds {
        fn num_cells(&self) -> usize {
            2
        }

        fn cell_kind(&self, gid: Gid) -> CellKind {
            if gid == 0 {
                CellKind::SpikeSource
            } else {
                CellKind::Lif
            }
        }

        fn cell_description(&self, gid: Gid) -> CellDescription {
            if gid == 0 {
                CellDescription::SpikeSource(Schedule::regular(0.0, 1.0, 10.0))
            } else {
                CellDescription::Lif(LifCell::default())
            }
        }

        fn connections_on(&self, gid: Gid) -> Vec<ConnectionDesc> {
            if gid == 1 {
                vec![ConnectionDesc::new(0, "src", "in", 0.5, 1.0)]
            } else {
                Vec::new()
            }
        }
    }

    #[test]
    fn defaults_are_empty() {
        let recipe = TwoKinds;
        assert_eq!(recipe.num_cells(), 2);
        assert_eq!(recipe.cell_description(1).kind(), CellKind::Lif);
        assert!(recipe.gap_junctions_on(1).is_empty());
        assert_eq!(recipe.num_probes(0), 0);
        assert!(recipe.event_generators(0).is_empty());
        assert_eq!(recipe.connections_on(1).len(), 1);
    }
}
