use serde::{Deserialize, Serialize};

use crate::embed::EmbedPwlin;
use crate::morphology::{Cable, Location, Morphology};
use crate::types::Time;

/// A sub-region of the cable tree addressed declaratively; resolved to a
/// cable list against a concrete morphology.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Region {
    All,
    Tag(i32),
    Branch(usize),
    Cable(Cable),
}

impl Region {
    pub fn cables(&self, morph: &Morphology, embed: &EmbedPwlin) -> Vec<Cable> {
        match self {
            Region::All => (0..morph.num_branches()).map(Cable::whole).collect(),
            Region::Branch(b) => vec![Cable::whole(*b)],
            Region::Cable(c) => vec![*c],
            Region::Tag(tag) => {
                let mut cables: Vec<Cable> = Vec::new();
                for seg in 0..morph.num_segments() {
                    if morph.segment(seg).tag != *tag {
                        continue;
                    }
                    let cable = embed.segment_cable(seg);
                    // Adjacent same-tag segments fuse into one cable.
                    match cables.last_mut() {
                        Some(last)
                            if last.branch == cable.branch && last.dist_pos == cable.prox_pos =>
                        {
                            last.dist_pos = cable.dist_pos;
                        }
                        _ => cables.push(cable),
                    }
                }
                cables
            }
        }
    }
}

/// A mechanism by catalogue name with per-instance parameter overrides.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MechanismDesc {
    pub name: String,
    pub params: Vec<(String, f64)>,
}

impl MechanismDesc {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            params: Vec::new(),
        }
    }

    pub fn with(mut self, param: impl Into<String>, value: f64) -> Self {
        self.params.push((param.into(), value));
        self
    }
}

/// Cell-wide electrical defaults.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CableParams {
    /// Initial membrane potential, mV.
    pub v_init: f64,
    /// Specific membrane capacitance, F/m².
    pub cm: f64,
    /// Axial resistivity, Ω·cm.
    pub rl: f64,
}

impl Default for CableParams {
    fn default() -> Self {
        Self {
            v_init: -65.0,
            cm: 0.01,
            rl: 100.0,
        }
    }
}

/// Discretization policy: where CV boundaries are placed. The resulting CV
/// set is normalized so branch points and region boundaries are always CV
/// boundaries and no CV has zero length.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CvPolicy {
    FixedPerBranch(usize),
    EverySegment,
    Explicit(Vec<Location>),
}

impl Default for CvPolicy {
    fn default() -> Self {
        CvPolicy::FixedPerBranch(1)
    }
}

#[derive(Debug, Clone)]
pub struct DensityPaint {
    pub region: Region,
    pub mech: MechanismDesc,
}

#[derive(Debug, Clone)]
pub struct MembranePaint {
    pub region: Region,
    /// Specific capacitance override for the region, F/m².
    pub cm: f64,
}

#[derive(Debug, Clone)]
pub struct SynapsePlacement {
    pub location: Location,
    pub mech: MechanismDesc,
    pub label: String,
}

#[derive(Debug, Clone)]
pub struct DetectorPlacement {
    pub location: Location,
    /// Upward-crossing threshold, mV.
    pub threshold: f64,
    pub label: String,
}

#[derive(Debug, Clone)]
pub struct GapJunctionSite {
    pub location: Location,
    pub label: String,
}

/// Declarative decorations on a morphology: density mechanisms and membrane
/// overrides painted on regions, synapses / detectors / gap-junction sites
/// placed at locations. Placement order defines the per-kind lid order.
#[derive(Debug, Clone, Default)]
pub struct Decor {
    pub defaults: CableParams,
    pub density_paints: Vec<DensityPaint>,
    pub membrane_paints: Vec<MembranePaint>,
    pub synapses: Vec<SynapsePlacement>,
    pub detectors: Vec<DetectorPlacement>,
    pub gap_junction_sites: Vec<GapJunctionSite>,
}

impl Decor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_defaults(mut self, defaults: CableParams) -> Self {
        self.defaults = defaults;
        self
    }

    pub fn paint(mut self, region: Region, mech: MechanismDesc) -> Self {
        self.density_paints.push(DensityPaint { region, mech });
        self
    }

    pub fn paint_membrane(mut self, region: Region, cm: f64) -> Self {
        self.membrane_paints.push(MembranePaint { region, cm });
        self
    }

    pub fn place_synapse(
        mut self,
        location: Location,
        mech: MechanismDesc,
        label: impl Into<String>,
    ) -> Self {
        self.synapses.push(SynapsePlacement {
            location,
            mech,
            label: label.into(),
        });
        self
    }

    pub fn place_detector(
        mut self,
        location: Location,
        threshold: f64,
        label: impl Into<String>,
    ) -> Self {
        self.detectors.push(DetectorPlacement {
            location,
            threshold,
            label: label.into(),
        });
        self
    }

    pub fn place_gap_junction(mut self, location: Location, label: impl Into<String>) -> Self {
        self.gap_junction_sites.push(GapJunctionSite {
            location,
            label: label.into(),
        });
        self
    }
}

/// Complete description of a cable cell: morphology, decorations, and the
/// CV policy used to discretize it.
#[derive(Debug, Clone)]
pub struct CableCell {
    pub morphology: Morphology,
    pub decor: Decor,
    pub cv_policy: CvPolicy,
}

impl CableCell {
    pub fn new(morphology: Morphology, decor: Decor, cv_policy: CvPolicy) -> Self {
        Self {
            morphology,
            decor,
            cv_policy,
        }
    }
}

/// LIF cell description: exact-decay leaky integrate-and-fire. One target
/// (index 0) and one source (index 0).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LifCell {
    /// Membrane time constant, ms.
    pub tau_m: Time,
    /// Resting and reset potential, mV.
    pub e_l: f64,
    /// Firing threshold, mV.
    pub v_thresh: f64,
    /// Refractory period, ms.
    pub t_ref: Time,
    /// Membrane capacitance, pF; incoming weights are µS-weighted charge
    /// converted to an instantaneous potential step of weight/c_m · 1000.
    pub c_m: f64,
}

impl Default for LifCell {
    fn default() -> Self {
        Self {
            tau_m: 10.0,
            e_l: -65.0,
            v_thresh: -50.0,
            t_ref: 2.0,
            c_m: 10.0,
        }
    }
}

/// Benchmark cell: spikes on a schedule while consuming an artificial
/// amount of wall time per advance.
#[derive(Debug, Clone)]
pub struct BenchmarkCell {
    pub schedule: crate::schedule::Schedule,
    /// Wall-time seconds consumed per simulated second of advance.
    pub realtime_ratio: f64,
}
