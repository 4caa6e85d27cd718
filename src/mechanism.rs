use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use crate::error::{Result, SimulationError};
use crate::types::{HashMap, Time};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MechanismKind {
    Density,
    Point,
    ReversalPotential,
    GapJunction,
}

/// Per-ion shared arrays, one slot per CV of the owning group.
#[derive(Debug, Clone)]
pub struct IonState {
    pub name: &'static str,
    /// Ionic current accumulator, nA.
    pub current: Vec<f64>,
    /// Reversal potential, mV.
    pub reversal_potential: Vec<f64>,
}

impl IonState {
    pub fn new(name: &'static str, num_cv: usize, e_rev: f64) -> Self {
        Self {
            name,
            current: vec![0.0; num_cv],
            reversal_potential: vec![e_rev; num_cv],
        }
    }
}

/// View of the backend's shared per-CV arrays handed to mechanism entry
/// points. Mechanisms only add into `i` and `g`; they never overwrite.
pub struct SharedView<'a> {
    pub t: Time,
    pub dt: Time,
    /// Membrane voltage, mV.
    pub v: &'a [f64],
    /// Membrane current accumulator, nA.
    pub i: &'a mut [f64],
    /// Membrane conductance accumulator, µS.
    pub g: &'a mut [f64],
    pub ions: &'a mut [IonState],
}

/// An event routed to one instance slot of a point mechanism.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DeliverableEvent {
    /// Index into the mechanism's instance arrays.
    pub instance: u32,
    pub weight: f32,
}

/// Maps instance slots onto the group's CVs. `weight` folds the coverage
/// fraction and all unit conversion: for density mechanisms it carries
/// 0.01·area·coverage (so S/cm² becomes µS), for point mechanisms 1.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MechanismLayout {
    pub cv: Vec<u32>,
    pub weight: Vec<f64>,
    /// Coalesced point-process multiplicity; empty means all 1.
    pub multiplicity: Vec<u32>,
}

impl MechanismLayout {
    pub fn width(&self) -> usize {
        self.cv.len()
    }
}

/// How a mechanism's CV index vector scatters into the shared arrays,
/// classified once at instantiation; each category maps to a distinct
/// accumulation path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexConstraint {
    /// No repeated CV: plain scatter.
    Independent,
    /// Offsets i, i+1, ..: direct slice traversal.
    Contiguous,
    /// All offsets equal: reduce locally, add once.
    Constant,
}

pub fn classify_index(cv: &[u32]) -> IndexConstraint {
    if cv.len() > 1 {
        if cv.iter().all(|&c| c == cv[0]) {
            return IndexConstraint::Constant;
        }
        if cv.windows(2).all(|w| w[1] == w[0] + 1) {
            return IndexConstraint::Contiguous;
        }
    }
    IndexConstraint::Independent
}

/// Accumulate `value(k)` into `target[cv[k]]` along the path selected by the
/// index constraint. All contributions are commutative sums, so the serial
/// paths are exact.
pub fn scatter_add(
    target: &mut [f64],
    cv: &[u32],
    constraint: IndexConstraint,
    mut value: impl FnMut(usize) -> f64,
) {
    match constraint {
        IndexConstraint::Constant => {
            let mut sum = 0.0;
            for k in 0..cv.len() {
                sum += value(k);
            }
            if let Some(&c) = cv.first() {
                target[c as usize] += sum;
            }
        }
        IndexConstraint::Contiguous => {
            let base = cv[0] as usize;
            for k in 0..cv.len() {
                target[base + k] += value(k);
            }
        }
        IndexConstraint::Independent => {
            for (k, &c) in cv.iter().enumerate() {
                target[c as usize] += value(k);
            }
        }
    }
}

/// The mechanism ABI: polymorphic channel/synapse dynamics stepped by the
/// integrator in a fixed per-step sequence.
pub trait Mechanism: Send + std::fmt::Debug {
    fn name(&self) -> &'static str;
    fn kind(&self) -> MechanismKind;
    /// Stable hash of the dynamics source, for cross-backend validation.
    fn fingerprint(&self) -> u64;

    /// Override a parameter on one instance slot.
    fn set_parameter(&mut self, param: &str, instance: usize, value: f64) -> Result<()>;

    fn init(&mut self, shared: &mut SharedView);
    fn compute_currents(&mut self, shared: &mut SharedView);
    fn advance_state(&mut self, shared: &mut SharedView);
    /// Side effects are strictly additive onto the target slots' state.
    fn apply_events(&mut self, events: &[DeliverableEvent]);
    fn write_ions(&mut self, shared: &mut SharedView);
    fn post_event(&mut self, _shared: &mut SharedView) {}

    /// Peek at a state variable of one instance slot, for probes.
    fn state_value(&self, _var: &str, _instance: usize) -> Option<f64> {
        None
    }
}

pub fn fingerprint_of(definition: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    definition.hash(&mut hasher);
    hasher.finish()
}

#[derive(Debug, Clone, Copy)]
pub struct MechanismInfo {
    pub kind: MechanismKind,
    pub fingerprint: u64,
}

type Builder = fn(&MechanismLayout) -> Box<dyn Mechanism>;

/// Mechanism constructors keyed by name. Instantiation validates that the
/// registered fingerprint matches the built object, so a catalogue entry
/// cannot silently diverge from its dynamics source.
#[derive(Default)]
pub struct Catalogue {
    entries: HashMap<String, (MechanismInfo, Builder)>,
}

impl Catalogue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: &str, info: MechanismInfo, builder: Builder) {
        self.entries.insert(name.to_string(), (info, builder));
    }

    pub fn info(&self, name: &str) -> Option<&MechanismInfo> {
        self.entries.get(name).map(|(info, _)| info)
    }

    pub fn has(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn instance(&self, name: &str, layout: &MechanismLayout) -> Result<Box<dyn Mechanism>> {
        let (info, builder) = self.entries.get(name).ok_or_else(|| {
            SimulationError::InternalInvariant(format!("no mechanism \"{name}\" in catalogue"))
        })?;
        let mech = builder(layout);
        if mech.fingerprint() != info.fingerprint {
            return Err(SimulationError::InternalInvariant(format!(
                "mechanism \"{name}\" fingerprint mismatch"
            )));
        }
        Ok(mech)
    }
}

impl std::fmt::Debug for Catalogue {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("Catalogue")
            .field("entries", &self.entries.keys().collect::<Vec<_>>())
            .finish()
    }
}
