use crate::error::{Result, SimulationError};
use crate::mechanism::{
    classify_index, fingerprint_of, scatter_add, Catalogue, DeliverableEvent, IndexConstraint,
    Mechanism, MechanismInfo, MechanismKind, MechanismLayout, SharedView,
};

const PAS_SOURCE: &str = "pas/2: i = g*(v - e)";
const HH_SOURCE: &str = "hh/2: ina = gnabar*m^3*h*(v - ena); ik = gkbar*n^4*(v - ek); il = gl*(v - el)";
const EXPSYN_SOURCE: &str = "expsyn/2: g' = -g/tau; i = g*(v - e)";
const GJ_SOURCE: &str = "gj/1: i = g*(v - v_peer)";

pub fn pas_fingerprint() -> u64 {
    fingerprint_of(PAS_SOURCE)
}

pub fn hh_fingerprint() -> u64 {
    fingerprint_of(HH_SOURCE)
}

pub fn expsyn_fingerprint() -> u64 {
    fingerprint_of(EXPSYN_SOURCE)
}

pub fn gap_junction_fingerprint() -> u64 {
    fingerprint_of(GJ_SOURCE)
}

/// The catalogue of built-in mechanisms, keyed by name.
pub fn default_catalogue() -> Catalogue {
    let mut cat = Catalogue::new();
    cat.register(
        "pas",
        MechanismInfo {
            kind: MechanismKind::Density,
            fingerprint: pas_fingerprint(),
        },
        |layout| Box::new(Pas::new(layout)),
    );
    cat.register(
        "hh",
        MechanismInfo {
            kind: MechanismKind::Density,
            fingerprint: hh_fingerprint(),
        },
        |layout| Box::new(Hh::new(layout)),
    );
    cat.register(
        "expsyn",
        MechanismInfo {
            kind: MechanismKind::Point,
            fingerprint: expsyn_fingerprint(),
        },
        |layout| Box::new(ExpSyn::new(layout)),
    );
    cat
}

fn bad_param(mech: &str, param: &str) -> SimulationError {
    SimulationError::BadDiscretization {
        gid: 0,
        what: format!("mechanism \"{mech}\" has no parameter \"{param}\""),
    }
}

fn set_slot(
    mech: &str,
    param: &str,
    field: &mut [f64],
    instance: usize,
    value: f64,
) -> Result<()> {
    match field.get_mut(instance) {
        Some(slot) => {
            *slot = value;
            Ok(())
        }
        None => Err(SimulationError::InternalInvariant(format!(
            "parameter \"{param}\" of \"{mech}\": instance {instance} out of range"
        ))),
    }
}

/// Passive leak, density. `g` in S/cm²; the layout weight folds area and
/// coverage so the per-slot conductance lands in µS.
#[derive(Debug, Clone)]
pub struct Pas {
    cv: Vec<u32>,
    weight: Vec<f64>,
    constraint: IndexConstraint,
    g: Vec<f64>,
    e: Vec<f64>,
}

impl Pas {
    pub fn new(layout: &MechanismLayout) -> Self {
        let width = layout.width();
        Self {
            cv: layout.cv.clone(),
            weight: layout.weight.clone(),
            constraint: classify_index(&layout.cv),
            g: vec![0.001; width],
            e: vec![-70.0; width],
        }
    }

    fn slot_conductance(&self, k: usize) -> f64 {
        self.g[k] * self.weight[k]
    }
}

impl Mechanism for Pas {
    fn name(&self) -> &'static str {
        "pas"
    }

    fn kind(&self) -> MechanismKind {
        MechanismKind::Density
    }

    fn fingerprint(&self) -> u64 {
        pas_fingerprint()
    }

    fn set_parameter(&mut self, param: &str, instance: usize, value: f64) -> Result<()> {
        match param {
            "g" => set_slot("pas", param, &mut self.g, instance, value),
            "e" => set_slot("pas", param, &mut self.e, instance, value),
            _ => Err(bad_param("pas", param)),
        }
    }

    fn init(&mut self, _shared: &mut SharedView) {}

    fn compute_currents(&mut self, shared: &mut SharedView) {
        let (cv, v) = (&self.cv, &*shared.v);
        scatter_add(shared.i, cv, self.constraint, |k| {
            self.slot_conductance(k) * (v[cv[k] as usize] - self.e[k])
        });
        scatter_add(shared.g, cv, self.constraint, |k| self.slot_conductance(k));
    }

    fn advance_state(&mut self, _shared: &mut SharedView) {}

    fn apply_events(&mut self, _events: &[DeliverableEvent]) {}

    fn write_ions(&mut self, _shared: &mut SharedView) {}
}

fn exprelr(x: f64) -> f64 {
    if x.abs() < 1e-9 {
        1.0
    } else {
        x / (x.exp() - 1.0)
    }
}

fn m_rates(v: f64) -> (f64, f64) {
    (exprelr(-(v + 40.0) / 10.0), 4.0 * (-(v + 65.0) / 18.0).exp())
}

fn h_rates(v: f64) -> (f64, f64) {
    (
        0.07 * (-(v + 65.0) / 20.0).exp(),
        1.0 / (1.0 + (-(v + 35.0) / 10.0).exp()),
    )
}

fn n_rates(v: f64) -> (f64, f64) {
    (
        0.1 * exprelr(-(v + 55.0) / 10.0),
        0.125 * (-(v + 65.0) / 80.0).exp(),
    )
}

/// Hodgkin-Huxley sodium/potassium/leak dynamics, density. Conductances in
/// S/cm²; sodium and potassium reversal potentials come from the ion state.
#[derive(Debug, Clone)]
pub struct Hh {
    cv: Vec<u32>,
    weight: Vec<f64>,
    constraint: IndexConstraint,
    gnabar: Vec<f64>,
    gkbar: Vec<f64>,
    gl: Vec<f64>,
    el: Vec<f64>,
    m: Vec<f64>,
    h: Vec<f64>,
    n: Vec<f64>,
    ion_na: usize,
    ion_k: usize,
    ina: Vec<f64>,
    ik: Vec<f64>,
}

impl Hh {
    pub fn new(layout: &MechanismLayout) -> Self {
        let width = layout.width();
        Self {
            cv: layout.cv.clone(),
            weight: layout.weight.clone(),
            constraint: classify_index(&layout.cv),
            gnabar: vec![0.12; width],
            gkbar: vec![0.036; width],
            gl: vec![0.0003; width],
            el: vec![-54.3; width],
            m: vec![0.0; width],
            h: vec![0.0; width],
            n: vec![0.0; width],
            ion_na: usize::MAX,
            ion_k: usize::MAX,
            ina: vec![0.0; width],
            ik: vec![0.0; width],
        }
    }
}

impl Mechanism for Hh {
    fn name(&self) -> &'static str {
        "hh"
    }

    fn kind(&self) -> MechanismKind {
        MechanismKind::Density
    }

    fn fingerprint(&self) -> u64 {
        hh_fingerprint()
    }

    fn set_parameter(&mut self, param: &str, instance: usize, value: f64) -> Result<()> {
        match param {
            "gnabar" => set_slot("hh", param, &mut self.gnabar, instance, value),
            "gkbar" => set_slot("hh", param, &mut self.gkbar, instance, value),
            "gl" => set_slot("hh", param, &mut self.gl, instance, value),
            "el" => set_slot("hh", param, &mut self.el, instance, value),
            _ => Err(bad_param("hh", param)),
        }
    }

    fn init(&mut self, shared: &mut SharedView) {
        self.ion_na = shared
            .ions
            .iter()
            .position(|ion| ion.name == "na")
            .expect("hh requires a sodium ion");
        self.ion_k = shared
            .ions
            .iter()
            .position(|ion| ion.name == "k")
            .expect("hh requires a potassium ion");

        for (k, &cv) in self.cv.iter().enumerate() {
            let v = shared.v[cv as usize];
            let (am, bm) = m_rates(v);
            let (ah, bh) = h_rates(v);
            let (an, bn) = n_rates(v);
            self.m[k] = am / (am + bm);
            self.h[k] = ah / (ah + bh);
            self.n[k] = an / (an + bn);
        }
    }

    fn compute_currents(&mut self, shared: &mut SharedView) {
        let ena = &shared.ions[self.ion_na].reversal_potential;
        let ek = &shared.ions[self.ion_k].reversal_potential;

        for (k, &cv) in self.cv.iter().enumerate() {
            let c = cv as usize;
            let v = shared.v[c];
            let w = self.weight[k];
            let gna = self.gnabar[k] * self.m[k].powi(3) * self.h[k] * w;
            let gk = self.gkbar[k] * self.n[k].powi(4) * w;
            let gl = self.gl[k] * w;

            self.ina[k] = gna * (v - ena[c]);
            self.ik[k] = gk * (v - ek[c]);
            let il = gl * (v - self.el[k]);

            shared.i[c] += self.ina[k] + self.ik[k] + il;
            shared.g[c] += gna + gk + gl;
        }
    }

    fn advance_state(&mut self, shared: &mut SharedView) {
        let dt = shared.dt;
        for (k, &cv) in self.cv.iter().enumerate() {
            let v = shared.v[cv as usize];
            let (am, bm) = m_rates(v);
            let (ah, bh) = h_rates(v);
            let (an, bn) = n_rates(v);

            // Exponential Euler per gate: relax towards x_inf with rate a+b.
            let step = |x: &mut f64, a: f64, b: f64| {
                let tau = 1.0 / (a + b);
                let xinf = a * tau;
                *x = xinf + (*x - xinf) * (-dt / tau).exp();
            };
            step(&mut self.m[k], am, bm);
            step(&mut self.h[k], ah, bh);
            step(&mut self.n[k], an, bn);
        }
    }

    fn apply_events(&mut self, _events: &[DeliverableEvent]) {}

    fn write_ions(&mut self, shared: &mut SharedView) {
        scatter_add(
            &mut shared.ions[self.ion_na].current,
            &self.cv,
            self.constraint,
            |k| self.ina[k],
        );
        scatter_add(
            &mut shared.ions[self.ion_k].current,
            &self.cv,
            self.constraint,
            |k| self.ik[k],
        );
    }

    fn state_value(&self, var: &str, instance: usize) -> Option<f64> {
        match var {
            "m" => self.m.get(instance).copied(),
            "h" => self.h.get(instance).copied(),
            "n" => self.n.get(instance).copied(),
            _ => None,
        }
    }
}

/// Single-exponential synapse, point. Incoming events add their weight (µS)
/// onto the slot conductance, which decays with time constant `tau`.
#[derive(Debug, Clone)]
pub struct ExpSyn {
    cv: Vec<u32>,
    constraint: IndexConstraint,
    tau: Vec<f64>,
    e: Vec<f64>,
    g_syn: Vec<f64>,
}

impl ExpSyn {
    pub fn new(layout: &MechanismLayout) -> Self {
        let width = layout.width();
        Self {
            cv: layout.cv.clone(),
            constraint: classify_index(&layout.cv),
            tau: vec![2.0; width],
            e: vec![0.0; width],
            g_syn: vec![0.0; width],
        }
    }
}

impl Mechanism for ExpSyn {
    fn name(&self) -> &'static str {
        "expsyn"
    }

    fn kind(&self) -> MechanismKind {
        MechanismKind::Point
    }

    fn fingerprint(&self) -> u64 {
        expsyn_fingerprint()
    }

    fn set_parameter(&mut self, param: &str, instance: usize, value: f64) -> Result<()> {
        match param {
            "tau" => set_slot("expsyn", param, &mut self.tau, instance, value),
            "e" => set_slot("expsyn", param, &mut self.e, instance, value),
            _ => Err(bad_param("expsyn", param)),
        }
    }

    fn init(&mut self, _shared: &mut SharedView) {
        self.g_syn.iter_mut().for_each(|g| *g = 0.0);
    }

    fn compute_currents(&mut self, shared: &mut SharedView) {
        let (cv, v) = (&self.cv, &*shared.v);
        scatter_add(shared.i, cv, self.constraint, |k| {
            self.g_syn[k] * (v[cv[k] as usize] - self.e[k])
        });
        scatter_add(shared.g, cv, self.constraint, |k| self.g_syn[k]);
    }

    fn advance_state(&mut self, shared: &mut SharedView) {
        let dt = shared.dt;
        for (g, tau) in self.g_syn.iter_mut().zip(&self.tau) {
            *g *= (-dt / tau).exp();
        }
    }

    fn apply_events(&mut self, events: &[DeliverableEvent]) {
        for event in events {
            self.g_syn[event.instance as usize] += event.weight as f64;
        }
    }

    fn write_ions(&mut self, _shared: &mut SharedView) {}

    fn state_value(&self, var: &str, instance: usize) -> Option<f64> {
        match var {
            "g" => self.g_syn.get(instance).copied(),
            _ => None,
        }
    }
}

/// Instantaneous conductive coupling between CV pairs. Junction current is
/// computed from the voltages of the previous solve, so the matrix stays
/// tree-structured. Each junction contributes one entry per side.
#[derive(Debug, Clone)]
pub struct GapJunctionMech {
    cv: Vec<u32>,
    peer_cv: Vec<u32>,
    g: Vec<f64>,
}

impl GapJunctionMech {
    pub fn new(cv: Vec<u32>, peer_cv: Vec<u32>, g: Vec<f64>) -> Self {
        debug_assert_eq!(cv.len(), peer_cv.len());
        debug_assert_eq!(cv.len(), g.len());
        Self { cv, peer_cv, g }
    }
}

impl Mechanism for GapJunctionMech {
    fn name(&self) -> &'static str {
        "gj"
    }

    fn kind(&self) -> MechanismKind {
        MechanismKind::GapJunction
    }

    fn fingerprint(&self) -> u64 {
        gap_junction_fingerprint()
    }

    fn set_parameter(&mut self, param: &str, instance: usize, value: f64) -> Result<()> {
        match param {
            "g" => set_slot("gj", param, &mut self.g, instance, value),
            _ => Err(bad_param("gj", param)),
        }
    }

    fn init(&mut self, _shared: &mut SharedView) {}

    fn compute_currents(&mut self, shared: &mut SharedView) {
        for k in 0..self.cv.len() {
            let a = self.cv[k] as usize;
            let b = self.peer_cv[k] as usize;
            shared.i[a] += self.g[k] * (shared.v[a] - shared.v[b]);
        }
    }

    fn advance_state(&mut self, _shared: &mut SharedView) {}

    fn apply_events(&mut self, _events: &[DeliverableEvent]) {}

    fn write_ions(&mut self, _shared: &mut SharedView) {}
}
