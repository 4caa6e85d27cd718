use crate::error::{Result, SimulationError};
use crate::mechanism::{IonState, SharedView};
use crate::types::Time;

pub const NO_PARENT: u32 = u32::MAX;

/// Which numeric backend a cell group runs on. Only the multicore backend
/// is implemented; the tag exists so the load balancer can express GPU
/// preference for kinds that gain support.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Backend {
    Multicore,
    Gpu,
}

/// Shared state of one cable cell group on the multicore backend: the
/// per-CV arrays, the tree-structured system, and the step kernels.
///
/// The matrix couples each CV to its parent with `-face_conductance` and is
/// symmetric positive definite; `cell_cv_divs` marks per-cell boundaries,
/// and since no coupling crosses them the Hines sweeps solve all cells of
/// the group in one pass.
#[derive(Debug, Clone)]
pub struct CableState {
    parent_cv: Vec<u32>,
    cell_cv_divs: Vec<usize>,

    /// pF per CV.
    cv_capacitance: Vec<f64>,
    /// µS to parent; 0 for roots.
    face_conductance: Vec<f64>,
    /// Conductance part of the diagonal that does not change between steps.
    invariant_d: Vec<f64>,

    d: Vec<f64>,
    u: Vec<f64>,
    rhs: Vec<f64>,

    /// Membrane voltage, mV.
    pub v: Vec<f64>,
    /// Membrane current accumulator, nA.
    pub i: Vec<f64>,
    /// Membrane conductance accumulator, µS.
    pub g: Vec<f64>,
    pub ions: Vec<IonState>,

    pub t: Time,
    check_finite: bool,
}

impl CableState {
    pub fn new(
        parent_cv: Vec<u32>,
        cell_cv_divs: Vec<usize>,
        cv_capacitance: Vec<f64>,
        face_conductance: Vec<f64>,
        v_init: Vec<f64>,
        ions: Vec<IonState>,
        check_finite: bool,
    ) -> Result<Self> {
        let n = parent_cv.len();
        for (index, &parent) in parent_cv.iter().enumerate() {
            if parent != NO_PARENT && parent as usize >= index {
                return Err(SimulationError::BadTopology {
                    gid: 0,
                    what: format!("CV parent {parent} not below CV {index}"),
                });
            }
        }
        if cell_cv_divs.len() < 2 || cell_cv_divs[0] != 0 || *cell_cv_divs.last().unwrap() != n {
            return Err(SimulationError::InternalInvariant(
                "cell_cv_divs must cover the CV range".into(),
            ));
        }

        let mut invariant_d = vec![0.0; n];
        let mut u = vec![0.0; n];
        for index in 0..n {
            let parent = parent_cv[index];
            if parent != NO_PARENT {
                let fc = face_conductance[index];
                u[index] = -fc;
                invariant_d[index] += fc;
                invariant_d[parent as usize] += fc;
            }
        }

        Ok(Self {
            parent_cv,
            cell_cv_divs,
            cv_capacitance,
            face_conductance,
            invariant_d,
            d: vec![0.0; n],
            u,
            rhs: vec![0.0; n],
            v: v_init,
            i: vec![0.0; n],
            g: vec![0.0; n],
            ions,
            t: 0.0,
            check_finite,
        })
    }

    pub fn num_cv(&self) -> usize {
        self.parent_cv.len()
    }

    pub fn cell_cv_divs(&self) -> &[usize] {
        &self.cell_cv_divs
    }

    pub fn face_conductance(&self) -> &[f64] {
        &self.face_conductance
    }

    /// Reset the current/conductance accumulators ahead of mechanism
    /// contributions for this step.
    pub fn begin_step(&mut self) {
        self.i.iter_mut().for_each(|x| *x = 0.0);
        self.g.iter_mut().for_each(|x| *x = 0.0);
        for ion in &mut self.ions {
            ion.current.iter_mut().for_each(|x| *x = 0.0);
        }
    }

    pub fn shared_view(&mut self, dt: Time) -> SharedView<'_> {
        SharedView {
            t: self.t,
            dt,
            v: &self.v,
            i: &mut self.i,
            g: &mut self.g,
            ions: &mut self.ions,
        }
    }

    /// Backward-Euler system for the voltage update over dt. Mechanism
    /// currents enter linearized about the pre-step voltage:
    /// I(v') ≈ i + g·(v' − v).
    pub fn assemble(&mut self, dt: Time) {
        // cv_capacitance/dt is in nS; 1e-3 brings the diagonal to µS.
        let factor = 1e-3 / dt;
        for index in 0..self.num_cv() {
            let a = factor * self.cv_capacitance[index];
            self.d[index] = a + self.invariant_d[index] + self.g[index];
            self.rhs[index] = a * self.v[index] - self.i[index] + self.g[index] * self.v[index];
        }
    }

    /// Hines elimination: one reverse sweep removes each CV's parent
    /// coupling, one forward sweep back-substitutes. O(n) for the whole
    /// group; roots are detected by the parent sentinel.
    pub fn solve(&mut self) {
        let n = self.num_cv();
        for index in (0..n).rev() {
            let parent = self.parent_cv[index];
            if parent != NO_PARENT {
                let p = parent as usize;
                let factor = self.u[index] / self.d[index];
                self.d[p] -= factor * self.u[index];
                self.rhs[p] -= factor * self.rhs[index];
            }
        }
        for index in 0..n {
            let parent = self.parent_cv[index];
            self.rhs[index] = if parent == NO_PARENT {
                self.rhs[index] / self.d[index]
            } else {
                (self.rhs[index] - self.u[index] * self.rhs[parent as usize]) / self.d[index]
            };
        }
        self.v.copy_from_slice(&self.rhs);
    }

    pub fn check_finite_state(&self) -> Result<()> {
        if !self.check_finite {
            return Ok(());
        }
        for (cv, &v) in self.v.iter().enumerate() {
            if !v.is_finite() {
                return Err(SimulationError::NumericFailure {
                    quantity: "voltage",
                    cv,
                    time: self.t,
                });
            }
        }
        for (cv, &i) in self.i.iter().enumerate() {
            if !i.is_finite() {
                return Err(SimulationError::NumericFailure {
                    quantity: "current",
                    cv,
                    time: self.t,
                });
            }
        }
        Ok(())
    }
}

/// Watches a set of CVs for upward threshold crossings; crossing times are
/// linearly interpolated within the step.
#[derive(Debug, Clone)]
pub struct ThresholdWatcher {
    cv: Vec<u32>,
    threshold: Vec<f64>,
    v_prev: Vec<f64>,
}

/// An upward crossing of detector `index` at interpolated time `time`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Crossing {
    pub index: usize,
    pub time: Time,
}

impl ThresholdWatcher {
    pub fn new(cv: Vec<u32>, threshold: Vec<f64>, v: &[f64]) -> Self {
        let v_prev = cv.iter().map(|&c| v[c as usize]).collect();
        Self {
            cv,
            threshold,
            v_prev,
        }
    }

    pub fn len(&self) -> usize {
        self.cv.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cv.is_empty()
    }

    pub fn reset(&mut self, v: &[f64]) {
        for (prev, &c) in self.v_prev.iter_mut().zip(&self.cv) {
            *prev = v[c as usize];
        }
    }

    /// Record crossings over the step [t_prev, t_now] and retire the step.
    pub fn detect(&mut self, t_prev: Time, t_now: Time, v: &[f64], out: &mut Vec<Crossing>) {
        for (index, &c) in self.cv.iter().enumerate() {
            let v0 = self.v_prev[index];
            let v1 = v[c as usize];
            let thresh = self.threshold[index];
            if v0 < thresh && v1 >= thresh {
                let s = if v1 > v0 { (thresh - v0) / (v1 - v0) } else { 1.0 };
                out.push(Crossing {
                    index,
                    time: t_prev + s * (t_now - t_prev),
                });
            }
            self.v_prev[index] = v1;
        }
    }
}
