use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Exp};

use crate::types::Time;

/// A time schedule: a value type producing an ordered sequence of times.
/// `events(t0, t1)` returns a view of the times in `[t0, t1)`; successive
/// queries without an intervening `reset` must be monotone
/// (t0 ≤ t1 ≤ t0' ≤ t1'), and the view is invalidated by the next call.
#[derive(Debug, Clone)]
pub enum Schedule {
    Empty,
    Regular(RegularSchedule),
    Poisson(PoissonSchedule),
    Explicit(ExplicitSchedule),
}

impl Schedule {
    pub fn empty() -> Self {
        Schedule::Empty
    }

    pub fn regular(t0: Time, dt: Time, t_stop: Time) -> Self {
        Schedule::Regular(RegularSchedule::new(t0, dt, t_stop))
    }

    /// Homogeneous Poisson process with rate in kHz (events per ms) from
    /// `t0`. The same seed and query sequence reproduce the same times.
    pub fn poisson(t0: Time, rate_khz: f64, seed: u64) -> Self {
        Schedule::Poisson(PoissonSchedule::new(t0, rate_khz, seed))
    }

    pub fn explicit(times: Vec<Time>) -> Self {
        Schedule::Explicit(ExplicitSchedule::new(times))
    }

    pub fn reset(&mut self) {
        match self {
            Schedule::Empty => {}
            Schedule::Regular(s) => s.reset(),
            Schedule::Poisson(s) => s.reset(),
            Schedule::Explicit(s) => s.reset(),
        }
    }

    pub fn events(&mut self, t0: Time, t1: Time) -> &[Time] {
        debug_assert!(t0 <= t1);
        match self {
            Schedule::Empty => &[],
            Schedule::Regular(s) => s.events(t0, t1),
            Schedule::Poisson(s) => s.events(t0, t1),
            Schedule::Explicit(s) => s.events(t0, t1),
        }
    }
}

/// Emissions at t0 + k·dt for k ∈ ℕ with t < t_stop.
#[derive(Debug, Clone)]
pub struct RegularSchedule {
    t0: Time,
    dt: Time,
    t_stop: Time,
    buffer: Vec<Time>,
}

impl RegularSchedule {
    pub fn new(t0: Time, dt: Time, t_stop: Time) -> Self {
        assert!(dt > 0.0, "regular schedule needs positive dt");
        Self {
            t0,
            dt,
            t_stop,
            buffer: Vec::new(),
        }
    }

    fn reset(&mut self) {
        self.buffer.clear();
    }

    fn events(&mut self, t0: Time, t1: Time) -> &[Time] {
        self.buffer.clear();
        let from = t0.max(self.t0);
        let until = t1.min(self.t_stop);
        if from < until {
            let mut k = ((from - self.t0) / self.dt).ceil() as u64;
            // Guard against the representable time just below a multiple.
            while self.t0 + (k as Time) * self.dt < from {
                k += 1;
            }
            loop {
                let t = self.t0 + (k as Time) * self.dt;
                if t >= until {
                    break;
                }
                self.buffer.push(t);
                k += 1;
            }
        }
        &self.buffer
    }
}

/// Homogeneous Poisson process: exponential inter-arrival times drawn from a
/// per-schedule generator, so identical seeds replay identical streams.
#[derive(Debug, Clone)]
pub struct PoissonSchedule {
    t0: Time,
    rate_khz: f64,
    seed: u64,
    rng: StdRng,
    next: Time,
    buffer: Vec<Time>,
}

impl PoissonSchedule {
    pub fn new(t0: Time, rate_khz: f64, seed: u64) -> Self {
        assert!(rate_khz > 0.0, "poisson schedule needs positive rate");
        let mut schedule = Self {
            t0,
            rate_khz,
            seed,
            rng: StdRng::seed_from_u64(seed),
            next: t0,
            buffer: Vec::new(),
        };
        schedule.step();
        schedule
    }

    fn step(&mut self) {
        let exp = Exp::new(self.rate_khz).expect("rate is positive");
        self.next += exp.sample(&mut self.rng);
    }

    fn reset(&mut self) {
        self.rng = StdRng::seed_from_u64(self.seed);
        self.next = self.t0;
        self.buffer.clear();
        self.step();
    }

    fn events(&mut self, t0: Time, t1: Time) -> &[Time] {
        self.buffer.clear();
        while self.next < t0 {
            self.step();
        }
        while self.next < t1 {
            self.buffer.push(self.next);
            self.step();
        }
        &self.buffer
    }
}

/// A pre-sorted list of times.
#[derive(Debug, Clone)]
pub struct ExplicitSchedule {
    times: Vec<Time>,
    start: usize,
}

impl ExplicitSchedule {
    pub fn new(times: Vec<Time>) -> Self {
        assert!(
            times.windows(2).all(|w| w[0] <= w[1]),
            "explicit schedule times must be sorted"
        );
        Self { times, start: 0 }
    }

    fn reset(&mut self) {
        self.start = 0;
    }

    fn events(&mut self, t0: Time, t1: Time) -> &[Time] {
        let tail = &self.times[self.start..];
        let lb = tail.partition_point(|&t| t < t0);
        let ub = tail.partition_point(|&t| t < t1);
        let view = &tail[lb..ub];
        self.start += ub;
        view
    }
}
