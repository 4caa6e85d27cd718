use crate::event::Event;
use crate::label::LidSelectionPolicy;
use crate::schedule::Schedule;
use crate::types::{CellMember, Gid, Lid, Time};

/// A synapse target named by label; resolved to a concrete lid during
/// engine construction.
#[derive(Debug, Clone)]
pub struct LabeledTarget {
    pub label: String,
    pub policy: LidSelectionPolicy,
}

/// Sources of time-ordered events for one cell's targets. Built-in variants
/// cover the common cases; `Custom` is the escape hatch for user-supplied
/// implementations.
///
/// The `events(t0, t1)` contract matches `Schedule`: half-open, monotone
/// query sequence between resets, view invalidated by the next call.
#[derive(Debug, Clone)]
pub enum EventGenerator {
    Empty,
    Scheduled(ScheduledGenerator),
    Explicit(ExplicitGenerator),
    Custom(Box<dyn EventGeneratorImpl>),
}

pub trait EventGeneratorImpl: Send + std::fmt::Debug {
    fn reset(&mut self);
    fn targets(&self) -> Vec<LabeledTarget>;
    /// Bind the generator to its cell and the resolved lids, one per entry
    /// of `targets()`, in order.
    fn resolve(&mut self, gid: Gid, lids: &[Lid]);
    fn events(&mut self, t0: Time, t1: Time) -> &[Event];
    fn clone_box(&self) -> Box<dyn EventGeneratorImpl>;
}

impl Clone for Box<dyn EventGeneratorImpl> {
    fn clone(&self) -> Self {
        self.clone_box()
    }
}

impl EventGenerator {
    pub fn empty() -> Self {
        EventGenerator::Empty
    }

    pub fn regular(
        label: impl Into<String>,
        weight: f32,
        t0: Time,
        dt: Time,
        t_stop: Time,
    ) -> Self {
        EventGenerator::Scheduled(ScheduledGenerator::new(
            label,
            LidSelectionPolicy::RoundRobin,
            weight,
            Schedule::regular(t0, dt, t_stop),
        ))
    }

    pub fn poisson(
        label: impl Into<String>,
        weight: f32,
        t0: Time,
        rate_khz: f64,
        seed: u64,
    ) -> Self {
        EventGenerator::Scheduled(ScheduledGenerator::new(
            label,
            LidSelectionPolicy::RoundRobin,
            weight,
            Schedule::poisson(t0, rate_khz, seed),
        ))
    }

    pub fn scheduled(
        label: impl Into<String>,
        policy: LidSelectionPolicy,
        weight: f32,
        schedule: Schedule,
    ) -> Self {
        EventGenerator::Scheduled(ScheduledGenerator::new(label, policy, weight, schedule))
    }

    pub fn explicit(events: Vec<LabeledEvent>) -> Self {
        EventGenerator::Explicit(ExplicitGenerator::new(events))
    }

    pub fn reset(&mut self) {
        match self {
            EventGenerator::Empty => {}
            EventGenerator::Scheduled(g) => g.reset(),
            EventGenerator::Explicit(g) => g.reset(),
            EventGenerator::Custom(g) => g.reset(),
        }
    }

    pub fn targets(&self) -> Vec<LabeledTarget> {
        match self {
            EventGenerator::Empty => Vec::new(),
            EventGenerator::Scheduled(g) => vec![g.target.clone()],
            EventGenerator::Explicit(g) => g.targets.clone(),
            EventGenerator::Custom(g) => g.targets(),
        }
    }

    pub fn resolve(&mut self, gid: Gid, lids: &[Lid]) {
        match self {
            EventGenerator::Empty => {}
            EventGenerator::Scheduled(g) => g.resolve(gid, lids),
            EventGenerator::Explicit(g) => g.resolve(gid, lids),
            EventGenerator::Custom(g) => g.resolve(gid, lids),
        }
    }

    pub fn events(&mut self, t0: Time, t1: Time) -> &[Event] {
        match self {
            EventGenerator::Empty => &[],
            EventGenerator::Scheduled(g) => g.events(t0, t1),
            EventGenerator::Explicit(g) => g.events(t0, t1),
            EventGenerator::Custom(g) => g.events(t0, t1),
        }
    }
}

/// Events with a fixed target and weight on a time schedule.
#[derive(Debug, Clone)]
pub struct ScheduledGenerator {
    target: LabeledTarget,
    weight: f32,
    schedule: Schedule,
    resolved: CellMember,
    buffer: Vec<Event>,
}

impl ScheduledGenerator {
    pub fn new(
        label: impl Into<String>,
        policy: LidSelectionPolicy,
        weight: f32,
        schedule: Schedule,
    ) -> Self {
        Self {
            target: LabeledTarget {
                label: label.into(),
                policy,
            },
            weight,
            schedule,
            resolved: CellMember::new(0, 0),
            buffer: Vec::new(),
        }
    }

    fn reset(&mut self) {
        self.schedule.reset();
    }

    fn resolve(&mut self, gid: Gid, lids: &[Lid]) {
        debug_assert_eq!(lids.len(), 1);
        self.resolved = CellMember::new(gid, lids[0]);
    }

    fn events(&mut self, t0: Time, t1: Time) -> &[Event] {
        let target = self.resolved;
        let weight = self.weight;
        let times = self.schedule.events(t0, t1);
        self.buffer.clear();
        self.buffer
            .extend(times.iter().map(|&t| Event::new(target, t, weight)));
        &self.buffer
    }
}

#[derive(Debug, Clone)]
pub struct LabeledEvent {
    pub label: String,
    pub policy: LidSelectionPolicy,
    pub time: Time,
    pub weight: f32,
}

impl LabeledEvent {
    pub fn new(label: impl Into<String>, time: Time, weight: f32) -> Self {
        Self {
            label: label.into(),
            policy: LidSelectionPolicy::RoundRobin,
            time,
            weight,
        }
    }
}

/// A pre-sorted explicit list of labeled events.
#[derive(Debug, Clone)]
pub struct ExplicitGenerator {
    targets: Vec<LabeledTarget>,
    events: Vec<Event>,
    start: usize,
}

impl ExplicitGenerator {
    pub fn new(labeled: Vec<LabeledEvent>) -> Self {
        assert!(
            labeled.windows(2).all(|w| w[0].time <= w[1].time),
            "explicit generator events must be sorted by time"
        );
        let targets = labeled
            .iter()
            .map(|e| LabeledTarget {
                label: e.label.clone(),
                policy: e.policy,
            })
            .collect();
        let events = labeled
            .iter()
            .map(|e| Event::new(CellMember::new(0, 0), e.time, e.weight))
            .collect();
        Self {
            targets,
            events,
            start: 0,
        }
    }

    fn reset(&mut self) {
        self.start = 0;
    }

    fn resolve(&mut self, gid: Gid, lids: &[Lid]) {
        debug_assert_eq!(lids.len(), self.events.len());
        for (event, &lid) in self.events.iter_mut().zip(lids) {
            event.target = CellMember::new(gid, lid);
        }
    }

    fn events(&mut self, t0: Time, t1: Time) -> &[Event] {
        let tail = &self.events[self.start..];
        let lb = tail.partition_point(|e| e.time < t0);
        let ub = tail.partition_point(|e| e.time < t1);
        let view = &tail[lb..ub];
        self.start += ub;
        view
    }
}
