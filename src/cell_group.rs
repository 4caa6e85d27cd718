use crate::error::Result;
use crate::event::Event;
use crate::fvm::CellLabels;
use crate::label::LidRange;
use crate::probe::{ProbeSelector, SamplerFn, SamplerHandle};
use crate::recipe::CellKind;
use crate::schedule::Schedule;
use crate::types::{Epoch, Gid, Spike, Time};

/// Source label every non-cable cell exposes for its single spike source.
pub const SOURCE_LABEL: &str = "src";
/// Target label a LIF cell exposes for its single event target.
pub const TARGET_LABEL: &str = "tgt";

/// The implicit label table of cells with one source and, optionally, one
/// target.
pub fn fixed_labels(gids: &[Gid], with_target: bool) -> Vec<(Gid, CellLabels)> {
    gids.iter()
        .map(|&gid| {
            let mut labels = CellLabels {
                sources: vec![(SOURCE_LABEL.to_string(), LidRange::new(0, 1))],
                ..CellLabels::default()
            };
            if with_target {
                labels
                    .targets
                    .push((TARGET_LABEL.to_string(), LidRange::new(0, 1)));
            }
            (gid, labels)
        })
        .collect()
}

/// How event delivery times are coalesced before queueing into mechanism
/// streams.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BinningPolicy {
    None,
    /// Round delivery times down to a multiple of `bin_dt`.
    Regular,
    /// Bin onto the first event of each `bin_dt` window, so bursts share
    /// one delivery time.
    Following,
}

/// Stateful binner for one event stream; times never move below `floor`.
#[derive(Debug, Clone)]
pub struct EventBinner {
    policy: BinningPolicy,
    bin_dt: Time,
    bin_start: Option<Time>,
}

impl EventBinner {
    pub fn new(policy: BinningPolicy, bin_dt: Time) -> Self {
        Self {
            policy,
            bin_dt,
            bin_start: None,
        }
    }

    pub fn reset(&mut self) {
        self.bin_start = None;
    }

    pub fn bin(&mut self, time: Time, floor: Time) -> Time {
        let binned = match self.policy {
            BinningPolicy::None => time,
            BinningPolicy::Regular => {
                if self.bin_dt > 0.0 {
                    (time / self.bin_dt).floor() * self.bin_dt
                } else {
                    time
                }
            }
            BinningPolicy::Following => match self.bin_start {
                Some(start) if time - start < self.bin_dt => start,
                _ => {
                    self.bin_start = Some(time);
                    time
                }
            },
        };
        binned.max(floor)
    }
}

/// A set of cells of one kind sharing a backend. Groups are advanced in
/// parallel, one task per group; everything a group touches during
/// `advance` is owned by the group.
pub trait CellGroup: Send {
    fn kind(&self) -> CellKind;

    fn gids(&self) -> &[Gid];

    /// The source/target/gap-junction label table of every cell in the
    /// group, consumed by the label resolvers.
    fn labels(&self) -> Vec<(Gid, CellLabels)>;

    /// Restore construction-time state.
    fn reset(&mut self);

    /// Integrate over the epoch, consuming the group's sorted event lane
    /// and accumulating spikes.
    fn advance(&mut self, epoch: Epoch, dt: Time, lane: &[Event]) -> Result<()>;

    fn spikes(&self) -> &[Spike];

    fn clear_spikes(&mut self);

    fn add_sampler(
        &mut self,
        _handle: SamplerHandle,
        _selector: ProbeSelector,
        _schedule: Schedule,
        _sampler: SamplerFn,
    ) {
    }

    fn remove_sampler(&mut self, _handle: SamplerHandle) {}

    fn remove_all_samplers(&mut self) {}

    fn set_binning_policy(&mut self, _policy: BinningPolicy, _bin_dt: Time) {}
}
