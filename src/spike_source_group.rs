use crate::cell_group::CellGroup;
use crate::error::Result;
use crate::event::Event;
use crate::recipe::CellKind;
use crate::schedule::Schedule;
use crate::types::{CellMember, Epoch, Gid, Spike, Time};

/// Cells that replay a schedule as spikes from source index 0 and ignore
/// all input.
pub struct SpikeSourceCellGroup {
    gids: Vec<Gid>,
    schedules: Vec<Schedule>,
    spikes: Vec<Spike>,
}

impl SpikeSourceCellGroup {
    pub fn new(cells: Vec<(Gid, Schedule)>) -> Self {
        let gids = cells.iter().map(|(gid, _)| *gid).collect();
        let schedules = cells.into_iter().map(|(_, s)| s).collect();
        Self {
            gids,
            schedules,
            spikes: Vec::new(),
        }
    }
}

impl CellGroup for SpikeSourceCellGroup {
    fn kind(&self) -> CellKind {
        CellKind::SpikeSource
    }

    fn gids(&self) -> &[Gid] {
        &self.gids
    }

    fn labels(&self) -> Vec<(Gid, crate::fvm::CellLabels)> {
        crate::cell_group::fixed_labels(&self.gids, false)
    }

    fn reset(&mut self) {
        for schedule in &mut self.schedules {
            schedule.reset();
        }
        self.spikes.clear();
    }

    fn advance(&mut self, epoch: Epoch, _dt: Time, _lane: &[Event]) -> Result<()> {
        for (cell, schedule) in self.schedules.iter_mut().enumerate() {
            let source = CellMember::new(self.gids[cell], 0);
            for &t in schedule.events(epoch.t_begin, epoch.t_end) {
                self.spikes.push(Spike::new(source, t));
            }
        }
        Ok(())
    }

    fn spikes(&self) -> &[Spike] {
        &self.spikes
    }

    fn clear_spikes(&mut self) {
        self.spikes.clear();
    }
}

impl std::fmt::Debug for SpikeSourceCellGroup {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("SpikeSourceCellGroup")
            .field("gids", &self.gids)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use itertools::assert_equal;

    #[test]
    fn replays_schedule_within_epoch() {
        let mut group =
            SpikeSourceCellGroup::new(vec![(4, Schedule::regular(0.0, 1.0, 10.0))]);

        group.advance(Epoch::first(2.5), 0.025, &[]).unwrap();
        assert_equal(group.spikes().iter().map(|s| s.time), [0.0, 1.0, 2.0]);
        assert!(group.spikes().iter().all(|s| s.source == CellMember::new(4, 0)));

        group.clear_spikes();
        group
            .advance(Epoch::first(2.5).advance(5.0), 0.025, &[])
            .unwrap();
        assert_equal(group.spikes().iter().map(|s| s.time), [3.0, 4.0]);
    }

    #[test]
    fn reset_replays_from_zero() {
        let mut group = SpikeSourceCellGroup::new(vec![(0, Schedule::explicit(vec![1.0, 2.0]))]);
        group.advance(Epoch::first(5.0), 0.025, &[]).unwrap();
        assert_eq!(group.spikes().len(), 2);

        group.clear_spikes();
        group.reset();
        group.advance(Epoch::first(5.0), 0.025, &[]).unwrap();
        assert_eq!(group.spikes().len(), 2);
    }
}
