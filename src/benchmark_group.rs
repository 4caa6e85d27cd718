use std::time::Duration;

use crate::cable_cell::BenchmarkCell;
use crate::cell_group::CellGroup;
use crate::error::Result;
use crate::event::Event;
use crate::recipe::CellKind;
use crate::types::{CellMember, Epoch, Gid, Spike, Time};

/// Cells that spike on a schedule while consuming a configured amount of
/// wall time per advance; used to shape artificial load in harness runs.
pub struct BenchmarkCellGroup {
    gids: Vec<Gid>,
    cells: Vec<BenchmarkCell>,
    spikes: Vec<Spike>,
}

impl BenchmarkCellGroup {
    pub fn new(cells: Vec<(Gid, BenchmarkCell)>) -> Self {
        let gids = cells.iter().map(|(gid, _)| *gid).collect();
        let cells = cells.into_iter().map(|(_, c)| c).collect();
        Self {
            gids,
            cells,
            spikes: Vec::new(),
        }
    }
}

impl CellGroup for BenchmarkCellGroup {
    fn kind(&self) -> CellKind {
        CellKind::Benchmark
    }

    fn gids(&self) -> &[Gid] {
        &self.gids
    }

    fn labels(&self) -> Vec<(Gid, crate::fvm::CellLabels)> {
        crate::cell_group::fixed_labels(&self.gids, false)
    }

    fn reset(&mut self) {
        for cell in &mut self.cells {
            cell.schedule.reset();
        }
        self.spikes.clear();
    }

    fn advance(&mut self, epoch: Epoch, _dt: Time, _lane: &[Event]) -> Result<()> {
        let simulated_ms = epoch.t_end - epoch.t_begin;
        for (index, cell) in self.cells.iter_mut().enumerate() {
            let source = CellMember::new(self.gids[index], 0);
            for &t in cell.schedule.events(epoch.t_begin, epoch.t_end) {
                self.spikes.push(Spike::new(source, t));
            }
            let busy_s = simulated_ms * 1e-3 * cell.realtime_ratio;
            if busy_s > 0.0 {
                std::thread::sleep(Duration::from_secs_f64(busy_s));
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

impl std::fmt::Debug for BenchmarkCellGroup {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("BenchmarkCellGroup")
            .field("gids", &self.gids)
            .finish()
    }
}
