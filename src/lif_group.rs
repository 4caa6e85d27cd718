use crate::cable_cell::LifCell;
use crate::cell_group::CellGroup;
use crate::error::Result;
use crate::event::{Event, EventQueue};
use crate::recipe::CellKind;
use crate::types::{CellMember, Epoch, Gid, HashMap, Spike, Time};

/// Leaky integrate-and-fire cells, integrated exactly between events: the
/// membrane decays towards rest in closed form, so the only work is at
/// event times. Each cell exposes target 0 and source 0.
pub struct LifCellGroup {
    gids: Vec<Gid>,
    cell_index: HashMap<Gid, usize>,
    params: Vec<LifCell>,
    v: Vec<f64>,
    last_update: Vec<Time>,
    refractory_until: Vec<Time>,
    queue: EventQueue,
    spikes: Vec<Spike>,
}

impl LifCellGroup {
    pub fn new(cells: Vec<(Gid, LifCell)>) -> Self {
        let gids: Vec<Gid> = cells.iter().map(|(gid, _)| *gid).collect();
        let cell_index = gids
            .iter()
            .enumerate()
            .map(|(index, gid)| (*gid, index))
            .collect();
        let params: Vec<LifCell> = cells.into_iter().map(|(_, cell)| cell).collect();
        let v = params.iter().map(|p| p.e_l).collect();
        let n = params.len();
        Self {
            gids,
            cell_index,
            params,
            v,
            last_update: vec![0.0; n],
            refractory_until: vec![f64::NEG_INFINITY; n],
            queue: EventQueue::new(),
            spikes: Vec::new(),
        }
    }

    pub fn voltage(&self, gid: Gid, t: Time) -> Option<f64> {
        let cell = *self.cell_index.get(&gid)?;
        let p = &self.params[cell];
        let dt = t - self.last_update[cell];
        Some(p.e_l + (self.v[cell] - p.e_l) * (-dt / p.tau_m).exp())
    }
}

impl CellGroup for LifCellGroup {
    fn kind(&self) -> CellKind {
        CellKind::Lif
    }

    fn gids(&self) -> &[Gid] {
        &self.gids
    }

    fn labels(&self) -> Vec<(Gid, crate::fvm::CellLabels)> {
        crate::cell_group::fixed_labels(&self.gids, true)
    }

    fn reset(&mut self) {
        for (cell, p) in self.params.iter().enumerate() {
            self.v[cell] = p.e_l;
            self.last_update[cell] = 0.0;
            self.refractory_until[cell] = f64::NEG_INFINITY;
        }
        self.queue.clear();
        self.spikes.clear();
    }

    fn advance(&mut self, epoch: Epoch, _dt: Time, lane: &[Event]) -> Result<()> {
        // Lane entries beyond the epoch are carried over by the engine's
        // merge; queue only what is due now.
        for event in lane {
            if event.time < epoch.t_end {
                self.queue.push(*event);
            }
        }

        while let Some(event) = self.queue.pop_if_before(epoch.t_end) {
            let Some(&cell) = self.cell_index.get(&event.target.gid) else {
                continue;
            };
            let p = self.params[cell];

            // Inputs during the refractory hold are lost.
            if event.time < self.refractory_until[cell] {
                continue;
            }

            let dt = event.time - self.last_update[cell];
            self.v[cell] = p.e_l + (self.v[cell] - p.e_l) * (-dt / p.tau_m).exp();
            self.last_update[cell] = event.time;

            self.v[cell] += 1000.0 * event.weight as f64 / p.c_m;

            if self.v[cell] >= p.v_thresh {
                self.spikes.push(Spike::new(
                    CellMember::new(event.target.gid, 0),
                    event.time,
                ));
                self.v[cell] = p.e_l;
                self.refractory_until[cell] = event.time + p.t_ref;
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

impl std::fmt::Debug for LifCellGroup {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("LifCellGroup")
            .field("gids", &self.gids)
            .finish()
    }
}
