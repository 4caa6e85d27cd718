use std::sync::{Arc, Mutex};

use log::{debug, info, warn};

use crate::cell_group::{BinningPolicy, CellGroup};
use crate::communicator::Communicator;
use crate::context::Context;
use crate::error::{Result, SimulationError};
use crate::event::{merge_events, EventLane};
use crate::generator::EventGenerator;
use crate::label::{LabelResolver, LabeledRanges};
use crate::lif_group::LifCellGroup;
use crate::load_balance::{DomainDecomposition, GroupDescription};
use crate::mechanisms::default_catalogue;
use crate::probe::{ProbeAddress, ProbeMetadata, ProbeSelector, Sample, SamplerFn, SamplerHandle};
use crate::recipe::{CellDescription, CellKind, Recipe};
use crate::schedule::Schedule;
use crate::spike_source_group::SpikeSourceCellGroup;
use crate::benchmark_group::BenchmarkCellGroup;
use crate::cable_group::CableCellGroup;
use crate::spike_store::SpikeDoubleBuffer;
use crate::types::{Epoch, Gid, HashMap, Spike, Time};

pub type SpikeExportFn = Box<dyn Fn(&[Spike]) + Send + Sync>;

/// The simulation engine: cell groups, the communicator, and the
/// overlapped epoch loop that couples them.
///
/// Each epoch of length min_delay/2 runs two tasks concurrently: spike
/// exchange for the previous epoch (producing the event lanes of the next
/// one) and cell-group integration of the current one. The delay floor
/// guarantees no event produced by the exchange is due before the next
/// epoch starts.
pub struct Simulation {
    context: Context,
    groups: Vec<Box<dyn CellGroup>>,
    communicator: Communicator,
    event_lanes: [Vec<EventLane>; 2],
    generators: Vec<(usize, EventGenerator)>,
    spike_buffers: SpikeDoubleBuffer,
    epoch: Epoch,
    t: Time,
    t_interval: Time,
    sampler_counter: u64,
    local_export: Option<SpikeExportFn>,
    global_export: Option<SpikeExportFn>,
}

fn build_group(
    recipe: &dyn Recipe,
    description: &GroupDescription,
    catalogue: &crate::mechanism::Catalogue,
    check_finite: bool,
) -> Result<Box<dyn CellGroup>> {
    let wrong_kind = |gid: Gid| {
        SimulationError::InternalInvariant(format!(
            "description of cell {gid} does not match its kind"
        ))
    };

    match description.kind {
        CellKind::Cable => {
            let mut cells = Vec::with_capacity(description.gids.len());
            let mut gap_junctions: HashMap<Gid, Vec<_>> = HashMap::default();
            let mut probes = Vec::new();
            for &gid in &description.gids {
                match recipe.cell_description(gid) {
                    CellDescription::Cable(cell) => cells.push((gid, *cell)),
                    _ => return Err(wrong_kind(gid)),
                }
                let junctions = recipe.gap_junctions_on(gid);
                if !junctions.is_empty() {
                    gap_junctions.insert(gid, junctions);
                }
                for index in 0..recipe.num_probes(gid) {
                    let address = ProbeAddress::new(gid, index as u32);
                    if let Some(kind) = recipe.get_probe(address) {
                        probes.push((address, kind));
                    }
                }
            }
            Ok(Box::new(CableCellGroup::new(
                &cells,
                &gap_junctions,
                &probes,
                catalogue,
                check_finite,
            )?))
        }
        CellKind::Lif => {
            let mut cells = Vec::with_capacity(description.gids.len());
            for &gid in &description.gids {
                match recipe.cell_description(gid) {
                    CellDescription::Lif(cell) => cells.push((gid, cell)),
                    _ => return Err(wrong_kind(gid)),
                }
            }
            Ok(Box::new(LifCellGroup::new(cells)))
        }
        CellKind::SpikeSource => {
            let mut cells = Vec::with_capacity(description.gids.len());
            for &gid in &description.gids {
                match recipe.cell_description(gid) {
                    CellDescription::SpikeSource(schedule) => cells.push((gid, schedule)),
                    _ => return Err(wrong_kind(gid)),
                }
            }
            Ok(Box::new(SpikeSourceCellGroup::new(cells)))
        }
        CellKind::Benchmark => {
            let mut cells = Vec::with_capacity(description.gids.len());
            for &gid in &description.gids {
                match recipe.cell_description(gid) {
                    CellDescription::Benchmark(cell) => cells.push((gid, cell)),
                    _ => return Err(wrong_kind(gid)),
                }
            }
            Ok(Box::new(BenchmarkCellGroup::new(cells)))
        }
    }
}

impl Simulation {
    pub fn new(
        recipe: &dyn Recipe,
        context: &Context,
        decomposition: &DomainDecomposition,
    ) -> Result<Self> {
        let catalogue = default_catalogue();
        let check_finite = context.check_finite;

        // One construction task per cell group.
        let groups: Vec<Box<dyn CellGroup>> = context
            .pool
            .parallel_map(decomposition.groups.len(), |index| {
                build_group(recipe, &decomposition.groups[index], &catalogue, check_finite)
            })
            .into_iter()
            .collect::<Result<_>>()?;

        // Label tables: sources are gathered globally (spikes can originate
        // on any rank), targets stay local to the receiving rank.
        let mut source_table = LabeledRanges::default();
        let mut target_table = LabeledRanges::default();
        for group in &groups {
            for (gid, labels) in group.labels() {
                for (label, range) in labels.sources {
                    source_table.add(gid, label, range);
                }
                for (label, range) in labels.targets {
                    target_table.add(gid, label, range);
                }
            }
        }
        source_table.seal();
        let global_sources = context
            .distributed
            .gather_labeled_ranges(&source_table)
            .map_err(|e| SimulationError::CollectiveFailure(e.to_string()))?;

        let mut source_resolver = LabelResolver::new(global_sources);
        let mut target_resolver = LabelResolver::new(target_table);

        let communicator = Communicator::new(
            recipe,
            decomposition,
            &mut source_resolver,
            &mut target_resolver,
        )?;

        // Bind generators to their cells' resolved target lids.
        let mut generators = Vec::new();
        for (index, group) in groups.iter().enumerate() {
            for &gid in group.gids() {
                for mut generator in recipe.event_generators(gid) {
                    let mut lids = Vec::new();
                    for target in generator.targets() {
                        lids.push(target_resolver.get_lid(gid, &target.label, target.policy)?);
                    }
                    generator.resolve(gid, &lids);
                    generators.push((index, generator));
                }
            }
        }

        let min_delay = communicator.min_delay(context.distributed.as_ref())?;
        let t_interval = min_delay / 2.0;
        info!(
            "simulation: {} groups, min delay {min_delay} ms, epoch interval {t_interval} ms",
            groups.len()
        );

        let num_groups = groups.len();
        if num_groups == 0 {
            warn!("simulation has no local cell groups");
        }

        Ok(Self {
            context: context.clone(),
            groups,
            communicator,
            event_lanes: [vec![EventLane::new(); num_groups], vec![EventLane::new(); num_groups]],
            generators,
            spike_buffers: SpikeDoubleBuffer::new(context.pool.num_slots()),
            epoch: Epoch::first(0.0),
            t: 0.0,
            t_interval,
            sampler_counter: 0,
            local_export: None,
            global_export: None,
        })
    }

    /// Merge generator events for the window [t0, t1) into the lane buffer
    /// `parity`.
    fn seed_generator_events(&mut self, parity: usize, t0: Time, t1: Time) {
        let num_groups = self.groups.len();
        let mut incoming = vec![EventLane::new(); num_groups];
        for (group, generator) in &mut self.generators {
            incoming[*group].extend_from_slice(generator.events(t0, t1));
        }
        let mut merged = EventLane::new();
        for (group, mut events) in incoming.into_iter().enumerate() {
            let current = std::mem::take(&mut self.event_lanes[parity][group]);
            merge_events(&mut events, &current, &mut merged, t0);
            self.event_lanes[parity][group] = std::mem::take(&mut merged);
        }
    }

    /// Advance the simulation to `t_final` with integration timestep `dt`.
    pub fn run(&mut self, t_final: Time, dt: Time) -> Result<Time> {
        if dt <= 0.0 {
            return Err(SimulationError::InternalInvariant(
                "integration dt must be positive".into(),
            ));
        }
        if self.t >= t_final {
            warn!("run to {t_final} ms requested at t = {} ms; nothing to do", self.t);
            return Ok(self.t);
        }

        let t_interval = self.t_interval;
        self.epoch = Epoch::new(0, self.t, (self.t + t_interval).min(t_final));

        // A previous run may have left carried-over events in either lane
        // buffer; fold everything into the buffer the first epoch reads.
        let parity = self.epoch.buffer_index();
        for group in 0..self.groups.len() {
            let mut carried = std::mem::take(&mut self.event_lanes[1 - parity][group]);
            let current = std::mem::take(&mut self.event_lanes[parity][group]);
            let mut merged = EventLane::new();
            merge_events(&mut carried, &current, &mut merged, self.t);
            self.event_lanes[parity][group] = merged;
        }

        self.seed_generator_events(parity, self.epoch.t_begin, self.epoch.t_end);

        while self.t < t_final {
            let epoch = self.epoch;
            let next_t_end = (epoch.t_end + t_interval).min(t_final);
            debug!("epoch {} [{}, {}) ms", epoch.id, epoch.t_begin, epoch.t_end);

            self.spike_buffers.exchange();
            self.spike_buffers.current().clear();

            let [lanes0, lanes1] = &mut self.event_lanes;
            let (current_lanes, next_lanes) = if epoch.buffer_index() == 0 {
                (&*lanes0, lanes1)
            } else {
                (&*lanes1, lanes0)
            };

            let pool = self.context.pool.as_ref();
            let distributed = self.context.distributed.as_ref();
            let communicator = &self.communicator;
            let generators = &mut self.generators;
            let groups = &mut self.groups;
            let previous_store = self.spike_buffers.previous();
            let current_store = self.spike_buffers.current();
            let local_export = self.local_export.as_deref();
            let global_export = self.global_export.as_deref();

            // Task A: exchange the previous epoch's spikes and build the
            // next epoch's lanes.
            let exchange = move || -> Result<()> {
                let local_spikes = previous_store.gather();
                if let Some(export) = local_export {
                    export(&local_spikes);
                }
                let global_spikes = communicator.exchange(local_spikes, distributed)?;
                if let Some(export) = global_export {
                    export(global_spikes.values());
                }

                let mut queues = communicator.make_event_queues(&global_spikes, pool);
                for (group, generator) in generators.iter_mut() {
                    queues[*group].extend_from_slice(generator.events(epoch.t_end, next_t_end));
                }
                for (group, next_lane) in next_lanes.iter_mut().enumerate() {
                    let mut incoming = std::mem::take(&mut queues[group]);
                    merge_events(&mut incoming, &current_lanes[group], next_lane, epoch.t_end);
                }
                Ok(())
            };

            // Task B: advance every cell group over the current epoch.
            let update = move || -> Result<()> {
                let failure: Mutex<Option<SimulationError>> = Mutex::new(None);
                pool.parallel_for_each(groups, |index, group| {
                    match group.advance(epoch, dt, &current_lanes[index]) {
                        Ok(()) => {
                            current_store.insert(pool.thread_index(), group.spikes());
                            group.clear_spikes();
                        }
                        Err(e) => {
                            let mut slot = failure.lock().unwrap();
                            slot.get_or_insert(e);
                        }
                    }
                });
                match failure.into_inner().unwrap() {
                    Some(e) => Err(e),
                    None => Ok(()),
                }
            };

            let (exchanged, updated) = pool.join(exchange, update);
            exchanged?;
            updated?;

            self.t = epoch.t_end;
            self.epoch = epoch.advance((self.t + t_interval).min(t_final));
        }

        // Final drain: the last epoch's spikes still need exporting and
        // counting.
        self.spike_buffers.exchange();
        let local_spikes = self.spike_buffers.previous().gather();
        if let Some(export) = self.local_export.as_deref() {
            export(&local_spikes);
        }
        let global_spikes = self
            .communicator
            .exchange(local_spikes, self.context.distributed.as_ref())?;
        if let Some(export) = self.global_export.as_deref() {
            export(global_spikes.values());
        }
        self.spike_buffers.previous().clear();

        Ok(self.t)
    }

    /// Attach a sampler to every probe matched by the selector; sample
    /// times come from the schedule.
    pub fn add_sampler(
        &mut self,
        selector: ProbeSelector,
        schedule: Schedule,
        callback: impl FnMut(&ProbeMetadata, &[Sample]) + Send + 'static,
    ) -> SamplerHandle {
        let handle = SamplerHandle(self.sampler_counter);
        self.sampler_counter += 1;
        let sampler: SamplerFn = Arc::new(Mutex::new(callback));
        for group in &mut self.groups {
            group.add_sampler(handle, selector.clone(), schedule.clone(), sampler.clone());
        }
        handle
    }

    pub fn remove_sampler(&mut self, handle: SamplerHandle) {
        for group in &mut self.groups {
            group.remove_sampler(handle);
        }
    }

    pub fn remove_all_samplers(&mut self) {
        for group in &mut self.groups {
            group.remove_all_samplers();
        }
    }

    pub fn set_binning_policy(&mut self, policy: BinningPolicy, bin_dt: Time) {
        for group in &mut self.groups {
            group.set_binning_policy(policy, bin_dt);
        }
    }

    pub fn set_local_spike_callback(&mut self, callback: SpikeExportFn) {
        self.local_export = Some(callback);
    }

    pub fn set_global_spike_callback(&mut self, callback: SpikeExportFn) {
        self.global_export = Some(callback);
    }

    /// Total spikes gathered over the run, summed over all ranks' views.
    pub fn num_spikes(&self) -> u64 {
        self.communicator.num_spikes()
    }

    pub fn num_groups(&self) -> usize {
        self.groups.len()
    }

    pub fn epoch_interval(&self) -> Time {
        self.t_interval
    }

    pub fn time(&self) -> Time {
        self.t
    }

    /// Restore the simulation to t = 0.
    pub fn reset(&mut self) {
        self.t = 0.0;
        self.epoch = Epoch::first(0.0);
        for group in &mut self.groups {
            group.reset();
        }
        for lanes in &mut self.event_lanes {
            for lane in lanes {
                lane.clear();
            }
        }
        for (_, generator) in &mut self.generators {
            generator.reset();
        }
        self.spike_buffers.clear_all();
        self.communicator.reset();
    }
}

impl std::fmt::Debug for Simulation {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("Simulation")
            .field("t", &self.t)
            .field("groups", &self.groups.len())
            .field("t_interval", &self.t_interval)
            .finish()
    }
}
