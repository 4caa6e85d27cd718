use crate::backend::{CableState, Crossing, ThresholdWatcher};
use crate::cable_cell::CableCell;
use crate::cell_group::{BinningPolicy, CellGroup, EventBinner};
use crate::error::{Result, SimulationError};
use crate::event::Event;
use crate::fvm::{discretize, FvmCellData};
use crate::label::{LabelResolver, LabeledRanges, LidSelectionPolicy};
use crate::mechanism::{Catalogue, DeliverableEvent, IonState, Mechanism};
use crate::mechanisms::GapJunctionMech;
use crate::probe::{
    ProbeAddress, ProbeKind, ProbeMetadata, ProbeSelector, Sample, SamplerFn, SamplerHandle,
};
use crate::recipe::{CellKind, GapJunctionDesc};
use crate::schedule::Schedule;
use crate::types::{Epoch, Gid, HashMap, Spike, Time};

/// Per-mechanism queue of routed events awaiting delivery, kept sorted by
/// delivery time for the duration of one epoch.
#[derive(Debug, Default)]
struct PendingStream {
    events: Vec<(Time, DeliverableEvent)>,
    cursor: usize,
}

impl PendingStream {
    fn clear(&mut self) {
        self.events.clear();
        self.cursor = 0;
    }

    fn next_time(&self) -> Option<Time> {
        self.events.get(self.cursor).map(|(t, _)| *t)
    }
}

#[derive(Debug, Clone)]
enum ProbeTarget {
    Voltage { cv: u32 },
    MechState { mech: u32, instance: u32, var: String },
}

struct SamplerAssoc {
    handle: SamplerHandle,
    schedule: Schedule,
    sampler: SamplerFn,
    /// Indices into the group's resolved probe table.
    probes: Vec<usize>,
    /// Sample deadlines within the current epoch, and the fire cursor.
    times: Vec<Time>,
    cursor: usize,
    /// One sample buffer per entry of `probes`.
    buffers: Vec<Vec<Sample>>,
}

/// A group of cable cells sharing one multicore integrator.
pub struct CableCellGroup {
    gids: Vec<Gid>,
    cell_index: HashMap<Gid, usize>,
    state: CableState,
    v_init: Vec<f64>,
    mechanisms: Vec<Box<dyn Mechanism>>,
    streams: Vec<PendingStream>,
    binners: Vec<EventBinner>,
    cells: Vec<FvmCellData>,
    watcher: ThresholdWatcher,
    detector_sources: Vec<crate::types::CellMember>,
    spikes: Vec<Spike>,
    probes: Vec<(ProbeAddress, ProbeKind, ProbeTarget)>,
    samplers: Vec<SamplerAssoc>,
    crossing_buf: Vec<Crossing>,
    delivery_buf: Vec<DeliverableEvent>,
}

impl CableCellGroup {
    pub fn new(
        cells: &[(Gid, CableCell)],
        gap_junctions: &HashMap<Gid, Vec<GapJunctionDesc>>,
        probes: &[(ProbeAddress, ProbeKind)],
        catalogue: &Catalogue,
        check_finite: bool,
    ) -> Result<Self> {
        let refs: Vec<(Gid, &CableCell)> = cells.iter().map(|(gid, c)| (*gid, c)).collect();
        let fvm = discretize(&refs, catalogue)?;

        let num_cv = fvm.num_cv();
        let ions = vec![IonState::new("na", num_cv, 50.0), IonState::new("k", num_cv, -77.0)];

        let mut state = CableState::new(
            fvm.parent_cv.clone(),
            fvm.cell_cv_divs.clone(),
            fvm.cv_capacitance.clone(),
            fvm.face_conductance.clone(),
            fvm.v_init.clone(),
            ions,
            check_finite,
        )?;

        let mut mechanisms: Vec<Box<dyn Mechanism>> = Vec::new();
        for config in &fvm.mechanisms {
            let mut mech = catalogue.instance(&config.name, &config.layout)?;
            for (slot, param, value) in &config.params {
                mech.set_parameter(param, *slot as usize, *value)?;
            }
            mechanisms.push(mech);
        }

        // Gap junctions: resolve both site labels against the group's own
        // site table. The load balancer keeps junction components whole, so
        // a peer outside the group is an internal error.
        let mut gj_table = LabeledRanges::default();
        for cell in &fvm.cells {
            for (label, range) in &cell.labels.gj_sites {
                gj_table.add(cell.gid, label.clone(), *range);
            }
        }
        let mut gj_resolver = LabelResolver::new(gj_table);
        let cell_index: HashMap<Gid, usize> = fvm
            .cells
            .iter()
            .enumerate()
            .map(|(index, cell)| (cell.gid, index))
            .collect();

        let mut gj_cv = Vec::new();
        let mut gj_peer_cv = Vec::new();
        let mut gj_g = Vec::new();
        for cell in &fvm.cells {
            for desc in gap_junctions.get(&cell.gid).map_or(&[][..], Vec::as_slice) {
                let local_lid = gj_resolver.get_lid(
                    cell.gid,
                    &desc.local_label,
                    LidSelectionPolicy::AssertUnivalent,
                )?;
                let peer_cell = cell_index.get(&desc.peer_gid).ok_or_else(|| {
                    SimulationError::InternalInvariant(format!(
                        "gap-junction peer {} not in the group of cell {}",
                        desc.peer_gid, cell.gid
                    ))
                })?;
                let peer_lid = gj_resolver.get_lid(
                    desc.peer_gid,
                    &desc.peer_label,
                    LidSelectionPolicy::AssertUnivalent,
                )?;
                gj_cv.push(cell.gj_sites[local_lid as usize]);
                gj_peer_cv.push(fvm.cells[*peer_cell].gj_sites[peer_lid as usize]);
                gj_g.push(desc.g);
            }
        }
        if !gj_cv.is_empty() {
            mechanisms.push(Box::new(GapJunctionMech::new(gj_cv, gj_peer_cv, gj_g)));
        }

        let streams = (0..mechanisms.len()).map(|_| PendingStream::default()).collect();
        let binners = (0..mechanisms.len())
            .map(|_| EventBinner::new(BinningPolicy::None, 0.0))
            .collect();

        let mut detector_cv = Vec::new();
        let mut detector_threshold = Vec::new();
        let mut detector_sources = Vec::new();
        for cell in &fvm.cells {
            for (lid, det) in cell.detectors.iter().enumerate() {
                detector_cv.push(det.cv);
                detector_threshold.push(det.threshold);
                detector_sources.push(crate::types::CellMember::new(cell.gid, lid as u32));
            }
        }
        let watcher = ThresholdWatcher::new(detector_cv, detector_threshold, &state.v);

        // Resolve recipe probes onto CVs and mechanism slots.
        let mut resolved_probes = Vec::new();
        for (address, kind) in probes {
            let cell = &fvm.cells[*cell_index.get(&address.gid).ok_or_else(|| {
                SimulationError::InternalInvariant(format!(
                    "probe on gid {} outside its group",
                    address.gid
                ))
            })?];
            let target = match kind {
                ProbeKind::MembraneVoltage { location } => {
                    let cv = cell.cv_of_location(*location).ok_or_else(|| {
                        SimulationError::BadDiscretization {
                            gid: address.gid,
                            what: format!(
                                "probe location ({}, {}) outside morphology",
                                location.branch, location.pos
                            ),
                        }
                    })?;
                    ProbeTarget::Voltage { cv }
                }
                ProbeKind::PointState {
                    target,
                    mechanism,
                    state: var,
                } => {
                    let handle =
                        cell.targets
                            .get(*target as usize)
                            .ok_or_else(|| SimulationError::NoSuchLabel {
                                gid: address.gid,
                                label: format!("synapse target {target}"),
                            })?;
                    let mech = &mechanisms[handle.mechanism as usize];
                    if mech.name() != mechanism {
                        return Err(SimulationError::BadDiscretization {
                            gid: address.gid,
                            what: format!(
                                "probe expects mechanism \"{mechanism}\" at target {target}, found \"{}\"",
                                mech.name()
                            ),
                        });
                    }
                    ProbeTarget::MechState {
                        mech: handle.mechanism,
                        instance: handle.instance,
                        var: var.clone(),
                    }
                }
            };
            resolved_probes.push((*address, kind.clone(), target));
        }

        // Mechanism init against the assembled shared state.
        {
            let mut view = state.shared_view(0.0);
            for mech in &mut mechanisms {
                mech.init(&mut view);
            }
        }

        let v_init = state.v.clone();
        Ok(Self {
            gids: fvm.cells.iter().map(|c| c.gid).collect(),
            cell_index,
            state,
            v_init,
            mechanisms,
            streams,
            binners,
            cells: fvm.cells,
            watcher,
            detector_sources,
            spikes: Vec::new(),
            probes: resolved_probes,
            samplers: Vec::new(),
            crossing_buf: Vec::new(),
            delivery_buf: Vec::new(),
        })
    }

    /// Route the epoch's lane events into per-mechanism streams, binning
    /// delivery times on the way.
    fn enqueue_lane(&mut self, lane: &[Event], epoch: Epoch) -> Result<()> {
        for stream in &mut self.streams {
            stream.clear();
        }
        for event in lane {
            // Entries beyond the epoch come back through the next merge.
            if event.time >= epoch.t_end {
                continue;
            }
            let cell = self.cell_index.get(&event.target.gid).ok_or_else(|| {
                SimulationError::InternalInvariant(format!(
                    "event for gid {} routed to the wrong group",
                    event.target.gid
                ))
            })?;
            let handle = self.cells[*cell]
                .targets
                .get(event.target.index as usize)
                .ok_or_else(|| {
                    SimulationError::InternalInvariant(format!(
                        "event for unknown target {}",
                        event.target
                    ))
                })?;
            let time = self.binners[handle.mechanism as usize].bin(event.time, epoch.t_begin);
            self.streams[handle.mechanism as usize].events.push((
                time,
                DeliverableEvent {
                    instance: handle.instance,
                    weight: event.weight,
                },
            ));
        }
        Ok(())
    }

    fn next_event_time(&self) -> Option<Time> {
        self.streams
            .iter()
            .filter_map(PendingStream::next_time)
            .min_by(Time::total_cmp)
    }

    fn next_sample_time(&self) -> Option<Time> {
        self.samplers
            .iter()
            .filter_map(|assoc| assoc.times.get(assoc.cursor).copied())
            .min_by(Time::total_cmp)
    }

    /// Step phase 1: apply every routed event due at or before `t`.
    fn deliver_due_events(&mut self, t: Time) {
        for (mech, stream) in self.mechanisms.iter_mut().zip(&mut self.streams) {
            self.delivery_buf.clear();
            while let Some((time, event)) = stream.events.get(stream.cursor) {
                if *time > t {
                    break;
                }
                self.delivery_buf.push(*event);
                stream.cursor += 1;
            }
            if !self.delivery_buf.is_empty() {
                mech.apply_events(&self.delivery_buf);
            }
        }
    }

    /// Samples at the current time observe state after event delivery at
    /// the same time.
    fn fire_due_samplers(&mut self, t: Time) {
        for assoc in &mut self.samplers {
            while let Some(&ts) = assoc.times.get(assoc.cursor) {
                if ts > t {
                    break;
                }
                for (slot, &probe) in assoc.probes.iter().enumerate() {
                    let (_, _, target) = &self.probes[probe];
                    let value = match target {
                        ProbeTarget::Voltage { cv } => self.state.v[*cv as usize],
                        ProbeTarget::MechState {
                            mech,
                            instance,
                            var,
                        } => self.mechanisms[*mech as usize]
                            .state_value(var, *instance as usize)
                            .unwrap_or(f64::NAN),
                    };
                    assoc.buffers[slot].push(Sample { time: ts, value });
                }
                assoc.cursor += 1;
            }
        }
    }

    fn flush_samplers(&mut self) {
        for assoc in &mut self.samplers {
            for (slot, &probe) in assoc.probes.iter().enumerate() {
                if assoc.buffers[slot].is_empty() {
                    continue;
                }
                let (address, kind, _) = &self.probes[probe];
                let metadata = ProbeMetadata {
                    address: *address,
                    kind: kind.clone(),
                };
                let mut callback = assoc.sampler.lock().unwrap();
                (*callback)(&metadata, &assoc.buffers[slot]);
                drop(callback);
                assoc.buffers[slot].clear();
            }
        }
    }

    /// One integration step over [t, t_to): the fixed kernel sequence of
    /// the cable integrator.
    fn step(&mut self, t_to: Time) {
        let dt = t_to - self.state.t;
        self.state.begin_step();
        {
            let mut view = self.state.shared_view(dt);
            for mech in &mut self.mechanisms {
                mech.compute_currents(&mut view);
            }
        }
        self.state.assemble(dt);
        self.state.solve();
        {
            let mut view = self.state.shared_view(dt);
            for mech in &mut self.mechanisms {
                mech.advance_state(&mut view);
            }
            for mech in &mut self.mechanisms {
                mech.write_ions(&mut view);
            }
        }
        let t_prev = self.state.t;
        self.state.t = t_to;

        self.crossing_buf.clear();
        self.watcher
            .detect(t_prev, t_to, &self.state.v, &mut self.crossing_buf);
        for crossing in &self.crossing_buf {
            self.spikes.push(Spike::new(
                self.detector_sources[crossing.index],
                crossing.time,
            ));
        }

        if !self.crossing_buf.is_empty() {
            let mut view = self.state.shared_view(dt);
            for mech in &mut self.mechanisms {
                mech.post_event(&mut view);
            }
        }
    }
}

impl CellGroup for CableCellGroup {
    fn kind(&self) -> CellKind {
        CellKind::Cable
    }

    fn gids(&self) -> &[Gid] {
        &self.gids
    }

    fn labels(&self) -> Vec<(Gid, crate::fvm::CellLabels)> {
        self.cells
            .iter()
            .map(|cell| (cell.gid, cell.labels.clone()))
            .collect()
    }

    fn reset(&mut self) {
        self.state.t = 0.0;
        self.state.v.copy_from_slice(&self.v_init);
        self.state.begin_step();
        self.watcher.reset(&self.state.v);
        self.spikes.clear();
        for stream in &mut self.streams {
            stream.clear();
        }
        for binner in &mut self.binners {
            binner.reset();
        }
        for assoc in &mut self.samplers {
            assoc.schedule.reset();
            assoc.times.clear();
            assoc.cursor = 0;
            for buffer in &mut assoc.buffers {
                buffer.clear();
            }
        }
        let mut view = self.state.shared_view(0.0);
        for mech in &mut self.mechanisms {
            mech.init(&mut view);
        }
    }

    fn advance(&mut self, epoch: Epoch, dt: Time, lane: &[Event]) -> Result<()> {
        debug_assert!(dt > 0.0);
        self.enqueue_lane(lane, epoch)?;

        for assoc in &mut self.samplers {
            assoc.times = assoc.schedule.events(epoch.t_begin, epoch.t_end).to_vec();
            assoc.cursor = 0;
        }

        while self.state.t < epoch.t_end {
            let t = self.state.t;
            self.deliver_due_events(t);
            self.fire_due_samplers(t);

            let mut t_to = (t + dt).min(epoch.t_end);
            if let Some(te) = self.next_event_time() {
                if te > t {
                    t_to = t_to.min(te);
                }
            }
            if let Some(ts) = self.next_sample_time() {
                if ts > t {
                    t_to = t_to.min(ts);
                }
            }

            self.step(t_to);
            self.state.check_finite_state()?;
        }

        // Events binned exactly onto the epoch boundary are delivered
        // before the next epoch integrates.
        self.deliver_due_events(epoch.t_end);
        self.fire_due_samplers(epoch.t_end);
        self.flush_samplers();
        Ok(())
    }

    fn spikes(&self) -> &[Spike] {
        &self.spikes
    }

    fn clear_spikes(&mut self) {
        self.spikes.clear();
    }

    fn add_sampler(
        &mut self,
        handle: SamplerHandle,
        selector: ProbeSelector,
        schedule: Schedule,
        sampler: SamplerFn,
    ) {
        let probes: Vec<usize> = self
            .probes
            .iter()
            .enumerate()
            .filter(|(_, (address, _, _))| selector.matches(*address))
            .map(|(index, _)| index)
            .collect();
        if probes.is_empty() {
            return;
        }
        let buffers = probes.iter().map(|_| Vec::new()).collect();
        self.samplers.push(SamplerAssoc {
            handle,
            schedule,
            sampler,
            probes,
            times: Vec::new(),
            cursor: 0,
            buffers,
        });
    }

    fn remove_sampler(&mut self, handle: SamplerHandle) {
        self.samplers.retain(|assoc| assoc.handle != handle);
    }

    fn remove_all_samplers(&mut self) {
        self.samplers.clear();
    }

    fn set_binning_policy(&mut self, policy: BinningPolicy, bin_dt: Time) {
        for binner in &mut self.binners {
            *binner = EventBinner::new(policy, bin_dt);
        }
    }
}

impl std::fmt::Debug for CableCellGroup {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("CableCellGroup")
            .field("gids", &self.gids)
            .field("num_cv", &self.state.num_cv())
            .field("mechanisms", &self.mechanisms.len())
            .finish()
    }
}
