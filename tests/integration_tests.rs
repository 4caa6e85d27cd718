use std::sync::{Arc, Mutex};

use float_cmp::assert_approx_eq;
use itertools::assert_equal;

use fascicle::cable_cell::{CableCell, CableParams, CvPolicy, Decor, LifCell, MechanismDesc, Region};
use fascicle::context::Context;
use fascicle::distributed::{DistributedContext, DryRunContext, GatheredVector};
use fascicle::generator::{EventGenerator, LabeledEvent};
use fascicle::label::LabeledRanges;
use fascicle::load_balance::partition_load_balance;
use fascicle::morphology::{Location, Morphology, Point, SegmentTree};
use fascicle::params::{PartitionHint, PartitionHintMap, TechnicalParams};
use fascicle::probe::{ProbeAddress, ProbeKind, ProbeMetadata, ProbeSelector, Sample};
use fascicle::recipe::{
    CellDescription, CellKind, ConnectionDesc, GapJunctionDesc, Recipe,
};
use fascicle::schedule::Schedule;
use fascicle::types::{Gid, Spike, Time};
use fascicle::Simulation;

fn context(threads: usize) -> Context {
    Context::local(&TechnicalParams {
        num_threads: Some(threads),
        pin_threads: false,
        check_finite: true,
    })
    .unwrap()
}

fn simulation(recipe: &dyn Recipe, ctx: &Context) -> Simulation {
    let decomposition = partition_load_balance(recipe, ctx, &PartitionHintMap::default()).unwrap();
    Simulation::new(recipe, ctx, &decomposition).unwrap()
}

fn collect_global_spikes(sim: &mut Simulation) -> Arc<Mutex<Vec<Spike>>> {
    let spikes = Arc::new(Mutex::new(Vec::new()));
    let sink = spikes.clone();
    sim.set_global_spike_callback(Box::new(move |batch: &[Spike]| {
        sink.lock().unwrap().extend_from_slice(batch);
    }));
    spikes
}

/// Soma-only cable cell with a passive membrane, one expsyn and one
/// detector; membrane time constant 1 ms.
fn soma_cell(threshold: f64) -> CableCell {
    let mut tree = SegmentTree::new();
    tree.append(
        None,
        Point::new(0.0, 0.0, 0.0, 10.0),
        Point::new(20.0, 0.0, 0.0, 10.0),
        1,
    )
    .unwrap();
    let decor = Decor::new()
        .set_defaults(CableParams {
            v_init: -65.0,
            cm: 0.01,
            rl: 100.0,
        })
        .paint(Region::All, MechanismDesc::new("pas").with("e", -65.0))
        .place_synapse(Location::new(0, 0.5), MechanismDesc::new("expsyn"), "syn")
        .place_detector(Location::new(0, 0.5), threshold, "det");
    CableCell::new(
        Morphology::new(tree).unwrap(),
        decor,
        CvPolicy::FixedPerBranch(1),
    )
}

/// Scenario: two cable cells, a single connection 0 → 1 with 5 ms delay,
/// and one excitatory kick on cell 0 at 1 ms.
struct TwoCellRing;

impl Recipe for TwoCellRing {
    fn num_cells(&self) -> usize {
        2
    }

    fn cell_kind(&self, _gid: Gid) -> CellKind {
        CellKind::Cable
    }

    fn cell_description(&self, _gid: Gid) -> CellDescription {
        CellDescription::Cable(Box::new(soma_cell(-10.0)))
    }

    fn connections_on(&self, gid: Gid) -> Vec<ConnectionDesc> {
        if gid == 1 {
            vec![ConnectionDesc::new(0, "det", "syn", 0.05, 5.0)]
        } else {
            Vec::new()
        }
    }

    fn num_probes(&self, gid: Gid) -> usize {
        usize::from(gid == 1)
    }

    fn get_probe(&self, address: ProbeAddress) -> Option<ProbeKind> {
        (address.gid == 1 && address.index == 0).then(|| ProbeKind::MembraneVoltage {
            location: Location::new(0, 0.5),
        })
    }

    fn event_generators(&self, gid: Gid) -> Vec<EventGenerator> {
        if gid == 0 {
            vec![EventGenerator::explicit(vec![LabeledEvent::new(
                "syn", 1.0, 0.1,
            )])]
        } else {
            Vec::new()
        }
    }
}

#[test]
fn two_cell_ring_single_spike() {
    let ctx = context(2);
    let mut sim = simulation(&TwoCellRing, &ctx);
    let spikes = collect_global_spikes(&mut sim);

    let samples: Arc<Mutex<Vec<Sample>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = samples.clone();
    sim.add_sampler(
        ProbeSelector::All,
        Schedule::regular(0.0, 0.1, f64::MAX),
        move |_meta: &ProbeMetadata, batch: &[Sample]| {
            sink.lock().unwrap().extend_from_slice(batch);
        },
    );

    sim.run(20.0, 0.025).unwrap();

    // Cell 0 spikes exactly once, shortly after the 1 ms kick.
    let spikes = spikes.lock().unwrap();
    assert_eq!(spikes.len(), 1);
    let spike = spikes[0];
    assert_eq!(spike.source.gid, 0);
    assert!(spike.time > 1.0 && spike.time < 2.0, "spike at {}", spike.time);

    // Cell 1 receives the event one delay later and never fires; before the
    // arrival it sits at rest.
    let arrival = spike.time + 5.0;
    let samples = samples.lock().unwrap();
    assert!(!samples.is_empty());
    for sample in samples.iter() {
        if sample.time < arrival {
            assert_approx_eq!(f64, sample.value, -65.0, epsilon = 1e-6);
        }
    }
    assert!(
        samples
            .iter()
            .any(|s| s.time > arrival && s.value > -60.0),
        "cell 1 never saw the delayed event"
    );
}

#[test]
fn dry_run_replication_matches_tile_offsets() {
    use fascicle::types::CellMember;

    let ctx = DryRunContext::new(4, 10);
    let local = vec![Spike::new(CellMember::new(3, 0), 1.0)];
    let gathered = ctx.gather_spikes(&local).unwrap();

    assert_eq!(gathered.len(), 4);
    assert_eq!(gathered.partition(), &[0, 1, 2, 3, 4]);
    assert_equal(gathered.values().iter().map(|s| s.source.gid), [3, 13, 23, 33]);
    assert!(gathered.values().iter().all(|s| s.time == 1.0));
}

/// Scenario: one soma with an expsyn; the sampled conductance follows
/// 0.01·exp(−(t−1)/2) after a 0.01 µS event at 1 ms.
struct SingleSomaExpSyn;

impl Recipe for SingleSomaExpSyn {
    fn num_cells(&self) -> usize {
        1
    }

    fn cell_kind(&self, _gid: Gid) -> CellKind {
        CellKind::Cable
    }

    fn cell_description(&self, _gid: Gid) -> CellDescription {
        CellDescription::Cable(Box::new(soma_cell(20.0)))
    }

    fn num_probes(&self, _gid: Gid) -> usize {
        1
    }

    fn get_probe(&self, address: ProbeAddress) -> Option<ProbeKind> {
        (address.index == 0).then(|| ProbeKind::PointState {
            target: 0,
            mechanism: "expsyn".into(),
            state: "g".into(),
        })
    }

    fn event_generators(&self, _gid: Gid) -> Vec<EventGenerator> {
        vec![EventGenerator::explicit(vec![LabeledEvent::new(
            "syn", 1.0, 0.01,
        )])]
    }
}

#[test]
fn single_soma_expsyn_conductance() {
    let ctx = context(1);
    let mut sim = simulation(&SingleSomaExpSyn, &ctx);

    let samples: Arc<Mutex<Vec<Sample>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = samples.clone();
    sim.add_sampler(
        ProbeSelector::One(ProbeAddress::new(0, 0)),
        Schedule::regular(0.0, 0.25, f64::MAX),
        move |_meta: &ProbeMetadata, batch: &[Sample]| {
            sink.lock().unwrap().extend_from_slice(batch);
        },
    );

    sim.run(6.0, 0.025).unwrap();

    let samples = samples.lock().unwrap();
    assert!(samples.len() >= 20);
    for sample in samples.iter() {
        let expected = if sample.time < 1.0 {
            0.0
        } else {
            0.01 * (-(sample.time - 1.0) / 2.0).exp()
        };
        assert_approx_eq!(f64, sample.value, expected, epsilon = 1e-6);
    }
}

/// A ring of LIF cells where every spike reliably triggers the successor
/// one delay later.
struct LifRing {
    num_cells: usize,
    delay: Time,
}

impl Recipe for LifRing {
    fn num_cells(&self) -> usize {
        self.num_cells
    }

    fn cell_kind(&self, _gid: Gid) -> CellKind {
        CellKind::Lif
    }

    fn cell_description(&self, _gid: Gid) -> CellDescription {
        CellDescription::Lif(LifCell {
            tau_m: 10.0,
            e_l: -65.0,
            v_thresh: -50.0,
            t_ref: self.delay / 2.0,
            c_m: 10.0,
        })
    }

    fn connections_on(&self, gid: Gid) -> Vec<ConnectionDesc> {
        let n = self.num_cells as Gid;
        let prev = (gid + n - 1) % n;
        // 0.2 µS-weight → 20 mV jump: always superthreshold.
        vec![ConnectionDesc::new(prev, "src", "tgt", 0.2, self.delay)]
    }

    fn event_generators(&self, gid: Gid) -> Vec<EventGenerator> {
        if gid == 0 {
            vec![EventGenerator::explicit(vec![LabeledEvent::new(
                "tgt", 0.9, 0.2,
            )])]
        } else {
            Vec::new()
        }
    }
}

#[test]
fn lif_ring_spikes_follow_connection_delays() {
    let recipe = LifRing {
        num_cells: 3,
        delay: 2.0,
    };
    let ctx = context(2);
    let mut sim = simulation(&recipe, &ctx);
    assert_approx_eq!(f64, sim.epoch_interval(), 1.0);

    let spikes = collect_global_spikes(&mut sim);
    sim.run(10.0, 0.025).unwrap();

    let mut spikes = spikes.lock().unwrap().clone();
    spikes.sort_by(|a, b| a.time.total_cmp(&b.time));
    assert!(spikes.len() >= 4);

    // Kick at 0.9 → cell 0 fires at 0.9, then the ring advances one cell
    // per 2 ms delay.
    for (k, spike) in spikes.iter().enumerate() {
        assert_approx_eq!(f64, spike.time, 0.9 + 2.0 * k as f64, epsilon = 1e-9);
        assert_eq!(spike.source.gid, (k % 3) as Gid);
        // Every delivered spike lands at least one full delay after its
        // source spike and never inside the epoch that produced it.
        if k > 0 {
            assert!(spike.time >= spikes[k - 1].time + 2.0 - 1e-9);
        }
    }
}

/// Epoch-boundary safety: with min_delay = 2 ms the epoch interval is 1 ms;
/// a spike at 0.9 ms must not be delivered before epoch 1 starts.
#[test]
fn epoch_boundary_respects_delay_floor() {
    let recipe = LifRing {
        num_cells: 2,
        delay: 2.0,
    };
    let ctx = context(2);
    let mut sim = simulation(&recipe, &ctx);
    assert_approx_eq!(f64, sim.epoch_interval(), 1.0);

    let spikes = collect_global_spikes(&mut sim);
    sim.run(4.0, 0.025).unwrap();

    let spikes = spikes.lock().unwrap();
    // Cell 0 fires at 0.9 (epoch 0); cell 1's induced spike fires at 2.9,
    // inside epoch 2 — one full delay later, after the exchange of epoch 1.
    let cell1: Vec<&Spike> = spikes.iter().filter(|s| s.source.gid == 1).collect();
    assert_eq!(cell1.len(), 1);
    assert_approx_eq!(f64, cell1[0].time, 2.9, epsilon = 1e-9);
    assert!(cell1[0].time >= 2.0, "delivered before the delay floor");
}

/// Dry-run end-to-end: a 4-cell LIF ring simulated as 2 replicated tiles
/// of 2 cells behaves like the full ring.
#[test]
fn dry_run_ring_propagates_across_tiles() {
    let recipe = LifRing {
        num_cells: 4,
        delay: 2.0,
    };
    let params = TechnicalParams {
        num_threads: Some(2),
        pin_threads: false,
        check_finite: false,
    };
    let ctx = Context::with_distributed(&params, Arc::new(DryRunContext::new(2, 2))).unwrap();

    let decomposition =
        partition_load_balance(&recipe, &ctx, &PartitionHintMap::default()).unwrap();
    assert_eq!(decomposition.num_domains, 2);
    assert_equal(decomposition.local_gids(), [0, 1]);

    let mut sim = Simulation::new(&recipe, &ctx, &decomposition).unwrap();
    let spikes = collect_global_spikes(&mut sim);
    sim.run(10.0, 0.025).unwrap();

    // The gathered view holds each local spike plus its tile replica, so
    // spikes arrive in pairs: {0, 2} at 0.9, {1, 3} at 2.9, {0, 2} at 4.9…
    let mut spikes = spikes.lock().unwrap().clone();
    spikes.sort_by(|a, b| {
        a.time
            .total_cmp(&b.time)
            .then_with(|| a.source.cmp(&b.source))
    });
    assert!(spikes.len() >= 8);
    assert_eq!(spikes.len() % 2, 0);
    for (k, pair) in spikes.chunks(2).enumerate() {
        let t = 0.9 + 2.0 * k as f64;
        assert_approx_eq!(f64, pair[0].time, t, epsilon = 1e-9);
        assert_approx_eq!(f64, pair[1].time, t, epsilon = 1e-9);
        let expected: [Gid; 2] = if k % 2 == 0 { [0, 2] } else { [1, 3] };
        assert_eq!([pair[0].source.gid, pair[1].source.gid], expected);
    }
}

/// Distributed context reporting a fixed rank of a 2-rank world, with a
/// block-partitioned global gid table.
struct TwoRankContext {
    rank: usize,
    blocks: Vec<Vec<Gid>>,
}

impl DistributedContext for TwoRankContext {
    fn id(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.blocks.len()
    }

    fn gather_spikes(&self, local: &[Spike]) -> fascicle::Result<GatheredVector<Spike>> {
        Ok(GatheredVector::new(
            local.to_vec(),
            vec![0, local.len() as u32],
        ))
    }

    fn gather_gids(&self, local: &[Gid]) -> fascicle::Result<GatheredVector<Gid>> {
        let mut values = Vec::new();
        let mut partition = vec![0u32];
        for (rank, block) in self.blocks.iter().enumerate() {
            if rank == self.rank {
                values.extend_from_slice(local);
            } else {
                values.extend_from_slice(block);
            }
            partition.push(values.len() as u32);
        }
        Ok(GatheredVector::new(values, partition))
    }

    fn gather_labeled_ranges(&self, local: &LabeledRanges) -> fascicle::Result<LabeledRanges> {
        Ok(local.clone())
    }

    fn min_time(&self, value: Time) -> fascicle::Result<Time> {
        Ok(value)
    }

    fn max_time(&self, value: Time) -> fascicle::Result<Time> {
        Ok(value)
    }

    fn sum_u64(&self, value: u64) -> fascicle::Result<u64> {
        Ok(value)
    }

    fn gather_u64(&self, value: u64) -> fascicle::Result<Vec<u64>> {
        Ok(vec![value; self.blocks.len()])
    }

    fn barrier(&self) -> fascicle::Result<()> {
        Ok(())
    }

    fn name(&self) -> &'static str {
        "tworank"
    }
}

/// 8 LIF cells with gap-junction pairs {(0,1), (1,2), (5,6)} over 2 ranks.
struct GjRecipe;

impl Recipe for GjRecipe {
    fn num_cells(&self) -> usize {
        8
    }

    fn cell_kind(&self, _gid: Gid) -> CellKind {
        CellKind::Lif
    }

    fn cell_description(&self, _gid: Gid) -> CellDescription {
        CellDescription::Lif(LifCell::default())
    }

    fn gap_junctions_on(&self, gid: Gid) -> Vec<GapJunctionDesc> {
        let pairs = [(0, 1), (1, 2), (5, 6)];
        pairs
            .iter()
            .filter(|(a, b)| *a == gid || *b == gid)
            .map(|(a, b)| {
                let peer = if *a == gid { *b } else { *a };
                GapJunctionDesc::new("gj", peer, "gj", 0.1)
            })
            .collect()
    }
}

#[test]
fn load_balance_keeps_gap_junction_components_whole() {
    let blocks = vec![vec![0, 1, 2, 3], vec![4, 5, 6, 7]];
    let hints = {
        let mut hints = PartitionHintMap::default();
        hints.insert(
            CellKind::Lif,
            PartitionHint {
                cpu_group_size: 2,
                ..PartitionHint::default()
            },
        );
        hints
    };

    // Rank 0 keeps the whole {0, 1, 2} component plus independent cell 3.
    let ctx0 = Context::with_distributed(
        &TechnicalParams::default(),
        Arc::new(TwoRankContext {
            rank: 0,
            blocks: blocks.clone(),
        }),
    )
    .unwrap();
    let decomp0 = partition_load_balance(&GjRecipe, &ctx0, &hints).unwrap();
    let mut local0: Vec<Gid> = decomp0.local_gids().collect();
    local0.sort_unstable();
    assert_equal(local0, [0, 1, 2, 3]);
    let holder = decomp0
        .groups
        .iter()
        .find(|g| g.gids.contains(&0))
        .unwrap();
    assert!(holder.gids.contains(&1) && holder.gids.contains(&2));

    // Rank 1 keeps {5, 6} whole plus independent cells 4 and 7.
    let ctx1 = Context::with_distributed(
        &TechnicalParams::default(),
        Arc::new(TwoRankContext { rank: 1, blocks }),
    )
    .unwrap();
    let decomp1 = partition_load_balance(&GjRecipe, &ctx1, &hints).unwrap();
    let mut local1: Vec<Gid> = decomp1.local_gids().collect();
    local1.sort_unstable();
    assert_equal(local1, [4, 5, 6, 7]);
    let holder = decomp1
        .groups
        .iter()
        .find(|g| g.gids.contains(&5))
        .unwrap();
    assert!(holder.gids.contains(&6));
    assert_eq!(holder.gids.len(), 2);
}

/// A passive cable cell with no input relaxes monotonically onto the leak
/// reversal potential.
struct PassiveDecay;

impl Recipe for PassiveDecay {
    fn num_cells(&self) -> usize {
        1
    }

    fn cell_kind(&self, _gid: Gid) -> CellKind {
        CellKind::Cable
    }

    fn cell_description(&self, _gid: Gid) -> CellDescription {
        let mut tree = SegmentTree::new();
        let soma = tree
            .append(
                None,
                Point::new(0.0, 0.0, 0.0, 10.0),
                Point::new(20.0, 0.0, 0.0, 10.0),
                1,
            )
            .unwrap();
        tree.append_continuation(soma, Point::new(220.0, 0.0, 0.0, 1.0), 3)
            .unwrap();
        let decor = Decor::new()
            .set_defaults(CableParams {
                v_init: -55.0,
                cm: 0.01,
                rl: 100.0,
            })
            .paint(Region::All, MechanismDesc::new("pas").with("e", -70.0));
        CellDescription::Cable(Box::new(CableCell::new(
            Morphology::new(tree).unwrap(),
            decor,
            CvPolicy::FixedPerBranch(4),
        )))
    }

    fn num_probes(&self, _gid: Gid) -> usize {
        1
    }

    fn get_probe(&self, address: ProbeAddress) -> Option<ProbeKind> {
        (address.index == 0).then(|| ProbeKind::MembraneVoltage {
            location: Location::new(0, 0.0),
        })
    }
}

#[test]
fn passive_cell_converges_to_reversal_potential() {
    let ctx = context(1);
    let mut sim = simulation(&PassiveDecay, &ctx);

    let samples: Arc<Mutex<Vec<Sample>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = samples.clone();
    sim.add_sampler(
        ProbeSelector::All,
        Schedule::regular(0.0, 0.5, f64::MAX),
        move |_meta: &ProbeMetadata, batch: &[Sample]| {
            sink.lock().unwrap().extend_from_slice(batch);
        },
    );

    sim.run(30.0, 0.025).unwrap();

    let samples = samples.lock().unwrap();
    assert!(samples.len() > 10);
    for pair in samples.windows(2) {
        assert!(
            pair[1].value <= pair[0].value + 1e-9,
            "voltage not monotone at t = {}",
            pair[1].time
        );
        assert!(pair[1].value >= -70.0 - 1e-6);
    }
    let last = samples.last().unwrap();
    assert_approx_eq!(f64, last.value, -70.0, epsilon = 1e-3);
}

/// Gap-junction coupling pulls two cells of one group towards each other.
struct CoupledPair;

impl CoupledPair {
    fn cell(v_init: f64) -> CableCell {
        let mut tree = SegmentTree::new();
        tree.append(
            None,
            Point::new(0.0, 0.0, 0.0, 10.0),
            Point::new(20.0, 0.0, 0.0, 10.0),
            1,
        )
        .unwrap();
        let decor = Decor::new()
            .set_defaults(CableParams {
                v_init,
                cm: 0.01,
                rl: 100.0,
            })
            .place_gap_junction(Location::new(0, 0.5), "gj");
        CableCell::new(
            Morphology::new(tree).unwrap(),
            decor,
            CvPolicy::FixedPerBranch(1),
        )
    }
}

impl Recipe for CoupledPair {
    fn num_cells(&self) -> usize {
        2
    }

    fn cell_kind(&self, _gid: Gid) -> CellKind {
        CellKind::Cable
    }

    fn cell_description(&self, gid: Gid) -> CellDescription {
        let v_init = if gid == 0 { -50.0 } else { -80.0 };
        CellDescription::Cable(Box::new(Self::cell(v_init)))
    }

    fn gap_junctions_on(&self, gid: Gid) -> Vec<GapJunctionDesc> {
        vec![GapJunctionDesc::new("gj", 1 - gid, "gj", 0.05)]
    }

    fn num_probes(&self, _gid: Gid) -> usize {
        1
    }

    fn get_probe(&self, address: ProbeAddress) -> Option<ProbeKind> {
        (address.index == 0).then(|| ProbeKind::MembraneVoltage {
            location: Location::new(0, 0.5),
        })
    }
}

#[test]
fn gap_junction_equalizes_coupled_cells() {
    let ctx = context(1);
    let mut sim = simulation(&CoupledPair, &ctx);

    let samples: Arc<Mutex<Vec<(Gid, Sample)>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = samples.clone();
    sim.add_sampler(
        ProbeSelector::All,
        Schedule::explicit(vec![25.0]),
        move |meta: &ProbeMetadata, batch: &[Sample]| {
            let mut sink = sink.lock().unwrap();
            for sample in batch {
                sink.push((meta.address.gid, *sample));
            }
        },
    );

    sim.run(30.0, 0.025).unwrap();

    let samples = samples.lock().unwrap();
    assert_eq!(samples.len(), 2);
    let v0 = samples.iter().find(|(gid, _)| *gid == 0).unwrap().1.value;
    let v1 = samples.iter().find(|(gid, _)| *gid == 1).unwrap().1.value;
    // No leak: charge conserves, both relax onto the mean.
    assert_approx_eq!(f64, v0, v1, epsilon = 1e-3);
    assert_approx_eq!(f64, v0, -65.0, epsilon = 0.5);
}
