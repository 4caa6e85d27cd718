use std::env;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};

use fascicle::cable_cell::{CableCell, CableParams, CvPolicy, Decor, MechanismDesc, Region};
use fascicle::context::Context;
use fascicle::generator::EventGenerator;
use fascicle::load_balance::partition_load_balance;
use fascicle::morphology::{Location, Morphology, Point, SegmentTree};
use fascicle::params::{PartitionHint, PartitionHintMap, TechnicalParams};
use fascicle::recipe::{CellDescription, CellKind, ConnectionDesc, Recipe};
use fascicle::types::{Gid, Spike};
use fascicle::Simulation;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct BenchmarkParams {
    num_cells: usize,
    /// Synaptic weight around the ring, µS.
    weight: f32,
    /// Ring propagation delay, ms.
    delay: f64,
    t_final: f64,
    dt: f64,
    group_size: usize,
    technical_params: TechnicalParams,
}

fn default_params_yaml() -> &'static str {
    r#"
    num_cells: 200
    weight: 0.05
    delay: 5.0
    t_final: 500.0
    dt: 0.025
    group_size: 16
    technical_params:
      num_threads: null
      pin_threads: false
      check_finite: false
    "#
}

/// Ring of soma-and-dendrite cable cells; cell 0 is kicked once at 1 ms
/// and the spike travels around the ring indefinitely.
struct RingRecipe {
    params: BenchmarkParams,
}

impl RingRecipe {
    fn cable_cell(&self) -> CableCell {
        let mut tree = SegmentTree::new();
        let soma = tree
            .append(
                None,
                Point::new(0.0, 0.0, 0.0, 6.3),
                Point::new(12.6, 0.0, 0.0, 6.3),
                1,
            )
            .unwrap();
        tree.append_continuation(soma, Point::new(212.6, 0.0, 0.0, 0.5), 3)
            .unwrap();

        let decor = Decor::new()
            .set_defaults(CableParams {
                v_init: -65.0,
                cm: 0.01,
                rl: 100.0,
            })
            .paint(Region::Tag(1), MechanismDesc::new("hh"))
            .paint(
                Region::Tag(3),
                MechanismDesc::new("pas").with("e", -65.0),
            )
            .place_synapse(Location::new(0, 1.0), MechanismDesc::new("expsyn"), "syn")
            .place_detector(Location::new(0, 0.0), -10.0, "det");

        CableCell::new(
            Morphology::new(tree).unwrap(),
            decor,
            CvPolicy::FixedPerBranch(4),
        )
    }
}

impl Recipe for RingRecipe {
    fn num_cells(&self) -> usize {
        self.params.num_cells
    }

    fn cell_kind(&self, _gid: Gid) -> CellKind {
        CellKind::Cable
    }

    fn cell_description(&self, _gid: Gid) -> CellDescription {
        CellDescription::Cable(Box::new(self.cable_cell()))
    }

    fn connections_on(&self, gid: Gid) -> Vec<ConnectionDesc> {
        let n = self.params.num_cells as Gid;
        let prev = (gid + n - 1) % n;
        vec![ConnectionDesc::new(
            prev,
            "det",
            "syn",
            self.params.weight,
            self.params.delay,
        )]
    }

    fn event_generators(&self, gid: Gid) -> Vec<EventGenerator> {
        if gid == 0 {
            vec![EventGenerator::explicit(vec![
                fascicle::generator::LabeledEvent::new("syn", 1.0, 0.1),
            ])]
        } else {
            Vec::new()
        }
    }
}

fn main() {
    let params: BenchmarkParams = match env::args().nth(1) {
        Some(path) => {
            let text = std::fs::read_to_string(&path)
                .unwrap_or_else(|e| panic!("cannot read {path}: {e}"));
            serde_yaml::from_str(&text).expect("invalid benchmark parameters")
        }
        None => serde_yaml::from_str(default_params_yaml()).unwrap(),
    };

    let context = Context::local(&params.technical_params).expect("context");
    let recipe = RingRecipe {
        params: params.clone(),
    };

    let mut hints = PartitionHintMap::default();
    hints.insert(
        CellKind::Cable,
        PartitionHint {
            cpu_group_size: params.group_size,
            ..PartitionHint::default()
        },
    );

    let setup_start = Instant::now();
    let decomposition = partition_load_balance(&recipe, &context, &hints).expect("load balance");
    let mut sim = Simulation::new(&recipe, &context, &decomposition).expect("simulation");
    let setup_elapsed = setup_start.elapsed();

    let spike_count = Arc::new(AtomicU64::new(0));
    let counter = spike_count.clone();
    sim.set_global_spike_callback(Box::new(move |spikes: &[Spike]| {
        counter.fetch_add(spikes.len() as u64, Ordering::Relaxed);
    }));

    let run_start = Instant::now();
    let t_end = sim.run(params.t_final, params.dt).expect("run");
    let run_elapsed = run_start.elapsed();

    println!(
        "cells:        {} in {} groups",
        params.num_cells,
        sim.num_groups()
    );
    println!("setup:        {:.3} s", setup_elapsed.as_secs_f64());
    println!(
        "run:          {:.3} s for {t_end} ms simulated",
        run_elapsed.as_secs_f64()
    );
    println!("spikes:       {}", spike_count.load(Ordering::Relaxed));
    println!(
        "throughput:   {:.1} ms/s",
        t_end / run_elapsed.as_secs_f64()
    );
}
