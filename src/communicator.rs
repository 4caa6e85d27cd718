use std::sync::atomic::{AtomicU64, Ordering};

use crate::connection::Connection;
use crate::distributed::{DistributedContext, GatheredVector};
use crate::error::{Result, SimulationError};
use crate::event::EventLane;
use crate::label::LabelResolver;
use crate::load_balance::DomainDecomposition;
use crate::recipe::Recipe;
use crate::threading::TaskPool;
use crate::types::{CellMember, Spike, Time};

/// Owns the rank's resolved connection table and turns gathered spike
/// vectors into per-group event queues.
///
/// Connections live in one flat vector partitioned by the domain of their
/// source gid (`connection_part` holds the prefix sums) and sorted within
/// each partition by source, so matching against the equally-partitioned,
/// equally-sorted gathered spike vector is a linear merge per domain.
#[derive(Debug)]
pub struct Communicator {
    num_domains: usize,
    num_local_groups: usize,
    connections: Vec<Connection>,
    connection_part: Vec<usize>,
    local_min_delay: Time,
    num_spikes: AtomicU64,
}

impl Communicator {
    pub fn new(
        recipe: &dyn Recipe,
        decomposition: &DomainDecomposition,
        source_resolver: &mut LabelResolver,
        target_resolver: &mut LabelResolver,
    ) -> Result<Self> {
        let num_domains = decomposition.num_domains;
        let mut connections: Vec<Connection> = Vec::new();
        let mut src_counts = vec![0usize; num_domains];
        let mut src_domains: Vec<usize> = Vec::new();
        let mut local_min_delay = f64::MAX;

        for (group_index, group) in decomposition.groups.iter().enumerate() {
            for &gid in &group.gids {
                for desc in recipe.connections_on(gid) {
                    if desc.delay <= 0.0 {
                        return Err(SimulationError::ConnectionDelayViolation {
                            gid,
                            delay: desc.delay,
                            min_delay: 0.0,
                        });
                    }
                    let source_lid = source_resolver.get_lid(
                        desc.source_gid,
                        &desc.source_label,
                        desc.source_policy,
                    )?;
                    let dest_lid =
                        target_resolver.get_lid(gid, &desc.dest_label, desc.dest_policy)?;

                    let src_domain = decomposition.gid_domain(desc.source_gid);
                    src_domains.push(src_domain);
                    src_counts[src_domain] += 1;
                    local_min_delay = local_min_delay.min(desc.delay);

                    connections.push(Connection {
                        source: CellMember::new(desc.source_gid, source_lid),
                        destination: CellMember::new(gid, dest_lid),
                        weight: desc.weight,
                        delay: desc.delay,
                        group_index: group_index as u32,
                    });
                }
            }
        }

        // Scatter into the per-domain partitions, then sort each partition
        // by source.
        let mut connection_part = vec![0usize; num_domains + 1];
        for domain in 0..num_domains {
            connection_part[domain + 1] = connection_part[domain] + src_counts[domain];
        }
        let mut offsets = connection_part.clone();
        let mut partitioned = vec![
            Connection {
                source: CellMember::new(0, 0),
                destination: CellMember::new(0, 0),
                weight: 0.0,
                delay: 0.0,
                group_index: 0,
            };
            connections.len()
        ];
        for (connection, &domain) in connections.iter().zip(&src_domains) {
            partitioned[offsets[domain]] = *connection;
            offsets[domain] += 1;
        }
        for domain in 0..num_domains {
            partitioned[connection_part[domain]..connection_part[domain + 1]]
                .sort_unstable_by_key(Connection::order_key);
        }

        Ok(Self {
            num_domains,
            num_local_groups: decomposition.groups.len(),
            connections: partitioned,
            connection_part,
            local_min_delay,
            num_spikes: AtomicU64::new(0),
        })
    }

    pub fn connections(&self) -> &[Connection] {
        &self.connections
    }

    /// Global minimum connection delay; `f64::MAX` when the network has no
    /// connections anywhere.
    pub fn min_delay(&self, ctx: &dyn DistributedContext) -> Result<Time> {
        ctx.min_time(self.local_min_delay)
    }

    /// Gather this epoch's local spikes from all ranks. The local vector is
    /// sorted by source first so every rank's partition arrives ordered.
    pub fn exchange(
        &self,
        mut local_spikes: Vec<Spike>,
        ctx: &dyn DistributedContext,
    ) -> Result<GatheredVector<Spike>> {
        local_spikes.sort_unstable_by(|a, b| {
            a.source
                .cmp(&b.source)
                .then_with(|| a.time.total_cmp(&b.time))
        });
        let global = ctx.gather_spikes(&local_spikes)?;
        self.num_spikes
            .fetch_add(global.len() as u64, Ordering::Relaxed);
        Ok(global)
    }

    /// Total spikes gathered over the run so far.
    pub fn num_spikes(&self) -> u64 {
        self.num_spikes.load(Ordering::Relaxed)
    }

    pub fn reset(&self) {
        self.num_spikes.store(0, Ordering::Relaxed);
    }

    /// Match every gathered spike against the connection table and build
    /// one event queue per local cell group. Domains are walked in
    /// parallel; within a domain the walk iterates the smaller of the two
    /// sorted sequences and equal-ranges into the larger.
    pub fn make_event_queues(
        &self,
        global_spikes: &GatheredVector<Spike>,
        pool: &TaskPool,
    ) -> Vec<EventLane> {
        let spike_part = global_spikes.partition();
        let per_domain: Vec<Vec<EventLane>> = pool.parallel_map(self.num_domains, |domain| {
            let mut queues = vec![EventLane::new(); self.num_local_groups];
            let cons =
                &self.connections[self.connection_part[domain]..self.connection_part[domain + 1]];
            let spikes = &global_spikes.values()
                [spike_part[domain] as usize..spike_part[domain + 1] as usize];

            if cons.len() < spikes.len() {
                let mut sp = 0;
                for con in cons {
                    while sp < spikes.len() && spikes[sp].source < con.source {
                        sp += 1;
                    }
                    let mut k = sp;
                    while k < spikes.len() && spikes[k].source == con.source {
                        queues[con.group_index as usize].push(con.make_event(&spikes[k]));
                        k += 1;
                    }
                }
            } else {
                let mut cn = 0;
                for spike in spikes {
                    while cn < cons.len() && cons[cn].source < spike.source {
                        cn += 1;
                    }
                    let mut k = cn;
                    while k < cons.len() && cons[k].source == spike.source {
                        queues[cons[k].group_index as usize].push(cons[k].make_event(spike));
                        k += 1;
                    }
                }
            }
            queues
        });

        // Concatenate the per-domain queues per group; the engine sorts
        // during the lane merge.
        let mut queues = vec![EventLane::new(); self.num_local_groups];
        for domain_queues in per_domain {
            for (group, mut events) in domain_queues.into_iter().enumerate() {
                queues[group].append(&mut events);
            }
        }
        queues
    }
}
