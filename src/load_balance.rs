use std::collections::VecDeque;

use log::info;

use crate::backend::Backend;
use crate::context::Context;
use crate::distributed::GatheredVector;
use crate::error::{Result, SimulationError};
use crate::params::{validate_partition_hint, PartitionHint, PartitionHintMap};
use crate::recipe::{CellKind, Recipe};
use crate::types::{Gid, HashMap, HashSet};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupDescription {
    pub kind: CellKind,
    pub gids: Vec<Gid>,
    pub backend: Backend,
}

/// The assignment of cells to groups and groups to this rank.
#[derive(Debug, Clone)]
pub struct DomainDecomposition {
    pub num_domains: usize,
    pub domain_id: usize,
    pub num_local_cells: usize,
    pub num_global_cells: usize,
    pub groups: Vec<GroupDescription>,
    /// Sorted local gids of every rank, for source-domain lookup.
    global_gids: GatheredVector<Gid>,
}

impl DomainDecomposition {
    pub fn single_rank(num_cells: usize, groups: Vec<GroupDescription>) -> Self {
        let gids: Vec<Gid> = (0..num_cells as Gid).collect();
        let num_local: usize = groups.iter().map(|g| g.gids.len()).sum();
        Self {
            num_domains: 1,
            domain_id: 0,
            num_local_cells: num_local,
            num_global_cells: num_cells,
            groups,
            global_gids: GatheredVector::new(gids, vec![0, num_cells as u32]),
        }
    }

    /// The rank owning a gid. Components connected by gap junctions may
    /// migrate off their block, so ownership is answered from the gathered
    /// per-rank gid lists rather than block arithmetic.
    pub fn gid_domain(&self, gid: Gid) -> usize {
        for rank in 0..self.num_domains {
            if self.global_gids.values_for(rank).binary_search(&gid).is_ok() {
                return rank;
            }
        }
        // Unknown gids are treated as foreign to every rank; attribute
        // them to the block owner.
        let n = self.num_global_cells as u64;
        let r = self.num_domains as u64;
        ((gid as u64 * r) / n.max(1)) as usize
    }

    pub fn local_gids(&self) -> impl Iterator<Item = Gid> + '_ {
        self.groups.iter().flat_map(|g| g.gids.iter().copied())
    }
}

fn kind_supported(kind: CellKind, backend: Backend) -> bool {
    match backend {
        Backend::Multicore => true,
        // No cell kind has a GPU implementation in this build.
        Backend::Gpu => {
            let _ = kind;
            false
        }
    }
}

/// Assign cells to groups and groups to ranks.
///
/// Gids are dealt in contiguous blocks, rank r owning [⌊rN/R⌋, ⌊(r+1)N/R⌋).
/// Cells coupled by gap junctions form components that must share a group;
/// a component belongs to the rank owning its least gid.
pub fn partition_load_balance(
    recipe: &dyn Recipe,
    ctx: &Context,
    hints: &PartitionHintMap,
) -> Result<DomainDecomposition> {
    for hint in hints.values() {
        validate_partition_hint(hint)?;
    }

    let num_domains = ctx.distributed.size();
    let domain_id = ctx.distributed.id();
    let num_global_cells = recipe.num_cells();

    let block = |rank: usize| -> Gid { ((rank as u64 * num_global_cells as u64) / num_domains as u64) as Gid };
    let range_begin = block(domain_id);
    let range_end = block(domain_id + 1);

    // Connected components under the gap-junction relation, BFS from every
    // unvisited local gid that has junctions.
    let mut super_cells: Vec<Vec<Gid>> = Vec::new();
    let mut reg_cells: Vec<Gid> = Vec::new();
    let mut visited: HashSet<Gid> = HashSet::default();

    for gid in range_begin..range_end {
        let junctions = recipe.gap_junctions_on(gid);
        if junctions.is_empty() {
            reg_cells.push(gid);
            continue;
        }
        if visited.contains(&gid) {
            continue;
        }
        let mut component = Vec::new();
        let mut queue = VecDeque::new();
        queue.push_back(gid);
        visited.insert(gid);
        while let Some(element) = queue.pop_front() {
            component.push(element);
            for junction in recipe.gap_junctions_on(element) {
                if visited.insert(junction.peer_gid) {
                    queue.push_back(junction.peer_gid);
                }
            }
        }
        component.sort_unstable();
        // A component whose least gid is foreign belongs to that gid's
        // owner; drop it here.
        if component[0] >= range_begin {
            super_cells.push(component);
        }
    }

    // Partition local cells by kind; components are identified by their
    // index into super_cells.
    #[derive(Clone, Copy)]
    enum Entry {
        Cell(Gid),
        Component(usize),
    }

    let mut kind_lists: HashMap<CellKind, Vec<Entry>> = HashMap::default();
    let mut num_local_cells = 0;
    for &gid in &reg_cells {
        kind_lists
            .entry(recipe.cell_kind(gid))
            .or_default()
            .push(Entry::Cell(gid));
        num_local_cells += 1;
    }
    for (index, component) in super_cells.iter().enumerate() {
        let kind = recipe.cell_kind(component[0]);
        for &gid in component {
            if recipe.cell_kind(gid) != kind {
                return Err(SimulationError::MismatchedCellKinds {
                    gid: component[0],
                    peer: gid,
                });
            }
        }
        kind_lists.entry(kind).or_default().push(Entry::Component(index));
        num_local_cells += component.len();
    }

    // Deterministic kind order, GPU-capable kinds first.
    let mut kinds: Vec<CellKind> = kind_lists.keys().copied().collect();
    kinds.sort_by_key(|k| format!("{k:?}"));
    kinds.sort_by_key(|&k| !kind_supported(k, Backend::Gpu));

    let default_hint = PartitionHint::default();
    let mut groups = Vec::new();
    for kind in kinds {
        let hint = hints.get(&kind).unwrap_or(&default_hint);
        let use_gpu = hint.prefer_gpu && ctx.has_gpu && kind_supported(kind, Backend::Gpu);
        let (backend, group_size) = if use_gpu {
            (Backend::Gpu, hint.gpu_group_size)
        } else {
            (Backend::Multicore, hint.cpu_group_size)
        };

        let mut elements: Vec<Gid> = Vec::new();
        for entry in &kind_lists[&kind] {
            match entry {
                Entry::Cell(gid) => elements.push(*gid),
                Entry::Component(index) => {
                    let component = &super_cells[*index];
                    // Keep the component contiguous in one group.
                    if !elements.is_empty() && elements.len() + component.len() > group_size {
                        groups.push(GroupDescription {
                            kind,
                            gids: std::mem::take(&mut elements),
                            backend,
                        });
                    }
                    elements.extend_from_slice(component);
                }
            }
            if elements.len() >= group_size {
                groups.push(GroupDescription {
                    kind,
                    gids: std::mem::take(&mut elements),
                    backend,
                });
            }
        }
        if !elements.is_empty() {
            groups.push(GroupDescription {
                kind,
                gids: elements,
                backend,
            });
        }
    }

    let mut local_gids: Vec<Gid> = groups.iter().flat_map(|g| g.gids.iter().copied()).collect();
    local_gids.sort_unstable();
    let global_gids = ctx.distributed.gather_gids(&local_gids)?;

    info!(
        "domain {domain_id}/{num_domains}: {num_local_cells} cells in {} groups",
        groups.len()
    );

    Ok(DomainDecomposition {
        num_domains,
        domain_id,
        num_local_cells,
        num_global_cells,
        groups,
        global_gids,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cable_cell::LifCell;
    use crate::params::TechnicalParams;
    use crate::recipe::{CellDescription, GapJunctionDesc};

    struct GjRecipe {
        num: usize,
        pairs: Vec<(Gid, Gid)>,
    }

    impl Recipe for GjRecipe {
        fn num_cells(&self) -> usize {
            self.num
        }

        fn cell_kind(&self, _gid: Gid) -> CellKind {
            CellKind::Lif
        }

        fn cell_description(&self, _gid: Gid) -> CellDescription {
            CellDescription::Lif(LifCell::default())
        }

        fn gap_junctions_on(&self, gid: Gid) -> Vec<GapJunctionDesc> {
            self.pairs
                .iter()
                .filter(|(a, b)| *a == gid || *b == gid)
                .map(|(a, b)| {
                    let peer = if *a == gid { *b } else { *a };
                    GapJunctionDesc::new("gj", peer, "gj", 0.1)
                })
                .collect()
        }
    }

    fn local_context() -> Context {
        Context::local(&TechnicalParams::default()).unwrap()
    }

    #[test]
    fn every_gid_in_exactly_one_group() {
        let recipe = GjRecipe {
            num: 8,
            pairs: vec![(0, 1), (1, 2), (5, 6)],
        };
        let ctx = local_context();
        let mut hints = PartitionHintMap::default();
        hints.insert(
            CellKind::Lif,
            PartitionHint {
                cpu_group_size: 2,
                ..PartitionHint::default()
            },
        );

        let decomp = partition_load_balance(&recipe, &ctx, &hints).unwrap();
        let mut seen: Vec<Gid> = decomp.local_gids().collect();
        seen.sort_unstable();
        assert_eq!(seen, (0..8).collect::<Vec<_>>());
        assert_eq!(decomp.num_local_cells, 8);

        // Each junction component is wholly inside one group.
        for component in [vec![0, 1, 2], vec![5, 6]] {
            let holder = decomp
                .groups
                .iter()
                .find(|g| g.gids.contains(&component[0]))
                .unwrap();
            for gid in &component {
                assert!(holder.gids.contains(gid));
            }
        }
    }

    #[test]
    fn group_size_hint_splits_independent_cells() {
        let recipe = GjRecipe {
            num: 10,
            pairs: Vec::new(),
        };
        let ctx = local_context();
        let mut hints = PartitionHintMap::default();
        hints.insert(
            CellKind::Lif,
            PartitionHint {
                cpu_group_size: 4,
                ..PartitionHint::default()
            },
        );

        let decomp = partition_load_balance(&recipe, &ctx, &hints).unwrap();
        let sizes: Vec<usize> = decomp.groups.iter().map(|g| g.gids.len()).collect();
        assert_eq!(sizes, [4, 4, 2]);
        assert!(decomp
            .groups
            .iter()
            .all(|g| g.backend == Backend::Multicore));
    }

    #[test]
    fn mismatched_component_kinds_rejected() {
        struct Mixed;
        impl Recipe for Mixed {
            fn num_cells(&self) -> usize {
                2
            }
            fn cell_kind(&self, gid: Gid) -> CellKind {
                if gid == 0 {
                    CellKind::Lif
                } else {
                    CellKind::SpikeSource
                }
            }
            fn cell_description(&self, _gid: Gid) -> CellDescription {
                CellDescription::Lif(LifCell::default())
            }
            fn gap_junctions_on(&self, gid: Gid) -> Vec<GapJunctionDesc> {
                vec![GapJunctionDesc::new("gj", 1 - gid, "gj", 0.1)]
            }
        }

        let ctx = local_context();
        let err = partition_load_balance(&Mixed, &ctx, &PartitionHintMap::default()).unwrap_err();
        assert!(matches!(err, SimulationError::MismatchedCellKinds { .. }));
    }

    #[test]
    fn gid_domain_uses_gathered_gids() {
        let recipe = GjRecipe {
            num: 4,
            pairs: Vec::new(),
        };
        let ctx = local_context();
        let decomp =
            partition_load_balance(&recipe, &ctx, &PartitionHintMap::default()).unwrap();
        for gid in 0..4 {
            assert_eq!(decomp.gid_domain(gid), 0);
        }
    }
}
