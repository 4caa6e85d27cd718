use crate::backend::NO_PARENT;
use crate::cable_cell::{CableCell, CvPolicy};
use crate::embed::EmbedPwlin;
use crate::error::{Result, SimulationError};
use crate::label::LidRange;
use crate::mechanism::{Catalogue, MechanismKind, MechanismLayout};
use crate::morphology::{retag_topology_error, Cable, Location};
use crate::types::{Gid, HashMap, Lid};

const POS_TOL: f64 = 1e-9;

/// One mechanism of a cell group after discretization: the catalogue name,
/// the slot-to-CV layout, per-slot parameter overrides, and the raw
/// coverage fractions (density only) before unit folding.
#[derive(Debug, Clone)]
pub struct FvmMechanismConfig {
    pub name: String,
    pub kind: MechanismKind,
    pub layout: MechanismLayout,
    /// Sparse per-slot parameter overrides: (slot, param, value).
    pub params: Vec<(u32, String, f64)>,
    /// Fraction of each slot's CV covered, in [0, 1]; density only.
    pub coverage: Vec<f64>,
}

/// Resolution of a synapse lid onto a mechanism instance slot.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TargetHandle {
    pub mechanism: u32,
    pub instance: u32,
}

#[derive(Debug, Clone, Copy)]
pub struct DetectorSpec {
    /// Group-wide CV index.
    pub cv: u32,
    pub threshold: f64,
}

#[derive(Debug, Clone, Default)]
pub struct CellLabels {
    pub targets: Vec<(String, LidRange)>,
    pub sources: Vec<(String, LidRange)>,
    pub gj_sites: Vec<(String, LidRange)>,
}

/// Per-cell side tables of the discretization.
#[derive(Debug, Clone)]
pub struct FvmCellData {
    pub gid: Gid,
    /// Synapse lid → mechanism slot.
    pub targets: Vec<TargetHandle>,
    /// Detector lid → CV and threshold.
    pub detectors: Vec<DetectorSpec>,
    /// Gap-junction site lid → group CV.
    pub gj_sites: Vec<u32>,
    pub labels: CellLabels,
    /// The cable each CV of this cell occupies, with its group CV index.
    pub cv_cables: Vec<(Cable, u32)>,
}

impl FvmCellData {
    pub fn cv_of_location(&self, loc: Location) -> Option<u32> {
        // The distal-most containing CV wins on shared boundaries.
        self.cv_cables
            .iter()
            .rev()
            .find(|(cable, _)| cable.contains(loc))
            .map(|&(_, cv)| cv)
    }
}

/// Group-wide discretization: CV arrays concatenated across cells, one
/// mechanism config per catalogue name, per-cell side tables.
#[derive(Debug, Clone)]
pub struct FvmDiscretization {
    pub parent_cv: Vec<u32>,
    pub cell_cv_divs: Vec<usize>,
    pub cv_capacitance: Vec<f64>,
    pub face_conductance: Vec<f64>,
    pub cv_area: Vec<f64>,
    pub v_init: Vec<f64>,
    pub mechanisms: Vec<FvmMechanismConfig>,
    pub cells: Vec<FvmCellData>,
}

impl FvmDiscretization {
    pub fn num_cv(&self) -> usize {
        self.parent_cv.len()
    }
}

/// CV boundary positions per branch of one cell, per policy, normalized so
/// branch points, segment boundaries (where requested) and region
/// boundaries are boundaries and no interval has zero length.
fn cv_boundaries(
    cell: &CableCell,
    embed: &EmbedPwlin,
    region_edges: &[Vec<f64>],
) -> Result<Vec<Vec<f64>>> {
    let morph = &cell.morphology;
    let mut per_branch: Vec<Vec<f64>> = vec![vec![0.0, 1.0]; morph.num_branches()];

    match &cell.cv_policy {
        CvPolicy::FixedPerBranch(n) => {
            for bounds in per_branch.iter_mut() {
                for k in 1..*n {
                    bounds.push(k as f64 / *n as f64);
                }
            }
        }
        CvPolicy::EverySegment => {
            for seg in 0..morph.num_segments() {
                let cable = embed.segment_cable(seg);
                per_branch[cable.branch].push(cable.prox_pos);
                per_branch[cable.branch].push(cable.dist_pos);
            }
        }
        CvPolicy::Explicit(locations) => {
            for loc in locations {
                per_branch[loc.branch].push(loc.pos);
            }
        }
    }

    for (branch, edges) in region_edges.iter().enumerate() {
        per_branch[branch].extend_from_slice(edges);
    }

    for (branch, bounds) in per_branch.iter_mut().enumerate() {
        if embed.branch_length(branch) == 0.0 {
            return Err(SimulationError::BadDiscretization {
                gid: 0,
                what: format!("branch {branch} has zero length"),
            });
        }
        bounds.sort_by(|a, b| a.total_cmp(b));
        bounds.dedup_by(|a, b| (*a - *b).abs() < POS_TOL);
        // 0 and 1 are always boundaries; pin them back after deduping
        // against near-coincident policy points.
        bounds[0] = 0.0;
        *bounds.last_mut().unwrap() = 1.0;
    }

    Ok(per_branch)
}

/// Boundary positions contributed by painted regions, per branch.
fn region_edges(cell: &CableCell, embed: &EmbedPwlin) -> Vec<Vec<f64>> {
    let morph = &cell.morphology;
    let mut edges = vec![Vec::new(); morph.num_branches()];
    let mut add = |cables: Vec<Cable>| {
        for cable in cables {
            edges[cable.branch].push(cable.prox_pos);
            edges[cable.branch].push(cable.dist_pos);
        }
    };
    for paint in &cell.decor.density_paints {
        add(paint.region.cables(morph, embed));
    }
    for paint in &cell.decor.membrane_paints {
        add(paint.region.cables(morph, embed));
    }
    edges
}

fn overlap(a: Cable, b: Cable) -> Option<Cable> {
    if a.branch != b.branch {
        return None;
    }
    let lo = a.prox_pos.max(b.prox_pos);
    let hi = a.dist_pos.min(b.dist_pos);
    (hi - lo > POS_TOL).then(|| Cable::new(a.branch, lo, hi))
}

struct MechanismAccumulator {
    name: String,
    kind: MechanismKind,
    cv: Vec<u32>,
    weight: Vec<f64>,
    multiplicity: Vec<u32>,
    coverage: Vec<f64>,
    /// Paint identity per slot, for overlap conflict detection and the
    /// sparse parameter list.
    slot_params: Vec<Vec<(String, f64)>>,
    slot_of_cv: HashMap<u32, usize>,
}

impl MechanismAccumulator {
    fn new(name: &str, kind: MechanismKind) -> Self {
        Self {
            name: name.to_string(),
            kind,
            cv: Vec::new(),
            weight: Vec::new(),
            multiplicity: Vec::new(),
            coverage: Vec::new(),
            slot_params: Vec::new(),
            slot_of_cv: HashMap::default(),
        }
    }

    fn add_density(
        &mut self,
        gid: Gid,
        cv: u32,
        weight: f64,
        coverage: f64,
        params: &[(String, f64)],
    ) -> Result<()> {
        if let Some(&slot) = self.slot_of_cv.get(&cv) {
            if self.slot_params[slot] != params {
                return Err(SimulationError::BadDiscretization {
                    gid,
                    what: format!(
                        "conflicting parameters for \"{}\" on overlapping regions",
                        self.name
                    ),
                });
            }
            self.weight[slot] += weight;
            self.coverage[slot] = (self.coverage[slot] + coverage).min(1.0);
            return Ok(());
        }
        let slot = self.cv.len();
        self.slot_of_cv.insert(cv, slot);
        self.cv.push(cv);
        self.weight.push(weight);
        self.coverage.push(coverage);
        self.slot_params.push(params.to_vec());
        Ok(())
    }

    /// Coalesce identical point processes on one CV; returns the slot.
    fn add_point(&mut self, cv: u32, params: &[(String, f64)]) -> usize {
        for slot in 0..self.cv.len() {
            if self.cv[slot] == cv && self.slot_params[slot] == params {
                self.multiplicity[slot] += 1;
                return slot;
            }
        }
        let slot = self.cv.len();
        self.cv.push(cv);
        self.weight.push(1.0);
        self.multiplicity.push(1);
        self.coverage.push(1.0);
        self.slot_params.push(params.to_vec());
        slot
    }

    fn into_config(self) -> FvmMechanismConfig {
        let mut params = Vec::new();
        for (slot, overrides) in self.slot_params.iter().enumerate() {
            for (name, value) in overrides {
                params.push((slot as u32, name.clone(), *value));
            }
        }

        let multiplicity = if self.kind == MechanismKind::Point
            && self.multiplicity.iter().any(|&m| m > 1)
        {
            self.multiplicity
        } else {
            Vec::new()
        };

        FvmMechanismConfig {
            name: self.name,
            kind: self.kind,
            layout: MechanismLayout {
                cv: self.cv,
                weight: self.weight,
                multiplicity,
            },
            params,
            coverage: self.coverage,
        }
    }
}

fn contiguous_label_ranges(labels: &[String]) -> Vec<(String, LidRange)> {
    let mut ranges: Vec<(String, LidRange)> = Vec::new();
    for (lid, label) in labels.iter().enumerate() {
        match ranges.last_mut() {
            Some((last, range)) if last == label && range.end == lid as Lid => {
                range.end += 1;
            }
            _ => ranges.push((
                label.clone(),
                LidRange::new(lid as Lid, lid as Lid + 1),
            )),
        }
    }
    ranges
}

/// Discretize a group of cable cells into the flat CV arrays and mechanism
/// layouts consumed by the backend.
pub fn discretize(cells: &[(Gid, &CableCell)], catalogue: &Catalogue) -> Result<FvmDiscretization> {
    let mut parent_cv = Vec::new();
    let mut cell_cv_divs = vec![0];
    let mut cv_capacitance = Vec::new();
    let mut face_conductance = Vec::new();
    let mut cv_area = Vec::new();
    let mut v_init = Vec::new();
    let mut cell_data = Vec::new();

    let mut accumulators: Vec<MechanismAccumulator> = Vec::new();
    let mut accumulator_of: HashMap<String, usize> = HashMap::default();

    let mech_kind = |name: &str, expect: MechanismKind, gid: Gid| -> Result<MechanismKind> {
        let info = catalogue
            .info(name)
            .ok_or_else(|| SimulationError::BadDiscretization {
                gid,
                what: format!("unknown mechanism \"{name}\""),
            })?;
        if info.kind != expect {
            return Err(SimulationError::BadDiscretization {
                gid,
                what: format!("mechanism \"{name}\" used as {expect:?} but is {:?}", info.kind),
            });
        }
        Ok(info.kind)
    };

    for &(gid, cell) in cells {
        let morph = &cell.morphology;
        let embed = EmbedPwlin::new(morph);
        let defaults = cell.decor.defaults;

        let edges = region_edges(cell, &embed);
        let boundaries =
            cv_boundaries(cell, &embed, &edges).map_err(|e| retag_topology_error(e, gid))?;

        let cv_base = parent_cv.len() as u32;
        let mut cv_cables: Vec<(Cable, u32)> = Vec::new();
        // Last CV of each branch, for child-branch attachment.
        let mut branch_tail: Vec<u32> = Vec::with_capacity(morph.num_branches());

        for branch in 0..morph.num_branches() {
            let bounds = &boundaries[branch];
            for window in bounds.windows(2) {
                let cable = Cable::new(branch, window[0], window[1]);
                let index = parent_cv.len() as u32;

                let parent = if window[0] == bounds[0] {
                    match morph.branch_parent(branch) {
                        Some(pb) => branch_tail[pb],
                        None => NO_PARENT,
                    }
                } else {
                    index - 1
                };
                parent_cv.push(parent);
                cv_cables.push((cable, index));

                let area = embed.integrate_area(cable);
                if area <= 0.0 {
                    return Err(SimulationError::BadDiscretization {
                        gid,
                        what: format!("CV of zero area on branch {branch}"),
                    });
                }
                cv_area.push(area);
                v_init.push(defaults.v_init);

                // Membrane capacitance: last paint covering the CV wins.
                let mut cm = defaults.cm;
                for paint in &cell.decor.membrane_paints {
                    let covered = paint
                        .region
                        .cables(morph, &embed)
                        .iter()
                        .any(|c| overlap(*c, cable).is_some());
                    if covered {
                        cm = paint.cm;
                    }
                }
                cv_capacitance.push(cm * area);

                // Axial conductance to the parent CV: along the path
                // between CV centers, 100/(rL·Σixa) µS.
                let fc = if parent == NO_PARENT {
                    0.0
                } else {
                    let mid = 0.5 * (cable.prox_pos + cable.dist_pos);
                    let mut ixa = embed.integrate_ixa(Cable::new(branch, cable.prox_pos, mid));
                    let (pcable, _) = cv_cables[(parent - cv_base) as usize];
                    let pmid = 0.5 * (pcable.prox_pos + pcable.dist_pos);
                    ixa += embed.integrate_ixa(Cable::new(pcable.branch, pmid, pcable.dist_pos));
                    if ixa <= 0.0 {
                        return Err(SimulationError::BadDiscretization {
                            gid,
                            what: format!("degenerate axial path on branch {branch}"),
                        });
                    }
                    100.0 / (defaults.rl * ixa)
                };
                face_conductance.push(fc);
            }
            branch_tail.push(parent_cv.len() as u32 - 1);
        }

        // Density mechanisms painted on regions.
        for paint in &cell.decor.density_paints {
            mech_kind(&paint.mech.name, MechanismKind::Density, gid)?;
            let index = *accumulator_of
                .entry(paint.mech.name.clone())
                .or_insert_with(|| {
                    accumulators.push(MechanismAccumulator::new(
                        &paint.mech.name,
                        MechanismKind::Density,
                    ));
                    accumulators.len() - 1
                });
            let acc = &mut accumulators[index];

            for region_cable in paint.region.cables(morph, &embed) {
                for &(cable, cv) in &cv_cables {
                    if let Some(covered) = overlap(region_cable, cable) {
                        let covered_area = embed.integrate_area(covered);
                        let total_area = cv_area[cv as usize];
                        // Fold S/cm² → µS: 0.01·area(µm²).
                        acc.add_density(
                            gid,
                            cv,
                            0.01 * covered_area,
                            covered_area / total_area,
                            &paint.mech.params,
                        )?;
                    }
                }
            }
        }

        // Point processes at placed locations, coalesced per (CV, params).
        let mut targets = Vec::with_capacity(cell.decor.synapses.len());
        let mut target_labels = Vec::with_capacity(cell.decor.synapses.len());
        let cell_cv_of = |loc: Location| -> Result<u32> {
            cv_cables
                .iter()
                .rev()
                .find(|(cable, _)| cable.contains(loc))
                .map(|&(_, cv)| cv)
                .ok_or_else(|| SimulationError::BadDiscretization {
                    gid,
                    what: format!("location ({}, {}) outside morphology", loc.branch, loc.pos),
                })
        };

        for placement in &cell.decor.synapses {
            mech_kind(&placement.mech.name, MechanismKind::Point, gid)?;
            let cv = cell_cv_of(placement.location)?;
            let index = *accumulator_of
                .entry(placement.mech.name.clone())
                .or_insert_with(|| {
                    accumulators.push(MechanismAccumulator::new(
                        &placement.mech.name,
                        MechanismKind::Point,
                    ));
                    accumulators.len() - 1
                });
            let slot = accumulators[index].add_point(cv, &placement.mech.params);
            targets.push(TargetHandle {
                mechanism: index as u32,
                instance: slot as u32,
            });
            target_labels.push(placement.label.clone());
        }

        let mut detectors = Vec::with_capacity(cell.decor.detectors.len());
        let mut source_labels = Vec::with_capacity(cell.decor.detectors.len());
        for placement in &cell.decor.detectors {
            detectors.push(DetectorSpec {
                cv: cell_cv_of(placement.location)?,
                threshold: placement.threshold,
            });
            source_labels.push(placement.label.clone());
        }

        let mut gj_sites = Vec::with_capacity(cell.decor.gap_junction_sites.len());
        let mut gj_labels = Vec::with_capacity(cell.decor.gap_junction_sites.len());
        for site in &cell.decor.gap_junction_sites {
            gj_sites.push(cell_cv_of(site.location)?);
            gj_labels.push(site.label.clone());
        }

        cell_cv_divs.push(parent_cv.len());
        cell_data.push(FvmCellData {
            gid,
            targets,
            detectors,
            gj_sites,
            labels: CellLabels {
                targets: contiguous_label_ranges(&target_labels),
                sources: contiguous_label_ranges(&source_labels),
                gj_sites: contiguous_label_ranges(&gj_labels),
            },
            cv_cables,
        });
    }

    let mechanisms = accumulators
        .into_iter()
        .map(MechanismAccumulator::into_config)
        .collect();

    Ok(FvmDiscretization {
        parent_cv,
        cell_cv_divs,
        cv_capacitance,
        face_conductance,
        cv_area,
        v_init,
        mechanisms,
        cells: cell_data,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cable_cell::{CableParams, Decor, MechanismDesc, Region};
    use crate::mechanisms::default_catalogue;
    use crate::morphology::{Morphology, Point, SegmentTree};
    use float_cmp::assert_approx_eq;

    fn p(x: f64, r: f64) -> Point {
        Point::new(x, 0.0, 0.0, r)
    }

    fn soma_dend_cell(policy: CvPolicy) -> CableCell {
        let mut tree = SegmentTree::new();
        let soma = tree.append(None, p(0.0, 3.0), p(10.0, 3.0), 1).unwrap();
        tree.append_continuation(soma, p(110.0, 1.0), 3).unwrap();
        let decor = Decor::new()
            .set_defaults(CableParams {
                v_init: -65.0,
                cm: 0.01,
                rl: 100.0,
            })
            .paint(Region::All, MechanismDesc::new("pas"));
        CableCell::new(Morphology::new(tree).unwrap(), decor, policy)
    }

    #[test]
    fn parent_cv_is_tree_topological() {
        let cell = soma_dend_cell(CvPolicy::FixedPerBranch(4));
        let cat = default_catalogue();
        let fvm = discretize(&[(0, &cell)], &cat).unwrap();

        assert!(fvm.num_cv() >= 4);
        assert_eq!(fvm.parent_cv[0], NO_PARENT);
        for (index, &parent) in fvm.parent_cv.iter().enumerate().skip(1) {
            assert!((parent as usize) < index);
        }
        assert_eq!(fvm.cell_cv_divs, vec![0, fvm.num_cv()]);
    }

    #[test]
    fn every_segment_policy_splits_at_segment_ends() {
        let cell = soma_dend_cell(CvPolicy::EverySegment);
        let cat = default_catalogue();
        let fvm = discretize(&[(0, &cell)], &cat).unwrap();
        // Two segments → two CVs.
        assert_eq!(fvm.num_cv(), 2);
        // Soma CV: cylinder r=3, L=10.
        assert_approx_eq!(
            f64,
            fvm.cv_area[0],
            2.0 * std::f64::consts::PI * 3.0 * 10.0,
            epsilon = 1e-9
        );
        // cm = 0.01 F/m² → pF = 0.01·area.
        assert_approx_eq!(f64, fvm.cv_capacitance[0], 0.01 * fvm.cv_area[0], epsilon = 1e-9);
    }

    #[test]
    fn density_coverage_partitions_to_one() {
        // Two pas paints on disjoint tag regions tile every CV.
        let mut tree = SegmentTree::new();
        let a = tree.append(None, p(0.0, 2.0), p(10.0, 2.0), 1).unwrap();
        tree.append_continuation(a, p(30.0, 2.0), 3).unwrap();
        let decor = Decor::new()
            .paint(Region::Tag(1), MechanismDesc::new("pas").with("e", -70.0))
            .paint(Region::Tag(3), MechanismDesc::new("pas").with("e", -70.0));
        let cell = CableCell::new(
            Morphology::new(tree).unwrap(),
            decor,
            CvPolicy::FixedPerBranch(5),
        );
        let cat = default_catalogue();
        let fvm = discretize(&[(0, &cell)], &cat).unwrap();

        let pas = fvm.mechanisms.iter().find(|m| m.name == "pas").unwrap();
        let mut per_cv = vec![0.0; fvm.num_cv()];
        for (slot, &cv) in pas.layout.cv.iter().enumerate() {
            per_cv[cv as usize] += pas.coverage[slot];
        }
        for (cv, total) in per_cv.iter().enumerate() {
            assert_approx_eq!(f64, *total, 1.0, epsilon = 1e-9);
            let _ = cv;
        }
    }

    #[test]
    fn conflicting_overlapping_density_params_rejected() {
        let mut tree = SegmentTree::new();
        tree.append(None, p(0.0, 2.0), p(10.0, 2.0), 1).unwrap();
        let decor = Decor::new()
            .paint(Region::All, MechanismDesc::new("pas").with("e", -70.0))
            .paint(Region::All, MechanismDesc::new("pas").with("e", -60.0));
        let cell = CableCell::new(
            Morphology::new(tree).unwrap(),
            decor,
            CvPolicy::FixedPerBranch(1),
        );
        let cat = default_catalogue();
        let err = discretize(&[(0, &cell)], &cat).unwrap_err();
        assert!(matches!(err, SimulationError::BadDiscretization { .. }));
    }

    #[test]
    fn point_processes_coalesce_with_multiplicity() {
        let mut tree = SegmentTree::new();
        tree.append(None, p(0.0, 2.0), p(10.0, 2.0), 1).unwrap();
        let decor = Decor::new()
            .place_synapse(Location::new(0, 0.5), MechanismDesc::new("expsyn"), "a")
            .place_synapse(Location::new(0, 0.5), MechanismDesc::new("expsyn"), "a")
            .place_synapse(
                Location::new(0, 0.5),
                MechanismDesc::new("expsyn").with("tau", 5.0),
                "b",
            );
        let cell = CableCell::new(
            Morphology::new(tree).unwrap(),
            decor,
            CvPolicy::FixedPerBranch(1),
        );
        let cat = default_catalogue();
        let fvm = discretize(&[(0, &cell)], &cat).unwrap();

        let syn = fvm.mechanisms.iter().find(|m| m.name == "expsyn").unwrap();
        assert_eq!(syn.layout.width(), 2);
        assert_eq!(syn.layout.multiplicity, vec![2, 1]);

        let cell_data = &fvm.cells[0];
        assert_eq!(cell_data.targets.len(), 3);
        assert_eq!(cell_data.targets[0].instance, cell_data.targets[1].instance);
        assert_ne!(cell_data.targets[0].instance, cell_data.targets[2].instance);

        // Labels: "a" covers lids 0..2, "b" covers 2..3.
        assert_eq!(
            cell_data.labels.targets,
            vec![
                ("a".to_string(), LidRange::new(0, 2)),
                ("b".to_string(), LidRange::new(2, 3)),
            ]
        );
    }

    #[test]
    fn multi_cell_group_concatenates() {
        let cell_a = soma_dend_cell(CvPolicy::FixedPerBranch(2));
        let cell_b = soma_dend_cell(CvPolicy::FixedPerBranch(3));
        let cat = default_catalogue();
        let fvm = discretize(&[(0, &cell_a), (1, &cell_b)], &cat).unwrap();

        assert_eq!(fvm.cell_cv_divs.len(), 3);
        let second_start = fvm.cell_cv_divs[1];
        assert_eq!(fvm.parent_cv[second_start], NO_PARENT);
        assert_eq!(fvm.cells[1].gid, 1);
    }

    #[test]
    fn zero_length_branch_rejected() {
        let mut tree = SegmentTree::new();
        tree.append(None, p(0.0, 2.0), p(0.0, 2.0), 1).unwrap();
        let cell = CableCell::new(
            Morphology::new(tree).unwrap(),
            Decor::new(),
            CvPolicy::FixedPerBranch(1),
        );
        let cat = default_catalogue();
        let err = discretize(&[(5, &cell)], &cat).unwrap_err();
        assert_eq!(
            err,
            SimulationError::BadDiscretization {
                gid: 5,
                what: "branch 0 has zero length".into()
            }
        );
    }

    #[test]
    fn detector_and_probe_cv_resolution() {
        let cell = soma_dend_cell(CvPolicy::FixedPerBranch(4));
        let mut cell = cell;
        cell.decor = cell
            .decor
            .place_detector(Location::new(0, 0.0), -10.0, "det");
        let cat = default_catalogue();
        let fvm = discretize(&[(0, &cell)], &cat).unwrap();

        let data = &fvm.cells[0];
        assert_eq!(data.detectors.len(), 1);
        assert_eq!(data.detectors[0].cv, 0);
        assert_approx_eq!(f64, data.detectors[0].threshold, -10.0);

        assert_eq!(data.cv_of_location(Location::new(0, 0.99)), Some(3));
        assert_eq!(data.cv_of_location(Location::new(7, 0.5)), None);
    }
}
