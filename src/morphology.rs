use serde::{Deserialize, Serialize};

use crate::error::{Result, SimulationError};
use crate::types::Gid;

/// Sample point on the cell surface: position in µm plus local radius.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub radius: f64,
}

impl Point {
    pub fn new(x: f64, y: f64, z: f64, radius: f64) -> Self {
        Self { x, y, z, radius }
    }

    pub fn distance(&self, other: &Point) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        let dz = self.z - other.z;
        (dx * dx + dy * dy + dz * dz).sqrt()
    }
}

/// A conical frustum between two sample points, tagged with a user region
/// code (soma, dendrite, axon, ...).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub prox: Point,
    pub dist: Point,
    pub tag: i32,
}

impl Segment {
    pub fn length(&self) -> f64 {
        self.prox.distance(&self.dist)
    }
}

/// Morphology as an ordered list of segments in topological order: the
/// parent of segment s has index < s, roots have no parent.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SegmentTree {
    segments: Vec<Segment>,
    parents: Vec<Option<usize>>,
}

impl SegmentTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(
        &mut self,
        parent: Option<usize>,
        prox: Point,
        dist: Point,
        tag: i32,
    ) -> Result<usize> {
        if let Some(p) = parent {
            if p >= self.segments.len() {
                return Err(SimulationError::BadTopology {
                    gid: 0,
                    what: format!(
                        "segment parent {p} not below child {}",
                        self.segments.len()
                    ),
                });
            }
        }
        self.segments.push(Segment { prox, dist, tag });
        self.parents.push(parent);
        Ok(self.segments.len() - 1)
    }

    /// Append continuing from the distal end of `parent`.
    pub fn append_continuation(&mut self, parent: usize, dist: Point, tag: i32) -> Result<usize> {
        let prox = self
            .segments
            .get(parent)
            .ok_or_else(|| SimulationError::BadTopology {
                gid: 0,
                what: format!("no segment {parent} to continue from"),
            })?
            .dist;
        self.append(Some(parent), prox, dist, tag)
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn parents(&self) -> &[Option<usize>] {
        &self.parents
    }
}

/// A segment tree decomposed into branches: maximal unbranched runs of
/// segments. Branch order follows the first segment of each run, so branch
/// parents also precede their children.
#[derive(Debug, Clone, PartialEq)]
pub struct Morphology {
    tree: SegmentTree,
    /// Segment indices of each branch, proximal to distal.
    branch_segments: Vec<Vec<usize>>,
    branch_parents: Vec<Option<usize>>,
    segment_branch: Vec<usize>,
}

impl Morphology {
    pub fn new(tree: SegmentTree) -> Result<Self> {
        let n = tree.len();
        let mut child_count = vec![0usize; n];
        for parent in tree.parents().iter().flatten() {
            child_count[*parent] += 1;
        }

        let mut branch_segments: Vec<Vec<usize>> = Vec::new();
        let mut branch_parents: Vec<Option<usize>> = Vec::new();
        let mut segment_branch = vec![usize::MAX; n];

        for seg in 0..n {
            let parent = tree.parents()[seg];
            let starts_branch = match parent {
                None => true,
                Some(p) => child_count[p] != 1,
            };
            if starts_branch {
                let parent_branch = parent.map(|p| segment_branch[p]);
                branch_parents.push(parent_branch);
                branch_segments.push(vec![seg]);
                segment_branch[seg] = branch_segments.len() - 1;
            } else {
                let p = parent.expect("continuation has a parent");
                let branch = segment_branch[p];
                branch_segments[branch].push(seg);
                segment_branch[seg] = branch;
            }
        }

        for (branch, parent) in branch_parents.iter().enumerate() {
            if let Some(p) = *parent {
                if p >= branch {
                    return Err(SimulationError::BadTopology {
                        gid: 0,
                        what: format!("branch parent {p} not below branch {branch}"),
                    });
                }
            }
        }

        Ok(Self {
            tree,
            branch_segments,
            branch_parents,
            segment_branch,
        })
    }

    pub fn num_branches(&self) -> usize {
        self.branch_segments.len()
    }

    pub fn num_segments(&self) -> usize {
        self.tree.len()
    }

    pub fn branch_segments(&self, branch: usize) -> &[usize] {
        &self.branch_segments[branch]
    }

    pub fn branch_parent(&self, branch: usize) -> Option<usize> {
        self.branch_parents[branch]
    }

    pub fn segment(&self, index: usize) -> &Segment {
        &self.tree.segments()[index]
    }

    pub fn segment_branch(&self, index: usize) -> usize {
        self.segment_branch[index]
    }

    pub fn tree(&self) -> &SegmentTree {
        &self.tree
    }
}

/// A point on a branch: relative position in [0, 1] of branch arc length.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub branch: usize,
    pub pos: f64,
}

impl Location {
    pub fn new(branch: usize, pos: f64) -> Self {
        debug_assert!((0.0..=1.0).contains(&pos));
        Self { branch, pos }
    }
}

/// An unbranched sub-region of one branch, [prox_pos, dist_pos] relative.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Cable {
    pub branch: usize,
    pub prox_pos: f64,
    pub dist_pos: f64,
}

impl Cable {
    pub fn new(branch: usize, prox_pos: f64, dist_pos: f64) -> Self {
        debug_assert!(prox_pos <= dist_pos);
        Self {
            branch,
            prox_pos,
            dist_pos,
        }
    }

    pub fn whole(branch: usize) -> Self {
        Self::new(branch, 0.0, 1.0)
    }

    pub fn contains(&self, loc: Location) -> bool {
        loc.branch == self.branch && loc.pos >= self.prox_pos && loc.pos <= self.dist_pos
    }
}

pub(crate) fn retag_topology_error(err: SimulationError, gid: Gid) -> SimulationError {
    match err {
        SimulationError::BadTopology { what, .. } => SimulationError::BadTopology { gid, what },
        SimulationError::BadDiscretization { what, .. } => {
            SimulationError::BadDiscretization { gid, what }
        }
        other => other,
    }
}
