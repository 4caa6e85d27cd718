use crate::morphology::{Cable, Location, Morphology};

/// One linear-radius piece of a branch: arc-length interval [x0, x1] with
/// radii r0 at x0 and r1 at x1.
#[derive(Debug, Clone, Copy)]
struct Piece {
    x0: f64,
    x1: f64,
    r0: f64,
    r1: f64,
}

impl Piece {
    fn radius_at(&self, x: f64) -> f64 {
        if self.x1 == self.x0 {
            return self.r0;
        }
        let s = (x - self.x0) / (self.x1 - self.x0);
        self.r0 + s * (self.r1 - self.r0)
    }
}

/// Embedding of a morphology as a 1-d tree with piecewise linear radius.
/// Length, membrane area and inverse cross-sectional area integrals over
/// cables are closed-form on each piece.
#[derive(Debug, Clone)]
pub struct EmbedPwlin {
    branches: Vec<Vec<Piece>>,
    lengths: Vec<f64>,
    /// Per segment: owning branch and its [x0, x1] arc-length interval.
    segment_extents: Vec<(usize, f64, f64)>,
}

impl EmbedPwlin {
    pub fn new(morph: &Morphology) -> Self {
        let mut branches = Vec::with_capacity(morph.num_branches());
        let mut lengths = Vec::with_capacity(morph.num_branches());
        let mut segment_extents = vec![(0, 0.0, 0.0); morph.num_segments()];

        for branch in 0..morph.num_branches() {
            let mut pieces = Vec::new();
            let mut x = 0.0;
            for &seg in morph.branch_segments(branch) {
                let segment = morph.segment(seg);
                let len = segment.length();
                pieces.push(Piece {
                    x0: x,
                    x1: x + len,
                    r0: segment.prox.radius,
                    r1: segment.dist.radius,
                });
                segment_extents[seg] = (branch, x, x + len);
                x += len;
            }
            branches.push(pieces);
            lengths.push(x);
        }

        Self {
            branches,
            lengths,
            segment_extents,
        }
    }

    pub fn branch_length(&self, branch: usize) -> f64 {
        self.lengths[branch]
    }

    /// The cable a segment occupies on its branch.
    pub fn segment_cable(&self, segment: usize) -> Cable {
        let (branch, x0, x1) = self.segment_extents[segment];
        let length = self.lengths[branch];
        if length == 0.0 {
            return Cable::new(branch, 0.0, 0.0);
        }
        Cable::new(branch, x0 / length, x1 / length)
    }

    pub fn radius(&self, loc: Location) -> f64 {
        let x = loc.pos * self.lengths[loc.branch];
        let pieces = &self.branches[loc.branch];
        for piece in pieces {
            if x <= piece.x1 {
                return piece.radius_at(x);
            }
        }
        pieces.last().map_or(0.0, |p| p.r1)
    }

    /// Centerline length of a cable, µm.
    pub fn integrate_length(&self, cable: Cable) -> f64 {
        (cable.dist_pos - cable.prox_pos) * self.lengths[cable.branch]
    }

    /// Membrane (lateral frustum) area of a cable, µm².
    pub fn integrate_area(&self, cable: Cable) -> f64 {
        self.integrate(cable, |dx, ra, rb| {
            let dr = rb - ra;
            std::f64::consts::PI * (ra + rb) * (dx * dx + dr * dr).sqrt()
        })
    }

    /// ∫ dx / (π r²) over a cable, µm⁻¹; exact for linear radius.
    pub fn integrate_ixa(&self, cable: Cable) -> f64 {
        self.integrate(cable, |dx, ra, rb| dx / (std::f64::consts::PI * ra * rb))
    }

    fn integrate(&self, cable: Cable, piece_value: impl Fn(f64, f64, f64) -> f64) -> f64 {
        let length = self.lengths[cable.branch];
        let a = cable.prox_pos * length;
        let b = cable.dist_pos * length;
        let mut total = 0.0;
        for piece in &self.branches[cable.branch] {
            let lo = piece.x0.max(a);
            let hi = piece.x1.min(b);
            if lo < hi {
                let ra = piece.radius_at(lo);
                let rb = piece.radius_at(hi);
                total += piece_value(hi - lo, ra, rb);
            }
        }
        total
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::morphology::{Morphology, Point, SegmentTree};
    use float_cmp::assert_approx_eq;
    use std::f64::consts::PI;

    fn p(x: f64, r: f64) -> Point {
        Point::new(x, 0.0, 0.0, r)
    }

    fn cylinder(length: f64, radius: f64) -> EmbedPwlin {
        let mut tree = SegmentTree::new();
        tree.append(None, p(0.0, radius), p(length, radius), 1)
            .unwrap();
        EmbedPwlin::new(&Morphology::new(tree).unwrap())
    }

    #[test]
    fn cylinder_integrals() {
        let embed = cylinder(100.0, 2.0);
        let all = Cable::whole(0);
        assert_approx_eq!(f64, embed.branch_length(0), 100.0);
        assert_approx_eq!(f64, embed.integrate_length(all), 100.0);
        assert_approx_eq!(f64, embed.integrate_area(all), 2.0 * PI * 2.0 * 100.0);
        assert_approx_eq!(f64, embed.integrate_ixa(all), 100.0 / (PI * 4.0));
    }

    #[test]
    fn half_cable_halves_integrals() {
        let embed = cylinder(100.0, 2.0);
        let half = Cable::new(0, 0.25, 0.75);
        assert_approx_eq!(f64, embed.integrate_length(half), 50.0);
        assert_approx_eq!(f64, embed.integrate_area(half), 2.0 * PI * 2.0 * 50.0);
        assert_approx_eq!(f64, embed.integrate_ixa(half), 50.0 / (PI * 4.0));
    }

    #[test]
    fn taper_uses_frustum_area_and_exact_ixa() {
        let mut tree = SegmentTree::new();
        tree.append(None, p(0.0, 2.0), p(30.0, 1.0), 1).unwrap();
        let embed = EmbedPwlin::new(&Morphology::new(tree).unwrap());
        let all = Cable::whole(0);

        let slant = (30.0f64 * 30.0 + 1.0).sqrt();
        assert_approx_eq!(f64, embed.integrate_area(all), PI * 3.0 * slant);
        assert_approx_eq!(f64, embed.integrate_ixa(all), 30.0 / (PI * 2.0 * 1.0));

        assert_approx_eq!(f64, embed.radius(Location::new(0, 0.0)), 2.0);
        assert_approx_eq!(f64, embed.radius(Location::new(0, 0.5)), 1.5);
        assert_approx_eq!(f64, embed.radius(Location::new(0, 1.0)), 1.0);
    }

    #[test]
    fn multi_segment_branch_accumulates() {
        let mut tree = SegmentTree::new();
        let a = tree.append(None, p(0.0, 1.0), p(10.0, 1.0), 1).unwrap();
        tree.append_continuation(a, p(30.0, 1.0), 1).unwrap();
        let embed = EmbedPwlin::new(&Morphology::new(tree).unwrap());
        assert_approx_eq!(f64, embed.branch_length(0), 30.0);
        assert_approx_eq!(
            f64,
            embed.integrate_area(Cable::whole(0)),
            2.0 * PI * 30.0
        );
    }
}
