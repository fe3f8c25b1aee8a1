// src/lattice.rs
//
// Honeycomb site generation with explicit sublattice tagging.
//
// The honeycomb is two interleaved triangular lattices: cell centres at
// i·a1 + j·a2 with a1 = (√3·a, 0) and a2 = (√3·a/2, 3a/2), and the two
// basis sites displaced by ∓(a1 + a2)/6 = ∓(√3·a/4, a/4). With this
// choice the nearest-neighbour distance is exactly `a` and an interior
// A site bonds at angles 30°, 150° and 270°.

use crate::params::ParamError;

/// Which of the two interleaved triangular sublattices a site belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sublattice {
    A,
    B,
}

impl Sublattice {
    pub fn label(&self) -> &'static str {
        match self {
            Self::A => "A",
            Self::B => "B",
        }
    }
}

/// One lattice site: immutable rest position plus sublattice tag.
/// The site id is its index in the flat site vector.
#[derive(Debug, Clone, Copy)]
pub struct Site {
    pub x: f64,
    pub y: f64,
    pub sublattice: Sublattice,
}

impl Site {
    #[inline]
    pub fn distance_to(&self, other: &Site) -> f64 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }
}

/// Immutable 2D site set. Built once, then only read.
#[derive(Debug, Clone)]
pub struct Lattice {
    sites: Vec<Site>,
    spacing: f64,
}

impl Lattice {
    /// Honeycomb patch spanning cells (0..n1) × (0..n2), 2·n1·n2 sites.
    ///
    /// Site order is the full A copy followed by the full B copy, each
    /// in row-major cell order. Membership is tagged on every site, so
    /// nothing downstream should rely on this ordering.
    pub fn honeycomb(n1: usize, n2: usize, a: f64) -> Result<Self, ParamError> {
        if !a.is_finite() || a <= 0.0 {
            return Err(ParamError::NonPositive {
                name: "lattice_spacing",
                value: a,
            });
        }
        if n1 == 0 || n2 == 0 {
            return Err(ParamError::EmptyLattice { n1, n2 });
        }

        let sqrt3 = 3.0_f64.sqrt();
        let a1 = (sqrt3 * a, 0.0);
        let a2 = (sqrt3 * a / 2.0, 1.5 * a);
        // (a1 + a2) / 6
        let off = (sqrt3 * a / 4.0, a / 4.0);

        let mut sites = Vec::with_capacity(2 * n1 * n2);
        for (sub, sign) in [(Sublattice::A, -1.0), (Sublattice::B, 1.0)] {
            for i in 0..n1 {
                for j in 0..n2 {
                    let cx = i as f64 * a1.0 + j as f64 * a2.0;
                    let cy = i as f64 * a1.1 + j as f64 * a2.1;
                    sites.push(Site {
                        x: cx + sign * off.0,
                        y: cy + sign * off.1,
                        sublattice: sub,
                    });
                }
            }
        }
        Ok(Self { sites, spacing: a })
    }

    /// The 7-site test cluster: one central site at the origin plus six
    /// ring sites at distance `a`, angles k·60°. Every nearest-neighbour
    /// separation (centre-ring and ring-ring) equals `a`. The tag marks
    /// centre (A) versus ring (B); the cluster is not bipartite.
    pub fn hex_ring(a: f64) -> Result<Self, ParamError> {
        if !a.is_finite() || a <= 0.0 {
            return Err(ParamError::NonPositive {
                name: "lattice_spacing",
                value: a,
            });
        }
        let mut sites = vec![Site {
            x: 0.0,
            y: 0.0,
            sublattice: Sublattice::A,
        }];
        for k in 0..6 {
            let theta = k as f64 * std::f64::consts::PI / 3.0;
            sites.push(Site {
                x: a * theta.cos(),
                y: a * theta.sin(),
                sublattice: Sublattice::B,
            });
        }
        Ok(Self { sites, spacing: a })
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.sites.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.sites.is_empty()
    }

    #[inline]
    pub fn sites(&self) -> &[Site] {
        &self.sites
    }

    #[inline]
    pub fn site(&self, i: usize) -> Site {
        self.sites[i]
    }

    /// Nearest-neighbour spacing the lattice was built with.
    #[inline]
    pub fn spacing(&self) -> f64 {
        self.spacing
    }

    /// Deduplicated site pairs (i < j) closer than `cutoff`. Used for
    /// energy sums and bond rendering; the coupling evaluator applies
    /// the cutoff per evaluation instead of consuming this list.
    pub fn bonds(&self, cutoff: f64) -> Result<Vec<(usize, usize)>, ParamError> {
        if !cutoff.is_finite() || cutoff <= 0.0 {
            return Err(ParamError::DegenerateCutoff { value: cutoff });
        }
        let mut pairs = Vec::new();
        for i in 0..self.sites.len() {
            for j in (i + 1)..self.sites.len() {
                if self.sites[i].distance_to(&self.sites[j]) <= cutoff {
                    pairs.push((i, j));
                }
            }
        }
        Ok(pairs)
    }

    /// Number of sites within `cutoff` of each site.
    pub fn neighbour_counts(&self, cutoff: f64) -> Result<Vec<usize>, ParamError> {
        let mut counts = vec![0usize; self.sites.len()];
        for (i, j) in self.bonds(cutoff)? {
            counts[i] += 1;
            counts[j] += 1;
        }
        Ok(counts)
    }

    /// Index of the site closest to (x, y).
    pub fn nearest_site(&self, x: f64, y: f64) -> usize {
        let mut best = 0usize;
        let mut best_d2 = f64::INFINITY;
        for (i, s) in self.sites.iter().enumerate() {
            let d2 = (s.x - x).powi(2) + (s.y - y).powi(2);
            if d2 < best_d2 {
                best_d2 = d2;
                best = i;
            }
        }
        best
    }

    /// (x_min, x_max, y_min, y_max) over all sites.
    pub fn bounding_box(&self) -> (f64, f64, f64, f64) {
        let mut bb = (f64::INFINITY, f64::NEG_INFINITY, f64::INFINITY, f64::NEG_INFINITY);
        for s in &self.sites {
            bb.0 = bb.0.min(s.x);
            bb.1 = bb.1.max(s.x);
            bb.2 = bb.2.min(s.y);
            bb.3 = bb.3.max(s.y);
        }
        bb
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn honeycomb_count_and_nearest_neighbour_spacing() {
        let a = 24.0e-3;
        let lat = Lattice::honeycomb(4, 3, a).unwrap();
        assert_eq!(lat.len(), 2 * 4 * 3);

        // No duplicate coordinates, and the closest pair sits at exactly
        // the nearest-neighbour distance a.
        let mut min_d = f64::INFINITY;
        for i in 0..lat.len() {
            for j in (i + 1)..lat.len() {
                let d = lat.site(i).distance_to(&lat.site(j));
                assert!(d > 1e-9 * a, "duplicate sites {} and {}", i, j);
                min_d = min_d.min(d);
            }
        }
        assert_relative_eq!(min_d, a, max_relative = 1e-12);
    }

    #[test]
    fn interior_site_bonds_at_honeycomb_angles() {
        let a = 1.0;
        let lat = Lattice::honeycomb(3, 3, a).unwrap();

        // A site of cell (1,1): R - (a1+a2)/6 = (5√3/4, 5/4)·a.
        let sqrt3 = 3.0_f64.sqrt();
        let idx = lat.nearest_site(1.25 * sqrt3 * a, 1.25 * a);
        let s = lat.site(idx);
        assert_eq!(s.sublattice, Sublattice::A);

        let mut angles = Vec::new();
        for (i, j) in lat.bonds(1.01 * a).unwrap() {
            let other = if i == idx {
                Some(j)
            } else if j == idx {
                Some(i)
            } else {
                None
            };
            if let Some(o) = other {
                let t = lat.site(o);
                assert_eq!(t.sublattice, Sublattice::B);
                angles.push((t.y - s.y).atan2(t.x - s.x).to_degrees());
            }
        }
        angles.sort_by(|p, q| p.partial_cmp(q).unwrap());
        assert_eq!(angles.len(), 3, "interior coordination must be 3");
        assert_relative_eq!(angles[0], -90.0, max_relative = 1e-9);
        assert_relative_eq!(angles[1], 30.0, max_relative = 1e-9);
        assert_relative_eq!(angles[2], 150.0, max_relative = 1e-9);
    }

    #[test]
    fn hex_ring_coordination() {
        let a = 2.5;
        let lat = Lattice::hex_ring(a).unwrap();
        assert_eq!(lat.len(), 7);

        for k in 1..7 {
            assert_relative_eq!(lat.site(0).distance_to(&lat.site(k)), a, max_relative = 1e-12);
        }
        let counts = lat.neighbour_counts(1.01 * a).unwrap();
        assert_eq!(counts[0], 6, "centre touches every ring site");
        for k in 1..7 {
            assert_eq!(counts[k], 3, "ring site {} touches centre and two ring neighbours", k);
        }
    }

    #[test]
    fn degenerate_geometry_is_rejected() {
        let lat = Lattice::honeycomb(2, 2, 1.0).unwrap();
        assert!(matches!(
            lat.bonds(0.0),
            Err(ParamError::DegenerateCutoff { .. })
        ));
        assert!(matches!(
            lat.bonds(f64::NAN),
            Err(ParamError::DegenerateCutoff { .. })
        ));
        assert!(matches!(
            Lattice::honeycomb(0, 5, 1.0),
            Err(ParamError::EmptyLattice { n1: 0, n2: 5 })
        ));
        assert!(matches!(
            Lattice::honeycomb(3, 3, -1.0),
            Err(ParamError::NonPositive { .. })
        ));
    }
}
