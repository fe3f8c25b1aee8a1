// src/psi_field.rs
//
// Complex displacement field over the lattice sites, ψ_i = δx_i + i·δy_i.
// One entry per site, same indexing as the lattice; mutated only by the
// integrator.

use num_complex::Complex64;

use crate::lattice::{Lattice, Sublattice};

/// Minimal xorshift64 generator for reproducible initial states.
/// Not statistical-quality randomness, but deterministic across
/// platforms and free of any dependency.
pub struct XorShift64 {
    state: u64,
}

impl XorShift64 {
    pub fn new(seed: u64) -> Self {
        // Xorshift has an all-zero fixed point.
        Self {
            state: if seed == 0 { 0x9e3779b97f4a7c15 } else { seed },
        }
    }

    pub fn next_u64(&mut self) -> u64 {
        let mut x = self.state;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.state = x;
        x
    }

    /// Uniform in [0, 1).
    pub fn next_f64(&mut self) -> f64 {
        (self.next_u64() >> 11) as f64 / (1u64 << 53) as f64
    }

    /// Uniform in [-1, 1).
    pub fn next_symmetric(&mut self) -> f64 {
        2.0 * self.next_f64() - 1.0
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PsiField {
    pub psi: Vec<Complex64>,
}

impl PsiField {
    pub fn zeros(n_sites: usize) -> Self {
        Self {
            psi: vec![Complex64::new(0.0, 0.0); n_sites],
        }
    }

    /// Every site displaced identically. A uniform field is the exact
    /// acoustic mode: all pairwise coupling terms vanish and the whole
    /// lattice precesses at Ω_g.
    pub fn uniform(n_sites: usize, value: Complex64) -> Self {
        Self {
            psi: vec![value; n_sites],
        }
    }

    /// Zero everywhere except one site. The standard pulse seed.
    pub fn single_site(n_sites: usize, index: usize, value: Complex64) -> Self {
        let mut f = Self::zeros(n_sites);
        f.psi[index] = value;
        f
    }

    /// +amp on sublattice A, -amp on B. On the honeycomb this seeds the
    /// optical band-edge mode at Ω_g + 3Ω_m.
    pub fn anti_phase(lattice: &Lattice, amp: f64) -> Self {
        let psi = lattice
            .sites()
            .iter()
            .map(|s| match s.sublattice {
                Sublattice::A => Complex64::new(amp, 0.0),
                Sublattice::B => Complex64::new(-amp, 0.0),
            })
            .collect();
        Self { psi }
    }

    /// Independent uniform components in [-amp, amp) per site,
    /// reproducible from the seed.
    pub fn random(n_sites: usize, seed: u64, amp: f64) -> Self {
        let mut f = Self::zeros(n_sites);
        f.add_noise(seed, amp);
        f
    }

    /// Add uniform noise in [-amp, amp) to both components of every site.
    pub fn add_noise(&mut self, seed: u64, amp: f64) {
        let mut rng = XorShift64::new(seed);
        for p in &mut self.psi {
            let re = amp * rng.next_symmetric();
            let im = amp * rng.next_symmetric();
            *p += Complex64::new(re, im);
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.psi.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.psi.is_empty()
    }

    /// Σ_i ψ_i, the momentum-like quantity conserved by the pure
    /// coupling terms.
    pub fn sum(&self) -> Complex64 {
        self.psi.iter().sum()
    }

    pub fn max_abs(&self) -> f64 {
        self.psi.iter().fold(0.0, |m, p| m.max(p.norm()))
    }

    /// sqrt(Σ|ψ_i|² / N).
    pub fn rms(&self) -> f64 {
        if self.psi.is_empty() {
            return 0.0;
        }
        let sq: f64 = self.psi.iter().map(|p| p.norm_sqr()).sum();
        (sq / self.psi.len() as f64).sqrt()
    }

    /// Index of the first site holding a NaN or infinite component.
    pub fn first_non_finite(&self) -> Option<usize> {
        self.psi
            .iter()
            .position(|p| !p.re.is_finite() || !p.im.is_finite())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn reductions_on_a_small_field() {
        let mut f = PsiField::zeros(3);
        f.psi[0] = Complex64::new(3.0, 4.0);
        f.psi[2] = Complex64::new(-1.0, 0.0);

        assert_eq!(f.sum(), Complex64::new(2.0, 4.0));
        assert_relative_eq!(f.max_abs(), 5.0, max_relative = 1e-14);
        assert_relative_eq!(f.rms(), (26.0_f64 / 3.0).sqrt(), max_relative = 1e-14);
        assert_eq!(f.first_non_finite(), None);

        f.psi[1] = Complex64::new(f64::NAN, 0.0);
        assert_eq!(f.first_non_finite(), Some(1));
    }

    #[test]
    fn random_fields_are_reproducible_per_seed() {
        let f1 = PsiField::random(64, 42, 0.1);
        let f2 = PsiField::random(64, 42, 0.1);
        let f3 = PsiField::random(64, 43, 0.1);
        assert_eq!(f1, f2);
        assert_ne!(f1, f3);
        assert!(f1.max_abs() <= 0.1 * 2.0_f64.sqrt() + 1e-15);
        assert!(f1.max_abs() > 0.0);
    }

    #[test]
    fn anti_phase_follows_sublattice_tags() {
        let lat = crate::lattice::Lattice::honeycomb(2, 2, 1.0).unwrap();
        let f = PsiField::anti_phase(&lat, 0.5);
        for (s, p) in lat.sites().iter().zip(&f.psi) {
            let expect = match s.sublattice {
                Sublattice::A => 0.5,
                Sublattice::B => -0.5,
            };
            assert_eq!(*p, Complex64::new(expect, 0.0));
        }
    }
}
