// src/coupling.rs
//
// Right-hand side of the coupled precession equations,
//
//   i dψ_i/dt = Ω_g ψ_i + Σ_{j≠i, |r_ij|≤cutoff} [ c_fm (ψ_i − ψ_j)
//                         + c_h e^{2iθ_ij} (ψ_i* − ψ_j*) ]
//
// with θ_ij = atan2(y_j − y_i, x_j − x_i). The evaluator is a pure
// function of (lattice, ψ, parameters); the ODE steppers own the state
// and pass scratch buffers in.

use num_complex::Complex64;
use rayon::prelude::*;

use crate::lattice::Lattice;
use crate::params::{Derived, ParamError};

/// Below this site count the pairwise pass is cheaper than the rayon
/// fan-out, so evaluation stays serial. Results do not depend on the
/// threshold; only the inner per-site sums carry rounding order.
const PAR_MIN_SITES: usize = 256;

/// Everything the evaluator needs besides geometry and state. The
/// equations are autonomous, so there is no time argument anywhere.
#[derive(Debug, Clone, Copy)]
pub struct CouplingParams {
    /// Gravitational precession frequency Ω_g (rad/s).
    pub omega_g: f64,
    /// Ferromagnetic coefficient, +Ω_m/2 for the physical system.
    pub c_fm: f64,
    /// Handed coefficient, -Ω_m/2 for the physical system.
    pub c_handed: f64,
    /// Euclidean coupling cutoff (m). Slightly above the lattice
    /// spacing selects nearest neighbours only.
    pub cutoff: f64,
}

impl CouplingParams {
    pub fn new(derived: &Derived, cutoff: f64) -> Result<Self, ParamError> {
        Self::from_raw(derived.omega_g, derived.c_fm(), derived.c_handed(), cutoff)
    }

    /// Direct construction with hand-picked coefficients. Still checks
    /// the cutoff: a zero or non-finite threshold couples nothing or
    /// everything and is always a caller bug.
    pub fn from_raw(
        omega_g: f64,
        c_fm: f64,
        c_handed: f64,
        cutoff: f64,
    ) -> Result<Self, ParamError> {
        if !cutoff.is_finite() || cutoff <= 0.0 {
            return Err(ParamError::DegenerateCutoff { value: cutoff });
        }
        Ok(Self {
            omega_g,
            c_fm,
            c_handed,
            cutoff,
        })
    }
}

fn dpsi_site(lattice: &Lattice, psi: &[Complex64], i: usize, p: &CouplingParams) -> Complex64 {
    let si = lattice.site(i);
    let cutoff_sq = p.cutoff * p.cutoff;

    let mut rhs = psi[i] * p.omega_g;
    for (j, sj) in lattice.sites().iter().enumerate() {
        if j == i {
            continue;
        }
        let dx = sj.x - si.x;
        let dy = sj.y - si.y;
        if dx * dx + dy * dy > cutoff_sq {
            continue;
        }
        let theta = dy.atan2(dx);
        let handed_phase = Complex64::from_polar(1.0, 2.0 * theta);
        rhs += (psi[i] - psi[j]) * p.c_fm
            + handed_phase * (psi[i].conj() - psi[j].conj()) * p.c_handed;
    }
    // i dψ/dt = rhs  =>  dψ/dt = -i · rhs
    Complex64::new(0.0, -1.0) * rhs
}

/// Write dψ/dt for every site into `dpsi`. O(N²) pairwise pass with the
/// cutoff applied at evaluation time; adjacency is never precomputed,
/// so the same evaluator serves any site set.
pub fn build_dpsi(
    lattice: &Lattice,
    psi: &[Complex64],
    dpsi: &mut [Complex64],
    params: &CouplingParams,
) {
    debug_assert_eq!(lattice.len(), psi.len());
    debug_assert_eq!(psi.len(), dpsi.len());

    if lattice.len() >= PAR_MIN_SITES {
        dpsi.par_iter_mut().enumerate().for_each(|(i, out)| {
            *out = dpsi_site(lattice, psi, i, params);
        });
    } else {
        for (i, out) in dpsi.iter_mut().enumerate() {
            *out = dpsi_site(lattice, psi, i, params);
        }
    }
}
