// src/integrate.rs
//
// Time steppers for the coupled precession equations: explicit Euler,
// classical RK4, and an adaptive Dormand-Prince RK45 with embedded
// 4th-order error estimate. The adaptive driver `advance_to` lands on
// exact output times and turns solver failure into typed errors instead
// of silently continuing.

use num_complex::Complex64;
use thiserror::Error;

use crate::coupling::{build_dpsi, CouplingParams};
use crate::lattice::Lattice;
use crate::psi_field::PsiField;

// Dormand-Prince 5(4) tableau.
const A21: f64 = 1.0 / 5.0;
const A31: f64 = 3.0 / 40.0;
const A32: f64 = 9.0 / 40.0;
const A41: f64 = 44.0 / 45.0;
const A42: f64 = -56.0 / 15.0;
const A43: f64 = 32.0 / 9.0;
const A51: f64 = 19372.0 / 6561.0;
const A52: f64 = -25360.0 / 2187.0;
const A53: f64 = 64448.0 / 6561.0;
const A54: f64 = -212.0 / 729.0;
const A61: f64 = 9017.0 / 3168.0;
const A62: f64 = -355.0 / 33.0;
const A63: f64 = 46732.0 / 5247.0;
const A64: f64 = 49.0 / 176.0;
const A65: f64 = -5103.0 / 18656.0;

// 5th-order solution weights (b2 = 0).
const B1: f64 = 35.0 / 384.0;
const B3: f64 = 500.0 / 1113.0;
const B4: f64 = 125.0 / 192.0;
const B5: f64 = -2187.0 / 6784.0;
const B6: f64 = 11.0 / 84.0;

// Error weights, the difference between the 5th- and 4th-order rows.
const E1: f64 = 71.0 / 57600.0;
const E3: f64 = -71.0 / 16695.0;
const E4: f64 = 71.0 / 1920.0;
const E5: f64 = -17253.0 / 339200.0;
const E6: f64 = 22.0 / 525.0;
const E7: f64 = -1.0 / 40.0;

/// Preallocated stage buffers shared by all steppers, sized once per
/// lattice. RK4 uses k1..k4, Euler only k1.
pub struct RK45Scratch {
    k1: Vec<Complex64>,
    k2: Vec<Complex64>,
    k3: Vec<Complex64>,
    k4: Vec<Complex64>,
    k5: Vec<Complex64>,
    k6: Vec<Complex64>,
    k7: Vec<Complex64>,
    y_trial: Vec<Complex64>,
}

impl RK45Scratch {
    pub fn new(n_sites: usize) -> Self {
        let zeros = vec![Complex64::new(0.0, 0.0); n_sites];
        Self {
            k1: zeros.clone(),
            k2: zeros.clone(),
            k3: zeros.clone(),
            k4: zeros.clone(),
            k5: zeros.clone(),
            k6: zeros.clone(),
            k7: zeros.clone(),
            y_trial: zeros,
        }
    }
}

/// y_trial = base + dt · Σ c_k · k over the listed stage buffers.
fn stage(y_trial: &mut [Complex64], base: &[Complex64], dt: f64, terms: &[(&[Complex64], f64)]) {
    for (i, yi) in y_trial.iter_mut().enumerate() {
        let mut acc = Complex64::new(0.0, 0.0);
        for (k, c) in terms {
            acc += k[i] * *c;
        }
        *yi = base[i] + acc * dt;
    }
}

/// Forward Euler. Only useful as a baseline; first-order phase error
/// makes it drift visibly within a few precession periods.
pub fn step_euler(
    lattice: &Lattice,
    psi: &mut PsiField,
    dt: f64,
    params: &CouplingParams,
    scratch: &mut RK45Scratch,
) {
    build_dpsi(lattice, &psi.psi, &mut scratch.k1, params);
    for (p, k) in psi.psi.iter_mut().zip(&scratch.k1) {
        *p += *k * dt;
    }
}

/// Classical fixed-step RK4. `dt` may be negative, which integrates
/// backwards in time (used by the reversibility checks).
pub fn step_rk4(
    lattice: &Lattice,
    psi: &mut PsiField,
    dt: f64,
    params: &CouplingParams,
    scratch: &mut RK45Scratch,
) {
    build_dpsi(lattice, &psi.psi, &mut scratch.k1, params);
    stage(&mut scratch.y_trial, &psi.psi, dt, &[(&scratch.k1, 0.5)]);
    build_dpsi(lattice, &scratch.y_trial, &mut scratch.k2, params);
    stage(&mut scratch.y_trial, &psi.psi, dt, &[(&scratch.k2, 0.5)]);
    build_dpsi(lattice, &scratch.y_trial, &mut scratch.k3, params);
    stage(&mut scratch.y_trial, &psi.psi, dt, &[(&scratch.k3, 1.0)]);
    build_dpsi(lattice, &scratch.y_trial, &mut scratch.k4, params);

    let sixth = dt / 6.0;
    for i in 0..psi.psi.len() {
        psi.psi[i] +=
            (scratch.k1[i] + (scratch.k2[i] + scratch.k3[i]) * 2.0 + scratch.k4[i]) * sixth;
    }
}

/// One adaptive Dormand-Prince attempt at the current `*dt`.
///
/// Returns `(eps, accepted, dt_used)`: the max-norm error estimate, the
/// acceptance flag (eps ≤ max_err), and the dt the attempt ran with.
/// `psi` is updated only on acceptance. `*dt` is always rewritten with
/// the controller's proposal for the next attempt,
/// `headroom · (max_err/eps)^(1/5)` clamped to [0.2, 2.0] growth and to
/// [dt_min, dt_max] absolutely, so a rejected step retries smaller.
pub fn step_rk45_adaptive(
    lattice: &Lattice,
    psi: &mut PsiField,
    dt: &mut f64,
    params: &CouplingParams,
    scratch: &mut RK45Scratch,
    max_err: f64,
    headroom: f64,
    dt_min: f64,
    dt_max: f64,
) -> (f64, bool, f64) {
    let dt_used = *dt;
    let base = &psi.psi;

    build_dpsi(lattice, base, &mut scratch.k1, params);
    stage(&mut scratch.y_trial, base, dt_used, &[(&scratch.k1, A21)]);
    build_dpsi(lattice, &scratch.y_trial, &mut scratch.k2, params);
    stage(
        &mut scratch.y_trial,
        base,
        dt_used,
        &[(&scratch.k1, A31), (&scratch.k2, A32)],
    );
    build_dpsi(lattice, &scratch.y_trial, &mut scratch.k3, params);
    stage(
        &mut scratch.y_trial,
        base,
        dt_used,
        &[(&scratch.k1, A41), (&scratch.k2, A42), (&scratch.k3, A43)],
    );
    build_dpsi(lattice, &scratch.y_trial, &mut scratch.k4, params);
    stage(
        &mut scratch.y_trial,
        base,
        dt_used,
        &[
            (&scratch.k1, A51),
            (&scratch.k2, A52),
            (&scratch.k3, A53),
            (&scratch.k4, A54),
        ],
    );
    build_dpsi(lattice, &scratch.y_trial, &mut scratch.k5, params);
    stage(
        &mut scratch.y_trial,
        base,
        dt_used,
        &[
            (&scratch.k1, A61),
            (&scratch.k2, A62),
            (&scratch.k3, A63),
            (&scratch.k4, A64),
            (&scratch.k5, A65),
        ],
    );
    build_dpsi(lattice, &scratch.y_trial, &mut scratch.k6, params);

    // 5th-order candidate, then its derivative for the error row.
    stage(
        &mut scratch.y_trial,
        base,
        dt_used,
        &[
            (&scratch.k1, B1),
            (&scratch.k3, B3),
            (&scratch.k4, B4),
            (&scratch.k5, B5),
            (&scratch.k6, B6),
        ],
    );
    build_dpsi(lattice, &scratch.y_trial, &mut scratch.k7, params);

    let mut eps = 0.0_f64;
    for i in 0..scratch.k1.len() {
        let err = (scratch.k1[i] * E1
            + scratch.k3[i] * E3
            + scratch.k4[i] * E4
            + scratch.k5[i] * E5
            + scratch.k6[i] * E6
            + scratch.k7[i] * E7)
            * dt_used;
        eps = eps.max(err.norm());
    }

    let accepted = eps <= max_err;
    if accepted {
        psi.psi.copy_from_slice(&scratch.y_trial);
    }

    let factor = if eps == 0.0 {
        2.0
    } else {
        (headroom * (max_err / eps).powf(0.2)).clamp(0.2, 2.0)
    };
    *dt = (dt_used * factor).clamp(dt_min, dt_max);

    (eps, accepted, dt_used)
}

/// Controller settings for the adaptive driver.
#[derive(Debug, Clone, Copy)]
pub struct EvolveSettings {
    /// Largest acceptable per-step error estimate (max site norm).
    pub max_err: f64,
    /// Safety factor applied to the optimal step-size proposal.
    pub headroom: f64,
    pub dt_min: f64,
    pub dt_max: f64,
    /// Accepted-step budget per `advance_to` call.
    pub max_steps: u64,
}

impl Default for EvolveSettings {
    fn default() -> Self {
        Self {
            max_err: 1e-6,
            headroom: 0.8,
            dt_min: 1e-12,
            dt_max: 1.0,
            max_steps: 2_000_000,
        }
    }
}

/// One record per stepper attempt, handed to the observer callback.
#[derive(Debug, Clone, Copy)]
pub struct StepAttempt {
    pub attempt: u64,
    /// Time at the start of the attempt.
    pub t: f64,
    /// dt the attempt ran with.
    pub dt: f64,
    pub eps: f64,
    pub accepted: bool,
}

/// Outcome summary of a successful `advance_to`.
#[derive(Debug, Clone, Copy)]
pub struct AdvanceReport {
    pub t_final: f64,
    pub accepted_steps: u64,
    pub rejected_steps: u64,
    pub min_dt_used: f64,
    pub max_dt_used: f64,
    pub last_eps: f64,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SolveError {
    /// The error test failed with dt already pinned at dt_min; shrinking
    /// further is impossible, so the run must stop.
    #[error(
        "integrator failed to converge at t = {t:.6e}: step rejected (eps = {eps:.3e}) with dt already at dt_min = {dt_min:.3e}"
    )]
    NonConvergence { t: f64, eps: f64, dt_min: f64 },

    /// A site turned NaN or infinite after an accepted step.
    #[error("non-finite state at t = {t:.6e}: site {site} is NaN or infinite")]
    NonFinite { t: f64, site: usize },

    /// The accepted-step budget ran out before the target time.
    #[error(
        "step budget exhausted: {max_steps} accepted steps, reached t = {t:.6e} of target {t_target:.6e}"
    )]
    StepBudgetExhausted { t: f64, t_target: f64, max_steps: u64 },
}

/// Advance `psi` from `*t` to exactly `t_target` with the adaptive RK45
/// stepper, clamping the final step to land on the target. `on_attempt`
/// sees every attempt, accepted or not, in order.
#[allow(clippy::too_many_arguments)]
pub fn advance_to<F>(
    lattice: &Lattice,
    psi: &mut PsiField,
    t: &mut f64,
    t_target: f64,
    dt: &mut f64,
    params: &CouplingParams,
    scratch: &mut RK45Scratch,
    settings: &EvolveSettings,
    mut on_attempt: F,
) -> Result<AdvanceReport, SolveError>
where
    F: FnMut(&StepAttempt),
{
    let mut report = AdvanceReport {
        t_final: *t,
        accepted_steps: 0,
        rejected_steps: 0,
        min_dt_used: f64::INFINITY,
        max_dt_used: 0.0,
        last_eps: 0.0,
    };
    let mut attempt: u64 = 0;

    while *t < t_target {
        let remaining = t_target - *t;
        let landing = *dt >= remaining;
        if landing {
            *dt = remaining;
        }

        let t_before = *t;
        let (eps, accepted, dt_used) = step_rk45_adaptive(
            lattice,
            psi,
            dt,
            params,
            scratch,
            settings.max_err,
            settings.headroom,
            settings.dt_min,
            settings.dt_max,
        );
        attempt += 1;
        on_attempt(&StepAttempt {
            attempt,
            t: t_before,
            dt: dt_used,
            eps,
            accepted,
        });
        report.last_eps = eps;

        if accepted {
            // Snap onto the target when the clamped step succeeded, so
            // rounding cannot strand t just below t_target.
            *t = if landing { t_target } else { t_before + dt_used };
            report.accepted_steps += 1;
            report.min_dt_used = report.min_dt_used.min(dt_used);
            report.max_dt_used = report.max_dt_used.max(dt_used);

            if let Some(site) = psi.first_non_finite() {
                return Err(SolveError::NonFinite { t: *t, site });
            }
            if report.accepted_steps >= settings.max_steps && *t < t_target {
                return Err(SolveError::StepBudgetExhausted {
                    t: *t,
                    t_target,
                    max_steps: settings.max_steps,
                });
            }
        } else {
            report.rejected_steps += 1;
            if dt_used <= settings.dt_min * (1.0 + 1e-6) {
                return Err(SolveError::NonConvergence {
                    t: t_before,
                    eps,
                    dt_min: settings.dt_min,
                });
            }
        }
    }

    report.t_final = *t;
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tiny_system() -> (Lattice, CouplingParams) {
        let lat = Lattice::hex_ring(1.0).unwrap();
        let p = CouplingParams::from_raw(2.0, 0.1, -0.1, 1.05).unwrap();
        (lat, p)
    }

    #[test]
    fn rejected_step_leaves_state_untouched_and_shrinks_dt() {
        let (lat, p) = tiny_system();
        let mut psi = PsiField::single_site(lat.len(), 0, Complex64::new(1.0, 0.0));
        let before = psi.clone();
        let mut scratch = RK45Scratch::new(lat.len());

        // Impossible tolerance forces rejection.
        let mut dt = 0.1;
        let (eps, accepted, dt_used) =
            step_rk45_adaptive(&lat, &mut psi, &mut dt, &p, &mut scratch, 1e-30, 0.8, 1e-15, 1.0);

        assert!(!accepted);
        assert!(eps > 1e-30);
        assert_eq!(dt_used, 0.1);
        assert!(dt < 0.1, "controller must propose a smaller retry");
        assert_eq!(psi, before, "rejected attempt must not modify the state");
    }

    #[test]
    fn accepted_step_grows_dt_up_to_the_cap() {
        let (lat, p) = tiny_system();
        // Zero state has zero derivative and zero error estimate.
        let mut psi = PsiField::zeros(lat.len());
        let mut scratch = RK45Scratch::new(lat.len());

        let mut dt = 0.1;
        let (eps, accepted, dt_used) =
            step_rk45_adaptive(&lat, &mut psi, &mut dt, &p, &mut scratch, 1e-6, 0.8, 1e-15, 0.15);

        assert!(accepted);
        assert_eq!(eps, 0.0);
        assert_eq!(dt_used, 0.1);
        assert_eq!(dt, 0.15, "doubling proposal must clamp to dt_max");
    }

    #[test]
    fn advance_to_lands_exactly_on_the_target() {
        let (lat, p) = tiny_system();
        let mut psi = PsiField::single_site(lat.len(), 0, Complex64::new(0.01, 0.0));
        let mut scratch = RK45Scratch::new(lat.len());
        let settings = EvolveSettings::default();

        let mut t = 0.0;
        let mut dt = 1e-3;
        let mut attempts = 0u64;
        let report = advance_to(
            &lat,
            &mut psi,
            &mut t,
            0.37,
            &mut dt,
            &p,
            &mut scratch,
            &settings,
            |_a| attempts += 1,
        )
        .unwrap();

        assert_eq!(t, 0.37);
        assert_eq!(report.t_final, 0.37);
        assert!(report.accepted_steps > 0);
        assert_eq!(attempts, report.accepted_steps + report.rejected_steps);
        assert!(report.min_dt_used > 0.0);
        assert!(report.max_dt_used <= settings.dt_max);
    }

    #[test]
    fn unreachable_tolerance_reports_non_convergence() {
        let (lat, p) = tiny_system();
        let mut psi = PsiField::single_site(lat.len(), 0, Complex64::new(1.0, 0.0));
        let mut scratch = RK45Scratch::new(lat.len());
        let settings = EvolveSettings {
            max_err: 1e-300,
            dt_min: 1e-6,
            ..EvolveSettings::default()
        };

        let mut t = 0.0;
        let mut dt = 1e-2;
        let err = advance_to(
            &lat,
            &mut psi,
            &mut t,
            1.0,
            &mut dt,
            &p,
            &mut scratch,
            &settings,
            |_a| {},
        )
        .unwrap_err();

        assert!(matches!(err, SolveError::NonConvergence { .. }));
    }
}
