// tests/validation.rs
//
// Integration-style validation tests (physics sanity checks).
// Run with: cargo test
// Or only these tests: cargo test --test validation

use gyro_sim::coupling::{CouplingParams, build_dpsi};
use gyro_sim::integrate::{EvolveSettings, RK45Scratch, advance_to, step_rk4};
use gyro_sim::lattice::Lattice;
use gyro_sim::params::{Derived, GyroParams};
use gyro_sim::psi_field::PsiField;
use gyro_sim::spectrum::dominant_angular_frequency;

use num_complex::Complex64;

fn cdist(a: Complex64, b: Complex64) -> f64 {
    (a - b).norm()
}

fn max_site_deviation(x: &PsiField, y: &PsiField) -> f64 {
    x.psi
        .iter()
        .zip(&y.psi)
        .fold(0.0_f64, |m, (p, q)| m.max(cdist(*p, *q)))
}

fn toy_derived() -> Derived {
    Derived::from_params(&GyroParams::toy()).expect("toy preset must be valid")
}

#[test]
fn pairwise_coupling_conserves_total_displacement() {
    // Every bond contributes (psi_i - psi_j) to site i and (psi_j - psi_i)
    // to site j, and e^{2i theta} is shared by both directions, so the
    // coupling terms cancel in the sum over sites. With Omega_g = 0 the
    // total d(sum psi)/dt must vanish to rounding error; with Omega_g it
    // must equal -i Omega_g * sum(psi) exactly.
    let lat = Lattice::honeycomb(3, 3, 1.0).unwrap();
    let field = PsiField::random(lat.len(), 11, 1.0);
    let mut dpsi = vec![Complex64::new(0.0, 0.0); lat.len()];

    // Deliberately unequal coefficients: antisymmetry does not depend on
    // the physical c_fm = -c_handed relation.
    let p0 = CouplingParams::from_raw(0.0, 0.37, -0.29, 1.05).unwrap();
    build_dpsi(&lat, &field.psi, &mut dpsi, &p0);
    let total: Complex64 = dpsi.iter().sum();
    assert!(
        total.norm() < 1e-12,
        "coupling-only total derivative should vanish, got {:e}",
        total.norm()
    );

    let omega_g = 2.2;
    let pg = CouplingParams::from_raw(omega_g, 0.37, -0.29, 1.05).unwrap();
    build_dpsi(&lat, &field.psi, &mut dpsi, &pg);
    let total: Complex64 = dpsi.iter().sum();
    let expected = Complex64::new(0.0, -omega_g) * field.sum();
    assert!(
        cdist(total, expected) < 1e-12 * expected.norm().max(1.0),
        "d(sum psi)/dt should be -i*Omega_g*sum(psi): got {}, expected {}",
        total,
        expected
    );
}

#[test]
fn quadratic_invariant_is_flat_under_adaptive_rk45() {
    use gyro_sim::energy::compute_energy;

    let derived = toy_derived();
    let lat = Lattice::honeycomb(3, 3, 1.0).unwrap();
    let coupling = CouplingParams::new(&derived, 1.05).unwrap();

    let mut psi = PsiField::random(lat.len(), 5, 0.1);
    let mut scratch = RK45Scratch::new(lat.len());
    let settings = EvolveSettings {
        max_err: 1e-9,
        ..EvolveSettings::default()
    };

    let e0 = compute_energy(&lat, &psi, &coupling).unwrap().total();
    assert!(e0 > 0.0, "random state should carry positive energy");

    let mut t = 0.0;
    let mut dt = derived.fast_period() / 100.0;
    let horizon = 2.0 * derived.fast_period();
    advance_to(
        &lat,
        &mut psi,
        &mut t,
        horizon,
        &mut dt,
        &coupling,
        &mut scratch,
        &settings,
        |_a| {},
    )
    .expect("short-horizon integration must succeed");

    let e1 = compute_energy(&lat, &psi, &coupling).unwrap().total();
    let drift = (e1 - e0).abs() / e0;
    assert!(
        drift < 1e-4,
        "energy drift over two fast periods too large: E0={:.6e}, E1={:.6e}, rel={:.3e}",
        e0,
        e1,
        drift
    );
}

#[test]
fn rk4_forward_then_backward_returns_to_the_initial_state() {
    let derived = toy_derived();
    let lat = Lattice::honeycomb(2, 2, 1.0).unwrap();
    let coupling = CouplingParams::new(&derived, 1.05).unwrap();

    let amp = 0.1;
    let initial = PsiField::random(lat.len(), 23, amp);
    let mut psi = initial.clone();
    let mut scratch = RK45Scratch::new(lat.len());

    let dt = derived.fast_period() / 80.0;
    let n_steps = 160; // two fast periods out

    for _ in 0..n_steps {
        step_rk4(&lat, &mut psi, dt, &coupling, &mut scratch);
    }
    let moved = max_site_deviation(&psi, &initial);
    assert!(
        moved > 0.05 * amp,
        "state should have moved away before reversing, max dev {:e}",
        moved
    );

    for _ in 0..n_steps {
        step_rk4(&lat, &mut psi, -dt, &coupling, &mut scratch);
    }
    let returned = max_site_deviation(&psi, &initial);
    assert!(
        returned < 1e-3 * amp,
        "forward/backward RK4 should return to the start: max dev {:e} (amp {:e})",
        returned,
        amp
    );
}

#[test]
fn decoupled_gyroscope_precesses_clockwise_at_omega_g() {
    // Cutoff below the lattice spacing leaves every site on its own, so
    // each follows the free solution psi(t) = psi(0) * e^{-i Omega_g t}.
    let derived = toy_derived();
    let lat = Lattice::honeycomb(1, 1, 1.0).unwrap();
    let coupling = CouplingParams::new(&derived, 0.25).unwrap();

    let mut psi = PsiField::zeros(lat.len());
    psi.psi[0] = Complex64::new(0.1, 0.0);
    psi.psi[1] = Complex64::new(0.02, -0.07);
    let initial = psi.clone();

    let mut scratch = RK45Scratch::new(lat.len());
    let settings = EvolveSettings {
        max_err: 1e-10,
        ..EvolveSettings::default()
    };

    let mut t = 0.0;
    let mut dt = 1e-2;
    let t1 = 3.0; // Omega_g * t1 = 1.2 rad, under half a turn
    advance_to(
        &lat,
        &mut psi,
        &mut t,
        t1,
        &mut dt,
        &coupling,
        &mut scratch,
        &settings,
        |_a| {},
    )
    .expect("free precession must integrate cleanly");

    let rotor = Complex64::from_polar(1.0, -derived.omega_g * t1);
    for (i, p) in psi.psi.iter().enumerate() {
        let expected = initial.psi[i] * rotor;
        assert!(
            cdist(*p, expected) < 1e-7,
            "site {}: got {}, analytic {}",
            i,
            p,
            expected
        );
    }
    // Started on the positive real axis, so clockwise motion dips into
    // the lower half plane first.
    assert!(
        psi.psi[0].im < 0.0,
        "precession sense should be clockwise, got Im psi = {:e}",
        psi.psi[0].im
    );
}

#[test]
fn uniform_sheet_is_an_exact_acoustic_mode() {
    use gyro_sim::energy::compute_energy;

    // A uniform field zeroes every pairwise difference, so any cluster,
    // boundaries included, precesses rigidly at Omega- = Omega_g.
    let derived = toy_derived();
    let lat = Lattice::honeycomb(3, 3, 1.0).unwrap();
    let coupling = CouplingParams::new(&derived, 1.05).unwrap();

    let amp = 0.08;
    let mut psi = PsiField::uniform(lat.len(), Complex64::new(amp, 0.0));
    let mut scratch = RK45Scratch::new(lat.len());
    let settings = EvolveSettings {
        max_err: 1e-9,
        ..EvolveSettings::default()
    };

    let t1 = 0.6 * 2.0 * std::f64::consts::PI / derived.omega_minus;
    let mut t = 0.0;
    let mut dt = derived.fast_period() / 100.0;
    advance_to(
        &lat,
        &mut psi,
        &mut t,
        t1,
        &mut dt,
        &coupling,
        &mut scratch,
        &settings,
        |_a| {},
    )
    .expect("acoustic-mode integration must succeed");

    let expected = Complex64::new(amp, 0.0) * Complex64::from_polar(1.0, -derived.omega_minus * t1);
    for (i, p) in psi.psi.iter().enumerate() {
        assert!(
            cdist(*p, expected) < 5e-7,
            "site {} left the rigid mode: got {}, expected {}",
            i,
            p,
            expected
        );
    }

    // The bond terms see zero differences throughout.
    let e = compute_energy(&lat, &psi, &coupling).unwrap();
    assert!(
        e.ferromagnetic.abs() < 1e-20 && e.handed.abs() < 1e-20,
        "uniform field must carry no bond energy: fm={:e}, handed={:e}",
        e.ferromagnetic,
        e.handed
    );
}

#[test]
fn hex_ring_pulse_reaches_the_ring_and_precesses_in_band() {
    // End-to-end scenario: centre pulse on the 7-site ring. The coupling
    // must move every ring site within one slow period, and the centre
    // site's dominant precession frequency must land within tolerance of
    // the analytic band [Omega-, Omega+] with clockwise sense.
    let derived = toy_derived();
    let lat = Lattice::hex_ring(1.0).unwrap();
    let coupling = CouplingParams::new(&derived, 1.05).unwrap();

    let amp = 0.05;
    let mut psi = PsiField::single_site(lat.len(), 0, Complex64::new(amp, 0.0));
    let mut scratch = RK45Scratch::new(lat.len());
    let settings = EvolveSettings {
        max_err: 1e-8,
        ..EvolveSettings::default()
    };

    let dt_out = derived.fast_period() / 16.0;
    let n_out: usize = 1024;
    let slow_period = 2.0 * std::f64::consts::PI / derived.omega_minus;

    let mut centre_series: Vec<Complex64> = Vec::with_capacity(n_out + 1);
    centre_series.push(psi.psi[0]);
    let mut arrival: [Option<f64>; 6] = [None; 6];

    let mut t = 0.0;
    let mut dt = derived.fast_period() / 100.0;
    for k in 1..=n_out {
        let t_target = k as f64 * dt_out;
        advance_to(
            &lat,
            &mut psi,
            &mut t,
            t_target,
            &mut dt,
            &coupling,
            &mut scratch,
            &settings,
            |_a| {},
        )
        .expect("hex-ring integration must succeed");

        centre_series.push(psi.psi[0]);
        for (ring, slot) in arrival.iter_mut().enumerate() {
            if slot.is_none() && psi.psi[ring + 1].norm() >= 0.01 * amp {
                *slot = Some(t);
            }
        }
    }

    for (ring, slot) in arrival.iter().enumerate() {
        let ta = slot.unwrap_or_else(|| {
            panic!("ring site {} never moved above 1% of the pulse", ring + 1)
        });
        assert!(
            ta <= slow_period,
            "ring site {} reached only at t={:.3e} s (> one slow period {:.3e} s)",
            ring + 1,
            ta,
            slow_period
        );
    }

    let omega = dominant_angular_frequency(&centre_series, dt_out)
        .expect("centre series must yield a spectrum");
    assert!(
        omega < 0.0,
        "centre site should precess clockwise (negative signed frequency), got {:e}",
        omega
    );
    let mag = omega.abs();
    // Loose band check: finite-cluster eigenfrequencies can sit a little
    // outside the infinite-lattice edges (the centre site has six
    // neighbours, not three), so allow 25% slack on both sides.
    assert!(
        mag > 0.75 * derived.omega_minus && mag < 1.25 * derived.omega_plus,
        "dominant |frequency| {:.4e} outside [{:.4e}, {:.4e}] rad/s",
        mag,
        derived.omega_minus,
        derived.omega_plus
    );
}
