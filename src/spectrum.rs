// src/spectrum.rs
//
// Precession-frequency estimation from a complex single-site time
// series. The series is complex, so positive and negative frequencies
// are distinct: ψ ~ e^{-iΩt} with Ω > 0 (clockwise precession) peaks at
// a negative signed frequency.

use num_complex::Complex64;
use rustfft::FftPlanner;

/// Dominant signed angular frequency (rad per time unit of `dt`) of a
/// uniformly sampled series, from the largest-magnitude FFT bin.
/// Bins above n/2 alias to negative frequencies. Returns `None` for
/// series too short to transform, a degenerate sample interval, or an
/// all-zero signal.
pub fn dominant_angular_frequency(series: &[Complex64], dt: f64) -> Option<f64> {
    let n = series.len();
    if n < 2 || !dt.is_finite() || dt <= 0.0 {
        return None;
    }

    let mut buf = series.to_vec();
    let mut planner = FftPlanner::new();
    let fft = planner.plan_fft_forward(n);
    fft.process(&mut buf);

    let mut best = 0usize;
    let mut best_mag = 0.0_f64;
    for (k, v) in buf.iter().enumerate() {
        let mag = v.norm();
        if mag > best_mag {
            best_mag = mag;
            best = k;
        }
    }
    if best_mag == 0.0 {
        return None;
    }

    let k_signed = if best <= n / 2 {
        best as f64
    } else {
        best as f64 - n as f64
    };
    Some(2.0 * std::f64::consts::PI * k_signed / (n as f64 * dt))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn tone(omega: f64, n: usize, dt: f64) -> Vec<Complex64> {
        (0..n)
            .map(|m| Complex64::from_polar(1.0, omega * m as f64 * dt))
            .collect()
    }

    #[test]
    fn recovers_a_bin_centred_negative_tone() {
        let n = 512;
        let dt = 0.01;
        // Exactly six bins below zero, so there is no spectral leakage.
        let omega = -6.0 * 2.0 * std::f64::consts::PI / (n as f64 * dt);
        let series = tone(omega, n, dt);
        let est = dominant_angular_frequency(&series, dt).unwrap();
        assert_relative_eq!(est, omega, max_relative = 1e-12);
        assert!(est < 0.0);
    }

    #[test]
    fn recovers_a_bin_centred_positive_tone() {
        let n = 256;
        let dt = 0.05;
        let omega = 9.0 * 2.0 * std::f64::consts::PI / (n as f64 * dt);
        let series = tone(omega, n, dt);
        let est = dominant_angular_frequency(&series, dt).unwrap();
        assert_relative_eq!(est, omega, max_relative = 1e-12);
    }

    #[test]
    fn degenerate_inputs_yield_none() {
        let series = tone(1.0, 64, 0.1);
        assert_eq!(dominant_angular_frequency(&series[..1], 0.1), None);
        assert_eq!(dominant_angular_frequency(&series, 0.0), None);
        assert_eq!(dominant_angular_frequency(&series, f64::NAN), None);
        let silent = vec![Complex64::new(0.0, 0.0); 64];
        assert_eq!(dominant_angular_frequency(&silent, 0.1), None);
    }
}
