// src/visualisation.rs

use plotters::prelude::*;
use std::io;
use std::process::Command;

use crate::energy::EnergyBreakdown;
use crate::lattice::{Lattice, Sublattice};
use crate::psi_field::PsiField;

/// Map |ψ| to a blue-white-red colour using a *local* min/max,
/// so small variations are still visible.
///
/// min maps to blue, max maps to red, midpoint to white.
fn abs_to_color(v: f64, min_v: f64, max_v: f64) -> RGBColor {
    // Protect against min ≈ max (e.g. perfectly uniform amplitude)
    let mut lo = min_v;
    let mut hi = max_v;
    if !lo.is_finite() || !hi.is_finite() || (hi - lo).abs() < 1e-12 {
        lo = 0.0;
        hi = 1.0;
    }

    let x = ((v - lo) / (hi - lo)).clamp(0.0, 1.0);

    let r = (255.0 * x) as u8;
    let b = (255.0 * (1.0 - x)) as u8;
    let g = (255.0 * (1.0 - (2.0 * (x - 0.5).abs()))).clamp(0.0, 255.0) as u8;

    RGBColor(r, g, b)
}

/// Pad a data range by 10% (or a unit window when degenerate).
fn padded_range(lo: f64, hi: f64) -> (f64, f64) {
    if !lo.is_finite() || !hi.is_finite() {
        return (-1.0, 1.0);
    }
    if (hi - lo).abs() < 1e-30 {
        let delta = if hi.abs() < 1e-30 { 1.0 } else { 0.1 * hi.abs() };
        (lo - delta, hi + delta)
    } else {
        let margin = 0.1 * (hi - lo);
        (lo - margin, hi + margin)
    }
}

/// Save the lattice geometry as a PNG: A sites red, B sites blue, bond
/// segments within `cutoff` in grey. Axes are in units of the lattice
/// spacing.
pub fn save_lattice_plot(
    lattice: &Lattice,
    cutoff: f64,
    filename: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let a = lattice.spacing();
    let (x_min, x_max, y_min, y_max) = lattice.bounding_box();
    let (x_lo, x_hi) = padded_range(x_min / a, x_max / a);
    let (y_lo, y_hi) = padded_range(y_min / a, y_max / a);

    let root = BitMapBackend::new(filename, (900, 800)).into_drawing_area();
    root.fill(&WHITE)?;

    let mut chart = ChartBuilder::on(&root)
        .margin(30)
        .caption("Lattice sites and bonds", ("sans-serif", 24))
        .x_label_area_size(45)
        .y_label_area_size(55)
        .build_cartesian_2d(x_lo..x_hi, y_lo..y_hi)?;

    chart
        .configure_mesh()
        .x_desc("x / a")
        .y_desc("y / a")
        .axis_desc_style(("sans-serif", 16))
        .draw()?;

    let bonds = lattice.bonds(cutoff)?;
    chart.draw_series(bonds.iter().map(|&(i, j)| {
        let si = lattice.site(i);
        let sj = lattice.site(j);
        PathElement::new(
            vec![(si.x / a, si.y / a), (sj.x / a, sj.y / a)],
            BLACK.mix(0.35),
        )
    }))?;

    for (sub, color) in [(Sublattice::A, RED), (Sublattice::B, BLUE)] {
        chart
            .draw_series(
                lattice
                    .sites()
                    .iter()
                    .filter(|s| s.sublattice == sub)
                    .map(|s| Circle::new((s.x / a, s.y / a), 5, color.filled())),
            )?
            .label(sub.label())
            .legend(move |(x, y)| Circle::new((x + 10, y), 5, color.filled()));
    }

    chart
        .configure_series_labels()
        .border_style(&BLACK)
        .background_style(&WHITE.mix(0.8))
        .draw()?;

    root.present()?;
    Ok(())
}

/// Snapshot of the displacement field: each site drawn at its rest
/// position plus `scale · (Re ψ, Im ψ)`, coloured by |ψ| (blue = min,
/// white = mid, red = max over this frame). Rest positions stay visible
/// as small grey dots. Axes are in units of the lattice spacing.
///
/// `scale` is the caller's displacement magnification; keep it fixed
/// across frames so movie geometry does not wobble.
pub fn save_displacement_plot(
    lattice: &Lattice,
    psi: &PsiField,
    scale: f64,
    t: f64,
    filename: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let a = lattice.spacing();
    let (x_min, x_max, y_min, y_max) = lattice.bounding_box();
    let (x_lo, x_hi) = padded_range(x_min / a, x_max / a);
    let (y_lo, y_hi) = padded_range(y_min / a, y_max / a);

    // First pass: local |ψ| range for the colour map.
    let mut min_abs = f64::INFINITY;
    let mut max_abs = f64::NEG_INFINITY;
    for p in &psi.psi {
        let v = p.norm();
        if v.is_finite() {
            min_abs = min_abs.min(v);
            max_abs = max_abs.max(v);
        }
    }

    let root = BitMapBackend::new(filename, (900, 800)).into_drawing_area();
    root.fill(&WHITE)?;

    let mut chart = ChartBuilder::on(&root)
        .margin(30)
        .caption(
            format!("Displacement field at t = {:.4e} s", t),
            ("sans-serif", 22),
        )
        .x_label_area_size(45)
        .y_label_area_size(55)
        .build_cartesian_2d(x_lo..x_hi, y_lo..y_hi)?;

    chart
        .configure_mesh()
        .x_desc("x / a")
        .y_desc("y / a")
        .axis_desc_style(("sans-serif", 16))
        .draw()?;

    chart.draw_series(
        lattice
            .sites()
            .iter()
            .map(|s| Circle::new((s.x / a, s.y / a), 2, BLACK.mix(0.25).filled())),
    )?;

    chart.draw_series(lattice.sites().iter().zip(&psi.psi).map(|(s, p)| {
        let x = (s.x + scale * p.re) / a;
        let y = (s.y + scale * p.im) / a;
        let color = abs_to_color(p.norm(), min_abs, max_abs);
        Circle::new((x, y), 5, color.filled())
    }))?;

    root.present()?;
    Ok(())
}

/// Plot time series for a handful of tracked sites, one labelled line
/// per series. Callers pass whichever scalar they track (Re ψ, |ψ|, …)
/// with a label naming the site and the quantity.
pub fn save_tracked_sites_plot(
    times: &[f64],
    series: &[(String, Vec<f64>)],
    filename: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    if times.is_empty() || series.is_empty() {
        return Ok(()); // nothing to plot
    }

    let t_min = *times.first().unwrap();
    let t_max = *times.last().unwrap();

    let mut y_min = f64::INFINITY;
    let mut y_max = f64::NEG_INFINITY;
    for (_, values) in series {
        for &v in values {
            if v.is_finite() {
                y_min = y_min.min(v);
                y_max = y_max.max(v);
            }
        }
    }
    let (y_lo, y_hi) = padded_range(y_min, y_max);

    let root = BitMapBackend::new(filename, (1024, 768)).into_drawing_area();
    root.fill(&WHITE)?;

    let mut chart = ChartBuilder::on(&root)
        .margin(20)
        .caption("Tracked site displacement vs time", ("sans-serif", 30))
        .set_left_and_bottom_label_area_size(60)
        .build_cartesian_2d(t_min..t_max, y_lo..y_hi)?;

    chart
        .configure_mesh()
        .x_desc("time (s)")
        .y_desc("displacement (m)")
        .label_style(("sans-serif", 16))
        .axis_desc_style(("sans-serif", 18))
        .draw()?;

    for (idx, (label, values)) in series.iter().enumerate() {
        let color = Palette99::pick(idx).to_rgba();
        chart
            .draw_series(LineSeries::new(
                times.iter().zip(values.iter()).map(|(&t, &v)| (t, v)),
                &color,
            ))?
            .label(label.clone())
            .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], color));
    }

    chart
        .configure_series_labels()
        .border_style(&BLACK)
        .background_style(&WHITE.mix(0.8))
        .draw()?;

    root.present()?;
    Ok(())
}

/// Plot gravitational, ferromagnetic, handed and total energy versus time.
pub fn save_energy_components_plot(
    times: &[f64],
    energies: &[EnergyBreakdown],
    filename: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    if times.is_empty() || energies.is_empty() {
        return Ok(()); // nothing to plot
    }

    let root = BitMapBackend::new(filename, (1024, 768)).into_drawing_area();
    root.fill(&WHITE)?;

    let t_min = *times.first().unwrap();
    let t_max = *times.last().unwrap();

    // --- find global y-range over all components ---
    let mut y_min = f64::INFINITY;
    let mut y_max = f64::NEG_INFINITY;
    for e in energies {
        for v in [e.gravitational, e.ferromagnetic, e.handed, e.total()] {
            if v.is_finite() {
                y_min = y_min.min(v);
                y_max = y_max.max(v);
            }
        }
    }
    let (y_lo, y_hi) = padded_range(y_min, y_max);

    // ---------- choose a 10^n scaling for nicer axes ----------
    let magnitude = y_hi.abs().max(y_lo.abs());
    let (scale, y_label): (f64, String) = if magnitude > 0.0 {
        let exp = magnitude.log10().floor() as i32;
        if exp == 0 {
            (1.0, "Energy (arb. units)".to_string())
        } else {
            (10f64.powi(exp), format!("Energy (arb. units × 10^{})", exp))
        }
    } else {
        (1.0, "Energy (arb. units)".to_string())
    };

    let mut chart = ChartBuilder::on(&root)
        .margin(20)
        .caption("Energy components vs time", ("sans-serif", 30))
        .set_left_and_bottom_label_area_size(60)
        .build_cartesian_2d(t_min..t_max, (y_lo / scale)..(y_hi / scale))?;

    chart
        .configure_mesh()
        .x_desc("time (s)")
        .y_desc(y_label)
        .x_labels(10)
        .y_labels(10)
        .label_style(("sans-serif", 16))
        .axis_desc_style(("sans-serif", 18))
        .draw()?;

    let components: [(&str, fn(&EnergyBreakdown) -> f64, RGBColor); 4] = [
        ("Gravitational", |e| e.gravitational, RED),
        ("Ferromagnetic", |e| e.ferromagnetic, BLUE),
        ("Handed", |e| e.handed, GREEN),
        ("Total", |e| e.total(), BLACK),
    ];
    for (label, pick, color) in components {
        chart
            .draw_series(LineSeries::new(
                times
                    .iter()
                    .zip(energies.iter())
                    .map(|(&t, e)| (t, pick(e) / scale)),
                &color,
            ))?
            .label(label)
            .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], color));
    }

    chart
        .configure_series_labels()
        .border_style(&BLACK)
        .background_style(&WHITE.mix(0.8))
        .draw()?;

    root.present()?;
    Ok(())
}

/// Plot the drift of the total energy, ΔE(t) = E(t) − E(0). For an
/// exactly conserved invariant this is pure integrator error.
pub fn save_energy_residual_plot(
    times: &[f64],
    energies: &[EnergyBreakdown],
    filename: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    if times.is_empty() || energies.is_empty() {
        return Ok(());
    }

    let e0 = energies[0].total();
    let residuals: Vec<f64> = energies.iter().map(|e| e.total() - e0).collect();

    let t_min = *times.first().unwrap();
    let t_max = *times.last().unwrap();

    let mut y_min = f64::INFINITY;
    let mut y_max = f64::NEG_INFINITY;
    for &de in &residuals {
        if de.is_finite() {
            y_min = y_min.min(de);
            y_max = y_max.max(de);
        }
    }
    let (y_lo, y_hi) = padded_range(y_min, y_max);

    let root = BitMapBackend::new(filename, (1024, 768)).into_drawing_area();
    root.fill(&WHITE)?;

    let mut chart = ChartBuilder::on(&root)
        .margin(20)
        .caption("Total energy residual vs time", ("sans-serif", 30))
        .set_left_and_bottom_label_area_size(60)
        .build_cartesian_2d(t_min..t_max, y_lo..y_hi)?;

    chart
        .configure_mesh()
        .x_desc("time (s)")
        .y_desc("ΔE(t) = E(t) − E(0) (arb. units)")
        .draw()?;

    chart.draw_series(LineSeries::new(
        times.iter().zip(residuals.iter()).map(|(&t, &de)| (t, de)),
        &BLACK,
    ))?;

    root.present()?;
    Ok(())
}

/// Use `ffmpeg` to stitch all frames/psi_*.png into an MP4 movie.
/// Assumes filenames like frames/psi_0000.png, psi_0010.png, ...
/// `ffmpeg` is resolved from PATH.
pub fn make_movie_with_ffmpeg(pattern: &str, output: &str, fps: u32) -> io::Result<()> {
    let status = Command::new("ffmpeg")
        .args([
            "-y", // overwrite output if it exists
            "-framerate",
            &fps.to_string(),
            "-pattern_type",
            "glob",
            "-i",
            pattern, // e.g. "frames/psi_*.png"
            "-pix_fmt",
            "yuv420p",
            output, // e.g. "psi_evolution.mp4"
        ])
        .status()?;

    if !status.success() {
        eprintln!("ffmpeg exited with status {:?}", status);
    }

    Ok(())
}
