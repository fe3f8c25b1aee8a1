// src/bin/edge_pulse.rs
//
// Honeycomb sheet with an initial pulse on a boundary site. The bulk of
// this system is gapped while the boundary carries one-way modes, so
// the pulse should travel along the edge in a single direction instead
// of spreading symmetrically. Frames are saved at fixed physical
// spacing; pass `movie` to stitch them into an MP4 (ffmpeg from PATH).
//
// Run:
//   cargo run --release --bin edge_pulse
//   cargo run --release --bin edge_pulse -- movie fps=24
//
// Output:
//   out/edge_pulse/
//     ├── config.json
//     ├── lattice.png
//     ├── observables.csv
//     ├── dt_history.csv
//     ├── frames/psi_*.png
//     └── psi_evolution.mp4   (with `movie`)

use std::fs::{File, create_dir_all};
use std::io::{BufWriter, Write};
use std::path::Path;

use gyro_sim::config::{
    DerivedConfig, GeometryConfig, NumericsConfig, PhysicsConfig, RunConfig, RunInfo,
};
use gyro_sim::coupling::CouplingParams;
use gyro_sim::energy::compute_energy;
use gyro_sim::integrate::{EvolveSettings, RK45Scratch, advance_to};
use gyro_sim::lattice::Lattice;
use gyro_sim::params::{Derived, Preset};
use gyro_sim::psi_field::PsiField;
use gyro_sim::visualisation::{make_movie_with_ffmpeg, save_displacement_plot, save_lattice_plot};

use num_complex::Complex64;

fn parse_args() -> (bool, u32) {
    let mut movie = false;
    let mut fps: u32 = 24;
    for a in std::env::args().skip(1) {
        if a == "movie" {
            movie = true;
        } else if let Some(v) = a.strip_prefix("fps=") {
            if let Ok(val) = v.parse::<u32>() {
                fps = val;
            }
        } else {
            eprintln!("Warning: ignoring unknown argument '{a}'");
        }
    }
    (movie, fps)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // --- scenario parameters ---
    let preset = Preset::Toy;
    let n1: usize = 10;
    let n2: usize = 6;
    let cutoff_units: f64 = 1.05;
    let amp_units: f64 = 0.1;

    // Frame cadence: 10 frames per fast period, 12 periods total.
    let frames_per_period: usize = 10;
    let n_periods: usize = 12;

    // RK45 controller
    let max_err: f64 = 1e-6;
    let headroom: f64 = 0.8;
    // ---------------------------

    let (make_movie_flag, fps) = parse_args();

    let gyro = preset.params();
    let derived = Derived::from_params(&gyro)?;
    let a = gyro.lattice_spacing;

    let lattice = Lattice::honeycomb(n1, n2, a)?;
    let cutoff = cutoff_units * a;
    let coupling = CouplingParams::new(&derived, cutoff)?;

    let frame_dt: f64 = derived.fast_period() / frames_per_period as f64;
    let n_frames: usize = frames_per_period * n_periods;

    let dt0: f64 = derived.fast_period() / 200.0;
    let settings = EvolveSettings {
        max_err,
        headroom,
        dt_min: dt0 * 1e-6,
        dt_max: dt0 * 100.0,
        ..EvolveSettings::default()
    };

    // Pulse on the boundary site closest to the middle of the bottom edge.
    let (x_min, x_max, y_min, _y_max) = lattice.bounding_box();
    let pulse_site = lattice.nearest_site(0.5 * (x_min + x_max), y_min);

    let amp = amp_units * a;
    let mut psi = PsiField::single_site(lattice.len(), pulse_site, Complex64::new(amp, 0.0));
    let mut scratch = RK45Scratch::new(lattice.len());

    // Fixed magnification so movie geometry does not wobble.
    let disp_scale = 0.3 * a / amp;

    // Output dirs
    let out_dir = Path::new("out").join("edge_pulse");
    let frames_dir = out_dir.join("frames");
    create_dir_all(&frames_dir)?;
    let frame_pad: usize = 6;

    // config.json
    let run_config = RunConfig {
        geometry: GeometryConfig {
            kind: "honeycomb".to_string(),
            n1,
            n2,
            spacing: a,
            n_sites: lattice.len(),
            cutoff,
        },
        physics: PhysicsConfig::from_params(preset.as_str(), &gyro),
        derived: DerivedConfig::from(&derived),
        numerics: NumericsConfig {
            integrator: "rk45".to_string(),
            dt: dt0,
            steps: n_frames,
            output_stride: 1,
            max_err: Some(max_err),
            headroom: Some(headroom),
            dt_min: Some(settings.dt_min),
            dt_max: Some(settings.dt_max),
        },
        run: RunInfo {
            binary: "edge_pulse".to_string(),
            run_id: "edge_pulse".to_string(),
            seed: None,
            git_commit: None,
            timestamp_utc: None,
        },
    };
    run_config.write_to_dir(&out_dir)?;

    save_lattice_plot(&lattice, cutoff, out_dir.join("lattice.png").to_str().unwrap())?;

    // CSV outputs
    let file_obs = File::create(out_dir.join("observables.csv"))?;
    let mut w = BufWriter::new(file_obs);
    writeln!(w, "t,sum_re,sum_im,max_abs,rms,E_tot")?;

    let file_dt = File::create(out_dir.join("dt_history.csv"))?;
    let mut wdt = BufWriter::new(file_dt);
    writeln!(wdt, "attempt,t,dt,eps,accepted")?;

    let write_row = |t: f64, psi: &PsiField, w: &mut BufWriter<File>| -> Result<(), Box<dyn std::error::Error>> {
        let s = psi.sum();
        let e = compute_energy(&lattice, psi, &coupling)?;
        writeln!(
            w,
            "{:.16e},{:.16e},{:.16e},{:.16e},{:.16e},{:.16e}",
            t,
            s.re,
            s.im,
            psi.max_abs(),
            psi.rms(),
            e.total()
        )?;
        Ok(())
    };

    println!("--- edge_pulse ---");
    println!(
        "honeycomb {}x{} cells, {} sites, pulse on boundary site {}",
        n1,
        n2,
        lattice.len(),
        pulse_site
    );
    println!(
        "Omega- = {:.3e} rad/s, Omega+ = {:.3e} rad/s, frame_dt = {:.3e} s, {} frames",
        derived.omega_minus, derived.omega_plus, frame_dt, n_frames
    );

    // Frame 0
    write_row(0.0, &psi, &mut w)?;
    let fname = frames_dir.join(format!("psi_{:0width$}.png", 0, width = frame_pad));
    save_displacement_plot(&lattice, &psi, disp_scale, 0.0, fname.to_str().unwrap())?;

    let mut t: f64 = 0.0;
    let mut dt: f64 = dt0;
    let mut attempt: u64 = 0;
    let mut accepted_total: u64 = 0;

    for k in 1..=n_frames {
        let t_target = (k as f64) * frame_dt;

        let report = advance_to(
            &lattice,
            &mut psi,
            &mut t,
            t_target,
            &mut dt,
            &coupling,
            &mut scratch,
            &settings,
            |att| {
                attempt += 1;
                let _ = writeln!(
                    wdt,
                    "{},{:.16e},{:.16e},{:.16e},{}",
                    attempt,
                    att.t,
                    att.dt,
                    att.eps,
                    if att.accepted { 1 } else { 0 }
                );
            },
        )?;
        accepted_total += report.accepted_steps;

        write_row(t, &psi, &mut w)?;
        let fname = frames_dir.join(format!("psi_{:0width$}.png", k, width = frame_pad));
        save_displacement_plot(&lattice, &psi, disp_scale, t, fname.to_str().unwrap())?;

        if k % frames_per_period == 0 {
            println!(
                "frame {:4} / {}, t = {:.3e} s, max|psi| = {:.3e} m",
                k,
                n_frames,
                t,
                psi.max_abs()
            );
        }
    }

    if make_movie_flag {
        let pattern = frames_dir.join("psi_*.png").to_string_lossy().to_string();
        let movie_path = out_dir.join("psi_evolution.mp4");
        if let Err(e) = make_movie_with_ffmpeg(&pattern, movie_path.to_str().unwrap(), fps) {
            eprintln!("Could not create movie with ffmpeg: {e}");
        } else {
            println!("Saved movie to {}", movie_path.to_string_lossy());
        }
    }

    println!(
        "Done: {} frames over {:.3e} s, {} accepted steps. Outputs in {:?}",
        n_frames + 1,
        n_frames as f64 * frame_dt,
        accepted_total,
        out_dir
    );
    Ok(())
}
