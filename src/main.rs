// src/main.rs
//
// This binary provides a flexible CLI for exploratory runs
// (e.g. quick tests, movies, parameter sweeps).
//
// Outputs from this driver are written to `runs/` (or the directory
// specified via `out=`) and are not committed to version control.
//
// NOTE:
// Reproducible validation scenarios are implemented as dedicated
// executables under `src/bin/*`.
//
// Examples:
//
//   cargo run --release -- honeycomb toy pulse steps=4000 integrator=rk45 movie
//       -> pulse on the central site of a honeycomb sheet with adaptive
//          RK45, saving frames and assembling an MP4 movie.
//
//   cargo run --release -- ring lab pulse integrator=rk45
//       -> 7-site hexagonal ring with bench-top physical constants.
//
//   cargo run --release -- honeycomb toy antiphase integrator=rk4 \
//         steps=2000 frames=200 out=runs movie
//       -> fixed-step RK4 run seeded with the optical band-edge mode,
//          targeting 200 movie frames over 2000 accepted steps.
//
// Typical outputs (per run directory):
//   runs/<run_id>/
//     ├── config.json
//     ├── lattice.png
//     ├── observables.csv
//     ├── energy_vs_time.csv
//     ├── tracked_sites.csv
//     ├── dt_history.csv
//     ├── frames/psi_*.png
//     └── psi_evolution.mp4       (if `movie` is enabled)

use std::env;
use std::fs::{File, create_dir_all};
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::process::Command;
use std::time::{SystemTime, UNIX_EPOCH};

use gyro_sim::config::{
    DerivedConfig, GeometryConfig, NumericsConfig, PhysicsConfig, RunConfig, RunInfo,
};
use gyro_sim::coupling::CouplingParams;
use gyro_sim::energy::{EnergyBreakdown, compute_energy};
use gyro_sim::integrate::{RK45Scratch, SolveError, step_euler, step_rk4, step_rk45_adaptive};
use gyro_sim::lattice::Lattice;
use gyro_sim::params::{Derived, Preset};
use gyro_sim::psi_field::PsiField;
use gyro_sim::visualisation::{
    make_movie_with_ffmpeg, save_displacement_plot, save_energy_components_plot,
    save_energy_residual_plot, save_lattice_plot, save_tracked_sites_plot,
};

use num_complex::Complex64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Integrator {
    Euler,
    /// Classical fixed-step RK4.
    Rk4,
    /// Adaptive Dormand–Prince RK45 (default for dynamics).
    Rk45,
}

impl Integrator {
    fn from_str(s: &str) -> Option<Self> {
        match s {
            "euler" => Some(Self::Euler),
            "rk4" => Some(Self::Rk4),
            "rk45" | "rk45adaptive" | "rk45-adaptive" => Some(Self::Rk45),
            _ => None,
        }
    }

    fn as_str(&self) -> &'static str {
        match self {
            Self::Euler => "euler",
            Self::Rk4 => "rk4",
            Self::Rk45 => "rk45",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GeometryKind {
    /// Honeycomb patch of n x n primitive cells (2n² sites).
    Honeycomb,
    /// 7-site hexagonal ring (centre + six neighbours).
    Ring,
}

impl GeometryKind {
    fn from_arg(s: &str) -> Option<Self> {
        match s {
            "honeycomb" | "sheet" => Some(Self::Honeycomb),
            "ring" | "hex_ring" | "hexring" => Some(Self::Ring),
            _ => None,
        }
    }

    fn as_str(&self) -> &'static str {
        match self {
            Self::Honeycomb => "honeycomb",
            Self::Ring => "hex_ring",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SeedKind {
    /// Single perturbed site near the lattice centre.
    Pulse,
    /// Identical displacement everywhere (exact acoustic mode at Ω⁻).
    Uniform,
    /// ±amp per sublattice (optical band-edge mode at Ω⁺).
    AntiPhase,
    /// Independent random displacements per site.
    Random,
}

impl SeedKind {
    fn from_arg(s: &str) -> Option<Self> {
        match s {
            "pulse" => Some(Self::Pulse),
            "uniform" => Some(Self::Uniform),
            "antiphase" | "anti-phase" => Some(Self::AntiPhase),
            "random" => Some(Self::Random),
            _ => None,
        }
    }

    fn as_str(&self) -> &'static str {
        match self {
            Self::Pulse => "pulse",
            Self::Uniform => "uniform",
            Self::AntiPhase => "antiphase",
            Self::Random => "random",
        }
    }
}

fn print_usage() {
    eprintln!(
        r#"Usage:
  cargo run -- [honeycomb|ring] [lab|toy] [pulse|uniform|antiphase|random] [movie]
             [integrator=euler|rk4|rk45]
             [n=N] [cutoff=VAL] [amp=VAL] [noise=VAL] [seed=N]
             [maxerr=VAL] [headroom=VAL] [dtmin=VAL] [dtmax=VAL]
             [steps=N] [save=N] [fps=N] [dt=VAL] [frames=N]
             [out=DIR] [run=RUN_ID]

Notes:
  - cutoff=, amp= and noise= are in units of the lattice spacing a
    (the default cutoff=1.05 selects nearest neighbours only).
  - This driver logs one CSV sample per *accepted step* (dense, smooth curves).
  - If 'movie' is set, frames are saved at fixed physical spacing:
        frame_dt = save_every * dt0_initial
    by clamping dt to land exactly on each frame time.
  - If 'movie' is not set, frames are saved every save_every accepted steps.
"#
    );
}

fn sanitize_run_id(s: &str) -> String {
    s.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '.' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

fn default_run_id(
    geometry: GeometryKind,
    preset: Preset,
    seed_kind: SeedKind,
    integrator: Integrator,
) -> String {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_else(|_| std::time::Duration::from_secs(0));
    let ts = format!("{}{:03}", now.as_secs(), now.subsec_millis());
    format!(
        "{}_{}_{}_{}_{}",
        ts,
        geometry.as_str(),
        preset.as_str(),
        seed_kind.as_str(),
        integrator.as_str()
    )
}

fn unique_run_dir(out_root: &str, run_id: &str) -> PathBuf {
    let base = PathBuf::from(out_root);
    let mut dir = base.join(run_id);
    if !dir.exists() {
        return dir;
    }
    for k in 1..1000 {
        let cand = base.join(format!("{}_{}", run_id, k));
        if !cand.exists() {
            dir = cand;
            break;
        }
    }
    dir
}

#[allow(clippy::too_many_arguments)]
fn record_sample(
    t: f64,
    lattice: &Lattice,
    psi: &PsiField,
    coupling: &CouplingParams,
    tracked: &[usize],
    writer_obs: &mut BufWriter<File>,
    writer_energy: &mut BufWriter<File>,
    writer_tracked: &mut BufWriter<File>,
) -> Result<EnergyBreakdown, Box<dyn std::error::Error>> {
    let s = psi.sum();
    let e = compute_energy(lattice, psi, coupling)?;

    writeln!(
        writer_obs,
        "{:.16e},{:.16e},{:.16e},{:.16e},{:.16e}",
        t,
        s.re,
        s.im,
        psi.max_abs(),
        psi.rms()
    )?;
    writeln!(
        writer_energy,
        "{:.16e},{:.16e},{:.16e},{:.16e},{:.16e}",
        t,
        e.gravitational,
        e.ferromagnetic,
        e.handed,
        e.total()
    )?;

    let mut row = format!("{:.16e}", t);
    for &j in tracked {
        row.push_str(&format!(",{:.16e},{:.16e}", psi.psi[j].re, psi.psi[j].im));
    }
    writeln!(writer_tracked, "{}", row)?;

    Ok(e)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let argv: Vec<String> = env::args().collect();

    let mut geometry: GeometryKind = GeometryKind::Honeycomb;
    let mut preset: Preset = Preset::Toy;
    let mut seed_kind: SeedKind = SeedKind::Pulse;
    let mut make_movie_flag = false;
    let mut integrator: Integrator = Integrator::Rk45;

    // Optional overrides
    let mut n_override: Option<usize> = None;
    let mut cutoff_override: Option<f64> = None;
    let mut amp_override: Option<f64> = None;
    let mut noise_override: Option<f64> = None;
    let mut seed_override: Option<u64> = None;
    let mut steps_override: Option<usize> = None;
    let mut save_override: Option<usize> = None;
    let mut fps_override: Option<u32> = None;
    let mut dt_override: Option<f64> = None;
    let mut frames_target: Option<usize> = None;

    // Adaptive-controller overrides
    let mut maxerr_override: Option<f64> = None;
    let mut headroom_override: Option<f64> = None;
    let mut dtmin_override: Option<f64> = None;
    let mut dtmax_override: Option<f64> = None;

    // Output controls
    let mut out_root_override: Option<String> = None;
    let mut run_id_override: Option<String> = None;

    for arg in argv.iter().skip(1) {
        if arg == "-h" || arg == "--help" || arg == "help" {
            print_usage();
            return Ok(());
        }

        if let Some(g) = GeometryKind::from_arg(arg) {
            geometry = g;
            continue;
        }
        if let Some(p) = Preset::from_arg(arg) {
            preset = p;
            continue;
        }
        if let Some(k) = SeedKind::from_arg(arg) {
            seed_kind = k;
            continue;
        }
        if arg == "movie" {
            make_movie_flag = true;
            continue;
        }

        if let Some(v) = arg.strip_prefix("integrator=") {
            integrator = Integrator::from_str(v).unwrap_or_else(|| {
                eprintln!("Warning: unknown integrator '{v}', using rk45");
                Integrator::Rk45
            });
            continue;
        }

        if let Some(v) = arg.strip_prefix("n=") {
            n_override = v.parse::<usize>().ok();
            continue;
        }
        if let Some(v) = arg.strip_prefix("cutoff=") {
            cutoff_override = v.parse::<f64>().ok();
            continue;
        }
        if let Some(v) = arg.strip_prefix("amp=") {
            amp_override = v.parse::<f64>().ok();
            continue;
        }
        if let Some(v) = arg.strip_prefix("noise=") {
            noise_override = v.parse::<f64>().ok();
            continue;
        }
        if let Some(v) = arg.strip_prefix("seed=") {
            seed_override = v.parse::<u64>().ok();
            continue;
        }

        if let Some(v) = arg.strip_prefix("maxerr=") {
            maxerr_override = v.parse::<f64>().ok();
            continue;
        }
        if let Some(v) = arg.strip_prefix("headroom=") {
            headroom_override = v.parse::<f64>().ok();
            continue;
        }
        if let Some(v) = arg.strip_prefix("dtmin=") {
            dtmin_override = v.parse::<f64>().ok();
            continue;
        }
        if let Some(v) = arg.strip_prefix("dtmax=") {
            dtmax_override = v.parse::<f64>().ok();
            continue;
        }

        if let Some(v) = arg.strip_prefix("steps=") {
            steps_override = v.parse::<usize>().ok();
            continue;
        }
        if let Some(v) = arg.strip_prefix("save=") {
            save_override = v.parse::<usize>().ok();
            continue;
        }
        if let Some(v) = arg.strip_prefix("fps=") {
            fps_override = v.parse::<u32>().ok();
            continue;
        }
        if let Some(v) = arg.strip_prefix("dt=") {
            dt_override = v.parse::<f64>().ok();
            continue;
        }
        if let Some(v) = arg.strip_prefix("frames=") {
            frames_target = v.parse::<usize>().ok();
            continue;
        }

        if let Some(v) = arg.strip_prefix("out=") {
            out_root_override = Some(v.to_string());
            continue;
        }
        if let Some(v) = arg.strip_prefix("run=") {
            run_id_override = Some(v.to_string());
            continue;
        }

        eprintln!("Warning: ignoring unknown argument '{arg}'");
    }

    // -------- physics and geometry --------
    let gyro = preset.params();
    let derived = Derived::from_params(&gyro)?;
    let a = gyro.lattice_spacing;

    let n_cells = n_override.unwrap_or(6).max(1);
    let lattice = match geometry {
        GeometryKind::Honeycomb => Lattice::honeycomb(n_cells, n_cells, a)?,
        GeometryKind::Ring => Lattice::hex_ring(a)?,
    };

    let cutoff_units = cutoff_override.unwrap_or(1.05);
    let cutoff = cutoff_units * a;
    let coupling = CouplingParams::new(&derived, cutoff)?;

    // -------- run controls --------
    let n_steps = steps_override.unwrap_or(4000);
    let dt0: f64 = dt_override.unwrap_or(derived.fast_period() / 200.0);
    let fps: u32 = fps_override.unwrap_or(30);
    let amp = amp_override.unwrap_or(0.05) * a;
    let noise = noise_override.unwrap_or(0.0) * a;
    let rng_seed = seed_override.unwrap_or(1);

    // Output cadence
    let mut save_every = save_override.unwrap_or(20).max(1);
    if save_override.is_none() {
        if let Some(target) = frames_target {
            let denom = target.saturating_sub(1).max(1);
            let suggested = ((n_steps as f64) / (denom as f64)).ceil() as usize;
            save_every = suggested.max(1);
        }
    }

    // For movie timing: fixed physical spacing between frames
    let frame_dt = (save_every as f64) * dt0;

    // Adaptive settings
    let max_err: f64 = maxerr_override.unwrap_or(1e-6);
    let headroom: f64 = headroom_override.unwrap_or(0.8);

    let mut dt_min: f64 = dtmin_override.unwrap_or(dt0 * 1e-6);
    let mut dt_max: f64 = dtmax_override.unwrap_or(dt0 * 100.0);
    if dt_min <= 0.0 {
        dt_min = dt0 * 1e-6;
    }
    if dt_max <= dt_min {
        dt_max = (dt_min * 10.0).max(dt0);
    }

    // -------- output directory setup --------
    let out_root = out_root_override.unwrap_or_else(|| "runs".to_string());
    create_dir_all(&out_root)?;

    let mut run_id =
        run_id_override.unwrap_or_else(|| default_run_id(geometry, preset, seed_kind, integrator));
    run_id = sanitize_run_id(&run_id);

    let run_dir = unique_run_dir(&out_root, &run_id);
    create_dir_all(&run_dir)?;
    let frames_dir = run_dir.join("frames");
    create_dir_all(&frames_dir)?;

    let ffmpeg_pattern = frames_dir.join("psi_*.png").to_string_lossy().to_string();

    // -------------------------------------------------
    // Write config.json
    // -------------------------------------------------
    let (cfg_n1, cfg_n2) = match geometry {
        GeometryKind::Honeycomb => (n_cells, n_cells),
        GeometryKind::Ring => (0, 0),
    };
    let run_config = RunConfig {
        geometry: GeometryConfig {
            kind: geometry.as_str().to_string(),
            n1: cfg_n1,
            n2: cfg_n2,
            spacing: a,
            n_sites: lattice.len(),
            cutoff,
        },
        physics: PhysicsConfig::from_params(preset.as_str(), &gyro),
        derived: DerivedConfig::from(&derived),
        numerics: NumericsConfig {
            integrator: integrator.as_str().to_string(),
            dt: dt0,
            steps: n_steps,
            output_stride: save_every,
            max_err: if integrator == Integrator::Rk45 {
                Some(max_err)
            } else {
                None
            },
            headroom: if integrator == Integrator::Rk45 {
                Some(headroom)
            } else {
                None
            },
            dt_min: if integrator == Integrator::Rk45 {
                Some(dt_min)
            } else {
                None
            },
            dt_max: if integrator == Integrator::Rk45 {
                Some(dt_max)
            } else {
                None
            },
        },
        run: RunInfo {
            binary: "gyro-sim".to_string(),
            run_id: run_id.clone(),
            seed: Some(rng_seed),
            git_commit: None,
            timestamp_utc: None,
        },
    };
    run_config.write_to_dir(&run_dir)?;

    // Keep frame ordering stable under glob
    let frame_pad: usize = 6;

    // -------- initial condition --------
    // Pulse target: the site closest to the patch centre.
    let (x_min, x_max, y_min, y_max) = lattice.bounding_box();
    let centre_site = lattice.nearest_site(0.5 * (x_min + x_max), 0.5 * (y_min + y_max));

    let mut psi = match seed_kind {
        SeedKind::Pulse => {
            println!("Initial condition: pulse on site {}", centre_site);
            PsiField::single_site(lattice.len(), centre_site, Complex64::new(amp, 0.0))
        }
        SeedKind::Uniform => {
            println!("Initial condition: uniform displacement (acoustic mode)");
            PsiField::uniform(lattice.len(), Complex64::new(amp, 0.0))
        }
        SeedKind::AntiPhase => {
            println!("Initial condition: anti-phase A/B (optical mode)");
            PsiField::anti_phase(&lattice, amp)
        }
        SeedKind::Random => {
            println!("Initial condition: random displacements, seed {}", rng_seed);
            PsiField::random(lattice.len(), rng_seed, amp)
        }
    };
    if noise > 0.0 {
        // Offset the seed so a `random` base and its noise differ.
        psi.add_noise(rng_seed.wrapping_add(1), noise);
    }

    let mut scratch = RK45Scratch::new(lattice.len());

    // Displacement magnification for frames, fixed across the whole run
    // so movie geometry does not wobble.
    let disp_scale = 0.3 * a / amp.max(noise).max(1e-300);

    // Tracked sites: the pulse target plus its in-cutoff neighbours.
    let mut tracked: Vec<usize> = vec![centre_site];
    {
        let centre = lattice.site(centre_site);
        let mut neigh: Vec<(f64, usize)> = lattice
            .sites()
            .iter()
            .enumerate()
            .filter(|&(j, s)| j != centre_site && s.distance_to(&centre) <= cutoff)
            .map(|(j, s)| (s.distance_to(&centre), j))
            .collect();
        neigh.sort_by(|p, q| p.partial_cmp(q).unwrap());
        tracked.extend(neigh.into_iter().take(3).map(|(_, j)| j));
    }

    println!("--- gyro-sim run config ---");
    println!("run_dir: {}", run_dir.to_string_lossy());
    println!(
        "geometry: {} n_sites={} spacing={:.3e} m",
        geometry.as_str(),
        lattice.len(),
        a
    );
    println!("preset: {}", preset.as_str());
    println!("seed:   {}", seed_kind.as_str());
    println!("integrator: {}", integrator.as_str());
    println!(
        "derived: L={:.6e} k={:.6e} Og={:.6e} Om={:.6e} O-={:.6e} O+={:.6e}",
        derived.spin_momentum,
        derived.spring_k,
        derived.omega_g,
        derived.omega_m,
        derived.omega_minus,
        derived.omega_plus
    );
    println!(
        "coupling: cutoff={:.3e} m ({:.2} a)  c_fm={:.3e} c_handed={:.3e}",
        cutoff,
        cutoff_units,
        derived.c_fm(),
        derived.c_handed()
    );
    println!(
        "run:    steps={} dt0={:.6e} save_every={} fps={} amp={:.3e} noise={:.3e} seed={}",
        n_steps, dt0, save_every, fps, amp, noise, rng_seed
    );
    if integrator == Integrator::Rk45 {
        println!(
            "rk45:   MaxErr={} headroom={} dt_min={} dt_max={}",
            max_err, headroom, dt_min, dt_max
        );
    }
    println!("movie frame_dt (physical) = {:.3e} s", frame_dt);
    println!("tracked sites: {:?}", tracked);
    println!("---------------------------");

    // Lattice geometry plot, once per run.
    save_lattice_plot(&lattice, cutoff, run_dir.join("lattice.png").to_str().unwrap())?;

    // CSV outputs
    let file_obs: File = File::create(run_dir.join("observables.csv"))?;
    let mut writer_obs: BufWriter<File> = BufWriter::new(file_obs);
    writeln!(writer_obs, "t,sum_re,sum_im,max_abs,rms")?;

    let file_energy: File = File::create(run_dir.join("energy_vs_time.csv"))?;
    let mut writer_energy: BufWriter<File> = BufWriter::new(file_energy);
    writeln!(writer_energy, "t,E_grav,E_fm,E_handed,E_tot")?;

    let file_tracked: File = File::create(run_dir.join("tracked_sites.csv"))?;
    let mut writer_tracked: BufWriter<File> = BufWriter::new(file_tracked);
    {
        let mut header = String::from("t");
        for &j in &tracked {
            header.push_str(&format!(",site{}_re,site{}_im", j, j));
        }
        writeln!(writer_tracked, "{}", header)?;
    }

    let file_dt: File = File::create(run_dir.join("dt_history.csv"))?;
    let mut writer_dt: BufWriter<File> = BufWriter::new(file_dt);
    writeln!(writer_dt, "attempt,t,dt,eps,accepted")?;

    // Vectors for plots (dense: one per accepted step)
    let n_pts = n_steps + 1;
    let mut times: Vec<f64> = Vec::with_capacity(n_pts);
    let mut energies: Vec<EnergyBreakdown> = Vec::with_capacity(n_pts);
    let mut tracked_re: Vec<Vec<f64>> = vec![Vec::with_capacity(n_pts); tracked.len()];
    let mut tracked_abs: Vec<Vec<f64>> = vec![Vec::with_capacity(n_pts); tracked.len()];

    // Print about ~100 lines max
    let print_every = (n_steps / 100).max(10);

    // Frame logic
    let tol_time: f64 = 1e-15;
    let mut next_frame_t: f64 = 0.0;
    let mut frame_idx: usize = 0;

    // Step loop state
    let mut t: f64 = 0.0;
    let mut dt: f64 = dt0;
    let mut step: usize = 0;
    let mut attempt: usize = 0;

    // --- record step 0 ---
    {
        let e = record_sample(
            t,
            &lattice,
            &psi,
            &coupling,
            &tracked,
            &mut writer_obs,
            &mut writer_energy,
            &mut writer_tracked,
        )?;
        times.push(t);
        energies.push(e);
        for (k, &j) in tracked.iter().enumerate() {
            tracked_re[k].push(psi.psi[j].re);
            tracked_abs[k].push(psi.psi[j].norm());
        }

        // Always save an initial frame so ordering is clear
        let fname = frames_dir.join(format!("psi_{:0width$}.png", frame_idx, width = frame_pad));
        save_displacement_plot(&lattice, &psi, disp_scale, t, fname.to_str().unwrap())?;
        frame_idx += 1;
        next_frame_t += frame_dt;
    }

    // --- main loop ---
    while step < n_steps {
        attempt += 1;

        // If movie is requested, enforce constant physical frame spacing by
        // clamping dt to land on next_frame_t (restored below for fixed-step).
        let dt_saved = dt;
        if make_movie_flag {
            let remaining_to_frame = next_frame_t - t;
            if remaining_to_frame > tol_time && dt > remaining_to_frame {
                dt = remaining_to_frame;
            }
        }

        let (eps, accepted, dt_used) = match integrator {
            Integrator::Rk45 => step_rk45_adaptive(
                &lattice,
                &mut psi,
                &mut dt,
                &coupling,
                &mut scratch,
                max_err,
                headroom,
                dt_min,
                dt_max,
            ),
            Integrator::Rk4 => {
                let dt_step = dt;
                step_rk4(&lattice, &mut psi, dt_step, &coupling, &mut scratch);
                dt = dt_saved;
                (0.0, true, dt_step)
            }
            Integrator::Euler => {
                let dt_step = dt;
                step_euler(&lattice, &mut psi, dt_step, &coupling, &mut scratch);
                dt = dt_saved;
                (0.0, true, dt_step)
            }
        };

        writeln!(
            writer_dt,
            "{},{:.16e},{:.16e},{:.16e},{}",
            attempt,
            t,
            dt_used,
            eps,
            if accepted { 1 } else { 0 }
        )?;

        if !accepted {
            // RK45 already proposed a smaller retry; give up once the
            // rejected attempt ran at dt_min.
            if dt_used <= dt_min * (1.0 + 1e-6) {
                return Err(Box::new(SolveError::NonConvergence { t, eps, dt_min }));
            }
            continue;
        }

        t += dt_used;
        step += 1;

        if let Some(site) = psi.first_non_finite() {
            return Err(Box::new(SolveError::NonFinite { t, site }));
        }

        let e = record_sample(
            t,
            &lattice,
            &psi,
            &coupling,
            &tracked,
            &mut writer_obs,
            &mut writer_energy,
            &mut writer_tracked,
        )?;
        times.push(t);
        energies.push(e);
        for (k, &j) in tracked.iter().enumerate() {
            tracked_re[k].push(psi.psi[j].re);
            tracked_abs[k].push(psi.psi[j].norm());
        }

        if step % print_every == 0 {
            if integrator == Integrator::Rk45 {
                println!(
                    "step {:6}, t = {:.3e}, dt = {:.3e}, eps = {:.3e}, E_tot = {:.3e}",
                    step,
                    t,
                    dt_used,
                    eps,
                    e.total()
                );
            } else {
                println!("step {:6}, t = {:.3e}, E_tot = {:.3e}", step, t, e.total());
            }
        }

        // Frame saving:
        // - If movie flag: save at constant physical spacing (next_frame_t schedule).
        // - Else: every save_every accepted steps.
        if make_movie_flag {
            if t + tol_time >= next_frame_t {
                let fname =
                    frames_dir.join(format!("psi_{:0width$}.png", frame_idx, width = frame_pad));
                save_displacement_plot(&lattice, &psi, disp_scale, t, fname.to_str().unwrap())?;
                frame_idx += 1;
                next_frame_t += frame_dt;
            }
        } else if step % save_every == 0 || step == n_steps {
            let fname =
                frames_dir.join(format!("psi_{:0width$}.png", frame_idx, width = frame_pad));
            save_displacement_plot(&lattice, &psi, disp_scale, t, fname.to_str().unwrap())?;
            frame_idx += 1;
        }
    }

    // Plots
    let mut series: Vec<(String, Vec<f64>)> = Vec::new();
    for (k, &j) in tracked.iter().enumerate() {
        series.push((format!("site {} Re psi", j), tracked_re[k].clone()));
        series.push((format!("site {} |psi|", j), tracked_abs[k].clone()));
    }
    let _ = save_tracked_sites_plot(
        &times,
        &series,
        run_dir.join("tracked_sites.png").to_str().unwrap(),
    );
    let _ = save_energy_components_plot(
        &times,
        &energies,
        run_dir.join("energy_vs_time.png").to_str().unwrap(),
    );
    let _ = save_energy_residual_plot(
        &times,
        &energies,
        run_dir
            .join("energy_residual_vs_time.png")
            .to_str()
            .unwrap(),
    );

    // Optional movie
    if make_movie_flag {
        let movie_path = run_dir.join("psi_evolution.mp4");
        if let Err(e) = make_movie_with_ffmpeg(&ffmpeg_pattern, movie_path.to_str().unwrap(), fps) {
            eprintln!("Could not create movie with ffmpeg: {e}");
        } else {
            println!("Saved movie to {}", movie_path.to_string_lossy());
            #[cfg(target_os = "macos")]
            {
                let _ = Command::new("open").arg(movie_path.as_os_str()).status();
            }
        }
    } else {
        println!("Movie generation skipped (no 'movie' flag).");
    }

    println!("Done. Outputs in {}", run_dir.to_string_lossy());
    Ok(())
}
