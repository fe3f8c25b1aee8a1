use serde::Serialize;
use std::fs::File;
use std::path::Path;

use crate::params::{Derived, GyroParams};

#[derive(Serialize)]
pub struct RunConfig {
    pub geometry: GeometryConfig,
    pub physics: PhysicsConfig,
    pub derived: DerivedConfig,
    pub numerics: NumericsConfig,
    pub run: RunInfo,
}

#[derive(Serialize)]
pub struct GeometryConfig {
    /// "honeycomb" or "hex_ring".
    pub kind: String,
    pub n1: usize,
    pub n2: usize,
    pub spacing: f64,
    pub n_sites: usize,
    pub cutoff: f64,
}

#[derive(Serialize)]
pub struct PhysicsConfig {
    pub preset: String,
    pub disc_mass: f64,
    pub disc_radius: f64,
    pub spin_rate: f64,
    pub pendulum_length: f64,
    pub magnet_moment: f64,
    pub lattice_spacing: f64,
    pub gravity: f64,
}

impl PhysicsConfig {
    pub fn from_params(preset: &str, p: &GyroParams) -> Self {
        Self {
            preset: preset.to_string(),
            disc_mass: p.disc_mass,
            disc_radius: p.disc_radius,
            spin_rate: p.spin_rate,
            pendulum_length: p.pendulum_length,
            magnet_moment: p.magnet_moment,
            lattice_spacing: p.lattice_spacing,
            gravity: p.gravity,
        }
    }
}

#[derive(Serialize)]
pub struct DerivedConfig {
    pub spin_momentum: f64,
    pub spring_k: f64,
    pub omega_g: f64,
    pub omega_m: f64,
    pub omega_minus: f64,
    pub omega_plus: f64,
}

impl From<&Derived> for DerivedConfig {
    fn from(d: &Derived) -> Self {
        Self {
            spin_momentum: d.spin_momentum,
            spring_k: d.spring_k,
            omega_g: d.omega_g,
            omega_m: d.omega_m,
            omega_minus: d.omega_minus,
            omega_plus: d.omega_plus,
        }
    }
}

#[derive(Serialize)]
pub struct NumericsConfig {
    pub integrator: String,
    /// Initial timestep (s). For the adaptive integrator dt varies during the run; see dt_history.csv.
    pub dt: f64,
    pub steps: usize,
    pub output_stride: usize,

    // Adaptive-step settings, absent for fixed-step integrators
    pub max_err: Option<f64>,
    pub headroom: Option<f64>,
    pub dt_min: Option<f64>,
    pub dt_max: Option<f64>,
}

#[derive(Serialize)]
pub struct RunInfo {
    pub binary: String,
    pub run_id: String,
    pub seed: Option<u64>,

    // Optional provenance (can be filled later)
    pub git_commit: Option<String>,
    pub timestamp_utc: Option<String>,
}

impl RunConfig {
    pub fn write_to_dir(&self, out_dir: &Path) -> std::io::Result<()> {
        let path = out_dir.join("config.json");
        let file = File::create(path)?;
        serde_json::to_writer_pretty(file, self)?;
        Ok(())
    }
}
