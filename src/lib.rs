// src/lib.rs

pub mod config;
pub mod coupling;
pub mod energy;
pub mod integrate;
pub mod lattice;
pub mod params;
pub mod psi_field;
pub mod spectrum;
pub mod visualisation;
