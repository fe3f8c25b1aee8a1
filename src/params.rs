// src/params.rs
//
// Physical inputs and derived constants for the gyroscope lattice.
//
// Conventions:
// - SI units throughout (kg, m, s; dipole moments in A·m²).
// - ψ is the complex transverse tip displacement δx + i·δy of one
//   gyroscope pendulum; all frequencies below are angular (rad/s).
// - The spinning disc is treated as a uniform disc about its spin axis,
//   so I = ½ m r² and the spin angular momentum is L = I·ω_spin.

use thiserror::Error;

/// Vacuum permeability (T·m/A).
pub const MU0: f64 = 4.0e-7 * std::f64::consts::PI;

/// Standard gravitational acceleration (m/s²).
pub const G_STANDARD: f64 = 9.80665;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParamError {
    /// An input that must be strictly positive (and finite) is not.
    #[error("{name} must be positive and finite, got {value}")]
    NonPositive { name: &'static str, value: f64 },

    /// The neighbour cutoff is zero, negative or non-finite.
    #[error("degenerate distance cutoff: {value} (must be positive and finite)")]
    DegenerateCutoff { value: f64 },

    /// Lattice extent with zero cells.
    #[error("lattice range is empty: n1={n1}, n2={n2}")]
    EmptyLattice { n1: usize, n2: usize },
}

/// Physical inputs describing one gyroscope and the lattice it sits in.
///
/// Every physical quantity has exactly one binding here; derived values
/// must reference these fields, never a re-declared local.
#[derive(Debug, Clone, Copy)]
pub struct GyroParams {
    /// Mass of the spinning disc (kg).
    pub disc_mass: f64,
    /// Radius of the spinning disc (m).
    pub disc_radius: f64,
    /// Spin rate of the disc (rad/s).
    pub spin_rate: f64,
    /// Distance from pivot to the tip magnet (m).
    pub pendulum_length: f64,
    /// Magnetic dipole moment of the tip magnet (A·m²).
    pub magnet_moment: f64,
    /// Nearest-neighbour lattice spacing (m).
    pub lattice_spacing: f64,
    /// Gravitational acceleration (m/s²).
    pub gravity: f64,
}

impl GyroParams {
    /// Bench-top values in the range of the Nash et al. experiment:
    /// a few-gram gyroscope spinning at ~150 Hz, centimetre spacing.
    pub fn lab() -> Self {
        Self {
            disc_mass: 2.2e-3,
            disc_radius: 6.0e-3,
            spin_rate: 2.0 * std::f64::consts::PI * 150.0,
            pendulum_length: 35.0e-3,
            magnet_moment: 8.0e-2,
            lattice_spacing: 24.0e-3,
            gravity: G_STANDARD,
        }
    }

    /// Order-unity frequencies for quick exploration and plots where the
    /// absolute time scale is irrelevant. Deliberately unphysical moment:
    /// the two 4π factors cancel, leaving round numbers
    /// k = 1.2 N/m, Ω_g = 0.4, Ω_m = 0.24, Ω⁺ = 1.12 rad/s.
    pub fn toy() -> Self {
        Self {
            disc_mass: 1.0,
            disc_radius: 1.0,
            spin_rate: 10.0,
            pendulum_length: 1.0,
            magnet_moment: 1.0e3,
            lattice_spacing: 1.0,
            gravity: 2.0,
        }
    }

    fn check_positive(name: &'static str, value: f64) -> Result<(), ParamError> {
        if !value.is_finite() || value <= 0.0 {
            return Err(ParamError::NonPositive { name, value });
        }
        Ok(())
    }

    /// Validate all inputs. Spin rate must be nonzero because every
    /// precession frequency divides by the spin angular momentum.
    pub fn validate(&self) -> Result<(), ParamError> {
        Self::check_positive("disc_mass", self.disc_mass)?;
        Self::check_positive("disc_radius", self.disc_radius)?;
        Self::check_positive("spin_rate", self.spin_rate)?;
        Self::check_positive("pendulum_length", self.pendulum_length)?;
        Self::check_positive("magnet_moment", self.magnet_moment)?;
        Self::check_positive("lattice_spacing", self.lattice_spacing)?;
        Self::check_positive("gravity", self.gravity)?;
        Ok(())
    }
}

/// The six lattice-derived scalars, all closed-form in the inputs.
///
/// Ω⁻ and Ω⁺ are the Γ-point band edges of the honeycomb spectrum:
/// a uniform field makes every pairwise coupling term vanish, so the
/// whole lattice precesses at Ω⁻ = Ω_g; the anti-phase A/B mode sees
/// three doubled bonds with cancelling e^{2iθ} factors and precesses at
/// Ω⁺ = Ω_g + 3Ω_m.
#[derive(Debug, Clone, Copy)]
pub struct Derived {
    /// Spin angular momentum L = ½ m r² ω_spin (kg·m²/s).
    pub spin_momentum: f64,
    /// Effective spring constant of one dipole pair at the lattice
    /// spacing, k = 3 μ0 μ² / (π a⁵) (N/m).
    pub spring_k: f64,
    /// Gravitational precession frequency Ω_g = ℓ m g / L (rad/s).
    pub omega_g: f64,
    /// Magnetic precession frequency Ω_m = ℓ² k / L (rad/s).
    pub omega_m: f64,
    /// Lower band edge Ω⁻ = Ω_g (rad/s).
    pub omega_minus: f64,
    /// Upper band edge Ω⁺ = Ω_g + 3Ω_m (rad/s).
    pub omega_plus: f64,
}

impl Derived {
    pub fn from_params(p: &GyroParams) -> Result<Self, ParamError> {
        p.validate()?;

        let inertia = 0.5 * p.disc_mass * p.disc_radius * p.disc_radius;
        let spin_momentum = inertia * p.spin_rate;

        // Dipole-dipole bond stiffness: U(r) = μ0 μ² / (4π r³) for two
        // parallel moments side by side, so k = U''(a) = 3 μ0 μ² / (π a⁵).
        let a = p.lattice_spacing;
        let spring_k =
            3.0 * MU0 * p.magnet_moment * p.magnet_moment / (std::f64::consts::PI * a.powi(5));

        let omega_g = p.pendulum_length * p.disc_mass * p.gravity / spin_momentum;
        let omega_m = p.pendulum_length * p.pendulum_length * spring_k / spin_momentum;

        Ok(Self {
            spin_momentum,
            spring_k,
            omega_g,
            omega_m,
            omega_minus: omega_g,
            omega_plus: omega_g + 3.0 * omega_m,
        })
    }

    /// Coefficient of the "ferromagnetic" coupling term (ψ_i − ψ_j).
    #[inline]
    pub fn c_fm(&self) -> f64 {
        0.5 * self.omega_m
    }

    /// Coefficient of the "handed" coupling term e^{2iθ}(ψ_i* − ψ_j*).
    #[inline]
    pub fn c_handed(&self) -> f64 {
        -0.5 * self.omega_m
    }

    /// Period of the upper band-edge mode, 2π/Ω⁺ (s). Convenient time
    /// unit for choosing dt and run lengths.
    pub fn fast_period(&self) -> f64 {
        2.0 * std::f64::consts::PI / self.omega_plus
    }
}

/// Parameter presets selectable from the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Preset {
    Lab,
    Toy,
}

impl Preset {
    pub fn from_arg(arg: &str) -> Option<Self> {
        match arg {
            "lab" => Some(Self::Lab),
            "toy" => Some(Self::Toy),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Lab => "lab",
            Self::Toy => "toy",
        }
    }

    pub fn params(&self) -> GyroParams {
        match self {
            Self::Lab => GyroParams::lab(),
            Self::Toy => GyroParams::toy(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn derived_scalars_follow_closed_forms() {
        let p = GyroParams::lab();
        let d = Derived::from_params(&p).unwrap();

        let inertia = 0.5 * p.disc_mass * p.disc_radius * p.disc_radius;
        assert_relative_eq!(d.spin_momentum, inertia * p.spin_rate, max_relative = 1e-14);

        let k = 3.0 * MU0 * p.magnet_moment * p.magnet_moment
            / (std::f64::consts::PI * p.lattice_spacing.powi(5));
        assert_relative_eq!(d.spring_k, k, max_relative = 1e-14);

        assert_relative_eq!(
            d.omega_g,
            p.pendulum_length * p.disc_mass * p.gravity / d.spin_momentum,
            max_relative = 1e-14
        );
        assert_relative_eq!(
            d.omega_m,
            p.pendulum_length * p.pendulum_length * k / d.spin_momentum,
            max_relative = 1e-14
        );
        assert_relative_eq!(d.omega_minus, d.omega_g, max_relative = 1e-14);
        assert_relative_eq!(d.omega_plus, d.omega_g + 3.0 * d.omega_m, max_relative = 1e-14);
    }

    #[test]
    fn zero_spin_rate_is_rejected() {
        let mut p = GyroParams::lab();
        p.spin_rate = 0.0;
        let err = Derived::from_params(&p).unwrap_err();
        assert!(matches!(err, ParamError::NonPositive { name: "spin_rate", .. }));
    }

    #[test]
    fn coupling_coefficients_are_half_omega_m() {
        let d = Derived::from_params(&GyroParams::toy()).unwrap();
        assert_relative_eq!(d.c_fm(), 0.5 * d.omega_m, max_relative = 1e-14);
        assert_relative_eq!(d.c_handed(), -0.5 * d.omega_m, max_relative = 1e-14);
    }
}
