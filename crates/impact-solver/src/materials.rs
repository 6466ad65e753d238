//! Constitutive models for explicit dynamics.
//!
//! Every model maps a deformation gradient `F` to the first Piola-Kirchhoff
//! stress `P`. Path-dependent models additionally carry a
//! [`MaterialHistory`] per quadrature point; the integrator owns those
//! buffers and commits the returned history once per evaluation.

use std::fmt;

use nalgebra::Matrix3;

use crate::error::{Result, SolverError};

/// Isotropic elastic constants shared by every model.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ElasticConstants {
    /// Young's modulus (E) [Pa]
    pub youngs_modulus: f64,
    /// Poisson's ratio (ν) [-]
    pub poissons_ratio: f64,
}

impl ElasticConstants {
    pub fn new(youngs_modulus: f64, poissons_ratio: f64) -> Result<Self> {
        let constants = Self {
            youngs_modulus,
            poissons_ratio,
        };
        constants.validate()?;
        Ok(constants)
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.youngs_modulus.is_finite() && self.youngs_modulus >= 0.0) {
            return Err(SolverError::InvalidMaterial(format!(
                "Young's modulus must be finite and non-negative, got {}",
                self.youngs_modulus
            )));
        }
        if !(self.poissons_ratio > -1.0 && self.poissons_ratio < 0.5) {
            return Err(SolverError::InvalidMaterial(format!(
                "Poisson's ratio must lie in (-1, 0.5), got {}",
                self.poissons_ratio
            )));
        }
        Ok(())
    }

    /// Shear modulus (G = μ)
    pub fn shear_modulus(&self) -> f64 {
        self.youngs_modulus / (2.0 * (1.0 + self.poissons_ratio))
    }

    /// Bulk modulus (K)
    pub fn bulk_modulus(&self) -> f64 {
        self.youngs_modulus / (3.0 * (1.0 - 2.0 * self.poissons_ratio))
    }

    /// First Lamé parameter (λ)
    pub fn lame_lambda(&self) -> f64 {
        let nu = self.poissons_ratio;
        self.youngs_modulus * nu / ((1.0 + nu) * (1.0 - 2.0 * nu))
    }

    /// P-wave modulus λ + 2μ
    pub fn p_wave_modulus(&self) -> f64 {
        self.lame_lambda() + 2.0 * self.shear_modulus()
    }
}

/// State carried between steps at one quadrature point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MaterialHistory {
    pub plastic_strain: Matrix3<f64>,
    pub back_stress: Matrix3<f64>,
    pub equivalent_plastic_strain: f64,
}

impl Default for MaterialHistory {
    fn default() -> Self {
        Self {
            plastic_strain: Matrix3::zeros(),
            back_stress: Matrix3::zeros(),
            equivalent_plastic_strain: 0.0,
        }
    }
}

/// Result of one constitutive evaluation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StressUpdate {
    /// First Piola-Kirchhoff stress
    pub stress: Matrix3<f64>,
    /// History to commit for this quadrature point
    pub history: MaterialHistory,
}

/// Constitutive response of a material.
pub trait MaterialModel: Send + Sync + fmt::Debug {
    fn name(&self) -> &str;

    /// Mass density [kg/m³]
    fn density(&self) -> f64;

    /// First Piola-Kirchhoff stress for deformation gradient `f`.
    ///
    /// Returns `None` when `f` lies outside the domain of the law
    /// (e.g. `det F <= 0` for hyperelastic models).
    fn stress(&self, f: &Matrix3<f64>, history: &MaterialHistory) -> Option<StressUpdate>;

    /// Stored (recoverable) energy per unit reference volume.
    fn strain_energy_density(&self, f: &Matrix3<f64>, history: &MaterialHistory) -> f64;

    /// Dilatational wave speed, used for the critical time step.
    fn wave_speed(&self) -> f64;

    fn is_path_dependent(&self) -> bool {
        false
    }
}

fn check_density(density: f64) -> Result<()> {
    if density.is_finite() && density > 0.0 {
        Ok(())
    } else {
        Err(SolverError::InvalidMaterial(format!(
            "density must be positive, got {density}"
        )))
    }
}

fn small_strain(f: &Matrix3<f64>) -> Matrix3<f64> {
    let grad = f - Matrix3::identity();
    0.5 * (grad + grad.transpose())
}

fn deviatoric(m: &Matrix3<f64>) -> Matrix3<f64> {
    m - Matrix3::identity() * (m.trace() / 3.0)
}

/// Compressible neo-Hookean solid.
///
/// `W = C1 (Ī1 - 3) + D1 (J - 1)²` with `Ī1 = J^(-2/3) tr(FᵀF)`.
#[derive(Debug, Clone, PartialEq)]
pub struct NeoHookean {
    pub name: String,
    pub density: f64,
    pub c1: f64,
    pub d1: f64,
}

impl NeoHookean {
    pub fn new(name: impl Into<String>, density: f64, c1: f64, d1: f64) -> Result<Self> {
        check_density(density)?;
        if !(c1 >= 0.0 && d1 >= 0.0) {
            return Err(SolverError::InvalidMaterial(format!(
                "neo-Hookean coefficients must be non-negative (C1 = {c1}, D1 = {d1})"
            )));
        }
        Ok(Self {
            name: name.into(),
            density,
            c1,
            d1,
        })
    }

    /// Coefficients matching the small-strain limit: `C1 = μ/2`, `D1 = K/2`.
    pub fn from_elastic(
        name: impl Into<String>,
        density: f64,
        elastic: ElasticConstants,
    ) -> Result<Self> {
        elastic.validate()?;
        Self::new(
            name,
            density,
            0.5 * elastic.shear_modulus(),
            0.5 * elastic.bulk_modulus(),
        )
    }
}

impl MaterialModel for NeoHookean {
    fn name(&self) -> &str {
        &self.name
    }

    fn density(&self) -> f64 {
        self.density
    }

    fn stress(&self, f: &Matrix3<f64>, history: &MaterialHistory) -> Option<StressUpdate> {
        let j = f.determinant();
        if !(j > 0.0) {
            return None;
        }
        let f_inv_t = f.try_inverse()?.transpose();
        let i1 = (f.transpose() * f).trace();
        let j_m23 = j.powf(-2.0 / 3.0);

        let stress = 2.0 * self.c1 * j_m23 * (f - f_inv_t * (i1 / 3.0))
            + 2.0 * self.d1 * (j - 1.0) * j * f_inv_t;
        Some(StressUpdate {
            stress,
            history: *history,
        })
    }

    fn strain_energy_density(&self, f: &Matrix3<f64>, _history: &MaterialHistory) -> f64 {
        let j = f.determinant();
        if !(j > 0.0) {
            return f64::NAN;
        }
        let i1_bar = j.powf(-2.0 / 3.0) * (f.transpose() * f).trace();
        self.c1 * (i1_bar - 3.0) + self.d1 * (j - 1.0).powi(2)
    }

    fn wave_speed(&self) -> f64 {
        // μ = 2 C1, K = 2 D1
        let p_modulus = 2.0 * self.d1 + 4.0 / 3.0 * 2.0 * self.c1;
        (p_modulus / self.density).sqrt()
    }
}

/// Small-strain isotropic linear elasticity.
#[derive(Debug, Clone, PartialEq)]
pub struct LinearElastic {
    pub name: String,
    pub density: f64,
    pub elastic: ElasticConstants,
}

impl LinearElastic {
    pub fn new(name: impl Into<String>, density: f64, elastic: ElasticConstants) -> Result<Self> {
        check_density(density)?;
        elastic.validate()?;
        Ok(Self {
            name: name.into(),
            density,
            elastic,
        })
    }

    fn cauchy(&self, strain: &Matrix3<f64>) -> Matrix3<f64> {
        let lambda = self.elastic.lame_lambda();
        let mu = self.elastic.shear_modulus();
        Matrix3::identity() * (lambda * strain.trace()) + 2.0 * mu * strain
    }
}

impl MaterialModel for LinearElastic {
    fn name(&self) -> &str {
        &self.name
    }

    fn density(&self) -> f64 {
        self.density
    }

    fn stress(&self, f: &Matrix3<f64>, history: &MaterialHistory) -> Option<StressUpdate> {
        Some(StressUpdate {
            stress: self.cauchy(&small_strain(f)),
            history: *history,
        })
    }

    fn strain_energy_density(&self, f: &Matrix3<f64>, _history: &MaterialHistory) -> f64 {
        let strain = small_strain(f);
        0.5 * self.cauchy(&strain).component_mul(&strain).sum()
    }

    fn wave_speed(&self) -> f64 {
        (self.elastic.p_wave_modulus() / self.density).sqrt()
    }
}

/// Small-strain J2 plasticity with combined linear hardening.
///
/// `beta` is the isotropic share of the hardening modulus `H`: `beta = 1`
/// gives pure isotropic hardening, `beta = 0` pure kinematic hardening.
#[derive(Debug, Clone, PartialEq)]
pub struct Elastoplastic {
    pub name: String,
    pub density: f64,
    pub elastic: ElasticConstants,
    pub beta: f64,
    pub hardening_modulus: f64,
    pub yield_stress: f64,
}

impl Elastoplastic {
    pub fn new(
        name: impl Into<String>,
        density: f64,
        elastic: ElasticConstants,
        beta: f64,
        hardening_modulus: f64,
        yield_stress: f64,
    ) -> Result<Self> {
        check_density(density)?;
        elastic.validate()?;
        if !(0.0..=1.0).contains(&beta) {
            return Err(SolverError::InvalidMaterial(format!(
                "hardening mix beta must lie in [0, 1], got {beta}"
            )));
        }
        if !(hardening_modulus >= 0.0 && yield_stress > 0.0) {
            return Err(SolverError::InvalidMaterial(format!(
                "need H >= 0 and Y0 > 0 (H = {hardening_modulus}, Y0 = {yield_stress})"
            )));
        }
        Ok(Self {
            name: name.into(),
            density,
            elastic,
            beta,
            hardening_modulus,
            yield_stress,
        })
    }

    fn yield_radius(&self, equivalent_plastic_strain: f64) -> f64 {
        (2.0_f64 / 3.0).sqrt()
            * (self.yield_stress + self.beta * self.hardening_modulus * equivalent_plastic_strain)
    }
}

impl MaterialModel for Elastoplastic {
    fn name(&self) -> &str {
        &self.name
    }

    fn density(&self) -> f64 {
        self.density
    }

    fn stress(&self, f: &Matrix3<f64>, history: &MaterialHistory) -> Option<StressUpdate> {
        let mu = self.elastic.shear_modulus();
        let bulk = self.elastic.bulk_modulus();
        let strain = small_strain(f);
        let volumetric = Matrix3::identity() * (bulk * strain.trace());

        let s_trial = 2.0 * mu * deviatoric(&(strain - history.plastic_strain));
        let xi = s_trial - history.back_stress;
        let xi_norm = xi.norm();
        let trial_yield = xi_norm - self.yield_radius(history.equivalent_plastic_strain);

        if trial_yield <= 0.0 {
            return Some(StressUpdate {
                stress: volumetric + s_trial,
                history: *history,
            });
        }

        // radial return
        let h = self.hardening_modulus;
        let delta_gamma = trial_yield / (2.0 * mu + 2.0 / 3.0 * h);
        let normal = xi / xi_norm;
        let updated = MaterialHistory {
            plastic_strain: history.plastic_strain + delta_gamma * normal,
            back_stress: history.back_stress
                + (2.0 / 3.0) * (1.0 - self.beta) * h * delta_gamma * normal,
            equivalent_plastic_strain: history.equivalent_plastic_strain
                + (2.0_f64 / 3.0).sqrt() * delta_gamma,
        };

        Some(StressUpdate {
            stress: volumetric + s_trial - 2.0 * mu * delta_gamma * normal,
            history: updated,
        })
    }

    fn strain_energy_density(&self, f: &Matrix3<f64>, history: &MaterialHistory) -> f64 {
        let mu = self.elastic.shear_modulus();
        let bulk = self.elastic.bulk_modulus();
        let elastic_strain = small_strain(f) - history.plastic_strain;
        let dev = deviatoric(&elastic_strain);
        0.5 * bulk * elastic_strain.trace().powi(2) + mu * dev.component_mul(&dev).sum()
    }

    fn wave_speed(&self) -> f64 {
        (self.elastic.p_wave_modulus() / self.density).sqrt()
    }

    fn is_path_dependent(&self) -> bool {
        true
    }
}
