//! 4-node linear tetrahedron (C3D4).
//!
//! Natural coordinates `(ξ, η, ζ)` on the unit simplex, node 0 at the origin.
//! Mass uses a 4-point rule so the row-sum is exact for `N_a N_b`; the
//! constant-strain internal force needs a single point.

use impact_io::VtkCellType;

use super::{
    ElementError, ElementOperator, GaussPoint, Isoparametric, integrate_internal_force,
    integrate_lumped_mass, integrate_strain_energy, node_point,
};
use crate::materials::{MaterialHistory, MaterialModel};
use crate::mesh::ElementType;

const MASS_A: f64 = 0.585_410_196_624_968_5;
const MASS_B: f64 = 0.138_196_601_125_010_5;

const MASS_RULE: [GaussPoint; 4] = [
    GaussPoint { xi: [MASS_B, MASS_B, MASS_B], weight: 1.0 / 24.0 },
    GaussPoint { xi: [MASS_A, MASS_B, MASS_B], weight: 1.0 / 24.0 },
    GaussPoint { xi: [MASS_B, MASS_A, MASS_B], weight: 1.0 / 24.0 },
    GaussPoint { xi: [MASS_B, MASS_B, MASS_A], weight: 1.0 / 24.0 },
];

const FORCE_RULE: [GaussPoint; 1] = [GaussPoint {
    xi: [0.25, 0.25, 0.25],
    weight: 1.0 / 6.0,
}];

const FACES: [[usize; 3]; 4] = [[0, 1, 2], [0, 1, 3], [0, 2, 3], [1, 2, 3]];

/// Linear tetrahedron operator.
#[derive(Debug, Clone, Copy, Default)]
pub struct Tet4;

impl Isoparametric<4> for Tet4 {
    fn shape_functions(xi: [f64; 3]) -> [f64; 4] {
        let [x, y, z] = xi;
        [1.0 - x - y - z, x, y, z]
    }

    fn shape_derivatives(_xi: [f64; 3]) -> [[f64; 4]; 3] {
        [
            [-1.0, 1.0, 0.0, 0.0],
            [-1.0, 0.0, 1.0, 0.0],
            [-1.0, 0.0, 0.0, 1.0],
        ]
    }
}

impl ElementOperator for Tet4 {
    fn element_type(&self) -> ElementType {
        ElementType::C3D4
    }

    fn cell_type(&self) -> VtkCellType {
        VtkCellType::Tetra
    }

    fn force_points(&self) -> usize {
        FORCE_RULE.len()
    }

    fn lumped_mass(
        &self,
        material: &dyn MaterialModel,
        reference: &[f64],
        mass: &mut [f64],
    ) -> Result<(), ElementError> {
        integrate_lumped_mass::<4, Self>(&MASS_RULE, material.density(), reference, mass)
    }

    fn internal_force(
        &self,
        material: &dyn MaterialModel,
        reference: &[f64],
        displacement: &[f64],
        history: &mut [MaterialHistory],
        force: &mut [f64],
    ) -> Result<(), ElementError> {
        integrate_internal_force::<4, Self>(
            &FORCE_RULE,
            material,
            reference,
            displacement,
            history,
            force,
        )
    }

    fn strain_energy(
        &self,
        material: &dyn MaterialModel,
        reference: &[f64],
        displacement: &[f64],
        history: &[MaterialHistory],
    ) -> Result<f64, ElementError> {
        integrate_strain_energy::<4, Self>(&FORCE_RULE, material, reference, displacement, history)
    }

    /// Smallest altitude: `3V / max face area`.
    fn characteristic_length(&self, position: &[f64]) -> f64 {
        let p: [_; 4] = std::array::from_fn(|i| node_point(position, i));
        let volume = (p[1] - p[0]).cross(&(p[2] - p[0])).dot(&(p[3] - p[0])).abs() / 6.0;
        let max_area = FACES
            .iter()
            .map(|[a, b, c]| 0.5 * (p[*b] - p[*a]).cross(&(p[*c] - p[*a])).norm())
            .fold(0.0, f64::max);
        if max_area > 0.0 {
            3.0 * volume / max_area
        } else {
            0.0
        }
    }
}
