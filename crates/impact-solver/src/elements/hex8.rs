//! 8-node trilinear hexahedron (C3D8).
//!
//! Node numbering follows the usual Abaqus convention: nodes 0-3 on the
//! bottom face (ζ = -1) counter-clockwise, nodes 4-7 above them.

use impact_io::VtkCellType;

use super::{
    ElementError, ElementOperator, GaussPoint, Isoparametric, integrate_internal_force,
    integrate_lumped_mass, integrate_strain_energy, kinematics, node_point, reference_coordinates,
};
use crate::materials::{MaterialHistory, MaterialModel};
use crate::mesh::ElementType;

const XI_N: [f64; 8] = [-1.0, 1.0, 1.0, -1.0, -1.0, 1.0, 1.0, -1.0];
const ETA_N: [f64; 8] = [-1.0, -1.0, 1.0, 1.0, -1.0, -1.0, 1.0, 1.0];
const ZETA_N: [f64; 8] = [-1.0, -1.0, -1.0, -1.0, 1.0, 1.0, 1.0, 1.0];

const FACES: [[usize; 4]; 6] = [
    [0, 1, 2, 3],
    [4, 5, 6, 7],
    [0, 1, 5, 4],
    [1, 2, 6, 5],
    [2, 3, 7, 6],
    [3, 0, 4, 7],
];

/// 2x2x2 Gauss rule, weight 1 per point.
fn gauss_rule() -> [GaussPoint; 8] {
    let g = 1.0 / 3.0_f64.sqrt();
    std::array::from_fn(|i| GaussPoint {
        xi: [g * XI_N[i], g * ETA_N[i], g * ZETA_N[i]],
        weight: 1.0,
    })
}

/// Trilinear hexahedron operator.
#[derive(Debug, Clone, Copy, Default)]
pub struct Hex8;

impl Isoparametric<8> for Hex8 {
    fn shape_functions(xi: [f64; 3]) -> [f64; 8] {
        let [x, y, z] = xi;
        std::array::from_fn(|i| {
            0.125 * (1.0 + x * XI_N[i]) * (1.0 + y * ETA_N[i]) * (1.0 + z * ZETA_N[i])
        })
    }

    fn shape_derivatives(xi: [f64; 3]) -> [[f64; 8]; 3] {
        let [x, y, z] = xi;
        let mut dn = [[0.0; 8]; 3];
        for i in 0..8 {
            dn[0][i] = 0.125 * XI_N[i] * (1.0 + y * ETA_N[i]) * (1.0 + z * ZETA_N[i]);
            dn[1][i] = 0.125 * ETA_N[i] * (1.0 + x * XI_N[i]) * (1.0 + z * ZETA_N[i]);
            dn[2][i] = 0.125 * ZETA_N[i] * (1.0 + x * XI_N[i]) * (1.0 + y * ETA_N[i]);
        }
        dn
    }
}

impl ElementOperator for Hex8 {
    fn element_type(&self) -> ElementType {
        ElementType::C3D8
    }

    fn cell_type(&self) -> VtkCellType {
        VtkCellType::Hexahedron
    }

    fn force_points(&self) -> usize {
        8
    }

    fn lumped_mass(
        &self,
        material: &dyn MaterialModel,
        reference: &[f64],
        mass: &mut [f64],
    ) -> Result<(), ElementError> {
        integrate_lumped_mass::<8, Self>(&gauss_rule(), material.density(), reference, mass)
    }

    fn internal_force(
        &self,
        material: &dyn MaterialModel,
        reference: &[f64],
        displacement: &[f64],
        history: &mut [MaterialHistory],
        force: &mut [f64],
    ) -> Result<(), ElementError> {
        integrate_internal_force::<8, Self>(
            &gauss_rule(),
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
        integrate_strain_energy::<8, Self>(&gauss_rule(), material, reference, displacement, history)
    }

    /// `V / max face area`; zero for a collapsed element.
    fn characteristic_length(&self, position: &[f64]) -> f64 {
        let Ok(reference) = reference_coordinates::<8>(position) else {
            return 0.0;
        };
        let mut volume = 0.0;
        for point in gauss_rule() {
            match kinematics::<8, Self>(&reference, point.xi) {
                Ok(kin) => volume += kin.det_j * point.weight,
                Err(_) => return 0.0,
            }
        }

        let p: [_; 8] = std::array::from_fn(|i| node_point(position, i));
        let max_area = FACES
            .iter()
            .map(|[a, b, c, d]| 0.5 * (p[*c] - p[*a]).cross(&(p[*d] - p[*b])).norm())
            .fold(0.0, f64::max);
        if max_area > 0.0 { volume / max_area } else { 0.0 }
    }
}
