//! Element operators for explicit dynamics.
//!
//! An element operator turns one element's gathered nodal data into a
//! lumped (diagonal) mass contribution and an internal force contribution.
//! Element-local arrays are laid out node by node, `3 * local_node + component`.
//!
//! Both operations follow a total Lagrangian formulation: callers pass the
//! undeformed reference coordinates alongside the displacement and all
//! integrals run over the reference volume. A corrupt current state can
//! therefore never be mistaken for a bad mesh.

use std::fmt;

use impact_io::VtkCellType;
use nalgebra::{Matrix3, Vector3};
use thiserror::Error;

use crate::materials::{MaterialHistory, MaterialModel};
use crate::mesh::{DOFS_PER_NODE, ElementType};

pub mod hex8;
pub mod tet4;

pub use hex8::Hex8;
pub use tet4::Tet4;

/// Failure of a single element evaluation.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ElementError {
    /// The reference geometry or the gathered arrays are unusable.
    #[error("{0}")]
    Geometry(String),

    /// The deformation gradient at a quadrature point is not orientation
    /// preserving (or not finite), or the material rejected it.
    #[error("inverted deformation (det F = {det_f:e}) in material {material}")]
    Inverted { det_f: f64, material: String },
}

/// Mass and internal-force operator of one element family.
pub trait ElementOperator: Send + Sync + fmt::Debug {
    fn element_type(&self) -> ElementType;

    fn nodes_per_element(&self) -> usize {
        self.element_type().num_nodes()
    }

    fn spatial_dim(&self) -> usize {
        DOFS_PER_NODE
    }

    fn dofs_per_element(&self) -> usize {
        self.nodes_per_element() * self.spatial_dim()
    }

    fn cell_type(&self) -> VtkCellType;

    /// Quadrature points of the internal-force rule; path-dependent
    /// materials keep one history record per point.
    fn force_points(&self) -> usize;

    /// Diagonal lumped mass per element dof, integrated over the reference
    /// geometry.
    fn lumped_mass(
        &self,
        material: &dyn MaterialModel,
        reference: &[f64],
        mass: &mut [f64],
    ) -> Result<(), ElementError>;

    /// Internal (resisting) force per element dof. `history` holds
    /// [`force_points`](Self::force_points) records and is overwritten with
    /// the updated state.
    fn internal_force(
        &self,
        material: &dyn MaterialModel,
        reference: &[f64],
        displacement: &[f64],
        history: &mut [MaterialHistory],
        force: &mut [f64],
    ) -> Result<(), ElementError>;

    /// Stored strain energy of the element.
    fn strain_energy(
        &self,
        material: &dyn MaterialModel,
        reference: &[f64],
        displacement: &[f64],
        history: &[MaterialHistory],
    ) -> Result<f64, ElementError>;

    /// Length scale for the critical time step estimate.
    fn characteristic_length(&self, position: &[f64]) -> f64;
}

/// Pick the operator matching a mesh's element type.
pub fn operator_for(element_type: ElementType) -> Box<dyn ElementOperator> {
    match element_type {
        ElementType::C3D4 => Box::new(Tet4),
        ElementType::C3D8 => Box::new(Hex8),
    }
}

/// Quadrature point in natural coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct GaussPoint {
    pub xi: [f64; 3],
    pub weight: f64,
}

/// Shape functions of an isoparametric element with `N` nodes.
pub(crate) trait Isoparametric<const N: usize> {
    fn shape_functions(xi: [f64; 3]) -> [f64; N];

    /// `[dN/dξ, dN/dη, dN/dζ]` for all nodes.
    fn shape_derivatives(xi: [f64; 3]) -> [[f64; N]; 3];
}

/// Physical gradients of the shape functions at one point.
pub(crate) struct PointKinematics<const N: usize> {
    pub grad: [Vector3<f64>; N],
    pub det_j: f64,
}

pub(crate) fn reference_coordinates<const N: usize>(
    reference: &[f64],
) -> Result<[Vector3<f64>; N], ElementError> {
    check_dofs::<N>("reference", reference)?;
    Ok(std::array::from_fn(|i| node_point(reference, i)))
}

fn check_dofs<const N: usize>(name: &str, values: &[f64]) -> Result<(), ElementError> {
    let expected = N * DOFS_PER_NODE;
    if values.len() != expected {
        return Err(ElementError::Geometry(format!(
            "expected {expected} element dofs, got {} {name} values",
            values.len()
        )));
    }
    Ok(())
}

/// Jacobian `J[r][c] = Σ dN_i/dξ_r · X_i[c]`, its determinant and the
/// physical shape gradients `J⁻¹ · dN/dξ`.
pub(crate) fn kinematics<const N: usize, S: Isoparametric<N>>(
    reference: &[Vector3<f64>; N],
    xi: [f64; 3],
) -> Result<PointKinematics<N>, ElementError> {
    let dn = S::shape_derivatives(xi);

    let mut j = Matrix3::zeros();
    for (i, x) in reference.iter().enumerate() {
        for r in 0..3 {
            for c in 0..3 {
                j[(r, c)] += dn[r][i] * x[c];
            }
        }
    }

    let det_j = j.determinant();
    if !(det_j > 0.0) {
        return Err(ElementError::Geometry(format!(
            "Negative or zero Jacobian determinant: {det_j:e}"
        )));
    }
    let j_inv = j
        .try_inverse()
        .ok_or_else(|| ElementError::Geometry("Singular Jacobian matrix".to_string()))?;

    let grad = std::array::from_fn(|i| j_inv * Vector3::new(dn[0][i], dn[1][i], dn[2][i]));
    Ok(PointKinematics { grad, det_j })
}

/// `F = I + Σ u_i ⊗ ∇N_i`.
pub(crate) fn deformation_gradient<const N: usize>(
    grad: &[Vector3<f64>; N],
    displacement: &[f64],
) -> Matrix3<f64> {
    let mut f = Matrix3::identity();
    for (i, g) in grad.iter().enumerate() {
        let b = DOFS_PER_NODE * i;
        let u = Vector3::new(displacement[b], displacement[b + 1], displacement[b + 2]);
        f += u * g.transpose();
    }
    f
}

/// Row-sum lumped mass `ρ ∫ N_i dV₀`, repeated for each component.
pub(crate) fn integrate_lumped_mass<const N: usize, S: Isoparametric<N>>(
    rule: &[GaussPoint],
    density: f64,
    reference: &[f64],
    mass: &mut [f64],
) -> Result<(), ElementError> {
    let reference = reference_coordinates::<N>(reference)?;
    mass.fill(0.0);

    for point in rule {
        let shape = S::shape_functions(point.xi);
        let dv = kinematics::<N, S>(&reference, point.xi)?.det_j * point.weight;
        for (i, n) in shape.iter().enumerate() {
            let m = density * n * dv;
            for c in 0..DOFS_PER_NODE {
                mass[DOFS_PER_NODE * i + c] += m;
            }
        }
    }
    Ok(())
}

/// `f_i = ∫ P · ∇N_i dV₀`
///
/// Fails with [`ElementError::Inverted`] as soon as a quadrature point has
/// `det F <= 0`, whatever the material. The small-strain models would
/// happily return a stress for such a state.
pub(crate) fn integrate_internal_force<const N: usize, S: Isoparametric<N>>(
    rule: &[GaussPoint],
    material: &dyn MaterialModel,
    reference: &[f64],
    displacement: &[f64],
    history: &mut [MaterialHistory],
    force: &mut [f64],
) -> Result<(), ElementError> {
    if history.len() != rule.len() {
        return Err(ElementError::Geometry(format!(
            "expected {} history records, got {}",
            rule.len(),
            history.len()
        )));
    }
    let reference = reference_coordinates::<N>(reference)?;
    check_dofs::<N>("displacement", displacement)?;
    force.fill(0.0);

    for (point, state) in rule.iter().zip(history.iter_mut()) {
        let kin = kinematics::<N, S>(&reference, point.xi)?;
        let f = deformation_gradient(&kin.grad, displacement);
        let det_f = f.determinant();
        let inverted = || ElementError::Inverted {
            det_f,
            material: material.name().to_string(),
        };
        if !(det_f > 0.0) {
            return Err(inverted());
        }
        let update = material.stress(&f, state).ok_or_else(inverted)?;
        *state = update.history;

        let dv = kin.det_j * point.weight;
        for (i, g) in kin.grad.iter().enumerate() {
            let fi = update.stress * g * dv;
            for c in 0..DOFS_PER_NODE {
                force[DOFS_PER_NODE * i + c] += fi[c];
            }
        }
    }
    Ok(())
}

pub(crate) fn integrate_strain_energy<const N: usize, S: Isoparametric<N>>(
    rule: &[GaussPoint],
    material: &dyn MaterialModel,
    reference: &[f64],
    displacement: &[f64],
    history: &[MaterialHistory],
) -> Result<f64, ElementError> {
    let reference = reference_coordinates::<N>(reference)?;
    check_dofs::<N>("displacement", displacement)?;
    let mut energy = 0.0;
    for (point, state) in rule.iter().zip(history) {
        let kin = kinematics::<N, S>(&reference, point.xi)?;
        let f = deformation_gradient(&kin.grad, displacement);
        energy += material.strain_energy_density(&f, state) * kin.det_j * point.weight;
    }
    Ok(energy)
}

pub(crate) fn node_point(position: &[f64], node: usize) -> Vector3<f64> {
    let b = DOFS_PER_NODE * node;
    Vector3::new(position[b], position[b + 1], position[b + 2])
}
