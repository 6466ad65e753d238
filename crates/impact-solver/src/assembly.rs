//! Global lumped-mass and internal-force assembly.
//!
//! ## Assembly Process
//!
//! 1. For every element, gather reference coordinates and displacement of
//!    its nodes
//! 2. Evaluate the element operator (in parallel across elements)
//! 3. Scatter-add the element contributions into the global per-dof arrays,
//!    serially and in element order
//!
//! Element contributions are independent, so the parallel pass writes only
//! to element-local buffers. Because the scatter runs in a fixed order the
//! summation order never changes and results are bit-reproducible regardless
//! of the thread count.

use rayon::prelude::*;

use crate::elements::ElementOperator;
use crate::error::{Result, SolverError};
use crate::materials::{MaterialHistory, MaterialModel};
use crate::mesh::{DOFS_PER_NODE, Mesh};

/// Global per-dof arrays produced by one assembly pass.
#[derive(Debug, Clone, PartialEq)]
pub struct GlobalVectors {
    /// Diagonal lumped mass
    pub mass: Vec<f64>,
    /// Internal (resisting) force
    pub internal_force: Vec<f64>,
}

impl GlobalVectors {
    pub fn zeros(num_dofs: usize) -> Self {
        Self {
            mass: vec![0.0; num_dofs],
            internal_force: vec![0.0; num_dofs],
        }
    }

    pub fn num_dofs(&self) -> usize {
        self.mass.len()
    }

    fn clear(&mut self) {
        self.mass.fill(0.0);
        self.internal_force.fill(0.0);
    }

    /// Assemble with a scratch (virgin) material history.
    pub fn assemble(
        mesh: &Mesh,
        material: &dyn MaterialModel,
        operator: &dyn ElementOperator,
        reference: &[f64],
        displacement: &[f64],
    ) -> Result<Self> {
        let assembler = Assembler::new(mesh, material, operator)?;
        let mut history = assembler.initial_history();
        let mut out = Self::zeros(mesh.num_dofs());
        assembler.assemble_into(reference, displacement, &mut history, &mut out)?;
        Ok(out)
    }
}

#[derive(Debug)]
struct ElementContribution {
    mass: Vec<f64>,
    force: Vec<f64>,
}

/// Stateless assembler binding a mesh to a material and element operator.
#[derive(Debug, Clone, Copy)]
pub struct Assembler<'a> {
    mesh: &'a Mesh,
    material: &'a dyn MaterialModel,
    operator: &'a dyn ElementOperator,
}

impl<'a> Assembler<'a> {
    pub fn new(
        mesh: &'a Mesh,
        material: &'a dyn MaterialModel,
        operator: &'a dyn ElementOperator,
    ) -> Result<Self> {
        if operator.element_type() != mesh.element_type() {
            return Err(SolverError::InvalidMesh(format!(
                "element operator for {:?} cannot evaluate a {:?} mesh",
                operator.element_type(),
                mesh.element_type()
            )));
        }
        if operator.spatial_dim() != DOFS_PER_NODE {
            return Err(SolverError::InvalidMesh(format!(
                "element operator works in {} dimensions, mesh in {}",
                operator.spatial_dim(),
                DOFS_PER_NODE
            )));
        }
        Ok(Self {
            mesh,
            material,
            operator,
        })
    }

    pub fn mesh(&self) -> &'a Mesh {
        self.mesh
    }

    pub fn material(&self) -> &'a dyn MaterialModel {
        self.material
    }

    pub fn operator(&self) -> &'a dyn ElementOperator {
        self.operator
    }

    /// Number of history records: one per force quadrature point per element.
    pub fn history_len(&self) -> usize {
        self.mesh.num_elements() * self.operator.force_points()
    }

    pub fn initial_history(&self) -> Vec<MaterialHistory> {
        vec![MaterialHistory::default(); self.history_len()]
    }

    /// Zero `out` and assemble mass and internal force for `displacement`
    /// measured from the `reference` coordinates. The updated material
    /// history is committed into `history`.
    pub fn assemble_into(
        &self,
        reference: &[f64],
        displacement: &[f64],
        history: &mut [MaterialHistory],
        out: &mut GlobalVectors,
    ) -> Result<()> {
        self.check_lengths(reference, displacement, history.len())?;
        if out.num_dofs() != self.mesh.num_dofs() || out.internal_force.len() != out.num_dofs() {
            return Err(SolverError::InvalidInvocation(format!(
                "destination sized for {} dofs, mesh has {}",
                out.num_dofs(),
                self.mesh.num_dofs()
            )));
        }

        let contributions = history
            .par_chunks_mut(self.operator.force_points())
            .enumerate()
            .map(|(element, state)| {
                self.element_contribution(element, reference, displacement, state)
            })
            .collect::<Result<Vec<_>>>()?;

        out.clear();
        for (element, contribution) in contributions.iter().enumerate() {
            for (local, &node) in self.mesh.element_nodes(element).iter().enumerate() {
                for c in 0..DOFS_PER_NODE {
                    let dof = DOFS_PER_NODE * node + c;
                    let l = DOFS_PER_NODE * local + c;
                    out.mass[dof] += contribution.mass[l];
                    out.internal_force[dof] += contribution.force[l];
                }
            }
        }
        Ok(())
    }

    /// Total stored strain energy.
    pub fn strain_energy(
        &self,
        reference: &[f64],
        displacement: &[f64],
        history: &[MaterialHistory],
    ) -> Result<f64> {
        self.check_lengths(reference, displacement, history.len())?;
        let per_element = history
            .par_chunks(self.operator.force_points())
            .enumerate()
            .map(|(element, state)| {
                let (x, u) = self.gather(element, reference, displacement);
                self.operator
                    .strain_energy(self.material, &x, &u, state)
                    .map_err(|err| SolverError::element(element, err))
            })
            .collect::<Result<Vec<f64>>>()?;
        Ok(per_element.iter().sum())
    }

    fn check_lengths(&self, reference: &[f64], displacement: &[f64], history: usize) -> Result<()> {
        let ndof = self.mesh.num_dofs();
        if reference.len() != ndof || displacement.len() != ndof {
            return Err(SolverError::InvalidInvocation(format!(
                "state vectors must have {ndof} entries (reference {}, displacement {})",
                reference.len(),
                displacement.len()
            )));
        }
        if history != self.history_len() {
            return Err(SolverError::InvalidInvocation(format!(
                "expected {} material history records, got {history}",
                self.history_len()
            )));
        }
        Ok(())
    }

    fn gather(
        &self,
        element: usize,
        reference: &[f64],
        displacement: &[f64],
    ) -> (Vec<f64>, Vec<f64>) {
        let nodes = self.mesh.element_nodes(element);
        let mut x = Vec::with_capacity(nodes.len() * DOFS_PER_NODE);
        let mut u = Vec::with_capacity(nodes.len() * DOFS_PER_NODE);
        for &node in nodes {
            let dofs = DOFS_PER_NODE * node..DOFS_PER_NODE * (node + 1);
            x.extend_from_slice(&reference[dofs.clone()]);
            u.extend_from_slice(&displacement[dofs]);
        }
        (x, u)
    }

    fn element_contribution(
        &self,
        element: usize,
        reference: &[f64],
        displacement: &[f64],
        history: &mut [MaterialHistory],
    ) -> Result<ElementContribution> {
        let (x, u) = self.gather(element, reference, displacement);
        let n = self.operator.dofs_per_element();
        let mut mass = vec![0.0; n];
        let mut force = vec![0.0; n];

        let tag = |err| SolverError::element(element, err);
        self.operator
            .lumped_mass(self.material, &x, &mut mass)
            .map_err(tag)?;
        self.operator
            .internal_force(self.material, &x, &u, history, &mut force)
            .map_err(tag)?;

        Ok(ElementContribution { mass, force })
    }
}
