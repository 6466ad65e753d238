//! Mesh topology consumed by the explicit solver.
//!
//! Nodes are addressed by dense 0-based indices; the flattened degree of
//! freedom of component `c` of node `n` is `3 * n + c`. External node ids from
//! an input deck are kept only for reporting.

use std::collections::BTreeSet;

use crate::error::{Result, SolverError};

/// Spatial dimension and translational dofs per node.
pub const DOFS_PER_NODE: usize = 3;

/// A node as read from an input deck.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    /// Node ID (1-based indexing from input file)
    pub id: i32,
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Node {
    pub fn new(id: i32, x: f64, y: f64, z: f64) -> Self {
        Self { id, x, y, z }
    }

    pub fn coords(&self) -> [f64; 3] {
        [self.x, self.y, self.z]
    }
}

/// Solid element shapes supported by the explicit solver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementType {
    /// 4-node linear tetrahedron
    C3D4,
    /// 8-node trilinear hexahedron
    C3D8,
}

impl ElementType {
    pub fn num_nodes(&self) -> usize {
        match self {
            ElementType::C3D4 => 4,
            ElementType::C3D8 => 8,
        }
    }

    /// Parse an Abaqus `*ELEMENT, TYPE=` name. Only fully integrated
    /// solids are accepted; `C3D8R` has no hourglass control here and is
    /// rejected rather than silently run with the full 2x2x2 rule.
    pub fn from_abaqus_type(type_str: &str) -> Option<Self> {
        match type_str.to_ascii_uppercase().as_str() {
            "C3D4" => Some(ElementType::C3D4),
            "C3D8" => Some(ElementType::C3D8),
            _ => None,
        }
    }
}

/// Single-type solid mesh with flat connectivity and coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct Mesh {
    element_type: ElementType,
    node_ids: Vec<i32>,
    positions: Vec<f64>,
    connectivity: Vec<usize>,
    slave_nodes: Vec<usize>,
}

impl Mesh {
    /// Build a mesh from flat coordinates (`3 * num_nodes`) and flat
    /// connectivity (`nodes_per_element * num_elements`).
    pub fn new(
        element_type: ElementType,
        positions: Vec<f64>,
        connectivity: Vec<usize>,
    ) -> Result<Self> {
        let num_nodes = positions.len() / DOFS_PER_NODE;
        let mesh = Self {
            element_type,
            node_ids: (1..=num_nodes as i32).collect(),
            positions,
            connectivity,
            slave_nodes: Vec::new(),
        };
        mesh.validate()?;
        Ok(mesh)
    }

    /// Attach the nodes eligible for wall contact. Duplicates are removed and
    /// the set is kept sorted.
    pub fn with_slave_nodes(mut self, nodes: impl IntoIterator<Item = usize>) -> Result<Self> {
        let set: BTreeSet<usize> = nodes.into_iter().collect();
        if let Some(&bad) = set.iter().find(|&&n| n >= self.num_nodes()) {
            return Err(SolverError::InvalidMesh(format!(
                "slave node {bad} out of range (mesh has {} nodes)",
                self.num_nodes()
            )));
        }
        self.slave_nodes = set.into_iter().collect();
        Ok(self)
    }

    /// Mark every node as a contact candidate.
    pub fn with_all_nodes_slave(self) -> Self {
        let n = self.num_nodes();
        Self {
            slave_nodes: (0..n).collect(),
            ..self
        }
    }

    /// Replace the reporting ids (one per node, in index order).
    pub fn with_node_ids(mut self, ids: Vec<i32>) -> Result<Self> {
        if ids.len() != self.num_nodes() {
            return Err(SolverError::InvalidMesh(format!(
                "{} node ids supplied for {} nodes",
                ids.len(),
                self.num_nodes()
            )));
        }
        self.node_ids = ids;
        Ok(self)
    }

    pub fn element_type(&self) -> ElementType {
        self.element_type
    }

    pub fn num_nodes(&self) -> usize {
        self.positions.len() / DOFS_PER_NODE
    }

    pub fn num_elements(&self) -> usize {
        self.connectivity.len() / self.nodes_per_element()
    }

    pub fn nodes_per_element(&self) -> usize {
        self.element_type.num_nodes()
    }

    pub fn num_dofs(&self) -> usize {
        self.positions.len()
    }

    /// Initial nodal coordinates, flattened.
    pub fn positions(&self) -> &[f64] {
        &self.positions
    }

    pub fn connectivity(&self) -> &[usize] {
        &self.connectivity
    }

    /// Connectivity of one element.
    pub fn element_nodes(&self, element: usize) -> &[usize] {
        let npe = self.nodes_per_element();
        &self.connectivity[npe * element..npe * (element + 1)]
    }

    pub fn slave_nodes(&self) -> &[usize] {
        &self.slave_nodes
    }

    pub fn node_ids(&self) -> &[i32] {
        &self.node_ids
    }

    pub fn node_position(&self, node: usize) -> [f64; 3] {
        let base = DOFS_PER_NODE * node;
        [
            self.positions[base],
            self.positions[base + 1],
            self.positions[base + 2],
        ]
    }

    /// Validate sizes, connectivity range and coordinate finiteness.
    pub fn validate(&self) -> Result<()> {
        if self.positions.is_empty() || self.positions.len() % DOFS_PER_NODE != 0 {
            return Err(SolverError::InvalidMesh(format!(
                "coordinate array of length {} is not a non-empty multiple of {}",
                self.positions.len(),
                DOFS_PER_NODE
            )));
        }
        if let Some(i) = self.positions.iter().position(|x| !x.is_finite()) {
            return Err(SolverError::InvalidMesh(format!(
                "non-finite coordinate at node {}",
                i / DOFS_PER_NODE
            )));
        }

        let npe = self.nodes_per_element();
        if self.connectivity.is_empty() || self.connectivity.len() % npe != 0 {
            return Err(SolverError::InvalidMesh(format!(
                "connectivity of length {} does not split into {:?} elements of {} nodes",
                self.connectivity.len(),
                self.element_type,
                npe
            )));
        }

        let num_nodes = self.num_nodes();
        for (element, nodes) in self.connectivity.chunks_exact(npe).enumerate() {
            if let Some(&bad) = nodes.iter().find(|&&n| n >= num_nodes) {
                return Err(SolverError::InvalidMesh(format!(
                    "Element {element} references non-existent node {bad}"
                )));
            }
            let distinct: BTreeSet<_> = nodes.iter().collect();
            if distinct.len() != npe {
                return Err(SolverError::InvalidMesh(format!(
                    "Element {element} repeats a node: {nodes:?}"
                )));
            }
        }
        Ok(())
    }

    pub fn statistics(&self) -> MeshStatistics {
        let mut min = [f64::INFINITY; 3];
        let mut max = [f64::NEG_INFINITY; 3];
        for xyz in self.positions.chunks_exact(DOFS_PER_NODE) {
            for c in 0..DOFS_PER_NODE {
                min[c] = min[c].min(xyz[c]);
                max[c] = max[c].max(xyz[c]);
            }
        }

        MeshStatistics {
            num_nodes: self.num_nodes(),
            num_elements: self.num_elements(),
            num_dofs: self.num_dofs(),
            num_slave_nodes: self.slave_nodes.len(),
            element_type: self.element_type,
            bounding_box: (min, max),
        }
    }
}

/// Mesh statistics for reporting
#[derive(Debug, Clone)]
pub struct MeshStatistics {
    pub num_nodes: usize,
    pub num_elements: usize,
    pub num_dofs: usize,
    pub num_slave_nodes: usize,
    pub element_type: ElementType,
    pub bounding_box: ([f64; 3], [f64; 3]),
}

impl MeshStatistics {
    /// Format as a human-readable string
    pub fn format(&self) -> String {
        let (min, max) = self.bounding_box;
        [
            format!("Nodes: {}", self.num_nodes),
            format!("Elements: {} ({:?})", self.num_elements, self.element_type),
            format!("DOFs: {}", self.num_dofs),
            format!("Slave nodes: {}", self.num_slave_nodes),
            format!(
                "Bounding box: [{:.4}, {:.4}, {:.4}] - [{:.4}, {:.4}, {:.4}]",
                min[0], min[1], min[2], max[0], max[1], max[2]
            ),
        ]
        .join("\n")
    }
}
