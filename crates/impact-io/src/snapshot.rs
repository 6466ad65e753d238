//! Snapshot frames handed from the integrator to an export sink.

use std::path::PathBuf;

use crate::error::{IoError, Result};

/// VTK cell type codes for the element shapes the solver produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VtkCellType {
    Vertex = 1,
    Tetra = 10,
    Hexahedron = 12,
}

impl VtkCellType {
    pub fn code(self) -> u8 {
        self as u8
    }
}

/// Borrowed view of the nodal fields at one sampled step.
///
/// All per-node fields are flattened as `3 * node + component`.
#[derive(Debug, Clone, Copy)]
pub struct Snapshot<'a> {
    pub step: usize,
    pub time: f64,
    pub positions: &'a [f64],
    pub velocity: &'a [f64],
    pub acceleration: &'a [f64],
    pub mass: &'a [f64],
    pub connectivity: &'a [usize],
    pub nodes_per_element: usize,
    pub cell_type: VtkCellType,
}

impl Snapshot<'_> {
    pub fn num_nodes(&self) -> usize {
        self.positions.len() / 3
    }

    pub fn num_elements(&self) -> usize {
        if self.nodes_per_element == 0 {
            0
        } else {
            self.connectivity.len() / self.nodes_per_element
        }
    }

    /// Check that every field covers the same set of nodes.
    pub fn validate(&self) -> Result<()> {
        if self.positions.len() % 3 != 0 {
            return Err(IoError::InvalidData(format!(
                "position field length {} is not a multiple of 3",
                self.positions.len()
            )));
        }
        let expected = self.positions.len();
        for (field, values) in [
            ("velocity", self.velocity),
            ("acceleration", self.acceleration),
            ("mass", self.mass),
        ] {
            if values.len() != expected {
                return Err(IoError::FieldLength {
                    field,
                    expected,
                    actual: values.len(),
                });
            }
        }
        if self.nodes_per_element == 0 || self.connectivity.len() % self.nodes_per_element != 0 {
            return Err(IoError::InvalidData(format!(
                "connectivity of length {} does not split into {}-node cells",
                self.connectivity.len(),
                self.nodes_per_element
            )));
        }
        let num_nodes = self.num_nodes();
        if let Some(&bad) = self.connectivity.iter().find(|&&n| n >= num_nodes) {
            return Err(IoError::InvalidData(format!(
                "cell references node {bad} but only {num_nodes} nodes exist"
            )));
        }
        Ok(())
    }
}

/// Outcome of one successful export.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ExportReport {
    /// Where the snapshot landed, if the sink writes files.
    pub path: Option<PathBuf>,
    /// Number of scalar values coerced to zero because they were non-finite
    /// or out of range.
    pub sanitized_values: usize,
}

/// Consumer of sampled snapshots.
pub trait SnapshotSink {
    fn write_snapshot(&mut self, snapshot: &Snapshot<'_>) -> Result<ExportReport>;
}
