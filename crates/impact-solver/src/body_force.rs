//! Uniform body acceleration (gravity).

use crate::error::{Result, SolverError};
use crate::mesh::DOFS_PER_NODE;

/// Standard gravitational acceleration [m/s²]
pub const STANDARD_GRAVITY: f64 = 9.81;

/// Constant acceleration added to every node along one axis.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Gravity {
    /// Axis the acceleration acts along (0 = X, 1 = Y, 2 = Z)
    pub axis: usize,
    /// Signed acceleration along `axis`
    pub acceleration: f64,
}

impl Default for Gravity {
    fn default() -> Self {
        Self {
            axis: 2,
            acceleration: -STANDARD_GRAVITY,
        }
    }
}

impl Gravity {
    pub fn new(axis: usize, acceleration: f64) -> Result<Self> {
        if axis >= DOFS_PER_NODE {
            return Err(SolverError::InvalidConfig(format!(
                "gravity axis must be 0, 1 or 2, got {axis}"
            )));
        }
        if !acceleration.is_finite() {
            return Err(SolverError::InvalidConfig(format!(
                "gravity must be finite, got {acceleration}"
            )));
        }
        Ok(Self { axis, acceleration })
    }

    /// Standard gravity pulling towards negative `axis`.
    pub fn standard(axis: usize) -> Result<Self> {
        Self::new(axis, -STANDARD_GRAVITY)
    }

    pub fn apply(&self, acceleration: &mut [f64]) {
        for node_acc in acceleration.chunks_exact_mut(DOFS_PER_NODE) {
            node_acc[self.axis] += self.acceleration;
        }
    }
}
