//! Frictionless penalty contact against a rigid planar wall.
//!
//! The wall is the plane `x[axis] = location`; `normal` (±1) points from the
//! wall into the admissible half-space. A slave node whose coordinate has
//! crossed the plane strictly receives a restoring acceleration
//! `stiffness * depth / mass` along the normal. Nodes lying exactly on the
//! plane are not in contact.

use tracing::debug;

use crate::error::{Result, SolverError};
use crate::mesh::DOFS_PER_NODE;

/// Rigid wall aligned with one coordinate axis
#[derive(Debug, Clone, PartialEq)]
pub struct Wall {
    /// Plane position along `axis`
    pub location: f64,
    /// Coordinate axis (0 = X, 1 = Y, 2 = Z)
    pub axis: usize,
    /// Normal direction sign, +1.0 or -1.0
    pub normal: f64,
    /// Penalty stiffness
    pub stiffness: f64,
    slave_nodes: Vec<usize>,
}

/// Summary of one contact pass.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ContactStats {
    pub active_nodes: usize,
    pub max_penetration: f64,
}

impl Wall {
    pub fn new(location: f64, axis: usize, normal: f64, stiffness: f64) -> Result<Self> {
        if axis >= DOFS_PER_NODE {
            return Err(SolverError::InvalidConfig(format!(
                "wall axis must be 0, 1 or 2, got {axis}"
            )));
        }
        if normal != 1.0 && normal != -1.0 {
            return Err(SolverError::InvalidConfig(format!(
                "wall normal must be +1 or -1, got {normal}"
            )));
        }
        if !location.is_finite() || !(stiffness.is_finite() && stiffness >= 0.0) {
            return Err(SolverError::InvalidConfig(format!(
                "wall needs a finite location and non-negative stiffness \
                 (location {location}, stiffness {stiffness})"
            )));
        }
        Ok(Self {
            location,
            axis,
            normal,
            stiffness,
            slave_nodes: Vec::new(),
        })
    }

    /// Restrict contact to the given nodes (sorted and deduplicated).
    pub fn with_slave_nodes(mut self, nodes: impl IntoIterator<Item = usize>) -> Self {
        let mut nodes: Vec<usize> = nodes.into_iter().collect();
        nodes.sort_unstable();
        nodes.dedup();
        self.slave_nodes = nodes;
        self
    }

    pub fn slave_nodes(&self) -> &[usize] {
        &self.slave_nodes
    }

    pub fn is_slave(&self, node: usize) -> bool {
        self.slave_nodes.binary_search(&node).is_ok()
    }

    /// Penetration depth of a point, zero unless it lies strictly behind
    /// the wall.
    pub fn penetration(&self, node_position: [f64; 3]) -> f64 {
        let signed_gap = self.normal * (node_position[self.axis] - self.location);
        if signed_gap < 0.0 { -signed_gap } else { 0.0 }
    }

    /// Contact acceleration of one node. Non-slave nodes and nodes that have
    /// not penetrated get zero.
    pub fn contact_acceleration(
        &self,
        node: usize,
        node_position: [f64; 3],
        node_mass: [f64; 3],
    ) -> [f64; 3] {
        let mut acc = [0.0; 3];
        if !self.is_slave(node) {
            return acc;
        }
        let depth = self.penetration(node_position);
        if depth > 0.0 {
            acc[self.axis] = self.normal * self.stiffness * depth / node_mass[self.axis];
        }
        acc
    }

    /// Add contact accelerations for every slave node.
    pub fn apply(&self, position: &[f64], mass: &[f64], acceleration: &mut [f64]) -> ContactStats {
        let mut stats = ContactStats::default();
        for &node in &self.slave_nodes {
            let base = DOFS_PER_NODE * node;
            let x = [position[base], position[base + 1], position[base + 2]];
            let depth = self.penetration(x);
            if depth == 0.0 {
                continue;
            }
            let m = [mass[base], mass[base + 1], mass[base + 2]];
            let acc = self.contact_acceleration(node, x, m);
            for c in 0..DOFS_PER_NODE {
                acceleration[base + c] += acc[c];
            }
            stats.active_nodes += 1;
            stats.max_penetration = stats.max_penetration.max(depth);
        }
        if stats.active_nodes > 0 {
            debug!(
                active = stats.active_nodes,
                max_penetration = stats.max_penetration,
                "wall contact"
            );
        }
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn floor() -> Wall {
        Wall::new(0.0999, 2, 1.0, 200e6).unwrap().with_slave_nodes([0, 1])
    }

    #[test]
    fn validates_parameters() {
        assert!(Wall::new(0.0, 3, 1.0, 1.0).is_err());
        assert!(Wall::new(0.0, 2, 0.5, 1.0).is_err());
        assert!(Wall::new(0.0, 2, -1.0, -1.0).is_err());
        assert!(Wall::new(f64::NAN, 2, 1.0, 1.0).is_err());
    }

    #[test]
    fn node_on_wall_has_no_contact() {
        let wall = floor();
        let acc = wall.contact_acceleration(0, [0.3, 0.2, 0.0999], [1.0; 3]);
        assert_eq!(acc, [0.0; 3]);
    }

    #[test]
    fn penetrating_node_is_pushed_along_normal() {
        let wall = floor();
        let acc = wall.contact_acceleration(1, [0.0, 0.0, 0.0899], [2.0; 3]);
        assert_eq!(acc[0], 0.0);
        assert_eq!(acc[1], 0.0);
        assert_relative_eq!(acc[2], 200e6 * 0.01 / 2.0, max_relative = 1e-9);
    }

    #[test]
    fn negative_normal_flips_admissible_side() {
        let ceiling = Wall::new(1.0, 0, -1.0, 10.0).unwrap().with_slave_nodes([0]);
        assert_eq!(ceiling.penetration([0.5, 0.0, 0.0]), 0.0);
        let acc = ceiling.contact_acceleration(0, [1.5, 0.0, 0.0], [5.0; 3]);
        assert_relative_eq!(acc[0], -1.0, epsilon = 1e-12);
    }

    #[test]
    fn only_slave_nodes_take_part() {
        let wall = floor();
        let position = [0.0, 0.0, 0.0, 0.0, 0.0, 0.2, 0.0, 0.0, 0.0];
        let mass = [1.0; 9];
        let mut acc = [0.0; 9];
        let stats = wall.apply(&position, &mass, &mut acc);

        assert_eq!(stats.active_nodes, 1);
        assert_relative_eq!(stats.max_penetration, 0.0999, epsilon = 1e-15);
        assert!(acc[2] > 0.0);
        assert_eq!(acc[5], 0.0);
        // node 2 is below the wall but not a slave
        assert_eq!(acc[8], 0.0);
    }

    #[test]
    fn contact_is_additive() {
        let wall = floor();
        let mut acc = [0.0, 0.0, -9.81, 0.0, 0.0, 0.0];
        wall.apply(&[0.0, 0.0, 0.09, 0.0, 0.0, 1.0], &[1.0; 6], &mut acc);
        assert_relative_eq!(acc[2], -9.81 + 200e6 * 0.0099, max_relative = 1e-9);
    }
}
