//! Explicit transient finite-element dynamics with rigid-wall contact.
//!
//! A deformable body is advanced in time with a staggered leapfrog scheme on
//! a lumped mass matrix. Element operators (C3D4, C3D8) and material laws
//! (neo-Hookean, linear elastic, J2 elastoplastic) are pluggable through
//! [`ElementOperator`] and [`MaterialModel`].

pub mod assembly;
pub mod body_force;
pub mod config;
pub mod contact;
pub mod dynamic_solver;
pub mod elements;
pub mod error;
pub mod materials;
pub mod mesh;
pub mod mesh_builder;

pub use assembly::{Assembler, GlobalVectors};
pub use body_force::{Gravity, STANDARD_GRAVITY};
pub use config::{MaterialConfig, MeshConfig, OutputConfig, RunConfig, SimulationConfig, WallConfig};
pub use contact::{ContactStats, Wall};
pub use dynamic_solver::{
    DEFAULT_EXPORT_INTERVAL, EnergyReport, ExplicitConfig, ExplicitDynamics, RunSummary,
    SolverState, StopHandle, TerminationReason, critical_timestep,
};
pub use elements::{ElementError, ElementOperator, Hex8, Tet4, operator_for};
pub use error::{Result, SolverError};
pub use materials::{
    ElasticConstants, Elastoplastic, LinearElastic, MaterialHistory, MaterialModel, NeoHookean,
    StressUpdate,
};
pub use mesh::{DOFS_PER_NODE, ElementType, Mesh, MeshStatistics, Node};
pub use mesh_builder::{DEFAULT_SLAVE_SET, MeshBuilder};
