//! Error types for impact-solver

use thiserror::Error;

use crate::elements::ElementError;

pub type Result<T> = std::result::Result<T, SolverError>;

#[derive(Error, Debug)]
pub enum SolverError {
    /// A degree of freedom ended up with zero, negative or non-finite lumped
    /// mass after assembly.
    #[error("Degenerate lumped mass {mass:e} at dof {dof} (node {node})")]
    DegenerateMass { dof: usize, node: usize, mass: f64 },

    #[error("Degenerate element {element}: {reason}")]
    DegenerateElement { element: usize, reason: String },

    /// The current state turned an element inside out (or is not finite).
    #[error("Element {element} inverted (det F = {det_f:e}, material {material})")]
    InvertedElement {
        element: usize,
        det_f: f64,
        material: String,
    },

    #[error("Invalid invocation: {0}")]
    InvalidInvocation(String),

    #[error("Invalid mesh: {0}")]
    InvalidMesh(String),

    #[error("Invalid material: {0}")]
    InvalidMaterial(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// `field` is a state vector holding a non-finite value, or
    /// `"deformation"` for an element turned inside out.
    #[error("Simulation diverged at step {step} (t = {time:e}): invalid {field} at dof {dof}")]
    Divergence {
        step: usize,
        time: f64,
        field: &'static str,
        dof: usize,
    },

    #[error("Parse error: {0}")]
    Parse(#[from] impact_inp::ParseError),

    #[error("Configuration parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Export error: {0}")]
    Export(#[from] impact_io::IoError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SolverError {
    /// Attach the element index to an element-level failure.
    pub fn element(element: usize, err: ElementError) -> Self {
        match err {
            ElementError::Geometry(reason) => Self::DegenerateElement { element, reason },
            ElementError::Inverted { det_f, material } => Self::InvertedElement {
                element,
                det_f,
                material,
            },
        }
    }
}
