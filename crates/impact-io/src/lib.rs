//! I/O support for the impact explicit dynamics solver.
//!
//! This crate provides:
//! - **Snapshot frames** and the [`SnapshotSink`] trait the integrator exports through
//! - **Legacy VTK export** (`simulation_<step>.vtk`) for ParaView
//! - **JSON checkpoints** of the integrator state

pub mod checkpoint;
pub mod error;
pub mod snapshot;
pub mod vtk_writer;

pub use checkpoint::{CHECKPOINT_SCHEMA_VERSION, StateCheckpoint, load_checkpoint, save_checkpoint};
pub use error::{IoError, Result};
pub use snapshot::{ExportReport, Snapshot, SnapshotSink, VtkCellType};
pub use vtk_writer::{SANITIZE_THRESHOLD, VtkSnapshotWriter, write_vtk};
