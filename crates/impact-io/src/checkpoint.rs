//! JSON checkpoints of the integrator state.
//!
//! The velocity stored here is the half-step staggered velocity, exactly what
//! the integrator keeps internally, not the reporting velocity written to
//! snapshots.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{IoError, Result};

pub const CHECKPOINT_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StateCheckpoint {
    pub schema_version: u32,
    pub step: usize,
    pub time: f64,
    pub dt: f64,
    pub position: Vec<f64>,
    pub staggered_velocity: Vec<f64>,
    pub metadata: BTreeMap<String, String>,
}

impl Default for StateCheckpoint {
    fn default() -> Self {
        Self {
            schema_version: CHECKPOINT_SCHEMA_VERSION,
            step: 0,
            time: 0.0,
            dt: 0.0,
            position: Vec::new(),
            staggered_velocity: Vec::new(),
            metadata: BTreeMap::new(),
        }
    }
}

pub fn save_checkpoint(path: impl AsRef<Path>, state: &StateCheckpoint) -> Result<()> {
    if state.position.len() != state.staggered_velocity.len() {
        return Err(IoError::FieldLength {
            field: "staggered_velocity",
            expected: state.position.len(),
            actual: state.staggered_velocity.len(),
        });
    }

    let path = path.as_ref();
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)?;
    }

    let bytes = serde_json::to_vec_pretty(state)?;
    fs::write(path, bytes)?;
    Ok(())
}

pub fn load_checkpoint(path: impl AsRef<Path>) -> Result<StateCheckpoint> {
    let bytes = fs::read(path)?;
    let state: StateCheckpoint = serde_json::from_slice(&bytes)?;
    if state.schema_version != CHECKPOINT_SCHEMA_VERSION {
        return Err(IoError::InvalidData(format!(
            "unsupported checkpoint schema version {}",
            state.schema_version
        )));
    }
    Ok(state)
}
