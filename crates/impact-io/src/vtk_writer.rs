//! Legacy ASCII VTK writer for simulation snapshots.
//!
//! Each sampled step becomes one `UNSTRUCTURED_GRID` file holding the current
//! node positions, the element connectivity and three point-data vector
//! fields: velocity, acceleration and lumped mass. ParaView opens the series
//! directly.
//!
//! Non-finite values are written as `0` so that a diverged state still
//! produces a readable file. Point coordinates are additionally zeroed once
//! their magnitude exceeds [`SANITIZE_THRESHOLD`], since the points are
//! stored as single precision and a runaway node wrecks the viewer's
//! bounding box. Point data (velocity, acceleration, mass) keeps its full
//! range: a heavy mesh or a hard impact legitimately goes past the
//! threshold. The number of coerced values is returned to the caller; the
//! simulation state itself is never touched.
//!
//! ```rust,no_run
//! use impact_io::{Snapshot, SnapshotSink, VtkCellType, VtkSnapshotWriter};
//!
//! # fn demo(snapshot: &Snapshot<'_>) -> impact_io::Result<()> {
//! let mut writer = VtkSnapshotWriter::new("cpu_output");
//! let report = writer.write_snapshot(snapshot)?;
//! println!("wrote {:?}", report.path);
//! # Ok(())
//! # }
//! ```

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::Result;
use crate::snapshot::{ExportReport, Snapshot, SnapshotSink};

/// Coordinate magnitude above which an exported point is treated as garbage.
pub const SANITIZE_THRESHOLD: f64 = 1e6;

/// Writes one `.vtk` file per snapshot into a directory.
#[derive(Debug, Clone)]
pub struct VtkSnapshotWriter {
    directory: PathBuf,
    prefix: String,
}

impl VtkSnapshotWriter {
    /// Create a writer targeting `directory` with the default
    /// `simulation_<step>.vtk` naming.
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
            prefix: "simulation".to_string(),
        }
    }

    /// Override the file name prefix.
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Path of the file written for `step`.
    pub fn path_for_step(&self, step: usize) -> PathBuf {
        self.directory.join(format!("{}_{}.vtk", self.prefix, step))
    }
}

impl SnapshotSink for VtkSnapshotWriter {
    fn write_snapshot(&mut self, snapshot: &Snapshot<'_>) -> Result<ExportReport> {
        snapshot.validate()?;
        fs::create_dir_all(&self.directory)?;

        let path = self.path_for_step(snapshot.step);
        let mut out = BufWriter::new(File::create(&path)?);
        let sanitized_values = write_vtk(snapshot, &mut out)?;
        out.flush()?;

        debug!(path = %path.display(), sanitized_values, "exported snapshot");
        Ok(ExportReport {
            path: Some(path),
            sanitized_values,
        })
    }
}

/// Serialize a snapshot as legacy VTK into any writer.
///
/// Returns the number of values that had to be coerced to zero.
pub fn write_vtk<W: Write>(snapshot: &Snapshot<'_>, out: &mut W) -> Result<usize> {
    snapshot.validate()?;
    let mut sanitizer = Sanitizer::default();

    write_header(out)?;
    write_points(snapshot, &mut sanitizer, out)?;
    write_cells(snapshot, out)?;

    writeln!(out, "POINT_DATA {}", snapshot.num_nodes())?;
    write_vectors("velocity", snapshot.velocity, &mut sanitizer, out)?;
    write_vectors("acceleration", snapshot.acceleration, &mut sanitizer, out)?;
    write_vectors("mass", snapshot.mass, &mut sanitizer, out)?;

    if sanitizer.count > 0 {
        warn!(
            step = snapshot.step,
            count = sanitizer.count,
            first_field = sanitizer.first_field.unwrap_or(""),
            first_node = sanitizer.first_node.unwrap_or(0),
            "coerced non-finite or out-of-range values to zero during export"
        );
    }
    Ok(sanitizer.count)
}

#[derive(Default)]
struct Sanitizer {
    count: usize,
    first_field: Option<&'static str>,
    first_node: Option<usize>,
}

impl Sanitizer {
    fn clean(&mut self, field: &'static str, dof: usize, value: f64) -> f64 {
        if value.is_finite() {
            value
        } else {
            self.reject(field, dof)
        }
    }

    fn clean_coordinate(&mut self, dof: usize, value: f64) -> f64 {
        if value.is_finite() && value.abs() <= SANITIZE_THRESHOLD {
            value
        } else {
            self.reject("position", dof)
        }
    }

    fn reject(&mut self, field: &'static str, dof: usize) -> f64 {
        if self.count == 0 {
            self.first_field = Some(field);
            self.first_node = Some(dof / 3);
        }
        self.count += 1;
        0.0
    }
}

fn write_header<W: Write>(out: &mut W) -> Result<()> {
    writeln!(out, "# vtk DataFile Version 3.0")?;
    writeln!(out, "FEA simulation data")?;
    writeln!(out, "ASCII")?;
    writeln!(out, "DATASET UNSTRUCTURED_GRID")?;
    Ok(())
}

fn write_points<W: Write>(
    snapshot: &Snapshot<'_>,
    sanitizer: &mut Sanitizer,
    out: &mut W,
) -> Result<()> {
    writeln!(out, "POINTS {} float", snapshot.num_nodes())?;
    for (node, xyz) in snapshot.positions.chunks_exact(3).enumerate() {
        let x = sanitizer.clean_coordinate(3 * node, xyz[0]);
        let y = sanitizer.clean_coordinate(3 * node + 1, xyz[1]);
        let z = sanitizer.clean_coordinate(3 * node + 2, xyz[2]);
        writeln!(out, "{x:.6} {y:.6} {z:.6}")?;
    }
    Ok(())
}

fn write_cells<W: Write>(snapshot: &Snapshot<'_>, out: &mut W) -> Result<()> {
    let num_elements = snapshot.num_elements();
    let npe = snapshot.nodes_per_element;

    writeln!(out, "CELLS {} {}", num_elements, num_elements * (npe + 1))?;
    for cell in snapshot.connectivity.chunks_exact(npe) {
        write!(out, "{npe}")?;
        for node in cell {
            write!(out, " {node}")?;
        }
        writeln!(out)?;
    }

    writeln!(out, "CELL_TYPES {num_elements}")?;
    let code = snapshot.cell_type.code();
    for _ in 0..num_elements {
        writeln!(out, "{code}")?;
    }
    Ok(())
}

fn write_vectors<W: Write>(
    name: &'static str,
    values: &[f64],
    sanitizer: &mut Sanitizer,
    out: &mut W,
) -> Result<()> {
    writeln!(out, "VECTORS {name} double")?;
    for (node, v) in values.chunks_exact(3).enumerate() {
        let a = sanitizer.clean(name, 3 * node, v[0]);
        let b = sanitizer.clean(name, 3 * node + 1, v[1]);
        let c = sanitizer.clean(name, 3 * node + 2, v[2]);
        writeln!(out, "{a:.6e} {b:.6e} {c:.6e}")?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::VtkCellType;

    const POSITIONS: [f64; 12] = [
        0.0, 0.0, 0.0, //
        1.0, 0.0, 0.0, //
        0.0, 1.0, 0.0, //
        0.0, 0.0, 1.0,
    ];
    const CONNECTIVITY: [usize; 4] = [0, 1, 2, 3];

    fn snapshot<'a>(velocity: &'a [f64], mass: &'a [f64]) -> Snapshot<'a> {
        Snapshot {
            step: 50,
            time: 5e-4,
            positions: &POSITIONS,
            velocity,
            acceleration: velocity,
            mass,
            connectivity: &CONNECTIVITY,
            nodes_per_element: 4,
            cell_type: VtkCellType::Tetra,
        }
    }

    fn render(snap: &Snapshot<'_>) -> (String, usize) {
        let mut buf = Vec::new();
        let sanitized = write_vtk(snap, &mut buf).expect("write should succeed");
        (String::from_utf8(buf).unwrap(), sanitized)
    }

    #[test]
    fn writes_all_sections() {
        let vel = [0.0; 12];
        let mass = [1.0; 12];
        let (text, sanitized) = render(&snapshot(&vel, &mass));

        assert_eq!(sanitized, 0);
        assert!(text.starts_with("# vtk DataFile Version 3.0\n"));
        assert!(text.contains("DATASET UNSTRUCTURED_GRID"));
        assert!(text.contains("POINTS 4 float\n1.000000 0.000000 0.000000\n"));
        assert!(text.contains("CELLS 1 5\n4 0 1 2 3\n"));
        assert!(text.contains("CELL_TYPES 1\n10\n"));
        assert!(text.contains("POINT_DATA 4\nVECTORS velocity double\n"));
        assert!(text.contains("VECTORS acceleration double"));
        assert!(text.contains("VECTORS mass double\n1.000000e0 1.000000e0 1.000000e0\n"));
    }

    #[test]
    fn coerces_non_finite_values() {
        let mut vel = [0.0; 12];
        vel[0] = f64::NAN;
        vel[4] = f64::INFINITY;
        let mass = [1.0; 12];
        let (text, sanitized) = render(&snapshot(&vel, &mass));

        // velocity and acceleration share the same buffer in this frame
        assert_eq!(sanitized, 4);
        assert!(!text.contains("NaN"));
        assert!(!text.contains("inf"));
    }

    #[test]
    fn large_point_data_is_kept() {
        let mut vel = [0.0; 12];
        vel[8] = 2.0 * SANITIZE_THRESHOLD;
        let mass = [5.0 * SANITIZE_THRESHOLD; 12];
        let (text, sanitized) = render(&snapshot(&vel, &mass));

        assert_eq!(sanitized, 0);
        assert!(text.contains("0.000000e0 0.000000e0 2.000000e6
"));
        assert!(text.contains("VECTORS mass double
5.000000e6 5.000000e6 5.000000e6
"));
    }

    #[test]
    fn runaway_coordinates_are_zeroed() {
        let mut positions = POSITIONS;
        positions[3] = 2.0 * SANITIZE_THRESHOLD;
        let vel = [0.0; 12];
        let mass = [1.0; 12];
        let snap = Snapshot {
            positions: &positions,
            ..snapshot(&vel, &mass)
        };
        let (text, sanitized) = render(&snap);

        assert_eq!(sanitized, 1);
        assert!(text.contains("POINTS 4 float
0.000000 0.000000 0.000000
0.000000 0.000000"));
    }

    #[test]
    fn sink_writes_named_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = VtkSnapshotWriter::new(dir.path().join("out"));
        let vel = [0.5; 12];
        let mass = [2.0; 12];

        let report = writer.write_snapshot(&snapshot(&vel, &mass)).unwrap();
        let path = report.path.expect("file sink reports a path");
        assert_eq!(path, dir.path().join("out").join("simulation_50.vtk"));
        assert!(path.exists());
    }

    #[test]
    fn re_export_is_byte_identical() {
        let dir = tempfile::tempdir().unwrap();
        let vel = [0.25, -1.0, 3.5, 0.0, 0.0, 0.0, 1e-9, 2e-3, -7.0, 0.1, 0.2, 0.3];
        let mass = [0.0325; 12];
        let snap = snapshot(&vel, &mass);

        let mut first = VtkSnapshotWriter::new(dir.path().join("a"));
        let mut second = VtkSnapshotWriter::new(dir.path().join("b"));
        let a = first.write_snapshot(&snap).unwrap().path.unwrap();
        let b = second.write_snapshot(&snap).unwrap().path.unwrap();
        let c = first.write_snapshot(&snap).unwrap().path.unwrap();

        let bytes_a = std::fs::read(a).unwrap();
        assert_eq!(bytes_a, std::fs::read(b).unwrap());
        assert_eq!(bytes_a, std::fs::read(c).unwrap());
    }

    #[test]
    fn unwritable_directory_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not_a_dir");
        std::fs::write(&blocker, "x").unwrap();

        let mut writer = VtkSnapshotWriter::new(&blocker);
        let vel = [0.0; 12];
        assert!(writer.write_snapshot(&snapshot(&vel, &vel)).is_err());
    }
}
