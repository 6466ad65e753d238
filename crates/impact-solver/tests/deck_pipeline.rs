//! End-to-end test: input deck to VTK snapshots.
//!
//! This test validates the complete workflow:
//! 1. Parse an Abaqus-style deck with `*NODE`, `*ELEMENT` and `*NSET` cards
//! 2. Build the mesh and slave set from the deck
//! 3. Load a TOML run configuration
//! 4. Run the explicit integrator with wall contact
//! 5. Export snapshots and a checkpoint into a temporary directory

use std::fs;

use approx::assert_relative_eq;
use impact_io::{load_checkpoint, save_checkpoint};
use impact_solver::{
    ElementType, ExplicitDynamics, SimulationConfig, TerminationReason, operator_for,
};

const CUBE_DECK: &str = "\
** single hexahedron, 0.1 m edge
*HEADING
Falling cube
*NODE
1, 0.0, 0.0, 0.0
2, 0.1, 0.0, 0.0
3, 0.1, 0.1, 0.0
4, 0.0, 0.1, 0.0
5, 0.0, 0.0, 0.1
6, 0.1, 0.0, 0.1
7, 0.1, 0.1, 0.1
8, 0.0, 0.1, 0.1
*ELEMENT, TYPE=C3D8, ELSET=CUBE
1, 1, 2, 3, 4, 5, 6, 7, 8
*NSET, NSET=SLAVE, GENERATE
1, 4, 1
";

const RUN_CONFIG: &str = r#"
[mesh]
path = "cube.inp"

[material]
model = "elastoplastic"
density = 7800.0
youngs_modulus = 200e6
poissons_ratio = 0.25
beta = 0.0
hardening_modulus = 10.0
yield_stress = 3.29

[run]
dt = 1e-5
time_end = 1.955e-3
initial_offset = [0.0, 0.0, 0.1]

[output]
prefix = "cube"
"#;

#[test]
fn deck_to_snapshots() {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    fs::write(dir.path().join("cube.inp"), CUBE_DECK).expect("Failed to write deck");

    let mut config = SimulationConfig::from_toml_str(RUN_CONFIG).expect("Failed to parse config");
    config.output.directory = dir.path().join("out");

    let mesh = config
        .load_mesh(Some(dir.path()))
        .expect("Failed to build mesh");
    assert_eq!(mesh.element_type(), ElementType::C3D8);
    assert_eq!(mesh.num_nodes(), 8);
    assert_eq!(mesh.slave_nodes(), &[0, 1, 2, 3]);

    let material = config.material.build().expect("Failed to build material");
    let wall = config.build_wall(&mesh).expect("Failed to build wall");
    let wall = wall.expect("wall is enabled by default");
    assert_eq!(wall.stiffness, 200e6);

    let operator = operator_for(mesh.element_type());
    let mut writer = config.snapshot_writer();
    let explicit = config.explicit_config().expect("Failed to build run config");

    let mut solver = ExplicitDynamics::new(
        &mesh,
        material.as_ref(),
        operator.as_ref(),
        Some(&wall),
        explicit,
    )
    .expect("Failed to create solver")
    .with_snapshot_sink(&mut writer);
    solver
        .initialize(config.run.initial_offset, config.run.initial_velocity)
        .expect("Failed to initialize");
    let summary = solver
        .solve(config.run.dt, config.run.time_end)
        .expect("Run failed");

    assert_eq!(summary.steps, 196);
    assert_eq!(summary.termination, TerminationReason::Completed);
    assert_eq!(summary.snapshots_written, 4);
    assert!(!summary.diverged);

    // bottom face has reached the wall but not passed through it
    for node in 0..4 {
        let z = solver.position()[3 * node + 2];
        assert!(z > 0.0999 - 1e-3, "node {node} passed through the wall: z = {z}");
        assert!(z < 0.105, "node {node} never approached the wall: z = {z}");
    }

    let checkpoint_path = dir.path().join("state.json");
    save_checkpoint(&checkpoint_path, &solver.checkpoint()).expect("Failed to save checkpoint");
    let restored = load_checkpoint(&checkpoint_path).expect("Failed to load checkpoint");
    assert_eq!(restored.step, 196);
    for (restored, current) in restored.position.iter().zip(solver.position()) {
        assert_relative_eq!(*restored, *current, max_relative = 1e-12);
    }
    assert_eq!(restored.metadata["material"], "elastoplastic");

    for step in [0, 50, 100, 150] {
        let path = dir.path().join("out").join(format!("cube_{step}.vtk"));
        let contents = fs::read_to_string(&path).expect("Missing snapshot");
        assert!(contents.starts_with("# vtk DataFile Version 3.0\n"));
        assert!(contents.contains("POINTS 8 float\n"));
        assert!(contents.contains("CELLS 1 9\n"));
        assert!(contents.contains("CELL_TYPES 1\n12\n"));
        assert!(contents.contains("VECTORS mass double\n"));
    }
    assert!(!dir.path().join("out").join("cube_200.vtk").exists());
}

#[test]
fn unknown_node_in_element_is_rejected() {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let broken = CUBE_DECK.replace("1, 1, 2, 3, 4, 5, 6, 7, 8", "1, 1, 2, 3, 4, 5, 6, 7, 9");
    fs::write(dir.path().join("cube.inp"), broken).expect("Failed to write deck");

    let config = SimulationConfig::from_toml_str(RUN_CONFIG).expect("Failed to parse config");
    let err = config.load_mesh(Some(dir.path())).unwrap_err();
    assert!(err.to_string().contains("non-existent node 9"), "{err}");
}

#[test]
fn demo_config_builds() {
    let demos = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("../../demos");
    let config =
        SimulationConfig::from_file(demos.join("cube_impact.toml")).expect("Failed to load demo");
    let mesh = config.load_mesh(Some(&demos)).expect("Failed to build demo mesh");

    assert_eq!(mesh.num_nodes(), 27);
    assert_eq!(mesh.num_elements(), 8);
    assert_eq!(mesh.slave_nodes(), &[0, 1, 2, 3, 4, 5, 6, 7, 8]);
    assert!(config.build_wall(&mesh).expect("Failed to build wall").is_some());
}
