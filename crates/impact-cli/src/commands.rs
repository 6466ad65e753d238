//! CLI command implementations.

use std::error::Error;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Instant;

use chrono::Local;
use impact_inp::Deck;
use impact_io::save_checkpoint;
use impact_solver::{
    ExplicitDynamics, GlobalVectors, RunSummary, SimulationConfig, TerminationReason,
    critical_timestep, operator_for,
};
use tracing::{info, warn};

type CommandResult = Result<ExitCode, Box<dyn Error>>;

/// Exit code for a run that finished but diverged.
const EXIT_DIVERGED: u8 = 3;

/// Resolve `path` against the directory holding the config file.
fn relative_to(config_dir: Option<&Path>, path: &Path) -> PathBuf {
    match config_dir {
        Some(dir) if path.is_relative() => dir.join(path),
        _ => path.to_path_buf(),
    }
}

fn load_config(path: &Path) -> Result<SimulationConfig, Box<dyn Error>> {
    SimulationConfig::from_file(path)
        .map_err(|err| format!("{}: {err}", path.display()).into())
}

/// Run a simulation from a config file.
pub fn run(config_path: &Path, json: bool) -> CommandResult {
    let started_at = Local::now();
    let clock = Instant::now();

    let mut config = load_config(config_path)?;
    let config_dir = config_path.parent();
    config.output.directory = relative_to(config_dir, &config.output.directory);
    config.output.checkpoint = config
        .output
        .checkpoint
        .as_deref()
        .map(|p| relative_to(config_dir, p));

    info!(config = %config_path.display(), started = %started_at.to_rfc3339(), "impact run");

    let mesh = config.load_mesh(config_dir)?;
    info!(
        nodes = mesh.num_nodes(),
        elements = mesh.num_elements(),
        slave_nodes = mesh.slave_nodes().len(),
        "mesh loaded from {}",
        config.mesh_path(config_dir).display()
    );

    let material = config.material.build()?;
    let operator = operator_for(mesh.element_type());
    let wall = config.build_wall(&mesh)?;
    let explicit = config.explicit_config()?;
    let mut writer = config.snapshot_writer();

    let mut solver = ExplicitDynamics::new(
        &mesh,
        material.as_ref(),
        operator.as_ref(),
        wall.as_ref(),
        explicit,
    )?
    .with_snapshot_sink(&mut writer);
    solver.initialize(config.run.initial_offset, config.run.initial_velocity)?;
    let summary = solver.solve(config.run.dt, config.run.time_end)?;

    match solver.energy() {
        Ok(energy) => info!(
            kinetic = energy.kinetic,
            internal = energy.internal,
            total = energy.total(),
            "final energy"
        ),
        Err(err) => warn!(error = %err, "could not evaluate final energy"),
    }

    if let Some(path) = &config.output.checkpoint {
        save_checkpoint(path, &solver.checkpoint())?;
        info!(path = %path.display(), "checkpoint saved");
    }

    let elapsed = clock.elapsed().as_secs_f64();
    if json {
        print_summary_json(&summary, elapsed)?;
    } else {
        print_summary(&summary, elapsed, &config.output.directory);
    }

    if summary.diverged {
        return Ok(ExitCode::from(EXIT_DIVERGED));
    }
    Ok(ExitCode::SUCCESS)
}

fn print_summary(summary: &RunSummary, elapsed: f64, output_dir: &Path) {
    println!("steps: {}", summary.steps);
    println!("final_time: {:.6e}", summary.final_time);
    println!("termination: {:?}", summary.termination);
    println!("snapshots_written: {}", summary.snapshots_written);
    println!("output_directory: {}", output_dir.display());
    if summary.export_failures > 0 {
        println!("export_failures: {}", summary.export_failures);
    }
    if summary.sanitized_values > 0 {
        println!("sanitized_values: {}", summary.sanitized_values);
    }
    if let Some(step) = summary.first_divergence_step {
        println!(
            "diverged: first at step {step}, {} step(s) affected",
            summary.divergence_events
        );
    }
    println!("elapsed_s: {elapsed:.3}");
}

fn print_summary_json(summary: &RunSummary, elapsed: f64) -> Result<(), Box<dyn Error>> {
    let termination = match summary.termination {
        TerminationReason::Completed => "completed",
        TerminationReason::Cancelled => "cancelled",
        TerminationReason::WallTimeExceeded => "wall_time_exceeded",
        TerminationReason::Diverged => "diverged",
    };
    let value = serde_json::json!({
        "steps": summary.steps,
        "final_time": summary.final_time,
        "termination": termination,
        "snapshots_written": summary.snapshots_written,
        "export_failures": summary.export_failures,
        "sanitized_values": summary.sanitized_values,
        "diverged": summary.diverged,
        "first_divergence_step": summary.first_divergence_step,
        "divergence_events": summary.divergence_events,
        "elapsed_s": elapsed,
    });
    println!("{}", serde_json::to_string_pretty(&value)?);
    Ok(())
}

/// Print mesh statistics, total mass and the critical time step.
pub fn inspect(mesh_path: &Path, config_path: Option<&Path>) -> CommandResult {
    let config = match config_path {
        Some(path) => load_config(path)?,
        None => SimulationConfig::default(),
    };

    let deck = Deck::parse_file(mesh_path)
        .map_err(|err| format!("{}: {err}", mesh_path.display()))?;
    let mesh = config.mesh_builder().build(&deck)?;
    println!("{}", mesh.statistics().format());

    let material = config.material.build()?;
    let operator = operator_for(mesh.element_type());
    let rest = vec![0.0; mesh.num_dofs()];
    let vectors = GlobalVectors::assemble(
        &mesh,
        material.as_ref(),
        operator.as_ref(),
        mesh.positions(),
        &rest,
    )?;
    let total_mass: f64 = vectors.mass.iter().step_by(3).sum();
    let critical = critical_timestep(&mesh, operator.as_ref(), material.as_ref());

    println!("Material: {}", material.name());
    println!("Total mass: {total_mass:.6e}");
    println!("Wave speed: {:.6e}", material.wave_speed());
    println!("Critical dt: {critical:.6e}");
    if config_path.is_some() {
        println!("Configured dt: {:.6e}", config.run.dt);
    }
    Ok(ExitCode::SUCCESS)
}

/// Check that a config parses and that its mesh and wall can be built.
pub fn validate(config_path: &Path) -> CommandResult {
    let config = load_config(config_path)?;
    let config_dir = config_path.parent();
    let mesh = config.load_mesh(config_dir)?;
    let material = config.material.build()?;
    let operator = operator_for(mesh.element_type());
    let wall = config.build_wall(&mesh)?;
    config.explicit_config()?;

    if let Some(wall) = &wall
        && wall.slave_nodes().is_empty()
    {
        println!("warning: wall is enabled but the mesh has no slave nodes");
    }
    let critical = critical_timestep(&mesh, operator.as_ref(), material.as_ref());
    if config.run.dt > critical {
        println!(
            "warning: dt {:.3e} exceeds the critical estimate {critical:.3e}",
            config.run.dt
        );
    }

    println!("{}: ok", config_path.display());
    Ok(ExitCode::SUCCESS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relative_paths_follow_the_config() {
        let dir = Path::new("/runs/cube");
        assert_eq!(
            relative_to(Some(dir), Path::new("output")),
            PathBuf::from("/runs/cube/output")
        );
        assert_eq!(
            relative_to(Some(dir), Path::new("/tmp/out")),
            PathBuf::from("/tmp/out")
        );
        assert_eq!(relative_to(None, Path::new("output")), PathBuf::from("output"));
    }

    #[test]
    fn missing_config_is_an_error() {
        let err = run(Path::new("/nonexistent/impact.toml"), false).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/impact.toml"));
    }
}
