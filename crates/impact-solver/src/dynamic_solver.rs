//! Explicit transient dynamics with a staggered leapfrog integrator.
//!
//! Solves `M ü = F_ext - F_int(u)` with a diagonal (lumped) mass matrix, so
//! every step is a vector update with no linear solve.
//!
//! # Central Difference Scheme
//!
//! Velocities live at half steps:
//!
//! ```text
//! a_0       = (F_ext - F_int(u_0)) / M
//! v_{1/2}   = v_0 + dt/2 * a_0
//! loop:
//!   x_{n+1}   = x_n + dt * v_{n+1/2}
//!   a_{n+1}   = (F_ext - F_int(u_{n+1})) / M   (+ contact, + gravity)
//!   v_{n+3/2} = v_{n+1/2} + dt * a_{n+1}
//!   v_{n+1}   = v_{n+3/2} - dt/2 * a_{n+1}     (reporting only)
//! ```
//!
//! The scheme is conditionally stable: `dt` must stay below the critical
//! step (see [`critical_timestep`]). Exceeding it is reported but not
//! refused.
//!
//! # Example
//!
//! ```no_run
//! use impact_io::VtkSnapshotWriter;
//! use impact_solver::{
//!     ElasticConstants, ExplicitConfig, ExplicitDynamics, Mesh, NeoHookean, Tet4, Wall,
//! };
//!
//! # fn example(mesh: Mesh) -> impact_solver::Result<()> {
//! let material = NeoHookean::from_elastic("steel", 7800.0, ElasticConstants::new(200e6, 0.25)?)?;
//! let wall = Wall::new(0.0999, 2, 1.0, 200e6)?
//!     .with_slave_nodes(mesh.slave_nodes().iter().copied());
//! let mut writer = VtkSnapshotWriter::new("output");
//!
//! let config = ExplicitConfig::default();
//! let mut solver = ExplicitDynamics::new(&mesh, &material, &Tet4, Some(&wall), config)?
//!     .with_snapshot_sink(&mut writer);
//! solver.initialize([0.1, 0.1, 0.2], [0.0, 0.0, -0.5])?;
//!
//! let summary = solver.solve(1e-5, 0.168)?;
//! println!("{} steps, {} snapshots", summary.steps, summary.snapshots_written);
//! # Ok(())
//! # }
//! ```

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use impact_io::{Snapshot, SnapshotSink, StateCheckpoint};
use tracing::{debug, info, warn};

use crate::assembly::{Assembler, GlobalVectors};
use crate::body_force::Gravity;
use crate::contact::Wall;
use crate::elements::ElementOperator;
use crate::error::{Result, SolverError};
use crate::materials::{MaterialHistory, MaterialModel};
use crate::mesh::{DOFS_PER_NODE, Mesh};

/// Snapshot cadence used unless configured otherwise.
pub const DEFAULT_EXPORT_INTERVAL: usize = 50;

/// Integrator options that do not belong to the physical model.
#[derive(Debug, Clone, PartialEq)]
pub struct ExplicitConfig {
    /// Export a snapshot every this many steps (0 disables export)
    pub export_interval: usize,
    /// Body acceleration applied after contact (None disables gravity)
    pub gravity: Option<Gravity>,
    /// Turn the first non-finite state or inverted element into a fatal
    /// error
    pub abort_on_divergence: bool,
    /// Wall-clock budget, checked once per step
    pub max_wall_time: Option<Duration>,
}

impl Default for ExplicitConfig {
    fn default() -> Self {
        Self {
            export_interval: DEFAULT_EXPORT_INTERVAL,
            gravity: Some(Gravity::default()),
            abort_on_divergence: false,
            max_wall_time: None,
        }
    }
}

impl ExplicitConfig {
    pub fn with_export_interval(mut self, interval: usize) -> Self {
        self.export_interval = interval;
        self
    }

    pub fn with_gravity(mut self, gravity: Gravity) -> Self {
        self.gravity = Some(gravity);
        self
    }

    pub fn without_gravity(mut self) -> Self {
        self.gravity = None;
        self
    }

    pub fn with_abort_on_divergence(mut self, abort: bool) -> Self {
        self.abort_on_divergence = abort;
        self
    }

    pub fn with_max_wall_time(mut self, limit: Duration) -> Self {
        self.max_wall_time = Some(limit);
        self
    }
}

/// Lifecycle of an integrator. Each instance runs exactly once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolverState {
    Uninitialized,
    Initialized,
    Running,
    Terminated,
}

/// Why the time loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationReason {
    /// Simulated time passed `time_end`
    Completed,
    /// A [`StopHandle`] requested a stop
    Cancelled,
    /// The configured wall-clock budget ran out
    WallTimeExceeded,
    /// An element turned inside out, or the state went non-finite far
    /// enough that internal forces could no longer be evaluated
    Diverged,
}

/// Outcome of [`ExplicitDynamics::solve`].
#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    /// Completed time-loop iterations
    pub steps: usize,
    pub final_time: f64,
    pub snapshots_written: usize,
    pub export_failures: usize,
    /// Values coerced to zero by the snapshot sink
    pub sanitized_values: usize,
    /// Whether a non-finite state or an inverted element was ever observed
    pub diverged: bool,
    pub first_divergence_step: Option<usize>,
    /// Number of steps at which divergence was observed
    pub divergence_events: usize,
    pub termination: TerminationReason,
}

impl RunSummary {
    fn new() -> Self {
        Self {
            steps: 0,
            final_time: 0.0,
            snapshots_written: 0,
            export_failures: 0,
            sanitized_values: 0,
            diverged: false,
            first_divergence_step: None,
            divergence_events: 0,
            termination: TerminationReason::Completed,
        }
    }
}

/// Kinetic and stored strain energy of the current state.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EnergyReport {
    pub kinetic: f64,
    pub internal: f64,
}

impl EnergyReport {
    pub fn total(&self) -> f64 {
        self.kinetic + self.internal
    }
}

/// Shared flag for stopping a running integrator from another thread.
#[derive(Debug, Clone, Default)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    pub fn request_stop(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_stop_requested(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Smallest `characteristic_length / wave_speed` over all elements of the
/// undeformed mesh.
pub fn critical_timestep(
    mesh: &Mesh,
    operator: &dyn ElementOperator,
    material: &dyn MaterialModel,
) -> f64 {
    let wave_speed = material.wave_speed();
    let mut x = Vec::with_capacity(operator.dofs_per_element());
    (0..mesh.num_elements())
        .map(|element| {
            x.clear();
            for &node in mesh.element_nodes(element) {
                x.extend_from_slice(&mesh.node_position(node));
            }
            operator.characteristic_length(&x) / wave_speed
        })
        .fold(f64::INFINITY, f64::min)
}

fn check_lumped_mass(mass: &[f64]) -> Result<()> {
    match mass.iter().position(|m| !(m.is_finite() && *m > 0.0)) {
        Some(dof) => Err(SolverError::DegenerateMass {
            dof,
            node: dof / DOFS_PER_NODE,
            mass: mass[dof],
        }),
        None => Ok(()),
    }
}

/// Explicit dynamics integrator.
///
/// Owns the kinematic state; mesh, material, element operator and wall are
/// borrowed from the caller for the lifetime of the run.
pub struct ExplicitDynamics<'a> {
    mesh: &'a Mesh,
    assembler: Assembler<'a>,
    wall: Option<&'a Wall>,
    sink: Option<&'a mut dyn SnapshotSink>,
    config: ExplicitConfig,
    stop: StopHandle,
    state: SolverState,

    reference: Vec<f64>,
    position: Vec<f64>,
    /// Half-step (staggered) velocity
    velocity: Vec<f64>,
    acceleration: Vec<f64>,
    global: GlobalVectors,
    history: Vec<MaterialHistory>,

    displacement: Vec<f64>,
    report_velocity: Vec<f64>,

    dt: f64,
    time: f64,
    step: usize,
}

impl<'a> ExplicitDynamics<'a> {
    pub fn new(
        mesh: &'a Mesh,
        material: &'a dyn MaterialModel,
        operator: &'a dyn ElementOperator,
        wall: Option<&'a Wall>,
        config: ExplicitConfig,
    ) -> Result<Self> {
        let assembler = Assembler::new(mesh, material, operator)?;
        if let Some(wall) = wall {
            if let Some(&bad) = wall.slave_nodes().iter().find(|&&n| n >= mesh.num_nodes()) {
                return Err(SolverError::InvalidMesh(format!(
                    "wall slave node {bad} out of range (mesh has {} nodes)",
                    mesh.num_nodes()
                )));
            }
            if wall.slave_nodes().is_empty() {
                warn!("wall has no slave nodes; contact is inactive");
            }
        }

        let ndof = mesh.num_dofs();
        Ok(Self {
            mesh,
            assembler,
            wall,
            sink: None,
            config,
            stop: StopHandle::default(),
            state: SolverState::Uninitialized,
            reference: mesh.positions().to_vec(),
            position: mesh.positions().to_vec(),
            velocity: vec![0.0; ndof],
            acceleration: vec![0.0; ndof],
            global: GlobalVectors::zeros(ndof),
            history: assembler.initial_history(),
            displacement: vec![0.0; ndof],
            report_velocity: vec![0.0; ndof],
            dt: 0.0,
            time: 0.0,
            step: 0,
        })
    }

    /// Route periodic snapshots to `sink`.
    pub fn with_snapshot_sink(mut self, sink: &'a mut dyn SnapshotSink) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Handle that stops the run at the next step boundary.
    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    pub fn state(&self) -> SolverState {
        self.state
    }

    pub fn config(&self) -> &ExplicitConfig {
        &self.config
    }

    pub fn time(&self) -> f64 {
        self.time
    }

    pub fn step(&self) -> usize {
        self.step
    }

    pub fn position(&self) -> &[f64] {
        &self.position
    }

    /// Reference (translated initial) configuration.
    pub fn reference_position(&self) -> &[f64] {
        &self.reference
    }

    pub fn staggered_velocity(&self) -> &[f64] {
        &self.velocity
    }

    pub fn acceleration(&self) -> &[f64] {
        &self.acceleration
    }

    /// Lumped mass from the latest assembly (zero before `solve`).
    pub fn lumped_mass(&self) -> &[f64] {
        &self.global.mass
    }

    pub fn displacement(&self) -> Vec<f64> {
        self.position
            .iter()
            .zip(&self.reference)
            .map(|(x, x0)| x - x0)
            .collect()
    }

    /// Velocity synchronised with the position: `v - dt/2 * a`.
    pub fn reporting_velocity(&self) -> Vec<f64> {
        self.velocity
            .iter()
            .zip(&self.acceleration)
            .map(|(v, a)| v - 0.5 * self.dt * a)
            .collect()
    }

    /// Translate the body by `origin_offset` and give every node
    /// `initial_velocity`. Must be called exactly once, before `solve`.
    pub fn initialize(
        &mut self,
        origin_offset: [f64; 3],
        initial_velocity: [f64; 3],
    ) -> Result<()> {
        if self.state != SolverState::Uninitialized {
            return Err(SolverError::InvalidInvocation(format!(
                "initialize called in state {:?}",
                self.state
            )));
        }
        if origin_offset.iter().chain(&initial_velocity).any(|x| !x.is_finite()) {
            return Err(SolverError::InvalidInvocation(
                "initial offset and velocity must be finite".to_string(),
            ));
        }

        for (x0, x) in self
            .reference
            .chunks_exact_mut(DOFS_PER_NODE)
            .zip(self.position.chunks_exact_mut(DOFS_PER_NODE))
        {
            for c in 0..DOFS_PER_NODE {
                x0[c] += origin_offset[c];
                x[c] = x0[c];
            }
        }
        for v in self.velocity.chunks_exact_mut(DOFS_PER_NODE) {
            v.copy_from_slice(&initial_velocity);
        }

        self.state = SolverState::Initialized;
        info!(
            dofs = self.mesh.num_dofs(),
            offset = ?origin_offset,
            velocity = ?initial_velocity,
            "initialized body"
        );
        Ok(())
    }

    /// Replace the uniform initial velocity with a per-dof field. Only valid
    /// between `initialize` and `solve`.
    pub fn set_initial_velocity_field(&mut self, velocity: &[f64]) -> Result<()> {
        if self.state != SolverState::Initialized {
            return Err(SolverError::InvalidInvocation(format!(
                "initial velocity can only be set after initialize, state is {:?}",
                self.state
            )));
        }
        if velocity.len() != self.velocity.len() {
            return Err(SolverError::InvalidInvocation(format!(
                "velocity field has {} entries, expected {}",
                velocity.len(),
                self.velocity.len()
            )));
        }
        if velocity.iter().any(|v| !v.is_finite()) {
            return Err(SolverError::InvalidInvocation(
                "initial velocity must be finite".to_string(),
            ));
        }
        self.velocity.copy_from_slice(velocity);
        Ok(())
    }

    /// Integrate until simulated time exceeds `time_end`.
    ///
    /// # Errors
    /// - `InvalidInvocation` if not initialized, already run, or given a bad
    ///   `dt` / `time_end`
    /// - `DegenerateMass` / `DegenerateElement` from the initial assembly
    /// - `Divergence` when `abort_on_divergence` is set
    ///
    /// Without `abort_on_divergence`, an element inverting mid-run ends the
    /// loop with [`TerminationReason::Diverged`] and an `Ok` summary.
    pub fn solve(&mut self, dt: f64, time_end: f64) -> Result<RunSummary> {
        match self.state {
            SolverState::Initialized => {}
            SolverState::Uninitialized => {
                return Err(SolverError::InvalidInvocation(
                    "solve called before initialize".to_string(),
                ));
            }
            SolverState::Running | SolverState::Terminated => {
                return Err(SolverError::InvalidInvocation(
                    "solve may only be called once per integrator".to_string(),
                ));
            }
        }
        if !(dt.is_finite() && dt > 0.0) {
            return Err(SolverError::InvalidInvocation(format!(
                "time step must be positive and finite, got {dt}"
            )));
        }
        if !(time_end >= 0.0) {
            return Err(SolverError::InvalidInvocation(format!(
                "end time must be non-negative, got {time_end}"
            )));
        }

        self.state = SolverState::Running;
        self.dt = dt;
        let result = self.run(time_end);
        self.state = SolverState::Terminated;
        result
    }

    fn run(&mut self, time_end: f64) -> Result<RunSummary> {
        let dt = self.dt;
        let started = Instant::now();
        let critical = critical_timestep(
            self.mesh,
            self.assembler.operator(),
            self.assembler.material(),
        );
        if dt > critical {
            warn!(dt, critical, "time step exceeds the critical estimate; the run may diverge");
        }
        info!(
            dt,
            time_end,
            critical,
            nodes = self.mesh.num_nodes(),
            elements = self.mesh.num_elements(),
            "starting explicit dynamics"
        );
        debug!("lumped mass is re-assembled every step");

        let mut summary = RunSummary::new();

        // a_0 at the initial configuration, then v_{1/2}
        self.evaluate_acceleration()?;
        for (v, a) in self.velocity.iter_mut().zip(&self.acceleration) {
            *v += 0.5 * dt * a;
        }
        self.check_divergence(&mut summary)?;

        while self.time <= time_end {
            if let Some(reason) = self.cancellation(started) {
                info!(step = self.step, time = self.time, ?reason, "stopping early");
                summary.termination = reason;
                break;
            }

            for (x, v) in self.position.iter_mut().zip(&self.velocity) {
                *x += dt * v;
            }
            if let Err(err) = self.evaluate_acceleration() {
                self.assembly_failed(err, &mut summary)?;
                summary.termination = TerminationReason::Diverged;
                break;
            }
            for (v, a) in self.velocity.iter_mut().zip(&self.acceleration) {
                *v += dt * a;
            }
            self.check_divergence(&mut summary)?;

            let interval = self.config.export_interval;
            if interval > 0 && self.step % interval == 0 {
                self.export(&mut summary);
            }
            debug!(step = self.step, time = self.time, "step complete");

            self.time += dt;
            self.step += 1;
        }

        summary.steps = self.step;
        summary.final_time = self.time;
        info!(
            steps = summary.steps,
            time = summary.final_time,
            snapshots = summary.snapshots_written,
            export_failures = summary.export_failures,
            sanitized = summary.sanitized_values,
            diverged = summary.diverged,
            elapsed_s = started.elapsed().as_secs_f64(),
            "explicit dynamics finished"
        );
        Ok(summary)
    }

    /// Assemble at the current position and rebuild the acceleration field:
    /// internal force, then contact, then gravity.
    fn evaluate_acceleration(&mut self) -> Result<()> {
        for ((u, x), x0) in self
            .displacement
            .iter_mut()
            .zip(&self.position)
            .zip(&self.reference)
        {
            *u = x - x0;
        }

        let assembler = self.assembler;
        assembler.assemble_into(
            &self.reference,
            &self.displacement,
            &mut self.history,
            &mut self.global,
        )?;
        check_lumped_mass(&self.global.mass)?;

        // no prescribed nodal loads: F_ext = 0
        for ((a, f), m) in self
            .acceleration
            .iter_mut()
            .zip(&self.global.internal_force)
            .zip(&self.global.mass)
        {
            *a = -f / m;
        }

        if let Some(wall) = self.wall {
            wall.apply(&self.position, &self.global.mass, &mut self.acceleration);
        }
        if let Some(gravity) = self.config.gravity {
            gravity.apply(&mut self.acceleration);
        }
        Ok(())
    }

    fn first_non_finite(&self) -> Option<(&'static str, usize)> {
        [
            ("position", &self.position),
            ("velocity", &self.velocity),
            ("acceleration", &self.acceleration),
        ]
        .into_iter()
        .find_map(|(field, values)| {
            values
                .iter()
                .position(|x| !x.is_finite())
                .map(|dof| (field, dof))
        })
    }

    fn check_divergence(&self, summary: &mut RunSummary) -> Result<()> {
        let Some((field, dof)) = self.first_non_finite() else {
            return Ok(());
        };
        if !summary.diverged {
            warn!(
                step = self.step,
                time = self.time,
                field,
                dof,
                "non-finite state detected; the time step is likely unstable"
            );
        }
        self.record_divergence(summary, field, dof)
    }

    /// Classify an assembly failure inside the time loop. An inverted
    /// element, or any failure once the state is non-finite, is divergence;
    /// everything else is passed through.
    fn assembly_failed(&self, err: SolverError, summary: &mut RunSummary) -> Result<()> {
        let (field, dof) = if let SolverError::InvertedElement { element, .. } = &err {
            let node = self.mesh.element_nodes(*element).first().copied().unwrap_or(0);
            ("deformation", DOFS_PER_NODE * node)
        } else if let Some(found) = self.first_non_finite() {
            found
        } else if summary.diverged {
            ("deformation", 0)
        } else {
            return Err(err);
        };
        warn!(
            step = self.step,
            time = self.time,
            error = %err,
            "internal forces could not be evaluated; stopping the run"
        );
        self.record_divergence(summary, field, dof)
    }

    fn record_divergence(
        &self,
        summary: &mut RunSummary,
        field: &'static str,
        dof: usize,
    ) -> Result<()> {
        summary.divergence_events += 1;
        if !summary.diverged {
            summary.diverged = true;
            summary.first_divergence_step = Some(self.step);
        }
        if self.config.abort_on_divergence {
            return Err(SolverError::Divergence {
                step: self.step,
                time: self.time,
                field,
                dof,
            });
        }
        Ok(())
    }

    fn cancellation(&self, started: Instant) -> Option<TerminationReason> {
        if self.stop.is_stop_requested() {
            return Some(TerminationReason::Cancelled);
        }
        if let Some(limit) = self.config.max_wall_time
            && started.elapsed() >= limit
        {
            return Some(TerminationReason::WallTimeExceeded);
        }
        None
    }

    fn export(&mut self, summary: &mut RunSummary) {
        let Some(sink) = self.sink.as_deref_mut() else {
            return;
        };
        for ((r, v), a) in self
            .report_velocity
            .iter_mut()
            .zip(&self.velocity)
            .zip(&self.acceleration)
        {
            *r = v - 0.5 * self.dt * a;
        }

        let snapshot = Snapshot {
            step: self.step,
            time: self.time,
            positions: &self.position,
            velocity: &self.report_velocity,
            acceleration: &self.acceleration,
            mass: &self.global.mass,
            connectivity: self.mesh.connectivity(),
            nodes_per_element: self.mesh.nodes_per_element(),
            cell_type: self.assembler.operator().cell_type(),
        };
        match sink.write_snapshot(&snapshot) {
            Ok(report) => {
                summary.snapshots_written += 1;
                summary.sanitized_values += report.sanitized_values;
                match &report.path {
                    Some(path) => {
                        info!(step = self.step, path = %path.display(), "exported snapshot")
                    }
                    None => debug!(step = self.step, "exported snapshot"),
                }
            }
            Err(err) => {
                summary.export_failures += 1;
                warn!(step = self.step, error = %err, "snapshot export failed");
            }
        }
    }

    /// Kinetic energy `½ Σ m v²` (reporting velocity) and internal energy.
    pub fn energy(&self) -> Result<EnergyReport> {
        let displacement = self.displacement();
        let mut scratch_history = self.history.clone();
        let mut scratch = GlobalVectors::zeros(self.mesh.num_dofs());
        self.assembler.assemble_into(
            &self.reference,
            &displacement,
            &mut scratch_history,
            &mut scratch,
        )?;

        let kinetic = 0.5
            * scratch
                .mass
                .iter()
                .zip(self.reporting_velocity())
                .map(|(m, v)| m * v * v)
                .sum::<f64>();
        let internal = self
            .assembler
            .strain_energy(&self.reference, &displacement, &self.history)?;
        Ok(EnergyReport { kinetic, internal })
    }

    /// Snapshot of the integrator state for [`impact_io::save_checkpoint`].
    pub fn checkpoint(&self) -> StateCheckpoint {
        let mut metadata = BTreeMap::new();
        metadata.insert(
            "element_type".to_string(),
            format!("{:?}", self.mesh.element_type()),
        );
        metadata.insert("num_nodes".to_string(), self.mesh.num_nodes().to_string());
        metadata.insert("material".to_string(), self.assembler.material().name().to_string());
        metadata.insert("state".to_string(), format!("{:?}", self.state));

        StateCheckpoint {
            step: self.step,
            time: self.time,
            dt: self.dt,
            position: self.position.clone(),
            staggered_velocity: self.velocity.clone(),
            metadata,
            ..StateCheckpoint::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::elements::Tet4;
    use crate::materials::{ElasticConstants, LinearElastic};
    use crate::mesh::ElementType;
    use approx::assert_relative_eq;

    fn unit_tet() -> Mesh {
        Mesh::new(
            ElementType::C3D4,
            vec![0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0],
            vec![0, 1, 2, 3],
        )
        .unwrap()
    }

    fn soft() -> LinearElastic {
        LinearElastic::new("soft", 1000.0, ElasticConstants::new(1e5, 0.3).unwrap()).unwrap()
    }

    #[test]
    fn config_builder() {
        let config = ExplicitConfig::default()
            .with_export_interval(10)
            .without_gravity()
            .with_abort_on_divergence(true)
            .with_max_wall_time(Duration::from_secs(5));
        assert_eq!(config.export_interval, 10);
        assert!(config.gravity.is_none());
        assert!(config.abort_on_divergence);
        assert_eq!(config.max_wall_time, Some(Duration::from_secs(5)));
        assert_eq!(ExplicitConfig::default().export_interval, DEFAULT_EXPORT_INTERVAL);
    }

    #[test]
    fn initialize_translates_reference() {
        let mesh = unit_tet();
        let material = soft();
        let mut solver =
            ExplicitDynamics::new(&mesh, &material, &Tet4, None, ExplicitConfig::default()).unwrap();
        solver.initialize([0.1, 0.1, 0.2], [0.0, 0.0, -0.5]).unwrap();

        assert_eq!(solver.state(), SolverState::Initialized);
        assert_relative_eq!(solver.position()[3], 1.1, epsilon = 1e-15);
        assert_eq!(solver.position(), solver.reference_position());
        assert!(solver.displacement().iter().all(|u| *u == 0.0));
        assert_eq!(solver.staggered_velocity()[5], -0.5);
        assert!(solver.initialize([0.0; 3], [0.0; 3]).is_err());
    }

    #[test]
    fn solve_state_machine() {
        let mesh = unit_tet();
        let material = soft();
        let mut solver =
            ExplicitDynamics::new(&mesh, &material, &Tet4, None, ExplicitConfig::default()).unwrap();
        assert!(matches!(
            solver.solve(1e-5, 1e-4),
            Err(SolverError::InvalidInvocation(_))
        ));

        solver.initialize([0.0; 3], [0.0; 3]).unwrap();
        assert!(solver.solve(0.0, 1e-4).is_err());
        assert!(solver.solve(f64::NAN, 1e-4).is_err());
        assert!(solver.solve(1e-5, -1.0).is_err());
        assert_eq!(solver.state(), SolverState::Initialized);

        solver.solve(1e-5, 1e-4).unwrap();
        assert_eq!(solver.state(), SolverState::Terminated);
        assert!(matches!(
            solver.solve(1e-5, 1e-4),
            Err(SolverError::InvalidInvocation(_))
        ));
    }

    #[test]
    fn zero_end_time_runs_one_step() {
        let mesh = unit_tet();
        let material = soft();
        let mut solver =
            ExplicitDynamics::new(&mesh, &material, &Tet4, None, ExplicitConfig::default()).unwrap();
        solver.initialize([0.0; 3], [0.0; 3]).unwrap();
        let summary = solver.solve(1e-5, 0.0).unwrap();
        assert_eq!(summary.steps, 1);
        assert_eq!(summary.termination, TerminationReason::Completed);
    }

    #[test]
    fn stop_handle_cancels_before_first_step() {
        let mesh = unit_tet();
        let material = soft();
        let mut solver =
            ExplicitDynamics::new(&mesh, &material, &Tet4, None, ExplicitConfig::default()).unwrap();
        solver.initialize([0.0; 3], [0.0; 3]).unwrap();
        solver.stop_handle().request_stop();

        let summary = solver.solve(1e-5, 1.0).unwrap();
        assert_eq!(summary.steps, 0);
        assert_eq!(summary.termination, TerminationReason::Cancelled);
    }

    #[test]
    fn wall_time_budget_stops_run() {
        let mesh = unit_tet();
        let material = soft();
        let config = ExplicitConfig::default().with_max_wall_time(Duration::ZERO);
        let mut solver = ExplicitDynamics::new(&mesh, &material, &Tet4, None, config).unwrap();
        solver.initialize([0.0; 3], [0.0; 3]).unwrap();
        let summary = solver.solve(1e-5, 1.0).unwrap();
        assert_eq!(summary.termination, TerminationReason::WallTimeExceeded);
    }

    #[test]
    fn unreferenced_node_has_degenerate_mass() {
        let mut positions = unit_tet().positions().to_vec();
        positions.extend([5.0, 5.0, 5.0]);
        let mesh = Mesh::new(ElementType::C3D4, positions, vec![0, 1, 2, 3]).unwrap();
        let material = soft();
        let mut solver =
            ExplicitDynamics::new(&mesh, &material, &Tet4, None, ExplicitConfig::default()).unwrap();
        solver.initialize([0.0; 3], [0.0; 3]).unwrap();

        let err = solver.solve(1e-5, 1e-4).unwrap_err();
        assert!(matches!(err, SolverError::DegenerateMass { node: 4, dof: 12, .. }));
        assert_eq!(solver.state(), SolverState::Terminated);
    }

    #[test]
    fn wall_slave_nodes_must_exist() {
        let mesh = unit_tet();
        let material = soft();
        let wall = Wall::new(0.0, 2, 1.0, 1.0).unwrap().with_slave_nodes([7]);
        let result = ExplicitDynamics::new(&mesh, &material, &Tet4, Some(&wall), ExplicitConfig::default());
        assert!(result.is_err());
    }

    #[test]
    fn critical_timestep_scales_with_wave_speed() {
        let mesh = unit_tet();
        let material = soft();
        let dt = critical_timestep(&mesh, &Tet4, &material);
        let expected = Tet4.characteristic_length(mesh.positions()) / material.wave_speed();
        assert_relative_eq!(dt, expected, epsilon = 1e-15);
    }

    #[test]
    fn divergence_is_reported_once_and_optionally_fatal() {
        let mesh = unit_tet();
        let material = soft();
        let mut solver =
            ExplicitDynamics::new(&mesh, &material, &Tet4, None, ExplicitConfig::default()).unwrap();
        let mut summary = RunSummary::new();
        solver.check_divergence(&mut summary).unwrap();
        assert!(!summary.diverged);

        solver.velocity[4] = f64::NAN;
        solver.check_divergence(&mut summary).unwrap();
        solver.step = 3;
        solver.check_divergence(&mut summary).unwrap();
        assert!(summary.diverged);
        assert_eq!(summary.first_divergence_step, Some(0));
        assert_eq!(summary.divergence_events, 2);

        solver.config.abort_on_divergence = true;
        let err = solver.check_divergence(&mut summary).unwrap_err();
        assert!(matches!(
            err,
            SolverError::Divergence {
                step: 3,
                field: "velocity",
                dof: 4,
                ..
            }
        ));
    }

    #[test]
    fn velocity_field_only_between_initialize_and_solve() {
        let mesh = unit_tet();
        let material = soft();
        let mut solver =
            ExplicitDynamics::new(&mesh, &material, &Tet4, None, ExplicitConfig::default()).unwrap();
        assert!(solver.set_initial_velocity_field(&[0.0; 12]).is_err());

        solver.initialize([0.0; 3], [0.0; 3]).unwrap();
        assert!(solver.set_initial_velocity_field(&[0.0; 9]).is_err());
        let mut field = [0.0; 12];
        field[3] = 0.25;
        solver.set_initial_velocity_field(&field).unwrap();
        assert_eq!(solver.staggered_velocity(), &field);
    }

    #[test]
    fn checkpoint_carries_state() {
        let mesh = unit_tet();
        let material = soft();
        let mut solver =
            ExplicitDynamics::new(&mesh, &material, &Tet4, None, ExplicitConfig::default()).unwrap();
        solver.initialize([0.0; 3], [1.0, 0.0, 0.0]).unwrap();
        solver.solve(1e-5, 5e-5).unwrap();

        let checkpoint = solver.checkpoint();
        assert_eq!(checkpoint.step, solver.step());
        assert_eq!(checkpoint.position, solver.position());
        assert_eq!(checkpoint.metadata["element_type"], "C3D4");
        assert_eq!(checkpoint.metadata["state"], "Terminated");
    }
}
