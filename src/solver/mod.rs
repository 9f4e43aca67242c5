//! The numerical engine: classification, zone assignment and
//! Newton-Raphson refinement.
//!
//! Solving one operating point runs three stages:
//!
//! 1. **Classification** (done once per panel): merge every string's cell
//!    groups into panel-wide classes and derive the voltage thresholds
//!    where the active class or the voltage distribution changes
//! 2. **Zone assignment**: locate the requested voltage between the
//!    thresholds and estimate a voltage per string, then a working point
//!    per cell and diode
//! 3. **Refinement**: iterate Newton-Raphson on the full nonlinear system
//!    until the residual norm drops below epsilon

pub mod classify;
mod linear;
mod newton;
mod zones;

pub use classify::PanelClasses;
pub use linear::DenseSystem;
pub use newton::{NewtonSolver, SolveReport};
pub use zones::{assign_string_voltages, class_current, working_zone};

use tracing::warn;

use crate::error::{PvError, Result};
use crate::panel::Panel;

/// Default maximum Newton-Raphson iterations per operating point.
pub const DEFAULT_MAX_ITERATIONS: usize = 50;

/// Default convergence threshold on the residual 2-norm.
pub const DEFAULT_EPSILON: f64 = 0.01;

/// Number of points of the default characteristic sweep.
pub const DEFAULT_SWEEP_POINTS: usize = 250;

/// Configuration for the solver.
#[derive(Debug, Clone)]
pub struct SolverConfig {
    /// Maximum Newton-Raphson iterations per operating point.
    pub max_iterations: usize,
    /// Convergence threshold on the residual 2-norm.
    pub epsilon: f64,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            max_iterations: DEFAULT_MAX_ITERATIONS,
            epsilon: DEFAULT_EPSILON,
        }
    }
}

impl SolverConfig {
    /// Create a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the maximum Newton-Raphson iterations.
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// Set the convergence threshold.
    pub fn with_epsilon(mut self, epsilon: f64) -> Self {
        self.epsilon = epsilon;
        self
    }
}

/// One solved operating point of the panel.
#[derive(Debug, Clone, Copy)]
pub struct OperatingPoint {
    /// Panel terminal voltage [V]
    pub voltage: f64,
    /// Total panel current [A]
    pub current: f64,
    /// Whether the residual reached epsilon within the iteration cap
    pub converged: bool,
    /// Newton iterations spent
    pub iterations: usize,
    /// Residual 2-norm at the final state
    pub residual: f64,
}

/// State of one cell at a solved operating point.
#[derive(Debug, Clone)]
pub struct CellState {
    /// String index in the panel
    pub string: usize,
    /// Cell position within the string
    pub index: usize,
    /// Irradiance [W/m2]
    pub irradiance: f64,
    /// Cell temperature [K]
    pub temperature: f64,
    /// Cell current [A]
    pub current: f64,
    /// Cell voltage [V]
    pub voltage: f64,
}

/// Full panel state at a solved operating point.
#[derive(Debug, Clone)]
pub struct PanelState {
    /// The solved operating point
    pub point: OperatingPoint,
    /// Per-string diode currents [A]
    pub diode_currents: Vec<f64>,
    /// Per-cell states, string-major
    pub cells: Vec<CellState>,
}

/// Solver for one panel: owns the strings, their classification and the
/// Newton engine.
///
/// Each call operates on the owned panel state; solving different voltages
/// concurrently requires one solver (and panel copy) per thread.
pub struct PanelSolver {
    panel: Panel,
    classes: PanelClasses,
    newton: NewtonSolver,
}

impl PanelSolver {
    /// Create a solver with the default configuration.
    pub fn new(panel: Panel) -> Self {
        Self::with_config(panel, SolverConfig::default())
    }

    /// Create a solver with a custom configuration.
    pub fn with_config(panel: Panel, config: SolverConfig) -> Self {
        let classes = PanelClasses::build(&panel.strings);
        let newton = NewtonSolver::new(config.max_iterations, config.epsilon);
        Self {
            panel,
            classes,
            newton,
        }
    }

    /// The panel being solved.
    pub fn panel(&self) -> &Panel {
        &self.panel
    }

    /// The panel-wide classification.
    pub fn classes(&self) -> &PanelClasses {
        &self.classes
    }

    /// Maximum physically meaningful panel voltage (sum of every cell's
    /// open-circuit voltage) [V].
    pub fn max_voltage(&self) -> f64 {
        self.classes.max_voltage
    }

    /// Solve the panel at terminal voltage `v`.
    ///
    /// Non-convergence is reported through the returned point, not as an
    /// error: the state is the best available iterate and a sweep caller
    /// usually wants to continue.
    pub fn solve_at(&mut self, v: f64) -> OperatingPoint {
        let i_estimate = class_current(&self.classes, v);
        let string_voltages =
            assign_string_voltages(&self.classes, v, self.panel.string_count());

        for (string, &vs) in self.panel.strings.iter_mut().zip(&string_voltages) {
            string.find_initial_state(i_estimate, vs);
        }

        let report = self.newton.solve(&mut self.panel.strings, v);
        if !report.converged {
            warn!(
                voltage = v,
                iterations = report.iterations,
                residual = report.residual,
                "operating point did not converge"
            );
        }

        OperatingPoint {
            voltage: v,
            current: report.current,
            converged: report.converged,
            iterations: report.iterations,
            residual: report.residual,
        }
    }

    /// Sweep the characteristic from `start` to `end` volts in `points`
    /// steps.
    ///
    /// The step is rounded to 2 decimals like every derived threshold, so
    /// the sweep lands on stable voltages; a step that rounds to zero is
    /// kept exact. Invalid parameters are rejected before any computation.
    pub fn sweep(&mut self, start: f64, end: f64, points: usize) -> Result<Vec<OperatingPoint>> {
        if start > end {
            return Err(PvError::invalid_sweep(format!(
                "start voltage {} above end voltage {}",
                start, end
            )));
        }
        if points < 1 {
            return Err(PvError::invalid_sweep("point count must be positive"));
        }

        let exact = (end - start) / points as f64;
        let rounded = (exact * 100.0).round() / 100.0;
        let step = if rounded > 0.0 { rounded } else { exact };

        let mut curve = Vec::with_capacity(points + 1);
        if step == 0.0 {
            curve.push(self.solve_at(start));
            return Ok(curve);
        }

        let mut k = 0usize;
        loop {
            let v = start + k as f64 * step;
            if v > end + step * 1e-9 {
                break;
            }
            curve.push(self.solve_at(v));
            k += 1;
        }
        Ok(curve)
    }

    /// Sweep the standard characteristic: -2 V up to the panel's
    /// open-circuit bound, [`DEFAULT_SWEEP_POINTS`] points.
    pub fn default_sweep(&mut self) -> Result<Vec<OperatingPoint>> {
        self.sweep(-2.0, self.max_voltage(), DEFAULT_SWEEP_POINTS)
    }

    /// Solve at `v` and capture the full per-cell and per-diode state.
    pub fn operating_state(&mut self, v: f64) -> PanelState {
        let point = self.solve_at(v);

        let diode_currents = self
            .panel
            .strings
            .iter()
            .map(|s| s.diode.current)
            .collect();

        let cells = self
            .panel
            .strings
            .iter()
            .enumerate()
            .flat_map(|(si, string)| {
                string.cells.iter().map(move |c| CellState {
                    string: si,
                    index: c.index,
                    irradiance: c.irradiance,
                    temperature: c.temperature,
                    current: c.current,
                    voltage: c.voltage,
                })
            })
            .collect();

        PanelState {
            point,
            diode_currents,
            cells,
        }
    }
}
