//! Newton-Raphson refinement of the panel state.
//!
//! ## System layout
//!
//! The unknowns are, in order: every cell voltage (string-major), the total
//! panel current, and one current per string. The residuals are one
//! single-diode equation per cell and one continuity equation per string,
//!
//! ```text
//! f_cell(V, I_string) = 0
//! I_total - I_string - mask * Id(-sum of string cell voltages) = 0
//! ```
//!
//! which leaves one more unknown than equation. The panel-voltage
//! constraint closes the system: the last cell's voltage is not solved for
//! but expressed as `V_last = V_panel - sum(other cell voltages)` and
//! substituted into the residuals and the Jacobian, keeping the system
//! square. The substitution spreads the last cell's voltage derivative
//! (negated) over every other cell column, zeroes the last string's diode
//! coupling onto its own cells and turns it into a negative coupling onto
//! every other string's cells.
//!
//! ## Iteration
//!
//! Each pass writes the state vector back into the cells and diodes,
//! evaluates the residual 2-norm, and stops once it reaches the configured
//! epsilon. A singular Jacobian is logged and the iteration continues from
//! the previous iterate; exceeding the iteration cap reports
//! non-convergence while keeping the best available state.

use tracing::warn;

use crate::panel::PvString;

use super::linear::DenseSystem;
use super::{DEFAULT_EPSILON, DEFAULT_MAX_ITERATIONS};

/// Newton-Raphson solver for the assembled panel system.
#[derive(Debug, Clone)]
pub struct NewtonSolver {
    /// Maximum iterations per operating point
    pub max_iterations: usize,
    /// Convergence threshold on the residual 2-norm
    pub epsilon: f64,
}

impl Default for NewtonSolver {
    fn default() -> Self {
        Self {
            max_iterations: DEFAULT_MAX_ITERATIONS,
            epsilon: DEFAULT_EPSILON,
        }
    }
}

/// Outcome of one Newton solve.
#[derive(Debug, Clone, Copy)]
pub struct SolveReport {
    /// Total panel current at the final state [A]
    pub current: f64,
    /// Iterations spent
    pub iterations: usize,
    /// Residual 2-norm at the final state
    pub residual: f64,
    /// Whether the residual reached epsilon within the iteration cap
    pub converged: bool,
}

impl NewtonSolver {
    /// Create a solver with the given cap and threshold.
    pub fn new(max_iterations: usize, epsilon: f64) -> Self {
        Self {
            max_iterations,
            epsilon,
        }
    }

    /// Refine the strings' state at panel voltage `v_panel`, starting from
    /// the working points already stored in the cells and diodes.
    ///
    /// On return every cell and diode holds its final working point; the
    /// report carries the total current and convergence information.
    pub fn solve(&self, strings: &mut [PvString], v_panel: f64) -> SolveReport {
        let n_strings = strings.len();
        let n_cells: usize = strings.iter().map(|s| s.cell_count()).sum();
        // Reduced system: all cell voltages but the eliminated one, the
        // total current, and one current per string
        let dim = n_cells + n_strings;

        // Full state vector: cell voltages, total current, string currents
        let mut state = load_initial_state(strings, n_cells);
        let mut system = DenseSystem::new(dim);
        let mut residuals = vec![0.0; dim];

        let mut iterations = 0;
        let (current, residual, converged) = loop {
            write_state(strings, &state, n_cells);

            let norm = self.evaluate_residuals(strings, &state, n_cells, &mut residuals);
            let current = state[n_cells];

            if !norm.is_finite() {
                warn!(
                    v_panel,
                    iterations, "residual diverged, aborting refinement"
                );
                break (current, norm, false);
            }
            if norm <= self.epsilon {
                break (current, norm, true);
            }
            if iterations >= self.max_iterations {
                break (current, norm, false);
            }

            self.assemble_jacobian(strings, n_cells, &mut system);
            for (row, &f) in residuals.iter().enumerate() {
                system.set_rhs(row, -f);
            }

            match system.factor().and_then(|_| system.solve()) {
                Ok(()) => {
                    apply_step(&mut state, &system.x, n_cells, v_panel);
                }
                Err(_) => {
                    // Keep the previous iterate; the step is lost but the
                    // sweep must go on
                    warn!(v_panel, iterations, "singular Jacobian, keeping iterate");
                }
            }

            iterations += 1;
        };

        SolveReport {
            current,
            iterations,
            residual,
            converged,
        }
    }

    /// Fill `residuals` and return the 2-norm.
    fn evaluate_residuals(
        &self,
        strings: &[PvString],
        state: &[f64],
        n_cells: usize,
        residuals: &mut [f64],
    ) -> f64 {
        let i_total = state[n_cells];

        let mut row = 0;
        for string in strings.iter() {
            for cell in &string.cells {
                residuals[row] = cell.residual();
                row += 1;
            }
        }
        for (s, string) in strings.iter().enumerate() {
            let i_string = state[n_cells + 1 + s];
            residuals[row] = i_total - i_string - string.diode_mask() * string.diode.current;
            row += 1;
        }

        residuals.iter().map(|f| f * f).sum::<f64>().sqrt()
    }

    /// Assemble the reduced Jacobian with the panel-voltage constraint
    /// substituted in.
    fn assemble_jacobian(&self, strings: &[PvString], n_cells: usize, system: &mut DenseSystem) {
        system.clear();

        let n_strings = strings.len();
        let eliminated = n_cells - 1;
        // Reduced column of the total current reuses the eliminated slot;
        // string currents follow it
        let col_total = eliminated;
        let col_string = |s: usize| n_cells + s;

        // Cell rows
        let mut row = 0;
        for (s, string) in strings.iter().enumerate() {
            for cell in &string.cells {
                let d_v = cell.residual_d_voltage();
                let d_i = cell.residual_d_current();
                if row == eliminated {
                    // V_last = V_panel - sum(other cell voltages): its
                    // voltage derivative lands negated on every other
                    // cell column
                    for col in 0..eliminated {
                        system.set(row, col, -d_v);
                    }
                } else {
                    system.set(row, row, d_v);
                }
                system.add(row, col_string(s), d_i);
                row += 1;
            }
        }

        // Continuity rows
        let mut first_cell = 0;
        for (s, string) in strings.iter().enumerate() {
            let row = n_cells + s;
            let len = string.cell_count();
            let g_d = string.diode_mask()
                * string.diode.conductance_at(-string.sum_cell_voltages());

            if s == n_strings - 1 {
                // The last string contains the eliminated cell: its own
                // columns cancel and every other string's column picks up
                // the diode conductance through the constraint
                for col in 0..first_cell {
                    system.set(row, col, -g_d);
                }
            } else {
                for col in first_cell..first_cell + len {
                    system.set(row, col, g_d);
                }
            }

            system.add(row, col_total, 1.0);
            system.add(row, col_string(s), -1.0);
            first_cell += len;
        }
    }
}

/// Build the full state vector from the strings' estimated working points.
fn load_initial_state(strings: &[PvString], n_cells: usize) -> Vec<f64> {
    let n_strings = strings.len();
    let mut state = vec![0.0; n_cells + 1 + n_strings];

    let mut idx = 0;
    for string in strings {
        for cell in &string.cells {
            state[idx] = cell.voltage;
            idx += 1;
        }
    }
    state[n_cells] = strings[0].cells[0].current
        + strings[0].diode_mask() * strings[0].diode.current;
    for (s, string) in strings.iter().enumerate() {
        state[n_cells + 1 + s] = string.cells[0].current;
    }
    state
}

/// Push the state vector into the cells and refresh the diode currents.
fn write_state(strings: &mut [PvString], state: &[f64], n_cells: usize) {
    let mut idx = 0;
    for (s, string) in strings.iter_mut().enumerate() {
        let i_string = state[n_cells + 1 + s];
        for cell in string.cells.iter_mut() {
            cell.voltage = state[idx];
            cell.current = i_string;
            idx += 1;
        }
        string.diode.current = if string.has_diode {
            string.diode.current_at(-string.sum_cell_voltages())
        } else {
            0.0
        };
    }
}

/// Apply the Newton step to every reduced unknown, then recompute the
/// eliminated voltage from the panel-voltage constraint.
fn apply_step(state: &mut [f64], delta: &[f64], n_cells: usize, v_panel: f64) {
    let eliminated = n_cells - 1;
    for (k, &d) in delta.iter().enumerate() {
        let full = if k < eliminated { k } else { k + 1 };
        state[full] += d;
    }

    let sum_others: f64 = state[..eliminated].iter().sum();
    state[eliminated] = v_panel - sum_others;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input;
    use crate::model::CellParams;
    use crate::panel::Panel;
    use approx::{assert_abs_diff_eq, assert_relative_eq};

    fn strings_for(text: &str) -> Vec<PvString> {
        let desc = input::parse(text).unwrap();
        Panel::new(&desc, CellParams::default()).unwrap().strings
    }

    #[test]
    fn test_single_cell_short_circuit() {
        let mut strings = strings_for("0;\n1000;25\n");
        strings[0].find_initial_state(3.8, 0.0);

        let report = NewtonSolver::default().solve(&mut strings, 0.0);
        assert!(report.converged);
        assert!(report.residual <= DEFAULT_EPSILON);
        assert_abs_diff_eq!(report.current, 3.8, epsilon = 0.01);
        assert_abs_diff_eq!(strings[0].cells[0].voltage, 0.0);
    }

    #[test]
    fn test_constraint_holds_after_solve() {
        let mut strings = strings_for("0;\n1000;25\n500;25\n0;\n800;25\n800;25\n");
        for s in strings.iter_mut() {
            let v = 0.5 / 2.0;
            s.find_initial_state(1.9, v);
        }

        let report = NewtonSolver::default().solve(&mut strings, 0.5);
        assert!(report.converged);
        let total: f64 = strings.iter().map(|s| s.sum_cell_voltages()).sum();
        assert_relative_eq!(total, 0.5, epsilon = 1e-9);
    }

    #[test]
    fn test_string_currents_match_continuity() {
        let mut strings = strings_for("0;\n1000;25\n1000;25\n");
        strings[0].find_initial_state(3.8, 0.4);

        let report = NewtonSolver::default().solve(&mut strings, 0.4);
        assert!(report.converged);
        // Without a diode the string current is the panel current
        assert_relative_eq!(
            report.current,
            strings[0].cells[0].current,
            epsilon = 1e-9
        );
    }

    #[test]
    fn test_iteration_cap_reports_non_convergence() {
        let mut strings = strings_for("0;\n1000;25\n500;25\n");
        strings[0].find_initial_state(1.9, 0.0);

        let solver = NewtonSolver::new(0, 1e-30);
        let report = solver.solve(&mut strings, 0.0);
        assert!(!report.converged);
        assert_eq!(report.iterations, 0);
    }

    #[test]
    fn test_perfect_guess_converges_immediately() {
        let mut strings = strings_for("0;\n1000;25\n");
        strings[0].find_initial_state(3.8, 0.0);
        // Converge once, then resolve from the converged state
        let solver = NewtonSolver::default();
        solver.solve(&mut strings, 0.0);
        let report = solver.solve(&mut strings, 0.0);
        assert!(report.converged);
        assert_eq!(report.iterations, 0);
    }
}
