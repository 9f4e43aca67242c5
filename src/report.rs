//! CSV output for sweeps and state dumps (CLI only).

use std::fmt::Write as _;
use std::path::Path;

use crate::error::{PvError, Result};
use crate::solver::{OperatingPoint, PanelState};

/// Render a characteristic sweep as `voltage;current` lines.
pub fn sweep_csv(points: &[OperatingPoint]) -> String {
    let mut out = String::new();
    for p in points {
        let _ = writeln!(out, "{};{}", p.voltage, p.current);
    }
    out
}

/// Render a full state dump: the diode currents followed by a per-cell
/// table.
pub fn state_csv(state: &PanelState) -> String {
    let mut out = String::new();
    for (k, id) in state.diode_currents.iter().enumerate() {
        let _ = writeln!(out, "Idiode({}) = {} A", k, id);
    }
    let _ = writeln!(out);
    let _ = writeln!(out, "String,Cell,Irrad.,Temper.,Curr. (A),Volt. (V)");
    for c in &state.cells {
        let _ = writeln!(
            out,
            "{},{},{},{},{},{}",
            c.string, c.index, c.irradiance, c.temperature, c.current, c.voltage
        );
    }
    out
}

/// Write a characteristic sweep to a CSV file.
pub fn write_sweep(points: &[OperatingPoint], path: &Path) -> Result<()> {
    std::fs::write(path, sweep_csv(points)).map_err(|e| PvError::FileWriteError {
        path: path.display().to_string(),
        source: e,
    })
}

/// Write a state dump to a CSV file.
pub fn write_state(state: &PanelState, path: &Path) -> Result<()> {
    std::fs::write(path, state_csv(state)).map_err(|e| PvError::FileWriteError {
        path: path.display().to_string(),
        source: e,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::solver::{CellState, OperatingPoint};

    #[test]
    fn test_sweep_csv_format() {
        let points = vec![
            OperatingPoint {
                voltage: 0.0,
                current: 3.8,
                converged: true,
                iterations: 3,
                residual: 1e-4,
            },
            OperatingPoint {
                voltage: 0.5,
                current: 3.7,
                converged: true,
                iterations: 2,
                residual: 1e-4,
            },
        ];
        assert_eq!(sweep_csv(&points), "0;3.8\n0.5;3.7\n");
    }

    #[test]
    fn test_state_csv_format() {
        let state = PanelState {
            point: OperatingPoint {
                voltage: 0.0,
                current: 1.9,
                converged: true,
                iterations: 4,
                residual: 1e-3,
            },
            diode_currents: vec![0.5],
            cells: vec![CellState {
                string: 0,
                index: 0,
                irradiance: 1000.0,
                temperature: 298.0,
                current: 1.9,
                voltage: 0.87,
            }],
        };
        let csv = state_csv(&state);
        assert!(csv.starts_with("Idiode(0) = 0.5 A\n"));
        assert!(csv.contains("String,Cell,Irrad.,Temper.,Curr. (A),Volt. (V)"));
        assert!(csv.contains("0,0,1000,298,1.9,0.87"));
    }
}
