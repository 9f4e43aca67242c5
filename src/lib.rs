//! # Pvstring
//!
//! An operating-point solver for photovoltaic panels built from series
//! strings of mismatched cells, each string optionally guarded by a bypass
//! diode.
//!
//! This library provides:
//! - The single-diode cell model (with reverse breakdown) and the bypass
//!   diode model, including closed-form derivatives
//! - A classification engine that groups cells by short-circuit current and
//!   breakdown behavior to derive the panel voltages where the set of
//!   active/non-active/breakdown cells changes
//! - An initial-estimate assignment that turns those thresholds into a full
//!   state guess for a requested terminal voltage
//! - A Newton-Raphson solver that refines the guess into a simultaneous
//!   solution of all cell and continuity equations
//!
//! ## Architecture
//!
//! The library is organized into several modules:
//!
//! - [`input`] - Parser for the panel description format
//! - [`panel`] - Strings, cell groups and panel assembly
//! - [`model`] - Device models (cell, bypass diode)
//! - [`solver`] - Classification, zone assignment and Newton iteration
//! - [`report`] - CSV output (CLI only)
//!
//! ## Usage
//!
//! ```bash
//! pvstring panel.txt -o curve.csv
//! pvstring panel.txt --voltage 12.5 -o state.csv
//! ```
//!
//! ## Solution method
//!
//! For each requested terminal voltage V:
//!
//! 1. Locate the working zone: the interval of panel voltages between two
//!    classification limits inside which the active current class is
//!    unchanged
//! 2. Assign an estimated voltage to every string, and from it an estimated
//!    working point to every cell and diode
//! 3. Refine with Newton-Raphson: one residual per cell plus one continuity
//!    equation per string, with the panel-voltage constraint substituted
//!    into the system so it stays square

pub mod error;
pub mod input;
pub mod model;
pub mod panel;
pub mod solver;

#[cfg(feature = "cli")]
pub mod report;

// Re-export main types for convenience
pub use error::{PvError, Result};
pub use panel::Panel;
pub use solver::{OperatingPoint, PanelSolver, SolverConfig};

/// Boltzmann constant [J/K]
pub const BOLTZMANN: f64 = 1.38e-23;

/// Elementary charge [C]
pub const ELECTRON_CHARGE: f64 = 1.602e-19;

/// Offset between Celsius and kelvin used throughout the device models
pub const CELSIUS_TO_KELVIN: f64 = 273.0;

/// Thermal voltage k*T/q at temperature `t` in kelvin.
pub fn thermal_voltage(t: f64) -> f64 {
    BOLTZMANN * t / ELECTRON_CHARGE
}
