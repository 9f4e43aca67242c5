//! Panel assembly: strings, groups and shared cell parameters.

pub mod group;
mod string;

pub use group::CellGroup;
pub use string::PvString;

use crate::error::{PvError, Result};
use crate::input::PanelDescription;
use crate::model::CellParams;

/// Default knee voltage of the bypass diodes [V]
pub const DEFAULT_KNEE_VOLTAGE: f64 = 1.5;

/// A PV panel: series strings of cells sharing one set of intrinsic cell
/// parameters.
#[derive(Debug, Clone)]
pub struct Panel {
    /// Strings in series, in panel order
    pub strings: Vec<PvString>,
    /// Intrinsic parameters shared by every cell
    params: CellParams,
    /// Knee voltage applied to every string's diode [V]
    knee_voltage: f64,
}

impl Panel {
    /// Build a panel from a parsed description with the default knee
    /// voltage.
    pub fn new(desc: &PanelDescription, params: CellParams) -> Result<Self> {
        Self::with_knee_voltage(desc, params, DEFAULT_KNEE_VOLTAGE)
    }

    /// Build a panel with an overridden bypass-diode knee voltage.
    pub fn with_knee_voltage(
        desc: &PanelDescription,
        params: CellParams,
        knee_voltage: f64,
    ) -> Result<Self> {
        if desc.strings.is_empty() {
            return Err(PvError::invalid_description("panel has no strings"));
        }
        if let Some(i) = desc.strings.iter().position(|s| s.cells.is_empty()) {
            return Err(PvError::invalid_description(format!(
                "string {} has no cells",
                i
            )));
        }

        let strings = desc
            .strings
            .iter()
            .map(|s| PvString::new(s, params, knee_voltage))
            .collect();

        Ok(Self {
            strings,
            params,
            knee_voltage,
        })
    }

    /// Number of strings.
    pub fn string_count(&self) -> usize {
        self.strings.len()
    }

    /// Total number of cells across all strings.
    pub fn cell_count(&self) -> usize {
        self.strings.iter().map(|s| s.cell_count()).sum()
    }

    /// Intrinsic cell parameters shared across the panel.
    pub fn params(&self) -> &CellParams {
        &self.params
    }

    /// Knee voltage applied to the bypass diodes [V].
    pub fn knee_voltage(&self) -> f64 {
        self.knee_voltage
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input;

    #[test]
    fn test_panel_from_description() {
        let desc = input::parse("1;\n1000;25\n500;25\n0;\n1000;25\n").unwrap();
        let panel = Panel::new(&desc, CellParams::default()).unwrap();
        assert_eq!(panel.string_count(), 2);
        assert_eq!(panel.cell_count(), 3);
        assert!(panel.strings[0].has_diode);
        assert!(!panel.strings[1].has_diode);
        assert_eq!(panel.knee_voltage(), DEFAULT_KNEE_VOLTAGE);
    }

    #[test]
    fn test_knee_override_reaches_strings() {
        let desc = input::parse("1;\n1000;25\n500;25\n").unwrap();
        let panel = Panel::with_knee_voltage(&desc, CellParams::default(), 0.7).unwrap();
        assert_eq!(panel.strings[0].knee_voltage, 0.7);
        // Clamp candidate -0.7 - 0.9 = -1.6 for the low group
        let g0 = &panel.strings[0].groups[0];
        assert!((g0.sum_voltage_breakdown_clamped - (-1.6)).abs() < 1e-12);
    }

    #[test]
    fn test_empty_description_rejected() {
        let desc = PanelDescription::default();
        assert!(Panel::new(&desc, CellParams::default()).is_err());
    }
}
