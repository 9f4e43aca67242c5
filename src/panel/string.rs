//! A string of series cells under one bypass diode.

use tracing::warn;

use crate::input::StringDescription;
use crate::model::{BypassDiode, Cell, CellParams};
use crate::panel::group::{build_groups, clamp_breakdown, CellGroup};

/// A string of PV cells in series, optionally guarded by a bypass diode.
///
/// The diode object is always present; when `has_diode` is false its
/// continuity contribution is masked out of the solved system.
#[derive(Debug, Clone)]
pub struct PvString {
    /// Cells in physical order
    pub cells: Vec<Cell>,
    /// Bypass diode (masked when `has_diode` is false)
    pub diode: BypassDiode,
    /// Whether the bypass diode takes part in the system
    pub has_diode: bool,
    /// Diode knee voltage used for classification [V]
    pub knee_voltage: f64,
    /// Groups of equal short-circuit current, ascending by current
    pub groups: Vec<CellGroup>,
    /// Sum of the cells' open-circuit voltages [V]
    pub sum_voltage_open_circuit: f64,
    /// Sum of the cells' breakdown voltages [V]
    pub sum_voltage_breakdown: f64,
}

impl PvString {
    /// Build a string from its description: create the cells, derive their
    /// electrical parameters, group them and compute the breakdown clamps.
    pub fn new(desc: &StringDescription, params: CellParams, knee_voltage: f64) -> Self {
        let cells: Vec<Cell> = desc
            .cells
            .iter()
            .enumerate()
            .map(|(i, &(irradiance, temperature))| Cell::new(i, irradiance, temperature, params))
            .collect();

        let mut groups = build_groups(&cells);
        clamp_breakdown(&mut groups, desc.has_diode, knee_voltage);

        let sum_voltage_open_circuit = cells.iter().map(|c| c.voltage_open_circuit).sum();
        let sum_voltage_breakdown = cells.iter().map(|c| c.voltage_breakdown).sum();

        Self {
            cells,
            diode: BypassDiode::new(),
            has_diode: desc.has_diode,
            knee_voltage,
            groups,
            sum_voltage_open_circuit,
            sum_voltage_breakdown,
        }
    }

    /// Number of cells in the string.
    pub fn cell_count(&self) -> usize {
        self.cells.len()
    }

    /// Sum of the cells' present working-point voltages [V].
    pub fn sum_cell_voltages(&self) -> f64 {
        self.cells.iter().map(|c| c.voltage).sum()
    }

    /// 1.0 when the diode takes part in the system, 0.0 otherwise.
    pub fn diode_mask(&self) -> f64 {
        if self.has_diode {
            1.0
        } else {
            0.0
        }
    }

    /// Estimate a working point for every cell and the diode, given the
    /// current `i_in` imposed on the string and its terminal voltage `v_in`.
    ///
    /// When the string voltage stays above the diode knee (or there is no
    /// diode) the diode carries nothing and the cells split the terminal
    /// voltage; once the voltage reaches the knee the diode carries the
    /// current the clamped groups cannot.
    pub fn find_initial_state(&mut self, i_in: f64, v_in: f64) {
        if self.has_diode && v_in <= -self.knee_voltage {
            self.initial_state_with_diode(i_in);
        } else {
            self.initial_state_without_diode(i_in, v_in);
        }
    }

    /// Groups above the imposed current sit at open circuit, groups below
    /// at breakdown; the group matching the current exactly (if any) takes
    /// whatever voltage balances the string.
    fn initial_state_without_diode(&mut self, i_in: f64, v_in: f64) {
        // Groups are ascending by current: everything below `split` is in
        // breakdown, everything above is cut off
        let split = self
            .groups
            .partition_point(|g| g.current_shortcircuit < i_in);
        let active = (split < self.groups.len()
            && self.groups[split].current_shortcircuit == i_in)
            .then_some(split);

        let mut sum_others = 0.0;
        for (gi, group) in self.groups.iter().enumerate() {
            if Some(gi) == active {
                continue;
            }
            if gi < split {
                sum_others += group.sum_voltage_breakdown;
                for &ci in &group.members {
                    self.cells[ci].voltage = self.cells[ci].voltage_breakdown;
                    self.cells[ci].current = i_in;
                }
            } else {
                sum_others += group.sum_voltage_open_circuit;
                for &ci in &group.members {
                    self.cells[ci].voltage = self.cells[ci].voltage_open_circuit;
                    self.cells[ci].current = i_in;
                }
            }
        }

        if let Some(ai) = active {
            let group = &self.groups[ai];
            let v_active = (v_in - sum_others) / group.len() as f64;
            for &ci in &group.members {
                self.cells[ci].voltage = v_active;
                self.cells[ci].current = i_in;
            }
        }

        self.diode.current = 0.0;
    }

    /// With the diode conducting the active group is the lowest-current
    /// group whose breakdown clamp was lifted by the diode; the diode
    /// carries the difference between the imposed current and that group's
    /// short-circuit current.
    fn initial_state_with_diode(&mut self, i_in: f64) {
        let active = match self.groups.iter().position(|g| g.is_diode_clamped()) {
            Some(i) => i,
            None => {
                // Physically unreachable with a diode present: the
                // highest-current group always clamps. Keep the estimate
                // usable anyway.
                warn!("string has a conducting diode but no clamped group");
                self.groups.len() - 1
            }
        };
        let i_work = self.groups[active].current_shortcircuit;

        for (gi, group) in self.groups.iter().enumerate() {
            if gi < active {
                for &ci in &group.members {
                    self.cells[ci].voltage = self.cells[ci].voltage_breakdown;
                    self.cells[ci].current = i_work;
                }
            } else if gi > active {
                for &ci in &group.members {
                    self.cells[ci].voltage = self.cells[ci].voltage_open_circuit;
                    self.cells[ci].current = i_work;
                }
            }
        }

        let group = &self.groups[active];
        let v_active = group.vbrx_per_cell();
        for &ci in &group.members {
            self.cells[ci].voltage = v_active;
            self.cells[ci].current = i_work;
        }

        self.diode.current = i_in - i_work;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn string(irradiances: &[f64], has_diode: bool) -> PvString {
        let desc = StringDescription {
            has_diode,
            cells: irradiances.iter().map(|&g| (g, 25.0)).collect(),
        };
        PvString::new(&desc, CellParams::default(), 1.5)
    }

    #[test]
    fn test_aggregates() {
        let s = string(&[1000.0, 500.0], false);
        assert_eq!(s.cell_count(), 2);
        assert_relative_eq!(s.sum_voltage_open_circuit, 0.9 + 0.87);
        assert_relative_eq!(s.sum_voltage_breakdown, -30.0);
    }

    #[test]
    fn test_initial_state_active_group_balances_string() {
        let mut s = string(&[1000.0, 500.0], false);
        // Imposed current matches the low-irradiance group; the high one is
        // cut off at its open-circuit voltage
        s.find_initial_state(1.9, 0.0);
        assert_relative_eq!(s.cells[0].voltage, 0.9);
        assert_relative_eq!(s.cells[1].voltage, -0.9);
        assert_relative_eq!(s.cells[0].current, 1.9);
        assert_relative_eq!(s.cells[1].current, 1.9);
        assert_relative_eq!(s.diode.current, 0.0);
        assert_relative_eq!(s.sum_cell_voltages(), 0.0);
    }

    #[test]
    fn test_initial_state_low_group_in_breakdown() {
        let mut s = string(&[1000.0, 500.0], false);
        // Imposed current above the low group's Isc pushes it to breakdown
        let v_in = -15.0 + 0.45;
        s.find_initial_state(3.8, v_in);
        assert_relative_eq!(s.cells[1].voltage, -15.0);
        assert_relative_eq!(s.cells[0].voltage, v_in + 15.0);
        assert_relative_eq!(s.diode.current, 0.0);
    }

    #[test]
    fn test_initial_state_all_groups_cut_off() {
        let mut s = string(&[1000.0, 500.0], false);
        // Imposed current below every group: everything at open circuit
        s.find_initial_state(0.5, 1.77);
        assert_relative_eq!(s.cells[0].voltage, 0.9);
        assert_relative_eq!(s.cells[1].voltage, 0.87);
    }

    #[test]
    fn test_initial_state_diode_conducting() {
        let mut s = string(&[1000.0, 500.0], true);
        // At the knee the low group is clamped (-2.4) and active; the diode
        // carries the excess over its short-circuit current
        s.find_initial_state(3.8, -1.5);
        assert_relative_eq!(s.cells[1].voltage, -2.4);
        assert_relative_eq!(s.cells[0].voltage, 0.9);
        assert_relative_eq!(s.cells[0].current, 1.9);
        assert_relative_eq!(s.diode.current, 3.8 - 1.9);
    }

    #[test]
    fn test_initial_state_above_knee_ignores_diode() {
        let mut s = string(&[1000.0, 500.0], true);
        s.find_initial_state(1.9, 0.0);
        assert_relative_eq!(s.diode.current, 0.0);
        assert_relative_eq!(s.sum_cell_voltages(), 0.0);
    }
}
