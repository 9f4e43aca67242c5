//! Working-zone lookup and per-string voltage estimates.
//!
//! The external limits split the panel-voltage axis into zones. Inside a
//! zone the set of active/non-active/breakdown cells is unchanged: zone 0
//! is the highest-voltage interval where the lowest-current class is
//! active, and each following zone hands the panel current to the next
//! class up.
//!
//! Given a target voltage the assigner distributes it over the strings:
//! classes already past their threshold contribute their breakdown clamps,
//! classes not yet reached contribute open-circuit voltages, and the active
//! class splits the remainder over its still-interpolating cells.

use super::classify::PanelClasses;

/// Find the working zone for panel voltage `v`: the first class whose
/// external limit lies below `v`.
///
/// Voltages below every limit saturate to the last class, so the lookup is
/// total over the voltage axis.
pub fn working_zone(classes: &PanelClasses, v: f64) -> usize {
    classes
        .classes
        .iter()
        .position(|c| v > c.limit_voltage)
        .unwrap_or(classes.classes.len() - 1)
}

/// Short-circuit current of the class active at panel voltage `v` - the
/// panel current estimate fed to the initial state.
pub fn class_current(classes: &PanelClasses, v: f64) -> f64 {
    classes.classes[working_zone(classes, v)].current_shortcircuit
}

/// Distribute panel voltage `v` into one estimated voltage per string.
pub fn assign_string_voltages(classes: &PanelClasses, v: f64, string_count: usize) -> Vec<f64> {
    let m = working_zone(classes, v);
    let mut voltages = vec![0.0; string_count];

    // Classes before the zone are past their threshold: their cells sit at
    // the breakdown clamp, the rest of their strings' cells at open circuit
    for class in &classes.classes[..m] {
        for sub in &class.subclasses {
            for share in &sub.shares {
                voltages[share.string_index] += share.sum_voltage_breakdown_clamped
                    + share.sum_voltage_open_circuit_non_active;
            }
        }
    }

    // Classes after the zone are not yet reached: fully open-circuit
    for class in &classes.classes[m + 1..] {
        for sub in &class.subclasses {
            for share in &sub.shares {
                voltages[share.string_index] += share.sum_voltage_open_circuit_active
                    + share.sum_voltage_open_circuit_non_active;
            }
        }
    }

    assign_middle_zone(classes, m, v, &mut voltages);

    voltages
}

/// The active class: find which internal bracket the voltage falls in,
/// pin the subclasses above it at their clamps and interpolate the rest.
fn assign_middle_zone(classes: &PanelClasses, m: usize, v: f64, voltages: &mut [f64]) {
    let class = &classes.classes[m];
    let v_rel = v - class.limit_voltage;

    // Subclasses are stored descending by clamp with decreasing internal
    // limits; the prefix with limits above `v_rel` is already pinned
    let split = class
        .subclasses
        .partition_point(|sub| v_rel < sub.limit_voltage);

    for sub in &class.subclasses[..split] {
        for share in &sub.shares {
            voltages[share.string_index] +=
                share.sum_voltage_breakdown_clamped + share.sum_voltage_open_circuit_non_active;
        }
    }

    // Below every internal limit (saturated zone) nothing interpolates
    if split == class.subclasses.len() {
        return;
    }

    let reference = &class.subclasses[split];
    let n_active: usize = class.subclasses[split..].iter().map(|s| s.cell_count).sum();
    let v_cell = (v_rel - reference.limit_voltage) / n_active as f64 + reference.vbrx_per_cell;

    for sub in &class.subclasses[split..] {
        for share in &sub.shares {
            voltages[share.string_index] += share.cell_count as f64 * v_cell
                + share.sum_voltage_open_circuit_non_active;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input;
    use crate::model::CellParams;
    use crate::panel::Panel;
    use crate::solver::classify::PanelClasses;
    use approx::assert_relative_eq;

    fn classified(text: &str) -> (PanelClasses, usize) {
        let desc = input::parse(text).unwrap();
        let panel = Panel::new(&desc, CellParams::default()).unwrap();
        let n = panel.string_count();
        (PanelClasses::build(&panel.strings), n)
    }

    #[test]
    fn test_zone_zero_at_high_voltage() {
        let (classes, _) = classified("0;\n1000;25\n500;25\n");
        assert_eq!(working_zone(&classes, 1.5), 0);
        assert_eq!(working_zone(&classes, 0.0), 0);
        assert_relative_eq!(class_current(&classes, 0.0), 1.9);
    }

    #[test]
    fn test_zone_advances_below_limits() {
        let (classes, _) = classified("0;\n1000;25\n500;25\n");
        // limits are -14.1 and -30
        assert_eq!(working_zone(&classes, -14.5), 1);
        assert_relative_eq!(class_current(&classes, -14.5), 3.8);
        // below every limit: saturates to the last class
        assert_eq!(working_zone(&classes, -31.0), 1);
    }

    #[test]
    fn test_zone_valid_across_full_range() {
        let (classes, _) = classified("0;\n1000;25\n800;25\n600;25\n1;\n1000;25\n400;25\n");
        let last = classes.classes.last().unwrap().limit_voltage;
        let lto = classes.max_voltage;
        let n = classes.class_count();
        let mut v = last;
        while v <= lto {
            let zone = working_zone(&classes, v);
            assert!(zone < n);
            v += 0.05;
        }
    }

    #[test]
    fn test_assignment_sums_to_panel_voltage() {
        // Without diodes every cell keeps interpolating, so the string
        // estimates add up to the requested panel voltage exactly
        let (classes, n) = classified("0;\n1000;25\n500;25\n0;\n800;25\n800;25\n");
        for &v in &[1.5, 0.7, 0.0, -1.0, -5.0] {
            let assigned = assign_string_voltages(&classes, v, n);
            let total: f64 = assigned.iter().sum();
            assert_relative_eq!(total, v, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_assignment_single_string_matches_input() {
        let (classes, n) = classified("0;\n1000;25\n500;25\n");
        let assigned = assign_string_voltages(&classes, 0.0, n);
        assert_eq!(assigned.len(), 1);
        assert_relative_eq!(assigned[0], 0.0, epsilon = 1e-9);
    }

    #[test]
    fn test_bypassed_string_pinned_at_clamp() {
        // Two strings; the first is bypassed below its class limit and its
        // estimate freezes at clamp + non-active open circuit
        let (classes, n) = classified("1;\n1000;25\n500;25\n0;\n1000;25\n1000;25\n");
        // Low class (1.9) limit: 3.55 - 0.87 - 2.4 = 0.28, so 0 V sits in
        // the strong class's zone
        let assigned = assign_string_voltages(&classes, 0.0, n);
        assert_relative_eq!(assigned[0], -2.4 + 0.9, epsilon = 1e-9);
        // The active class picks up the remainder
        assert_relative_eq!(assigned[1], 0.0 - assigned[0], epsilon = 1e-9);
    }

    #[test]
    fn test_open_circuit_assignment_at_max_voltage() {
        let (classes, n) = classified("0;\n1000;25\n500;25\n");
        let assigned = assign_string_voltages(&classes, classes.max_voltage, n);
        assert_relative_eq!(assigned[0], 1.77, epsilon = 1e-9);
    }
}
