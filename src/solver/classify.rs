//! Panel-wide classification of cell groups.
//!
//! Every string's groups are merged into panel-wide equivalence classes
//! keyed by `(short-circuit current, per-cell clamped breakdown voltage)`.
//! Classes sharing a current are nested under one [`CurrentClass`]; the
//! distinct clamped voltages become its [`VoltageSubclass`]es.
//!
//! Two families of panel-voltage thresholds come out of the ordering:
//!
//! - **External limits**, one per current class: the panel voltage below
//!   which that class stops being the active one and the panel current
//!   jumps to the next class's short-circuit current.
//! - **Internal limits**, one per voltage subclass: the voltage (relative
//!   to the class's external limit) at which the voltage distribution
//!   inside the class shifts because a subclass hits its breakdown clamp.

use crate::panel::PvString;

/// Contribution of one string to a voltage subclass.
#[derive(Debug, Clone)]
pub struct StringShare {
    /// Index of the contributing string
    pub string_index: usize,
    /// Number of contributed cells
    pub cell_count: usize,
    /// Clamped breakdown voltage of the contributed cells [V]
    pub sum_voltage_breakdown_clamped: f64,
    /// Open-circuit voltage of the contributed (active) cells [V]
    pub sum_voltage_open_circuit_active: f64,
    /// Open-circuit voltage of the string's cells that sit behind the
    /// conducting diode and never activate [V]
    pub sum_voltage_open_circuit_non_active: f64,
}

/// Cells across the panel sharing both short-circuit current and per-cell
/// clamped breakdown voltage.
#[derive(Debug, Clone)]
pub struct VoltageSubclass {
    /// Clamped breakdown voltage per cell [V], the nested key
    pub vbrx_per_cell: f64,
    /// Total cell count
    pub cell_count: usize,
    /// Sum of clamped breakdown voltages [V]
    pub sum_voltage_breakdown_clamped: f64,
    /// Sum of active cells' open-circuit voltages [V]
    pub sum_voltage_open_circuit_active: f64,
    /// Sum of non-active cells' open-circuit voltages [V]
    pub sum_voltage_open_circuit_non_active: f64,
    /// Internal limit, relative to the class's external limit [V]
    pub limit_voltage: f64,
    /// Per-string contributions
    pub shares: Vec<StringShare>,
}

/// Cells across the panel sharing a short-circuit current.
#[derive(Debug, Clone)]
pub struct CurrentClass {
    /// Short-circuit current of the class [A]
    pub current_shortcircuit: f64,
    /// Total cell count
    pub cell_count: usize,
    /// Sum of clamped breakdown voltages [V]
    pub sum_voltage_breakdown_clamped: f64,
    /// Sum of active cells' open-circuit voltages [V]
    pub sum_voltage_open_circuit_active: f64,
    /// Sum of non-active cells' open-circuit voltages [V]
    pub sum_voltage_open_circuit_non_active: f64,
    /// External limit: the panel voltage at which this class stops being
    /// the active one [V]
    pub limit_voltage: f64,
    /// Subclasses, descending by per-cell clamped breakdown voltage
    pub subclasses: Vec<VoltageSubclass>,
}

/// The classified panel: current classes ascending by short-circuit
/// current, plus the global open-circuit bound.
#[derive(Debug, Clone)]
pub struct PanelClasses {
    /// Classes ascending by short-circuit current
    pub classes: Vec<CurrentClass>,
    /// Maximum physically meaningful panel voltage: the sum of every
    /// cell's open-circuit voltage [V]
    pub max_voltage: f64,
}

/// One keyed entry harvested from a string before merging.
struct RawEntry {
    current_shortcircuit: f64,
    vbrx_per_cell: f64,
    share: StringShare,
}

impl PanelClasses {
    /// Classify a panel's strings.
    pub fn build(strings: &[PvString]) -> Self {
        let mut raw = collect_entries(strings);

        // Ascending current, descending clamp for equal currents
        raw.sort_by(|a, b| {
            a.current_shortcircuit
                .total_cmp(&b.current_shortcircuit)
                .then(b.vbrx_per_cell.total_cmp(&a.vbrx_per_cell))
        });

        let subclasses = merge_entries(raw);
        let mut classes = nest_by_current(subclasses);

        let max_voltage = classes
            .iter()
            .map(|c| c.sum_voltage_open_circuit_active + c.sum_voltage_open_circuit_non_active)
            .sum();

        compute_external_limits(&mut classes, max_voltage);
        compute_internal_limits(&mut classes);

        Self {
            classes,
            max_voltage,
        }
    }

    /// Number of current classes.
    pub fn class_count(&self) -> usize {
        self.classes.len()
    }
}

/// Walk every string's groups ascending by current, emitting one entry per
/// group up to the first group whose breakdown clamp was lifted by the
/// diode. That group is the last reachable state of the string: it is
/// emitted with the open-circuit voltage of all later groups folded into
/// its non-active sum, and the later groups are skipped entirely.
fn collect_entries(strings: &[PvString]) -> Vec<RawEntry> {
    let mut raw = Vec::new();

    for (si, string) in strings.iter().enumerate() {
        let clamped_at = string.groups.iter().position(|g| g.is_diode_clamped());
        let reachable = clamped_at.unwrap_or(string.groups.len());

        for group in &string.groups[..reachable] {
            raw.push(RawEntry {
                current_shortcircuit: group.current_shortcircuit,
                vbrx_per_cell: group.vbrx_per_cell(),
                share: StringShare {
                    string_index: si,
                    cell_count: group.len(),
                    sum_voltage_breakdown_clamped: group.sum_voltage_breakdown_clamped,
                    sum_voltage_open_circuit_active: group.sum_voltage_open_circuit,
                    sum_voltage_open_circuit_non_active: 0.0,
                },
            });
        }

        if let Some(ci) = clamped_at {
            let group = &string.groups[ci];
            let non_active: f64 = string.groups[ci + 1..]
                .iter()
                .map(|g| g.sum_voltage_open_circuit)
                .sum();
            raw.push(RawEntry {
                current_shortcircuit: group.current_shortcircuit,
                vbrx_per_cell: group.vbrx_per_cell(),
                share: StringShare {
                    string_index: si,
                    cell_count: group.len(),
                    sum_voltage_breakdown_clamped: group.sum_voltage_breakdown_clamped,
                    sum_voltage_open_circuit_active: group.sum_voltage_open_circuit,
                    sum_voltage_open_circuit_non_active: non_active,
                },
            });
        }
    }

    raw
}

/// Fold sorted entries with equal `(current, clamp)` keys into subclasses.
fn merge_entries(raw: Vec<RawEntry>) -> Vec<(f64, VoltageSubclass)> {
    let mut merged: Vec<(f64, VoltageSubclass)> = Vec::new();

    for entry in raw {
        match merged.last_mut() {
            Some((isc, sub))
                if *isc == entry.current_shortcircuit
                    && sub.vbrx_per_cell == entry.vbrx_per_cell =>
            {
                sub.cell_count += entry.share.cell_count;
                sub.sum_voltage_breakdown_clamped += entry.share.sum_voltage_breakdown_clamped;
                sub.sum_voltage_open_circuit_active +=
                    entry.share.sum_voltage_open_circuit_active;
                sub.sum_voltage_open_circuit_non_active +=
                    entry.share.sum_voltage_open_circuit_non_active;
                sub.shares.push(entry.share);
            }
            _ => {
                let sub = VoltageSubclass {
                    vbrx_per_cell: entry.vbrx_per_cell,
                    cell_count: entry.share.cell_count,
                    sum_voltage_breakdown_clamped: entry.share.sum_voltage_breakdown_clamped,
                    sum_voltage_open_circuit_active: entry.share.sum_voltage_open_circuit_active,
                    sum_voltage_open_circuit_non_active: entry
                        .share
                        .sum_voltage_open_circuit_non_active,
                    limit_voltage: 0.0,
                    shares: vec![entry.share],
                };
                merged.push((entry.current_shortcircuit, sub));
            }
        }
    }

    merged
}

/// Nest subclasses sharing a short-circuit current under one class.
fn nest_by_current(subclasses: Vec<(f64, VoltageSubclass)>) -> Vec<CurrentClass> {
    let mut classes: Vec<CurrentClass> = Vec::new();

    for (isc, sub) in subclasses {
        match classes.last_mut() {
            Some(class) if class.current_shortcircuit == isc => {
                class.cell_count += sub.cell_count;
                class.sum_voltage_breakdown_clamped += sub.sum_voltage_breakdown_clamped;
                class.sum_voltage_open_circuit_active += sub.sum_voltage_open_circuit_active;
                class.sum_voltage_open_circuit_non_active +=
                    sub.sum_voltage_open_circuit_non_active;
                class.subclasses.push(sub);
            }
            _ => classes.push(CurrentClass {
                current_shortcircuit: isc,
                cell_count: sub.cell_count,
                sum_voltage_breakdown_clamped: sub.sum_voltage_breakdown_clamped,
                sum_voltage_open_circuit_active: sub.sum_voltage_open_circuit_active,
                sum_voltage_open_circuit_non_active: sub.sum_voltage_open_circuit_non_active,
                limit_voltage: 0.0,
                subclasses: vec![sub],
            }),
        }
    }

    classes
}

/// External limits: starting from the global open-circuit bound, each class
/// trades its active open-circuit voltage for its breakdown clamp. The
/// running value strictly decreases with the class index.
fn compute_external_limits(classes: &mut [CurrentClass], max_voltage: f64) {
    let mut limit = max_voltage;
    for class in classes.iter_mut() {
        limit -= class.sum_voltage_open_circuit_active;
        limit += class.sum_voltage_breakdown_clamped;
        class.limit_voltage = limit;
    }
}

/// Internal limits: within a class, walk subclasses from the largest clamp
/// (first to transition) to the most negative one, tracking how many cells
/// are still interpolating and how much breakdown voltage is already
/// spent. The most negative subclass always ends at exactly zero.
fn compute_internal_limits(classes: &mut [CurrentClass]) {
    for class in classes.iter_mut() {
        let mut n = class.cell_count;
        let mut offset = -class.sum_voltage_breakdown_clamped;
        for sub in class.subclasses.iter_mut() {
            sub.limit_voltage = n as f64 * sub.vbrx_per_cell + offset;
            n -= sub.cell_count;
            offset += sub.sum_voltage_breakdown_clamped;
        }
    }
}
