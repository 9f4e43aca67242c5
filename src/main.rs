//! Pvstring - PV panel operating-point solver
//!
//! Computes the I-V characteristic or a single operating point of a PV
//! panel described by a text file: one diode-flag header line per string,
//! one `irradiance;temperature` line per cell.
//!
//! # Usage
//!
//! ```bash
//! pvstring panel.txt -o curve.csv
//! pvstring panel.txt --start -2 --end 30 --points 250 -o curve.csv
//! pvstring panel.txt --voltage 12.5 -o state.csv
//! ```

use std::path::PathBuf;

use clap::Parser;
use pvstring::{
    input,
    model::CellParams,
    report,
    solver::{DEFAULT_EPSILON, DEFAULT_MAX_ITERATIONS, DEFAULT_SWEEP_POINTS},
    Panel, PanelSolver, Result, SolverConfig,
};

/// PV panel operating-point solver
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the panel description file
    #[arg(value_name = "PANEL_FILE")]
    panel_file: PathBuf,

    /// Output CSV path
    #[arg(short, long, default_value = "out.csv")]
    output: PathBuf,

    /// Solve a single operating point at this voltage and dump the full
    /// per-cell state instead of sweeping
    #[arg(short, long)]
    voltage: Option<f64>,

    /// Sweep start voltage [V]
    #[arg(long, default_value_t = -2.0)]
    start: f64,

    /// Sweep end voltage [V]; defaults to the panel's open-circuit bound
    #[arg(long)]
    end: Option<f64>,

    /// Number of sweep points
    #[arg(long, default_value_t = DEFAULT_SWEEP_POINTS)]
    points: usize,

    /// Maximum Newton-Raphson iterations per point
    #[arg(long, default_value_t = DEFAULT_MAX_ITERATIONS)]
    max_iterations: usize,

    /// Convergence threshold on the residual norm
    #[arg(long, default_value_t = DEFAULT_EPSILON)]
    epsilon: f64,

    /// Bypass diode knee voltage override [V]
    #[arg(long)]
    knee_voltage: Option<f64>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    // Parse the panel description
    let desc = input::parse_file(&args.panel_file)?;

    // Build the panel
    let params = CellParams::default();
    let panel = match args.knee_voltage {
        Some(knee) => Panel::with_knee_voltage(&desc, params, knee)?,
        None => Panel::new(&desc, params)?,
    };

    // Create the solver
    let config = SolverConfig::new()
        .with_max_iterations(args.max_iterations)
        .with_epsilon(args.epsilon);
    let mut solver = PanelSolver::with_config(panel, config);

    match args.voltage {
        Some(v) => {
            let state = solver.operating_state(v);
            println!("{};{}", state.point.voltage, state.point.current);
            report::write_state(&state, &args.output)?;
        }
        None => {
            let end = args.end.unwrap_or_else(|| solver.max_voltage());
            let curve = solver.sweep(args.start, end, args.points)?;
            for point in &curve {
                println!("{};{}", point.voltage, point.current);
            }
            report::write_sweep(&curve, &args.output)?;
        }
    }

    Ok(())
}
