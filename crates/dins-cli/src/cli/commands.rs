use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::info;

use super::CliError;
use dins_core::reduction::IterationRecord;
use dins_core::scattering::NoCorrection;
use dins_core::solver::AugmentedLagrangianSolver;
use dins_core::{
    InstrumentTable, ReductionConfig, ReductionEngine, ScatteringSetup, Spectrum,
};

#[derive(clap::Args)]
pub(super) struct ReduceArgs {
    /// Run configuration JSON
    #[arg(long)]
    run: PathBuf,

    /// Spectra arrays JSON (one histogram per detector, in table order)
    #[arg(long)]
    spectra: PathBuf,

    /// Instrument parameter table
    #[arg(long)]
    ip: PathBuf,

    /// JSON report output path; stdout when omitted
    #[arg(long)]
    report: Option<PathBuf>,
}

/// On-disk run file: the reduction configuration plus the optional sample
/// and simulation description.
#[derive(Debug, Deserialize)]
struct RunFile {
    config: ReductionConfig,
    #[serde(default)]
    scattering: ScatteringSetup,
}

#[derive(Debug, Serialize)]
struct ReduceReport {
    detector_numbers: Vec<u32>,
    iterations: Vec<IterationRecord>,
}

pub(super) fn run_reduce_command(args: ReduceArgs) -> Result<i32, CliError> {
    let run: RunFile = parse_json(&args.run, "run file")?;
    let spectra: Vec<Spectrum> = parse_json(&args.spectra, "spectra file")?;
    let table_text = read_file(&args.ip)?;
    let table = InstrumentTable::parse(&table_text)
        .map_err(|err| CliError::Usage(format!("{}: {err}", args.ip.display())))?;

    let solver = AugmentedLagrangianSolver::default();
    let estimator = NoCorrection;
    let engine = ReductionEngine::new(
        &run.config,
        &table,
        &solver,
        &estimator,
        run.scattering,
    )?;

    info!(
        detectors = engine.detector_map().len(),
        iterations = run.config.iterations,
        masses = run.config.masses.len(),
        "starting reduction"
    );
    let history = engine.run(&spectra)?;
    let converged = history.last();
    info!(
        mean_widths = ?converged.mean_widths,
        mean_intensity_ratios = ?converged.mean_intensity_ratios,
        "reduction finished"
    );

    let report = ReduceReport {
        detector_numbers: engine.detector_map().numbers().to_vec(),
        iterations: history.iterations,
    };
    let rendered = serde_json::to_string_pretty(&report)
        .map_err(|err| CliError::Internal(err.into()))?;
    match &args.report {
        Some(path) => {
            if let Some(parent) = path.parent()
                && !parent.as_os_str().is_empty()
            {
                fs::create_dir_all(parent)
                    .map_err(|err| CliError::Io(format!("{}: {err}", parent.display())))?;
            }
            fs::write(path, rendered)
                .map_err(|err| CliError::Io(format!("{}: {err}", path.display())))?;
            info!(report = %path.display(), "report written");
        }
        None => println!("{rendered}"),
    }
    Ok(0)
}

fn read_file(path: &Path) -> Result<String, CliError> {
    fs::read_to_string(path).map_err(|err| CliError::Io(format!("{}: {err}", path.display())))
}

fn parse_json<T: for<'de> Deserialize<'de>>(path: &Path, what: &str) -> Result<T, CliError> {
    let text = read_file(path)?;
    serde_json::from_str(&text)
        .map_err(|err| CliError::Usage(format!("invalid {what} {}: {err}", path.display())))
}
