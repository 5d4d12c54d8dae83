//! Export propagated results.
//!
//! The JSON file is the portable record of a run (central value, total
//! uncertainty band, per-bin summary). The CSV holds only the per-bin summary
//! and is meant for spreadsheets or downstream scripts.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use chrono::Utc;

use crate::domain::{BinSummary, PropagatorKind, ResultFile};
use crate::error::{Result, XsecError};
use crate::hist::Histogram;
use crate::systematic::Systematic;

/// Per-bin view of a central value and its `[up, down]` uncertainty.
pub fn bin_summaries(central: &Histogram, total: &Systematic<Histogram>) -> Result<Vec<BinSummary>> {
    let up = total.up()?;
    let down = total.down()?;
    central.check_binning(up)?;
    central.check_binning(down)?;

    let edges = central.edges();
    let stat = central.errors();
    Ok((0..central.nbins())
        .map(|i| BinSummary {
            low: edges[i],
            high: edges[i + 1],
            value: central.value(i),
            stat_error: stat[i],
            syst_up: up.value(i),
            syst_down: down.value(i),
        })
        .collect())
}

/// Assemble the JSON record of a run.
pub fn result_file(
    propagator: PropagatorKind,
    systematics: Vec<String>,
    central: &Histogram,
    total: &Systematic<Histogram>,
) -> Result<ResultFile> {
    Ok(ResultFile {
        tool: "xsec".to_string(),
        generated_at: Utc::now(),
        propagator,
        systematics,
        bins: bin_summaries(central, total)?,
        central: central.clone(),
        uncertainty_up: total.up()?.clone(),
        uncertainty_down: total.down()?.clone(),
    })
}

/// Write a result JSON file.
pub fn write_result_json(path: &Path, result: &ResultFile) -> Result<()> {
    let file = File::create(path).map_err(|e| {
        XsecError::Persistence(format!("failed to create result JSON '{}': {e}", path.display()))
    })?;
    serde_json::to_writer_pretty(BufWriter::new(file), result)?;
    Ok(())
}

/// Read a result JSON file.
pub fn read_result_json(path: &Path) -> Result<ResultFile> {
    let file = File::open(path).map_err(|e| {
        XsecError::Persistence(format!("failed to open result JSON '{}': {e}", path.display()))
    })?;
    serde_json::from_reader(file)
        .map_err(|e| XsecError::Persistence(format!("invalid result JSON: {e}")))
}

/// Write the per-bin summary as CSV.
pub fn write_bins_csv(path: &Path, bins: &[BinSummary]) -> Result<()> {
    let mut file = BufWriter::new(File::create(path).map_err(|e| {
        XsecError::Persistence(format!("failed to create export CSV '{}': {e}", path.display()))
    })?);

    writeln!(file, "low,high,value,stat_error,syst_up,syst_down")?;
    for b in bins {
        writeln!(
            file,
            "{},{},{:.10e},{:.10e},{:.10e},{:.10e}",
            b.low, b.high, b.value, b.stat_error, b.syst_up, b.syst_down
        )?;
    }
    file.flush()?;
    Ok(())
}
