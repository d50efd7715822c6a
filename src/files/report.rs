use std::fs::OpenOptions;
use std::io::{BufWriter, Write};
use std::path::Path;

use anyhow::{Context as ErrorContext, Result};

use crate::metrics::{Metrics, Part, Record};
use crate::simulation::CONTACT_CUTOFF;

/// Statistic columns following the parameter columns of the summary.
pub const SUMMARY_COLUMNS: &str =
    "part,nDCF3,nDCF6,nDCF10,uErr,STD,uAbsErr,AbsSTD,Q0,Q1,Q2,Q3,Q4,stress";

pub const FULL_OUTPUT_HEADER: &str = "round,part,recording,neighbor,X,Y,reference,guess";

const QUANTILES: [f64; 5] = [0.0, 0.25, 0.5, 0.75, 1.0];

pub fn summary_header(parameters: &[(&str, String)]) -> String {
    let mut header: String = parameters.iter().map(|(key, _)| format!("{key},")).collect();
    header.push_str(SUMMARY_COLUMNS);
    header
}

/// One summary line per part that produced records.
pub fn summary_rows(parameters: &[(&str, String)], metrics: &Metrics) -> Vec<String> {
    let prefix: String = parameters
        .iter()
        .map(|(_, value)| format!("{value},"))
        .collect();

    metrics
        .parts()
        .into_iter()
        .map(|part: Part| {
            let selection = metrics.select().by_part(part);

            let mut row = format!(
                "{prefix}{part},{:.6},{:.6},{:.6},{:.6},{:.6},{:.6},{:.6}",
                selection.ndcf(3.0),
                selection.ndcf(CONTACT_CUTOFF),
                selection.ndcf(10.0),
                selection.bias(),
                selection.std_error(),
                selection.abs_bias(),
                selection.std_abs_error(),
            );
            for quantile in QUANTILES {
                row.push_str(&format!(",{:.6}", selection.q_error(quantile)));
            }
            row.push_str(&format!(",{:.6}", selection.mean_stress()));
            row
        })
        .collect()
}

fn append(path: &Path) -> Result<BufWriter<std::fs::File>> {
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("Could not open '{}' for writing", path.display()))?;
    Ok(BufWriter::new(file))
}

/// Append the per-part summary of a run to `path`.
pub fn append_summary(
    path: &Path,
    parameters: &[(&str, String)],
    metrics: &Metrics,
    write_header: bool,
) -> Result<()> {
    let mut writer = append(path)?;

    if write_header {
        writeln!(writer, "{}", summary_header(parameters))?;
    }
    for row in summary_rows(parameters, metrics) {
        writeln!(writer, "{row}")?;
    }

    writer
        .flush()
        .with_context(|| format!("Could not write summary to '{}'", path.display()))
}

pub fn full_output_row(record: &Record) -> String {
    format!(
        "{},{},{},{},{:.6},{:.6},{:.6},{:.6}",
        record.round,
        record.part,
        record.recorder,
        record.neighbor,
        record.x,
        record.y,
        record.true_distance,
        record.guessed_distance
    )
}

/// Append every record of a run to `path`.
pub fn append_full_output(path: &Path, records: &[Record]) -> Result<()> {
    let mut writer = append(path)?;

    writeln!(writer, "{FULL_OUTPUT_HEADER}")?;
    for record in records {
        writeln!(writer, "{}", full_output_row(record))?;
    }

    writer
        .flush()
        .with_context(|| format!("Could not write records to '{}'", path.display()))
}
