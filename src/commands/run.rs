use anyhow::{Context as ErrorContext, Result};
use indicatif::ProgressBar;
use tracing::info;

use crate::config::Parameters;
use crate::context::Context;
use crate::files::report;
use crate::simulation::{Simulation, CONTACT_CUTOFF};

/// Write the summary and, if configured, every record of a finished run.
pub(crate) fn write_reports(
    parameters: &Parameters,
    simulation: &Simulation,
    write_header: bool,
) -> Result<()> {
    let metrics = simulation.metrics();

    report::append_summary(
        &parameters.output,
        &parameters.columns(),
        metrics,
        write_header,
    )
    .with_context(|| "Could not write simulation summary")?;

    if let Some(path) = &parameters.full_output {
        report::append_full_output(path, metrics.records())
            .with_context(|| "Could not write simulation records")?;
    }

    info!(output = %parameters.output.display(), records = metrics.len(), "reports written");
    Ok(())
}

pub fn run(context: Context) -> Result<()> {
    let parameters = &context.parameters;
    let mut simulation = Simulation::new(parameters)?;

    let bar = ProgressBar::new(u64::from(simulation.total_rounds()));
    simulation.run(&bar);
    bar.finish_and_clear();

    write_reports(parameters, &simulation, parameters.write_output_header)?;

    let metrics = simulation.metrics();
    for part in metrics.parts() {
        let selection = metrics.select().by_part(part);
        println!(
            "{:<28} nDCF6 {:.4}  bias {:+.3} ft  records {}",
            part.as_str(),
            selection.ndcf(CONTACT_CUTOFF),
            selection.bias(),
            selection.len()
        );
    }

    if metrics.is_empty() {
        println!("No records, nobody was in range of anyone");
    }

    Ok(())
}
