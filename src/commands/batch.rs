use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context as ErrorContext, Result};
use indicatif::{MultiProgress, ProgressBar};
use tokio::task::JoinSet;
use tracing::{error, info};

use crate::commands::run::write_reports;
use crate::config::Parameters;
use crate::context::Context;
use crate::simulation::Simulation;

/// Scene files (`*.txt`) in `dir`, sorted by name.
fn scene_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let entries = fs::read_dir(dir)
        .with_context(|| format!("Could not read scene folder '{}'", dir.display()))?;

    let mut scenes = Vec::new();
    for entry in entries {
        let path = entry?.path();
        if path.is_file() && path.extension().map_or(false, |ext| ext == "txt") {
            scenes.push(path);
        }
    }
    scenes.sort();

    Ok(scenes)
}

fn run_scene(context: Context, bar: ProgressBar) -> Result<(Context, Simulation)> {
    let mut simulation = Simulation::new(&context.parameters)?;
    bar.set_length(u64::from(simulation.total_rounds()));
    simulation.run(&bar);
    bar.finish_and_clear();

    Ok((context, simulation))
}

/// Parameters of one scene: its own setting and a full output next to it.
fn scene_parameters(base: &Parameters, scene: &Path) -> Parameters {
    let mut parameters = base.clone();
    parameters.setting = Some(scene.to_path_buf());
    parameters.full_output = Some(scene.with_extension("csv"));
    parameters
}

/// Simulate every scene in `scenes_dir`, at most `jobs` at a time.
///
/// Summaries are appended to the shared output file one finished scene at a
/// time; the header is written at most once.
pub async fn batch(context: Context, scenes_dir: &Path, jobs: usize) -> Result<()> {
    let scenes = scene_files(scenes_dir)?;
    if scenes.is_empty() {
        bail!("No scene files (*.txt) found in '{}'", scenes_dir.display());
    }

    let total = scenes.len();
    let jobs = jobs.max(1);
    info!(scenes = total, jobs, "starting batch");

    let progress = MultiProgress::new();
    let mut tasks = JoinSet::new();
    let mut write_header = context.parameters.write_output_header;
    let mut failures = 0;

    let mut finish = |result: Result<(Context, Simulation)>, write_header: &mut bool| {
        let written = result.and_then(|(context, simulation)| {
            write_reports(&context.parameters, &simulation, *write_header)?;
            Ok(context)
        });

        match written {
            Ok(context) => {
                *write_header = false;
                if let Some(scene) = &context.parameters.setting {
                    info!(scene = %scene.display(), "scene done");
                }
            }
            Err(err) => {
                error!("{err:#}");
                failures += 1;
            }
        }
    };

    for scene in scenes {
        if tasks.len() >= jobs {
            if let Some(joined) = tasks.join_next().await {
                finish(joined.context("Scene worker panicked")?, &mut write_header);
            }
        }

        let job = Context::new(scene_parameters(&context.parameters, &scene));
        let bar = progress.add(ProgressBar::new(0));
        tasks.spawn_blocking(move || {
            run_scene(job, bar).with_context(|| format!("Scene '{}' failed", scene.display()))
        });
    }

    while let Some(joined) = tasks.join_next().await {
        finish(joined.context("Scene worker panicked")?, &mut write_header);
    }

    if failures > 0 {
        bail!("{failures} of {total} scenes failed");
    }

    println!("Simulated {total} scenes.");
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::Path;

    use crate::config::Parameters;
    use crate::context::Context;
    use crate::files::report::FULL_OUTPUT_HEADER;
    use crate::simulation::DistanceMeasure;

    use super::{batch, scene_files, scene_parameters};

    const PAIR: &str = "initialize:\nagent 0:\n16 range\nagent 1:\n16 range\nround 0:\n0 0 0\n1 3 4\n";

    fn summary_parameters(output: &Path) -> Parameters {
        Parameters {
            output: output.to_path_buf(),
            write_output_header: true,
            distance_measure: DistanceMeasure::Rand,
            ..Parameters::default()
        }
    }

    #[test]
    fn only_text_files_are_scenes() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("b.txt"), "").unwrap();
        fs::write(dir.path().join("a.txt"), "").unwrap();
        fs::write(dir.path().join("a.csv"), "").unwrap();

        let scenes = scene_files(dir.path()).unwrap();
        let names: Vec<_> = scenes
            .iter()
            .map(|path| path.file_name().unwrap().to_str().unwrap())
            .collect();
        assert_eq!(names, vec!["a.txt", "b.txt"]);
    }

    #[test]
    fn full_output_next_to_scene() {
        let parameters = scene_parameters(&Parameters::default(), Path::new("scenes/cafe.txt"));
        assert_eq!(
            parameters.full_output.unwrap(),
            Path::new("scenes/cafe.csv")
        );
        assert_eq!(parameters.setting.unwrap(), Path::new("scenes/cafe.txt"));
    }

    #[tokio::test]
    async fn one_header_and_full_output_per_scene() {
        let dir = tempfile::tempdir().unwrap();
        let scenes = dir.path().join("scenes");
        fs::create_dir(&scenes).unwrap();
        fs::write(scenes.join("a.txt"), PAIR).unwrap();
        fs::write(scenes.join("b.txt"), PAIR).unwrap();

        let summary = dir.path().join("summary.csv");
        batch(Context::new(summary_parameters(&summary)), &scenes, 2)
            .await
            .unwrap();

        // two people with one neighbour each only make initial guesses
        let content = fs::read_to_string(&summary).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("setting,"));
        assert_eq!(lines.iter().filter(|line| line.ends_with(",stress")).count(), 1);
        assert!(lines[1..].iter().all(|line| line.contains(",initialGuess,")));

        for name in ["a.csv", "b.csv"] {
            let records = fs::read_to_string(scenes.join(name)).unwrap();
            let records: Vec<&str> = records.lines().collect();
            assert_eq!(records[0], FULL_OUTPUT_HEADER);
            assert_eq!(records.len(), 3);
        }
    }

    #[tokio::test]
    async fn failed_scenes_are_counted() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.txt"), PAIR).unwrap();
        fs::write(dir.path().join("broken.txt"), "0 1 1\n").unwrap();

        let summary = dir.path().join("summary.csv");
        let err = batch(Context::new(summary_parameters(&summary)), dir.path(), 1)
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "1 of 2 scenes failed");

        let content = fs::read_to_string(&summary).unwrap();
        assert_eq!(content.lines().count(), 2);
        assert!(dir.path().join("a.csv").exists());
        assert!(!dir.path().join("broken.csv").exists());
    }
}
