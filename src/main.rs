use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::Result;
use asad::config::Config;
use asad::pipeline;

fn main() -> ExitCode {
    env_logger::init();

    let config_path = std::env::args_os()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("asad.json"));

    match run(&config_path) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("Run failed: {e:#}");
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(config_path: &Path) -> Result<()> {
    let config = Config::from_path(config_path)?;
    log::info!(
        "Fitting {} against {}",
        config.observation.path.display(),
        config.model.path.display()
    );

    let report = pipeline::run(&config)?;
    for (row, model_row) in report.fit.chosen_model.iter().enumerate() {
        log::debug!(
            "reddening {:.4} -> age {:.4} ({:.6})",
            report.fit.reddening[row],
            report.fit.ages[*model_row],
            report.fit.stat[[row, *model_row]]
        );
    }
    println!("{}", report.fit.format_chosen(&report.name));
    Ok(())
}
