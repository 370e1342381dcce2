use crossterm::style::Stylize;
use log::{error, info};
use permute_core::config::RunConfig;
use permute_core::core::trials::RunSummary;
use permute_core::PermuteEngine;
use std::path::PathBuf;
use std::process::ExitCode;

// Usage: permute_engine [config.json]
// Without a config file the embedded defaults are used.
fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config_path = std::env::args_os().nth(1).map(PathBuf::from);
    match run(config_path) {
        Ok(summary) => {
            println!(
                "{} ran trials {}..{}, {} trials now committed",
                "[DONE]".green().bold(),
                summary.first_trial,
                summary.first_trial + summary.trials_run as u64,
                summary.trials_committed
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("run aborted ({}): {}", e.kind(), e);
            eprintln!("{} {}", "[ERROR]".red().bold(), e);
            ExitCode::FAILURE
        }
    }
}

fn run(config_path: Option<PathBuf>) -> permute_core::Result<RunSummary> {
    let config = RunConfig::load(config_path.as_deref())?;
    info!(
        "{:?} run: {} trials, {} workers, output in {}",
        config.mode,
        config.num_trials,
        config.workers,
        config.output_dir.display()
    );
    let engine = PermuteEngine::new(config)?;
    engine.run()
}
