//! Entry points shared by the CLI: logging setup, config discovery and
//! one-call stage execution.

use crate::config::Config;
use crate::consts::{CONFIG_FILE, LOG_FILE};
use crate::logging::RunLog;
use crate::options::Stage;
use crate::pipeline::{Pipeline, RunSummary};
use anyhow::Result;
use log::info;
use std::path::{Path, PathBuf};

/// Initializes logging for the rdf2tg library.
///
/// This function checks for the `RDF2TG_LOG` environment variable. If it is set,
/// `RUST_LOG` is set to its value. `RDF2TG_LOG` takes precedence over `RUST_LOG`.
/// The logger initialization (e.g., `env_logger::init()`) must be called after
/// this function for the log level to take effect.
pub fn init_logging() {
    if let Ok(log_level) = std::env::var("RDF2TG_LOG") {
        std::env::set_var("RUST_LOG", log_level);
    }
}

/// Searches for `rdf2tg.json` in the given directory and then up its parent directories.
pub fn find_config_from(start_dir: &Path) -> Option<PathBuf> {
    let mut current_dir = Some(start_dir);
    while let Some(dir) = current_dir {
        let candidate = dir.join(CONFIG_FILE);
        if candidate.is_file() {
            return Some(candidate);
        }
        current_dir = dir.parent();
    }
    None
}

/// Searches for `rdf2tg.json` from the current directory upwards.
pub fn find_config() -> Option<PathBuf> {
    let start_dir = std::env::current_dir().ok()?;
    find_config_from(&start_dir)
}

/// Opens the run log in the configured work directory.
pub fn open_run_log(config: &Config) -> Result<RunLog> {
    RunLog::open(&config.work_dir.join(LOG_FILE))
}

/// Connects to the configured services and runs `stages`.
pub fn run_stages(config: Config, stages: &[Stage]) -> Result<RunSummary> {
    let log = open_run_log(&config)?;
    let mut pipeline = Pipeline::connect(config, log, stages)?;
    let summary = pipeline.run(stages)?;
    info!(
        "Finished stages {:?} with {} isolated errors",
        summary.stages,
        summary.isolated_errors.len()
    );
    Ok(summary)
}
