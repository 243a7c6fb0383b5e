//! Times a single sequential invocation of each installed query.

use crate::logging::RunLog;
use crate::tigergraph::GraphStore;
use anyhow::{Context, Result};
use chrono::prelude::*;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::Path;
use std::time::Instant;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", content = "message", rename_all = "lowercase")]
pub enum Outcome {
    Ok,
    Failed(String),
}

impl Outcome {
    pub fn is_ok(&self) -> bool {
        matches!(self, Outcome::Ok)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryTiming {
    pub name: String,
    pub started: DateTime<Utc>,
    pub finished: DateTime<Utc>,
    pub duration_secs: f64,
    pub outcome: Outcome,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BenchmarkReport {
    pub graph: String,
    pub timings: Vec<QueryTiming>,
}

impl BenchmarkReport {
    pub fn get(&self, name: &str) -> Option<&QueryTiming> {
        self.timings.iter().find(|t| t.name == name)
    }

    pub fn failures(&self) -> usize {
        self.timings.iter().filter(|t| !t.outcome.is_ok()).count()
    }

    /// One `name seconds` line per invocation, in invocation order.
    pub fn lines(&self) -> Vec<String> {
        self.timings
            .iter()
            .map(|t| match &t.outcome {
                Outcome::Ok => format!("{} {:.6}", t.name, t.duration_secs),
                Outcome::Failed(msg) => format!("{} {:.6} failed: {}", t.name, t.duration_secs, msg),
            })
            .collect()
    }

    pub fn print(&self) {
        for line in self.lines() {
            println!("{}", line);
        }
    }

    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(&self)?;
        let mut file = std::fs::File::create(path)
            .with_context(|| format!("Failed to create {}", path.display()))?;
        file.write_all(json.as_bytes())?;
        Ok(())
    }
}

/// Invokes a single installed query and records how long it took.
pub fn time_query(store: &dyn GraphStore, name: &str) -> (QueryTiming, Option<serde_json::Value>) {
    let started = Utc::now();
    let clock = Instant::now();
    let result = store.run_installed_query(name);
    let duration_secs = clock.elapsed().as_secs_f64();
    let finished = Utc::now();
    let (outcome, body) = match result {
        Ok(body) => (Outcome::Ok, Some(body)),
        Err(err) => (Outcome::Failed(format!("{:#}", err)), None),
    };
    (
        QueryTiming {
            name: name.to_string(),
            started,
            finished,
            duration_secs,
            outcome,
        },
        body,
    )
}

/// Runs every query in `names` once, in order. Failures are recorded, not raised.
pub fn run_benchmark(
    store: &dyn GraphStore,
    graph: &str,
    names: &[String],
    log: &mut RunLog,
) -> Result<BenchmarkReport> {
    let mut report = BenchmarkReport {
        graph: graph.to_string(),
        timings: Vec::with_capacity(names.len()),
    };
    for name in names {
        log.log_at(1, format!("running query {}", name))?;
        let (timing, body) = time_query(store, name);
        match &timing.outcome {
            Outcome::Ok => {
                if let Some(body) = body {
                    log.log_at(2, body.to_string())?;
                }
                log.log_at(2, format!("{} {:.6}", timing.name, timing.duration_secs))?;
            }
            Outcome::Failed(msg) => {
                warn!("Query {} failed: {}", name, msg);
                log.log_at(2, format!("failed: {}", msg))?;
            }
        }
        report.timings.push(timing);
    }
    info!(
        "Benchmarked {} queries, {} failed",
        report.timings.len(),
        report.failures()
    );
    Ok(report)
}
