//! Shared option types used across the pipeline API instead of bare strings or flags.

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// One step of the conversion pipeline. Stages always run in declaration order.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Extract,
    Abbreviate,
    Schema,
    Load,
    Install,
    Benchmark,
}

impl Stage {
    pub const ALL: [Stage; 6] = [
        Stage::Extract,
        Stage::Abbreviate,
        Stage::Schema,
        Stage::Load,
        Stage::Install,
        Stage::Benchmark,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Extract => "extract",
            Stage::Abbreviate => "abbreviate",
            Stage::Schema => "schema",
            Stage::Load => "load",
            Stage::Install => "install",
            Stage::Benchmark => "benchmark",
        }
    }

    /// Returns true when a failure in this stage aborts the rest of the run.
    /// Query installation and benchmarking isolate failures per query.
    pub fn is_fail_fast(self) -> bool {
        !matches!(self, Stage::Install | Stage::Benchmark)
    }

    /// Returns true if the stage talks to the SPARQL store.
    pub fn needs_triple_store(self) -> bool {
        matches!(self, Stage::Extract | Stage::Abbreviate)
    }

    /// Returns true if the stage talks to the graph database.
    pub fn needs_graph_store(self) -> bool {
        matches!(
            self,
            Stage::Schema | Stage::Load | Stage::Install | Stage::Benchmark
        )
    }

    /// All stages from `from` to `to`, inclusive.
    pub fn range(from: Stage, to: Stage) -> Vec<Stage> {
        Stage::ALL
            .iter()
            .copied()
            .filter(|s| *s >= from && *s <= to)
            .collect()
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Stage {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        Stage::ALL
            .iter()
            .copied()
            .find(|stage| stage.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| anyhow!("Unknown stage '{}'", s))
    }
}

/// Controls how namespace IRIs are shortened in the tabular files.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AbbreviationMode {
    /// Substitute namespaces anywhere in the file content, including inside literal values.
    Verbatim,
    /// Parse the CSV and only rewrite the leading namespace of IRI-typed columns.
    #[default]
    Fields,
}

impl FromStr for AbbreviationMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "verbatim" => Ok(AbbreviationMode::Verbatim),
            "fields" => Ok(AbbreviationMode::Fields),
            _ => Err(anyhow!("Unknown abbreviation mode '{}'", s)),
        }
    }
}

/// Indicates whether an empty SPARQL result set is acceptable.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum EmptyResults {
    Allow,
    Reject,
}

impl From<bool> for EmptyResults {
    fn from(value: bool) -> Self {
        if value {
            EmptyResults::Allow
        } else {
            EmptyResults::Reject
        }
    }
}
