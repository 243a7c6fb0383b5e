// Pipeline error types. These are carried inside anyhow::Error and can be
// recovered with downcast_ref.

use crate::options::Stage;
use std::fmt;

/// A fault that aborts the pipeline at `stage`.
#[derive(Debug)]
pub struct StageError {
    pub stage: Stage,
    pub message: String,
}

impl StageError {
    pub fn new(stage: Stage, message: impl Into<String>) -> Self {
        Self {
            stage,
            message: message.into(),
        }
    }
}

impl fmt::Display for StageError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} stage failed: {}", self.stage, self.message)
    }
}

impl std::error::Error for StageError {}

/// A GSQL response that reported a failure in its text output.
#[derive(Debug)]
pub struct GsqlError {
    pub marker: String,
    pub response: String,
}

impl fmt::Display for GsqlError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "GSQL command failed ({}): {}", self.marker, self.response.trim())
    }
}

impl std::error::Error for GsqlError {}

/// A RESTPP response whose JSON body carried `"error": true`.
#[derive(Debug)]
pub struct RestppError {
    pub endpoint: String,
    pub message: String,
}

impl fmt::Display for RestppError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "RESTPP call to {} failed: {}", self.endpoint, self.message)
    }
}

impl std::error::Error for RestppError {}
