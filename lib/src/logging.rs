//! The run log: a linear, append-only audit trail of the pipeline.
//!
//! Every entry is rendered as `<timestamp><tabs><message>`, where the number of tab
//! characters is the nesting depth plus one. Entries go to the log file (opened once
//! for the lifetime of the run), are echoed to standard output, and are mirrored to
//! the `log` facade at debug level. A `RunLog` is passed explicitly to every stage.

use anyhow::{Context, Result};
use chrono::prelude::*;
use std::fs::{File, OpenOptions};
use std::io::{LineWriter, Write};
use std::path::Path;

enum Sink {
    File(LineWriter<File>),
    Memory(Vec<String>),
}

pub struct RunLog {
    sink: Sink,
    echo: bool,
}

impl RunLog {
    /// Opens (or creates) the log file in append mode.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("Failed to open log file {}", path.display()))?;
        Ok(Self {
            sink: Sink::File(LineWriter::new(file)),
            echo: true,
        })
    }

    /// A log that keeps its entries in memory and does not echo; used by tests.
    pub fn in_memory() -> Self {
        Self {
            sink: Sink::Memory(Vec::new()),
            echo: false,
        }
    }

    pub fn with_echo(mut self, echo: bool) -> Self {
        self.echo = echo;
        self
    }

    /// Writes a top-level entry.
    pub fn log(&mut self, msg: impl AsRef<str>) -> Result<()> {
        self.log_at(0, msg)
    }

    /// Writes an entry at the given nesting depth.
    pub fn log_at(&mut self, depth: usize, msg: impl AsRef<str>) -> Result<()> {
        let line = format_entry(Local::now(), depth, msg.as_ref());
        log::debug!("{}", line);
        if self.echo {
            println!("{}", line);
        }
        match &mut self.sink {
            Sink::File(w) => writeln!(w, "{}", line)?,
            Sink::Memory(lines) => lines.push(line),
        }
        Ok(())
    }

    /// Entries captured by an in-memory log, empty for file-backed logs.
    pub fn entries(&self) -> &[String] {
        match &self.sink {
            Sink::Memory(lines) => lines,
            Sink::File(_) => &[],
        }
    }

    pub fn flush(&mut self) -> Result<()> {
        if let Sink::File(w) = &mut self.sink {
            w.flush()?;
        }
        Ok(())
    }
}

pub fn format_entry<Tz: TimeZone>(timestamp: DateTime<Tz>, depth: usize, msg: &str) -> String
where
    Tz::Offset: std::fmt::Display,
{
    let tabs = "\t".repeat(depth + 1);
    format!(
        "{}{}{}",
        timestamp.format("%Y-%m-%d %H:%M:%S%.6f"),
        tabs,
        msg
    )
}
