//! Converts an RDF triple store into a TigerGraph property graph.
//!
//! The conversion runs as a fixed sequence of stages: triples are extracted from a
//! SPARQL endpoint into two CSV files, namespaces are abbreviated, the graph schema
//! and loading job are created, the files are bulk loaded and finally the benchmark
//! queries are installed and timed.

pub mod abbreviate;
pub mod api;
pub mod benchmark;
pub mod config;
pub mod consts;
pub mod errors;
pub mod extract;
pub mod identifier;
pub mod logging;
pub mod model;
pub mod options;
pub mod pipeline;
pub mod queries;
pub mod schema;
pub mod sparql;
pub mod tigergraph;

pub use api::init_logging;
pub use config::Config;
pub use options::{AbbreviationMode, Stage};
pub use pipeline::{Pipeline, RunSummary};
