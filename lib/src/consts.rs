//! Defines constant names shared by the pipeline stages: file names, file tags, column
//! headers and query catalog categories.

// intermediate files, relative to the work directory
pub const OBJECT_FILE: &str = "object.csv";
pub const DATATYPE_FILE: &str = "datatype.csv";
pub const OBJECT_FILE_ABBREVIATED: &str = "object_abbreviated.csv";
pub const DATATYPE_FILE_ABBREVIATED: &str = "datatype_abbreviated.csv";
pub const LOG_FILE: &str = "rdf2tg.log";
pub const BENCHMARK_FILE: &str = "benchmark.json";
pub const CONFIG_FILE: &str = "rdf2tg.json";

// file tags declared by the loading job
pub const OBJECT_FILE_TAG: &str = "OP";
pub const DATATYPE_FILE_TAG: &str = "DP";

/// Prefix substituted for the default (empty) namespace.
pub const DEFAULT_NAMESPACE_PREFIX: &str = "base";

pub const DEFAULT_GRAPH: &str = "ldbc_spb";
pub const DEFAULT_JOB: &str = "load_data";

// column headers written by the extractor; these are also the SPARQL variable names
pub const COL_SUBJECT: &str = "s";
pub const COL_PREDICATE: &str = "p";
pub const COL_OBJECT: &str = "o";
pub const COL_DATATYPE: &str = "d";
pub const COL_LANGUAGE: &str = "l";
pub const COL_STATEMENT_ID: &str = "pid";
pub const COL_VALUE_ID: &str = "vid";

pub const OBJECT_COLUMNS: [&str; 4] = [COL_SUBJECT, COL_PREDICATE, COL_OBJECT, COL_STATEMENT_ID];
pub const DATATYPE_COLUMNS: [&str; 7] = [
    COL_SUBJECT,
    COL_PREDICATE,
    COL_OBJECT,
    COL_DATATYPE,
    COL_LANGUAGE,
    COL_STATEMENT_ID,
    COL_VALUE_ID,
];

// query catalog categories, in installation order
pub const QUERY_CATEGORIES: [&str; 2] = ["basic", "advanced"];
