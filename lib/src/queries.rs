//! Discovery and installation of the benchmark's GSQL query texts.

use crate::consts::QUERY_CATEGORIES;
use crate::logging::RunLog;
use crate::tigergraph::{check_gsql, GraphStore};
use anyhow::{anyhow, Context, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use lazy_static::lazy_static;
use log::{debug, warn};
use regex::Regex;
use std::path::{Path, PathBuf};

lazy_static! {
    static ref QUERY_NUMBER: Regex = Regex::new(r"_query(\d+)").expect("static regex");
    static ref QUERY_HEADER: Regex =
        Regex::new(r"(?i)CREATE\s+(?:OR\s+REPLACE\s+)?(?:DISTRIBUTED\s+)?QUERY\s+(\w+)")
            .expect("static regex");
    static ref USE_GRAPH: Regex = Regex::new(r"(?i)^\s*USE\s+GRAPH\b").expect("static regex");
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryDefinition {
    /// Name the query is installed and invoked under.
    pub name: String,
    /// `basic` or `advanced`.
    pub category: String,
    pub number: Option<u32>,
    pub path: PathBuf,
    pub text: String,
}

impl QueryDefinition {
    pub fn from_file(path: &Path, category: &str) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read query {}", path.display()))?;
        let stem = path
            .file_stem()
            .and_then(|s| s.to_str())
            .ok_or_else(|| anyhow!("Query file {} has no usable name", path.display()))?;
        let name = installed_name(&text).unwrap_or_else(|| stem.to_string());
        Ok(Self {
            name,
            category: category.to_string(),
            number: query_number(stem),
            path: path.to_path_buf(),
            text,
        })
    }

    /// The text to submit, selecting `graph` first unless the text already does.
    pub fn gsql_for(&self, graph: &str) -> String {
        if self.text.lines().any(|l| USE_GRAPH.is_match(l)) {
            self.text.clone()
        } else {
            format!("USE GRAPH {}\n{}", graph, self.text)
        }
    }
}

/// The number in a `*_queryN*` file name.
pub fn query_number(file_name: &str) -> Option<u32> {
    QUERY_NUMBER
        .captures(file_name)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// The name declared by a `CREATE QUERY` header.
pub fn installed_name(text: &str) -> Option<String> {
    QUERY_HEADER
        .captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

#[derive(Debug, Clone, Default)]
pub struct QueryCatalog {
    pub queries: Vec<QueryDefinition>,
}

fn query_globset() -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    builder.add(Glob::new("*.txt")?);
    Ok(builder.build()?)
}

impl QueryCatalog {
    /// Collects the query files under `dir/basic` and `dir/advanced`.
    pub fn discover(dir: &Path) -> Result<Self> {
        if !dir.is_dir() {
            return Err(anyhow!("Query directory {} does not exist", dir.display()));
        }
        let globs = query_globset()?;
        let mut queries = Vec::new();
        for category in QUERY_CATEGORIES {
            let root = dir.join(category);
            if !root.is_dir() {
                debug!("No {} query directory at {}", category, root.display());
                continue;
            }
            let mut found = Vec::new();
            for entry in walkdir::WalkDir::new(&root) {
                let entry = match entry {
                    Ok(entry) => entry,
                    Err(err) => {
                        warn!("Skipping entry under {} due to filesystem error: {}", root.display(), err);
                        continue;
                    }
                };
                if !entry.file_type().is_file() || !globs.is_match(entry.file_name()) {
                    continue;
                }
                match QueryDefinition::from_file(entry.path(), category) {
                    Ok(query) => found.push(query),
                    Err(err) => warn!("Skipping query {}: {:#}", entry.path().display(), err),
                }
            }
            found.sort_by(|a, b| {
                a.number
                    .unwrap_or(u32::MAX)
                    .cmp(&b.number.unwrap_or(u32::MAX))
                    .then_with(|| a.path.file_name().cmp(&b.path.file_name()))
            });
            debug!("Found {} {} queries", found.len(), category);
            queries.extend(found);
        }
        Ok(Self { queries })
    }

    pub fn len(&self) -> usize {
        self.queries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queries.is_empty()
    }

    pub fn names(&self) -> Vec<&str> {
        self.queries.iter().map(|q| q.name.as_str()).collect()
    }
}

/// Registers every query in `catalog` with the graph.
///
/// A query that fails to register is logged and left out; the names of the
/// queries that registered are returned.
pub fn register_queries(
    store: &dyn GraphStore,
    graph: &str,
    catalog: &QueryCatalog,
    log: &mut RunLog,
) -> Result<Vec<String>> {
    let mut registered = Vec::new();
    for query in &catalog.queries {
        log.log_at(1, format!("creating query {}", query.name))?;
        let outcome = store
            .gsql(&query.gsql_for(graph))
            .and_then(|response| check_gsql(&response).map(|_| response));
        match outcome {
            Ok(response) => {
                log.log_at(2, response.trim())?;
                registered.push(query.name.clone());
            }
            Err(err) => {
                warn!("Query {} was not created: {:#}", query.name, err);
                log.log_at(2, format!("failed: {:#}", err))?;
            }
        }
    }
    Ok(registered)
}

/// Installs every registered query of `graph` in one `INSTALL QUERY ALL`.
pub fn install_all(
    store: &dyn GraphStore,
    graph: &str,
    registered: &[String],
    log: &mut RunLog,
) -> Result<()> {
    if registered.is_empty() {
        log.log_at(1, "no queries to install")?;
        return Ok(());
    }
    log.log_at(1, "installing all queries")?;
    let response = store
        .gsql(&format!("USE GRAPH {}\nINSTALL QUERY ALL", graph))
        .context("INSTALL QUERY ALL failed")?;
    log.log_at(2, response.trim())?;
    if let Err(err) = check_gsql(&response) {
        // Per-query install errors are reported by the benchmark as failed calls.
        warn!("INSTALL QUERY ALL reported a problem: {:#}", err);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn names_come_from_header_or_stem() {
        assert_eq!(
            installed_name("CREATE OR REPLACE DISTRIBUTED QUERY basic_query1_optimized() FOR GRAPH g {"),
            Some("basic_query1_optimized".to_string())
        );
        assert_eq!(installed_name("create query q2() { PRINT 1; }"), Some("q2".to_string()));
        assert_eq!(installed_name("INTERPRET QUERY () { }"), None);
        assert_eq!(query_number("advanced_query12_optimized"), Some(12));
        assert_eq!(query_number("misc"), None);
    }

    #[test]
    fn use_graph_is_added_once() {
        let q = QueryDefinition {
            name: "q".into(),
            category: "basic".into(),
            number: None,
            path: PathBuf::from("q.txt"),
            text: "CREATE QUERY q() { }".into(),
        };
        assert_eq!(q.gsql_for("g"), "USE GRAPH g\nCREATE QUERY q() { }");
        let q = QueryDefinition {
            text: "use graph other\nCREATE QUERY q() { }".into(),
            ..q
        };
        assert!(q.gsql_for("g").starts_with("use graph other"));
    }

    #[test]
    fn discovery_orders_by_category_then_number() {
        let dir = tempdir().unwrap();
        let basic = dir.path().join("basic");
        let advanced = dir.path().join("advanced");
        std::fs::create_dir_all(&basic).unwrap();
        std::fs::create_dir_all(&advanced).unwrap();
        std::fs::write(advanced.join("advanced_query1_optimized.txt"), "CREATE QUERY advanced_query1_optimized() {}").unwrap();
        std::fs::write(basic.join("basic_query10_optimized.txt"), "CREATE QUERY basic_query10_optimized() {}").unwrap();
        std::fs::write(basic.join("basic_query2_optimized.txt"), "CREATE QUERY basic_query2_optimized() {}").unwrap();
        std::fs::write(basic.join("notes.md"), "ignored").unwrap();
        let catalog = QueryCatalog::discover(dir.path()).unwrap();
        assert_eq!(
            catalog.names(),
            vec![
                "basic_query2_optimized",
                "basic_query10_optimized",
                "advanced_query1_optimized"
            ]
        );
        assert!(QueryCatalog::discover(&dir.path().join("missing")).is_err());
    }

    #[test]
    fn unreadable_query_file_is_skipped() {
        let dir = tempdir().unwrap();
        let basic = dir.path().join("basic");
        std::fs::create_dir_all(&basic).unwrap();
        std::fs::write(basic.join("basic_query1_optimized.txt"), "CREATE QUERY basic_query1_optimized() {}").unwrap();
        std::fs::write(basic.join("basic_query2_optimized.txt"), [0xff, 0xfe, 0x00]).unwrap();
        let catalog = QueryCatalog::discover(dir.path()).unwrap();
        assert_eq!(catalog.names(), vec!["basic_query1_optimized"]);
    }
}
