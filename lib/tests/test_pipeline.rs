use anyhow::{anyhow, Result};
use oxigraph::model::{Literal, NamedNode, Term};
use rdf2tg::config::Config;
use rdf2tg::consts::*;
use rdf2tg::errors::StageError;
use rdf2tg::extract::table_from_rows;
use rdf2tg::logging::RunLog;
use rdf2tg::options::Stage;
use rdf2tg::pipeline::Pipeline;
use rdf2tg::schema::LoadingJob;
use rdf2tg::sparql::{SolutionTable, TripleSource};
use rdf2tg::tigergraph::GraphStore;
use serde_json::{json, Value};
use std::cell::RefCell;
use std::path::Path;
use std::rc::Rc;
use tempfile::TempDir;

const XSD_INT: &str = "http://www.w3.org/2001/XMLSchema#int";

fn iri(s: &str) -> Term {
    Term::NamedNode(NamedNode::new(s).unwrap())
}

/// Serves the Alice/Bob statements and the `ex:` namespace.
struct AliceSource;

impl TripleSource for AliceSource {
    fn select(&self, query: &str) -> Result<SolutionTable> {
        if query.contains("FILTER (!isLiteral(?o))") {
            Ok(table_from_rows(
                &["s", "p", "o"],
                vec![vec![
                    ("s", iri("http://example.org/Alice")),
                    ("p", iri("http://example.org/knows")),
                    ("o", iri("http://example.org/Bob")),
                ]],
            ))
        } else {
            Ok(table_from_rows(
                &["s", "p", "o", "d", "l"],
                vec![vec![
                    ("s", iri("http://example.org/Alice")),
                    ("p", iri("http://example.org/age")),
                    (
                        "o",
                        Term::Literal(Literal::new_typed_literal(
                            "30",
                            NamedNode::new(XSD_INT).unwrap(),
                        )),
                    ),
                    ("d", iri(XSD_INT)),
                    ("l", Term::Literal(Literal::new_simple_literal(""))),
                ]],
            ))
        }
    }

    fn namespaces(&self) -> Result<Vec<(String, String)>> {
        Ok(vec![
            ("ex".to_string(), "http://example.org/".to_string()),
            ("xsd".to_string(), "http://www.w3.org/2001/XMLSchema#".to_string()),
        ])
    }
}

struct EmptySource;

impl TripleSource for EmptySource {
    fn select(&self, _query: &str) -> Result<SolutionTable> {
        Ok(table_from_rows(&["s", "p", "o"], vec![]))
    }

    fn namespaces(&self) -> Result<Vec<(String, String)>> {
        Ok(vec![])
    }
}

#[derive(Default)]
struct Calls {
    gsql: Vec<String>,
    uploads: Vec<(String, String, String)>,
    queries: Vec<String>,
    authenticated: bool,
}

/// Records every call; GSQL text containing `FAIL` is answered with a failure.
struct RecordingStore {
    calls: Rc<RefCell<Calls>>,
    /// Drop the connection on `INSTALL QUERY ALL`.
    install_drops: bool,
}

impl RecordingStore {
    fn new() -> (Self, Rc<RefCell<Calls>>) {
        let calls = Rc::new(RefCell::new(Calls::default()));
        (
            Self {
                calls: calls.clone(),
                install_drops: false,
            },
            calls,
        )
    }

    fn dropping_install() -> (Self, Rc<RefCell<Calls>>) {
        let (mut store, calls) = Self::new();
        store.install_drops = true;
        (store, calls)
    }
}

impl GraphStore for RecordingStore {
    fn authenticate(&mut self) -> Result<()> {
        self.calls.borrow_mut().authenticated = true;
        Ok(())
    }

    fn gsql(&self, statement: &str) -> Result<String> {
        self.calls.borrow_mut().gsql.push(statement.to_string());
        if self.install_drops && statement.contains("INSTALL QUERY ALL") {
            return Err(anyhow!("connection reset by peer"));
        }
        if statement.contains("FAIL") {
            Ok("Encountered \" \"FAIL\" \"FAIL \"\" at line 2".to_string())
        } else {
            Ok("Successfully created.".to_string())
        }
    }

    fn upload_file(&self, path: &Path, file_tag: &str, job: &str) -> Result<Value> {
        self.calls.borrow_mut().uploads.push((
            path.display().to_string(),
            file_tag.to_string(),
            job.to_string(),
        ));
        Ok(json!({"error": false, "results": [{"statistics": {"validLine": 1}}]}))
    }

    fn run_installed_query(&self, name: &str) -> Result<Value> {
        self.calls.borrow_mut().queries.push(name.to_string());
        if name.contains("missing") {
            return Err(anyhow!("Query {} is not installed", name));
        }
        Ok(json!({"error": false, "results": []}))
    }
}

fn config_in(dir: &TempDir) -> Config {
    Config::builder()
        .work_dir(dir.path().join("data"))
        .queries_dir(dir.path().join("queries"))
        .build()
        .unwrap()
}

fn write_queries(dir: &TempDir) {
    let basic = dir.path().join("queries").join("basic");
    std::fs::create_dir_all(&basic).unwrap();
    std::fs::write(
        basic.join("basic_query1_optimized.txt"),
        "CREATE QUERY basic_query1_optimized() FOR GRAPH ldbc_spb {\n  PRINT 1;\n}\n",
    )
    .unwrap();
}

fn data_lines(path: &Path) -> Vec<String> {
    std::fs::read_to_string(path)
        .unwrap()
        .lines()
        .map(|l| l.to_string())
        .collect()
}

#[test]
fn extract_and_abbreviate_alice() {
    let dir = TempDir::new().unwrap();
    let config = config_in(&dir);
    let work = config.work_dir.clone();
    let mut pipeline = Pipeline::new(config, RunLog::in_memory()).with_source(Box::new(AliceSource));
    let summary = pipeline
        .run(&[Stage::Extract, Stage::Abbreviate])
        .unwrap();
    let extraction = summary.extraction.unwrap();
    assert_eq!((extraction.object_rows, extraction.datatype_rows), (1, 1));
    assert_eq!(summary.abbreviated_rows, Some((1, 1)));

    let objects = data_lines(&work.join(OBJECT_FILE_ABBREVIATED));
    assert_eq!(objects[0], "s,p,o,pid");
    assert_eq!(
        objects[1],
        "ex:Alice,ex:knows,ex:Bob,cbe32d54e0f3dad472beb2c352338bb1"
    );

    let datatypes = data_lines(&work.join(DATATYPE_FILE_ABBREVIATED));
    assert_eq!(datatypes[0], "s,p,o,d,l,pid,vid");
    assert_eq!(
        datatypes[1],
        "ex:Alice,ex:age,30,xsd:int,,d1e0299e908b8dc2c3f31904272eb678,34173cb38f07f89ddbebc2ac9128303f"
    );

    // the unabbreviated files keep full IRIs
    let raw = data_lines(&work.join(OBJECT_FILE));
    assert!(raw[1].starts_with("http://example.org/Alice,"));

    let entries = pipeline.log().entries();
    assert!(entries.iter().any(|e| e.ends_with("\tstage extract: started")));
    assert!(entries.iter().any(|e| e.ends_with("\t\t1 rows")));
}

#[test]
fn empty_results_abort_unless_allowed() {
    let dir = TempDir::new().unwrap();
    let mut pipeline =
        Pipeline::new(config_in(&dir), RunLog::in_memory()).with_source(Box::new(EmptySource));
    let err = pipeline.run(&Stage::ALL).unwrap_err();
    let stage_err = err.downcast_ref::<StageError>().unwrap();
    assert_eq!(stage_err.stage, Stage::Extract);

    let mut config = config_in(&dir);
    config.allow_empty = true;
    let mut pipeline = Pipeline::new(config, RunLog::in_memory()).with_source(Box::new(EmptySource));
    let summary = pipeline.run(&[Stage::Extract]).unwrap();
    assert_eq!(summary.extraction.unwrap().object_rows, 0);
}

#[test]
fn full_run_loads_and_benchmarks() {
    let dir = TempDir::new().unwrap();
    write_queries(&dir);
    let config = config_in(&dir);
    let work = config.work_dir.clone();
    let (store, calls) = RecordingStore::new();
    let mut pipeline = Pipeline::new(config, RunLog::in_memory())
        .with_source(Box::new(AliceSource))
        .with_store(Box::new(store));
    let summary = pipeline.run(&Stage::ALL).unwrap();
    assert!(summary.isolated_errors.is_empty());

    let calls = calls.borrow();
    assert!(calls.authenticated);
    assert!(calls.gsql[0].contains("CREATE GRAPH ldbc_spb"));
    assert!(calls.gsql[1].contains("CREATE LOADING JOB load_data FOR GRAPH ldbc_spb"));
    assert!(calls.gsql[2].starts_with("USE GRAPH ldbc_spb\nCREATE QUERY basic_query1_optimized"));
    assert_eq!(calls.gsql[3], "USE GRAPH ldbc_spb\nINSTALL QUERY ALL");
    let tags: Vec<&str> = calls.uploads.iter().map(|u| u.1.as_str()).collect();
    assert_eq!(tags, vec![OBJECT_FILE_TAG, DATATYPE_FILE_TAG]);
    assert!(calls.uploads.iter().all(|u| u.2 == DEFAULT_JOB));
    assert_eq!(calls.queries, vec!["basic_query1_optimized"]);

    assert_eq!(summary.installed, vec!["basic_query1_optimized"]);
    let report = summary.benchmark.unwrap();
    assert_eq!(report.timings.len(), 1);
    let timing = report.get("basic_query1_optimized").unwrap();
    assert!(timing.duration_secs >= 0.0);
    assert!(work.join(BENCHMARK_FILE).is_file());
}

#[test]
fn loading_job_columns_exist_in_generated_files() {
    let dir = TempDir::new().unwrap();
    let config = config_in(&dir);
    let work = config.work_dir.clone();
    let mut pipeline = Pipeline::new(config, RunLog::in_memory()).with_source(Box::new(AliceSource));
    pipeline.run(&[Stage::Extract, Stage::Abbreviate]).unwrap();

    let job = LoadingJob::standard(DEFAULT_JOB, DEFAULT_GRAPH);
    for (tag, file) in [
        (OBJECT_FILE_TAG, OBJECT_FILE_ABBREVIATED),
        (DATATYPE_FILE_TAG, DATATYPE_FILE_ABBREVIATED),
    ] {
        let header = rdf2tg::extract::read_header(&work.join(file)).unwrap();
        job.validate_header(tag, &header).unwrap();
        let row_len = data_lines(&work.join(file))[1].split(',').count();
        let script = job.script().unwrap();
        for line in script.lines().filter(|l| l.contains(&format!("LOAD {} ", tag))) {
            for idx in line.split('$').skip(1) {
                let n: usize = idx
                    .chars()
                    .take_while(|c| c.is_ascii_digit())
                    .collect::<String>()
                    .parse()
                    .unwrap();
                assert!(n < row_len, "{} references ${} of {}", tag, n, row_len);
            }
        }
    }
}

#[test]
fn schema_conflict_is_a_schema_error() {
    let dir = TempDir::new().unwrap();
    let mut config = config_in(&dir);
    config.tigergraph.graph = "FAIL".to_string();
    let (store, calls) = RecordingStore::new();
    let mut pipeline = Pipeline::new(config, RunLog::in_memory()).with_store(Box::new(store));
    let err = pipeline.run(&[Stage::Schema, Stage::Load]).unwrap_err();
    assert_eq!(err.downcast_ref::<StageError>().unwrap().stage, Stage::Schema);
    // nothing after the failing stage ran
    assert!(calls.borrow().uploads.is_empty());
    assert_eq!(calls.borrow().gsql.len(), 1);
}

#[test]
fn load_rejects_missing_files() {
    let dir = TempDir::new().unwrap();
    let (store, calls) = RecordingStore::new();
    let mut pipeline = Pipeline::new(config_in(&dir), RunLog::in_memory()).with_store(Box::new(store));
    let err = pipeline.run(&[Stage::Load]).unwrap_err();
    assert_eq!(err.downcast_ref::<StageError>().unwrap().stage, Stage::Load);
    assert!(calls.borrow().uploads.is_empty());
}

#[test]
fn query_failures_are_isolated() {
    let dir = TempDir::new().unwrap();
    write_queries(&dir);
    let basic = dir.path().join("queries").join("basic");
    std::fs::write(
        basic.join("basic_query2_optimized.txt"),
        "CREATE QUERY basic_query2_optimized() { FAIL }",
    )
    .unwrap();
    let advanced = dir.path().join("queries").join("advanced");
    std::fs::create_dir_all(&advanced).unwrap();
    std::fs::write(
        advanced.join("advanced_query1_missing.txt"),
        "CREATE QUERY advanced_query1_missing() { PRINT 2; }",
    )
    .unwrap();

    let (store, calls) = RecordingStore::new();
    let mut pipeline = Pipeline::new(config_in(&dir), RunLog::in_memory()).with_store(Box::new(store));
    let summary = pipeline.run(&[Stage::Install, Stage::Benchmark]).unwrap();
    assert_eq!(
        summary.installed,
        vec!["basic_query1_optimized", "advanced_query1_missing"]
    );
    let report = summary.benchmark.unwrap();
    assert_eq!(report.timings.len(), 2);
    assert_eq!(report.failures(), 1);
    assert!(!report.get("advanced_query1_missing").unwrap().outcome.is_ok());
    assert_eq!(
        calls.borrow().queries,
        vec!["basic_query1_optimized", "advanced_query1_missing"]
    );
}

#[test]
fn missing_queries_dir_does_not_abort() {
    let dir = TempDir::new().unwrap();
    let (store, _calls) = RecordingStore::new();
    let mut pipeline = Pipeline::new(config_in(&dir), RunLog::in_memory()).with_store(Box::new(store));
    let summary = pipeline.run(&[Stage::Install, Stage::Benchmark]).unwrap();
    assert_eq!(summary.isolated_errors.len(), 2);
    assert!(summary.benchmark.is_none());
}

#[test]
fn unreadable_query_file_is_skipped() {
    let dir = TempDir::new().unwrap();
    write_queries(&dir);
    let basic = dir.path().join("queries").join("basic");
    std::fs::write(basic.join("basic_query2_optimized.txt"), [0xff, 0xfe, 0x00]).unwrap();

    let (store, calls) = RecordingStore::new();
    let mut pipeline = Pipeline::new(config_in(&dir), RunLog::in_memory()).with_store(Box::new(store));
    let summary = pipeline.run(&[Stage::Install, Stage::Benchmark]).unwrap();
    assert!(summary.isolated_errors.is_empty());
    assert_eq!(summary.installed, vec!["basic_query1_optimized"]);
    let report = summary.benchmark.unwrap();
    assert!(report.get("basic_query1_optimized").unwrap().outcome.is_ok());
    assert_eq!(calls.borrow().queries, vec!["basic_query1_optimized"]);
}

#[test]
fn benchmark_uses_registered_queries_when_install_call_fails() {
    let dir = TempDir::new().unwrap();
    write_queries(&dir);
    let basic = dir.path().join("queries").join("basic");
    std::fs::write(
        basic.join("basic_query2_optimized.txt"),
        "CREATE QUERY basic_query2_optimized() { FAIL }",
    )
    .unwrap();

    let (store, calls) = RecordingStore::dropping_install();
    let mut pipeline = Pipeline::new(config_in(&dir), RunLog::in_memory()).with_store(Box::new(store));
    let summary = pipeline.run(&[Stage::Install, Stage::Benchmark]).unwrap();
    assert_eq!(summary.isolated_errors.len(), 1);
    assert!(summary.isolated_errors[0].contains("INSTALL QUERY ALL"));
    assert_eq!(summary.benchmark.unwrap().timings.len(), 1);
    // the query that failed to register is never invoked
    assert_eq!(calls.borrow().queries, vec!["basic_query1_optimized"]);
}
