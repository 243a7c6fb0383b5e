//! Drives the conversion stages in order against a triple source and a graph store.

use crate::abbreviate::{abbreviate_file, NamespaceMap};
use crate::benchmark::{run_benchmark, BenchmarkReport};
use crate::config::Config;
use crate::consts::*;
use crate::errors::StageError;
use crate::extract::{extract, read_header, ExtractionSummary};
use crate::logging::RunLog;
use crate::options::{EmptyResults, Stage};
use crate::queries::{install_all, register_queries, QueryCatalog};
use crate::schema::{schema_script, LoadingJob};
use crate::sparql::{SparqlEndpoint, TripleSource};
use crate::tigergraph::{check_gsql, GraphStore, TigerGraphClient};
use anyhow::{anyhow, Result};
use log::{info, warn};
use std::path::PathBuf;
use std::time::Duration;

/// What a run produced.
#[derive(Debug, Default)]
pub struct RunSummary {
    pub stages: Vec<Stage>,
    pub extraction: Option<ExtractionSummary>,
    pub abbreviated_rows: Option<(usize, usize)>,
    pub installed: Vec<String>,
    pub benchmark: Option<BenchmarkReport>,
    /// Errors from stages that do not abort the run.
    pub isolated_errors: Vec<String>,
}

fn in_stage(stage: Stage, err: anyhow::Error) -> anyhow::Error {
    if err.downcast_ref::<StageError>().is_some() {
        return err;
    }
    anyhow!(StageError::new(stage, format!("{:#}", err)))
}

pub struct Pipeline {
    config: Config,
    source: Option<Box<dyn TripleSource>>,
    store: Option<Box<dyn GraphStore>>,
    log: RunLog,
    installed: Option<Vec<String>>,
}

impl Pipeline {
    pub fn new(config: Config, log: RunLog) -> Self {
        Self {
            config,
            source: None,
            store: None,
            log,
            installed: None,
        }
    }

    /// Builds the remote clients needed by `stages` from the configuration.
    pub fn connect(config: Config, log: RunLog, stages: &[Stage]) -> Result<Self> {
        config.validate(stages)?;
        let mut pipeline = Self::new(config, log);
        if stages.iter().any(|s| s.needs_triple_store()) {
            if let Some(endpoint) = &pipeline.config.sparql_endpoint {
                let source = SparqlEndpoint::new(
                    endpoint,
                    pipeline.config.namespaces_url.as_deref(),
                    Duration::from_secs(pipeline.config.sparql_timeout_secs),
                )?;
                pipeline.source = Some(Box::new(source));
            }
        }
        if stages.iter().any(|s| s.needs_graph_store()) {
            let client = TigerGraphClient::new(pipeline.config.tigergraph.clone())?;
            pipeline.store = Some(Box::new(client));
        }
        Ok(pipeline)
    }

    pub fn with_source(mut self, source: Box<dyn TripleSource>) -> Self {
        self.source = Some(source);
        self
    }

    pub fn with_store(mut self, store: Box<dyn GraphStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn log(&self) -> &RunLog {
        &self.log
    }

    pub fn into_log(self) -> RunLog {
        self.log
    }

    fn work_file(&self, name: &str) -> PathBuf {
        self.config.work_dir.join(name)
    }

    fn source(&self, stage: Stage) -> Result<&dyn TripleSource> {
        self.source
            .as_deref()
            .ok_or_else(|| anyhow!(StageError::new(stage, "no SPARQL endpoint configured")))
    }

    fn store(&self, stage: Stage) -> Result<&dyn GraphStore> {
        self.store
            .as_deref()
            .ok_or_else(|| anyhow!(StageError::new(stage, "no TigerGraph connection configured")))
    }

    fn loading_job(&self) -> LoadingJob {
        LoadingJob::standard(&self.config.tigergraph.job, &self.config.tigergraph.graph)
    }

    /// Runs `stages` in pipeline order.
    ///
    /// A failing extract, abbreviate, schema or load stage ends the run with its
    /// error. Install and benchmark failures are recorded in the summary.
    pub fn run(&mut self, stages: &[Stage]) -> Result<RunSummary> {
        let mut stages = stages.to_vec();
        stages.sort();
        stages.dedup();
        let mut summary = RunSummary {
            stages: stages.clone(),
            ..Default::default()
        };
        for stage in stages {
            self.log.log(format!("stage {}: started", stage))?;
            let outcome = match stage {
                Stage::Extract => self.extract().map(|s| summary.extraction = Some(s)),
                Stage::Abbreviate => self.abbreviate().map(|r| summary.abbreviated_rows = Some(r)),
                Stage::Schema => self.schema(),
                Stage::Load => self.load(),
                Stage::Install => self.install().map(|names| summary.installed = names),
                Stage::Benchmark => self.benchmark().map(|r| summary.benchmark = Some(r)),
            };
            match outcome {
                Ok(()) => self.log.log(format!("stage {}: finished", stage))?,
                Err(err) => {
                    let err = in_stage(stage, err);
                    self.log.log(format!("stage {}: {:#}", stage, err))?;
                    if stage.is_fail_fast() {
                        self.log.flush()?;
                        return Err(err);
                    }
                    warn!("{:#}", err);
                    summary.isolated_errors.push(format!("{:#}", err));
                }
            }
        }
        self.log.flush()?;
        Ok(summary)
    }

    pub fn extract(&mut self) -> Result<ExtractionSummary> {
        let empty = EmptyResults::from(self.config.allow_empty);
        let source = self
            .source
            .as_deref()
            .ok_or_else(|| anyhow!(StageError::new(Stage::Extract, "no SPARQL endpoint configured")))?;
        extract(
            source,
            self.config.service.as_deref(),
            &self.config.work_dir,
            empty,
            &mut self.log,
        )
    }

    /// Namespaces registered in the store, overridden by configured ones.
    pub fn namespaces(&self) -> Result<NamespaceMap> {
        let mut map = NamespaceMap::new();
        if let Ok(source) = self.source(Stage::Abbreviate) {
            map = NamespaceMap::from_pairs(source.namespaces()?);
        }
        map.extend(&self.config.extra_namespace_map());
        Ok(map)
    }

    /// Writes the abbreviated copy of each extracted file; returns the row counts.
    pub fn abbreviate(&mut self) -> Result<(usize, usize)> {
        self.log.log("getting namespaces")?;
        let namespaces = self
            .namespaces()
            .map_err(|e| in_stage(Stage::Abbreviate, e))?;
        if namespaces.is_empty() {
            return Err(anyhow!(StageError::new(
                Stage::Abbreviate,
                "no namespace declarations available"
            )));
        }
        self.log.log_at(1, format!("{} namespaces", namespaces.len()))?;
        let mode = self.config.abbreviation;
        let mut counts = Vec::with_capacity(2);
        for (input, output) in [
            (OBJECT_FILE, OBJECT_FILE_ABBREVIATED),
            (DATATYPE_FILE, DATATYPE_FILE_ABBREVIATED),
        ] {
            let input = self.work_file(input);
            let output = self.work_file(output);
            self.log
                .log(format!("abbreviating {} ({:?} mode)", input.display(), mode))?;
            let rows = abbreviate_file(&input, &output, &namespaces, mode)
                .map_err(|e| in_stage(Stage::Abbreviate, e))?;
            self.log.log_at(1, format!("{} rows -> {}", rows, output.display()))?;
            counts.push(rows);
        }
        Ok((counts[0], counts[1]))
    }

    /// Creates the graph schema, then the loading job.
    pub fn schema(&mut self) -> Result<()> {
        let graph = self.config.tigergraph.graph.clone();
        let job = self.loading_job().script()?;

        self.log.log("creating schema")?;
        let response = self.store(Stage::Schema)?.gsql(&schema_script(&graph))?;
        self.log.log_at(1, response.trim())?;
        check_gsql(&response).map_err(|e| in_stage(Stage::Schema, e))?;

        self.log.log("creating loading job")?;
        let response = self.store(Stage::Schema)?.gsql(&job)?;
        self.log.log_at(1, response.trim())?;
        check_gsql(&response).map_err(|e| in_stage(Stage::Schema, e))?;
        info!("Schema and loading job {} created on {}", self.config.tigergraph.job, graph);
        Ok(())
    }

    /// Uploads both abbreviated files to the loading job.
    pub fn load(&mut self) -> Result<()> {
        let job = self.loading_job();
        match self.store.as_deref_mut() {
            Some(store) => store.authenticate()?,
            None => {
                return Err(anyhow!(StageError::new(
                    Stage::Load,
                    "no TigerGraph connection configured"
                )))
            }
        }
        for (tag, name) in [
            (OBJECT_FILE_TAG, OBJECT_FILE_ABBREVIATED),
            (DATATYPE_FILE_TAG, DATATYPE_FILE_ABBREVIATED),
        ] {
            let path = self.work_file(name);
            if !path.is_file() {
                return Err(anyhow!(StageError::new(
                    Stage::Load,
                    format!("{} does not exist", path.display())
                )));
            }
            job.validate_header(tag, &read_header(&path)?)?;
            self.log.log(format!("loading {} as {}", path.display(), tag))?;
            let response = self.store(Stage::Load)?.upload_file(&path, tag, &job.name)?;
            self.log.log_at(1, response.to_string())?;
        }
        Ok(())
    }

    fn catalog(&self) -> Result<QueryCatalog> {
        let dir = self
            .config
            .queries_dir
            .as_deref()
            .ok_or_else(|| anyhow!("no queries_dir configured"))?;
        QueryCatalog::discover(dir)
    }

    /// Registers and installs the query catalog; returns the names that registered.
    ///
    /// The registered names are kept for the benchmark even when the final
    /// install call fails.
    pub fn install(&mut self) -> Result<Vec<String>> {
        let catalog = self.catalog()?;
        self.log.log(format!("installing {} queries", catalog.len()))?;
        let graph = self.config.tigergraph.graph.clone();
        let store = self
            .store
            .as_deref()
            .ok_or_else(|| anyhow!("no TigerGraph connection configured"))?;
        let names = register_queries(store, &graph, &catalog, &mut self.log)?;
        self.installed = Some(names.clone());
        install_all(store, &graph, &names, &mut self.log)?;
        Ok(names)
    }

    /// Times one call of each installed query and saves the report to the work dir.
    pub fn benchmark(&mut self) -> Result<BenchmarkReport> {
        let names = match &self.installed {
            Some(names) => names.clone(),
            None => self
                .catalog()?
                .names()
                .into_iter()
                .map(|n| n.to_string())
                .collect(),
        };
        if let Some(store) = self.store.as_deref_mut() {
            store.authenticate()?;
        }
        let graph = self.config.tigergraph.graph.clone();
        self.log.log(format!("running {} queries", names.len()))?;
        let store = self
            .store
            .as_deref()
            .ok_or_else(|| anyhow!("no TigerGraph connection configured"))?;
        let report = run_benchmark(store, &graph, &names, &mut self.log)?;
        std::fs::create_dir_all(&self.config.work_dir)?;
        let path = self.work_file(BENCHMARK_FILE);
        report.save_to_file(&path)?;
        self.log.log(format!("benchmark saved to {}", path.display()))?;
        Ok(report)
    }
}
