//! Defines the configuration structures for a conversion run.
//! This includes the main `Config` struct, the TigerGraph connection settings and
//! their builders.

use crate::abbreviate::NamespaceMap;
use crate::consts::{CONFIG_FILE, DEFAULT_GRAPH, DEFAULT_JOB};
use crate::model::parse_iri;
use crate::options::{AbbreviationMode, Stage};
use anyhow::{anyhow, Context, Result};
use derive_builder::Builder;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::{BufReader, Write};
use std::path::{Path, PathBuf};
use url::Url;

pub const ENV_PASSWORD: &str = "RDF2TG_PASSWORD";
pub const ENV_SECRET: &str = "RDF2TG_SECRET";
pub const ENV_TOKEN: &str = "RDF2TG_TOKEN";

fn default_host() -> String {
    "http://localhost".to_string()
}

fn default_username() -> String {
    "tigergraph".to_string()
}

fn default_graph() -> String {
    DEFAULT_GRAPH.to_string()
}

fn default_job() -> String {
    DEFAULT_JOB.to_string()
}

fn default_token_lifetime() -> u64 {
    // one month, the RESTPP default
    2_592_000
}

fn default_timeout() -> u64 {
    600
}

fn default_work_dir() -> PathBuf {
    PathBuf::from("data")
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Builder)]
#[builder(pattern = "owned", setter(into, strip_option), default)]
pub struct TigerGraphConfig {
    #[serde(default = "default_host")]
    pub host: String,
    /// Overrides `host:14240` for the GSQL server.
    #[serde(default)]
    pub gsql_url: Option<String>,
    /// Overrides `host:9000` for RESTPP.
    #[serde(default)]
    pub restpp_url: Option<String>,
    #[serde(default = "default_username")]
    pub username: String,
    #[serde(default, skip_serializing)]
    pub password: Option<String>,
    #[serde(default = "default_graph")]
    pub graph: String,
    #[serde(default = "default_job")]
    pub job: String,
    #[serde(default, skip_serializing)]
    pub secret: Option<String>,
    #[serde(default, skip_serializing)]
    pub token: Option<String>,
    #[serde(default = "default_token_lifetime")]
    pub token_lifetime_secs: u64,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

impl Default for TigerGraphConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            gsql_url: None,
            restpp_url: None,
            username: default_username(),
            password: None,
            graph: default_graph(),
            job: default_job(),
            secret: None,
            token: None,
            token_lifetime_secs: default_token_lifetime(),
            timeout_secs: default_timeout(),
        }
    }
}

fn with_port(host: &str, port: u16) -> Result<String> {
    let mut url = Url::parse(host).with_context(|| format!("Invalid host URL '{}'", host))?;
    url.set_port(Some(port))
        .map_err(|_| anyhow!("Cannot set a port on '{}'", host))?;
    Ok(url.as_str().trim_end_matches('/').to_string())
}

impl TigerGraphConfig {
    pub fn gsql_url(&self) -> Result<String> {
        match &self.gsql_url {
            Some(url) => Ok(url.clone()),
            None => with_port(&self.host, 14240),
        }
    }

    pub fn restpp_url(&self) -> Result<String> {
        match &self.restpp_url {
            Some(url) => Ok(url.clone()),
            None => with_port(&self.host, 9000),
        }
    }

    /// Fills credentials from `RDF2TG_PASSWORD`, `RDF2TG_SECRET` and `RDF2TG_TOKEN`
    /// when they are not already set.
    pub fn apply_env(&mut self) {
        if self.password.is_none() {
            self.password = std::env::var(ENV_PASSWORD).ok();
        }
        if self.secret.is_none() {
            self.secret = std::env::var(ENV_SECRET).ok();
        }
        if self.token.is_none() {
            self.token = std::env::var(ENV_TOKEN).ok();
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Builder)]
#[builder(
    pattern = "owned",
    setter(into, strip_option),
    default,
    build_fn(private, name = "build_checked", validate = "Self::validate_namespaces")
)]
pub struct Config {
    /// SPARQL protocol endpoint the extraction queries are sent to.
    #[serde(default)]
    pub sparql_endpoint: Option<String>,
    /// When set, the triple pattern is wrapped in `SERVICE <service> { }`.
    #[serde(default)]
    pub service: Option<String>,
    /// Namespace registry of the endpoint; defaults to `<sparql_endpoint>/namespaces`.
    #[serde(default)]
    pub namespaces_url: Option<String>,
    /// Declarations added to (and overriding) the store's registry.
    #[serde(default)]
    pub extra_namespaces: BTreeMap<String, String>,
    #[serde(default)]
    pub abbreviation: AbbreviationMode,
    #[serde(default = "default_work_dir")]
    pub work_dir: PathBuf,
    #[serde(default)]
    pub queries_dir: Option<PathBuf>,
    #[serde(default)]
    pub allow_empty: bool,
    #[serde(default = "default_timeout")]
    pub sparql_timeout_secs: u64,
    #[serde(default)]
    pub tigergraph: TigerGraphConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            sparql_endpoint: None,
            service: None,
            namespaces_url: None,
            extra_namespaces: BTreeMap::new(),
            abbreviation: AbbreviationMode::default(),
            work_dir: default_work_dir(),
            queries_dir: None,
            allow_empty: false,
            sparql_timeout_secs: default_timeout(),
            tigergraph: TigerGraphConfig::default(),
        }
    }
}

impl Config {
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    pub fn extra_namespace_map(&self) -> NamespaceMap {
        NamespaceMap::from_pairs(self.extra_namespaces.clone())
    }

    /// Checks that the settings needed by `stages` are present and well formed.
    pub fn validate(&self, stages: &[Stage]) -> Result<()> {
        if let Some(service) = &self.service {
            parse_iri(service)?;
        }
        for namespace in self.extra_namespaces.values() {
            parse_iri(namespace)?;
        }
        if stages.contains(&Stage::Extract) && self.sparql_endpoint.is_none() {
            return Err(anyhow!("The extract stage needs a sparql_endpoint"));
        }
        if stages.contains(&Stage::Abbreviate)
            && self.sparql_endpoint.is_none()
            && self.extra_namespaces.is_empty()
        {
            return Err(anyhow!(
                "The abbreviate stage needs a sparql_endpoint or extra_namespaces"
            ));
        }
        if stages.iter().any(|s| s.needs_graph_store()) {
            self.tigergraph.gsql_url()?;
            self.tigergraph.restpp_url()?;
        }
        if stages.contains(&Stage::Install) && self.queries_dir.is_none() {
            return Err(anyhow!("The install stage needs a queries_dir"));
        }
        Ok(())
    }

    /// Default location of the configuration file in `dir`.
    pub fn default_path(dir: &Path) -> PathBuf {
        dir.join(CONFIG_FILE)
    }

    pub fn save_to_file(&self, file: &Path) -> Result<()> {
        let config_str = serde_json::to_string_pretty(&self)?;
        let mut file = std::fs::File::create(file)?;
        file.write_all(config_str.as_bytes())?;
        Ok(())
    }

    pub fn from_file(file: &Path) -> Result<Self> {
        let reader = BufReader::new(
            std::fs::File::open(file)
                .with_context(|| format!("Failed to open config {}", file.display()))?,
        );
        let mut config: Config = serde_json::from_reader(reader)
            .with_context(|| format!("Failed to parse config {}", file.display()))?;
        config.tigergraph.apply_env();
        Ok(config)
    }

    /// Prints out the current Config in a clear and readable way for command line output.
    pub fn print(&self) {
        println!("Configuration:");
        println!(
            "  SPARQL endpoint: {}",
            self.sparql_endpoint.as_deref().unwrap_or("(none)")
        );
        if let Some(service) = &self.service {
            println!("  SERVICE: {}", service);
        }
        if let Some(url) = &self.namespaces_url {
            println!("  Namespaces: {}", url);
        }
        if !self.extra_namespaces.is_empty() {
            println!("  Extra namespaces:");
            for (prefix, ns) in &self.extra_namespaces {
                println!("    - {}: {}", prefix, ns);
            }
        }
        println!("  Abbreviation: {:?}", self.abbreviation);
        println!("  Work dir: {}", self.work_dir.display());
        if let Some(dir) = &self.queries_dir {
            println!("  Queries dir: {}", dir.display());
        }
        println!("  Allow empty results: {}", self.allow_empty);
        println!("  TigerGraph host: {}", self.tigergraph.host);
        println!("  TigerGraph user: {}", self.tigergraph.username);
        println!("  Graph: {}", self.tigergraph.graph);
        println!("  Loading job: {}", self.tigergraph.job);
    }
}

impl From<Config> for ConfigBuilder {
    /// Starts from an existing configuration, e.g. one read from disk.
    fn from(config: Config) -> Self {
        Self {
            sparql_endpoint: Some(config.sparql_endpoint),
            service: Some(config.service),
            namespaces_url: Some(config.namespaces_url),
            extra_namespaces: Some(config.extra_namespaces),
            abbreviation: Some(config.abbreviation),
            work_dir: Some(config.work_dir),
            queries_dir: Some(config.queries_dir),
            allow_empty: Some(config.allow_empty),
            sparql_timeout_secs: Some(config.sparql_timeout_secs),
            tigergraph: Some(config.tigergraph),
        }
    }
}

impl ConfigBuilder {
    /// Adds one `prefix -> namespace` declaration to `extra_namespaces`.
    pub fn namespace(mut self, prefix: impl Into<String>, namespace: impl Into<String>) -> Self {
        self.extra_namespaces
            .get_or_insert_with(BTreeMap::new)
            .insert(prefix.into(), namespace.into());
        self
    }

    fn connection(&mut self) -> &mut TigerGraphConfig {
        self.tigergraph.get_or_insert_with(TigerGraphConfig::default)
    }

    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.connection().host = host.into();
        self
    }

    pub fn username(mut self, username: impl Into<String>) -> Self {
        self.connection().username = username.into();
        self
    }

    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.connection().password = Some(password.into());
        self
    }

    pub fn graph(mut self, graph: impl Into<String>) -> Self {
        self.connection().graph = graph.into();
        self
    }

    pub fn job(mut self, job: impl Into<String>) -> Self {
        self.connection().job = job.into();
        self
    }

    fn validate_namespaces(&self) -> std::result::Result<(), String> {
        for namespace in self.extra_namespaces.iter().flat_map(|m| m.values()) {
            parse_iri(namespace).map_err(|e| format!("{:#}", e))?;
        }
        Ok(())
    }

    /// Builds the configuration, filling missing credentials from the environment.
    pub fn build(self) -> Result<Config> {
        let mut config = self.build_checked()?;
        config.tigergraph.apply_env();
        Ok(config)
    }
}

/// Parses a `prefix=namespace` pair as given on the command line.
pub fn parse_namespace_arg(arg: &str) -> Result<(String, String)> {
    let (prefix, namespace) = arg
        .split_once('=')
        .ok_or_else(|| anyhow!("Expected prefix=namespace, got '{}'", arg))?;
    Ok((prefix.trim().to_string(), namespace.trim().to_string()))
}
