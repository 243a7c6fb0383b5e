//! Client for the TigerGraph GSQL server and RESTPP endpoints.
//!
//! GSQL statements go to the GSQL server with basic authentication and come back as
//! plain text; success has to be inferred from the text. RESTPP calls (file upload
//! and installed query invocation) use a bearer token and answer with a JSON envelope
//! carrying an `error` flag.

use crate::config::TigerGraphConfig;
use crate::errors::{GsqlError, RestppError};
use anyhow::{anyhow, Context, Result};
use lazy_static::lazy_static;
use log::{debug, info};
use regex::Regex;
use reqwest::blocking::Client;
use reqwest::header::CONTENT_TYPE;
use serde_json::Value;
use std::path::Path;
use std::time::Duration;

lazy_static! {
    static ref SECRET_CREATED: Regex =
        Regex::new(r"The secret:\s*(\S+)\s+has been created").expect("static regex");
}

/// Substrings that signal a failed GSQL command in the server's text output.
pub const GSQL_FAILURE_MARKERS: &[&str] = &[
    "Semantic Check Fails",
    "Syntax Error",
    "Encountered \"",
    "already exists",
    "does not exist",
    "is not a valid",
    "failed",
];

/// Returns an error if the GSQL response text contains a failure marker.
pub fn check_gsql(response: &str) -> Result<()> {
    let lower = response.to_ascii_lowercase();
    for marker in GSQL_FAILURE_MARKERS {
        if lower.contains(&marker.to_ascii_lowercase()) {
            return Err(anyhow!(GsqlError {
                marker: marker.to_string(),
                response: response.to_string(),
            }));
        }
    }
    Ok(())
}

/// Returns an error if a RESTPP JSON envelope reports `"error": true`.
pub fn check_restpp(endpoint: &str, body: &Value) -> Result<()> {
    if body.get("error").and_then(Value::as_bool).unwrap_or(false) {
        let message = body
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("no message")
            .to_string();
        return Err(anyhow!(RestppError {
            endpoint: endpoint.to_string(),
            message,
        }));
    }
    Ok(())
}

/// Extracts the secret from the output of `CREATE SECRET`.
pub fn parse_secret(response: &str) -> Option<String> {
    SECRET_CREATED
        .captures(response)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim_end_matches('.').to_string())
}

/// Extracts the token from a `requesttoken` response, which places it either at the
/// top level or under `results`.
pub fn parse_token(body: &Value) -> Option<String> {
    body.get("token")
        .or_else(|| body.get("results").and_then(|r| r.get("token")))
        .and_then(Value::as_str)
        .map(|s| s.to_string())
}

/// The operations the pipeline needs from the graph database.
pub trait GraphStore {
    /// Obtains whatever credentials the RESTPP calls require.
    fn authenticate(&mut self) -> Result<()> {
        Ok(())
    }

    /// Runs GSQL statement text and returns the raw response text.
    fn gsql(&self, statement: &str) -> Result<String>;

    /// Streams a file to a loading job under `file_tag` and returns the raw response.
    fn upload_file(&self, path: &Path, file_tag: &str, job: &str) -> Result<Value>;

    /// Invokes an installed query by name and returns the raw response.
    fn run_installed_query(&self, name: &str) -> Result<Value>;
}

pub struct TigerGraphClient {
    config: TigerGraphConfig,
    client: Client,
    token: Option<String>,
}

impl TigerGraphClient {
    pub fn new(config: TigerGraphConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        let token = config.token.clone();
        Ok(Self {
            config,
            client,
            token,
        })
    }

    pub fn graph(&self) -> &str {
        &self.config.graph
    }

    fn restpp(&self, path: &str) -> Result<String> {
        Ok(format!(
            "{}{}",
            self.config.restpp_url()?.trim_end_matches('/'),
            path
        ))
    }

    fn with_token(
        &self,
        request: reqwest::blocking::RequestBuilder,
    ) -> reqwest::blocking::RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    fn json_response(&self, endpoint: &str, resp: reqwest::blocking::Response) -> Result<Value> {
        let status = resp.status();
        let text = resp.text()?;
        if !status.is_success() {
            return Err(anyhow!(RestppError {
                endpoint: endpoint.to_string(),
                message: format!("HTTP {}: {}", status, text.trim()),
            }));
        }
        let body: Value = serde_json::from_str(&text)
            .with_context(|| format!("Response from {} is not JSON: {}", endpoint, text))?;
        check_restpp(endpoint, &body)?;
        Ok(body)
    }

    fn create_secret(&self) -> Result<String> {
        let response = self.gsql(&format!("USE GRAPH {}\nCREATE SECRET", self.config.graph))?;
        parse_secret(&response)
            .ok_or_else(|| anyhow!("Could not read a secret from GSQL output: {}", response))
    }

    fn request_token(&self, secret: &str) -> Result<String> {
        let endpoint = self.restpp("/requesttoken")?;
        let lifetime = self.config.token_lifetime_secs.to_string();
        let resp = self
            .client
            .get(&endpoint)
            .query(&[("secret", secret), ("lifetime", lifetime.as_str())])
            .send()
            .with_context(|| format!("RESTPP endpoint {} unreachable", endpoint))?;
        let body = self.json_response(&endpoint, resp)?;
        parse_token(&body).ok_or_else(|| anyhow!("No token in response from {}", endpoint))
    }
}

impl GraphStore for TigerGraphClient {
    fn authenticate(&mut self) -> Result<()> {
        if self.token.is_some() {
            return Ok(());
        }
        let secret = match &self.config.secret {
            Some(secret) => secret.clone(),
            None => {
                info!("No secret configured, creating one for graph {}", self.config.graph);
                self.create_secret()?
            }
        };
        self.token = Some(self.request_token(&secret)?);
        info!("Obtained RESTPP token for graph {}", self.config.graph);
        Ok(())
    }

    fn gsql(&self, statement: &str) -> Result<String> {
        let endpoint = format!(
            "{}/gsqlserver/gsql/file",
            self.config.gsql_url()?.trim_end_matches('/')
        );
        debug!("GSQL to {}:\n{}", endpoint, statement);
        let body: String = url::form_urlencoded::byte_serialize(statement.as_bytes()).collect();
        let resp = self
            .client
            .post(&endpoint)
            .basic_auth(&self.config.username, self.config.password.as_deref())
            .header(CONTENT_TYPE, "text/plain")
            .body(body)
            .send()
            .with_context(|| format!("GSQL server {} unreachable", endpoint))?;
        let status = resp.status();
        let text = resp.text()?;
        if !status.is_success() {
            return Err(anyhow!(GsqlError {
                marker: format!("HTTP {}", status),
                response: text,
            }));
        }
        Ok(text)
    }

    fn upload_file(&self, path: &Path, file_tag: &str, job: &str) -> Result<Value> {
        let endpoint = self.restpp(&format!("/ddl/{}", self.config.graph))?;
        let bytes =
            std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
        info!(
            "Uploading {} ({}) as {} for job {}",
            path.display(),
            pretty_bytes::converter::convert(bytes.len() as f64),
            file_tag,
            job
        );
        let resp = self
            .with_token(self.client.post(&endpoint))
            .query(&[
                ("tag", job),
                ("filename", file_tag),
                ("sep", ","),
                ("eol", "\n"),
            ])
            .body(bytes)
            .send()
            .with_context(|| format!("RESTPP endpoint {} unreachable", endpoint))?;
        self.json_response(&endpoint, resp)
    }

    fn run_installed_query(&self, name: &str) -> Result<Value> {
        let endpoint = self.restpp(&format!("/query/{}/{}", self.config.graph, name))?;
        let resp = self
            .with_token(self.client.get(&endpoint))
            .send()
            .with_context(|| format!("RESTPP endpoint {} unreachable", endpoint))?;
        self.json_response(&endpoint, resp)
    }
}
