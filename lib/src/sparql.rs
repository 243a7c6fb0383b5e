//! Access to the source triple store over the SPARQL 1.1 protocol.
//!
//! Queries are sent as form-encoded POST requests and answered in the SPARQL JSON
//! results format, which keeps term kinds, datatypes and language tags intact. The
//! namespace registry is read from the RDF4J-style `/namespaces` resource of the
//! repository, which answers in the same format.

use anyhow::{anyhow, Context, Result};
use log::{debug, info};
use oxigraph::model::{BlankNode, Literal, NamedNode, Term};
use reqwest::blocking::Client;
use reqwest::header::ACCEPT;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;

pub const SPARQL_RESULTS_JSON: &str = "application/sparql-results+json";

/// Ordered variables and ordered rows of a SELECT result. Unbound variables are
/// absent from a row.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SolutionTable {
    pub variables: Vec<String>,
    pub rows: Vec<HashMap<String, Term>>,
}

impl SolutionTable {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Returns the bound term for `var` in row `idx`, or an error naming the variable.
    pub fn require<'a>(&'a self, idx: usize, var: &str) -> Result<&'a Term> {
        self.rows
            .get(idx)
            .and_then(|row| row.get(var))
            .ok_or_else(|| anyhow!("Result row {} has no binding for ?{}", idx, var))
    }
}

#[derive(Deserialize)]
struct JsonResults {
    head: JsonHead,
    results: JsonBindings,
}

#[derive(Deserialize)]
struct JsonHead {
    #[serde(default)]
    vars: Vec<String>,
}

#[derive(Deserialize)]
struct JsonBindings {
    bindings: Vec<HashMap<String, JsonTerm>>,
}

#[derive(Deserialize)]
struct JsonTerm {
    #[serde(rename = "type")]
    kind: String,
    value: String,
    datatype: Option<String>,
    #[serde(rename = "xml:lang")]
    lang: Option<String>,
}

impl JsonTerm {
    fn into_term(self) -> Result<Term> {
        let term = match self.kind.as_str() {
            "uri" => Term::NamedNode(NamedNode::new(self.value)?),
            "bnode" => Term::BlankNode(BlankNode::new(self.value)?),
            "literal" | "typed-literal" => match (self.lang, self.datatype) {
                (Some(lang), _) => {
                    Term::Literal(Literal::new_language_tagged_literal(self.value, lang)?)
                }
                (None, Some(dt)) => {
                    Term::Literal(Literal::new_typed_literal(self.value, NamedNode::new(dt)?))
                }
                (None, None) => Term::Literal(Literal::new_simple_literal(self.value)),
            },
            other => return Err(anyhow!("Unknown SPARQL result term type '{}'", other)),
        };
        Ok(term)
    }
}

/// Parses a SPARQL JSON results document.
pub fn parse_json_results(bytes: &[u8]) -> Result<SolutionTable> {
    let parsed: JsonResults =
        serde_json::from_slice(bytes).context("Malformed SPARQL JSON results")?;
    let mut rows = Vec::with_capacity(parsed.results.bindings.len());
    for binding in parsed.results.bindings {
        let mut row = HashMap::with_capacity(binding.len());
        for (var, term) in binding {
            row.insert(var, term.into_term()?);
        }
        rows.push(row);
    }
    Ok(SolutionTable {
        variables: parsed.head.vars,
        rows,
    })
}

fn triple_pattern(service: Option<&str>) -> String {
    match service {
        Some(iri) => format!("SERVICE <{}> {{\n        ?s ?p ?o .\n    }}", iri),
        None => "?s ?p ?o .".to_string(),
    }
}

/// Selects every statement whose object is a resource.
pub fn object_property_query(service: Option<&str>) -> String {
    format!(
        "SELECT ?s ?p ?o\nWHERE {{\n    {}\n    FILTER (!isLiteral(?o))\n}}\n",
        triple_pattern(service)
    )
}

/// Selects every statement whose object is a literal, with its datatype and language.
pub fn datatype_property_query(service: Option<&str>) -> String {
    format!(
        "SELECT ?s ?p ?o (DATATYPE(?o) AS ?d) (LANG(?o) AS ?l)\nWHERE {{\n    {}\n    FILTER (isLiteral(?o))\n}}\n",
        triple_pattern(service)
    )
}

/// A source of SELECT results and namespace declarations.
pub trait TripleSource {
    fn select(&self, query: &str) -> Result<SolutionTable>;

    /// Returns `(prefix, namespace)` pairs; the default namespace has an empty prefix.
    fn namespaces(&self) -> Result<Vec<(String, String)>>;
}

/// A remote SPARQL protocol endpoint.
pub struct SparqlEndpoint {
    endpoint: String,
    namespaces_url: String,
    client: Client,
}

impl SparqlEndpoint {
    pub fn new(endpoint: &str, namespaces_url: Option<&str>, timeout: Duration) -> Result<Self> {
        let namespaces_url = namespaces_url
            .map(|s| s.to_string())
            .unwrap_or_else(|| format!("{}/namespaces", endpoint.trim_end_matches('/')));
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            endpoint: endpoint.to_string(),
            namespaces_url,
            client,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn fetch(&self, request: reqwest::blocking::RequestBuilder, url: &str) -> Result<Vec<u8>> {
        let resp = request
            .header(ACCEPT, SPARQL_RESULTS_JSON)
            .send()
            .with_context(|| format!("SPARQL endpoint {} unreachable", url))?;
        let status = resp.status();
        let bytes = resp.bytes()?.to_vec();
        if !status.is_success() {
            return Err(anyhow!(
                "SPARQL endpoint {} answered {}: {}",
                url,
                status,
                String::from_utf8_lossy(&bytes).trim()
            ));
        }
        Ok(bytes)
    }
}

impl TripleSource for SparqlEndpoint {
    fn select(&self, query: &str) -> Result<SolutionTable> {
        debug!("Sending query to {}:\n{}", self.endpoint, query);
        let request = self.client.post(&self.endpoint).form(&[("query", query)]);
        let bytes = self.fetch(request, &self.endpoint)?;
        let table = parse_json_results(&bytes)?;
        info!("Query on {} returned {} rows", self.endpoint, table.len());
        Ok(table)
    }

    fn namespaces(&self) -> Result<Vec<(String, String)>> {
        let request = self.client.get(&self.namespaces_url);
        let bytes = self.fetch(request, &self.namespaces_url)?;
        namespace_pairs(&parse_json_results(&bytes)?)
    }
}

/// Reads `(prefix, namespace)` pairs out of a namespace registry result.
pub fn namespace_pairs(table: &SolutionTable) -> Result<Vec<(String, String)>> {
    let mut pairs = Vec::with_capacity(table.len());
    for idx in 0..table.len() {
        let prefix = term_value(table.require(idx, "prefix")?);
        let namespace = term_value(table.require(idx, "namespace")?);
        pairs.push((prefix, namespace));
    }
    Ok(pairs)
}

/// The lexical value of a literal or the IRI string of a named node.
pub fn term_value(term: &Term) -> String {
    match term {
        Term::NamedNode(n) => n.as_str().to_string(),
        Term::BlankNode(b) => format!("_:{}", b.as_str()),
        Term::Literal(l) => l.value().to_string(),
        #[allow(unreachable_patterns)]
        other => other.to_string(),
    }
}
