//! Shortens namespace IRIs in the tabular files to `prefix:` form.
//!
//! Namespaces are always applied longest first so that a namespace which is itself a
//! prefix of another namespace cannot shadow the longer one. The default (empty)
//! prefix is written as `base:`.

use crate::consts::{COL_DATATYPE, COL_OBJECT, COL_PREDICATE, COL_SUBJECT, DEFAULT_NAMESPACE_PREFIX};
use crate::options::AbbreviationMode;
use anyhow::{anyhow, Context, Result};
use log::{debug, warn};
use std::collections::BTreeMap;
use std::path::Path;

/// Prefix to namespace IRI mapping.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NamespaceMap {
    entries: BTreeMap<String, String>,
}

impl NamespaceMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_pairs<I, P, N>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (P, N)>,
        P: Into<String>,
        N: Into<String>,
    {
        let mut map = Self::new();
        for (prefix, namespace) in pairs {
            map.insert(prefix, namespace);
        }
        map
    }

    /// Adds or replaces a declaration. Empty namespaces are ignored.
    pub fn insert(&mut self, prefix: impl Into<String>, namespace: impl Into<String>) {
        let namespace = namespace.into();
        if namespace.is_empty() {
            return;
        }
        let prefix = prefix.into();
        if let Some(old) = self.entries.insert(prefix.clone(), namespace.clone()) {
            if old != namespace {
                debug!("Namespace for prefix '{}' replaced: {} -> {}", prefix, old, namespace);
            }
        }
    }

    /// Merges `other` into this map; declarations in `other` win.
    pub fn extend(&mut self, other: &NamespaceMap) {
        for (prefix, namespace) in &other.entries {
            self.insert(prefix.clone(), namespace.clone());
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, prefix: &str) -> Option<&str> {
        self.entries.get(prefix).map(|s| s.as_str())
    }

    /// `(namespace, "prefix:")` pairs ordered longest namespace first.
    ///
    /// Two prefixes bound to the same namespace would make abbreviation ambiguous;
    /// the first prefix in alphabetical order is kept. A declared `base` prefix
    /// takes `base:` from the default namespace, which is then left unabbreviated.
    pub fn replacements(&self) -> Vec<(String, String)> {
        let mut seen = BTreeMap::new();
        for (prefix, namespace) in &self.entries {
            if let Some(existing) = seen.get(namespace) {
                warn!(
                    "Namespace {} is bound to both '{}' and '{}'; using '{}'",
                    namespace, existing, prefix, existing
                );
                continue;
            }
            seen.insert(namespace.clone(), prefix.clone());
        }
        let declared_base = seen.values().any(|p| p == DEFAULT_NAMESPACE_PREFIX);
        if declared_base {
            if let Some(default) = self.entries.get("") {
                if seen.get(default).map(|p| p.is_empty()).unwrap_or(false) {
                    warn!(
                        "Prefix '{}' is declared explicitly; default namespace {} is not abbreviated",
                        DEFAULT_NAMESPACE_PREFIX, default
                    );
                    seen.remove(default);
                }
            }
        }
        let mut out: Vec<(String, String)> = seen
            .into_iter()
            .map(|(namespace, prefix)| {
                let short = if prefix.is_empty() {
                    DEFAULT_NAMESPACE_PREFIX.to_string()
                } else {
                    prefix
                };
                (namespace, format!("{}:", short))
            })
            .collect();
        out.sort_by(|a, b| b.0.len().cmp(&a.0.len()).then_with(|| a.0.cmp(&b.0)));
        out
    }
}

/// Substitutes every occurrence of every namespace in `text`.
pub fn abbreviate_text(text: &str, namespaces: &NamespaceMap) -> String {
    let mut text = text.to_string();
    for (namespace, short) in namespaces.replacements() {
        text = text.replace(&namespace, &short);
    }
    text
}

/// Replaces the namespace a single IRI starts with, if any.
pub fn abbreviate_iri(iri: &str, replacements: &[(String, String)]) -> String {
    for (namespace, short) in replacements {
        if let Some(local) = iri.strip_prefix(namespace.as_str()) {
            return format!("{}{}", short, local);
        }
    }
    iri.to_string()
}

/// Replaces a leading `prefix:` with its namespace, if any.
pub fn expand_iri(value: &str, replacements: &[(String, String)]) -> String {
    // Longest prefixes first, mirroring `abbreviate_iri`.
    let mut by_prefix: Vec<&(String, String)> = replacements.iter().collect();
    by_prefix.sort_by(|a, b| b.1.len().cmp(&a.1.len()));
    for (namespace, short) in by_prefix {
        if let Some(local) = value.strip_prefix(short.as_str()) {
            return format!("{}{}", namespace, local);
        }
    }
    value.to_string()
}

/// Positions of the columns that carry IRIs, given a file header.
pub fn iri_columns(header: &[String]) -> Vec<usize> {
    let names = [COL_SUBJECT, COL_PREDICATE, COL_OBJECT, COL_DATATYPE];
    // The object column of the datatype file holds a literal.
    let literal_file = header.iter().any(|h| h == COL_DATATYPE);
    header
        .iter()
        .enumerate()
        .filter(|(_, h)| names.contains(&h.as_str()))
        .filter(|(_, h)| !(literal_file && h.as_str() == COL_OBJECT))
        .map(|(idx, _)| idx)
        .collect()
}

fn rewrite_fields<F>(input: &Path, output: &Path, rewrite: F) -> Result<usize>
where
    F: Fn(&str) -> String,
{
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_path(input)
        .with_context(|| format!("Failed to open {}", input.display()))?;
    let header: Vec<String> = reader.headers()?.iter().map(|h| h.to_string()).collect();
    let columns = iri_columns(&header);
    if columns.is_empty() {
        return Err(anyhow!(
            "{} has no IRI columns in header {:?}",
            input.display(),
            header
        ));
    }
    let mut writer = csv::WriterBuilder::new()
        .quote_style(csv::QuoteStyle::Necessary)
        .terminator(csv::Terminator::Any(b'\n'))
        .from_path(output)
        .with_context(|| format!("Failed to create {}", output.display()))?;
    writer.write_record(&header)?;
    let mut rows = 0;
    for record in reader.records() {
        let record = record?;
        let fields: Vec<String> = record
            .iter()
            .enumerate()
            .map(|(idx, field)| {
                if columns.contains(&idx) {
                    rewrite(field)
                } else {
                    field.to_string()
                }
            })
            .collect();
        writer.write_record(&fields)?;
        rows += 1;
    }
    writer.flush()?;
    Ok(rows)
}

fn count_records(path: &Path) -> Result<usize> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_path(path)
        .with_context(|| format!("Failed to open {}", path.display()))?;
    let mut rows = 0;
    for record in reader.records() {
        record?;
        rows += 1;
    }
    Ok(rows)
}

/// Abbreviates `input` into `output` and returns the number of data rows written.
pub fn abbreviate_file(
    input: &Path,
    output: &Path,
    namespaces: &NamespaceMap,
    mode: AbbreviationMode,
) -> Result<usize> {
    match mode {
        AbbreviationMode::Verbatim => {
            let text = std::fs::read_to_string(input)
                .with_context(|| format!("Failed to read {}", input.display()))?;
            let abbreviated = abbreviate_text(&text, namespaces);
            std::fs::write(output, &abbreviated)
                .with_context(|| format!("Failed to write {}", output.display()))?;
            count_records(output)
        }
        AbbreviationMode::Fields => {
            let replacements = namespaces.replacements();
            rewrite_fields(input, output, |field| abbreviate_iri(field, &replacements))
        }
    }
}

/// Inverse of [`abbreviate_file`] in fields mode.
pub fn expand_file(input: &Path, output: &Path, namespaces: &NamespaceMap) -> Result<usize> {
    let replacements = namespaces.replacements();
    rewrite_fields(input, output, |field| expand_iri(field, &replacements))
}
