//! Triple extraction: runs the two SELECT queries against the store, assigns
//! identifiers locally and materializes each result set as a CSV file.

use crate::consts::*;
use crate::errors::StageError;
use crate::logging::RunLog;
use crate::model::{DatatypePropertyRecord, ObjectPropertyRecord, Record, Statement};
use crate::options::{EmptyResults, Stage};
use crate::sparql::{self, SolutionTable, TripleSource};
use anyhow::{anyhow, Context, Result};
use log::info;
use oxigraph::model::Term;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct ExtractionSummary {
    pub object_file: PathBuf,
    pub datatype_file: PathBuf,
    pub object_rows: usize,
    pub datatype_rows: usize,
}

fn csv_writer(path: &Path) -> Result<csv::Writer<std::fs::File>> {
    csv::WriterBuilder::new()
        .delimiter(b',')
        .quote(b'"')
        .quote_style(csv::QuoteStyle::Necessary)
        .terminator(csv::Terminator::Any(b'\n'))
        .from_path(path)
        .with_context(|| format!("Failed to create {}", path.display()))
}

/// Writes the object file: header `s,p,o,pid` then one row per record.
pub fn write_object_file(path: &Path, records: &[ObjectPropertyRecord]) -> Result<()> {
    let mut writer = csv_writer(path)?;
    writer.write_record(OBJECT_COLUMNS)?;
    for record in records {
        writer.write_record(record.fields())?;
    }
    writer.flush()?;
    Ok(())
}

/// Writes the datatype file: header `s,p,o,d,l,pid,vid` then one row per record.
pub fn write_datatype_file(path: &Path, records: &[DatatypePropertyRecord]) -> Result<()> {
    let mut writer = csv_writer(path)?;
    writer.write_record(DATATYPE_COLUMNS)?;
    for record in records {
        writer.write_record(record.fields())?;
    }
    writer.flush()?;
    Ok(())
}

/// Reads only the header row of a CSV file.
pub fn read_header(path: &Path) -> Result<Vec<String>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_path(path)
        .with_context(|| format!("Failed to open {}", path.display()))?;
    Ok(reader.headers()?.iter().map(|h| h.to_string()).collect())
}

fn statement_at(table: &SolutionTable, idx: usize) -> Result<Statement> {
    Statement::from_terms(
        table.require(idx, COL_SUBJECT)?,
        table.require(idx, COL_PREDICATE)?,
        table.require(idx, COL_OBJECT)?,
    )
    .with_context(|| format!("Malformed result row {}", idx))
}

/// Converts the object-valued result set into records.
pub fn object_records(table: &SolutionTable) -> Result<Vec<ObjectPropertyRecord>> {
    let mut records = Vec::with_capacity(table.len());
    for idx in 0..table.len() {
        match Record::from(statement_at(table, idx)?) {
            Record::Object(rec) => records.push(rec),
            Record::Datatype(_) => {
                return Err(anyhow!(
                    "Result row {} of the object query has a literal object",
                    idx
                ))
            }
        }
    }
    Ok(records)
}

/// Converts the literal-valued result set into records. Projected `?d` and `?l`
/// bindings take precedence over what the literal itself carries.
pub fn datatype_records(table: &SolutionTable) -> Result<Vec<DatatypePropertyRecord>> {
    let mut records = Vec::with_capacity(table.len());
    for idx in 0..table.len() {
        let mut rec = match Record::from(statement_at(table, idx)?) {
            Record::Datatype(rec) => rec,
            Record::Object(_) => {
                return Err(anyhow!(
                    "Result row {} of the datatype query has a resource object",
                    idx
                ))
            }
        };
        let row = &table.rows[idx];
        let datatype = row.get(COL_DATATYPE).map(sparql::term_value);
        let language = row.get(COL_LANGUAGE).map(sparql::term_value);
        if datatype.is_some() || language.is_some() {
            let datatype = datatype.or_else(|| Some(rec.datatype.clone()));
            let language = language.or_else(|| Some(rec.language.clone()));
            rec = DatatypePropertyRecord::new(
                rec.subject,
                rec.predicate,
                rec.object,
                datatype,
                language,
            );
        }
        records.push(rec);
    }
    Ok(records)
}

fn check_rows(table: &SolutionTable, what: &str, empty: EmptyResults) -> Result<()> {
    if table.is_empty() && empty == EmptyResults::Reject {
        return Err(anyhow!(StageError::new(
            Stage::Extract,
            format!("the {} query returned no rows", what)
        )));
    }
    Ok(())
}

fn as_stage_error(err: anyhow::Error) -> anyhow::Error {
    if err.downcast_ref::<StageError>().is_some() {
        return err;
    }
    anyhow!(StageError::new(Stage::Extract, format!("{:#}", err)))
}

/// Runs both extraction queries and writes `object.csv` and `datatype.csv` into `work_dir`.
pub fn extract(
    source: &dyn TripleSource,
    service: Option<&str>,
    work_dir: &Path,
    empty: EmptyResults,
    log: &mut RunLog,
) -> Result<ExtractionSummary> {
    std::fs::create_dir_all(work_dir)?;

    log.log("running sparql to get all triples with object properties")?;
    let table = source
        .select(&sparql::object_property_query(service))
        .map_err(as_stage_error)?;
    check_rows(&table, "object property", empty)?;
    let objects = object_records(&table).map_err(as_stage_error)?;
    log.log_at(1, format!("{} rows", objects.len()))?;

    log.log("running sparql to get all triples with datatype properties")?;
    let table = source
        .select(&sparql::datatype_property_query(service))
        .map_err(as_stage_error)?;
    check_rows(&table, "datatype property", empty)?;
    let datatypes = datatype_records(&table).map_err(as_stage_error)?;
    log.log_at(1, format!("{} rows", datatypes.len()))?;

    let object_file = work_dir.join(OBJECT_FILE);
    let datatype_file = work_dir.join(DATATYPE_FILE);
    write_object_file(&object_file, &objects)?;
    write_datatype_file(&datatype_file, &datatypes)?;
    info!(
        "Wrote {} and {}",
        object_file.display(),
        datatype_file.display()
    );
    log.log("running successfully")?;

    Ok(ExtractionSummary {
        object_file,
        datatype_file,
        object_rows: objects.len(),
        datatype_rows: datatypes.len(),
    })
}

/// Builds a table from `(variable, term)` rows, in the order given.
pub fn table_from_rows(variables: &[&str], rows: Vec<Vec<(&str, Term)>>) -> SolutionTable {
    SolutionTable {
        variables: variables.iter().map(|v| v.to_string()).collect(),
        rows: rows
            .into_iter()
            .map(|row| row.into_iter().map(|(k, v)| (k.to_string(), v)).collect())
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identifier;
    use oxigraph::model::{Literal, NamedNode};
    use tempfile::tempdir;

    fn iri(s: &str) -> Term {
        Term::NamedNode(NamedNode::new(s).unwrap())
    }

    #[test]
    fn datatype_rows_prefer_projected_columns() {
        let table = table_from_rows(
            &["s", "p", "o", "d", "l"],
            vec![vec![
                ("s", iri("http://example.org/Alice")),
                ("p", iri("http://example.org/age")),
                (
                    "o",
                    Term::Literal(Literal::new_typed_literal(
                        "30",
                        NamedNode::new("http://www.w3.org/2001/XMLSchema#int").unwrap(),
                    )),
                ),
                ("d", iri("http://www.w3.org/2001/XMLSchema#int")),
                ("l", Term::Literal(Literal::new_simple_literal(""))),
            ]],
        );
        let records = datatype_records(&table).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].datatype, "http://www.w3.org/2001/XMLSchema#int");
        assert_eq!(records[0].language, "");
        assert_eq!(records[0].value_id, identifier::value_id("30", ""));
    }

    #[test]
    fn object_query_rejects_literals() {
        let table = table_from_rows(
            &["s", "p", "o"],
            vec![vec![
                ("s", iri("http://example.org/a")),
                ("p", iri("http://example.org/p")),
                ("o", Term::Literal(Literal::new_simple_literal("x"))),
            ]],
        );
        assert!(object_records(&table).is_err());
    }

    #[test]
    fn csv_output_quotes_only_when_needed() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("datatype.csv");
        let rec = DatatypePropertyRecord::new(
            "http://example.org/a".into(),
            "http://example.org/comment".into(),
            "hello, \"world\"".into(),
            Some("http://www.w3.org/2001/XMLSchema#string".into()),
            None,
        );
        write_datatype_file(&path, &[rec.clone()]).unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        let mut lines = content.split('\n');
        assert_eq!(lines.next(), Some("s,p,o,d,l,pid,vid"));
        let row = lines.next().unwrap();
        assert!(row.starts_with(
            "http://example.org/a,http://example.org/comment,\"hello, \"\"world\"\"\","
        ));
        assert!(row.ends_with(&format!(",,{},{}", rec.statement_id, rec.value_id)));
        assert_eq!(read_header(&path).unwrap(), DATATYPE_COLUMNS);
    }
}
