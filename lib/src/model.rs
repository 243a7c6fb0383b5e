//! Statements read from the triple store and the two record shapes written to the
//! tabular files.

use crate::identifier;
use anyhow::{anyhow, Result};
use oxigraph::model::{NamedNode, Term};

/// The object position of a statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Object {
    /// A reference to another named or blank resource, in its textual form.
    Resource(String),
    Literal {
        value: String,
        datatype: Option<String>,
        language: Option<String>,
    },
}

/// A subject-predicate-object triple. Subject and predicate are always resources.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Statement {
    pub subject: String,
    pub predicate: String,
    pub object: Object,
}

impl Statement {
    /// Builds a statement from oxigraph terms, rejecting literal subjects or predicates.
    /// IRIs keep their bare form and blank nodes are written as `_:<id>`.
    pub fn from_terms(subject: &Term, predicate: &Term, object: &Term) -> Result<Self> {
        let subject = match subject {
            Term::NamedNode(n) => n.as_str().to_string(),
            Term::BlankNode(b) => format!("_:{}", b.as_str()),
            other => return Err(anyhow!("Subject must be a resource, got {}", other)),
        };
        let predicate = match predicate {
            Term::NamedNode(n) => n.as_str().to_string(),
            other => return Err(anyhow!("Predicate must be an IRI, got {}", other)),
        };
        let object = match object {
            Term::NamedNode(n) => Object::Resource(n.as_str().to_string()),
            Term::BlankNode(b) => Object::Resource(format!("_:{}", b.as_str())),
            Term::Literal(l) => Object::Literal {
                value: l.value().to_string(),
                datatype: Some(l.datatype().as_str().to_string()),
                language: l.language().map(|lang| lang.to_string()),
            },
            #[allow(unreachable_patterns)]
            other => return Err(anyhow!("Unsupported object term {}", other)),
        };
        Ok(Self {
            subject,
            predicate,
            object,
        })
    }

    pub fn is_literal(&self) -> bool {
        matches!(self.object, Object::Literal { .. })
    }
}

/// A statement whose object is a resource, as written to the object file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectPropertyRecord {
    pub subject: String,
    pub predicate: String,
    pub object: String,
    pub statement_id: String,
}

impl ObjectPropertyRecord {
    pub fn new(subject: String, predicate: String, object: String) -> Self {
        let statement_id = identifier::statement_id(&subject, &predicate, &object);
        Self {
            subject,
            predicate,
            object,
            statement_id,
        }
    }

    /// Fields in file column order.
    pub fn fields(&self) -> [&str; 4] {
        [
            &self.subject,
            &self.predicate,
            &self.object,
            &self.statement_id,
        ]
    }
}

/// A statement whose object is a literal, as written to the datatype file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatatypePropertyRecord {
    pub subject: String,
    pub predicate: String,
    pub object: String,
    pub datatype: String,
    pub language: String,
    pub statement_id: String,
    pub value_id: String,
}

impl DatatypePropertyRecord {
    /// Absent datatypes and language tags are stored as empty strings.
    pub fn new(
        subject: String,
        predicate: String,
        object: String,
        datatype: Option<String>,
        language: Option<String>,
    ) -> Self {
        let language = language.unwrap_or_default();
        let statement_id =
            identifier::literal_statement_id(&subject, &predicate, &object, &language);
        let value_id = identifier::value_id(&object, &language);
        Self {
            subject,
            predicate,
            object,
            datatype: datatype.unwrap_or_default(),
            language,
            statement_id,
            value_id,
        }
    }

    pub fn fields(&self) -> [&str; 7] {
        [
            &self.subject,
            &self.predicate,
            &self.object,
            &self.datatype,
            &self.language,
            &self.statement_id,
            &self.value_id,
        ]
    }
}

/// Either record shape, routed by the kind of object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Record {
    Object(ObjectPropertyRecord),
    Datatype(DatatypePropertyRecord),
}

impl From<Statement> for Record {
    fn from(st: Statement) -> Self {
        match st.object {
            Object::Resource(o) => {
                Record::Object(ObjectPropertyRecord::new(st.subject, st.predicate, o))
            }
            Object::Literal {
                value,
                datatype,
                language,
            } => Record::Datatype(DatatypePropertyRecord::new(
                st.subject,
                st.predicate,
                value,
                datatype,
                language,
            )),
        }
    }
}

/// Parses an IRI string, used to validate configured namespace and service IRIs.
pub fn parse_iri(iri: &str) -> Result<NamedNode> {
    NamedNode::new(iri).map_err(|e| anyhow!("Invalid IRI '{}': {}", iri, e))
}
