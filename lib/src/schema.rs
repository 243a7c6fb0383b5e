//! The target property-graph schema and the loading job that maps the tabular files
//! onto it, both rendered as GSQL.
//!
//! Loading statements reference file columns by header name. Names are resolved to
//! positional `$N` references against the column layout the extractor writes, so a
//! change in column order changes the rendered job instead of silently loading the
//! wrong column into an attribute.

use crate::consts::*;
use anyhow::{anyhow, Result};
use std::fmt;

/// Bumped whenever the rendered schema or loading job changes shape.
pub const SCHEMA_VERSION: u32 = 1;

pub struct VertexType {
    pub name: &'static str,
    /// Non-key attributes, all of GSQL type STRING.
    pub attributes: &'static [&'static str],
}

pub struct EdgeType {
    pub name: &'static str,
    pub from: &'static str,
    pub to: &'static str,
}

pub struct AttributeIndex {
    pub vertex: &'static str,
    pub attribute: &'static str,
}

impl AttributeIndex {
    pub fn name(&self) -> String {
        format!("{}_{}_index", self.vertex, self.attribute)
    }
}

pub const CLASS_INSTANCE: &str = "ClassInstance";
pub const OBJECT_PROPERTY_INSTANCE: &str = "ObjectPropertyInstance";
pub const DATATYPE_PROPERTY_INSTANCE: &str = "DatatypePropertyInstance";
pub const VALUE_INSTANCE: &str = "ValueInstance";

pub const HAS_OBJECT_PROPERTY_INSTANCE: &str = "hasObjectPropertyInstance";
pub const HAS_OBJECT_INSTANCE: &str = "hasObjectInstance";
pub const HAS_DATATYPE_PROPERTY_INSTANCE: &str = "hasDatatypePropertyInstance";
pub const HAS_VALUE_INSTANCE: &str = "hasValueInstance";

pub const VERTICES: [VertexType; 4] = [
    VertexType {
        name: CLASS_INSTANCE,
        attributes: &["uri"],
    },
    VertexType {
        name: OBJECT_PROPERTY_INSTANCE,
        attributes: &["uri"],
    },
    VertexType {
        name: DATATYPE_PROPERTY_INSTANCE,
        attributes: &["uri"],
    },
    VertexType {
        name: VALUE_INSTANCE,
        attributes: &["value", "datatype", "langTag"],
    },
];

pub const EDGES: [EdgeType; 4] = [
    EdgeType {
        name: HAS_DATATYPE_PROPERTY_INSTANCE,
        from: CLASS_INSTANCE,
        to: DATATYPE_PROPERTY_INSTANCE,
    },
    EdgeType {
        name: HAS_OBJECT_PROPERTY_INSTANCE,
        from: CLASS_INSTANCE,
        to: OBJECT_PROPERTY_INSTANCE,
    },
    EdgeType {
        name: HAS_OBJECT_INSTANCE,
        from: OBJECT_PROPERTY_INSTANCE,
        to: CLASS_INSTANCE,
    },
    EdgeType {
        name: HAS_VALUE_INSTANCE,
        from: DATATYPE_PROPERTY_INSTANCE,
        to: VALUE_INSTANCE,
    },
];

pub const INDEXES: [AttributeIndex; 6] = [
    AttributeIndex {
        vertex: CLASS_INSTANCE,
        attribute: "uri",
    },
    AttributeIndex {
        vertex: OBJECT_PROPERTY_INSTANCE,
        attribute: "uri",
    },
    AttributeIndex {
        vertex: DATATYPE_PROPERTY_INSTANCE,
        attribute: "uri",
    },
    AttributeIndex {
        vertex: VALUE_INSTANCE,
        attribute: "value",
    },
    AttributeIndex {
        vertex: VALUE_INSTANCE,
        attribute: "datatype",
    },
    AttributeIndex {
        vertex: VALUE_INSTANCE,
        attribute: "langTag",
    },
];

/// The global schema, its secondary indexes and the graph, displayed as GSQL.
pub struct Schema<'a> {
    pub graph: &'a str,
}

impl fmt::Display for Schema<'_> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(f, "USE GLOBAL")?;
        writeln!(f)?;
        for v in VERTICES.iter() {
            write!(f, "CREATE VERTEX {} (primary_id id STRING", v.name)?;
            for a in v.attributes {
                write!(f, ", {} STRING", a)?;
            }
            writeln!(f, ")")?;
        }
        writeln!(f)?;
        for e in EDGES.iter() {
            writeln!(
                f,
                "CREATE DIRECTED EDGE {} (FROM {}, TO {}) WITH REVERSE_EDGE=\"reverse_{}\"",
                e.name, e.from, e.to, e.name
            )?;
        }
        writeln!(f)?;
        writeln!(f, "CREATE GLOBAL SCHEMA_CHANGE JOB attribute_index {{")?;
        for idx in INDEXES.iter() {
            writeln!(
                f,
                "    ALTER VERTEX {} ADD INDEX {} ON ({});",
                idx.vertex,
                idx.name(),
                idx.attribute
            )?;
        }
        writeln!(f, "}}")?;
        writeln!(f)?;
        writeln!(f, "RUN GLOBAL SCHEMA_CHANGE JOB attribute_index")?;
        writeln!(f, "CREATE GRAPH {}(*)", self.graph)
    }
}

/// Renders the global schema, its secondary indexes and the graph.
pub fn schema_script(graph: &str) -> String {
    Schema { graph }.to_string()
}

/// What a loading statement writes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadTarget {
    Vertex(&'static str),
    Edge(&'static str),
}

impl fmt::Display for LoadTarget {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            LoadTarget::Vertex(name) => write!(f, "VERTEX {}", name),
            LoadTarget::Edge(name) => write!(f, "EDGE {}", name),
        }
    }
}

/// One `LOAD <tag> TO ...` statement with its columns given by header name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadStatement {
    pub file_tag: &'static str,
    pub target: LoadTarget,
    pub columns: Vec<&'static str>,
}

/// Header of a file declared by the loading job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileLayout {
    pub file_tag: &'static str,
    pub columns: Vec<String>,
}

impl FileLayout {
    pub fn new(file_tag: &'static str, columns: &[&str]) -> Self {
        Self {
            file_tag,
            columns: columns.iter().map(|c| c.to_string()).collect(),
        }
    }

    pub fn position(&self, column: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == column)
    }
}

/// The default layouts, exactly as `extract` writes them.
pub fn default_layouts() -> Vec<FileLayout> {
    vec![
        FileLayout::new(OBJECT_FILE_TAG, &OBJECT_COLUMNS),
        FileLayout::new(DATATYPE_FILE_TAG, &DATATYPE_COLUMNS),
    ]
}

pub struct LoadingJob {
    pub name: String,
    pub graph: String,
    pub statements: Vec<LoadStatement>,
}

fn load(file_tag: &'static str, target: LoadTarget, columns: &[&'static str]) -> LoadStatement {
    LoadStatement {
        file_tag,
        target,
        columns: columns.to_vec(),
    }
}

impl LoadingJob {
    /// The job that maps the object and datatype files onto [`VERTICES`] and [`EDGES`].
    pub fn standard(name: &str, graph: &str) -> Self {
        use LoadTarget::{Edge, Vertex};
        let op = OBJECT_FILE_TAG;
        let dp = DATATYPE_FILE_TAG;
        let statements = vec![
            load(op, Edge(HAS_OBJECT_PROPERTY_INSTANCE), &[COL_SUBJECT, COL_STATEMENT_ID]),
            load(op, Edge(HAS_OBJECT_INSTANCE), &[COL_STATEMENT_ID, COL_OBJECT]),
            load(op, Vertex(CLASS_INSTANCE), &[COL_SUBJECT, COL_SUBJECT]),
            load(op, Vertex(OBJECT_PROPERTY_INSTANCE), &[COL_STATEMENT_ID, COL_PREDICATE]),
            load(op, Vertex(CLASS_INSTANCE), &[COL_OBJECT, COL_OBJECT]),
            load(dp, Edge(HAS_DATATYPE_PROPERTY_INSTANCE), &[COL_SUBJECT, COL_STATEMENT_ID]),
            load(dp, Edge(HAS_VALUE_INSTANCE), &[COL_STATEMENT_ID, COL_VALUE_ID]),
            load(dp, Vertex(CLASS_INSTANCE), &[COL_SUBJECT, COL_SUBJECT]),
            load(dp, Vertex(DATATYPE_PROPERTY_INSTANCE), &[COL_STATEMENT_ID, COL_PREDICATE]),
            load(
                dp,
                Vertex(VALUE_INSTANCE),
                &[COL_VALUE_ID, COL_OBJECT, COL_DATATYPE, COL_LANGUAGE],
            ),
        ];
        Self {
            name: name.to_string(),
            graph: graph.to_string(),
            statements,
        }
    }

    /// File tags in first-use order.
    pub fn file_tags(&self) -> Vec<&'static str> {
        let mut tags = Vec::new();
        for st in &self.statements {
            if !tags.contains(&st.file_tag) {
                tags.push(st.file_tag);
            }
        }
        tags
    }

    /// Resolves every statement's column names to positions in `layouts`.
    pub fn resolve(&self, layouts: &[FileLayout]) -> Result<Vec<(LoadStatement, Vec<usize>)>> {
        let mut resolved = Vec::with_capacity(self.statements.len());
        for st in &self.statements {
            let layout = layouts
                .iter()
                .find(|l| l.file_tag == st.file_tag)
                .ok_or_else(|| anyhow!("No file layout declared for tag {}", st.file_tag))?;
            let mut positions = Vec::with_capacity(st.columns.len());
            for col in &st.columns {
                let pos = layout.position(col).ok_or_else(|| {
                    anyhow!(
                        "Column '{}' used by the {} loader is missing from header {:?}",
                        col,
                        st.file_tag,
                        layout.columns
                    )
                })?;
                positions.push(pos);
            }
            resolved.push((st.clone(), positions));
        }
        Ok(resolved)
    }

    /// Checks that a real file header resolves to the same positions as the rendered job.
    pub fn validate_header(&self, file_tag: &'static str, header: &[String]) -> Result<()> {
        let rendered = self.resolve(&default_layouts())?;
        for (st, positions) in rendered.iter().filter(|(st, _)| st.file_tag == file_tag) {
            for (col, pos) in st.columns.iter().zip(positions) {
                match header.get(*pos) {
                    Some(h) if h == col => {}
                    Some(h) => {
                        return Err(anyhow!(
                            "{} column ${} is '{}' in the file but the loading job expects '{}'",
                            file_tag,
                            pos,
                            h,
                            col
                        ))
                    }
                    None => {
                        return Err(anyhow!(
                            "{} loading job references column ${} but the file has {} columns",
                            file_tag,
                            pos,
                            header.len()
                        ))
                    }
                }
            }
        }
        Ok(())
    }

    /// Renders `CREATE LOADING JOB` against the default file layouts.
    pub fn script(&self) -> Result<String> {
        self.script_for(&default_layouts())
    }

    pub fn script_for(&self, layouts: &[FileLayout]) -> Result<String> {
        let script = JobScript {
            job: self,
            resolved: self.resolve(layouts)?,
        };
        Ok(script.to_string())
    }
}

/// A loading job whose columns are already resolved to positions.
struct JobScript<'a> {
    job: &'a LoadingJob,
    resolved: Vec<(LoadStatement, Vec<usize>)>,
}

impl fmt::Display for JobScript<'_> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(f, "USE GRAPH {}", self.job.graph)?;
        writeln!(f)?;
        writeln!(
            f,
            "CREATE LOADING JOB {} FOR GRAPH {} {{",
            self.job.name, self.job.graph
        )?;
        for tag in self.job.file_tags() {
            writeln!(f, "    DEFINE FILENAME {};", tag)?;
        }
        writeln!(f)?;
        for (st, positions) in &self.resolved {
            let values: Vec<String> = positions.iter().map(|p| format!("${}", p)).collect();
            writeln!(
                f,
                "    LOAD {} TO {} VALUES({}) USING SEPARATOR=\",\", HEADER=\"true\", EOL=\"\\n\", QUOTE=\"double\";",
                st.file_tag,
                st.target,
                values.join(", ")
            )?;
        }
        writeln!(f, "}}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_declares_all_types() {
        let script = schema_script("ldbc_spb");
        assert!(script.starts_with("USE GLOBAL\n"));
        assert!(script.contains(
            "CREATE VERTEX ValueInstance (primary_id id STRING, value STRING, datatype STRING, langTag STRING)"
        ));
        assert!(script.contains(
            "CREATE DIRECTED EDGE hasObjectInstance (FROM ObjectPropertyInstance, TO ClassInstance) WITH REVERSE_EDGE=\"reverse_hasObjectInstance\""
        ));
        assert!(script.contains(
            "ALTER VERTEX ValueInstance ADD INDEX ValueInstance_langTag_index ON (langTag);"
        ));
        assert_eq!(script.matches("CREATE VERTEX").count(), 4);
        assert_eq!(script.matches("CREATE DIRECTED EDGE").count(), 4);
        assert!(script.trim_end().ends_with("CREATE GRAPH ldbc_spb(*)"));
    }

    #[test]
    fn schema_display_matches_script() {
        let schema = Schema { graph: "g" };
        assert_eq!(format!("{}", schema), schema_script("g"));
        assert!(schema.to_string().contains("CREATE VERTEX ClassInstance (primary_id id STRING, uri STRING)\n"));
        assert_eq!(LoadTarget::Edge(HAS_VALUE_INSTANCE).to_string(), "EDGE hasValueInstance");
    }

    #[test]
    fn standard_job_matches_positional_layout() {
        let job = LoadingJob::standard("load_data", "ldbc_spb");
        let script = job.script().unwrap();
        assert!(script.contains("CREATE LOADING JOB load_data FOR GRAPH ldbc_spb {"));
        assert!(script.contains("DEFINE FILENAME OP;"));
        assert!(script.contains("DEFINE FILENAME DP;"));
        assert!(script.contains("LOAD OP TO EDGE hasObjectPropertyInstance VALUES($0, $3)"));
        assert!(script.contains("LOAD OP TO EDGE hasObjectInstance VALUES($3, $2)"));
        assert!(script.contains("LOAD OP TO VERTEX ObjectPropertyInstance VALUES($3, $1)"));
        assert!(script.contains("LOAD DP TO EDGE hasValueInstance VALUES($5, $6)"));
        assert!(script.contains("LOAD DP TO VERTEX ValueInstance VALUES($6, $2, $3, $4)"));
        assert!(script.contains("EOL=\"\\n\""));
        assert_eq!(script.matches("    LOAD ").count(), 10);
    }

    #[test]
    fn reordered_columns_change_positions() {
        let job = LoadingJob::standard("load_data", "g");
        let layouts = vec![
            FileLayout::new(OBJECT_FILE_TAG, &["pid", "s", "p", "o"]),
            FileLayout::new(DATATYPE_FILE_TAG, &DATATYPE_COLUMNS),
        ];
        let script = job.script_for(&layouts).unwrap();
        assert!(script.contains("LOAD OP TO EDGE hasObjectPropertyInstance VALUES($1, $0)"));
    }

    #[test]
    fn missing_column_is_an_error() {
        let job = LoadingJob::standard("load_data", "g");
        let layouts = vec![
            FileLayout::new(OBJECT_FILE_TAG, &["s", "p", "o"]),
            FileLayout::new(DATATYPE_FILE_TAG, &DATATYPE_COLUMNS),
        ];
        assert!(job.script_for(&layouts).is_err());
    }

    #[test]
    fn header_validation_detects_drift() {
        let job = LoadingJob::standard("load_data", "g");
        let good: Vec<String> = OBJECT_COLUMNS.iter().map(|c| c.to_string()).collect();
        job.validate_header(OBJECT_FILE_TAG, &good).unwrap();
        let swapped: Vec<String> = ["s", "o", "p", "pid"].iter().map(|c| c.to_string()).collect();
        assert!(job.validate_header(OBJECT_FILE_TAG, &swapped).is_err());
        let short: Vec<String> = ["s", "p", "o"].iter().map(|c| c.to_string()).collect();
        assert!(job.validate_header(OBJECT_FILE_TAG, &short).is_err());
    }
}
