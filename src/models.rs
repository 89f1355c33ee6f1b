//! Core data models shared by the retrieval, generation and execution stages.
//!
//! These types are plain values: segments are replaced wholesale on
//! re-ingestion, query results are produced by exactly one execution, and an
//! [`OrchestratorResult`] is the terminal record of one question.

use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use std::fmt;

/// Domain scope assigned to segments that belong to no configured domain.
pub const DEFAULT_DOMAIN: &str = "default";

/// What a [`SchemaSegment`] describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SegmentKind {
    TableSchema,
    BusinessRules,
}

impl SegmentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SegmentKind::TableSchema => "table_schema",
            SegmentKind::BusinessRules => "business_rules",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "table_schema" => Some(SegmentKind::TableSchema),
            "business_rules" => Some(SegmentKind::BusinessRules),
            _ => None,
        }
    }
}

/// A retrievable unit of schema context.
#[derive(Debug, Clone, PartialEq)]
pub struct SchemaSegment {
    pub id: String,
    pub kind: SegmentKind,
    pub domain: String,
    pub table_name: Option<String>,
    pub text: String,
}

/// A segment returned by a similarity search, with its relevance score.
#[derive(Debug, Clone)]
pub struct SegmentMatch {
    pub segment: SchemaSegment,
    pub score: f64,
}

/// A previously accepted question/SQL pair shown to the model as a demonstration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FewShotExample {
    pub question: String,
    pub sql: String,
}

/// A single nullable value read from the target database.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Scalar {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Null => write!(f, "null"),
            Scalar::Integer(v) => write!(f, "{}", v),
            Scalar::Real(v) => write!(f, "{}", v),
            Scalar::Text(v) => write!(f, "{}", v),
            Scalar::Blob(v) => write!(f, "<{} bytes>", v.len()),
        }
    }
}

/// One result row: column labels mapped to values, in select-list order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    fields: Vec<(String, Scalar)>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, column: impl Into<String>, value: Scalar) {
        self.fields.push((column.into(), value));
    }

    pub fn get(&self, column: &str) -> Option<&Scalar> {
        self.fields
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value)
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(name, _)| name.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Scalar)> {
        self.fields.iter().map(|(name, value)| (name.as_str(), value))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl<K: Into<String>> FromIterator<(K, Scalar)> for Record {
    fn from_iter<I: IntoIterator<Item = (K, Scalar)>>(iter: I) -> Self {
        Self {
            fields: iter.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, (name, value)) in self.fields.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}={}", name, value)?;
        }
        write!(f, "}}")
    }
}

// Serialized as a JSON object preserving column order.
impl Serialize for Record {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for (name, value) in &self.fields {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

/// Rows produced by exactly one execution of a validated statement.
#[derive(Debug, Clone, Default, Serialize)]
pub struct QueryResult {
    pub rows: Vec<Record>,
    /// True when the row cap cut the result short.
    pub truncated: bool,
}

/// How a question's processing ended. Exactly one of answer or error exists.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum Outcome {
    Answered { rows: Vec<Record>, answer: String },
    Failed { error: String },
}

/// Terminal record of a single question's processing.
#[derive(Debug, Clone, Serialize)]
pub struct OrchestratorResult {
    pub question: String,
    /// Last SQL attempted; `None` if generation never produced any.
    pub sql: Option<String>,
    #[serde(flatten)]
    pub outcome: Outcome,
}

impl OrchestratorResult {
    pub fn success(
        question: impl Into<String>,
        sql: impl Into<String>,
        rows: Vec<Record>,
        answer: impl Into<String>,
    ) -> Self {
        Self {
            question: question.into(),
            sql: Some(sql.into()),
            outcome: Outcome::Answered {
                rows,
                answer: answer.into(),
            },
        }
    }

    pub fn failure(question: impl Into<String>, sql: Option<String>, error: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            sql,
            outcome: Outcome::Failed {
                error: error.into(),
            },
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.outcome, Outcome::Answered { .. })
    }

    pub fn answer(&self) -> Option<&str> {
        match &self.outcome {
            Outcome::Answered { answer, .. } => Some(answer),
            Outcome::Failed { .. } => None,
        }
    }

    pub fn rows(&self) -> Option<&[Record]> {
        match &self.outcome {
            Outcome::Answered { rows, .. } => Some(rows),
            Outcome::Failed { .. } => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match &self.outcome {
            Outcome::Answered { .. } => None,
            Outcome::Failed { error } => Some(error),
        }
    }
}
