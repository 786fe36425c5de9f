//! The record vocabulary of one profiling session.
//!
//! Every record carries a recorder-wide `sequence` assigned at append
//! time; the aggregator uses it to merge the per-category collections
//! back into one insertion-ordered timeline.

use std::time::{Duration, Instant};

use sha2::{Digest, Sha256};

/// A value logged by application code.
///
/// Closed set of shapes instead of an open dynamic type: scalars render
/// via `Display`, structured values as pretty-printed JSON.
#[derive(Debug, Clone)]
pub enum LogValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Structured(serde_json::Value),
}

impl LogValue {
    pub fn render(&self) -> String {
        match self {
            LogValue::Bool(v) => v.to_string(),
            LogValue::Int(v) => v.to_string(),
            LogValue::Float(v) => v.to_string(),
            LogValue::Text(v) => v.clone(),
            LogValue::Structured(v) => serde_json::to_string_pretty(v).unwrap_or_default(),
        }
    }
}

impl From<bool> for LogValue {
    fn from(v: bool) -> Self {
        LogValue::Bool(v)
    }
}

impl From<i32> for LogValue {
    fn from(v: i32) -> Self {
        LogValue::Int(v.into())
    }
}

impl From<i64> for LogValue {
    fn from(v: i64) -> Self {
        LogValue::Int(v)
    }
}

impl From<u32> for LogValue {
    fn from(v: u32) -> Self {
        LogValue::Int(v.into())
    }
}

impl From<f64> for LogValue {
    fn from(v: f64) -> Self {
        LogValue::Float(v)
    }
}

impl From<&str> for LogValue {
    fn from(v: &str) -> Self {
        LogValue::Text(v.to_string())
    }
}

impl From<String> for LogValue {
    fn from(v: String) -> Self {
        LogValue::Text(v)
    }
}

impl From<serde_json::Value> for LogValue {
    fn from(v: serde_json::Value) -> Self {
        LogValue::Structured(v)
    }
}

#[derive(Debug, Clone)]
pub struct LogEntry {
    pub value: LogValue,
    pub sequence: u64,
}

/// What a memory sample measured.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MemoryKind {
    /// Resident usage of the whole process.
    Process,
    /// Serialized size of a single value; carries the Rust type name.
    Value(&'static str),
}

impl MemoryKind {
    pub fn describe(&self) -> String {
        match self {
            MemoryKind::Process => "whole process".to_string(),
            MemoryKind::Value(type_name) => (*type_name).to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct MemorySample {
    pub bytes_used: u64,
    pub label: String,
    pub kind: MemoryKind,
    pub sequence: u64,
}

#[derive(Debug, Clone)]
pub struct SpeedMark {
    pub at: Instant,
    pub label: String,
    pub sequence: u64,
}

#[derive(Debug, Clone)]
pub struct ErrorNote {
    pub message: String,
    pub file: String,
    pub line: u32,
    pub sequence: u64,
}

/// A named timer. OPEN while `ended_at` is `None`; the recorder archives
/// it under a fresh opaque key on close so the name can be reused.
#[derive(Debug, Clone)]
pub struct BenchmarkRecord {
    pub name: String,
    pub started_at: Instant,
    pub ended_at: Option<Instant>,
    pub sequence: u64,
}

impl BenchmarkRecord {
    pub fn duration(&self) -> Option<Duration> {
        self.ended_at.map(|end| end.duration_since(self.started_at))
    }
}

/// One execution of a SQL statement.
///
/// `ordinal` is the record's position among all records sharing the same
/// content hash; anything past 0 is a repeat of SQL text already seen in
/// this session.
#[derive(Debug, Clone)]
pub struct QueryRecord {
    pub sql: String,
    pub started_at: Instant,
    pub ended_at: Option<Instant>,
    pub explain: Option<serde_json::Value>,
    pub ordinal: usize,
    pub sequence: u64,
}

impl QueryRecord {
    pub fn duration(&self) -> Option<Duration> {
        self.ended_at.map(|end| end.duration_since(self.started_at))
    }
}

/// Content hash correlating repeated executions of textually identical
/// SQL. Hash collisions between different texts are treated as the same
/// query.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueryKey(String);

impl QueryKey {
    pub fn of(sql: &str) -> Self {
        QueryKey(hex::encode(Sha256::digest(sql.as_bytes())))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// The four statement kinds broken out in query totals.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlVerb {
    Select,
    Insert,
    Update,
    Delete,
}

impl SqlVerb {
    pub const ALL: [SqlVerb; 4] = [
        SqlVerb::Select,
        SqlVerb::Insert,
        SqlVerb::Update,
        SqlVerb::Delete,
    ];

    pub fn keyword(self) -> &'static str {
        match self {
            SqlVerb::Select => "select",
            SqlVerb::Insert => "insert",
            SqlVerb::Update => "update",
            SqlVerb::Delete => "delete",
        }
    }

    /// Classifies a statement by its leading keyword, ignoring leading
    /// whitespace and case. Statements starting with anything else
    /// (`begin`, `with`, ...) belong to no bucket.
    pub fn of(sql: &str) -> Option<SqlVerb> {
        let trimmed = sql.trim_start();
        let end = trimmed
            .char_indices()
            .find(|(_, c)| !c.is_ascii_alphabetic())
            .map_or(trimmed.len(), |(i, _)| i);
        let word = &trimmed[..end];

        SqlVerb::ALL
            .into_iter()
            .find(|verb| word.eq_ignore_ascii_case(verb.keyword()))
    }
}
