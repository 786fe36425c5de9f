//! The immutable, fully formatted output of aggregation.
//!
//! Every numeric field a human reads is already a string here; this
//! structure is the sole contract with whatever renders it.

use serde::Serialize;

/// One event in the merged, insertion-ordered timeline.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TimelineEntry {
    Log {
        data: String,
    },
    Memory {
        label: String,
        value_kind: String,
        size: String,
    },
    Speed {
        label: String,
        elapsed: String,
    },
    Error {
        message: String,
        file: String,
        line: u32,
    },
    Benchmark {
        name: String,
        duration: String,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct QueryReport {
    pub sql: String,
    pub time: String,
    /// True when the same SQL text was already recorded earlier in the
    /// session.
    pub duplicate: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub explain: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile: Option<serde_json::Value>,
}

/// Totals for one SQL verb bucket. Percentages are shares of the closed
/// query count and of total query time, rounded to two decimals, and 0
/// when there is nothing to divide by.
#[derive(Debug, Clone, Serialize)]
pub struct VerbTotals {
    pub total: usize,
    pub time: String,
    pub percentage: f64,
    pub time_percentage: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct QueryTotals {
    /// Count of closed, timed queries. Open records are not in any total.
    pub total: usize,
    /// Distinct SQL texts recorded more than once, not repeat occurrences.
    pub duplicates: usize,
    pub time: String,
    pub select: VerbTotals,
    pub insert: VerbTotals,
    pub update: VerbTotals,
    pub delete: VerbTotals,
}

#[derive(Debug, Clone, Serialize)]
pub struct MemoryTotals {
    pub used: String,
    pub total: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SpeedTotals {
    pub total: String,
    pub allowed: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct FileReport {
    pub name: String,
    pub bytes: u64,
    pub size: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct FileTotals {
    pub size: String,
    pub largest: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub timeline: Vec<TimelineEntry>,
    pub queries: Vec<QueryReport>,
    pub query_totals: QueryTotals,
    pub memory_totals: MemoryTotals,
    pub speed_totals: SpeedTotals,
    pub files: Vec<FileReport>,
    pub file_totals: FileTotals,
}
