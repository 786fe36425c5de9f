//! Session-scoped event store and the open/close pairing state machines.
//!
//! One `EventRecorder` covers one unit of work (a request, a job run). It
//! is plain mutable state with no intrinsic synchronization: callers that
//! record from multiple threads must serialize access themselves, or give
//! each unit of work its own recorder. Nothing here blocks or fails; a
//! toggle call pattern that does not strictly alternate open/close leaves
//! an OPEN record behind, which the aggregator later excludes from every
//! total.

use std::collections::HashMap;
use std::time::Instant;

use serde::Serialize;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::event::{
    BenchmarkRecord, ErrorNote, LogEntry, LogValue, MemoryKind, MemorySample, QueryKey,
    QueryRecord, SpeedMark,
};
use crate::mem;

pub const DEFAULT_MEMORY_LABEL: &str = "process";
pub const DEFAULT_SPEED_LABEL: &str = "point in time";

#[derive(Debug)]
pub struct EventRecorder {
    started_at: Instant,
    next_sequence: u64,
    logs: Vec<LogEntry>,
    memory: Vec<MemorySample>,
    speed: Vec<SpeedMark>,
    errors: Vec<ErrorNote>,
    open_benchmarks: HashMap<String, BenchmarkRecord>,
    archived_benchmarks: Vec<(Uuid, BenchmarkRecord)>,
    queries: HashMap<QueryKey, Vec<QueryRecord>>,
}

/// Full read-only copy of a recorder's state, taken once at the end of a
/// session and handed to `build_report`. Copying decouples aggregation
/// from any further recording.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub started_at: Instant,
    pub logs: Vec<LogEntry>,
    pub memory: Vec<MemorySample>,
    pub speed: Vec<SpeedMark>,
    pub errors: Vec<ErrorNote>,
    /// Closed benchmarks, each under the opaque key it was archived with.
    pub benchmarks: Vec<(Uuid, BenchmarkRecord)>,
    /// Benchmarks still open at snapshot time, ordered by opening sequence.
    pub open_benchmarks: Vec<BenchmarkRecord>,
    pub queries: HashMap<QueryKey, Vec<QueryRecord>>,
}

impl EventRecorder {
    pub fn new() -> Self {
        Self::with_start(Instant::now())
    }

    /// Starts the session clock at an explicit instant, for callers that
    /// captured it before the recorder existed.
    pub fn with_start(started_at: Instant) -> Self {
        Self {
            started_at,
            next_sequence: 0,
            logs: Vec::new(),
            memory: Vec::new(),
            speed: Vec::new(),
            errors: Vec::new(),
            open_benchmarks: HashMap::new(),
            archived_benchmarks: Vec::new(),
            queries: HashMap::new(),
        }
    }

    pub fn started_at(&self) -> Instant {
        self.started_at
    }

    /// Appends an arbitrary value to the log. Accepts anything convertible
    /// into a `LogValue`; no validation.
    pub fn record_log<V: Into<LogValue>>(&mut self, value: V) {
        let sequence = self.next_seq();
        self.logs.push(LogEntry {
            value: value.into(),
            sequence,
        });
    }

    /// Samples the resident memory of the whole process.
    pub fn record_memory(&mut self, label: Option<&str>) {
        let bytes_used = mem::current_usage().unwrap_or_else(|error| {
            warn!(%error, "process memory probe failed");
            0
        });
        self.push_memory(bytes_used, label, MemoryKind::Process);
    }

    /// Samples the footprint of one value: the byte length of its JSON
    /// encoding. The sample is tagged with the value's type name.
    pub fn record_memory_of<T: Serialize + ?Sized>(&mut self, value: &T, label: Option<&str>) {
        let bytes_used = mem::value_size(value).unwrap_or_else(|error| {
            warn!(%error, "value memory probe failed");
            0
        });
        self.push_memory(bytes_used, label, MemoryKind::Value(std::any::type_name::<T>()));
    }

    /// Appends a point-in-time mark; the aggregator reports it as time
    /// elapsed since the session started.
    pub fn record_speed(&mut self, label: Option<&str>) {
        let sequence = self.next_seq();
        self.speed.push(SpeedMark {
            at: Instant::now(),
            label: label.unwrap_or(DEFAULT_SPEED_LABEL).to_string(),
            sequence,
        });
    }

    /// Appends an error note, capturing the caller's file and line. An
    /// explicit message overrides the error's own.
    #[track_caller]
    pub fn record_error(&mut self, error: &dyn std::error::Error, message: Option<&str>) {
        let location = std::panic::Location::caller();
        let sequence = self.next_seq();
        self.errors.push(ErrorNote {
            message: message.map_or_else(|| error.to_string(), str::to_string),
            file: location.file().to_string(),
            line: location.line(),
            sequence,
        });
    }

    /// Opens a benchmark under `name`, or closes the one already open.
    ///
    /// On close the record moves to the archive under a freshly generated
    /// key, so the name is immediately free for a new open/close cycle
    /// and never collides with the archived record.
    pub fn toggle_benchmark(&mut self, name: &str) {
        if let Some(mut open) = self.open_benchmarks.remove(name) {
            open.ended_at = Some(Instant::now());
            let key = Uuid::new_v4();
            debug!(name, %key, "benchmark closed");
            self.archived_benchmarks.push((key, open));
            return;
        }

        let sequence = self.next_seq();
        debug!(name, "benchmark opened");
        self.open_benchmarks.insert(
            name.to_string(),
            BenchmarkRecord {
                name: name.to_string(),
                started_at: Instant::now(),
                ended_at: None,
                sequence,
            },
        );
    }

    /// Records a query execution, pairing by content hash of the SQL text.
    ///
    /// Instrumented code calls this once before running the query and once
    /// after, with identical text; no handle needs to be threaded through.
    /// If the newest record for this text is still open, this call closes
    /// it (attaching `explain` when provided); otherwise it opens a new
    /// record. The cost of the handle-free contract is that calls per
    /// distinct text must strictly alternate.
    pub fn toggle_query(&mut self, sql: &str, explain: Option<serde_json::Value>) {
        let key = QueryKey::of(sql);
        let now = Instant::now();

        if let Some(open) = self
            .queries
            .get_mut(&key)
            .and_then(|bucket| bucket.last_mut())
            .filter(|record| record.ended_at.is_none())
        {
            open.ended_at = Some(now);
            if explain.is_some() {
                open.explain = explain;
            }
            debug!(hash = key.as_str(), ordinal = open.ordinal, "query closed");
            return;
        }

        let sequence = self.next_seq();
        let bucket = self.queries.entry(key).or_default();
        bucket.push(QueryRecord {
            sql: sql.to_string(),
            started_at: now,
            ended_at: None,
            explain: None,
            ordinal: bucket.len(),
            sequence,
        });
    }

    /// Appends an already-closed query record, for callers that measured
    /// the execution themselves. Bypasses the pairing state machine but
    /// still participates in duplicate and ordinal accounting.
    pub fn record_query_manually(
        &mut self,
        sql: &str,
        explain: Option<serde_json::Value>,
        start: Instant,
        end: Instant,
    ) {
        let sequence = self.next_seq();
        let bucket = self.queries.entry(QueryKey::of(sql)).or_default();
        let ordinal = bucket.len();
        bucket.push(QueryRecord {
            sql: sql.to_string(),
            started_at: start,
            ended_at: Some(end),
            explain,
            ordinal,
            sequence,
        });
    }

    pub fn snapshot(&self) -> Snapshot {
        let mut open: Vec<BenchmarkRecord> = self.open_benchmarks.values().cloned().collect();
        open.sort_by_key(|bench| bench.sequence);

        Snapshot {
            started_at: self.started_at,
            logs: self.logs.clone(),
            memory: self.memory.clone(),
            speed: self.speed.clone(),
            errors: self.errors.clone(),
            benchmarks: self.archived_benchmarks.clone(),
            open_benchmarks: open,
            queries: self.queries.clone(),
        }
    }

    /// Empties the recorder and restarts the session clock, so one
    /// instance can be reused across units of work.
    pub fn clear(&mut self) {
        self.started_at = Instant::now();
        self.next_sequence = 0;
        self.logs.clear();
        self.memory.clear();
        self.speed.clear();
        self.errors.clear();
        self.open_benchmarks.clear();
        self.archived_benchmarks.clear();
        self.queries.clear();
    }

    fn push_memory(&mut self, bytes_used: u64, label: Option<&str>, kind: MemoryKind) {
        let sequence = self.next_seq();
        self.memory.push(MemorySample {
            bytes_used,
            label: label.unwrap_or(DEFAULT_MEMORY_LABEL).to_string(),
            kind,
            sequence,
        });
    }

    fn next_seq(&mut self) -> u64 {
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        sequence
    }
}

impl Default for EventRecorder {
    fn default() -> Self {
        Self::new()
    }
}
