//! Turns a recorder snapshot into a `Report`.
//!
//! One synchronous pass: no I/O of its own, no failure mode. The only
//! code that can block or fail in here is the caller-supplied explain and
//! profile hooks, and a hook failure costs exactly one query its
//! enrichment.

use std::time::{Duration, Instant};

use serde_json::Value;
use tracing::warn;

use crate::event::{QueryRecord, SqlVerb};
use crate::format::{format_bytes, format_duration};
use crate::mem;
use crate::recorder::Snapshot;
use crate::report::{
    FileReport, FileTotals, MemoryTotals, QueryReport, QueryTotals, Report, SpeedTotals,
    TimelineEntry, VerbTotals,
};

/// Synchronous enrichment hook: SQL text in, structured result out.
/// `Ok(None)` means the hook had nothing to say; errors are caught and
/// downgraded to the same.
pub type QueryCallback = Box<dyn Fn(&str) -> anyhow::Result<Option<Value>>>;

/// A source file reported by the host, merged into the report as-is.
#[derive(Debug, Clone)]
pub struct SourceFile {
    pub name: String,
    pub bytes: u64,
}

/// Inputs the aggregator does not compute itself: enrichment hooks and
/// host-reported environment facts. `Default` is the all-absent config.
#[derive(Default)]
pub struct ReportConfig {
    pub explain: Option<QueryCallback>,
    pub profile: Option<QueryCallback>,
    /// Files loaded by the host, for the report's file section.
    pub files: Vec<SourceFile>,
    /// Configured memory ceiling; rendered as "unlimited" when absent.
    pub memory_limit: Option<u64>,
    /// Configured execution-time ceiling; rendered as "unlimited" when absent.
    pub time_limit: Option<Duration>,
    /// Host-supplied peak memory; when absent the process is probed.
    pub peak_memory: Option<u64>,
}

/// Builds the complete report from one snapshot. `started_at` anchors
/// speed marks and the elapsed-time total.
pub fn build_report(snapshot: &Snapshot, started_at: Instant, config: &ReportConfig) -> Report {
    let (queries, query_totals) = summarize_queries(snapshot, config);
    let (files, file_totals) = summarize_files(&config.files);

    let peak = match config.peak_memory {
        Some(bytes) => bytes,
        None => mem::peak_usage().unwrap_or_else(|error| {
            warn!(%error, "peak memory probe failed");
            0
        }),
    };

    Report {
        timeline: build_timeline(snapshot, started_at),
        queries,
        query_totals,
        memory_totals: MemoryTotals {
            used: format_bytes(peak),
            total: config
                .memory_limit
                .map_or_else(|| "unlimited".to_string(), format_bytes),
        },
        speed_totals: SpeedTotals {
            total: format_duration(millis(started_at.elapsed())),
            allowed: config
                .time_limit
                .map_or_else(|| "unlimited".to_string(), |limit| format_duration(millis(limit))),
        },
        files,
        file_totals,
    }
}

/// Merges logs, memory samples, speed marks, errors, and closed
/// benchmarks into one sequence ordered by insertion. Benchmarks sort by
/// their opening sequence; benchmarks never closed are left out.
fn build_timeline(snapshot: &Snapshot, started_at: Instant) -> Vec<TimelineEntry> {
    let mut entries: Vec<(u64, TimelineEntry)> = Vec::new();

    for log in &snapshot.logs {
        entries.push((
            log.sequence,
            TimelineEntry::Log {
                data: log.value.render(),
            },
        ));
    }

    for sample in &snapshot.memory {
        entries.push((
            sample.sequence,
            TimelineEntry::Memory {
                label: sample.label.clone(),
                value_kind: sample.kind.describe(),
                size: format_bytes(sample.bytes_used),
            },
        ));
    }

    for mark in &snapshot.speed {
        let elapsed = mark.at.saturating_duration_since(started_at);
        entries.push((
            mark.sequence,
            TimelineEntry::Speed {
                label: mark.label.clone(),
                elapsed: format_duration(millis(elapsed)),
            },
        ));
    }

    for note in &snapshot.errors {
        entries.push((
            note.sequence,
            TimelineEntry::Error {
                message: note.message.clone(),
                file: note.file.clone(),
                line: note.line,
            },
        ));
    }

    for (_, bench) in &snapshot.benchmarks {
        if let Some(duration) = bench.duration() {
            entries.push((
                bench.sequence,
                TimelineEntry::Benchmark {
                    name: bench.name.clone(),
                    duration: format_duration(millis(duration)),
                },
            ));
        }
    }

    entries.sort_by_key(|(sequence, _)| *sequence);
    entries.into_iter().map(|(_, entry)| entry).collect()
}

fn summarize_queries(snapshot: &Snapshot, config: &ReportConfig) -> (Vec<QueryReport>, QueryTotals) {
    let mut duplicates = 0;
    let mut closed: Vec<&QueryRecord> = Vec::new();
    for bucket in snapshot.queries.values() {
        // One per repeated text, however many times it repeated.
        if bucket.len() > 1 {
            duplicates += 1;
        }
        closed.extend(bucket.iter().filter(|record| record.ended_at.is_some()));
    }
    closed.sort_by_key(|record| record.sequence);

    let mut queries = Vec::with_capacity(closed.len());
    let mut total_time = Duration::ZERO;
    let mut verb_count = [0usize; 4];
    let mut verb_time = [Duration::ZERO; 4];

    for record in &closed {
        let Some(duration) = record.duration() else {
            continue;
        };
        total_time += duration;

        let verb = SqlVerb::of(&record.sql);
        if let Some(verb) = verb {
            verb_count[verb as usize] += 1;
            verb_time[verb as usize] += duration;
        }

        let mut explain = record.explain.clone();
        if explain.is_none() && verb.is_some() {
            if let Some(hook) = &config.explain {
                explain = invoke(hook, &record.sql, "explain");
            }
        }
        let profile = config
            .profile
            .as_ref()
            .and_then(|hook| invoke(hook, &record.sql, "profile"));

        queries.push(QueryReport {
            sql: record.sql.clone(),
            time: format_duration(millis(duration)),
            duplicate: record.ordinal > 0,
            explain,
            profile,
        });
    }

    let bucket = |verb: SqlVerb| {
        verb_totals(
            verb_count[verb as usize],
            verb_time[verb as usize],
            queries.len(),
            total_time,
        )
    };
    let totals = QueryTotals {
        total: queries.len(),
        duplicates,
        time: format_duration(millis(total_time)),
        select: bucket(SqlVerb::Select),
        insert: bucket(SqlVerb::Insert),
        update: bucket(SqlVerb::Update),
        delete: bucket(SqlVerb::Delete),
    };

    (queries, totals)
}

fn verb_totals(count: usize, time: Duration, closed_total: usize, total_time: Duration) -> VerbTotals {
    let percentage = if closed_total == 0 {
        0.0
    } else {
        round2(count as f64 / closed_total as f64 * 100.0)
    };
    let time_percentage = if total_time.is_zero() {
        0.0
    } else {
        round2(millis(time) / millis(total_time) * 100.0)
    };

    VerbTotals {
        total: count,
        time: format_duration(millis(time)),
        percentage,
        time_percentage,
    }
}

fn summarize_files(files: &[SourceFile]) -> (Vec<FileReport>, FileTotals) {
    let reports: Vec<FileReport> = files
        .iter()
        .map(|file| FileReport {
            name: file.name.clone(),
            bytes: file.bytes,
            size: format_bytes(file.bytes),
        })
        .collect();

    let total: u64 = reports.iter().map(|file| file.bytes).sum();
    let largest = reports.iter().map(|file| file.bytes).max().unwrap_or(0);

    (
        reports,
        FileTotals {
            size: format_bytes(total),
            largest: format_bytes(largest),
        },
    )
}

fn invoke(hook: &QueryCallback, sql: &str, kind: &str) -> Option<Value> {
    match hook(sql) {
        Ok(result) => result,
        Err(error) => {
            warn!(%error, hook = kind, "query enrichment hook failed");
            None
        }
    }
}

fn millis(duration: Duration) -> f64 {
    duration.as_secs_f64() * 1000.0
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
