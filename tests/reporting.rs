use std::cell::Cell;
use std::rc::Rc;
use std::time::{Duration, Instant};

use quickprof::report::TimelineEntry;
use quickprof::{build_report, EventRecorder, ReportConfig, SourceFile};
use serde_json::json;

fn report_for(recorder: &EventRecorder, config: &ReportConfig) -> quickprof::Report {
    build_report(&recorder.snapshot(), recorder.started_at(), config)
}

#[test]
fn test_end_to_end_session() {
    let mut recorder = EventRecorder::new();

    // 1. One of everything: a log value, a memory sample, a speed mark,
    //    and one fully paired update query taking 10 ms.
    recorder.record_log(42);
    recorder.record_memory(None);
    recorder.record_speed(None);
    let start = Instant::now();
    recorder.record_query_manually("update t set a=1", None, start, start + Duration::from_millis(10));

    let report = report_for(&recorder, &ReportConfig::default());

    // 2. The log value renders as plain text at the head of the timeline.
    assert!(
        matches!(&report.timeline[0], TimelineEntry::Log { data } if data == "42"),
        "Expected log entry '42' first, got {:?}",
        report.timeline[0]
    );
    assert_eq!(report.timeline.len(), 3);

    // 3. The single update owns the whole query section.
    assert_eq!(report.query_totals.total, 1);
    assert_eq!(report.query_totals.update.total, 1);
    assert_eq!(report.query_totals.update.percentage, 100.0);
    assert_eq!(report.query_totals.update.time_percentage, 100.0);
    assert_eq!(report.query_totals.update.time, "10.000 ms");
    assert_eq!(report.queries[0].time, "10.000 ms");
    assert!(!report.queries[0].duplicate);
}

#[test]
fn test_verb_buckets_and_percentages() {
    let mut recorder = EventRecorder::new();
    let start = Instant::now();
    let mut run = |sql: &str, ms: u64| {
        recorder.record_query_manually(sql, None, start, start + Duration::from_millis(ms));
    };

    run("SELECT a FROM t", 10);
    run("select b from t", 30);
    run("UPDATE t SET a=1", 10);
    run("begin", 50); // No known verb: counts toward totals, no bucket.

    let report = report_for(&recorder, &ReportConfig::default());
    let totals = &report.query_totals;

    assert_eq!(totals.total, 4);
    assert_eq!(totals.time, "100.000 ms");

    assert_eq!(totals.select.total, 2);
    assert_eq!(totals.select.percentage, 50.0);
    assert_eq!(totals.select.time, "40.000 ms");
    assert_eq!(totals.select.time_percentage, 40.0);

    assert_eq!(totals.update.total, 1);
    assert_eq!(totals.update.percentage, 25.0);
    assert_eq!(totals.update.time_percentage, 10.0);

    assert_eq!(totals.insert.total, 0);
    assert_eq!(totals.delete.total, 0);
    assert_eq!(totals.delete.percentage, 0.0);

    // Bucket counts never exceed the closed total, and every percentage
    // stays inside [0, 100].
    let buckets = [&totals.select, &totals.insert, &totals.update, &totals.delete];
    let bucket_sum: usize = buckets.iter().map(|b| b.total).sum();
    assert!(bucket_sum <= totals.total);
    for bucket in buckets {
        assert!((0.0..=100.0).contains(&bucket.percentage));
        assert!((0.0..=100.0).contains(&bucket.time_percentage));
    }
}

#[test]
fn test_unterminated_records_are_excluded_everywhere() {
    let mut recorder = EventRecorder::new();

    recorder.toggle_benchmark("never closed");
    recorder.toggle_query("SELECT 1", None);

    let report = report_for(&recorder, &ReportConfig::default());

    assert!(report.queries.is_empty(), "Open query must not be reported");
    assert_eq!(report.query_totals.total, 0);
    assert_eq!(report.query_totals.time, "0.000 ms");
    assert_eq!(report.query_totals.select.percentage, 0.0, "No division-by-zero fallout");
    assert!(
        !report
            .timeline
            .iter()
            .any(|entry| matches!(entry, TimelineEntry::Benchmark { .. })),
        "Open benchmark must not reach the timeline"
    );
}

#[test]
fn test_duplicate_counter_counts_distinct_repeats_once() {
    let mut recorder = EventRecorder::new();
    let start = Instant::now();
    let end = start + Duration::from_millis(1);

    // The same text three times, another text once.
    recorder.record_query_manually("SELECT 1", None, start, end);
    recorder.record_query_manually("SELECT 1", None, start, end);
    recorder.record_query_manually("SELECT 1", None, start, end);
    recorder.record_query_manually("SELECT 2", None, start, end);

    let report = report_for(&recorder, &ReportConfig::default());

    assert_eq!(report.query_totals.duplicates, 1, "One distinct repeated text");
    assert_eq!(report.query_totals.total, 4);
    let duplicate_flags: Vec<bool> = report.queries.iter().map(|q| q.duplicate).collect();
    assert_eq!(duplicate_flags.iter().filter(|&&d| d).count(), 2, "Second and third occurrence");
}

#[test]
fn test_explain_hook_only_runs_for_eligible_queries() {
    let mut recorder = EventRecorder::new();
    let start = Instant::now();
    let end = start + Duration::from_millis(1);

    recorder.record_query_manually("SELECT 1", None, start, end);
    recorder.record_query_manually("begin", None, start, end);
    recorder.record_query_manually("  delete from t", Some(json!({ "key": "pk" })), start, end);

    let calls = Rc::new(Cell::new(0));
    let seen = calls.clone();
    let config = ReportConfig {
        explain: Some(Box::new(move |_sql| {
            seen.set(seen.get() + 1);
            Ok(Some(json!({ "rows": "1" })))
        })),
        ..ReportConfig::default()
    };

    let report = report_for(&recorder, &config);

    // Only the select qualifies: "begin" has no known verb, the delete
    // already carries an explain result.
    assert_eq!(calls.get(), 1);
    assert_eq!(report.queries[0].explain, Some(json!({ "rows": "1" })));
    assert_eq!(report.queries[1].explain, None);
    assert_eq!(report.queries[2].explain, Some(json!({ "key": "pk" })));
}

#[test]
fn test_profile_hook_runs_for_every_closed_query() {
    let mut recorder = EventRecorder::new();
    let start = Instant::now();
    let end = start + Duration::from_millis(1);

    recorder.record_query_manually("SELECT 1", None, start, end);
    recorder.record_query_manually("begin", None, start, end);
    recorder.toggle_query("SELECT 2", None); // Left open, never profiled.

    let calls = Rc::new(Cell::new(0));
    let seen = calls.clone();
    let config = ReportConfig {
        profile: Some(Box::new(move |_sql| {
            seen.set(seen.get() + 1);
            Ok(Some(json!([{ "status": "executing", "duration": 0.001 }])))
        })),
        ..ReportConfig::default()
    };

    let report = report_for(&recorder, &config);

    assert_eq!(calls.get(), 2, "Profile runs unconditionally, but only for closed records");
    assert!(report.queries.iter().all(|q| q.profile.is_some()));
}

#[test]
fn test_failing_hook_costs_one_query_its_enrichment() {
    let mut recorder = EventRecorder::new();
    let start = Instant::now();
    let end = start + Duration::from_millis(1);

    recorder.record_query_manually("SELECT 1", None, start, end);
    recorder.record_query_manually("SELECT 2", None, start, end);

    let config = ReportConfig {
        explain: Some(Box::new(|sql| {
            if sql.ends_with('1') {
                anyhow::bail!("connection lost");
            }
            Ok(Some(json!({ "rows": "7" })))
        })),
        ..ReportConfig::default()
    };

    let report = report_for(&recorder, &config);

    assert_eq!(report.queries.len(), 2, "Aggregation continues past the failure");
    assert_eq!(report.queries[0].explain, None);
    assert_eq!(report.queries[1].explain, Some(json!({ "rows": "7" })));
    assert_eq!(report.query_totals.total, 2);
}

#[test]
fn test_timeline_merges_categories_in_insertion_order() {
    let mut recorder = EventRecorder::new();

    recorder.record_log("first");
    recorder.toggle_benchmark("step");
    recorder.record_speed(Some("mid"));
    recorder.toggle_benchmark("step");
    recorder.record_log(json!({ "nested": true }));
    let failure = std::io::Error::new(std::io::ErrorKind::Other, "late failure");
    recorder.record_error(&failure, None);

    let report = report_for(&recorder, &ReportConfig::default());

    let kinds: Vec<&str> = report
        .timeline
        .iter()
        .map(|entry| match entry {
            TimelineEntry::Log { .. } => "log",
            TimelineEntry::Memory { .. } => "memory",
            TimelineEntry::Speed { .. } => "speed",
            TimelineEntry::Error { .. } => "error",
            TimelineEntry::Benchmark { .. } => "benchmark",
        })
        .collect();

    // The benchmark slots in where it was opened.
    assert_eq!(kinds, vec!["log", "benchmark", "speed", "log", "error"]);

    match &report.timeline[3] {
        TimelineEntry::Log { data } => {
            assert!(data.contains("\"nested\": true"), "Structured values pretty-print, got {data}");
        }
        other => panic!("expected a log entry, got {other:?}"),
    }
}

#[test]
fn test_memory_sample_and_kind_reach_the_timeline() {
    let mut recorder = EventRecorder::new();

    recorder.record_memory(None);
    recorder.record_memory_of(&vec![1u8, 2, 3], Some("payload"));

    let report = report_for(&recorder, &ReportConfig::default());

    match &report.timeline[0] {
        TimelineEntry::Memory { label, value_kind, size } => {
            assert_eq!(label, "process");
            assert_eq!(value_kind, "whole process");
            assert!(size.ends_with("bytes") || size.ends_with('B'), "formatted size, got {size}");
        }
        other => panic!("expected a memory entry, got {other:?}"),
    }

    match &report.timeline[1] {
        TimelineEntry::Memory { label, value_kind, size } => {
            assert_eq!(label, "payload");
            assert!(value_kind.contains("Vec"), "type name of the sampled value, got {value_kind}");
            // JSON encoding of [1,2,3] is 7 bytes.
            assert_eq!(size, "7 bytes");
        }
        other => panic!("expected a memory entry, got {other:?}"),
    }
}

#[test]
fn test_host_supplied_sections() {
    let recorder = EventRecorder::new();
    let config = ReportConfig {
        files: vec![
            SourceFile { name: "src/lib.rs".to_string(), bytes: 1024 },
            SourceFile { name: "src/main.rs".to_string(), bytes: 512 },
        ],
        memory_limit: Some(128 * 1024 * 1024),
        time_limit: Some(Duration::from_secs(30)),
        peak_memory: Some(2048),
        ..ReportConfig::default()
    };

    let report = report_for(&recorder, &config);

    assert_eq!(report.files.len(), 2);
    assert_eq!(report.files[0].size, "1.00 kB");
    assert_eq!(report.file_totals.size, "1.50 kB");
    assert_eq!(report.file_totals.largest, "1.00 kB");
    assert_eq!(report.memory_totals.used, "2.00 kB");
    assert_eq!(report.memory_totals.total, "128.00 MB");
    assert_eq!(report.speed_totals.allowed, "30.000 s");
}

#[test]
fn test_absent_limits_render_as_unlimited() {
    let recorder = EventRecorder::new();
    let report = report_for(&recorder, &ReportConfig::default());

    assert_eq!(report.memory_totals.total, "unlimited");
    assert_eq!(report.speed_totals.allowed, "unlimited");
    assert_eq!(report.file_totals.size, "0 bytes");
    assert_eq!(report.file_totals.largest, "0 bytes");
    assert!(report.speed_totals.total.ends_with("ms"), "Fresh session elapsed stays in ms");
}

#[test]
fn test_report_serializes_to_json() {
    let mut recorder = EventRecorder::new();
    recorder.record_log(42);
    let start = Instant::now();
    recorder.record_query_manually("SELECT 1", None, start, start + Duration::from_millis(1));

    let report = report_for(&recorder, &ReportConfig::default());
    let value = serde_json::to_value(&report).expect("report must serialize");

    assert!(value.get("timeline").is_some());
    assert!(value.get("query_totals").is_some());
    assert_eq!(value["query_totals"]["select"]["total"], json!(1));
    // Absent enrichment is omitted, not null.
    assert!(value["queries"][0].get("explain").is_none());
}
