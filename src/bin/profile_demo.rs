//! Records a small sample session and prints the report as pretty JSON.

use std::time::{Duration, Instant};

use quickprof::{build_report, EventRecorder, ReportConfig, SourceFile};
use serde_json::json;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();
    tracing::info!("recording sample session");

    let mut recorder = EventRecorder::new();

    recorder.record_log("session started");
    recorder.record_log(json!({ "user": "demo", "attempt": 1 }));
    recorder.record_memory(None);
    recorder.record_memory_of(&vec![0u8; 4096], Some("scratch buffer"));

    recorder.toggle_benchmark("busy work");
    let mut total = 0u64;
    for i in 0..1_000_000u64 {
        total = total.wrapping_add(i);
    }
    recorder.record_log(total as i64);
    recorder.toggle_benchmark("busy work");

    recorder.record_speed(Some("after busy work"));

    // Paired toggles, the way instrumented database code would call them.
    recorder.toggle_query("SELECT id, name FROM users WHERE active = 1", None);
    std::thread::sleep(Duration::from_millis(3));
    recorder.toggle_query("SELECT id, name FROM users WHERE active = 1", None);

    // A query measured by the caller.
    let start = Instant::now();
    std::thread::sleep(Duration::from_millis(2));
    recorder.record_query_manually("UPDATE users SET seen_at = now()", None, start, Instant::now());

    let config = ReportConfig {
        explain: Some(Box::new(|sql| {
            Ok(Some(json!({ "type": "ALL", "rows": "42", "query": sql })))
        })),
        files: vec![SourceFile {
            name: "src/bin/profile_demo.rs".to_string(),
            bytes: 2048,
        }],
        memory_limit: Some(128 * 1024 * 1024),
        time_limit: Some(Duration::from_secs(30)),
        ..ReportConfig::default()
    };

    let report = build_report(&recorder.snapshot(), recorder.started_at(), &config);
    println!("{}", serde_json::to_string_pretty(&report)?);

    Ok(())
}
