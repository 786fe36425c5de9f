//! quickprof: an in-process instrumentation recorder.
//!
//! Application code appends timestamped events to an [`EventRecorder`]
//! throughout one unit of work (free-form log values, memory samples,
//! speed marks, named benchmarks, SQL query executions); at the end,
//! [`build_report`] folds a snapshot of the recorder into an immutable,
//! fully formatted [`Report`] for a presentation layer to render.
//!
//! # SESSION INVARIANT
//! One recorder per unit of work, created explicitly and passed by
//! reference, never hidden global state. The recorder is read in full
//! exactly once by the aggregator and then discarded or cleared.
//!
//! # FAILURE INVARIANT
//! No recording or aggregation operation fails. Mismatched open/close
//! toggles degrade to records excluded from every total; failing
//! enrichment hooks cost one query its enrichment and nothing else.

pub mod aggregate;
pub mod event;
pub mod format;
pub mod mem;
pub mod recorder;
pub mod report;

// Re-export the session surface for convenient access.
pub use aggregate::{build_report, QueryCallback, ReportConfig, SourceFile};
pub use recorder::{EventRecorder, Snapshot};
pub use report::Report;
