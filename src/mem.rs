//! Memory probes backing `record_memory` / `record_memory_of`.
//!
//! The probes are fallible internally; the recorder swallows failures
//! with a warning and records zero bytes, so the public recording API
//! never fails.

use std::io;

use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("failed to read /proc/self/status: {0}")]
    Io(#[from] io::Error),
    #[error("{0} not present in /proc/self/status")]
    MissingField(&'static str),
    #[error("malformed {0} line in /proc/self/status")]
    Malformed(&'static str),
    #[error("process memory probing is not supported on this platform")]
    Unsupported,
    #[error("value could not be serialized: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Current resident memory of the process, in bytes.
pub fn current_usage() -> Result<u64, ProbeError> {
    read_status_field("VmRSS")
}

/// Peak resident memory of the process, in bytes.
pub fn peak_usage() -> Result<u64, ProbeError> {
    read_status_field("VmHWM")
}

/// Approximate footprint of a single value: the byte length of its JSON
/// encoding. Stands in for the original deep-copy-and-diff probe without
/// depending on allocator introspection.
pub fn value_size<T: Serialize + ?Sized>(value: &T) -> Result<u64, ProbeError> {
    Ok(serde_json::to_vec(value)?.len() as u64)
}

#[cfg(target_os = "linux")]
fn read_status_field(field: &'static str) -> Result<u64, ProbeError> {
    let status = std::fs::read_to_string("/proc/self/status")?;
    let line = status
        .lines()
        .find(|line| line.starts_with(field))
        .ok_or(ProbeError::MissingField(field))?;

    // Lines look like "VmRSS:     1234 kB".
    let kib: u64 = line
        .split_whitespace()
        .nth(1)
        .and_then(|v| v.parse().ok())
        .ok_or(ProbeError::Malformed(field))?;

    Ok(kib * 1024)
}

#[cfg(not(target_os = "linux"))]
fn read_status_field(_field: &'static str) -> Result<u64, ProbeError> {
    Err(ProbeError::Unsupported)
}
