//! Inspect command implementation.

use driftlog_core::{Config, Log, SegmentInfo};
use serde::Serialize;
use std::path::Path;

/// Log inspection result.
#[derive(Debug, Serialize)]
pub struct InspectResult {
    /// Log directory.
    pub path: String,
    /// Base offset of the oldest segment.
    pub lowest_offset: u64,
    /// Offset of the newest record.
    pub highest_offset: u64,
    /// Number of stored records.
    pub record_count: u64,
    /// Store bytes across all segments.
    pub store_bytes: u64,
    /// Per-segment details.
    pub segments: Vec<SegmentStats>,
}

/// Statistics for a single segment.
#[derive(Debug, Serialize)]
pub struct SegmentStats {
    /// First offset of the segment.
    pub base_offset: u64,
    /// Offset the next append would receive.
    pub next_offset: u64,
    /// Number of records.
    pub records: u64,
    /// Store size in bytes.
    pub store_bytes: u64,
    /// Used index bytes.
    pub index_bytes: u64,
}

impl From<SegmentInfo> for SegmentStats {
    fn from(info: SegmentInfo) -> Self {
        Self {
            base_offset: info.base_offset,
            next_offset: info.next_offset,
            records: info.next_offset - info.base_offset,
            store_bytes: info.store_bytes,
            index_bytes: info.index_bytes,
        }
    }
}

/// Runs the inspect command.
pub fn run(path: &Path, config: Config, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let result = inspect(path, config)?;

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        _ => {
            print_text_output(&result);
        }
    }

    Ok(())
}

/// Collects segment statistics for the log in `path`.
pub fn inspect(path: &Path, config: Config) -> Result<InspectResult, Box<dyn std::error::Error>> {
    if !path.is_dir() {
        return Err(format!("No log found at {}", path.display()).into());
    }

    let log = Log::open(path, config)?;
    let segments: Vec<SegmentStats> = log.segments().into_iter().map(Into::into).collect();
    let result = InspectResult {
        path: path.display().to_string(),
        lowest_offset: log.lowest_offset()?,
        highest_offset: log.highest_offset()?,
        record_count: segments.iter().map(|s| s.records).sum(),
        store_bytes: segments.iter().map(|s| s.store_bytes).sum(),
        segments,
    };
    log.close()?;

    Ok(result)
}

fn print_text_output(result: &InspectResult) {
    println!("driftlog Inspection");
    println!("===================");
    println!();
    println!("Path: {}", result.path);
    println!();
    println!("Offsets:");
    println!("  Lowest:  {}", result.lowest_offset);
    println!("  Highest: {}", result.highest_offset);
    println!("  Records: {}", result.record_count);
    println!();
    println!("Storage:");
    println!("  Store size: {}", format_size(result.store_bytes));
    println!();
    println!("Segments:");
    for segment in &result.segments {
        println!(
            "  [{}..{}) {} records, store {}, index {}",
            segment.base_offset,
            segment.next_offset,
            segment.records,
            format_size(segment.store_bytes),
            format_size(segment.index_bytes)
        );
    }
}

fn format_size(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{bytes} bytes")
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}
