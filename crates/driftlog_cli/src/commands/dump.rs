//! Dump command implementation.

use driftlog_core::{Config, Log};
use serde::Serialize;
use std::path::Path;

/// Record representation for output.
#[derive(Debug, Serialize)]
pub struct RecordInfo {
    /// Offset in the log.
    pub offset: u64,
    /// Payload size in bytes.
    pub size: usize,
    /// Payload, lossily decoded as UTF-8.
    pub value: String,
}

/// Runs the dump command.
pub fn run(
    path: &Path,
    config: Config,
    start_offset: u64,
    limit: Option<usize>,
    format: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    if !path.is_dir() {
        return Err(format!("No log found at {}", path.display()).into());
    }

    let log = Log::open(path, config)?;
    let records = read_records(&log, start_offset, limit);
    log.close()?;
    let records = records?;

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&records)?);
        }
        _ => {
            for record in &records {
                println!("{:>8}  {:>6} bytes  {}", record.offset, record.size, record.value);
            }
            println!();
            println!("{} records", records.len());
        }
    }

    Ok(())
}

/// Reads up to `limit` records starting at `start_offset`.
pub fn read_records(
    log: &Log,
    start_offset: u64,
    limit: Option<usize>,
) -> Result<Vec<RecordInfo>, Box<dyn std::error::Error>> {
    let max_records = limit.unwrap_or(usize::MAX);
    let mut records = Vec::new();

    'segments: for segment in log.segments() {
        for offset in segment.base_offset.max(start_offset)..segment.next_offset {
            if records.len() >= max_records {
                break 'segments;
            }
            let record = log.read(offset)?;
            records.push(RecordInfo {
                offset: record.offset,
                size: record.value.len(),
                value: String::from_utf8_lossy(&record.value).into_owned(),
            });
        }
    }

    Ok(records)
}
