//! Flow record ingestion
//!
//! Reads delimited flow logs (one record per line, header first) into
//! [`FlowRecord`]s. Columns are located by header name so extra columns and
//! arbitrary column order are accepted.

pub mod aggregate;

pub use aggregate::{realign, EntityAggregates};

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{LookOutError, Result};

/// A single directed interaction between two entities
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowRecord {
    pub source: String,
    pub destination: String,
    /// Seconds since an arbitrary epoch
    pub timestamp: f64,
}

impl FlowRecord {
    pub fn new(source: impl Into<String>, destination: impl Into<String>, timestamp: f64) -> Self {
        Self {
            source: source.into(),
            destination: destination.into(),
            timestamp,
        }
    }
}

/// Input layout of the flow log
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    /// Field delimiter
    pub delimiter: char,
    pub source_column: String,
    pub destination_column: String,
    pub timestamp_column: String,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            delimiter: ',',
            source_column: "SOURCE".to_string(),
            destination_column: "DESTINATION".to_string(),
            timestamp_column: "TIMESTAMP".to_string(),
        }
    }
}

/// Read all flow records from a file
pub fn read_flows<P: AsRef<Path>>(path: P, config: &IngestConfig) -> Result<Vec<FlowRecord>> {
    let file = File::open(&path)?;
    debug!("Reading flows from {}", path.as_ref().display());
    parse_flows(BufReader::new(file), config)
}

/// Parse flow records from any buffered reader
pub fn parse_flows<R: BufRead>(reader: R, config: &IngestConfig) -> Result<Vec<FlowRecord>> {
    let mut lines = reader.lines();

    let header = match lines.next() {
        Some(line) => line?,
        None => return Err(LookOutError::Ingest("input is empty".to_string())),
    };

    let header_map: HashMap<String, usize> = split_fields(&header, config.delimiter)
        .enumerate()
        .map(|(idx, name)| (name.to_uppercase(), idx))
        .collect();

    let column = |name: &str| -> Result<usize> {
        header_map
            .get(&name.to_uppercase())
            .copied()
            .ok_or_else(|| LookOutError::Ingest(format!("missing required column: {}", name)))
    };

    let src_idx = column(&config.source_column)?;
    let dst_idx = column(&config.destination_column)?;
    let ts_idx = column(&config.timestamp_column)?;

    let mut records = Vec::new();
    let mut skipped = 0usize;

    for line in lines {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }

        let fields: Vec<&str> = split_fields(&line, config.delimiter).collect();
        let get = |idx: usize| fields.get(idx).copied().filter(|f| !f.is_empty());

        let parsed = (|| {
            let source = get(src_idx)?.to_string();
            let destination = get(dst_idx)?.to_string();
            let timestamp: f64 = get(ts_idx)?.parse().ok()?;
            if !timestamp.is_finite() {
                return None;
            }
            Some(FlowRecord {
                source,
                destination,
                timestamp,
            })
        })();

        match parsed {
            Some(record) => records.push(record),
            None => skipped += 1,
        }
    }

    if skipped > 0 {
        warn!("Skipped {} malformed flow records", skipped);
    }
    debug!("Parsed {} flow records", records.len());

    Ok(records)
}

fn split_fields(line: &str, delimiter: char) -> impl Iterator<Item = &str> {
    line.split(delimiter)
        .map(|f| f.trim().trim_matches('"'))
}
