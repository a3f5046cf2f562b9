//! Bulk exports of stored data.
//!
//! Both exports are fully materialized in memory before they are returned,
//! so memory use grows linearly with the amount of stored data.

use crate::blob_store::{BlobRef, BlobStore};
use crate::models::{SensorKind, SensorRecord, VlogRecord};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::io::{Cursor, Write};
use tracing::{debug, instrument, warn};
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

/// Fixed CSV header
pub const CSV_HEADER: [&str; 6] = ["timestamp", "type", "score", "latitude", "longitude", "content"];

/// Attachment filename for the CSV export on a given day
pub fn csv_filename(now: DateTime<Utc>) -> String {
    format!("emogo_data_{}.csv", now.format("%Y%m%d"))
}

/// Attachment filename for the ZIP export on a given day
pub fn zip_filename(now: DateTime<Utc>) -> String {
    format!("emogo_vlogs_{}.zip", now.format("%Y%m%d"))
}

/// Render a content value as a single CSV cell
fn cell(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

/// Flatten one record into a CSV row
fn csv_row(kind: SensorKind, record: &SensorRecord) -> [String; 6] {
    let timestamp = match (&record.server_time, &record.client_timestamp) {
        (Some(server_time), _) => server_time.format("%Y-%m-%d %H:%M:%S").to_string(),
        (None, Some(client)) => client.clone(),
        (None, None) => String::new(),
    };

    let (score, latitude, longitude) = match kind {
        SensorKind::Sentiment => (
            cell(record.field("score").or_else(|| record.field("mood"))),
            String::new(),
            String::new(),
        ),
        SensorKind::Gps => (
            String::new(),
            cell(record.field("lat")),
            cell(record.field("lon")),
        ),
    };

    [
        timestamp,
        kind.label().to_string(),
        score,
        latitude,
        longitude,
        record.content.0.to_string(),
    ]
}

/// Flatten sentiment and GPS readings into one CSV document, sentiments first
pub fn sensors_to_csv(sentiments: &[SensorRecord], gps: &[SensorRecord]) -> Result<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(CSV_HEADER)?;

    let rows = sentiments
        .iter()
        .map(|r| (SensorKind::Sentiment, r))
        .chain(gps.iter().map(|r| (SensorKind::Gps, r)));

    for (kind, record) in rows {
        writer.write_record(csv_row(kind, record))?;
    }

    writer
        .into_inner()
        .map_err(|e| anyhow::anyhow!("Failed to flush CSV export: {}", e.error()))
}

/// Result of assembling the vlog archive
#[derive(Debug)]
pub struct VlogArchive {
    pub bytes: Vec<u8>,
    pub entries: usize,
    pub skipped: usize,
}

/// Fetch every vlog's blob and pack them into a deflate-compressed ZIP.
///
/// A vlog whose blob cannot be fetched is logged and left out. Vlogs that
/// share a filename collapse into one entry holding the later vlog's bytes.
#[instrument(skip_all, fields(vlogs = vlogs.len()))]
pub async fn build_vlog_archive(vlogs: &[VlogRecord], blobs: &dyn BlobStore) -> Result<VlogArchive> {
    let mut entries: Vec<(String, Vec<u8>)> = Vec::with_capacity(vlogs.len());
    let mut skipped = 0;

    for vlog in vlogs {
        let fetched = match BlobRef::parse(&vlog.blob_ref) {
            Ok(blob_ref) => match blobs.get(&blob_ref).await {
                Ok(blob) => blob.into_bytes().await,
                Err(e) => Err(e),
            },
            Err(e) => Err(e),
        };

        let data = match fetched {
            Ok(data) => data,
            Err(e) => {
                warn!(
                    file_id = %vlog.blob_ref,
                    filename = %vlog.filename,
                    error = %e,
                    "Skipping vlog in archive"
                );
                metrics::counter!("emogo.export.zip.skipped").increment(1);
                skipped += 1;
                continue;
            }
        };

        let name = entry_name(vlog);

        match entries.iter_mut().find(|(existing, _)| *existing == name) {
            Some(entry) => {
                debug!(filename = %name, "Overwriting archive entry with later vlog");
                entry.1 = data;
            }
            None => entries.push((name, data)),
        }
    }

    let bytes = write_zip(&entries)?;

    Ok(VlogArchive {
        bytes,
        entries: entries.len(),
        skipped,
    })
}

/// Archive entry name for a vlog: the last path component of its filename,
/// or the blob reference when nothing usable is left.
fn entry_name(vlog: &VlogRecord) -> String {
    let last = vlog
        .filename
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .trim();

    match last {
        "" | "." | ".." => vlog.blob_ref.clone(),
        name => name.to_string(),
    }
}

fn write_zip(entries: &[(String, Vec<u8>)]) -> Result<Vec<u8>> {
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let options = FileOptions::default().compression_method(CompressionMethod::Deflated);

    for (name, data) in entries {
        zip.start_file(name.as_str(), options)
            .with_context(|| format!("Failed to start archive entry {name}"))?;
        zip.write_all(data)
            .with_context(|| format!("Failed to write archive entry {name}"))?;
    }

    let cursor = zip.finish().context("Failed to finish archive")?;
    Ok(cursor.into_inner())
}
