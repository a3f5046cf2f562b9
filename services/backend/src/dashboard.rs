//! HTML dashboard over the most recent readings and all vlogs.

use crate::models::{SensorRecord, VlogRecord};
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::fmt::Write;

pub const NO_VLOGS: &str = "No vlogs uploaded yet.";
pub const NO_SENTIMENTS: &str = "No sentiments data.";
pub const NO_GPS: &str = "No GPS data.";

const STYLE: &str = r#"
* { box-sizing: border-box; margin: 0; padding: 0; }
body { font-family: -apple-system, "Segoe UI", Roboto, Helvetica, Arial, sans-serif; background: #fafafa; color: #333; line-height: 1.6; padding: 40px 20px; }
.container { max-width: 900px; margin: 0 auto; }
header { display: flex; justify-content: space-between; align-items: center; margin-bottom: 32px; padding-bottom: 16px; border-bottom: 1px solid #e0e0e0; }
h1 { font-size: 24px; font-weight: 700; }
h2 { font-size: 18px; font-weight: 600; margin-bottom: 16px; }
.exports a { margin-left: 8px; }
.card { background: #fff; border: 1px solid #e5e5e5; border-radius: 12px; padding: 24px; margin-bottom: 28px; }
table { width: 100%; border-collapse: collapse; font-size: 14px; }
th { text-align: left; color: #888; font-weight: 500; font-size: 12px; text-transform: uppercase; padding-bottom: 12px; border-bottom: 2px solid #f0f0f0; }
td { padding: 14px 0; border-bottom: 1px solid #f5f5f5; vertical-align: middle; }
td.empty { text-align: center; color: #999; }
td.action { text-align: right; }
.btn { background: #000; color: #fff; text-decoration: none; padding: 8px 16px; border-radius: 6px; font-size: 13px; }
.link-btn { color: #555; text-decoration: none; border: 1px solid #ddd; padding: 6px 12px; border-radius: 6px; font-size: 12px; }
"#;

/// Everything the dashboard shows, newest first
#[derive(Debug, Clone, Default)]
pub struct DashboardData {
    pub vlogs: Vec<VlogRecord>,
    pub sentiments: Vec<SensorRecord>,
    pub gps: Vec<SensorRecord>,
    pub refresh_secs: u64,
}

/// Escape text placed inside an HTML element
fn escape_text(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(c),
        }
    }
    out
}

/// Display time for a sensor reading
fn reading_time(record: &SensorRecord) -> String {
    if let Some(server_time) = record.server_time {
        return server_time.format("%Y-%m-%d %H:%M:%S").to_string();
    }

    match &record.client_timestamp {
        Some(client) => client
            .replace('T', " ")
            .split('.')
            .next()
            .unwrap_or_default()
            .to_string(),
        None => "N/A".to_string(),
    }
}

fn vlog_time(server_time: Option<DateTime<Utc>>) -> String {
    server_time
        .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| "N/A".to_string())
}

/// Coordinate as shown in the table. Missing values count as 0.
fn coordinate(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => format!("{:.5}", 0.0),
        Some(Value::Number(n)) => match n.as_f64() {
            Some(f) => format!("{:.5}", f),
            None => n.to_string(),
        },
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

/// Coordinate exactly as stored, for the map link
fn raw_coordinate(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => "0".to_string(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

fn empty_row(colspan: u8, message: &str) -> String {
    format!("<tr><td colspan=\"{colspan}\" class=\"empty\">{message}</td></tr>\n")
}

fn vlog_rows(vlogs: &[VlogRecord]) -> String {
    if vlogs.is_empty() {
        return empty_row(3, NO_VLOGS);
    }

    let mut rows = String::new();
    for vlog in vlogs {
        let _ = writeln!(
            rows,
            "<tr><td>{}</td><td>{}</td><td class=\"action\"><a href=\"/video/{}\" target=\"_blank\" class=\"btn\">Play / Download</a></td></tr>",
            vlog_time(vlog.server_time),
            escape_text(&vlog.filename),
            vlog.blob_ref,
        );
    }
    rows
}

fn sentiment_rows(sentiments: &[SensorRecord]) -> String {
    if sentiments.is_empty() {
        return empty_row(2, NO_SENTIMENTS);
    }

    let mut rows = String::new();
    for record in sentiments {
        let _ = writeln!(
            rows,
            "<tr><td>{}</td><td>{}</td></tr>",
            reading_time(record),
            escape_text(&record.content.0.to_string()),
        );
    }
    rows
}

fn gps_rows(gps: &[SensorRecord]) -> String {
    if gps.is_empty() {
        return empty_row(3, NO_GPS);
    }

    let mut rows = String::new();
    for record in gps {
        let lat = record.field("lat");
        let lon = record.field("lon");
        let _ = writeln!(
            rows,
            "<tr><td>{}</td><td>{}, {}</td><td class=\"action\"><a href=\"https://www.google.com/maps?q={},{}\" target=\"_blank\" class=\"link-btn\">Map</a></td></tr>",
            reading_time(record),
            coordinate(lat),
            coordinate(lon),
            raw_coordinate(lat),
            raw_coordinate(lon),
        );
    }
    rows
}

/// Render the full dashboard page
pub fn render(data: &DashboardData) -> String {
    format!(
        r#"<!DOCTYPE html>
<html>
<head>
<title>EmoGo Data Center</title>
<meta charset="UTF-8">
<meta name="viewport" content="width=device-width, initial-scale=1.0">
<meta http-equiv="refresh" content="{refresh}">
<style>{style}</style>
</head>
<body>
<div class="container">
<header>
<h1>EmoGo Data Center</h1>
<nav class="exports"><a href="/export_csv" class="link-btn">Export CSV</a><a href="/export_zip" class="link-btn">Export Vlogs (ZIP)</a></nav>
</header>
<div class="card">
<h2>Collected Vlogs</h2>
<table>
<thead><tr><th width="30%">Time</th><th width="40%">Filename</th><th width="30%" style="text-align:right;">Action</th></tr></thead>
<tbody>
{vlogs}</tbody>
</table>
</div>
<div class="card">
<h2>Sentiments Log</h2>
<table>
<thead><tr><th width="30%">Time</th><th>Data Content</th></tr></thead>
<tbody>
{sentiments}</tbody>
</table>
</div>
<div class="card">
<h2>GPS Tracking</h2>
<table>
<thead><tr><th width="30%">Time</th><th width="40%">Coordinates</th><th width="30%" style="text-align:right;">Location</th></tr></thead>
<tbody>
{gps}</tbody>
</table>
</div>
</div>
</body>
</html>
"#,
        refresh = data.refresh_secs,
        style = STYLE,
        vlogs = vlog_rows(&data.vlogs),
        sentiments = sentiment_rows(&data.sentiments),
        gps = gps_rows(&data.gps),
    )
}
