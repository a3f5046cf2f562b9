use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sqlx::types::Json;
use sqlx::FromRow;

/// Which sensor collection a reading is filed under
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SensorKind {
    Gps,
    Sentiment,
}

impl SensorKind {
    /// Pick the collection for a submitted `type` value.
    ///
    /// Only an exact `"gps"` lands in the GPS collection. Everything else,
    /// typos included, is filed under sentiments.
    pub fn classify(submitted: &str) -> Self {
        if submitted == "gps" {
            SensorKind::Gps
        } else {
            SensorKind::Sentiment
        }
    }

    /// Collection (table) name in the record store
    pub fn collection(&self) -> &'static str {
        match self {
            SensorKind::Gps => "gps",
            SensorKind::Sentiment => "sentiments",
        }
    }

    /// Label used in exports
    pub fn label(&self) -> &'static str {
        match self {
            SensorKind::Gps => "gps",
            SensorKind::Sentiment => "sentiment",
        }
    }
}

/// Sensor reading as posted by the client
#[derive(Debug, Clone, Deserialize)]
pub struct IngestPayload {
    #[serde(rename = "type")]
    pub kind: String,
    pub content: Map<String, Value>,
    pub timestamp: String,
}

/// Sensor reading ready to be written, stamped with server time
#[derive(Debug, Clone, PartialEq)]
pub struct NewSensorRecord {
    pub kind: String,
    pub content: Map<String, Value>,
    pub client_timestamp: String,
    pub server_time: DateTime<Utc>,
}

impl NewSensorRecord {
    pub fn stamp(payload: IngestPayload, server_time: DateTime<Utc>) -> Self {
        Self {
            kind: payload.kind,
            content: payload.content,
            client_timestamp: payload.timestamp,
            server_time,
        }
    }
}

/// Stored sensor reading.
///
/// Rows may have been written by older clients or by hand, so everything
/// except the submitted type is treated as optional at read time.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct SensorRecord {
    #[serde(rename = "type")]
    #[sqlx(rename = "type")]
    pub kind: String,
    pub content: Json<Value>,
    pub client_timestamp: Option<String>,
    pub server_time: Option<DateTime<Utc>>,
}

impl SensorRecord {
    /// Look up a top-level content field, if content is a map at all
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.content.0.as_object().and_then(|map| map.get(name))
    }
}

impl From<NewSensorRecord> for SensorRecord {
    fn from(record: NewSensorRecord) -> Self {
        Self {
            kind: record.kind,
            content: Json(Value::Object(record.content)),
            client_timestamp: Some(record.client_timestamp),
            server_time: Some(record.server_time),
        }
    }
}

/// Vlog metadata ready to be written
#[derive(Debug, Clone, PartialEq)]
pub struct NewVlogRecord {
    pub filename: String,
    pub blob_ref: String,
    pub description: String,
    pub server_time: DateTime<Utc>,
}

/// Stored vlog metadata; the bytes live in the blob store under `blob_ref`
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct VlogRecord {
    pub filename: String,
    #[serde(rename = "file_id")]
    #[sqlx(rename = "file_id")]
    pub blob_ref: String,
    pub description: Option<String>,
    pub server_time: Option<DateTime<Utc>>,
}

impl From<NewVlogRecord> for VlogRecord {
    fn from(record: NewVlogRecord) -> Self {
        Self {
            filename: record.filename,
            blob_ref: record.blob_ref,
            description: Some(record.description),
            server_time: Some(record.server_time),
        }
    }
}

/// Read options for record listings
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecordQuery {
    /// Maximum number of results (None = all)
    pub limit: Option<i64>,
    /// Order by server time (true = oldest first, false = newest first)
    pub ascending: bool,
}

impl RecordQuery {
    pub fn newest(limit: i64) -> Self {
        Self {
            limit: Some(limit),
            ascending: false,
        }
    }

    pub fn all_newest_first() -> Self {
        Self::default()
    }

    pub fn all_oldest_first() -> Self {
        Self {
            limit: None,
            ascending: true,
        }
    }
}
