//! In-memory stand-ins for the record and blob stores.

#![allow(dead_code)]

use anyhow::Result;
use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Request, Response};
use axum::Router;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use emogo_backend::config::{ApiConfig, DashboardConfig};
use emogo_backend::{
    create_router, AppState, Blob, BlobError, BlobRef, BlobStore, BlobUpload, ByteChunks,
    NewSensorRecord, NewVlogRecord, RecordQuery, RecordStore, SensorKind, SensorRecord,
    VlogRecord,
};
use futures::{stream, StreamExt, TryStreamExt};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tower::ServiceExt;

#[derive(Default)]
pub struct MemoryRecordStore {
    sensors: Mutex<HashMap<SensorKind, Vec<SensorRecord>>>,
    vlogs: Mutex<Vec<VlogRecord>>,
}

impl MemoryRecordStore {
    pub fn sensors(&self, kind: SensorKind) -> Vec<SensorRecord> {
        self.sensors
            .lock()
            .unwrap()
            .get(&kind)
            .cloned()
            .unwrap_or_default()
    }

    pub fn vlogs(&self) -> Vec<VlogRecord> {
        self.vlogs.lock().unwrap().clone()
    }

    pub fn push_sensor(&self, kind: SensorKind, record: SensorRecord) {
        self.sensors
            .lock()
            .unwrap()
            .entry(kind)
            .or_default()
            .push(record);
    }

    pub fn push_vlog(&self, record: VlogRecord) {
        self.vlogs.lock().unwrap().push(record);
    }
}

/// Stable sort by server time, then apply direction and limit the way the
/// PostgreSQL store does
fn ordered<T>(
    mut items: Vec<T>,
    server_time: impl Fn(&T) -> Option<DateTime<Utc>>,
    query: RecordQuery,
) -> Vec<T> {
    items.sort_by_key(|item| server_time(item));
    if !query.ascending {
        items.reverse();
    }
    if let Some(limit) = query.limit {
        items.truncate(limit.max(0) as usize);
    }
    items
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn insert_sensor(&self, kind: SensorKind, record: NewSensorRecord) -> Result<()> {
        self.push_sensor(kind, record.into());
        Ok(())
    }

    async fn list_sensors(&self, kind: SensorKind, query: RecordQuery) -> Result<Vec<SensorRecord>> {
        Ok(ordered(self.sensors(kind), |r| r.server_time, query))
    }

    async fn insert_vlog(&self, record: NewVlogRecord) -> Result<()> {
        self.push_vlog(record.into());
        Ok(())
    }

    async fn list_vlogs(&self, query: RecordQuery) -> Result<Vec<VlogRecord>> {
        Ok(ordered(self.vlogs(), |v| v.server_time, query))
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryBlobStore {
    blobs: Mutex<HashMap<BlobRef, (BlobUpload, Vec<u8>)>>,
}

impl MemoryBlobStore {
    pub fn insert(&self, filename: &str, data: &[u8]) -> BlobRef {
        let blob_ref = BlobRef::new();
        let upload = BlobUpload {
            filename: filename.to_string(),
            content_type: "video/mp4".to_string(),
        };
        self.blobs
            .lock()
            .unwrap()
            .insert(blob_ref, (upload, data.to_vec()));
        blob_ref
    }

    pub fn len(&self) -> usize {
        self.blobs.lock().unwrap().len()
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn put(&self, upload: BlobUpload, body: ByteChunks<'_>) -> Result<BlobRef, BlobError> {
        let data = body
            .try_fold(Vec::new(), |mut buf, chunk| async move {
                buf.extend_from_slice(&chunk);
                Ok(buf)
            })
            .await?;

        let blob_ref = BlobRef::new();
        self.blobs.lock().unwrap().insert(blob_ref, (upload, data));
        Ok(blob_ref)
    }

    async fn get(&self, blob_ref: &BlobRef) -> Result<Blob, BlobError> {
        let (upload, data) = self
            .blobs
            .lock()
            .unwrap()
            .get(blob_ref)
            .cloned()
            .ok_or_else(|| BlobError::NotFound(blob_ref.to_string()))?;

        Ok(Blob {
            filename: upload.filename,
            content_type: upload.content_type,
            body: stream::once(async move { Ok(Bytes::from(data)) }).boxed(),
        })
    }
}

pub struct TestApp {
    pub router: Router,
    pub records: Arc<MemoryRecordStore>,
    pub blobs: Arc<MemoryBlobStore>,
}

impl TestApp {
    pub fn new() -> Self {
        let records = Arc::new(MemoryRecordStore::default());
        let blobs = Arc::new(MemoryBlobStore::default());

        let state = AppState {
            records: records.clone(),
            blobs: blobs.clone(),
            dashboard: DashboardConfig::default(),
        };

        Self {
            router: create_router(state, &ApiConfig::default()),
            records,
            blobs,
        }
    }

    pub async fn send(&self, request: Request<Body>) -> Response<Body> {
        self.router.clone().oneshot(request).await.unwrap()
    }

    pub async fn get(&self, uri: &str) -> Response<Body> {
        self.send(Request::get(uri).body(Body::empty()).unwrap())
            .await
    }

    pub async fn post_json(&self, uri: &str, json: &str) -> Response<Body> {
        self.send(
            Request::post(uri)
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
        )
        .await
    }

    pub async fn upload_vlog(&self, filename: &str, content_type: &str, data: &[u8]) -> Response<Body> {
        let mut body = Vec::new();
        body.extend_from_slice(b"--EMOGOBOUNDARY\r\n");
        body.extend_from_slice(
            format!(
                "Content-Disposition: form-data; name=\"file\"; filename=\"{filename}\"\r\nContent-Type: {content_type}\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(data);
        body.extend_from_slice(b"\r\n--EMOGOBOUNDARY--\r\n");

        self.send(
            Request::post("/upload_vlog")
                .header(
                    header::CONTENT_TYPE,
                    "multipart/form-data; boundary=EMOGOBOUNDARY",
                )
                .body(Body::from(body))
                .unwrap(),
        )
        .await
    }
}

pub async fn body_bytes(response: Response<Body>) -> Vec<u8> {
    axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap()
        .to_vec()
}

pub async fn body_text(response: Response<Body>) -> String {
    String::from_utf8(body_bytes(response).await).unwrap()
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}

pub fn header_value(response: &Response<Body>, name: header::HeaderName) -> String {
    response
        .headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string()
}
