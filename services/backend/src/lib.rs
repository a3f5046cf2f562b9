//! EmoGo Backend
//!
//! Data collection service for the EmoGo mood tracking app. Clients post
//! sensor readings (GPS fixes and sentiment scores) and short video vlogs;
//! researchers read them back through an auto-refreshing dashboard or bulk
//! CSV/ZIP exports.
//!
//! ## Architecture
//!
//! ```text
//! Client                      PostgreSQL                S3 Bucket
//! ┌──────────────┐           ┌──────────────┐          ┌──────────────┐
//! │ /upload_data │──────────▶│ gps          │          │ vlogs/       │
//! │              │           │ sentiments   │          │   {file_id}  │
//! │ /upload_vlog │─────┐     │ vlogs        │          └──────────────┘
//! └──────────────┘     │     └──────────────┘                 ▲
//!                      │            ▲   │                     │
//!                      └────────────┼───┼─────────────────────┤
//!                                   │   ▼                     │
//!                            ┌──────────────┐                 │
//!                            │ Dashboard /  │─────────────────┘
//!                            │ CSV / ZIP    │
//!                            └──────────────┘
//! ```
//!
//! Both stores sit behind async traits ([`RecordStore`], [`BlobStore`]) and
//! are shared across requests through [`AppState`].

pub mod blob_store;
pub mod config;
pub mod dashboard;
pub mod error;
pub mod export;
pub mod models;
pub mod record_store;
pub mod routes;

pub use blob_store::{Blob, BlobError, BlobRef, BlobStore, BlobUpload, ByteChunks, S3BlobStore};
pub use crate::config::Config;
pub use error::{ApiError, ErrorResponse};
pub use models::{
    IngestPayload, NewSensorRecord, NewVlogRecord, RecordQuery, SensorKind, SensorRecord,
    VlogRecord,
};
pub use record_store::{PgRecordStore, RecordStore};
pub use routes::{create_router, start_api_server, AppState, IngestResponse, UploadResponse};
