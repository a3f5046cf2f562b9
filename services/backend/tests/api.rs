mod common;

use axum::http::{header, StatusCode};
use chrono::{Duration, TimeZone, Utc};
use common::{body_bytes, body_json, body_text, header_value, TestApp};
use emogo_backend::{BlobRef, SensorKind, SensorRecord, VlogRecord};
use serde_json::json;
use sqlx::types::Json;
use std::io::{Cursor, Read};

const GPS_SCENARIO: &str =
    r#"{"type":"gps","content":{"lat":25.03,"lon":121.56},"timestamp":"2024-01-01T00:00:00"}"#;

#[tokio::test]
async fn test_root_reports_running() {
    let app = TestApp::new();

    let response = app.get("/").await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        body_json(response).await,
        json!({"message": "EmoGo Backend is running!"})
    );
}

#[tokio::test]
async fn test_only_exact_gps_type_lands_in_gps() {
    let app = TestApp::new();

    for submitted in ["gps", "sentiment", "GPS", "gps ", "mood", ""] {
        let payload = json!({
            "type": submitted,
            "content": {"value": 1},
            "timestamp": "2024-01-01T00:00:00"
        });
        let response = app.post_json("/upload_data", &payload.to_string()).await;
        assert_eq!(response.status(), StatusCode::OK);

        let expected = if submitted == "gps" {
            "Saved to gps"
        } else {
            "Saved to sentiments"
        };
        assert_eq!(
            body_json(response).await,
            json!({"status": "success", "msg": expected})
        );
    }

    let gps = app.records.sensors(SensorKind::Gps);
    let sentiments = app.records.sensors(SensorKind::Sentiment);

    assert_eq!(gps.len(), 1);
    assert_eq!(gps[0].kind, "gps");
    assert_eq!(sentiments.len(), 5);
    assert!(sentiments.iter().all(|r| r.kind != "gps"));
}

#[tokio::test]
async fn test_server_time_is_stamped_by_server() {
    let app = TestApp::new();
    let received = Utc::now();

    let response = app
        .post_json(
            "/upload_data",
            r#"{"type":"sentiment","content":{"score":5},"timestamp":"2024-01-01T00:00:00","server_time":"1999-12-31T00:00:00Z"}"#,
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let stored = app.records.sensors(SensorKind::Sentiment);
    assert_eq!(stored.len(), 1);
    let server_time = stored[0].server_time.unwrap();
    assert!(server_time >= received);
    assert!(server_time <= Utc::now());
    assert_eq!(stored[0].client_timestamp.as_deref(), Some("2024-01-01T00:00:00"));
    assert!(stored[0].field("server_time").is_none());
}

#[tokio::test]
async fn test_malformed_payload_shape_is_rejected() {
    let app = TestApp::new();

    let not_a_map = app
        .post_json(
            "/upload_data",
            r#"{"type":"gps","content":[25.03,121.56],"timestamp":"t"}"#,
        )
        .await;
    let missing_timestamp = app
        .post_json("/upload_data", r#"{"type":"gps","content":{}}"#)
        .await;

    assert_eq!(not_a_map.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(missing_timestamp.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert!(app.records.sensors(SensorKind::Gps).is_empty());
}

#[tokio::test]
async fn test_partial_content_is_accepted() {
    let app = TestApp::new();

    let response = app
        .post_json(
            "/upload_data",
            r#"{"type":"gps","content":{"lat":"somewhere"},"timestamp":"t"}"#,
        )
        .await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(app.records.sensors(SensorKind::Gps).len(), 1);
}

#[tokio::test]
async fn test_uploaded_vlog_streams_back() {
    let app = TestApp::new();
    let data = b"\x00\x00\x00\x18ftypmp42 fake video bytes";

    let response = app.upload_vlog("day1.mp4", "video/mp4", data).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "success");
    let file_id = body["file_id"].as_str().unwrap().to_string();

    let vlogs = app.records.vlogs();
    assert_eq!(vlogs.len(), 1);
    assert_eq!(vlogs[0].filename, "day1.mp4");
    assert_eq!(vlogs[0].blob_ref, file_id);
    assert_eq!(vlogs[0].description.as_deref(), Some("User Vlog"));
    assert!(vlogs[0].server_time.is_some());

    let response = app.get(&format!("/video/{file_id}")).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(header_value(&response, header::CONTENT_TYPE), "video/mp4");
    assert_eq!(
        header_value(&response, header::CONTENT_DISPOSITION),
        "inline; filename=\"day1.mp4\""
    );
    assert_eq!(body_bytes(response).await, data);
}

#[tokio::test]
async fn test_video_disposition_quotes_filename_with_spaces() {
    let app = TestApp::new();
    let response = app.upload_vlog("a b (1).mp4", "video/mp4", b"clip").await;
    let file_id = body_json(response).await["file_id"].as_str().unwrap().to_string();

    let response = app.get(&format!("/video/{file_id}")).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        header_value(&response, header::CONTENT_DISPOSITION),
        "inline; filename=\"a b (1).mp4\""
    );
}

#[tokio::test]
async fn test_large_upload_is_not_rejected() {
    let app = TestApp::new();
    let data = vec![7u8; 3 * 1024 * 1024];

    let response = app.upload_vlog("long.mov", "video/quicktime", &data).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(app.blobs.len(), 1);
}

#[tokio::test]
async fn test_unknown_video_ids_are_uniformly_not_found() {
    let app = TestApp::new();
    app.blobs.insert("kept.mp4", b"bytes");

    let never_issued = BlobRef::new().to_string();
    let mut bodies = Vec::new();
    for file_id in ["not-an-id", "12345", never_issued.as_str()] {
        let response = app.get(&format!("/video/{file_id}")).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        bodies.push(body_json(response).await);
    }

    assert_eq!(bodies[0], json!({"error": "Video not found", "code": "NOT_FOUND"}));
    assert!(bodies.iter().all(|b| *b == bodies[0]));
}

#[tokio::test]
async fn test_video_id_aliases_are_not_found() {
    let app = TestApp::new();
    let response = app.upload_vlog("day2.mp4", "video/mp4", b"clip").await;
    let file_id = body_json(response).await["file_id"].as_str().unwrap().to_string();

    let alias = format!(
        "{}-{}-{}-{}-{}",
        &file_id[0..8],
        &file_id[8..12],
        &file_id[12..16],
        &file_id[16..20],
        &file_id[20..32]
    )
    .to_uppercase();

    let response = app.get(&format!("/video/{alias}")).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = app.get(&format!("/video/{file_id}")).await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_csv_export_row_count_and_blanks() {
    let app = TestApp::new();
    for score in 1..=3 {
        let payload = json!({"type": "sentiment", "content": {"score": score}, "timestamp": "t"});
        app.post_json("/upload_data", &payload.to_string()).await;
    }
    for _ in 0..2 {
        app.post_json("/upload_data", GPS_SCENARIO).await;
    }

    let response = app.get("/export_csv").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(header_value(&response, header::CONTENT_TYPE).starts_with("text/csv"));
    let disposition = header_value(&response, header::CONTENT_DISPOSITION);
    assert_eq!(
        disposition,
        format!("attachment; filename=emogo_data_{}.csv", Utc::now().format("%Y%m%d"))
    );

    let text = body_text(response).await;
    let rows: Vec<Vec<String>> = csv::ReaderBuilder::new()
        .has_headers(false)
        .from_reader(text.as_bytes())
        .records()
        .map(|r| r.unwrap().iter().map(String::from).collect())
        .collect();

    assert_eq!(rows.len(), 3 + 2 + 1);
    assert_eq!(
        rows[0],
        vec!["timestamp", "type", "score", "latitude", "longitude", "content"]
    );

    for row in &rows[1..4] {
        assert_eq!(row[1], "sentiment");
        assert!(!row[2].is_empty());
        assert_eq!(row[3], "");
        assert_eq!(row[4], "");
    }
    for row in &rows[4..] {
        assert_eq!(row[1], "gps");
        assert_eq!(row[2], "");
        assert_eq!(row[3], "25.03");
        assert_eq!(row[4], "121.56");
    }
}

#[tokio::test]
async fn test_zip_export_skips_broken_blob_refs() {
    let app = TestApp::new();
    let base = Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap();

    let good = [("a.mp4", b"aaa".as_slice()), ("b.mp4", b"bbbb".as_slice()), ("c.mp4", b"c".as_slice())];
    for (i, (name, data)) in good.iter().enumerate() {
        let blob_ref = app.blobs.insert(name, data);
        app.records.push_vlog(VlogRecord {
            filename: name.to_string(),
            blob_ref: blob_ref.to_string(),
            description: Some("User Vlog".to_string()),
            server_time: Some(base + Duration::minutes(i as i64)),
        });
    }
    app.records.push_vlog(VlogRecord {
        filename: "corrupt.mp4".to_string(),
        blob_ref: "corrupted-reference".to_string(),
        description: Some("User Vlog".to_string()),
        server_time: Some(base + Duration::minutes(10)),
    });
    app.records.push_vlog(VlogRecord {
        filename: "missing.mp4".to_string(),
        blob_ref: BlobRef::new().to_string(),
        description: Some("User Vlog".to_string()),
        server_time: Some(base + Duration::minutes(11)),
    });

    let response = app.get("/export_zip").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(header_value(&response, header::CONTENT_TYPE), "application/zip");
    assert_eq!(
        header_value(&response, header::CONTENT_DISPOSITION),
        format!("attachment; filename=emogo_vlogs_{}.zip", Utc::now().format("%Y%m%d"))
    );

    let mut archive = zip::ZipArchive::new(Cursor::new(body_bytes(response).await)).unwrap();
    assert_eq!(archive.len(), 3);

    let mut contents = Vec::new();
    archive.by_name("b.mp4").unwrap().read_to_end(&mut contents).unwrap();
    assert_eq!(contents, b"bbbb");
    assert!(archive.by_name("corrupt.mp4").is_err());
}

#[tokio::test]
async fn test_zip_export_filename_collision_keeps_later_vlog() {
    let app = TestApp::new();
    let base = Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap();

    for (offset, data) in [(0, b"older".as_slice()), (5, b"newer".as_slice())] {
        let blob_ref = app.blobs.insert("vlog.mp4", data);
        app.records.push_vlog(VlogRecord {
            filename: "vlog.mp4".to_string(),
            blob_ref: blob_ref.to_string(),
            description: None,
            server_time: Some(base + Duration::minutes(offset)),
        });
    }

    let response = app.get("/export_zip").await;
    let mut archive = zip::ZipArchive::new(Cursor::new(body_bytes(response).await)).unwrap();

    assert_eq!(archive.len(), 1);
    let mut contents = String::new();
    archive.by_name("vlog.mp4").unwrap().read_to_string(&mut contents).unwrap();
    assert_eq!(contents, "newer");
}

#[tokio::test]
async fn test_zip_export_strips_directories_from_entry_names() {
    let app = TestApp::new();
    let base = Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap();

    for (offset, filename) in [(0, "../../escape.mp4"), (1, "/abs.mp4")] {
        let blob_ref = app.blobs.insert(filename, b"clip");
        app.records.push_vlog(VlogRecord {
            filename: filename.to_string(),
            blob_ref: blob_ref.to_string(),
            description: None,
            server_time: Some(base + Duration::minutes(offset)),
        });
    }

    let response = app.get("/export_zip").await;
    let mut archive = zip::ZipArchive::new(Cursor::new(body_bytes(response).await)).unwrap();

    let mut names: Vec<String> = archive.file_names().map(String::from).collect();
    names.sort();
    assert_eq!(names, vec!["abs.mp4", "escape.mp4"]);
    assert!(archive.by_name("escape.mp4").is_ok());
}

#[tokio::test]
async fn test_zip_export_with_no_vlogs_is_empty_archive() {
    let app = TestApp::new();

    let response = app.get("/export_zip").await;
    assert_eq!(response.status(), StatusCode::OK);

    let archive = zip::ZipArchive::new(Cursor::new(body_bytes(response).await)).unwrap();
    assert_eq!(archive.len(), 0);
}

#[tokio::test]
async fn test_empty_dashboard_shows_placeholders() {
    let app = TestApp::new();

    let response = app.get("/dashboard").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(header_value(&response, header::CONTENT_TYPE).starts_with("text/html"));

    let html = body_text(response).await;
    assert!(html.contains("No vlogs uploaded yet."));
    assert!(html.contains("No sentiments data."));
    assert!(html.contains("No GPS data."));
    assert!(html.contains(r#"http-equiv="refresh""#));
}

#[tokio::test]
async fn test_dashboard_renders_ingested_gps_reading() {
    let app = TestApp::new();

    let response = app.post_json("/upload_data", GPS_SCENARIO).await;
    assert_eq!(
        body_json(response).await,
        json!({"status": "success", "msg": "Saved to gps"})
    );

    let html = body_text(app.get("/dashboard").await).await;

    assert!(html.contains("25.03000, 121.56000"));
    assert!(html.contains("https://www.google.com/maps?q=25.03,121.56"));
    assert!(!html.contains("No GPS data."));
    assert!(html.contains("No sentiments data."));
}

#[tokio::test]
async fn test_dashboard_limits_sensor_rows_to_most_recent() {
    let app = TestApp::new();
    let base = Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap();

    for i in 0..25 {
        app.records.push_sensor(
            SensorKind::Sentiment,
            SensorRecord {
                kind: "sentiment".to_string(),
                content: Json(json!({"score": i})),
                client_timestamp: None,
                server_time: Some(base + Duration::minutes(i)),
            },
        );
    }

    let html = body_text(app.get("/dashboard").await).await;

    assert!(html.contains(r#"{"score":24}"#));
    assert!(html.contains(r#"{"score":5}"#));
    assert!(!html.contains(r#"{"score":4}"#));
    let newest = html.find(r#"{"score":24}"#).unwrap();
    let oldest_shown = html.find(r#"{"score":5}"#).unwrap();
    assert!(newest < oldest_shown);
}

#[tokio::test]
async fn test_dashboard_lists_vlogs_with_play_links() {
    let app = TestApp::new();

    let response = app.upload_vlog("morning.mp4", "video/mp4", b"clip").await;
    let file_id = body_json(response).await["file_id"]
        .as_str()
        .unwrap()
        .to_string();

    let html = body_text(app.get("/dashboard").await).await;

    assert!(html.contains("morning.mp4"));
    assert!(html.contains(&format!(r#"href="/video/{file_id}""#)));
    assert!(!html.contains("No vlogs uploaded yet."));
}
