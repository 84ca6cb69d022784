//! # Integration Tests for mdlive
//!
//! - **test_config_cli_overrides**: CLI flags and the positional directory feed `AppConfig`.
//! - **test_config_rejects_missing_root**: a missing root fails before anything is bound.
//! - **test_cli_fails_with_missing_dir**: the binary exits non-zero with a message on stderr.
//! - **test_http_surface**: status codes and content types of the router.
//! - **test_websocket_reload_is_filtered_by_view**: the guide listing reloads for
//!   `guide/intro.md` but not for `index.md`.
//! - **test_listing_kind_travels_with_the_session**: a directory named `notes.md`
//!   still reloads for its children.
//! - **test_file_change_reaches_viewer**: a write on disk travels watcher → hub → websocket.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use clap::Parser;
use futures_util::StreamExt;
use mdlive::config::{AppConfig, CliArgs};
use mdlive::error::ConfigError;
use mdlive::event::{ChangeEvent, ChangeKind};
use mdlive::hub::{self, ViewerHub};
use mdlive::web::{self, AppState};
use mdlive::watcher;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::time::{timeout, Duration};
use tower::ServiceExt;

/// Short timeout for message waits.
const SHORT_TIMEOUT: Duration = Duration::from_secs(5);

/// Root with `index.md`, `notes.md`, `guide/intro.md`, a text file and an image.
fn docs_fixture() -> tempfile::TempDir {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let root = dir.path();
    fs::write(root.join("index.md"), "# Home\n\nWelcome.").unwrap();
    fs::write(root.join("notes.md"), "# Notes\n\nSome notes.").unwrap();
    fs::write(root.join("secret.txt"), "nope").unwrap();
    fs::write(root.join("logo.png"), [0x89, b'P', b'N', b'G', 0x0d, 0x0a]).unwrap();
    fs::create_dir(root.join("guide")).unwrap();
    fs::write(root.join("guide").join("intro.md"), "# Intro").unwrap();
    fs::write(root.join("latin.md"), b"# Caf\xe9\n").unwrap();
    dir
}

fn test_config(root: &Path) -> Arc<AppConfig> {
    let mut config = AppConfig::for_root(
        root.canonicalize().expect("Failed to canonicalize root"),
        "127.0.0.1:0".parse().unwrap(),
    );
    config.debounce = Duration::from_millis(50);
    Arc::new(config)
}

async fn get(app: axum::Router, uri: &str) -> (StatusCode, Option<String>, Vec<u8>) {
    let response = app
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let content_type = response
        .headers()
        .get(axum::http::header::CONTENT_TYPE)
        .map(|v| v.to_str().unwrap().to_string());
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, content_type, body.to_vec())
}

/// Starts the web server on a random port and returns its address.
async fn spawn_server(
    config: Arc<AppConfig>,
    hub: ViewerHub,
    shutdown_rx: watch::Receiver<bool>,
) -> std::net::SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        if let Err(e) = web::serve_on(listener, config, hub, shutdown_rx).await {
            eprintln!("[Test Server] Error: {}", e);
        }
    });
    addr
}

async fn wait_for_viewers(hub: &ViewerHub, count: usize) {
    for _ in 0..50 {
        if hub.len() == count {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("expected {} viewers, have {}", count, hub.len());
}

#[test]
fn test_config_cli_overrides() {
    let dir = docs_fixture();
    let root = dir.path().to_string_lossy().to_string();

    let cli_args = CliArgs::parse_from(["mdlive", "-p", "4100", "-h", "127.0.0.1", &root]);
    let config = AppConfig::from_args(cli_args).expect("config should load");
    assert_eq!(config.listen_addr.to_string(), "127.0.0.1:4100");
    assert_eq!(config.root, dir.path().canonicalize().unwrap());
    assert_eq!(config.preview_lines, 10);

    let cli_args = CliArgs::parse_from(["mdlive", "--dir", &root]);
    let config = AppConfig::from_args(cli_args).expect("config should load");
    assert_eq!(config.root, dir.path().canonicalize().unwrap());
}

#[test]
fn test_config_rejects_missing_root() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("nope").to_string_lossy().to_string();
    let cli_args = CliArgs::parse_from(["mdlive", "-d", &missing]);
    let err = AppConfig::from_args(cli_args).unwrap_err();
    assert!(matches!(err, ConfigError::RootNotFound(_)), "{:?}", err);
}

#[test]
fn test_cli_fails_with_missing_dir() {
    let Ok(mdlive_bin) = std::env::var("CARGO_BIN_EXE_mdlive") else {
        eprintln!("CARGO_BIN_EXE_mdlive not set; skipping CLI integration test");
        return;
    };
    let dir = tempfile::tempdir().unwrap();
    let output = std::process::Command::new(&mdlive_bin)
        .arg(dir.path().join("missing"))
        .output()
        .expect("Failed to run mdlive binary");

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.contains("does not exist"),
        "Expected error message not found. Stderr: {}",
        stderr
    );
}

#[tokio::test]
async fn test_http_surface() {
    let dir = docs_fixture();
    let state = Arc::new(AppState {
        config: test_config(dir.path()),
        hub: ViewerHub::new(),
    });
    let app = web::router(state);

    let (status, content_type, body) = get(app.clone(), "/").await;
    assert_eq!(status, StatusCode::OK);
    assert!(content_type.unwrap().starts_with("text/html"));
    let html = String::from_utf8(body).unwrap();
    assert!(html.contains("href=\"/guide/\""));
    assert!(html.contains("href=\"/notes.md\""));
    assert!(!html.contains("secret.txt"));
    assert!(html.contains("window.MDLIVE_VIEW = \"\";"));

    let (status, _, body) = get(app.clone(), "/notes").await;
    assert_eq!(status, StatusCode::OK);
    let html = String::from_utf8(body).unwrap();
    assert!(html.contains("Some notes."));
    assert!(html.contains("window.MDLIVE_VIEW = \"notes.md\";"));

    let (status, _, body) = get(app.clone(), "/guide/").await;
    assert_eq!(status, StatusCode::OK);
    assert!(String::from_utf8(body)
        .unwrap()
        .contains("window.MDLIVE_VIEW = \"guide\";"));

    let (status, content_type, body) = get(app.clone(), "/logo.png").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(content_type.as_deref(), Some("image/png"));
    assert_eq!(body.len(), 6);

    let (status, _, body) = get(app.clone(), "/latin").await;
    assert_eq!(status, StatusCode::OK);
    assert!(String::from_utf8(body).unwrap().contains("Caf\u{FFFD}"));

    let (status, _, _) = get(app.clone(), "/secret.txt").await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _, _) = get(app.clone(), "/%2E%2E/secret.txt").await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _, _) = get(app.clone(), "/missing").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, content_type, _) = get(app.clone(), "/static/livereload.js").await;
    assert_eq!(status, StatusCode::OK);
    assert!(content_type.unwrap().starts_with("text/javascript"));

    let (status, _, _) = get(app, "/static/nope.woff2").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_websocket_reload_is_filtered_by_view() {
    let dir = docs_fixture();
    let hub = ViewerHub::new();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let addr = spawn_server(test_config(dir.path()), hub.clone(), shutdown_rx).await;

    let ws_url = format!("ws://{}/__livereload?view=guide", addr);
    let (ws_stream, _) = tokio_tungstenite::connect_async(&ws_url)
        .await
        .expect("WebSocket connect failed");
    let (_ws_write, mut ws_read) = ws_stream.split();
    wait_for_viewers(&hub, 1).await;

    let unrelated = hub.fan_out(&ChangeEvent::new(ChangeKind::Modified, "index.md"));
    assert_eq!(unrelated.delivered, 0);
    let related = hub.fan_out(&ChangeEvent::new(ChangeKind::Modified, "guide/intro.md"));
    assert_eq!(related.delivered, 1);

    let msg = timeout(SHORT_TIMEOUT, ws_read.next())
        .await
        .expect("timed out waiting for reload")
        .expect("stream ended")
        .expect("websocket error");
    let json: serde_json::Value = serde_json::from_str(msg.to_text().unwrap()).unwrap();
    assert_eq!(
        json,
        serde_json::json!({"type": "update", "event": "modified", "path": "guide/intro.md"})
    );

    drop(ws_read);
    drop(_ws_write);
    wait_for_viewers(&hub, 0).await;
    shutdown_tx.send(true).unwrap();
}

#[tokio::test]
async fn test_listing_kind_travels_with_the_session() {
    let dir = docs_fixture();
    let hub = ViewerHub::new();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let addr = spawn_server(test_config(dir.path()), hub.clone(), shutdown_rx).await;

    let ws_url = format!("ws://{}/__livereload?view=notes.md&kind=listing", addr);
    let (ws_stream, _) = tokio_tungstenite::connect_async(&ws_url)
        .await
        .expect("WebSocket connect failed");
    let (_ws_write, mut ws_read) = ws_stream.split();
    wait_for_viewers(&hub, 1).await;

    let report = hub.fan_out(&ChangeEvent::new(ChangeKind::Created, "notes.md/a.md"));
    assert_eq!(report.delivered, 1);

    let msg = timeout(SHORT_TIMEOUT, ws_read.next())
        .await
        .expect("timed out waiting for reload")
        .expect("stream ended")
        .expect("websocket error");
    assert!(msg.to_text().unwrap().contains("notes.md/a.md"));
    shutdown_tx.send(true).unwrap();
}

#[tokio::test]
async fn test_file_change_reaches_viewer() {
    let dir = docs_fixture();
    let config = test_config(dir.path());
    let root = config.root.clone();
    let hub = ViewerHub::new();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let (change_tx, change_rx) = mpsc::channel(64);

    watcher::run_watcher(Arc::clone(&config), change_tx)
        .await
        .expect("watcher should start");
    tokio::spawn(hub::run_fan_out(hub.clone(), change_rx, shutdown_rx.clone()));
    let addr = spawn_server(config, hub.clone(), shutdown_rx).await;

    let ws_url = format!("ws://{}/__livereload?view=guide%2Fintro.md", addr);
    let (ws_stream, _) = tokio_tungstenite::connect_async(&ws_url)
        .await
        .expect("WebSocket connect failed");
    let (_ws_write, mut ws_read) = ws_stream.split();
    wait_for_viewers(&hub, 1).await;
    tokio::time::sleep(Duration::from_millis(300)).await;

    fs::write(root.join("guide").join("intro.md"), "# Intro\n\nEdited.").unwrap();

    let mut received = false;
    while let Ok(Some(Ok(msg))) = timeout(SHORT_TIMEOUT, ws_read.next()).await {
        if msg.is_text() && msg.to_text().unwrap().contains("guide/intro.md") {
            received = true;
            break;
        }
    }
    shutdown_tx.send(true).unwrap();
    assert!(received, "Did not receive reload for guide/intro.md");
}
