// src/web.rs
use crate::config::AppConfig;
use crate::error::ServeError;
use crate::hub::{ViewerHub, ViewerSession};
use crate::paths::{has_parent_segment, normalize};
use crate::render::{self, Rendered};
use crate::resolver;
use crate::view_match::{View, ViewKind};
use anyhow::Result;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, Query, State,
    },
    http::{header, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::get,
    Router,
};
use futures_util::{
    sink::SinkExt,
    stream::{SplitSink, SplitStream, StreamExt},
};
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::watch::Receiver as WatchReceiver;
use tracing::{debug, info, warn};

/// Path of the live-reload websocket.
pub const LIVERELOAD_PATH: &str = "/__livereload";

/// Assets bundled into the binary and served under `/static/`.
const STATIC_ASSETS: &[(&str, &str, &str)] = &[
    (
        "style.css",
        "text/css; charset=utf-8",
        include_str!("../static/style.css"),
    ),
    (
        "livereload.js",
        "text/javascript; charset=utf-8",
        include_str!("../static/livereload.js"),
    ),
];

/// Shared application state for the web server.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub hub: ViewerHub,
}

#[derive(Debug, Deserialize)]
struct LiveReloadParams {
    /// View identifier the page was rendered with
    #[serde(default)]
    view: String,
    /// Whether the page was a document or a listing
    kind: Option<ViewKind>,
}

/// Builds the router: documents and listings under `/`, bundled assets under
/// `/static/`, and the live-reload websocket.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(serve_root))
        .route(LIVERELOAD_PATH, get(websocket_handler))
        .route("/static/*path", get(serve_static))
        .route("/*path", get(serve_path))
        .with_state(state)
}

async fn serve_root(State(state): State<Arc<AppState>>) -> Result<Response, ServeError> {
    serve(&state, "/").await
}

/// `Path` hands us the percent-decoded remainder of the URL.
async fn serve_path(
    State(state): State<Arc<AppState>>,
    Path(path): Path<String>,
) -> Result<Response, ServeError> {
    serve(&state, &path).await
}

async fn serve(state: &AppState, request_path: &str) -> Result<Response, ServeError> {
    debug!("GET /{}", request_path.trim_start_matches('/'));
    let root = state.config.root.clone();
    let preview_lines = state.config.preview_lines;
    let request_path = request_path.to_string();

    // Filesystem reads and markdown rendering are blocking work.
    let rendered = tokio::task::spawn_blocking(move || {
        let target = resolver::resolve(&root, &request_path)?;
        render::render(&target, preview_lines)
    })
    .await
    .map_err(|e| ServeError::Io(std::io::Error::new(std::io::ErrorKind::Other, e)))??;

    Ok(match rendered {
        Rendered::Page(page) => Html(page.html).into_response(),
        Rendered::Image(image) => {
            ([(header::CONTENT_TYPE, image.content_type)], image.bytes).into_response()
        }
    })
}

async fn serve_static(Path(path): Path<String>) -> Response {
    let path = path.trim_start_matches('/');
    match STATIC_ASSETS.iter().find(|(name, _, _)| *name == path) {
        Some((_, content_type, body)) => ([(header::CONTENT_TYPE, *content_type)], *body).into_response(),
        None => (StatusCode::NOT_FOUND, "404 Not Found").into_response(),
    }
}

/// Handles incoming live-reload upgrade requests.
///
/// The page passes its view identifier as `?view=` and its kind as `?kind=`.
/// The identifier is normalized here and kept with the session for the
/// lifetime of the connection. A missing kind is inferred from the identifier.
async fn websocket_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<LiveReloadParams>,
    State(state): State<Arc<AppState>>,
) -> Response {
    if has_parent_segment(&params.view) {
        return ServeError::ForbiddenPath(params.view).into_response();
    }
    let id = normalize(&params.view);
    let kind = params.kind.unwrap_or_else(|| ViewKind::infer(&id));
    let session = state.hub.register(View::new(id, kind));
    ws.on_upgrade(move |socket| handle_socket(socket, session))
}

/// Handles a single live-reload connection.
///
/// Spawns two tasks:
/// - One forwarding this viewer's reload messages to the browser as JSON.
/// - One draining (and logging) whatever the browser sends.
///
/// The connection, and with it the session, ends when either task finishes.
async fn handle_socket(socket: WebSocket, mut session: ViewerSession) {
    let id = session.id();
    debug!("Viewer {} live-reload channel open for '/{}'", id, session.view().id);
    let (mut sender, mut receiver): (SplitSink<WebSocket, Message>, SplitStream<WebSocket>) =
        socket.split();

    let mut send_task = tokio::spawn(async move {
        while let Some(message) = session.recv().await {
            let json_payload = match serde_json::to_string(&message) {
                Ok(json) => json,
                Err(e) => {
                    warn!("Failed to serialize reload message: {}", e);
                    continue;
                }
            };
            if sender.send(Message::Text(json_payload)).await.is_err() {
                debug!("Viewer {} went away while sending", id);
                break;
            }
        }
        // `session` drops here and leaves the hub.
    });

    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Close(_) => break,
                other => debug!("Ignoring message from viewer {}: {:?}", id, other),
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }
    debug!("Viewer {} live-reload channel closed", id);
}

/// Starts the HTTP server on the configured address.
///
/// Shuts down gracefully when the shutdown signal is triggered.
///
/// # Errors
/// Returns an error if the listener cannot be bound or the server fails.
pub async fn start_server(
    app_config: Arc<AppConfig>,
    hub: ViewerHub,
    shutdown_signal: WatchReceiver<bool>,
) -> Result<()> {
    let socket_addr = app_config.listen_addr;
    let listener = tokio::net::TcpListener::bind(socket_addr).await?;
    serve_on(listener, app_config, hub, shutdown_signal).await
}

/// Serves on an already-bound listener.
pub async fn serve_on(
    listener: tokio::net::TcpListener,
    app_config: Arc<AppConfig>,
    hub: ViewerHub,
    shutdown_signal: WatchReceiver<bool>,
) -> Result<()> {
    let local_addr = listener.local_addr()?;
    let state = Arc::new(AppState {
        config: app_config,
        hub,
    });

    info!("Serving {} on http://{}", state.config.root.display(), local_addr);

    let mut shutdown = shutdown_signal;
    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move {
            while shutdown.changed().await.is_ok() {
                if *shutdown.borrow() {
                    break;
                }
            }
            info!("Web server shutting down gracefully.");
        })
        .await?;

    info!("Web server stopped.");
    Ok(())
}
