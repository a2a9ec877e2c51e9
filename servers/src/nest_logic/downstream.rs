use anyhow::{Context, Result};
use axum::{
    Json, Router,
    extract::{
        State,
        ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade, close_code, rejection::WebSocketUpgradeRejection},
    },
    response::{Html, IntoResponse, Response},
    routing::{get, post},
};
use axum_server::tls_rustls::RustlsConfig;
use lib_nest::{Bridge, Feed, LogPage, read_all, read_tail};
use serde_json::json;
use std::future::IntoFuture;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tower_http::services::{ServeDir, ServeFile};

use crate::nest_logic::config::Settings;
use crate::nest_logic::ingest::ingest_handler;
use crate::nest_logic::pages;
use crate::nest_logic::state::AppState;

pub fn router(state: AppState, static_dir: &Path) -> Router {
    Router::new()
        .route("/", get(home_handler))
        .route("/history", get(history_handler))
        .route("/log", get(log_handler))
        .route(pages::LIVE_SOCKET_PATH, get(refresh_data_handler))
        .route(pages::HISTORY_SOCKET_PATH, get(refresh_history_handler))
        .route("/ingest", post(ingest_handler))
        .route("/health", get(health_handler))
        .route_service("/favicon.ico", ServeFile::new(static_dir.join("favicon.ico")))
        .nest_service("/static", ServeDir::new(static_dir))
        .with_state(state)
}

/// Serves plain HTTP, plus HTTPS when `tls` is given, until shutdown.
///
/// Returns as soon as either server fails, so a bind error ends the process
/// instead of leaving it running without an HTTP surface.
pub async fn run(
    settings: Settings,
    app_state: AppState,
    tls: Option<RustlsConfig>,
    mut shutdown: broadcast::Receiver<()>,
) -> Result<()> {
    let app = router(app_state, &settings.static_dir);

    let addr = SocketAddr::from(([0, 0, 0, 0], settings.http_port));
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind HTTP listener on {}", addr))?;
    log::info!("HTTP server listening on {}", addr);

    let tls_handle = axum_server::Handle::new();
    let https = tls.map(|tls_config| {
        let addr = SocketAddr::from(([0, 0, 0, 0], settings.https_port));
        log::info!("HTTPS server listening on {}", addr);
        tokio::spawn(
            axum_server::bind_rustls(addr, tls_config)
                .handle(tls_handle.clone())
                .serve(app.clone().into_make_service()),
        )
    });

    let http = axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown.recv().await.ok();
            log::info!("Downstream server shutting down.");
            tls_handle.graceful_shutdown(Some(Duration::from_secs(5)));
        })
        .into_future();
    tokio::pin!(http);

    let Some(mut https) = https else {
        http.await?;
        return Ok(());
    };

    tokio::select! {
        served = &mut http => {
            served?;
            https.await?.context("HTTPS server failed")?;
        }
        served = &mut https => {
            served?.context("HTTPS server failed")?;
            http.await?;
        }
    }
    Ok(())
}

async fn home_handler() -> Html<String> {
    log::debug!("Home page requested");
    pages::home()
}

async fn history_handler() -> Html<String> {
    log::debug!("History page requested");
    pages::history()
}

async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let active = state.bridge.active_connection();
    Json(json!({
        "status": "ok",
        "activeConnection": active.map(|(id, _)| id.to_string()),
        "activeFeed": active.map(|(_, feed)| feed.to_string()),
        "hasPayload": state.bridge.latest().is_some(),
    }))
}

/// Renders the whole log (or its tail). A log that cannot be read yields an
/// empty page with the error set rather than a failed request.
async fn log_handler(State(state): State<AppState>) -> Json<LogPage> {
    let path = Arc::clone(&state.log_file);
    let limit = state.log_page_limit;

    let result = tokio::task::spawn_blocking(move || match limit {
        Some(limit) => read_tail(&path, limit),
        None => read_all(&path),
    })
    .await;

    let page = match result {
        Ok(Ok(page)) => {
            if page.skipped > 0 {
                log::warn!("Log page skipped {} malformed lines", page.skipped);
            }
            page
        }
        Ok(Err(e)) => {
            log::warn!(param = state.log_file.display().to_string(); "Log page unavailable: {}", e);
            LogPage::failed(e)
        }
        Err(e) => {
            log::error!("Log reader task failed: {}", e);
            LogPage::failed(e)
        }
    };
    Json(page)
}

async fn refresh_data_handler(
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
    State(state): State<AppState>,
) -> Response {
    upgrade(ws, state, Feed::Live)
}

async fn refresh_history_handler(
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
    State(state): State<AppState>,
) -> Response {
    upgrade(ws, state, Feed::History)
}

fn upgrade(ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>, state: AppState, feed: Feed) -> Response {
    match ws {
        Ok(ws) => ws
            .on_failed_upgrade(move |e| log::warn!("WebSocket upgrade on {} feed failed: {}", feed, e))
            .on_upgrade(move |socket| handle_socket(socket, state.bridge, feed)),
        Err(rejection) => {
            log::warn!("Rejected {} feed upgrade: {}", feed, rejection.body_text());
            rejection.into_response()
        }
    }
}

/// One push session. Attaches to the bridge (which queues the catch-up
/// payload), then forwards payloads until the client leaves, a write fails or
/// a newer connection evicts this one.
async fn handle_socket(mut socket: WebSocket, bridge: Arc<Bridge>, feed: Feed) {
    let mut subscription = bridge.attach(feed);
    let id = subscription.id();
    log::info!("Client {} connected on {} feed", id, feed);

    loop {
        tokio::select! {
            payload = subscription.next() => {
                let Some(payload) = payload else {
                    log::info!("Client {} superseded by a newer connection", id);
                    let frame = CloseFrame {
                        code: close_code::NORMAL,
                        reason: "superseded".into(),
                    };
                    let _ = socket.send(Message::Close(Some(frame))).await;
                    break;
                };
                if let Err(e) = socket.send(Message::Text(payload.as_str().into())).await {
                    log::warn!("Impossible to write to websocket of client {}: {}", id, e);
                    break;
                }
            }
            incoming = socket.recv() => {
                match incoming {
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        log::warn!("Client {} read error: {}", id, e);
                        break;
                    }
                    Some(Ok(_)) => {}
                }
            }
        }
    }

    bridge.detach(id);
    log::info!("Client {} disconnected", id);
}
