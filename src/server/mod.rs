//! HTTP control API.
//!
//! Exposes connection health and an authenticated outbound-send endpoint:
//!
//! - `GET /` — static service info, no auth.
//! - `GET /health` — bot connection state, no auth.
//! - `POST /send` — send a chat message; requires the `X-API-Key` header.

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::watch;
use tower_http::cors::{Any, CorsLayer};

use crate::config::Settings;
use crate::twitch::ChatHandle;

/// Shared state injected into every request handler.
///
/// The bot handle is set once by the orchestrator at startup; `None` means
/// the chat client has not been constructed yet.
#[derive(Clone)]
pub struct ApiState {
    pub bot: Option<ChatHandle>,
    pub settings: &'static Settings,
}

/// Request body for `POST /send`.
#[derive(Debug, Deserialize)]
struct SendRequest {
    channel: String,
    message: String,
}

/// Response body for a successful `POST /send`.
#[derive(Debug, Serialize)]
struct SendResponse {
    success: bool,
    channel: String,
    message: String,
}

/// Response body for `GET /health`.
#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    connected: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    channel: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    bot_name: Option<String>,
}

/// API failure rendered as a structured JSON error body.
struct ApiError {
    status: StatusCode,
    detail: &'static str,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "detail": self.detail }))).into_response()
    }
}

/// Builds the control API router.
pub fn router(state: ApiState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/send", post(send_message))
        .layer(cors)
        .with_state(state)
}

/// Serves the control API until the shutdown token flips.
pub async fn serve(state: ApiState, mut shutdown: watch::Receiver<bool>) -> std::io::Result<()> {
    let addr = format!("{}:{}", state.settings.handler_host, state.settings.handler_port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    log::info!("control api listening on http://{}", addr);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move {
            while !*shutdown.borrow() {
                if shutdown.changed().await.is_err() {
                    break;
                }
            }
            log::info!("control api stopping");
        })
        .await
}

async fn root() -> Json<serde_json::Value> {
    Json(json!({
        "name": "Twitch Relay",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": ["/health", "/send"],
    }))
}

async fn health(State(state): State<ApiState>) -> Json<HealthResponse> {
    let Some(bot) = &state.bot else {
        return Json(HealthResponse {
            status: "initializing",
            connected: false,
            channel: None,
            bot_name: None,
        });
    };

    let state_snapshot = bot.connection_state().await;
    let connected = state_snapshot.connected;
    Json(HealthResponse {
        status: if connected { "healthy" } else { "disconnected" },
        connected,
        channel: Some(state.settings.twitch_channel.clone()),
        bot_name: Some(bot.nick().to_string()),
    })
}

async fn send_message(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Json(request): Json<SendRequest>,
) -> Result<Json<SendResponse>, ApiError> {
    verify_api_key(&headers, state.settings)?;

    let Some(bot) = &state.bot else {
        return Err(ApiError {
            status: StatusCode::SERVICE_UNAVAILABLE,
            detail: "Bot not initialized",
        });
    };

    if !bot.is_connected().await {
        return Err(ApiError {
            status: StatusCode::SERVICE_UNAVAILABLE,
            detail: "Bot not connected",
        });
    }

    if !bot.send(&request.channel, &request.message).await {
        return Err(ApiError {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            detail: "Failed to send message",
        });
    }

    log::info!("message sent via api to #{}", request.channel);
    Ok(Json(SendResponse {
        success: true,
        channel: request.channel,
        message: request.message,
    }))
}

/// Plain equality check against the configured key.
fn verify_api_key(headers: &HeaderMap, settings: &Settings) -> Result<(), ApiError> {
    let provided = headers.get("x-api-key").and_then(|v| v.to_str().ok());
    if provided != Some(settings.handler_api_key.as_str()) {
        log::warn!("invalid api key attempt");
        return Err(ApiError {
            status: StatusCode::UNAUTHORIZED,
            detail: "Invalid API Key",
        });
    }
    Ok(())
}
