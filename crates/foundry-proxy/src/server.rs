//! HTTP server for the chat widget.
//!
//! Routes:
//! - `POST /api/chat` forwards a conversation to the agent.
//! - `GET /health` reports liveness and the active auth method.
//! - `GET /diagnose-auth` inspects credentials and probes the token endpoint.
//! - `GET /test-connection` checks DNS and reachability of the default endpoint.

use std::future::Future;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{Instrument, error, info, info_span, warn};
use uuid::Uuid;

use foundry_client::{AuthDiagnostics, ConnectionReport, FoundryClient, HealthReport};
use foundry_common::{AuthMode, ChatPayload, ForwardRequest, ForwardResponse};

use crate::config::ProxyConfig;
use crate::error::{ErrorReply, ProxyError, Result};

/// State shared by every handler.
#[derive(Debug, Clone)]
pub struct AppState {
    client: FoundryClient,
    development: bool,
}

impl AppState {
    /// Creates handler state around `client`.
    #[must_use]
    pub const fn new(client: FoundryClient, development: bool) -> Self {
        Self {
            client,
            development,
        }
    }

    fn reject(&self, err: impl Into<ProxyError>) -> ErrorReply {
        err.into().with_mode(self.development)
    }
}

/// Builds the proxy router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/chat", post(chat))
        .route("/health", get(health))
        .route("/diagnose-auth", get(diagnose_auth))
        .route("/test-connection", get(test_connection))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Binds the listener and serves until `shutdown` resolves.
///
/// # Errors
///
/// Returns an error if the client cannot be built, the address cannot be
/// bound, or the server fails.
pub async fn serve(
    config: ProxyConfig,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<()> {
    let addr = config.socket_addr()?;
    let client = FoundryClient::new(config.client_config())?;
    let auth = client.config().credentials.auth_mode();

    let listener = tokio::net::TcpListener::bind(addr).await?;

    info!("Proxy server running on http://{addr}");
    info!("Foundry endpoint: {}", config.upstream.endpoint);
    info!("Authentication: {auth}");
    if auth == AuthMode::None {
        warn!(
            "No credentials configured; set FOUNDRY_API_KEY or AZURE_TENANT_ID, \
             AZURE_CLIENT_ID and AZURE_CLIENT_SECRET"
        );
    }
    if config.development {
        info!("Development mode: error responses include the error chain");
    }

    let app = router(AppState::new(client, config.development));
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    info!("Proxy server stopped");
    Ok(())
}

async fn chat(
    State(state): State<AppState>,
    payload: std::result::Result<Json<ChatPayload>, JsonRejection>,
) -> std::result::Result<Json<ForwardResponse>, ErrorReply> {
    let request_id = Uuid::new_v4();

    async move {
        let Json(payload) = payload.map_err(|e| {
            warn!("Rejected chat body: {}", e.body_text());
            state.reject(e)
        })?;
        let request = ForwardRequest::try_from(payload).map_err(|e| {
            warn!("Rejected chat request: {e}");
            state.reject(e)
        })?;

        info!(
            messages = request.messages.len(),
            endpoint = request.endpoint.as_deref().unwrap_or("default"),
            "Forwarding chat request"
        );

        match state.client.forward_chat(&request).await {
            Ok(response) => {
                info!(shape = ?response.shape, "Chat request completed");
                Ok(Json(response))
            }
            Err(err) => {
                error!(status = err.status_code(), "Chat request failed: {err}");
                Err(state.reject(err))
            }
        }
    }
    .instrument(info_span!("chat", %request_id))
    .await
}

async fn health(State(state): State<AppState>) -> Json<HealthReport> {
    Json(state.client.health())
}

async fn diagnose_auth(State(state): State<AppState>) -> Json<AuthDiagnostics> {
    let report = state.client.diagnose_auth().await;
    if !report.issues.is_empty() {
        warn!("Auth diagnostics found issues: {}", report.issues.join("; "));
    }
    Json(report)
}

async fn test_connection(
    State(state): State<AppState>,
) -> std::result::Result<Json<ConnectionReport>, ErrorReply> {
    match state.client.test_connection().await {
        Ok(report) => {
            info!(
                status = report.http_status,
                "Connection test reached {}", report.base_url
            );
            Ok(Json(report))
        }
        Err(err) => {
            error!("Connection test failed: {err}");
            Err(state.reject(err))
        }
    }
}
