pub mod api;
pub mod error;

use axum::{
    extract::Request,
    http::StatusCode,
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use fn_adapter::HttpTransport;
use fn_config::SandboxSettings;
use fn_sandbox::{ScratchSpace, ScriptLimits, Validator};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;

/// Max request body size: 1 MiB
const MAX_BODY_BYTES: usize = 1_048_576;
/// Request timeout
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<SandboxSettings>,
    pub validator: Validator,
    /// Shared by every run; its lock serializes executions.
    pub scratch: ScratchSpace,
    pub script_limits: ScriptLimits,
    /// Outbound transport. `None` builds a network transport per run.
    pub transport: Option<Arc<dyn HttpTransport>>,
}

impl AppState {
    pub fn from_settings(settings: SandboxSettings) -> Self {
        Self {
            validator: Validator::from_settings(&settings),
            scratch: ScratchSpace::from_settings(&settings),
            script_limits: ScriptLimits::for_timeout(settings.execution_timeout),
            transport: None,
            settings: Arc::new(settings),
        }
    }

    pub fn with_transport(mut self, transport: Arc<dyn HttpTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn with_script_limits(mut self, limits: ScriptLimits) -> Self {
        self.script_limits = limits;
        self
    }
}

pub fn app() -> Router {
    app_with_state(AppState::from_settings(SandboxSettings::from_env()))
}

pub fn app_with_state(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/v1/evaluate", post(api::evaluate))
        .route("/v1/build-request", post(api::build_request))
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(TimeoutLayer::new(REQUEST_TIMEOUT))
        .layer(middleware::from_fn(require_json_content_type))
        .with_state(state)
}

/// Middleware: reject POST/PUT requests without application/json content-type.
async fn require_json_content_type(req: Request, next: Next) -> Response {
    let is_json = match req.method().as_str() {
        "POST" | "PUT" | "PATCH" => req
            .headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .map(|ct| ct.starts_with("application/json"))
            .unwrap_or(false),
        _ => true,
    };
    if !is_json {
        return (
            StatusCode::UNSUPPORTED_MEDIA_TYPE,
            Json(json!({"code": "unsupported_media_type", "message": "content-type must be application/json"})),
        )
            .into_response();
    }
    next.run(req).await
}

async fn healthz() -> Json<serde_json::Value> {
    Json(json!({"ok": true}))
}

pub mod test {
    use super::AppState;
    use std::net::SocketAddr;
    use tokio::net::TcpListener;

    /// Spawn the server on a random port. Returns the address and a
    /// JoinHandle that keeps the server alive until dropped.
    pub async fn spawn(state: AppState) -> (SocketAddr, tokio::task::JoinHandle<()>) {
        let app = super::app_with_state(state);
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (addr, handle)
    }
}
