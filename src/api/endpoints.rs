//! Router, shared state and the service-level endpoints
//!
//! This module assembles the three API surfaces into one router, applies the
//! cross-cutting layers (CORS, panic recovery, request logging) and hosts the
//! helpers the surface handlers share.

use crate::api::error::{ApiError, Surface};
use crate::api::middleware::logging_middleware;
use crate::api::{claude, gemini, openai};
use crate::conversion::response_converter::StreamEvent;
use crate::core::config::Config;
use crate::core::provider::{
    GenerateOptions, ModelInfo, Provider, ProviderError, ProviderResponse, SUPPORTED_MODELS,
};
use crate::core::provider_manager::ProviderManager;
use axum::{
    Json, Router,
    extract::State,
    http::{
        HeaderName, HeaderValue, Method,
        header::{ACCEPT, AUTHORIZATION, CACHE_CONTROL, CONNECTION, CONTENT_TYPE, ORIGIN},
    },
    middleware,
    response::{
        IntoResponse, Response,
        sse::{Event, KeepAlive, Sse},
    },
    routing::{get, post},
};
use futures::{Stream, StreamExt};
use serde::de::DeserializeOwned;
use serde_json::json;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{Any, CorsLayer};

pub const SERVICE_NAME: &str = "ai-bridges";

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub providers: Arc<ProviderManager>,
}

impl AppState {
    /// The active provider, or a 503 in the caller's flavour
    pub fn provider(&self, surface: Surface) -> Result<Arc<dyn Provider>, ApiError> {
        self.providers
            .selected()
            .ok_or_else(|| ApiError::unavailable(surface))
    }

    /// Models of the active provider; the full catalogue when none is active
    pub fn models(&self) -> Vec<ModelInfo> {
        self.providers
            .selected()
            .map(|p| p.list_models())
            .unwrap_or_else(|| SUPPORTED_MODELS.to_vec())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.config.request.timeout_secs)
    }
}

/// Create the API router with all endpoints
pub fn create_router(state: AppState) -> Router {
    let openai_routes = Router::new()
        .route("/models", get(openai::list_models))
        .route("/chat/completions", post(openai::chat_completions));

    let router = Router::new()
        .route("/", get(root))
        .route("/health", get(health_check))
        .nest("/openai/v1", openai_routes.clone())
        .nest("/v1", openai_routes)
        .route("/claude/v1/models", get(claude::list_models))
        .route("/claude/v1/models/{model_id}", get(claude::get_model))
        .route("/claude/v1/messages", post(claude::create_message))
        .route("/claude/v1/messages/count_tokens", post(claude::count_tokens))
        .route("/gemini/v1beta/models", get(gemini::list_models))
        .route(
            "/gemini/v1beta/models/{model_action}",
            get(gemini::get_model).post(gemini::model_action),
        )
        .with_state(state);

    with_layers(router)
}

/// Panic recovery inside request logging, so recovered panics are logged as 500s
fn with_layers(router: Router) -> Router {
    router
        .layer(CatchPanicLayer::new())
        .layer(middleware::from_fn(logging_middleware))
        .layer(cors_layer())
}

fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
            Method::PATCH,
        ])
        .allow_headers([
            ORIGIN,
            CONTENT_TYPE,
            ACCEPT,
            AUTHORIZATION,
            HeaderName::from_static("x-requested-with"),
            HeaderName::from_static("x-api-key"),
            HeaderName::from_static("anthropic-version"),
        ])
}

/// Deserialize a request body, reporting failures in the surface's flavour
pub fn parse_body<T: DeserializeOwned>(surface: Surface, body: &[u8]) -> Result<T, ApiError> {
    serde_json::from_slice(body).map_err(|e| ApiError::invalid_body(surface, &e))
}

/// One generate call bounded by `timeout`
pub async fn generate(
    provider: Arc<dyn Provider>,
    prompt: String,
    options: GenerateOptions,
    timeout: Duration,
) -> Result<ProviderResponse, ProviderError> {
    match tokio::time::timeout(timeout, provider.generate_content(&prompt, &options)).await {
        Ok(result) => result,
        Err(_) => Err(ProviderError::Timeout(timeout.as_secs())),
    }
}

/// Serve simulated stream frames as server-sent events
pub fn sse_response<S>(events: S) -> Response
where
    S: Stream<Item = StreamEvent> + Send + 'static,
{
    let stream = events.map(|frame| {
        let mut event = Event::default().data(frame.data);
        if let Some(name) = frame.event {
            event = event.event(name);
        }
        Ok::<_, Infallible>(event)
    });

    let mut response = Sse::new(stream)
        .keep_alive(KeepAlive::default())
        .into_response();

    let headers = response.headers_mut();
    headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    headers.insert(CONNECTION, HeaderValue::from_static("keep-alive"));
    response
}

/// GET / - Service banner
async fn root(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "message": "AI Bridges",
        "status": "running",
        "provider": state.providers.selected_name(),
        "endpoints": {
            "health": "/health",
            "openai": {
                "models": "/openai/v1/models",
                "chat_completions": "/openai/v1/chat/completions",
            },
            "claude": {
                "models": "/claude/v1/models",
                "messages": "/claude/v1/messages",
                "count_tokens": "/claude/v1/messages/count_tokens",
            },
            "gemini": {
                "models": "/gemini/v1beta/models",
                "generate_content": "/gemini/v1beta/models/{model}:generateContent",
                "stream_generate_content": "/gemini/v1beta/models/{model}:streamGenerateContent",
            },
        },
    }))
}

/// GET /health - Health check endpoint
async fn health_check() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "service": SERVICE_NAME,
        "timestamp": chrono::Utc::now().timestamp(),
    }))
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::core::provider::models_for;
    use async_trait::async_trait;
    use axum::body::{Body, to_bytes};
    use axum::http::{Request, StatusCode};
    use std::sync::Mutex;
    use tower::ServiceExt;

    /// Provider double answering every prompt with a fixed reply
    pub struct MockProvider {
        reply: Option<String>,
        pub calls: Mutex<Vec<(String, String)>>,
    }

    impl MockProvider {
        pub fn replying(text: &str) -> Arc<Self> {
            Arc::new(Self {
                reply: Some(text.to_string()),
                calls: Mutex::new(Vec::new()),
            })
        }

        pub fn failing() -> Arc<Self> {
            Arc::new(Self {
                reply: None,
                calls: Mutex::new(Vec::new()),
            })
        }

        /// `(prompt, model)` of the last generate call
        pub fn last_call(&self) -> Option<(String, String)> {
            self.calls.lock().unwrap().last().cloned()
        }
    }

    #[async_trait]
    impl Provider for MockProvider {
        async fn init(&self) -> Result<(), ProviderError> {
            Ok(())
        }

        async fn generate_content(
            &self,
            prompt: &str,
            options: &GenerateOptions,
        ) -> Result<ProviderResponse, ProviderError> {
            self.calls.lock().unwrap().push((
                prompt.to_string(),
                options.model_or_default().to_string(),
            ));
            match &self.reply {
                Some(text) => Ok(ProviderResponse {
                    text: text.clone(),
                    ..ProviderResponse::default()
                }),
                None => Err(ProviderError::Upstream { status: 502 }),
            }
        }

        async fn close(&self) -> Result<(), ProviderError> {
            Ok(())
        }

        fn name(&self) -> &str {
            "gemini"
        }

        fn is_healthy(&self) -> bool {
            true
        }

        fn list_models(&self) -> Vec<ModelInfo> {
            models_for("gemini")
        }
    }

    pub fn router_with(provider: Option<Arc<MockProvider>>) -> Router {
        let providers = Arc::new(ProviderManager::new());
        if let Some(provider) = provider {
            providers.register("gemini", provider);
            providers.select_provider("gemini").unwrap();
        }
        create_router(AppState {
            config: Arc::new(Config::default()),
            providers,
        })
    }

    pub struct TestResponse {
        pub status: StatusCode,
        pub content_type: String,
        pub body: String,
    }

    impl TestResponse {
        pub fn json(&self) -> serde_json::Value {
            serde_json::from_str(&self.body).unwrap()
        }

        /// `(event, data)` pairs of an SSE body
        pub fn sse_frames(&self) -> Vec<(Option<String>, String)> {
            self.body
                .split("\n\n")
                .filter(|frame| !frame.trim().is_empty())
                .map(|frame| {
                    let mut event = None;
                    let mut data = String::new();
                    for line in frame.lines() {
                        if let Some(name) = line.strip_prefix("event: ") {
                            event = Some(name.to_string());
                        } else if let Some(payload) = line.strip_prefix("data: ") {
                            data.push_str(payload);
                        }
                    }
                    (event, data)
                })
                .collect()
        }
    }

    pub async fn send(router: Router, method: &str, uri: &str, body: &str) -> TestResponse {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();

        let response = router.oneshot(request).await.unwrap();
        let status = response.status();
        let content_type = response
            .headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();

        TestResponse {
            status,
            content_type,
            body: String::from_utf8(bytes.to_vec()).unwrap(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::{Router, get, with_layers};
    use axum::http::StatusCode;
    use std::sync::{Arc, Mutex};

    #[tokio::test]
    async fn test_health() {
        let response = send(router_with(None), "GET", "/health", "").await;
        assert_eq!(response.status, StatusCode::OK);
        let body = response.json();
        assert_eq!(body["status"], "ok");
        assert_eq!(body["service"], "ai-bridges");
        let now = chrono::Utc::now().timestamp();
        let timestamp = body["timestamp"].as_i64().unwrap();
        assert!((now - 5..=now).contains(&timestamp));
    }

    #[tokio::test]
    async fn test_root_reports_active_provider() {
        let response = send(
            router_with(Some(MockProvider::replying("hi"))),
            "GET",
            "/",
            "",
        )
        .await;
        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(response.json()["provider"], "gemini");

        let response = send(router_with(None), "GET", "/", "").await;
        assert!(response.json()["provider"].is_null());
    }

    #[tokio::test]
    async fn test_cors_preflight() {
        use axum::body::Body;
        use axum::http::Request;
        use tower::ServiceExt;

        let request = Request::builder()
            .method("OPTIONS")
            .uri("/v1/chat/completions")
            .header("origin", "http://example.com")
            .header("access-control-request-method", "POST")
            .body(Body::empty())
            .unwrap();
        let response = router_with(None).oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()["access-control-allow-origin"],
            "*"
        );
    }

    #[derive(Clone, Default)]
    struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

    impl std::io::Write for CapturedLogs {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    async fn panicking_handler() -> &'static str {
        panic!("handler blew up")
    }

    #[tokio::test]
    async fn test_recovered_panic_is_logged_as_server_error() {
        use tracing_subscriber::layer::SubscriberExt;

        let logs = CapturedLogs::default();
        let writer = logs.clone();
        let subscriber = tracing_subscriber::registry().with(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(move || writer.clone()),
        );
        let _guard = tracing::subscriber::set_default(subscriber);

        let router = with_layers(Router::new().route("/boom", get(panicking_handler)));
        let response = send(router, "GET", "/boom", "").await;
        assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);

        let output = String::from_utf8(logs.0.lock().unwrap().clone()).unwrap();
        assert!(output.contains("Request failed"));
        assert!(output.contains("status=500"));
        assert!(output.contains("path=/boom"));
    }

    #[tokio::test]
    async fn test_unknown_route_is_404() {
        let response = send(router_with(None), "GET", "/nope", "").await;
        assert_eq!(response.status, StatusCode::NOT_FOUND);
    }
}
