//! HTTP server turning webhook calls into Matrix messages

use super::auth::{redact_query, validate_token};
use super::error::WebhookError;
use crate::config::{Config, EndpointConfig, PayloadFormat, SharedConfig};
use crate::relay::{self, json, Failure, JsonSource, NoValues, Payload, QuerySource};
use crate::services::matrix::{ChatClient, MessageKind};
use axum::{
    body::{Body, Bytes},
    extract::{Path, Query, State},
    http::{HeaderMap, Method, Request, StatusCode},
    routing::get,
    Router,
};
use serde_json::{Map, Value};
use std::future::Future;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;
use tracing::{debug, debug_span, error, info, Span};

/// Shared state for webhook handlers
#[derive(Clone)]
pub struct WebhookState {
    pub config: SharedConfig,
    pub chat: Arc<dyn ChatClient>,
}

type QueryParams = Vec<(String, String)>;

/// Build the webhook router
pub fn create_router(state: WebhookState) -> Router {
    Router::new()
        .route("/", get(health))
        .route("/:endpoint", get(execute_get).post(execute_post))
        .layer(TraceLayer::new_for_http().make_span_with(request_span))
        .with_state(Arc::new(state))
}

/// Span for one request. Only the path is recorded; the query string carries
/// the token.
fn request_span(request: &Request<Body>) -> Span {
    debug_span!("request", method = %request.method(), path = %request.uri().path())
}

/// Start the webhook server in the background
pub fn start_server<F>(state: WebhookState, addr: String, shutdown: F) -> JoinHandle<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = create_router(state);

    tokio::spawn(async move {
        let listener = match tokio::net::TcpListener::bind(&addr).await {
            Ok(l) => l,
            Err(e) => {
                error!("Failed to bind webhook server to {}: {}", addr, e);
                return;
            }
        };

        info!("Webhook server listening on {}", addr);

        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await
        {
            error!("Webhook server error: {}", e);
        }
    })
}

/// Health check endpoint
async fn health() -> &'static str {
    "OK"
}

async fn execute_get(
    State(state): State<Arc<WebhookState>>,
    Path(endpoint): Path<String>,
    Query(query): Query<QueryParams>,
    headers: HeaderMap,
) -> Result<StatusCode, WebhookError> {
    execute_webhook(&state, Method::GET, &endpoint, &query, &headers, Bytes::new()).await
}

async fn execute_post(
    State(state): State<Arc<WebhookState>>,
    Path(endpoint): Path<String>,
    Query(query): Query<QueryParams>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<StatusCode, WebhookError> {
    execute_webhook(&state, Method::POST, &endpoint, &query, &headers, body).await
}

/// Authenticate, resolve the endpoint and dispatch on the method
async fn execute_webhook(
    state: &WebhookState,
    method: Method,
    name: &str,
    query: &[(String, String)],
    headers: &HeaderMap,
    body: Bytes,
) -> Result<StatusCode, WebhookError> {
    let config: Arc<Config> = state.config.snapshot();
    let endpoint = config.endpoint(name);
    info!("Received webhook endpoint {}", name);

    if !validate_token(&config, endpoint, headers, query) {
        error!("Endpoint {} called with invalid token!", name);
        return Err(WebhookError::Unauthorized);
    }

    let Some(endpoint) = endpoint else {
        error!("Endpoint {} does not exist", name);
        return Err(WebhookError::EndpointNotFound(name.to_string()));
    };

    if !endpoint.allows(method.as_str()) {
        error!("Endpoint {} may not receive {} requests", name, method);
        return Err(WebhookError::MethodNotAllowed {
            endpoint: name.to_string(),
            method: method.to_string(),
        });
    }

    let dispatch = Dispatch {
        chat: state.chat.as_ref(),
        name,
        endpoint,
    };

    let message = if method == Method::GET {
        dispatch.get_message(query).await?
    } else {
        dispatch.post_message(&body).await?
    };

    dispatch.deliver(&message).await?;
    Ok(StatusCode::OK)
}

/// A request that passed authentication for a known endpoint
struct Dispatch<'a> {
    chat: &'a dyn ChatClient,
    name: &'a str,
    endpoint: &'a EndpointConfig,
}

impl Dispatch<'_> {
    async fn get_message(&self, query: &[(String, String)]) -> Result<String, WebhookError> {
        let redacted = redact_query(query);
        info!(
            "GET request query parameters for endpoint '{}': {:?}",
            self.name, redacted
        );

        match relay::render(&self.endpoint.template, &QuerySource::new(query)) {
            Ok(message) => Ok(message),
            Err(missing) => {
                let params: Map<String, Value> = redacted
                    .into_iter()
                    .map(|(k, v)| (k, Value::String(v)))
                    .collect();
                let payload = format!("{:#}", Value::Object(params));
                Err(self.missing_variables(missing, Payload::Json(&payload)).await)
            }
        }
    }

    async fn post_message(&self, body: &[u8]) -> Result<String, WebhookError> {
        let text = String::from_utf8_lossy(body);
        info!("POST request payload for endpoint '{}': {}", self.name, text);

        match self.endpoint.format {
            PayloadFormat::Json => {
                let parsed: Value = match serde_json::from_str(&text) {
                    Ok(value) => value,
                    Err(e) => {
                        error!("Invalid JSON payload for endpoint '{}': {}", self.name, e);
                        let failure = Failure::InvalidJson {
                            error: e.to_string(),
                        };
                        self.report(&failure, Payload::Text(&text)).await;
                        return Err(WebhookError::InvalidPayload(e));
                    }
                };

                let data = json::normalize(parsed);
                let pretty = format!("{:#}", data);
                debug!("Parsed JSON structure for endpoint '{}': {}", self.name, pretty);

                match relay::render(&self.endpoint.template, &JsonSource::new(&data)) {
                    Ok(message) => Ok(message),
                    Err(missing) => {
                        Err(self.missing_variables(missing, Payload::Json(&pretty)).await)
                    }
                }
            }
            PayloadFormat::Plain => match relay::render(&self.endpoint.template, &NoValues) {
                Ok(message) => Ok(message),
                Err(missing) => {
                    Err(self.missing_variables(missing, Payload::Text(&text)).await)
                }
            },
        }
    }

    async fn missing_variables(
        &self,
        missing: relay::MissingVariables,
        payload: Payload<'_>,
    ) -> WebhookError {
        error!(
            "Endpoint '{}' is missing template variables: {}",
            self.name,
            missing.names.join(", ")
        );
        let names = missing.names.clone();
        self.report(&Failure::from(missing), payload).await;
        WebhookError::MissingVariables(names)
    }

    /// Post an error report into the endpoint's room; failures are only logged
    async fn report(&self, failure: &Failure, payload: Payload<'_>) {
        let report = relay::error_report(self.name, failure, payload);
        if let Err(e) = self
            .chat
            .send_markdown(&self.endpoint.room_id, &report, MessageKind::Notice)
            .await
        {
            error!(
                "Failed to send error report for endpoint '{}' to {}: {}",
                self.name, self.endpoint.room_id, e
            );
        }
    }

    async fn deliver(&self, message: &str) -> Result<(), WebhookError> {
        info!("Formatted message for endpoint '{}': {}", self.name, message);

        let kind = MessageKind::for_notice(self.endpoint.notice);
        match self
            .chat
            .send_markdown(&self.endpoint.room_id, message, kind)
            .await
        {
            Ok(event_id) => {
                debug!("Delivered {} to {}", event_id, self.endpoint.room_id);
                Ok(())
            }
            Err(e) => {
                error!("Failed to send message {}: {}", message, e);
                Err(e.into())
            }
        }
    }
}
