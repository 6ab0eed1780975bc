//! End-to-end tests for the webhook router
//!
//! Requests go through the full axum router; messages land in an in-memory
//! chat client instead of a homeserver.

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use fabrica_relay::services::matrix::DeliveryError;
use fabrica_relay::webhooks::{create_router, WebhookState};
use fabrica_relay::{ChatClient, Config, MessageKind, SharedConfig};
use pretty_assertions::assert_eq;
use std::io;
use std::sync::{Arc, Mutex};
use tower::ServiceExt; // For `oneshot`

const CONFIG: &str = r#"
    tokens = ["global-token"]
    enable_bearer_auth = true

    [matrix]
    homeserver_url = "https://matrix.example.org"
    access_token = "unused"

    [endpoints.ping]
    template = "Hello ${name}"
    room_id = "!ping:example.org"
    methods = ["GET"]
    auth_token = "abc"

    [endpoints.hook]
    template = "Hi ${user.name}"
    room_id = "!hook:example.org"
    methods = ["POST"]
    format = "JSON"
    notice = true
    auth_token = ["T1", "T2"]

    [endpoints.nested]
    template = "x is ${payload.x}"
    room_id = "!nested:example.org"
    methods = ["POST"]
    format = "JSON"

    [endpoints.missing]
    template = "Value: ${missing}"
    room_id = "!missing:example.org"
    methods = ["GET", "POST"]
    format = "JSON"

    [endpoints.static]
    template = "Build **finished**"
    room_id = "!static:example.org"
    methods = ["POST"]

    [endpoints.closed]
    template = "never"
    room_id = "!closed:example.org"
"#;

#[derive(Debug, Clone, PartialEq)]
struct Sent {
    room_id: String,
    markdown: String,
    kind: MessageKind,
}

#[derive(Default)]
struct RecordingClient {
    sent: Mutex<Vec<Sent>>,
    fail: bool,
}

impl RecordingClient {
    fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    fn sent(&self) -> Vec<Sent> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatClient for RecordingClient {
    async fn send_markdown(
        &self,
        room_id: &str,
        markdown: &str,
        kind: MessageKind,
    ) -> Result<String, DeliveryError> {
        self.sent.lock().unwrap().push(Sent {
            room_id: room_id.to_string(),
            markdown: markdown.to_string(),
            kind,
        });
        if self.fail {
            return Err(DeliveryError::Rejected {
                status: 502,
                body: "homeserver unavailable".to_string(),
            });
        }
        Ok("$event".to_string())
    }
}

fn app(chat: Arc<RecordingClient>) -> axum::Router {
    let config = Config::parse(CONFIG).unwrap();
    create_router(WebhookState {
        config: SharedConfig::new(config),
        chat,
    })
}

async fn call(chat: &Arc<RecordingClient>, request: Request<Body>) -> StatusCode {
    app(Arc::clone(chat)).oneshot(request).await.unwrap().status()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post(uri: &str, body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn test_get_substitutes_query_parameter() {
    let chat = Arc::new(RecordingClient::default());

    let status = call(&chat, get("/ping?token=abc&name=World")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        chat.sent(),
        vec![Sent {
            room_id: "!ping:example.org".to_string(),
            markdown: "Hello World".to_string(),
            kind: MessageKind::Text,
        }]
    );
}

#[tokio::test]
async fn test_post_resolves_json_path() {
    let chat = Arc::new(RecordingClient::default());

    let status = call(&chat, post("/hook?token=T2", r#"{"user":{"name":"Ann"}}"#)).await;

    assert_eq!(status, StatusCode::OK);
    let sent = chat.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].markdown, "Hi Ann");
    assert_eq!(sent[0].kind, MessageKind::Notice);
}

#[tokio::test]
async fn test_post_expands_embedded_json() {
    let chat = Arc::new(RecordingClient::default());

    let status = call(
        &chat,
        post("/nested?token=global-token", r#"{"payload":"{\"x\":1}"}"#),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(chat.sent()[0].markdown, "x is 1");
}

#[tokio::test]
async fn test_bearer_header_authenticates() {
    let chat = Arc::new(RecordingClient::default());
    let request = Request::builder()
        .method("POST")
        .uri("/hook")
        .header("authorization", "Bearer T1")
        .body(Body::from(r#"{"user":{"name":"Bo"}}"#))
        .unwrap();

    assert_eq!(call(&chat, request).await, StatusCode::OK);
    assert_eq!(chat.sent()[0].markdown, "Hi Bo");
}

#[tokio::test]
async fn test_missing_variable_reports_to_room() {
    let chat = Arc::new(RecordingClient::default());

    let status = call(
        &chat,
        post("/missing?token=global-token", r#"{"other":"value"}"#),
    )
    .await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    let sent = chat.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].room_id, "!missing:example.org");
    assert_eq!(sent[0].kind, MessageKind::Notice);
    assert!(sent[0].markdown.contains("Missing variables: `missing`"));
    assert!(sent[0].markdown.contains("\"other\": \"value\""));
    assert!(!sent[0].markdown.starts_with("Value:"));
}

#[tokio::test]
async fn test_missing_get_variable_redacts_token_in_report() {
    let chat = Arc::new(RecordingClient::default());

    let status = call(&chat, get("/missing?token=global-token&unrelated=1")).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    let report = &chat.sent()[0].markdown;
    assert!(report.contains("[REDACTED]"));
    assert!(!report.contains("global-token"));
}

#[tokio::test]
async fn test_invalid_json_is_bad_request_with_report() {
    let chat = Arc::new(RecordingClient::default());

    let status = call(&chat, post("/hook?token=T1", "{not json")).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    let sent = chat.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].room_id, "!hook:example.org");
    assert_eq!(sent[0].kind, MessageKind::Notice);
    assert!(sent[0].markdown.contains("{not json"));
    // The raw body did not parse, so it is not fenced as JSON
    assert!(sent[0].markdown.ends_with("```\n{not json\n```"));
    assert!(!sent[0].markdown.contains("```json"));
}

#[tokio::test]
async fn test_plain_post_without_placeholders_is_delivered() {
    let chat = Arc::new(RecordingClient::default());

    let status = call(&chat, post("/static?token=global-token", "ignored body")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(chat.sent()[0].markdown, "Build **finished**");
}

#[tokio::test]
async fn test_invalid_token_is_forbidden_before_lookup() {
    let chat = Arc::new(RecordingClient::default());

    assert_eq!(call(&chat, get("/ping?token=wrong&name=x")).await, StatusCode::FORBIDDEN);
    assert_eq!(call(&chat, get("/ping?name=x")).await, StatusCode::FORBIDDEN);
    // Unknown endpoints look the same as known ones to unauthenticated callers
    assert_eq!(call(&chat, get("/nope?token=wrong")).await, StatusCode::FORBIDDEN);
    // Endpoint-scoped tokens do not open other endpoints
    assert_eq!(call(&chat, get("/nope?token=abc")).await, StatusCode::FORBIDDEN);
    assert!(chat.sent().is_empty());
}

#[tokio::test]
async fn test_unknown_endpoint_is_not_found() {
    let chat = Arc::new(RecordingClient::default());

    let status = call(&chat, get("/nope?token=global-token")).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(chat.sent().is_empty());
}

#[tokio::test]
async fn test_method_not_allowed() {
    let chat = Arc::new(RecordingClient::default());

    assert_eq!(
        call(&chat, post("/ping?token=abc", "{}")).await,
        StatusCode::METHOD_NOT_ALLOWED
    );
    assert_eq!(
        call(&chat, get("/closed?token=global-token")).await,
        StatusCode::METHOD_NOT_ALLOWED
    );
    assert!(chat.sent().is_empty());
}

#[tokio::test]
async fn test_delivery_failure_is_internal_error() {
    let chat = Arc::new(RecordingClient::failing());

    let status = call(&chat, get("/ping?token=abc&name=World")).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(chat.sent().len(), 1);
}

#[tokio::test]
async fn test_failed_error_report_is_swallowed() {
    let chat = Arc::new(RecordingClient::failing());

    let status = call(&chat, post("/hook?token=T1", "[broken")).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(chat.sent().len(), 1);
}

#[tokio::test]
async fn test_health() {
    let chat = Arc::new(RecordingClient::default());
    assert_eq!(call(&chat, get("/")).await, StatusCode::OK);
}

#[test]
fn test_reload_applies_to_next_request() {
    tokio_test::block_on(async {
        let chat = Arc::new(RecordingClient::default());
        let shared = SharedConfig::new(Config::parse(CONFIG).unwrap());
        let router = create_router(WebhookState {
            config: shared.clone(),
            chat: chat.clone(),
        });

        let mut next = Config::parse(CONFIG).unwrap();
        next.tokens = vec!["rotated".to_string()];
        shared.replace(next);

        let old = router
            .clone()
            .oneshot(get("/nope?token=global-token"))
            .await
            .unwrap();
        assert_eq!(old.status(), StatusCode::FORBIDDEN);

        let new = router.oneshot(get("/nope?token=rotated")).await.unwrap();
        assert_eq!(new.status(), StatusCode::NOT_FOUND);
    });
}

/// Shared buffer the log subscriber writes into
#[derive(Clone, Default)]
struct LogBuffer(Arc<Mutex<Vec<u8>>>);

impl io::Write for LogBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[tokio::test]
async fn test_token_never_reaches_logs() {
    let logs = LogBuffer::default();
    let writer = logs.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_ansi(false)
        .with_writer(move || writer.clone())
        .finish();
    let _guard = tracing::subscriber::set_default(subscriber);

    let chat = Arc::new(RecordingClient::default());
    let ok = call(&chat, get("/ping?token=SUPERSECRET123&name=W")).await;
    let missing = call(&chat, get("/missing?token=global-token&unrelated=1")).await;
    let forbidden = call(&chat, get("/ping?token=WRONGSECRET456")).await;

    assert_eq!(ok, StatusCode::OK);
    assert_eq!(missing, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(forbidden, StatusCode::FORBIDDEN);

    let output = String::from_utf8(logs.0.lock().unwrap().clone()).unwrap();
    assert!(output.contains("Received webhook endpoint ping"));
    assert!(output.contains("path=/ping"));
    for secret in ["SUPERSECRET123", "global-token", "WRONGSECRET456"] {
        assert!(!output.contains(secret), "{secret} appeared in logs:\n{output}");
    }
}
