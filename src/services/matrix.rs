//! Matrix delivery - sends rendered messages through the client-server API

use crate::config::MatrixConfig;
use async_trait::async_trait;
use pulldown_cmark::{html, Event, Options, Parser};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

/// Matrix message type used for a delivery
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    Text,
    Notice,
}

impl MessageKind {
    pub fn for_notice(notice: bool) -> Self {
        if notice {
            MessageKind::Notice
        } else {
            MessageKind::Text
        }
    }

    pub fn msgtype(self) -> &'static str {
        match self {
            MessageKind::Text => "m.text",
            MessageKind::Notice => "m.notice",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("invalid homeserver URL '{0}'")]
    InvalidUrl(String),
    #[error("request to homeserver failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("homeserver rejected message ({status}): {body}")]
    Rejected { status: u16, body: String },
}

/// Anything that can post a Markdown message into a room
#[async_trait]
pub trait ChatClient: Send + Sync {
    /// Send `markdown` to `room_id`, returning the new event id
    async fn send_markdown(
        &self,
        room_id: &str,
        markdown: &str,
        kind: MessageKind,
    ) -> Result<String, DeliveryError>;
}

#[derive(Serialize)]
struct RoomMessage<'a> {
    msgtype: &'static str,
    body: &'a str,
    format: &'static str,
    formatted_body: String,
}

#[derive(Deserialize)]
struct SendResponse {
    event_id: String,
}

/// Client for a single Matrix account
pub struct MatrixClient {
    homeserver_url: reqwest::Url,
    access_token: String,
    client: reqwest::Client,
    txn_counter: AtomicU64,
}

impl MatrixClient {
    /// Create a new Matrix client
    pub fn new(config: &MatrixConfig) -> Result<Self, DeliveryError> {
        let homeserver_url = reqwest::Url::parse(&config.homeserver_url)
            .map_err(|_| DeliveryError::InvalidUrl(config.homeserver_url.clone()))?;
        if homeserver_url.cannot_be_a_base() {
            return Err(DeliveryError::InvalidUrl(config.homeserver_url.clone()));
        }

        Ok(Self {
            homeserver_url,
            access_token: config.access_token.clone(),
            client: reqwest::Client::new(),
            txn_counter: AtomicU64::new(0),
        })
    }

    /// Unique per process run, so retried sends are never deduplicated
    fn next_txn_id(&self) -> String {
        let n = self.txn_counter.fetch_add(1, Ordering::Relaxed);
        format!("relay{}.{}", chrono::Utc::now().timestamp_millis(), n)
    }

    fn send_url(&self, room_id: &str, txn_id: &str) -> Result<reqwest::Url, DeliveryError> {
        let mut url = self.homeserver_url.clone();
        url.path_segments_mut()
            .map_err(|_| DeliveryError::InvalidUrl(self.homeserver_url.to_string()))?
            .pop_if_empty()
            .extend([
                "_matrix",
                "client",
                "v3",
                "rooms",
                room_id,
                "send",
                "m.room.message",
                txn_id,
            ]);
        Ok(url)
    }
}

#[async_trait]
impl ChatClient for MatrixClient {
    async fn send_markdown(
        &self,
        room_id: &str,
        markdown: &str,
        kind: MessageKind,
    ) -> Result<String, DeliveryError> {
        let message = RoomMessage {
            msgtype: kind.msgtype(),
            body: markdown,
            format: "org.matrix.custom.html",
            formatted_body: render_markdown(markdown),
        };
        let url = self.send_url(room_id, &self.next_txn_id())?;

        debug!("Sending {} to {}", kind.msgtype(), room_id);

        let response = self
            .client
            .put(url)
            .bearer_auth(&self.access_token)
            .json(&message)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(DeliveryError::Rejected { status, body });
        }

        let sent: SendResponse = response.json().await?;
        Ok(sent.event_id)
    }
}

/// Render Markdown to the HTML Matrix clients display.
///
/// Inline HTML passes through untouched and single newlines become line
/// breaks, which is what people expect from chat messages.
pub fn render_markdown(markdown: &str) -> String {
    let options = Options::ENABLE_STRIKETHROUGH | Options::ENABLE_TABLES;
    let parser = Parser::new_ext(markdown, options).map(|event| match event {
        Event::SoftBreak => Event::HardBreak,
        other => other,
    });

    let mut out = String::with_capacity(markdown.len() * 3 / 2);
    html::push_html(&mut out, parser);
    out.trim_end().to_string()
}
