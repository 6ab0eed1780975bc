//! Webhook HTTP surface

pub mod auth;
pub mod error;
pub mod server;

pub use error::WebhookError;
pub use server::{create_router, start_server, WebhookState};
