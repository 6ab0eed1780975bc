//! Fabrica Relay - Webhook to Matrix bridge for Riff Labs
//!
//! This crate provides both the relay binary and the reusable pieces behind
//! it: token validation, JSON payload lookup, message templating and Matrix
//! delivery.

pub mod config;
pub mod relay;
pub mod services;
pub mod webhooks;

pub use config::{Config, SharedConfig};
pub use services::matrix::{ChatClient, MatrixClient, MessageKind};
