//! Webhook token authentication
//!
//! Token sources, in order:
//! - `Authorization: Bearer <token>` (only when `enable_bearer_auth` is set)
//! - `?token=<token>`
//!
//! A token is accepted if it matches the endpoint's own `auth_token`, or
//! failing that, any of the global `tokens`.

use crate::config::{Config, EndpointConfig};
use axum::http::{header::AUTHORIZATION, HeaderMap};
use subtle::ConstantTimeEq;
use tracing::{debug, error};

/// Placeholder shown instead of token values in logs and reports
pub const REDACTED: &str = "[REDACTED]";

/// Where a candidate token came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenSource {
    BearerHeader,
    QueryParameter,
}

/// Pull the candidate token out of the request
pub fn extract_token<'a>(
    headers: &'a HeaderMap,
    query: &'a [(String, String)],
    enable_bearer: bool,
) -> Option<(&'a str, TokenSource)> {
    if enable_bearer {
        let bearer = headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "));
        if let Some(token) = bearer {
            return Some((token, TokenSource::BearerHeader));
        }
    }

    query
        .iter()
        .find(|(key, _)| key == "token")
        .map(|(_, value)| (value.as_str(), TokenSource::QueryParameter))
}

/// Decide whether the request may call `endpoint`.
///
/// `endpoint` is `None` for unknown endpoints; only global tokens can match
/// then, so callers learn nothing about which endpoints exist.
pub fn validate_token(
    config: &Config,
    endpoint: Option<&EndpointConfig>,
    headers: &HeaderMap,
    query: &[(String, String)],
) -> bool {
    let Some((candidate, source)) = extract_token(headers, query, config.enable_bearer_auth)
    else {
        error!("No token provided in request (neither Authorization header nor query parameter)");
        return false;
    };
    debug!("Token extracted from {:?}", source);

    if candidate.is_empty() {
        return false;
    }

    let scoped = endpoint
        .and_then(|e| e.auth_token.as_ref())
        .is_some_and(|auth| contains_token(auth.as_slice(), candidate));

    scoped || contains_token(&config.tokens, candidate)
}

/// Constant-time membership check; every entry is compared
fn contains_token(valid: &[String], candidate: &str) -> bool {
    valid.iter().fold(false, |found, token| {
        let equal: bool = token.as_bytes().ct_eq(candidate.as_bytes()).into();
        found | equal
    })
}

/// Copy of the query parameters that is safe to log
pub fn redact_query(query: &[(String, String)]) -> Vec<(String, String)> {
    query
        .iter()
        .map(|(key, value)| {
            if key == "token" {
                (key.clone(), REDACTED.to_string())
            } else {
                (key.clone(), value.clone())
            }
        })
        .collect()
}
