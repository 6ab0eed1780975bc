//! Clients for external services

pub mod matrix;
