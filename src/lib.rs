//! Federated film/TV search with a proxy-aware metadata client.

pub mod application;
pub mod cache;
pub mod config;
pub mod domain;
pub mod infra;
