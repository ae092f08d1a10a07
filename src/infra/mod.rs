//! Infrastructure adapters and runtime bootstrap.

pub mod catalog;
pub mod downstream;
pub mod error;
pub mod fetch;
pub mod http;
pub mod telemetry;
