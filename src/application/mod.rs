//! Application services: federated search and metadata retrieval.

pub mod error;
pub mod filter;
pub mod metadata;
pub mod notify;
pub mod ports;
pub mod retry;
pub mod search;
