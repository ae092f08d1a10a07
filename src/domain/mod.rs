//! Domain types shared by the federated search engine and the metadata client.

pub mod error;
pub mod identity;
pub mod metadata;
pub mod proxy;
pub mod search;
pub mod source;
