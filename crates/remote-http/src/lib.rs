//! HTTP implementation of the remote store contract.

mod client;
mod error;

pub use client::{CollectionClient, RemoteStoreClient};
pub use error::classify_response_error;
