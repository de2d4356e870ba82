//! HTTP client for the remote check-in authority.

mod client;
mod error;
mod types;

pub use client::{RemoteApiClient, RemoteEndpoint};
pub use error::{RemoteApiError, Result};
pub use types::*;
