//! HTTP API access: authentication resolution and the request client

pub mod auth;
pub mod client;

pub use auth::{AuthResolver, RequestContext, TokenTransport};
pub use client::{join_url, ApiClient};
