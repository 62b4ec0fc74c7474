//! AniList GraphQL upstream.
//!
//! - [`UpstreamClient`]: executes named operations with retry and self-throttling
//! - [`GraphqlTransport`]: the single-request seam, [`HttpTransport`] in production
//! - [`RetryPolicy`]: attempts and exponential backoff
//! - [`RateBudget`]: locally tracked remaining-call budget

pub mod client;
pub mod error;
pub mod queries;
pub mod rate_limit;
pub mod retry;
#[cfg(test)]
pub(crate) mod testing;

pub use client::{GraphqlRequest, GraphqlTransport, HttpTransport, TransportResponse, UpstreamClient};
pub use error::UpstreamError;
pub use queries::Operation;
pub use rate_limit::{RateBudget, RateLimitInfo};
pub use retry::RetryPolicy;
