//! AniList account linking.
//!
//! [`TokenStore`] owns the `oauth:tokens:<userId>` keyspace: code exchange,
//! single-flight refresh, revocation. [`OAuthProvider`] is the token endpoint.

pub mod error;
pub mod oauth;
pub mod tokens;

pub use error::AuthError;
pub use oauth::{HttpOAuthProvider, OAuthProvider, OAuthSettings, TokenGrant, TokenResponse};
pub use tokens::{OAuthToken, TOKEN_KEY_PREFIX, TokenStore};
