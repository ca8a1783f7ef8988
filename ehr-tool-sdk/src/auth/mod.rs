//! OAuth2 token lifecycle for the EHR API
//!
//! - [`TokenCache`]: process-wide token store and per-identity refresh locks
//! - [`TokenRefresher`]: the refresh-token grant against the identity provider
//! - [`TokenManager`]: per-client lookup with double-checked refresh
//!
//! Tokens are treated as stale [`TOKEN_SAFETY_MARGIN_SECS`] seconds before
//! their reported expiry and are never persisted.

mod cache;
mod manager;
mod refresher;
mod token;

pub use cache::TokenCache;
pub use manager::TokenManager;
pub use refresher::TokenRefresher;
pub use token::{CachedToken, ClientIdentity, DEFAULT_EXPIRES_IN_SECS, TOKEN_SAFETY_MARGIN_SECS};
