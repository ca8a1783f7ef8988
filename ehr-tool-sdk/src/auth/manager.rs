use std::sync::{Arc, Mutex, PoisonError};

use chrono::Utc;
use tracing::{debug, warn};

use super::cache::TokenCache;
use super::refresher::TokenRefresher;
use super::token::{CachedToken, ClientIdentity};
use crate::error::Result;

/// Hands out bearer tokens for one client instance
///
/// Lookup order is the instance-local token, then the shared cache, then a
/// refresh under the identity's lock with both caches checked again once the
/// lock is held. Concurrent callers for one identity therefore trigger at
/// most one refresh between them.
pub struct TokenManager {
    identity: ClientIdentity,
    cache: Arc<TokenCache>,
    refresher: TokenRefresher,
    local: Mutex<Option<CachedToken>>,
}

impl TokenManager {
    /// Create a manager for `identity` backed by `cache`
    pub fn new(
        identity: ClientIdentity,
        cache: Arc<TokenCache>,
        refresher: TokenRefresher,
    ) -> Self {
        Self {
            identity,
            cache,
            refresher,
            local: Mutex::new(None),
        }
    }

    /// The identity this manager caches under
    pub fn identity(&self) -> &ClientIdentity {
        &self.identity
    }

    /// The cache this manager reads and writes
    pub fn cache(&self) -> &Arc<TokenCache> {
        &self.cache
    }

    /// Return a token valid for at least the safety margin
    pub async fn valid_token(&self) -> Result<String> {
        if let Some(token) = self.cached_token() {
            return Ok(token);
        }

        let lock = self.cache.refresh_lock(&self.identity);
        let _guard = lock.lock().await;

        // Another holder may have refreshed while we waited.
        if let Some(token) = self.cached_token() {
            debug!(identity = %self.identity, "Token refreshed by a concurrent caller");
            return Ok(token);
        }

        let token = self.refresher.refresh().await?;
        let bearer = token.bearer_token.clone();
        self.cache.insert(self.identity.clone(), token.clone());
        self.store_local(Some(token));

        Ok(bearer)
    }

    /// Forget a token the API rejected so the next lookup refreshes
    pub async fn invalidate(&self, rejected_token: &str) {
        warn!(identity = %self.identity, "Invalidating rejected token");
        self.store_local(None);

        let lock = self.cache.refresh_lock(&self.identity);
        let _guard = lock.lock().await;
        self.cache.remove_if_matches(&self.identity, rejected_token);
    }

    fn cached_token(&self) -> Option<String> {
        let now = Utc::now();

        {
            let local = self.local.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some(token) = local.as_ref().filter(|t| t.is_fresh_at(now)) {
                return Some(token.bearer_token.clone());
            }
        }

        let shared = self.cache.get(&self.identity).filter(|t| t.is_fresh_at(now))?;
        let bearer = shared.bearer_token.clone();
        self.store_local(Some(shared));
        Some(bearer)
    }

    fn store_local(&self, token: Option<CachedToken>) {
        *self.local.lock().unwrap_or_else(PoisonError::into_inner) = token;
    }
}
