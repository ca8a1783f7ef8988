use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use once_cell::sync::Lazy;

use super::token::{CachedToken, ClientIdentity};

static GLOBAL_CACHE: Lazy<Arc<TokenCache>> = Lazy::new(|| Arc::new(TokenCache::new()));

/// Process-wide bearer token cache keyed by client identity
///
/// Entries are shared by every client built with the same identity. Writes
/// happen only while the identity's refresh lock is held; reads are taken
/// without it and must be re-checked under the lock before a refresh.
#[derive(Debug, Default)]
pub struct TokenCache {
    tokens: RwLock<HashMap<ClientIdentity, CachedToken>>,
    locks: Mutex<HashMap<ClientIdentity, Arc<tokio::sync::Mutex<()>>>>,
}

impl TokenCache {
    /// Create an isolated cache
    pub fn new() -> Self {
        Self::default()
    }

    /// The cache shared by clients that were not given one explicitly
    pub fn global() -> Arc<TokenCache> {
        Arc::clone(&GLOBAL_CACHE)
    }

    /// Current entry for an identity, fresh or not
    pub fn get(&self, identity: &ClientIdentity) -> Option<CachedToken> {
        self.tokens
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(identity)
            .cloned()
    }

    /// Store a token for an identity, replacing any previous entry
    pub fn insert(&self, identity: ClientIdentity, token: CachedToken) {
        self.tokens
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(identity, token);
    }

    /// Remove the entry for an identity if it still holds `bearer_token`
    ///
    /// Returns true when an entry was removed. A newer token written by a
    /// concurrent refresh is left in place.
    pub fn remove_if_matches(&self, identity: &ClientIdentity, bearer_token: &str) -> bool {
        let mut tokens = self.tokens.write().unwrap_or_else(PoisonError::into_inner);
        match tokens.get(identity) {
            Some(entry) if entry.bearer_token == bearer_token => {
                tokens.remove(identity);
                true
            }
            _ => false,
        }
    }

    /// Drop every cached token
    pub fn clear(&self) {
        self.tokens.write().unwrap_or_else(PoisonError::into_inner).clear();
    }

    /// The refresh lock for an identity, created on first use
    pub fn refresh_lock(&self, identity: &ClientIdentity) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(
            locks
                .entry(identity.clone())
                .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(()))),
        )
    }

    /// Number of identities with a cached token
    pub fn len(&self) -> usize {
        self.tokens.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Whether no tokens are cached
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    #[test]
    fn test_insert_and_get() {
        let cache = TokenCache::new();
        let identity = ClientIdentity::new("client-a");
        cache.insert(identity.clone(), CachedToken::new("tok", Utc::now() + Duration::hours(1)));

        assert_eq!(cache.get(&identity).map(|t| t.bearer_token), Some("tok".to_string()));
        assert!(cache.get(&ClientIdentity::new("client-b")).is_none());
    }

    #[test]
    fn test_remove_if_matches_keeps_newer_token() {
        let cache = TokenCache::new();
        let identity = ClientIdentity::new("client-a");
        cache.insert(identity.clone(), CachedToken::new("new", Utc::now() + Duration::hours(1)));

        assert!(!cache.remove_if_matches(&identity, "old"));
        assert!(cache.get(&identity).is_some());

        assert!(cache.remove_if_matches(&identity, "new"));
        assert!(cache.is_empty());
    }

    #[test]
    fn test_refresh_lock_is_shared_per_identity() {
        let cache = TokenCache::new();
        let a = ClientIdentity::new("client-a");

        let first = cache.refresh_lock(&a);
        let second = cache.refresh_lock(&a);
        let other = cache.refresh_lock(&ClientIdentity::new("client-b"));

        assert!(Arc::ptr_eq(&first, &second));
        assert!(!Arc::ptr_eq(&first, &other));
    }
}
