//! Tests for token caching and refresh serialisation
//!
//! Refresh counts are verified by WireMock expectations on the token
//! endpoint, checked when the mock server shuts down.

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use chrono::Utc;
    use futures::future::join_all;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, ResponseTemplate};

    use crate::auth::{CachedToken, ClientIdentity};
    use crate::core::{AuthenticatedClient, RequestExecutor};
    use crate::tests::support::{token_request, token_response, Harness, CLIENT_ID};

    #[tokio::test]
    async fn test_concurrent_callers_share_one_refresh() {
        let harness = Harness::start().await;

        token_request()
            .respond_with(token_response("tok-1").set_delay(Duration::from_millis(200)))
            .expect(1)
            .mount(&harness.server)
            .await;

        let client = harness.builder().build().unwrap();
        let tokens = join_all((0..10).map(|_| client.bearer_token())).await;

        for token in tokens {
            assert_eq!(token.unwrap(), "tok-1");
        }
    }

    #[tokio::test]
    async fn test_concurrent_instances_share_one_refresh() {
        let harness = Harness::start().await;

        token_request()
            .respond_with(token_response("tok-1").set_delay(Duration::from_millis(200)))
            .expect(1)
            .mount(&harness.server)
            .await;

        let clients: Vec<_> = (0..5).map(|_| harness.builder().build().unwrap()).collect();
        let tokens = join_all(clients.iter().map(|client| client.bearer_token())).await;

        for token in tokens {
            assert_eq!(token.unwrap(), "tok-1");
        }
    }

    #[tokio::test]
    async fn test_second_instance_reuses_cached_token() {
        let harness = Harness::start().await;
        harness.mount_token("tok-1", 1).await;

        Mock::given(method("GET"))
            .and(path("/api/facilities"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "facilities": [] })))
            .expect(2)
            .mount(&harness.server)
            .await;

        let first = harness.builder().build().unwrap();
        first.get("/facilities", None).await.unwrap();

        let second = harness.builder().build().unwrap();
        second.get("/facilities", None).await.unwrap();

        assert_eq!(harness.cache.len(), 1);
    }

    #[tokio::test]
    async fn test_identities_refresh_independently() {
        let harness = Harness::start().await;

        Mock::given(method("POST"))
            .and(path(crate::tests::support::TOKEN_PATH))
            .respond_with(token_response("shared-endpoint-token"))
            .expect(2)
            .mount(&harness.server)
            .await;

        let a = harness.builder().client_id("client-a").build().unwrap();
        let b = harness.builder().client_id("client-b").build().unwrap();

        a.bearer_token().await.unwrap();
        b.bearer_token().await.unwrap();
        a.bearer_token().await.unwrap();

        assert_eq!(harness.cache.len(), 2);
    }

    #[tokio::test]
    async fn test_token_inside_safety_margin_is_refreshed() {
        let harness = Harness::start().await;
        harness.mount_token("fresh", 1).await;

        harness.cache.insert(
            ClientIdentity::new(CLIENT_ID),
            CachedToken::new("nearly-expired", Utc::now() + chrono::Duration::seconds(299)),
        );

        let client = harness.builder().build().unwrap();
        assert_eq!(client.bearer_token().await.unwrap(), "fresh");
    }

    #[tokio::test]
    async fn test_token_outside_safety_margin_is_reused() {
        let harness = Harness::start().await;
        harness.forbid_refresh().await;

        harness.cache.insert(
            ClientIdentity::new(CLIENT_ID),
            CachedToken::new("still-good", Utc::now() + chrono::Duration::seconds(301)),
        );

        let client = harness.builder().build().unwrap();
        assert_eq!(client.bearer_token().await.unwrap(), "still-good");
    }

    #[tokio::test]
    async fn test_invalidate_keeps_newer_token() {
        let harness = Harness::start().await;
        harness.forbid_refresh().await;

        let identity = ClientIdentity::new(CLIENT_ID);
        harness.cache.insert(
            identity.clone(),
            CachedToken::new("newer", Utc::now() + chrono::Duration::hours(1)),
        );

        let client = harness.builder().build().unwrap();
        client.invalidate_auth("older").await;

        assert_eq!(harness.cache.get(&identity).unwrap().bearer_token, "newer");
        assert_eq!(client.bearer_token().await.unwrap(), "newer");
    }

    #[test]
    fn test_global_cache_is_shared() {
        assert!(Arc::ptr_eq(
            &crate::auth::TokenCache::global(),
            &crate::auth::TokenCache::global()
        ));
    }
}
