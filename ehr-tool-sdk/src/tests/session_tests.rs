//! Tests for scoped client sessions
//!
//! A session opens the transport on acquisition and closes it exactly once
//! when dropped, however the scope ends.

#[cfg(test)]
mod tests {
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, ResponseTemplate};

    use crate::client::{EhrClient, TransportState};
    use crate::core::RequestExecutor;
    use crate::error::{Result, ServiceError};
    use crate::tests::support::Harness;

    async fn mount_facilities(harness: &Harness) {
        Mock::given(method("GET"))
            .and(path("/api/facilities"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "facilities": [] })))
            .mount(&harness.server)
            .await;
    }

    #[tokio::test]
    async fn test_session_opens_and_closes_transport() {
        let harness = Harness::start().await;
        harness.mount_token("tok-1", 1).await;
        mount_facilities(&harness).await;

        let client = harness.builder().build().unwrap();
        assert_eq!(client.transport_state(), TransportState::Idle);

        {
            let session = client.acquire().unwrap();
            assert_eq!(session.transport_state(), TransportState::Open);
            session.get("/facilities", None).await.unwrap();
        }

        assert_eq!(client.transport_state(), TransportState::Released);
        assert!(!client.release(), "transport already closed");
    }

    #[tokio::test]
    async fn test_overlapping_sessions_keep_transport_open() {
        let harness = Harness::start().await;
        harness.mount_token("tok-1", 1).await;
        mount_facilities(&harness).await;

        let client = harness.builder().build().unwrap();
        let shared = client.clone();

        let tool_a = client.acquire().unwrap();
        let tool_b = shared.acquire().unwrap();
        assert_eq!(client.active_sessions(), 2);

        tool_a.get("/facilities", None).await.unwrap();
        drop(tool_a);

        assert_eq!(client.active_sessions(), 1);
        assert_eq!(tool_b.transport_state(), TransportState::Open);
        assert_eq!(
            tool_b.get("/facilities", None).await.unwrap(),
            json!({ "facilities": [] })
        );

        drop(tool_b);
        assert_eq!(client.active_sessions(), 0);
        assert_eq!(client.transport_state(), TransportState::Released);
    }

    #[tokio::test]
    async fn test_calls_after_release_fail() {
        let harness = Harness::start().await;
        harness.forbid_refresh().await;

        let client = harness.builder().build().unwrap();
        client.acquire().unwrap().close();

        let result = client.get("/facilities", None).await;
        assert!(matches!(result, Err(ServiceError::ClientReleased(_))));
        assert_eq!(harness.instrumentation.api_started_count(), 0);
    }

    #[tokio::test]
    async fn test_reacquire_reopens_transport() {
        let harness = Harness::start().await;
        harness.mount_token("tok-1", 1).await;
        mount_facilities(&harness).await;

        let client = harness.builder().build().unwrap();
        client.acquire().unwrap().close();

        let session = client.acquire().unwrap();
        assert_eq!(session.transport_state(), TransportState::Open);
        assert_eq!(
            session.get("/facilities", None).await.unwrap(),
            json!({ "facilities": [] })
        );
    }

    #[tokio::test]
    async fn test_early_return_releases_session() {
        let harness = Harness::start().await;
        harness.forbid_refresh().await;

        async fn failing_tool(client: &EhrClient) -> Result<()> {
            let _session = client.acquire()?;
            let lookup: Option<()> = None;
            lookup.ok_or_else(|| ServiceError::internal("tool gave up"))?;
            Ok(())
        }

        let client = harness.builder().build().unwrap();
        assert!(failing_tool(&client).await.is_err());
        assert_eq!(client.transport_state(), TransportState::Released);
    }

    #[tokio::test]
    async fn test_panic_releases_session() {
        let harness = Harness::start().await;
        harness.forbid_refresh().await;

        let client = harness.builder().build().unwrap();
        let task_client = client.clone();

        let outcome = tokio::spawn(async move {
            let _session = task_client.acquire().unwrap();
            panic!("tool crashed while holding a session");
        })
        .await;

        assert!(outcome.is_err());
        assert_eq!(client.transport_state(), TransportState::Released);
    }

    #[tokio::test]
    async fn test_release_keeps_cached_token() {
        let harness = Harness::start().await;
        harness.mount_token("tok-1", 1).await;
        mount_facilities(&harness).await;

        let client = harness.builder().build().unwrap();
        {
            let session = client.acquire().unwrap();
            session.get("/facilities", None).await.unwrap();
        }

        assert!(harness.cache.get(client.identity()).is_some());

        // Served from the cache; the token mock allows a single refresh.
        let session = client.acquire().unwrap();
        session.get("/facilities", None).await.unwrap();
    }
}
