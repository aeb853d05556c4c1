#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use httpmock::Method::{DELETE, GET, POST};
    use httpmock::MockServer;
    use serde_json::{json, Value};

    use crate::auth::authenticator::CredentialState;
    use crate::client::FitbitClient;
    use crate::credentials::credential::Credential;
    use crate::credentials::token_store::TokenStore;
    use crate::error::ApiError;
    use crate::executor::outcome::{ApiRequest, RequestOutcome};
    use crate::tests::common::{
        connected_client, mock_refresh_success, new_pair, old_pair, test_config, test_config_for,
        FlakyStore, ReadOnlyStore, TOKEN_PATH,
    };

    const SEARCH: &str = "/1/foods/search.json";

    #[tokio::test]
    async fn expired_token_is_refreshed_and_request_retried() {
        let server = MockServer::start_async().await;
        let stale = server
            .mock_async(|when, then| {
                when.method(GET).path(SEARCH).header("authorization", "Bearer old-access");
                then.status(401).json_body(json!({"errors": [{"errorType": "expired_token"}]}));
            })
            .await;
        let fresh = server
            .mock_async(|when, then| {
                when.method(GET)
                    .path(SEARCH)
                    .query_param("query", "apple")
                    .header("authorization", "Bearer new-access");
                then.status(200).json_body(json!({"foods": []}));
            })
            .await;
        let refresh = mock_refresh_success(&server).await;

        let cfg = test_config(&server).await;
        let (client, store) = connected_client(&cfg, old_pair()).await;

        let outcome = client.execute(&ApiRequest::get(SEARCH).param("query", "apple")).await;

        assert_eq!(outcome, RequestOutcome::Success(json!({"foods": []})));
        stale.assert_hits_async(1).await;
        refresh.assert_hits_async(1).await;
        fresh.assert_hits_async(1).await;
        assert_eq!(store.load().await.expect("load"), Some(new_pair()));
    }

    #[tokio::test]
    async fn rejected_refresh_is_auth_failure_and_store_untouched() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path(SEARCH);
                then.status(401);
            })
            .await;
        let refresh = server
            .mock_async(|when, then| {
                when.method(POST).path(TOKEN_PATH);
                then.status(401).json_body(json!({"errors": [{"errorType": "invalid_grant"}]}));
            })
            .await;

        let cfg = test_config(&server).await;
        let (client, store) = connected_client(&cfg, old_pair()).await;

        let outcome = client.execute(&ApiRequest::get(SEARCH).param("query", "apple")).await;

        match outcome {
            RequestOutcome::AuthFailure { status, body } => {
                assert_eq!(status, Some(401));
                assert!(body.contains("invalid_grant"));
            }
            other => panic!("expected auth failure, got {:?}", other),
        }
        refresh.assert_hits_async(1).await;
        assert_eq!(store.load().await.expect("load"), Some(old_pair()));
    }

    #[tokio::test]
    async fn second_401_is_auth_failure_without_another_refresh() {
        let server = MockServer::start_async().await;
        let api = server
            .mock_async(|when, then| {
                when.method(GET).path(SEARCH);
                then.status(401).body("still unauthorized");
            })
            .await;
        let refresh = mock_refresh_success(&server).await;

        let cfg = test_config(&server).await;
        let (client, _store) = connected_client(&cfg, old_pair()).await;

        let outcome = client.execute(&ApiRequest::get(SEARCH).param("query", "apple")).await;

        assert_eq!(
            outcome,
            RequestOutcome::AuthFailure {
                status: Some(401),
                body: "still unauthorized".to_owned()
            }
        );
        api.assert_hits_async(2).await;
        refresh.assert_hits_async(1).await;
    }

    #[tokio::test]
    async fn refresh_that_cannot_be_persisted_is_not_retried() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path(SEARCH).header("authorization", "Bearer old-access");
                then.status(401);
            })
            .await;
        let fresh = server
            .mock_async(|when, then| {
                when.method(GET).path(SEARCH).header("authorization", "Bearer new-access");
                then.status(200).json_body(json!({"foods": []}));
            })
            .await;
        mock_refresh_success(&server).await;

        let cfg = test_config(&server).await;
        let client = FitbitClient::with_store(&cfg, Arc::new(ReadOnlyStore { credential: old_pair() }))
            .expect("client");
        client.authenticator().load().await.expect("load");

        let outcome = client.execute(&ApiRequest::get(SEARCH).param("query", "apple")).await;

        match outcome {
            RequestOutcome::AuthFailure { body, .. } => assert!(body.contains("persisted"), "{}", body),
            other => panic!("expected auth failure, got {:?}", other),
        }
        fresh.assert_hits_async(0).await;
        // the new pair is held back until it can be stored
        assert_eq!(client.credential_state().await, CredentialState::Unpersisted);
        assert!(matches!(
            client.authenticator().current().await,
            Err(ApiError::AuthFailure { .. })
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_401s_all_fail_when_refresh_cannot_be_persisted() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).header("authorization", "Bearer old-access");
                then.status(401);
            })
            .await;
        let fresh = server
            .mock_async(|when, then| {
                when.method(GET).header("authorization", "Bearer new-access");
                then.status(200).json_body(json!({"activities-steps": []}));
            })
            .await;
        let refresh = mock_refresh_success(&server).await;

        let cfg = test_config(&server).await;
        let store = Arc::new(ReadOnlyStore { credential: old_pair() });
        let client = FitbitClient::with_store(&cfg, store.clone()).expect("client");
        client.authenticator().load().await.expect("load");

        let handles: Vec<_> = (1..=8)
            .map(|day| {
                let client = client.clone();
                tokio::spawn(async move {
                    let path = format!("/1/user/-/activities/steps/date/2024-07-0{}/1d.json", day);
                    client.execute(&ApiRequest::get(path)).await
                })
            })
            .collect();

        for handle in handles {
            let outcome = handle.await.expect("task");
            assert!(matches!(outcome, RequestOutcome::AuthFailure { .. }), "{:?}", outcome);
        }
        refresh.assert_hits_async(1).await;
        fresh.assert_hits_async(0).await;
        assert_eq!(store.load().await.expect("load"), Some(old_pair()));
    }

    #[tokio::test]
    async fn unpersisted_pair_is_stored_by_a_later_forced_refresh() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST)
                    .path(TOKEN_PATH)
                    .form_urlencoded_tuple("refresh_token", "new-refresh");
                then.status(200).json_body(json!({
                    "access_token": "newer-access",
                    "refresh_token": "newer-refresh"
                }));
            })
            .await;
        mock_refresh_success(&server).await;

        let cfg = test_config(&server).await;
        let store = Arc::new(FlakyStore::new(old_pair()));
        let client = FitbitClient::with_store(&cfg, store.clone()).expect("client");
        client.authenticator().load().await.expect("load");

        store.set_failing(true);
        assert!(client.authenticator().refresh(&old_pair()).await.is_err());
        assert!(client.authenticator().refresh(&old_pair()).await.is_err());
        assert_eq!(client.credential_state().await, CredentialState::Unpersisted);

        store.set_failing(false);
        assert!(client.refresh_now().await);
        assert_eq!(client.credential_state().await, CredentialState::Refreshed);
        assert_eq!(
            store.load().await.expect("load"),
            Some(Credential::new("newer-access", "newer-refresh"))
        );
    }

    #[tokio::test]
    async fn delete_with_no_content_is_success_true() {
        let server = MockServer::start_async().await;
        let delete = server
            .mock_async(|when, then| {
                when.method(DELETE)
                    .path("/1/user/-/foods/log/987.json")
                    .header("authorization", "Bearer old-access");
                then.status(204);
            })
            .await;

        let cfg = test_config(&server).await;
        let (client, _store) = connected_client(&cfg, old_pair()).await;

        let outcome = client.execute(&ApiRequest::delete("/1/user/-/foods/log/987.json")).await;

        assert_eq!(outcome, RequestOutcome::Success(Value::Bool(true)));
        delete.assert_hits_async(1).await;
    }

    #[tokio::test]
    async fn upstream_errors_pass_through_untouched() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/1/user/-/profile.json");
                then.status(429).body("{\"errors\":[{\"errorType\":\"request\"}]}");
            })
            .await;
        let refresh = mock_refresh_success(&server).await;

        let cfg = test_config(&server).await;
        let (client, _store) = connected_client(&cfg, old_pair()).await;

        let outcome = client.execute(&ApiRequest::get("/1/user/-/profile.json")).await;

        assert_eq!(
            outcome,
            RequestOutcome::UpstreamError {
                status: 429,
                body: "{\"errors\":[{\"errorType\":\"request\"}]}".to_owned()
            }
        );
        refresh.assert_hits_async(0).await;
    }

    #[tokio::test]
    async fn non_json_success_body_is_returned_as_text() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/1/user/-/profile.json");
                then.status(200).body("ok");
            })
            .await;

        let cfg = test_config(&server).await;
        let (client, _store) = connected_client(&cfg, old_pair()).await;

        let outcome = client.execute(&ApiRequest::get("/1/user/-/profile.json")).await;
        assert_eq!(outcome, RequestOutcome::Success(Value::String("ok".to_owned())));
    }

    #[tokio::test]
    async fn unreachable_api_is_a_transport_error() {
        let cfg = test_config_for("http://127.0.0.1:1", "").await;
        let (client, _store) = connected_client(&cfg, old_pair()).await;

        let outcome = client.execute(&ApiRequest::get("/1/user/-/profile.json")).await;
        assert!(matches!(outcome, RequestOutcome::TransportError(_)), "{:?}", outcome);
    }

    #[tokio::test]
    async fn form_body_and_params_reach_provider() {
        let server = MockServer::start_async().await;
        let create = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/1/user/-/foods.json")
                    .query_param("name", "oat bowl")
                    .form_urlencoded_tuple("calories", "350");
                then.status(201).json_body(json!({"food": {"foodId": 1}}));
            })
            .await;

        let cfg = test_config(&server).await;
        let (client, _store) = connected_client(&cfg, old_pair()).await;

        let outcome = client
            .request(
                http::Method::POST,
                "1/user/-/foods.json",
                [("name".to_owned(), "oat bowl".to_owned())].into_iter().collect(),
                Some(crate::executor::outcome::RequestBody::Form(
                    [("calories".to_owned(), "350".to_owned())].into_iter().collect(),
                )),
            )
            .await;

        assert_eq!(outcome, RequestOutcome::Success(json!({"food": {"foodId": 1}})));
        create.assert_hits_async(1).await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_401s_share_one_refresh() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).header("authorization", "Bearer old-access");
                then.status(401);
            })
            .await;
        let fresh = server
            .mock_async(|when, then| {
                when.method(GET).header("authorization", "Bearer new-access");
                then.status(200).json_body(json!({"activities-steps": []}));
            })
            .await;
        let refresh = mock_refresh_success(&server).await;

        let cfg = test_config(&server).await;
        let (client, store) = connected_client(&cfg, old_pair()).await;

        let handles: Vec<_> = (1..=8)
            .map(|day| {
                let client = client.clone();
                tokio::spawn(async move {
                    let path = format!("/1/user/-/activities/steps/date/2024-06-0{}/1d.json", day);
                    client.execute(&ApiRequest::get(path)).await
                })
            })
            .collect();

        for handle in handles {
            let outcome = handle.await.expect("task");
            assert_eq!(outcome, RequestOutcome::Success(json!({"activities-steps": []})));
        }
        refresh.assert_hits_async(1).await;
        fresh.assert_hits_async(8).await;
        assert_eq!(store.load().await.expect("load"), Some(new_pair()));
    }
}
