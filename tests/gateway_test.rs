//! End-to-end gateway tests: cache tiers, headers, ledger accounting,
//! rate limiting, streaming, and client authentication.

use std::time::Duration;

use futures_util::StreamExt;
use serde_json::json;
use tempfile::TempDir;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use greengate::{
    CacheConfig, ChatRequest, Gateway, GatewayError, GreenGate, Message, ProviderKind,
    ProviderProfile, RequestContext, RetryConfig, ServeStatus,
};

fn completion_body() -> serde_json::Value {
    json!({
        "id": "chatcmpl-1",
        "choices": [{"message": {"role": "assistant", "content": "Paris."}}],
        "usage": {"prompt_tokens": 100, "completion_tokens": 50}
    })
}

fn gateway(server: &MockServer, dir: &TempDir) -> Gateway {
    GreenGate::builder()
        .provider(ProviderProfile::new(ProviderKind::OpenAi, server.uri()).api_key("sk-test"))
        .retry(RetryConfig::disabled())
        .ledger_path(dir.path().join("energy.db"))
        .build()
        .unwrap()
}

fn capital_question(text: &str) -> ChatRequest {
    ChatRequest::new("gpt-4", vec![Message::user(text)])
}

// ============================================================================
// Cache tiers
// ============================================================================

#[tokio::test]
async fn miss_then_exact_hit() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion_body()))
        .expect(1)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let gateway = gateway(&server, &dir);
    let request = capital_question("What is the capital of France?");

    let first = gateway
        .handle(request.clone(), RequestContext::new())
        .await
        .unwrap();
    assert_eq!(first.headers.status, ServeStatus::CacheMiss);
    // 150 tokens * 0.03 J/token * 1.0
    assert_eq!(first.headers.energy_joules, "4.5");
    assert_eq!(first.headers.similarity.as_deref(), Some("0.000"));
    assert_eq!(first.headers.provider, "openai");
    assert_eq!(first.json().unwrap()["id"], "chatcmpl-1");

    let second = gateway
        .handle(request, RequestContext::new())
        .await
        .unwrap();
    assert_eq!(second.headers.status, ServeStatus::CacheHit);
    assert_eq!(second.headers.energy_joules, "0.0");
    assert_eq!(second.headers.similarity.as_deref(), Some("1.000"));
    assert_eq!(second.headers.provider, "cache");
    assert_eq!(second.json(), first.json());

    let snapshot = gateway.ledger().snapshot().await.unwrap();
    assert_eq!(snapshot.requests, 2);
    assert!((snapshot.energy_spent - 4.5).abs() < 1e-9);
    assert!((snapshot.energy_saved - 4.5).abs() < 1e-9);

    let recent = gateway.ledger().recent(10).await.unwrap();
    assert_eq!(recent.len(), 2);
    assert_eq!(recent[0].spent, 0.0);
    assert_eq!(recent[0].prompt_tokens, 100);
}

#[tokio::test]
async fn similar_prompt_is_served_from_cache() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion_body()))
        .expect(1)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let gateway = gateway(&server, &dir);

    gateway
        .handle(
            capital_question("What is the capital of France?"),
            RequestContext::new(),
        )
        .await
        .unwrap();
    let hit = gateway
        .handle(
            capital_question("what is the capital of FRANCE"),
            RequestContext::new(),
        )
        .await
        .unwrap();

    assert_eq!(hit.headers.status, ServeStatus::CacheHit);
    assert_eq!(hit.headers.provider, "cache");
    // Promoted into the exact tier.
    assert_eq!(gateway.cache().exact_entries().await, 2);
}

#[tokio::test]
async fn dissimilar_prompt_goes_upstream() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion_body()))
        .expect(2)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let gateway = GreenGate::builder()
        .provider(ProviderProfile::new(ProviderKind::OpenAi, server.uri()))
        .cache(CacheConfig::new().similarity_threshold(0.99))
        .ledger_path(dir.path().join("energy.db"))
        .build()
        .unwrap();

    for prompt in ["What is the capital of France?", "Tell me a joke about cats"] {
        let response = gateway
            .handle(capital_question(prompt), RequestContext::new())
            .await
            .unwrap();
        assert_eq!(response.headers.status, ServeStatus::CacheMiss);
    }
}

#[tokio::test]
async fn missing_usage_is_estimated_locally() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{"message": {"content": "Paris is the capital of France."}}]
        })))
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let gateway = gateway(&server, &dir);
    let response = gateway
        .handle(
            capital_question("What is the capital of France?"),
            RequestContext::new(),
        )
        .await
        .unwrap();

    let energy: f64 = response.headers.energy_joules.parse().unwrap();
    assert!(energy > 0.0);
    let recent = gateway.ledger().recent(1).await.unwrap();
    assert!(recent[0].prompt_tokens > 0);
    assert!(recent[0].completion_tokens > 0);
}

// ============================================================================
// Failures
// ============================================================================

#[tokio::test]
async fn upstream_error_passes_through_and_is_not_recorded() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(401).set_body_string("{\"error\":\"bad key\"}"))
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let gateway = gateway(&server, &dir);
    let err = gateway
        .handle(capital_question("hello"), RequestContext::new())
        .await
        .unwrap_err();

    assert_eq!(err.status_code(), 401);
    assert_eq!(err.detail(), "{\"error\":\"bad key\"}");
    assert_eq!(gateway.ledger().snapshot().await.unwrap().requests, 0);
    assert_eq!(gateway.cache().exact_entries().await, 0);
}

#[tokio::test]
async fn invalid_request_is_rejected_before_routing() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion_body()))
        .expect(0)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let gateway = gateway(&server, &dir);

    let no_messages = ChatRequest::new("gpt-4", vec![]);
    let err = gateway
        .handle(no_messages, RequestContext::new())
        .await
        .unwrap_err();
    assert!(matches!(err, GatewayError::Validation(_)));
    assert_eq!(err.status_code(), 400);

    let hot = capital_question("hi").temperature(3.0);
    assert!(gateway.handle(hot, RequestContext::new()).await.is_err());
}

#[tokio::test]
async fn rate_limit_applies_per_identity() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion_body()))
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let gateway = GreenGate::builder()
        .provider(ProviderProfile::new(ProviderKind::OpenAi, server.uri()))
        .rate_limit_per_minute(1)
        .ledger_path(dir.path().join("energy.db"))
        .build()
        .unwrap();

    let ctx = RequestContext::new().client_addr("10.0.0.1");
    gateway
        .handle(capital_question("one"), ctx.clone())
        .await
        .unwrap();
    let err = gateway
        .handle(capital_question("two"), ctx)
        .await
        .unwrap_err();
    assert!(matches!(err, GatewayError::RateLimitExceeded));
    assert_eq!(err.status_code(), 429);

    // The user field takes precedence over the client address.
    let as_user = capital_question("three").user("alice");
    gateway
        .handle(as_user, RequestContext::new().client_addr("10.0.0.1"))
        .await
        .unwrap();
}

#[tokio::test]
async fn no_matching_provider_is_service_unavailable() {
    let dir = TempDir::new().unwrap();
    let gateway = GreenGate::builder()
        .provider(ProviderKind::Cohere.default_profile())
        .ledger_path(dir.path().join("energy.db"))
        .build()
        .unwrap();

    let err = gateway
        .handle(capital_question("hello"), RequestContext::new())
        .await
        .unwrap_err();
    assert!(matches!(err, GatewayError::NoProviderAvailable { .. }));
}

// ============================================================================
// Streaming
// ============================================================================

#[tokio::test]
async fn streaming_passes_chunks_through_and_records_energy() {
    let server = MockServer::start().await;
    let sse = "data: {\"choices\":[{\"delta\":{\"content\":\"Paris\"}}]}\n\ndata: [DONE]\n\n";
    Mock::given(method("POST"))
        .and(body_partial_json(json!({"stream": true})))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/event-stream")
                .set_body_string(sse),
        )
        .expect(1)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let gateway = gateway(&server, &dir);
    let request = capital_question("What is the capital of France?").stream(true);

    let response = gateway
        .handle(request, RequestContext::new())
        .await
        .unwrap();
    assert_eq!(response.headers.status, ServeStatus::Streaming);
    assert_eq!(response.headers.provider, "openai");
    assert!(response.headers.similarity.is_none());
    let header_energy: f64 = response.headers.energy_joules.parse().unwrap();
    assert!(header_energy > 0.0);

    let mut stream = response.into_stream().expect("streamed body");
    let mut body = Vec::new();
    while let Some(chunk) = stream.next().await {
        body.extend_from_slice(&chunk.unwrap());
    }
    assert_eq!(String::from_utf8(body).unwrap(), sse);

    // The ledger write runs in the background once the stream finishes.
    let snapshot = wait_for_requests(&gateway, 1).await;
    assert!((snapshot.energy_spent - header_energy).abs() < 1e-9);
    assert_eq!(snapshot.energy_saved, 0.0);

    // Streams never populate the cache.
    assert_eq!(gateway.cache().exact_entries().await, 0);
}

#[tokio::test]
async fn multi_chunk_stream_is_recorded_once() {
    let server = MockServer::start().await;
    let sse = [
        "data: {\"choices\":[{\"delta\":{\"content\":\"The\"}}]}\n\n",
        "data: {\"choices\":[{\"delta\":{\"content\":\" capital\"}}]}\n\n",
        "data: {\"choices\":[{\"delta\":{\"content\":\" is\"}}]}\n\n",
        "data: {\"choices\":[{\"delta\":{\"content\":\" Paris.\"}}]}\n\n",
        "data: [DONE]\n\n",
    ]
    .concat();
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/event-stream")
                .set_body_string(sse.clone()),
        )
        .expect(1)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let gateway = gateway(&server, &dir);
    let response = gateway
        .handle(
            capital_question("What is the capital of France?").stream(true),
            RequestContext::new(),
        )
        .await
        .unwrap();

    let mut stream = response.into_stream().expect("streamed body");
    let mut body = Vec::new();
    while let Some(chunk) = stream.next().await {
        body.extend_from_slice(&chunk.unwrap());
    }
    assert_eq!(String::from_utf8(body).unwrap(), sse);
    drop(stream);

    let snapshot = wait_for_requests(&gateway, 1).await;
    assert_eq!(snapshot.requests, 1);

    // No late duplicate write from the finalizer.
    tokio::time::sleep(Duration::from_millis(100)).await;
    let snapshot = gateway.ledger().snapshot().await.unwrap();
    assert_eq!(snapshot.requests, 1);
    assert_eq!(gateway.cache().exact_entries().await, 0);
}

#[tokio::test]
async fn dropped_stream_is_still_recorded() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_string("data: [DONE]\n\n"))
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let gateway = gateway(&server, &dir);
    let response = gateway
        .handle(capital_question("hi").stream(true), RequestContext::new())
        .await
        .unwrap();
    drop(response);

    let snapshot = wait_for_requests(&gateway, 1).await;
    assert_eq!(snapshot.requests, 1);
}

async fn wait_for_requests(gateway: &Gateway, expected: u64) -> greengate::LedgerSnapshot {
    for _ in 0..100 {
        let snapshot = gateway.ledger().snapshot().await.unwrap();
        if snapshot.requests >= expected {
            return snapshot;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("ledger never reached {expected} requests");
}

// ============================================================================
// Status, models, auth
// ============================================================================

#[tokio::test]
async fn status_reports_project_and_totals() {
    let dir = TempDir::new().unwrap();
    let gateway = GreenGate::builder()
        .project("GreenGate", "test")
        .ledger_path(dir.path().join("energy.db"))
        .build()
        .unwrap();

    let status = gateway.status().await.unwrap();
    assert_eq!(status.project, "GreenGate");
    assert_eq!(status.environment, "test");
    assert_eq!(status.requests_served, 0);
    assert_eq!(status.energy_spent_joules, 0.0);
}

#[tokio::test]
async fn list_models_merges_providers() {
    let dir = TempDir::new().unwrap();
    let gateway = GreenGate::builder()
        .provider(ProviderKind::OpenAi.default_profile())
        .provider(ProviderKind::AzureOpenAi.default_profile().models(["gpt-4o"]))
        .provider(ProviderProfile::new(ProviderKind::OpenAi, "http://any").name("wildcard"))
        .ledger_path(dir.path().join("energy.db"))
        .build()
        .unwrap();

    let models = gateway.list_models();
    let gpt4o = models.iter().find(|m| m.id == "gpt-4o").unwrap();
    assert_eq!(gpt4o.providers, ["azure-openai", "openai"]);
    assert!(models.windows(2).all(|w| w[0].id < w[1].id));
    assert!(models.iter().all(|m| !m.providers.contains(&"wildcard".to_string())));
}

#[test]
fn authorize_accepts_bearer_or_api_key() {
    let dir = TempDir::new().unwrap();
    let gateway = GreenGate::builder()
        .gateway_key("gw-secret")
        .ledger_path(dir.path().join("energy.db"))
        .build()
        .unwrap();

    assert!(gateway.authorize(Some("Bearer gw-secret"), None).is_ok());
    assert!(gateway.authorize(Some("bearer gw-secret"), None).is_ok());
    assert!(gateway.authorize(None, Some("gw-secret")).is_ok());
    assert!(matches!(
        gateway.authorize(Some("Bearer wrong"), None),
        Err(GatewayError::Unauthorized)
    ));
    assert!(gateway.authorize(None, None).is_err());
    assert!(gateway.authorize(Some("gw-secret"), None).is_err());
}

#[test]
fn authorize_is_open_without_gateway_key() {
    let dir = TempDir::new().unwrap();
    let gateway = GreenGate::builder()
        .ledger_path(dir.path().join("energy.db"))
        .build()
        .unwrap();
    assert!(gateway.authorize(None, None).is_ok());
}

#[test]
fn builder_rejects_invalid_settings() {
    assert!(GreenGate::builder().rate_limit_per_minute(0).build().is_err());
    assert!(
        GreenGate::builder()
            .cache(CacheConfig::new().similarity_threshold(1.5))
            .build()
            .is_err()
    );
    assert!(GreenGate::builder().timeout(Duration::ZERO).build().is_err());
}

#[tokio::test]
async fn closed_gateway_still_serves_cache_hits() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion_body()))
        .expect(1)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let gateway = gateway(&server, &dir);
    let request = capital_question("What is the capital of France?");
    gateway
        .handle(request.clone(), RequestContext::new())
        .await
        .unwrap();

    gateway.close();
    let hit = gateway
        .handle(request, RequestContext::new())
        .await
        .unwrap();
    assert_eq!(hit.headers.status, ServeStatus::CacheHit);

    let miss = gateway
        .handle(capital_question("Tell me a joke"), RequestContext::new())
        .await;
    assert!(miss.is_err());
}
