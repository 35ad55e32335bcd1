mod harness;

use harness::config::ConfigBuilder;
use harness::mock_provider::MockProvider;
use harness::server::TestServer;
use serde_json::json;

fn completion_body(model: &str) -> serde_json::Value {
    json!({
        "model": model,
        "messages": [{"role": "user", "content": "Hello"}]
    })
}

/// Spec scenario: candidates [A, B, C] with rotation, A and C always fail,
/// B succeeds. Start indices advance 0, 1, 2, 0, 1 across five requests from
/// the same caller, and the cursor advances even when the starting candidate
/// fails.
#[tokio::test]
async fn rotation_advances_start_index_per_request() {
    let a = MockProvider::start_always_failing().await.unwrap();
    let b = MockProvider::start().await.unwrap();
    let c = MockProvider::start_always_failing().await.unwrap();

    let config = ConfigBuilder::new()
        .with_provider("a", &a.base_url())
        .with_provider("b", &b.base_url())
        .with_provider("c", &c.base_url())
        .with_simple_rule(
            "m3",
            &[("a", "model-a"), ("b", "model-b"), ("c", "model-c")],
            true,
        )
        .build();
    let server = TestServer::start(config).await.unwrap();

    for _ in 0..5 {
        let resp = server
            .client()
            .post(server.url("/v1/chat/completions"))
            .json(&completion_body("m3"))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);
    }

    // start 0: A fail -> B ok        (A=1, B=1)
    // start 1: B ok                  (B=2)
    // start 2: C fail -> A fail -> B (C=1, A=2, B=3)
    // start 0: A fail -> B ok        (A=3, B=4)
    // start 1: B ok                  (B=5)
    assert_eq!(a.completion_count(), 3);
    assert_eq!(b.completion_count(), 5);
    assert_eq!(c.completion_count(), 1);
}

#[tokio::test]
async fn rotation_is_disabled_for_single_candidate_rules() {
    let a = MockProvider::start().await.unwrap();

    let config = ConfigBuilder::new()
        .with_provider("a", &a.base_url())
        .with_simple_rule("m3", &[("a", "model-a")], true)
        .build();
    let server = TestServer::start(config).await.unwrap();

    for _ in 0..3 {
        let resp = server
            .client()
            .post(server.url("/v1/chat/completions"))
            .json(&completion_body("m3"))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);
    }

    assert_eq!(a.completion_count(), 3);
}

#[tokio::test]
async fn rotation_cursor_is_keyed_by_bearer_token() {
    let a = MockProvider::start_with_response("from a").await.unwrap();
    let b = MockProvider::start_with_response("from b").await.unwrap();

    let config = ConfigBuilder::new()
        .with_provider("a", &a.base_url())
        .with_provider("b", &b.base_url())
        .with_simple_rule("m3", &[("a", "model-a"), ("b", "model-b")], true)
        .with_gateway_key("gw-key")
        .build();
    let server = TestServer::start(config).await.unwrap();

    // The rotation cursor is keyed by the raw bearer token; repeated
    // requests from the same token walk the candidate list in order.
    for expected in ["from a", "from b", "from a"] {
        let resp = server
            .client()
            .post(server.url("/v1/chat/completions"))
            .header("authorization", "Bearer gw-key")
            .json(&completion_body("m3"))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);
        let body: serde_json::Value = resp.json().await.unwrap();
        assert_eq!(body["choices"][0]["message"]["content"], expected);
    }
}
