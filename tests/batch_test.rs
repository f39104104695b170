mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{execute_calls, execute_ids, MockTransport};
use serde_json::{json, Value};
use tokio::time::sleep;

use vk_gateway::{params, ApiClient, CallError, ClientConfig, TransportError};

fn test_config() -> ClientConfig {
    ClientConfig {
        flush_interval: Duration::from_millis(20),
        api_base_url: "https://api.test/method".to_string(),
        ..Default::default()
    }
}

fn test_client(transport: Arc<MockTransport>) -> ApiClient {
    ApiClient::with_transport("test-token", test_config(), transport)
}

#[tokio::test]
async fn one_execute_request_carries_all_queued_calls() {
    let transport = MockTransport::new();
    transport.auto_ok(json!(1)).await;
    let client = test_client(transport.clone());

    let mut handles = Vec::new();
    for i in 0..5 {
        let client = client.clone();
        handles.push(tokio::spawn(async move {
            client.call("test.echo", params(json!({ "i": i }))).await
        }));
    }

    for handle in handles {
        let result = handle.await.expect("join");
        assert_eq!(result, Ok(json!(1)));
    }

    let executes = transport.recorded_executes().await;
    assert_eq!(executes.len(), 1);
    assert_eq!(execute_ids(executes[0].code().expect("code")).len(), 5);
}

#[tokio::test]
async fn overflow_splits_into_ordered_batches() {
    let transport = MockTransport::new();
    transport.auto_ok(json!(1)).await;
    let client = test_client(transport.clone());

    let mut handles = Vec::new();
    for i in 0..30 {
        let client = client.clone();
        handles.push(tokio::spawn(async move {
            client.call("test.echo", params(json!({ "i": i }))).await
        }));
        // Enqueue strictly in submission order.
        tokio::task::yield_now().await;
    }

    for handle in handles {
        assert!(handle.await.expect("join").is_ok());
    }

    let executes = transport.recorded_executes().await;
    assert_eq!(executes.len(), 2);

    let first = execute_calls(executes[0].code().expect("code"));
    let second = execute_calls(executes[1].code().expect("code"));
    assert_eq!(first.len(), 25);
    assert_eq!(second.len(), 5);

    let markers: Vec<i64> = first
        .iter()
        .chain(second.iter())
        .map(|(_, _, call_params)| call_params["i"].as_i64().expect("marker"))
        .collect();
    assert_eq!(markers, (0..30).collect::<Vec<i64>>());
}

#[tokio::test]
async fn results_route_by_correlation_id_not_position() {
    let transport = MockTransport::new();
    // Answer in reverse order: correlation must still route correctly.
    transport
        .respond_with(|request| {
            let code = request.code().unwrap_or_default();
            let mut pairs: Vec<Value> = execute_calls(code)
                .into_iter()
                .map(|(id, _, call_params)| json!([id, call_params["i"].clone()]))
                .collect();
            pairs.reverse();
            Ok(json!({ "response": pairs }))
        })
        .await;
    let client = test_client(transport.clone());

    let mut handles = Vec::new();
    for i in 0..5 {
        let client = client.clone();
        handles.push(tokio::spawn(async move {
            client.call("test.echo", params(json!({ "i": i }))).await
        }));
    }

    for (i, handle) in handles.into_iter().enumerate() {
        assert_eq!(handle.await.expect("join"), Ok(json!(i)));
    }
}

#[tokio::test]
async fn transport_failure_rejects_every_call_in_the_batch() {
    let transport = MockTransport::new();
    transport
        .respond_with(|_| Err(TransportError::Network("connection refused".to_string())))
        .await;
    let client = test_client(transport.clone());

    let mut handles = Vec::new();
    for _ in 0..3 {
        let client = client.clone();
        handles.push(tokio::spawn(async move {
            client.call("test.echo", params(json!({}))).await
        }));
    }

    for handle in handles {
        let result = handle.await.expect("join");
        assert!(matches!(result, Err(CallError::Transport(_))));
    }
}

#[tokio::test]
async fn remote_envelope_error_rejects_every_call_verbatim() {
    let transport = MockTransport::new();
    transport
        .respond_with(|_| {
            Ok(json!({ "error": { "error_code": 5, "error_msg": "auth failed" } }))
        })
        .await;
    let client = test_client(transport.clone());

    let result = client.call("test.echo", params(json!({}))).await;
    match result {
        Err(CallError::Remote(error)) => {
            assert_eq!(error.code(), Some(5));
            assert_eq!(error.message(), Some("auth failed"));
        }
        other => panic!("expected remote error, got {:?}", other),
    }
}

#[tokio::test]
async fn item_failures_consume_error_queue_in_fifo_order() {
    let transport = MockTransport::new();
    transport
        .respond_with(|request| {
            let code = request.code().unwrap_or_default();
            let calls = execute_calls(code);
            // First and third calls fail; errors are queued in that order.
            let pairs: Vec<Value> = calls
                .iter()
                .enumerate()
                .map(|(index, (id, _, call_params))| {
                    if index == 0 || index == 2 {
                        json!([id, false])
                    } else {
                        json!([id, call_params["i"].clone()])
                    }
                })
                .collect();
            Ok(json!({
                "response": pairs,
                "execute_errors": [
                    { "method": "test.echo", "error_code": 100, "error_msg": "first failure" },
                    { "method": "test.echo", "error_code": 200, "error_msg": "second failure" },
                ]
            }))
        })
        .await;
    let client = test_client(transport.clone());

    let mut handles = Vec::new();
    for i in 0..3 {
        let client = client.clone();
        handles.push(tokio::spawn(async move {
            client.call("test.echo", params(json!({ "i": i }))).await
        }));
        tokio::task::yield_now().await;
    }

    let outcomes: Vec<_> = {
        let mut out = Vec::new();
        for handle in handles {
            out.push(handle.await.expect("join"));
        }
        out
    };

    match &outcomes[0] {
        Err(CallError::Remote(error)) => assert_eq!(error.code(), Some(100)),
        other => panic!("expected first queued error, got {:?}", other),
    }
    assert_eq!(outcomes[1], Ok(json!(1)));
    match &outcomes[2] {
        Err(CallError::Remote(error)) => assert_eq!(error.code(), Some(200)),
        other => panic!("expected second queued error, got {:?}", other),
    }
}

#[tokio::test]
async fn failure_sentinel_with_exhausted_error_queue_resolves_as_is() {
    let transport = MockTransport::new();
    transport
        .respond_with(|request| {
            let code = request.code().unwrap_or_default();
            let pairs: Vec<Value> = execute_ids(code)
                .into_iter()
                .map(|id| json!([id, false]))
                .collect();
            Ok(json!({ "response": pairs }))
        })
        .await;
    let client = test_client(transport.clone());

    let result = client.call("test.echo", params(json!({}))).await;
    assert_eq!(result, Ok(json!(false)));
}

#[tokio::test]
async fn unanswered_call_rejects_instead_of_dangling() {
    let transport = MockTransport::new();
    transport
        .respond_with(|_| Ok(json!({ "response": [] })))
        .await;
    let client = test_client(transport.clone());

    let result = client.call("test.echo", params(json!({}))).await;
    assert!(matches!(result, Err(CallError::Protocol(_))));
}

#[tokio::test]
async fn direct_call_injects_version_and_token_defaults() {
    let transport = MockTransport::new();
    transport
        .push_response(Ok(json!({ "response": { "ok": true } })))
        .await;
    let client = test_client(transport.clone());

    let result = client.call_direct("users.get", params(json!({}))).await;
    assert_eq!(result, Ok(json!({ "ok": true })));

    let requests = transport.recorded().await;
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].url, "https://api.test/method/users.get");
    assert_eq!(requests[0].field("v"), Some(&json!("5.68")));
    assert_eq!(requests[0].field("access_token"), Some(&json!("test-token")));
}

#[tokio::test]
async fn explicit_parameters_win_over_defaults() {
    let transport = MockTransport::new();
    transport
        .push_response(Ok(json!({ "response": 1 })))
        .await;
    let client = test_client(transport.clone());

    client
        .call_direct(
            "users.get",
            params(json!({ "v": "5.199", "access_token": "override" })),
        )
        .await
        .expect("direct call");

    let requests = transport.recorded().await;
    assert_eq!(requests[0].field("v"), Some(&json!("5.199")));
    assert_eq!(requests[0].field("access_token"), Some(&json!("override")));
}

#[tokio::test]
async fn direct_call_classifies_remote_errors() {
    let transport = MockTransport::new();
    transport
        .push_response(Ok(json!({ "error": { "error_code": 15, "error_msg": "denied" } })))
        .await;
    let client = test_client(transport.clone());

    let result = client.call_direct("wall.get", params(json!({}))).await;
    match result {
        Err(CallError::Remote(error)) => assert_eq!(error.code(), Some(15)),
        other => panic!("expected remote error, got {:?}", other),
    }
}

#[tokio::test]
async fn shutdown_drains_pending_queue() {
    let transport = MockTransport::new();
    transport.auto_ok(json!(1)).await;

    // Flush interval far beyond the test horizon: only the shutdown
    // drain can resolve these calls.
    let config = ClientConfig {
        flush_interval: Duration::from_secs(3600),
        api_base_url: "https://api.test/method".to_string(),
        ..Default::default()
    };
    let client = ApiClient::with_transport("test-token", config, transport.clone());

    let mut handles = Vec::new();
    for i in 0..3 {
        let client = client.clone();
        handles.push(tokio::spawn(async move {
            client.call("test.echo", params(json!({ "i": i }))).await
        }));
    }
    sleep(Duration::from_millis(20)).await;

    client.shutdown().await;
    assert!(!client.is_running());

    for handle in handles {
        assert_eq!(handle.await.expect("join"), Ok(json!(1)));
    }

    let result = client.call("test.echo", params(json!({}))).await;
    assert_eq!(result, Err(CallError::Closed));
}
