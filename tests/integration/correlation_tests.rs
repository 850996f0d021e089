//! Integration tests for request/response correlation over a live transport.

use std::time::Duration;

use serde_json::{json, Value};

use agent_conduit::ClientError;

use super::test_helpers::connect_transport;

/// Ids start at 0 and increase by one per request.
#[tokio::test]
async fn request_ids_start_at_zero_and_increase() {
    let (transport, mut server) = connect_transport();

    let first = transport.request("model/list", None, None);
    let server_side = async {
        let (id, _) = server.expect_request("model/list").await;
        assert_eq!(id, 0, "first request on a transport must use id 0");
        server.respond(id, json!({"data": []})).await;
    };
    let (result, ()) = tokio::join!(first, server_side);
    result.expect("first request resolves");

    let second = transport.request("thread/list", None, None);
    let server_side = async {
        let (id, _) = server.expect_request("thread/list").await;
        assert_eq!(id, 1, "ids must increase strictly");
        server.respond(id, json!({"data": []})).await;
    };
    let (result, ()) = tokio::join!(second, server_side);
    result.expect("second request resolves");
}

/// Responses arriving in reverse order still resolve the request with the
/// matching id.
#[tokio::test]
async fn out_of_order_responses_resolve_matching_requests() {
    let (transport, mut server) = connect_transport();

    let a = transport.request("thread/read", Some(json!({"threadId": "a"})), None);
    let b = transport.request("thread/read", Some(json!({"threadId": "b"})), None);
    let c = transport.request("thread/read", Some(json!({"threadId": "c"})), None);

    let server_side = async {
        let mut seen = Vec::new();
        for _ in 0..3 {
            let (id, params) = server.expect_request("thread/read").await;
            seen.push((id, params["threadId"].clone()));
        }
        for (id, thread) in seen.into_iter().rev() {
            server.respond(id, json!({"echo": thread})).await;
        }
    };

    let (ra, rb, rc, ()) = tokio::join!(a, b, c, server_side);
    assert_eq!(ra.expect("a")["echo"], "a");
    assert_eq!(rb.expect("b")["echo"], "b");
    assert_eq!(rc.expect("c")["echo"], "c");
    assert_eq!(transport.pending_count(), 0, "registry must be empty");
}

/// An error payload surfaces as `ClientError::Rpc` with the peer's code and
/// message.
#[tokio::test]
async fn error_response_becomes_rpc_error() {
    let (transport, mut server) = connect_transport();

    let call = transport.request("thread/resume", Some(json!({"threadId": "missing"})), None);
    let server_side = async {
        let (id, _) = server.expect_request("thread/resume").await;
        server.respond_error(id, -32600, "thread not found").await;
    };
    let (result, ()) = tokio::join!(call, server_side);

    let err = result.expect_err("error payload must reject");
    assert!(
        matches!(&err, ClientError::Rpc { code: -32600, message, .. } if message == "thread not found"),
        "unexpected error: {err:?}"
    );
    assert_eq!(err.to_string(), "rpc error -32600: thread not found");
}

/// An error member that is not a well-formed error object still rejects
/// the matching call instead of being dropped.
#[tokio::test(start_paused = true)]
async fn loose_error_payload_still_rejects_call() {
    let (transport, mut server) = connect_transport();
    let cases = [
        (json!({"message": "boom"}), -32603, "boom"),
        (json!({"code": -32000.5, "message": "fractional"}), -32603, "fractional"),
        (json!({"code": 7, "message": {"text": "nested"}}), 7, r#"{"code":7,"message":{"text":"nested"}}"#),
        (json!("plain string"), -32603, r#""plain string""#),
    ];

    for (error, code, message) in cases {
        let call = transport.request("thread/read", None, Some(Duration::from_secs(20)));
        let server_side = async {
            let (id, _) = server.expect_request("thread/read").await;
            server.send(&json!({"jsonrpc": "2.0", "id": id, "error": error})).await;
        };
        let started = tokio::time::Instant::now();
        let (result, ()) = tokio::join!(call, server_side);

        assert!(started.elapsed() < Duration::from_secs(20), "reply must not wait out the deadline");
        let err = result.expect_err("error payload must reject");
        assert!(
            matches!(&err, ClientError::Rpc { code: c, message: m, .. } if *c == code && m == message),
            "unexpected error: {err:?}"
        );
    }
    assert_eq!(transport.pending_count(), 0);
}

/// A response without `result` resolves with JSON `null`.
#[tokio::test]
async fn response_without_result_resolves_null() {
    let (transport, mut server) = connect_transport();

    let call = transport.request("thread/archive", Some(json!({"threadId": "t"})), None);
    let server_side = async {
        let (id, _) = server.expect_request("thread/archive").await;
        server.send(&json!({"id": id})).await;
    };
    let (result, ()) = tokio::join!(call, server_side);
    assert_eq!(result.expect("resolves"), Value::Null);
}

/// Garbage lines and responses for unknown ids do not disturb pending
/// requests.
#[tokio::test]
async fn garbage_and_unknown_ids_are_ignored() {
    let (transport, mut server) = connect_transport();
    let mut events = transport.events();

    let call = transport.request("model/list", None, None);
    let server_side = async {
        let (id, _) = server.expect_request("model/list").await;
        server.send_raw("this is not json").await;
        server.send_raw("{\"jsonrpc\":\"2.0\"}").await;
        server.respond(id + 100, json!("stray")).await;
        server.respond(id, json!({"data": []})).await;
    };
    let (result, ()) = tokio::join!(call, server_side);
    assert_eq!(result.expect("resolves")["data"], json!([]));

    let first = events.recv().await.expect("framing event published");
    assert!(
        matches!(first, agent_conduit::rpc::TransportEvent::FramingError(_)),
        "expected a framing error event, got {first:?}"
    );
    assert!(transport.is_open(), "framing errors must not fail the transport");
}

/// Server-initiated requests are answered with method-not-found.
#[tokio::test]
async fn server_request_is_answered_with_method_not_found() {
    let (_transport, mut server) = connect_transport();

    server
        .send(&json!({"jsonrpc": "2.0", "id": "srv-1", "method": "execCommandApproval", "params": {}}))
        .await;
    let reply = server.recv().await;

    assert_eq!(reply["id"], "srv-1");
    assert_eq!(reply["error"]["code"], -32601);
    assert!(reply.get("method").is_none(), "reply must be a response");
}

/// `notify` writes a message without an id.
#[tokio::test]
async fn notify_writes_message_without_id() {
    let (transport, mut server) = connect_transport();

    transport
        .notify("initialized", None)
        .await
        .expect("notify succeeds");
    let msg = server.recv().await;

    assert_eq!(msg["method"], "initialized");
    assert_eq!(msg["jsonrpc"], "2.0");
    assert!(msg.get("id").is_none());
    assert!(msg.get("params").is_none());
}
