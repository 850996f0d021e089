//! Integration tests for request deadlines.
//!
//! All tests run with a paused clock; the runtime auto-advances time once
//! every task is idle, so deadlines fire without real waiting.

use std::time::Duration;

use serde_json::json;

use agent_conduit::ClientError;

use super::test_helpers::connect_transport;

/// A request with no response rejects with `Timeout` naming the method and
/// deadline, and its registry entry is removed.
#[tokio::test(start_paused = true)]
async fn unanswered_request_times_out_and_is_removed() {
    let (transport, mut server) = connect_transport();

    let call = transport.request("thread/read", None, Some(Duration::from_secs(2)));
    let server_side = async {
        let _ = server.expect_request("thread/read").await;
    };
    let (result, ()) = tokio::join!(call, server_side);

    let err = result.expect_err("must time out");
    assert_eq!(
        err,
        ClientError::Timeout {
            method: "thread/read".into(),
            after: Duration::from_secs(2),
        }
    );
    assert_eq!(transport.pending_count(), 0, "timed-out entry must be removed");
}

/// A response arriving after the deadline is ignored and the transport keeps
/// working.
#[tokio::test(start_paused = true)]
async fn late_response_is_a_no_op() {
    let (transport, mut server) = connect_transport();

    let call = transport.request("thread/read", None, Some(Duration::from_secs(1)));
    let server_side = async { server.expect_request("thread/read").await.0 };
    let (result, late_id) = tokio::join!(call, server_side);
    assert!(matches!(result, Err(ClientError::Timeout { .. })));

    server.respond(late_id, json!({"late": true})).await;

    let next = transport.request("model/list", None, None);
    let server_side = async {
        let (id, _) = server.expect_request("model/list").await;
        assert_ne!(id, late_id, "ids are never reused");
        server.respond(id, json!({"data": []})).await;
    };
    let (result, ()) = tokio::join!(next, server_side);
    assert_eq!(result.expect("later request resolves")["data"], json!([]));
    assert!(transport.is_open());
}

/// Long-running methods default to the long deadline; others to the short
/// one.
#[tokio::test(start_paused = true)]
async fn long_running_methods_use_long_deadline() {
    let (transport, mut server) = connect_transport();
    let options = transport.options().clone();

    let call = transport.request("turn/start", Some(json!({"threadId": "t"})), None);
    let server_side = async {
        let _ = server.expect_request("turn/start").await;
    };
    let (result, ()) = tokio::join!(call, server_side);

    assert_eq!(
        result.expect_err("must time out"),
        ClientError::Timeout {
            method: "turn/start".into(),
            after: options.long_running_timeout,
        }
    );
    assert_eq!(options.timeout_for("thread/list"), options.request_timeout);
    assert_eq!(options.timeout_for("command/exec"), options.long_running_timeout);
}
