//! Integration tests for orderly transport shutdown.

use agent_conduit::rpc::TransportEvent;
use agent_conduit::ClientError;

use super::test_helpers::{connect_transport, connect_transport_with_process};

/// A second shutdown is a no-op returning `Ok(())`.
#[tokio::test(start_paused = true)]
async fn second_shutdown_is_a_no_op() {
    let (transport, _server) = connect_transport();

    transport.shutdown().await.expect("first shutdown");
    transport.shutdown().await.expect("second shutdown");
    assert!(!transport.is_open());
}

/// Shutdown closes the client's stdin so the server sees end of input.
#[tokio::test(start_paused = true)]
async fn shutdown_closes_stdin() {
    let (transport, mut server) = connect_transport();

    transport.shutdown().await.expect("shutdown");
    assert!(server.try_recv().await.is_none(), "server must observe EOF");
}

/// A request still pending at shutdown rejects with `TransportClosed`, and
/// later requests reject immediately.
#[tokio::test(start_paused = true)]
async fn pending_request_rejects_with_transport_closed() {
    let (transport, mut server) = connect_transport();
    let mut events = transport.events();

    let call = transport.request("thread/read", None, None);
    let closer = async {
        let _ = server.expect_request("thread/read").await;
        transport.shutdown().await.expect("shutdown");
    };
    let (result, ()) = tokio::join!(call, closer);

    assert!(
        matches!(result, Err(ClientError::TransportClosed(_))),
        "unexpected result {result:?}"
    );
    let later = transport.request("model/list", None, None).await;
    assert!(matches!(later, Err(ClientError::TransportClosed(_))));

    let event = events.recv().await.expect("close event");
    assert_eq!(event, TransportEvent::Closed);
}

/// A process that exits once stdin closes is not killed, and its exit is not
/// treated as a failure.
#[tokio::test(start_paused = true)]
async fn cooperative_process_is_not_killed() {
    let (transport, mut server, process) = connect_transport_with_process();

    let server_side = async {
        assert!(server.try_recv().await.is_none());
        process.exit(Some(0));
    };
    let (result, ()) = tokio::join!(transport.shutdown(), server_side);

    result.expect("shutdown");
    assert!(!process.was_killed());
    assert_eq!(
        transport.terminal_error(),
        Some(ClientError::TransportClosed("transport shut down".into()))
    );
}

/// A peer that exits on its own while shutdown is running publishes no
/// `Exited` event; the event stream ends with `Closed` alone.
#[tokio::test(start_paused = true)]
async fn exit_during_shutdown_publishes_only_closed() {
    let (transport, mut server, process) = connect_transport_with_process();
    let mut events = transport.events();

    let server_side = async {
        assert!(server.try_recv().await.is_none());
        process.exit(Some(0));
    };
    let (result, ()) = tokio::join!(transport.shutdown(), server_side);

    result.expect("shutdown");
    assert_eq!(events.recv().await.expect("close event"), TransportEvent::Closed);
    assert!(events.try_recv().is_err(), "no further events after close");
}

/// A process that ignores the closed stdin is killed after the grace period.
#[tokio::test(start_paused = true)]
async fn stubborn_process_is_killed_after_grace() {
    let (transport, _server, process) = connect_transport_with_process();

    transport.shutdown().await.expect("shutdown");
    assert!(process.was_killed(), "process must be killed after the grace period");
}

/// Shutdown after a transport failure still completes and stays idempotent.
#[tokio::test(start_paused = true)]
async fn shutdown_after_failure_succeeds() {
    let (transport, mut server) = connect_transport();
    let mut events = transport.events();
    server.close_output();
    let _ = events.recv().await.expect("failure event");

    transport.shutdown().await.expect("shutdown");
    transport.shutdown().await.expect("shutdown again");
    assert!(matches!(
        transport.terminal_error(),
        Some(ClientError::TransportFailed(_))
    ));
}
