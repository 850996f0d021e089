//! Unit tests for typed notification classification.

use serde_json::json;

use agent_conduit::models::item::ItemDetails;
use agent_conduit::models::turn::TurnStatus;
use agent_conduit::models::ServerNotification;
use agent_conduit::rpc::Notification;

fn parse(method: &str, params: serde_json::Value) -> Option<ServerNotification> {
    ServerNotification::parse(&Notification::new(method, Some(params)))
}

#[test]
fn turn_completed_exposes_thread_and_turn() {
    let parsed = parse(
        "turn/completed",
        json!({"threadId": "thr", "turn": {"id": "t1", "status": "completed", "items": []}}),
    )
    .expect("valid payload");

    assert_eq!(parsed.thread_id(), Some("thr"));
    assert_eq!(parsed.turn_id(), Some("t1"));
    let ServerNotification::TurnCompleted(completed) = parsed else {
        panic!("expected turn/completed");
    };
    assert_eq!(completed.turn.status, TurnStatus::Completed);
}

#[test]
fn item_completed_carries_typed_item() {
    let parsed = parse(
        "item/completed",
        json!({
            "threadId": "thr",
            "turnId": "t1",
            "item": {"id": "i1", "type": "agentMessage", "text": "done"},
        }),
    )
    .expect("valid payload");

    assert_eq!(parsed.turn_id(), Some("t1"));
    let ServerNotification::ItemCompleted(n) = parsed else {
        panic!("expected item/completed");
    };
    assert!(matches!(n.item.details, ItemDetails::AgentMessage(ref m) if m.text == "done"));
}

#[test]
fn deltas_are_classified_by_method() {
    let params = json!({"threadId": "thr", "turnId": "t1", "itemId": "i1", "delta": "x"});

    assert!(matches!(
        parse("item/agentMessage/delta", params.clone()),
        Some(ServerNotification::AgentMessageDelta(_))
    ));
    assert!(matches!(
        parse("item/commandExecution/outputDelta", params),
        Some(ServerNotification::CommandOutputDelta(_))
    ));
}

#[test]
fn diff_and_plan_updates_parse() {
    let diff = parse(
        "turn/diff/updated",
        json!({"threadId": "thr", "turnId": "t1", "diff": "--- a\n+++ b\n"}),
    )
    .expect("diff");
    assert!(matches!(diff, ServerNotification::TurnDiffUpdated(ref n) if n.diff.starts_with("--- a")));

    let plan = parse(
        "turn/plan/updated",
        json!({
            "threadId": "thr",
            "turnId": "t1",
            "plan": [{"step": "read code", "status": "completed"}, {"step": "write tests", "status": "inProgress"}],
        }),
    )
    .expect("plan");
    let ServerNotification::TurnPlanUpdated(plan) = plan else {
        panic!("expected turn/plan/updated");
    };
    assert_eq!(plan.plan.len(), 2);
    assert!(plan.explanation.is_none());
}

#[test]
fn unknown_methods_pass_through_unchanged() {
    let raw = Notification::new("account/rateLimits/updated", Some(json!({"primary": 12})));
    let parsed = ServerNotification::parse(&raw).expect("passes through");

    assert_eq!(parsed, ServerNotification::Other(raw));
    assert_eq!(parsed.thread_id(), None);
    assert_eq!(parsed.turn_id(), None);
}

#[test]
fn known_method_with_invalid_payload_is_dropped() {
    assert!(parse("turn/completed", json!({"threadId": "thr"})).is_none());
    assert!(ServerNotification::parse(&Notification::new("item/completed", None)).is_none());
}

#[test]
fn unknown_item_type_is_preserved() {
    let parsed = parse(
        "item/started",
        json!({"threadId": "thr", "turnId": "t1", "item": {"id": "i9", "type": "imageView", "path": "/tmp/a.png"}}),
    )
    .expect("valid payload");
    let ServerNotification::ItemStarted(n) = parsed else {
        panic!("expected item/started");
    };
    assert_eq!(n.item.item_type(), "imageView");
    let ItemDetails::Unknown { fields, .. } = &n.item.details else {
        panic!("expected unknown item");
    };
    assert_eq!(fields["path"], "/tmp/a.png");
}
