// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[yare::parameterized(
    fact = { MessageType::Fact, "FACT" },
    run_start = { MessageType::RunStart, "RUN_START" },
    run_stop = { MessageType::RunStop, "RUN_STOP" },
    run_crash = { MessageType::RunCrash, "RUN_CRASH" },
    user = { MessageType::User, "USER" },
)]
fn message_type_display(t: MessageType, expected: &str) {
    assert_eq!(t.to_string(), expected);
}

#[test]
fn parents_accept_legacy_bare_ids() {
    let yaml = "- MSG-1\n- msg_id: MSG-2\n  kind: reply\n";
    let parents: Vec<Parent> = serde_yaml::from_str(yaml).unwrap();
    assert_eq!(parents[0], Parent::new("MSG-1"));
    assert_eq!(parents[1].msg_id, "MSG-2");
    assert_eq!(parents[1].kind.as_deref(), Some("reply"));
}

#[test]
fn builder_style_setters_fill_optional_fields() {
    let msg = Message::new(MessageType::Issue, "proj", "broken build")
        .task_id("task-1")
        .run_id("run-1")
        .issue_id("ISSUE-7")
        .with_meta("severity", "high");
    assert!(msg.is_type(MessageType::Issue));
    assert_eq!(msg.task_id, "task-1");
    assert_eq!(msg.issue_id.as_deref(), Some("ISSUE-7"));
    assert_eq!(msg.meta.get("severity").map(String::as_str), Some("high"));
}

#[test]
fn json_omits_empty_optional_fields() {
    let msg = Message::new("FACT", "proj", "hello");
    let json = serde_json::to_value(&msg).unwrap();
    assert_eq!(json["type"], "FACT");
    assert!(json.get("parents").is_none());
    assert!(json.get("issue_id").is_none());
    assert_eq!(json["body"], "hello");
}
