// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn result_event_returns_immediately() {
    let stdout = r#"{"type":"message","role":"assistant","content":"draft"}
{"type":"result","result":"final"}
{"type":"message","role":"assistant","content":"late"}
"#;
    assert_eq!(parse_stream(stdout).as_deref(), Some("final"));
}

#[test]
fn streamed_assistant_deltas_are_joined() {
    let stdout = r#"{"type":"init","session_id":"s"}
{"type":"message","role":"user","content":"the prompt"}
{"type":"message","role":"assistant","content":"All"}
{"type":"message","role":"assistant","content":"All good"}
{"type":"result","status":"success"}
"#;
    assert_eq!(parse_stream(stdout).as_deref(), Some("All good"));
}

#[test]
fn assistant_event_with_nested_message() {
    let stdout = r#"{"type":"assistant","message":{"role":"assistant","content":[{"text":"x"},{"text":"y"}]}}"#;
    assert_eq!(parse_stream(stdout).as_deref(), Some("x\ny"));
}

#[test]
fn user_messages_are_ignored() {
    let stdout = r#"{"type":"message","role":"user","content":"hi"}"#;
    assert_eq!(parse_stream(stdout), None);
}
