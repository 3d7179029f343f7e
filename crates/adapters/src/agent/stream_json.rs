// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Helpers for NDJSON event streams printed by agent CLIs.

use serde_json::Value;

/// Parsed JSON objects, one per line. Blank and non-JSON lines are skipped.
pub(super) fn events(stdout: &str) -> impl Iterator<Item = Value> + '_ {
    stdout
        .lines()
        .map(str::trim)
        .filter(|line| line.starts_with('{'))
        .filter_map(|line| serde_json::from_str::<Value>(line).ok())
}

/// The `type` field of an event, or `""`.
pub(super) fn event_type(event: &Value) -> &str {
    event.get("type").and_then(Value::as_str).unwrap_or_default()
}

/// Best-effort text extraction.
///
/// Strings are trimmed, arrays are joined by newlines, and objects yield
/// the first of `keys` that produces text.
pub(super) fn text_of(value: Option<&Value>, keys: &[&str]) -> String {
    match value {
        Some(Value::String(s)) => s.trim().to_string(),
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| text_of(Some(item), keys))
            .filter(|text| !text.is_empty())
            .collect::<Vec<_>>()
            .join("\n")
            .trim()
            .to_string(),
        Some(Value::Object(map)) => keys
            .iter()
            .map(|key| text_of(map.get(*key), keys))
            .find(|text| !text.is_empty())
            .unwrap_or_default(),
        _ => String::new(),
    }
}

/// Accumulates assistant text from streams that may repeat or grow the
/// same message across events.
#[derive(Debug, Default)]
pub(super) struct Transcript {
    out: String,
    emitted: String,
}

impl Transcript {
    pub(super) fn push(&mut self, text: &str) {
        let text = text.trim();
        if text.is_empty() || self.emitted.starts_with(text) {
            return;
        }
        if let Some(delta) = text.strip_prefix(self.emitted.as_str()) {
            // Cumulative chunk: keep only the new tail.
            self.out.push_str(delta);
            self.emitted.push_str(delta);
            return;
        }
        if !self.out.is_empty() && !self.out.ends_with('\n') {
            self.out.push('\n');
        }
        self.out.push_str(text);
        self.emitted.push_str(text);
    }

    pub(super) fn finish(self) -> Option<String> {
        let text = self.out.trim();
        (!text.is_empty()).then(|| text.to_string())
    }
}

#[cfg(test)]
#[path = "stream_json_tests.rs"]
mod tests;
