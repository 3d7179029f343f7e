// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Record framing for message log files.
//!
//! ```text
//! ---
//! msg_id: MSG-...
//! ts: 2026-01-02T03:04:05.123456789Z
//! type: FACT
//! project_id: proj
//! task_id: task-...
//! run_id: ...
//! ---
//! body text, any number of lines
//! ```
//!
//! Records are separated by a blank line. A body ends at the next line that
//! is exactly `---`. Single-line legacy entries (`[ts] TYPE: body`) are read
//! but never written.

use chrono::{DateTime, Utc};
use conductor_core::{Link, Message, Parent};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

const DELIMITER: &[u8] = b"---";

/// On-disk header, field order matches the file format.
#[derive(Debug, Serialize, Deserialize)]
struct Header {
    msg_id: String,
    ts: DateTime<Utc>,
    #[serde(rename = "type")]
    msg_type: String,
    project_id: String,
    #[serde(default)]
    task_id: String,
    #[serde(default)]
    run_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    issue_id: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    parents: Vec<Parent>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    links: Vec<Link>,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    meta: IndexMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    attachment_path: Option<String>,
}

impl Header {
    fn into_message(self, body: String) -> Message {
        Message {
            msg_id: self.msg_id,
            timestamp: Some(self.ts),
            msg_type: self.msg_type,
            project_id: self.project_id,
            task_id: self.task_id,
            run_id: self.run_id,
            issue_id: self.issue_id,
            parents: self.parents,
            links: self.links,
            meta: self.meta,
            attachment_path: self.attachment_path,
            body,
        }
    }
}

/// Serialize one complete record, always newline-terminated.
pub(crate) fn encode(msg: &Message) -> Result<String, serde_yaml::Error> {
    let header = Header {
        msg_id: msg.msg_id.clone(),
        ts: msg.timestamp.unwrap_or_default(),
        msg_type: msg.msg_type.clone(),
        project_id: msg.project_id.clone(),
        task_id: msg.task_id.clone(),
        run_id: msg.run_id.clone(),
        issue_id: msg.issue_id.clone(),
        parents: msg.parents.clone(),
        links: msg.links.clone(),
        meta: msg.meta.clone(),
        attachment_path: msg.attachment_path.clone(),
    };
    let yaml = serde_yaml::to_string(&header)?;
    let mut out = String::with_capacity(yaml.len() + msg.body.len() + 16);
    out.push_str("---\n");
    out.push_str(&yaml);
    if !yaml.ends_with('\n') {
        out.push('\n');
    }
    out.push_str("---\n");
    out.push_str(&msg.body);
    if !msg.body.ends_with('\n') {
        out.push('\n');
    }
    Ok(out)
}

/// Result of scanning a log file.
#[derive(Debug, Default)]
pub(crate) struct Decoded {
    pub messages: Vec<Message>,
    /// Byte length of the prefix made only of complete records. Anything
    /// after it is a fragment left by an interrupted writer.
    pub complete_len: u64,
}

enum State {
    Seek,
    Header {
        record_start: usize,
        header_start: usize,
    },
    Body {
        header: Option<Header>,
        body_start: usize,
        lines: usize,
        last_terminated: bool,
    },
}

struct Line<'a> {
    start: usize,
    end: usize,
    text: &'a [u8],
    terminated: bool,
}

fn lines(data: &[u8]) -> impl Iterator<Item = Line<'_>> {
    let mut pos = 0;
    std::iter::from_fn(move || {
        if pos >= data.len() {
            return None;
        }
        let start = pos;
        let (end, terminated) = match data[start..].iter().position(|&b| b == b'\n') {
            Some(idx) => (start + idx + 1, true),
            None => (data.len(), false),
        };
        pos = end;
        let mut text = &data[start..end];
        if let Some(stripped) = text.strip_suffix(b"\n") {
            text = stripped;
        }
        if let Some(stripped) = text.strip_suffix(b"\r") {
            text = stripped;
        }
        Some(Line { start, end, text, terminated })
    })
}

fn finalize_body(data: &[u8], start: usize, end: usize) -> String {
    String::from_utf8_lossy(&data[start..end]).trim_end_matches(['\n', '\r']).to_string()
}

fn parse_header(data: &[u8], start: usize, end: usize) -> Option<Header> {
    let text = String::from_utf8_lossy(&data[start..end]);
    match serde_yaml::from_str::<Header>(&text) {
        Ok(header) => Some(header),
        Err(e) => {
            tracing::debug!(offset = start, error = %e, "skipping malformed message header");
            None
        }
    }
}

/// Parse `[ts] TYPE: body` legacy lines.
fn parse_legacy(line: &[u8], offset: usize) -> Option<Message> {
    let text = std::str::from_utf8(line).ok()?;
    let rest = text.strip_prefix('[')?;
    let (ts, rest) = rest.split_once("] ")?;
    let (msg_type, body) = rest.split_once(": ")?;
    let ts = DateTime::parse_from_rfc3339(ts.trim()).ok()?.with_timezone(&Utc);
    let msg_type = msg_type.trim();
    if msg_type.is_empty() || msg_type.contains(' ') {
        return None;
    }
    let mut msg = Message::new(msg_type, "", body);
    msg.msg_id = format!("LEGACY-{offset}");
    msg.timestamp = Some(ts);
    Some(msg)
}

/// Scan a whole log file.
///
/// Never fails: malformed records are skipped, and a trailing fragment is
/// excluded from both `messages` and `complete_len`.
pub(crate) fn decode(data: &[u8]) -> Decoded {
    let mut decoded = Decoded::default();
    let mut state = State::Seek;

    for line in lines(data) {
        let is_delimiter = line.text == DELIMITER;
        state = match state {
            State::Seek if is_delimiter => {
                State::Header { record_start: line.start, header_start: line.end }
            }
            State::Seek => {
                if line.terminated && line.text.first() == Some(&b'[') {
                    if let Some(msg) = parse_legacy(line.text, line.start) {
                        decoded.messages.push(msg);
                        decoded.complete_len = line.end as u64;
                    }
                }
                State::Seek
            }
            State::Header { header_start, .. } if is_delimiter && line.terminated => {
                State::Body {
                    header: parse_header(data, header_start, line.start),
                    body_start: line.end,
                    lines: 0,
                    last_terminated: true,
                }
            }
            header @ State::Header { .. } => header,
            State::Body { header, body_start, .. } if is_delimiter => {
                if let Some(header) = header {
                    let body = finalize_body(data, body_start, line.start);
                    decoded.messages.push(header.into_message(body));
                }
                decoded.complete_len = line.start as u64;
                State::Header { record_start: line.start, header_start: line.end }
            }
            State::Body { header, body_start, lines, .. } => State::Body {
                header,
                body_start,
                lines: lines + 1,
                last_terminated: line.terminated,
            },
        };
    }

    match state {
        State::Body { header: Some(header), body_start, lines, last_terminated }
            if lines > 0 && last_terminated =>
        {
            let body = finalize_body(data, body_start, data.len());
            decoded.messages.push(header.into_message(body));
            decoded.complete_len = data.len() as u64;
        }
        State::Header { record_start, .. } => {
            tracing::trace!(offset = record_start, "log ends inside a record header");
        }
        _ => {}
    }

    decoded
}

/// Offset of the last line in `window` that opens a record: a `---` line at
/// the start of the file or after a blank line, followed by a header that
/// begins with `msg_id:` (or by nothing yet, for a torn write).
///
/// `at_file_start` says whether `window` begins at offset 0 of the file.
pub(crate) fn last_record_start(window: &[u8], at_file_start: bool) -> Option<usize> {
    const FIRST_KEY: &[u8] = b"msg_id:";
    let mut found = None;
    for line in lines(window) {
        if line.text != DELIMITER || !line.terminated {
            continue;
        }
        let before = &window[..line.start];
        let opens = if line.start == 0 {
            at_file_start
        } else {
            before.ends_with(b"\n\n") || before.ends_with(b"\n\r\n")
        };
        let next = &window[line.end..];
        let n = next.len().min(FIRST_KEY.len());
        if opens && next[..n] == FIRST_KEY[..n] {
            found = Some(line.start);
        }
    }
    found
}

#[cfg(test)]
#[path = "codec_tests.rs"]
mod tests;
