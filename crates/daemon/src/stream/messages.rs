// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::time::Duration;

use conductor_storage::{MessageLog, MessageLogError};
use futures_util::stream::Stream;

use super::StreamEvent;

/// Messages appended to `log` after `last_id` (the whole log for `""`),
/// polled every `poll_interval`.
///
/// A `last_id` that is no longer in the log (rotation, truncation) restarts
/// from the beginning. Read failures become `error` events and polling
/// goes on.
pub fn message_stream(
    log: MessageLog,
    last_id: String,
    poll_interval: Duration,
) -> impl Stream<Item = StreamEvent> + Send + 'static {
    async_stream::stream! {
        let mut last_id = last_id;
        let mut last_error: Option<String> = None;
        loop {
            let reader = log.clone();
            let since = last_id.clone();
            let batch = tokio::task::spawn_blocking(move || reader.read(&since)).await;
            match batch {
                Ok(Ok(messages)) => {
                    last_error = None;
                    for msg in messages {
                        last_id = msg.msg_id.clone();
                        yield StreamEvent::Message(Box::new(msg));
                    }
                }
                Ok(Err(MessageLogError::SinceIdNotFound(id))) => {
                    tracing::info!(
                        path = %log.path().display(),
                        since_id = %id,
                        "message cursor reset"
                    );
                    last_id.clear();
                    continue;
                }
                Ok(Err(e)) => {
                    let error = e.to_string();
                    if last_error.as_deref() != Some(error.as_str()) {
                        yield StreamEvent::Error { run_id: None, error: error.clone() };
                        last_error = Some(error);
                    }
                }
                Err(e) => {
                    tracing::error!(error = %e, "message read task failed");
                    break;
                }
            }
            tokio::time::sleep(poll_interval).await;
        }
    }
}

#[cfg(test)]
#[path = "messages_tests.rs"]
mod tests;
