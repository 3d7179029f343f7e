// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Server-sent event framing for [`StreamEvent`]s.

use std::convert::Infallible;
use std::time::Duration;

use axum::http::HeaderMap;
use axum::response::sse::{Event, Sse};
use futures_util::stream::{Stream, StreamExt};
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::stream::StreamEvent;

pub const LAST_EVENT_ID: &str = "last-event-id";

/// The client's `Last-Event-ID`, if it sent a usable one.
pub fn last_event_id(headers: &HeaderMap) -> Option<String> {
    headers
        .get(LAST_EVENT_ID)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
}

pub fn event(ev: &StreamEvent) -> Event {
    let framed = Event::default().event(ev.name()).data(ev.data().to_string());
    match ev.id() {
        Some(id) => framed.id(id),
        None => framed,
    }
}

enum Step {
    Event(Option<StreamEvent>),
    Heartbeat,
    Shutdown,
}

/// Frame `events` as SSE, interleaving a `heartbeat` event every
/// `heartbeat`. The response ends when `events` does or `shutdown` fires.
pub fn respond<S>(
    events: S,
    heartbeat: Duration,
    shutdown: CancellationToken,
) -> Sse<impl Stream<Item = Result<Event, Infallible>> + Send + 'static>
where
    S: Stream<Item = StreamEvent> + Send + 'static,
{
    let framed = async_stream::stream! {
        let mut events = Box::pin(events);
        let mut ticker = interval_at(Instant::now() + heartbeat, heartbeat);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            let step = tokio::select! {
                _ = shutdown.cancelled() => Step::Shutdown,
                ev = events.next() => Step::Event(ev),
                _ = ticker.tick() => Step::Heartbeat,
            };
            match step {
                Step::Event(Some(ev)) => yield ev,
                Step::Event(None) | Step::Shutdown => break,
                Step::Heartbeat => yield StreamEvent::Heartbeat,
            }
        }
    };
    Sse::new(framed.map(|ev| Ok(event(&ev))))
}

#[cfg(test)]
#[path = "sse_tests.rs"]
mod tests;
