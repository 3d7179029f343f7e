// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::collections::HashMap;
use std::pin::Pin;
use std::sync::Arc;

use conductor_storage::{RunStore, RunStoreError};
use futures_util::stream::{SelectAll, Stream, StreamExt};
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;

use super::run_stream::{RunStream, Snapshot};
use super::{Cursor, Discovery, StreamError, StreamEvent};
use crate::config::StreamSettings;

type EventStream = Pin<Box<dyn Stream<Item = StreamEvent> + Send>>;

struct Entry {
    stream: Arc<RunStream>,
    clients: usize,
}

/// Run id to live [`RunStream`], created on first subscribe and torn down
/// when the last subscriber leaves.
pub struct StreamManager {
    store: Arc<RunStore>,
    settings: StreamSettings,
    runs: Mutex<HashMap<String, Entry>>,
}

impl StreamManager {
    pub fn new(store: Arc<RunStore>, settings: StreamSettings) -> Arc<Self> {
        Arc::new(Self { store, settings, runs: Mutex::new(HashMap::new()) })
    }

    pub fn settings(&self) -> &StreamSettings {
        &self.settings
    }

    /// Runs with a live tail.
    pub fn active_streams(&self) -> usize {
        self.runs.lock().values().filter(|e| !e.stream.is_finished()).count()
    }

    /// Subscribe to one run. Log lines already counted in `since` are
    /// filtered out; nothing earlier than the current end is replayed.
    pub fn subscribe_run(
        self: &Arc<Self>,
        run_id: &str,
        since: Cursor,
    ) -> Result<Subscription, StreamError> {
        let info_path = match self.store.run_info_path(run_id) {
            Ok(path) => path,
            Err(RunStoreError::NotFound(_)) | Err(RunStoreError::InvalidId(_)) => {
                return Err(StreamError::RunNotFound(run_id.to_string()))
            }
            Err(e) => return Err(StreamError::Io(std::io::Error::other(e))),
        };
        let Some(run_dir) = info_path.parent() else {
            return Err(StreamError::RunNotFound(run_id.to_string()));
        };

        let mut runs = self.runs.lock();
        let stream = match runs.get_mut(run_id) {
            Some(entry) if !entry.stream.is_finished() => {
                if entry.clients >= self.settings.max_clients_per_run {
                    return Err(StreamError::MaxClients {
                        run_id: run_id.to_string(),
                        max: self.settings.max_clients_per_run,
                    });
                }
                entry.clients += 1;
                Arc::clone(&entry.stream)
            }
            _ => {
                let stream = RunStream::start(run_id, run_dir, self.settings.poll_interval)?;
                runs.insert(run_id.to_string(), Entry { stream: Arc::clone(&stream), clients: 1 });
                stream
            }
        };
        drop(runs);

        let (snapshot, rx) = stream.subscribe();
        tracing::debug!(run_id, since = %since, "stream subscriber added");
        Ok(Subscription {
            manager: Arc::clone(self),
            run_id: run_id.to_string(),
            stream,
            snapshot,
            rx,
            since,
        })
    }

    fn release(&self, run_id: &str, stream: &Arc<RunStream>) {
        let mut runs = self.runs.lock();
        let Some(entry) = runs.get_mut(run_id) else {
            return;
        };
        if !Arc::ptr_eq(&entry.stream, stream) {
            return;
        }
        entry.clients = entry.clients.saturating_sub(1);
        if entry.clients == 0 {
            entry.stream.stop();
            runs.remove(run_id);
            tracing::debug!(run_id, "last stream subscriber left");
        }
    }

    /// Every run under the root, plus runs created later, merged into one
    /// feed. Runs at their client limit are skipped.
    pub fn subscribe_all(self: &Arc<Self>) -> impl Stream<Item = StreamEvent> + Send + 'static {
        let manager = Arc::clone(self);
        async_stream::stream! {
            let cancel = CancellationToken::new();
            let _stop_discovery = cancel.clone().drop_guard();

            let mut discovery = Discovery::new(manager.store.root());
            let existing = match discovery.scan() {
                Ok(existing) => existing,
                Err(e) => {
                    tracing::warn!(error = %e, "listing runs for the all-runs stream failed");
                    Vec::new()
                }
            };
            let mut feeds: SelectAll<EventStream> = SelectAll::new();
            for run_id in existing {
                if let Some(feed) = manager.feed(&run_id) {
                    feeds.push(feed);
                }
            }
            let mut discovered =
                discovery.spawn(manager.settings.discovery_interval, cancel.clone());

            loop {
                let step = tokio::select! {
                    Some(run_id) = discovered.recv() => Step::Discovered(run_id),
                    Some(event) = feeds.next(), if !feeds.is_empty() => Step::Event(event),
                    else => Step::End,
                };
                match step {
                    Step::Discovered(run_id) => {
                        if let Some(feed) = manager.feed(&run_id) {
                            feeds.push(feed);
                        }
                    }
                    Step::Event(event) => yield event,
                    Step::End => break,
                }
            }
        }
    }

    fn feed(self: &Arc<Self>, run_id: &str) -> Option<EventStream> {
        match self.subscribe_run(run_id, Cursor::default()) {
            Ok(sub) => Some(Box::pin(sub.into_stream())),
            Err(e) => {
                tracing::debug!(run_id, error = %e, "skipping run in all-runs stream");
                None
            }
        }
    }
}

enum Step {
    Discovered(String),
    Event(StreamEvent),
    End,
}

/// One client's view of a run stream. Dropping it unsubscribes.
pub struct Subscription {
    manager: Arc<StreamManager>,
    run_id: String,
    stream: Arc<RunStream>,
    snapshot: Snapshot,
    rx: broadcast::Receiver<StreamEvent>,
    since: Cursor,
}

impl Subscription {
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Line counts of the run's files as of now.
    pub fn cursor(&self) -> Cursor {
        self.stream.cursor()
    }

    /// Current status first, then live events until `done`.
    pub fn into_stream(mut self) -> impl Stream<Item = StreamEvent> + Send + 'static {
        async_stream::stream! {
            let snapshot = std::mem::take(&mut self.snapshot);
            if let Some(status) = snapshot.status {
                yield status;
            }
            if let Some(done) = snapshot.done {
                yield done;
                return;
            }
            loop {
                match self.rx.recv().await {
                    Ok(event) if event.seen_by(&self.since) => continue,
                    Ok(event) => {
                        let done = event.is_done();
                        yield event;
                        if done {
                            break;
                        }
                    }
                    Err(RecvError::Lagged(missed)) => {
                        tracing::warn!(run_id = %self.run_id, missed, "stream subscriber lagged");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.manager.release(&self.run_id, &self.stream);
    }
}

#[cfg(test)]
#[path = "manager_tests.rs"]
mod tests;
