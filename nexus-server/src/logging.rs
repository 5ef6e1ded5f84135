// Copyright 2025 Nexus Contributors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! A `tracing_subscriber::Layer` that mirrors `WARN`+ events into the
//! `AppLog` table (C1), plus a cancellable drain worker that owns the
//! actual DB writes so the hot tracing path never blocks on SQLite.
//!
//! Shutdown must drain pending entries before the process exits
//! (spec.md §5 "Shutdown sequencing"): callers hold the returned
//! `LogDrainHandle` and call `shutdown().await` as the last step.

use std::sync::mpsc as std_mpsc;

use nexus_storage::applog::{LogEntry, LogStore};
use tokio::sync::mpsc;
use tracing::field::{Field, Visit};
use tracing::Level;
use tracing_subscriber::layer::Context;
use tracing_subscriber::Layer;

const CHANNEL_CAPACITY: usize = 1024;

/// A `tracing` layer that captures `WARN` and `ERROR` events as `LogEntry`
/// records and forwards them to the drain worker over an unbounded-ish
/// bounded channel. A full channel silently drops the record rather than
/// blocking the caller — logging must never become a backpressure source.
pub struct DbLogLayer {
    sender: mpsc::Sender<LogEntry>,
}

impl DbLogLayer {
    fn new(sender: mpsc::Sender<LogEntry>) -> Self {
        Self { sender }
    }
}

impl<S> Layer<S> for DbLogLayer
where
    S: tracing::Subscriber,
{
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
        if *event.metadata().level() > Level::WARN {
            return;
        }

        let mut visitor = MessageVisitor::default();
        event.record(&mut visitor);

        let entry = LogEntry {
            level: event.metadata().level().to_string().to_lowercase(),
            message: visitor.message,
            target: event.metadata().target().to_string(),
        };

        let _ = self.sender.try_send(entry);
    }
}

#[derive(Default)]
struct MessageVisitor {
    message: String,
}

impl Visit for MessageVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            self.message = format!("{value:?}");
        } else if self.message.is_empty() {
            self.message = format!("{}={:?}", field.name(), value);
        }
    }
}

/// Handle to the background drain task. Dropping it without calling
/// `shutdown` leaves the task running detached; `shutdown` is the
/// clean path used during the server's shutdown sequence.
pub struct LogDrainHandle {
    cancel: std_mpsc::Sender<()>,
    task: tokio::task::JoinHandle<()>,
}

impl LogDrainHandle {
    /// Signal the drain loop to stop accepting new work, flush whatever is
    /// already queued, and wait for it to finish.
    pub async fn shutdown(self) {
        let _ = self.cancel.send(());
        let _ = self.task.await;
    }
}

/// Build the tracing layer and spawn its drain worker. Call once during
/// startup, after the storage pool is open.
pub fn spawn(store: LogStore) -> (DbLogLayer, LogDrainHandle) {
    let (tx, mut rx) = mpsc::channel::<LogEntry>(CHANNEL_CAPACITY);
    let (cancel_tx, cancel_rx) = std_mpsc::channel::<()>();

    let task = tokio::spawn(async move {
        let mut batch = Vec::with_capacity(32);
        loop {
            tokio::select! {
                biased;
                maybe_entry = rx.recv() => {
                    match maybe_entry {
                        Some(entry) => {
                            batch.push(entry);
                            if batch.len() >= 32 {
                                flush(&store, &mut batch).await;
                            }
                        }
                        None => break,
                    }
                }
                _ = tokio::time::sleep(std::time::Duration::from_millis(200)) => {
                    if !batch.is_empty() {
                        flush(&store, &mut batch).await;
                    }
                    if cancel_rx.try_recv().is_ok() {
                        rx.close();
                    }
                }
            }
        }

        // Drain whatever arrived between the cancel signal and channel close.
        while let Ok(entry) = rx.try_recv() {
            batch.push(entry);
        }
        flush(&store, &mut batch).await;
    });

    (DbLogLayer::new(tx), LogDrainHandle { cancel: cancel_tx, task })
}

async fn flush(store: &LogStore, batch: &mut Vec<LogEntry>) {
    if batch.is_empty() {
        return;
    }
    if let Err(e) = store.insert_batch(batch).await {
        tracing::debug!(error = %e, "failed to flush app log batch");
    }
    batch.clear();
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::SqlitePool;

    #[tokio::test]
    async fn spawn_and_immediate_shutdown_does_not_panic() {
        let pool = SqlitePool::connect(":memory:").await.unwrap();
        sqlx::migrate!("../nexus-storage/migrations").run(&pool).await.unwrap();
        let store = LogStore::new(pool);
        let (_layer, handle) = spawn(store);
        handle.shutdown().await;
    }
}
