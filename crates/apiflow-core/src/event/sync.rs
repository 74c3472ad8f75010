//! Post-commit change publication.
//!
//! Mutations inside a write transaction are tracked, not published. Once
//! the commit returns Ok the tracked changes are grouped per topic and
//! published once per group; a failed commit publishes nothing.

use std::collections::BTreeMap;
use std::future::Future;

use apiflow_types::event::{SyncChange, SyncEvent, SyncOp, SyncTopic};
use apiflow_types::id::WorkspaceId;
use uuid::Uuid;

use super::EventBus;

#[derive(Debug, Default)]
pub struct SyncTracker {
    pending: BTreeMap<(WorkspaceId, SyncTopic), Vec<SyncChange>>,
}

impl SyncTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn track(&mut self, workspace_id: WorkspaceId, topic: SyncTopic, op: SyncOp, id: impl Into<Uuid>) {
        self.pending
            .entry((workspace_id, topic))
            .or_default()
            .push(SyncChange { op, id: id.into() });
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// One event per (workspace, topic) batch, in topic order.
    pub fn into_events(self) -> Vec<SyncEvent> {
        self.pending
            .into_iter()
            .map(|((workspace_id, topic), changes)| SyncEvent {
                workspace_id,
                topic,
                changes,
            })
            .collect()
    }

    /// Await `commit`; publish every tracked batch only if it succeeded.
    pub async fn publish_after<F, E>(self, commit: F, bus: &EventBus<SyncEvent>) -> Result<(), E>
    where
        F: Future<Output = Result<(), E>>,
    {
        commit.await?;
        for event in self.into_events() {
            tracing::debug!(topic = ?event.topic, changes = event.changes.len(), "publishing sync batch");
            bus.publish(event);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn batches_are_grouped_by_topic_after_commit() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();
        let ws = WorkspaceId::new();

        let mut tracker = SyncTracker::new();
        tracker.track(ws, SyncTopic::Header, SyncOp::Insert, Uuid::now_v7());
        tracker.track(ws, SyncTopic::Example, SyncOp::Update, Uuid::now_v7());
        tracker.track(ws, SyncTopic::Header, SyncOp::Insert, Uuid::now_v7());

        tracker
            .publish_after(async { Ok::<(), String>(()) }, &bus)
            .await
            .unwrap();

        let first = rx.recv().await.unwrap();
        let second = rx.recv().await.unwrap();
        assert_eq!(first.topic, SyncTopic::Example);
        assert_eq!(second.topic, SyncTopic::Header);
        assert_eq!(second.changes.len(), 2);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn failed_commit_publishes_nothing() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();

        let mut tracker = SyncTracker::new();
        tracker.track(WorkspaceId::new(), SyncTopic::Flow, SyncOp::Delete, Uuid::now_v7());

        let result = tracker
            .publish_after(async { Err::<(), _>("disk full".to_string()) }, &bus)
            .await;
        assert!(result.is_err());
        assert!(rx.try_recv().is_err());
    }
}
