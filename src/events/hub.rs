use std::collections::HashMap;
use tokio::sync::{RwLock, broadcast, watch};
use tracing::trace;

use super::types::{DownloadNotification, NotificationKind, ProgressUpdate};
use crate::models::DownloadId;

/// Subscriber handle for global download notifications.
pub struct NotificationSubscriber {
    receiver: broadcast::Receiver<DownloadNotification>,
}

impl NotificationSubscriber {
    fn new(receiver: broadcast::Receiver<DownloadNotification>) -> Self {
        Self { receiver }
    }

    /// Receive the next notification.
    pub async fn recv(&mut self) -> anyhow::Result<DownloadNotification> {
        Ok(self.receiver.recv().await?)
    }

    /// Try to receive without blocking.
    pub fn try_recv(&mut self) -> anyhow::Result<Option<DownloadNotification>> {
        match self.receiver.try_recv() {
            Ok(notification) => Ok(Some(notification)),
            Err(broadcast::error::TryRecvError::Empty) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

/// Hub connecting the registry to its observers.
///
/// Two independent surfaces: a watch channel per download id carrying the
/// latest progress (latest-value semantics, so a late subscriber sees the
/// current state immediately), and one broadcast channel for lifecycle
/// notifications. Slow or dropped observers can never stall a transfer;
/// sends to gone receivers are ignored.
#[derive(Debug)]
pub struct ObserverHub {
    notifications: broadcast::Sender<DownloadNotification>,
    progress: RwLock<HashMap<DownloadId, watch::Sender<ProgressUpdate>>>,
}

impl ObserverHub {
    /// Create a new hub with the given notification buffer capacity.
    pub fn new(capacity: usize) -> Self {
        let (notifications, _) = broadcast::channel(capacity);
        Self {
            notifications,
            progress: RwLock::new(HashMap::new()),
        }
    }

    /// Subscribe to all lifecycle notifications.
    pub fn subscribe_notifications(&self) -> NotificationSubscriber {
        NotificationSubscriber::new(self.notifications.subscribe())
    }

    /// Subscribe to progress updates for one download. The receiver holds
    /// the most recent update at all times; dropping it unsubscribes.
    pub async fn subscribe_progress(&self, id: &DownloadId) -> watch::Receiver<ProgressUpdate> {
        let mut channels = self.progress.write().await;
        channels
            .entry(id.clone())
            .or_insert_with(|| {
                let initial = ProgressUpdate {
                    id: id.clone(),
                    ..Default::default()
                };
                watch::channel(initial).0
            })
            .subscribe()
    }

    /// Publish a progress update for its download id.
    pub async fn publish_progress(&self, update: ProgressUpdate) {
        trace!(
            "Progress for {}: {:.1}% ({} bytes)",
            update.id, update.progress, update.downloaded_bytes
        );

        let mut channels = self.progress.write().await;
        let sender = channels.entry(update.id.clone()).or_insert_with(|| {
            let initial = ProgressUpdate {
                id: update.id.clone(),
                ..Default::default()
            };
            watch::channel(initial).0
        });
        // A send only fails with no receivers; the latest value is still
        // retained for future subscribers.
        let _ = sender.send(update);
    }

    /// Drop the progress channel for a download that reached a terminal
    /// state or was deleted.
    pub async fn drop_progress(&self, id: &DownloadId) {
        self.progress.write().await.remove(id);
    }

    /// Broadcast a lifecycle notification. No subscribers is normal.
    pub fn notify(
        &self,
        id: &DownloadId,
        title: impl Into<String>,
        message: impl Into<String>,
        kind: NotificationKind,
    ) {
        let notification = DownloadNotification::new(id.clone(), title, message, kind);
        let _ = self.notifications.send(notification);
    }

    /// Current notification subscriber count.
    pub fn subscriber_count(&self) -> usize {
        self.notifications.receiver_count()
    }
}
