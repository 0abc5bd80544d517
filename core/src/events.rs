//! Publish/subscribe over typed topics. Backed by a
//! `tokio::sync::broadcast` channel per topic; delivery is
//! best-effort, in-order per topic, and non-blocking to publishers —
//! a lagging subscriber drops the oldest buffered events rather than
//! stalling the publisher.

use std::fmt;

use catalogd_model::{JobId, JobType, ScanJobId};
use tokio::sync::broadcast;

#[derive(Debug, Clone)]
pub struct ScanProgressEvent {
    pub scan_job_id: ScanJobId,
    pub discovered: i32,
    pub updated: i32,
    pub queued: i32,
    pub errored: i32,
}

/// Wider than [`catalogd_model::JobStatus`] (which only distinguishes
/// the two active-table states): event subscribers also care about the
/// terminal outcome a job left the queue with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobLifecycleStatus {
    Processing,
    Succeeded,
    Failed,
    Retrying,
}

#[derive(Debug, Clone)]
pub struct JobStateChangeEvent {
    pub job_id: JobId,
    pub job_type: JobType,
    pub status: JobLifecycleStatus,
}

#[derive(Debug, Clone)]
pub struct ProviderHealthEvent {
    pub provider_id: String,
    pub circuit_open: bool,
    pub consecutive_failures: u32,
}

#[derive(Debug, Clone)]
pub struct RateLimitPressureEvent {
    pub provider_id: String,
    pub queued_requests: usize,
}

#[derive(Debug, Clone)]
pub enum CatalogEvent {
    ScanProgress(ScanProgressEvent),
    JobStateChange(JobStateChangeEvent),
    ProviderHealth(ProviderHealthEvent),
    RateLimitPressure(RateLimitPressureEvent),
}

const DEFAULT_CAPACITY: usize = 1024;

pub struct EventBus {
    sender: broadcast::Sender<CatalogEvent>,
    capacity: usize,
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("capacity", &self.capacity)
            .field("subscribers", &self.sender.receiver_count())
            .finish()
    }
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender, capacity }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CatalogEvent> {
        self.sender.subscribe()
    }

    /// Never blocks; an event with no subscribers is simply dropped.
    pub fn publish(&self, event: CatalogEvent) {
        let _ = self.sender.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use catalogd_model::JobId;

    #[tokio::test]
    async fn subscriber_receives_published_event() {
        let bus = EventBus::new(8);
        let mut rx = bus.subscribe();
        bus.publish(CatalogEvent::JobStateChange(JobStateChangeEvent {
            job_id: JobId(1),
            job_type: JobType::EnrichMetadata,
            status: JobLifecycleStatus::Succeeded,
        }));
        let event = rx.recv().await.unwrap();
        match event {
            CatalogEvent::JobStateChange(e) => {
                assert_eq!(e.job_id, JobId(1));
                assert_eq!(e.status, JobLifecycleStatus::Succeeded);
            }
            _ => panic!("unexpected event variant"),
        }
    }

    #[test]
    fn publish_with_no_subscribers_does_not_panic() {
        let bus = EventBus::default();
        bus.publish(CatalogEvent::JobStateChange(JobStateChangeEvent {
            job_id: JobId(1),
            job_type: JobType::ScanLibrary,
            status: JobLifecycleStatus::Processing,
        }));
    }

    #[tokio::test]
    async fn lagging_subscriber_drops_oldest_rather_than_stalling_publisher() {
        let bus = EventBus::new(2);
        let mut rx = bus.subscribe();
        for i in 0..5i64 {
            bus.publish(CatalogEvent::JobStateChange(JobStateChangeEvent {
                job_id: JobId(i),
                job_type: JobType::ScanLibrary,
                status: JobLifecycleStatus::Processing,
            }));
        }
        // The channel only holds the last 2 of 5 publishes; a lagged
        // receiver is told how many it missed rather than blocking the
        // publisher that already moved on.
        let result = rx.recv().await;
        assert!(matches!(result, Err(broadcast::error::RecvError::Lagged(_))));
    }
}
