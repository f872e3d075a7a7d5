//! opendm-events - Fire-and-forget publication toward downstream consumers
//!
//! Domain events go to `dm.events`, metric samples to `dm.metrics`; the
//! message key is the event/metric identifier and the value its JSON
//! encoding. Publishing is synchronous with a bounded producer-side retry;
//! a failure is logged and surfaced, never rolled back into repository
//! state.

pub mod kafka;

use async_trait::async_trait;
use opendm_core::wire::{Event, Metric};
use parking_lot::Mutex;
use thiserror::Error;
use tracing::{debug, error};

/// Topic carrying domain events.
pub const EVENTS_TOPIC: &str = "dm.events";
/// Topic carrying metric samples.
pub const METRICS_TOPIC: &str = "dm.metrics";

#[derive(Debug, Error)]
pub enum BusError {
    #[error("encode failed: {0}")]
    Codec(#[from] serde_json::Error),

    #[error("publish failed: {0}")]
    Publish(String),

    #[error("message bus producer not available")]
    NotConnected,
}

/// Message-bus contract: keyed publication onto a topic.
#[async_trait]
pub trait MessageBus: Send + Sync {
    async fn publish(&self, topic: &str, key: &str, payload: Vec<u8>) -> Result<(), BusError>;
}

/// Publish one domain event.
pub async fn send_event(bus: &dyn MessageBus, event: &Event) -> Result<(), BusError> {
    let payload = serde_json::to_vec(event)?;
    debug!(event_id = %event.event_id, "publishing event");
    bus.publish(EVENTS_TOPIC, &event.event_id, payload)
        .await
        .inspect_err(|e| error!(event_id = %event.event_id, error = %e, "event publish failed"))
}

/// Publish one metric sample.
pub async fn send_metric(bus: &dyn MessageBus, metric: &Metric) -> Result<(), BusError> {
    let payload = serde_json::to_vec(metric)?;
    debug!(metric_id = %metric.metric_id, "publishing metric");
    bus.publish(METRICS_TOPIC, &metric.metric_id, payload)
        .await
        .inspect_err(|e| error!(metric_id = %metric.metric_id, error = %e, "metric publish failed"))
}

/// In-memory bus for tests: records everything published.
#[derive(Default)]
pub struct MemoryBus {
    published: Mutex<Vec<(String, String, Vec<u8>)>>,
}

impl MemoryBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn published(&self) -> Vec<(String, String, Vec<u8>)> {
        self.published.lock().clone()
    }
}

#[async_trait]
impl MessageBus for MemoryBus {
    async fn publish(&self, topic: &str, key: &str, payload: Vec<u8>) -> Result<(), BusError> {
        self.published
            .lock()
            .push((topic.to_string(), key.to_string(), payload));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use opendm_core::wire::EventMetadata;

    #[tokio::test]
    async fn events_land_on_the_events_topic_keyed_by_id() {
        let bus = MemoryBus::new();
        let event = Event {
            event_id: "EVENT_FAN_FAILURE".into(),
            metadata: EventMetadata {
                device_uuid: "u-1".into(),
                ..Default::default()
            },
            ..Default::default()
        };

        send_event(&bus, &event).await.unwrap();

        let published = bus.published();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].0, EVENTS_TOPIC);
        assert_eq!(published[0].1, "EVENT_FAN_FAILURE");
        let decoded: Event = serde_json::from_slice(&published[0].2).unwrap();
        assert_eq!(decoded, event);
    }

    #[tokio::test]
    async fn metrics_land_on_the_metrics_topic() {
        let bus = MemoryBus::new();
        let metric = Metric {
            metric_id: "METRIC_CPU_TEMP".into(),
            ..Default::default()
        };
        send_metric(&bus, &metric).await.unwrap();
        assert_eq!(bus.published()[0].0, METRICS_TOPIC);
    }
}
