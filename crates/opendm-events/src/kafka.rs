//! Kafka-backed message bus.

use std::time::Duration;

use async_trait::async_trait;
use rdkafka::config::ClientConfig;
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::util::Timeout;
use tracing::{debug, info, warn};

use crate::{BusError, MessageBus};

/// Producer-side retry budget.
const MAX_RETRIES: u32 = 6;
/// Pause between retries.
const RETRY_BACKOFF: Duration = Duration::from_millis(30);

/// [`MessageBus`] over a Kafka producer. Publishes synchronously, waiting
/// for acknowledgement from all in-sync replicas, and retries a bounded
/// number of times with a small backoff.
pub struct KafkaBus {
    producer: FutureProducer,
    send_timeout: Duration,
}

impl KafkaBus {
    /// Build the producer. Broker connectivity problems surface on first
    /// publish; construction failure is a configuration error and fatal to
    /// startup.
    pub fn connect(broker: &str, send_timeout: Duration) -> Result<Self, BusError> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", broker)
            .set("acks", "all")
            .set("message.timeout.ms", send_timeout.as_millis().to_string())
            .create()
            .map_err(|e| BusError::Publish(e.to_string()))?;
        info!(broker, "message bus producer created");
        Ok(Self {
            producer,
            send_timeout,
        })
    }
}

#[async_trait]
impl MessageBus for KafkaBus {
    async fn publish(&self, topic: &str, key: &str, payload: Vec<u8>) -> Result<(), BusError> {
        let mut attempt = 0;
        loop {
            let record = FutureRecord::to(topic).key(key).payload(&payload);
            match self
                .producer
                .send(record, Timeout::After(self.send_timeout))
                .await
            {
                Ok((partition, offset)) => {
                    debug!(topic, key, partition, offset, "message published");
                    return Ok(());
                }
                Err((e, _)) => {
                    attempt += 1;
                    if attempt > MAX_RETRIES {
                        return Err(BusError::Publish(e.to_string()));
                    }
                    warn!(topic, key, attempt, error = %e, "publish failed, retrying");
                    tokio::time::sleep(RETRY_BACKOFF).await;
                }
            }
        }
    }
}
