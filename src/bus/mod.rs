//! Bus - MQTT Broker Adapter
//!
//! ## Responsibilities
//!
//! - Maintain the broker connection with bounded exponential backoff
//! - Re-establish the detection subscription after every reconnect
//! - Feed raw detection messages into a bounded queue (drop-oldest overflow)
//! - Publish QoS-1 retained analysis payloads
//!
//! One I/O task drives the event loop; workers never touch the socket.

use crate::config_store::RuntimeConfig;
use crate::error::{Error, Result};
use rand::Rng;
use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Notify};

/// Reconnect backoff bounds
const BACKOFF_MIN: Duration = Duration::from_secs(1);
const BACKOFF_MAX: Duration = Duration::from_secs(30);

/// Bounded queue of inbound detection messages.
/// Overflow drops the oldest entries so the freshest detections survive
/// a detection storm.
pub struct EventQueue {
    inner: Mutex<VecDeque<Vec<u8>>>,
    notify: Notify,
    capacity: usize,
}

impl EventQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(VecDeque::with_capacity(capacity)),
            notify: Notify::new(),
            capacity,
        }
    }

    /// Push one message; drops the oldest entry when full
    pub async fn push(&self, payload: Vec<u8>) {
        let mut queue = self.inner.lock().await;
        if queue.len() >= self.capacity {
            queue.pop_front();
            tracing::warn!(capacity = self.capacity, "Event queue overflow, dropped oldest");
        }
        queue.push_back(payload);
        drop(queue);
        self.notify.notify_one();
    }

    /// Wait for and pop the oldest message
    pub async fn pop(&self) -> Vec<u8> {
        loop {
            {
                let mut queue = self.inner.lock().await;
                if let Some(payload) = queue.pop_front() {
                    return payload;
                }
            }
            self.notify.notified().await;
        }
    }

    #[cfg(test)]
    pub async fn len(&self) -> usize {
        self.inner.lock().await.len()
    }
}

/// Bus handle shared by the publisher
#[derive(Clone)]
pub struct BusClient {
    client: AsyncClient,
}

impl BusClient {
    /// Connect to the broker and spawn the I/O task.
    /// Returns the publish handle; inbound messages land on `queue`.
    pub fn start(config: &RuntimeConfig, queue: Arc<EventQueue>) -> (Self, tokio::task::JoinHandle<()>) {
        let suffix: String = rand::thread_rng()
            .sample_iter(&rand::distributions::Alphanumeric)
            .take(6)
            .map(|c| c.to_ascii_lowercase() as char)
            .collect();
        let client_id = format!("sentinel-bridge-{}", suffix);

        let mut options = MqttOptions::new(client_id, config.mqtt_host.clone(), config.mqtt_port);
        options.set_keep_alive(Duration::from_secs(60));
        if !config.mqtt_user.is_empty() {
            options.set_credentials(config.mqtt_user.clone(), config.mqtt_pass.clone());
        }

        let (client, mut eventloop) = AsyncClient::new(options, 32);
        let subscribe_topic = config.mqtt_topic_subscribe.clone();
        let loop_client = client.clone();

        let io_task = tokio::spawn(async move {
            let mut backoff = BACKOFF_MIN;
            loop {
                match eventloop.poll().await {
                    Ok(Event::Incoming(Packet::ConnAck(_))) => {
                        backoff = BACKOFF_MIN;
                        tracing::info!(topic = %subscribe_topic, "Bus connected, subscribing");
                        if let Err(e) = loop_client
                            .subscribe(subscribe_topic.clone(), QoS::AtLeastOnce)
                            .await
                        {
                            tracing::error!(error = %e, "Bus subscribe failed");
                        }
                    }
                    Ok(Event::Incoming(Packet::Publish(publish))) => {
                        queue.push(publish.payload.to_vec()).await;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        tracing::warn!(error = %e, backoff_secs = backoff.as_secs(), "Bus connection error, backing off");
                        tokio::time::sleep(backoff).await;
                        backoff = (backoff * 2).min(BACKOFF_MAX);
                    }
                }
            }
        });

        (Self { client }, io_task)
    }

    /// QoS-1 retained publish so late joiners see the last state per event
    pub async fn publish_retained(&self, topic: &str, payload: &str) -> Result<()> {
        self.client
            .publish(topic, QoS::AtLeastOnce, true, payload.as_bytes())
            .await
            .map_err(|e| Error::Bus(format!("publish to {} failed: {}", topic, e)))
    }

    /// Disconnect cleanly; rumqttc flushes in-flight QoS-1 publishes
    pub async fn shutdown(&self) {
        if let Err(e) = self.client.disconnect().await {
            tracing::warn!(error = %e, "Bus disconnect failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_queue_fifo_order() {
        let queue = EventQueue::new(4);
        queue.push(b"a".to_vec()).await;
        queue.push(b"b".to_vec()).await;
        assert_eq!(queue.pop().await, b"a".to_vec());
        assert_eq!(queue.pop().await, b"b".to_vec());
    }

    #[tokio::test]
    async fn test_queue_overflow_drops_oldest() {
        let queue = EventQueue::new(2);
        queue.push(b"a".to_vec()).await;
        queue.push(b"b".to_vec()).await;
        queue.push(b"c".to_vec()).await;
        assert_eq!(queue.len().await, 2);
        assert_eq!(queue.pop().await, b"b".to_vec());
        assert_eq!(queue.pop().await, b"c".to_vec());
    }
}
