use futures::future::BoxFuture;
use futures::FutureExt;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{Consumer, StreamConsumer};
use rdkafka::message::Message;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::config::AppConfig;
use crate::error::{Result, TrackerError};
use crate::location::{LocationProvider, Permission};
use crate::models::message::{GpsFix, GpsMessage};
use crate::models::Coordinates;

#[derive(Debug, Clone)]
struct ReceivedFix {
    fix: GpsFix,
    received_at: Instant,
}

/// Location provider fed by the shuttle's on-board GPS unit.
///
/// A background consumer reads the telemetry topic and keeps the newest fix
/// for one device; `current_position` answers from that fix as long as it is
/// younger than the configured maximum age.
pub struct KafkaLocationFeed {
    device_id: String,
    latest: watch::Receiver<Option<ReceivedFix>>,
    max_age: Duration,
    consumer_task: JoinHandle<()>,
}

impl KafkaLocationFeed {
    /// Starts the Kafka consumer with SASL authentication and a circuit breaker.
    pub fn start(config: &AppConfig, device_id: &str) -> Result<Self> {
        info!(
            "Initializing GPS feed for device {} on topic: {}",
            device_id, config.kafka_topic
        );

        let mut client_config = ClientConfig::new();
        client_config
            .set("bootstrap.servers", &config.kafka_bootstrap_servers)
            .set("group.id", &config.kafka_group_id)
            .set("auto.offset.reset", &config.kafka_auto_offset_reset)
            // SASL Configuration
            .set("security.protocol", &config.kafka_security_protocol)
            .set("sasl.mechanism", &config.kafka_sasl_mechanism)
            .set("sasl.username", &config.kafka_username)
            .set("sasl.password", &config.kafka_password);

        let consumer: StreamConsumer = client_config.create()?;
        consumer.subscribe(&[&config.kafka_topic])?;
        info!("Subscribed to topic: {}", config.kafka_topic);

        let (tx, latest) = watch::channel(None);
        let breaker = CircuitBreaker {
            max_retries: config.kafka_max_retries,
            cooldown: Duration::from_secs(config.kafka_circuit_breaker_cooldown),
        };
        let consumer_task = tokio::spawn(consume(consumer, device_id.to_string(), tx, breaker));

        Ok(Self {
            device_id: device_id.to_string(),
            latest,
            max_age: Duration::from_secs(config.gps_fix_max_age_secs),
            consumer_task,
        })
    }

    fn fresh_fix(&self) -> Result<Coordinates> {
        let latest = self.latest.borrow();
        match latest.as_ref() {
            None => Err(TrackerError::remote(format!(
                "no GPS fix received yet from device {}",
                self.device_id
            ))),
            Some(received) if received.received_at.elapsed() > self.max_age => {
                Err(TrackerError::remote(format!(
                    "last GPS fix from device {} is older than {}s",
                    self.device_id,
                    self.max_age.as_secs()
                )))
            }
            Some(received) => Ok(received.fix.coordinates),
        }
    }
}

impl Drop for KafkaLocationFeed {
    fn drop(&mut self) {
        self.consumer_task.abort();
    }
}

impl LocationProvider for KafkaLocationFeed {
    fn request_permission(&self) -> BoxFuture<'_, Result<Permission>> {
        async { Ok(Permission::Granted) }.boxed()
    }

    fn current_position(&self) -> BoxFuture<'_, Result<Coordinates>> {
        let position = self.fresh_fix();
        async move { position }.boxed()
    }
}

struct CircuitBreaker {
    max_retries: u32,
    cooldown: Duration,
}

async fn consume(
    consumer: StreamConsumer,
    device_id: String,
    tx: watch::Sender<Option<ReceivedFix>>,
    breaker: CircuitBreaker,
) {
    let mut consecutive_failures = 0;

    loop {
        if consecutive_failures >= breaker.max_retries {
            warn!(
                "Circuit breaker tripped ({} consecutive failures)! Sleeping for {} seconds...",
                consecutive_failures,
                breaker.cooldown.as_secs()
            );
            tokio::time::sleep(breaker.cooldown).await;
            consecutive_failures = 0;
            info!("Circuit breaker reset. Resuming consumption.");
        }

        match consumer.recv().await {
            Ok(m) => {
                consecutive_failures = 0;

                let payload = match m.payload() {
                    None => {
                        warn!("Received empty payload from Kafka");
                        continue;
                    }
                    Some(p) => p,
                };

                if let Some(fix) = fix_for_device(&device_id, payload) {
                    debug!(
                        "GPS fix for {} at {}: {}, {}",
                        device_id,
                        fix.captured_at,
                        fix.coordinates.latitude,
                        fix.coordinates.longitude
                    );
                    let captured_at = fix.captured_at;
                    if !tx.send_if_modified(|latest| accept_fix(latest, fix, Instant::now())) {
                        debug!(
                            "Ignoring replayed GPS fix for {} captured at {}",
                            device_id, captured_at
                        );
                    }
                }
            }
            Err(e) => {
                error!(
                    "Kafka error: {}. Incrementing failure count ({} / {})",
                    e,
                    consecutive_failures + 1,
                    breaker.max_retries
                );
                consecutive_failures += 1;
                tokio::time::sleep(Duration::from_millis(500)).await;
            }
        }
    }
}

/// Keeps `fix` unless the current one was captured later; units replay
/// buffered points after losing signal.
fn accept_fix(latest: &mut Option<ReceivedFix>, fix: GpsFix, received_at: Instant) -> bool {
    if let Some(current) = latest.as_ref() {
        if fix.captured_at < current.fix.captured_at {
            return false;
        }
    }
    *latest = Some(ReceivedFix { fix, received_at });
    true
}

/// Parses one telemetry payload, keeping it only if it is a usable fix for
/// `device_id`.
fn fix_for_device(device_id: &str, payload: &[u8]) -> Option<GpsFix> {
    let message: GpsMessage = match serde_json::from_slice(payload) {
        Ok(m) => m,
        Err(e) => {
            warn!("Failed to parse GPS message: {}", e);
            return None;
        }
    };

    if message.device_id().map(String::as_str) != Some(device_id) {
        return None;
    }
    message.into_fix()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fix_for_other_device_is_ignored() {
        let payload = br#"{ "data": { "DEVICE_ID": "bus-9", "LATITUD": "5.6", "LONGITUD": "-0.1" } }"#;
        assert!(fix_for_device("bus-3", payload).is_none());
        assert!(fix_for_device("bus-9", payload).is_some());
    }

    #[test]
    fn test_garbage_payload_is_ignored() {
        assert!(fix_for_device("bus-3", b"not json").is_none());
    }

    const MAX_AGE: Duration = Duration::from_secs(30);

    fn fix_at(latitude: f64, captured_at: &str) -> GpsFix {
        GpsFix {
            coordinates: Coordinates {
                latitude,
                longitude: -0.18,
            },
            captured_at: captured_at.parse().unwrap(),
        }
    }

    fn feed(latest: watch::Receiver<Option<ReceivedFix>>) -> KafkaLocationFeed {
        KafkaLocationFeed {
            device_id: "bus-3".to_string(),
            latest,
            max_age: MAX_AGE,
            consumer_task: tokio::spawn(async {}),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_position_requires_a_fix() {
        let (_tx, rx) = watch::channel(None);
        let gps = feed(rx);
        assert!(matches!(
            gps.current_position().await,
            Err(TrackerError::Remote(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_fresh_fix_answers_until_it_is_stale() {
        let fix = fix_at(5.65, "2025-11-29T06:15:15Z");
        let (tx, rx) = watch::channel(None);
        tx.send_replace(Some(ReceivedFix {
            fix: fix.clone(),
            received_at: Instant::now(),
        }));
        let gps = feed(rx);

        tokio::time::advance(MAX_AGE - Duration::from_secs(1)).await;
        assert_eq!(gps.current_position().await.unwrap(), fix.coordinates);

        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(matches!(
            gps.current_position().await,
            Err(TrackerError::Remote(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_replayed_fix_does_not_replace_newer_one() {
        let mut latest = None;
        assert!(accept_fix(&mut latest, fix_at(5.61, "2025-11-29T06:15:20Z"), Instant::now()));
        assert!(!accept_fix(&mut latest, fix_at(5.60, "2025-11-29T06:15:10Z"), Instant::now()));
        assert_eq!(latest.as_ref().unwrap().fix.coordinates.latitude, 5.61);

        assert!(accept_fix(&mut latest, fix_at(5.62, "2025-11-29T06:15:25Z"), Instant::now()));
        assert_eq!(latest.unwrap().fix.coordinates.latitude, 5.62);
    }
}
