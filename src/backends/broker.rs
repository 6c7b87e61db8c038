//! Message broker port and its Kafka client.
//!
//! One [`KafkaBroker`] plays three roles: topic admin (through the
//! controller), producer (cached per-partition clients) and consumer factory
//! (reads from the earliest offset of every partition, without a group).

use async_trait::async_trait;
use chrono::Utc;
use rskafka::client::partition::{Compression, OffsetAt, PartitionClient, UnknownTopicHandling};
use rskafka::client::{Client, ClientBuilder};
use rskafka::record::Record;
use rskafka::BackoffConfig;
use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, instrument};

use super::config::BackendConfig;
use super::error::BackendFailure;

/// Upper bound on bytes returned by a single fetch.
const FETCH_MAX_BYTES: i32 = 1_000_000;

/// How long the controller may take to create a topic.
const CREATE_TOPIC_TIMEOUT_MS: i32 = 5_000;

/// One consumed record, with key and value left as raw bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerMessage {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    pub key: Option<Vec<u8>>,
    pub value: Option<Vec<u8>>,
    /// Milliseconds since the Unix epoch.
    pub timestamp_ms: i64,
}

/// Where a produced record landed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProducedRecord {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
}

/// Offset range of one partition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionOffsets {
    pub partition: i32,
    pub earliest: i64,
    pub latest: i64,
}

/// Partition layout of one topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicDescription {
    pub topic: String,
    pub partitions: Vec<PartitionOffsets>,
}

/// A message broker.
#[async_trait]
pub trait MessageBroker: Send + Sync {
    /// Names of all topics.
    async fn list_topics(&self) -> Result<Vec<String>, BackendFailure>;

    /// Partitions and offsets of one topic.
    async fn describe_topic(&self, topic: &str) -> Result<TopicDescription, BackendFailure>;

    /// Create a topic.
    async fn create_topic(
        &self,
        name: &str,
        num_partitions: i32,
        replication_factor: i16,
    ) -> Result<(), BackendFailure>;

    /// Produce one record.
    async fn produce(
        &self,
        topic: &str,
        key: Option<&str>,
        value: &str,
    ) -> Result<ProducedRecord, BackendFailure>;

    /// Read up to `max_records` records from the earliest offsets, waiting at
    /// most `timeout`. Running out of time is not an error: whatever arrived
    /// so far is returned, ordered by partition then offset.
    async fn consume(
        &self,
        topic: &str,
        max_records: usize,
        timeout: Duration,
    ) -> Result<Vec<BrokerMessage>, BackendFailure>;

    /// Release the client.
    async fn close(&self) -> Result<(), BackendFailure> {
        Ok(())
    }
}

/// Pick the partition for a produced record: a stable FNV-1a hash of the key,
/// or round-robin when there is no key.
pub fn select_partition(key: Option<&str>, partitions: usize, counter: usize) -> i32 {
    let partitions = partitions.max(1);
    let slot = match key {
        Some(key) => {
            let hash = key.bytes().fold(0xcbf2_9ce4_8422_2325_u64, |hash, byte| {
                (hash ^ u64::from(byte)).wrapping_mul(0x0100_0000_01b3)
            });
            (hash % partitions as u64) as usize
        }
        None => counter % partitions,
    };
    i32::try_from(slot).unwrap_or(0)
}

/// Kafka client shared by every broker tool.
///
/// The client's internal retries stop once `request_timeout` has been spent
/// backing off, and every call is additionally capped at that timeout, so a
/// broker that disappears after connecting fails calls instead of hanging
/// them.
pub struct KafkaBroker {
    client: Client,
    partitions: Mutex<HashMap<(String, i32), Arc<PartitionClient>>>,
    round_robin: AtomicUsize,
    request_timeout: Duration,
}

impl KafkaBroker {
    /// Connect to the comma-separated bootstrap servers in the config address.
    pub async fn connect(config: &BackendConfig) -> Result<Self, BackendFailure> {
        let brokers: Vec<String> = config
            .address
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();

        let backoff = BackoffConfig {
            deadline: Some(config.limits.request_timeout),
            ..BackoffConfig::default()
        };
        let client = ClientBuilder::new(brokers.clone())
            .backoff_config(backoff)
            .build()
            .await
            .map_err(|e| BackendFailure::from_kafka(&e))?;

        info!(?brokers, "Kafka client ready");
        Ok(Self {
            client,
            partitions: Mutex::new(HashMap::new()),
            round_robin: AtomicUsize::new(0),
            request_timeout: config.limits.request_timeout,
        })
    }

    /// Run one broker call, failing it once `request_timeout` has passed.
    async fn bounded<T>(
        &self,
        call: impl Future<Output = Result<T, BackendFailure>>,
    ) -> Result<T, BackendFailure> {
        tokio::time::timeout(self.request_timeout, call)
            .await
            .unwrap_or_else(|_| {
                Err(BackendFailure::TimedOut(format!(
                    "no answer from Kafka within {:?}",
                    self.request_timeout
                )))
            })
    }

    async fn partition_count(&self, topic: &str) -> Result<usize, BackendFailure> {
        let topics = self
            .client
            .list_topics()
            .await
            .map_err(|e| BackendFailure::from_kafka(&e))?;
        topics
            .into_iter()
            .find(|t| t.name == topic)
            .map(|t| t.partitions.len())
            .filter(|count| *count > 0)
            .ok_or_else(|| BackendFailure::rejected(format!("unknown topic '{topic}'")))
    }

    async fn partition_client(
        &self,
        topic: &str,
        partition: i32,
    ) -> Result<Arc<PartitionClient>, BackendFailure> {
        let cache_key = (topic.to_string(), partition);
        if let Some(existing) = self.partitions.lock().await.get(&cache_key) {
            return Ok(existing.clone());
        }

        let created = self
            .client
            .partition_client(topic.to_string(), partition, UnknownTopicHandling::Error)
            .await
            .map_err(|e| BackendFailure::from_kafka(&e))?;

        let mut cache = self.partitions.lock().await;
        Ok(cache.entry(cache_key).or_insert_with(|| Arc::new(created)).clone())
    }

    async fn offsets(&self, topic: &str, partition: i32) -> Result<PartitionOffsets, BackendFailure> {
        let client = self.partition_client(topic, partition).await?;
        let earliest = client
            .get_offset(OffsetAt::Earliest)
            .await
            .map_err(|e| BackendFailure::from_kafka(&e))?;
        let latest = client
            .get_offset(OffsetAt::Latest)
            .await
            .map_err(|e| BackendFailure::from_kafka(&e))?;
        Ok(PartitionOffsets {
            partition,
            earliest,
            latest,
        })
    }
}

#[async_trait]
impl MessageBroker for KafkaBroker {
    async fn list_topics(&self) -> Result<Vec<String>, BackendFailure> {
        let topics = self
            .bounded(async {
                self.client
                    .list_topics()
                    .await
                    .map_err(|e| BackendFailure::from_kafka(&e))
            })
            .await?;
        Ok(topics.into_iter().map(|t| t.name).collect())
    }

    #[instrument(skip(self))]
    async fn describe_topic(&self, topic: &str) -> Result<TopicDescription, BackendFailure> {
        self.bounded(async {
            let count = self.partition_count(topic).await?;
            let mut partitions = Vec::with_capacity(count);
            for partition in 0..count {
                let partition = i32::try_from(partition)
                    .map_err(|_| BackendFailure::protocol("partition id out of range"))?;
                partitions.push(self.offsets(topic, partition).await?);
            }
            Ok(TopicDescription {
                topic: topic.to_string(),
                partitions,
            })
        })
        .await
    }

    #[instrument(skip(self))]
    async fn create_topic(
        &self,
        name: &str,
        num_partitions: i32,
        replication_factor: i16,
    ) -> Result<(), BackendFailure> {
        let controller = self
            .client
            .controller_client()
            .map_err(|e| BackendFailure::from_kafka(&e))?;
        self.bounded(async {
            controller
                .create_topic(name, num_partitions, replication_factor, CREATE_TOPIC_TIMEOUT_MS)
                .await
                .map_err(|e| BackendFailure::from_kafka(&e))
        })
        .await
    }

    #[instrument(skip(self, value))]
    async fn produce(
        &self,
        topic: &str,
        key: Option<&str>,
        value: &str,
    ) -> Result<ProducedRecord, BackendFailure> {
        self.bounded(async {
            let count = self.partition_count(topic).await?;
            let partition = select_partition(
                key,
                count,
                self.round_robin.fetch_add(1, Ordering::Relaxed),
            );
            let client = self.partition_client(topic, partition).await?;

            let record = Record {
                key: key.map(|k| k.as_bytes().to_vec()),
                value: Some(value.as_bytes().to_vec()),
                headers: BTreeMap::new(),
                timestamp: Utc::now(),
            };
            let offsets = client
                .produce(vec![record], Compression::NoCompression)
                .await
                .map_err(|e| BackendFailure::from_kafka(&e))?;
            let offset = offsets
                .first()
                .copied()
                .ok_or_else(|| BackendFailure::protocol("broker acknowledged no offset"))?;

            Ok(ProducedRecord {
                topic: topic.to_string(),
                partition,
                offset,
            })
        })
        .await
    }

    #[instrument(skip(self))]
    async fn consume(
        &self,
        topic: &str,
        max_records: usize,
        timeout: Duration,
    ) -> Result<Vec<BrokerMessage>, BackendFailure> {
        let deadline = Instant::now() + timeout;
        let mut messages = Vec::new();

        let read = self.read_from_earliest(topic, max_records, deadline, &mut messages);
        let outcome = tokio::time::timeout_at(deadline, read).await;
        match outcome {
            Ok(result) => result?,
            Err(_) => debug!(collected = messages.len(), "Consume deadline reached"),
        }
        Ok(messages)
    }
}

impl KafkaBroker {
    /// Append records to `messages`, partition by partition, until
    /// `max_records` are collected or every partition is drained.
    async fn read_from_earliest(
        &self,
        topic: &str,
        max_records: usize,
        deadline: Instant,
        messages: &mut Vec<BrokerMessage>,
    ) -> Result<(), BackendFailure> {
        let count = self.partition_count(topic).await?;

        for partition in 0..count {
            let partition = i32::try_from(partition)
                .map_err(|_| BackendFailure::protocol("partition id out of range"))?;
            let PartitionOffsets {
                earliest, latest, ..
            } = self.offsets(topic, partition).await?;
            let client = self.partition_client(topic, partition).await?;
            let mut next = earliest;

            while next < latest && messages.len() < max_records {
                let remaining = deadline.saturating_duration_since(Instant::now());
                let max_wait_ms = i32::try_from(remaining.as_millis()).unwrap_or(i32::MAX);
                let (records, _high_watermark) = client
                    .fetch_records(next, 1..FETCH_MAX_BYTES, max_wait_ms)
                    .await
                    .map_err(|e| BackendFailure::from_kafka(&e))?;

                let from = next;
                for item in records.into_iter().filter(|r| r.offset >= from) {
                    if messages.len() >= max_records {
                        break;
                    }
                    next = item.offset + 1;
                    messages.push(BrokerMessage {
                        topic: topic.to_string(),
                        partition,
                        offset: item.offset,
                        key: item.record.key,
                        value: item.record.value,
                        timestamp_ms: item.record.timestamp.timestamp_millis(),
                    });
                }
                if next == from {
                    break;
                }
            }

            if messages.len() >= max_records {
                break;
            }
        }
        Ok(())
    }
}
