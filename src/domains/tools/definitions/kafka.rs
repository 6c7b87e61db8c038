//! Kafka tools: topic listing and admin, produce and consume.

use serde::Deserialize;
use serde_json::{Value, json};
use std::time::Duration;
use tracing::info;

use crate::backends::{BackendId, MessageBroker};
use crate::domains::tools::descriptor::{Acquired, ArgSpec, InvokeResult, ToolDescriptor};
use crate::domains::tools::normalize::RawOutput;

fn topic_arg() -> ArgSpec {
    ArgSpec::string("topic", "Topic name").required()
}

// ============================================================================
// Topics
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct KafkaListTopicsParams {}

pub struct KafkaListTopicsTool;

impl KafkaListTopicsTool {
    pub const NAME: &'static str = "kafka_list_topics";
    pub const DESCRIPTION: &'static str = "List all Kafka topics.";

    pub async fn execute(_params: KafkaListTopicsParams, broker: &dyn MessageBroker) -> InvokeResult {
        let mut topics = broker.list_topics().await?;
        topics.sort_unstable();
        Ok(RawOutput::Document(Value::from(topics)))
    }

    pub fn descriptor() -> ToolDescriptor {
        ToolDescriptor::new(
            Self::NAME,
            Self::DESCRIPTION,
            BackendId::Kafka,
            Vec::new(),
            |params: KafkaListTopicsParams, acquired: Acquired| async move {
                let broker = acquired.broker(BackendId::Kafka)?;
                Self::execute(params, broker.as_ref()).await
            },
        )
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct KafkaTopicParams {
    pub topic: String,
}

/// Reports every partition of a topic with its offset range.
pub struct KafkaDescribeTopicTool;

impl KafkaDescribeTopicTool {
    pub const NAME: &'static str = "kafka_describe_topic";
    pub const DESCRIPTION: &'static str =
        "Describe a Kafka topic (partitions and their offset ranges).";

    pub async fn execute(params: KafkaTopicParams, broker: &dyn MessageBroker) -> InvokeResult {
        let description = broker.describe_topic(&params.topic).await?;
        let partitions: Vec<Value> = description
            .partitions
            .iter()
            .map(|p| {
                json!({
                    "partition": p.partition,
                    "earliest_offset": p.earliest,
                    "latest_offset": p.latest,
                })
            })
            .collect();
        Ok(RawOutput::Document(json!({
            "topic": description.topic,
            "partitions": partitions,
        })))
    }

    pub fn descriptor() -> ToolDescriptor {
        ToolDescriptor::new(
            Self::NAME,
            Self::DESCRIPTION,
            BackendId::Kafka,
            vec![topic_arg()],
            |params: KafkaTopicParams, acquired: Acquired| async move {
                let broker = acquired.broker(BackendId::Kafka)?;
                Self::execute(params, broker.as_ref()).await
            },
        )
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct KafkaCreateTopicParams {
    pub name: String,
    pub num_partitions: i32,
    pub replication_factor: i16,
}

pub struct KafkaCreateTopicTool;

impl KafkaCreateTopicTool {
    pub const NAME: &'static str = "kafka_create_topic";
    pub const DESCRIPTION: &'static str = "Create a new Kafka topic.";

    pub async fn execute(params: KafkaCreateTopicParams, broker: &dyn MessageBroker) -> InvokeResult {
        broker
            .create_topic(&params.name, params.num_partitions, params.replication_factor)
            .await?;
        info!(topic = %params.name, "Kafka topic created");
        Ok(RawOutput::Text(format!(
            "Topic '{}' created (partitions={}, replication={}).",
            params.name, params.num_partitions, params.replication_factor
        )))
    }

    pub fn descriptor() -> ToolDescriptor {
        ToolDescriptor::new(
            Self::NAME,
            Self::DESCRIPTION,
            BackendId::Kafka,
            vec![
                ArgSpec::string("name", "Topic name").required(),
                ArgSpec::integer("num_partitions", "Partition count", Some(1), Some(i64::from(i32::MAX)))
                    .default(1),
                ArgSpec::integer(
                    "replication_factor",
                    "Replicas per partition",
                    Some(1),
                    Some(i64::from(i16::MAX)),
                )
                .default(1),
            ],
            |params: KafkaCreateTopicParams, acquired: Acquired| async move {
                let broker = acquired.broker(BackendId::Kafka)?;
                Self::execute(params, broker.as_ref()).await
            },
        )
    }
}

// ============================================================================
// Produce / Consume
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct KafkaProduceParams {
    pub topic: String,
    pub value: String,
    pub key: Option<String>,
}

/// Produces one record. Keyed records always land on the same partition.
pub struct KafkaProduceTool;

impl KafkaProduceTool {
    pub const NAME: &'static str = "kafka_produce";
    pub const DESCRIPTION: &'static str =
        "Produce a message to a Kafka topic. Optionally specify a key.";

    pub async fn execute(params: KafkaProduceParams, broker: &dyn MessageBroker) -> InvokeResult {
        let record = broker
            .produce(&params.topic, params.key.as_deref(), &params.value)
            .await?;
        Ok(RawOutput::Document(json!({
            "topic": record.topic,
            "partition": record.partition,
            "offset": record.offset,
        })))
    }

    pub fn descriptor() -> ToolDescriptor {
        ToolDescriptor::new(
            Self::NAME,
            Self::DESCRIPTION,
            BackendId::Kafka,
            vec![
                topic_arg(),
                ArgSpec::string("value", "Message value").required(),
                ArgSpec::string("key", "Message key"),
            ],
            |params: KafkaProduceParams, acquired: Acquired| async move {
                let broker = acquired.broker(BackendId::Kafka)?;
                Self::execute(params, broker.as_ref()).await
            },
        )
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct KafkaConsumeParams {
    pub topic: String,
    pub count: usize,
    pub timeout_ms: u64,
}

/// Reads up to `count` records from the earliest offset. When the deadline
/// passes first, the records read so far are returned.
pub struct KafkaConsumeTool;

impl KafkaConsumeTool {
    pub const NAME: &'static str = "kafka_consume";
    pub const DESCRIPTION: &'static str =
        "Consume messages from a Kafka topic (earliest offset, up to `count` messages).";

    pub async fn execute(params: KafkaConsumeParams, broker: &dyn MessageBroker) -> InvokeResult {
        let messages = broker
            .consume(
                &params.topic,
                params.count,
                Duration::from_millis(params.timeout_ms),
            )
            .await?;
        Ok(RawOutput::Messages(messages))
    }

    pub fn descriptor() -> ToolDescriptor {
        ToolDescriptor::new(
            Self::NAME,
            Self::DESCRIPTION,
            BackendId::Kafka,
            vec![
                topic_arg(),
                ArgSpec::integer("count", "Maximum messages to return", Some(1), Some(1000))
                    .default(10),
                ArgSpec::integer("timeout_ms", "How long to wait, in milliseconds", Some(0), Some(60_000))
                    .default(5000),
            ],
            |params: KafkaConsumeParams, acquired: Acquired| async move {
                let broker = acquired.broker(BackendId::Kafka)?;
                Self::execute(params, broker.as_ref()).await
            },
        )
    }
}

/// Every Kafka tool.
pub fn tools() -> Vec<ToolDescriptor> {
    vec![
        KafkaListTopicsTool::descriptor(),
        KafkaDescribeTopicTool::descriptor(),
        KafkaCreateTopicTool::descriptor(),
        KafkaProduceTool::descriptor(),
        KafkaConsumeTool::descriptor(),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::memory::MemoryBroker;

    #[tokio::test]
    async fn test_topics_sorted_and_described() {
        let broker = MemoryBroker::new().with_topic("orders", 2).with_topic("audit", 1);
        let output = KafkaListTopicsTool::execute(KafkaListTopicsParams {}, &broker)
            .await
            .unwrap();
        assert_eq!(output, RawOutput::Document(json!(["audit", "orders"])));

        broker.produce("orders", Some("k"), "v").await.unwrap();
        let output = KafkaDescribeTopicTool::execute(
            KafkaTopicParams {
                topic: "orders".to_string(),
            },
            &broker,
        )
        .await
        .unwrap();
        let RawOutput::Document(doc) = output else {
            panic!("expected a document");
        };
        assert_eq!(doc["topic"], "orders");
        assert_eq!(doc["partitions"].as_array().unwrap().len(), 2);
        let latest: i64 = doc["partitions"]
            .as_array()
            .unwrap()
            .iter()
            .map(|p| p["latest_offset"].as_i64().unwrap())
            .sum();
        assert_eq!(latest, 1);
    }

    #[tokio::test]
    async fn test_create_topic_message_and_duplicate() {
        let broker = MemoryBroker::new();
        let params = KafkaCreateTopicParams {
            name: "events".to_string(),
            num_partitions: 3,
            replication_factor: 1,
        };
        let output = KafkaCreateTopicTool::execute(params.clone(), &broker).await.unwrap();
        assert_eq!(
            output,
            RawOutput::Text("Topic 'events' created (partitions=3, replication=1).".to_string())
        );
        assert!(KafkaCreateTopicTool::execute(params, &broker).await.is_err());
    }

    #[tokio::test]
    async fn test_keyed_produce_is_sticky() {
        let broker = MemoryBroker::new().with_topic("orders", 4);
        let mut partitions = Vec::new();
        for n in 0..3 {
            let output = KafkaProduceTool::execute(
                KafkaProduceParams {
                    topic: "orders".to_string(),
                    value: format!("v{n}"),
                    key: Some("customer-7".to_string()),
                },
                &broker,
            )
            .await
            .unwrap();
            let RawOutput::Document(doc) = output else {
                panic!("expected a document");
            };
            assert_eq!(doc["offset"], n);
            partitions.push(doc["partition"].clone());
        }
        assert!(partitions.windows(2).all(|w| w[0] == w[1]));
    }

    #[tokio::test]
    async fn test_consume_returns_messages() {
        let broker = MemoryBroker::new().with_topic("t", 1);
        broker.produce("t", None, "a").await.unwrap();
        let output = KafkaConsumeTool::execute(
            KafkaConsumeParams {
                topic: "t".to_string(),
                count: 1,
                timeout_ms: 0,
            },
            &broker,
        )
        .await
        .unwrap();
        let RawOutput::Messages(messages) = output else {
            panic!("expected messages");
        };
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].value.as_deref(), Some(b"a".as_slice()));
    }
}
