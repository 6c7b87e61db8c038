//! In-memory backends.
//!
//! Stand-ins for every backend family plus a connector that hands them out.
//! They record what they were asked to do, so tests can assert on calls that
//! did or did not reach a backend. Not meant for production use.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;

use super::broker::{
    BrokerMessage, MessageBroker, PartitionOffsets, ProducedRecord, TopicDescription,
    select_partition,
};
use super::config::{BackendConfig, BackendId};
use super::connection::{Connection, Connector};
use super::error::BackendFailure;
use super::http::{ApiBody, ApiRequest, HttpApi};
use super::kv::KvStore;
use super::sql::{RowSet, SqlQuery, SqlStore};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Counts close calls and can be told to fail them.
#[derive(Debug, Default)]
struct CloseTracker {
    closes: AtomicUsize,
    failure: Option<BackendFailure>,
}

impl CloseTracker {
    fn close(&self) -> Result<(), BackendFailure> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        match &self.failure {
            Some(failure) => Err(failure.clone()),
            None => Ok(()),
        }
    }

    fn count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

// ===== Connector =====

/// Hands out pre-built in-memory connections.
#[derive(Default)]
pub struct MemoryConnector {
    connections: HashMap<BackendId, Connection>,
    failures: Mutex<HashMap<BackendId, BackendFailure>>,
    attempts: Mutex<HashMap<BackendId, usize>>,
    delay: Duration,
}

impl MemoryConnector {
    /// Create a connector with no backends.
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `connection` for `backend`.
    pub fn with_connection(mut self, backend: BackendId, connection: Connection) -> Self {
        self.connections.insert(backend, connection);
        self
    }

    /// Sleep this long inside every connect call.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Make future connects to `backend` fail.
    pub fn fail(&self, backend: BackendId, failure: BackendFailure) {
        lock(&self.failures).insert(backend, failure);
    }

    /// Undo [`fail`](Self::fail).
    pub fn heal(&self, backend: BackendId) {
        lock(&self.failures).remove(&backend);
    }

    /// How many times a connection to `backend` was attempted.
    pub fn attempts(&self, backend: BackendId) -> usize {
        lock(&self.attempts).get(&backend).copied().unwrap_or(0)
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    async fn connect(&self, config: &BackendConfig) -> Result<Connection, BackendFailure> {
        *lock(&self.attempts).entry(config.id).or_insert(0) += 1;
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if let Some(failure) = lock(&self.failures).get(&config.id) {
            return Err(failure.clone());
        }
        self.connections
            .get(&config.id)
            .cloned()
            .ok_or_else(|| BackendFailure::Unreachable(format!("no in-memory {}", config.id)))
    }
}

// ===== HTTP =====

type Responder = dyn Fn(&ApiRequest) -> Result<ApiBody, BackendFailure> + Send + Sync;

/// An HTTP API that answers from a closure and logs every request.
pub struct RecordingHttp {
    responder: Box<Responder>,
    requests: Mutex<Vec<ApiRequest>>,
    close: CloseTracker,
}

impl RecordingHttp {
    /// Answer every request with `responder`.
    pub fn new(
        responder: impl Fn(&ApiRequest) -> Result<ApiBody, BackendFailure> + Send + Sync + 'static,
    ) -> Self {
        Self {
            responder: Box::new(responder),
            requests: Mutex::new(Vec::new()),
            close: CloseTracker::default(),
        }
    }

    /// Answer every request with the same JSON document.
    pub fn json(value: serde_json::Value) -> Self {
        Self::new(move |_| Ok(ApiBody::Json(value.clone())))
    }

    /// Make close report `failure`.
    pub fn with_close_failure(mut self, failure: BackendFailure) -> Self {
        self.close.failure = Some(failure);
        self
    }

    /// Every request received so far.
    pub fn requests(&self) -> Vec<ApiRequest> {
        lock(&self.requests).clone()
    }

    /// How many close calls were made.
    pub fn close_count(&self) -> usize {
        self.close.count()
    }
}

#[async_trait]
impl HttpApi for RecordingHttp {
    async fn send(&self, request: ApiRequest) -> Result<ApiBody, BackendFailure> {
        let response = (self.responder)(&request);
        lock(&self.requests).push(request);
        response
    }

    async fn close(&self) -> Result<(), BackendFailure> {
        self.close.close()
    }
}

// ===== Relational =====

type SqlResponder = dyn Fn(&SqlQuery) -> Result<RowSet, BackendFailure> + Send + Sync;

/// A relational store that answers from a closure and logs every query.
pub struct MemorySql {
    responder: Box<SqlResponder>,
    queries: Mutex<Vec<SqlQuery>>,
    close: CloseTracker,
}

impl MemorySql {
    /// Answer every query with `responder`.
    pub fn new(
        responder: impl Fn(&SqlQuery) -> Result<RowSet, BackendFailure> + Send + Sync + 'static,
    ) -> Self {
        Self {
            responder: Box::new(responder),
            queries: Mutex::new(Vec::new()),
            close: CloseTracker::default(),
        }
    }

    /// Answer every query with the same rows.
    pub fn rows(rows: RowSet) -> Self {
        Self::new(move |_| Ok(rows.clone()))
    }

    /// Every query received so far.
    pub fn queries(&self) -> Vec<SqlQuery> {
        lock(&self.queries).clone()
    }

    /// How many close calls were made.
    pub fn close_count(&self) -> usize {
        self.close.count()
    }
}

#[async_trait]
impl SqlStore for MemorySql {
    async fn fetch(&self, query: SqlQuery) -> Result<RowSet, BackendFailure> {
        let response = (self.responder)(&query);
        lock(&self.queries).push(query);
        response
    }

    async fn close(&self) -> Result<(), BackendFailure> {
        self.close.close()
    }
}

// ===== Key-value =====

/// A key-value store backed by a map. Expiry is recorded but not enforced.
#[derive(Default)]
pub struct MemoryKv {
    entries: Mutex<BTreeMap<String, (Vec<u8>, Option<u64>)>>,
    calls: AtomicUsize,
    close: CloseTracker,
}

impl MemoryKv {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-populate one key.
    pub fn with_entry(self, key: impl Into<String>, value: impl Into<Vec<u8>>) -> Self {
        lock(&self.entries).insert(key.into(), (value.into(), None));
        self
    }

    /// Make close report `failure`.
    pub fn with_close_failure(mut self, failure: BackendFailure) -> Self {
        self.close.failure = Some(failure);
        self
    }

    /// Expiry recorded for `key`, in seconds.
    pub fn ttl(&self, key: &str) -> Option<u64> {
        lock(&self.entries).get(key).and_then(|(_, ttl)| *ttl)
    }

    /// How many commands were received.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// How many close calls were made.
    pub fn close_count(&self) -> usize {
        self.close.count()
    }

    fn record(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl KvStore for MemoryKv {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, BackendFailure> {
        self.record();
        Ok(lock(&self.entries).get(key).map(|(value, _)| value.clone()))
    }

    async fn set(
        &self,
        key: &str,
        value: &str,
        ttl_secs: Option<u64>,
    ) -> Result<(), BackendFailure> {
        self.record();
        lock(&self.entries).insert(key.to_string(), (value.as_bytes().to_vec(), ttl_secs));
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<u64, BackendFailure> {
        self.record();
        Ok(u64::from(lock(&self.entries).remove(key).is_some()))
    }

    async fn keys(&self, pattern: &str) -> Result<Vec<String>, BackendFailure> {
        self.record();
        Ok(lock(&self.entries)
            .keys()
            .filter(|key| glob_match(pattern, key))
            .cloned()
            .collect())
    }

    async fn close(&self) -> Result<(), BackendFailure> {
        self.close.close()
    }
}

/// Match `*` and `?` wildcards the way Redis `KEYS` does.
fn glob_match(pattern: &str, text: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let text: Vec<char> = text.chars().collect();
    let (mut p, mut t) = (0, 0);
    let mut backtrack: Option<(usize, usize)> = None;

    while t < text.len() {
        match pattern.get(p) {
            Some('*') => {
                backtrack = Some((p, t));
                p += 1;
            }
            Some(&c) if c == '?' || c == text[t] => {
                p += 1;
                t += 1;
            }
            _ => match backtrack {
                Some((star, matched)) => {
                    p = star + 1;
                    t = matched + 1;
                    backtrack = Some((star, matched + 1));
                }
                None => return false,
            },
        }
    }
    pattern[p..].iter().all(|c| *c == '*')
}

// ===== Broker =====

#[derive(Debug, Clone)]
struct StoredRecord {
    key: Option<Vec<u8>>,
    value: Option<Vec<u8>>,
    timestamp_ms: i64,
}

/// A broker holding topics as per-partition vectors.
#[derive(Default)]
pub struct MemoryBroker {
    topics: Mutex<BTreeMap<String, Vec<Vec<StoredRecord>>>>,
    arrivals: Notify,
    round_robin: AtomicUsize,
    close: CloseTracker,
}

impl MemoryBroker {
    /// Create a broker with no topics.
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-create a topic.
    pub fn with_topic(self, name: impl Into<String>, partitions: usize) -> Self {
        lock(&self.topics).insert(name.into(), vec![Vec::new(); partitions.max(1)]);
        self
    }

    /// Append a raw record to one partition.
    pub fn push_raw(&self, topic: &str, partition: usize, key: Option<Vec<u8>>, value: Vec<u8>) {
        if let Some(records) = lock(&self.topics)
            .get_mut(topic)
            .and_then(|partitions| partitions.get_mut(partition))
        {
            records.push(StoredRecord {
                key,
                value: Some(value),
                timestamp_ms: chrono::Utc::now().timestamp_millis(),
            });
        }
        self.arrivals.notify_waiters();
    }

    /// How many close calls were made.
    pub fn close_count(&self) -> usize {
        self.close.count()
    }

    fn unknown(topic: &str) -> BackendFailure {
        BackendFailure::rejected(format!("unknown topic '{topic}'"))
    }

    fn collect(&self, topic: &str, max_records: usize) -> Result<Vec<BrokerMessage>, BackendFailure> {
        let topics = lock(&self.topics);
        let partitions = topics.get(topic).ok_or_else(|| Self::unknown(topic))?;
        let mut messages = Vec::new();
        for (partition, records) in partitions.iter().enumerate() {
            for (offset, record) in records.iter().enumerate() {
                if messages.len() >= max_records {
                    return Ok(messages);
                }
                messages.push(BrokerMessage {
                    topic: topic.to_string(),
                    partition: partition as i32,
                    offset: offset as i64,
                    key: record.key.clone(),
                    value: record.value.clone(),
                    timestamp_ms: record.timestamp_ms,
                });
            }
        }
        Ok(messages)
    }
}

#[async_trait]
impl MessageBroker for MemoryBroker {
    async fn list_topics(&self) -> Result<Vec<String>, BackendFailure> {
        Ok(lock(&self.topics).keys().cloned().collect())
    }

    async fn describe_topic(&self, topic: &str) -> Result<TopicDescription, BackendFailure> {
        let topics = lock(&self.topics);
        let partitions = topics.get(topic).ok_or_else(|| Self::unknown(topic))?;
        Ok(TopicDescription {
            topic: topic.to_string(),
            partitions: partitions
                .iter()
                .enumerate()
                .map(|(partition, records)| PartitionOffsets {
                    partition: partition as i32,
                    earliest: 0,
                    latest: records.len() as i64,
                })
                .collect(),
        })
    }

    async fn create_topic(
        &self,
        name: &str,
        num_partitions: i32,
        _replication_factor: i16,
    ) -> Result<(), BackendFailure> {
        let mut topics = lock(&self.topics);
        if topics.contains_key(name) {
            return Err(BackendFailure::rejected(format!("topic '{name}' already exists")));
        }
        let count = usize::try_from(num_partitions).unwrap_or(1).max(1);
        topics.insert(name.to_string(), vec![Vec::new(); count]);
        Ok(())
    }

    async fn produce(
        &self,
        topic: &str,
        key: Option<&str>,
        value: &str,
    ) -> Result<ProducedRecord, BackendFailure> {
        let produced = {
            let mut topics = lock(&self.topics);
            let partitions = topics.get_mut(topic).ok_or_else(|| Self::unknown(topic))?;
            let partition = select_partition(
                key,
                partitions.len(),
                self.round_robin.fetch_add(1, Ordering::Relaxed),
            );
            let records = partitions
                .get_mut(partition as usize)
                .ok_or_else(|| BackendFailure::protocol("partition out of range"))?;
            records.push(StoredRecord {
                key: key.map(|k| k.as_bytes().to_vec()),
                value: Some(value.as_bytes().to_vec()),
                timestamp_ms: chrono::Utc::now().timestamp_millis(),
            });
            ProducedRecord {
                topic: topic.to_string(),
                partition,
                offset: records.len() as i64 - 1,
            }
        };
        self.arrivals.notify_waiters();
        Ok(produced)
    }

    async fn consume(
        &self,
        topic: &str,
        max_records: usize,
        timeout: Duration,
    ) -> Result<Vec<BrokerMessage>, BackendFailure> {
        let deadline = Instant::now() + timeout;
        loop {
            let arrived = self.arrivals.notified();
            let messages = self.collect(topic, max_records)?;
            if messages.len() >= max_records {
                return Ok(messages);
            }
            if tokio::time::timeout_at(deadline, arrived).await.is_err() {
                return Ok(messages);
            }
        }
    }

    async fn close(&self) -> Result<(), BackendFailure> {
        self.close.close()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_glob_match() {
        assert!(glob_match("*", "anything"));
        assert!(glob_match("user:*", "user:42"));
        assert!(glob_match("user:?", "user:4"));
        assert!(!glob_match("user:?", "user:42"));
        assert!(glob_match("*:42", "user:42"));
        assert!(!glob_match("session:*", "user:42"));
        assert!(glob_match("a*b*c", "axxbyyc"));
    }

    #[test]
    fn test_keys_filters_by_pattern() {
        let kv = MemoryKv::new()
            .with_entry("user:1", "a")
            .with_entry("user:2", "b")
            .with_entry("session:1", "c");
        let keys = tokio_test::block_on(kv.keys("user:*")).unwrap();
        assert_eq!(keys, vec!["user:1", "user:2"]);
        assert_eq!(kv.calls(), 1);
    }

    #[tokio::test]
    async fn test_consume_returns_available_records_at_deadline() {
        let broker = MemoryBroker::new().with_topic("events", 1);
        for n in 0..3 {
            broker.produce("events", None, &format!("m{n}")).await.unwrap();
        }

        let started = Instant::now();
        let messages = broker
            .consume("events", 5, Duration::from_millis(50))
            .await
            .unwrap();
        assert_eq!(messages.len(), 3);
        assert!(started.elapsed() >= Duration::from_millis(50));
        let offsets: Vec<i64> = messages.iter().map(|m| m.offset).collect();
        assert_eq!(offsets, vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn test_connector_counts_attempts() {
        let connector = MemoryConnector::new()
            .with_connection(BackendId::Redis, Connection::KeyValue(Arc::new(MemoryKv::new())));
        let config = BackendConfig::new(BackendId::Redis, "redis://memory");
        assert!(connector.connect(&config).await.is_ok());

        let missing = BackendConfig::new(BackendId::Kafka, "memory:9092");
        assert!(matches!(
            connector.connect(&missing).await,
            Err(BackendFailure::Unreachable(_))
        ));
        assert_eq!(connector.attempts(BackendId::Redis), 1);
        assert_eq!(connector.attempts(BackendId::Kafka), 1);
    }
}
