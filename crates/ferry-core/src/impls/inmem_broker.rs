//! InMemoryBroker - 開発用・テスト用のメッセージブローカー
//!
//! # 学習ポイント
//! - std Mutex + tokio Notify による async の待ち合わせ（ロックを跨いで await しない）
//! - `Notified::enable()` で「確認してから待つ」間の取りこぼしを防ぐ
//! - Drop によるハンドル解放（close されずに捨てられた場合も数が戻る）
//!
//! # 実装詳細
//! - topic ごとに `Vec<パーティション>`、パーティションは追記のみのログ
//! - consumer group の commit 位置は `(group, topic, partition)` で管理
//! - `set_available(false)` で障害を再現（接続・読み書き・commit が致命的エラーになる）

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use tokio::sync::Notify;
use tracing::{debug, info};

use crate::config::{ReaderConfig, WriterConfig};
use crate::domain::{ConnectError, Header, OutgoingMessage, QueueError, QueueMessage};
use crate::impls::balancer::balancer_for;
use crate::ports::{Balancer, Broker, MessageReader, MessageWriter};

#[derive(Debug, Clone)]
struct StoredRecord {
    key: Vec<u8>,
    value: Vec<u8>,
    headers: Vec<Header>,
}

#[derive(Debug)]
struct BrokerState {
    available: bool,
    topics: HashMap<String, Vec<Vec<StoredRecord>>>,
    /// (group, topic, partition) -> next offset to read
    committed: HashMap<(String, String, u32), u64>,
    open_readers: usize,
    open_writers: usize,
}

impl BrokerState {
    fn partition(&self, topic: &str, partition: u32) -> Option<&Vec<StoredRecord>> {
        self.topics.get(topic)?.get(partition as usize)
    }
}

/// Number of reader and writer handles that are still open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OpenHandles {
    pub readers: usize,
    pub writers: usize,
}

/// Cloning yields another handle onto the same broker.
#[derive(Clone)]
pub struct InMemoryBroker {
    address: String,
    state: Arc<Mutex<BrokerState>>,
    notify: Arc<Notify>,
}

impl InMemoryBroker {
    /// A broker reachable under `address` only.
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            state: Arc::new(Mutex::new(BrokerState {
                available: true,
                topics: HashMap::new(),
                committed: HashMap::new(),
                open_readers: 0,
                open_writers: 0,
            })),
            notify: Arc::new(Notify::new()),
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    fn lock(&self) -> MutexGuard<'_, BrokerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Create `topic` with `partitions` partitions, or grow an existing one.
    pub fn create_topic(&self, topic: impl Into<String>, partitions: u32) {
        let mut state = self.lock();
        let log = state.topics.entry(topic.into()).or_default();
        while log.len() < partitions as usize {
            log.push(Vec::new());
        }
    }

    /// Append a record and wake waiting readers. Returns its offset.
    pub fn publish(
        &self,
        topic: &str,
        partition: u32,
        key: impl Into<Vec<u8>>,
        value: impl Into<Vec<u8>>,
        headers: Vec<Header>,
    ) -> Result<u64, QueueError> {
        let offset = {
            let mut state = self.lock();
            let log = state
                .topics
                .get_mut(topic)
                .and_then(|t| t.get_mut(partition as usize))
                .ok_or_else(|| QueueError::UnknownPartition {
                    topic: topic.to_string(),
                    partition,
                })?;
            log.push(StoredRecord {
                key: key.into(),
                value: value.into(),
                headers,
            });
            (log.len() - 1) as u64
        };
        self.notify.notify_waiters();
        Ok(offset)
    }

    /// Snapshot of a partition's log.
    pub fn records(&self, topic: &str, partition: u32) -> Vec<QueueMessage> {
        let state = self.lock();
        state
            .partition(topic, partition)
            .map(|log| {
                log.iter()
                    .enumerate()
                    .map(|(offset, r)| to_message(topic, partition, offset as u64, r))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Records across all partitions of `topic`, partition by partition.
    pub fn all_records(&self, topic: &str) -> Vec<QueueMessage> {
        let count = self.lock().topics.get(topic).map_or(0, Vec::len) as u32;
        (0..count).flat_map(|p| self.records(topic, p)).collect()
    }

    pub fn committed_offset(&self, group: &str, topic: &str, partition: u32) -> Option<u64> {
        self.lock()
            .committed
            .get(&(group.to_string(), topic.to_string(), partition))
            .copied()
    }

    /// Simulate an outage (`false`) or recovery (`true`).
    pub fn set_available(&self, available: bool) {
        self.lock().available = available;
        // 待機中の reader を起こして状態を再確認させる
        self.notify.notify_waiters();
    }

    pub fn open_handles(&self) -> OpenHandles {
        let state = self.lock();
        OpenHandles {
            readers: state.open_readers,
            writers: state.open_writers,
        }
    }

    fn reachable_via(&self, brokers: &[String]) -> Result<(), ConnectError> {
        if !brokers.iter().any(|b| *b == self.address) || !self.lock().available {
            return Err(ConnectError::Unreachable(brokers.to_vec()));
        }
        Ok(())
    }
}

fn to_message(topic: &str, partition: u32, offset: u64, record: &StoredRecord) -> QueueMessage {
    QueueMessage::new(
        topic,
        partition,
        offset,
        record.key.clone(),
        record.value.clone(),
        record.headers.clone(),
    )
}

#[async_trait]
impl Broker for InMemoryBroker {
    async fn connect_reader(
        &self,
        config: &ReaderConfig,
    ) -> Result<Box<dyn MessageReader>, ConnectError> {
        config.validate()?;
        self.reachable_via(&config.brokers)?;

        let position = {
            let mut state = self.lock();
            if state.partition(&config.topic, config.partition).is_none() {
                return Err(ConnectError::UnknownTopic {
                    topic: config.topic.clone(),
                    partition: config.partition,
                });
            }
            state.open_readers += 1;
            state
                .committed
                .get(&(
                    config.consumer_group.clone(),
                    config.topic.clone(),
                    config.partition,
                ))
                .copied()
                .unwrap_or(0)
        };

        info!(
            broker = %self.address,
            topic = %config.topic,
            partition = config.partition,
            group = %config.consumer_group,
            position,
            "reader connected"
        );
        Ok(Box::new(InMemoryReader {
            broker: self.clone(),
            topic: config.topic.clone(),
            partition: config.partition,
            group: config.consumer_group.clone(),
            max_batch_bytes: config.max_batch_bytes,
            position,
            closed: false,
        }))
    }

    async fn connect_writer(
        &self,
        config: &WriterConfig,
    ) -> Result<Box<dyn MessageWriter>, ConnectError> {
        config.validate()?;
        self.reachable_via(&config.brokers)?;

        {
            let mut state = self.lock();
            if !state.topics.contains_key(&config.topic) {
                return Err(ConnectError::UnknownTopic {
                    topic: config.topic.clone(),
                    partition: 0,
                });
            }
            state.open_writers += 1;
        }

        info!(broker = %self.address, topic = %config.topic, balancer = ?config.balancer, "writer connected");
        Ok(Box::new(InMemoryWriter {
            broker: self.clone(),
            topic: config.topic.clone(),
            balancer: balancer_for(config.balancer),
            closed: false,
        }))
    }
}

struct InMemoryReader {
    broker: InMemoryBroker,
    topic: String,
    partition: u32,
    group: String,
    max_batch_bytes: usize,
    /// Next offset to hand out in this session.
    position: u64,
    closed: bool,
}

impl InMemoryReader {
    fn release(&mut self) {
        if !self.closed {
            self.closed = true;
            let mut state = self.broker.lock();
            state.open_readers = state.open_readers.saturating_sub(1);
        }
    }

    /// One non-blocking attempt at the next record.
    fn try_next(&mut self) -> Result<Option<QueueMessage>, QueueError> {
        if self.closed {
            return Err(QueueError::Closed);
        }
        let state = self.broker.lock();
        if !state.available {
            return Err(QueueError::Unreachable(self.broker.address.clone()));
        }
        let log = state
            .partition(&self.topic, self.partition)
            .ok_or_else(|| QueueError::UnknownPartition {
                topic: self.topic.clone(),
                partition: self.partition,
            })?;
        let Some(record) = log.get(self.position as usize) else {
            return Ok(None);
        };
        let message = to_message(&self.topic, self.partition, self.position, record);
        if message.size_bytes() > self.max_batch_bytes {
            return Err(QueueError::MessageTooLarge {
                size: message.size_bytes(),
                max: self.max_batch_bytes,
            });
        }
        drop(state);
        self.position += 1;
        Ok(Some(message))
    }
}

#[async_trait]
impl MessageReader for InMemoryReader {
    async fn read_message(&mut self) -> Result<QueueMessage, QueueError> {
        loop {
            let notify = Arc::clone(&self.broker.notify);
            let notified = notify.notified();
            tokio::pin!(notified);
            // 状態確認の前に登録しておく（publish の通知を取りこぼさない）
            notified.as_mut().enable();

            if let Some(message) = self.try_next()? {
                return Ok(message);
            }
            notified.await;
        }
    }

    async fn commit(&mut self, message: &QueueMessage) -> Result<(), QueueError> {
        if self.closed {
            return Err(QueueError::Closed);
        }
        if message.topic() != self.topic || message.partition() != self.partition {
            return Err(QueueError::ForeignCommit {
                message: message.to_string(),
                bound: format!("{}/{}", self.topic, self.partition),
            });
        }
        let mut state = self.broker.lock();
        if !state.available {
            return Err(QueueError::Unreachable(self.broker.address.clone()));
        }
        let next = state
            .committed
            .entry((self.group.clone(), self.topic.clone(), self.partition))
            .or_insert(0);
        *next = (*next).max(message.offset() + 1);
        debug!(group = %self.group, record = %message, committed = *next, "offset committed");
        Ok(())
    }

    async fn close(&mut self) -> Result<(), QueueError> {
        self.release();
        Ok(())
    }
}

impl Drop for InMemoryReader {
    fn drop(&mut self) {
        self.release();
    }
}

struct InMemoryWriter {
    broker: InMemoryBroker,
    topic: String,
    balancer: Box<dyn Balancer>,
    closed: bool,
}

impl InMemoryWriter {
    fn release(&mut self) {
        if !self.closed {
            self.closed = true;
            let mut state = self.broker.lock();
            state.open_writers = state.open_writers.saturating_sub(1);
        }
    }
}

#[async_trait]
impl MessageWriter for InMemoryWriter {
    async fn write_message(&mut self, message: OutgoingMessage) -> Result<(), QueueError> {
        if self.closed {
            return Err(QueueError::Closed);
        }
        {
            let mut state = self.broker.lock();
            if !state.available {
                return Err(QueueError::Unreachable(self.broker.address.clone()));
            }
            let log = state
                .topics
                .get_mut(&self.topic)
                .filter(|t| !t.is_empty())
                .ok_or_else(|| QueueError::UnknownPartition {
                    topic: self.topic.clone(),
                    partition: 0,
                })?;
            let partitions: Vec<u32> = (0..log.len() as u32).collect();
            let chosen = self.balancer.balance(&message, &partitions);
            let OutgoingMessage {
                key,
                value,
                headers,
            } = message;
            log[chosen as usize].push(StoredRecord {
                key,
                value,
                headers,
            });
        }
        self.broker.notify.notify_waiters();
        Ok(())
    }

    async fn close(&mut self) -> Result<(), QueueError> {
        self.release();
        Ok(())
    }
}

impl Drop for InMemoryWriter {
    fn drop(&mut self) {
        self.release();
    }
}
