use std::{
    collections::VecDeque,
    sync::{
        atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering},
        Arc,
    },
};

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::{mapref::entry::Entry, DashMap};
use parking_lot::RwLock;
use tokio::sync::{oneshot, Notify};
use xxhash_rust::xxh64::xxh64;

use super::{
    intern_topic, BrokerConnection, BrokerSubscription, DeliveryReceipt, InboundRecord, Offset,
    OutboundRecord, Partition, RecordMetadata, RecordStream, SubscriptionHandle,
};
use crate::{ConnectionError, DeliveryError, StreamError};

type GroupKey = (String, Arc<str>, Partition);

/// Внутрипроцессный партиционированный журнал сообщений.
///
/// Полноценная реализация [`BrokerConnection`]:
/// - топики создаются автоматически при первом обращении
/// - партиция выбирается по xxh64 от ключа (пустой ключ - round-robin)
/// - группа фиксирует смещение записи, когда поток просят о следующей,
///   т.е. после её обработки; неподтверждённая запись придёт снова
/// - `truncate` имитирует удаление старых записей по retention
/// - статистика публикаций и ошибок отправки
#[derive(Clone)]
pub struct InMemoryBroker {
    state: Arc<BrokerState>,
}

struct BrokerState {
    topics: DashMap<Arc<str>, Arc<TopicLog>>,
    /// Следующее смещение для (группа, топик, партиция).
    committed: DashMap<GroupKey, Offset>,
    streams: DashMap<u64, Arc<StreamControl>>,
    next_handle: AtomicU64,
    default_partitions: usize,
    /// 0 - без ограничения.
    max_message_bytes: AtomicUsize,
    closed: AtomicBool,
    publish_count: AtomicUsize,
    send_error_count: AtomicUsize,
}

struct TopicLog {
    name: Arc<str>,
    partitions: Vec<RwLock<PartitionLog>>,
    /// Будит потоки подписок при записи, отмене и закрытии.
    notify: Notify,
    round_robin: AtomicUsize,
}

#[derive(Default)]
struct PartitionLog {
    /// Смещение первой хранимой записи.
    start: Offset,
    records: VecDeque<Bytes>,
}

struct StreamControl {
    cancelled: AtomicBool,
    topic: Arc<TopicLog>,
}

struct LogStream {
    id: u64,
    state: Arc<BrokerState>,
    topic: Arc<TopicLog>,
    control: Arc<StreamControl>,
    /// (партиция, следующее смещение)
    cursors: Vec<(Partition, Offset)>,
    group: Option<String>,
    /// Выданная, но ещё не подтверждённая запись группы.
    pending: Option<(Partition, Offset)>,
    next_idx: usize,
    finished: bool,
}

impl PartitionLog {
    fn end(&self) -> Offset {
        self.start + self.records.len() as Offset
    }

    fn get(
        &self,
        offset: Offset,
    ) -> Option<Bytes> {
        if offset < self.start {
            return None;
        }
        self.records.get((offset - self.start) as usize).cloned()
    }
}

impl TopicLog {
    fn new(
        name: Arc<str>,
        partitions: usize,
    ) -> Self {
        Self {
            name,
            partitions: (0..partitions.max(1))
                .map(|_| RwLock::new(PartitionLog::default()))
                .collect(),
            notify: Notify::new(),
            round_robin: AtomicUsize::new(0),
        }
    }

    fn partition(
        &self,
        partition: Partition,
    ) -> Option<&RwLock<PartitionLog>> {
        usize::try_from(partition)
            .ok()
            .and_then(|p| self.partitions.get(p))
    }
}

impl InMemoryBroker {
    /// Создаёт брокер; новые топики получают `default_partitions` партиций.
    pub fn new(default_partitions: usize) -> Self {
        Self {
            state: Arc::new(BrokerState {
                topics: DashMap::new(),
                committed: DashMap::new(),
                streams: DashMap::new(),
                next_handle: AtomicU64::new(1),
                default_partitions: default_partitions.max(1),
                max_message_bytes: AtomicUsize::new(0),
                closed: AtomicBool::new(false),
                publish_count: AtomicUsize::new(0),
                send_error_count: AtomicUsize::new(0),
            }),
        }
    }

    /// Ограничивает размер полезной нагрузки; большие сообщения отклоняются.
    pub fn set_max_message_bytes(
        &self,
        max: usize,
    ) {
        self.state.max_message_bytes.store(max, Ordering::Relaxed);
    }

    /// Явно создаёт топик с заданным числом партиций.
    ///
    /// Возвращает `false`, если топик уже существует.
    pub fn create_topic(
        &self,
        topic: &str,
        partitions: usize,
    ) -> bool {
        let name = intern_topic(topic);
        match self.state.topics.entry(name.clone()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(Arc::new(TopicLog::new(name, partitions)));
                true
            }
        }
    }

    pub fn partition_count(
        &self,
        topic: &str,
    ) -> Option<usize> {
        self.state.topics.get(topic).map(|t| t.partitions.len())
    }

    /// Смещение, которое получит следующая запись в партицию.
    pub fn end_offset(
        &self,
        topic: &str,
        partition: Partition,
    ) -> Option<Offset> {
        let log = self.state.topics.get(topic)?.clone();
        let end = log.partition(partition)?.read().end();
        Some(end)
    }

    /// Смещение первой хранимой записи партиции.
    pub fn start_offset(
        &self,
        topic: &str,
        partition: Partition,
    ) -> Option<Offset> {
        let log = self.state.topics.get(topic)?.clone();
        let start = log.partition(partition)?.read().start;
        Some(start)
    }

    pub fn committed_offset(
        &self,
        group: &str,
        topic: &str,
        partition: Partition,
    ) -> Option<Offset> {
        let key = (group.to_string(), intern_topic(topic), partition);
        self.state.committed.get(&key).map(|o| *o)
    }

    /// Удаляет записи партиции со смещением меньше `before`.
    ///
    /// Возвращает число удалённых записей.
    pub fn truncate(
        &self,
        topic: &str,
        partition: Partition,
        before: Offset,
    ) -> usize {
        let Some(log) = self.state.topics.get(topic).map(|t| t.clone()) else {
            return 0;
        };
        let Some(part) = log.partition(partition) else {
            return 0;
        };

        let mut removed = 0;
        {
            let mut part = part.write();
            while part.start < before && part.records.pop_front().is_some() {
                part.start += 1;
                removed += 1;
            }
        }
        log.notify.notify_waiters();
        tracing::debug!(topic, partition, before, removed, "partition truncated");
        removed
    }

    pub fn publish_count(&self) -> usize {
        self.state.publish_count.load(Ordering::Relaxed)
    }

    pub fn send_error_count(&self) -> usize {
        self.state.send_error_count.load(Ordering::Relaxed)
    }

    /// Количество открытых потоков подписок.
    pub fn active_streams(&self) -> usize {
        self.state.streams.len()
    }

    fn topic(
        &self,
        topic: &str,
    ) -> Arc<TopicLog> {
        if let Some(log) = self.state.topics.get(topic) {
            return log.clone();
        }
        let name = intern_topic(topic);
        self.state
            .topics
            .entry(name.clone())
            .or_insert_with(|| Arc::new(TopicLog::new(name, self.state.default_partitions)))
            .clone()
    }

    fn pick_partition(
        log: &TopicLog,
        key: &str,
    ) -> Partition {
        let n = log.partitions.len();
        let idx = if key.is_empty() {
            log.round_robin.fetch_add(1, Ordering::Relaxed) % n
        } else {
            (xxh64(key.as_bytes(), 0) % n as u64) as usize
        };
        idx as Partition
    }

    fn append(
        &self,
        record: OutboundRecord,
    ) -> Result<RecordMetadata, DeliveryError> {
        let result = self.try_append(record);
        if result.is_err() {
            self.state.send_error_count.fetch_add(1, Ordering::Relaxed);
        }
        result
    }

    fn try_append(
        &self,
        record: OutboundRecord,
    ) -> Result<RecordMetadata, DeliveryError> {
        if self.state.closed.load(Ordering::Acquire) {
            return Err(DeliveryError::Closed);
        }

        let max = self.state.max_message_bytes.load(Ordering::Relaxed);
        if max > 0 && record.payload.len() > max {
            return Err(DeliveryError::Rejected {
                topic: record.topic.to_string(),
                reason: format!(
                    "message of {} bytes exceeds limit of {max}",
                    record.payload.len()
                ),
            });
        }

        let log = self.topic(&record.topic);
        let partition = match record.partition {
            Some(p) => p,
            None => Self::pick_partition(&log, &record.key),
        };
        let Some(part) = log.partition(partition) else {
            return Err(DeliveryError::UnknownPartition {
                topic: record.topic.to_string(),
                partition,
                partitions: log.partitions.len(),
            });
        };

        let offset = {
            let mut part = part.write();
            let offset = part.end();
            part.records.push_back(record.payload);
            offset
        };

        log.notify.notify_waiters();
        self.state.publish_count.fetch_add(1, Ordering::Relaxed);

        Ok(RecordMetadata {
            topic: log.name.clone(),
            partition,
            offset,
        })
    }

    fn open_stream(
        &self,
        topic: Arc<TopicLog>,
        cursors: Vec<(Partition, Offset)>,
        group: Option<String>,
    ) -> BrokerSubscription {
        let id = self.state.next_handle.fetch_add(1, Ordering::Relaxed);
        let control = Arc::new(StreamControl {
            cancelled: AtomicBool::new(false),
            topic: topic.clone(),
        });
        self.state.streams.insert(id, control.clone());

        BrokerSubscription {
            handle: SubscriptionHandle(id),
            stream: Box::new(LogStream {
                id,
                state: self.state.clone(),
                topic,
                control,
                cursors,
                group,
                pending: None,
                next_idx: 0,
                finished: false,
            }),
        }
    }
}

#[async_trait]
impl BrokerConnection for InMemoryBroker {
    async fn send(
        &self,
        record: OutboundRecord,
    ) -> Result<RecordMetadata, DeliveryError> {
        self.append(record)
    }

    fn send_nowait(
        &self,
        record: OutboundRecord,
    ) -> DeliveryReceipt {
        let (tx, rx) = oneshot::channel();
        let _ = tx.send(self.append(record));
        rx
    }

    fn subscribe(
        &self,
        group: &str,
        topic: &str,
    ) -> Result<BrokerSubscription, ConnectionError> {
        if self.state.closed.load(Ordering::Acquire) {
            return Err(ConnectionError::Closed);
        }

        let log = self.topic(topic);
        // Новая группа начинает с конца журнала и сразу фиксирует эту точку,
        // известная - с сохранённого смещения.
        let cursors = log
            .partitions
            .iter()
            .enumerate()
            .map(|(idx, part)| {
                let partition = idx as Partition;
                let key = (group.to_string(), log.name.clone(), partition);
                let start = *self
                    .state
                    .committed
                    .entry(key)
                    .or_insert_with(|| part.read().end());
                (partition, start)
            })
            .collect();

        Ok(self.open_stream(log, cursors, Some(group.to_string())))
    }

    fn subscribe_partition(
        &self,
        topic: &str,
        partition: Partition,
        offset: Offset,
    ) -> Result<BrokerSubscription, ConnectionError> {
        if self.state.closed.load(Ordering::Acquire) {
            return Err(ConnectionError::Closed);
        }

        let log = self.topic(topic);
        let Some(part) = log.partition(partition) else {
            return Err(ConnectionError::UnknownPartition {
                topic: topic.to_string(),
                partition,
                partitions: log.partitions.len(),
            });
        };
        if offset < part.read().start {
            return Err(ConnectionError::OffsetOutOfRange {
                topic: topic.to_string(),
                partition,
                offset,
            });
        }

        Ok(self.open_stream(log, vec![(partition, offset)], None))
    }

    fn unsubscribe(
        &self,
        handle: SubscriptionHandle,
    ) {
        if let Some((_, control)) = self.state.streams.remove(&handle.0) {
            control.cancelled.store(true, Ordering::Release);
            control.topic.notify.notify_waiters();
        }
    }

    fn is_healthy(&self) -> bool {
        !self.state.closed.load(Ordering::Acquire)
    }

    fn close(&self) {
        self.state.closed.store(true, Ordering::Release);
        for topic in self.state.topics.iter() {
            topic.notify.notify_waiters();
        }
    }
}

impl LogStream {
    fn poll_once(&mut self) -> Option<Result<InboundRecord, StreamError>> {
        let n = self.cursors.len();
        for i in 0..n {
            let idx = (self.next_idx + i) % n;
            let (partition, cursor) = self.cursors[idx];
            let part = self.topic.partition(partition)?;

            let (start, payload) = {
                let part = part.read();
                (part.start, part.get(cursor))
            };

            if cursor < start {
                self.finished = true;
                return Some(Err(StreamError::DataLoss {
                    topic: self.topic.name.to_string(),
                    partition,
                    expected: cursor,
                    found: start,
                }));
            }

            if let Some(payload) = payload {
                self.cursors[idx].1 = cursor + 1;
                self.next_idx = idx + 1;
                if self.group.is_some() {
                    self.pending = Some((partition, cursor + 1));
                }
                return Some(Ok(InboundRecord {
                    partition,
                    offset: cursor,
                    payload,
                }));
            }
        }
        None
    }

    fn commit_pending(&mut self) {
        if let (Some(group), Some((partition, next))) = (&self.group, self.pending.take()) {
            self.state
                .committed
                .insert((group.clone(), self.topic.name.clone(), partition), next);
        }
    }
}

#[async_trait]
impl RecordStream for LogStream {
    async fn next(&mut self) -> Option<Result<InboundRecord, StreamError>> {
        // Запрос следующей записи подтверждает предыдущую.
        self.commit_pending();
        if self.finished {
            return None;
        }

        let topic = self.topic.clone();
        loop {
            // Регистрируемся до проверки, чтобы не потерять пробуждение.
            let notified = topic.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.control.cancelled.load(Ordering::Acquire) {
                self.finished = true;
                return None;
            }
            if self.state.closed.load(Ordering::Acquire) {
                self.finished = true;
                return Some(Err(StreamError::Closed));
            }
            if let Some(item) = self.poll_once() {
                return Some(item);
            }

            notified.await;
        }
    }
}

impl Drop for LogStream {
    fn drop(&mut self) {
        self.state.streams.remove(&self.id);
    }
}
