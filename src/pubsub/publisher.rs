//! Издатели: синхронный (ожидает подтверждения брокера) и асинхронный
//! (результат приходит в callback).

use std::{sync::Arc, time::Duration};

use tokio::{
    runtime::Handle,
    sync::mpsc,
    time::{timeout, timeout_at, Instant},
};
use tracing::Instrument;

use super::{
    handler::guarded, BrokerConnection, Codec, DeliveryReceipt, Message, MessageError,
    OutboundRecord, Partition, RecordMetadata,
};
use crate::{DeliveryError, PublishError};

/// Callback успешной асинхронной публикации.
pub type SuccessCallback<V> = Arc<dyn Fn(Message<V>) + Send + Sync>;
/// Callback неудачной асинхронной публикации.
pub type ErrorCallback<V> = Arc<dyn Fn(MessageError<V>) + Send + Sync>;

/// Модель доставки издателя.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryMode {
    Sync,
    Async,
}

/// Издатель, привязанный к топику и, возможно, к партиции.
///
/// Дешёвый: клонирование разделяет соединение и кодек.
pub enum Publisher<C: Codec> {
    Sync(SyncPublisher<C>),
    SyncToPartition(SyncPublisher<C>),
    Async(AsyncPublisher<C>),
    AsyncToPartition(AsyncPublisher<C>),
}

impl<C: Codec> Publisher<C> {
    /// Публикует сообщение.
    ///
    /// Синхронный вариант возвращает подтверждённое сообщение, асинхронный
    /// возвращает `Ok(None)` сразу после постановки в очередь.
    pub async fn publish(
        &self,
        key: impl Into<String>,
        value: C::Value,
    ) -> Result<Option<Message<C::Value>>, PublishError> {
        match self {
            Self::Sync(p) | Self::SyncToPartition(p) => p.send(key, value).await.map(Some),
            Self::Async(p) | Self::AsyncToPartition(p) => {
                p.publish(key, value);
                Ok(None)
            }
        }
    }

    pub fn topic(&self) -> &str {
        match self {
            Self::Sync(p) | Self::SyncToPartition(p) => p.topic(),
            Self::Async(p) | Self::AsyncToPartition(p) => p.topic(),
        }
    }

    /// Закреплённая партиция; `None` - партицию выбирает брокер.
    pub fn partition(&self) -> Option<Partition> {
        match self {
            Self::Sync(p) | Self::SyncToPartition(p) => p.partition(),
            Self::Async(p) | Self::AsyncToPartition(p) => p.partition(),
        }
    }

    pub fn mode(&self) -> DeliveryMode {
        match self {
            Self::Sync(_) | Self::SyncToPartition(_) => DeliveryMode::Sync,
            Self::Async(_) | Self::AsyncToPartition(_) => DeliveryMode::Async,
        }
    }

    pub fn as_sync(&self) -> Option<&SyncPublisher<C>> {
        match self {
            Self::Sync(p) | Self::SyncToPartition(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_async(&self) -> Option<&AsyncPublisher<C>> {
        match self {
            Self::Async(p) | Self::AsyncToPartition(p) => Some(p),
            _ => None,
        }
    }
}

impl<C: Codec> Clone for Publisher<C> {
    fn clone(&self) -> Self {
        match self {
            Self::Sync(p) => Self::Sync(p.clone()),
            Self::SyncToPartition(p) => Self::SyncToPartition(p.clone()),
            Self::Async(p) => Self::Async(p.clone()),
            Self::AsyncToPartition(p) => Self::AsyncToPartition(p.clone()),
        }
    }
}

impl<C: Codec> std::fmt::Debug for Publisher<C> {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("Publisher")
            .field("topic", &self.topic())
            .field("partition", &self.partition())
            .field("mode", &self.mode())
            .finish()
    }
}

/// Синхронный издатель: каждая публикация ждёт подтверждения брокера.
pub struct SyncPublisher<C: Codec> {
    connection: Arc<dyn BrokerConnection>,
    codec: Arc<C>,
    topic: Arc<str>,
    partition: Option<Partition>,
    send_timeout: Duration,
}

impl<C: Codec> SyncPublisher<C> {
    pub(crate) fn new(
        connection: Arc<dyn BrokerConnection>,
        codec: Arc<C>,
        topic: Arc<str>,
        partition: Option<Partition>,
        send_timeout: Duration,
    ) -> Self {
        Self {
            connection,
            codec,
            topic,
            partition,
            send_timeout,
        }
    }

    /// Кодирует и отправляет сообщение, дожидаясь подтверждения.
    ///
    /// Ошибка сериализации возвращается до обращения к брокеру.
    pub async fn send(
        &self,
        key: impl Into<String>,
        value: C::Value,
    ) -> Result<Message<C::Value>, PublishError> {
        let key = key.into();
        let payload = self.codec.encode(&key, &value)?;
        let record = OutboundRecord {
            topic: self.topic.clone(),
            partition: self.partition,
            key: key.clone(),
            payload,
        };

        let meta = timeout(self.send_timeout, self.connection.send(record))
            .await
            .map_err(|_| DeliveryError::Timeout(self.send_timeout))??;

        Ok(Message::new(key, value, meta.topic, meta.partition, meta.offset))
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn partition(&self) -> Option<Partition> {
        self.partition
    }
}

impl<C: Codec> Clone for SyncPublisher<C> {
    fn clone(&self) -> Self {
        Self {
            connection: self.connection.clone(),
            codec: self.codec.clone(),
            topic: self.topic.clone(),
            partition: self.partition,
            send_timeout: self.send_timeout,
        }
    }
}

/// Сообщение, ожидающее результата доставки.
struct Pending<V> {
    key: String,
    value: V,
    outcome: Outcome,
    deadline: Instant,
}

enum Outcome {
    InFlight(DeliveryReceipt),
    Failed(PublishError),
}

/// Асинхронный издатель.
///
/// `publish` возвращается сразу; результат каждой публикации ровно один раз
/// приходит в `on_success` или `on_error`, в порядке отправки. Callbacks
/// выполняются в отдельной задаче и продолжают приходить после удаления
/// издателя, пока очередь не опустеет.
pub struct AsyncPublisher<C: Codec> {
    connection: Arc<dyn BrokerConnection>,
    codec: Arc<C>,
    topic: Arc<str>,
    partition: Option<Partition>,
    send_timeout: Duration,
    queue: mpsc::UnboundedSender<Pending<C::Value>>,
}

impl<C: Codec> AsyncPublisher<C> {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        connection: Arc<dyn BrokerConnection>,
        codec: Arc<C>,
        topic: Arc<str>,
        partition: Option<Partition>,
        send_timeout: Duration,
        on_success: SuccessCallback<C::Value>,
        on_error: ErrorCallback<C::Value>,
        runtime: &Handle,
    ) -> Self {
        let (queue, rx) = mpsc::unbounded_channel();
        let completions = Completions {
            topic: topic.clone(),
            partition,
            send_timeout,
            on_success,
            on_error,
        };
        let span = tracing::debug_span!("async_publisher", topic = %topic, partition = ?partition);
        runtime.spawn(completions.run(rx).instrument(span));

        Self {
            connection,
            codec,
            topic,
            partition,
            send_timeout,
            queue,
        }
    }

    /// Ставит сообщение в очередь отправки и сразу возвращается.
    pub fn publish(
        &self,
        key: impl Into<String>,
        value: C::Value,
    ) {
        let key = key.into();
        let deadline = Instant::now() + self.send_timeout;
        let outcome = match self.codec.encode(&key, &value) {
            Ok(payload) => Outcome::InFlight(self.connection.send_nowait(OutboundRecord {
                topic: self.topic.clone(),
                partition: self.partition,
                key: key.clone(),
                payload,
            })),
            Err(e) => Outcome::Failed(e.into()),
        };

        let pending = Pending {
            key,
            value,
            outcome,
            deadline,
        };
        if let Err(mpsc::error::SendError(pending)) = self.queue.send(pending) {
            // Задача завершения пропала только вместе с рантаймом.
            tracing::warn!(
                topic = %self.topic,
                key = %pending.key,
                "completion queue is closed, outcome dropped"
            );
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn partition(&self) -> Option<Partition> {
        self.partition
    }
}

impl<C: Codec> Clone for AsyncPublisher<C> {
    fn clone(&self) -> Self {
        Self {
            connection: self.connection.clone(),
            codec: self.codec.clone(),
            topic: self.topic.clone(),
            partition: self.partition,
            send_timeout: self.send_timeout,
            queue: self.queue.clone(),
        }
    }
}

/// Упорядоченная очередь завершений одного асинхронного издателя.
struct Completions<V> {
    topic: Arc<str>,
    partition: Option<Partition>,
    send_timeout: Duration,
    on_success: SuccessCallback<V>,
    on_error: ErrorCallback<V>,
}

impl<V: Send + 'static> Completions<V> {
    async fn run(
        self,
        mut rx: mpsc::UnboundedReceiver<Pending<V>>,
    ) {
        while let Some(pending) = rx.recv().await {
            let Pending {
                key,
                value,
                outcome,
                deadline,
            } = pending;

            match Self::resolve(outcome, deadline, self.send_timeout).await {
                Ok(meta) => {
                    let message = Message::new(key, value, meta.topic, meta.partition, meta.offset);
                    guarded("on_success", || (self.on_success)(message));
                }
                Err(cause) => {
                    tracing::debug!(%cause, key = %key, "async publish failed");
                    let error = MessageError {
                        key,
                        value,
                        topic: self.topic.clone(),
                        partition: self.partition,
                        cause,
                    };
                    guarded("on_error", || (self.on_error)(error));
                }
            }
        }
        tracing::trace!("completion queue drained");
    }

    async fn resolve(
        outcome: Outcome,
        deadline: Instant,
        send_timeout: Duration,
    ) -> Result<RecordMetadata, PublishError> {
        let receipt = match outcome {
            Outcome::InFlight(receipt) => receipt,
            Outcome::Failed(cause) => return Err(cause),
        };

        match timeout_at(deadline, receipt).await {
            Ok(Ok(result)) => result.map_err(PublishError::from),
            // Отправитель квитанции удалён без ответа.
            Ok(Err(_)) => Err(DeliveryError::Closed.into()),
            Err(_) => Err(DeliveryError::Timeout(send_timeout).into()),
        }
    }
}
