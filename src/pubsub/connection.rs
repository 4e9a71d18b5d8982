//! Граница соединения с брокером.
//!
//! Мультиплексор разделяет одно соединение между всеми издателями и
//! наблюдателями и обращается к нему только через [`BrokerConnection`].
//! Сетевой протокол, переподключения и политика повторов остаются на
//! стороне реализации трейта.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::oneshot;

use super::{Offset, Partition};
use crate::{ConnectionError, DeliveryError, StreamError};

/// Исходящая запись: то, что издатель отдаёт брокеру.
#[derive(Debug, Clone)]
pub struct OutboundRecord {
    pub topic: Arc<str>,
    /// `None` - партицию выбирает брокер (по ключу).
    pub partition: Option<Partition>,
    /// Ключ используется брокером только для выбора партиции.
    pub key: String,
    pub payload: Bytes,
}

/// Подтверждение брокера о записи сообщения.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordMetadata {
    pub topic: Arc<str>,
    pub partition: Partition,
    pub offset: Offset,
}

/// Входящая запись из потока подписки.
#[derive(Debug, Clone)]
pub struct InboundRecord {
    pub partition: Partition,
    pub offset: Offset,
    pub payload: Bytes,
}

/// Квитанция неблокирующей отправки; разрешается ровно один раз.
pub type DeliveryReceipt = oneshot::Receiver<Result<RecordMetadata, DeliveryError>>;

/// Идентификатор подписки на стороне брокера.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionHandle(pub u64);

/// Поток входящих записей одной подписки.
#[async_trait]
pub trait RecordStream: Send {
    /// Следующая запись.
    ///
    /// `None` означает, что подписка отменена и записей больше не будет.
    async fn next(&mut self) -> Option<Result<InboundRecord, StreamError>>;
}

/// Открытая подписка у брокера.
pub struct BrokerSubscription {
    pub handle: SubscriptionHandle,
    pub stream: Box<dyn RecordStream>,
}

/// Соединение с партиционированным журналом сообщений.
#[async_trait]
pub trait BrokerConnection: Send + Sync + 'static {
    /// Отправка с ожиданием подтверждения брокера.
    async fn send(
        &self,
        record: OutboundRecord,
    ) -> Result<RecordMetadata, DeliveryError>;

    /// Неблокирующая отправка; результат приходит через квитанцию.
    fn send_nowait(
        &self,
        record: OutboundRecord,
    ) -> DeliveryReceipt;

    /// Подписка на топик с назначением партиций брокером.
    fn subscribe(
        &self,
        group: &str,
        topic: &str,
    ) -> Result<BrokerSubscription, ConnectionError>;

    /// Подписка на одну партицию начиная с `offset` включительно.
    fn subscribe_partition(
        &self,
        topic: &str,
        partition: Partition,
        offset: Offset,
    ) -> Result<BrokerSubscription, ConnectionError>;

    /// Отмена подписки. Повторная отмена ничего не делает.
    fn unsubscribe(
        &self,
        handle: SubscriptionHandle,
    );

    fn is_healthy(&self) -> bool {
        true
    }

    /// Закрывает соединение: отправки завершаются ошибкой, потоки
    /// получают [`StreamError::Closed`].
    fn close(&self) {}
}
