use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use tokio::runtime::Handle;

use super::{
    intern_topic, registry::Registry, AsyncPublisher, BrokerConnection, Codec, ErrorCallback,
    Message, MessageError, Partition, Publisher, SuccessCallback, SyncPublisher, Watcher,
};
use crate::{MuxError, MuxResult};

/// Таймаут отправки по умолчанию.
pub const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_secs(10);

/// Мультиплексор: фабрика издателей и наблюдателей над одним соединением с
/// брокером.
///
/// Клонирование дешёвое и разделяет соединение и реестр подписок.
pub struct Mux<C: Codec> {
    inner: Arc<MuxInner<C>>,
}

pub(crate) struct MuxInner<C: Codec> {
    pub connection: Arc<dyn BrokerConnection>,
    pub codec: Arc<C>,
    pub registry: Arc<Registry>,
    pub runtime: Handle,
    pub send_timeout: Duration,
    closed: AtomicBool,
}

impl<C: Codec> MuxInner<C> {
    pub fn ensure_open(&self) -> MuxResult<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(MuxError::Closed);
        }
        Ok(())
    }
}

/// Построитель [`Mux`].
pub struct MuxBuilder<C: Codec> {
    connection: Arc<dyn BrokerConnection>,
    codec: C,
    send_timeout: Duration,
    runtime: Option<Handle>,
}

impl<C: Codec> MuxBuilder<C> {
    pub fn send_timeout(
        mut self,
        timeout: Duration,
    ) -> Self {
        self.send_timeout = timeout;
        self
    }

    /// Рантайм для задач доставки. По умолчанию текущий.
    pub fn runtime(
        mut self,
        runtime: Handle,
    ) -> Self {
        self.runtime = Some(runtime);
        self
    }

    pub fn build(self) -> MuxResult<Mux<C>> {
        if self.send_timeout.is_zero() {
            return Err(MuxError::InvalidSettings(
                "send timeout must be positive".into(),
            ));
        }
        let runtime = match self.runtime {
            Some(handle) => handle,
            None => Handle::try_current().map_err(|_| MuxError::NoRuntime)?,
        };

        Ok(Mux {
            inner: Arc::new(MuxInner {
                connection: self.connection,
                codec: Arc::new(self.codec),
                registry: Arc::new(Registry::new()),
                runtime,
                send_timeout: self.send_timeout,
                closed: AtomicBool::new(false),
            }),
        })
    }
}

impl<C: Codec> Mux<C> {
    /// Создаёт мультиплексор на текущем рантайме tokio.
    pub fn new(
        connection: Arc<dyn BrokerConnection>,
        codec: C,
    ) -> MuxResult<Self> {
        Self::builder(connection, codec).build()
    }

    pub fn builder(
        connection: Arc<dyn BrokerConnection>,
        codec: C,
    ) -> MuxBuilder<C> {
        MuxBuilder {
            connection,
            codec,
            send_timeout: DEFAULT_SEND_TIMEOUT,
            runtime: None,
        }
    }

    /// Синхронный издатель; партицию выбирает брокер.
    pub fn new_sync_publisher(
        &self,
        topic: &str,
    ) -> MuxResult<Publisher<C>> {
        let topic = self.checked_topic(topic)?;
        Ok(Publisher::Sync(self.sync_publisher(topic, None)))
    }

    /// Синхронный издатель, закреплённый за партицией.
    pub fn new_sync_publisher_to_partition(
        &self,
        topic: &str,
        partition: Partition,
    ) -> MuxResult<Publisher<C>> {
        let topic = self.checked_topic(topic)?;
        let partition = checked_partition(partition)?;
        Ok(Publisher::SyncToPartition(
            self.sync_publisher(topic, Some(partition)),
        ))
    }

    /// Асинхронный издатель: на каждое сообщение ровно один callback.
    pub fn new_async_publisher<S, E>(
        &self,
        topic: &str,
        on_success: S,
        on_error: E,
    ) -> MuxResult<Publisher<C>>
    where
        S: Fn(Message<C::Value>) + Send + Sync + 'static,
        E: Fn(MessageError<C::Value>) + Send + Sync + 'static,
    {
        let topic = self.checked_topic(topic)?;
        Ok(Publisher::Async(self.async_publisher(
            topic,
            None,
            Arc::new(on_success),
            Arc::new(on_error),
        )))
    }

    /// Асинхронный издатель, закреплённый за партицией.
    pub fn new_async_publisher_to_partition<S, E>(
        &self,
        topic: &str,
        partition: Partition,
        on_success: S,
        on_error: E,
    ) -> MuxResult<Publisher<C>>
    where
        S: Fn(Message<C::Value>) + Send + Sync + 'static,
        E: Fn(MessageError<C::Value>) + Send + Sync + 'static,
    {
        let topic = self.checked_topic(topic)?;
        let partition = checked_partition(partition)?;
        Ok(Publisher::AsyncToPartition(self.async_publisher(
            topic,
            Some(partition),
            Arc::new(on_success),
            Arc::new(on_error),
        )))
    }

    /// Новый наблюдатель без подписок. К брокеру не обращается.
    ///
    /// Наблюдатели с одинаковым именем разделяют пространство подписок и
    /// группу потребителей.
    pub fn new_watcher(
        &self,
        subscriber: &str,
    ) -> MuxResult<Watcher<C>> {
        self.inner.ensure_open()?;
        if subscriber.is_empty() {
            return Err(MuxError::EmptySubscriber);
        }
        Ok(Watcher::new(Arc::from(subscriber), self.inner.clone()))
    }

    /// Число активных подписок всех наблюдателей.
    pub fn subscription_count(&self) -> usize {
        self.inner.registry.len()
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    /// Останавливает все подписки и запрещает создание новых издателей и
    /// наблюдателей.
    ///
    /// Соединение не закрывается: им владеет вызывающая сторона.
    pub fn close(&self) {
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let entries = self.inner.registry.take_matching(|_| true);
        let stopped = entries.len();
        for entry in entries {
            entry.stop(self.inner.connection.as_ref());
        }
        tracing::debug!(stopped, "mux closed");
    }

    fn checked_topic(
        &self,
        topic: &str,
    ) -> MuxResult<Arc<str>> {
        self.inner.ensure_open()?;
        if topic.is_empty() {
            return Err(MuxError::EmptyTopic);
        }
        Ok(intern_topic(topic))
    }

    fn sync_publisher(
        &self,
        topic: Arc<str>,
        partition: Option<Partition>,
    ) -> SyncPublisher<C> {
        tracing::debug!(topic = %topic, ?partition, "sync publisher created");
        SyncPublisher::new(
            self.inner.connection.clone(),
            self.inner.codec.clone(),
            topic,
            partition,
            self.inner.send_timeout,
        )
    }

    fn async_publisher(
        &self,
        topic: Arc<str>,
        partition: Option<Partition>,
        on_success: SuccessCallback<C::Value>,
        on_error: ErrorCallback<C::Value>,
    ) -> AsyncPublisher<C> {
        tracing::debug!(topic = %topic, ?partition, "async publisher created");
        AsyncPublisher::new(
            self.inner.connection.clone(),
            self.inner.codec.clone(),
            topic,
            partition,
            self.inner.send_timeout,
            on_success,
            on_error,
            &self.inner.runtime,
        )
    }
}

impl<C: Codec> Clone for Mux<C> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

fn checked_partition(partition: Partition) -> MuxResult<Partition> {
    if partition < 0 {
        return Err(MuxError::InvalidPartition(partition));
    }
    Ok(partition)
}
