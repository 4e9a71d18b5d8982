use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};

use logmux_error::{ErrorExt, LogLevel};
use tracing::Instrument;

use super::{
    handler::guarded,
    intern_topic,
    mux::MuxInner,
    registry::{Registry, SubscriptionEntry, SubscriptionKey, SubscriptionState},
    BrokerConnection, BrokerSubscription, Codec, InboundRecord, Message, MessageHandler, Offset,
    Partition, RecordStream, SubscriptionHandle,
};
use crate::{MuxError, MuxResult, StreamError};

/// Наблюдатель: владелец подписок одного подписчика.
///
/// Подписка живёт, пока её не остановят через [`Watcher::stop_watch`] или
/// пока поток не завершится фатальной ошибкой. Удаление наблюдателя
/// подписки не останавливает.
pub struct Watcher<C: Codec> {
    name: Arc<str>,
    inner: Arc<MuxInner<C>>,
}

impl<C: Codec> Watcher<C> {
    pub(crate) fn new(
        name: Arc<str>,
        inner: Arc<MuxInner<C>>,
    ) -> Self {
        Self { name, inner }
    }

    /// Имя подписчика; используется и как группа потребителей.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Подписывает `handler` на топики в режиме группы.
    ///
    /// Всё или ничего: если хотя бы один топик уже отслеживается этим
    /// подписчиком (или повторяется в списке), ни одна подписка не
    /// создаётся.
    pub fn watch<H, I, S>(
        &self,
        handler: H,
        topics: I,
    ) -> MuxResult<()>
    where
        H: MessageHandler<C::Value>,
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.inner.ensure_open()?;
        let topics = topics
            .into_iter()
            .map(|t| match t.as_ref() {
                "" => Err(MuxError::EmptyTopic),
                t => Ok(intern_topic(t)),
            })
            .collect::<MuxResult<Vec<_>>>()?;
        if topics.is_empty() {
            return Err(MuxError::NoTopics);
        }

        let handler: Arc<dyn MessageHandler<C::Value>> = Arc::new(handler);
        let connection = &self.inner.connection;
        let mut entries = self.inner.registry.lock();
        // close() выставляет флаг до того, как забрать записи под этой же
        // блокировкой.
        self.inner.ensure_open()?;

        let mut seen = HashSet::with_capacity(topics.len());
        for topic in &topics {
            if !seen.insert(topic.clone()) || entries.contains_key(&self.key(topic, None)) {
                return Err(MuxError::AlreadyWatching {
                    subscriber: self.name.to_string(),
                    topic: topic.to_string(),
                });
            }
        }

        let mut opened = Vec::with_capacity(topics.len());
        for topic in &topics {
            match connection.subscribe(&self.name, topic) {
                Ok(sub) => opened.push((topic.clone(), sub)),
                Err(e) => {
                    for (_, sub) in opened {
                        connection.unsubscribe(sub.handle);
                    }
                    return Err(e.into());
                }
            }
        }

        for (topic, sub) in opened {
            let key = self.key(&topic, None);
            let entry = self.start(key.clone(), sub, handler.clone(), HashMap::new());
            entries.insert(key, entry);
        }

        tracing::debug!(subscriber = %self.name, topics = ?topics, "watching topics");
        Ok(())
    }

    /// Подписывает `handler` на одну партицию начиная с `offset`.
    ///
    /// Смещения приходят строго по возрастанию и без пропусков; пропуск
    /// завершает подписку ошибкой [`StreamError::DataLoss`].
    pub fn watch_partition<H>(
        &self,
        handler: H,
        topic: &str,
        partition: Partition,
        offset: Offset,
    ) -> MuxResult<()>
    where
        H: MessageHandler<C::Value>,
    {
        self.inner.ensure_open()?;
        if topic.is_empty() {
            return Err(MuxError::EmptyTopic);
        }
        if partition < 0 {
            return Err(MuxError::InvalidPartition(partition));
        }
        if offset < 0 {
            return Err(MuxError::InvalidOffset(offset));
        }

        let topic = intern_topic(topic);
        let key = self.key(&topic, Some(partition));
        let mut entries = self.inner.registry.lock();
        self.inner.ensure_open()?;
        if entries.contains_key(&key) {
            return Err(MuxError::AlreadyWatchingPartition {
                subscriber: self.name.to_string(),
                topic: topic.to_string(),
                partition,
            });
        }

        let sub = self
            .inner
            .connection
            .subscribe_partition(&topic, partition, offset)?;
        let expected = HashMap::from([(partition, offset)]);
        let entry = self.start(key.clone(), sub, Arc::new(handler), expected);
        entries.insert(key, entry);

        tracing::debug!(subscriber = %self.name, topic = %topic, partition, offset, "watching partition");
        Ok(())
    }

    /// Останавливает все подписки этого подписчика на топик, в обоих
    /// режимах.
    ///
    /// После возврата новые вызовы обработчика не начинаются; уже идущий
    /// вызов не прерывается.
    pub fn stop_watch(
        &self,
        topic: &str,
    ) -> MuxResult<()> {
        if topic.is_empty() {
            return Err(MuxError::EmptyTopic);
        }
        let removed = self
            .inner
            .registry
            .take_matching(|k| k.subscriber == self.name && &*k.topic == topic);
        if removed.is_empty() {
            return Err(MuxError::NotWatching {
                subscriber: self.name.to_string(),
                topic: topic.to_string(),
            });
        }

        let stopped = removed.len();
        for entry in removed {
            entry.stop(self.inner.connection.as_ref());
        }
        tracing::debug!(subscriber = %self.name, topic, stopped, "stopped watching");
        Ok(())
    }

    /// Останавливает все подписки подписчика. Возвращает их число.
    pub fn stop_all(&self) -> usize {
        let removed = self
            .inner
            .registry
            .take_matching(|k| k.subscriber == self.name);
        let stopped = removed.len();
        for entry in removed {
            entry.stop(self.inner.connection.as_ref());
        }
        stopped
    }

    /// Топики с активными подписками, по алфавиту.
    pub fn active_topics(&self) -> Vec<String> {
        self.inner.registry.topics_of(&self.name)
    }

    fn key(
        &self,
        topic: &Arc<str>,
        partition: Option<Partition>,
    ) -> SubscriptionKey {
        SubscriptionKey {
            subscriber: self.name.clone(),
            topic: topic.clone(),
            partition,
        }
    }

    /// Активирует подписку и запускает задачу доставки.
    ///
    /// Вызывается под блокировкой реестра, поэтому задача не может удалить
    /// свою запись раньше, чем та будет вставлена.
    fn start(
        &self,
        key: SubscriptionKey,
        sub: BrokerSubscription,
        handler: Arc<dyn MessageHandler<C::Value>>,
        expected: HashMap<Partition, Offset>,
    ) -> SubscriptionEntry {
        let id = self.inner.registry.next_id();
        let state = Arc::new(SubscriptionState::new());
        state.activate();

        let span = tracing::debug_span!(
            "subscription",
            subscriber = %key.subscriber,
            topic = %key.topic,
            partition = ?key.partition,
            id
        );
        let delivery = Delivery {
            direct: key.partition.is_some(),
            key,
            id,
            state: state.clone(),
            handle: sub.handle,
            codec: self.inner.codec.clone(),
            handler,
            registry: self.inner.registry.clone(),
            connection: self.inner.connection.clone(),
            expected,
        };
        let task = self
            .inner
            .runtime
            .spawn(delivery.run(sub.stream).instrument(span));

        SubscriptionEntry {
            id,
            state,
            handle: sub.handle,
            task,
        }
    }
}

impl<C: Codec> Clone for Watcher<C> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            inner: self.inner.clone(),
        }
    }
}

impl<C: Codec> std::fmt::Debug for Watcher<C> {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("Watcher")
            .field("name", &self.name)
            .field("topics", &self.active_topics())
            .finish()
    }
}

/// Задача доставки одной подписки.
struct Delivery<C: Codec> {
    key: SubscriptionKey,
    id: u64,
    state: Arc<SubscriptionState>,
    handle: SubscriptionHandle,
    codec: Arc<C>,
    handler: Arc<dyn MessageHandler<C::Value>>,
    registry: Arc<Registry>,
    connection: Arc<dyn BrokerConnection>,
    /// Следующее ожидаемое смещение по партициям.
    expected: HashMap<Partition, Offset>,
    direct: bool,
}

impl<C: Codec> Delivery<C> {
    async fn run(
        mut self,
        mut stream: Box<dyn RecordStream>,
    ) {
        while let Some(item) = stream.next().await {
            if !self.state.is_active() {
                return;
            }
            let result = match item {
                Ok(record) => self.deliver(record),
                Err(error) => Err(error),
            };
            if let Err(error) = result {
                self.report(&error);
                if error.is_fatal() {
                    self.terminate();
                    return;
                }
            }
            // Следующий next() подтверждает запись брокеру: после остановки
            // его не вызываем.
            if !self.state.is_active() {
                return;
            }
        }

        if self.state.is_active() {
            self.report(&StreamError::ConnectionLost(
                "subscription stream ended".to_string(),
            ));
            self.terminate();
        }
    }

    fn deliver(
        &mut self,
        record: InboundRecord,
    ) -> Result<(), StreamError> {
        let InboundRecord {
            partition,
            offset,
            payload,
        } = record;

        if let Some(&expected) = self.expected.get(&partition) {
            if offset < expected {
                tracing::trace!(partition, offset, expected, "skipping redelivered record");
                return Ok(());
            }
            if self.direct && offset > expected {
                return Err(StreamError::DataLoss {
                    topic: self.key.topic.to_string(),
                    partition,
                    expected,
                    found: offset,
                });
            }
        }
        self.expected.insert(partition, offset + 1);

        match self.codec.decode(&payload) {
            Ok((key, value)) => {
                let message = Message::new(key, value, self.key.topic.clone(), partition, offset);
                if !self.dispatch("on_message", || self.handler.on_message(message)) {
                    tracing::trace!(partition, offset, "subscription stopped");
                }
                Ok(())
            }
            Err(e) => Err(StreamError::Decode {
                topic: self.key.topic.to_string(),
                partition,
                offset,
                reason: e.to_string(),
            }),
        }
    }

    /// Вызывает обработчик, если подписка ещё не остановлена.
    ///
    /// Фаза Delivering отделяет уже начатый вызов от остановки: после
    /// `stop()` новый вызов не начнётся, текущий доработает. Возвращает
    /// `false`, если вызова не было или подписку остановили во время него.
    fn dispatch<F: FnOnce()>(
        &self,
        callback: &'static str,
        f: F,
    ) -> bool {
        if !self.state.begin_delivery() {
            return false;
        }
        guarded(callback, f);
        self.state.end_delivery()
    }

    fn report(
        &self,
        error: &StreamError,
    ) {
        let code = error.status_code();
        let fatal = error.is_fatal();
        match code.log_level() {
            LogLevel::Error => {
                tracing::error!(%error, %code, fatal, critical = code.is_critical(), "stream error")
            }
            LogLevel::Warn => tracing::warn!(%error, %code, fatal, "stream error"),
            _ => tracing::debug!(%error, %code, fatal, "stream error"),
        }
        self.dispatch("on_stream_error", || self.handler.on_stream_error(error));
    }

    fn terminate(&self) {
        if self.state.stop() {
            self.registry.remove_if_id(&self.key, self.id);
            self.connection.unsubscribe(self.handle);
            tracing::debug!("subscription terminated");
        }
    }
}
