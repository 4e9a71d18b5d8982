use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicU64, AtomicU8, Ordering},
        Arc,
    },
};

use parking_lot::{Mutex, MutexGuard};
use tokio::task::JoinHandle;

use super::{BrokerConnection, Partition, SubscriptionHandle};

/// Ключ подписки: (подписчик, топик) для режима группы и
/// (подписчик, топик, партиция) для прямого режима.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) struct SubscriptionKey {
    pub subscriber: Arc<str>,
    pub topic: Arc<str>,
    pub partition: Option<Partition>,
}

/// Фаза жизненного цикла подписки.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub(crate) enum SubscriptionPhase {
    Created = 0,
    Active = 1,
    /// Идёт вызов обработчика.
    Delivering = 2,
    /// Терминальная фаза.
    Stopped = 3,
}

/// Атомарное состояние подписки, разделяемое с задачей доставки.
#[derive(Debug)]
pub(crate) struct SubscriptionState(AtomicU8);

impl SubscriptionState {
    pub fn new() -> Self {
        Self(AtomicU8::new(SubscriptionPhase::Created as u8))
    }

    pub fn phase(&self) -> SubscriptionPhase {
        match self.0.load(Ordering::Acquire) {
            0 => SubscriptionPhase::Created,
            1 => SubscriptionPhase::Active,
            2 => SubscriptionPhase::Delivering,
            _ => SubscriptionPhase::Stopped,
        }
    }

    /// Created -> Active. Из Stopped не возвращается.
    pub fn activate(&self) -> bool {
        self.0
            .compare_exchange(
                SubscriptionPhase::Created as u8,
                SubscriptionPhase::Active as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    /// Переводит в Stopped. Возвращает `true` только при первом вызове.
    pub fn stop(&self) -> bool {
        self.0.swap(SubscriptionPhase::Stopped as u8, Ordering::AcqRel)
            != SubscriptionPhase::Stopped as u8
    }

    pub fn is_active(&self) -> bool {
        matches!(
            self.phase(),
            SubscriptionPhase::Active | SubscriptionPhase::Delivering
        )
    }

    /// Active -> Delivering перед вызовом обработчика. `false`, если
    /// подписка уже остановлена: такой вызов начинать нельзя.
    pub fn begin_delivery(&self) -> bool {
        self.0
            .compare_exchange(
                SubscriptionPhase::Active as u8,
                SubscriptionPhase::Delivering as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    /// Delivering -> Active после вызова. `false`, если подписку остановили,
    /// пока шёл вызов.
    pub fn end_delivery(&self) -> bool {
        self.0
            .compare_exchange(
                SubscriptionPhase::Delivering as u8,
                SubscriptionPhase::Active as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }
}

/// Активная подписка в реестре.
pub(crate) struct SubscriptionEntry {
    pub id: u64,
    pub state: Arc<SubscriptionState>,
    pub handle: SubscriptionHandle,
    pub task: JoinHandle<()>,
}

impl SubscriptionEntry {
    /// Останавливает подписку, не дожидаясь уже идущего callback.
    pub fn stop(
        self,
        connection: &dyn BrokerConnection,
    ) {
        self.state.stop();
        connection.unsubscribe(self.handle);
        self.task.abort();
    }
}

/// Реестр подписок мультиплексора.
///
/// Создание и остановка подписок сериализуются одной блокировкой, поэтому
/// проверка конфликтов и вставка атомарны.
#[derive(Default)]
pub(crate) struct Registry {
    entries: Mutex<HashMap<SubscriptionKey, SubscriptionEntry>>,
    next_id: AtomicU64,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lock(&self) -> MutexGuard<'_, HashMap<SubscriptionKey, SubscriptionEntry>> {
        self.entries.lock()
    }

    pub fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Удаляет запись, только если она всё ещё принадлежит подписке `id`.
    ///
    /// Ключ мог быть переиспользован новой подпиской после `stop_watch`.
    pub fn remove_if_id(
        &self,
        key: &SubscriptionKey,
        id: u64,
    ) -> Option<SubscriptionEntry> {
        let mut entries = self.entries.lock();
        if entries.get(key).is_some_and(|entry| entry.id == id) {
            entries.remove(key)
        } else {
            None
        }
    }

    /// Извлекает все записи, удовлетворяющие предикату.
    pub fn take_matching<F>(
        &self,
        mut pred: F,
    ) -> Vec<SubscriptionEntry>
    where
        F: FnMut(&SubscriptionKey) -> bool,
    {
        let mut entries = self.entries.lock();
        let keys: Vec<SubscriptionKey> = entries.keys().filter(|k| pred(k)).cloned().collect();
        keys.iter().filter_map(|k| entries.remove(k)).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Топики с активными подписками подписчика, отсортированные.
    pub fn topics_of(
        &self,
        subscriber: &str,
    ) -> Vec<String> {
        let mut topics: Vec<String> = self
            .entries
            .lock()
            .keys()
            .filter(|k| &*k.subscriber == subscriber)
            .map(|k| k.topic.to_string())
            .collect();
        topics.sort();
        topics.dedup();
        topics
    }
}
