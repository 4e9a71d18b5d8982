use std::sync::Arc;

use dashmap::DashMap;
use once_cell::sync::Lazy;

/// Пул для повторного использования Arc<str> по одинаковым именам топиков.
static TOPIC_INTERN: Lazy<DashMap<String, Arc<str>>> = Lazy::new(DashMap::new);

/// Возвращает interned Arc<str> для данного топика.
///
/// Все сообщения одного топика разделяют одну аллокацию имени.
#[inline(always)]
pub(crate) fn intern_topic<S: AsRef<str>>(topic: S) -> Arc<str> {
    let key = topic.as_ref();
    if let Some(existing) = TOPIC_INTERN.get(key) {
        return existing.clone();
    }
    TOPIC_INTERN
        .entry(key.to_string())
        .or_insert_with(|| Arc::from(key))
        .clone()
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Проверяет, что повторный вызов возвращает тот же объект.
    #[test]
    fn intern_new_and_repeats() {
        let a1 = intern_topic("orders");
        assert_eq!(&*a1, "orders");

        let a2 = intern_topic("orders");
        assert!(Arc::ptr_eq(&a1, &a2), "Должен вернуть тот же Arc по указателю");
    }

    #[test]
    fn intern_different_keys() {
        let a1 = intern_topic("payments");
        let a2 = intern_topic("refunds");
        assert!(!Arc::ptr_eq(&a1, &a2), "Разные ключи - разные Arc");
    }

    /// Проверяет, что при конкурентных вызовах для одинаковых строк
    /// возвращается один и тот же `Arc<str>`.
    #[test]
    fn intern_concurrent() {
        let keys = ["a", "b", "a", "c", "b", "a"];
        let handles: Vec<_> = keys
            .iter()
            .map(|&k| std::thread::spawn(move || intern_topic(k)))
            .collect();

        let arcs: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        let first = arcs[0].clone();

        for arc in arcs.iter().filter(|arc| arc.as_ref() == "a") {
            assert!(Arc::ptr_eq(&first, arc));
        }
    }
}
