use std::sync::Arc;

use crate::PublishError;

/// Индекс партиции внутри топика.
pub type Partition = i32;
/// Позиция сообщения внутри партиции.
pub type Offset = i64;

/// Сообщение, полученное из брокера или подтверждённое им.
///
/// После получения неизменяемо: партиция и смещение назначены брокером.
#[derive(Debug, Clone, PartialEq)]
pub struct Message<V> {
    pub key: String,
    pub value: V,
    pub topic: Arc<str>,
    pub partition: Partition,
    pub offset: Offset,
}

/// Сообщение, которое не удалось опубликовать, вместе с причиной.
///
/// Возникает только на асинхронном пути публикации.
#[derive(Debug, Clone)]
pub struct MessageError<V> {
    pub key: String,
    pub value: V,
    pub topic: Arc<str>,
    /// Партиция, если издатель закреплён за ней.
    pub partition: Option<Partition>,
    pub cause: PublishError,
}

impl<V> Message<V> {
    pub fn new(
        key: impl Into<String>,
        value: V,
        topic: Arc<str>,
        partition: Partition,
        offset: Offset,
    ) -> Self {
        Self {
            key: key.into(),
            value,
            topic,
            partition,
            offset,
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }
}

impl<V> MessageError<V> {
    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn error(&self) -> &PublishError {
        &self.cause
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DeliveryError;

    #[test]
    fn test_message_creation() {
        let msg = Message::new("user-1", b"payload".to_vec(), Arc::from("orders"), 3, 42);

        assert_eq!(msg.key, "user-1");
        assert_eq!(msg.topic(), "orders");
        assert_eq!(msg.partition, 3);
        assert_eq!(msg.offset, 42);
        assert_eq!(msg.value, b"payload".to_vec());
    }

    #[test]
    fn test_message_error_exposes_cause() {
        let err = MessageError {
            key: "k".to_string(),
            value: 7u32,
            topic: Arc::from("metrics"),
            partition: Some(1),
            cause: PublishError::Delivery(DeliveryError::Closed),
        };

        assert_eq!(err.topic(), "metrics");
        assert!(matches!(
            err.error(),
            PublishError::Delivery(DeliveryError::Closed)
        ));
    }
}
