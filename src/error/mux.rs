use std::any::Any;

use logmux_error::{ErrorExt, StatusCode};
use thiserror::Error;

use super::{CodecError, ConnectionError, DeliveryError};
use crate::pubsub::{Offset, Partition};

pub type MuxResult<T> = Result<T, MuxError>;

/// Ошибки мультиплексора, возвращаемые синхронно из вызова.
#[derive(Debug, Error)]
pub enum MuxError {
    // ==== Ошибки аргументов ====
    #[error("Topic name must not be empty")]
    EmptyTopic,

    #[error("Subscriber name must not be empty")]
    EmptySubscriber,

    #[error("Invalid partition: {0}")]
    InvalidPartition(Partition),

    #[error("Invalid offset: {0}")]
    InvalidOffset(Offset),

    #[error("No topics given to watch")]
    NoTopics,

    // ==== Подписки ====
    #[error("Subscriber {subscriber} already watches topic {topic}")]
    AlreadyWatching { subscriber: String, topic: String },

    #[error("Subscriber {subscriber} already watches {topic}/{partition}")]
    AlreadyWatchingPartition {
        subscriber: String,
        topic: String,
        partition: Partition,
    },

    #[error("Subscriber {subscriber} does not watch topic {topic}")]
    NotWatching { subscriber: String, topic: String },

    #[error("Subscribe failed: {0}")]
    Subscribe(#[from] ConnectionError),

    // ==== Жизненный цикл ====
    #[error("No tokio runtime available")]
    NoRuntime,

    #[error("Multiplexer is closed")]
    Closed,

    #[error("Messaging plugin is disabled")]
    Disabled,

    #[error("Messaging plugin is not initialized")]
    NotInitialized,

    #[error("Invalid settings: {0}")]
    InvalidSettings(String),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),
}

/// Ошибка публикации одного сообщения.
///
/// Синхронный издатель возвращает её из `publish`, асинхронный передаёт в
/// `on_error` внутри [`MessageError`](crate::pubsub::MessageError).
#[derive(Debug, Clone, Error)]
pub enum PublishError {
    #[error("Serialization failed: {0}")]
    Serialization(String),

    #[error(transparent)]
    Delivery(#[from] DeliveryError),
}

impl From<CodecError> for PublishError {
    fn from(err: CodecError) -> Self {
        PublishError::Serialization(err.to_string())
    }
}

impl ErrorExt for MuxError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::EmptyTopic
            | Self::EmptySubscriber
            | Self::InvalidPartition(_)
            | Self::InvalidOffset(_)
            | Self::NoTopics
            | Self::InvalidSettings(_) => StatusCode::InvalidArgs,
            Self::AlreadyWatching { .. } | Self::AlreadyWatchingPartition { .. } => {
                StatusCode::SubscriptionConflict
            }
            Self::NotWatching { .. } => StatusCode::NotFound,
            Self::Subscribe(e) => e.status_code(),
            Self::NoRuntime | Self::NotInitialized => StatusCode::Internal,
            Self::Closed => StatusCode::ConnectionClosed,
            Self::Disabled => StatusCode::Disabled,
            Self::Config(_) => StatusCode::InvalidData,
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn metrics_tags(&self) -> Vec<(&'static str, String)> {
        let mut tags = vec![
            ("error_type", "mux".to_string()),
            ("status_code", self.status_code().to_string()),
        ];
        match self {
            Self::AlreadyWatching { subscriber, topic }
            | Self::AlreadyWatchingPartition {
                subscriber, topic, ..
            }
            | Self::NotWatching { subscriber, topic } => {
                tags.push(("subscriber", subscriber.clone()));
                tags.push(("topic", topic.clone()));
            }
            _ => {}
        }
        tags
    }
}

impl ErrorExt for PublishError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::Serialization(_) => StatusCode::SerializationFailed,
            Self::Delivery(e) => e.status_code(),
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
