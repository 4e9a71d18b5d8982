use std::{any::Any, time::Duration};

use logmux_error::{ErrorExt, StatusCode};
use thiserror::Error;

use crate::pubsub::{Offset, Partition};

/// Ошибки доставки сообщения брокеру (путь публикации).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeliveryError {
    #[error("Broker rejected message for topic {topic}: {reason}")]
    Rejected { topic: String, reason: String },

    #[error("Unknown partition {partition} for topic {topic} ({partitions} partitions)")]
    UnknownPartition {
        topic: String,
        partition: Partition,
        partitions: usize,
    },

    #[error("Delivery timed out after {0:?}")]
    Timeout(Duration),

    #[error("Connection is closed")]
    Closed,
}

/// Ошибки открытия подписки у брокера.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConnectionError {
    #[error("Unknown partition {partition} for topic {topic} ({partitions} partitions)")]
    UnknownPartition {
        topic: String,
        partition: Partition,
        partitions: usize,
    },

    #[error("Offset {offset} is out of range for {topic}/{partition}")]
    OffsetOutOfRange {
        topic: String,
        partition: Partition,
        offset: Offset,
    },

    #[error("Connection is closed")]
    Closed,
}

/// Ошибки потока входящих сообщений.
///
/// Доставляются в обработчик подписки отдельным событием и никогда не
/// проглатываются.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StreamError {
    // ==== Фатальные: подписка завершается ====
    #[error("Data loss on {topic}/{partition}: expected offset {expected}, got {found}")]
    DataLoss {
        topic: String,
        partition: Partition,
        expected: Offset,
        found: Offset,
    },

    #[error("Connection lost: {0}")]
    ConnectionLost(String),

    #[error("Connection is closed")]
    Closed,

    // ==== Нефатальные: подписка продолжает работу ====
    #[error("Failed to decode message at {topic}/{partition}@{offset}: {reason}")]
    Decode {
        topic: String,
        partition: Partition,
        offset: Offset,
        reason: String,
    },
}

impl StreamError {
    /// Завершает ли ошибка подписку.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::Decode { .. })
    }
}

impl ErrorExt for DeliveryError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::Rejected { .. } => StatusCode::DeliveryFailed,
            Self::UnknownPartition { .. } => StatusCode::UnknownPartition,
            Self::Timeout(_) => StatusCode::Timeout,
            Self::Closed => StatusCode::ConnectionClosed,
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn metrics_tags(&self) -> Vec<(&'static str, String)> {
        let mut tags = vec![
            ("error_type", "delivery".to_string()),
            ("status_code", self.status_code().to_string()),
        ];
        match self {
            Self::Rejected { topic, .. } | Self::UnknownPartition { topic, .. } => {
                tags.push(("topic", topic.clone()));
            }
            _ => {}
        }
        tags
    }
}

impl ErrorExt for ConnectionError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::UnknownPartition { .. } => StatusCode::UnknownPartition,
            Self::OffsetOutOfRange { .. } => StatusCode::OffsetOutOfRange,
            Self::Closed => StatusCode::ConnectionClosed,
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl ErrorExt for StreamError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::DataLoss { .. } => StatusCode::DataLoss,
            Self::ConnectionLost(_) => StatusCode::ConnectionFailed,
            Self::Closed => StatusCode::ConnectionClosed,
            Self::Decode { .. } => StatusCode::DeserializationFailed,
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
