//! logmux: партиционированный pub/sub-мультиплексор поверх журнала сообщений.
//!
//! Один [`Mux`] разделяет соединение с брокером между независимыми
//! издателями ([`Publisher`]) и наблюдателями ([`Watcher`]).

/// Settings loading (defaults, TOML file, `LOGMUX_*` environment).
pub mod config;
/// Error types: codec, delivery, stream and multiplexer errors.
pub mod error;
/// Flexible logging (formatting, filters, sinks).
pub mod logging;
/// Host plugin: composition root, health status, shutdown.
pub mod plugin;
/// Pub/Sub: Mux, Publisher, Watcher, codecs, broker connection.
pub mod pubsub;

// -----------------------------------------------------------------------------
//  Frequently used public types
// -----------------------------------------------------------------------------

/// config
pub use config::MuxSettings;
/// Operation errors and result types.
pub use error::{
    CodecError, ConnectionError, DeliveryError, MuxError, MuxResult, PublishError, StreamError,
};
/// Logging initialisation.
pub use logging::{init_logging, LoggingConfig, LoggingHandle};
/// Host plugin.
pub use plugin::{HealthStatus, MuxPlugin, MuxPluginBuilder};
/// Pub/Sub API.
pub use pubsub::{
    handler_fn, AsyncPublisher, BrokerConnection, Codec, DeliveryMode, InMemoryBroker, JsonCodec,
    Message, MessageError, MessageHandler, Mux, Offset, Partition, Publisher, RawCodec,
    SyncPublisher, Watcher,
};
