//! Подсистема Publish–Subscribe поверх партиционированного журнала.
//!
//! Мультиплексор раздаёт независимых издателей и наблюдателей, которые
//! разделяют одно соединение с брокером:
//!
//! - `codec`: граница кодека (`RawCodec`, `JsonCodec`).
//! - `connection`: трейт соединения с брокером и типы записей.
//! - `handler`: обработчики входящих сообщений.
//! - `intern` (приватный): интернирование имён топиков.
//! - `memory`: внутрипроцессный брокер `InMemoryBroker`.
//! - `message`: сообщения и ошибки публикации.
//! - `mux`: фабрика издателей и наблюдателей.
//! - `publisher`: синхронные и асинхронные издатели.
//! - `registry` (приватный): реестр подписок и их жизненный цикл.
//! - `watcher`: наблюдатели и задачи доставки.

pub mod codec;
pub mod connection;
pub mod handler;
mod intern;
pub mod memory;
pub mod message;
pub mod mux;
pub mod publisher;
mod registry;
pub mod watcher;

// Публичный экспорт типов из вложенных модулей, чтобы упростить доступ к
// ним из внешнего кода.
pub use codec::*;
pub use connection::*;
pub use handler::{handler_fn, HandlerFn, MessageHandler};
pub(crate) use intern::intern_topic;
pub use memory::*;
pub use message::*;
pub use mux::{Mux, MuxBuilder, DEFAULT_SEND_TIMEOUT};
pub use publisher::*;
pub use watcher::*;
