use std::{
    any::Any,
    panic::{catch_unwind, AssertUnwindSafe},
};

use super::Message;
use crate::StreamError;

/// Обработчик входящих сообщений подписки.
///
/// Вызывается из задачи доставки, по одному сообщению за раз и в порядке
/// смещений внутри партиции. Паника в обработчике перехватывается и
/// затрагивает только текущее сообщение.
pub trait MessageHandler<V>: Send + Sync + 'static {
    fn on_message(
        &self,
        message: Message<V>,
    );

    /// Ошибка потока подписки.
    ///
    /// После фатальной ошибки ([`StreamError::is_fatal`]) подписка
    /// завершается и больше ничего не доставляет.
    fn on_stream_error(
        &self,
        error: &StreamError,
    ) {
        tracing::error!(%error, fatal = error.is_fatal(), "subscription stream error");
    }
}

impl<V, F> MessageHandler<V> for F
where
    F: Fn(Message<V>) + Send + Sync + 'static,
{
    fn on_message(
        &self,
        message: Message<V>,
    ) {
        self(message)
    }
}

/// Обработчик из пары замыканий: сообщения и ошибки потока.
pub struct HandlerFn<M, E> {
    on_message: M,
    on_error: E,
}

/// Собирает [`MessageHandler`] из двух замыканий.
pub fn handler_fn<V, M, E>(
    on_message: M,
    on_error: E,
) -> HandlerFn<M, E>
where
    M: Fn(Message<V>) + Send + Sync + 'static,
    E: Fn(&StreamError) + Send + Sync + 'static,
{
    HandlerFn {
        on_message,
        on_error,
    }
}

impl<V, M, E> MessageHandler<V> for HandlerFn<M, E>
where
    M: Fn(Message<V>) + Send + Sync + 'static,
    E: Fn(&StreamError) + Send + Sync + 'static,
{
    fn on_message(
        &self,
        message: Message<V>,
    ) {
        (self.on_message)(message)
    }

    fn on_stream_error(
        &self,
        error: &StreamError,
    ) {
        (self.on_error)(error)
    }
}

/// Выполняет пользовательский callback, перехватывая панику.
///
/// Возвращает `false`, если callback запаниковал.
pub(crate) fn guarded<F: FnOnce()>(
    callback: &'static str,
    f: F,
) -> bool {
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(()) => true,
        Err(payload) => {
            tracing::warn!(
                callback,
                reason = %panic_message(payload.as_ref()),
                "callback panicked"
            );
            false
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
