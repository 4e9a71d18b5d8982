use std::{error::Error, fmt, panic::Location};

use crate::{ErrorExt, LogLevel, StatusCode};

/// Ошибка верхнего уровня: исходная ошибка плюс цепочка пояснений,
/// накопленных по пути наверх.
pub struct StackError {
    source: Box<dyn ErrorExt>,
    contexts: Vec<ErrorContext>,
}

/// Одно пояснение и место, где его добавили.
#[derive(Debug, Clone)]
pub struct ErrorContext {
    pub message: String,
    pub location: &'static Location<'static>,
}

impl StackError {
    pub fn new<E: ErrorExt>(err: E) -> Self {
        Self {
            source: Box::new(err),
            contexts: Vec::new(),
        }
    }

    #[track_caller]
    pub fn context(
        mut self,
        message: impl Into<String>,
    ) -> Self {
        self.contexts.push(ErrorContext {
            message: message.into(),
            location: Location::caller(),
        });
        self
    }

    pub fn status_code(&self) -> StatusCode {
        self.source.status_code()
    }

    /// Пояснения в порядке добавления: первое - ближайшее к источнику.
    pub fn contexts(&self) -> &[ErrorContext] {
        &self.contexts
    }

    pub fn downcast_ref<T: ErrorExt>(&self) -> Option<&T> {
        self.source.as_any().downcast_ref::<T>()
    }

    pub fn log_level(&self) -> LogLevel {
        self.status_code().log_level()
    }

    pub fn is_critical(&self) -> bool {
        self.status_code().is_critical()
    }
}

impl fmt::Debug for StackError {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        writeln!(f, "{} [{}]", self.source, self.status_code())?;
        for ctx in self.contexts.iter().rev() {
            writeln!(
                f,
                "  at {}:{}: {}",
                ctx.location.file(),
                ctx.location.line(),
                ctx.message
            )?;
        }
        Ok(())
    }
}

/// Внешнее пояснение идёт первым: `creating mux: validating: reason`.
impl fmt::Display for StackError {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        for ctx in self.contexts.iter().rev() {
            write!(f, "{}: ", ctx.message)?;
        }
        write!(f, "{}", self.source)
    }
}

impl Error for StackError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        Some(self.source.as_ref())
    }
}

impl<E: ErrorExt> From<E> for StackError {
    fn from(err: E) -> Self {
        StackError::new(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::GenericError;

    #[test]
    fn test_contexts_keep_order_and_location() {
        let stack = StackError::new(GenericError::new(StatusCode::ConnectionFailed, "refused"))
            .context("opening connection")
            .context("plugin init");

        assert_eq!(stack.contexts().len(), 2);
        assert_eq!(stack.contexts()[0].message, "opening connection");
        assert!(stack.contexts()[0].location.file().ends_with("stack.rs"));
        assert_eq!(stack.status_code(), StatusCode::ConnectionFailed);
        assert_eq!(stack.to_string(), "plugin init: opening connection: refused");
    }

    #[test]
    fn test_level_follows_status_code() {
        let lost = StackError::new(GenericError::new(StatusCode::DataLoss, "gap"));
        assert_eq!(lost.log_level(), LogLevel::Error);
        assert!(lost.is_critical());

        let conflict = StackError::new(GenericError::new(StatusCode::SubscriptionConflict, "dup"));
        assert_eq!(conflict.log_level(), LogLevel::Info);
        assert!(!conflict.is_critical());
        assert!(conflict.downcast_ref::<GenericError>().is_some());
    }
}
