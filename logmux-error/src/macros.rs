/// Возвращает `Err(StackError)` из текущей функции.
///
/// `bail!(err)` принимает любую ошибку с [`ErrorExt`](crate::ErrorExt),
/// `bail!(code, "fmt", args..)` собирает [`GenericError`](crate::GenericError).
#[macro_export]
macro_rules! bail {
    ($err:expr $(,)?) => {
        return ::core::result::Result::Err($crate::StackError::from($err))
    };
    ($code:expr, $($fmt:tt)+) => {
        return ::core::result::Result::Err($crate::StackError::new(
            $crate::GenericError::new($code, format!($($fmt)+)),
        ))
    };
}

/// `bail!`, если условие ложно. Аргументы после условия те же, что у `bail!`.
///
/// ```ignore
/// ensure!(partitions > 0, StatusCode::InvalidArgs, "need {} partitions", 1);
/// ```
#[macro_export]
macro_rules! ensure {
    ($cond:expr, $($rest:tt)+) => {
        if !($cond) {
            $crate::bail!($($rest)+);
        }
    };
}

/// Пояснения к ошибке прямо на `Result`.
pub trait ResultExt<T> {
    fn context(
        self,
        message: impl Into<String>,
    ) -> Result<T, crate::StackError>;

    /// Сообщение строится только при ошибке.
    fn with_context<M: Into<String>>(
        self,
        message: impl FnOnce() -> M,
    ) -> Result<T, crate::StackError>;
}

impl<T, E: Into<crate::StackError>> ResultExt<T> for Result<T, E> {
    #[track_caller]
    fn context(
        self,
        message: impl Into<String>,
    ) -> Result<T, crate::StackError> {
        match self {
            Ok(value) => Ok(value),
            Err(err) => Err(err.into().context(message)),
        }
    }

    #[track_caller]
    fn with_context<M: Into<String>>(
        self,
        message: impl FnOnce() -> M,
    ) -> Result<T, crate::StackError> {
        match self {
            Ok(value) => Ok(value),
            Err(err) => Err(err.into().context(message())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{GenericError, LogmuxResult, StatusCode};

    fn partitions(count: i32) -> LogmuxResult<i32> {
        ensure!(count > 0, StatusCode::InvalidArgs, "invalid partition count: {}", count);
        ensure!(count < 1024, GenericError::new(StatusCode::InvalidArgs, "too many"));
        Ok(count)
    }

    #[test]
    fn test_ensure_forms() {
        assert_eq!(partitions(4).unwrap(), 4);

        let err = partitions(-3).unwrap_err();
        assert_eq!(err.status_code(), StatusCode::InvalidArgs);
        assert_eq!(err.to_string(), "invalid partition count: -3");

        assert_eq!(partitions(4096).unwrap_err().to_string(), "too many");
    }

    #[test]
    fn test_context_is_lazy() {
        let mut built = false;
        let ok: Result<(), GenericError> = Ok(());
        ok.with_context(|| {
            built = true;
            "never"
        })
        .unwrap();
        assert!(!built);

        let err = partitions(0).context("loading settings").unwrap_err();
        assert_eq!(err.contexts()[0].message, "loading settings");
    }
}
