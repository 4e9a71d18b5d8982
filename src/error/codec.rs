use std::any::Any;

use logmux_error::{ErrorExt, StatusCode};
use thiserror::Error;

/// Ошибки кодека сообщений.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("Encode error: {0}")]
    Encode(String),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Truncated frame: need {need} bytes, got {got}")]
    Truncated { need: usize, got: usize },

    #[error("Key is not valid UTF-8: {0}")]
    Utf8(#[from] std::str::Utf8Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ErrorExt for CodecError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::Encode(_) => StatusCode::SerializationFailed,
            Self::Json(e) if e.is_data() || e.is_syntax() || e.is_eof() => {
                StatusCode::DeserializationFailed
            }
            Self::Json(_) => StatusCode::SerializationFailed,
            Self::Decode(_) | Self::Truncated { .. } | Self::Utf8(_) => {
                StatusCode::DeserializationFailed
            }
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codec_error_status() {
        assert_eq!(
            CodecError::Encode("boom".into()).status_code(),
            StatusCode::SerializationFailed
        );
        assert_eq!(
            CodecError::Truncated { need: 4, got: 1 }.status_code(),
            StatusCode::DeserializationFailed
        );
        assert!(CodecError::Truncated { need: 4, got: 1 }
            .to_string()
            .contains("need 4 bytes"));
    }
}
