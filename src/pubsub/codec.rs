//! Граница кодека: преобразование пары (ключ, значение) в байты брокера и
//! обратно.
//!
//! Мультиплексор не знает формата полезной нагрузки и работает с кодеком как
//! с непрозрачной возможностью. В комплекте два кодека:
//! - [`RawCodec`] - бинарный кадр `u32 BE длина ключа | ключ | значение`;
//! - [`JsonCodec`] - JSON-конверт `{"key": ..., "value": ...}` для любых
//!   `serde`-типов.

use std::{io::Cursor, marker::PhantomData};

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use bytes::Bytes;
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::CodecError;

/// Кодек полезной нагрузки.
pub trait Codec: Send + Sync + 'static {
    /// Тип значения сообщения.
    type Value: Send + 'static;

    /// Сериализует пару (ключ, значение) в байтовое представление брокера.
    fn encode(
        &self,
        key: &str,
        value: &Self::Value,
    ) -> Result<Bytes, CodecError>;

    /// Восстанавливает пару (ключ, значение) из байтов брокера.
    fn decode(
        &self,
        data: &[u8],
    ) -> Result<(String, Self::Value), CodecError>;
}

/// Размер заголовка кадра [`RawCodec`].
const KEY_LEN_SIZE: usize = 4;

/// Бинарный кодек без схемы: значение передаётся как есть.
#[derive(Debug, Clone, Copy, Default)]
pub struct RawCodec;

impl Codec for RawCodec {
    type Value = Bytes;

    fn encode(
        &self,
        key: &str,
        value: &Bytes,
    ) -> Result<Bytes, CodecError> {
        let key_len = u32::try_from(key.len())
            .map_err(|_| CodecError::Encode(format!("key too long: {} bytes", key.len())))?;

        let mut buf = Vec::with_capacity(KEY_LEN_SIZE + key.len() + value.len());
        buf.write_u32::<BigEndian>(key_len)
            .map_err(|e| CodecError::Encode(e.to_string()))?;
        buf.extend_from_slice(key.as_bytes());
        buf.extend_from_slice(value);
        Ok(Bytes::from(buf))
    }

    fn decode(
        &self,
        data: &[u8],
    ) -> Result<(String, Bytes), CodecError> {
        let mut cursor = Cursor::new(data);
        let key_len = cursor
            .read_u32::<BigEndian>()
            .map_err(|_| CodecError::Truncated {
                need: KEY_LEN_SIZE,
                got: data.len(),
            })? as usize;

        let body = &data[KEY_LEN_SIZE..];
        if body.len() < key_len {
            return Err(CodecError::Truncated {
                need: KEY_LEN_SIZE + key_len,
                got: data.len(),
            });
        }

        let key = std::str::from_utf8(&body[..key_len])?.to_string();
        let value = Bytes::copy_from_slice(&body[key_len..]);
        Ok((key, value))
    }
}

/// JSON-кодек для произвольных `serde`-типов.
pub struct JsonCodec<V> {
    _marker: PhantomData<fn() -> V>,
}

#[derive(Serialize)]
struct EnvelopeRef<'a, V> {
    key: &'a str,
    value: &'a V,
}

#[derive(Deserialize)]
struct Envelope<V> {
    key: String,
    value: V,
}

impl<V> JsonCodec<V> {
    pub fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<V> Default for JsonCodec<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> Clone for JsonCodec<V> {
    fn clone(&self) -> Self {
        Self::new()
    }
}

impl<V> std::fmt::Debug for JsonCodec<V> {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("JsonCodec")
            .field("value", &std::any::type_name::<V>())
            .finish()
    }
}

impl<V> Codec for JsonCodec<V>
where
    V: Serialize + DeserializeOwned + Send + 'static,
{
    type Value = V;

    fn encode(
        &self,
        key: &str,
        value: &V,
    ) -> Result<Bytes, CodecError> {
        let data = serde_json::to_vec(&EnvelopeRef { key, value })?;
        Ok(Bytes::from(data))
    }

    fn decode(
        &self,
        data: &[u8],
    ) -> Result<(String, V), CodecError> {
        let envelope: Envelope<V> = serde_json::from_slice(data)?;
        Ok((envelope.key, envelope.value))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use serde::{Deserialize, Serialize};

    use super::*;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Order {
        id: u64,
        items: Vec<String>,
    }

    /// Проверяет формат кадра RawCodec: заголовок длины ключа в big-endian.
    #[test]
    fn test_raw_frame_layout() {
        let frame = RawCodec
            .encode("ab", &Bytes::from_static(b"xyz"))
            .unwrap();
        assert_eq!(&frame[..], &[0, 0, 0, 2, b'a', b'b', b'x', b'y', b'z']);
    }

    #[test]
    fn test_raw_empty_key_and_value() {
        let frame = RawCodec.encode("", &Bytes::new()).unwrap();
        let (key, value) = RawCodec.decode(&frame).unwrap();
        assert_eq!(key, "");
        assert!(value.is_empty());
    }

    /// Проверяет, что обрезанный кадр даёт ошибку, а не панику.
    #[test]
    fn test_raw_truncated_frames() {
        assert!(matches!(
            RawCodec.decode(&[0, 0]),
            Err(CodecError::Truncated { need: 4, got: 2 })
        ));
        assert!(matches!(
            RawCodec.decode(&[0, 0, 0, 9, b'a']),
            Err(CodecError::Truncated { need: 13, got: 5 })
        ));
    }

    #[test]
    fn test_raw_invalid_utf8_key() {
        let data = [0, 0, 0, 1, 0xff, b'v'];
        assert!(matches!(RawCodec.decode(&data), Err(CodecError::Utf8(_))));
    }

    #[test]
    fn test_json_roundtrip_struct() {
        let codec = JsonCodec::<Order>::new();
        let order = Order {
            id: 17,
            items: vec!["book".into(), "pen".into()],
        };
        let data = codec.encode("customer-9", &order).unwrap();
        let (key, decoded) = codec.decode(&data).unwrap();
        assert_eq!(key, "customer-9");
        assert_eq!(decoded, order);
    }

    /// Проверяет, что JSON-конверт читается сторонними потребителями.
    #[test]
    fn test_json_envelope_shape() {
        let codec = JsonCodec::<HashMap<String, i32>>::new();
        let mut value = HashMap::new();
        value.insert("n".to_string(), 1);
        let data = codec.encode("k", &value).unwrap();
        let raw: serde_json::Value = serde_json::from_slice(&data).unwrap();
        assert_eq!(raw["key"], "k");
        assert_eq!(raw["value"]["n"], 1);
    }

    #[test]
    fn test_json_decode_garbage() {
        let codec = JsonCodec::<Order>::new();
        assert!(matches!(
            codec.decode(b"not json"),
            Err(CodecError::Json(_))
        ));
    }
}
