#![no_main]

use libfuzzer_sys::fuzz_target;
use logmux::{Codec, JsonCodec, RawCodec};

fuzz_target!(|data: &[u8]| {
    // Декодеры не должны паниковать ни на каких входных данных.
    if let Ok((key, value)) = RawCodec.decode(data) {
        assert_eq!(4 + key.len() + value.len(), data.len());
    }
    let _ = JsonCodec::<serde_json::Value>::new().decode(data);
});
