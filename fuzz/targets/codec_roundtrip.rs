#![no_main]

use arbitrary::Arbitrary;
use bytes::Bytes;
use libfuzzer_sys::fuzz_target;
use logmux::{Codec, JsonCodec, RawCodec};

#[derive(Debug, Arbitrary)]
struct FuzzInput {
    key: String,
    value: Vec<u8>,
    number: i64,
    text: String,
}

fuzz_target!(|input: FuzzInput| {
    let value = Bytes::from(input.value);
    let frame = RawCodec.encode(&input.key, &value).expect("raw encode");
    let (key, decoded) = RawCodec.decode(&frame).expect("raw decode");
    assert_eq!(key, input.key);
    assert_eq!(decoded, value);

    let codec = JsonCodec::<(i64, String)>::new();
    let pair = (input.number, input.text);
    let data = codec.encode(&input.key, &pair).expect("json encode");
    let (key, decoded) = codec.decode(&data).expect("json decode");
    assert_eq!(key, input.key);
    assert_eq!(decoded, pair);
});
