pub mod codec;
pub mod connection;
pub mod mux;

pub use codec::CodecError;
pub use connection::{ConnectionError, DeliveryError, StreamError};
pub use mux::{MuxError, MuxResult, PublishError};
