//! # Messaging Module
//!
//! Message records flowing through the receiver and the decoders that turn
//! their payloads into callback values.

pub mod decoder;
pub mod message;

pub use decoder::{BytesDecoder, JsonDecoder, MessageDecoder, TypedJsonDecoder};
pub use message::{ConsumedMessage, RawMessage};
