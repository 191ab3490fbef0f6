//! Payload decoding collaborators.
//!
//! The receiver never inspects payloads itself; the callback adapter asks a
//! [`MessageDecoder`] for the value and routes decode failures to the error
//! callback.

use super::message::RawMessage;
use crate::error::Result;
use serde::de::DeserializeOwned;
use std::marker::PhantomData;

/// Turns a raw record into the value passed to success callbacks
pub trait MessageDecoder: Send + Sync + 'static {
    type Value: Send + 'static;

    fn decode(&self, message: &RawMessage) -> Result<Self::Value>;
}

/// Decodes payloads as untyped JSON
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonDecoder;

impl MessageDecoder for JsonDecoder {
    type Value = serde_json::Value;

    fn decode(&self, message: &RawMessage) -> Result<Self::Value> {
        Ok(serde_json::from_slice(message.payload())?)
    }
}

/// Decodes payloads as JSON into a concrete type
#[derive(Debug)]
pub struct TypedJsonDecoder<T> {
    _marker: PhantomData<fn() -> T>,
}

impl<T> Default for TypedJsonDecoder<T> {
    fn default() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<T> MessageDecoder for TypedJsonDecoder<T>
where
    T: DeserializeOwned + Send + 'static,
{
    type Value = T;

    fn decode(&self, message: &RawMessage) -> Result<Self::Value> {
        Ok(serde_json::from_slice(message.payload())?)
    }
}

/// Passes payload bytes through untouched
#[derive(Debug, Clone, Copy, Default)]
pub struct BytesDecoder;

impl MessageDecoder for BytesDecoder {
    type Value = Vec<u8>;

    fn decode(&self, message: &RawMessage) -> Result<Self::Value> {
        Ok(message.payload().to_vec())
    }
}
