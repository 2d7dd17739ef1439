//! Typed message traits and the CBOR schema adapter.
//!
//! The socket layer never inspects message contents; it only needs each
//! message to know its own type id and how to turn itself into bytes. Two
//! traits carry that capability:
//!
//! - [`Message`]: a live instance that can encode itself
//! - [`Prototype`]: a factory that can produce empty instances and decode
//!   payload bytes back into one
//!
//! Application schemas rarely implement these by hand. Any
//! `serde`-serializable type that implements [`SchemaType`] gets a blanket
//! [`Message`] impl and a zero-cost [`CborPrototype`] factory, with payloads
//! carried as CBOR on the wire.

use std::any::Any;
use std::fmt;
use std::marker::PhantomData;

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::errors::{ProtocolError, Result};

/// A typed message instance that can be sent across the channel.
///
/// Implementations must be `Send` because ownership of an outgoing message
/// passes from the application thread to the send thread.
pub trait Message: fmt::Debug + Send {
    /// Numeric type id, unique within a registry
    fn type_id(&self) -> u32;

    /// Human-readable type name, unique within a registry
    fn type_name(&self) -> &str;

    /// Serialize the message body to payload bytes
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::EncodeFailed`] if serialization fails.
    fn encode_payload(&self) -> Result<Bytes>;

    /// Upcast for downcasting to the concrete type
    fn as_any(&self) -> &dyn Any;

    /// Owned upcast for downcasting a boxed message
    fn into_any(self: Box<Self>) -> Box<dyn Any>;
}

impl dyn Message {
    /// Downcast a borrowed message to a concrete type
    #[must_use]
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.as_any().downcast_ref()
    }

    /// Downcast an owned message to a concrete type
    ///
    /// # Errors
    ///
    /// Returns the original box if the message is not a `T`.
    pub fn downcast<T: Any>(self: Box<Self>) -> std::result::Result<Box<T>, Box<dyn Any>> {
        self.into_any().downcast()
    }
}

/// A registered factory for one message type.
///
/// Prototypes are shared between the application thread (for
/// `create_message`) and the receive thread (for decoding), so they must be
/// `Send + Sync`.
pub trait Prototype: Send + Sync {
    /// Numeric type id this prototype produces
    fn type_id(&self) -> u32;

    /// Type name this prototype produces
    fn type_name(&self) -> &str;

    /// Create a fresh empty instance
    fn create(&self) -> Box<dyn Message>;

    /// Decode payload bytes into an instance
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::DecodeFailed`] if the bytes are not a valid
    /// encoding of this type.
    fn decode_payload(&self, bytes: &[u8]) -> Result<Box<dyn Message>>;
}

/// A schema type with a fixed wire identity, serialized as CBOR.
///
/// Implementing this trait is all an application needs to do to register a
/// type:
///
/// ```
/// use serde::{Deserialize, Serialize};
/// use tether_proto::SchemaType;
///
/// #[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
/// struct Ping {
///     seq: u64,
/// }
///
/// impl SchemaType for Ping {
///     const TYPE_ID: u32 = 1;
///     const TYPE_NAME: &'static str = "ping";
/// }
/// ```
pub trait SchemaType:
    Serialize + DeserializeOwned + Default + fmt::Debug + Send + 'static
{
    /// Numeric type id, unique within a registry
    const TYPE_ID: u32;

    /// Type name, unique within a registry
    const TYPE_NAME: &'static str;
}

impl<T: SchemaType> Message for T {
    fn type_id(&self) -> u32 {
        T::TYPE_ID
    }

    fn type_name(&self) -> &str {
        T::TYPE_NAME
    }

    fn encode_payload(&self) -> Result<Bytes> {
        let mut buf = Vec::new();
        ciborium::ser::into_writer(self, &mut buf)
            .map_err(|e| ProtocolError::EncodeFailed(e.to_string()))?;
        Ok(Bytes::from(buf))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any> {
        self
    }
}

/// Prototype for a [`SchemaType`], carrying no state of its own.
pub struct CborPrototype<T> {
    _marker: PhantomData<fn() -> T>,
}

impl<T> CborPrototype<T> {
    /// Create a prototype for `T`
    #[must_use]
    pub const fn new() -> Self {
        Self { _marker: PhantomData }
    }
}

impl<T> Default for CborPrototype<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: SchemaType> Prototype for CborPrototype<T> {
    fn type_id(&self) -> u32 {
        T::TYPE_ID
    }

    fn type_name(&self) -> &str {
        T::TYPE_NAME
    }

    fn create(&self) -> Box<dyn Message> {
        Box::new(T::default())
    }

    fn decode_payload(&self, bytes: &[u8]) -> Result<Box<dyn Message>> {
        let value: T = ciborium::de::from_reader(bytes)
            .map_err(|e| ProtocolError::DecodeFailed(e.to_string()))?;
        Ok(Box::new(value))
    }
}

#[cfg(test)]
mod tests {
    use serde::Deserialize;

    use super::*;

    #[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
    struct Sample {
        label: String,
        value: i64,
    }

    impl SchemaType for Sample {
        const TYPE_ID: u32 = 42;
        const TYPE_NAME: &'static str = "sample";
    }

    #[test]
    fn payload_round_trip() {
        let sample = Sample { label: "x".into(), value: -7 };
        let bytes = sample.encode_payload().unwrap();

        let proto = CborPrototype::<Sample>::new();
        let decoded = proto.decode_payload(&bytes).unwrap();

        assert_eq!(Message::type_id(decoded.as_ref()), 42);
        assert_eq!(decoded.type_name(), "sample");
        assert_eq!(decoded.downcast_ref::<Sample>(), Some(&sample));
    }

    #[test]
    fn create_produces_default() {
        let proto = CborPrototype::<Sample>::new();
        let empty = proto.create();
        assert_eq!(empty.downcast_ref::<Sample>(), Some(&Sample::default()));
    }

    #[test]
    fn decode_rejects_garbage() {
        let proto = CborPrototype::<Sample>::new();
        let result = proto.decode_payload(&[0xFF, 0x00, 0x13]);
        assert!(matches!(result, Err(ProtocolError::DecodeFailed(_))));
    }

    #[test]
    fn owned_downcast() {
        let boxed: Box<dyn Message> = Box::new(Sample { label: "y".into(), value: 1 });
        let sample = boxed.downcast::<Sample>().expect("should downcast");
        assert_eq!(sample.value, 1);
    }
}
