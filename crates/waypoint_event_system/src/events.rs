//! Event trait, handler abstraction, and the typed handler wrapper.
//!
//! Any `Serialize + DeserializeOwned` type is an event; the bus moves events
//! between publishers and handlers as serialized JSON so handlers stay
//! object-safe and plugins never share concrete types with the relay core.

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use std::any::{Any, TypeId};

/// Errors produced by event serialization, deserialization, and dispatch.
#[derive(Debug, thiserror::Error)]
pub enum EventError {
    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("deserialization failed: {0}")]
    Deserialization(serde_json::Error),

    #[error("handler execution failed: {0}")]
    HandlerExecution(String),
}

/// An event that can travel through the bus.
///
/// Implemented automatically for every type meeting the bounds; event types
/// are plain serde structs, no manual impls required.
pub trait Event: Send + Sync + Any + std::fmt::Debug {
    /// Stable identifier for the event type, used in handler names.
    fn type_name() -> &'static str
    where
        Self: Sized;

    fn serialize(&self) -> Result<Vec<u8>, EventError>;

    fn deserialize(data: &[u8]) -> Result<Self, EventError>
    where
        Self: Sized;

    fn as_any(&self) -> &dyn Any;
}

impl<T> Event for T
where
    T: Serialize + DeserializeOwned + Send + Sync + Any + std::fmt::Debug + 'static,
{
    fn type_name() -> &'static str {
        std::any::type_name::<T>()
    }

    fn serialize(&self) -> Result<Vec<u8>, EventError> {
        serde_json::to_vec(self).map_err(EventError::Serialization)
    }

    fn deserialize(data: &[u8]) -> Result<Self, EventError> {
        serde_json::from_slice(data).map_err(EventError::Deserialization)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Object-safe handler interface the bus dispatches through.
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Handles one event from its serialized form.
    async fn handle(&self, data: &[u8]) -> Result<(), EventError>;

    /// The event type this handler expects, for diagnostics.
    fn expected_type_id(&self) -> TypeId;

    /// Human-readable handler name for logging.
    fn handler_name(&self) -> &str;
}

/// Bridges a typed closure to the object-safe [`EventHandler`] interface.
pub struct TypedEventHandler<T, F>
where
    T: Event,
    F: Fn(T) -> Result<(), EventError> + Send + Sync,
{
    handler: F,
    name: String,
    _phantom: std::marker::PhantomData<T>,
}

impl<T, F> TypedEventHandler<T, F>
where
    T: Event,
    F: Fn(T) -> Result<(), EventError> + Send + Sync,
{
    pub fn new(name: String, handler: F) -> Self {
        Self {
            handler,
            name,
            _phantom: std::marker::PhantomData,
        }
    }
}

#[async_trait]
impl<T, F> EventHandler for TypedEventHandler<T, F>
where
    T: Event,
    F: Fn(T) -> Result<(), EventError> + Send + Sync,
{
    async fn handle(&self, data: &[u8]) -> Result<(), EventError> {
        let event = T::deserialize(data)?;
        (self.handler)(event)
    }

    fn expected_type_id(&self) -> TypeId {
        TypeId::of::<T>()
    }

    fn handler_name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Ping {
        seq: u32,
    }

    #[test]
    fn blanket_event_round_trip() {
        let ping = Ping { seq: 7 };
        let bytes = Event::serialize(&ping).unwrap();
        let back = <Ping as Event>::deserialize(&bytes).unwrap();
        assert_eq!(back, ping);
    }

    #[tokio::test]
    async fn typed_handler_invokes_closure() {
        let handler = TypedEventHandler::new("test::ping".to_string(), |event: Ping| {
            assert_eq!(event.seq, 42);
            Ok(())
        });
        let data = Event::serialize(&Ping { seq: 42 }).unwrap();
        handler.handle(&data).await.unwrap();
    }

    #[tokio::test]
    async fn typed_handler_rejects_wrong_shape() {
        let handler = TypedEventHandler::new("test::ping".to_string(), |_: Ping| Ok(()));
        let result = handler.handle(b"{\"nope\":true}").await;
        assert!(matches!(result, Err(EventError::Deserialization(_))));
    }
}
