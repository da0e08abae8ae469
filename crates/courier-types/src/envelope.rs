//! # Message Envelope
//!
//! The wire-level container for one message. The body is tagged with one of
//! the encodings the broker client can carry; only Text, Binary, Map, and
//! Object bodies are understood by the codec.
//!
//! ```text
//! Envelope
//! ├── message_id / type_tag        (identity)
//! ├── headers                      (persistence, priority, timestamp)
//! ├── properties                   (selector-visible named values)
//! └── body
//!     ├── Text(String)             JSON document as text
//!     ├── Binary(Bytes)            u16 length prefix + UTF-8 JSON text
//!     ├── Map(name -> FieldValue)  named, possibly nested fields
//!     ├── Object(dyn ObjectBody)   opaque object graph
//!     ├── Stream(Vec<FieldValue>)  (not decodable)
//!     └── Empty                    (not decodable)
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use crate::destination::Persistence;

/// A named value carried in a map body or as a message property.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
    List(Vec<FieldValue>),
    Map(BTreeMap<String, FieldValue>),
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<i32> for FieldValue {
    fn from(value: i32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

/// An arbitrary object graph carried as-is by the broker client.
pub trait ObjectBody: Send + Sync + fmt::Debug {
    /// Name of the concrete type, for diagnostics.
    fn type_name(&self) -> &'static str;

    /// Converts the object into a structured document tree.
    fn to_tree(&self) -> Result<Value, serde_json::Error>;
}

impl<T> ObjectBody for T
where
    T: Serialize + Send + Sync + fmt::Debug + 'static,
{
    fn type_name(&self) -> &'static str {
        std::any::type_name::<T>()
    }

    fn to_tree(&self) -> Result<Value, serde_json::Error> {
        serde_json::to_value(self)
    }
}

/// Message body, tagged by encoding.
#[derive(Debug, Clone)]
pub enum Body {
    Text(String),
    Binary(Bytes),
    Map(BTreeMap<String, FieldValue>),
    Object(Arc<dyn ObjectBody>),
    Stream(Vec<FieldValue>),
    Empty,
}

impl Body {
    /// Short name of the body encoding.
    #[must_use]
    pub fn encoding(&self) -> &'static str {
        match self {
            Self::Text(_) => "text",
            Self::Binary(_) => "binary",
            Self::Map(_) => "map",
            Self::Object(_) => "object",
            Self::Stream(_) => "stream",
            Self::Empty => "empty",
        }
    }
}

/// Delivery headers stamped by the producer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryHeaders {
    pub persistence: Persistence,
    pub priority: u8,
    /// Send time in milliseconds since the Unix epoch, when timestamps are
    /// enabled on the producer.
    pub timestamp_ms: Option<i64>,
}

impl Default for DeliveryHeaders {
    fn default() -> Self {
        Self {
            persistence: Persistence::NotPersistent,
            priority: 4,
            timestamp_ms: None,
        }
    }
}

/// One message as seen by producers and consumers.
#[derive(Debug, Clone)]
pub struct Envelope {
    /// Broker-assigned id, set when the message is sent.
    pub message_id: Option<Uuid>,
    /// Application-declared message type.
    pub type_tag: Option<String>,
    pub headers: DeliveryHeaders,
    pub properties: BTreeMap<String, FieldValue>,
    pub body: Body,
}

impl Envelope {
    /// An envelope with the given body and no metadata.
    #[must_use]
    pub fn new(body: Body) -> Self {
        Self {
            message_id: None,
            type_tag: None,
            headers: DeliveryHeaders::default(),
            properties: BTreeMap::new(),
            body,
        }
    }

    /// A Text envelope.
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self::new(Body::Text(text.into()))
    }

    /// A Binary envelope.
    #[must_use]
    pub fn binary(bytes: impl Into<Bytes>) -> Self {
        Self::new(Body::Binary(bytes.into()))
    }

    /// A Map envelope.
    #[must_use]
    pub fn map(fields: BTreeMap<String, FieldValue>) -> Self {
        Self::new(Body::Map(fields))
    }

    /// An Object envelope.
    #[must_use]
    pub fn object<T>(object: T) -> Self
    where
        T: Serialize + Send + Sync + fmt::Debug + 'static,
    {
        Self::new(Body::Object(Arc::new(object)))
    }

    /// Sets the declared message type.
    #[must_use]
    pub fn with_type_tag(mut self, type_tag: impl Into<String>) -> Self {
        self.type_tag = Some(type_tag.into());
        self
    }

    /// Adds a named property.
    #[must_use]
    pub fn with_property(mut self, name: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.properties.insert(name.into(), value.into());
        self
    }

    /// Declared type tag, falling back to the body encoding.
    #[must_use]
    pub fn describe_type(&self) -> String {
        self.type_tag
            .clone()
            .unwrap_or_else(|| self.body.encoding().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Serialize)]
    struct Ping {
        seq: u32,
    }

    #[test]
    fn test_builders() {
        let envelope = Envelope::text("{}")
            .with_type_tag("ping")
            .with_property("region", "eu")
            .with_property("attempt", 2);

        assert_eq!(envelope.body.encoding(), "text");
        assert_eq!(envelope.type_tag.as_deref(), Some("ping"));
        assert_eq!(
            envelope.properties.get("region"),
            Some(&FieldValue::Text("eu".to_string()))
        );
        assert_eq!(envelope.properties.get("attempt"), Some(&FieldValue::Int(2)));
    }

    #[test]
    fn test_describe_type_falls_back_to_encoding() {
        assert_eq!(Envelope::new(Body::Empty).describe_type(), "empty");
        assert_eq!(
            Envelope::new(Body::Stream(Vec::new()))
                .with_type_tag("legacy.stream")
                .describe_type(),
            "legacy.stream"
        );
    }

    #[test]
    fn test_object_body_tree() {
        let envelope = Envelope::object(Ping { seq: 9 });
        let Body::Object(object) = &envelope.body else {
            panic!("expected object body");
        };
        assert!(object.type_name().ends_with("Ping"));
        assert_eq!(object.to_tree().unwrap(), serde_json::json!({"seq": 9}));
    }

    #[test]
    fn test_default_headers() {
        let headers = DeliveryHeaders::default();
        assert_eq!(headers.priority, 4);
        assert_eq!(headers.persistence, Persistence::NotPersistent);
        assert!(headers.timestamp_ms.is_none());
    }
}
