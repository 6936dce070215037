use std::collections::BTreeMap;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Message headers.
pub type FieldTable = BTreeMap<String, Value>;

/// Properties travelling with a message body.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MessageProperties {
    /// MIME type of the body.
    pub content_type: Option<String>,

    /// Publisher-declared creation time, epoch milliseconds.
    pub timestamp: Option<u64>,

    /// Application headers.
    pub headers: FieldTable,
}

impl MessageProperties {
    /// Sets the content type.
    #[must_use]
    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    /// Sets the timestamp.
    #[must_use]
    pub const fn with_timestamp(mut self, timestamp: u64) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Replaces the headers.
    #[must_use]
    pub fn with_headers(mut self, headers: FieldTable) -> Self {
        self.headers = headers;
        self
    }

    /// Adds one header.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }
}

/// A message handed to a consumer.
#[derive(Clone, Debug)]
pub struct Delivery {
    /// Channel-scoped tag used to ack or nack the delivery.
    pub delivery_tag: u64,

    /// Exchange the message was published to.
    pub exchange: String,

    /// Routing key the message was published with.
    pub routing_key: String,

    /// Whether the message was delivered before and requeued.
    pub redelivered: bool,

    /// Message properties.
    pub properties: MessageProperties,

    /// Raw body.
    pub body: Bytes,
}

impl Delivery {
    /// Looks up an application header.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&Value> {
        self.properties.headers.get(name)
    }
}
