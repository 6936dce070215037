use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A typed event with a fixed routing key.
///
/// ```
/// use island_events::EventType;
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Serialize, Deserialize)]
/// struct UserCreated {
///     id: u64,
/// }
///
/// impl EventType for UserCreated {
///     const KEY: &'static str = "user.created";
/// }
/// ```
pub trait EventType: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Routing key the event is published under.
    const KEY: &'static str;
}

/// A routing key and its JSON arguments.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Event {
    key: String,
    args: Value,
}

impl Event {
    /// Creates an event.
    pub fn new(key: impl Into<String>, args: Value) -> Self {
        Self {
            key: key.into(),
            args,
        }
    }

    /// Converts a typed event.
    ///
    /// # Errors
    ///
    /// Returns an error if the event does not serialize to JSON.
    pub fn from_typed<E: EventType>(event: &E) -> Result<Self, serde_json::Error> {
        Ok(Self::new(E::KEY, serde_json::to_value(event)?))
    }

    /// The routing key.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// The arguments.
    #[must_use]
    pub const fn args(&self) -> &Value {
        &self.args
    }

    /// Deserializes the arguments.
    ///
    /// # Errors
    ///
    /// Returns an error if the arguments do not match `T`.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        T::deserialize(&self.args)
    }

    /// Splits the event into key and arguments.
    #[must_use]
    pub fn into_parts(self) -> (String, Value) {
        (self.key, self.args)
    }
}

/// Announced by every instance once it starts consuming.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemNodeStarted {
    /// The instance's broadcast queue.
    pub name: String,
    /// The service name.
    pub island: String,
}

impl EventType for SystemNodeStarted {
    const KEY: &'static str = "system.node.started";
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_typed() {
        let started = SystemNodeStarted {
            name: "event.billing.node.1".to_string(),
            island: "billing".to_string(),
        };
        let event = Event::from_typed(&started).unwrap();

        assert_eq!(event.key(), "system.node.started");
        assert_eq!(
            event.args(),
            &json!({"name": "event.billing.node.1", "island": "billing"})
        );
        assert_eq!(event.decode::<SystemNodeStarted>().unwrap(), started);
        assert!(event.decode::<u64>().is_err());
    }
}
