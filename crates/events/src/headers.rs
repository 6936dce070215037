use island_broker::FieldTable;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::debug;

/// Header carrying the correlation id.
pub const CORRELATION_ID_HEADER: &str = "correlationId";

/// Header carrying the publishing [`Endpoint`].
pub const ORIGIN_HEADER: &str = "origin";

const LEGACY_CORRELATION_ID_HEADER: &str = "tattoo";
const LEGACY_ORIGIN_HEADER: &str = "from";

/// Where a message was published from, or where it is handled.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Endpoint {
    /// Host name.
    pub node: String,
    /// Routing key being handled at the time, if any.
    pub context: Option<String>,
    /// Service name.
    #[serde(alias = "island")]
    pub service: String,
    /// Operation type, e.g. `event`.
    #[serde(rename = "type")]
    pub kind: Option<String>,
}

/// Event-specific message headers.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EventHeaders {
    /// Correlation id of the request that caused the event.
    pub correlation_id: Option<String>,
    /// Publishing endpoint.
    pub origin: Option<Endpoint>,
}

impl EventHeaders {
    /// Reads the headers of a delivery. Malformed values are ignored.
    #[must_use]
    pub fn from_field_table(headers: &FieldTable) -> Self {
        let correlation_id = [CORRELATION_ID_HEADER, LEGACY_CORRELATION_ID_HEADER]
            .into_iter()
            .find_map(|name| headers.get(name).and_then(Value::as_str))
            .map(ToOwned::to_owned);

        let origin = [ORIGIN_HEADER, LEGACY_ORIGIN_HEADER]
            .into_iter()
            .find_map(|name| headers.get(name).filter(|value| value.is_object()))
            .and_then(|value| match Endpoint::deserialize(value) {
                Ok(origin) => Some(origin),
                Err(error) => {
                    debug!(%error, "ignoring malformed origin header");
                    None
                }
            });

        Self {
            correlation_id,
            origin,
        }
    }

    /// Writes the headers for publishing.
    #[must_use]
    pub fn to_field_table(&self) -> FieldTable {
        let mut headers = FieldTable::new();
        if let Some(correlation_id) = &self.correlation_id {
            headers.insert(
                CORRELATION_ID_HEADER.to_string(),
                Value::String(correlation_id.clone()),
            );
        }
        if let Some(origin) = &self.origin {
            headers.insert(
                ORIGIN_HEADER.to_string(),
                json!({
                    "node": origin.node,
                    "context": origin.context,
                    "service": origin.service,
                    "type": origin.kind,
                }),
            );
        }
        headers
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_written_headers_read_back() {
        let headers = EventHeaders {
            correlation_id: Some("c-1".to_string()),
            origin: Some(Endpoint {
                node: "host-a".to_string(),
                context: None,
                service: "billing".to_string(),
                kind: Some("event".to_string()),
            }),
        };
        let table = headers.to_field_table();

        assert_eq!(table[CORRELATION_ID_HEADER], json!("c-1"));
        assert_eq!(table[ORIGIN_HEADER]["type"], json!("event"));
        assert_eq!(EventHeaders::from_field_table(&table), headers);
    }

    #[test]
    fn test_absent_correlation_id_is_not_written() {
        let table = EventHeaders::default().to_field_table();
        assert!(table.is_empty());
        assert_eq!(EventHeaders::from_field_table(&table), EventHeaders::default());
    }

    #[test]
    fn test_legacy_header_names() {
        let mut table = FieldTable::new();
        table.insert("tattoo".to_string(), json!("t-9"));
        table.insert(
            "from".to_string(),
            json!({"node": "old-host", "context": "user.created", "island": "accounts", "type": "event"}),
        );

        let headers = EventHeaders::from_field_table(&table);
        assert_eq!(headers.correlation_id.as_deref(), Some("t-9"));
        let origin = headers.origin.unwrap();
        assert_eq!(origin.service, "accounts");
        assert_eq!(origin.context.as_deref(), Some("user.created"));
    }

    #[test]
    fn test_malformed_values_are_ignored() {
        let mut table = FieldTable::new();
        table.insert(CORRELATION_ID_HEADER.to_string(), json!(42));
        table.insert(ORIGIN_HEADER.to_string(), json!({"node": 7}));

        assert_eq!(EventHeaders::from_field_table(&table), EventHeaders::default());
    }
}
