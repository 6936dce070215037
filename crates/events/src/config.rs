use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::topology::EXCHANGE_NAME;

/// What happens to a delivery once its dispatches have settled.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AckPolicy {
    /// Always acknowledge; failures only show up in logs and trace records.
    #[default]
    BestEffort,

    /// Acknowledge on success. On the first failure the delivery is requeued,
    /// on a failing redelivery (or an undecodable body) it is rejected.
    RequeueOnce,
}

/// Event service configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EventServiceConfig {
    /// Service name, shared by every instance of the service.
    pub service_name: String,

    /// Topic exchange events are published to and bound on.
    pub exchange: String,

    /// Name of this host, recorded in headers and trace records.
    pub node_name: String,

    /// Delivery settlement policy.
    pub ack_policy: AckPolicy,

    /// Upper bound for a single handler dispatch.
    pub handler_timeout: Option<Duration>,
}

impl Default for EventServiceConfig {
    fn default() -> Self {
        Self {
            service_name: String::new(),
            exchange: EXCHANGE_NAME.to_string(),
            node_name: std::env::var("HOSTNAME").unwrap_or_else(|_| "unknown".to_string()),
            ack_policy: AckPolicy::default(),
            handler_timeout: None,
        }
    }
}

impl EventServiceConfig {
    /// Default configuration for `service_name`.
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            ..Self::default()
        }
    }

    /// Uses another exchange.
    #[must_use]
    pub fn with_exchange(mut self, exchange: impl Into<String>) -> Self {
        self.exchange = exchange.into();
        self
    }

    /// Overrides the node name.
    #[must_use]
    pub fn with_node_name(mut self, node_name: impl Into<String>) -> Self {
        self.node_name = node_name.into();
        self
    }

    /// Sets the delivery settlement policy.
    #[must_use]
    pub const fn with_ack_policy(mut self, ack_policy: AckPolicy) -> Self {
        self.ack_policy = ack_policy;
        self
    }

    /// Bounds every handler dispatch.
    #[must_use]
    pub const fn with_handler_timeout(mut self, timeout: Duration) -> Self {
        self.handler_timeout = Some(timeout);
        self
    }
}
