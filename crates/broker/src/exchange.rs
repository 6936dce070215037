use std::fmt::{self, Display, Formatter};

use serde::{Deserialize, Serialize};

/// How an exchange routes messages to its bound queues.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExchangeKind {
    /// Binding pattern must equal the routing key.
    Direct,
    /// Every bound queue receives every message.
    Fanout,
    /// Binding pattern is matched against the routing key word by word.
    Topic,
}

impl ExchangeKind {
    /// Wire name of the exchange kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Direct => "direct",
            Self::Fanout => "fanout",
            Self::Topic => "topic",
        }
    }
}

impl Display for ExchangeKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Declaration options for an exchange.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExchangeOptions {
    /// Survives broker restarts.
    pub durable: bool,
    /// Deleted once its last binding is removed.
    pub auto_delete: bool,
}

impl ExchangeOptions {
    /// A durable exchange that is never deleted automatically.
    #[must_use]
    pub const fn durable() -> Self {
        Self {
            durable: true,
            auto_delete: false,
        }
    }
}
