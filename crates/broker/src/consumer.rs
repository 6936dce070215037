use std::fmt::{self, Debug, Formatter};

use futures::stream::{BoxStream, Stream, StreamExt};

use crate::delivery::Delivery;

/// A registered consumer and the stream of its deliveries.
pub struct Consumer {
    tag: String,
    queue: String,
    deliveries: BoxStream<'static, Delivery>,
}

impl Consumer {
    /// Creates a consumer from the broker-assigned tag and a delivery stream.
    pub fn new(
        tag: impl Into<String>,
        queue: impl Into<String>,
        deliveries: impl Stream<Item = Delivery> + Send + 'static,
    ) -> Self {
        Self {
            tag: tag.into(),
            queue: queue.into(),
            deliveries: deliveries.boxed(),
        }
    }

    /// The consumer tag, used to cancel the consumer.
    #[must_use]
    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// The queue being consumed.
    #[must_use]
    pub fn queue(&self) -> &str {
        &self.queue
    }

    /// Waits for the next delivery; `None` once the consumer is cancelled.
    pub async fn next(&mut self) -> Option<Delivery> {
        self.deliveries.next().await
    }
}

impl Debug for Consumer {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Consumer")
            .field("tag", &self.tag)
            .field("queue", &self.queue)
            .finish_non_exhaustive()
    }
}
