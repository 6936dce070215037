use std::error::Error as StdError;

use async_trait::async_trait;
use thiserror::Error;

/// Errors raised while driving an adapter through its lifecycle.
#[derive(Debug, Error)]
pub enum AdapterError {
    /// The adapter does not provide the lifecycle method.
    #[error("{adapter} does not implement {method}")]
    NotImplemented {
        /// Name of the adapter.
        adapter: &'static str,
        /// Name of the missing lifecycle method.
        method: &'static str,
    },

    /// The lifecycle method ran and failed.
    #[error("{adapter} failed: {source}")]
    Failed {
        /// Name of the adapter.
        adapter: &'static str,
        /// Underlying failure.
        #[source]
        source: Box<dyn StdError + Send + Sync>,
    },
}

impl AdapterError {
    /// Wraps a lifecycle failure of the named adapter.
    pub fn failed(adapter: &'static str, source: impl StdError + Send + Sync + 'static) -> Self {
        Self::Failed {
            adapter,
            source: Box::new(source),
        }
    }
}

/// Lifecycle base for collaborators wrapping an external resource.
///
/// Implementors override the methods they support; the provided bodies fail
/// with [`AdapterError::NotImplemented`].
#[async_trait]
pub trait Adapter: Send + Sync + 'static {
    /// The wrapped resource.
    type Adaptee: Send + Sync;

    /// Name used in logs and errors.
    fn name(&self) -> &'static str;

    /// Returns the wrapped resource.
    fn adaptee(&self) -> &Self::Adaptee;

    /// Acquires whatever the adapter needs before it can be used.
    ///
    /// # Errors
    ///
    /// Returns an error if the adapter cannot be brought up.
    async fn initialize(&self) -> Result<(), AdapterError> {
        Err(AdapterError::NotImplemented {
            adapter: self.name(),
            method: "initialize",
        })
    }

    /// Releases everything acquired by [`Adapter::initialize`].
    ///
    /// # Errors
    ///
    /// Returns an error if the adapter cannot be torn down.
    async fn destroy(&self) -> Result<(), AdapterError> {
        Err(AdapterError::NotImplemented {
            adapter: self.name(),
            method: "destroy",
        })
    }
}
