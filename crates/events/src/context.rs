//! The scope is task-local: it follows a future across `.await` points but
//! not into tasks spawned with `tokio::spawn`. Use [`spawn`] to carry it over.

use std::cell::RefCell;
use std::future::Future;

use thiserror::Error;
use tokio::task::JoinHandle;

/// Operation type recorded while handling an event.
pub const OPERATION_EVENT: &str = "event";

/// Values carried by a scope.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ScopeValues {
    /// Identifier shared by every message of one logical request.
    pub correlation_id: Option<String>,
    /// Routing key being handled.
    pub routing_context: Option<String>,
    /// Kind of work being done, e.g. [`OPERATION_EVENT`].
    pub operation_type: Option<String>,
}

impl ScopeValues {
    /// Values with only a correlation id.
    pub fn with_correlation_id(correlation_id: impl Into<String>) -> Self {
        Self {
            correlation_id: Some(correlation_id.into()),
            ..Self::default()
        }
    }

    fn get(&self, key: ScopeKey) -> Option<&str> {
        match key {
            ScopeKey::CorrelationId => self.correlation_id.as_deref(),
            ScopeKey::RoutingContext => self.routing_context.as_deref(),
            ScopeKey::OperationType => self.operation_type.as_deref(),
        }
    }

    const fn slot(&mut self, key: ScopeKey) -> &mut Option<String> {
        match key {
            ScopeKey::CorrelationId => &mut self.correlation_id,
            ScopeKey::RoutingContext => &mut self.routing_context,
            ScopeKey::OperationType => &mut self.operation_type,
        }
    }
}

/// Names of the scope values.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ScopeKey {
    /// [`ScopeValues::correlation_id`]
    CorrelationId,
    /// [`ScopeValues::routing_context`]
    RoutingContext,
    /// [`ScopeValues::operation_type`]
    OperationType,
}

/// Returned by [`set`] outside of any scope.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
#[error("no context scope is active")]
pub struct NoActiveScope;

tokio::task_local! {
    static SCOPE: RefCell<ScopeValues>;
}

/// Runs `future` inside a fresh scope holding `values`.
pub async fn scope<F: Future>(values: ScopeValues, future: F) -> F::Output {
    SCOPE.scope(RefCell::new(values), future).await
}

/// Snapshot of the current scope.
#[must_use]
pub fn current() -> Option<ScopeValues> {
    SCOPE.try_with(|values| values.borrow().clone()).ok()
}

/// Reads one value of the current scope.
#[must_use]
pub fn get(key: ScopeKey) -> Option<String> {
    SCOPE
        .try_with(|values| values.borrow().get(key).map(ToOwned::to_owned))
        .ok()
        .flatten()
}

/// Overwrites one value of the current scope.
///
/// # Errors
///
/// Returns [`NoActiveScope`] when called outside of a scope.
pub fn set(key: ScopeKey, value: impl Into<String>) -> Result<(), NoActiveScope> {
    SCOPE
        .try_with(|values| {
            *values.borrow_mut().slot(key) = Some(value.into());
        })
        .map_err(|_| NoActiveScope)
}

/// Spawns `future` on the runtime inside a copy of the current scope.
pub fn spawn<F>(future: F) -> JoinHandle<F::Output>
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
{
    match current() {
        Some(values) => tokio::spawn(scope(values, future)),
        None => tokio::spawn(future),
    }
}
