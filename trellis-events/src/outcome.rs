//! What a listener hands back to the dispatcher.
//!
//! Listeners run synchronously inside `emit`. A listener that has more work
//! to do returns [`Outcome::Pending`]; the dispatcher spawns that future and
//! tracks it until it settles, so shutdown can wait for it.
//!
//! ```
//! use trellis_events::{EventHandlerError, Outcome};
//!
//! fn flush() -> Outcome {
//!     Outcome::pending(async {
//!         tokio::task::yield_now().await;
//!         Ok::<_, EventHandlerError>(())
//!     })
//! }
//! # let _ = flush();
//! ```

use crate::error::EventHandlerError;
use async_trait::async_trait;
use futures::future::BoxFuture;
use std::fmt;
use std::future::Future;

use crate::Event;

/// Deferred part of a listener invocation.
pub type HandlerFuture = BoxFuture<'static, Result<(), EventHandlerError>>;

/// Result of one listener invocation.
pub enum Outcome {
    /// The listener finished synchronously.
    Done,
    /// The listener failed synchronously.
    Failed(EventHandlerError),
    /// The listener started asynchronous work that must be tracked.
    Pending(HandlerFuture),
}

impl Outcome {
    /// Deferred work whose error is reported when it settles
    pub fn pending<F, E>(work: F) -> Self
    where
        F: Future<Output = Result<(), E>> + Send + 'static,
        E: Into<EventHandlerError>,
    {
        Outcome::Pending(Box::pin(async move { work.await.map_err(Into::into) }))
    }

    /// Deferred work that cannot fail
    pub fn deferred<F>(work: F) -> Self
    where
        F: Future<Output = ()> + Send + 'static,
    {
        Outcome::Pending(Box::pin(async move {
            work.await;
            Ok(())
        }))
    }

    pub fn failed(error: impl Into<EventHandlerError>) -> Self {
        Outcome::Failed(error.into())
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, Outcome::Pending(_))
    }
}

impl fmt::Debug for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Done => f.write_str("Done"),
            Outcome::Failed(e) => f.debug_tuple("Failed").field(e).finish(),
            Outcome::Pending(_) => f.write_str("Pending(..)"),
        }
    }
}

/// Values a listener may return.
///
/// `Result<(), E>` is accepted for any `E: Into<EventHandlerError>`: strings,
/// `std::io::Error`, boxed errors and `EventHandlerError` itself. Typed errors
/// keep their variant.
pub trait IntoOutcome {
    fn into_outcome(self) -> Outcome;
}

impl IntoOutcome for () {
    fn into_outcome(self) -> Outcome {
        Outcome::Done
    }
}

impl IntoOutcome for Outcome {
    fn into_outcome(self) -> Outcome {
        self
    }
}

impl<E: Into<EventHandlerError>> IntoOutcome for Result<(), E> {
    fn into_outcome(self) -> Outcome {
        match self {
            Ok(()) => Outcome::Done,
            Err(e) => Outcome::Failed(e.into()),
        }
    }
}

/// Event handler trait
///
/// An asynchronous listener attached with
/// [`EventService::subscribe`](crate::EventService::subscribe). Every
/// invocation is tracked as pending work.
#[async_trait]
pub trait EventHandler<E: Event>: Send + Sync + 'static {
    /// Handle the event
    async fn handle(&self, event: &E) -> Result<(), EventHandlerError>;
}
