// Base capability shared by application services

use crate::{Provider, WorkTracker};
use std::future::Future;
use tokio::task::JoinHandle;
use trellis_log::Logger;

/// The base trait for services.
///
/// A service owns a [`WorkTracker`] for the detached work it starts, so the
/// host can wait for it during graceful shutdown, and logs under its own
/// type name.
pub trait Service: Provider {
    /// The tracker holding this service's outstanding work.
    fn work(&self) -> &WorkTracker;

    /// Logger named after the service type.
    fn logger(&self) -> Logger {
        Logger::for_type::<Self>()
    }

    /// Spawn `work` and track it until it settles.
    fn track<F>(&self, work: F) -> Option<JoinHandle<()>>
    where
        F: Future<Output = ()> + Send + 'static,
        Self: Sized,
    {
        self.work().track(work)
    }

    /// Wait for every tracked unit of work, including work tracked while waiting.
    fn wait_for_pending(&self) -> impl Future<Output = ()> + Send + '_
    where
        Self: Sized,
    {
        self.work().wait_for_pending()
    }
}
