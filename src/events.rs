//! Lifecycle event fan-out
//!
//! Listeners are invoked synchronously, in registration order, for every
//! lifecycle event before the emitting process continues. A listener error
//! stops the emitting pass.

use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use crate::error::Result;
use crate::types::LifecycleEvent;

/// Receiver of lifecycle events
#[async_trait]
pub trait LifecycleListener: Send + Sync {
    /// Handle one event
    async fn on_event(&self, event: &LifecycleEvent) -> Result<()>;
}

/// Listener backed by a plain closure
pub struct FnListener<F>(pub F);

#[async_trait]
impl<F> LifecycleListener for FnListener<F>
where
    F: Fn(&LifecycleEvent) + Send + Sync,
{
    async fn on_event(&self, event: &LifecycleEvent) -> Result<()> {
        (self.0)(event);
        Ok(())
    }
}

/// Handle returned by [`EventDispatcher::subscribe`]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Ordered list of listeners
#[derive(Default)]
pub struct EventDispatcher {
    listeners: Mutex<Vec<(ListenerId, Arc<dyn LifecycleListener>)>>,
    next_id: AtomicU64,
}

impl EventDispatcher {
    /// Dispatcher without listeners
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener
    pub fn subscribe(&self, listener: Arc<dyn LifecycleListener>) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.lock().push((id, listener));
        id
    }

    /// Remove a listener; returns whether it was registered
    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        let mut listeners = self.lock();
        let before = listeners.len();
        listeners.retain(|(registered, _)| *registered != id);
        listeners.len() != before
    }

    /// Number of registered listeners
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// No listeners registered
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Deliver an event to every listener registered at call time
    pub async fn dispatch(&self, event: &LifecycleEvent) -> Result<()> {
        // Snapshot so listeners may (un)subscribe without deadlocking
        let listeners: Vec<Arc<dyn LifecycleListener>> = self
            .lock()
            .iter()
            .map(|(_, listener)| listener.clone())
            .collect();

        for listener in listeners {
            listener.on_event(event).await?;
        }
        Ok(())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<(ListenerId, Arc<dyn LifecycleListener>)>> {
        self.listeners.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Removes a listener when dropped
///
/// Used where a listener must be detached on every exit path, including early
/// returns through `?`.
pub struct Subscription<'a> {
    dispatcher: &'a EventDispatcher,
    id: ListenerId,
}

impl<'a> Subscription<'a> {
    /// Subscribe `listener` for the lifetime of the returned guard
    pub fn attach(dispatcher: &'a EventDispatcher, listener: Arc<dyn LifecycleListener>) -> Self {
        let id = dispatcher.subscribe(listener);
        Self { dispatcher, id }
    }

    /// Id of the attached listener
    pub fn id(&self) -> ListenerId {
        self.id
    }
}

impl Drop for Subscription<'_> {
    fn drop(&mut self) {
        self.dispatcher.unsubscribe(self.id);
    }
}
