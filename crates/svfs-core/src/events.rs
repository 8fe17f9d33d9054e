//! Synchronous callback registry with RAII unsubscription.
//!
//! Volumes publish [`ChangeEvent`]s through an [`EventHub`], and the dispatcher
//! republishes them through its own hub. Subscribing returns a
//! [`Subscription`]; dropping it removes the handler, so there is no separate
//! "remove handler" bookkeeping to forget.
//!
//! [`ChangeEvent`]: svfs_types::ChangeEvent

use std::fmt;
use std::sync::{Arc, PoisonError, RwLock, Weak};

use tokio::sync::mpsc;

type Handler<E> = Arc<dyn Fn(&E) + Send + Sync>;

struct Registry<E> {
    next_id: u64,
    handlers: Vec<(u64, Handler<E>)>,
}

/// Fan-out point for events of type `E`.
///
/// Cloning a hub yields another handle to the same set of subscribers.
pub struct EventHub<E> {
    registry: Arc<RwLock<Registry<E>>>,
}

impl<E> Clone for EventHub<E> {
    fn clone(&self) -> Self {
        Self {
            registry: Arc::clone(&self.registry),
        }
    }
}

impl<E: 'static> Default for EventHub<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: 'static> fmt::Debug for EventHub<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventHub")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

impl<E: 'static> EventHub<E> {
    pub fn new() -> Self {
        Self {
            registry: Arc::new(RwLock::new(Registry {
                next_id: 0,
                handlers: Vec::new(),
            })),
        }
    }

    /// Register `handler`. It stays registered until the returned guard drops.
    pub fn subscribe(&self, handler: impl Fn(&E) + Send + Sync + 'static) -> Subscription {
        self.subscribe_arc(Arc::new(handler))
    }

    /// Register an already shared handler.
    pub fn subscribe_arc(&self, handler: Arc<dyn Fn(&E) + Send + Sync>) -> Subscription {
        let id = {
            let mut registry = self
                .registry
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            let id = registry.next_id;
            registry.next_id += 1;
            registry.handlers.push((id, handler));
            id
        };

        let weak: Weak<RwLock<Registry<E>>> = Arc::downgrade(&self.registry);
        Subscription::new(move || {
            if let Some(registry) = weak.upgrade() {
                registry
                    .write()
                    .unwrap_or_else(PoisonError::into_inner)
                    .handlers
                    .retain(|(handler_id, _)| *handler_id != id);
            }
        })
    }

    /// Deliver `event` to every current subscriber, in subscription order.
    ///
    /// The registry lock is released before handlers run, so a handler may
    /// subscribe or unsubscribe without deadlocking.
    pub fn publish(&self, event: &E) {
        let handlers: Vec<Handler<E>> = self
            .registry
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .handlers
            .iter()
            .map(|(_, handler)| Arc::clone(handler))
            .collect();

        for handler in handlers {
            handler(event);
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.registry
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .handlers
            .len()
    }
}

impl<E: Clone + Send + 'static> EventHub<E> {
    /// Subscribe with an unbounded channel instead of a callback.
    ///
    /// Useful for async consumers: events published on a watcher thread are
    /// forwarded without blocking it.
    pub fn channel(&self) -> (Subscription, mpsc::UnboundedReceiver<E>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let subscription = self.subscribe(move |event: &E| {
            let _ = tx.send(event.clone());
        });
        (subscription, rx)
    }
}

/// Guard for a registered handler. Dropping it unsubscribes.
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Subscription {
    pub(crate) fn new(cancel: impl FnOnce() + Send + Sync + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    /// Unsubscribe now. Equivalent to dropping the guard.
    pub fn unsubscribe(mut self) {
        self.cancel_now();
    }

    fn cancel_now(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel_now();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.cancel.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_publish_reaches_subscribers() {
        let hub: EventHub<u32> = EventHub::new();
        let seen = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&seen);
        let _sub = hub.subscribe(move |value| {
            counter.fetch_add(*value as usize, Ordering::SeqCst);
        });

        hub.publish(&2);
        hub.publish(&3);
        assert_eq!(seen.load(Ordering::SeqCst), 5);
    }

    #[test]
    fn test_drop_unsubscribes() {
        let hub: EventHub<u32> = EventHub::new();
        let seen = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&seen);
        let sub = hub.subscribe(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(hub.subscriber_count(), 1);

        hub.publish(&0);
        drop(sub);
        hub.publish(&0);

        assert_eq!(seen.load(Ordering::SeqCst), 1);
        assert_eq!(hub.subscriber_count(), 0);
    }

    #[test]
    fn test_debug_shows_subscriber_count() {
        let hub: EventHub<String> = EventHub::new();
        let _sub = hub.subscribe(|_| {});
        assert_eq!(format!("{hub:?}"), "EventHub { subscribers: 1 }");
    }

    #[test]
    fn test_subscription_outlives_hub() {
        let hub: EventHub<u32> = EventHub::new();
        let sub = hub.subscribe(|_| {});
        drop(hub);
        sub.unsubscribe();
    }

    #[test]
    fn test_handler_may_subscribe_reentrantly() {
        let hub: EventHub<u32> = EventHub::new();
        let inner = hub.clone();
        let held = Arc::new(std::sync::Mutex::new(Vec::new()));
        let held_in_handler = Arc::clone(&held);
        let _sub = hub.subscribe(move |_| {
            let sub = inner.subscribe(|_| {});
            held_in_handler
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(sub);
        });

        hub.publish(&1);
        assert_eq!(hub.subscriber_count(), 2);
    }

    #[tokio::test]
    async fn test_channel_forwards_events() {
        let hub: EventHub<String> = EventHub::new();
        let (_sub, mut rx) = hub.channel();
        hub.publish(&"hello".to_string());
        assert_eq!(rx.recv().await.as_deref(), Some("hello"));
    }
}
