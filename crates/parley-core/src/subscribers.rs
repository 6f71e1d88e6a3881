//! Subscriber registry for inbound notifications.
//!
//! Handlers may be registered and removed from anywhere, including from
//! inside their own invocation. Dispatch works on a snapshot of the registry
//! taken before the first handler runs, so removal during dispatch never skips
//! or double-invokes another handler; the removal takes effect from the next
//! notification.
//!
//! A handler that returns an error or panics is logged and skipped; delivery
//! to the remaining handlers continues.

use std::{
    panic::{self, AssertUnwindSafe},
    sync::{Arc, Mutex, MutexGuard, PoisonError, Weak},
};

use crate::protocol::ServerEvent;

/// Error a handler may return.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// Result of a handler invocation.
pub type HandlerResult = Result<(), HandlerError>;

type Handler = Arc<dyn Fn(&Notification) -> HandlerResult + Send + Sync>;

/// Something subscribers are told about.
#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    /// An inbound event, forwarded verbatim.
    Event(ServerEvent),

    /// The connection stopped retrying. A fresh `connect()` is required.
    ReconnectExhausted {
        /// Attempts made before giving up
        attempts: u32,
    },
}

#[derive(Default)]
struct Registry {
    next_id: u64,
    handlers: Vec<(u64, Handler)>,
}

/// Set of notification handlers.
///
/// Cloning yields another handle to the same registry.
#[derive(Clone, Default)]
pub struct Subscribers {
    registry: Arc<Mutex<Registry>>,
}

impl std::fmt::Debug for Subscribers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscribers").field("len", &self.len()).finish()
    }
}

impl Subscribers {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler. The returned [`Subscription`] removes it.
    pub fn subscribe<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&Notification) -> HandlerResult + Send + Sync + 'static,
    {
        let mut registry = self.lock();
        let id = registry.next_id;
        registry.next_id += 1;
        registry.handlers.push((id, Arc::new(handler)));

        Subscription { id, registry: Arc::downgrade(&self.registry) }
    }

    /// Number of registered handlers.
    pub fn len(&self) -> usize {
        self.lock().handlers.len()
    }

    /// Whether no handlers are registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Deliver a notification to every currently registered handler.
    ///
    /// Returns the number of handlers that completed without error.
    pub fn dispatch(&self, notification: &Notification) -> usize {
        let snapshot: Vec<(u64, Handler)> = self.lock().handlers.clone();

        let mut delivered = 0;
        for (id, handler) in snapshot {
            match panic::catch_unwind(AssertUnwindSafe(|| handler(notification))) {
                Ok(Ok(())) => delivered += 1,
                Ok(Err(e)) => {
                    tracing::warn!(subscriber = id, error = %e, "subscriber failed");
                },
                Err(_) => {
                    tracing::error!(subscriber = id, "subscriber panicked");
                },
            }
        }
        delivered
    }

    fn lock(&self) -> MutexGuard<'_, Registry> {
        // Handlers never run under the lock, so poisoning cannot leave the
        // registry half-updated.
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Handle returned by [`Subscribers::subscribe`].
#[derive(Debug, Clone)]
pub struct Subscription {
    id: u64,
    registry: Weak<Mutex<Registry>>,
}

impl Subscription {
    /// Remove exactly this handler.
    ///
    /// Returns `false` if it was already removed or the registry is gone.
    pub fn unsubscribe(&self) -> bool {
        let Some(registry) = self.registry.upgrade() else {
            return false;
        };
        let mut registry = registry.lock().unwrap_or_else(PoisonError::into_inner);

        let before = registry.handlers.len();
        registry.handlers.retain(|(id, _)| *id != self.id);
        before != registry.handlers.len()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        OnceLock,
        atomic::{AtomicUsize, Ordering},
    };

    use serde_json::json;

    use super::*;

    fn event(n: u64) -> Notification {
        Notification::Event(ServerEvent::new("tick", json!({"type": "tick", "n": n})))
    }

    fn counter(subscribers: &Subscribers) -> (Arc<AtomicUsize>, Subscription) {
        let count = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&count);
        let sub = subscribers.subscribe(move |_| {
            c.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        (count, sub)
    }

    #[test]
    fn delivers_to_every_handler() {
        let subscribers = Subscribers::new();
        let (a, _) = counter(&subscribers);
        let (b, _) = counter(&subscribers);

        assert_eq!(subscribers.dispatch(&event(1)), 2);
        assert_eq!(a.load(Ordering::SeqCst), 1);
        assert_eq!(b.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn unsubscribe_removes_only_that_handler() {
        let subscribers = Subscribers::new();
        let (a, sub_a) = counter(&subscribers);
        let (b, _) = counter(&subscribers);

        assert!(sub_a.unsubscribe());
        assert!(!sub_a.unsubscribe());

        subscribers.dispatch(&event(1));
        assert_eq!(a.load(Ordering::SeqCst), 0);
        assert_eq!(b.load(Ordering::SeqCst), 1);
        assert_eq!(subscribers.len(), 1);
    }

    #[test]
    fn failing_handler_does_not_block_others() {
        let subscribers = Subscribers::new();
        subscribers.subscribe(|_| Err("boom".into()));
        subscribers.subscribe(|_| panic!("handler bug"));
        let (count, _) = counter(&subscribers);

        assert_eq!(subscribers.dispatch(&event(1)), 1);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn self_removal_during_dispatch() {
        let subscribers = Subscribers::new();

        let own_sub: Arc<OnceLock<Subscription>> = Arc::new(OnceLock::new());
        let leaving_count = Arc::new(AtomicUsize::new(0));

        let handle = Arc::clone(&own_sub);
        let lc = Arc::clone(&leaving_count);
        let sub = subscribers.subscribe(move |_| {
            lc.fetch_add(1, Ordering::SeqCst);
            if let Some(sub) = handle.get() {
                sub.unsubscribe();
            }
            Ok(())
        });
        own_sub.set(sub).expect("set once");

        let (staying_count, _) = counter(&subscribers);

        // Both see the event being processed when the removal happens
        assert_eq!(subscribers.dispatch(&event(1)), 2);
        assert_eq!(leaving_count.load(Ordering::SeqCst), 1);
        assert_eq!(staying_count.load(Ordering::SeqCst), 1);

        // Only the remaining handler sees the next one
        assert_eq!(subscribers.dispatch(&event(2)), 1);
        assert_eq!(leaving_count.load(Ordering::SeqCst), 1);
        assert_eq!(staying_count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn subscribe_during_dispatch_takes_effect_next_time() {
        let subscribers = Subscribers::new();
        let late_count = Arc::new(AtomicUsize::new(0));

        let registry = subscribers.clone();
        let lc = Arc::clone(&late_count);
        subscribers.subscribe(move |_| {
            let lc = Arc::clone(&lc);
            registry.subscribe(move |_| {
                lc.fetch_add(1, Ordering::SeqCst);
                Ok(())
            });
            Ok(())
        });

        subscribers.dispatch(&event(1));
        assert_eq!(late_count.load(Ordering::SeqCst), 0);

        subscribers.dispatch(&event(2));
        assert_eq!(late_count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn subscription_outliving_registry() {
        let subscribers = Subscribers::new();
        let sub = subscribers.subscribe(|_| Ok(()));
        drop(subscribers);
        assert!(!sub.unsubscribe());
    }
}
