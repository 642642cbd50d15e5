//! Event and disconnect listener registry

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use tracing::trace;

use crate::{connection::DisconnectReason, event::AmiEvent};

/// Handle returned by listener registration, used to remove it again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type EventPredicate = Arc<dyn Fn(&AmiEvent) -> bool + Send + Sync>;
type EventHandler = Arc<dyn Fn(&AmiEvent) + Send + Sync>;
type DisconnectHandler = Arc<dyn Fn(&DisconnectReason) + Send + Sync>;

#[derive(Clone)]
struct EventListener {
    id: ListenerId,
    predicate: EventPredicate,
    handler: EventHandler,
}

/// Listeners owned by one connection, invoked in registration order.
///
/// Dispatch works on a snapshot, so handlers may register or remove
/// listeners (including themselves) while running.
#[derive(Default)]
pub(crate) struct ListenerRegistry {
    next_id: AtomicU64,
    events: RwLock<Vec<EventListener>>,
    disconnect: RwLock<Vec<(ListenerId, DisconnectHandler)>>,
}

impl ListenerRegistry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    fn allocate_id(&self) -> ListenerId {
        ListenerId(
            self.next_id
                .fetch_add(1, Ordering::Relaxed),
        )
    }

    pub(crate) fn add_event_listener<P, H>(&self, predicate: P, handler: H) -> ListenerId
    where
        P: Fn(&AmiEvent) -> bool + Send + Sync + 'static,
        H: Fn(&AmiEvent) + Send + Sync + 'static,
    {
        let id = self.allocate_id();
        self.events
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push(EventListener {
                id,
                predicate: Arc::new(predicate),
                handler: Arc::new(handler),
            });
        id
    }

    pub(crate) fn remove_event_listener(&self, id: ListenerId) -> bool {
        let mut events = self
            .events
            .write()
            .unwrap_or_else(|e| e.into_inner());
        let before = events.len();
        events.retain(|l| l.id != id);
        events.len() != before
    }

    pub(crate) fn add_disconnect_listener<H>(&self, handler: H) -> ListenerId
    where
        H: Fn(&DisconnectReason) + Send + Sync + 'static,
    {
        let id = self.allocate_id();
        self.disconnect
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push((id, Arc::new(handler)));
        id
    }

    pub(crate) fn remove_disconnect_listener(&self, id: ListenerId) -> bool {
        let mut disconnect = self
            .disconnect
            .write()
            .unwrap_or_else(|e| e.into_inner());
        let before = disconnect.len();
        disconnect.retain(|(lid, _)| *lid != id);
        disconnect.len() != before
    }

    /// Invoke every matching event listener; returns how many ran.
    pub(crate) fn dispatch_event(&self, event: &AmiEvent) -> usize {
        let snapshot: Vec<EventListener> = self
            .events
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone();

        let mut delivered = 0;
        for listener in snapshot {
            if (listener.predicate)(event) {
                (listener.handler)(event);
                delivered += 1;
            }
        }
        if delivered == 0 {
            trace!("[RECV] No listener for event {:?}", event.name());
        }
        delivered
    }

    /// Notify disconnect listeners, then drop every registration.
    ///
    /// Disconnect listeners are taken out before running, so each fires at
    /// most once. Dropping event listeners closes the channels behind event
    /// streams.
    pub(crate) fn dispatch_disconnect(&self, reason: &DisconnectReason) {
        let handlers = std::mem::take(
            &mut *self
                .disconnect
                .write()
                .unwrap_or_else(|e| e.into_inner()),
        );

        for (_, handler) in handlers {
            handler(reason);
        }

        self.events
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
    }

    #[cfg(test)]
    pub(crate) fn event_listener_count(&self) -> usize {
        self.events
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn fan_out_in_registration_order_with_predicates() {
        let registry = ListenerRegistry::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let s = seen.clone();
        registry.add_event_listener(|_| true, move |e| {
            s.lock()
                .unwrap()
                .push(format!("all:{}", e.name().unwrap_or("")))
        });
        let s = seen.clone();
        registry.add_event_listener(
            |e| e.is_named("Hangup"),
            move |_| {
                s.lock()
                    .unwrap()
                    .push("hangup".to_string())
            },
        );

        assert_eq!(registry.dispatch_event(&AmiEvent::new("Newchannel")), 1);
        assert_eq!(registry.dispatch_event(&AmiEvent::new("Hangup")), 2);
        assert_eq!(
            *seen
                .lock()
                .unwrap(),
            ["all:Newchannel", "all:Hangup", "hangup"]
        );
    }

    #[test]
    fn remove_stops_delivery() {
        let registry = ListenerRegistry::new();
        let id = registry.add_event_listener(|_| true, |_| {});
        assert!(registry.remove_event_listener(id));
        assert!(!registry.remove_event_listener(id));
        assert_eq!(registry.dispatch_event(&AmiEvent::new("Foo")), 0);
    }

    #[test]
    fn handler_may_unregister_itself() {
        let registry = Arc::new(ListenerRegistry::new());
        let slot: Arc<Mutex<Option<ListenerId>>> = Arc::new(Mutex::new(None));

        let reg = registry.clone();
        let own = slot.clone();
        let id = registry.add_event_listener(
            |_| true,
            move |_| {
                if let Some(id) = own
                    .lock()
                    .unwrap()
                    .take()
                {
                    reg.remove_event_listener(id);
                }
            },
        );
        *slot
            .lock()
            .unwrap() = Some(id);

        assert_eq!(registry.dispatch_event(&AmiEvent::new("Foo")), 1);
        assert_eq!(registry.event_listener_count(), 0);
    }

    #[test]
    fn disconnect_notifies_then_clears() {
        let registry = ListenerRegistry::new();
        let reasons = Arc::new(Mutex::new(Vec::new()));
        let r = reasons.clone();
        registry.add_disconnect_listener(move |reason| {
            r.lock()
                .unwrap()
                .push(reason.clone())
        });
        registry.add_event_listener(|_| true, |_| {});

        registry.dispatch_disconnect(&DisconnectReason::ConnectionClosed);
        assert_eq!(
            *reasons
                .lock()
                .unwrap(),
            [DisconnectReason::ConnectionClosed]
        );
        assert_eq!(registry.event_listener_count(), 0);

        registry.dispatch_disconnect(&DisconnectReason::ClientRequested);
        assert_eq!(
            reasons
                .lock()
                .unwrap()
                .len(),
            1
        );
    }
}
