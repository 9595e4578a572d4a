//! Outward application events and the registry that dispatches them.
//!
//! Handlers run synchronously on the transport task, in registration order.
//! A handler that returns an error or panics is logged and skipped; the other
//! handlers and the transport itself carry on.

use std::collections::HashMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use serde::Serialize;

/// Events delivered to subscribers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    Connected,
    Disconnected {
        code: u16,
        reason: String,
    },
    /// One or more fragments of an assistant response.  `token` is the text to
    /// append; `content` and `token_count` are the cumulative values reported
    /// with the latest fragment.
    Token {
        token: String,
        message_id: String,
        content: String,
        token_count: u64,
    },
    Complete {
        message_id: String,
        content: String,
        token_count: u64,
    },
    /// A turn failed on the server.  The connection stays up.
    Error {
        message_id: Option<String>,
        error: String,
        message: String,
    },
    Status {
        status: String,
        message_id: Option<String>,
        token_count: u64,
    },
    Backpressure {
        active: bool,
    },
}

impl StreamEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            Self::Connected => EventKind::Connected,
            Self::Disconnected { .. } => EventKind::Disconnected,
            Self::Token { .. } => EventKind::Token,
            Self::Complete { .. } => EventKind::Complete,
            Self::Error { .. } => EventKind::Error,
            Self::Status { .. } => EventKind::Status,
            Self::Backpressure { .. } => EventKind::Backpressure,
        }
    }
}

/// Subscription key: one per [`StreamEvent`] variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Connected,
    Disconnected,
    Token,
    Complete,
    Error,
    Status,
    Backpressure,
}

impl EventKind {
    pub const ALL: [EventKind; 7] = [
        Self::Connected,
        Self::Disconnected,
        Self::Token,
        Self::Complete,
        Self::Error,
        Self::Status,
        Self::Backpressure,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Connected => "connected",
            Self::Disconnected => "disconnected",
            Self::Token => "token",
            Self::Complete => "complete",
            Self::Error => "error",
            Self::Status => "status",
            Self::Backpressure => "backpressure",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned by [`EventBus::on`]; pass it to [`EventBus::off`] to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(u64);

pub type Handler = Arc<dyn Fn(&StreamEvent) -> anyhow::Result<()> + Send + Sync>;

/// Multi-consumer registry of event handlers, keyed by [`EventKind`].
#[derive(Default)]
pub struct EventBus {
    next_id: AtomicU64,
    handlers: Mutex<HashMap<EventKind, Vec<(HandlerId, Handler)>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on<F>(&self, kind: EventKind, handler: F) -> HandlerId
    where
        F: Fn(&StreamEvent) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let id = HandlerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.lock()
            .entry(kind)
            .or_default()
            .push((id, Arc::new(handler)));
        id
    }

    /// Remove one handler.  Returns `false` if it was not registered for `kind`.
    pub fn off(&self, kind: EventKind, id: HandlerId) -> bool {
        let mut handlers = self.lock();
        let Some(list) = handlers.get_mut(&kind) else {
            return false;
        };
        let before = list.len();
        list.retain(|(handler_id, _)| *handler_id != id);
        before != list.len()
    }

    pub fn handler_count(&self, kind: EventKind) -> usize {
        self.lock().get(&kind).map_or(0, Vec::len)
    }

    /// Deliver `event` to every handler of its kind.
    ///
    /// The registry lock is released before handlers run, so a handler may
    /// call [`on`](Self::on) or [`off`](Self::off); such changes apply from
    /// the next event.
    pub fn emit(&self, event: &StreamEvent) {
        let kind = event.kind();
        let handlers: Vec<(HandlerId, Handler)> = match self.lock().get(&kind) {
            Some(list) => list.clone(),
            None => return,
        };

        for (id, handler) in handlers {
            match panic::catch_unwind(AssertUnwindSafe(|| handler(event))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    tracing::warn!(event = %kind, handler = id.0, error = %e, "event handler failed");
                }
                Err(_) => {
                    tracing::warn!(event = %kind, handler = id.0, "event handler panicked");
                }
            }
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<EventKind, Vec<(HandlerId, Handler)>>> {
        self.handlers.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let counts: HashMap<EventKind, usize> = self
            .lock()
            .iter()
            .map(|(kind, list)| (*kind, list.len()))
            .collect();
        f.debug_struct("EventBus").field("handlers", &counts).finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use super::*;

    fn counter(bus: &EventBus, kind: EventKind) -> (HandlerId, Arc<AtomicUsize>) {
        let hits = Arc::new(AtomicUsize::new(0));
        let seen = hits.clone();
        let id = bus.on(kind, move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        (id, hits)
    }

    #[test]
    fn dispatches_by_kind() {
        let bus = EventBus::new();
        let (_, connected) = counter(&bus, EventKind::Connected);
        let (_, tokens) = counter(&bus, EventKind::Token);

        bus.emit(&StreamEvent::Connected);
        bus.emit(&StreamEvent::Connected);
        bus.emit(&StreamEvent::Backpressure { active: true });

        assert_eq!(connected.load(Ordering::SeqCst), 2);
        assert_eq!(tokens.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn off_removes_only_that_handler() {
        let bus = EventBus::new();
        let (first, first_hits) = counter(&bus, EventKind::Connected);
        let (_, second_hits) = counter(&bus, EventKind::Connected);

        assert!(bus.off(EventKind::Connected, first));
        assert!(!bus.off(EventKind::Connected, first));
        assert!(!bus.off(EventKind::Token, first));
        bus.emit(&StreamEvent::Connected);

        assert_eq!(first_hits.load(Ordering::SeqCst), 0);
        assert_eq!(second_hits.load(Ordering::SeqCst), 1);
        assert_eq!(bus.handler_count(EventKind::Connected), 1);
    }

    #[test]
    fn failing_handlers_do_not_stop_delivery() {
        let bus = EventBus::new();
        bus.on(EventKind::Connected, |_| anyhow::bail!("nope"));
        bus.on(EventKind::Connected, |_| panic!("handler bug"));
        let (_, hits) = counter(&bus, EventKind::Connected);

        bus.emit(&StreamEvent::Connected);
        bus.emit(&StreamEvent::Connected);

        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn handler_may_subscribe_during_dispatch() {
        let bus = Arc::new(EventBus::new());
        let inner = bus.clone();
        bus.on(EventKind::Connected, move |_| {
            inner.on(EventKind::Token, |_| Ok(()));
            Ok(())
        });

        bus.emit(&StreamEvent::Connected);
        assert_eq!(bus.handler_count(EventKind::Token), 1);
    }

    #[test]
    fn events_serialize_with_type_tag() {
        let value = serde_json::to_value(StreamEvent::Disconnected {
            code: 1000,
            reason: "bye".into(),
        })
        .unwrap();
        assert_eq!(
            value,
            serde_json::json!({"type": "disconnected", "code": 1000, "reason": "bye"})
        );
    }
}
