//! Realtime reconciliation of cached lists from push events.
//!
//! # Design
//! The push channel delivers named events (`prayer-updated`,
//! `event-deleted`, ...). A `Subscription` registers exactly one handler per
//! change name for one resource kind and removes them on `unsubscribe` or
//! drop. It never owns list data: the owner passes a closure that applies each
//! change to its own state.
//!
//! Applying a change is a pure list operation keyed by normalized identity:
//!
//! - created: prepend, or replace in place when the identity is already
//!   present (an echoed create of a record the screen already inserted),
//! - updated: replace in place, dropped when the identity is absent,
//! - deleted: remove, no-op when absent.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, trace, warn};

use crate::resource::{resource_id, Record, ResourceKind};

/// A named message from the push channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PushEvent {
    pub name: String,
    #[serde(default)]
    pub payload: Value,
}

impl PushEvent {
    pub fn new(name: impl Into<String>, payload: Value) -> Self {
        Self {
            name: name.into(),
            payload,
        }
    }

    pub fn change(kind: ResourceKind, change: Change, payload: Value) -> Self {
        Self::new(event_name(kind, change), payload)
    }

    /// Resource kind and change this event describes, if it follows the
    /// `<resource>-<change>` pattern.
    pub fn resource_change(&self) -> Option<(ResourceKind, Change)> {
        parse_event_name(&self.name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Change {
    Created,
    Updated,
    Deleted,
}

impl Change {
    pub const ALL: [Change; 3] = [Change::Created, Change::Updated, Change::Deleted];

    pub fn suffix(&self) -> &'static str {
        match self {
            Change::Created => "created",
            Change::Updated => "updated",
            Change::Deleted => "deleted",
        }
    }

    fn from_suffix(suffix: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|change| change.suffix() == suffix)
    }
}

pub fn event_name(kind: ResourceKind, change: Change) -> String {
    format!("{}-{}", kind.event_prefix(), change.suffix())
}

pub fn parse_event_name(name: &str) -> Option<(ResourceKind, Change)> {
    let (prefix, suffix) = name.rsplit_once('-')?;
    Some((
        ResourceKind::from_event_prefix(prefix)?,
        Change::from_suffix(suffix)?,
    ))
}

/// A decoded change ready to apply to a list.
#[derive(Debug, Clone, PartialEq)]
pub enum ListChange<R> {
    Created(R),
    Updated(R),
    Deleted(String),
}

impl<R: Record + DeserializeOwned> ListChange<R> {
    /// Decode a push payload. Returns `None` for payloads without a usable
    /// record or identity.
    pub fn from_payload(change: Change, payload: &Value) -> Option<Self> {
        match change {
            Change::Created | Change::Updated => {
                let record: R = match serde_json::from_value(payload.clone()) {
                    Ok(record) => record,
                    Err(err) => {
                        warn!(change = change.suffix(), error = %err, "dropping undecodable push payload");
                        return None;
                    }
                };
                Some(if change == Change::Created {
                    ListChange::Created(record)
                } else {
                    ListChange::Updated(record)
                })
            }
            Change::Deleted => deleted_identity(payload).map(ListChange::Deleted),
        }
    }
}

/// Deleted payloads carry an identity reference: `{"id": ..}`, `{"_id": ..}`
/// or the bare identity.
fn deleted_identity(payload: &Value) -> Option<String> {
    match payload {
        Value::String(id) if !id.is_empty() => Some(id.clone()),
        Value::Number(id) => Some(id.to_string()),
        other => resource_id(other),
    }
}

/// Apply one change in place. Returns whether the list changed.
pub fn apply_change<R: Record>(items: &mut Vec<R>, change: ListChange<R>) -> bool {
    match change {
        ListChange::Created(record) => {
            match record
                .resource_id()
                .and_then(|id| position_of(items, &id))
            {
                Some(index) => items[index] = record,
                None => items.insert(0, record),
            }
            true
        }
        ListChange::Updated(record) => {
            let Some(index) = record
                .resource_id()
                .and_then(|id| position_of(items, &id))
            else {
                return false;
            };
            items[index] = record;
            true
        }
        ListChange::Deleted(id) => match position_of(items, &id) {
            Some(index) => {
                items.remove(index);
                true
            }
            None => false,
        },
    }
}

fn position_of<R: Record>(items: &[R], id: &str) -> Option<usize> {
    items
        .iter()
        .position(|item| item.resource_id().as_deref() == Some(id))
}

// ---------------------------------------------------------------------------
// Push channel
// ---------------------------------------------------------------------------

pub type EventHandler = Arc<dyn Fn(&PushEvent) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(u64);

/// The host's persistent push connection.
pub trait PushChannel: Send + Sync {
    fn on(&self, event: &str, handler: EventHandler) -> HandlerId;
    fn off(&self, event: &str, id: HandlerId);
}

/// In-process push channel. Handlers run synchronously on `emit`.
#[derive(Default)]
pub struct LocalChannel {
    next_id: AtomicU64,
    handlers: Mutex<HashMap<String, Vec<(HandlerId, EventHandler)>>>,
}

impl LocalChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver an event to every handler registered for its name. Returns the
    /// number of handlers invoked.
    pub fn emit(&self, event: &PushEvent) -> usize {
        let handlers: Vec<EventHandler> = self
            .handlers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&event.name)
            .map(|registered| registered.iter().map(|(_, h)| Arc::clone(h)).collect())
            .unwrap_or_default();
        trace!(event = %event.name, handlers = handlers.len(), "emitting push event");
        for handler in &handlers {
            handler(event);
        }
        handlers.len()
    }

    pub fn handler_count(&self, event: &str) -> usize {
        self.handlers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(event)
            .map_or(0, Vec::len)
    }
}

impl PushChannel for LocalChannel {
    fn on(&self, event: &str, handler: EventHandler) -> HandlerId {
        let id = HandlerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.handlers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(event.to_string())
            .or_default()
            .push((id, handler));
        id
    }

    fn off(&self, event: &str, id: HandlerId) {
        let mut handlers = self.handlers.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(registered) = handlers.get_mut(event) {
            registered.retain(|(registered_id, _)| *registered_id != id);
            if registered.is_empty() {
                handlers.remove(event);
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Subscription
// ---------------------------------------------------------------------------

/// One screen's subscription to one resource kind.
///
/// Subscribing twice is a no-op. Dropping the subscription deregisters its
/// handlers; events already in flight to a handler are ignored afterwards.
pub struct Subscription {
    channel: Arc<dyn PushChannel>,
    kind: ResourceKind,
    registered: Vec<(String, HandlerId)>,
    active: Arc<AtomicBool>,
}

impl Subscription {
    pub fn new(channel: Arc<dyn PushChannel>, kind: ResourceKind) -> Self {
        Self {
            channel,
            kind,
            registered: Vec::new(),
            active: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    pub fn is_subscribed(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Register one handler per change name. `apply` receives the change and
    /// the raw payload.
    pub fn subscribe<F>(&mut self, apply: F)
    where
        F: Fn(Change, &Value) + Send + Sync + 'static,
    {
        if self.is_subscribed() {
            return;
        }
        let active = Arc::new(AtomicBool::new(true));
        let apply = Arc::new(apply);
        for change in Change::ALL {
            let name = event_name(self.kind, change);
            let apply = Arc::clone(&apply);
            let guard = Arc::clone(&active);
            let handler: EventHandler = Arc::new(move |event: &PushEvent| {
                if !guard.load(Ordering::Acquire) {
                    trace!(event = %event.name, "ignoring event after unsubscribe");
                    return;
                }
                apply(change, &event.payload);
            });
            let id = self.channel.on(&name, handler);
            self.registered.push((name, id));
        }
        self.active = active;
        debug!(resource = self.kind.collection(), "subscribed to push events");
    }

    /// Register a handler for a resource-specific event such as
    /// `livestream-chat-message`. Only valid while subscribed; registering the
    /// same name twice is a no-op.
    pub fn listen<F>(&mut self, event: &str, handler: F)
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        if !self.is_subscribed() || self.registered.iter().any(|(name, _)| name == event) {
            return;
        }
        let guard = Arc::clone(&self.active);
        let handler: EventHandler = Arc::new(move |event: &PushEvent| {
            if guard.load(Ordering::Acquire) {
                handler(&event.payload);
            }
        });
        let id = self.channel.on(event, handler);
        self.registered.push((event.to_string(), id));
    }

    pub fn unsubscribe(&mut self) {
        self.active.store(false, Ordering::Release);
        for (name, id) in self.registered.drain(..) {
            self.channel.off(&name, id);
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}
