//! Resource kinds and record identity.
//!
//! # Design
//! Records arrive from services that disagree on the identity field name:
//! some send `id`, others `_id`. Every list in this crate matches records
//! through `resource_id`, which prefers `id` and falls back to `_id`.
//! Numeric identities are normalized to their decimal string so a record
//! fetched as `{"id": 7}` matches a push event carrying `{"id": "7"}`.

use serde_json::Value;

/// A server-owned entity type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ResourceKind {
    Event,
    Sermon,
    Donation,
    Prayer,
    FirstTimer,
    Note,
    Friend,
    Devotional,
    Gallery,
    Member,
    Livestream,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 11] = [
        ResourceKind::Event,
        ResourceKind::Sermon,
        ResourceKind::Donation,
        ResourceKind::Prayer,
        ResourceKind::FirstTimer,
        ResourceKind::Note,
        ResourceKind::Friend,
        ResourceKind::Devotional,
        ResourceKind::Gallery,
        ResourceKind::Member,
        ResourceKind::Livestream,
    ];

    /// Collection name, used as the URL segment and the CSV file prefix.
    pub fn collection(&self) -> &'static str {
        match self {
            ResourceKind::Event => "events",
            ResourceKind::Sermon => "sermons",
            ResourceKind::Donation => "donations",
            ResourceKind::Prayer => "prayers",
            ResourceKind::FirstTimer => "first-timers",
            ResourceKind::Note => "notes",
            ResourceKind::Friend => "friends",
            ResourceKind::Devotional => "devotionals",
            ResourceKind::Gallery => "gallery",
            ResourceKind::Member => "members",
            ResourceKind::Livestream => "livestreams",
        }
    }

    /// Prefix of the push events emitted for this kind (`event-created`).
    pub fn event_prefix(&self) -> &'static str {
        match self {
            ResourceKind::Event => "event",
            ResourceKind::Sermon => "sermon",
            ResourceKind::Donation => "donation",
            ResourceKind::Prayer => "prayer",
            ResourceKind::FirstTimer => "first-timer",
            ResourceKind::Note => "note",
            ResourceKind::Friend => "friend",
            ResourceKind::Devotional => "devotional",
            ResourceKind::Gallery => "gallery",
            ResourceKind::Member => "member",
            ResourceKind::Livestream => "livestream",
        }
    }

    pub fn path(&self) -> String {
        format!("/{}", self.collection())
    }

    pub fn item_path(&self, id: &str) -> String {
        format!("/{}/{id}", self.collection())
    }

    /// Kinds whose create/update endpoints take file uploads.
    pub fn accepts_multipart(&self) -> bool {
        matches!(
            self,
            ResourceKind::Sermon | ResourceKind::Devotional | ResourceKind::Gallery
        )
    }

    pub fn from_event_prefix(prefix: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.event_prefix() == prefix)
    }
}

/// Normalized identity of a JSON record: `id`, else `_id`.
pub fn resource_id(record: &Value) -> Option<String> {
    identity_of(record.get("id"), record.get("_id"))
}

pub(crate) fn identity_of(id: Option<&Value>, mongo_id: Option<&Value>) -> Option<String> {
    id.and_then(identity_text)
        .or_else(|| mongo_id.and_then(identity_text))
}

fn identity_text(value: &Value) -> Option<String> {
    match value {
        Value::String(text) if !text.is_empty() => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    }
}

/// Render a scalar JSON value as display text.
pub(crate) fn value_text(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        Value::Bool(flag) => Some(flag.to_string()),
        _ => None,
    }
}

/// Read a JSON value as a number, accepting numeric strings.
pub(crate) fn value_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    }
}

/// The minimal interface every cached record exposes to list controllers,
/// view models and CSV export.
pub trait Record: Clone + Send + Sync + 'static {
    fn resource_id(&self) -> Option<String>;

    /// Field rendered as text, `None` when absent or not a scalar.
    fn text(&self, field: &str) -> Option<String>;

    fn number(&self, field: &str) -> Option<f64> {
        self.text(field).and_then(|text| text.trim().parse().ok())
    }
}

impl Record for Value {
    fn resource_id(&self) -> Option<String> {
        resource_id(self)
    }

    fn text(&self, field: &str) -> Option<String> {
        self.get(field).and_then(value_text)
    }

    fn number(&self, field: &str) -> Option<f64> {
        self.get(field).and_then(value_number)
    }
}
