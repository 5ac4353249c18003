//! Generic list controller shared by every list-backed screen.
//!
//! # Design
//! A `ListController` owns one screen's `ListState` behind a shared handle so
//! the push subscription's closure can patch it. Loads replace the list
//! wholesale; failed loads keep the previous list and record the message.
//! Mutations apply the server's direct response at once, and the echoed push
//! event for the same identity lands as an idempotent replace.

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, warn};

use crate::client::decode;
use crate::error::ApiError;
use crate::realtime::{apply_change, ListChange, PushChannel, PushEvent, Subscription};
use crate::resource::{Record, ResourceKind};

/// Presentation state of one list screen.
#[derive(Debug, Clone, PartialEq)]
pub struct ListState<R> {
    pub items: Vec<R>,
    pub loading: bool,
    pub error: Option<String>,
}

impl<R> Default for ListState<R> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            loading: false,
            error: None,
        }
    }
}

pub struct ListController<R> {
    kind: ResourceKind,
    state: Arc<Mutex<ListState<R>>>,
    /// Reloads started but not yet finished.
    pending_loads: AtomicUsize,
    subscription: Option<Subscription>,
}

impl<R> ListController<R>
where
    R: Record + DeserializeOwned,
{
    pub fn new(kind: ResourceKind) -> Self {
        Self {
            kind,
            state: Arc::new(Mutex::new(ListState::default())),
            pending_loads: AtomicUsize::new(0),
            subscription: None,
        }
    }

    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    pub fn snapshot(&self) -> ListState<R> {
        self.lock().clone()
    }

    pub fn items(&self) -> Vec<R> {
        self.lock().items.clone()
    }

    pub fn is_loading(&self) -> bool {
        self.lock().loading
    }

    pub fn error(&self) -> Option<String> {
        self.lock().error.clone()
    }

    fn lock(&self) -> MutexGuard<'_, ListState<R>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run `fetch` and replace the list with its result.
    ///
    /// On failure the previous list is kept and the error message is stored
    /// for display; the error is also returned to the caller. With
    /// overlapping reloads `loading` stays set until the last one finishes.
    pub async fn reload<Fut>(&self, fetch: Fut) -> Result<(), ApiError>
    where
        Fut: Future<Output = Result<Vec<R>, ApiError>>,
    {
        {
            let mut state = self.lock();
            self.pending_loads.fetch_add(1, Ordering::AcqRel);
            state.loading = true;
        }
        let result = fetch.await;
        let mut state = self.lock();
        state.loading = self.pending_loads.fetch_sub(1, Ordering::AcqRel) > 1;
        match result {
            Ok(items) => {
                debug!(resource = self.kind.collection(), count = items.len(), "list loaded");
                state.items = dedup_by_identity(items);
                state.error = None;
                Ok(())
            }
            Err(err) => {
                warn!(resource = self.kind.collection(), error = ?err, "list load failed");
                state.error = Some(err.to_string());
                Err(err)
            }
        }
    }

    /// Subscribe to this kind's push events. No-op when already subscribed.
    pub fn subscribe(&mut self, channel: Arc<dyn PushChannel>) {
        if self
            .subscription
            .as_ref()
            .is_some_and(Subscription::is_subscribed)
        {
            return;
        }
        let state = Arc::clone(&self.state);
        let mut subscription = Subscription::new(channel, self.kind);
        subscription.subscribe(move |change, payload| {
            if let Some(change) = ListChange::<R>::from_payload(change, payload) {
                let mut state = state.lock().unwrap_or_else(PoisonError::into_inner);
                apply_change(&mut state.items, change);
            }
        });
        self.subscription = Some(subscription);
    }

    /// Tear down the push subscription (screen unmount).
    pub fn unsubscribe(&mut self) {
        self.subscription = None;
    }

    pub fn is_subscribed(&self) -> bool {
        self.subscription
            .as_ref()
            .is_some_and(Subscription::is_subscribed)
    }

    /// Apply an event received outside a subscription. Events for other
    /// resource kinds are ignored. Returns whether the list changed.
    pub fn apply_event(&self, event: &PushEvent) -> bool {
        let Some((kind, change)) = event.resource_change() else {
            return false;
        };
        if kind != self.kind {
            return false;
        }
        match ListChange::<R>::from_payload(change, &event.payload) {
            Some(change) => apply_change(&mut self.lock().items, change),
            None => false,
        }
    }

    pub fn apply_created(&self, record: R) -> bool {
        apply_change(&mut self.lock().items, ListChange::Created(record))
    }

    pub fn apply_updated(&self, record: R) -> bool {
        apply_change(&mut self.lock().items, ListChange::Updated(record))
    }

    pub fn apply_deleted(&self, id: &str) -> bool {
        apply_change(&mut self.lock().items, ListChange::Deleted(id.to_string()))
    }

    /// Await a create call and insert the returned record.
    ///
    /// A failed call leaves the list untouched.
    pub async fn create<Fut>(&self, request: Fut) -> Result<Option<R>, ApiError>
    where
        Fut: Future<Output = Result<Option<Value>, ApiError>>,
    {
        let record: Option<R> = decode(request.await?)?;
        if let Some(record) = &record {
            self.apply_created(record.clone());
        }
        Ok(record)
    }

    /// Await an update call and replace the matching record.
    pub async fn update<Fut>(&self, request: Fut) -> Result<Option<R>, ApiError>
    where
        Fut: Future<Output = Result<Option<Value>, ApiError>>,
    {
        let record: Option<R> = decode(request.await?)?;
        if let Some(record) = &record {
            self.apply_updated(record.clone());
        }
        Ok(record)
    }

    /// Await a delete call and remove `id`.
    pub async fn delete<Fut>(&self, id: &str, request: Fut) -> Result<(), ApiError>
    where
        Fut: Future<Output = Result<Option<Value>, ApiError>>,
    {
        request.await?;
        self.apply_deleted(id);
        Ok(())
    }
}

/// Keep the first record of each identity, preserving order.
fn dedup_by_identity<R: Record>(items: Vec<R>) -> Vec<R> {
    let mut seen = std::collections::HashSet::new();
    items
        .into_iter()
        .filter(|item| match item.resource_id() {
            Some(id) => seen.insert(id),
            None => true,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::realtime::{Change, LocalChannel};
    use serde_json::json;
    use tokio::sync::oneshot;

    fn records(ids: &[&str]) -> Vec<Value> {
        ids.iter().map(|id| json!({ "id": id })).collect()
    }

    #[tokio::test]
    async fn reload_replaces_list_and_clears_error() {
        let controller = ListController::<Value>::new(ResourceKind::Event);
        controller.lock().error = Some("old".into());
        controller.reload(async { Ok(records(&["a", "b"])) }).await.unwrap();
        let state = controller.snapshot();
        assert_eq!(state.items, records(&["a", "b"]));
        assert!(!state.loading);
        assert_eq!(state.error, None);
    }

    #[tokio::test]
    async fn failed_reload_keeps_previous_list() {
        let controller = ListController::<Value>::new(ResourceKind::Prayer);
        controller.reload(async { Ok(records(&["a"])) }).await.unwrap();
        let err = controller
            .reload(async { Err(ApiError::Timeout) })
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Timeout));
        let state = controller.snapshot();
        assert_eq!(state.items, records(&["a"]));
        assert_eq!(state.error.as_deref(), Some(crate::error::TIMEOUT_MESSAGE));
        assert!(!state.loading);
    }

    #[tokio::test]
    async fn overlapping_reloads_stay_loading_until_the_last_finishes() {
        let controller = ListController::<Value>::new(ResourceKind::Event);
        let (first_tx, first_rx) = oneshot::channel::<Vec<Value>>();
        let (second_tx, second_rx) = oneshot::channel::<Vec<Value>>();

        let first = controller.reload(async { Ok(first_rx.await.unwrap()) });
        let second = controller.reload(async { Ok(second_rx.await.unwrap()) });
        let drive = async {
            tokio::task::yield_now().await;
            assert!(controller.is_loading());
            first_tx.send(records(&["a"])).unwrap();
            tokio::task::yield_now().await;
            tokio::task::yield_now().await;
            assert_eq!(controller.items(), records(&["a"]));
            assert!(controller.is_loading());
            second_tx.send(records(&["b"])).unwrap();
        };
        let (first, second, ()) = tokio::join!(first, second, drive);

        first.unwrap();
        second.unwrap();
        assert!(!controller.is_loading());
        assert_eq!(controller.items(), records(&["b"]));
    }

    #[tokio::test]
    async fn reload_drops_duplicate_identities() {
        let controller = ListController::<Value>::new(ResourceKind::Note);
        controller.reload(async { Ok(records(&["a", "b", "a"])) }).await.unwrap();
        assert_eq!(controller.items(), records(&["a", "b"]));
    }

    #[test]
    fn subscription_patches_state() {
        let channel = Arc::new(LocalChannel::new());
        let mut controller = ListController::<Value>::new(ResourceKind::Donation);
        controller.subscribe(channel.clone());
        controller.subscribe(channel.clone());
        assert_eq!(channel.handler_count("donation-created"), 1);

        channel.emit(&PushEvent::change(
            ResourceKind::Donation,
            Change::Created,
            json!({"id": "d1", "amount": 100}),
        ));
        assert_eq!(controller.items().len(), 1);

        controller.unsubscribe();
        channel.emit(&PushEvent::change(
            ResourceKind::Donation,
            Change::Created,
            json!({"id": "d2"}),
        ));
        assert_eq!(controller.items().len(), 1);
        assert_eq!(channel.handler_count("donation-created"), 0);
    }

    #[test]
    fn apply_event_ignores_other_kinds() {
        let controller = ListController::<Value>::new(ResourceKind::Sermon);
        let event = PushEvent::change(ResourceKind::Event, Change::Created, json!({"id": "e1"}));
        assert!(!controller.apply_event(&event));
        assert!(controller.items().is_empty());
    }

    #[tokio::test]
    async fn optimistic_create_then_echo_is_idempotent() {
        let controller = ListController::<Value>::new(ResourceKind::Event);
        let created = controller
            .create(async { Ok(Some(json!({"id": "e9", "title": "Vigil"}))) })
            .await
            .unwrap();
        assert!(created.is_some());
        controller.apply_event(&PushEvent::change(
            ResourceKind::Event,
            Change::Created,
            json!({"id": "e9", "title": "Vigil"}),
        ));
        assert_eq!(controller.items().len(), 1);
    }

    #[tokio::test]
    async fn failed_mutation_leaves_list_untouched() {
        let controller = ListController::<Value>::new(ResourceKind::Event);
        controller.apply_created(json!({"id": "e1"}));
        let result = controller
            .delete("e1", async {
                Err(ApiError::Server {
                    status: 403,
                    message: "Forbidden".into(),
                })
            })
            .await;
        assert!(result.is_err());
        assert_eq!(controller.items().len(), 1);
    }
}
