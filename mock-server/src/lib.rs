//! In-memory implementation of the church REST API.
//!
//! Serves every collection under `/api/{collection}` with list, detail,
//! create, replace, patch and delete, plus the status and livestream chat
//! sub-resources. Each mutation publishes a push event
//! (`<resource>-created|updated|deleted`) on a broadcast channel that tests
//! and hosts can subscribe to. Records are stored as opaque JSON objects and
//! matched by `id`, falling back to `_id`.

use std::{collections::HashMap, sync::Arc};

use axum::{
    extract::{rejection::JsonRejection, FromRequest, Multipart, Path, Query, Request, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, patch},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tokio::{
    net::TcpListener,
    sync::{broadcast, RwLock},
};
use tracing::info;
use uuid::Uuid;

/// Collection name and push-event prefix for every served resource.
pub const COLLECTIONS: &[(&str, &str)] = &[
    ("events", "event"),
    ("sermons", "sermon"),
    ("donations", "donation"),
    ("prayers", "prayer"),
    ("first-timers", "first-timer"),
    ("notes", "note"),
    ("friends", "friend"),
    ("devotionals", "devotional"),
    ("gallery", "gallery"),
    ("members", "member"),
    ("livestreams", "livestream"),
];

const CHAT_COLLECTION: &str = "livestream-chat";
const EVENT_BUFFER: usize = 256;

/// A push event as published by the server.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ServerEvent {
    pub name: String,
    pub payload: Value,
}

pub type Db = Arc<RwLock<HashMap<String, Vec<Value>>>>;

#[derive(Clone)]
pub struct AppState {
    db: Db,
    events: broadcast::Sender<ServerEvent>,
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}

impl AppState {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_BUFFER);
        Self {
            db: Arc::new(RwLock::new(HashMap::new())),
            events,
        }
    }

    /// Receive every push event published after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<ServerEvent> {
        self.events.subscribe()
    }

    /// Insert records directly, without publishing events.
    pub async fn seed(&self, collection: &str, records: Vec<Value>) {
        self.db
            .write()
            .await
            .entry(collection.to_string())
            .or_default()
            .extend(records);
    }

    fn publish(&self, name: String, payload: Value) {
        // No subscribers is fine: the event is simply dropped.
        let _ = self.events.send(ServerEvent { name, payload });
    }
}

/// Error response carrying the `{ "message": ... }` body clients expect.
#[derive(Debug)]
pub struct ApiFailure {
    status: StatusCode,
    message: String,
}

impl ApiFailure {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    fn not_found(what: &str) -> Self {
        Self::new(StatusCode::NOT_FOUND, format!("{what} not found"))
    }
}

impl IntoResponse for ApiFailure {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "message": self.message }))).into_response()
    }
}

impl From<JsonRejection> for ApiFailure {
    fn from(rejection: JsonRejection) -> Self {
        Self::new(rejection.status(), rejection.body_text())
    }
}

/// `Json` extractor whose rejections use the `{ "message": ... }` shape.
struct JsonBody<T>(T);

impl<S, T> FromRequest<S> for JsonBody<T>
where
    Json<T>: FromRequest<S, Rejection = JsonRejection>,
    S: Send + Sync,
{
    type Rejection = ApiFailure;

    async fn from_request(request: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(request, state).await?;
        Ok(JsonBody(value))
    }
}

pub fn app() -> Router {
    router(AppState::new())
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/{collection}", get(list_records).post(create_record))
        .route(
            "/api/{collection}/{id}",
            get(get_record)
                .put(replace_record)
                .patch(patch_record)
                .delete(delete_record),
        )
        .route("/api/{collection}/{id}/status", patch(set_status))
        .route("/api/{collection}/{id}/chat", get(list_chat).post(post_chat))
        .with_state(state)
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    axum::serve(listener, app()).await
}

pub async fn run_with_state(listener: TcpListener, state: AppState) -> Result<(), std::io::Error> {
    axum::serve(listener, router(state)).await
}

fn event_prefix(collection: &str) -> Result<&'static str, ApiFailure> {
    COLLECTIONS
        .iter()
        .find(|(name, _)| *name == collection)
        .map(|(_, prefix)| *prefix)
        .ok_or_else(|| ApiFailure::new(StatusCode::NOT_FOUND, format!("Unknown resource {collection}")))
}

fn identity(record: &Value) -> Option<String> {
    ["id", "_id"].iter().find_map(|field| match record.get(*field) {
        Some(Value::String(id)) if !id.is_empty() => Some(id.clone()),
        Some(Value::Number(id)) => Some(id.to_string()),
        _ => None,
    })
}

fn field_text(record: &Value, field: &str) -> Option<String> {
    match record.get(field)? {
        Value::String(text) => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        Value::Bool(flag) => Some(flag.to_string()),
        _ => None,
    }
}

/// Read a JSON object or a multipart form into a record body.
async fn read_body(state: &AppState, request: Request) -> Result<Map<String, Value>, ApiFailure> {
    let is_multipart = request
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.starts_with("multipart/form-data"));

    if is_multipart {
        let mut multipart = Multipart::from_request(request, state)
            .await
            .map_err(|rejection| ApiFailure::new(rejection.status(), rejection.body_text()))?;
        let mut body = Map::new();
        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|err| ApiFailure::new(StatusCode::BAD_REQUEST, err.body_text()))?
        {
            let name = field.name().unwrap_or_default().to_string();
            match field.file_name().map(str::to_string) {
                Some(filename) => {
                    let data = field
                        .bytes()
                        .await
                        .map_err(|err| ApiFailure::new(StatusCode::BAD_REQUEST, err.body_text()))?;
                    body.insert(name, json!({ "filename": filename, "size": data.len() }));
                }
                None => {
                    let text = field
                        .text()
                        .await
                        .map_err(|err| ApiFailure::new(StatusCode::BAD_REQUEST, err.body_text()))?;
                    body.insert(name, Value::String(text));
                }
            }
        }
        return Ok(body);
    }

    let Json(value) = Json::<Value>::from_request(request, state).await?;
    match value {
        Value::Object(body) => Ok(body),
        _ => Err(ApiFailure::new(StatusCode::BAD_REQUEST, "Request body must be a JSON object")),
    }
}

async fn list_records(
    State(state): State<AppState>,
    Path(collection): Path<String>,
    Query(filters): Query<HashMap<String, String>>,
) -> Result<Json<Vec<Value>>, ApiFailure> {
    event_prefix(&collection)?;
    let db = state.db.read().await;
    let records = db
        .get(&collection)
        .map(|records| {
            records
                .iter()
                .filter(|record| {
                    filters
                        .iter()
                        .all(|(field, expected)| field_text(record, field).as_deref() == Some(expected.as_str()))
                })
                .cloned()
                .collect()
        })
        .unwrap_or_default();
    Ok(Json(records))
}

async fn get_record(
    State(state): State<AppState>,
    Path((collection, id)): Path<(String, String)>,
) -> Result<Json<Value>, ApiFailure> {
    event_prefix(&collection)?;
    let db = state.db.read().await;
    db.get(&collection)
        .and_then(|records| records.iter().find(|record| identity(record).as_deref() == Some(id.as_str())))
        .cloned()
        .map(Json)
        .ok_or_else(|| ApiFailure::not_found(&collection))
}

async fn create_record(
    State(state): State<AppState>,
    Path(collection): Path<String>,
    request: Request,
) -> Result<(StatusCode, Json<Value>), ApiFailure> {
    let prefix = event_prefix(&collection)?;
    let mut body = read_body(&state, request).await?;
    let mut record = Value::Object(body.clone());
    if identity(&record).is_none() {
        body.insert("id".to_string(), Value::String(Uuid::new_v4().to_string()));
        record = Value::Object(body);
    }
    state
        .db
        .write()
        .await
        .entry(collection.clone())
        .or_default()
        .push(record.clone());
    info!(%collection, id = ?identity(&record), "record created");
    state.publish(format!("{prefix}-created"), record.clone());
    Ok((StatusCode::CREATED, Json(record)))
}

/// Apply `change` to the record `id` and publish `<prefix>-updated`.
async fn modify_record<F>(
    state: &AppState,
    collection: &str,
    id: &str,
    change: F,
) -> Result<Json<Value>, ApiFailure>
where
    F: FnOnce(&mut Map<String, Value>),
{
    let prefix = event_prefix(collection)?;
    let updated = {
        let mut db = state.db.write().await;
        let record = db
            .get_mut(collection)
            .and_then(|records| {
                records
                    .iter_mut()
                    .find(|record| identity(record).as_deref() == Some(id))
            })
            .ok_or_else(|| ApiFailure::not_found(collection))?;
        if let Value::Object(fields) = record {
            change(fields);
        }
        record.clone()
    };
    info!(%collection, %id, "record updated");
    state.publish(format!("{prefix}-updated"), updated.clone());
    Ok(Json(updated))
}

async fn replace_record(
    State(state): State<AppState>,
    Path((collection, id)): Path<(String, String)>,
    request: Request,
) -> Result<Json<Value>, ApiFailure> {
    event_prefix(&collection)?;
    let body = read_body(&state, request).await?;
    modify_record(&state, &collection, &id, |fields| {
        let keep: Vec<(String, Value)> = ["id", "_id"]
            .iter()
            .filter_map(|key| fields.get(*key).map(|value| (key.to_string(), value.clone())))
            .collect();
        *fields = body;
        fields.extend(keep);
    })
    .await
}

async fn patch_record(
    State(state): State<AppState>,
    Path((collection, id)): Path<(String, String)>,
    request: Request,
) -> Result<Json<Value>, ApiFailure> {
    event_prefix(&collection)?;
    let body = read_body(&state, request).await?;
    modify_record(&state, &collection, &id, |fields| {
        for (key, value) in body {
            if key != "id" && key != "_id" {
                fields.insert(key, value);
            }
        }
    })
    .await
}

#[derive(Deserialize)]
struct StatusChange {
    status: String,
}

async fn set_status(
    State(state): State<AppState>,
    Path((collection, id)): Path<(String, String)>,
    JsonBody(input): JsonBody<StatusChange>,
) -> Result<Json<Value>, ApiFailure> {
    modify_record(&state, &collection, &id, |fields| {
        fields.insert("status".to_string(), Value::String(input.status));
    })
    .await
}

async fn delete_record(
    State(state): State<AppState>,
    Path((collection, id)): Path<(String, String)>,
) -> Result<StatusCode, ApiFailure> {
    let prefix = event_prefix(&collection)?;
    {
        let mut db = state.db.write().await;
        let records = db
            .get_mut(&collection)
            .ok_or_else(|| ApiFailure::not_found(&collection))?;
        let index = records
            .iter()
            .position(|record| identity(record).as_deref() == Some(id.as_str()))
            .ok_or_else(|| ApiFailure::not_found(&collection))?;
        records.remove(index);
    }
    info!(%collection, %id, "record deleted");
    state.publish(format!("{prefix}-deleted"), json!({ "id": id }));
    Ok(StatusCode::NO_CONTENT)
}

fn ensure_livestream(collection: &str) -> Result<(), ApiFailure> {
    if collection == "livestreams" {
        Ok(())
    } else {
        Err(ApiFailure::not_found("Chat"))
    }
}

async fn list_chat(
    State(state): State<AppState>,
    Path((collection, id)): Path<(String, String)>,
) -> Result<Json<Vec<Value>>, ApiFailure> {
    ensure_livestream(&collection)?;
    let db = state.db.read().await;
    let messages = db
        .get(CHAT_COLLECTION)
        .map(|messages| {
            messages
                .iter()
                .filter(|message| field_text(message, "livestreamId").as_deref() == Some(id.as_str()))
                .cloned()
                .collect()
        })
        .unwrap_or_default();
    Ok(Json(messages))
}

#[derive(Deserialize)]
struct ChatInput {
    message: String,
}

async fn post_chat(
    State(state): State<AppState>,
    Path((collection, id)): Path<(String, String)>,
    JsonBody(input): JsonBody<ChatInput>,
) -> Result<(StatusCode, Json<Value>), ApiFailure> {
    ensure_livestream(&collection)?;
    let message = json!({
        "id": Uuid::new_v4().to_string(),
        "livestreamId": id,
        "message": input.message,
    });
    state
        .db
        .write()
        .await
        .entry(CHAT_COLLECTION.to_string())
        .or_default()
        .push(message.clone());
    state.publish("livestream-chat-message".to_string(), message.clone());
    Ok((StatusCode::CREATED, Json(message)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_prefers_id() {
        assert_eq!(identity(&json!({"id": "a", "_id": "b"})).as_deref(), Some("a"));
        assert_eq!(identity(&json!({"_id": "b"})).as_deref(), Some("b"));
        assert_eq!(identity(&json!({"id": 3})).as_deref(), Some("3"));
        assert_eq!(identity(&json!({})), None);
    }

    #[test]
    fn known_collections_have_prefixes() {
        assert_eq!(event_prefix("first-timers").unwrap(), "first-timer");
        assert!(event_prefix("hymns").is_err());
    }

    #[test]
    fn failure_renders_message_body() {
        let response = ApiFailure::not_found("events").into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn publish_reaches_subscribers() {
        let state = AppState::new();
        let mut rx = state.subscribe();
        state.publish("event-created".to_string(), json!({"id": "e1"}));
        let event = rx.recv().await.unwrap();
        assert_eq!(event.name, "event-created");
        assert_eq!(event.payload["id"], "e1");
    }
}
