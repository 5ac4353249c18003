//! Resilient request execution for the church API.
//!
//! # Design
//! `ApiClient` holds only its configuration, the session and the host
//! transport; it carries no mutable state between calls. Each call is split
//! into three steps:
//!
//! - `build_*` produces an `HttpRequest` from call-site arguments,
//! - `send` executes it under one deadline for the whole call, retrying GETs
//!   once on network failure with a `backoff × attempt` pause while the
//!   deadline still has time left,
//! - `parse_response` maps the `HttpResponse` to `Option<Value>` or an
//!   `ApiError`.
//!
//! Mutations and multipart uploads are never retried: a retried POST could
//! create the same record twice.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::config::{ClientConfig, Session};
use crate::error::ApiError;
use crate::http::{HttpMethod, HttpRequest, HttpResponse, MultipartForm, RequestBody, Transport};
use crate::resource::ResourceKind;

const JSON_CONTENT_TYPE: &str = "application/json";

/// Stateless client for the church REST API.
#[derive(Debug, Clone)]
pub struct ApiClient<T> {
    config: ClientConfig,
    session: Session,
    transport: T,
}

impl<T: Transport> ApiClient<T> {
    pub fn new(config: ClientConfig, transport: T) -> Self {
        Self {
            config,
            session: Session::anonymous(),
            transport,
        }
    }

    pub fn with_session(mut self, session: Session) -> Self {
        self.session = session;
        self
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    // -----------------------------------------------------------------------
    // Build
    // -----------------------------------------------------------------------

    /// Build a JSON request. The JSON content type is always set.
    pub fn build_request<B>(
        &self,
        method: HttpMethod,
        path: &str,
        body: Option<&B>,
    ) -> Result<HttpRequest, ApiError>
    where
        B: Serialize + ?Sized,
    {
        let body = body
            .map(|body| serde_json::to_string(body).map_err(ApiError::unexpected))
            .transpose()?
            .map(RequestBody::Json);
        let mut headers = vec![("content-type".to_string(), JSON_CONTENT_TYPE.to_string())];
        headers.extend(self.session.authorization());
        Ok(HttpRequest {
            method,
            url: self.url(path),
            headers,
            body,
        })
    }

    /// Build a multipart request. No content type is set: the transport
    /// derives it, boundary included, from the encoded form.
    pub fn build_multipart(&self, method: HttpMethod, path: &str, form: MultipartForm) -> HttpRequest {
        HttpRequest {
            method,
            url: self.url(path),
            headers: self.session.authorization().into_iter().collect(),
            body: Some(RequestBody::Multipart(form)),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.config.base_url)
    }

    // -----------------------------------------------------------------------
    // Execute
    // -----------------------------------------------------------------------

    /// Execute a request and parse its response.
    ///
    /// The configured timeout bounds the whole call, retries included. A GET
    /// that times out is not attempted again: after the backoff the deadline
    /// has already passed, so the call rejects with `ApiError::Timeout`.
    pub async fn send(&self, request: HttpRequest) -> Result<Option<Value>, ApiError> {
        let attempts = if request.method == HttpMethod::Get && !request.is_multipart() {
            self.config.max_get_attempts()
        } else {
            1
        };
        let deadline = Instant::now() + self.config.timeout;

        let mut attempt = 1;
        loop {
            debug!(method = request.method.as_str(), url = %request.url, attempt, "sending request");
            let result = match self.attempt(request.clone(), deadline).await {
                Ok(response) => parse_response(&response),
                Err(err) => Err(err),
            };
            match result {
                Err(err) if attempt < attempts && err.is_retryable() => {
                    let delay = self.config.retry_backoff * attempt;
                    warn!(
                        method = request.method.as_str(),
                        url = %request.url,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = ?err,
                        "request failed before reaching the server, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    if Instant::now() >= deadline {
                        warn!(method = request.method.as_str(), url = %request.url, "deadline passed before retry");
                        return Err(ApiError::Timeout);
                    }
                    attempt += 1;
                }
                Err(err) => {
                    warn!(
                        method = request.method.as_str(),
                        url = %request.url,
                        attempt,
                        error = ?err,
                        "request failed"
                    );
                    return Err(err);
                }
                Ok(value) => return Ok(value),
            }
        }
    }

    async fn attempt(&self, request: HttpRequest, deadline: Instant) -> Result<HttpResponse, ApiError> {
        match tokio::time::timeout_at(deadline, self.transport.execute(request)).await {
            Err(_) => Err(ApiError::Timeout),
            Ok(Err(source)) if source.is_network_failure() => Err(ApiError::Network { source }),
            Ok(Err(source)) => Err(ApiError::unexpected(source)),
            Ok(Ok(response)) => Ok(response),
        }
    }

    // -----------------------------------------------------------------------
    // Verbs
    // -----------------------------------------------------------------------

    pub async fn get(&self, path: &str) -> Result<Option<Value>, ApiError> {
        let request = self.build_request::<Value>(HttpMethod::Get, path, None)?;
        self.send(request).await
    }

    pub async fn post<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<Option<Value>, ApiError> {
        let request = self.build_request(HttpMethod::Post, path, Some(body))?;
        self.send(request).await
    }

    pub async fn put<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<Option<Value>, ApiError> {
        let request = self.build_request(HttpMethod::Put, path, Some(body))?;
        self.send(request).await
    }

    pub async fn patch<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<Option<Value>, ApiError> {
        let request = self.build_request(HttpMethod::Patch, path, Some(body))?;
        self.send(request).await
    }

    pub async fn delete(&self, path: &str) -> Result<Option<Value>, ApiError> {
        let request = self.build_request::<Value>(HttpMethod::Delete, path, None)?;
        self.send(request).await
    }

    pub async fn send_multipart(
        &self,
        method: HttpMethod,
        path: &str,
        form: MultipartForm,
    ) -> Result<Option<Value>, ApiError> {
        self.send(self.build_multipart(method, path, form)).await
    }

    // -----------------------------------------------------------------------
    // Resources
    // -----------------------------------------------------------------------

    pub fn resource(&self, kind: ResourceKind) -> Resources<'_, T> {
        Resources { client: self, kind }
    }

    pub fn events(&self) -> Resources<'_, T> {
        self.resource(ResourceKind::Event)
    }

    pub fn sermons(&self) -> Resources<'_, T> {
        self.resource(ResourceKind::Sermon)
    }

    pub fn donations(&self) -> Resources<'_, T> {
        self.resource(ResourceKind::Donation)
    }

    pub fn prayers(&self) -> Resources<'_, T> {
        self.resource(ResourceKind::Prayer)
    }

    pub fn first_timers(&self) -> Resources<'_, T> {
        self.resource(ResourceKind::FirstTimer)
    }

    pub fn notes(&self) -> Resources<'_, T> {
        self.resource(ResourceKind::Note)
    }

    pub fn friends(&self) -> Resources<'_, T> {
        self.resource(ResourceKind::Friend)
    }

    pub fn devotionals(&self) -> Resources<'_, T> {
        self.resource(ResourceKind::Devotional)
    }

    pub fn gallery(&self) -> Resources<'_, T> {
        self.resource(ResourceKind::Gallery)
    }

    pub fn members(&self) -> Resources<'_, T> {
        self.resource(ResourceKind::Member)
    }

    pub fn livestreams(&self) -> Resources<'_, T> {
        self.resource(ResourceKind::Livestream)
    }

    /// Donations made by one user (`/donations?userId=...`).
    pub async fn donations_for_user(&self, user_id: &str) -> Result<Option<Value>, ApiError> {
        self.get(&format!("{}?userId={user_id}", ResourceKind::Donation.path()))
            .await
    }

    /// Move a prayer request to a new status (`PATCH /prayers/{id}/status`).
    pub async fn set_prayer_status(&self, id: &str, status: &str) -> Result<Option<Value>, ApiError> {
        self.patch(
            &format!("{}/status", ResourceKind::Prayer.item_path(id)),
            &json!({ "status": status }),
        )
        .await
    }

    /// Record first-timer follow-up progress (`PATCH /first-timers/{id}/status`).
    pub async fn set_first_timer_status(&self, id: &str, status: &str) -> Result<Option<Value>, ApiError> {
        self.patch(
            &format!("{}/status", ResourceKind::FirstTimer.item_path(id)),
            &json!({ "status": status }),
        )
        .await
    }

    pub async fn livestream_chat(&self, livestream_id: &str) -> Result<Option<Value>, ApiError> {
        self.get(&format!("{}/chat", ResourceKind::Livestream.item_path(livestream_id)))
            .await
    }

    pub async fn post_livestream_chat(
        &self,
        livestream_id: &str,
        message: &str,
    ) -> Result<Option<Value>, ApiError> {
        self.post(
            &format!("{}/chat", ResourceKind::Livestream.item_path(livestream_id)),
            &json!({ "message": message }),
        )
        .await
    }
}

/// CRUD operations scoped to one resource kind, e.g. `client.events().list()`.
pub struct Resources<'a, T> {
    client: &'a ApiClient<T>,
    kind: ResourceKind,
}

impl<T: Transport> Resources<'_, T> {
    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    pub async fn list(&self) -> Result<Option<Value>, ApiError> {
        self.client.get(&self.kind.path()).await
    }

    /// List and decode into typed records. An empty response is an empty list.
    pub async fn list_as<R: DeserializeOwned>(&self) -> Result<Vec<R>, ApiError> {
        decode_list(self.list().await?)
    }

    pub async fn get(&self, id: &str) -> Result<Option<Value>, ApiError> {
        self.client.get(&self.kind.item_path(id)).await
    }

    pub async fn create<B: Serialize + ?Sized>(&self, data: &B) -> Result<Option<Value>, ApiError> {
        self.client.post(&self.kind.path(), data).await
    }

    pub async fn update<B: Serialize + ?Sized>(&self, id: &str, data: &B) -> Result<Option<Value>, ApiError> {
        self.client.put(&self.kind.item_path(id), data).await
    }

    pub async fn patch<B: Serialize + ?Sized>(&self, id: &str, data: &B) -> Result<Option<Value>, ApiError> {
        self.client.patch(&self.kind.item_path(id), data).await
    }

    pub async fn delete(&self, id: &str) -> Result<Option<Value>, ApiError> {
        self.client.delete(&self.kind.item_path(id)).await
    }

    /// File-bearing create; see `ResourceKind::accepts_multipart`.
    pub async fn create_multipart(&self, form: MultipartForm) -> Result<Option<Value>, ApiError> {
        self.client
            .send_multipart(HttpMethod::Post, &self.kind.path(), form)
            .await
    }

    pub async fn update_multipart(&self, id: &str, form: MultipartForm) -> Result<Option<Value>, ApiError> {
        self.client
            .send_multipart(HttpMethod::Put, &self.kind.item_path(id), form)
            .await
    }
}

// ---------------------------------------------------------------------------
// Parse
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct ErrorBody {
    message: Option<String>,
}

/// Map a response to parsed JSON, `None` for an empty or non-JSON body, or
/// an `ApiError` for a non-2xx status or unparsable JSON.
pub fn parse_response(response: &HttpResponse) -> Result<Option<Value>, ApiError> {
    if !response.is_success() {
        return Err(server_error(response));
    }
    if response.status == 204 || declares_empty(response) || response.body.trim().is_empty() {
        return Ok(None);
    }
    let is_json = response
        .header("content-type")
        .map(is_json_content_type)
        .unwrap_or(false);
    if !is_json {
        return Ok(None);
    }
    serde_json::from_str(&response.body)
        .map(Some)
        .map_err(|source| ApiError::InvalidResponse { source })
}

fn declares_empty(response: &HttpResponse) -> bool {
    response
        .header("content-length")
        .and_then(|length| length.trim().parse::<u64>().ok())
        == Some(0)
}

fn is_json_content_type(content_type: &str) -> bool {
    let essence = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    essence == JSON_CONTENT_TYPE || essence.ends_with("+json")
}

fn server_error(response: &HttpResponse) -> ApiError {
    let message = serde_json::from_str::<ErrorBody>(&response.body)
        .ok()
        .and_then(|body| body.message)
        .filter(|message| !message.trim().is_empty())
        .unwrap_or_else(|| format!("Request failed with status {}", response.status));
    ApiError::Server {
        status: response.status,
        message,
    }
}

/// Decode an optional JSON value into a typed record.
pub fn decode<R: DeserializeOwned>(value: Option<Value>) -> Result<Option<R>, ApiError> {
    value
        .map(|value| serde_json::from_value(value).map_err(|source| ApiError::InvalidResponse { source }))
        .transpose()
}

/// Decode an optional JSON array; `None` decodes to an empty list.
pub fn decode_list<R: DeserializeOwned>(value: Option<Value>) -> Result<Vec<R>, ApiError> {
    Ok(decode::<Vec<R>>(value)?.unwrap_or_default())
}
