//! Transports shared by the integration tests.
//!
//! `ScriptedTransport` replays a fixed sequence of outcomes and records every
//! request it sees. `UreqTransport` executes requests over real HTTP with
//! ureq, returning 4xx/5xx responses as data.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::io::ErrorKind as IoErrorKind;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use church_core::{
    FormPart, HttpMethod, HttpRequest, HttpResponse, MultipartForm, RequestBody, Transport,
    TransportError,
};

pub enum Step {
    Respond(HttpResponse),
    Fail(TransportError),
    /// Responds once the delay has elapsed.
    Delay(Duration, HttpResponse),
    /// Never completes; only the client's deadline ends the attempt.
    Hang,
}

#[derive(Default)]
pub struct ScriptedTransport {
    steps: Mutex<VecDeque<Step>>,
    calls: Mutex<Vec<HttpRequest>>,
}

impl ScriptedTransport {
    pub fn new(steps: Vec<Step>) -> Self {
        Self {
            steps: Mutex::new(steps.into()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<HttpRequest> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        self.calls.lock().unwrap().push(request);
        let step = self.steps.lock().unwrap().pop_front();
        match step {
            Some(Step::Respond(response)) => Ok(response),
            Some(Step::Fail(err)) => Err(err),
            Some(Step::Delay(delay, response)) => {
                tokio::time::sleep(delay).await;
                Ok(response)
            }
            Some(Step::Hang) | None => std::future::pending().await,
        }
    }
}

pub fn json_response(status: u16, body: &str) -> HttpResponse {
    HttpResponse {
        status,
        headers: vec![("content-type".to_string(), "application/json".to_string())],
        body: body.to_string(),
    }
}

pub fn refused() -> TransportError {
    TransportError::ConnectionRefused("127.0.0.1:3001".to_string())
}

// ---------------------------------------------------------------------------
// ureq
// ---------------------------------------------------------------------------

const BOUNDARY: &str = "church-core-test-boundary";

pub struct UreqTransport {
    agent: ureq::Agent,
}

impl UreqTransport {
    pub fn new() -> Self {
        let agent = ureq::Agent::config_builder()
            .http_status_as_error(false)
            .build()
            .new_agent();
        Self { agent }
    }
}

#[async_trait]
impl Transport for UreqTransport {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        let agent = self.agent.clone();
        tokio::task::spawn_blocking(move || execute_blocking(&agent, request))
            .await
            .map_err(|err| TransportError::Other(err.to_string()))?
    }
}

fn with_headers<B>(
    mut builder: ureq::RequestBuilder<B>,
    headers: &[(String, String)],
) -> ureq::RequestBuilder<B> {
    for (key, value) in headers {
        builder = builder.header(key.as_str(), value.as_str());
    }
    builder
}

fn execute_blocking(agent: &ureq::Agent, req: HttpRequest) -> Result<HttpResponse, TransportError> {
    let mut headers = req.headers.clone();
    let body: Option<Vec<u8>> = match req.body {
        None => None,
        Some(RequestBody::Json(text)) => Some(text.into_bytes()),
        Some(RequestBody::Multipart(form)) => {
            headers.push((
                "content-type".to_string(),
                format!("multipart/form-data; boundary={BOUNDARY}"),
            ));
            Some(encode_multipart(&form))
        }
    };

    let result = match (req.method, body) {
        (HttpMethod::Get, _) => with_headers(agent.get(&req.url), &headers).call(),
        (HttpMethod::Delete, _) => with_headers(agent.delete(&req.url), &headers).call(),
        (HttpMethod::Post, Some(body)) => with_headers(agent.post(&req.url), &headers).send(&body[..]),
        (HttpMethod::Post, None) => with_headers(agent.post(&req.url), &headers).send_empty(),
        (HttpMethod::Put, Some(body)) => with_headers(agent.put(&req.url), &headers).send(&body[..]),
        (HttpMethod::Put, None) => with_headers(agent.put(&req.url), &headers).send_empty(),
        (HttpMethod::Patch, Some(body)) => with_headers(agent.patch(&req.url), &headers).send(&body[..]),
        (HttpMethod::Patch, None) => with_headers(agent.patch(&req.url), &headers).send_empty(),
    };

    let mut response = result.map_err(|err| match err {
        ureq::Error::Io(io) if io.kind() == IoErrorKind::ConnectionRefused => {
            TransportError::ConnectionRefused(io.to_string())
        }
        ureq::Error::HostNotFound => TransportError::Dns(req.url.clone()),
        other => TransportError::Other(other.to_string()),
    })?;

    let status = response.status().as_u16();
    let headers = response
        .headers()
        .iter()
        .map(|(name, value)| {
            (
                name.as_str().to_string(),
                value.to_str().unwrap_or_default().to_string(),
            )
        })
        .collect();
    let body = response.body_mut().read_to_string().unwrap_or_default();

    Ok(HttpResponse {
        status,
        headers,
        body,
    })
}

fn encode_multipart(form: &MultipartForm) -> Vec<u8> {
    let mut out = Vec::new();
    for part in &form.parts {
        out.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        match part {
            FormPart::Text { name, value } => {
                out.extend_from_slice(
                    format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n").as_bytes(),
                );
                out.extend_from_slice(value.as_bytes());
            }
            FormPart::File {
                name,
                filename,
                content_type,
                data,
            } => {
                out.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{name}\"; filename=\"{filename}\"\r\n\
                         Content-Type: {content_type}\r\n\r\n"
                    )
                    .as_bytes(),
                );
                out.extend_from_slice(data);
            }
        }
        out.extend_from_slice(b"\r\n");
    }
    out.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    out
}
