//! API client core for the church platform.
//!
//! # Overview
//! Every screen of the web back-office and the mobile app reads and writes
//! data through this crate. It builds `HttpRequest` values and parses
//! `HttpResponse` values; the host executes the round-trip through its
//! `Transport` (host-does-IO pattern), while the client owns deadlines,
//! GET retries and error normalization.
//!
//! # Design
//! - `ApiClient` is stateless: configuration, session and transport only.
//! - Every failure surfaces as an `ApiError` with a user-facing message.
//! - `realtime` keeps cached lists live from push events; `ListController`
//!   is the one generic list screen controller built on top of it.
//! - Records are opaque JSON matched by `resource_id`; `types` offers typed
//!   views over the fields screens read.

pub mod client;
pub mod config;
pub mod controller;
pub mod error;
pub mod export;
pub mod http;
pub mod realtime;
pub mod resource;
pub mod types;
pub mod view;

pub use client::{decode, decode_list, parse_response, ApiClient, Resources};
pub use config::{ClientConfig, Session};
pub use controller::{ListController, ListState};
pub use error::{ApiError, ErrorKind, TransportError};
pub use export::{export_filename, to_csv, Column};
pub use http::{FormPart, HttpMethod, HttpRequest, HttpResponse, MultipartForm, RequestBody, Transport};
pub use realtime::{
    apply_change, Change, ListChange, LocalChannel, PushChannel, PushEvent, Subscription,
};
pub use resource::{resource_id, Record, ResourceKind};
pub use types::{Donation, Event, FirstTimer, Prayer, Sermon};
pub use view::Filter;
