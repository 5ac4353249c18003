//! Client configuration and session context.
//!
//! Both are built once at application start and handed to `ApiClient::new`.
//! Nothing here is re-read per request.

use std::time::Duration;

pub const BASE_URL_ENV: &str = "CHURCH_API_URL";
pub const DEFAULT_BASE_URL: &str = "http://localhost:3001/api";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);
pub const DEFAULT_RETRY_BACKOFF: Duration = Duration::from_millis(250);
pub const DEFAULT_GET_ATTEMPTS: u32 = 2;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub base_url: String,
    /// Deadline for one call, retries included.
    pub timeout: Duration,
    /// Multiplied by the attempt number before each GET retry.
    pub retry_backoff: Duration,
    /// Total attempts for a GET, including the first. At most
    /// `DEFAULT_GET_ATTEMPTS`.
    max_get_attempts: u32,
}

impl ClientConfig {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout: DEFAULT_TIMEOUT,
            retry_backoff: DEFAULT_RETRY_BACKOFF,
            max_get_attempts: DEFAULT_GET_ATTEMPTS,
        }
    }

    /// Reads `CHURCH_API_URL`, falling back to the local development API.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let base_url = lookup(BASE_URL_ENV)
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        Self::new(&base_url)
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff = backoff;
        self
    }

    /// Turn the single GET retry on or off.
    pub fn with_get_retry(mut self, enabled: bool) -> Self {
        self.max_get_attempts = if enabled { DEFAULT_GET_ATTEMPTS } else { 1 };
        self
    }

    pub fn max_get_attempts(&self) -> u32 {
        self.max_get_attempts
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_URL)
    }
}

/// Authenticated user context, loaded from storage once by the host.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Session {
    token: Option<String>,
    user_id: Option<String>,
}

impl Session {
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    pub fn user_id(&self) -> Option<&str> {
        self.user_id.as_deref()
    }

    pub(crate) fn authorization(&self) -> Option<(String, String)> {
        self.token
            .as_ref()
            .map(|token| ("authorization".to_string(), format!("Bearer {token}")))
    }
}
