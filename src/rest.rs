//! Blocking adapter for a Camunda 7 compatible REST engine.
//!
//! Only the two calls the correlation client needs are implemented:
//!
//! - `POST {base}/process-definition/key/{key}/start` with `{"businessKey"}`
//! - `POST {base}/message` with `{"messageName", "businessKey"}`
//!
//! Non-success responses are mapped to [`EngineError`] by
//! [`start_failure`] and [`message_failure`].

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::auth::BearerToken;
use crate::config::EngineConfig;
use crate::engine::{ProcessEngine, ProcessInstanceId};
use crate::error::{EngineError, ProcessError};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Marker the engine puts in its 400 response when no instance waits for a
/// correlated message.
const NO_MATCH_MARKER: &str = "No process definition or execution matches";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct StartRequest<'a> {
    business_key: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct MessageRequest<'a> {
    message_name: &'a str,
    business_key: &'a str,
}

#[derive(Debug, Deserialize)]
struct StartResponse {
    id: String,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    #[serde(default)]
    message: String,
}

/// Process engine reached over HTTP.
///
/// `Clone` is cheap -- the HTTP client and token are shared.
#[derive(Debug, Clone)]
pub struct RestEngine {
    base_url: reqwest::Url,
    http: reqwest::blocking::Client,
    token: BearerToken,
}

impl RestEngine {
    /// Engine at `base_url` (e.g. `http://localhost:8080/engine-rest`) with
    /// no authentication.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Unavailable`] if `base_url` is not a valid
    /// base URL or the HTTP client cannot be built.
    pub fn new(base_url: impl Into<String>) -> Result<Self, EngineError> {
        Self::with_token(base_url, BearerToken::default())
    }

    /// Engine at `base_url` authenticating with `token`.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Unavailable`] if `base_url` is not a valid
    /// base URL or the HTTP client cannot be built.
    pub fn with_token(base_url: impl Into<String>, token: BearerToken) -> Result<Self, EngineError> {
        let raw = base_url.into();
        let base_url = reqwest::Url::parse(raw.trim_end_matches('/'))
            .ok()
            .filter(|url| !url.cannot_be_a_base())
            .ok_or_else(|| EngineError::Unavailable(format!("invalid engine url '{raw}'")))?;
        let http = reqwest::blocking::Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .map_err(|e| EngineError::Unavailable(e.to_string()))?;
        Ok(Self {
            base_url,
            http,
            token,
        })
    }

    /// Engine described by a bindings file's `[engine]` section.
    ///
    /// # Errors
    ///
    /// Returns [`ProcessError::Config`] if the endpoint is not a valid base
    /// URL or the HTTP client cannot be built.
    pub fn from_config(config: &EngineConfig) -> Result<Self, ProcessError> {
        Self::with_token(&config.endpoint, BearerToken::new(config.resolved_token()))
            .map_err(|e| ProcessError::Config(e.to_string()))
    }

    /// Handle to the token, for refreshing it.
    pub fn token(&self) -> &BearerToken {
        &self.token
    }

    fn post<B: Serialize>(
        &self,
        url: reqwest::Url,
        body: &B,
    ) -> Result<reqwest::blocking::Response, EngineError> {
        let mut request = self.http.post(url.clone()).json(body);
        if let Some(value) = self.token.header_value() {
            request = request.header(reqwest::header::AUTHORIZATION, value);
        }
        request.send().map_err(|e| {
            tracing::warn!(url = %url, error = %e, "engine request failed");
            EngineError::Unavailable(e.to_string())
        })
    }
}

impl ProcessEngine for RestEngine {
    fn start_process_instance(
        &self,
        definition_key: &str,
        business_key: &str,
    ) -> Result<ProcessInstanceId, EngineError> {
        let url = start_url(&self.base_url, definition_key);
        let response = self.post(url, &StartRequest { business_key })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(start_failure(status.as_u16(), &body, definition_key));
        }

        let started: StartResponse = response
            .json()
            .map_err(|e| EngineError::Unavailable(format!("malformed start response: {e}")))?;
        Ok(started.id)
    }

    fn correlate_message(&self, message_name: &str, business_key: &str) -> Result<(), EngineError> {
        let url = message_url(&self.base_url);
        let response = self.post(
            url,
            &MessageRequest {
                message_name,
                business_key,
            },
        )?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let body = response.text().unwrap_or_default();
        Err(message_failure(status.as_u16(), &body, business_key))
    }
}

/// Append `segments` to `base_url`, percent-encoding each one.
fn endpoint(base_url: &reqwest::Url, segments: &[&str]) -> reqwest::Url {
    let mut url = base_url.clone();
    // Base URLs are checked for `cannot_be_a_base` at construction.
    if let Ok(mut path) = url.path_segments_mut() {
        path.pop_if_empty().extend(segments);
    }
    url
}

fn start_url(base_url: &reqwest::Url, definition_key: &str) -> reqwest::Url {
    endpoint(base_url, &["process-definition", "key", definition_key, "start"])
}

fn message_url(base_url: &reqwest::Url) -> reqwest::Url {
    endpoint(base_url, &["message"])
}

/// Human-readable reason from an engine error body, falling back to the raw
/// body when it is not the engine's JSON error shape.
fn error_message(body: &str) -> String {
    serde_json::from_str::<ErrorResponse>(body)
        .map(|e| e.message)
        .ok()
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| body.to_owned())
}

/// Map a non-success response to a start request.
pub fn start_failure(status: u16, body: &str, definition_key: &str) -> EngineError {
    match status {
        404 => EngineError::DefinitionNotFound(definition_key.to_owned()),
        400..=499 => EngineError::Rejected(error_message(body)),
        _ => EngineError::Unavailable(format!("status {status}: {}", error_message(body))),
    }
}

/// Map a non-success response to a message correlation.
pub fn message_failure(status: u16, body: &str, business_key: &str) -> EngineError {
    let message = error_message(body);
    match status {
        400 if message.contains(NO_MATCH_MARKER) => EngineError::NoMatchingInstance {
            business_key: business_key.to_owned(),
        },
        400..=499 => EngineError::Rejected(message),
        _ => EngineError::Unavailable(format!("status {status}: {message}")),
    }
}
