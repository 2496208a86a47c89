//! Thin JSON-over-HTTP client shared by the hosting backends.

use reqwest::header::HeaderMap;
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use url::Url;

use crate::error::ProviderError;

const USER_AGENT: &str = concat!("pacsetup/", env!("CARGO_PKG_VERSION"));

/// Page size used when walking list endpoints.
pub(crate) const PER_PAGE: usize = 100;

#[derive(Debug, Clone)]
pub(crate) struct HttpApi {
    client: reqwest::Client,
    base_url: Url,
}

impl HttpApi {
    pub fn new(base_url: &str, headers: HeaderMap) -> Result<Self, ProviderError> {
        let base_url = Url::parse(base_url).map_err(|e| {
            ProviderError::InvalidResponse(format!("invalid API base url '{}': {}", base_url, e))
        })?;
        if base_url.cannot_be_a_base() {
            return Err(ProviderError::InvalidResponse(format!(
                "API base url '{}' cannot carry a path",
                base_url
            )));
        }
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .default_headers(headers)
            .build()?;
        Ok(Self { client, base_url })
    }

    /// Build an endpoint URL; each segment is percent-encoded on its own,
    /// so a segment may contain `/`.
    pub fn url(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty();
            path.extend(segments);
        }
        url
    }

    pub fn request(&self, method: Method, url: Url) -> RequestBuilder {
        self.client.request(method, url)
    }

    /// Send `request`; non-success statuses become errors.
    ///
    /// A 404 becomes [`ProviderError::NotFound`], everything else
    /// [`ProviderError::Api`] carrying the provider's message.
    pub async fn send(&self, request: RequestBuilder) -> Result<Response, ProviderError> {
        let request = request.build()?;
        let method = request.method().to_string();
        let endpoint = request.url().path().to_string();
        let response = self.client.execute(request).await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let message = error_message(&body);
        tracing::debug!(%method, %endpoint, status = status.as_u16(), %message, "API call failed");

        if status == StatusCode::NOT_FOUND {
            return Err(ProviderError::NotFound(endpoint));
        }
        Err(ProviderError::Api {
            method,
            endpoint,
            status: status.as_u16(),
            message,
        })
    }

    pub async fn send_json<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
    ) -> Result<T, ProviderError> {
        let response = self.send(request).await?;
        let endpoint = response.url().path().to_string();
        response.json::<T>().await.map_err(|e| {
            ProviderError::InvalidResponse(format!("failed to decode {}: {}", endpoint, e))
        })
    }
}

/// Map [`ProviderError::NotFound`] to `Ok(None)`.
pub(crate) fn optional<T>(result: Result<T, ProviderError>) -> Result<Option<T>, ProviderError> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(ProviderError::NotFound(_)) => Ok(None),
        Err(e) => Err(e),
    }
}

/// Flatten the provider's error payload into one line.
///
/// Both hosting APIs answer with `message` (string, list or object), and
/// GitHub adds an `errors` list; GitLab sometimes uses `error`.
pub(crate) fn error_message(body: &str) -> String {
    let Ok(json) = serde_json::from_str::<Value>(body) else {
        return body.trim().to_string();
    };

    let mut parts = Vec::new();
    for key in ["message", "error"] {
        match json.get(key) {
            Some(Value::String(s)) => parts.push(s.clone()),
            Some(Value::Null) | None => {}
            Some(other) => parts.push(other.to_string()),
        }
    }
    if let Some(Value::Array(errors)) = json.get("errors") {
        for error in errors {
            match error {
                Value::String(s) => parts.push(s.clone()),
                Value::Object(map) => {
                    if let Some(Value::String(s)) = map.get("message") {
                        parts.push(s.clone());
                    } else if let Some(Value::String(code)) = map.get("code") {
                        parts.push(code.clone());
                    }
                }
                _ => {}
            }
        }
    }

    if parts.is_empty() {
        body.trim().to_string()
    } else {
        parts.join("; ")
    }
}
