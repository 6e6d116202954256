use crate::config::Config;
use crate::error::{server_message, ApiError};
use crate::storage::{KeyValueStore, TOKEN_KEY};
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde_json::Value;
use std::rc::Rc;
use url::Url;

#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: Url,
    store: Rc<dyn KeyValueStore>,
}

impl ApiClient {
    pub fn new(config: &Config, store: Rc<dyn KeyValueStore>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: config.api_base_url.clone(),
            store,
        }
    }

    pub fn store(&self) -> &dyn KeyValueStore {
        self.store.as_ref()
    }

    /// Base URL plus one percent-encoded path segment per entry, so an id
    /// never changes which endpoint is hit.
    pub fn endpoint(&self, segments: &[&str]) -> Result<Url, ApiError> {
        if let Some(bad) = segments
            .iter()
            .find(|segment| matches!(segment.trim(), "" | "." | ".."))
        {
            return Err(ApiError::Invalid(format!("Invalid path segment {bad:?}")));
        }
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| ApiError::Unexpected(format!("{} cannot take a path", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// Request without credentials to an already built URL.
    pub fn request(&self, method: Method, url: Url) -> RequestBuilder {
        self.http
            .request(method, url)
            .header(CONTENT_TYPE, "application/json")
    }

    /// Request without credentials, for auth and lookup endpoints.
    pub fn public(&self, method: Method, segments: &[&str]) -> Result<RequestBuilder, ApiError> {
        Ok(self.request(method, self.endpoint(segments)?))
    }

    /// Request carrying the stored bearer token. Fails before touching the
    /// network when no token is stored.
    pub fn authorized(&self, method: Method, segments: &[&str]) -> Result<RequestBuilder, ApiError> {
        let token = self
            .store
            .get(TOKEN_KEY)
            .filter(|token| !token.is_empty())
            .ok_or(ApiError::MissingToken)?;
        Ok(self
            .public(method, segments)?
            .header(AUTHORIZATION, format!("Bearer {token}")))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    pub status: StatusCode,
    pub body: Value,
}

impl ApiResponse {
    pub fn new(status: StatusCode, body: Value) -> Self {
        Self { status, body }
    }

    /// Reads status and body. A body that is not JSON reads as `null`.
    pub async fn read(res: Response) -> Result<Self, ApiError> {
        let status = res.status();
        let bytes = res.bytes().await?;
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        Ok(Self { status, body })
    }

    pub fn into_result(self, fallback: &str) -> Result<Value, ApiError> {
        if self.status.is_success() {
            Ok(self.body)
        } else {
            let message = server_message(&self.body).unwrap_or_else(|| fallback.to_owned());
            Err(ApiError::Status {
                status: self.status,
                message,
            })
        }
    }
}

pub async fn send(request: RequestBuilder) -> Result<ApiResponse, ApiError> {
    ApiResponse::read(request.send().await?).await
}

/// List endpoints answer either with a bare array or with `{ key: [...] }`.
pub fn unwrap_list(body: Value, key: &str) -> Vec<Value> {
    match body {
        Value::Array(values) => values,
        Value::Object(mut map) => match map.remove(key) {
            Some(Value::Array(values)) => values,
            _ => vec![],
        },
        _ => vec![],
    }
}

/// Detail endpoints answer either with the record or with `{ key: {...} }`.
pub fn unwrap_record(body: Value, key: &str) -> Value {
    match body {
        Value::Object(mut map) if map.get(key).map_or(false, Value::is_object) => {
            map.remove(key).unwrap_or(Value::Null)
        }
        body => body,
    }
}
