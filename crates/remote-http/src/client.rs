//! REST client for the authoritative remote store.
//!
//! One collection endpoint per entity type:
//! `GET/POST {base}/api/v1/collections/{table}` and
//! `PATCH/DELETE {base}/api/v1/collections/{table}/{id}`.

use std::marker::PhantomData;
use std::time::Duration;

use async_trait::async_trait;
use log::debug;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};

use herdbook_core::records::SyncRecord;
use herdbook_core::sync::{FilterSet, RemoteCollection};
use herdbook_core::RemoteError;

use crate::error::{classify_response_error, transport_error};

/// Default timeout for API requests; the orchestrator treats a timeout like
/// any other per-entry failure.
const DEFAULT_TIMEOUT_SECS: u64 = 30;
const MAX_LOG_BODY_CHARS: usize = 512;

/// Client for the herdbook backend API.
#[derive(Debug, Clone)]
pub struct RemoteStoreClient {
    client: reqwest::Client,
    base_url: String,
    api_token: Option<String>,
}

impl RemoteStoreClient {
    /// Create a new client against the given base URL.
    pub fn new(base_url: &str, api_token: Option<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .build()
            .expect("Failed to build HTTP client");

        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_token,
        }
    }

    /// Build a client from `HERDBOOK_API_URL` / `HERDBOOK_API_TOKEN`.
    /// Returns `None` when no backend is configured.
    pub fn from_env() -> Option<Self> {
        let base_url = std::env::var("HERDBOOK_API_URL")
            .ok()
            .filter(|v| !v.trim().is_empty())?;
        let api_token = std::env::var("HERDBOOK_API_TOKEN")
            .ok()
            .filter(|v| !v.trim().is_empty());
        Some(Self::new(&base_url, api_token))
    }

    /// Typed view over one remote collection.
    pub fn collection<T: SyncRecord>(&self) -> CollectionClient<T> {
        CollectionClient {
            inner: self.clone(),
            _record: PhantomData,
        }
    }

    fn headers(&self) -> Result<HeaderMap, RemoteError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if let Some(token) = &self.api_token {
            let auth_value = HeaderValue::from_str(&format!("Bearer {}", token))
                .map_err(|_| RemoteError::rejected(401, "Invalid access token format"))?;
            headers.insert(AUTHORIZATION, auth_value);
        }
        Ok(headers)
    }

    fn collection_url(&self, table: &str) -> String {
        format!("{}/api/v1/collections/{}", self.base_url, table)
    }

    fn record_url(&self, table: &str, record_id: &str) -> String {
        format!(
            "{}/api/v1/collections/{}/{}",
            self.base_url,
            table,
            urlencoding::encode(record_id)
        )
    }

    fn log_response(status: reqwest::StatusCode, body: &str) {
        if status.is_success() {
            debug!("API response status: {}", status);
            return;
        }
        let mut preview = body.chars().take(MAX_LOG_BODY_CHARS).collect::<String>();
        if body.chars().count() > MAX_LOG_BODY_CHARS {
            preview.push_str("...");
        }
        debug!("API response error ({}): {}", status, preview);
    }

    async fn parse_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, RemoteError> {
        let status = response.status();
        let body = response.text().await.map_err(transport_error)?;
        Self::log_response(status, &body);

        if !status.is_success() {
            return Err(classify_response_error(status.as_u16(), &body));
        }

        serde_json::from_str(&body).map_err(|e| {
            RemoteError::rejected(
                status.as_u16(),
                format!("Failed to parse response: {}", e),
            )
        })
    }

    async fn parse_empty_response(response: reqwest::Response) -> Result<(), RemoteError> {
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let body = response.text().await.map_err(transport_error)?;
        Self::log_response(status, &body);
        Err(classify_response_error(status.as_u16(), &body))
    }
}

/// `RemoteCollection` implementation for one entity type.
pub struct CollectionClient<T> {
    inner: RemoteStoreClient,
    _record: PhantomData<fn() -> T>,
}

impl<T> Clone for CollectionClient<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            _record: PhantomData,
        }
    }
}

#[async_trait]
impl<T: SyncRecord> RemoteCollection<T> for CollectionClient<T> {
    async fn insert(&self, payload: &T) -> Result<T, RemoteError> {
        let url = self.inner.collection_url(T::COLLECTION.table_name());
        let response = self
            .inner
            .client
            .post(&url)
            .headers(self.inner.headers()?)
            .json(payload)
            .send()
            .await
            .map_err(transport_error)?;
        RemoteStoreClient::parse_response(response).await
    }

    async fn update(
        &self,
        record_id: &str,
        patch: &serde_json::Value,
    ) -> Result<T, RemoteError> {
        let url = self.inner.record_url(T::COLLECTION.table_name(), record_id);
        let response = self
            .inner
            .client
            .patch(&url)
            .headers(self.inner.headers()?)
            .json(patch)
            .send()
            .await
            .map_err(transport_error)?;
        RemoteStoreClient::parse_response(response).await
    }

    async fn delete(&self, record_id: &str) -> Result<(), RemoteError> {
        let url = self.inner.record_url(T::COLLECTION.table_name(), record_id);
        let response = self
            .inner
            .client
            .delete(&url)
            .headers(self.inner.headers()?)
            .send()
            .await
            .map_err(transport_error)?;
        RemoteStoreClient::parse_empty_response(response).await
    }

    async fn select_all(&self) -> Result<Vec<T>, RemoteError> {
        let url = self.inner.collection_url(T::COLLECTION.table_name());
        let response = self
            .inner
            .client
            .get(&url)
            .headers(self.inner.headers()?)
            .send()
            .await
            .map_err(transport_error)?;
        RemoteStoreClient::parse_response(response).await
    }

    async fn select_where(&self, filters: &FilterSet) -> Result<Vec<T>, RemoteError> {
        let url = self.inner.collection_url(T::COLLECTION.table_name());
        let query = filters
            .iter()
            .map(|(field, value)| {
                let rendered = match value {
                    serde_json::Value::String(v) => v.clone(),
                    other => other.to_string(),
                };
                (field.clone(), rendered)
            })
            .collect::<Vec<_>>();
        let response = self
            .inner
            .client
            .get(&url)
            .query(&query)
            .headers(self.inner.headers()?)
            .send()
            .await
            .map_err(transport_error)?;
        RemoteStoreClient::parse_response(response).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use herdbook_core::records::Animal;

    #[test]
    fn base_url_trailing_slash_is_trimmed() {
        let client = RemoteStoreClient::new("https://api.example.test/", None);
        assert_eq!(
            client.collection_url("animals"),
            "https://api.example.test/api/v1/collections/animals"
        );
    }

    #[test]
    fn record_ids_are_url_encoded() {
        let client = RemoteStoreClient::new("https://api.example.test", None);
        assert_eq!(
            client.record_url("animals", "a/b c"),
            "https://api.example.test/api/v1/collections/animals/a%2Fb%20c"
        );
    }

    #[test]
    fn typed_collection_view_uses_compile_time_table() {
        let client = RemoteStoreClient::new("https://api.example.test", None);
        let animals: CollectionClient<Animal> = client.collection();
        assert_eq!(
            animals.inner.collection_url(Animal::COLLECTION.table_name()),
            "https://api.example.test/api/v1/collections/animals"
        );
    }
}
