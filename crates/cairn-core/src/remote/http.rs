//! HTTP implementation of the remote store

use std::time::Duration;

use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::{RemotePage, RemoteStore};
use crate::sync::{Collection, SyncError, SyncRecord, SyncResult};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_PAGE_SIZE: usize = 200;

/// JSON-over-HTTP [`RemoteStore`].
///
/// Endpoint layout, per collection:
/// - `GET  /{collection}?updated_since=&page_size=&page_token=`
/// - `PUT  /{collection}/{id}` with the full record body
/// - `DELETE /{collection}/{id}` with a `{"deleted_at": ...}` body
#[derive(Clone)]
pub struct HttpRemote {
    endpoint: String,
    token: String,
    page_size: usize,
    client: reqwest::Client,
}

impl HttpRemote {
    /// Build a remote client against the given base endpoint.
    pub fn new(endpoint: impl Into<String>, token: impl Into<String>) -> SyncResult<Self> {
        let endpoint = normalize_endpoint(endpoint.into())?;
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|error| SyncError::Transient(error.to_string()))?;
        Ok(Self {
            endpoint,
            token: token.into(),
            page_size: DEFAULT_PAGE_SIZE,
            client,
        })
    }

    /// Override the pull page size.
    #[must_use]
    pub const fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    fn collection_url(&self, collection: Collection) -> String {
        format!("{}/{}", self.endpoint, collection.as_str())
    }

    fn record_url(&self, collection: Collection, id: Uuid) -> String {
        format!("{}/{}/{}", self.endpoint, collection.as_str(), id)
    }

    async fn check(response: reqwest::Response) -> SyncResult<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(classify_status(status, &parse_api_error(status, &body)))
    }
}

impl RemoteStore for HttpRemote {
    async fn fetch_updated_since(
        &self,
        collection: Collection,
        since: i64,
        page_token: Option<&str>,
    ) -> SyncResult<RemotePage> {
        let mut request = self
            .client
            .get(self.collection_url(collection))
            .bearer_auth(&self.token)
            .query(&[
                ("updated_since", since.to_string()),
                ("page_size", self.page_size.to_string()),
            ]);
        if let Some(token) = page_token {
            request = request.query(&[("page_token", token)]);
        }

        let response = Self::check(request.send().await.map_err(classify_transport)?).await?;
        let page = response
            .json::<WirePage>()
            .await
            .map_err(classify_transport)?;

        Ok(RemotePage {
            records: page
                .records
                .into_iter()
                .map(|wire| wire.into_record(collection))
                .collect(),
            next_page_token: page.next_page_token,
        })
    }

    async fn upsert(&self, record: &SyncRecord) -> SyncResult<Option<String>> {
        let response = self
            .client
            .put(self.record_url(record.collection, record.id))
            .bearer_auth(&self.token)
            .json(&WireRecord::from(record))
            .send()
            .await
            .map_err(classify_transport)?;
        let response = Self::check(response).await?;

        let body = response
            .json::<WireUpsertResponse>()
            .await
            .unwrap_or_default();
        Ok(body.revision)
    }

    async fn soft_delete(&self, collection: Collection, id: Uuid, deleted_at: i64) -> SyncResult<()> {
        let response = self
            .client
            .delete(self.record_url(collection, id))
            .bearer_auth(&self.token)
            .json(&serde_json::json!({ "deleted_at": deleted_at }))
            .send()
            .await
            .map_err(classify_transport)?;
        // Deleting a record the backend never saw is still a propagated
        // tombstone.
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(());
        }
        Self::check(response).await?;
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct WirePage {
    records: Vec<WireRecord>,
    next_page_token: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireRecord {
    id: Uuid,
    payload: Value,
    created_at: i64,
    updated_at: i64,
    deleted_at: Option<i64>,
    #[serde(default)]
    revision: Option<String>,
}

impl WireRecord {
    fn into_record(self, collection: Collection) -> SyncRecord {
        SyncRecord {
            id: self.id,
            collection,
            payload: self.payload,
            created_at: self.created_at,
            updated_at: self.updated_at,
            deleted_at: self.deleted_at,
            needs_sync: false,
            remote_revision: self.revision,
        }
    }
}

impl From<&SyncRecord> for WireRecord {
    fn from(record: &SyncRecord) -> Self {
        Self {
            id: record.id,
            payload: record.payload.clone(),
            created_at: record.created_at,
            updated_at: record.updated_at,
            deleted_at: record.deleted_at,
            revision: record.remote_revision.clone(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct WireUpsertResponse {
    revision: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: Option<String>,
    message: Option<String>,
}

fn parse_api_error(status: StatusCode, body: &str) -> String {
    if let Ok(payload) = serde_json::from_str::<ApiErrorBody>(body) {
        if let Some(message) = payload.message.or(payload.error) {
            return format!("{} ({})", message.trim(), status.as_u16());
        }
    }

    let trimmed = body.trim();
    if trimmed.is_empty() {
        format!("HTTP {}", status.as_u16())
    } else {
        format!("{} ({})", trimmed, status.as_u16())
    }
}

fn classify_status(status: StatusCode, message: &str) -> SyncError {
    if status == StatusCode::UNAUTHORIZED {
        return SyncError::AuthExpired;
    }
    if status == StatusCode::REQUEST_TIMEOUT
        || status == StatusCode::TOO_MANY_REQUESTS
        || status.is_server_error()
    {
        return SyncError::Transient(message.to_string());
    }
    SyncError::Rejected(message.to_string())
}

fn classify_transport(error: reqwest::Error) -> SyncError {
    if let Some(status) = error.status() {
        return classify_status(status, &error.to_string());
    }
    // Timeouts, DNS and connection failures are worth retrying; anything
    // else (builder, body decode) is not.
    if error.is_timeout() || error.is_connect() || error.is_request() {
        SyncError::Transient(error.to_string())
    } else {
        SyncError::Rejected(error.to_string())
    }
}

fn normalize_endpoint(raw: String) -> SyncResult<String> {
    let endpoint = raw.trim();
    if endpoint.is_empty() {
        return Err(SyncError::Rejected(
            "endpoint must not be empty".to_string(),
        ));
    }
    if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
        Ok(endpoint.trim_end_matches('/').to_string())
    } else {
        Err(SyncError::Rejected(
            "endpoint must include http:// or https://".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn normalize_endpoint_rejects_invalid_values() {
        assert!(normalize_endpoint(String::new()).is_err());
        assert!(normalize_endpoint("api.example.com".to_string()).is_err());
        assert_eq!(
            normalize_endpoint("https://api.example.com/v1/".to_string()).unwrap(),
            "https://api.example.com/v1"
        );
    }

    #[test]
    fn status_classification_matches_retry_policy() {
        assert!(matches!(
            classify_status(StatusCode::UNAUTHORIZED, "expired"),
            SyncError::AuthExpired
        ));
        assert!(classify_status(StatusCode::TOO_MANY_REQUESTS, "slow down").is_retryable());
        assert!(classify_status(StatusCode::BAD_GATEWAY, "upstream").is_retryable());
        assert!(!classify_status(StatusCode::UNPROCESSABLE_ENTITY, "bad payload").is_retryable());
    }

    #[test]
    fn parse_api_error_prefers_structured_message() {
        assert_eq!(
            parse_api_error(
                StatusCode::UNPROCESSABLE_ENTITY,
                r#"{"message": "grade required"}"#
            ),
            "grade required (422)"
        );
        assert_eq!(
            parse_api_error(StatusCode::BAD_GATEWAY, ""),
            "HTTP 502"
        );
        assert_eq!(
            parse_api_error(StatusCode::BAD_REQUEST, "plain text"),
            "plain text (400)"
        );
    }

    #[test]
    fn wire_record_round_trip_keeps_sync_metadata_clean() {
        let record = SyncRecord::new(
            Collection::Entries,
            Uuid::now_v7(),
            serde_json::json!({"route": "Action Directe"}),
            1_000,
        );
        let decoded = WireRecord::from(&record).into_record(Collection::Entries);
        assert_eq!(decoded.id, record.id);
        assert_eq!(decoded.payload, record.payload);
        assert!(!decoded.needs_sync);
    }
}
