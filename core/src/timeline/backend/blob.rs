//! HTTP key-value blob store backend

use std::time::Duration;

use async_trait::async_trait;
use chronicle_types::TimelineDocument;
use reqwest::{Client, RequestBuilder, Response, StatusCode};

use super::PersistenceBackend;
use crate::timeline::error::TimelineError;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Stores the whole document as one JSON value at `{base}/{namespace}/{key}`
pub struct BlobBackend {
    client: Client,
    url: String,
    token: String,
}

impl BlobBackend {
    pub fn new(
        base_url: &str,
        namespace: &str,
        key: &str,
        token: &str,
    ) -> Result<Self, TimelineError> {
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            client,
            url: blob_url(base_url, namespace, key),
            token: token.to_string(),
        })
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        if self.token.is_empty() {
            request
        } else {
            request.bearer_auth(&self.token)
        }
    }
}

fn blob_url(base_url: &str, namespace: &str, key: &str) -> String {
    format!(
        "{}/{}/{}",
        base_url.trim_end_matches('/'),
        namespace.trim_matches('/'),
        key.trim_start_matches('/')
    )
}

async fn status_error(response: Response) -> TimelineError {
    let status = response.status().as_u16();
    let message = response.text().await.unwrap_or_default();
    TimelineError::BlobStatus { status, message }
}

#[async_trait]
impl PersistenceBackend for BlobBackend {
    fn name(&self) -> &'static str {
        "blob"
    }

    async fn load(&self) -> Result<TimelineDocument, TimelineError> {
        let response = self.authorized(self.client.get(&self.url)).send().await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(TimelineError::NotFound);
        }
        if !response.status().is_success() {
            return Err(status_error(response).await);
        }

        let body = response.bytes().await?;
        Ok(serde_json::from_slice(&body)?)
    }

    async fn store(&self, document: &TimelineDocument) -> Result<(), TimelineError> {
        let response = self
            .authorized(self.client.put(&self.url))
            .json(document)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(status_error(response).await);
        }
        tracing::debug!(url = %self.url, entries = document.timeline.len(), "Stored timeline blob");
        Ok(())
    }
}
