//! HTTP client for the remote knowledge-base catalog service.
//!
//! Speaks the dataset/document REST surface: an availability probe via the
//! dataset's process rule, keyword lookup of documents by name, and text
//! create/update/delete. Every response is mapped onto [`KbSyncError`] so the
//! caller can branch on [`severity`](KbSyncError::severity) alone.

pub mod retry;

use std::time::Duration;

use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use tracing::{debug, instrument};

use kbsync_shared::{DocMetadata, KbSyncError, ProcessingConfig, Result};

pub use retry::{RetryExecutor, RetryPolicy, Sleeper, TokioSleeper};

/// User-Agent string for catalog requests.
const USER_AGENT: &str = concat!("kbsync/", env!("CARGO_PKG_VERSION"));

/// Page size for document lookups by name.
const LOOKUP_PAGE_LIMIT: &str = "20";

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct ProcessRuleResponse {
    #[serde(default = "default_segmentation")]
    mode: String,
    #[serde(default = "default_indexing")]
    indexing_technique: String,
    #[serde(default)]
    retrieval_model: Option<RetrievalModel>,
}

#[derive(Debug, Deserialize)]
struct RetrievalModel {
    search_method: String,
}

fn default_segmentation() -> String {
    "automatic".into()
}
fn default_indexing() -> String {
    "high_quality".into()
}

#[derive(Debug, Deserialize)]
struct DocumentListResponse {
    #[serde(default)]
    data: Vec<DocumentEntry>,
}

#[derive(Debug, Deserialize)]
struct DocumentEntry {
    id: String,
    name: String,
}

#[derive(Debug, Deserialize)]
struct DocumentEnvelope {
    document: DocumentRef,
}

#[derive(Debug, Deserialize)]
struct DocumentRef {
    id: String,
}

// ---------------------------------------------------------------------------
// CatalogClient
// ---------------------------------------------------------------------------

/// Client for one catalog service endpoint, shared across all targets.
pub struct CatalogClient {
    client: Client,
    base_url: String,
    api_key: String,
}

impl CatalogClient {
    /// Create a new client for the given endpoint and bearer credential.
    pub fn new(base_url: &str, api_key: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|e| KbSyncError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        })
    }

    /// Fetch the processing settings of a dataset.
    ///
    /// Doubles as the per-run availability probe: a target-fatal or exhausted
    /// retryable error here drops the target for the rest of the run.
    #[instrument(skip_all, fields(kb = %kb_id))]
    pub async fn get_processing_config(&self, kb_id: &str) -> Result<ProcessingConfig> {
        let url = format!("{}/datasets/{kb_id}/process-rule", self.base_url);
        let response = self.send(kb_id, self.client.get(&url)).await?;

        let rule: ProcessRuleResponse = parse_body(response).await?;

        Ok(ProcessingConfig {
            segmentation_mode: rule.mode,
            indexing_mode: rule.indexing_technique,
            retrieval_mode: rule
                .retrieval_model
                .map(|m| m.search_method)
                .unwrap_or_else(|| "semantic_search".into()),
        })
    }

    /// Look up a document id by exact name.
    ///
    /// The service matches keywords loosely, so the returned page is filtered
    /// down to an exact name match. `None` means the document does not exist
    /// on this target yet.
    #[instrument(skip_all, fields(kb = %kb_id, name = %name))]
    pub async fn find_document_by_name(&self, kb_id: &str, name: &str) -> Result<Option<String>> {
        let url = format!("{}/datasets/{kb_id}/documents", self.base_url);
        let request = self.client.get(&url).query(&[
            ("keyword", name),
            ("page", "1"),
            ("limit", LOOKUP_PAGE_LIMIT),
        ]);

        let response = self.send(kb_id, request).await?;
        let list: DocumentListResponse = parse_body(response).await?;

        let id = list
            .data
            .into_iter()
            .find(|entry| entry.name == name)
            .map(|entry| entry.id);

        debug!(found = id.is_some(), "document lookup");
        Ok(id)
    }

    /// Create a document from text, forwarding the dataset's own processing
    /// settings. Returns the new document id.
    #[instrument(skip_all, fields(kb = %kb_id, name = %name))]
    pub async fn create_document(
        &self,
        kb_id: &str,
        name: &str,
        text: &str,
        metadata: &DocMetadata,
        processing: &ProcessingConfig,
    ) -> Result<String> {
        let url = format!("{}/datasets/{kb_id}/document/create_by_text", self.base_url);
        let body = serde_json::json!({
            "name": name,
            "text": text,
            "indexing_technique": processing.indexing_mode,
            "process_rule": { "mode": processing.segmentation_mode },
            "doc_metadata": metadata,
        });

        let response = self.send(kb_id, self.client.post(&url).json(&body)).await?;
        let envelope: DocumentEnvelope = parse_body(response).await?;

        debug!(document_id = %envelope.document.id, "document created");
        Ok(envelope.document.id)
    }

    /// Replace an existing document's text and metadata.
    #[instrument(skip_all, fields(kb = %kb_id, document_id = %document_id))]
    pub async fn update_document(
        &self,
        kb_id: &str,
        document_id: &str,
        name: &str,
        text: &str,
        metadata: &DocMetadata,
    ) -> Result<()> {
        let url = format!(
            "{}/datasets/{kb_id}/documents/{document_id}/update_by_text",
            self.base_url
        );
        let body = serde_json::json!({
            "name": name,
            "text": text,
            "doc_metadata": metadata,
        });

        self.send(kb_id, self.client.post(&url).json(&body)).await?;
        debug!("document updated");
        Ok(())
    }

    /// Remove a document from a dataset.
    #[instrument(skip_all, fields(kb = %kb_id, document_id = %document_id))]
    pub async fn delete_document(&self, kb_id: &str, document_id: &str) -> Result<()> {
        let url = format!(
            "{}/datasets/{kb_id}/documents/{document_id}",
            self.base_url
        );
        self.send(kb_id, self.client.delete(&url)).await?;
        debug!("document deleted");
        Ok(())
    }

    /// Attach the bearer credential, send, and map failures onto the error
    /// taxonomy.
    async fn send(&self, target: &str, request: reqwest::RequestBuilder) -> Result<Response> {
        let response = request
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(|e| KbSyncError::Network(e.to_string()))?;

        check_status(target, response).await
    }
}

/// Map non-success statuses onto the severity-bearing error variants.
async fn check_status(target: &str, response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let message = body_excerpt(response).await;

    Err(match status {
        StatusCode::UNAUTHORIZED => KbSyncError::Unauthorized { message },
        StatusCode::FORBIDDEN => KbSyncError::Forbidden {
            target: target.to_string(),
            message,
        },
        StatusCode::NOT_FOUND => KbSyncError::MissingResource {
            target: target.to_string(),
            message,
        },
        StatusCode::TOO_MANY_REQUESTS => KbSyncError::Server {
            status: status.as_u16(),
            message,
        },
        s if s.is_server_error() => KbSyncError::Server {
            status: status.as_u16(),
            message,
        },
        s => KbSyncError::Api {
            status: s.as_u16(),
            message,
        },
    })
}

/// First part of an error body, enough to log without dumping whole pages.
async fn body_excerpt(response: Response) -> String {
    match response.text().await {
        Ok(text) if !text.is_empty() => text.chars().take(200).collect(),
        _ => "(no response body)".into(),
    }
}

async fn parse_body<T: serde::de::DeserializeOwned>(response: Response) -> Result<T> {
    let text = response
        .text()
        .await
        .map_err(|e| KbSyncError::Network(e.to_string()))?;

    serde_json::from_str(&text)
        .map_err(|e| KbSyncError::parse(format!("unexpected catalog response: {e}")))
}
