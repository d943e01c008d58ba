//! Core domain types for the kbsync engine.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Routing strategy
// ---------------------------------------------------------------------------

/// Policy choosing which destination(s) receive a changed document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoutingStrategy {
    /// Only the first configured, currently-available target.
    Primary,
    /// Every available target, each receiving an independent write.
    All,
    /// A single target chosen by a run-scoped rotation counter.
    RoundRobin,
}

impl std::str::FromStr for RoutingStrategy {
    type Err = crate::error::KbSyncError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "primary" => Ok(Self::Primary),
            "all" => Ok(Self::All),
            "round_robin" | "roundrobin" => Ok(Self::RoundRobin),
            other => Err(crate::error::KbSyncError::config(format!(
                "unknown routing strategy: {other} (expected primary, all, or round_robin)"
            ))),
        }
    }
}

impl std::fmt::Display for RoutingStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Primary => "primary",
            Self::All => "all",
            Self::RoundRobin => "round_robin",
        };
        write!(f, "{name}")
    }
}

// ---------------------------------------------------------------------------
// Destination targets
// ---------------------------------------------------------------------------

/// Processing settings a destination already has configured.
///
/// Read once from the destination at the start of a run and forwarded on
/// create; the engine never invents these values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessingConfig {
    pub segmentation_mode: String,
    pub indexing_mode: String,
    pub retrieval_mode: String,
}

/// One configured remote knowledge-base destination, constructed at the
/// start of a run and discarded at the end.
#[derive(Debug, Clone)]
pub struct KnowledgeBaseTarget {
    /// Destination identifier (dataset id on the remote service).
    pub id: String,
    /// Cleared when a target-fatal error or exhausted probe drops the target.
    pub available: bool,
    /// Cached per-run processing settings.
    pub processing: Option<ProcessingConfig>,
    /// Last error observed against this target.
    pub last_error: Option<String>,
}

impl KnowledgeBaseTarget {
    /// A target that has passed its availability probe.
    pub fn available(id: impl Into<String>, processing: ProcessingConfig) -> Self {
        Self {
            id: id.into(),
            available: true,
            processing: Some(processing),
            last_error: None,
        }
    }

    /// A target dropped for the rest of the run.
    pub fn unavailable(id: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            available: false,
            processing: None,
            last_error: Some(error.into()),
        }
    }

    /// Mark this target unavailable after a target-fatal error mid-run.
    pub fn mark_unavailable(&mut self, error: impl Into<String>) {
        self.available = false;
        self.last_error = Some(error.into());
    }
}

// ---------------------------------------------------------------------------
// Documents & metadata
// ---------------------------------------------------------------------------

/// Document type derived from URL and content signals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocType {
    /// Task-oriented content: steps, commands, configuration, deployment.
    Operation,
    /// Conceptual content: introductions, architecture, product overviews.
    Overview,
}

impl std::fmt::Display for DocType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Operation => write!(f, "operation"),
            Self::Overview => write!(f, "overview"),
        }
    }
}

/// Difficulty tier, ordered basic < intermediate < advanced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DifficultyTier {
    Basic,
    Intermediate,
    Advanced,
}

/// Classified document metadata, tagged by document type.
///
/// The tag is part of the serialized form sent to the catalog service, so a
/// destination can filter on `doc_type` directly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "doc_type", rename_all = "snake_case")]
pub enum DocMetadata {
    Operation {
        category: String,
        keywords: Vec<String>,
        difficulty: DifficultyTier,
    },
    Overview {
        category: String,
        keywords: Vec<String>,
        difficulty: DifficultyTier,
    },
}

impl DocMetadata {
    /// Build metadata for the given type, validating at construction.
    pub fn new(
        doc_type: DocType,
        category: impl Into<String>,
        keywords: Vec<String>,
        difficulty: DifficultyTier,
    ) -> Self {
        let category = {
            let c = category.into();
            if c.is_empty() { "general".into() } else { c }
        };
        match doc_type {
            DocType::Operation => Self::Operation {
                category,
                keywords,
                difficulty,
            },
            DocType::Overview => Self::Overview {
                category,
                keywords,
                difficulty,
            },
        }
    }

    pub fn doc_type(&self) -> DocType {
        match self {
            Self::Operation { .. } => DocType::Operation,
            Self::Overview { .. } => DocType::Overview,
        }
    }

    pub fn category(&self) -> &str {
        match self {
            Self::Operation { category, .. } | Self::Overview { category, .. } => category,
        }
    }

    pub fn keywords(&self) -> &[String] {
        match self {
            Self::Operation { keywords, .. } | Self::Overview { keywords, .. } => keywords,
        }
    }

    pub fn difficulty(&self) -> DifficultyTier {
        match self {
            Self::Operation { difficulty, .. } | Self::Overview { difficulty, .. } => *difficulty,
        }
    }
}

/// A document assembled fresh each run from fetcher output.
///
/// Never persisted directly — only its `url` and `hash` survive the run.
#[derive(Debug, Clone)]
pub struct Document {
    /// Stable identifier (the page URL).
    pub url: String,
    /// Human-readable name derived from the URL, used as the remote lookup key.
    pub title: String,
    /// Text body.
    pub content: String,
    /// SHA-256 digest of the content.
    pub hash: String,
    /// Classified metadata.
    pub metadata: DocMetadata,
    /// When this run observed the document.
    pub observed_at: DateTime<Utc>,
}

/// Raw (url, content) pair produced by the external fetcher.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceDocument {
    pub url: String,
    pub content: String,
}

// ---------------------------------------------------------------------------
// Run results
// ---------------------------------------------------------------------------

/// What happened to one (document, target) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncAction {
    Created,
    Updated,
    Skipped,
    Failed,
}

impl std::fmt::Display for SyncAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Created => write!(f, "created"),
            Self::Updated => write!(f, "updated"),
            Self::Skipped => write!(f, "skipped"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// One per (document, target) pair; aggregated into the run summary.
#[derive(Debug, Clone, Serialize)]
pub struct SyncResult {
    pub url: String,
    pub target_id: String,
    pub action: SyncAction,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub doc_type: Option<DocType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SyncResult {
    pub fn success(&self) -> bool {
        self.action != SyncAction::Failed
    }
}

/// Per-action counters, persisted as part of the state file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryCounts {
    pub created: usize,
    pub updated: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// Aggregate outcome of one run, returned to the caller and logged.
#[derive(Debug)]
pub struct RunSummary {
    /// Time-sortable run identifier.
    pub run_id: Uuid,
    pub counts: SummaryCounts,
    /// Total elapsed time for the run.
    pub elapsed: Duration,
    /// Per-(document, target) results in processing order.
    pub results: Vec<SyncResult>,
    /// Set when the run aborted before processing all documents.
    pub fatal: Option<String>,
}

impl RunSummary {
    /// Whether the run completed all documents (partial per-document
    /// failures still count as an overall success).
    pub fn is_success(&self) -> bool {
        self.fatal.is_none()
    }
}

// ---------------------------------------------------------------------------
// Persistent state
// ---------------------------------------------------------------------------

/// The only persistent entity: url→digest mapping plus run metadata.
///
/// Invariant: every key in `hashes` was produced by a successful
/// create-or-update against at least one destination in some past run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncState {
    pub hashes: BTreeMap<String, String>,
    pub last_update: DateTime<Utc>,
    pub total_documents: usize,
    #[serde(default)]
    pub last_summary: SummaryCounts,
}

impl Default for SyncState {
    fn default() -> Self {
        Self {
            hashes: BTreeMap::new(),
            last_update: Utc::now(),
            total_documents: 0,
            last_summary: SummaryCounts::default(),
        }
    }
}
