//! Content-addressed change detection.
//!
//! A document's identity is its URL; its version is the SHA-256 digest of
//! its content. Comparing the fresh digest against the persisted one decides
//! whether any network write happens at all.

use sha2::{Digest, Sha256};

/// How a document relates to the persisted state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    /// No digest recorded for this URL.
    New,
    /// Recorded digest differs from the fresh content.
    Modified,
    /// Digests match; no write needed.
    Unchanged,
}

/// Change decision for one document, carrying the fresh digest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Change {
    pub kind: ChangeKind,
    pub hash: String,
}

impl Change {
    pub fn requires_write(&self) -> bool {
        self.kind != ChangeKind::Unchanged
    }
}

/// Compute the SHA-256 hex digest of content.
pub fn content_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Classify fresh content against the previously recorded digest.
pub fn classify_change(content: &str, prior_hash: Option<&str>) -> Change {
    let hash = content_hash(content);
    let kind = match prior_hash {
        None => ChangeKind::New,
        Some(prior) if prior == hash => ChangeKind::Unchanged,
        Some(_) => ChangeKind::Modified,
    };
    Change { kind, hash }
}
