//! The sync run orchestrator.
//!
//! One run: load state, probe every configured destination, classify and
//! diff the fetched documents, route changed ones to targets, and commit the
//! accumulated state atomically at the end. A credential rejection aborts the
//! remaining documents; everything accumulated before the abort is still
//! committed so the next run does not redo finished work.

use std::time::Instant;

use chrono::Utc;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use kbsync_catalog::{CatalogClient, RetryExecutor, RetryPolicy};
use kbsync_classify::classify;
use kbsync_shared::{
    Document, KnowledgeBaseTarget, Result, RunSummary, Severity, SourceDocument, SummaryCounts,
    SyncAction, SyncConfig, SyncResult,
};
use kbsync_state::StateStore;

use crate::detect;
use crate::router::Router;

/// Target id recorded when a document could not be routed anywhere.
const NO_TARGET: &str = "(none)";

/// Drives complete sync runs against the configured destinations.
pub struct SyncEngine {
    config: SyncConfig,
    client: CatalogClient,
    retry: RetryExecutor,
}

impl SyncEngine {
    pub fn new(config: SyncConfig) -> Result<Self> {
        let client = CatalogClient::new(
            &config.api_base_url,
            &config.api_key,
            config.request_timeout,
        )?;
        let retry = RetryExecutor::new(RetryPolicy::new(config.max_attempts, config.base_delay));

        Ok(Self {
            config,
            client,
            retry,
        })
    }

    /// Run one full synchronization pass over the fetched documents.
    ///
    /// Per-document and per-target failures are recorded and do not stop the
    /// run; only a credential rejection does. The returned summary carries
    /// `fatal` when the run aborted early.
    #[instrument(skip_all, fields(documents = sources.len(), strategy = %self.config.strategy))]
    pub async fn run(&self, sources: &[SourceDocument]) -> Result<RunSummary> {
        let started = Instant::now();
        let run_id = Uuid::now_v7();
        let store = StateStore::new(&self.config.state_file);
        let mut state = store.load()?;

        let mut results: Vec<SyncResult> = Vec::new();
        let mut fatal: Option<String> = None;

        let mut targets = self.probe_targets(&mut fatal).await;
        if fatal.is_none() && targets.iter().all(|t| !t.available) {
            fatal = Some("no knowledge-base target is available".into());
            error!("all configured targets failed their availability probe");
        }

        if fatal.is_none() {
            let documents = build_documents(sources);
            let mut router = Router::new(self.config.strategy);

            'documents: for document in &documents {
                let prior = state.hashes.get(&document.url).map(String::as_str);
                let change = detect::classify_change(&document.content, prior);

                if !change.requires_write() {
                    debug!(url = %document.url, "unchanged, skipping");
                    for idx in router.peek(&targets) {
                        results.push(SyncResult {
                            url: document.url.clone(),
                            target_id: targets[idx].id.clone(),
                            action: SyncAction::Skipped,
                            doc_type: Some(document.metadata.doc_type()),
                            error: None,
                        });
                    }
                    continue;
                }

                let selected = router.select(&targets);
                if selected.is_empty() {
                    warn!(url = %document.url, "no available target for changed document");
                    results.push(SyncResult {
                        url: document.url.clone(),
                        target_id: NO_TARGET.into(),
                        action: SyncAction::Failed,
                        doc_type: Some(document.metadata.doc_type()),
                        error: Some("no available knowledge-base target".into()),
                    });
                    continue;
                }

                // The fresh hash is recorded once per document, on the first
                // successful write; later target failures do not revoke it.
                let mut hash_recorded = false;

                for idx in selected {
                    match self.sync_to_target(document, &targets[idx]).await {
                        Ok(action) => {
                            results.push(SyncResult {
                                url: document.url.clone(),
                                target_id: targets[idx].id.clone(),
                                action,
                                doc_type: Some(document.metadata.doc_type()),
                                error: None,
                            });
                            if !hash_recorded {
                                state
                                    .hashes
                                    .insert(document.url.clone(), change.hash.clone());
                                hash_recorded = true;
                            }
                        }
                        Err(err) => {
                            let message = err.to_string();
                            results.push(SyncResult {
                                url: document.url.clone(),
                                target_id: targets[idx].id.clone(),
                                action: SyncAction::Failed,
                                doc_type: Some(document.metadata.doc_type()),
                                error: Some(message.clone()),
                            });

                            match err.severity() {
                                Severity::Fatal => {
                                    error!(url = %document.url, error = %message, "fatal error, aborting run");
                                    fatal = Some(message);
                                    break 'documents;
                                }
                                Severity::TargetFatal => {
                                    warn!(
                                        target = %targets[idx].id,
                                        error = %message,
                                        "dropping target for the rest of the run"
                                    );
                                    targets[idx].mark_unavailable(message);
                                }
                                _ => {
                                    warn!(url = %document.url, target = %targets[idx].id, error = %message, "sync failed");
                                }
                            }
                        }
                    }
                }
            }
        }

        let counts = tally(&results);
        state.last_update = Utc::now();
        state.total_documents = state.hashes.len();
        state.last_summary = counts;
        store.save(&state)?;

        let summary = RunSummary {
            run_id,
            counts,
            elapsed: started.elapsed(),
            results,
            fatal,
        };
        info!(
            run_id = %summary.run_id,
            created = counts.created,
            updated = counts.updated,
            skipped = counts.skipped,
            failed = counts.failed,
            aborted = !summary.is_success(),
            "run finished"
        );
        Ok(summary)
    }

    /// Probe each configured destination once; unreachable or unauthorized
    /// destinations start the run unavailable. A credential rejection stops
    /// probing entirely.
    async fn probe_targets(&self, fatal: &mut Option<String>) -> Vec<KnowledgeBaseTarget> {
        let mut targets = Vec::with_capacity(self.config.knowledge_bases.len());

        for kb_id in &self.config.knowledge_bases {
            let probe = self
                .retry
                .execute("probe", || self.client.get_processing_config(kb_id))
                .await;

            match probe {
                Ok(processing) => {
                    debug!(target = %kb_id, "target available");
                    targets.push(KnowledgeBaseTarget::available(kb_id, processing));
                }
                Err(err) if err.severity() == Severity::Fatal => {
                    error!(target = %kb_id, error = %err, "credential rejected during probe");
                    *fatal = Some(err.to_string());
                    return targets;
                }
                Err(err) => {
                    warn!(target = %kb_id, error = %err, "target unavailable");
                    targets.push(KnowledgeBaseTarget::unavailable(kb_id, err.to_string()));
                }
            }
        }

        targets
    }

    /// Create or update one document on one target, depending on whether the
    /// target already holds a document with the same name.
    async fn sync_to_target(
        &self,
        document: &Document,
        target: &KnowledgeBaseTarget,
    ) -> Result<SyncAction> {
        let existing = self
            .retry
            .execute("find_document", || {
                self.client
                    .find_document_by_name(&target.id, &document.title)
            })
            .await?;

        match existing {
            Some(document_id) => {
                self.retry
                    .execute("update_document", || {
                        self.client.update_document(
                            &target.id,
                            &document_id,
                            &document.title,
                            &document.content,
                            &document.metadata,
                        )
                    })
                    .await?;
                Ok(SyncAction::Updated)
            }
            None => {
                let processing = target.processing.as_ref().ok_or_else(|| {
                    kbsync_shared::KbSyncError::state(format!(
                        "target {} has no probed processing config",
                        target.id
                    ))
                })?;

                self.retry
                    .execute("create_document", || {
                        self.client.create_document(
                            &target.id,
                            &document.title,
                            &document.content,
                            &document.metadata,
                            processing,
                        )
                    })
                    .await?;
                Ok(SyncAction::Created)
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Document assembly
// ---------------------------------------------------------------------------

/// Classify and hash fetched sources into run documents.
fn build_documents(sources: &[SourceDocument]) -> Vec<Document> {
    sources
        .iter()
        .map(|source| {
            let metadata = classify(&source.url, &source.content).into_metadata();
            Document {
                url: source.url.clone(),
                title: document_title(&source.url),
                content: source.content.clone(),
                hash: detect::content_hash(&source.content),
                metadata,
                observed_at: Utc::now(),
            }
        })
        .collect()
}

/// Derive the remote document name from a URL: last path segment, decoded,
/// with separators spaced out and words capitalized.
pub fn document_title(url: &str) -> String {
    let trimmed = url.trim_end_matches('/');
    let segment = trimmed
        .rsplit('/')
        .find(|s| !s.is_empty())
        .unwrap_or(trimmed);
    let segment = segment.split(['?', '#']).next().unwrap_or(segment);

    let stem = segment
        .trim_end_matches(".html")
        .trim_end_matches(".htm")
        .trim_end_matches(".md");

    let decoded = percent_decode(stem);
    let title = title_case(&decoded.replace(['-', '_'], " "));

    if title.is_empty() {
        url.to_string()
    } else {
        title
    }
}

fn percent_decode(input: &str) -> String {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] == b'%'
            && i + 2 < bytes.len()
            && bytes[i + 1].is_ascii_hexdigit()
            && bytes[i + 2].is_ascii_hexdigit()
            && let Ok(byte) = u8::from_str_radix(&input[i + 1..i + 3], 16)
        {
            out.push(byte);
            i += 3;
            continue;
        }
        out.push(bytes[i]);
        i += 1;
    }

    String::from_utf8(out).unwrap_or_else(|_| input.to_string())
}

fn title_case(input: &str) -> String {
    input
        .split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn tally(results: &[SyncResult]) -> SummaryCounts {
    let mut counts = SummaryCounts::default();
    for result in results {
        match result.action {
            SyncAction::Created => counts.created += 1,
            SyncAction::Updated => counts.updated += 1,
            SyncAction::Skipped => counts.skipped += 1,
            SyncAction::Failed => counts.failed += 1,
        }
    }
    counts
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    use std::path::{Path, PathBuf};
    use std::time::Duration;

    use wiremock::matchers::{method, path, path_regex, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use kbsync_shared::RoutingStrategy;

    struct TempDir(PathBuf);

    impl TempDir {
        fn new() -> Self {
            let dir = std::env::temp_dir().join(format!("kbsync-core-{}", Uuid::now_v7()));
            std::fs::create_dir_all(&dir).expect("create temp dir");
            Self(dir)
        }

        fn state_file(&self) -> PathBuf {
            self.0.join("state.json")
        }
    }

    impl Drop for TempDir {
        fn drop(&mut self) {
            let _ = std::fs::remove_dir_all(&self.0);
        }
    }

    fn engine(
        server: &MockServer,
        state_file: &Path,
        strategy: RoutingStrategy,
        kbs: &[&str],
    ) -> SyncEngine {
        SyncEngine::new(SyncConfig {
            api_key: "sk-test".into(),
            api_base_url: server.uri(),
            knowledge_bases: kbs.iter().map(|s| s.to_string()).collect(),
            strategy,
            request_timeout: Duration::from_secs(5),
            max_attempts: 2,
            base_delay: Duration::from_millis(1),
            state_file: state_file.to_path_buf(),
        })
        .expect("build engine")
    }

    fn source(url: &str, content: &str) -> SourceDocument {
        SourceDocument {
            url: url.into(),
            content: content.into(),
        }
    }

    async fn mount_probe(server: &MockServer, kb_id: &str) {
        Mock::given(method("GET"))
            .and(path(format!("/datasets/{kb_id}/process-rule")))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "mode": "automatic",
                "indexing_technique": "high_quality",
                "retrieval_model": { "search_method": "semantic_search" }
            })))
            .mount(server)
            .await;
    }

    async fn mount_empty_lookup(server: &MockServer, kb_id: &str) {
        Mock::given(method("GET"))
            .and(path(format!("/datasets/{kb_id}/documents")))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({ "data": [] })),
            )
            .mount(server)
            .await;
    }

    async fn mount_create(server: &MockServer, kb_id: &str) {
        Mock::given(method("POST"))
            .and(path(format!("/datasets/{kb_id}/document/create_by_text")))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "document": { "id": format!("doc-{kb_id}") }
            })))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn new_document_is_created_then_skipped_then_updated() {
        let dir = TempDir::new();
        let docs = vec![source("https://docs.example.com/guide/setup", "v1 content")];

        // First run: unknown document, created.
        {
            let server = MockServer::start().await;
            mount_probe(&server, "kb-1").await;
            mount_empty_lookup(&server, "kb-1").await;
            mount_create(&server, "kb-1").await;

            let summary = engine(&server, &dir.state_file(), RoutingStrategy::Primary, &["kb-1"])
                .run(&docs)
                .await
                .expect("run");

            assert!(summary.is_success());
            assert_eq!(summary.counts.created, 1);
            assert_eq!(summary.results[0].action, SyncAction::Created);
        }

        // Second run, same content: no write, no lookup, just a probe.
        {
            let server = MockServer::start().await;
            mount_probe(&server, "kb-1").await;

            let summary = engine(&server, &dir.state_file(), RoutingStrategy::Primary, &["kb-1"])
                .run(&docs)
                .await
                .expect("run");

            assert_eq!(summary.counts.skipped, 1);
            assert_eq!(summary.counts.created, 0);
            assert_eq!(summary.results[0].target_id, "kb-1");

            let requests = server.received_requests().await.expect("requests");
            assert_eq!(requests.len(), 1, "only the probe should hit the network");
        }

        // Third run, changed content: looked up and updated in place.
        {
            let server = MockServer::start().await;
            mount_probe(&server, "kb-1").await;
            Mock::given(method("GET"))
                .and(path("/datasets/kb-1/documents"))
                .and(query_param("keyword", "Setup"))
                .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                    "data": [{ "id": "doc-77", "name": "Setup" }]
                })))
                .mount(&server)
                .await;
            Mock::given(method("POST"))
                .and(path("/datasets/kb-1/documents/doc-77/update_by_text"))
                .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                    "document": { "id": "doc-77" }
                })))
                .expect(1)
                .mount(&server)
                .await;

            let changed = vec![source("https://docs.example.com/guide/setup", "v2 content")];
            let summary = engine(&server, &dir.state_file(), RoutingStrategy::Primary, &["kb-1"])
                .run(&changed)
                .await
                .expect("run");

            assert_eq!(summary.counts.updated, 1);
        }
    }

    #[tokio::test]
    async fn unauthorized_probe_aborts_the_run() {
        let dir = TempDir::new();
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/datasets/kb-1/process-rule"))
            .respond_with(ResponseTemplate::new(401).set_body_string("bad key"))
            .mount(&server)
            .await;

        let summary = engine(&server, &dir.state_file(), RoutingStrategy::Primary, &["kb-1"])
            .run(&[source("https://docs.example.com/a", "body")])
            .await
            .expect("run");

        assert!(!summary.is_success());
        assert!(summary.fatal.as_deref().unwrap().contains("authentication"));
        assert!(summary.results.is_empty());
    }

    #[tokio::test]
    async fn unavailable_probe_drops_only_that_target() {
        let dir = TempDir::new();
        let server = MockServer::start().await;

        // kb-1 is gone; kb-2 probes fine and takes the writes.
        Mock::given(method("GET"))
            .and(path("/datasets/kb-1/process-rule"))
            .respond_with(ResponseTemplate::new(404).set_body_string("no dataset"))
            .mount(&server)
            .await;
        mount_probe(&server, "kb-2").await;
        mount_empty_lookup(&server, "kb-2").await;
        mount_create(&server, "kb-2").await;

        let summary = engine(
            &server,
            &dir.state_file(),
            RoutingStrategy::Primary,
            &["kb-1", "kb-2"],
        )
        .run(&[source("https://docs.example.com/a", "body")])
        .await
        .expect("run");

        assert!(summary.is_success());
        assert_eq!(summary.counts.created, 1);
        assert_eq!(summary.results[0].target_id, "kb-2");
    }

    #[tokio::test]
    async fn forbidden_write_drops_target_but_others_continue() {
        let dir = TempDir::new();
        let server = MockServer::start().await;

        for kb in ["kb-1", "kb-2", "kb-3"] {
            mount_probe(&server, kb).await;
            mount_empty_lookup(&server, kb).await;
        }
        mount_create(&server, "kb-1").await;
        mount_create(&server, "kb-3").await;

        // kb-2 rejects the write; it must be dropped after the first attempt.
        Mock::given(method("POST"))
            .and(path("/datasets/kb-2/document/create_by_text"))
            .respond_with(ResponseTemplate::new(403).set_body_string("read only"))
            .expect(1)
            .mount(&server)
            .await;

        let docs = vec![
            source("https://docs.example.com/a", "body a"),
            source("https://docs.example.com/b", "body b"),
        ];
        let summary = engine(
            &server,
            &dir.state_file(),
            RoutingStrategy::All,
            &["kb-1", "kb-2", "kb-3"],
        )
        .run(&docs)
        .await
        .expect("run");

        // Document a: created on kb-1, failed on kb-2, still created on kb-3.
        // Document b: kb-2 already dropped, created on kb-1 and kb-3.
        assert!(summary.is_success());
        assert_eq!(summary.counts.failed, 1);
        assert_eq!(summary.counts.created, 4);

        let state = StateStore::new(dir.state_file()).load().expect("state");
        assert_eq!(state.hashes.len(), 2);
    }

    #[tokio::test]
    async fn fatal_mid_run_still_commits_accumulated_state() {
        let dir = TempDir::new();
        let server = MockServer::start().await;

        mount_probe(&server, "kb-1").await;
        mount_create(&server, "kb-1").await;

        // First document syncs; the second hits a credential rejection.
        Mock::given(method("GET"))
            .and(path("/datasets/kb-1/documents"))
            .and(query_param("keyword", "First"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({ "data": [] })),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/datasets/kb-1/documents"))
            .and(query_param("keyword", "Second"))
            .respond_with(ResponseTemplate::new(401).set_body_string("key revoked"))
            .mount(&server)
            .await;

        let docs = vec![
            source("https://docs.example.com/first", "body 1"),
            source("https://docs.example.com/second", "body 2"),
            source("https://docs.example.com/third", "body 3"),
        ];
        let summary = engine(&server, &dir.state_file(), RoutingStrategy::Primary, &["kb-1"])
            .run(&docs)
            .await
            .expect("run");

        assert!(!summary.is_success());
        assert_eq!(summary.counts.created, 1);
        assert_eq!(summary.counts.failed, 1);
        // The third document was never attempted.
        assert_eq!(summary.results.len(), 2);

        let state = StateStore::new(dir.state_file()).load().expect("state");
        assert_eq!(state.hashes.len(), 1);
        assert!(state.hashes.contains_key("https://docs.example.com/first"));
    }

    #[tokio::test]
    async fn round_robin_distributes_changed_documents_evenly() {
        let dir = TempDir::new();
        let server = MockServer::start().await;

        for kb in ["kb-1", "kb-2"] {
            mount_probe(&server, kb).await;
            mount_empty_lookup(&server, kb).await;
            mount_create(&server, kb).await;
        }

        let docs: Vec<SourceDocument> = (0..4)
            .map(|i| source(&format!("https://docs.example.com/page-{i}"), &format!("body {i}")))
            .collect();

        let summary = engine(
            &server,
            &dir.state_file(),
            RoutingStrategy::RoundRobin,
            &["kb-1", "kb-2"],
        )
        .run(&docs)
        .await
        .expect("run");

        assert_eq!(summary.counts.created, 4);
        let to_kb1 = summary.results.iter().filter(|r| r.target_id == "kb-1").count();
        let to_kb2 = summary.results.iter().filter(|r| r.target_id == "kb-2").count();
        assert_eq!(to_kb1, 2);
        assert_eq!(to_kb2, 2);
    }

    #[tokio::test]
    async fn retryable_create_eventually_succeeds() {
        let dir = TempDir::new();
        let server = MockServer::start().await;

        mount_probe(&server, "kb-1").await;
        mount_empty_lookup(&server, "kb-1").await;

        // First create attempt hits a 503; the retry lands.
        Mock::given(method("POST"))
            .and(path_regex(r"^/datasets/kb-1/document/create_by_text$"))
            .respond_with(ResponseTemplate::new(503).set_body_string("busy"))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        mount_create(&server, "kb-1").await;

        let summary = engine(&server, &dir.state_file(), RoutingStrategy::Primary, &["kb-1"])
            .run(&[source("https://docs.example.com/a", "body")])
            .await
            .expect("run");

        assert!(summary.is_success());
        assert_eq!(summary.counts.created, 1);
    }

    #[test]
    fn title_from_url() {
        assert_eq!(
            document_title("https://docs.example.com/guide/cluster-setup.html"),
            "Cluster Setup"
        );
        assert_eq!(
            document_title("https://docs.example.com/guide/api_reference/"),
            "Api Reference"
        );
        assert_eq!(
            document_title("https://docs.example.com/document/product/457/12345?from=nav"),
            "12345"
        );
        assert_eq!(
            document_title("https://docs.example.com/%E6%A6%82%E8%BF%B0.md"),
            "概述"
        );
    }

    #[test]
    fn tally_counts_actions() {
        let results = vec![
            SyncResult {
                url: "a".into(),
                target_id: "kb-1".into(),
                action: SyncAction::Created,
                doc_type: None,
                error: None,
            },
            SyncResult {
                url: "b".into(),
                target_id: "kb-1".into(),
                action: SyncAction::Skipped,
                doc_type: None,
                error: None,
            },
            SyncResult {
                url: "c".into(),
                target_id: "kb-1".into(),
                action: SyncAction::Failed,
                doc_type: None,
                error: Some("boom".into()),
            },
        ];

        let counts = tally(&results);
        assert_eq!(counts.created, 1);
        assert_eq!(counts.skipped, 1);
        assert_eq!(counts.failed, 1);
        assert_eq!(counts.updated, 0);
    }
}
