//! Shared types, error model, and configuration for kbsync.
//!
//! This crate is the foundation depended on by all other kbsync crates.
//! It provides:
//! - [`KbSyncError`] — the unified error type with severity classification
//! - Domain types ([`Document`], [`SyncState`], [`RunSummary`], targets)
//! - Configuration ([`AppConfig`], [`SyncConfig`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, CatalogConfig, SyncConfig, SyncSettings, config_dir, config_file_path, init_config,
    load_config, load_config_from,
};
pub use error::{KbSyncError, Result, Severity};
pub use types::{
    DifficultyTier, DocMetadata, DocType, Document, KnowledgeBaseTarget, ProcessingConfig,
    RoutingStrategy, RunSummary, SourceDocument, SummaryCounts, SyncAction, SyncResult, SyncState,
};
