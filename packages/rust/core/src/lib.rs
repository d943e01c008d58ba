//! Sync engine: change detection, target routing, and run orchestration.
//!
//! The entry point is [`SyncEngine::run`], which takes the fetched documents
//! for one pass and returns a [`kbsync_shared::RunSummary`].

pub mod detect;
pub mod router;
pub mod sync;

pub use detect::{Change, ChangeKind, classify_change, content_hash};
pub use router::Router;
pub use sync::{SyncEngine, document_title};
