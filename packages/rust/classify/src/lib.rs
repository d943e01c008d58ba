//! Metadata classification for fetched documents.
//!
//! Derives a document type, category, keyword set, and difficulty tier from
//! a URL and its text content. Pure functions over their inputs — no network,
//! no I/O, and no failure mode: absent signals resolve to conservative
//! defaults instead of errors.

mod rules;

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;
use url::Url;

use kbsync_shared::{DifficultyTier, DocMetadata, DocType};
use rules::{STOP_WORDS, TIER_RULES, TYPE_RULES, URL_SEGMENT_WEIGHT};

/// Number of keywords retained after ranking.
const KEYWORD_LIMIT: usize = 8;

/// Word tokens considered for keyword ranking.
static WORD_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[a-zA-Z][a-zA-Z0-9_-]{2,}").expect("valid word regex"));

/// Numbered step lines ("1. do this" / "2) then that").
static NUMBERED_STEP_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^\s*\d+[.)]\s").expect("valid step regex"));

/// Classification output for one document.
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    pub doc_type: DocType,
    pub category: String,
    pub keywords: Vec<String>,
    pub difficulty: DifficultyTier,
}

impl Classification {
    /// Convert into the tagged metadata form sent to the catalog.
    pub fn into_metadata(self) -> DocMetadata {
        DocMetadata::new(self.doc_type, self.category, self.keywords, self.difficulty)
    }
}

/// Classify a document from its URL and content.
pub fn classify(url: &str, content: &str) -> Classification {
    let url_lower = url.to_lowercase();
    let content_lower = content.to_lowercase();

    let doc_type = score_doc_type(&url_lower, &content_lower, content);
    let category = category_from_url(url);
    let keywords = rank_keywords(&content_lower);
    let difficulty = score_difficulty(&content_lower);

    debug!(%url, ?doc_type, %category, ?difficulty, "classified document");

    Classification {
        doc_type,
        category,
        keywords,
        difficulty,
    }
}

// ---------------------------------------------------------------------------
// Document type
// ---------------------------------------------------------------------------

/// Score the declarative type rules against URL segments and content terms.
fn score_doc_type(url_lower: &str, content_lower: &str, raw_content: &str) -> DocType {
    let segments = path_segments(url_lower);

    let mut operation_score = 0u32;
    let mut overview_score = 0u32;

    for rule in TYPE_RULES {
        let mut score = 0u32;

        for segment in rule.url_segments {
            if segments.iter().any(|s| s == segment) {
                score += URL_SEGMENT_WEIGHT;
            }
        }

        for term in rule.terms {
            score += content_lower.matches(term).count() as u32;
        }

        match rule.doc_type {
            DocType::Operation => operation_score += score,
            DocType::Overview => overview_score += score,
        }
    }

    if operation_score > overview_score {
        DocType::Operation
    } else if overview_score > operation_score {
        DocType::Overview
    } else if has_action_punctuation(raw_content) || operation_score == 0 {
        // Ambiguous: numbered steps or code blocks indicate a task document;
        // with no lexical signal at all, operation is the conservative default.
        DocType::Operation
    } else {
        DocType::Overview
    }
}

/// Whether the content carries action-indicating punctuation: numbered step
/// lines or fenced code blocks.
fn has_action_punctuation(content: &str) -> bool {
    NUMBERED_STEP_RE.is_match(content) || content.contains("```")
}

// ---------------------------------------------------------------------------
// Category
// ---------------------------------------------------------------------------

/// Derive a category slug from the URL path.
///
/// `/document/product/457/12345` → `product-457`; shorter paths fall back to
/// the first meaningful segment, then to `general`.
fn category_from_url(url: &str) -> String {
    let segments: Vec<String> = match Url::parse(url) {
        Ok(parsed) => parsed
            .path_segments()
            .map(|s| {
                s.filter(|p| !p.is_empty())
                    .map(|p| p.to_lowercase())
                    .collect()
            })
            .unwrap_or_default(),
        Err(_) => url
            .split('/')
            .skip(1)
            .filter(|p| !p.is_empty())
            .map(|p| p.to_lowercase())
            .collect(),
    };

    match segments.len() {
        0 => "general".into(),
        1 => segments[0].clone(),
        2 => segments[1].clone(),
        _ => format!("{}-{}", segments[1], segments[2]),
    }
}

fn path_segments(url_lower: &str) -> Vec<String> {
    match Url::parse(url_lower) {
        Ok(parsed) => parsed
            .path_segments()
            .map(|s| s.filter(|p| !p.is_empty()).map(str::to_string).collect())
            .unwrap_or_default(),
        Err(_) => url_lower
            .split('/')
            .filter(|p| !p.is_empty())
            .map(str::to_string)
            .collect(),
    }
}

// ---------------------------------------------------------------------------
// Keywords
// ---------------------------------------------------------------------------

/// Frequency-ranked keywords after stop-word removal.
///
/// Order is deterministic: count descending, then lexicographic.
fn rank_keywords(content_lower: &str) -> Vec<String> {
    let mut counts: HashMap<&str, usize> = HashMap::new();

    for token in WORD_RE.find_iter(content_lower) {
        let word = token.as_str();
        if STOP_WORDS.contains(&word) {
            continue;
        }
        *counts.entry(word).or_insert(0) += 1;
    }

    let mut ranked: Vec<(&str, usize)> = counts.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));

    ranked
        .into_iter()
        .take(KEYWORD_LIMIT)
        .map(|(word, _)| word.to_string())
        .collect()
}

// ---------------------------------------------------------------------------
// Difficulty
// ---------------------------------------------------------------------------

/// Pick the tier whose lexicon dominates; ties and no-match resolve to the
/// earliest tier in rule order (basic < intermediate < advanced).
fn score_difficulty(content_lower: &str) -> DifficultyTier {
    let mut best = DifficultyTier::Basic;
    let mut best_count = 0usize;

    for rule in TIER_RULES {
        let count: usize = rule
            .terms
            .iter()
            .map(|term| content_lower.matches(term).count())
            .sum();

        // Strictly greater: earlier rules win ties.
        if count > best_count {
            best = rule.tier;
            best_count = count;
        }
    }

    best
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
