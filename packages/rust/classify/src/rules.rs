//! Declarative classification rule tables.
//!
//! Signals live in data, not in branching logic, so individual tables can be
//! tested and extended without touching the scoring code. The bilingual
//! lexicons come from the documentation corpus this tool was built for:
//! operational vocabulary (steps, commands, deployment) vs conceptual
//! vocabulary (overviews, architecture), in both English and Chinese.

use kbsync_shared::{DifficultyTier, DocType};

/// A signal set contributing to a document-type score.
pub(crate) struct TypeRule {
    pub doc_type: DocType,
    /// URL path segments that strongly indicate this type.
    pub url_segments: &'static [&'static str],
    /// Content terms counted per occurrence.
    pub terms: &'static [&'static str],
}

/// Weight added per URL segment hit.
pub(crate) const URL_SEGMENT_WEIGHT: u32 = 5;

/// Ordered type rules; operation is listed first and wins exact ties when
/// action-indicating punctuation is present.
pub(crate) const TYPE_RULES: &[TypeRule] = &[
    TypeRule {
        doc_type: DocType::Operation,
        url_segments: &["api", "guide", "tutorial", "config", "sdk", "cli"],
        terms: &[
            "step", "command", "config", "configure", "deploy", "install", "setup", "create",
            "delete", "update", "run", "execute", "how to", "tutorial", "教程", "指南", "步骤",
            "如何", "配置", "部署", "安装", "创建", "删除", "命令", "操作",
        ],
    },
    TypeRule {
        doc_type: DocType::Overview,
        url_segments: &["overview", "intro", "concept", "architecture"],
        terms: &[
            "overview", "introduction", "what is", "concept", "architecture", "design", "about",
            "概述", "介绍", "什么是", "简介", "概念", "原理", "架构", "总览",
        ],
    },
];

/// A signal set mapping content terms to a difficulty tier.
pub(crate) struct TierRule {
    pub tier: DifficultyTier,
    pub terms: &'static [&'static str],
}

/// Ordered tier rules; on a tie the earliest tier wins (basic < intermediate
/// < advanced).
pub(crate) const TIER_RULES: &[TierRule] = &[
    TierRule {
        tier: DifficultyTier::Basic,
        terms: &[
            "introduction", "overview", "getting started", "quickstart", "what is", "basics",
            "简介", "概述", "入门", "什么是",
        ],
    },
    TierRule {
        tier: DifficultyTier::Intermediate,
        terms: &[
            "configuration", "configure", "deployment", "deploy", "management", "manage",
            "settings", "integration", "配置", "部署", "管理", "设置",
        ],
    },
    TierRule {
        tier: DifficultyTier::Advanced,
        terms: &[
            "optimization", "optimize", "troubleshoot", "troubleshooting", "performance",
            "tuning", "advanced", "diagnostics", "调优", "排查", "故障", "高级", "诊断",
        ],
    },
];

/// Stop words excluded from keyword ranking.
pub(crate) const STOP_WORDS: &[&str] = &[
    "the", "and", "for", "are", "but", "not", "you", "all", "can", "had", "her", "was", "one",
    "our", "out", "day", "get", "has", "him", "his", "how", "man", "new", "now", "old", "see",
    "two", "way", "who", "its", "use", "this", "that", "with", "from", "your", "will", "have",
    "more", "when", "what", "which", "their", "there", "about", "would", "these", "other",
    "into", "them", "then", "than", "also", "each", "such", "only", "some", "over", "after",
    "before", "using", "used", "based",
];
