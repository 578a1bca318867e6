//! Usage classification.
//!
//! Assigns every module in scope a reachability [`Category`] from its
//! incoming reference kinds, export status and size. Pure: the same graph
//! and thresholds always give the same records.

use globset::{GlobSet, GlobSetBuilder};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::config::path_glob;
use crate::error::{RestructureError, Result};
use crate::graph::{IncomingKinds, ReferenceGraph};
use crate::source::slash;

/// Size thresholds in bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Thresholds {
    /// Exported orphans below this are likely leftovers.
    pub small_bytes: u64,
    /// Referenced modules above this are split candidates.
    pub large_bytes: u64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            small_bytes: 5 * 1024,
            large_bytes: 15 * 1024,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Unreachable,
    OrphanedSubstantial,
    OversizedHotspot,
    Active,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Confidence {
    High,
    Medium,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecommendedAction {
    Delete,
    Review,
    Integrate,
    Split,
    Keep,
}

/// Classification of one module.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageRecord {
    pub path: PathBuf,
    pub statically_referenced: bool,
    pub lazily_referenced: bool,
    pub structurally_referenced: bool,
    pub is_exported: bool,
    pub size_bytes: u64,
    pub category: Category,
    pub confidence: Confidence,
    pub reason: String,
    pub recommended_action: RecommendedAction,
}

/// Which modules get classified. Empty means every module.
#[derive(Debug, Clone)]
pub struct Scope {
    globs: Option<GlobSet>,
}

impl Scope {
    pub fn all() -> Self {
        Self { globs: None }
    }

    pub fn from_globs(patterns: &[String]) -> Result<Self> {
        if patterns.is_empty() {
            return Ok(Self::all());
        }
        let mut builder = GlobSetBuilder::new();
        for pattern in patterns {
            builder.add(path_glob(pattern)?);
        }
        let globs = builder.build().map_err(|e| RestructureError::InvalidPattern {
            pattern: patterns.join(", "),
            message: e.to_string(),
        })?;
        Ok(Self { globs: Some(globs) })
    }

    pub fn contains(&self, path: &Path) -> bool {
        match &self.globs {
            None => true,
            Some(globs) => globs.is_match(slash(path)),
        }
    }
}

impl Default for Scope {
    fn default() -> Self {
        Self::all()
    }
}

/// Apply the classification rules to one module. First match wins.
pub fn classify_module(
    incoming: IncomingKinds,
    is_exported: bool,
    size_bytes: u64,
    thresholds: &Thresholds,
) -> (Category, Confidence, String) {
    let referenced = incoming.any();
    let kib = size_bytes as f64 / 1024.0;

    if !referenced && !is_exported {
        return (
            Category::Unreachable,
            Confidence::High,
            "no incoming references and no exports".to_string(),
        );
    }
    if !referenced && size_bytes < thresholds.small_bytes {
        return (
            Category::Unreachable,
            Confidence::Medium,
            format!("exported but never referenced, small ({kib:.1} KiB)"),
        );
    }
    if !referenced {
        return (
            Category::OrphanedSubstantial,
            Confidence::Medium,
            format!("exported but never referenced, substantial ({kib:.1} KiB)"),
        );
    }
    if size_bytes > thresholds.large_bytes {
        return (
            Category::OversizedHotspot,
            Confidence::High,
            format!("referenced and large ({kib:.1} KiB)"),
        );
    }
    (Category::Active, Confidence::High, describe_incoming(incoming))
}

fn describe_incoming(incoming: IncomingKinds) -> String {
    let mut kinds = Vec::new();
    if incoming.statically {
        kinds.push("static");
    }
    if incoming.lazily {
        kinds.push("lazy");
    }
    if incoming.structurally {
        kinds.push("structural");
    }
    format!("referenced ({})", kinds.join(", "))
}

fn recommend(category: Category, confidence: Confidence) -> RecommendedAction {
    match (category, confidence) {
        (Category::Unreachable, Confidence::High) => RecommendedAction::Delete,
        (Category::Unreachable, _) => RecommendedAction::Review,
        (Category::OrphanedSubstantial, _) => RecommendedAction::Integrate,
        (Category::OversizedHotspot, _) => RecommendedAction::Split,
        (Category::Active, _) => RecommendedAction::Keep,
    }
}

/// Classify every module of `graph` inside `scope`, sorted by path.
pub fn classify(graph: &ReferenceGraph, scope: &Scope, thresholds: &Thresholds) -> Vec<UsageRecord> {
    graph
        .modules()
        .filter(|m| scope.contains(&m.path))
        .map(|m| {
            let incoming = graph.incoming(&m.path);
            let is_exported = m.exports.is_exported();
            let (category, confidence, reason) =
                classify_module(incoming, is_exported, m.size_bytes, thresholds);
            UsageRecord {
                path: m.path.clone(),
                statically_referenced: incoming.statically,
                lazily_referenced: incoming.lazily,
                structurally_referenced: incoming.structurally,
                is_exported,
                size_bytes: m.size_bytes,
                category,
                confidence,
                reason,
                recommended_action: recommend(category, confidence),
            }
        })
        .collect()
}

/// Category counts over a set of records.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UsageSummary {
    pub total: usize,
    pub by_category: BTreeMap<Category, usize>,
    pub total_bytes: u64,
}

impl UsageSummary {
    pub fn from_records(records: &[UsageRecord]) -> Self {
        let mut summary = Self {
            total: records.len(),
            ..Default::default()
        };
        for record in records {
            *summary.by_category.entry(record.category).or_default() += 1;
            summary.total_bytes += record.size_bytes;
        }
        summary
    }

    pub fn count(&self, category: Category) -> usize {
        self.by_category.get(&category).copied().unwrap_or(0)
    }
}
