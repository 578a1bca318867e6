//! # Restructure SDK
//!
//! Reference-graph analysis and transactional directory migration for
//! JavaScript and TypeScript source trees.
//!
//! Restructure finds every reference between modules (static imports, lazy
//! `import()` calls and component markup), classifies how each module is
//! used, relocates modules according to grouping rules and rewrites every
//! affected specifier. Migrations are snapshotted first and rolled back on
//! any failure.
//!
//! ## Key Features
//!
//! - **Two extractors**: tree-sitter syntax trees by default, regex scanning as a fallback
//! - **Style-preserving rewrites**: alias, relative, extensionless and index specifiers keep their form
//! - **Transactional**: snapshot, move, rewrite, verify, commit; anything else restores byte-identical files
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use restructure::{CommandProbe, Restructure};
//!
//! let project = Restructure::open(".").unwrap();
//! let analysis = project.analyze().unwrap();
//! let plan = project.plan(&analysis).unwrap();
//! let result = project.migrate(plan, &CommandProbe::shell("npx tsc --noEmit"));
//! assert!(result.success);
//! ```

pub mod classify;
pub mod config;
pub mod error;
pub mod graph;
pub mod migrate;
pub mod parser;
pub mod plan;
pub mod rewrite;
pub mod source;

// Re-exports for convenience
pub use classify::{classify, Category, Confidence, RecommendedAction, Scope, Thresholds, UsageRecord, UsageSummary};
pub use config::{AliasRoot, RestructureConfig, CONFIG_FILE};
pub use error::{RestructureError, Result};
pub use graph::{build_graph, Diagnostic, ReferenceGraph, ReferenceKind};
pub use migrate::{
    CancelFlag, CommandProbe, Filesystem, Migration, MigrationResult, MigrationState, OsFilesystem,
    ProbeOutcome, RestoreReport, Snapshot, VerificationProbe,
};
pub use parser::{ExtractorBackend, ReferenceExtractor};
pub use plan::{plan_moves, MovePlan, PlanCandidate, RuleGrouping};
pub use rewrite::{derive_rules, RewriteRules};
pub use source::{Module, SourceTree};

use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use tracing::info;

/// Result of scanning and classifying a tree.
pub struct Analysis {
    pub graph: ReferenceGraph,
    pub usage: Vec<UsageRecord>,
}

impl Analysis {
    pub fn summary(&self) -> UsageSummary {
        UsageSummary::from_records(&self.usage)
    }
}

/// A validated move plan with the rewrite rules it implies.
#[derive(Debug, Clone, Serialize)]
pub struct MigrationPlan {
    pub moves: MovePlan,
    pub rules: RewriteRules,
    /// Original paths of the modules whose text will change.
    pub rewrite_targets: BTreeSet<PathBuf>,
}

/// The main Restructure instance: a project root and its configuration.
pub struct Restructure {
    root: PathBuf,
    config: RestructureConfig,
}

impl Restructure {
    /// Open a project directory, reading `restructure.toml` when present.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let dir = path.as_ref();
        if !dir.is_dir() {
            return Err(RestructureError::NotFound(dir.to_path_buf()));
        }
        let config = RestructureConfig::load(&dir.join(CONFIG_FILE))?;
        let root = config.resolve_root(dir);
        Self::with_config(root, config)
    }

    /// Use an explicit configuration; `root` replaces `project.root`.
    pub fn with_config<P: AsRef<Path>>(root: P, config: RestructureConfig) -> Result<Self> {
        let root = root.as_ref();
        if !root.is_dir() {
            return Err(RestructureError::NotFound(root.to_path_buf()));
        }
        let root = root.canonicalize()?;
        Ok(Self { root, config })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config(&self) -> &RestructureConfig {
        &self.config
    }

    pub fn scan(&self) -> Result<SourceTree> {
        SourceTree::scan(&self.root, &self.config.project)
    }

    /// Build the reference graph and classify the modules in scope.
    pub fn analyze(&self) -> Result<Analysis> {
        let scope = Scope::from_globs(&self.config.classify.scope)?;
        let graph = build_graph(self.scan()?, &self.config);
        let usage = classify(&graph, &scope, &self.config.thresholds());
        info!(classified = usage.len(), "analysis complete");
        Ok(Analysis { graph, usage })
    }

    /// Plan moves with the configured grouping rules and derive the rewrites.
    /// Fails on any collision before anything is touched.
    pub fn plan(&self, analysis: &Analysis) -> Result<MigrationPlan> {
        let grouping = RuleGrouping::from_rules(&self.config.group)?;
        let categories: BTreeMap<&Path, Category> = analysis
            .usage
            .iter()
            .map(|r| (r.path.as_path(), r.category))
            .collect();
        let candidates: Vec<PlanCandidate> = analysis
            .graph
            .modules()
            .map(|m| PlanCandidate {
                path: m.path.clone(),
                category: categories.get(m.path.as_path()).copied(),
            })
            .collect();

        let moves = plan_moves(&candidates, &grouping, analysis.graph.files())?;
        let rules = derive_rules(&moves, &analysis.graph)?;
        let rewrite_targets = rules.files_to_rewrite(&analysis.graph);
        info!(
            moves = moves.len(),
            rules = rules.len(),
            rewrites = rewrite_targets.len(),
            "migration planned"
        );
        Ok(MigrationPlan {
            moves,
            rules,
            rewrite_targets,
        })
    }

    /// A migration for `plan` configured from this project.
    pub fn migration(&self, plan: MigrationPlan) -> Migration {
        Migration::new(&self.root, plan.moves, plan.rules, plan.rewrite_targets)
            .with_extractor(self.config.extract.backend.extractor())
            .with_snapshot_dir(self.config.resolve_snapshot_dir(&self.root))
    }

    /// Run `plan` to commit, verifying with `probe` under the configured timeout.
    pub fn migrate(&self, plan: MigrationPlan, probe: &dyn VerificationProbe) -> MigrationResult {
        self.migration(plan).run(probe, self.config.verify_timeout())
    }

    /// Restore a persisted snapshot onto disk and delete it once every file
    /// is back.
    pub fn restore(snapshot_path: &Path) -> Result<RestoreReport> {
        let snapshot = Snapshot::load(snapshot_path)?;
        let report = snapshot.restore(&OsFilesystem);
        if !report.is_clean() {
            return Err(RestructureError::SnapshotCorruption {
                paths: report.failures.iter().map(|(p, _)| p.clone()).collect(),
                snapshot: Some(snapshot_path.to_path_buf()),
                guidance: "The snapshot was kept; fix the listed paths and restore again.".to_string(),
            });
        }
        std::fs::remove_file(snapshot_path)?;
        Ok(report)
    }
}
