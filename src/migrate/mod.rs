//! Transactional migration.
//!
//! A [`Migration`] walks `Idle → Snapshotted → Moved → Rewritten → Verified →
//! Committed`. Any failure after the snapshot restores it (`RolledBack`)
//! and ends in `Failed`. Steps can be driven one at a time or all at once
//! with [`Migration::run`].

mod fs;
mod probe;
mod snapshot;

use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::error::{RestructureError, Result};
use crate::parser::{ExtractorBackend, ReferenceExtractor};
use crate::plan::MovePlan;
use crate::rewrite::{apply_rules, RewriteRules};

pub use fs::{missing_dirs, Filesystem, OsFilesystem};
pub use probe::{CommandProbe, ProbeOutcome, VerificationProbe};
pub use snapshot::{RestoreReport, Snapshot, SnapshotFile, SNAPSHOT_EXTENSION, SNAPSHOT_FORMAT_VERSION};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MigrationState {
    Idle,
    Snapshotted,
    Moved,
    Rewritten,
    Verified,
    Committed,
    RolledBack,
    Failed,
}

impl MigrationState {
    /// States in which the tree may differ from the snapshot.
    fn needs_rollback(self) -> bool {
        matches!(
            self,
            MigrationState::Snapshotted
                | MigrationState::Moved
                | MigrationState::Rewritten
                | MigrationState::Verified
        )
    }
}

impl fmt::Display for MigrationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MigrationState::Idle => "idle",
            MigrationState::Snapshotted => "snapshotted",
            MigrationState::Moved => "moved",
            MigrationState::Rewritten => "rewritten",
            MigrationState::Verified => "verified",
            MigrationState::Committed => "committed",
            MigrationState::RolledBack => "rolled back",
            MigrationState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Shared flag a caller sets to stop a migration before commit.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MigrationErrorKind {
    MoveFailed,
    PartialRewrite,
    VerificationFailure,
    SnapshotCorruption,
    InvalidTransition,
    Cancelled,
    Io,
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MigrationError {
    pub kind: MigrationErrorKind,
    pub message: String,
    pub path: Option<PathBuf>,
}

impl From<&RestructureError> for MigrationError {
    fn from(err: &RestructureError) -> Self {
        let (kind, path) = match err {
            RestructureError::MoveFailed { from, .. } => (MigrationErrorKind::MoveFailed, Some(from.clone())),
            RestructureError::PartialRewrite { path, .. } => {
                (MigrationErrorKind::PartialRewrite, Some(path.clone()))
            }
            RestructureError::VerificationFailure { .. } => (MigrationErrorKind::VerificationFailure, None),
            RestructureError::SnapshotCorruption { snapshot, .. } => {
                (MigrationErrorKind::SnapshotCorruption, snapshot.clone())
            }
            RestructureError::InvalidTransition { .. } => (MigrationErrorKind::InvalidTransition, None),
            RestructureError::Cancelled => (MigrationErrorKind::Cancelled, None),
            RestructureError::Io(_) | RestructureError::NotFound(_) => (MigrationErrorKind::Io, None),
            _ => (MigrationErrorKind::Other, None),
        };
        Self {
            kind,
            message: err.to_string(),
            path,
        }
    }
}

/// Summary of a migration run.
#[derive(Debug, Clone, Serialize)]
pub struct MigrationResult {
    pub success: bool,
    pub state: MigrationState,
    pub files_moved: usize,
    pub files_rewritten: usize,
    pub errors: Vec<MigrationError>,
    /// A persisted snapshot is still on disk for manual recovery.
    pub rollback_available: bool,
    pub snapshot_path: Option<PathBuf>,
    pub verification: Option<ProbeOutcome>,
    pub history: Vec<MigrationState>,
}

pub struct Migration {
    root: PathBuf,
    plan: MovePlan,
    rules: RewriteRules,
    /// Original paths of modules to rewrite.
    rewrite_targets: BTreeSet<PathBuf>,
    fs: Box<dyn Filesystem>,
    extractor: Box<dyn ReferenceExtractor>,
    snapshot_dir: PathBuf,
    cancel: CancelFlag,

    state: MigrationState,
    history: Vec<MigrationState>,
    snapshot: Option<Snapshot>,
    snapshot_path: Option<PathBuf>,
    files_moved: usize,
    files_rewritten: usize,
    verification: Option<ProbeOutcome>,
    errors: Vec<MigrationError>,
}

impl Migration {
    pub fn new(
        root: impl Into<PathBuf>,
        plan: MovePlan,
        rules: RewriteRules,
        rewrite_targets: BTreeSet<PathBuf>,
    ) -> Self {
        let root = root.into();
        let snapshot_dir = root.join(".restructure").join("snapshots");
        Self {
            root,
            plan,
            rules,
            rewrite_targets,
            fs: Box::new(OsFilesystem),
            extractor: ExtractorBackend::default().extractor(),
            snapshot_dir,
            cancel: CancelFlag::new(),
            state: MigrationState::Idle,
            history: vec![MigrationState::Idle],
            snapshot: None,
            snapshot_path: None,
            files_moved: 0,
            files_rewritten: 0,
            verification: None,
            errors: Vec::new(),
        }
    }

    pub fn with_filesystem(mut self, fs: impl Filesystem + 'static) -> Self {
        self.fs = Box::new(fs);
        self
    }

    pub fn with_extractor(mut self, extractor: Box<dyn ReferenceExtractor>) -> Self {
        self.extractor = extractor;
        self
    }

    pub fn with_snapshot_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.snapshot_dir = dir.into();
        self
    }

    pub fn with_cancel(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn state(&self) -> MigrationState {
        self.state
    }

    pub fn snapshot_path(&self) -> Option<&Path> {
        self.snapshot_path.as_deref()
    }

    pub fn cancel_flag(&self) -> CancelFlag {
        self.cancel.clone()
    }

    // ─── Steps ──────────────────────────────────────────────────

    /// Capture and persist every file the run may touch.
    pub fn snapshot(&mut self) -> Result<()> {
        self.expect_state(MigrationState::Idle, "snapshot")?;
        if self.cancel.is_cancelled() {
            return Err(self.fail(RestructureError::Cancelled));
        }

        let paths = self
            .plan
            .entries()
            .iter()
            .map(|e| e.from.clone())
            .chain(self.rewrite_targets.iter().cloned());
        let captured = Snapshot::capture(self.fs.as_ref(), &self.root, paths, &self.plan)
            .and_then(|snapshot| snapshot.persist(&self.snapshot_dir).map(|path| (snapshot, path)));
        let (snapshot, path) = match captured {
            Ok(pair) => pair,
            Err(e) => return Err(self.fail(e)),
        };

        info!(
            id = %snapshot.id,
            files = snapshot.files.len(),
            path = %path.display(),
            "snapshot taken"
        );
        self.snapshot = Some(snapshot);
        self.snapshot_path = Some(path);
        self.transition(MigrationState::Snapshotted);
        Ok(())
    }

    /// Perform every relocation in plan order. The first failure rolls back.
    pub fn apply_moves(&mut self) -> Result<()> {
        self.expect_state(MigrationState::Snapshotted, "apply moves")?;
        self.check_cancelled()?;

        for entry in self.plan.entries().to_vec() {
            let from = self.root.join(&entry.from);
            let to = self.root.join(&entry.to);
            if let Err(e) = self.move_file(&from, &to) {
                return Err(self.fail(RestructureError::MoveFailed {
                    from: entry.from.clone(),
                    to: entry.to.clone(),
                    message: e,
                }));
            }
            self.files_moved += 1;
            debug!(from = %entry.from.display(), to = %entry.to.display(), "moved");
        }

        info!(moved = self.files_moved, "moves applied");
        self.transition(MigrationState::Moved);
        Ok(())
    }

    fn move_file(&self, from: &Path, to: &Path) -> std::result::Result<(), String> {
        if self.fs.exists(to) {
            return Err("destination already exists".to_string());
        }
        if let Some(parent) = to.parent() {
            self.fs.create_dir_all(parent).map_err(|e| e.to_string())?;
        }
        self.fs.rename(from, to).map_err(|e| e.to_string())
    }

    /// Rewrite every target module at its final location.
    pub fn apply_rewrites(&mut self) -> Result<()> {
        self.expect_state(MigrationState::Moved, "apply rewrites")?;
        self.check_cancelled()?;

        for original in self.rewrite_targets.clone() {
            let current = self.plan.final_path(&original);
            match self.rewrite_file(&original, &current) {
                Ok(true) => {
                    self.files_rewritten += 1;
                    debug!(path = %current.display(), "rewritten");
                }
                Ok(false) => {}
                Err(message) => {
                    return Err(self.fail(RestructureError::PartialRewrite {
                        path: current,
                        message,
                    }));
                }
            }
        }

        info!(rewritten = self.files_rewritten, "rewrites applied");
        self.transition(MigrationState::Rewritten);
        Ok(())
    }

    fn rewrite_file(&self, original: &Path, current: &Path) -> std::result::Result<bool, String> {
        let path = self.root.join(current);
        let bytes = self.fs.read(&path).map_err(|e| e.to_string())?;
        let content = String::from_utf8(bytes).map_err(|e| e.to_string())?;
        let outcome = apply_rules(&self.rules, original, current, &content, self.extractor.as_ref());
        if !outcome.changed() {
            return Ok(false);
        }
        self.fs
            .write(&path, outcome.content.as_bytes())
            .map_err(|e| e.to_string())?;
        Ok(true)
    }

    /// Run the probe against the migrated tree.
    pub fn verify(&mut self, probe: &dyn VerificationProbe, timeout: Duration) -> Result<()> {
        self.expect_state(MigrationState::Rewritten, "verify")?;
        self.check_cancelled()?;

        let outcome = probe.verify(&self.root, timeout);
        let passed = outcome.passed;
        let timed_out = outcome.timed_out;
        let output = outcome.output.clone();
        info!(passed, timed_out, duration_ms = outcome.duration_ms, "verification finished");
        self.verification = Some(outcome);

        if !passed {
            let reason = if timed_out {
                format!("probe timed out after {}s", timeout.as_secs())
            } else {
                "probe reported failure".to_string()
            };
            return Err(self.fail(RestructureError::VerificationFailure { reason, output }));
        }
        self.transition(MigrationState::Verified);
        Ok(())
    }

    /// Keep the migrated tree and discard the snapshot.
    pub fn commit(&mut self) -> Result<()> {
        self.expect_state(MigrationState::Verified, "commit")?;
        self.check_cancelled()?;

        self.discard_snapshot();
        self.transition(MigrationState::Committed);
        info!(
            moved = self.files_moved,
            rewritten = self.files_rewritten,
            "migration committed"
        );
        Ok(())
    }

    /// Restore the snapshot. Ends in `RolledBack`, or `Failed` with a
    /// `SnapshotCorruption` error when a file could not be restored.
    pub fn rollback(&mut self) -> Result<()> {
        if !self.state.needs_rollback() {
            return Err(self.invalid_transition("roll back"));
        }
        let Some(snapshot) = self.snapshot.as_ref() else {
            return Err(self.invalid_transition("roll back"));
        };

        warn!(state = %self.state, id = %snapshot.id, "rolling back");
        let report = snapshot.restore(self.fs.as_ref());
        if report.is_clean() {
            self.discard_snapshot();
            self.transition(MigrationState::RolledBack);
            return Ok(());
        }

        let paths: Vec<PathBuf> = report.failures.iter().map(|(p, _)| p.clone()).collect();
        let guidance = match &self.snapshot_path {
            Some(path) => format!(
                "Restore manually with `restructure restore {}`; the snapshot holds the original bytes.",
                path.display()
            ),
            None => "No snapshot file was persisted.".to_string(),
        };
        error!(failures = paths.len(), "rollback incomplete");
        self.transition(MigrationState::Failed);
        Err(RestructureError::SnapshotCorruption {
            paths,
            snapshot: self.snapshot_path.clone(),
            guidance,
        })
    }

    /// Drive every step to commit, returning the summary either way.
    pub fn run(mut self, probe: &dyn VerificationProbe, timeout: Duration) -> MigrationResult {
        if let Err(e) = self.run_steps(probe, timeout) {
            // Step failures are recorded by `fail`; only transition errors are not.
            if self.errors.is_empty() {
                self.errors.push(MigrationError::from(&e));
            }
        }
        self.result()
    }

    fn run_steps(&mut self, probe: &dyn VerificationProbe, timeout: Duration) -> Result<()> {
        self.snapshot()?;
        self.apply_moves()?;
        self.apply_rewrites()?;
        self.verify(probe, timeout)?;
        self.commit()
    }

    pub fn result(&self) -> MigrationResult {
        let rollback_available = self
            .snapshot_path
            .as_ref()
            .is_some_and(|p| p.exists());
        MigrationResult {
            success: self.state == MigrationState::Committed,
            state: self.state,
            files_moved: self.files_moved,
            files_rewritten: self.files_rewritten,
            errors: self.errors.clone(),
            rollback_available,
            snapshot_path: self.snapshot_path.clone().filter(|_| rollback_available),
            verification: self.verification.clone(),
            history: self.history.clone(),
        }
    }

    // ─── Internals ──────────────────────────────────────────────

    fn transition(&mut self, next: MigrationState) {
        info!(from = %self.state, to = %next, "migration state");
        self.state = next;
        self.history.push(next);
    }

    fn expect_state(&self, expected: MigrationState, action: &str) -> Result<()> {
        if self.state == expected {
            Ok(())
        } else {
            Err(self.invalid_transition(action))
        }
    }

    fn invalid_transition(&self, action: &str) -> RestructureError {
        RestructureError::InvalidTransition {
            state: self.state.to_string(),
            action: action.to_string(),
        }
    }

    fn check_cancelled(&mut self) -> Result<()> {
        if self.cancel.is_cancelled() {
            warn!(state = %self.state, "migration cancelled");
            return Err(self.fail(RestructureError::Cancelled));
        }
        Ok(())
    }

    /// Record `err`, roll back if anything may have changed, end in `Failed`.
    /// Returns the error to surface: the original, or the corruption error
    /// when the rollback itself could not finish.
    fn fail(&mut self, err: RestructureError) -> RestructureError {
        warn!(state = %self.state, error = %err, "migration step failed");
        self.errors.push(MigrationError::from(&err));
        if !self.state.needs_rollback() {
            self.transition(MigrationState::Failed);
            return err;
        }
        match self.rollback() {
            Ok(()) => {
                self.transition(MigrationState::Failed);
                err
            }
            Err(corruption) => {
                self.errors.push(MigrationError::from(&corruption));
                corruption
            }
        }
    }

    fn discard_snapshot(&mut self) {
        self.snapshot = None;
        if let Some(path) = &self.snapshot_path {
            if let Err(e) = std::fs::remove_file(path) {
                warn!(path = %path.display(), error = %e, "could not remove snapshot");
            }
        }
    }
}
