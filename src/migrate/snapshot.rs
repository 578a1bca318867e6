//! Pre-migration snapshots.
//!
//! A snapshot holds the full bytes of every file a migration may touch, the
//! planned moves and the directories the run will create. It is written to
//! disk before the first mutation so a crashed run can still be restored.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::fs::{missing_dirs, Filesystem};
use crate::error::{RestructureError, Result};
use crate::plan::{MoveEntry, MovePlan};

/// Bumped whenever the on-disk layout changes.
pub const SNAPSHOT_FORMAT_VERSION: u32 = 1;

pub const SNAPSHOT_EXTENSION: &str = "snapshot";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotFile {
    /// Relative to the snapshot root.
    pub path: PathBuf,
    pub content: Vec<u8>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub format_version: u32,
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    /// Absolute project root.
    pub root: PathBuf,
    /// Sorted by path.
    pub files: Vec<SnapshotFile>,
    pub moves: Vec<MoveEntry>,
    /// Directories the moves will create, relative, outermost first.
    pub new_dirs: Vec<PathBuf>,
}

/// What a restore managed to do.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RestoreReport {
    pub restored: usize,
    pub removed: usize,
    pub pruned_dirs: usize,
    /// Files that could not be put back byte-identical.
    pub failures: Vec<(PathBuf, String)>,
}

impl RestoreReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

impl Snapshot {
    /// Read every file in `paths` (relative to `root`) and record the plan.
    pub fn capture<I>(fs: &dyn Filesystem, root: &Path, paths: I, plan: &MovePlan) -> Result<Self>
    where
        I: IntoIterator<Item = PathBuf>,
    {
        let paths: BTreeSet<PathBuf> = paths.into_iter().collect();
        let mut files = Vec::with_capacity(paths.len());
        for path in paths {
            let content = fs.read(&root.join(&path))?;
            files.push(SnapshotFile { path, content });
        }

        let mut new_dirs: BTreeSet<PathBuf> = BTreeSet::new();
        for entry in plan.entries() {
            if let Some(parent) = root.join(&entry.to).parent() {
                for dir in missing_dirs(fs, root, parent) {
                    if let Ok(rel) = dir.strip_prefix(root) {
                        new_dirs.insert(rel.to_path_buf());
                    }
                }
            }
        }

        let snapshot = Self {
            format_version: SNAPSHOT_FORMAT_VERSION,
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            root: root.to_path_buf(),
            files,
            moves: plan.entries().to_vec(),
            new_dirs: new_dirs.into_iter().collect(),
        };
        debug!(
            id = %snapshot.id,
            files = snapshot.files.len(),
            bytes = snapshot.total_bytes(),
            "snapshot captured"
        );
        Ok(snapshot)
    }

    pub fn total_bytes(&self) -> usize {
        self.files.iter().map(|f| f.content.len()).sum()
    }

    pub fn file_name(&self) -> String {
        format!("{}.{SNAPSHOT_EXTENSION}", self.id)
    }

    /// Write the snapshot into `dir` atomically. Returns the file path.
    pub fn persist(&self, dir: &Path) -> Result<PathBuf> {
        fs::create_dir_all(dir)?;
        let path = dir.join(self.file_name());
        let bytes = bincode::serialize(self)?;

        // Write atomically (write to temp, then rename)
        let temp_path = path.with_extension("snapshot.tmp");
        let mut file = File::create(&temp_path)?;
        file.write_all(&bytes)?;
        file.sync_all()?;
        fs::rename(&temp_path, &path)?;

        info!(path = %path.display(), bytes = bytes.len(), "snapshot persisted");
        Ok(path)
    }

    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(RestructureError::NotFound(path.to_path_buf()));
        }
        let bytes = fs::read(path)?;
        let snapshot: Snapshot = bincode::deserialize(&bytes)?;
        if snapshot.format_version != SNAPSHOT_FORMAT_VERSION {
            return Err(RestructureError::SnapshotCorruption {
                paths: Vec::new(),
                snapshot: Some(path.to_path_buf()),
                guidance: format!(
                    "snapshot format {} is not supported (expected {})",
                    snapshot.format_version, SNAPSHOT_FORMAT_VERSION
                ),
            });
        }
        Ok(snapshot)
    }

    /// Put the tree back the way it was captured.
    ///
    /// Removes the destination of every move that happened, rewrites every
    /// captured file (reading it back to confirm the bytes), then prunes
    /// created directories that are empty again. Keeps going past failures;
    /// the report lists what could not be restored.
    ///
    /// A move happened when its source is gone and its destination exists.
    pub fn restore(&self, fs: &dyn Filesystem) -> RestoreReport {
        let mut report = RestoreReport::default();

        for entry in self.moves.iter().rev() {
            let dest = self.root.join(&entry.to);
            if !fs.exists(&dest) || fs.exists(&self.root.join(&entry.from)) {
                continue;
            }
            match fs.remove_file(&dest) {
                Ok(()) => report.removed += 1,
                Err(e) => {
                    warn!(path = %dest.display(), error = %e, "could not remove moved file");
                    report.failures.push((entry.to.clone(), e.to_string()));
                }
            }
        }

        for file in &self.files {
            let path = self.root.join(&file.path);
            let result = path
                .parent()
                .map_or(Ok(()), |parent| fs.create_dir_all(parent))
                .and_then(|()| fs.write(&path, &file.content))
                .and_then(|()| fs.read(&path));
            match result {
                Ok(bytes) if bytes == file.content => report.restored += 1,
                Ok(_) => {
                    warn!(path = %path.display(), "restored content differs from snapshot");
                    report
                        .failures
                        .push((file.path.clone(), "content differs after restore".to_string()));
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "could not restore file");
                    report.failures.push((file.path.clone(), e.to_string()));
                }
            }
        }

        for dir in self.new_dirs.iter().rev() {
            let path = self.root.join(dir);
            if fs.is_dir(&path) && fs.remove_dir(&path).is_ok() {
                report.pruned_dirs += 1;
            }
        }

        info!(
            id = %self.id,
            restored = report.restored,
            removed = report.removed,
            pruned = report.pruned_dirs,
            failures = report.failures.len(),
            "snapshot restored"
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migrate::fs::OsFilesystem;
    use tempfile::tempdir;

    fn plan(entries: &[(&str, &str)]) -> MovePlan {
        serde_json::from_value(serde_json::json!({
            "entries": entries
                .iter()
                .map(|(from, to)| serde_json::json!({ "from": from, "to": to }))
                .collect::<Vec<_>>()
        }))
        .unwrap()
    }

    #[test]
    fn test_persist_and_load() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        fs::write(root.join("a.ts"), "export const a = 1;\n").unwrap();

        let plan = plan(&[("a.ts", "lib/deep/a.ts")]);
        let snapshot = Snapshot::capture(&OsFilesystem, root, vec![PathBuf::from("a.ts")], &plan).unwrap();
        assert_eq!(snapshot.new_dirs, vec![PathBuf::from("lib"), PathBuf::from("lib/deep")]);

        let path = snapshot.persist(&root.join(".restructure/snapshots")).unwrap();
        assert!(path.ends_with(snapshot.file_name()));
        assert!(!path.with_extension("snapshot.tmp").exists());

        let loaded = Snapshot::load(&path).unwrap();
        assert_eq!(loaded.id, snapshot.id);
        assert_eq!(loaded.files, snapshot.files);
        assert_eq!(loaded.moves, snapshot.moves);
    }

    #[test]
    fn test_load_garbage_is_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bad.snapshot");
        fs::write(&path, b"not a snapshot").unwrap();
        assert!(Snapshot::load(&path).is_err());
        assert!(matches!(
            Snapshot::load(&dir.path().join("missing.snapshot")),
            Err(RestructureError::NotFound(_))
        ));
    }

    #[test]
    fn test_restore_undoes_move_and_edit() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("src")).unwrap();
        fs::write(root.join("src/a.ts"), "export const a = 1;\n").unwrap();
        fs::write(root.join("src/b.ts"), "import { a } from './a';\n").unwrap();

        let plan = plan(&[("src/a.ts", "src/lib/a.ts")]);
        let snapshot = Snapshot::capture(
            &OsFilesystem,
            root,
            vec![PathBuf::from("src/a.ts"), PathBuf::from("src/b.ts")],
            &plan,
        )
        .unwrap();

        fs::create_dir_all(root.join("src/lib")).unwrap();
        fs::rename(root.join("src/a.ts"), root.join("src/lib/a.ts")).unwrap();
        fs::write(root.join("src/b.ts"), "import { a } from './lib/a';\n").unwrap();

        let report = snapshot.restore(&OsFilesystem);
        assert!(report.is_clean());
        assert_eq!(report.removed, 1);
        assert_eq!(report.pruned_dirs, 1);
        assert_eq!(fs::read_to_string(root.join("src/a.ts")).unwrap(), "export const a = 1;\n");
        assert_eq!(fs::read_to_string(root.join("src/b.ts")).unwrap(), "import { a } from './a';\n");
        assert!(!root.join("src/lib").exists());
    }
}
