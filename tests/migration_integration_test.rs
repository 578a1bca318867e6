//! End-to-end migrations against real temp directories.

use restructure::config::GroupRule;
use restructure::migrate::MigrationErrorKind;
use restructure::plan::PlanError;
use restructure::{
    Filesystem, MigrationState, OsFilesystem, ProbeOutcome, Restructure, RestructureConfig,
    RestructureError,
};
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tempfile::tempdir;

const FILES: &[(&str, &str)] = &[
    ("src/lib/apiClient.ts", "export const api = { get: () => 1 };\n"),
    ("src/lib/apiClientExtra.ts", "export const extra = 2;\n"),
    (
        "src/lib/helpers.ts",
        "import { api } from './apiClient';\nexport const h = () => api.get();\n",
    ),
    (
        "src/pages/home.tsx",
        "import { api } from '@/lib/apiClient';\nimport { extra } from '@/lib/apiClientExtra';\nimport { h } from '../lib/helpers';\n\nexport default function Home() {\n  return <div>{h() + extra + api.get()}</div>;\n}\n",
    ),
    ("src/pages/a/index.tsx", "export default function A() { return null; }\n"),
    ("src/pages/b/index.tsx", "export default function B() { return null; }\n"),
];

fn write_fixture(root: &Path) {
    for (path, content) in FILES {
        let path = root.join(path);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }
}

/// Every file under `root` except the snapshot directory.
fn tree(root: &Path) -> BTreeMap<PathBuf, Vec<u8>> {
    fn walk(root: &Path, dir: &Path, out: &mut BTreeMap<PathBuf, Vec<u8>>) {
        for entry in fs::read_dir(dir).unwrap() {
            let path = entry.unwrap().path();
            if path.ends_with(".restructure") {
                continue;
            }
            if path.is_dir() {
                walk(root, &path, out);
            } else {
                let rel = path.strip_prefix(root).unwrap().to_path_buf();
                out.insert(rel, fs::read(&path).unwrap());
            }
        }
    }
    let mut out = BTreeMap::new();
    walk(root, root, &mut out);
    out
}

fn project(root: &Path, rules: &[(&str, &str)]) -> Restructure {
    let mut config = RestructureConfig::default();
    config.group = rules
        .iter()
        .map(|(pattern, destination)| GroupRule {
            pattern: pattern.to_string(),
            category: None,
            destination: destination.to_string(),
        })
        .collect();
    Restructure::with_config(root, config).unwrap()
}

fn passing(_: &Path, _: Duration) -> ProbeOutcome {
    ProbeOutcome::pass("ok")
}

/// Real filesystem with one injected failure.
struct FaultyFs {
    fail_write: Option<PathBuf>,
    fail_rename: Option<PathBuf>,
    /// Fail only the first matching call.
    once: bool,
    tripped: AtomicBool,
}

impl FaultyFs {
    fn failing_write(path: PathBuf, once: bool) -> Self {
        Self {
            fail_write: Some(path),
            fail_rename: None,
            once,
            tripped: AtomicBool::new(false),
        }
    }

    fn failing_rename(path: PathBuf) -> Self {
        Self {
            fail_write: None,
            fail_rename: Some(path),
            once: true,
            tripped: AtomicBool::new(false),
        }
    }

    fn should_fail(&self, target: &Option<PathBuf>, path: &Path) -> bool {
        if target.as_deref() != Some(path) {
            return false;
        }
        if self.once {
            !self.tripped.swap(true, Ordering::SeqCst)
        } else {
            true
        }
    }
}

impl Filesystem for FaultyFs {
    fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        OsFilesystem.read(path)
    }

    fn write(&self, path: &Path, content: &[u8]) -> io::Result<()> {
        if self.should_fail(&self.fail_write, path) {
            return Err(io::Error::new(io::ErrorKind::PermissionDenied, "injected write failure"));
        }
        OsFilesystem.write(path, content)
    }

    fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        if self.should_fail(&self.fail_rename, from) {
            return Err(io::Error::new(io::ErrorKind::Other, "injected rename failure"));
        }
        OsFilesystem.rename(from, to)
    }

    fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        OsFilesystem.create_dir_all(path)
    }

    fn remove_file(&self, path: &Path) -> io::Result<()> {
        OsFilesystem.remove_file(path)
    }

    fn remove_dir(&self, path: &Path) -> io::Result<()> {
        OsFilesystem.remove_dir(path)
    }

    fn exists(&self, path: &Path) -> bool {
        OsFilesystem.exists(path)
    }

    fn is_dir(&self, path: &Path) -> bool {
        OsFilesystem.is_dir(path)
    }
}

#[test]
fn test_api_client_move_end_to_end() {
    let dir = tempdir().unwrap();
    let root = dir.path();
    write_fixture(root);

    let project = project(root, &[("src/lib/apiClient.ts", "src/lib/api")]);
    let analysis = project.analyze().unwrap();
    let plan = project.plan(&analysis).unwrap();
    assert_eq!(plan.moves.len(), 1);

    let result = project.migrate(plan, &passing);
    assert!(result.success, "{:?}", result.errors);
    assert_eq!(result.state, MigrationState::Committed);
    assert_eq!(result.files_moved, 1);
    assert_eq!(result.files_rewritten, 2);

    let home = fs::read_to_string(root.join("src/pages/home.tsx")).unwrap();
    assert!(home.contains("from '@/lib/api/apiClient'"));
    assert!(home.contains("from '@/lib/apiClientExtra'"));
    assert!(home.contains("from '../lib/helpers'"));
    let helpers = fs::read_to_string(root.join("src/lib/helpers.ts")).unwrap();
    assert!(helpers.contains("from './api/apiClient'"));
    assert!(!root.join("src/lib/apiClient.ts").exists());

    // A fresh scan of the migrated tree resolves everything it did before.
    let after = project.analyze().unwrap();
    let moved = Path::new("src/lib/api/apiClient.ts");
    assert_eq!(after.graph.referrers_of(moved).len(), 2);
}

#[test]
fn test_index_collision_touches_nothing() {
    let dir = tempdir().unwrap();
    let root = dir.path();
    write_fixture(root);
    let before = tree(root);

    let project = project(root, &[("src/pages/*/index.tsx", "src/pages/shared")]);
    let analysis = project.analyze().unwrap();
    let err = project.plan(&analysis).unwrap_err();
    assert!(err.is_pre_mutation());
    match err {
        RestructureError::Plan(PlanError::Collisions(collisions)) => assert_eq!(collisions.len(), 1),
        other => panic!("unexpected error: {other}"),
    }

    assert_eq!(tree(root), before);
    assert!(!root.join(".restructure").exists());
}

#[test]
fn test_nested_module_outside_single_star_stays_put() {
    let dir = tempdir().unwrap();
    let root = dir.path();
    write_fixture(root);
    let nested = root.join("src/lib/deep/nested/thing.ts");
    fs::create_dir_all(nested.parent().unwrap()).unwrap();
    fs::write(&nested, "export const thing = 3;\n").unwrap();

    let project = project(root, &[("src/lib/*.ts", "src/core")]);
    let analysis = project.analyze().unwrap();
    let plan = project.plan(&analysis).unwrap();

    assert_eq!(plan.moves.len(), 3);
    assert!(plan
        .moves
        .entries()
        .iter()
        .all(|entry| !entry.from.starts_with("src/lib/deep")));
}

#[test]
fn test_verification_failure_restores_bytes() {
    let dir = tempdir().unwrap();
    let root = dir.path();
    write_fixture(root);
    let before = tree(root);

    let project = project(root, &[("src/lib/*.ts", "src/core")]);
    let analysis = project.analyze().unwrap();
    let plan = project.plan(&analysis).unwrap();
    assert_eq!(plan.moves.len(), 3);

    let failing = |_: &Path, _: Duration| ProbeOutcome::fail("error TS2307: Cannot find module");
    let result = project.migrate(plan, &failing);

    assert!(!result.success);
    assert_eq!(result.state, MigrationState::Failed);
    assert_eq!(result.errors[0].kind, MigrationErrorKind::VerificationFailure);
    assert!(result.history.contains(&MigrationState::Rewritten));
    assert!(result.history.contains(&MigrationState::RolledBack));
    assert!(!result.rollback_available);
    assert!(result.verification.unwrap().output.contains("TS2307"));

    assert_eq!(tree(root), before);
    assert!(!root.join("src/core").exists());
}

#[test]
fn test_move_failure_rolls_back_earlier_moves() {
    let dir = tempdir().unwrap();
    let root = dir.path();
    write_fixture(root);
    let before = tree(root);

    let project = project(root, &[("src/lib/*.ts", "src/core")]);
    let analysis = project.analyze().unwrap();
    let plan = project.plan(&analysis).unwrap();

    // Entries are ordered by path; the third move fails after two succeed.
    let faulty = FaultyFs::failing_rename(project.root().join("src/lib/helpers.ts"));
    let result = project
        .migration(plan)
        .with_filesystem(faulty)
        .run(&passing, Duration::from_secs(5));

    assert!(!result.success);
    assert_eq!(result.files_moved, 2);
    assert_eq!(result.errors[0].kind, MigrationErrorKind::MoveFailed);
    assert_eq!(tree(root), before);
    assert!(!root.join("src/core").exists());
}

#[test]
fn test_partial_rewrite_rolls_back() {
    let dir = tempdir().unwrap();
    let root = dir.path();
    write_fixture(root);
    let before = tree(root);

    let project = project(root, &[("src/lib/apiClient.ts", "src/lib/api")]);
    let analysis = project.analyze().unwrap();
    let plan = project.plan(&analysis).unwrap();

    let faulty = FaultyFs::failing_write(project.root().join("src/pages/home.tsx"), true);
    let result = project
        .migration(plan)
        .with_filesystem(faulty)
        .run(&passing, Duration::from_secs(5));

    assert!(!result.success);
    assert_eq!(result.errors[0].kind, MigrationErrorKind::PartialRewrite);
    assert_eq!(result.errors[0].path.as_deref(), Some(Path::new("src/pages/home.tsx")));
    assert!(!result.history.contains(&MigrationState::Verified));
    assert_eq!(tree(root), before);
}

#[test]
fn test_unrecoverable_rollback_keeps_snapshot() {
    let dir = tempdir().unwrap();
    let root = dir.path();
    write_fixture(root);
    let before = tree(root);

    let project = project(root, &[("src/lib/apiClient.ts", "src/lib/api")]);
    let analysis = project.analyze().unwrap();
    let plan = project.plan(&analysis).unwrap();

    // Writes to home.tsx fail during the rewrite and again during rollback.
    let faulty = FaultyFs::failing_write(project.root().join("src/pages/home.tsx"), false);
    let result = project
        .migration(plan)
        .with_filesystem(faulty)
        .run(&passing, Duration::from_secs(5));

    assert!(!result.success);
    assert_eq!(result.state, MigrationState::Failed);
    let kinds: Vec<_> = result.errors.iter().map(|e| e.kind).collect();
    assert_eq!(
        kinds,
        vec![MigrationErrorKind::PartialRewrite, MigrationErrorKind::SnapshotCorruption]
    );
    assert!(result.rollback_available);
    let snapshot = result.snapshot_path.clone().unwrap();
    assert!(snapshot.exists());

    // Manual recovery from the persisted snapshot.
    let report = Restructure::restore(&snapshot).unwrap();
    assert!(report.is_clean());
    assert!(!snapshot.exists());
    assert_eq!(tree(root), before);
}
