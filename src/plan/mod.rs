//! Move planning.
//!
//! Turns candidates plus a grouping policy into an ordered, injective
//! old-path to new-path mapping. Nothing here touches the disk; a plan that
//! fails validation is returned as an error with every collision listed.

mod grouping;

use path_clean::PathClean;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::{Component, Path, PathBuf};
use thiserror::Error;
use tracing::debug;

use crate::classify::{Category, UsageRecord};
use crate::source::Module;

pub use grouping::{GroupingPolicy, RuleGrouping};

/// One module the planner may relocate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanCandidate {
    pub path: PathBuf,
    pub category: Option<Category>,
}

impl From<&UsageRecord> for PlanCandidate {
    fn from(record: &UsageRecord) -> Self {
        Self {
            path: record.path.clone(),
            category: Some(record.category),
        }
    }
}

impl From<&Module> for PlanCandidate {
    fn from(module: &Module) -> Self {
        Self {
            path: module.path.clone(),
            category: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MoveEntry {
    pub from: PathBuf,
    pub to: PathBuf,
}

/// Ordered by original path; no two entries share a destination.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovePlan {
    entries: Vec<MoveEntry>,
}

impl MovePlan {
    pub fn entries(&self) -> &[MoveEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn destination_of(&self, path: &Path) -> Option<&Path> {
        self.entries
            .binary_search_by(|e| e.from.as_path().cmp(path))
            .ok()
            .map(|i| self.entries[i].to.as_path())
    }

    pub fn is_moved(&self, path: &Path) -> bool {
        self.destination_of(path).is_some()
    }

    /// Where `path` lives once the plan has run.
    pub fn final_path(&self, path: &Path) -> PathBuf {
        self.destination_of(path)
            .map(Path::to_path_buf)
            .unwrap_or_else(|| path.to_path_buf())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Collision {
    /// Several modules would land on the same path.
    SharedDestination {
        destination: PathBuf,
        sources: Vec<PathBuf>,
    },
    /// A module would land on a file that already exists.
    ExistingFile {
        destination: PathBuf,
        source: PathBuf,
    },
}

impl fmt::Display for Collision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Collision::SharedDestination {
                destination,
                sources,
            } => {
                let sources: Vec<String> = sources.iter().map(|s| s.display().to_string()).collect();
                write!(f, "{} <- {}", destination.display(), sources.join(", "))
            }
            Collision::ExistingFile {
                destination,
                source,
            } => write!(
                f,
                "{} <- {} (file exists)",
                destination.display(),
                source.display()
            ),
        }
    }
}

#[derive(Debug, Error)]
pub enum PlanError {
    #[error("move plan has {} collision(s): {}", .0.len(), join_collisions(.0))]
    Collisions(Vec<Collision>),

    #[error("invalid destination for {}: {} must be relative to the root", .module.display(), .destination.display())]
    InvalidDestination { module: PathBuf, destination: PathBuf },
}

fn join_collisions(collisions: &[Collision]) -> String {
    collisions
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

fn leaves_root(path: &Path) -> bool {
    path.is_absolute() || matches!(path.components().next(), Some(Component::ParentDir))
}

/// Build a move plan for `candidates` under `policy`.
///
/// `existing` is every file currently under the root. Landing on any of
/// them is a collision, including files the plan itself moves away.
pub fn plan_moves<'a, I, P>(
    candidates: I,
    policy: &P,
    existing: &BTreeSet<PathBuf>,
) -> Result<MovePlan, PlanError>
where
    I: IntoIterator<Item = &'a PlanCandidate>,
    P: GroupingPolicy + ?Sized,
{
    let mut entries: BTreeMap<PathBuf, PathBuf> = BTreeMap::new();

    for candidate in candidates {
        let Some(dir) = policy.destination(&candidate.path, candidate.category) else {
            continue;
        };
        let Some(name) = candidate.path.file_name() else {
            continue;
        };
        let to = dir.join(name).clean();
        if leaves_root(&to) {
            return Err(PlanError::InvalidDestination {
                module: candidate.path.clone(),
                destination: dir,
            });
        }
        if to == candidate.path {
            continue;
        }
        entries.insert(candidate.path.clone(), to);
    }

    let mut by_destination: BTreeMap<&Path, Vec<&Path>> = BTreeMap::new();
    for (from, to) in &entries {
        by_destination.entry(to.as_path()).or_default().push(from.as_path());
    }

    let mut collisions = Vec::new();
    for (destination, sources) in &by_destination {
        if sources.len() > 1 {
            collisions.push(Collision::SharedDestination {
                destination: destination.to_path_buf(),
                sources: sources.iter().map(|s| s.to_path_buf()).collect(),
            });
        } else if existing.contains(*destination) {
            collisions.push(Collision::ExistingFile {
                destination: destination.to_path_buf(),
                source: sources[0].to_path_buf(),
            });
        }
    }
    if !collisions.is_empty() {
        return Err(PlanError::Collisions(collisions));
    }

    let plan = MovePlan {
        entries: entries
            .into_iter()
            .map(|(from, to)| MoveEntry { from, to })
            .collect(),
    };
    debug!(moves = plan.len(), "move plan validated");
    Ok(plan)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidates(paths: &[&str]) -> Vec<PlanCandidate> {
        paths
            .iter()
            .map(|p| PlanCandidate {
                path: PathBuf::from(p),
                category: None,
            })
            .collect()
    }

    fn existing(paths: &[&str]) -> BTreeSet<PathBuf> {
        paths.iter().map(PathBuf::from).collect()
    }

    #[test]
    fn test_plan_is_sorted_and_drops_identity() {
        let files = ["src/lib/b.ts", "src/lib/a.ts", "src/lib/api/keep.ts"];
        let policy = |_: &Path, _: Option<Category>| Some(PathBuf::from("src/lib/api"));
        let plan = plan_moves(&candidates(&files), &policy, &existing(&files)).unwrap();

        let froms: Vec<_> = plan.entries().iter().map(|e| e.from.clone()).collect();
        assert_eq!(froms, vec![PathBuf::from("src/lib/a.ts"), PathBuf::from("src/lib/b.ts")]);
        assert_eq!(
            plan.destination_of(Path::new("src/lib/a.ts")),
            Some(Path::new("src/lib/api/a.ts"))
        );
        assert_eq!(plan.final_path(Path::new("src/x.ts")), PathBuf::from("src/x.ts"));
    }

    #[test]
    fn test_index_files_collide() {
        let files = ["pages/a/index.tsx", "pages/b/index.tsx"];
        let policy = |p: &Path, _: Option<Category>| {
            p.starts_with("pages").then(|| PathBuf::from("pages/shared"))
        };
        let err = plan_moves(&candidates(&files), &policy, &existing(&files)).unwrap_err();
        match err {
            PlanError::Collisions(collisions) => {
                assert_eq!(
                    collisions,
                    vec![Collision::SharedDestination {
                        destination: PathBuf::from("pages/shared/index.tsx"),
                        sources: vec![
                            PathBuf::from("pages/a/index.tsx"),
                            PathBuf::from("pages/b/index.tsx"),
                        ],
                    }]
                );
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_existing_file_collides_even_if_moved() {
        // a.ts -> b/a.ts while b/a.ts itself moves away: still rejected.
        let files = ["a.ts", "b/a.ts"];
        let policy = |p: &Path, _: Option<Category>| {
            if p == Path::new("a.ts") {
                Some(PathBuf::from("b"))
            } else {
                Some(PathBuf::from("c"))
            }
        };
        let err = plan_moves(&candidates(&files), &policy, &existing(&files)).unwrap_err();
        assert!(matches!(
            err,
            PlanError::Collisions(ref c) if c.len() == 1
                && matches!(&c[0], Collision::ExistingFile { destination, .. } if destination == Path::new("b/a.ts"))
        ));
    }

    #[test]
    fn test_all_collisions_reported() {
        let files = ["x/one.ts", "y/one.ts", "z/two.ts", "shared/two.ts"];
        let policy = |_: &Path, _: Option<Category>| Some(PathBuf::from("shared"));
        let err = plan_moves(&candidates(&files[..3]), &policy, &existing(&files)).unwrap_err();
        match err {
            PlanError::Collisions(c) => assert_eq!(c.len(), 2),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_destination_outside_root() {
        let files = ["src/a.ts"];
        let policy = |_: &Path, _: Option<Category>| Some(PathBuf::from("../elsewhere"));
        let err = plan_moves(&candidates(&files), &policy, &existing(&files)).unwrap_err();
        assert!(matches!(err, PlanError::InvalidDestination { .. }));
    }
}
