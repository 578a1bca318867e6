//
//  walk.rs
//  Restructure
//
//  Created by hak (tharun)
//

use ignore::WalkBuilder;
use std::collections::BTreeSet;
use std::fs;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, info, warn};

use super::{Module, SourceTree};
use crate::config::ProjectConfig;
use crate::error::{RestructureError, Result};

/// Directories that are never scanned, even without .gitignore.
pub const BUILTIN_IGNORE: &[&str] = &[
    "node_modules",
    "vendor",
    "dist",
    "build",
    "out",
    ".git",
    ".svn",
    ".hg",
    ".next",
    ".nuxt",
    ".turbo",
    ".output",
    ".cache",
    ".nyc_output",
    "coverage",
    ".restructure",
];

/// Check if a relative path passes through an ignored directory.
pub fn is_builtin_ignored(path: &Path) -> bool {
    is_excluded(path, &[])
}

fn is_excluded(path: &Path, extra: &[String]) -> bool {
    path.components().any(|c| {
        if let Component::Normal(name) = c {
            let name = name.to_str().unwrap_or("");
            BUILTIN_IGNORE.contains(&name) || extra.iter().any(|e| e == name)
        } else {
            false
        }
    })
}

fn has_module_extension(path: &Path, extensions: &[String]) -> bool {
    let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
    extensions.iter().any(|ext| name.ends_with(ext.as_str()))
}

impl SourceTree {
    /// Walk `root` and read every module file.
    ///
    /// Respects .gitignore and skips hidden entries. Files that cannot be
    /// read are logged and left out of the module list but still count as
    /// existing paths.
    pub fn scan(root: &Path, project: &ProjectConfig) -> Result<Self> {
        if !root.is_dir() {
            return Err(RestructureError::NotFound(root.to_path_buf()));
        }

        let mut files: BTreeSet<PathBuf> = BTreeSet::new();
        let mut modules = Vec::new();

        let walker = WalkBuilder::new(root)
            .hidden(true)
            .git_ignore(true)
            .git_global(false)
            .git_exclude(true)
            .require_git(false)
            .build();

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!(error = %e, "skipping unreadable entry");
                    continue;
                }
            };
            if !entry.file_type().is_some_and(|ft| ft.is_file()) {
                continue;
            }
            let Ok(rel) = entry.path().strip_prefix(root) else {
                continue;
            };
            if is_excluded(rel, &project.exclude) {
                continue;
            }
            let rel = rel.to_path_buf();
            files.insert(rel.clone());

            if !has_module_extension(&rel, &project.extensions) {
                continue;
            }
            match fs::read(entry.path()) {
                Ok(bytes) => {
                    let module = Module::from_bytes(rel, bytes);
                    if !module.decoded {
                        debug!(path = %module.path.display(), "module is not valid UTF-8");
                    }
                    modules.push(module);
                }
                Err(e) => warn!(path = %rel.display(), error = %e, "failed to read module"),
            }
        }

        let tree = SourceTree::from_modules(root, modules).with_files(files);
        info!(
            root = %root.display(),
            modules = tree.modules.len(),
            files = tree.files.len(),
            "source tree scanned"
        );
        Ok(tree)
    }
}
