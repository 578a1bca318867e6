//! Source enumeration: the modules a run works on.
//!
//! A [`SourceTree`] is read once per run. Module paths are relative to the
//! tree root, and every later stage keys on them.

mod walk;

use serde::Serialize;
use std::collections::BTreeSet;
use std::path::{Component, Path, PathBuf};

use crate::graph::ExportSet;

pub use walk::{is_builtin_ignored, BUILTIN_IGNORE};

/// A single addressable source file.
#[derive(Debug, Clone, Serialize)]
pub struct Module {
    /// Path relative to the tree root.
    pub path: PathBuf,
    #[serde(skip)]
    pub content: String,
    pub size_bytes: u64,
    /// Filled in once the extractor has seen the module.
    pub exports: ExportSet,
    /// False when the file was not valid UTF-8. Such modules are never
    /// scanned or rewritten.
    pub decoded: bool,
}

impl Module {
    pub fn new(path: impl Into<PathBuf>, content: impl Into<String>) -> Self {
        let content = content.into();
        Self {
            path: path.into(),
            size_bytes: content.len() as u64,
            content,
            exports: ExportSet::default(),
            decoded: true,
        }
    }

    /// Build from raw bytes, keeping the size of the bytes on disk.
    pub fn from_bytes(path: impl Into<PathBuf>, bytes: Vec<u8>) -> Self {
        let size_bytes = bytes.len() as u64;
        match String::from_utf8(bytes) {
            Ok(content) => Self {
                path: path.into(),
                content,
                size_bytes,
                exports: ExportSet::default(),
                decoded: true,
            },
            Err(_) => Self {
                path: path.into(),
                content: String::new(),
                size_bytes,
                exports: ExportSet::default(),
                decoded: false,
            },
        }
    }
}

/// All modules under a root, plus every other file path seen there.
#[derive(Debug, Clone)]
pub struct SourceTree {
    pub root: PathBuf,
    /// Sorted by path.
    pub modules: Vec<Module>,
    /// Every file under the root (modules included), relative paths.
    pub files: BTreeSet<PathBuf>,
}

impl SourceTree {
    /// Assemble a tree from modules already in memory.
    pub fn from_modules(root: impl Into<PathBuf>, mut modules: Vec<Module>) -> Self {
        modules.sort_by(|a, b| a.path.cmp(&b.path));
        let files = modules.iter().map(|m| m.path.clone()).collect();
        Self {
            root: root.into(),
            modules,
            files,
        }
    }

    /// Record extra non-module files (assets, styles) for collision checks.
    pub fn with_files<I: IntoIterator<Item = PathBuf>>(mut self, files: I) -> Self {
        self.files.extend(files);
        self
    }

    pub fn module(&self, path: &Path) -> Option<&Module> {
        self.modules
            .binary_search_by(|m| m.path.as_path().cmp(path))
            .ok()
            .map(|i| &self.modules[i])
    }
}

/// Render a relative path with forward slashes.
pub fn slash(path: &Path) -> String {
    let parts: Vec<String> = path
        .components()
        .filter_map(|c| match c {
            Component::Normal(p) => Some(p.to_string_lossy().into_owned()),
            Component::ParentDir => Some("..".to_string()),
            _ => None,
        })
        .collect();
    parts.join("/")
}

/// File name without its extension; `index` files take their directory's name.
pub fn module_name(path: &Path) -> Option<String> {
    let stem = path.file_stem()?.to_string_lossy().into_owned();
    if stem == "index" {
        path.parent()
            .and_then(|p| p.file_name())
            .map(|n| n.to_string_lossy().into_owned())
    } else {
        Some(stem)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slash_and_module_name() {
        let path = PathBuf::from("src").join("lib").join("apiClient.ts");
        assert_eq!(slash(&path), "src/lib/apiClient.ts");
        assert_eq!(module_name(&path).as_deref(), Some("apiClient"));
        assert_eq!(
            module_name(Path::new("src/components/Card/index.tsx")).as_deref(),
            Some("Card")
        );
    }

    #[test]
    fn test_undecodable_module_keeps_size() {
        let module = Module::from_bytes("bin.js", vec![0xff, 0xfe, 0x00, 0x41]);
        assert!(!module.decoded);
        assert!(module.content.is_empty());
        assert_eq!(module.size_bytes, 4);
    }

    #[test]
    fn test_tree_lookup() {
        let tree = SourceTree::from_modules(
            "/tmp",
            vec![Module::new("b.ts", ""), Module::new("a.ts", "")],
        );
        assert_eq!(tree.modules[0].path, PathBuf::from("a.ts"));
        assert!(tree.module(Path::new("b.ts")).is_some());
        assert!(tree.module(Path::new("c.ts")).is_none());
    }
}
