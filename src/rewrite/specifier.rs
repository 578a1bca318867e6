//
//  specifier.rs
//  Restructure
//
//  Created by hak (tharun)
//

use std::path::{Component, Path, PathBuf};

use crate::config::AliasRoot;
use crate::source::slash;

/// How a specifier spells its target file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpecifierStyle {
    /// Full file name, extension included.
    Explicit,
    /// Extension left off; the extension the target actually has.
    Extensionless(String),
    /// Names the directory holding an `index` file.
    DirectoryIndex,
}

impl SpecifierStyle {
    /// Work out the style from the path a specifier names and the module
    /// it resolved to.
    pub fn detect(base: &Path, target: &Path, extensions: &[String]) -> Option<Self> {
        if base == target {
            return Some(Self::Explicit);
        }
        let base_str = slash(base);
        let target_str = slash(target);
        if let Some(ext) = extensions
            .iter()
            .find(|ext| target_str.strip_suffix(ext.as_str()) == Some(base_str.as_str()))
        {
            return Some(Self::Extensionless(ext.clone()));
        }
        let is_index = target
            .file_stem()
            .is_some_and(|stem| stem == "index");
        let parent = target.parent().unwrap_or(Path::new(""));
        let base_dir = if base == Path::new(".") { Path::new("") } else { base };
        if is_index && parent == base_dir {
            return Some(Self::DirectoryIndex);
        }
        None
    }

    /// The path a specifier of this style names for `target`.
    pub fn render(&self, target: &Path) -> PathBuf {
        match self {
            Self::Explicit => target.to_path_buf(),
            Self::Extensionless(ext) => {
                let rendered = slash(target);
                let stripped = rendered.strip_suffix(ext.as_str()).unwrap_or(&rendered);
                PathBuf::from(stripped)
            }
            Self::DirectoryIndex => target.parent().unwrap_or(Path::new("")).to_path_buf(),
        }
    }
}

/// Alias-rooted specifier for `path`, using the alias with the longest
/// directory containing it.
pub fn alias_specifier(aliases: &[AliasRoot], path: &Path) -> Option<String> {
    let alias = aliases
        .iter()
        .filter(|a| path.starts_with(&a.dir))
        .max_by_key(|a| a.dir.components().count())?;
    let rest = path.strip_prefix(&alias.dir).ok()?;
    let rest = slash(rest);
    let prefix = alias.prefix.as_str();
    Some(if rest.is_empty() {
        prefix.trim_end_matches('/').to_string()
    } else if prefix.ends_with('/') {
        format!("{prefix}{rest}")
    } else {
        format!("{prefix}/{rest}")
    })
}

/// Relative specifier from a module in `from_dir` to `target`.
pub fn relative_specifier(from_dir: &Path, target: &Path) -> String {
    let from: Vec<Component> = from_dir
        .components()
        .filter(|c| matches!(c, Component::Normal(_)))
        .collect();
    let to: Vec<Component> = target
        .components()
        .filter(|c| matches!(c, Component::Normal(_)))
        .collect();
    let common = from.iter().zip(&to).take_while(|(a, b)| a == b).count();

    let mut parts: Vec<String> = vec!["..".to_string(); from.len() - common];
    parts.extend(
        to[common..]
            .iter()
            .map(|c| c.as_os_str().to_string_lossy().into_owned()),
    );
    let joined = parts.join("/");

    if joined.is_empty() {
        ".".to_string()
    } else if joined.starts_with("..") {
        joined
    } else {
        format!("./{joined}")
    }
}
