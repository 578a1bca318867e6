//
//  resolve.rs
//  Restructure
//
//  Created by hak (tharun)
//

use path_clean::PathClean;
use std::collections::{BTreeMap, BTreeSet};
use std::ffi::OsString;
use std::path::{Component, Path, PathBuf};

use super::types::{Reference, ReferenceKind, Resolution, UnresolvedReason};
use crate::config::AliasRoot;
use crate::source::{module_name, Module};

/// Specifier forms a path reference can take.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpecifierForm {
    /// `./x`, `../x`, `.` or `..`
    Relative,
    /// Starts with a configured alias prefix.
    Alias,
    /// Anything else: a package name.
    Bare,
}

pub fn is_relative(specifier: &str) -> bool {
    specifier == "."
        || specifier == ".."
        || specifier.starts_with("./")
        || specifier.starts_with("../")
}

/// Maps references to modules in one source tree.
pub struct Resolver<'a> {
    modules: &'a BTreeMap<PathBuf, Module>,
    files: &'a BTreeSet<PathBuf>,
    /// Longest prefix first.
    aliases: Vec<&'a AliasRoot>,
    extensions: &'a [String],
}

impl<'a> Resolver<'a> {
    pub fn new(
        modules: &'a BTreeMap<PathBuf, Module>,
        files: &'a BTreeSet<PathBuf>,
        aliases: &'a [AliasRoot],
        extensions: &'a [String],
    ) -> Self {
        let mut aliases: Vec<&AliasRoot> = aliases.iter().collect();
        aliases.sort_by(|a, b| b.prefix.len().cmp(&a.prefix.len()));
        Self {
            modules,
            files,
            aliases,
            extensions,
        }
    }

    pub fn form(&self, specifier: &str) -> SpecifierForm {
        if is_relative(specifier) {
            SpecifierForm::Relative
        } else if self.alias_for(specifier).is_some() {
            SpecifierForm::Alias
        } else {
            SpecifierForm::Bare
        }
    }

    fn alias_for(&self, specifier: &str) -> Option<&'a AliasRoot> {
        self.aliases
            .iter()
            .copied()
            .find(|a| specifier.starts_with(a.prefix.as_str()))
    }

    pub fn resolve(&self, reference: &Reference) -> Resolution {
        if reference.computed {
            return Resolution::Unresolved(UnresolvedReason::Computed);
        }
        match reference.kind {
            ReferenceKind::Structural => self.resolve_structural(reference),
            ReferenceKind::Static | ReferenceKind::Lazy => {
                self.resolve_path(&reference.source, &reference.specifier)
            }
        }
    }

    /// The root-relative path a specifier names, before extension and
    /// index probing. `None` for bare specifiers.
    pub fn base_path(&self, referrer: &Path, specifier: &str) -> Option<PathBuf> {
        let base = match self.form(specifier) {
            SpecifierForm::Bare => return None,
            SpecifierForm::Relative => {
                let dir = referrer.parent().unwrap_or(Path::new(""));
                dir.join(specifier)
            }
            SpecifierForm::Alias => {
                let alias = self.alias_for(specifier)?;
                let rest = specifier[alias.prefix.len()..].trim_start_matches('/');
                alias.dir.join(rest)
            }
        };
        Some(base.clean())
    }

    /// Resolve a path specifier written inside `referrer`.
    pub fn resolve_path(&self, referrer: &Path, specifier: &str) -> Resolution {
        let Some(base) = self.base_path(referrer, specifier) else {
            return Resolution::Unresolved(UnresolvedReason::External);
        };
        if escapes_root(&base) {
            return Resolution::Unresolved(UnresolvedReason::NotFound);
        }
        match self.probe(&base) {
            Some(path) => Resolution::Resolved(vec![path]),
            None => Resolution::Unresolved(UnresolvedReason::NotFound),
        }
    }

    /// Exact path, then `base.<ext>`, then `base/index.<ext>`, extensions
    /// in configured order.
    fn probe(&self, base: &Path) -> Option<PathBuf> {
        if base.as_os_str().is_empty() || base == Path::new(".") {
            return self.probe_index(Path::new(""));
        }
        if self.modules.contains_key(base) || self.files.contains(base) {
            return Some(base.to_path_buf());
        }
        for ext in self.extensions {
            let mut name = OsString::from(base.as_os_str());
            name.push(ext);
            let candidate = PathBuf::from(name);
            if self.modules.contains_key(&candidate) {
                return Some(candidate);
            }
        }
        self.probe_index(base)
    }

    fn probe_index(&self, dir: &Path) -> Option<PathBuf> {
        self.extensions
            .iter()
            .map(|ext| dir.join(format!("index{ext}")))
            .find(|candidate| self.modules.contains_key(candidate))
    }

    /// Match a markup identifier against module names and export names,
    /// case-insensitively. Every match is kept.
    fn resolve_structural(&self, reference: &Reference) -> Resolution {
        let ident = reference.specifier.as_str();
        let targets: Vec<PathBuf> = self
            .modules
            .values()
            .filter(|m| m.path != reference.source)
            .filter(|m| {
                let by_name = module_name(&m.path)
                    .is_some_and(|n| n.eq_ignore_ascii_case(ident))
                    && m.exports.is_exported();
                by_name || m.exports.exports_name(ident)
            })
            .map(|m| m.path.clone())
            .collect();

        if targets.is_empty() {
            Resolution::Unresolved(UnresolvedReason::NoExportMatch)
        } else {
            Resolution::Resolved(targets)
        }
    }
}

fn escapes_root(path: &Path) -> bool {
    path.is_absolute() || matches!(path.components().next(), Some(Component::ParentDir))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::Span;

    fn modules(paths: &[&str]) -> BTreeMap<PathBuf, Module> {
        paths
            .iter()
            .map(|p| (PathBuf::from(p), Module::new(*p, "")))
            .collect()
    }

    fn exts() -> Vec<String> {
        [".ts", ".tsx", ".js", ".jsx"].iter().map(|s| s.to_string()).collect()
    }

    fn reference(source: &str, spec: &str, kind: ReferenceKind) -> Reference {
        Reference {
            source: PathBuf::from(source),
            specifier: spec.to_string(),
            kind,
            span: Span::new(0, spec.len()),
            line: 1,
            computed: false,
        }
    }

    #[test]
    fn test_relative_and_alias() {
        let mods = modules(&[
            "src/lib/apiClient.ts",
            "src/lib/apiClientExtra.ts",
            "src/components/Card/index.tsx",
            "src/pages/home.tsx",
        ]);
        let files = BTreeSet::new();
        let aliases = vec![AliasRoot::new("@/", "src")];
        let exts = exts();
        let r = Resolver::new(&mods, &files, &aliases, &exts);

        assert_eq!(
            r.resolve_path(Path::new("src/pages/home.tsx"), "../lib/apiClient"),
            Resolution::Resolved(vec![PathBuf::from("src/lib/apiClient.ts")])
        );
        assert_eq!(
            r.resolve_path(Path::new("src/pages/home.tsx"), "@/lib/apiClientExtra"),
            Resolution::Resolved(vec![PathBuf::from("src/lib/apiClientExtra.ts")])
        );
        assert_eq!(
            r.resolve_path(Path::new("src/pages/home.tsx"), "@/components/Card"),
            Resolution::Resolved(vec![PathBuf::from("src/components/Card/index.tsx")])
        );
        assert_eq!(
            r.resolve_path(Path::new("src/pages/home.tsx"), "react"),
            Resolution::Unresolved(UnresolvedReason::External)
        );
        assert_eq!(
            r.resolve_path(Path::new("src/pages/home.tsx"), "./missing"),
            Resolution::Unresolved(UnresolvedReason::NotFound)
        );
        assert_eq!(
            r.resolve_path(Path::new("src/home.ts"), "../../outside"),
            Resolution::Unresolved(UnresolvedReason::NotFound)
        );
    }

    #[test]
    fn test_extension_order_is_respected() {
        let mods = modules(&["src/a.js", "src/a.ts"]);
        let files = BTreeSet::new();
        let exts = exts();
        let r = Resolver::new(&mods, &files, &[], &exts);
        assert_eq!(
            r.resolve_path(Path::new("src/b.ts"), "./a"),
            Resolution::Resolved(vec![PathBuf::from("src/a.ts")])
        );
    }

    #[test]
    fn test_structural_requires_export() {
        let mut mods = modules(&["src/Button.tsx", "src/Modal.tsx", "src/ui/kit.ts", "src/page.tsx"]);
        mods.get_mut(Path::new("src/Button.tsx")).unwrap().exports.has_default = true;
        mods.get_mut(Path::new("src/ui/kit.ts"))
            .unwrap()
            .exports
            .names
            .insert("Button".to_string());
        let files = BTreeSet::new();
        let exts = exts();
        let r = Resolver::new(&mods, &files, &[], &exts);

        let button = r.resolve(&reference("src/page.tsx", "Button", ReferenceKind::Structural));
        assert_eq!(
            button,
            Resolution::Resolved(vec![PathBuf::from("src/Button.tsx"), PathBuf::from("src/ui/kit.ts")])
        );
        // Modal.tsx exports nothing.
        let modal = r.resolve(&reference("src/page.tsx", "Modal", ReferenceKind::Structural));
        assert_eq!(modal, Resolution::Unresolved(UnresolvedReason::NoExportMatch));
    }

    #[test]
    fn test_computed_is_unresolved() {
        let mods = modules(&[]);
        let files = BTreeSet::new();
        let r = Resolver::new(&mods, &files, &[], &[]);
        let mut reference = reference("src/a.ts", "name", ReferenceKind::Lazy);
        reference.computed = true;
        assert_eq!(
            r.resolve(&reference),
            Resolution::Unresolved(UnresolvedReason::Computed)
        );
    }
}
