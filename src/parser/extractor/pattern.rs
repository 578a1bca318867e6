//! Regex extraction over raw module text.
//!
//! Used when a file has no grammar, and selectable as a whole backend. It
//! only understands statement-level imports and exports at line starts.

use std::path::Path;
use std::sync::LazyLock;

use regex::{Captures, Match, Regex};

use super::helpers::{clause_names, finish_references, is_component_name, make_reference, LineIndex};
use super::ReferenceExtractor;
use crate::graph::{ExportSet, ModuleExtraction, Reference, ReferenceKind, Span};
use crate::parser::language::SupportedLanguage;

fn compile(pattern: &str) -> Regex {
    Regex::new(pattern).expect("built-in pattern compiles")
}

// ─── References ────────────────────────────────────────────────

static STATIC_FROM: LazyLock<Regex> = LazyLock::new(|| {
    compile(r#"(?m)^[ \t]*(?:import|export)\b[^'"`;()=]*?\bfrom\s*(?:'([^'\n]*)'|"([^"\n]*)")"#)
});

static SIDE_EFFECT: LazyLock<Regex> =
    LazyLock::new(|| compile(r#"(?m)^[ \t]*import\s*(?:'([^'\n]*)'|"([^"\n]*)")"#));

static IMPORT_REQUIRE: LazyLock<Regex> = LazyLock::new(|| {
    compile(r#"(?m)^[ \t]*import\s+[A-Za-z_$][\w$]*\s*=\s*require\s*\(\s*(?:'([^'\n]*)'|"([^"\n]*)")\s*\)"#)
});

static LAZY_LITERAL: LazyLock<Regex> = LazyLock::new(|| {
    compile(r#"\bimport\s*\(\s*(?:'([^'\n]*)'|"([^"\n]*)"|`([^`]*)`)\s*\)"#)
});

static LAZY_COMPUTED: LazyLock<Regex> =
    LazyLock::new(|| compile(r#"\bimport\s*\(\s*([^'"`\s)][^)]*)\)"#));

static MARKUP: LazyLock<Regex> =
    LazyLock::new(|| compile(r"(?:^|[^A-Za-z0-9_$.])<([A-Z][A-Za-z0-9_]*)"));

static IMPORT_LINE: LazyLock<Regex> = LazyLock::new(|| compile(r"(?m)^[ \t]*import\b"));

// ─── Exports ───────────────────────────────────────────────────

static EXPORT_DEFAULT: LazyLock<Regex> = LazyLock::new(|| {
    compile(r"(?m)^[ \t]*export\s+default\b(?:\s+(?:async\s+)?(?:function\s*\*?|class)\s*([A-Za-z_$][\w$]*))?")
});

static EXPORT_DECL: LazyLock<Regex> = LazyLock::new(|| {
    compile(
        r"(?m)^[ \t]*export\s+(?:declare\s+)?(?:async\s+)?(?:const|let|var|function\s*\*?|abstract\s+class|class|interface|type|enum|namespace)\s+([A-Za-z_$][\w$]*)",
    )
});

static EXPORT_CLAUSE: LazyLock<Regex> =
    LazyLock::new(|| compile(r"(?m)^[ \t]*export\s+(?:type\s+)?\{([^}]*)\}"));

static EXPORT_STAR: LazyLock<Regex> = LazyLock::new(|| {
    compile(r"(?m)^[ \t]*export\s+(?:type\s+)?\*\s*(?:as\s+([A-Za-z_$][\w$]*)\s*)?from\b")
});

/// First participating group among quote alternatives.
fn quoted<'h>(caps: &Captures<'h>) -> Option<Match<'h>> {
    (1..caps.len()).find_map(|i| caps.get(i))
}

/// Regex scanner. Stateless; the patterns are compiled once per process.
#[derive(Debug, Clone, Copy, Default)]
pub struct PatternExtractor;

impl PatternExtractor {
    pub fn new() -> Self {
        Self
    }
}

impl ReferenceExtractor for PatternExtractor {
    fn extract(&self, path: &Path, content: &str) -> ModuleExtraction {
        let lines = LineIndex::new(content);
        let mut references: Vec<Reference> = Vec::new();
        let mut covered: Vec<(usize, usize)> = Vec::new();

        let push = |m: Match, kind: ReferenceKind, computed: bool, refs: &mut Vec<Reference>| {
            refs.push(make_reference(
                path,
                m.as_str(),
                kind,
                Span::new(m.start(), m.end()),
                lines.line_of(m.start()),
                computed,
            ));
        };

        for re in [&*STATIC_FROM, &*SIDE_EFFECT, &*IMPORT_REQUIRE] {
            for caps in re.captures_iter(content) {
                let Some(whole) = caps.get(0) else { continue };
                covered.push((whole.start(), whole.end()));
                if let Some(spec) = quoted(&caps) {
                    push(spec, ReferenceKind::Static, false, &mut references);
                }
            }
        }

        for caps in LAZY_LITERAL.captures_iter(content) {
            if let Some(spec) = quoted(&caps) {
                let computed = spec.as_str().contains("${");
                push(spec, ReferenceKind::Lazy, computed, &mut references);
            }
        }
        for caps in LAZY_COMPUTED.captures_iter(content) {
            if let Some(expr) = caps.get(1) {
                let text = expr.as_str().trim_end();
                references.push(make_reference(
                    path,
                    text,
                    ReferenceKind::Lazy,
                    Span::new(expr.start(), expr.start() + text.len()),
                    lines.line_of(expr.start()),
                    true,
                ));
            }
        }

        let markup = SupportedLanguage::from_path(path).map_or(true, |l| l.allows_markup());
        if markup {
            for caps in MARKUP.captures_iter(content) {
                let Some(name) = caps.get(1) else { continue };
                // `<Card.Header>` names a member, not a module.
                if content[name.end()..].starts_with('.') || !is_component_name(name.as_str()) {
                    continue;
                }
                push(name, ReferenceKind::Structural, false, &mut references);
            }
        }

        let unparsable = IMPORT_LINE
            .find_iter(content)
            .filter(|m| !covered.iter().any(|&(s, e)| s <= m.start() && m.start() < e))
            .filter(|m| {
                let rest = content[m.end()..].trim_start();
                !(rest.starts_with('(') || rest.starts_with('.'))
            })
            .count();

        finish_references(&mut references);
        ModuleExtraction {
            path: path.to_path_buf(),
            references,
            exports: scan_exports(content),
            unparsable,
        }
    }
}

fn scan_exports(content: &str) -> ExportSet {
    let mut exports = ExportSet::default();

    for caps in EXPORT_DEFAULT.captures_iter(content) {
        exports.has_default = true;
        if let Some(name) = caps.get(1) {
            exports.names.insert(name.as_str().to_string());
        }
    }
    for caps in EXPORT_DECL.captures_iter(content) {
        if let Some(name) = caps.get(1) {
            exports.names.insert(name.as_str().to_string());
        }
    }
    for caps in EXPORT_CLAUSE.captures_iter(content) {
        let Some(body) = caps.get(1) else { continue };
        for name in clause_names(body.as_str()) {
            if name == "default" {
                exports.has_default = true;
            } else {
                exports.names.insert(name);
            }
        }
    }
    for caps in EXPORT_STAR.captures_iter(content) {
        match caps.get(1) {
            Some(ns) => {
                exports.names.insert(ns.as_str().to_string());
            }
            None => exports.reexports_all = true,
        }
    }

    exports
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_side_effect_and_require_imports() {
        let source = "import './polyfill';\nimport fs = require(\"fs\");\n";
        let out = PatternExtractor::new().extract(Path::new("src/setup.ts"), source);
        let specs: Vec<_> = out.references.iter().map(|r| r.specifier.as_str()).collect();
        assert_eq!(specs, vec!["./polyfill", "fs"]);
        assert_eq!(out.references[1].line, 2);
        assert_eq!(out.unparsable, 0);
    }

    #[test]
    fn test_import_meta_is_not_unparsable() {
        let source = "const url = new URL('./x', import.meta.url);\nimport('./lazy');\n";
        let out = PatternExtractor::new().extract(Path::new("src/a.js"), source);
        assert_eq!(out.unparsable, 0);
        assert_eq!(out.references.len(), 1);
        assert_eq!(out.references[0].kind, ReferenceKind::Lazy);
    }

    #[test]
    fn test_commented_imports_ignored() {
        let source = "// import Old from './Old';\nimport New from './New';\n";
        let out = PatternExtractor::new().extract(Path::new("src/a.ts"), source);
        assert_eq!(out.references.len(), 1);
        assert_eq!(out.references[0].specifier, "./New");
    }

    #[test]
    fn test_export_scan() {
        let source = "export default class Store {}\nexport type { Item } from './item';\nexport * from './all';\nexport enum Mode { A }\n";
        let exports = scan_exports(source);
        assert!(exports.has_default);
        assert!(exports.reexports_all);
        assert!(exports.names.contains("Store"));
        assert!(exports.names.contains("Item"));
        assert!(exports.names.contains("Mode"));
    }
}
