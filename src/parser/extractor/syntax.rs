//! Syntax-tree extraction with tree-sitter.
//!
//! Parses each module with the JS, TS or TSX grammar and walks the tree once.
//! Error subtrees are counted and skipped; the rest of the module is still
//! extracted.

use std::path::Path;

use tracing::debug;
use tree_sitter::{Node, Parser};

use super::helpers::{finish_references, is_component_name, make_reference, node_name, node_text};
use super::pattern::PatternExtractor;
use super::ReferenceExtractor;
use crate::graph::{ExportSet, ModuleExtraction, Reference, ReferenceKind, Span};
use crate::parser::language::SupportedLanguage;

/// tree-sitter backed extractor. Files without a grammar fall back to
/// pattern scanning.
pub struct SyntaxExtractor {
    fallback: PatternExtractor,
}

impl SyntaxExtractor {
    pub fn new() -> Self {
        Self {
            fallback: PatternExtractor::new(),
        }
    }
}

impl Default for SyntaxExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl ReferenceExtractor for SyntaxExtractor {
    fn extract(&self, path: &Path, content: &str) -> ModuleExtraction {
        let Some(lang) = SupportedLanguage::from_path(path) else {
            return self.fallback.extract(path, content);
        };

        let mut parser = Parser::new();
        if parser.set_language(&lang.tree_sitter_language()).is_err() {
            debug!(path = %path.display(), "grammar rejected, using pattern scan");
            return self.fallback.extract(path, content);
        }
        let Some(tree) = parser.parse(content, None) else {
            debug!(path = %path.display(), "parse returned no tree, using pattern scan");
            return self.fallback.extract(path, content);
        };

        let mut walker = Walker {
            path,
            content,
            source: content.as_bytes(),
            markup: lang.allows_markup(),
            references: Vec::new(),
            exports: ExportSet::default(),
            unparsable: 0,
        };
        walker.visit(&tree.root_node());

        let mut references = walker.references;
        finish_references(&mut references);
        ModuleExtraction {
            path: path.to_path_buf(),
            references,
            exports: walker.exports,
            unparsable: walker.unparsable,
        }
    }
}

struct Walker<'a> {
    path: &'a Path,
    content: &'a str,
    source: &'a [u8],
    markup: bool,
    references: Vec<Reference>,
    exports: ExportSet,
    unparsable: usize,
}

impl<'a> Walker<'a> {
    fn visit(&mut self, node: &Node) {
        if node.is_error() {
            self.unparsable += 1;
            return;
        }
        if node.is_missing() {
            self.unparsable += 1;
        }

        match node.kind() {
            "import_statement" => {
                // `import x = require("...")` keeps its source on the clause.
                let source = node.child_by_field_name("source").or_else(|| {
                    (0..node.child_count())
                        .filter_map(|i| node.child(i))
                        .find(|c| c.kind() == "import_require_clause")
                        .and_then(|c| c.child_by_field_name("source"))
                });
                if let Some(source) = source {
                    self.push_literal(&source, ReferenceKind::Static);
                }
            }
            "export_statement" => {
                self.collect_exports(node);
                if let Some(source) = node.child_by_field_name("source") {
                    self.push_literal(&source, ReferenceKind::Static);
                }
            }
            "call_expression" => {
                let is_import = node
                    .child_by_field_name("function")
                    .is_some_and(|f| f.kind() == "import");
                if is_import {
                    self.push_lazy(node);
                }
            }
            "jsx_opening_element" | "jsx_self_closing_element" if self.markup => {
                if let Some(name) = node.child_by_field_name("name") {
                    let text = node_text(&name, self.source);
                    if name.kind() == "identifier" && is_component_name(text) {
                        self.references.push(make_reference(
                            self.path,
                            text,
                            ReferenceKind::Structural,
                            Span::new(name.start_byte(), name.end_byte()),
                            name.start_position().row + 1,
                            false,
                        ));
                    }
                }
            }
            _ => {}
        }

        for i in 0..node.child_count() {
            if let Some(child) = node.child(i) {
                self.visit(&child);
            }
        }
    }

    /// Record a reference whose specifier is a quoted string node.
    fn push_literal(&mut self, string: &Node, kind: ReferenceKind) {
        let start = string.start_byte() + 1;
        let end = string.end_byte().saturating_sub(1).max(start);
        let Some(text) = self.content.get(start..end) else {
            self.unparsable += 1;
            return;
        };
        self.references.push(make_reference(
            self.path,
            text,
            kind,
            Span::new(start, end),
            string.start_position().row + 1,
            false,
        ));
    }

    fn push_lazy(&mut self, call: &Node) {
        let Some(args) = call.child_by_field_name("arguments") else {
            return;
        };
        let Some(arg) = args.named_child(0) else {
            return;
        };
        let literal = match arg.kind() {
            "string" => true,
            "template_string" => !(0..arg.child_count())
                .filter_map(|i| arg.child(i))
                .any(|c| c.kind() == "template_substitution"),
            _ => false,
        };
        if literal {
            self.push_literal(&arg, ReferenceKind::Lazy);
        } else {
            self.references.push(make_reference(
                self.path,
                node_text(&arg, self.source),
                ReferenceKind::Lazy,
                Span::new(arg.start_byte(), arg.end_byte()),
                arg.start_position().row + 1,
                true,
            ));
        }
    }

    fn collect_exports(&mut self, node: &Node) {
        let mut star = false;
        for i in 0..node.child_count() {
            let Some(child) = node.child(i) else { continue };
            match child.kind() {
                "default" => self.exports.has_default = true,
                "*" => star = true,
                "namespace_export" => {
                    star = false;
                    if let Some(last) = child.named_child(child.named_child_count().saturating_sub(1)) {
                        self.exports.names.insert(node_text(&last, self.source).to_string());
                    }
                }
                "export_clause" => {
                    for j in 0..child.named_child_count() {
                        let Some(spec) = child.named_child(j) else { continue };
                        if spec.kind() != "export_specifier" {
                            continue;
                        }
                        let exported = spec
                            .child_by_field_name("alias")
                            .or_else(|| spec.child_by_field_name("name"))
                            .map(|n| node_text(&n, self.source).trim_matches(['"', '\'']).to_string());
                        match exported.as_deref() {
                            Some("default") => self.exports.has_default = true,
                            Some(name) if !name.is_empty() => {
                                self.exports.names.insert(name.to_string());
                            }
                            _ => {}
                        }
                    }
                }
                _ => {}
            }
        }
        // `export * as ns` resets the flag above; a bare star re-exports everything.
        if star && node.child_by_field_name("source").is_some() {
            self.exports.reexports_all = true;
        }

        if let Some(decl) = node.child_by_field_name("declaration") {
            self.declaration_names(&decl);
        }
    }

    fn declaration_names(&mut self, decl: &Node) {
        match decl.kind() {
            "lexical_declaration" | "variable_declaration" => {
                for i in 0..decl.named_child_count() {
                    let Some(declarator) = decl.named_child(i) else { continue };
                    if declarator.kind() != "variable_declarator" {
                        continue;
                    }
                    if let Some(name) = declarator.child_by_field_name("name") {
                        if name.kind() == "identifier" {
                            self.exports.names.insert(node_text(&name, self.source).to_string());
                        }
                    }
                }
            }
            _ => {
                if let Some(name) = node_name(decl, self.source) {
                    self.exports.names.insert(name);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reexports_and_aliases() {
        let source = "export * from './all';\nexport * as icons from './icons';\nexport { default as Button, size as buttonSize } from './Button';\n";
        let out = SyntaxExtractor::new().extract(Path::new("src/index.ts"), source);

        assert!(out.exports.reexports_all);
        assert!(out.exports.names.contains("icons"));
        assert!(out.exports.names.contains("Button"));
        assert!(out.exports.names.contains("buttonSize"));
        assert!(!out.exports.has_default);
        assert_eq!(out.references.len(), 3);
        assert_eq!(out.references[2].line, 3);
    }

    #[test]
    fn test_template_with_substitution_is_computed() {
        let source = "const load = (p) => import(`./pages/${p}`);\n";
        let out = SyntaxExtractor::new().extract(Path::new("src/routes.js"), source);
        assert_eq!(out.references.len(), 1);
        assert!(out.references[0].computed);
        assert_eq!(out.references[0].kind, ReferenceKind::Lazy);
    }

    #[test]
    fn test_member_elements_are_not_structural() {
        let source = "export const A = () => <Card.Header><Badge/></Card.Header>;\n";
        let out = SyntaxExtractor::new().extract(Path::new("src/a.jsx"), source);
        let names: Vec<_> = out.references.iter().map(|r| r.specifier.as_str()).collect();
        assert_eq!(names, vec!["Badge"]);
    }

    #[test]
    fn test_unknown_extension_falls_back() {
        let source = "import x from './x';\n";
        let out = SyntaxExtractor::new().extract(Path::new("src/page.vue"), source);
        assert_eq!(out.references.len(), 1);
        assert_eq!(out.references[0].specifier, "./x");
    }
}
