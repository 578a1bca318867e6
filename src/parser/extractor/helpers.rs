//
//  helpers.rs
//  Restructure
//
//  Created by hak (tharun)
//

use std::path::Path;

use tree_sitter::Node;

use crate::graph::{Reference, ReferenceKind, Span};

/// Get the full text of a node.
pub fn node_text<'a>(node: &Node, source: &'a [u8]) -> &'a str {
    node.utf8_text(source).unwrap_or("")
}

/// Text of a node's `name` field.
pub fn node_name(node: &Node, source: &[u8]) -> Option<String> {
    node.child_by_field_name("name")
        .map(|n| node_text(&n, source).to_string())
        .filter(|n| !n.is_empty())
}

/// Markup element names that refer to components rather than host tags.
pub fn is_component_name(name: &str) -> bool {
    name.chars().next().is_some_and(|c| c.is_ascii_uppercase())
}

/// Byte offsets of each line start, for mapping offsets to 1-indexed lines.
pub struct LineIndex {
    starts: Vec<usize>,
}

impl LineIndex {
    pub fn new(content: &str) -> Self {
        let mut starts = vec![0];
        starts.extend(content.match_indices('\n').map(|(i, _)| i + 1));
        Self { starts }
    }

    pub fn line_of(&self, offset: usize) -> usize {
        match self.starts.binary_search(&offset) {
            Ok(i) => i + 1,
            Err(i) => i,
        }
    }

    pub fn starts(&self) -> &[usize] {
        &self.starts
    }
}

pub fn make_reference(
    path: &Path,
    specifier: &str,
    kind: ReferenceKind,
    span: Span,
    line: usize,
    computed: bool,
) -> Reference {
    Reference {
        source: path.to_path_buf(),
        specifier: specifier.to_string(),
        kind,
        span,
        line,
        computed,
    }
}

/// Sort by position and drop duplicates found by overlapping patterns.
pub fn finish_references(refs: &mut Vec<Reference>) {
    refs.sort_by(|a, b| a.span.cmp(&b.span).then(a.kind.cmp(&b.kind)));
    refs.dedup_by(|a, b| a.span == b.span && a.kind == b.kind);
}

/// Split an export clause body (`a, b as c, type D`) into exported names.
pub fn clause_names(body: &str) -> impl Iterator<Item = String> + '_ {
    body.split(',').filter_map(|item| {
        let item = item.trim();
        let item = item.strip_prefix("type ").unwrap_or(item).trim();
        let exported = item.rsplit(" as ").next()?.trim();
        let exported = exported.trim_matches(|c| c == '"' || c == '\'');
        (!exported.is_empty()).then(|| exported.to_string())
    })
}
