//
//  apply.rs
//  Restructure
//
//  Created by hak (tharun)
//

use std::path::Path;

use serde::Serialize;

use super::RewriteRules;
use crate::parser::ReferenceExtractor;

/// Result of rewriting one module's text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RewriteOutcome {
    #[serde(skip)]
    pub content: String,
    pub replacements: usize,
}

impl RewriteOutcome {
    pub fn changed(&self) -> bool {
        self.replacements > 0
    }
}

/// Rewrite every path specifier in `content` that has a rule in scope for
/// `referrer` (the module's original path).
///
/// Spans come from a fresh extraction of `content`, so only whole specifier
/// literals are replaced. `language_path` picks the extractor grammar.
pub fn apply_rules(
    rules: &RewriteRules,
    referrer: &Path,
    language_path: &Path,
    content: &str,
    extractor: &dyn ReferenceExtractor,
) -> RewriteOutcome {
    let extraction = extractor.extract(language_path, content);

    let mut edits: Vec<(usize, usize, &str)> = extraction
        .references
        .iter()
        .filter(|r| r.kind.has_path() && !r.computed)
        .filter_map(|r| {
            rules
                .lookup(referrer, &r.specifier)
                .map(|new| (r.span.start, r.span.end, new))
        })
        .collect();
    edits.sort_by(|a, b| b.0.cmp(&a.0));

    let mut out = content.to_string();
    let mut replacements = 0;
    let mut floor = usize::MAX;
    for (start, end, new) in edits {
        // Back to front; overlapping spans cannot both apply.
        if end > floor {
            continue;
        }
        out.replace_range(start..end, new);
        floor = start;
        replacements += 1;
    }

    RewriteOutcome {
        content: out,
        replacements,
    }
}
