//
//  mod.rs
//  Restructure
//
//  Created by hak (tharun)
//

mod helpers;
mod pattern;
mod syntax;

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::graph::ModuleExtraction;

pub use pattern::PatternExtractor;
pub use syntax::SyntaxExtractor;

/// Scans module text for references and export declarations.
///
/// Implementations never fail: anything they cannot make sense of is
/// skipped and counted in [`ModuleExtraction::unparsable`].
pub trait ReferenceExtractor: Send + Sync {
    fn extract(&self, path: &Path, content: &str) -> ModuleExtraction;
}

/// Which extractor to use.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractorBackend {
    /// tree-sitter syntax trees (JS, TS, TSX grammars).
    #[default]
    Syntax,
    /// Regex scanning over raw text.
    Pattern,
}

impl ExtractorBackend {
    pub fn extractor(self) -> Box<dyn ReferenceExtractor> {
        match self {
            ExtractorBackend::Syntax => Box::new(SyntaxExtractor::new()),
            ExtractorBackend::Pattern => Box::new(PatternExtractor::new()),
        }
    }
}

/// Extract references and exports from a source file with the default backend.
pub fn extract_file(path: &Path, source: &str) -> ModuleExtraction {
    SyntaxExtractor::new().extract(path, source)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{Reference, ReferenceKind};

    fn specs(refs: &[Reference], kind: ReferenceKind) -> Vec<String> {
        refs.iter()
            .filter(|r| r.kind == kind && !r.computed)
            .map(|r| r.specifier.clone())
            .collect()
    }

    const PAGE: &str = r#"import React, { useState } from 'react';
import { apiClient } from "@/lib/apiClient";
import type { Props } from './types';
import './styles.css';
import {
  formatDate,
  formatMoney,
} from '../utils/format';
export { Badge } from './Badge';
import dynamic from 'next/dynamic';

const Editor = dynamic(() => import('@/components/editor/Editor'), { ssr: false });
const lazyChart = () => import(`./Chart`);
const computed = (name) => import(name);

export default function Page({ title }: Props) {
  const [open, setOpen] = useState(false);
  return (
    <Layout title={title}>
      <Editor />
      <div className="x"><Card.Header /></div>
    </Layout>
  );
}

export const helper = () => 1;
export function util() {}
"#;

    fn check_contract(extractor: &dyn ReferenceExtractor) {
        let out = extractor.extract(Path::new("pages/index.tsx"), PAGE);

        assert_eq!(
            specs(&out.references, ReferenceKind::Static),
            vec![
                "react",
                "@/lib/apiClient",
                "./types",
                "./styles.css",
                "../utils/format",
                "./Badge",
                "next/dynamic",
            ]
        );
        assert_eq!(
            specs(&out.references, ReferenceKind::Lazy),
            vec!["@/components/editor/Editor", "./Chart"]
        );
        assert!(out
            .references
            .iter()
            .any(|r| r.kind == ReferenceKind::Lazy && r.computed));

        let structural = specs(&out.references, ReferenceKind::Structural);
        assert!(structural.contains(&"Layout".to_string()));
        assert!(structural.contains(&"Editor".to_string()));
        assert!(!structural.iter().any(|s| s == "div"));

        // Spans point at the specifier text, quotes excluded.
        for r in out.references.iter().filter(|r| !r.computed) {
            assert_eq!(&PAGE[r.span.start..r.span.end], r.specifier);
        }
        // Ordered by position.
        assert!(out
            .references
            .windows(2)
            .all(|w| w[0].span.start <= w[1].span.start));

        assert!(out.exports.has_default);
        assert!(out.exports.names.contains("helper"));
        assert!(out.exports.names.contains("util"));
        assert!(out.exports.names.contains("Badge"));
        assert!(out.exports.names.contains("Page"));
    }

    fn check_malformed(extractor: &dyn ReferenceExtractor) {
        let source = "import { a } from './ok';\nimport { broken from \nconst x = ;\nimport b from './also-ok';\n";
        let out = extractor.extract(Path::new("src/bad.ts"), source);

        let statics = specs(&out.references, ReferenceKind::Static);
        assert!(statics.contains(&"./ok".to_string()));
        assert!(out.unparsable > 0);
    }

    fn check_prefix_tokens(extractor: &dyn ReferenceExtractor) {
        let source = "import a from '@/lib/apiClient';\nimport b from '@/lib/apiClientExtra';\n";
        let out = extractor.extract(Path::new("src/x.ts"), source);
        assert_eq!(
            specs(&out.references, ReferenceKind::Static),
            vec!["@/lib/apiClient", "@/lib/apiClientExtra"]
        );
    }

    #[test]
    fn test_syntax_backend_contract() {
        let extractor = SyntaxExtractor::new();
        check_contract(&extractor);
        check_malformed(&extractor);
        check_prefix_tokens(&extractor);
    }

    #[test]
    fn test_pattern_backend_contract() {
        let extractor = PatternExtractor::new();
        check_contract(&extractor);
        check_malformed(&extractor);
        check_prefix_tokens(&extractor);
    }

    #[test]
    fn test_plain_ts_has_no_markup() {
        let source = "const xs = <Array<string>>load();\nexport type Box = Promise<User>;\n";
        for backend in [ExtractorBackend::Syntax, ExtractorBackend::Pattern] {
            let out = backend.extractor().extract(Path::new("src/load.ts"), source);
            assert!(specs(&out.references, ReferenceKind::Structural).is_empty());
        }
    }
}
