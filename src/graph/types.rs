//
//  types.rs
//  Restructure
//
//  Created by hak (tharun)
//

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::PathBuf;

/// How one module refers to another.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceKind {
    /// `import X from "spec"`, side-effect imports, `export … from "spec"`.
    Static,
    /// `import("spec")`, usually inside a loader call.
    Lazy,
    /// `<Name />` markup element; the specifier is the bare identifier.
    Structural,
}

impl ReferenceKind {
    /// Static and lazy references carry a path specifier that can be rewritten.
    pub fn has_path(&self) -> bool {
        !matches!(self, ReferenceKind::Structural)
    }
}

/// Byte range of a specifier inside its module, quotes excluded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }
}

/// A textual reference found in one module. Created by the extractor and
/// never modified afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reference {
    /// Module the reference was found in.
    pub source: PathBuf,
    /// Literal specifier text, or the identifier for structural references.
    pub specifier: String,
    pub kind: ReferenceKind,
    pub span: Span,
    /// 1-indexed line of the specifier.
    pub line: usize,
    /// The target is an expression rather than a literal.
    #[serde(default)]
    pub computed: bool,
}

/// Names a module declares as exported.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportSet {
    pub names: BTreeSet<String>,
    pub has_default: bool,
    /// `export * from …` present.
    pub reexports_all: bool,
}

impl ExportSet {
    pub fn is_exported(&self) -> bool {
        self.has_default || self.reexports_all || !self.names.is_empty()
    }

    /// Case-insensitive export name lookup.
    pub fn exports_name(&self, name: &str) -> bool {
        self.names.iter().any(|n| n.eq_ignore_ascii_case(name))
    }
}

/// Everything the extractor found in one module.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModuleExtraction {
    pub path: PathBuf,
    /// Ordered by span start.
    pub references: Vec<Reference>,
    pub exports: ExportSet,
    /// Spans the extractor could not make sense of and skipped.
    pub unparsable: usize,
}

/// Why a reference did not resolve to a known module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnresolvedReason {
    /// Bare package specifier (`react`, `next/router`).
    External,
    /// Relative or alias path with no module behind it.
    NotFound,
    /// Non-literal specifier.
    Computed,
    /// Structural identifier matching no exported module.
    NoExportMatch,
}

/// Outcome of resolving a reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "targets", rename_all = "snake_case")]
pub enum Resolution {
    /// Static and lazy references resolve to one module; structural
    /// references may match several.
    Resolved(Vec<PathBuf>),
    Unresolved(UnresolvedReason),
}

impl Resolution {
    pub fn targets(&self) -> &[PathBuf] {
        match self {
            Resolution::Resolved(targets) => targets,
            Resolution::Unresolved(_) => &[],
        }
    }

    pub fn is_resolved(&self) -> bool {
        matches!(self, Resolution::Resolved(_))
    }
}

/// A reference together with its resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedReference {
    pub reference: Reference,
    pub resolution: Resolution,
}

impl ResolvedReference {
    /// The single target of a path reference, if resolved.
    pub fn target(&self) -> Option<&PathBuf> {
        match self.resolution.targets() {
            [single] => Some(single),
            _ => None,
        }
    }
}

/// Non-fatal findings collected while building the graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Diagnostic {
    UnresolvedReference {
        source: PathBuf,
        specifier: String,
        reference_kind: ReferenceKind,
        line: usize,
        reason: UnresolvedReason,
    },
    UnparsableSpans {
        path: PathBuf,
        count: usize,
    },
    UndecodableModule {
        path: PathBuf,
    },
}

/// Which kinds of references point at a module.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncomingKinds {
    pub statically: bool,
    pub lazily: bool,
    pub structurally: bool,
}

impl IncomingKinds {
    pub fn any(&self) -> bool {
        self.statically || self.lazily || self.structurally
    }

    pub(crate) fn mark(&mut self, kind: ReferenceKind) {
        match kind {
            ReferenceKind::Static => self.statically = true,
            ReferenceKind::Lazy => self.lazily = true,
            ReferenceKind::Structural => self.structurally = true,
        }
    }
}

/// Summary counts for a built graph.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GraphStats {
    pub module_count: usize,
    pub reference_count: usize,
    pub resolved_edges: usize,
    pub unresolved_count: usize,
    pub unparsable_spans: usize,
}
