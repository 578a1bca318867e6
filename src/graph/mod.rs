//! Reference graph: every module in the tree and the references between them.
//!
//! Extraction runs in parallel, resolution maps specifiers onto modules, and
//! the engine stores the result as a petgraph with forward and reverse lookup.

pub mod builder;
pub mod engine;
pub mod resolve;
pub mod types;

pub use builder::{build_graph, extract_all};
pub use engine::{GraphRecord, ModuleRecord, ReferenceGraph};
pub use resolve::{is_relative, Resolver, SpecifierForm};
pub use types::{
    Diagnostic, ExportSet, GraphStats, IncomingKinds, ModuleExtraction, Reference, ReferenceKind,
    Resolution, ResolvedReference, Span, UnresolvedReason,
};
