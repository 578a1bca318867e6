//
//  engine.rs
//  Restructure
//
//  Created by hak (tharun)
//

use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};

use super::resolve::Resolver;
use super::types::*;
use crate::config::AliasRoot;
use crate::source::{Module, SourceTree};

/// Reference graph over one source tree: modules as nodes, resolved
/// references as directed edges from referrer to target.
///
/// Built once per run and read-only afterwards.
#[derive(Clone)]
pub struct ReferenceGraph {
    root: PathBuf,
    modules: BTreeMap<PathBuf, Module>,
    /// Every file under the root, modules included.
    files: BTreeSet<PathBuf>,
    /// Module path -> references found in it, in source order.
    forward: BTreeMap<PathBuf, Vec<ResolvedReference>>,
    graph: DiGraph<PathBuf, ReferenceKind>,
    node_index: HashMap<PathBuf, NodeIndex>,
    diagnostics: Vec<Diagnostic>,
    aliases: Vec<AliasRoot>,
    extensions: Vec<String>,
}

impl ReferenceGraph {
    /// Assemble the graph from a scanned tree and per-module extractions.
    pub fn build(
        tree: SourceTree,
        extractions: Vec<ModuleExtraction>,
        aliases: &[AliasRoot],
        extensions: &[String],
    ) -> Self {
        let SourceTree { root, modules, files } = tree;
        let mut diagnostics = Vec::new();

        let mut modules: BTreeMap<PathBuf, Module> =
            modules.into_iter().map(|m| (m.path.clone(), m)).collect();
        for module in modules.values().filter(|m| !m.decoded) {
            diagnostics.push(Diagnostic::UndecodableModule {
                path: module.path.clone(),
            });
        }

        // Exports first: structural resolution looks at every module's set.
        let mut pending: Vec<(PathBuf, Vec<Reference>)> = Vec::with_capacity(extractions.len());
        for extraction in extractions {
            let Some(module) = modules.get_mut(&extraction.path) else {
                continue;
            };
            module.exports = extraction.exports;
            if extraction.unparsable > 0 {
                diagnostics.push(Diagnostic::UnparsableSpans {
                    path: extraction.path.clone(),
                    count: extraction.unparsable,
                });
            }
            pending.push((extraction.path, extraction.references));
        }

        let mut graph = DiGraph::new();
        let mut node_index = HashMap::with_capacity(modules.len());
        for path in modules.keys() {
            let idx = graph.add_node(path.clone());
            node_index.insert(path.clone(), idx);
        }

        let mut forward = BTreeMap::new();
        let mut edges: BTreeSet<(NodeIndex, NodeIndex, ReferenceKind)> = BTreeSet::new();
        {
            let resolver = Resolver::new(&modules, &files, aliases, extensions);
            for (path, references) in pending {
                let mut resolved = Vec::with_capacity(references.len());
                for reference in references {
                    let resolution = resolver.resolve(&reference);
                    match &resolution {
                        Resolution::Unresolved(reason) => {
                            diagnostics.push(Diagnostic::UnresolvedReference {
                                source: path.clone(),
                                specifier: reference.specifier.clone(),
                                reference_kind: reference.kind,
                                line: reference.line,
                                reason: *reason,
                            });
                        }
                        Resolution::Resolved(targets) => {
                            for target in targets.iter().filter(|t| **t != path) {
                                if let (Some(&from), Some(&to)) =
                                    (node_index.get(&path), node_index.get(target))
                                {
                                    edges.insert((from, to, reference.kind));
                                }
                            }
                        }
                    }
                    resolved.push(ResolvedReference {
                        reference,
                        resolution,
                    });
                }
                forward.insert(path, resolved);
            }
        }
        for (from, to, kind) in edges {
            graph.add_edge(from, to, kind);
        }

        Self {
            root,
            modules,
            files,
            forward,
            graph,
            node_index,
            diagnostics,
            aliases: aliases.to_vec(),
            extensions: extensions.to_vec(),
        }
    }

    // ─── Lookups ────────────────────────────────────────────────

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn modules(&self) -> impl Iterator<Item = &Module> {
        self.modules.values()
    }

    pub fn module(&self, path: &Path) -> Option<&Module> {
        self.modules.get(path)
    }

    pub fn files(&self) -> &BTreeSet<PathBuf> {
        &self.files
    }

    pub fn aliases(&self) -> &[AliasRoot] {
        &self.aliases
    }

    pub fn extensions(&self) -> &[String] {
        &self.extensions
    }

    /// A resolver over this graph's modules and alias configuration.
    pub fn resolver(&self) -> Resolver<'_> {
        Resolver::new(&self.modules, &self.files, &self.aliases, &self.extensions)
    }

    /// References found in `path`, in source order.
    pub fn references_from(&self, path: &Path) -> &[ResolvedReference] {
        self.forward.get(path).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Modules with at least one resolved reference to `path`.
    pub fn referrers_of(&self, path: &Path) -> Vec<PathBuf> {
        let Some(&idx) = self.node_index.get(path) else {
            return Vec::new();
        };
        let referrers: BTreeSet<PathBuf> = self
            .graph
            .edges_directed(idx, Direction::Incoming)
            .map(|e| self.graph[e.source()].clone())
            .collect();
        referrers.into_iter().collect()
    }

    /// Which reference kinds point at `path`.
    pub fn incoming(&self, path: &Path) -> IncomingKinds {
        let mut kinds = IncomingKinds::default();
        if let Some(&idx) = self.node_index.get(path) {
            for edge in self.graph.edges_directed(idx, Direction::Incoming) {
                kinds.mark(*edge.weight());
            }
        }
        kinds
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn unresolved(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics
            .iter()
            .filter(|d| matches!(d, Diagnostic::UnresolvedReference { .. }))
    }

    pub fn stats(&self) -> GraphStats {
        GraphStats {
            module_count: self.modules.len(),
            reference_count: self.forward.values().map(Vec::len).sum(),
            resolved_edges: self.graph.edge_count(),
            unresolved_count: self.unresolved().count(),
            unparsable_spans: self
                .diagnostics
                .iter()
                .map(|d| match d {
                    Diagnostic::UnparsableSpans { count, .. } => *count,
                    _ => 0,
                })
                .sum(),
        }
    }

    /// Serializable view of the whole graph.
    pub fn to_record(&self) -> GraphRecord<'_> {
        GraphRecord {
            root: &self.root,
            stats: self.stats(),
            modules: self
                .modules
                .values()
                .map(|m| ModuleRecord {
                    path: &m.path,
                    size_bytes: m.size_bytes,
                    exports: &m.exports,
                    references: self.references_from(&m.path),
                })
                .collect(),
            diagnostics: &self.diagnostics,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct GraphRecord<'a> {
    pub root: &'a Path,
    pub stats: GraphStats,
    pub modules: Vec<ModuleRecord<'a>>,
    pub diagnostics: &'a [Diagnostic],
}

#[derive(Debug, Serialize)]
pub struct ModuleRecord<'a> {
    pub path: &'a Path,
    pub size_bytes: u64,
    pub exports: &'a ExportSet,
    pub references: &'a [ResolvedReference],
}
