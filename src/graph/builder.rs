//
//  builder.rs
//  Restructure
//
//  Created by hak (tharun)
//

use rayon::prelude::*;
use tracing::{debug, info, warn};

use super::engine::ReferenceGraph;
use super::types::ModuleExtraction;
use crate::config::RestructureConfig;
use crate::parser::ReferenceExtractor;
use crate::source::{Module, SourceTree};

/// Run the extractor over every decodable module on a rayon pool.
///
/// Results come back sorted by path, so the worker count never changes
/// the outcome.
pub fn extract_all(
    modules: &[Module],
    extractor: &dyn ReferenceExtractor,
    workers: Option<usize>,
) -> Vec<ModuleExtraction> {
    let run = || -> Vec<ModuleExtraction> {
        modules
            .par_iter()
            .filter(|m| m.decoded)
            .map(|m| extractor.extract(&m.path, &m.content))
            .collect()
    };

    let mut extractions = match rayon::ThreadPoolBuilder::new()
        .num_threads(workers.unwrap_or(0))
        .build()
    {
        Ok(pool) => pool.install(run),
        Err(e) => {
            warn!(error = %e, "extraction pool unavailable, running sequentially");
            modules
                .iter()
                .filter(|m| m.decoded)
                .map(|m| extractor.extract(&m.path, &m.content))
                .collect()
        }
    };
    extractions.sort_by(|a, b| a.path.cmp(&b.path));
    debug!(modules = extractions.len(), "extraction finished");
    extractions
}

/// Build a reference graph from a scanned tree using the configured backend.
pub fn build_graph(tree: SourceTree, config: &RestructureConfig) -> ReferenceGraph {
    let extractor = config.extract.backend.extractor();
    let extractions = extract_all(&tree.modules, extractor.as_ref(), config.extract.workers);
    let aliases = config.alias_roots(&tree.root);
    let graph = ReferenceGraph::build(
        tree,
        extractions,
        &aliases,
        &config.project.extensions,
    );

    let stats = graph.stats();
    info!(
        modules = stats.module_count,
        references = stats.reference_count,
        edges = stats.resolved_edges,
        unresolved = stats.unresolved_count,
        unparsable = stats.unparsable_spans,
        "reference graph built"
    );
    graph
}
