//! Path rewriting.
//!
//! Derives the specifier replacements a move plan implies and applies them
//! to module text. Rules are keyed by whole specifier tokens: alias-rooted
//! tokens mean the same thing in every module and get [`RuleScope::Global`]
//! rules; relative tokens depend on where the referrer sits and get rules
//! scoped to the referrer's original path.

mod apply;
mod specifier;

use serde::{Serialize, Serializer};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

use crate::graph::{ReferenceGraph, SpecifierForm};
use crate::parser::ReferenceExtractor;
use crate::plan::MovePlan;

pub use apply::{apply_rules, RewriteOutcome};
pub use specifier::{alias_specifier, relative_specifier, SpecifierStyle};

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(tag = "scope", content = "referrer", rename_all = "snake_case")]
pub enum RuleScope {
    Global,
    /// Original path of the referring module.
    Referrer(PathBuf),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RewriteRule {
    pub from: String,
    pub to: String,
    pub scope: RuleScope,
}

#[derive(Debug, Error)]
pub enum RewriteError {
    #[error("conflicting rules for '{token}' in {}: '{first}' vs '{second}'", scope_label(.referrer))]
    ConflictingRule {
        token: String,
        first: String,
        second: String,
        referrer: Option<PathBuf>,
    },

    #[error("token collision in {}: '{token}' is both replaced and produced", scope_label(.referrer))]
    TokenCollision {
        token: String,
        referrer: Option<PathBuf>,
    },
}

fn scope_label(referrer: &Option<PathBuf>) -> String {
    match referrer {
        Some(path) => path.display().to_string(),
        None => "global scope".to_string(),
    }
}

/// Every rule a move plan implies. Lookup prefers a referrer-scoped rule
/// over a global one for the same token.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RewriteRules {
    global: BTreeMap<String, String>,
    scoped: BTreeMap<PathBuf, BTreeMap<String, String>>,
}

impl RewriteRules {
    pub fn is_empty(&self) -> bool {
        self.global.is_empty() && self.scoped.is_empty()
    }

    pub fn len(&self) -> usize {
        self.global.len() + self.scoped.values().map(BTreeMap::len).sum::<usize>()
    }

    /// Flattened rule list: global first, then by referrer.
    pub fn rules(&self) -> Vec<RewriteRule> {
        let global = self.global.iter().map(|(from, to)| RewriteRule {
            from: from.clone(),
            to: to.clone(),
            scope: RuleScope::Global,
        });
        let scoped = self.scoped.iter().flat_map(|(referrer, rules)| {
            rules.iter().map(move |(from, to)| RewriteRule {
                from: from.clone(),
                to: to.clone(),
                scope: RuleScope::Referrer(referrer.clone()),
            })
        });
        global.chain(scoped).collect()
    }

    /// Replacement for `token` written in the module originally at `referrer`.
    pub fn lookup(&self, referrer: &Path, token: &str) -> Option<&str> {
        self.scoped
            .get(referrer)
            .and_then(|rules| rules.get(token))
            .or_else(|| self.global.get(token))
            .map(String::as_str)
    }

    /// Original paths of every module holding at least one token with a rule.
    pub fn files_to_rewrite(&self, graph: &ReferenceGraph) -> BTreeSet<PathBuf> {
        graph
            .modules()
            .filter(|m| {
                graph.references_from(&m.path).iter().any(|r| {
                    r.reference.kind.has_path()
                        && !r.reference.computed
                        && self.lookup(&m.path, &r.reference.specifier).is_some()
                })
            })
            .map(|m| m.path.clone())
            .collect()
    }

    /// Apply the rules to one module's text.
    pub fn apply(
        &self,
        referrer: &Path,
        content: &str,
        extractor: &dyn ReferenceExtractor,
    ) -> RewriteOutcome {
        apply_rules(self, referrer, referrer, content, extractor)
    }

    fn insert_global(&mut self, from: String, to: String) -> Result<(), RewriteError> {
        insert_rule(&mut self.global, from, to, None)
    }

    fn insert_scoped(&mut self, referrer: &Path, from: String, to: String) -> Result<(), RewriteError> {
        let rules = self.scoped.entry(referrer.to_path_buf()).or_default();
        insert_rule(rules, from, to, Some(referrer))
    }

    /// No token may be both replaced and produced within one effective scope,
    /// or applying the rules twice would differ from applying them once.
    fn check_collisions(&self) -> Result<(), RewriteError> {
        if let Some(token) = self.global.values().find(|to| self.global.contains_key(*to)) {
            return Err(RewriteError::TokenCollision {
                token: token.clone(),
                referrer: None,
            });
        }
        for (referrer, scoped) in &self.scoped {
            let replaced = |token: &str| scoped.contains_key(token) || self.global.contains_key(token);
            let produced = scoped.values().chain(
                self.global
                    .iter()
                    .filter(|(from, _)| !scoped.contains_key(*from))
                    .map(|(_, to)| to),
            );
            for token in produced {
                if replaced(token.as_str()) {
                    return Err(RewriteError::TokenCollision {
                        token: token.clone(),
                        referrer: Some(referrer.clone()),
                    });
                }
            }
        }
        Ok(())
    }
}

impl Serialize for RewriteRules {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.rules().serialize(serializer)
    }
}

fn insert_rule(
    rules: &mut BTreeMap<String, String>,
    from: String,
    to: String,
    referrer: Option<&Path>,
) -> Result<(), RewriteError> {
    if from == to {
        return Ok(());
    }
    match rules.get(&from) {
        Some(existing) if *existing != to => Err(RewriteError::ConflictingRule {
            token: from,
            first: existing.clone(),
            second: to,
            referrer: referrer.map(Path::to_path_buf),
        }),
        Some(_) => Ok(()),
        None => {
            rules.insert(from, to);
            Ok(())
        }
    }
}

/// Derive the rewrite rules implied by `plan` over `graph`.
pub fn derive_rules(plan: &MovePlan, graph: &ReferenceGraph) -> Result<RewriteRules, RewriteError> {
    let mut rules = RewriteRules::default();
    let aliases = graph.aliases();
    let resolver = graph.resolver();

    // Canonical extensionless alias form of every moved module, but only
    // when that token names the moved module today. A sibling with the same
    // stem and an earlier extension keeps the token.
    for entry in plan.entries() {
        let old = alias_specifier(aliases, &entry.from.with_extension(""));
        let new = alias_specifier(aliases, &entry.to.with_extension(""));
        let (Some(old), Some(new)) = (old, new) else {
            continue;
        };
        if !matches!(resolver.resolve_path(&entry.from, &old).targets(), [only] if *only == entry.from) {
            debug!(
                module = %entry.from.display(),
                token = %old,
                "canonical token names another module, no global rule"
            );
            continue;
        }
        rules.insert_global(old, new)?;
    }

    // Every observed path reference whose meaning moves.
    for module in graph.modules() {
        let referrer = module.path.as_path();
        let new_referrer = plan.final_path(referrer);
        let new_dir = new_referrer.parent().unwrap_or(Path::new(""));

        for resolved in graph.references_from(referrer) {
            let reference = &resolved.reference;
            if !reference.kind.has_path() || reference.computed {
                continue;
            }
            let Some(target) = resolved.target() else {
                continue;
            };
            let target_moved = plan.is_moved(target);
            if !target_moved && !plan.is_moved(referrer) {
                continue;
            }
            let Some(base) = resolver.base_path(referrer, &reference.specifier) else {
                continue;
            };
            let Some(style) = SpecifierStyle::detect(&base, target, graph.extensions()) else {
                debug!(
                    referrer = %referrer.display(),
                    specifier = %reference.specifier,
                    "specifier style not recognised, leaving as is"
                );
                continue;
            };
            let new_base = style.render(&plan.final_path(target));

            match resolver.form(&reference.specifier) {
                SpecifierForm::Relative => {
                    let new = relative_specifier(new_dir, &new_base);
                    rules.insert_scoped(referrer, reference.specifier.clone(), new)?;
                }
                SpecifierForm::Alias if target_moved => match alias_specifier(aliases, &new_base) {
                    Some(new) => rules.insert_global(reference.specifier.clone(), new)?,
                    None => {
                        let new = relative_specifier(new_dir, &new_base);
                        rules.insert_scoped(referrer, reference.specifier.clone(), new)?;
                    }
                },
                SpecifierForm::Alias | SpecifierForm::Bare => {}
            }
        }
    }

    rules.check_collisions()?;
    debug!(rules = rules.len(), "rewrite rules derived");
    Ok(rules)
}
