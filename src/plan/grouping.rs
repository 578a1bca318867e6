//
//  grouping.rs
//  Restructure
//
//  Created by hak (tharun)
//

use globset::GlobMatcher;
use std::path::{Path, PathBuf};

use crate::classify::Category;
use crate::config::{path_glob, GroupRule};
use crate::error::{RestructureError, Result};
use crate::source::slash;

/// Decides where a module should live. `None` means it stays put.
pub trait GroupingPolicy {
    fn destination(&self, path: &Path, category: Option<Category>) -> Option<PathBuf>;
}

impl<F> GroupingPolicy for F
where
    F: Fn(&Path, Option<Category>) -> Option<PathBuf>,
{
    fn destination(&self, path: &Path, category: Option<Category>) -> Option<PathBuf> {
        self(path, category)
    }
}

struct CompiledRule {
    matcher: GlobMatcher,
    category: Option<Category>,
    destination: PathBuf,
}

/// Ordered glob rules from `[[group]]` config. First match wins.
pub struct RuleGrouping {
    rules: Vec<CompiledRule>,
}

impl RuleGrouping {
    pub fn from_rules(rules: &[GroupRule]) -> Result<Self> {
        let rules = rules
            .iter()
            .map(|rule| {
                Ok(CompiledRule {
                    matcher: path_glob(&rule.pattern)?.compile_matcher(),
                    category: rule.category,
                    destination: PathBuf::from(&rule.destination),
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { rules })
    }
}

impl GroupingPolicy for RuleGrouping {
    fn destination(&self, path: &Path, category: Option<Category>) -> Option<PathBuf> {
        let rendered = slash(path);
        self.rules
            .iter()
            .find(|rule| {
                rule.matcher.is_match(&rendered)
                    && rule.category.map_or(true, |c| category == Some(c))
            })
            .map(|rule| rule.destination.clone())
    }
}
