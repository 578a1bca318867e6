//
//  config.rs
//  Restructure
//
//  Created by hak (tharun)
//

use globset::{Glob, GlobBuilder};
use path_clean::PathClean;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

use crate::classify::{Category, Thresholds};
use crate::error::{RestructureError, Result};
use crate::parser::ExtractorBackend;

/// Name of the config file looked up in the project root.
pub const CONFIG_FILE: &str = "restructure.toml";

/// TypeScript project file consulted for alias roots when none are configured.
pub const TSCONFIG_FILE: &str = "tsconfig.json";

/// Top-level restructure configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RestructureConfig {
    #[serde(default)]
    pub project: ProjectConfig,
    /// Alias roots, e.g. `@/` -> `src`. Empty means read them from
    /// tsconfig.json, see [`RestructureConfig::alias_roots`].
    #[serde(default)]
    pub aliases: Vec<AliasRoot>,
    #[serde(default)]
    pub extract: ExtractConfig,
    #[serde(default)]
    pub classify: ClassifyConfig,
    /// Ordered grouping rules; first match wins.
    #[serde(default)]
    pub group: Vec<GroupRule>,
    #[serde(default)]
    pub verify: VerifyConfig,
    #[serde(default)]
    pub snapshot: SnapshotConfig,
}

/// Project-level settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectConfig {
    /// Root directory to scan (relative to the config file).
    #[serde(default = "default_root")]
    pub root: String,
    /// Directory names skipped in addition to the built-in list.
    #[serde(default)]
    pub exclude: Vec<String>,
    /// Module extensions, in resolution order.
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,
}

/// A symbolic specifier prefix standing in for a real directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AliasRoot {
    pub prefix: String,
    pub dir: PathBuf,
}

impl AliasRoot {
    pub fn new(prefix: impl Into<String>, dir: impl Into<PathBuf>) -> Self {
        Self {
            prefix: prefix.into(),
            dir: dir.into(),
        }
    }
}

/// The part of tsconfig.json that names alias roots.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TsConfig {
    #[serde(default)]
    compiler_options: CompilerOptions,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CompilerOptions {
    #[serde(default)]
    base_url: Option<String>,
    #[serde(default)]
    paths: BTreeMap<String, Vec<String>>,
}

impl TsConfig {
    /// Wildcard `paths` entries as alias roots. Exact-match keys and targets
    /// outside the project are skipped; only the first target of each key counts.
    fn alias_roots(&self) -> Vec<AliasRoot> {
        let base = PathBuf::from(self.compiler_options.base_url.as_deref().unwrap_or("."));
        self.compiler_options
            .paths
            .iter()
            .filter_map(|(key, targets)| {
                let prefix = key.strip_suffix('*')?;
                let target = targets.first()?.strip_suffix('*')?;
                let dir = base.join(target.trim_end_matches('/')).clean();
                if dir.is_absolute() || dir.components().next() == Some(Component::ParentDir) {
                    debug!(key = %key, dir = %dir.display(), "tsconfig path outside project, skipped");
                    return None;
                }
                let dir = if dir == Path::new(".") { PathBuf::new() } else { dir };
                Some(AliasRoot::new(prefix, dir))
            })
            .collect()
    }
}

/// Reference extraction settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtractConfig {
    #[serde(default)]
    pub backend: ExtractorBackend,
    /// Extraction worker count. `None` lets rayon decide.
    #[serde(default)]
    pub workers: Option<usize>,
}

/// Usage classifier settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifyConfig {
    #[serde(default = "default_small_threshold")]
    pub small_threshold: u64,
    #[serde(default = "default_large_threshold")]
    pub large_threshold: u64,
    /// Globs selecting the modules to classify. Empty means all.
    #[serde(default)]
    pub scope: Vec<String>,
}

/// One grouping rule: modules matching `pattern` (and `category`, when set)
/// move into `destination`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupRule {
    pub pattern: String,
    #[serde(default)]
    pub category: Option<Category>,
    pub destination: String,
}

/// Verification probe settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifyConfig {
    /// Shell command run after rewriting, e.g. `npx tsc --noEmit`.
    #[serde(default)]
    pub command: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

/// Snapshot persistence settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotConfig {
    /// Snapshot directory (relative to the project root).
    #[serde(default = "default_snapshot_dir")]
    pub dir: String,
}

fn default_root() -> String {
    ".".to_string()
}

fn default_extensions() -> Vec<String> {
    [".ts", ".tsx", ".js", ".jsx", ".mjs", ".cjs"]
        .iter()
        .map(|e| e.to_string())
        .collect()
}

fn default_aliases() -> Vec<AliasRoot> {
    vec![AliasRoot::new("@/", "src")]
}

fn default_small_threshold() -> u64 {
    Thresholds::default().small_bytes
}

fn default_large_threshold() -> u64 {
    Thresholds::default().large_bytes
}

fn default_timeout_secs() -> u64 {
    300
}

fn default_snapshot_dir() -> String {
    ".restructure/snapshots".to_string()
}

impl Default for RestructureConfig {
    fn default() -> Self {
        Self {
            project: ProjectConfig::default(),
            aliases: Vec::new(),
            extract: ExtractConfig::default(),
            classify: ClassifyConfig::default(),
            group: Vec::new(),
            verify: VerifyConfig::default(),
            snapshot: SnapshotConfig::default(),
        }
    }
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            root: default_root(),
            exclude: Vec::new(),
            extensions: default_extensions(),
        }
    }
}

impl Default for ClassifyConfig {
    fn default() -> Self {
        Self {
            small_threshold: default_small_threshold(),
            large_threshold: default_large_threshold(),
            scope: Vec::new(),
        }
    }
}

impl Default for VerifyConfig {
    fn default() -> Self {
        Self {
            command: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            dir: default_snapshot_dir(),
        }
    }
}

impl RestructureConfig {
    /// Load config from a TOML file. A missing file yields the defaults;
    /// a malformed one is an error.
    pub fn load(path: &Path) -> Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(contents) => toml::from_str(&contents).map_err(|e| RestructureError::Config {
                path: path.to_path_buf(),
                message: e.to_string(),
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e.into()),
        }
    }

    /// Resolve the project root relative to the config file's directory.
    pub fn resolve_root(&self, config_dir: &Path) -> PathBuf {
        config_dir.join(&self.project.root)
    }

    /// Resolve the snapshot directory under the project root.
    pub fn resolve_snapshot_dir(&self, root: &Path) -> PathBuf {
        root.join(&self.snapshot.dir)
    }

    /// Alias roots for the project at `root`: the configured `[[aliases]]`,
    /// else the wildcard `compilerOptions.paths` of `root/tsconfig.json`,
    /// else `@/` -> `src`. An unreadable tsconfig falls through to the default.
    pub fn alias_roots(&self, root: &Path) -> Vec<AliasRoot> {
        if !self.aliases.is_empty() {
            return self.aliases.clone();
        }
        let path = root.join(TSCONFIG_FILE);
        let from_tsconfig = match std::fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str::<TsConfig>(&contents) {
                Ok(tsconfig) => tsconfig.alias_roots(),
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "could not parse tsconfig.json, using default aliases");
                    Vec::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "could not read tsconfig.json, using default aliases");
                Vec::new()
            }
        };
        if from_tsconfig.is_empty() {
            default_aliases()
        } else {
            debug!(aliases = from_tsconfig.len(), "alias roots from tsconfig.json");
            from_tsconfig
        }
    }

    pub fn thresholds(&self) -> Thresholds {
        Thresholds {
            small_bytes: self.classify.small_threshold,
            large_bytes: self.classify.large_threshold,
        }
    }

    pub fn verify_timeout(&self) -> Duration {
        Duration::from_secs(self.verify.timeout_secs)
    }
}

/// Compile a path glob. `*` and `?` stop at `/`; only `**` crosses directories.
pub fn path_glob(pattern: &str) -> Result<Glob> {
    GlobBuilder::new(pattern)
        .literal_separator(true)
        .build()
        .map_err(|e| RestructureError::InvalidPattern {
            pattern: pattern.to_string(),
            message: e.to_string(),
        })
}
