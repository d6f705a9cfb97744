//! Settings and ignore rules.
//!
//! Settings are read from a TOML file and validated before any component is
//! built from them. Every field has a default, so an empty file (or no file)
//! is a valid configuration once a watched root is supplied.
//!
//! # Configuration File Format
//!
//! ```toml
//! [watch]
//! root = "/Users/me/Downloads"
//! workers = 5
//! poll_interval_ms = 1000
//! stability_timeout_secs = 3600   # 0 waits forever
//! in_progress_extensions = ["crdownload", "part", "partial", "download"]
//! organize_existing = true
//!
//! [retention]
//! max_age_days = 30
//! sweep_interval_hours = 24
//! holding_area = "/Users/me/.tidywatch-holding"
//!
//! [categories]
//! Documents = ["pages", "numbers"]
//!
//! [filters]
//! enable_hidden_files = false
//!
//! [filters.exclude]
//! filenames = [".DS_Store", "Thumbs.db"]
//! patterns = ["*.tmp"]
//! extensions = ["lock"]
//! regex = []
//!
//! [filters.include]
//! patterns = []
//! ```

use crate::file_category::{Category, FileMapper};
use crate::stability::{DEFAULT_POLL_INTERVAL, DEFAULT_STABILITY_TIMEOUT, StabilityGate};
use crate::worker_pool::DEFAULT_WORKERS;
use glob::Pattern;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Name of the per-directory configuration file.
pub const LOCAL_CONFIG_NAME: &str = ".tidywatch.toml";

/// Errors that can occur during configuration loading and validation.
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    /// Configuration file not found at the specified path.
    #[error("Configuration file not found: {}", .0.display())]
    ConfigNotFound(PathBuf),
    /// Invalid TOML syntax or structure.
    #[error("Invalid configuration: {0}")]
    ConfigInvalid(String),
    /// Invalid glob pattern provided.
    #[error("Invalid glob pattern '{0}': expected *.ext or dir/**")]
    InvalidGlobPattern(String),
    /// Invalid regex pattern provided with the actual error reason.
    #[error("Invalid regex pattern '{pattern}': {reason}")]
    InvalidRegexPattern { pattern: String, reason: String },
    /// A `[categories]` key that is not one of the nine category names.
    #[error("Unknown category '{0}' in [categories]")]
    UnknownCategory(String),
    /// A numeric setting outside its allowed range.
    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },
    /// IO error while reading configuration.
    #[error("IO error reading configuration: {0}")]
    IoError(String),
}

/// Top-level settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub watch: WatchSettings,
    pub retention: RetentionSettings,
    /// Extra extensions per category name, appended to the standard table.
    pub categories: BTreeMap<String, Vec<String>>,
    pub filters: FilterRules,
}

/// Watcher and mover settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchSettings {
    /// The watched root. The CLI argument wins over this value.
    pub root: Option<PathBuf>,
    /// Number of concurrent move tasks.
    pub workers: usize,
    /// Interval between two size samples of the stability gate.
    pub poll_interval_ms: u64,
    /// Give up on a file that keeps changing for this long. `0` never gives up.
    pub stability_timeout_secs: u64,
    /// Extensions of partially downloaded files, without the dot.
    pub in_progress_extensions: Vec<String>,
    /// Organize what is already in the root when `watch` starts.
    pub organize_existing: bool,
}

impl Default for WatchSettings {
    fn default() -> Self {
        Self {
            root: None,
            workers: DEFAULT_WORKERS,
            poll_interval_ms: DEFAULT_POLL_INTERVAL.as_millis() as u64,
            stability_timeout_secs: DEFAULT_STABILITY_TIMEOUT.as_secs(),
            in_progress_extensions: ["crdownload", "part", "partial", "download"]
                .into_iter()
                .map(String::from)
                .collect(),
            organize_existing: true,
        }
    }
}

/// Retention sweeper settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetentionSettings {
    /// Items at least this many days old are discarded.
    pub max_age_days: u64,
    /// Run a sweep this often while watching. Unset disables scheduled sweeps.
    pub sweep_interval_hours: Option<u64>,
    /// Discard into this directory instead of the system trash.
    pub holding_area: Option<PathBuf>,
}

impl Default for RetentionSettings {
    fn default() -> Self {
        Self {
            max_age_days: 30,
            sweep_interval_hours: None,
            holding_area: None,
        }
    }
}

/// User ignore rules for entries dropped into the root.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FilterRules {
    /// Whether to organize hidden entries (starting with "."). Defaults to false.
    #[serde(default)]
    pub enable_hidden_files: bool,

    /// Rules for excluding entries.
    #[serde(default)]
    pub exclude: ExcludeRules,

    /// Rules for including entries (whitelist, overrides exclude rules).
    #[serde(default)]
    pub include: IncludeRules,
}

/// Rules for excluding entries from organization.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExcludeRules {
    /// Exact names to exclude (e.g., ".DS_Store", "Thumbs.db").
    #[serde(default)]
    pub filenames: Vec<String>,

    /// Glob patterns to exclude (e.g., "*.tmp").
    #[serde(default)]
    pub patterns: Vec<String>,

    /// Extensions to exclude (e.g., "lock").
    #[serde(default)]
    pub extensions: Vec<String>,

    /// Regex patterns matched against the name.
    #[serde(default)]
    pub regex: Vec<String>,
}

/// Rules that override exclude rules.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IncludeRules {
    /// Glob patterns that override exclude rules.
    #[serde(default)]
    pub patterns: Vec<String>,
}

impl Settings {
    /// Load settings from a file, with fallback to defaults.
    ///
    /// Lookup order:
    /// 1. `config_path`, if provided
    /// 2. `.tidywatch.toml` in the current directory
    /// 3. `~/.config/tidywatch/config.toml`
    /// 4. defaults
    ///
    /// # Errors
    ///
    /// Returns an error if a file is found (or explicitly given) but cannot be
    /// read or parsed.
    pub fn load(config_path: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = config_path {
            return Self::load_from_file(path);
        }

        let local_config = PathBuf::from(LOCAL_CONFIG_NAME);
        if local_config.exists() {
            return Self::load_from_file(&local_config);
        }

        if let Ok(home) = std::env::var("HOME") {
            let home_config = PathBuf::from(home)
                .join(".config")
                .join("tidywatch")
                .join("config.toml");
            if home_config.exists() {
                return Self::load_from_file(&home_config);
            }
        }

        Ok(Self::default())
    }

    fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::ConfigNotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path).map_err(|e| ConfigError::IoError(e.to_string()))?;
        Self::from_toml(&content)
    }

    /// Parses settings from TOML text.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::ConfigInvalid(e.to_string()))
    }

    /// Checks ranges and names that serde cannot check.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.watch.workers == 0 {
            return Err(ConfigError::InvalidValue {
                field: "watch.workers",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.watch.poll_interval_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "watch.poll_interval_ms",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.retention.sweep_interval_hours == Some(0) {
            return Err(ConfigError::InvalidValue {
                field: "retention.sweep_interval_hours",
                reason: "must be at least 1 when set".to_string(),
            });
        }
        for name in self.categories.keys() {
            if Category::from_dir_name(name).is_none() {
                return Err(ConfigError::UnknownCategory(name.clone()));
            }
        }
        self.compile_filters()?;
        Ok(())
    }

    /// The standard extension table plus the `[categories]` additions.
    pub fn file_mapper(&self) -> Result<FileMapper, ConfigError> {
        let mut mapper = FileMapper::default();
        for (name, extensions) in &self.categories {
            let category = Category::from_dir_name(name)
                .ok_or_else(|| ConfigError::UnknownCategory(name.clone()))?;
            for ext in extensions {
                mapper.add_extension_mapping(ext, category);
            }
        }
        Ok(mapper)
    }

    pub fn stability_gate(&self) -> StabilityGate {
        let timeout = match self.watch.stability_timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        };
        StabilityGate::new(Duration::from_millis(self.watch.poll_interval_ms), timeout)
    }

    pub fn sweep_interval(&self) -> Option<Duration> {
        self.retention
            .sweep_interval_hours
            .map(|h| Duration::from_secs(h.saturating_mul(3600)))
    }

    /// Compile the ignore rules into matchers.
    ///
    /// # Errors
    ///
    /// Returns an error if any regex or glob patterns are invalid.
    pub fn compile_filters(&self) -> Result<CompiledFilters, ConfigError> {
        CompiledFilters::new(&self.filters, &self.watch.in_progress_extensions)
    }
}

/// Pre-compiled ignore rules.
#[derive(Debug, Clone)]
pub struct CompiledFilters {
    enable_hidden_files: bool,
    exclude_filenames: HashSet<String>,
    exclude_extensions: HashSet<String>,
    exclude_patterns: Vec<Pattern>,
    exclude_regexes: Vec<Regex>,
    include_patterns: Vec<Pattern>,
    in_progress_suffixes: Vec<String>,
}

impl CompiledFilters {
    fn new(rules: &FilterRules, in_progress: &[String]) -> Result<Self, ConfigError> {
        let compile_globs = |patterns: &[String]| {
            patterns
                .iter()
                .map(|pattern| {
                    Pattern::new(pattern)
                        .map_err(|_| ConfigError::InvalidGlobPattern(pattern.clone()))
                })
                .collect::<Result<Vec<_>, _>>()
        };

        let exclude_regexes = rules
            .exclude
            .regex
            .iter()
            .map(|pattern| {
                Regex::new(pattern).map_err(|e| ConfigError::InvalidRegexPattern {
                    pattern: pattern.clone(),
                    reason: e.to_string(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            enable_hidden_files: rules.enable_hidden_files,
            exclude_filenames: rules.exclude.filenames.iter().cloned().collect(),
            exclude_extensions: rules
                .exclude
                .extensions
                .iter()
                .map(|ext| ext.trim_start_matches('.').to_lowercase())
                .collect(),
            exclude_patterns: compile_globs(&rules.exclude.patterns)?,
            exclude_regexes,
            include_patterns: compile_globs(&rules.include.patterns)?,
            in_progress_suffixes: in_progress
                .iter()
                .map(|ext| format!(".{}", ext.trim_start_matches('.').to_lowercase()))
                .collect(),
        })
    }

    /// True if `name` ends in one of the in-progress download extensions.
    pub fn is_in_progress(&self, name: &str) -> bool {
        let name = name.to_lowercase();
        self.in_progress_suffixes
            .iter()
            .any(|suffix| name.len() > suffix.len() && name.ends_with(suffix.as_str()))
    }

    /// Check if an entry of the root should be organized.
    ///
    /// Checks are performed in this order, with early termination:
    /// 1. In-progress download artifacts are never organized
    /// 2. Include patterns (whitelist) - if matched, include
    /// 3. Hidden entry filter - if hidden and disabled, exclude
    /// 4. Exact name, extension, glob and regex rules - if matched, exclude
    /// 5. Default: include
    pub fn should_include(&self, path: &Path) -> bool {
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy())
            .unwrap_or_default();

        if self.is_in_progress(&file_name) {
            return false;
        }

        if self.matches_any(&self.include_patterns, path, &file_name) {
            return true;
        }

        if !self.enable_hidden_files && file_name.starts_with('.') {
            return false;
        }

        if self.exclude_filenames.contains(file_name.as_ref()) {
            return false;
        }

        if let Some(ext) = path.extension() {
            let ext_lower = ext.to_string_lossy().to_lowercase();
            if self.exclude_extensions.contains(&ext_lower) {
                return false;
            }
        }

        if self.matches_any(&self.exclude_patterns, path, &file_name) {
            return false;
        }

        !self
            .exclude_regexes
            .iter()
            .any(|regex| regex.is_match(&file_name))
    }

    /// Globs are tried against the full path and the bare name, so `*.tmp`
    /// matches an absolute path of the root.
    fn matches_any(&self, patterns: &[Pattern], path: &Path, file_name: &str) -> bool {
        patterns
            .iter()
            .any(|pattern| pattern.matches_path(path) || pattern.matches(file_name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn compiled(toml: &str) -> CompiledFilters {
        Settings::from_toml(toml)
            .expect("Failed to parse settings")
            .compile_filters()
            .expect("Failed to compile filters")
    }

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.watch.workers, 5);
        assert_eq!(settings.watch.poll_interval_ms, 1000);
        assert_eq!(settings.retention.max_age_days, 30);
        assert!(settings.watch.organize_existing);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_empty_file_is_default() {
        let settings = Settings::from_toml("").expect("Failed to parse");
        assert_eq!(settings.watch.workers, DEFAULT_WORKERS);
        assert!(settings.watch.root.is_none());
    }

    #[test]
    fn test_full_file_parses() {
        let settings = Settings::from_toml(
            r#"
            [watch]
            root = "/tmp/downloads"
            workers = 2
            poll_interval_ms = 250
            stability_timeout_secs = 0

            [retention]
            max_age_days = 7
            sweep_interval_hours = 12
            holding_area = "/tmp/held"

            [categories]
            Documents = ["pages"]
            "E-books" = ["djvu"]

            [filters.exclude]
            extensions = ["lock"]
            "#,
        )
        .expect("Failed to parse");

        assert!(settings.validate().is_ok());
        assert_eq!(settings.watch.root, Some(PathBuf::from("/tmp/downloads")));
        assert_eq!(settings.stability_gate().timeout(), None);
        assert_eq!(
            settings.stability_gate().interval(),
            Duration::from_millis(250)
        );
        assert_eq!(settings.sweep_interval(), Some(Duration::from_secs(12 * 3600)));

        let mapper = settings.file_mapper().expect("Failed to build mapper");
        assert_eq!(mapper.extension_to_category("pages"), Some(Category::Documents));
        assert_eq!(mapper.extension_to_category("djvu"), Some(Category::Ebooks));
    }

    #[test]
    fn test_unknown_category_rejected() {
        let settings = Settings::from_toml("[categories]\nPictures = [\"raw\"]\n")
            .expect("Failed to parse");
        assert!(matches!(
            settings.validate(),
            Err(ConfigError::UnknownCategory(_))
        ));
    }

    #[test]
    fn test_zero_workers_rejected() {
        let settings = Settings::from_toml("[watch]\nworkers = 0\n").expect("Failed to parse");
        assert!(matches!(
            settings.validate(),
            Err(ConfigError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_bad_patterns_fail_validation() {
        let settings = Settings::from_toml("[filters.exclude]\nregex = [\"([a-z\"]\n")
            .expect("Failed to parse");
        assert!(matches!(
            settings.validate(),
            Err(ConfigError::InvalidRegexPattern { .. })
        ));

        let settings = Settings::from_toml("[filters.include]\npatterns = [\"[!\"]\n")
            .expect("Failed to parse");
        assert!(matches!(
            settings.validate(),
            Err(ConfigError::InvalidGlobPattern(_))
        ));
    }

    #[test]
    fn test_invalid_toml_rejected() {
        assert!(matches!(
            Settings::from_toml("[watch\nworkers = 1"),
            Err(ConfigError::ConfigInvalid(_))
        ));
    }

    #[test]
    fn test_missing_explicit_file() {
        let result = Settings::load(Some(Path::new("/no/such/tidywatch.toml")));
        assert!(matches!(result, Err(ConfigError::ConfigNotFound(_))));
    }

    #[test]
    fn test_in_progress_downloads_excluded() {
        let filters = compiled("");
        assert!(!filters.should_include(Path::new("/r/movie.mkv.crdownload")));
        assert!(!filters.should_include(Path::new("/r/iso.PART")));
        assert!(!filters.should_include(Path::new("/r/setup.dmg.download")));
        assert!(filters.should_include(Path::new("/r/movie.mkv")));
        assert!(filters.is_in_progress("x.partial"));
        assert!(!filters.is_in_progress(".part"));
    }

    #[test]
    fn test_hidden_file_excluded_by_default() {
        let filters = compiled("");
        assert!(!filters.should_include(Path::new("/r/.DS_Store")));
        assert!(filters.should_include(Path::new("/r/visible.txt")));
    }

    #[test]
    fn test_exclude_rules() {
        let filters = compiled(
            r#"
            [filters.exclude]
            filenames = ["Thumbs.db"]
            extensions = [".LOCK"]
            patterns = ["*.tmp"]
            regex = ["^~\\$"]
            "#,
        );

        assert!(!filters.should_include(Path::new("/r/Thumbs.db")));
        assert!(!filters.should_include(Path::new("/r/file.lock")));
        assert!(!filters.should_include(Path::new("/r/scratch.tmp")));
        assert!(!filters.should_include(Path::new("/r/~$budget.xlsx")));
        assert!(filters.should_include(Path::new("/r/budget.xlsx")));
    }

    #[test]
    fn test_include_overrides_exclude() {
        let filters = compiled(
            r#"
            [filters.include]
            patterns = [".important"]
            "#,
        );

        assert!(filters.should_include(Path::new("/r/.important")));
        assert!(!filters.should_include(Path::new("/r/.other")));
    }

    #[test]
    fn test_invalid_patterns_return_errors() {
        let bad_regex = Settings::from_toml("[filters.exclude]\nregex = [\"[invalid(\"]\n")
            .expect("Failed to parse");
        assert!(matches!(
            bad_regex.compile_filters(),
            Err(ConfigError::InvalidRegexPattern { .. })
        ));

        let bad_glob = Settings::from_toml("[filters.exclude]\npatterns = [\"[invalid\"]\n")
            .expect("Failed to parse");
        assert!(matches!(
            bad_glob.compile_filters(),
            Err(ConfigError::InvalidGlobPattern(_))
        ));
    }
}
