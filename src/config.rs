//! Configuration loading and validation.
//!
//! Configuration is read once at startup, validated, and turned into an
//! immutable [`Settings`] value that is passed to the sweeper. Nothing reads
//! configuration after that.
//!
//! # Configuration File Format
//!
//! All keys are optional:
//!
//! ```toml
//! source_dir = "~/Downloads"
//! startup_delay_secs = 0
//!
//! # Built-in category: override where it goes or what it matches
//! [categories.Audio]
//! destination = "Music"           # relative to source_dir
//! extensions = [".mp3", ".flac"]
//!
//! # Optional built-in categories are off until enabled
//! [categories.Torrents]
//! enabled = true
//!
//! # Any other name defines a new category
//! [categories.Ebooks]
//! extensions = [".epub", ".mobi"]
//!
//! [exclusions]
//! suffixes = [".crdownload", ".download", ".tmp", ".part", ".partial"]
//! patterns = ["~$*"]
//! regex = []
//! ```

use crate::exclusion::{DEFAULT_TEMP_SUFFIXES, TempExclusionSet};
use crate::file_category::{Category, CategoryRule, ExtensionClassifier, ExtensionOverlap};
use crate::mover::{DestinationSet, SafeMover};
use crate::sweeper::DirectorySweeper;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::ffi::OsString;
use std::fs;
use std::path::{Component, Path, PathBuf};
use std::time::Duration;

/// Environment variable naming a configuration file.
pub const CONFIG_ENV: &str = "DLTIDY_CONFIG";

/// Name of the per-directory configuration file.
pub const LOCAL_CONFIG_NAME: &str = ".dltidy.toml";

/// Errors that can occur during configuration loading and validation.
///
/// All of these are fatal: no sweep starts with a bad configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// Configuration file not found at the specified path.
    ConfigNotFound(PathBuf),
    /// Invalid TOML syntax or structure.
    ConfigInvalid(String),
    /// IO error while reading configuration.
    IoError(String),
    /// Invalid glob pattern provided.
    InvalidGlobPattern(String),
    /// Invalid regex pattern provided with the actual error reason.
    InvalidRegexPattern {
        /// The regex pattern that failed to compile.
        pattern: String,
        /// The reason why the pattern is invalid.
        reason: String,
    },
    /// `~` was used, or no source directory was given, and `HOME` is not set.
    NoHomeDirectory,
    /// The source directory does not exist.
    SourceMissing(PathBuf),
    /// The source path exists but is not a directory.
    SourceNotADirectory(PathBuf),
    /// The source path is relative.
    SourceNotAbsolute(PathBuf),
    /// A category would move files back into the source directory.
    DestinationIsSource { category: String, path: PathBuf },
    /// A destination path exists and is not a directory.
    DestinationNotADirectory { category: String, path: PathBuf },
    /// A category table has an empty name.
    EmptyLabel,
    /// An enabled category has no extensions.
    NoExtensions(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::ConfigNotFound(path) => {
                write!(f, "Configuration file not found: {}", path.display())
            }
            ConfigError::ConfigInvalid(msg) => write!(f, "Invalid configuration: {}", msg),
            ConfigError::IoError(msg) => write!(f, "IO error reading configuration: {}", msg),
            ConfigError::InvalidGlobPattern(pattern) => {
                write!(f, "Invalid glob pattern '{}'", pattern)
            }
            ConfigError::InvalidRegexPattern { pattern, reason } => {
                write!(f, "Invalid regex pattern '{}': {}", pattern, reason)
            }
            ConfigError::NoHomeDirectory => {
                write!(f, "HOME is not set; give the source directory explicitly")
            }
            ConfigError::SourceMissing(path) => {
                write!(f, "Source directory does not exist: {}", path.display())
            }
            ConfigError::SourceNotADirectory(path) => {
                write!(f, "Source path is not a directory: {}", path.display())
            }
            ConfigError::SourceNotAbsolute(path) => {
                write!(f, "Source directory must be an absolute path: {}", path.display())
            }
            ConfigError::DestinationIsSource { category, path } => write!(
                f,
                "Destination for {} is the source directory itself: {}",
                category,
                path.display()
            ),
            ConfigError::DestinationNotADirectory { category, path } => write!(
                f,
                "Destination for {} exists and is not a directory: {}",
                category,
                path.display()
            ),
            ConfigError::EmptyLabel => write!(f, "Category names cannot be empty"),
            ConfigError::NoExtensions(label) => {
                write!(f, "Category {} has no extensions", label)
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// Raw configuration as read from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Directory to sort. Defaults to `~/Downloads`.
    #[serde(default)]
    pub source_dir: Option<PathBuf>,

    /// Seconds to wait before the first sweep.
    #[serde(default)]
    pub startup_delay_secs: u64,

    /// Per-category overrides and custom categories, keyed by label.
    #[serde(default)]
    pub categories: BTreeMap<String, CategoryConfig>,

    #[serde(default)]
    pub exclusions: ExclusionRules,
}

/// Settings for one category.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CategoryConfig {
    /// Destination directory; relative paths are taken from the source directory.
    #[serde(default)]
    pub destination: Option<PathBuf>,

    /// Replaces the built-in extension set.
    #[serde(default)]
    pub extensions: Option<Vec<String>>,

    /// Turns a category on or off explicitly.
    #[serde(default)]
    pub enabled: Option<bool>,
}

/// Markers for files that are still being written.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExclusionRules {
    /// Name suffixes, case-insensitive (e.g. ".crdownload").
    #[serde(default = "default_suffixes")]
    pub suffixes: Vec<String>,

    /// Glob patterns matched against the file name.
    #[serde(default)]
    pub patterns: Vec<String>,

    /// Regex patterns matched against the file name.
    #[serde(default)]
    pub regex: Vec<String>,
}

/// Helper function for the default value of `suffixes`.
fn default_suffixes() -> Vec<String> {
    DEFAULT_TEMP_SUFFIXES.iter().map(|s| s.to_string()).collect()
}

impl Default for ExclusionRules {
    fn default() -> Self {
        Self {
            suffixes: default_suffixes(),
            patterns: Vec::new(),
            regex: Vec::new(),
        }
    }
}

impl Config {
    /// Load configuration from a file, with fallback to defaults.
    ///
    /// Attempts to load configuration in the following order:
    /// 1. If `config_path` is provided, load from that file
    /// 2. The file named by the `DLTIDY_CONFIG` environment variable
    /// 3. `.dltidy.toml` in the current directory
    /// 4. `~/.config/dltidy/config.toml`
    /// 5. Fall back to default configuration
    ///
    /// # Errors
    ///
    /// Returns an error if an explicitly named file (argument or environment)
    /// is missing, or if any file found cannot be read or parsed.
    pub fn load(config_path: Option<&Path>) -> Result<Self, ConfigError> {
        let home = std::env::var_os("HOME").map(PathBuf::from);
        match locate(
            config_path,
            std::env::var_os(CONFIG_ENV),
            Path::new("."),
            home.as_deref(),
        ) {
            Some(path) => {
                tracing::debug!(path = %path.display(), "loading configuration");
                Self::load_from_file(&path)
            }
            None => Ok(Self::default()),
        }
    }

    /// Load configuration from a specific file.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ConfigNotFound` if file does not exist.
    /// Returns `ConfigError::ConfigInvalid` if TOML parsing fails.
    /// Returns `ConfigError::IoError` if file cannot be read.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::ConfigNotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path).map_err(|e| ConfigError::IoError(e.to_string()))?;

        Self::from_toml(&content)
    }

    /// Parses configuration from TOML text.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::ConfigInvalid(e.to_string()))
    }

    /// Validates the configuration and resolves every path.
    ///
    /// `source_override` (from the command line) wins over `source_dir`.
    pub fn resolve(self, source_override: Option<&Path>) -> Result<Settings, ConfigError> {
        let home = std::env::var_os("HOME").map(PathBuf::from);
        self.resolve_with_home(source_override, home.as_deref())
    }

    /// Like [`Self::resolve`] with an explicit home directory for `~` expansion.
    pub fn resolve_with_home(
        self,
        source_override: Option<&Path>,
        home: Option<&Path>,
    ) -> Result<Settings, ConfigError> {
        let source_dir = match source_override.or(self.source_dir.as_deref()) {
            Some(path) => expand_home(path, home)?,
            None => home.ok_or(ConfigError::NoHomeDirectory)?.join("Downloads"),
        };
        validate_source(&source_dir)?;

        let mut rules = Vec::new();
        let mut destinations = DestinationSet::new();

        for category in Category::PRIORITY {
            let label = category.label();
            let overrides = self
                .categories
                .iter()
                .find(|(key, _)| key.eq_ignore_ascii_case(label))
                .map(|(_, overrides)| overrides);

            let enabled = match overrides {
                Some(o) => o.enabled.unwrap_or(
                    category.enabled_by_default() || o.destination.is_some() || o.extensions.is_some(),
                ),
                None => category.enabled_by_default(),
            };
            if !enabled {
                continue;
            }

            let rule = match overrides.and_then(|o| o.extensions.as_ref()) {
                Some(extensions) => CategoryRule::new(label, extensions),
                None => category.default_rule(),
            };
            let destination = overrides.and_then(|o| o.destination.as_deref());
            add_category(rule, destination, &source_dir, home, &mut rules, &mut destinations)?;
        }

        for (label, overrides) in &self.categories {
            if Category::from_label(label).is_some() || overrides.enabled == Some(false) {
                continue;
            }
            if label.trim().is_empty() {
                return Err(ConfigError::EmptyLabel);
            }
            let extensions = overrides.extensions.as_deref().unwrap_or_default();
            let rule = CategoryRule::new(label.as_str(), extensions);
            add_category(
                rule,
                overrides.destination.as_deref(),
                &source_dir,
                home,
                &mut rules,
                &mut destinations,
            )?;
        }

        let exclusions = TempExclusionSet::new(
            &self.exclusions.suffixes,
            &self.exclusions.patterns,
            &self.exclusions.regex,
        )?;

        let classifier = ExtensionClassifier::new(rules);
        for overlap in classifier.overlaps() {
            tracing::warn!(
                extension = %overlap.extension,
                "extension listed in both {} and {}; {} wins",
                overlap.kept_by,
                overlap.shadowed,
                overlap.kept_by
            );
        }

        Ok(Settings {
            source_dir,
            startup_delay: Duration::from_secs(self.startup_delay_secs),
            classifier,
            exclusions,
            destinations,
        })
    }
}

/// Picks the configuration file to read, if any.
fn locate(
    explicit: Option<&Path>,
    env_value: Option<OsString>,
    cwd: &Path,
    home: Option<&Path>,
) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }

    if let Some(value) = env_value
        && !value.is_empty()
    {
        return Some(PathBuf::from(value));
    }

    let local_config = cwd.join(LOCAL_CONFIG_NAME);
    if local_config.exists() {
        return Some(local_config);
    }

    let home_config = home?.join(".config").join("dltidy").join("config.toml");
    home_config.exists().then_some(home_config)
}

/// Replaces a leading `~` component with the home directory.
fn expand_home(path: &Path, home: Option<&Path>) -> Result<PathBuf, ConfigError> {
    match path.strip_prefix("~") {
        Ok(rest) => Ok(home.ok_or(ConfigError::NoHomeDirectory)?.join(rest)),
        Err(_) => Ok(path.to_path_buf()),
    }
}

fn validate_source(source_dir: &Path) -> Result<(), ConfigError> {
    if !source_dir.is_absolute() {
        return Err(ConfigError::SourceNotAbsolute(source_dir.to_path_buf()));
    }
    match fs::metadata(source_dir) {
        Ok(meta) if meta.is_dir() => Ok(()),
        Ok(_) => Err(ConfigError::SourceNotADirectory(source_dir.to_path_buf())),
        Err(_) => Err(ConfigError::SourceMissing(source_dir.to_path_buf())),
    }
}

fn add_category(
    rule: CategoryRule,
    destination: Option<&Path>,
    source_dir: &Path,
    home: Option<&Path>,
    rules: &mut Vec<CategoryRule>,
    destinations: &mut DestinationSet,
) -> Result<(), ConfigError> {
    if rule.extensions.is_empty() {
        return Err(ConfigError::NoExtensions(rule.label));
    }

    let destination = match destination {
        Some(path) => source_dir.join(expand_home(path, home)?),
        None => source_dir.join(&rule.label),
    };

    if same_directory(&destination, source_dir) {
        return Err(ConfigError::DestinationIsSource {
            category: rule.label,
            path: destination,
        });
    }
    if destination.exists() && !destination.is_dir() {
        return Err(ConfigError::DestinationNotADirectory {
            category: rule.label,
            path: destination,
        });
    }

    destinations.insert(rule.label.clone(), destination);
    rules.push(rule);
    Ok(())
}

/// Compares two paths after dropping `.` components and resolving symlinks where possible.
fn same_directory(a: &Path, b: &Path) -> bool {
    if let (Ok(a), Ok(b)) = (a.canonicalize(), b.canonicalize()) {
        return a == b;
    }
    let clean = |p: &Path| -> PathBuf {
        p.components()
            .filter(|component| !matches!(component, Component::CurDir))
            .collect()
    };
    clean(a) == clean(b)
}

/// Validated, fully resolved configuration for one process.
#[derive(Debug, Clone)]
pub struct Settings {
    pub source_dir: PathBuf,
    pub startup_delay: Duration,
    classifier: ExtensionClassifier,
    exclusions: TempExclusionSet,
    destinations: DestinationSet,
}

impl Settings {
    pub fn classifier(&self) -> &ExtensionClassifier {
        &self.classifier
    }

    pub fn exclusions(&self) -> &TempExclusionSet {
        &self.exclusions
    }

    pub fn destinations(&self) -> &DestinationSet {
        &self.destinations
    }

    pub fn overlaps(&self) -> &[ExtensionOverlap] {
        self.classifier.overlaps()
    }

    /// Creates every destination directory up front. Returns how many could not be created.
    ///
    /// Failures are only logged: each move creates its directory again on demand
    /// and reports the error against the file.
    pub fn bootstrap(&self) -> usize {
        let mut failed = 0;
        for (label, dir) in self.destinations.iter() {
            if let Err(e) = fs::create_dir_all(dir) {
                failed += 1;
                tracing::warn!(category = label, dir = %dir.display(), error = %e, "could not create destination");
            }
        }
        failed
    }

    /// Builds the sweeper for these settings.
    pub fn sweeper(&self, dry_run: bool) -> DirectorySweeper {
        let mover = SafeMover::new(
            self.classifier.clone(),
            self.exclusions.clone(),
            self.destinations.clone(),
        )
        .with_dry_run(dry_run);
        DirectorySweeper::new(mover)
    }
}
