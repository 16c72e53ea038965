use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ChronosError;

/// File name looked up at the repository root by [`ChronosConfig::load`].
pub const CONFIG_FILE_NAME: &str = ".chronos.toml";

/// Top-level configuration loaded from `.chronos.toml`.
///
/// Every section and field has a default, so an empty file is valid.
///
/// # Examples
///
/// ```
/// use chronos_core::ChronosConfig;
///
/// let config = ChronosConfig::default();
/// assert_eq!(config.extract.min_commits, 10);
/// assert_eq!(config.churn.window_weeks, 4);
/// assert_eq!(config.cochange.half_life_days, 90.0);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChronosConfig {
    /// Commit log extraction settings.
    #[serde(default)]
    pub extract: ExtractConfig,
    /// Churn series and trajectory settings.
    #[serde(default)]
    pub churn: ChurnConfig,
    /// Co-change matrix settings.
    #[serde(default)]
    pub cochange: CoChangeConfig,
    /// Incremental commit cache settings.
    #[serde(default)]
    pub cache: CacheConfig,
}

impl ChronosConfig {
    /// Load configuration from a TOML file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`ChronosError::Io`] if the file cannot be read,
    /// [`ChronosError::Toml`] if the content is not valid TOML, or
    /// [`ChronosError::Config`] if a value is out of range.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use chronos_core::ChronosConfig;
    /// use std::path::Path;
    ///
    /// let config = ChronosConfig::from_file(Path::new(".chronos.toml")).unwrap();
    /// ```
    pub fn from_file(path: &Path) -> Result<Self, ChronosError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse and validate configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns [`ChronosError::Toml`] if parsing fails, or
    /// [`ChronosError::Config`] if validation fails.
    ///
    /// # Examples
    ///
    /// ```
    /// use chronos_core::ChronosConfig;
    ///
    /// let toml = r#"
    /// [cochange]
    /// half_life_days = 30.0
    /// "#;
    /// let config = ChronosConfig::from_toml(toml).unwrap();
    /// assert_eq!(config.cochange.half_life_days, 30.0);
    /// ```
    pub fn from_toml(content: &str) -> Result<Self, ChronosError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load `.chronos.toml` from `repo_root`, or defaults if it does not exist.
    ///
    /// # Errors
    ///
    /// Same as [`ChronosConfig::from_file`] when the file exists.
    pub fn load(repo_root: &Path) -> Result<Self, ChronosError> {
        let path = repo_root.join(CONFIG_FILE_NAME);
        if path.is_file() {
            Self::from_file(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Reject values that would make the statistics meaningless.
    ///
    /// # Errors
    ///
    /// Returns [`ChronosError::Config`] naming the first offending field.
    pub fn validate(&self) -> Result<(), ChronosError> {
        if self.extract.max_commits == 0 {
            return Err(ChronosError::Config(
                "extract.max_commits must be positive".into(),
            ));
        }
        if self.extract.max_output_bytes == 0 {
            return Err(ChronosError::Config(
                "extract.max_output_bytes must be positive".into(),
            ));
        }
        if self.extract.timeout_secs == 0 {
            return Err(ChronosError::Config(
                "extract.timeout_secs must be positive".into(),
            ));
        }
        if self.churn.window_weeks == 0 {
            return Err(ChronosError::Config(
                "churn.window_weeks must be positive".into(),
            ));
        }
        if !is_non_negative(self.churn.slope_threshold) {
            return Err(ChronosError::Config(
                "churn.slope_threshold must be non-negative".into(),
            ));
        }
        if !is_non_negative(self.churn.cv_threshold) {
            return Err(ChronosError::Config(
                "churn.cv_threshold must be non-negative".into(),
            ));
        }
        if !(self.cochange.half_life_days.is_finite() && self.cochange.half_life_days > 0.0) {
            return Err(ChronosError::Config(
                "cochange.half_life_days must be positive".into(),
            ));
        }
        if self.cochange.min_cochanges == 0 {
            return Err(ChronosError::Config(
                "cochange.min_cochanges must be at least 1".into(),
            ));
        }
        if self.cochange.max_files_per_commit < 2 {
            return Err(ChronosError::Config(
                "cochange.max_files_per_commit must be at least 2".into(),
            ));
        }
        Ok(())
    }
}

/// Finite and `>= 0`; NaN fails.
fn is_non_negative(value: f64) -> bool {
    value.is_finite() && value >= 0.0
}

/// Commit log extraction settings.
///
/// # Examples
///
/// ```
/// use chronos_core::ExtractConfig;
///
/// let config = ExtractConfig::default();
/// assert_eq!(config.max_commits, 5000);
/// assert_eq!(config.max_output_bytes, 50 * 1024 * 1024);
/// assert_eq!(config.git_binary, "git");
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractConfig {
    /// Maximum number of commits requested from `git log` (default: 5000).
    #[serde(default = "default_max_commits")]
    pub max_commits: usize,
    /// Histories with fewer usable commits are unavailable (default: 10).
    #[serde(default = "default_min_commits")]
    pub min_commits: usize,
    /// Raw log output budget; the rest is truncated (default: 50 MiB).
    #[serde(default = "default_max_output_bytes")]
    pub max_output_bytes: usize,
    /// Wall-clock limit for the `git log` process (default: 30).
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Git executable (default: `"git"`).
    #[serde(default = "default_git_binary")]
    pub git_binary: String,
    /// Pathspecs restricting the log; empty means the whole tree.
    #[serde(default)]
    pub paths: Vec<String>,
}

fn default_max_commits() -> usize {
    5000
}

fn default_min_commits() -> usize {
    10
}

fn default_max_output_bytes() -> usize {
    50 * 1024 * 1024
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_git_binary() -> String {
    "git".into()
}

impl Default for ExtractConfig {
    fn default() -> Self {
        Self {
            max_commits: default_max_commits(),
            min_commits: default_min_commits(),
            max_output_bytes: default_max_output_bytes(),
            timeout_secs: default_timeout_secs(),
            git_binary: default_git_binary(),
            paths: Vec::new(),
        }
    }
}

/// Churn windowing, trajectory thresholds, and subject-line vocabularies.
///
/// # Examples
///
/// ```
/// use chronos_core::ChurnConfig;
///
/// let config = ChurnConfig::default();
/// assert_eq!(config.slope_threshold, 0.1);
/// assert_eq!(config.cv_threshold, 0.5);
/// assert!(!config.stabilizing_requires_steady);
/// assert!(config.fix_keywords.contains(&"hotfix".to_string()));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChurnConfig {
    /// Width of one time bucket in weeks (default: 4).
    #[serde(default = "default_window_weeks")]
    pub window_weeks: u32,
    /// Slope magnitude that counts as a trend (default: 0.1).
    #[serde(default = "default_slope_threshold")]
    pub slope_threshold: f64,
    /// Coefficient of variation above which a series is erratic (default: 0.5).
    #[serde(default = "default_cv_threshold")]
    pub cv_threshold: f64,
    /// When `true`, a falling series is STABILIZING only if it is also
    /// steady (`cv <= cv_threshold`); otherwise it falls through to the
    /// CV branches. Default `false`: falling always wins.
    #[serde(default)]
    pub stabilizing_requires_steady: bool,
    /// Subject substrings marking a fix commit.
    #[serde(default = "default_fix_keywords")]
    pub fix_keywords: Vec<String>,
    /// Subject substrings marking a refactor commit.
    #[serde(default = "default_refactor_keywords")]
    pub refactor_keywords: Vec<String>,
}

fn default_window_weeks() -> u32 {
    4
}

fn default_slope_threshold() -> f64 {
    0.1
}

fn default_cv_threshold() -> f64 {
    0.5
}

fn default_fix_keywords() -> Vec<String> {
    ["fix", "bug", "patch", "hotfix", "bugfix", "repair", "issue"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_refactor_keywords() -> Vec<String> {
    ["refactor", "cleanup", "reorganize", "restructure"]
        .into_iter()
        .map(String::from)
        .collect()
}

impl Default for ChurnConfig {
    fn default() -> Self {
        Self {
            window_weeks: default_window_weeks(),
            slope_threshold: default_slope_threshold(),
            cv_threshold: default_cv_threshold(),
            stabilizing_requires_steady: false,
            fix_keywords: default_fix_keywords(),
            refactor_keywords: default_refactor_keywords(),
        }
    }
}

impl ChurnConfig {
    /// Window width in seconds.
    ///
    /// # Examples
    ///
    /// ```
    /// use chronos_core::ChurnConfig;
    ///
    /// assert_eq!(ChurnConfig::default().window_seconds(), 4 * 7 * 86_400);
    /// ```
    pub fn window_seconds(&self) -> i64 {
        i64::from(self.window_weeks) * 7 * 86_400
    }
}

/// Co-change matrix settings.
///
/// # Examples
///
/// ```
/// use chronos_core::CoChangeConfig;
///
/// let config = CoChangeConfig::default();
/// assert_eq!(config.min_cochanges, 2);
/// assert_eq!(config.max_files_per_commit, 30);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoChangeConfig {
    /// Age at which a commit's weight halves, in days (default: 90).
    #[serde(default = "default_half_life_days")]
    pub half_life_days: f64,
    /// Pairs with fewer raw co-changes are not materialized (default: 2).
    #[serde(default = "default_min_cochanges")]
    pub min_cochanges: u32,
    /// Commits touching more analyzed files are skipped (default: 30).
    #[serde(default = "default_max_files_per_commit")]
    pub max_files_per_commit: usize,
}

fn default_half_life_days() -> f64 {
    90.0
}

fn default_min_cochanges() -> u32 {
    2
}

fn default_max_files_per_commit() -> usize {
    30
}

impl Default for CoChangeConfig {
    fn default() -> Self {
        Self {
            half_life_days: default_half_life_days(),
            min_cochanges: default_min_cochanges(),
            max_files_per_commit: default_max_files_per_commit(),
        }
    }
}

/// Incremental commit cache settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Reuse previously parsed commits between runs (default: false).
    #[serde(default)]
    pub enabled: bool,
    /// Cache directory, relative to the repository root (default: `.chronos`).
    #[serde(default = "default_cache_dir")]
    pub dir: PathBuf,
}

fn default_cache_dir() -> PathBuf {
    PathBuf::from(".chronos")
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            dir: default_cache_dir(),
        }
    }
}

impl CacheConfig {
    /// Database file for a repository rooted at `repo_root`.
    pub fn db_path(&self, repo_root: &Path) -> PathBuf {
        repo_root.join(&self.dir).join("commit_cache.db")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_expected_values() {
        let config = ChronosConfig::default();
        assert_eq!(config.extract.max_commits, 5000);
        assert_eq!(config.extract.min_commits, 10);
        assert_eq!(config.extract.timeout_secs, 30);
        assert!(config.extract.paths.is_empty());
        assert_eq!(config.churn.window_weeks, 4);
        assert_eq!(config.churn.fix_keywords.len(), 7);
        assert_eq!(
            config.churn.refactor_keywords,
            vec!["refactor", "cleanup", "reorganize", "restructure"]
        );
        assert_eq!(config.cochange.half_life_days, 90.0);
        assert!(!config.cache.enabled);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn parse_full_toml() {
        let toml = r#"
[extract]
max_commits = 200
min_commits = 3
paths = ["src/"]

[churn]
window_weeks = 2
cv_threshold = 0.8
stabilizing_requires_steady = true
fix_keywords = ["fix"]

[cochange]
half_life_days = 14.0
min_cochanges = 1
max_files_per_commit = 10

[cache]
enabled = true
dir = ".cache/chronos"
"#;
        let config = ChronosConfig::from_toml(toml).unwrap();
        assert_eq!(config.extract.max_commits, 200);
        assert_eq!(config.extract.min_commits, 3);
        assert_eq!(config.extract.paths, vec!["src/"]);
        assert_eq!(config.extract.git_binary, "git");
        assert_eq!(config.churn.window_weeks, 2);
        assert_eq!(config.churn.cv_threshold, 0.8);
        assert!(config.churn.stabilizing_requires_steady);
        assert_eq!(config.churn.fix_keywords, vec!["fix"]);
        assert_eq!(config.churn.refactor_keywords.len(), 4);
        assert_eq!(config.cochange.max_files_per_commit, 10);
        assert!(config.cache.enabled);
        assert_eq!(
            config.cache.db_path(Path::new("/repo")),
            PathBuf::from("/repo/.cache/chronos/commit_cache.db")
        );
    }

    #[test]
    fn empty_toml_gives_defaults() {
        let config = ChronosConfig::from_toml("").unwrap();
        assert_eq!(config, ChronosConfig::default());
    }

    #[test]
    fn invalid_toml_returns_error() {
        let result = ChronosConfig::from_toml("{{invalid}}");
        assert!(matches!(result, Err(ChronosError::Toml(_))));
    }

    #[test]
    fn zero_window_is_rejected() {
        let result = ChronosConfig::from_toml("[churn]\nwindow_weeks = 0\n");
        let err = result.unwrap_err();
        assert!(err.to_string().contains("window_weeks"));
    }

    #[test]
    fn non_positive_half_life_is_rejected() {
        let result = ChronosConfig::from_toml("[cochange]\nhalf_life_days = 0.0\n");
        assert!(matches!(result, Err(ChronosError::Config(_))));
    }

    #[test]
    fn negative_threshold_is_rejected() {
        let result = ChronosConfig::from_toml("[churn]\ncv_threshold = -0.1\n");
        assert!(matches!(result, Err(ChronosError::Config(_))));
    }

    #[test]
    fn load_falls_back_to_defaults_without_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = ChronosConfig::load(dir.path()).unwrap();
        assert_eq!(config, ChronosConfig::default());
    }

    #[test]
    fn load_reads_file_at_repo_root() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(CONFIG_FILE_NAME),
            "[extract]\nmin_commits = 2\n",
        )
        .unwrap();
        let config = ChronosConfig::load(dir.path()).unwrap();
        assert_eq!(config.extract.min_commits, 2);
    }
}
