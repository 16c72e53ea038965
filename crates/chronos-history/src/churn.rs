//! Per-file churn time series and trajectory classification.
//!
//! Buckets every change to an analyzed file into fixed-width time windows,
//! then derives trend, volatility, authorship spread, and commit-intent
//! ratios from the bucket counts.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::str::FromStr;

use chronos_core::ChurnConfig;
use serde::{Deserialize, Serialize};

use crate::mining::CommitHistory;
use crate::stats::{coefficient_of_variation, linear_slope, shannon_entropy};

/// Qualitative shape of a file's churn over time.
///
/// # Examples
///
/// ```
/// use chronos_history::churn::Trajectory;
///
/// let t: Trajectory = "spiking".parse().unwrap();
/// assert_eq!(t, Trajectory::Spiking);
/// assert_eq!(format!("{t}"), "spiking");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Trajectory {
    /// At most one change in the whole history.
    Dormant,
    /// Change rate is falling.
    Stabilizing,
    /// Steady change rate without a strong trend.
    Stable,
    /// Erratic change rate without a strong trend.
    Churning,
    /// Rising and erratic change rate.
    Spiking,
}

impl Trajectory {
    /// Classify a series from its summary statistics.
    ///
    /// Evaluated in order: DORMANT (`total_changes <= 1`), STABILIZING
    /// (`slope < -slope_threshold`, additionally requiring
    /// `cv <= cv_threshold` when `stabilizing_requires_steady` is set),
    /// SPIKING (`slope > slope_threshold` and `cv > cv_threshold`),
    /// CHURNING (`cv > cv_threshold`), otherwise STABLE.
    ///
    /// # Examples
    ///
    /// ```
    /// use chronos_core::ChurnConfig;
    /// use chronos_history::churn::Trajectory;
    ///
    /// let config = ChurnConfig::default();
    /// assert_eq!(Trajectory::classify(1, 5.0, 5.0, &config), Trajectory::Dormant);
    /// assert_eq!(Trajectory::classify(9, -0.5, 0.2, &config), Trajectory::Stabilizing);
    /// assert_eq!(Trajectory::classify(9, 0.5, 0.9, &config), Trajectory::Spiking);
    /// assert_eq!(Trajectory::classify(9, 0.0, 0.9, &config), Trajectory::Churning);
    /// assert_eq!(Trajectory::classify(9, 0.0, 0.1, &config), Trajectory::Stable);
    /// ```
    pub fn classify(total_changes: u32, slope: f64, cv: f64, config: &ChurnConfig) -> Self {
        let erratic = cv > config.cv_threshold;

        if total_changes <= 1 {
            Trajectory::Dormant
        } else if slope < -config.slope_threshold
            && !(config.stabilizing_requires_steady && erratic)
        {
            Trajectory::Stabilizing
        } else if slope > config.slope_threshold && erratic {
            Trajectory::Spiking
        } else if erratic {
            Trajectory::Churning
        } else {
            Trajectory::Stable
        }
    }
}

impl fmt::Display for Trajectory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Trajectory::Dormant => write!(f, "dormant"),
            Trajectory::Stabilizing => write!(f, "stabilizing"),
            Trajectory::Stable => write!(f, "stable"),
            Trajectory::Churning => write!(f, "churning"),
            Trajectory::Spiking => write!(f, "spiking"),
        }
    }
}

impl FromStr for Trajectory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "dormant" => Ok(Trajectory::Dormant),
            "stabilizing" => Ok(Trajectory::Stabilizing),
            "stable" => Ok(Trajectory::Stable),
            "churning" => Ok(Trajectory::Churning),
            "spiking" => Ok(Trajectory::Spiking),
            other => Err(format!("unknown trajectory: {other}")),
        }
    }
}

/// Churn time series and derived statistics for one file.
///
/// # Examples
///
/// ```
/// use chronos_history::churn::{ChurnSeries, Trajectory};
///
/// let series = ChurnSeries {
///     file_path: "src/lib.rs".into(),
///     window_counts: vec![1, 1, 1],
///     total_changes: 3,
///     trajectory: Trajectory::Stable,
///     slope: 0.0,
///     coefficient_of_variation: 0.0,
///     author_entropy: 0.0,
///     bus_factor: 1.0,
///     fix_ratio: 0.0,
///     refactor_ratio: 0.0,
///     change_entropy: 3f64.log2(),
/// };
/// assert_eq!(series.total_changes, series.window_counts.iter().sum::<u32>());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChurnSeries {
    /// File path relative to the repository root.
    pub file_path: String,
    /// Changes per time window, oldest first.
    pub window_counts: Vec<u32>,
    /// Sum of `window_counts`.
    pub total_changes: u32,
    /// Classified trajectory.
    pub trajectory: Trajectory,
    /// OLS slope of `window_counts` against window index.
    pub slope: f64,
    /// Population std-dev over mean of `window_counts`.
    pub coefficient_of_variation: f64,
    /// Shannon entropy (bits) of the per-author commit distribution.
    pub author_entropy: f64,
    /// `2^author_entropy`: effective number of equal contributors.
    pub bus_factor: f64,
    /// Share of commits whose subject matches a fix keyword.
    pub fix_ratio: f64,
    /// Share of commits whose subject matches a refactor keyword.
    pub refactor_ratio: f64,
    /// Shannon entropy (bits) of the normalized window counts.
    pub change_entropy: f64,
}

/// Case-insensitive substring matcher over a keyword vocabulary.
///
/// # Examples
///
/// ```
/// use chronos_history::churn::KeywordMatcher;
///
/// let fix = KeywordMatcher::new(["fix", "bug"]);
/// assert!(fix.matches("Hotfix for login"));
/// assert!(!fix.matches("add feature"));
/// ```
#[derive(Debug, Clone)]
pub struct KeywordMatcher {
    keywords: Vec<String>,
}

impl KeywordMatcher {
    /// Build a matcher; keywords are lowercased and empty ones dropped.
    pub fn new<I, S>(keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            keywords: keywords
                .into_iter()
                .map(|k| k.as_ref().to_lowercase())
                .filter(|k| !k.is_empty())
                .collect(),
        }
    }

    /// Returns `true` if any keyword occurs in `subject`, ignoring case.
    pub fn matches(&self, subject: &str) -> bool {
        let subject = subject.to_lowercase();
        self.matches_lowercase(&subject)
    }

    fn matches_lowercase(&self, subject: &str) -> bool {
        self.keywords.iter().any(|k| subject.contains(k.as_str()))
    }
}

#[derive(Default)]
struct FileAccumulator<'a> {
    windows: Vec<u32>,
    authors: HashMap<&'a str, u32>,
    commits: u32,
    fixes: u32,
    refactors: u32,
}

/// Build one [`ChurnSeries`] per analyzed file that appears in the history.
///
/// Window index of a commit is `(timestamp - earliest) / window_seconds`,
/// clamped to the last window.
///
/// # Examples
///
/// ```
/// use std::collections::HashSet;
/// use chronos_core::ChurnConfig;
/// use chronos_history::churn::{build_churn_series, Trajectory};
/// use chronos_history::mining::{Commit, CommitHistory};
///
/// let config = ChurnConfig::default();
/// let window = config.window_seconds();
/// let commits = (0..3)
///     .rev()
///     .map(|i| Commit {
///         hash: format!("{i:040}"),
///         timestamp: i * window,
///         author: "alice@example.com".into(),
///         files: vec!["foo.py".into()],
///         subject: "tweak".into(),
///     })
///     .collect();
/// let history = CommitHistory::from_commits(commits, false);
/// let analyzed: HashSet<String> = ["foo.py".to_string()].into();
///
/// let series = build_churn_series(&history, &analyzed, &config);
/// let foo = &series["foo.py"];
/// assert_eq!(foo.window_counts, vec![1, 1, 1]);
/// assert_eq!(foo.trajectory, Trajectory::Stable);
/// assert_eq!(foo.bus_factor, 1.0);
/// ```
pub fn build_churn_series(
    history: &CommitHistory,
    analyzed_files: &HashSet<String>,
    config: &ChurnConfig,
) -> BTreeMap<String, ChurnSeries> {
    let Some((earliest, latest)) = history.time_range() else {
        return BTreeMap::new();
    };
    let window_secs = config.window_seconds();
    if window_secs <= 0 {
        return BTreeMap::new();
    }

    let num_windows = ((latest - earliest) / window_secs + 1).max(1) as usize;
    let fix = KeywordMatcher::new(&config.fix_keywords);
    let refactor = KeywordMatcher::new(&config.refactor_keywords);

    let mut files: HashMap<&str, FileAccumulator<'_>> = HashMap::new();

    for commit in &history.commits {
        let window = (((commit.timestamp - earliest) / window_secs) as usize).min(num_windows - 1);
        let subject = commit.subject.to_lowercase();
        let is_fix = fix.matches_lowercase(&subject);
        let is_refactor = refactor.matches_lowercase(&subject);

        let mut seen = HashSet::new();
        for path in &commit.files {
            if !analyzed_files.contains(path) || !seen.insert(path.as_str()) {
                continue;
            }

            let acc = files.entry(path.as_str()).or_insert_with(|| FileAccumulator {
                windows: vec![0; num_windows],
                ..FileAccumulator::default()
            });
            acc.windows[window] += 1;
            *acc.authors.entry(commit.author.as_str()).or_default() += 1;
            acc.commits += 1;
            if is_fix {
                acc.fixes += 1;
            }
            if is_refactor {
                acc.refactors += 1;
            }
        }
    }

    let series: BTreeMap<String, ChurnSeries> = files
        .into_iter()
        .map(|(path, acc)| (path.to_string(), finish_series(path, acc, config)))
        .collect();

    tracing::debug!(files = series.len(), windows = num_windows, "built churn series");
    series
}

fn finish_series(path: &str, acc: FileAccumulator<'_>, config: &ChurnConfig) -> ChurnSeries {
    let total_changes: u32 = acc.windows.iter().sum();
    let slope = linear_slope(&acc.windows);
    let cv = coefficient_of_variation(&acc.windows);
    let author_entropy = shannon_entropy(acc.authors.values().copied());
    let ratio = |n: u32| {
        if acc.commits == 0 {
            0.0
        } else {
            f64::from(n) / f64::from(acc.commits)
        }
    };

    ChurnSeries {
        file_path: path.to_string(),
        trajectory: Trajectory::classify(total_changes, slope, cv, config),
        total_changes,
        slope,
        coefficient_of_variation: cv,
        author_entropy,
        bus_factor: author_entropy.exp2(),
        fix_ratio: ratio(acc.fixes),
        refactor_ratio: ratio(acc.refactors),
        change_entropy: shannon_entropy(acc.windows.iter().copied()),
        window_counts: acc.windows,
    }
}
