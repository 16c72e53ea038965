//! Decay-weighted co-change association between files.
//!
//! Identifies pairs of files that change in the same commit more often than
//! their individual change rates predict. Recent commits weigh more than
//! old ones through an exponential half-life.

use std::collections::{BTreeMap, HashMap, HashSet};

use chronos_core::CoChangeConfig;
use serde::{Deserialize, Serialize, Serializer};

use crate::mining::CommitHistory;

const SECONDS_PER_DAY: f64 = 86_400.0;

/// Order-independent key for a pair of paths.
///
/// The lexicographically smaller path is always `first`.
///
/// # Examples
///
/// ```
/// use chronos_history::cochange::PairKey;
///
/// assert_eq!(PairKey::new("z.rs", "a.rs"), PairKey::new("a.rs", "z.rs"));
/// assert_eq!(PairKey::new("z.rs", "a.rs").first(), "a.rs");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PairKey {
    first: String,
    second: String,
}

impl PairKey {
    /// Canonicalize `(a, b)`.
    pub fn new(a: &str, b: &str) -> Self {
        let (first, second) = if a <= b { (a, b) } else { (b, a) };
        Self {
            first: first.to_string(),
            second: second.to_string(),
        }
    }

    /// Lexicographically smaller path.
    pub fn first(&self) -> &str {
        &self.first
    }

    /// Lexicographically larger path.
    pub fn second(&self) -> &str {
        &self.second
    }
}

/// Association statistics for two files that changed together.
///
/// `file_a` is always the lexicographically smaller path.
///
/// # Examples
///
/// ```
/// use chronos_history::cochange::CoChangePair;
///
/// let pair = CoChangePair {
///     file_a: "src/auth.rs".into(),
///     file_b: "src/session.rs".into(),
///     raw_cochange_count: 5,
///     weighted_total_a: 10.0,
///     weighted_total_b: 10.0,
///     confidence_a_given_b: 0.5,
///     confidence_b_given_a: 0.5,
///     lift: 1.5,
///     weight: 5.0,
/// };
/// assert!(pair.lift > 1.0);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CoChangePair {
    /// First file (lexicographically smaller).
    pub file_a: String,
    /// Second file.
    pub file_b: String,
    /// Commits touching both files, undecayed.
    pub raw_cochange_count: u32,
    /// Decayed change weight of `file_a`.
    pub weighted_total_a: f64,
    /// Decayed change weight of `file_b`.
    pub weighted_total_b: f64,
    /// `weight / weighted_total_b`: P(A changed | B changed).
    pub confidence_a_given_b: f64,
    /// `weight / weighted_total_a`: P(B changed | A changed).
    pub confidence_b_given_a: f64,
    /// Observed over expected co-occurrence; 1.0 means independent.
    pub lift: f64,
    /// Decayed co-change weight.
    pub weight: f64,
}

impl CoChangePair {
    /// The path paired with `file`, if `file` is part of this pair.
    pub fn partner_of(&self, file: &str) -> Option<&str> {
        if self.file_a == file {
            Some(&self.file_b)
        } else if self.file_b == file {
            Some(&self.file_a)
        } else {
            None
        }
    }
}

/// Sparse co-change table: only pairs meeting the raw-count threshold.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CoChangeMatrix {
    /// Materialized pairs.
    #[serde(serialize_with = "serialize_pairs")]
    pub pairs: HashMap<PairKey, CoChangePair>,
    /// Commits in the history the matrix was built from.
    pub total_commits: usize,
    /// Decayed change weight per analyzed file.
    pub file_change_counts: BTreeMap<String, f64>,
    /// Decayed weight summed over every non-bulk commit.
    pub total_weight: f64,
    /// Commits skipped for touching too many analyzed files.
    pub bulk_commits_skipped: usize,
}

impl CoChangeMatrix {
    /// Look up a pair in either order.
    ///
    /// # Examples
    ///
    /// ```
    /// use chronos_history::cochange::CoChangeMatrix;
    ///
    /// let matrix = CoChangeMatrix::default();
    /// assert!(matrix.get("a.rs", "b.rs").is_none());
    /// ```
    pub fn get(&self, a: &str, b: &str) -> Option<&CoChangePair> {
        self.pairs.get(&PairKey::new(a, b))
    }

    /// All pairs containing `file`, highest lift first.
    pub fn partners_of(&self, file: &str) -> Vec<&CoChangePair> {
        let mut partners: Vec<&CoChangePair> = self
            .pairs
            .values()
            .filter(|p| p.file_a == file || p.file_b == file)
            .collect();
        partners.sort_by(|a, b| {
            b.lift
                .partial_cmp(&a.lift)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.file_a.cmp(&b.file_a))
                .then_with(|| a.file_b.cmp(&b.file_b))
        });
        partners
    }

    /// Number of materialized pairs.
    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    /// Returns `true` if no pair met the threshold.
    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}

fn serialize_pairs<S>(pairs: &HashMap<PairKey, CoChangePair>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    let mut sorted: Vec<(&PairKey, &CoChangePair)> = pairs.iter().collect();
    sorted.sort_by(|a, b| a.0.cmp(b.0));
    serializer.collect_seq(sorted.into_iter().map(|(_, pair)| pair))
}

/// Weight of a commit `age_days` before the newest commit.
///
/// # Examples
///
/// ```
/// use chronos_history::cochange::decay_weight;
///
/// assert_eq!(decay_weight(0.0, 90.0), 1.0);
/// assert!((decay_weight(90.0, 90.0) - 0.5).abs() < 1e-12);
/// ```
pub fn decay_weight(age_days: f64, half_life_days: f64) -> f64 {
    (-std::f64::consts::LN_2 / half_life_days * age_days).exp()
}

/// Build the decay-weighted co-change matrix over `analyzed_files`.
///
/// Commits touching more than `max_files_per_commit` analyzed files are
/// skipped entirely. Pairs with fewer than `min_cochanges` raw co-changes
/// are not materialized.
///
/// # Examples
///
/// ```
/// use std::collections::HashSet;
/// use chronos_core::CoChangeConfig;
/// use chronos_history::cochange::build_cochange_matrix;
/// use chronos_history::mining::{Commit, CommitHistory};
///
/// let commit = |n: u32, files: &[&str]| Commit {
///     hash: format!("{n:040}"),
///     timestamp: 1_700_000_000,
///     author: "alice@example.com".into(),
///     files: files.iter().map(|f| f.to_string()).collect(),
///     subject: "change".into(),
/// };
/// let history = CommitHistory::from_commits(
///     vec![commit(1, &["a.rs", "b.rs"]), commit(2, &["b.rs", "a.rs"]), commit(3, &["c.rs"])],
///     false,
/// );
/// let analyzed: HashSet<String> = ["a.rs", "b.rs", "c.rs"].iter().map(|s| s.to_string()).collect();
///
/// let matrix = build_cochange_matrix(&history, &analyzed, &CoChangeConfig::default());
/// let pair = matrix.get("b.rs", "a.rs").unwrap();
/// assert_eq!(pair.raw_cochange_count, 2);
/// assert!((pair.confidence_b_given_a - 1.0).abs() < 1e-12);
/// assert!((pair.lift - 1.5).abs() < 1e-12);
/// ```
pub fn build_cochange_matrix(
    history: &CommitHistory,
    analyzed_files: &HashSet<String>,
    config: &CoChangeConfig,
) -> CoChangeMatrix {
    let Some((_, newest)) = history.time_range() else {
        return CoChangeMatrix::default();
    };

    let mut file_weight: HashMap<&str, f64> = HashMap::new();
    let mut pair_weight: HashMap<(&str, &str), f64> = HashMap::new();
    let mut pair_count: HashMap<(&str, &str), u32> = HashMap::new();
    let mut total_weight = 0.0;
    let mut bulk_commits_skipped = 0usize;

    for commit in &history.commits {
        let mut relevant: Vec<&str> = commit
            .files
            .iter()
            .map(String::as_str)
            .filter(|f| analyzed_files.contains(*f))
            .collect();
        relevant.sort_unstable();
        relevant.dedup();

        if relevant.len() > config.max_files_per_commit {
            bulk_commits_skipped += 1;
            continue;
        }

        let age_days = (newest - commit.timestamp) as f64 / SECONDS_PER_DAY;
        let w = decay_weight(age_days, config.half_life_days);
        total_weight += w;

        for &f in &relevant {
            *file_weight.entry(f).or_default() += w;
        }

        // `relevant` is sorted, so (i, j) with i < j is already canonical.
        for i in 0..relevant.len() {
            for j in (i + 1)..relevant.len() {
                let key = (relevant[i], relevant[j]);
                *pair_weight.entry(key).or_default() += w;
                *pair_count.entry(key).or_default() += 1;
            }
        }
    }

    let mut pairs = HashMap::new();
    for ((a, b), count) in pair_count {
        if count < config.min_cochanges {
            continue;
        }

        let weight = pair_weight.get(&(a, b)).copied().unwrap_or(0.0);
        let total_a = file_weight.get(a).copied().unwrap_or(0.0);
        let total_b = file_weight.get(b).copied().unwrap_or(0.0);

        let confidence_a_given_b = ratio(weight, total_b).min(1.0);
        let confidence_b_given_a = ratio(weight, total_a).min(1.0);
        let expected = if total_weight > 0.0 {
            total_a * total_b / total_weight
        } else {
            0.0
        };
        let lift = ratio(weight, expected);

        pairs.insert(
            PairKey::new(a, b),
            CoChangePair {
                file_a: a.to_string(),
                file_b: b.to_string(),
                raw_cochange_count: count,
                weighted_total_a: total_a,
                weighted_total_b: total_b,
                confidence_a_given_b,
                confidence_b_given_a,
                lift,
                weight,
            },
        );
    }

    if bulk_commits_skipped > 0 {
        tracing::debug!(
            skipped = bulk_commits_skipped,
            limit = config.max_files_per_commit,
            "skipped bulk commits for co-change"
        );
    }
    tracing::debug!(pairs = pairs.len(), "built co-change matrix");

    CoChangeMatrix {
        pairs,
        total_commits: history.total_commits(),
        file_change_counts: file_weight
            .into_iter()
            .map(|(f, w)| (f.to_string(), w))
            .collect(),
        total_weight,
        bulk_commits_skipped,
    }
}

fn ratio(numerator: f64, denominator: f64) -> f64 {
    if denominator > 0.0 {
        numerator / denominator
    } else {
        0.0
    }
}
