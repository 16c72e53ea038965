//! Team-similarity distance between files.
//!
//! Two files are "close" when the same people change them in similar
//! proportions. Distance is the weighted Jaccard distance between the
//! files' normalized author distributions.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::mining::CommitHistory;

/// Author distance for one file pair.
///
/// `file_a` is always the lexicographically smaller path and
/// `distance` is in `[0, 1)`.
///
/// # Examples
///
/// ```
/// use chronos_history::authorship::AuthorDistance;
///
/// let d = AuthorDistance {
///     file_a: "src/api.rs".into(),
///     file_b: "src/handlers.rs".into(),
///     distance: 0.0,
/// };
/// assert!(d.distance < 1.0);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorDistance {
    /// First file (lexicographically smaller).
    pub file_a: String,
    /// Second file.
    pub file_b: String,
    /// `1 - weighted_jaccard`; 0 means identical author mix.
    pub distance: f64,
}

/// All retained author distances for one history.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorDistances {
    /// Pairs sorted by `(file_a, file_b)`.
    pub pairs: Vec<AuthorDistance>,
    /// Distinct authors across the whole history.
    pub distinct_authors: usize,
}

impl AuthorDistances {
    /// Fewer than two authors: distances carry no information.
    ///
    /// # Examples
    ///
    /// ```
    /// use chronos_history::authorship::AuthorDistances;
    ///
    /// let single = AuthorDistances { pairs: vec![], distinct_authors: 1 };
    /// assert!(single.is_degenerate());
    /// ```
    pub fn is_degenerate(&self) -> bool {
        self.distinct_authors < 2
    }

    /// Distance for a pair in either order, `None` if not retained.
    pub fn distance(&self, a: &str, b: &str) -> Option<f64> {
        let (first, second) = if a <= b { (a, b) } else { (b, a) };
        self.pairs
            .binary_search_by(|p| (p.file_a.as_str(), p.file_b.as_str()).cmp(&(first, second)))
            .ok()
            .map(|idx| self.pairs[idx].distance)
    }

    /// Number of retained pairs.
    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    /// Returns `true` if no pair was retained.
    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}

/// Weighted Jaccard distance between two author distributions.
///
/// # Examples
///
/// ```
/// use std::collections::HashMap;
/// use chronos_history::authorship::weighted_jaccard_distance;
///
/// let foo = HashMap::from([("alice", 0.625), ("bob", 0.375)]);
/// let bar = HashMap::from([("alice", 0.25), ("carol", 0.75)]);
/// let d = weighted_jaccard_distance(&foo, &bar);
/// assert!((d - 6.0 / 7.0).abs() < 1e-12);
/// ```
pub fn weighted_jaccard_distance(a: &HashMap<&str, f64>, b: &HashMap<&str, f64>) -> f64 {
    let mut sum_min = 0.0;
    let mut sum_max = 0.0;

    for (author, &wa) in a {
        let wb = b.get(author).copied().unwrap_or(0.0);
        sum_min += wa.min(wb);
        sum_max += wa.max(wb);
    }
    for (author, &wb) in b {
        if !a.contains_key(author) {
            sum_max += wb;
        }
    }

    if sum_max == 0.0 {
        return 1.0;
    }
    1.0 - sum_min / sum_max
}

/// Compute author distances for analyzed files that share an author.
///
/// Returns an empty, degenerate result when the history has fewer than
/// two distinct authors.
///
/// # Examples
///
/// ```
/// use std::collections::HashSet;
/// use chronos_history::authorship::compute_author_distances;
/// use chronos_history::mining::{Commit, CommitHistory};
///
/// let commit = |n: u32, author: &str, file: &str| Commit {
///     hash: format!("{n:040}"),
///     timestamp: 1_700_000_000 - i64::from(n),
///     author: author.into(),
///     files: vec![file.into()],
///     subject: "change".into(),
/// };
/// let history = CommitHistory::from_commits(
///     vec![
///         commit(1, "alice", "a.rs"),
///         commit(2, "bob", "a.rs"),
///         commit(3, "alice", "b.rs"),
///         commit(4, "bob", "b.rs"),
///     ],
///     false,
/// );
/// let analyzed: HashSet<String> = ["a.rs", "b.rs"].iter().map(|s| s.to_string()).collect();
///
/// let distances = compute_author_distances(&history, &analyzed);
/// assert_eq!(distances.distance("b.rs", "a.rs"), Some(0.0));
/// ```
pub fn compute_author_distances(
    history: &CommitHistory,
    analyzed_files: &HashSet<String>,
) -> AuthorDistances {
    let distinct_authors = history.distinct_authors();
    if distinct_authors < 2 {
        tracing::debug!(distinct_authors, "author distances skipped: single-author history");
        return AuthorDistances {
            pairs: Vec::new(),
            distinct_authors,
        };
    }

    // file -> author -> commits touching the file
    let mut counts: BTreeMap<&str, HashMap<&str, u32>> = BTreeMap::new();
    for commit in &history.commits {
        let touched: BTreeSet<&str> = commit
            .files
            .iter()
            .map(String::as_str)
            .filter(|f| analyzed_files.contains(*f))
            .collect();
        for file in touched {
            *counts
                .entry(file)
                .or_default()
                .entry(commit.author.as_str())
                .or_default() += 1;
        }
    }

    let weights: BTreeMap<&str, HashMap<&str, f64>> = counts
        .iter()
        .map(|(&file, authors)| {
            let total: u32 = authors.values().sum();
            let dist = authors
                .iter()
                .map(|(&author, &n)| (author, f64::from(n) / f64::from(total)))
                .collect();
            (file, dist)
        })
        .collect();

    let mut author_files: HashMap<&str, BTreeSet<&str>> = HashMap::new();
    for (&file, authors) in &counts {
        for &author in authors.keys() {
            author_files.entry(author).or_default().insert(file);
        }
    }

    let mut candidates: BTreeSet<(&str, &str)> = BTreeSet::new();
    for files in author_files.values() {
        let files: Vec<&str> = files.iter().copied().collect();
        for i in 0..files.len() {
            for j in (i + 1)..files.len() {
                candidates.insert((files[i], files[j]));
            }
        }
    }

    let mut pairs = Vec::new();
    for (a, b) in candidates {
        let (Some(wa), Some(wb)) = (weights.get(a), weights.get(b)) else {
            continue;
        };
        let distance = weighted_jaccard_distance(wa, wb);
        if distance < 1.0 {
            pairs.push(AuthorDistance {
                file_a: a.to_string(),
                file_b: b.to_string(),
                distance: distance.max(0.0),
            });
        }
    }

    tracing::debug!(
        files = weights.len(),
        pairs = pairs.len(),
        "computed author distances"
    );

    AuthorDistances {
        pairs,
        distinct_authors,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mining::Commit;

    fn make_commit(n: usize, author: &str, files: Vec<&str>) -> Commit {
        Commit {
            hash: format!("{n:040x}"),
            timestamp: 1_700_000_000 - n as i64 * 3600,
            author: author.into(),
            files: files.into_iter().map(String::from).collect(),
            subject: "test".into(),
        }
    }

    fn history_of(spec: &[(&str, &str, usize)]) -> CommitHistory {
        let mut commits = Vec::new();
        for &(author, file, times) in spec {
            for _ in 0..times {
                commits.push(make_commit(commits.len(), author, vec![file]));
            }
        }
        CommitHistory::from_commits(commits, false)
    }

    fn analyzed(files: &[&str]) -> HashSet<String> {
        files.iter().map(|f| f.to_string()).collect()
    }

    #[test]
    fn partially_shared_team_distance() {
        let history = history_of(&[
            ("alice", "foo.py", 5),
            ("bob", "foo.py", 3),
            ("alice", "bar.py", 1),
            ("carol", "bar.py", 3),
        ]);
        let distances = compute_author_distances(&history, &analyzed(&["foo.py", "bar.py"]));

        assert_eq!(distances.len(), 1);
        let d = distances.distance("foo.py", "bar.py").unwrap();
        assert!((d - 0.857).abs() < 1e-3, "got {d}");
        assert_eq!(distances.pairs[0].file_a, "bar.py");
    }

    #[test]
    fn identical_distributions_have_zero_distance() {
        let history = history_of(&[
            ("alice", "a.rs", 2),
            ("bob", "a.rs", 1),
            ("alice", "b.rs", 4),
            ("bob", "b.rs", 2),
        ]);
        let distances = compute_author_distances(&history, &analyzed(&["a.rs", "b.rs"]));
        assert_eq!(distances.distance("a.rs", "b.rs"), Some(0.0));
    }

    #[test]
    fn disjoint_teams_are_not_stored() {
        let history = history_of(&[("alice", "a.rs", 3), ("bob", "b.rs", 3)]);
        let distances = compute_author_distances(&history, &analyzed(&["a.rs", "b.rs"]));
        assert!(distances.is_empty());
        assert!(!distances.is_degenerate());
        assert_eq!(distances.distance("a.rs", "b.rs"), None);
    }

    #[test]
    fn single_author_history_is_degenerate() {
        let history = history_of(&[("alice", "a.rs", 3), ("alice", "b.rs", 3)]);
        let distances = compute_author_distances(&history, &analyzed(&["a.rs", "b.rs"]));
        assert!(distances.is_degenerate());
        assert!(distances.is_empty());
        assert_eq!(distances.distinct_authors, 1);
    }

    #[test]
    fn empty_history_is_degenerate() {
        let distances = compute_author_distances(&CommitHistory::default(), &analyzed(&["a.rs"]));
        assert!(distances.is_degenerate());
        assert_eq!(distances.distinct_authors, 0);
    }

    #[test]
    fn only_analyzed_files_are_paired() {
        let history = history_of(&[
            ("alice", "a.rs", 1),
            ("bob", "a.rs", 1),
            ("alice", "README.md", 1),
            ("bob", "README.md", 1),
        ]);
        let distances = compute_author_distances(&history, &analyzed(&["a.rs"]));
        assert!(distances.is_empty());
    }

    #[test]
    fn commit_touching_both_files_counts_once_per_file() {
        let history = CommitHistory::from_commits(
            vec![
                make_commit(0, "alice", vec!["a.rs", "b.rs", "a.rs"]),
                make_commit(1, "bob", vec!["a.rs"]),
            ],
            false,
        );
        let distances = compute_author_distances(&history, &analyzed(&["a.rs", "b.rs"]));
        // a.rs = {alice: 0.5, bob: 0.5}, b.rs = {alice: 1.0}
        // sum(min) = 0.5, sum(max) = 1.0 + 0.5
        let d = distances.distance("a.rs", "b.rs").unwrap();
        assert!((d - 2.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn distances_are_in_half_open_unit_interval_and_sorted() {
        let history = history_of(&[
            ("alice", "a.rs", 3),
            ("bob", "a.rs", 1),
            ("bob", "b.rs", 2),
            ("carol", "b.rs", 2),
            ("carol", "c.rs", 1),
            ("alice", "c.rs", 5),
            ("dave", "d.rs", 2),
        ]);
        let distances =
            compute_author_distances(&history, &analyzed(&["a.rs", "b.rs", "c.rs", "d.rs"]));

        assert_eq!(distances.len(), 3);
        for pair in &distances.pairs {
            assert!((0.0..1.0).contains(&pair.distance));
            assert!(pair.file_a < pair.file_b);
            assert_ne!(pair.file_a, "d.rs");
            assert_ne!(pair.file_b, "d.rs");
        }
        let keys: Vec<(&str, &str)> = distances
            .pairs
            .iter()
            .map(|p| (p.file_a.as_str(), p.file_b.as_str()))
            .collect();
        let mut sorted = keys.clone();
        sorted.sort();
        assert_eq!(keys, sorted);
    }

    #[test]
    fn jaccard_of_empty_distributions_is_maximal() {
        let empty: HashMap<&str, f64> = HashMap::new();
        assert_eq!(weighted_jaccard_distance(&empty, &empty), 1.0);
    }
}
