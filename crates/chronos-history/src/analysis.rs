//! End-to-end temporal analysis of a repository.
//!
//! Extracts history once, then runs the churn, co-change, and authorship
//! builders as independent blocking tasks over the same shared history.
//! Each output is a `Result`: when history is unavailable every output
//! carries the reason, and a failed builder only affects its own output.

use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::sync::Arc;

use chronos_core::{ChronosConfig, ExtractConfig, HistoryUnavailable};
use serde::Serialize;
use tokio::task::JoinError;

use crate::authorship::{compute_author_distances, AuthorDistances};
use crate::cache::CommitCache;
use crate::churn::{build_churn_series, ChurnSeries};
use crate::cochange::{build_cochange_matrix, CoChangeMatrix};
use crate::mining::{
    extract_commits, extract_history, head_commit_id, is_git_repository, is_reachable_from_head,
    CommitHistory, ExtractOptions,
};

/// Shape of the history the signals were computed from.
///
/// # Examples
///
/// ```
/// use chronos_history::analysis::HistorySummary;
/// use chronos_history::mining::CommitHistory;
///
/// let summary = HistorySummary::from(&CommitHistory::default());
/// assert_eq!(summary.total_commits, 0);
/// assert!(!summary.truncated);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistorySummary {
    /// Commits with at least one changed file.
    pub total_commits: usize,
    /// Days between oldest and newest commit.
    pub span_days: i64,
    /// Distinct paths seen in the history.
    pub file_count: usize,
    /// Distinct author identities.
    pub distinct_authors: usize,
    /// Whether the git log was cut at the byte budget.
    pub truncated: bool,
}

impl From<&CommitHistory> for HistorySummary {
    fn from(history: &CommitHistory) -> Self {
        Self {
            total_commits: history.total_commits(),
            span_days: history.span_days,
            file_count: history.file_set.len(),
            distinct_authors: history.distinct_authors(),
            truncated: history.truncated,
        }
    }
}

/// The three temporal outputs for one analysis run.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TemporalSignals {
    /// Per-file churn, keyed by path.
    pub churn: Result<BTreeMap<String, ChurnSeries>, HistoryUnavailable>,
    /// Decay-weighted co-change pairs.
    pub cochange: Result<CoChangeMatrix, HistoryUnavailable>,
    /// Team-similarity distances.
    pub author_distances: Result<AuthorDistances, HistoryUnavailable>,
    /// `None` when no history could be loaded.
    pub history: Option<HistorySummary>,
}

impl TemporalSignals {
    /// Every output unavailable for the same reason.
    ///
    /// # Examples
    ///
    /// ```
    /// use chronos_core::HistoryUnavailable;
    /// use chronos_history::analysis::TemporalSignals;
    ///
    /// let reason = HistoryUnavailable::InsufficientHistory { found: 5, required: 10 };
    /// let signals = TemporalSignals::unavailable(reason.clone());
    /// assert_eq!(signals.churn.unwrap_err(), reason);
    /// assert!(signals.history.is_none());
    /// ```
    pub fn unavailable(reason: HistoryUnavailable) -> Self {
        Self {
            churn: Err(reason.clone()),
            cochange: Err(reason.clone()),
            author_distances: Err(reason),
            history: None,
        }
    }

    /// Returns `true` if all three outputs were produced.
    pub fn is_complete(&self) -> bool {
        self.churn.is_ok() && self.cochange.is_ok() && self.author_distances.is_ok()
    }
}

/// Run the three builders concurrently over one history.
///
/// Each builder runs on the blocking pool. A panicking builder yields
/// [`HistoryUnavailable::BuilderFailed`] for its own output only. A config
/// that fails [`ChronosConfig::validate`] marks every output
/// [`HistoryUnavailable::InvalidConfig`].
///
/// # Examples
///
/// ```
/// use std::collections::HashSet;
/// use std::sync::Arc;
/// use chronos_core::ChronosConfig;
/// use chronos_history::analysis::compute_signals;
/// use chronos_history::mining::CommitHistory;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let signals = compute_signals(
///     Arc::new(CommitHistory::default()),
///     Arc::new(HashSet::new()),
///     Arc::new(ChronosConfig::default()),
/// )
/// .await;
/// assert!(signals.is_complete());
/// assert!(signals.churn.unwrap().is_empty());
/// # }
/// ```
pub async fn compute_signals(
    history: Arc<CommitHistory>,
    analyzed_files: Arc<HashSet<String>>,
    config: Arc<ChronosConfig>,
) -> TemporalSignals {
    if let Err(reason) = validate_config(&config) {
        return TemporalSignals {
            history: Some(HistorySummary::from(history.as_ref())),
            ..TemporalSignals::unavailable(reason)
        };
    }

    let churn = {
        let (history, files, config) = (
            Arc::clone(&history),
            Arc::clone(&analyzed_files),
            Arc::clone(&config),
        );
        tokio::task::spawn_blocking(move || build_churn_series(&history, &files, &config.churn))
    };
    let cochange = {
        let (history, files, config) = (
            Arc::clone(&history),
            Arc::clone(&analyzed_files),
            Arc::clone(&config),
        );
        tokio::task::spawn_blocking(move || {
            build_cochange_matrix(&history, &files, &config.cochange)
        })
    };
    let authorship = {
        let (history, files) = (Arc::clone(&history), Arc::clone(&analyzed_files));
        tokio::task::spawn_blocking(move || compute_author_distances(&history, &files))
    };

    let (churn, cochange, authorship) = tokio::join!(churn, cochange, authorship);

    let signals = TemporalSignals {
        churn: builder_output("churn", churn),
        cochange: builder_output("cochange", cochange),
        author_distances: builder_output("authorship", authorship),
        history: Some(HistorySummary::from(history.as_ref())),
    };

    tracing::debug!(
        churn = signals.churn.as_ref().map_or(0, BTreeMap::len),
        cochange_pairs = signals.cochange.as_ref().map_or(0, CoChangeMatrix::len),
        author_pairs = signals
            .author_distances
            .as_ref()
            .map_or(0, AuthorDistances::len),
        "computed temporal signals"
    );
    signals
}

fn validate_config(config: &ChronosConfig) -> Result<(), HistoryUnavailable> {
    config.validate().map_err(|e| {
        tracing::warn!(error = %e, "rejected temporal analysis configuration");
        HistoryUnavailable::InvalidConfig {
            message: e.to_string(),
        }
    })
}

fn builder_output<T>(builder: &str, joined: Result<T, JoinError>) -> Result<T, HistoryUnavailable> {
    joined.map_err(|e| {
        tracing::warn!(builder, error = %e, "builder task failed");
        HistoryUnavailable::BuilderFailed {
            builder: builder.to_string(),
            reason: e.to_string(),
        }
    })
}

/// Extract history for `repo_path` and compute every temporal signal.
///
/// Uses the commit cache at `cache.dir` when `cache.enabled` is set. A
/// cache that cannot be opened is bypassed, never fatal.
///
/// # Examples
///
/// ```no_run
/// use std::collections::HashSet;
/// use std::path::Path;
/// use chronos_core::ChronosConfig;
/// use chronos_history::analysis::analyze_repository;
///
/// # async fn run() {
/// let files: HashSet<String> = ["src/lib.rs".to_string()].into();
/// let signals = analyze_repository(Path::new("."), files, &ChronosConfig::default()).await;
/// match &signals.churn {
///     Ok(series) => println!("{} files with churn", series.len()),
///     Err(reason) => println!("temporal data unavailable: {reason}"),
/// }
/// # }
/// ```
pub async fn analyze_repository(
    repo_path: &Path,
    analyzed_files: HashSet<String>,
    config: &ChronosConfig,
) -> TemporalSignals {
    if let Err(reason) = validate_config(config) {
        return TemporalSignals::unavailable(reason);
    }

    let history = if config.cache.enabled && is_git_repository(repo_path) {
        load_with_cache(repo_path, config).await
    } else {
        extract_history(
            repo_path,
            &ExtractOptions::from(&config.extract),
            config.extract.min_commits,
        )
        .await
    };

    match history {
        Ok(history) => {
            compute_signals(
                Arc::new(history),
                Arc::new(analyzed_files),
                Arc::new(config.clone()),
            )
            .await
        }
        Err(reason) => TemporalSignals::unavailable(reason),
    }
}

async fn load_with_cache(
    repo_path: &Path,
    config: &ChronosConfig,
) -> Result<CommitHistory, HistoryUnavailable> {
    let db_path = config.cache.db_path(repo_path);
    match CommitCache::open(&db_path) {
        Ok(mut cache) => load_history_incremental(repo_path, &mut cache, &config.extract).await,
        Err(e) => {
            tracing::warn!(
                path = %db_path.display(),
                error = %e,
                "commit cache unavailable, extracting full history"
            );
            extract_history(
                repo_path,
                &ExtractOptions::from(&config.extract),
                config.extract.min_commits,
            )
            .await
        }
    }
}

/// Load history through `cache`, asking git only for commits newer than
/// the last processed HEAD.
///
/// The cache is rebuilt when the last processed commit is no longer
/// reachable from HEAD or the pathspec filter changed. Truncated logs are
/// never cached. Any cache failure falls back to a full extraction.
///
/// Takes `&mut` so the returned future stays `Send`.
///
/// # Errors
///
/// The same reasons as [`extract_history`].
pub async fn load_history_incremental(
    repo_path: &Path,
    cache: &mut CommitCache,
    config: &ExtractConfig,
) -> Result<CommitHistory, HistoryUnavailable> {
    let full = ExtractOptions::from(config);
    let Some(head) = head_commit_id(repo_path)? else {
        return extract_history(repo_path, &full, config.min_commits).await;
    };

    let since = match prepare_cache(repo_path, cache, config) {
        Ok(since) => since,
        Err(e) => {
            tracing::warn!(error = %e, "commit cache unreadable, extracting full history");
            return extract_history(repo_path, &full, config.min_commits).await;
        }
    };

    if since.as_deref() == Some(head.as_str()) {
        tracing::debug!(head = %head, "commit cache is up to date");
    } else {
        let options = ExtractOptions {
            since: since.clone(),
            ..full.clone()
        };
        let log = extract_commits(repo_path, &options).await?;

        if log.truncated {
            tracing::warn!("git log truncated, bypassing commit cache");
            if since.is_some() {
                return extract_history(repo_path, &full, config.min_commits).await;
            }
            return require_history(CommitHistory::from_commits(log.commits, true), config);
        }

        let stored = cache
            .store_commits(&log.commits)
            .and_then(|inserted| cache.set_last_hash(&head).map(|()| inserted));
        match stored {
            Ok(inserted) => {
                tracing::debug!(inserted, incremental = since.is_some(), "updated commit cache");
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to update commit cache");
                if since.is_some() {
                    return extract_history(repo_path, &full, config.min_commits).await;
                }
                return require_history(CommitHistory::from_commits(log.commits, false), config);
            }
        }
    }

    match cache.all_commits(config.max_commits) {
        Ok(commits) => require_history(CommitHistory::from_commits(commits, false), config),
        Err(e) => {
            tracing::warn!(error = %e, "failed to read commit cache");
            extract_history(repo_path, &full, config.min_commits).await
        }
    }
}

/// Reset a stale cache and return the commit to extract from, if any.
fn prepare_cache(
    repo_path: &Path,
    cache: &CommitCache,
    config: &ExtractConfig,
) -> chronos_core::Result<Option<String>> {
    if cache.reset_if_scope_changed(&config.paths.join("\n"))? {
        tracing::info!("pathspec changed, rebuilt commit cache");
    }

    let Some(last) = cache.last_hash()? else {
        return Ok(None);
    };
    if cache.commit_count()? == 0 {
        return Ok(None);
    }
    if !is_reachable_from_head(repo_path, &last) {
        tracing::info!(last = %last, "history was rewritten, rebuilding commit cache");
        cache.clear()?;
        return Ok(None);
    }
    Ok(Some(last))
}

fn require_history(
    history: CommitHistory,
    config: &ExtractConfig,
) -> Result<CommitHistory, HistoryUnavailable> {
    if let Err(reason) = history.require_min_commits(config.min_commits) {
        tracing::info!(
            found = history.total_commits(),
            required = config.min_commits,
            "not enough commits for temporal analysis"
        );
        return Err(reason);
    }
    tracing::info!(
        commits = history.total_commits(),
        files = history.file_set.len(),
        span_days = history.span_days,
        "loaded git history"
    );
    Ok(history)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::churn::Trajectory;
    use crate::mining::Commit;

    fn make_commit(n: usize, author: &str, files: &[&str]) -> Commit {
        Commit {
            hash: format!("{n:040x}"),
            timestamp: 1_700_000_000 - n as i64 * 86_400,
            author: author.into(),
            files: files.iter().map(|f| f.to_string()).collect(),
            subject: "change".into(),
        }
    }

    fn analyzed(files: &[&str]) -> Arc<HashSet<String>> {
        Arc::new(files.iter().map(|f| f.to_string()).collect())
    }

    #[tokio::test]
    async fn builders_share_one_history() {
        let history = CommitHistory::from_commits(
            vec![
                make_commit(0, "alice", &["a.rs", "b.rs"]),
                make_commit(1, "bob", &["a.rs", "b.rs"]),
                make_commit(2, "alice", &["a.rs"]),
            ],
            false,
        );
        let signals = compute_signals(
            Arc::new(history),
            analyzed(&["a.rs", "b.rs"]),
            Arc::new(ChronosConfig::default()),
        )
        .await;

        assert!(signals.is_complete());
        let churn = signals.churn.as_ref().unwrap();
        assert_eq!(churn["a.rs"].total_changes, 3);
        assert_eq!(churn["b.rs"].total_changes, 2);
        assert_eq!(
            signals.cochange.as_ref().unwrap().get("a.rs", "b.rs").unwrap().raw_cochange_count,
            2
        );
        assert!(signals.author_distances.as_ref().unwrap().distance("a.rs", "b.rs").is_some());

        let summary = signals.history.unwrap();
        assert_eq!(summary.total_commits, 3);
        assert_eq!(summary.distinct_authors, 2);
        assert_eq!(summary.file_count, 2);
    }

    #[tokio::test]
    async fn single_author_history_keeps_churn_and_cochange() {
        let history = CommitHistory::from_commits(
            vec![
                make_commit(0, "alice", &["a.rs", "b.rs"]),
                make_commit(1, "alice", &["a.rs", "b.rs"]),
            ],
            false,
        );
        let signals = compute_signals(
            Arc::new(history),
            analyzed(&["a.rs", "b.rs"]),
            Arc::new(ChronosConfig::default()),
        )
        .await;

        assert!(signals.is_complete());
        assert!(signals.author_distances.as_ref().unwrap().is_degenerate());
        assert_eq!(
            signals.churn.as_ref().unwrap()["a.rs"].trajectory,
            Trajectory::Stable
        );
        assert_eq!(signals.cochange.as_ref().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn failed_builder_only_marks_its_own_output() {
        let joined = tokio::task::spawn_blocking(|| -> u32 { panic!("boom") }).await;
        let output = builder_output("cochange", joined);
        match output {
            Err(HistoryUnavailable::BuilderFailed { builder, .. }) => assert_eq!(builder, "cochange"),
            other => panic!("expected BuilderFailed, got {other:?}"),
        }

        let ok = tokio::task::spawn_blocking(|| 7u32).await;
        assert_eq!(builder_output("churn", ok), Ok(7));
    }

    #[tokio::test]
    async fn non_repository_marks_every_output_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let signals =
            analyze_repository(dir.path(), HashSet::new(), &ChronosConfig::default()).await;

        assert!(signals.history.is_none());
        for reason in [
            signals.churn.unwrap_err(),
            signals.cochange.unwrap_err(),
            signals.author_distances.unwrap_err(),
        ] {
            assert!(matches!(reason, HistoryUnavailable::NotARepository { .. }));
        }
    }

    #[tokio::test]
    async fn zero_half_life_is_rejected_before_any_builder_runs() {
        let history = CommitHistory::from_commits(
            vec![
                make_commit(0, "alice", &["a.rs", "b.rs"]),
                make_commit(1, "bob", &["a.rs", "b.rs"]),
            ],
            false,
        );
        let mut config = ChronosConfig::default();
        config.cochange.half_life_days = 0.0;

        let signals = compute_signals(
            Arc::new(history),
            analyzed(&["a.rs", "b.rs"]),
            Arc::new(config.clone()),
        )
        .await;
        assert!(matches!(
            signals.cochange,
            Err(HistoryUnavailable::InvalidConfig { .. })
        ));
        assert!(signals.churn.is_err());
        assert!(signals.author_distances.is_err());
        assert_eq!(signals.history.unwrap().total_commits, 2);

        let dir = tempfile::tempdir().unwrap();
        let signals = analyze_repository(dir.path(), HashSet::new(), &config).await;
        match signals.cochange {
            Err(HistoryUnavailable::InvalidConfig { message }) => {
                assert!(message.contains("half_life_days"), "got {message}")
            }
            other => panic!("expected InvalidConfig, got {other:?}"),
        }
    }

    #[test]
    fn short_history_is_rejected() {
        let history = CommitHistory::from_commits(vec![make_commit(0, "alice", &["a.rs"])], false);
        let err = require_history(history, &ExtractConfig::default()).unwrap_err();
        assert_eq!(
            err,
            HistoryUnavailable::InsufficientHistory {
                found: 1,
                required: 10
            }
        );
    }

    #[test]
    fn unavailable_signals_serialize_reason() {
        let signals = TemporalSignals::unavailable(HistoryUnavailable::InsufficientHistory {
            found: 5,
            required: 10,
        });
        let json = serde_json::to_value(&signals).unwrap();
        assert_eq!(json["churn"]["Err"]["kind"], "insufficientHistory");
        assert_eq!(json["authorDistances"]["Err"]["found"], 5);
        assert!(json["history"].is_null());
    }
}
