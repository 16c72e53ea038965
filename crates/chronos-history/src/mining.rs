//! Commit log extraction via the `git` binary.
//!
//! Runs `git log` with a pipe-delimited header per commit followed by the
//! changed paths, under an output byte budget and a wall-clock timeout, and
//! parses the result into a [`CommitHistory`].

use std::collections::{BTreeSet, HashSet};
use std::path::Path;
use std::process::Stdio;
use std::sync::LazyLock;
use std::time::Duration;

use chronos_core::{ExtractConfig, HistoryUnavailable};
use regex::Regex;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncReadExt;
use tokio::process::{Child, Command};

/// `git log` pretty format: id, author time, author e-mail, subject.
const LOG_FORMAT: &str = "--format=%H|%at|%ae|%s";

const READ_CHUNK_BYTES: usize = 1024 * 1024;

const SECONDS_PER_DAY: i64 = 86_400;

static HEADER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[0-9a-f]{40}\|\d+\|[^|]*\|").expect("commit header pattern is valid")
});

/// One changeset from the log.
///
/// # Examples
///
/// ```
/// use chronos_history::mining::Commit;
///
/// let commit = Commit {
///     hash: "a".repeat(40),
///     timestamp: 1_700_000_000,
///     author: "alice@example.com".into(),
///     files: vec!["src/lib.rs".into()],
///     subject: "fix: off-by-one in window index".into(),
/// };
/// assert_eq!(commit.files.len(), 1);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Commit {
    /// Full commit id.
    pub hash: String,
    /// Author time, seconds since the epoch.
    pub timestamp: i64,
    /// Author identity (e-mail).
    pub author: String,
    /// Changed paths relative to the repository root, in log order.
    pub files: Vec<String>,
    /// First line of the commit message.
    pub subject: String,
}

/// Parsed history, newest commit first.
///
/// Every commit has at least one changed file; commits without files are
/// dropped on construction.
///
/// # Examples
///
/// ```
/// use chronos_history::mining::{Commit, CommitHistory};
///
/// let commits = vec![
///     Commit {
///         hash: "b".repeat(40),
///         timestamp: 3 * 86_400,
///         author: "bob@example.com".into(),
///         files: vec!["a.rs".into(), "b.rs".into()],
///         subject: "wire b into a".into(),
///     },
///     Commit {
///         hash: "a".repeat(40),
///         timestamp: 0,
///         author: "alice@example.com".into(),
///         files: vec!["a.rs".into()],
///         subject: "init".into(),
///     },
/// ];
/// let history = CommitHistory::from_commits(commits, false);
/// assert_eq!(history.total_commits(), 2);
/// assert_eq!(history.span_days, 3);
/// assert_eq!(history.file_set.len(), 2);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitHistory {
    /// Commits, newest first.
    pub commits: Vec<Commit>,
    /// Every path seen in any commit.
    pub file_set: BTreeSet<String>,
    /// Whole days between the oldest and newest commit.
    pub span_days: i64,
    /// Whether the raw log hit the output budget and was cut short.
    pub truncated: bool,
}

impl CommitHistory {
    /// Build a history from parsed commits, discarding any without files.
    pub fn from_commits(commits: Vec<Commit>, truncated: bool) -> Self {
        let commits: Vec<Commit> = commits.into_iter().filter(|c| !c.files.is_empty()).collect();

        let file_set = commits
            .iter()
            .flat_map(|c| c.files.iter().cloned())
            .collect();

        let span_days = match time_range(&commits) {
            Some((oldest, newest)) if commits.len() >= 2 => {
                ((newest - oldest) / SECONDS_PER_DAY).max(1)
            }
            _ => 0,
        };

        Self {
            commits,
            file_set,
            span_days,
            truncated,
        }
    }

    /// Number of commits.
    pub fn total_commits(&self) -> usize {
        self.commits.len()
    }

    /// Returns `true` if there are no commits.
    pub fn is_empty(&self) -> bool {
        self.commits.is_empty()
    }

    /// Number of distinct author identities.
    pub fn distinct_authors(&self) -> usize {
        self.commits
            .iter()
            .map(|c| c.author.as_str())
            .collect::<HashSet<_>>()
            .len()
    }

    /// Earliest and latest commit timestamps.
    pub fn time_range(&self) -> Option<(i64, i64)> {
        time_range(&self.commits)
    }

    /// Fail with [`HistoryUnavailable::InsufficientHistory`] below `min_commits`.
    ///
    /// # Errors
    ///
    /// Returns the unavailable reason when the history is too short to be
    /// statistically meaningful.
    pub fn require_min_commits(&self, min_commits: usize) -> Result<(), HistoryUnavailable> {
        if self.total_commits() < min_commits {
            return Err(HistoryUnavailable::InsufficientHistory {
                found: self.total_commits(),
                required: min_commits,
            });
        }
        Ok(())
    }
}

fn time_range(commits: &[Commit]) -> Option<(i64, i64)> {
    let oldest = commits.iter().map(|c| c.timestamp).min()?;
    let newest = commits.iter().map(|c| c.timestamp).max()?;
    Some((oldest, newest))
}

/// Options for a single `git log` invocation.
///
/// # Examples
///
/// ```
/// use chronos_history::mining::ExtractOptions;
///
/// let opts = ExtractOptions::default();
/// assert_eq!(opts.max_commits, 5000);
/// assert_eq!(opts.timeout.as_secs(), 30);
/// assert!(opts.since.is_none());
/// ```
#[derive(Debug, Clone)]
pub struct ExtractOptions {
    /// Maximum commits to request (`-n`).
    pub max_commits: usize,
    /// Raw output budget in bytes.
    pub max_output_bytes: usize,
    /// Wall-clock limit for the process.
    pub timeout: Duration,
    /// Git executable.
    pub git_binary: String,
    /// Pathspecs restricting the log.
    pub paths: Vec<String>,
    /// Only emit commits not reachable from this commit (`<since>..HEAD`).
    pub since: Option<String>,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self::from(&ExtractConfig::default())
    }
}

impl From<&ExtractConfig> for ExtractOptions {
    fn from(config: &ExtractConfig) -> Self {
        Self {
            max_commits: config.max_commits,
            max_output_bytes: config.max_output_bytes,
            timeout: Duration::from_secs(config.timeout_secs),
            git_binary: config.git_binary.clone(),
            paths: config.paths.clone(),
            since: None,
        }
    }
}

/// Commits parsed from one `git log` run, before the minimum-size gate.
#[derive(Debug, Clone, Default)]
pub struct RawLog {
    /// Commits with at least one file, newest first.
    pub commits: Vec<Commit>,
    /// Whether the output budget cut the log short.
    pub truncated: bool,
}

/// Parse `git log --format=%H|%at|%ae|%s --name-only` output.
///
/// Header lines are recognized by their 40-character hex id and split on
/// the first three pipes only, so subjects may contain `|`. Lines after a
/// header up to the next header are that commit's paths. Commits without
/// paths (merges in this format) are dropped.
///
/// # Examples
///
/// ```
/// use chronos_history::mining::parse_log;
///
/// let a = "a".repeat(40);
/// let m = "c".repeat(40);
/// let raw = format!(
///     "{m}|1700000100|bob@x.io|Merge branch 'dev'\n\
///      {a}|1700000000|alice@x.io|fix: parse a|b pairs\n\
///      \n\
///      src/parse.rs\n\
///      src/lib.rs\n"
/// );
/// let commits = parse_log(&raw);
/// assert_eq!(commits.len(), 1);
/// assert_eq!(commits[0].subject, "fix: parse a|b pairs");
/// assert_eq!(commits[0].files, vec!["src/parse.rs", "src/lib.rs"]);
/// ```
pub fn parse_log(raw: &str) -> Vec<Commit> {
    let mut commits = Vec::new();
    let mut current: Option<Commit> = None;

    for line in raw.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        if HEADER_RE.is_match(line) {
            if let Some(commit) = current.take() {
                push_if_nonempty(&mut commits, commit);
            }
            current = parse_header(line);
        } else if let Some(commit) = current.as_mut() {
            commit.files.push(line.to_string());
        }
    }

    if let Some(commit) = current {
        push_if_nonempty(&mut commits, commit);
    }

    commits
}

fn parse_header(line: &str) -> Option<Commit> {
    let mut parts = line.splitn(4, '|');
    let hash = parts.next()?;
    let timestamp = parts.next()?.parse::<i64>().ok()?;
    let author = parts.next()?;
    let subject = parts.next().unwrap_or("");

    Some(Commit {
        hash: hash.to_string(),
        timestamp,
        author: author.to_string(),
        files: Vec::new(),
        subject: subject.to_string(),
    })
}

fn push_if_nonempty(commits: &mut Vec<Commit>, commit: Commit) {
    if !commit.files.is_empty() {
        commits.push(commit);
    }
}

/// Returns `true` if `path` is inside a git repository.
pub fn is_git_repository(path: &Path) -> bool {
    git2::Repository::discover(path).is_ok()
}

/// Run `git log` at `repo_path` and parse the output.
///
/// No minimum-size gate is applied; see [`extract_history`].
///
/// # Errors
///
/// - [`HistoryUnavailable::NotARepository`] if no repository contains `repo_path`.
/// - [`HistoryUnavailable::ExternalToolFailure`] if git cannot be spawned,
///   exits non-zero, or exceeds `options.timeout`.
///
/// Exceeding the byte budget is not an error: the parsed prefix is returned
/// with `truncated` set.
pub async fn extract_commits(
    repo_path: &Path,
    options: &ExtractOptions,
) -> Result<RawLog, HistoryUnavailable> {
    if head_commit_id(repo_path)?.is_none() {
        tracing::info!(path = %repo_path.display(), "repository has no commits yet");
        return Ok(RawLog::default());
    }

    let mut child = spawn_git_log(repo_path, options)?;

    let (raw, truncated) =
        match tokio::time::timeout(options.timeout, read_log(&mut child, options.max_output_bytes))
            .await
        {
            Ok(result) => result?,
            Err(_) => {
                let _ = child.kill().await;
                tracing::warn!(
                    timeout_secs = options.timeout.as_secs(),
                    "git log timed out"
                );
                return Err(HistoryUnavailable::tool_failure(format!(
                    "git log timed out after {}s",
                    options.timeout.as_secs()
                )));
            }
        };

    if truncated {
        tracing::warn!(
            limit_bytes = options.max_output_bytes,
            "git log output exceeded budget, truncating"
        );
    }

    let commits = parse_log(&String::from_utf8_lossy(&raw));
    tracing::debug!(commits = commits.len(), truncated, "parsed git log");

    Ok(RawLog { commits, truncated })
}

/// Extract a [`CommitHistory`] with at least `min_commits` commits.
///
/// # Errors
///
/// Everything [`extract_commits`] returns, plus
/// [`HistoryUnavailable::InsufficientHistory`] for short histories.
///
/// # Examples
///
/// ```no_run
/// use std::path::Path;
/// use chronos_history::mining::{extract_history, ExtractOptions};
///
/// # async fn run() {
/// match extract_history(Path::new("."), &ExtractOptions::default(), 10).await {
///     Ok(history) => println!("{} commits over {} days", history.total_commits(), history.span_days),
///     Err(reason) => println!("temporal data unavailable: {reason}"),
/// }
/// # }
/// ```
pub async fn extract_history(
    repo_path: &Path,
    options: &ExtractOptions,
    min_commits: usize,
) -> Result<CommitHistory, HistoryUnavailable> {
    let log = extract_commits(repo_path, options).await?;
    let history = CommitHistory::from_commits(log.commits, log.truncated);

    if let Err(reason) = history.require_min_commits(min_commits) {
        tracing::info!(
            found = history.total_commits(),
            required = min_commits,
            "not enough commits for temporal analysis"
        );
        return Err(reason);
    }

    tracing::info!(
        commits = history.total_commits(),
        files = history.file_set.len(),
        span_days = history.span_days,
        "extracted git history"
    );
    Ok(history)
}

/// Id of the commit HEAD points at, or `None` on an unborn branch.
///
/// # Errors
///
/// - [`HistoryUnavailable::NotARepository`] if no repository contains `repo_path`.
/// - [`HistoryUnavailable::ExternalToolFailure`] if HEAD cannot be resolved.
pub fn head_commit_id(repo_path: &Path) -> Result<Option<String>, HistoryUnavailable> {
    let repo = git2::Repository::discover(repo_path).map_err(|e| {
        tracing::info!(path = %repo_path.display(), error = %e, "not a git repository");
        HistoryUnavailable::NotARepository {
            path: repo_path.to_path_buf(),
        }
    })?;
    tracing::debug!(git_dir = %repo.path().display(), "opened git repository");

    let head = match repo.head() {
        Ok(head) => head,
        Err(e) if e.code() == git2::ErrorCode::UnbornBranch => return Ok(None),
        Err(e) => {
            return Err(HistoryUnavailable::tool_failure(format!(
                "failed to resolve HEAD: {e}"
            )))
        }
    };
    let commit = head
        .peel_to_commit()
        .map_err(|e| HistoryUnavailable::tool_failure(format!("HEAD is not a commit: {e}")))?;
    Ok(Some(commit.id().to_string()))
}

/// Whether `commit_id` is HEAD or an ancestor of it.
///
/// `false` for unknown ids and rewritten history.
pub fn is_reachable_from_head(repo_path: &Path, commit_id: &str) -> bool {
    let Ok(repo) = git2::Repository::discover(repo_path) else {
        return false;
    };
    let Ok(oid) = git2::Oid::from_str(commit_id) else {
        return false;
    };
    let Ok(head) = repo.head().and_then(|h| h.peel_to_commit()) else {
        return false;
    };
    head.id() == oid || repo.graph_descendant_of(head.id(), oid).unwrap_or(false)
}

fn spawn_git_log(repo_path: &Path, options: &ExtractOptions) -> Result<Child, HistoryUnavailable> {
    let mut cmd = Command::new(&options.git_binary);
    cmd.arg("-C")
        .arg(repo_path)
        .args(["-c", "core.quotepath=off", "log", LOG_FORMAT, "--name-only"])
        .arg(format!("-n{}", options.max_commits));

    if let Some(ref since) = options.since {
        cmd.arg(format!("{since}..HEAD"));
    }
    if !options.paths.is_empty() {
        cmd.arg("--").args(&options.paths);
    }

    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| {
            tracing::warn!(binary = %options.git_binary, error = %e, "failed to spawn git");
            HistoryUnavailable::tool_failure(format!(
                "failed to run {}: {e}",
                options.git_binary
            ))
        })
}

/// Read stdout up to `budget` bytes. Returns the bytes and whether the
/// budget was hit; on truncation the child is killed and the output is cut
/// back to the last complete line.
async fn read_log(child: &mut Child, budget: usize) -> Result<(Vec<u8>, bool), HistoryUnavailable> {
    let mut stdout = child
        .stdout
        .take()
        .ok_or_else(|| HistoryUnavailable::tool_failure("git stdout was not captured"))?;
    let mut stderr = child
        .stderr
        .take()
        .ok_or_else(|| HistoryUnavailable::tool_failure("git stderr was not captured"))?;

    // Drain stderr concurrently so a chatty git cannot block on a full pipe.
    let stderr_task = tokio::spawn(async move {
        let mut buf = Vec::new();
        let _ = stderr.read_to_end(&mut buf).await;
        buf
    });

    let mut out = Vec::new();
    let mut chunk = vec![0u8; READ_CHUNK_BYTES];
    let mut truncated = false;

    loop {
        let n = stdout
            .read(&mut chunk)
            .await
            .map_err(|e| HistoryUnavailable::tool_failure(format!("failed to read git output: {e}")))?;
        if n == 0 {
            break;
        }
        if out.len() + n > budget {
            let room = budget - out.len();
            out.extend_from_slice(&chunk[..room]);
            truncated = true;
            break;
        }
        out.extend_from_slice(&chunk[..n]);
    }

    if truncated {
        drop(stdout);
        let _ = child.kill().await;
        stderr_task.abort();
        let keep = out.iter().rposition(|&b| b == b'\n').map_or(0, |i| i + 1);
        out.truncate(keep);
        return Ok((out, true));
    }

    let status = child
        .wait()
        .await
        .map_err(|e| HistoryUnavailable::tool_failure(format!("failed to wait for git: {e}")))?;
    let stderr = stderr_task.await.unwrap_or_default();

    if !status.success() {
        let stderr = String::from_utf8_lossy(&stderr);
        tracing::warn!(%status, stderr = %stderr.trim(), "git log failed");
        return Err(HistoryUnavailable::tool_failure(format!(
            "git log exited with {status}: {}",
            stderr.trim()
        )));
    }

    Ok((out, false))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hash(c: char) -> String {
        std::iter::repeat(c).take(40).collect()
    }

    #[test]
    fn extract_options_follow_config() {
        let config = ExtractConfig {
            max_commits: 50,
            timeout_secs: 5,
            paths: vec!["src".into()],
            ..ExtractConfig::default()
        };
        let opts = ExtractOptions::from(&config);
        assert_eq!(opts.max_commits, 50);
        assert_eq!(opts.timeout, Duration::from_secs(5));
        assert_eq!(opts.paths, vec!["src"]);
        assert!(opts.since.is_none());
    }

    #[test]
    fn parses_header_and_files() {
        let raw = format!(
            "{}|1700000000|alice@example.com|add parser\nsrc/a.rs\nsrc/b.rs\n",
            hash('a')
        );
        let commits = parse_log(&raw);
        assert_eq!(commits.len(), 1);
        let c = &commits[0];
        assert_eq!(c.hash, hash('a'));
        assert_eq!(c.timestamp, 1_700_000_000);
        assert_eq!(c.author, "alice@example.com");
        assert_eq!(c.subject, "add parser");
        assert_eq!(c.files, vec!["src/a.rs", "src/b.rs"]);
    }

    #[test]
    fn subject_keeps_pipe_characters() {
        let raw = format!("{}|1|a@x|fix auth | update deps | more\nf.rs\n", hash('1'));
        let commits = parse_log(&raw);
        assert_eq!(commits[0].subject, "fix auth | update deps | more");
    }

    #[test]
    fn empty_subject_is_allowed() {
        let raw = format!("{}|1|a@x|\nf.rs\n", hash('2'));
        let commits = parse_log(&raw);
        assert_eq!(commits.len(), 1);
        assert_eq!(commits[0].subject, "");
    }

    #[test]
    fn consecutive_headers_drop_fileless_commit() {
        let raw = format!(
            "{}|3|a@x|Merge pull request #4\n{}|2|b@x|real change\n\nx.rs\n",
            hash('c'),
            hash('d')
        );
        let commits = parse_log(&raw);
        assert_eq!(commits.len(), 1);
        assert_eq!(commits[0].hash, hash('d'));
    }

    #[test]
    fn trailing_merge_is_dropped() {
        let raw = format!("{}|2|b@x|change\nx.rs\n{}|1|a@x|Merge\n", hash('d'), hash('e'));
        let commits = parse_log(&raw);
        assert_eq!(commits.len(), 1);
    }

    #[test]
    fn lines_before_first_header_are_ignored() {
        let raw = format!("stray.rs\n{}|1|a@x|s\nx.rs\n", hash('f'));
        let commits = parse_log(&raw);
        assert_eq!(commits.len(), 1);
        assert_eq!(commits[0].files, vec!["x.rs"]);
    }

    #[test]
    fn short_or_uppercase_ids_are_not_headers() {
        let raw = format!(
            "{}|1|a@x|s\nabc123|2|b@x|not a header\n{}|3|c@x|nor this\n",
            hash('a'),
            hash('A')
        );
        let commits = parse_log(&raw);
        assert_eq!(commits.len(), 1);
        assert_eq!(commits[0].files.len(), 2);
    }

    #[test]
    fn empty_author_still_starts_a_commit() {
        let raw = format!(
            "{}|2|a@x|first\na.rs\n{}|1||no email\nb.rs\n",
            hash('a'),
            hash('b')
        );
        let commits = parse_log(&raw);
        assert_eq!(commits.len(), 2);
        assert_eq!(commits[0].files, vec!["a.rs"]);
        assert_eq!(commits[1].author, "");
        assert_eq!(commits[1].files, vec!["b.rs"]);
    }

    #[test]
    fn unparsable_timestamp_discards_commit() {
        let raw = format!(
            "{}|99999999999999999999999|a@x|overflow\nlost.rs\n{}|5|b@x|ok\nkept.rs\n",
            hash('a'),
            hash('b')
        );
        let commits = parse_log(&raw);
        assert_eq!(commits.len(), 1);
        assert_eq!(commits[0].files, vec!["kept.rs"]);
    }

    #[test]
    fn crlf_line_endings_are_handled() {
        let raw = format!("{}|1|a@x|s\r\nx.rs\r\n", hash('a'));
        let commits = parse_log(&raw);
        assert_eq!(commits[0].subject, "s");
        assert_eq!(commits[0].files, vec!["x.rs"]);
    }

    #[test]
    fn history_drops_empty_commits_and_computes_span() {
        let commits = vec![
            Commit {
                hash: hash('a'),
                timestamp: 10 * SECONDS_PER_DAY,
                author: "a@x".into(),
                files: vec!["a.rs".into()],
                subject: String::new(),
            },
            Commit {
                hash: hash('b'),
                timestamp: 5 * SECONDS_PER_DAY,
                author: "b@x".into(),
                files: vec![],
                subject: String::new(),
            },
            Commit {
                hash: hash('c'),
                timestamp: 0,
                author: "a@x".into(),
                files: vec!["b.rs".into()],
                subject: String::new(),
            },
        ];
        let history = CommitHistory::from_commits(commits, false);
        assert_eq!(history.total_commits(), 2);
        assert_eq!(history.span_days, 10);
        assert_eq!(history.distinct_authors(), 1);
        assert!(history.commits.iter().all(|c| !c.files.is_empty()));
    }

    #[test]
    fn span_is_at_least_one_day_for_multiple_commits() {
        let make = |c: char, ts: i64| Commit {
            hash: hash(c),
            timestamp: ts,
            author: "a@x".into(),
            files: vec!["a.rs".into()],
            subject: String::new(),
        };
        let history = CommitHistory::from_commits(vec![make('a', 100), make('b', 50)], false);
        assert_eq!(history.span_days, 1);

        let single = CommitHistory::from_commits(vec![make('a', 100)], false);
        assert_eq!(single.span_days, 0);
    }

    #[test]
    fn min_commit_gate_reports_counts() {
        let history = CommitHistory::default();
        let err = history.require_min_commits(10).unwrap_err();
        assert_eq!(
            err,
            HistoryUnavailable::InsufficientHistory {
                found: 0,
                required: 10
            }
        );
        assert!(history.require_min_commits(0).is_ok());
    }

    #[tokio::test]
    async fn plain_directory_is_not_a_repository() {
        let dir = tempfile::tempdir().unwrap();
        let result = extract_commits(dir.path(), &ExtractOptions::default()).await;
        assert!(matches!(
            result,
            Err(HistoryUnavailable::NotARepository { .. })
        ));
    }
}
