//! SQLite commit cache for incremental history loading.
//!
//! Parsed commits are stored once; later runs only ask git for commits
//! newer than the last one processed and append them here.

use std::path::Path;

use chronos_core::ChronosError;
use rusqlite::{params, Connection, OptionalExtension};

use crate::mining::Commit;

const SCHEMA_VERSION: &str = "1";
const LAST_HASH_KEY: &str = "last_hash";
const SCHEMA_VERSION_KEY: &str = "schema_version";
const SCOPE_KEY: &str = "scope";

/// Persistent store of parsed commits.
///
/// Every stored commit gets a sequence number; larger means newer, so
/// batches appended by incremental runs stay in history order.
///
/// # Examples
///
/// ```
/// use chronos_history::cache::CommitCache;
///
/// let cache = CommitCache::in_memory().unwrap();
/// assert_eq!(cache.commit_count().unwrap(), 0);
/// assert!(cache.last_hash().unwrap().is_none());
/// ```
pub struct CommitCache {
    conn: Connection,
}

impl CommitCache {
    /// Open or create a cache database at `path`.
    ///
    /// A cache written by a different schema version is cleared.
    ///
    /// # Errors
    ///
    /// Returns [`ChronosError::Database`] if the database cannot be opened.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use std::path::Path;
    /// use chronos_history::cache::CommitCache;
    ///
    /// let cache = CommitCache::open(Path::new(".chronos/commit_cache.db")).unwrap();
    /// ```
    pub fn open(path: &Path) -> Result<Self, ChronosError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                ChronosError::Database(format!("failed to create cache directory: {e}"))
            })?;
        }
        let conn = Connection::open(path)
            .map_err(|e| ChronosError::Database(format!("failed to open commit cache: {e}")))?;

        let cache = Self { conn };
        cache.init_schema()?;
        Ok(cache)
    }

    /// Create an in-memory cache.
    ///
    /// # Errors
    ///
    /// Returns [`ChronosError::Database`] if schema creation fails.
    pub fn in_memory() -> Result<Self, ChronosError> {
        let conn = Connection::open_in_memory().map_err(|e| {
            ChronosError::Database(format!("failed to create in-memory commit cache: {e}"))
        })?;

        let cache = Self { conn };
        cache.init_schema()?;
        Ok(cache)
    }

    fn init_schema(&self) -> Result<(), ChronosError> {
        self.create_tables()?;

        match self.get_meta(SCHEMA_VERSION_KEY)? {
            Some(version) if version == SCHEMA_VERSION => {}
            Some(version) => {
                tracing::info!(
                    found = %version,
                    expected = SCHEMA_VERSION,
                    "commit cache schema changed, rebuilding"
                );
                self.conn
                    .execute_batch(
                        "DROP TABLE IF EXISTS commit_files;
                         DROP TABLE IF EXISTS commits;
                         DELETE FROM cache_meta;",
                    )
                    .map_err(|e| {
                        ChronosError::Database(format!("failed to reset commit cache: {e}"))
                    })?;
                self.create_tables()?;
                self.set_meta(SCHEMA_VERSION_KEY, SCHEMA_VERSION)?;
            }
            None => self.set_meta(SCHEMA_VERSION_KEY, SCHEMA_VERSION)?,
        }
        Ok(())
    }

    fn create_tables(&self) -> Result<(), ChronosError> {
        self.conn
            .execute_batch(
                "
                CREATE TABLE IF NOT EXISTS cache_meta (
                    key TEXT PRIMARY KEY,
                    value TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS commits (
                    hash TEXT PRIMARY KEY,
                    seq INTEGER NOT NULL UNIQUE,
                    timestamp INTEGER NOT NULL,
                    author TEXT NOT NULL,
                    subject TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS commit_files (
                    hash TEXT NOT NULL,
                    file_path TEXT NOT NULL,
                    position INTEGER NOT NULL,
                    PRIMARY KEY (hash, position),
                    FOREIGN KEY (hash) REFERENCES commits(hash)
                );

                CREATE INDEX IF NOT EXISTS idx_commit_files_path ON commit_files(file_path);
                ",
            )
            .map_err(|e| ChronosError::Database(format!("failed to create schema: {e}")))
    }

    fn get_meta(&self, key: &str) -> Result<Option<String>, ChronosError> {
        self.conn
            .query_row(
                "SELECT value FROM cache_meta WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| ChronosError::Database(format!("failed to read '{key}': {e}")))
    }

    fn set_meta(&self, key: &str, value: &str) -> Result<(), ChronosError> {
        self.conn
            .execute(
                "INSERT OR REPLACE INTO cache_meta (key, value) VALUES (?1, ?2)",
                params![key, value],
            )
            .map_err(|e| ChronosError::Database(format!("failed to write '{key}': {e}")))?;
        Ok(())
    }

    /// Hash of the newest commit processed so far.
    ///
    /// # Errors
    ///
    /// Returns [`ChronosError::Database`] on query failure.
    pub fn last_hash(&self) -> Result<Option<String>, ChronosError> {
        self.get_meta(LAST_HASH_KEY)
    }

    /// Record the newest processed commit.
    ///
    /// # Errors
    ///
    /// Returns [`ChronosError::Database`] on write failure.
    pub fn set_last_hash(&self, hash: &str) -> Result<(), ChronosError> {
        self.set_meta(LAST_HASH_KEY, hash)
    }

    /// Clear the cache if it was filled under a different `scope`, then
    /// record `scope`. Returns `true` if the cache was cleared.
    ///
    /// The scope identifies what the cached log covers (the pathspec
    /// filter), so a narrowed or widened filter never mixes with old data.
    ///
    /// # Errors
    ///
    /// Returns [`ChronosError::Database`] on query or write failure.
    ///
    /// # Examples
    ///
    /// ```
    /// use chronos_history::cache::CommitCache;
    ///
    /// let cache = CommitCache::in_memory().unwrap();
    /// assert!(!cache.reset_if_scope_changed("src").unwrap());
    /// assert!(!cache.reset_if_scope_changed("src").unwrap());
    /// assert!(cache.reset_if_scope_changed("docs").unwrap());
    /// ```
    pub fn reset_if_scope_changed(&self, scope: &str) -> Result<bool, ChronosError> {
        let cleared = match self.get_meta(SCOPE_KEY)? {
            Some(stored) if stored == scope => return Ok(false),
            Some(_) => {
                self.clear()?;
                true
            }
            None => false,
        };
        self.set_meta(SCOPE_KEY, scope)?;
        Ok(cleared)
    }

    /// Store a newest-first batch of commits that is newer than anything
    /// already cached.
    ///
    /// Commits already present are skipped. Returns how many were inserted.
    ///
    /// # Errors
    ///
    /// Returns [`ChronosError::Database`] on write failure; nothing from
    /// the batch is kept in that case.
    ///
    /// # Examples
    ///
    /// ```
    /// use chronos_history::cache::CommitCache;
    /// use chronos_history::mining::Commit;
    ///
    /// let cache = CommitCache::in_memory().unwrap();
    /// let commit = Commit {
    ///     hash: "a".repeat(40),
    ///     timestamp: 1_700_000_000,
    ///     author: "alice@example.com".into(),
    ///     files: vec!["src/lib.rs".into()],
    ///     subject: "init".into(),
    /// };
    /// assert_eq!(cache.store_commits(&[commit.clone()]).unwrap(), 1);
    /// assert_eq!(cache.store_commits(&[commit]).unwrap(), 0);
    /// ```
    pub fn store_commits(&self, commits: &[Commit]) -> Result<usize, ChronosError> {
        let tx = self
            .conn
            .unchecked_transaction()
            .map_err(|e| ChronosError::Database(format!("failed to begin transaction: {e}")))?;

        let mut seq: i64 = tx
            .query_row("SELECT COALESCE(MAX(seq), 0) FROM commits", [], |row| {
                row.get(0)
            })
            .map_err(|e| ChronosError::Database(format!("failed to read sequence: {e}")))?;

        let mut inserted = 0usize;
        // Oldest first so sequence numbers grow toward the newest commit.
        for commit in commits.iter().rev() {
            let exists: bool = tx
                .query_row(
                    "SELECT EXISTS(SELECT 1 FROM commits WHERE hash = ?1)",
                    params![commit.hash],
                    |row| row.get(0),
                )
                .map_err(|e| ChronosError::Database(format!("failed to check commit: {e}")))?;
            if exists {
                continue;
            }

            seq += 1;
            tx.execute(
                "INSERT INTO commits (hash, seq, timestamp, author, subject)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![commit.hash, seq, commit.timestamp, commit.author, commit.subject],
            )
            .map_err(|e| ChronosError::Database(format!("failed to insert commit: {e}")))?;

            for (position, path) in commit.files.iter().enumerate() {
                tx.execute(
                    "INSERT INTO commit_files (hash, file_path, position) VALUES (?1, ?2, ?3)",
                    params![commit.hash, path, position as i64],
                )
                .map_err(|e| {
                    ChronosError::Database(format!("failed to insert commit file: {e}"))
                })?;
            }
            inserted += 1;
        }

        tx.commit()
            .map_err(|e| ChronosError::Database(format!("failed to commit transaction: {e}")))?;

        tracing::debug!(inserted, offered = commits.len(), "stored commits in cache");
        Ok(inserted)
    }

    /// Cached commits, newest first, at most `limit` of them.
    ///
    /// # Errors
    ///
    /// Returns [`ChronosError::Database`] on query failure.
    pub fn all_commits(&self, limit: usize) -> Result<Vec<Commit>, ChronosError> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        self.query_commits(
            "SELECT hash, timestamp, author, subject FROM commits
             ORDER BY seq DESC LIMIT ?1",
            params![limit],
        )
    }

    /// Cached commits newer than `hash`, newest first.
    ///
    /// Empty when `hash` is unknown.
    ///
    /// # Errors
    ///
    /// Returns [`ChronosError::Database`] on query failure.
    pub fn commits_since(&self, hash: &str) -> Result<Vec<Commit>, ChronosError> {
        self.query_commits(
            "SELECT hash, timestamp, author, subject FROM commits
             WHERE seq > (SELECT seq FROM commits WHERE hash = ?1)
             ORDER BY seq DESC",
            params![hash],
        )
    }

    fn query_commits(
        &self,
        sql: &str,
        args: impl rusqlite::Params,
    ) -> Result<Vec<Commit>, ChronosError> {
        let mut stmt = self
            .conn
            .prepare(sql)
            .map_err(|e| ChronosError::Database(format!("failed to prepare query: {e}")))?;

        let rows = stmt
            .query_map(args, |row| {
                Ok(Commit {
                    hash: row.get(0)?,
                    timestamp: row.get(1)?,
                    author: row.get(2)?,
                    subject: row.get(3)?,
                    files: Vec::new(),
                })
            })
            .map_err(|e| ChronosError::Database(format!("failed to query commits: {e}")))?;

        let mut commits = Vec::new();
        for row in rows {
            let commit =
                row.map_err(|e| ChronosError::Database(format!("failed to read row: {e}")))?;
            commits.push(commit);
        }

        let mut files_stmt = self
            .conn
            .prepare("SELECT file_path FROM commit_files WHERE hash = ?1 ORDER BY position")
            .map_err(|e| ChronosError::Database(format!("failed to prepare query: {e}")))?;

        for commit in &mut commits {
            let paths = files_stmt
                .query_map(params![commit.hash], |row| row.get::<_, String>(0))
                .map_err(|e| ChronosError::Database(format!("failed to query files: {e}")))?;
            for path in paths {
                commit.files.push(
                    path.map_err(|e| ChronosError::Database(format!("failed to read row: {e}")))?,
                );
            }
        }

        Ok(commits)
    }

    /// Whether `hash` is cached.
    ///
    /// # Errors
    ///
    /// Returns [`ChronosError::Database`] on query failure.
    pub fn is_cached(&self, hash: &str) -> Result<bool, ChronosError> {
        self.conn
            .query_row(
                "SELECT EXISTS(SELECT 1 FROM commits WHERE hash = ?1)",
                params![hash],
                |row| row.get(0),
            )
            .map_err(|e| ChronosError::Database(format!("failed to check commit: {e}")))
    }

    /// Number of cached commits.
    ///
    /// # Errors
    ///
    /// Returns [`ChronosError::Database`] on query failure.
    pub fn commit_count(&self) -> Result<usize, ChronosError> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM commits", [], |row| row.get(0))
            .map_err(|e| ChronosError::Database(format!("failed to count commits: {e}")))?;
        Ok(count as usize)
    }

    /// Drop every cached commit and the last processed hash.
    ///
    /// # Errors
    ///
    /// Returns [`ChronosError::Database`] on delete failure.
    pub fn clear(&self) -> Result<(), ChronosError> {
        self.conn
            .execute_batch(
                "DELETE FROM commit_files;
                 DELETE FROM commits;",
            )
            .map_err(|e| ChronosError::Database(format!("failed to clear commit cache: {e}")))?;
        self.conn
            .execute("DELETE FROM cache_meta WHERE key = ?1", params![LAST_HASH_KEY])
            .map_err(|e| ChronosError::Database(format!("failed to clear last hash: {e}")))?;
        Ok(())
    }
}
