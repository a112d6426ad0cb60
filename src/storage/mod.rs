//! Storage layer for Capstan data.
//!
//! This module is the document store behind the issue API. It exposes the
//! operations the HTTP layer needs: insert, find-by-filter,
//! find-one-and-update, find-one-and-delete, and identifier validation.
//!
//! ## Layout
//!
//! - `issues.jsonl` - append-only log, source of truth. Every create and
//!   update appends the full record; deletes append a tombstone. The
//!   latest record for an ID wins, and a tombstone ends its life.
//! - `cache.db` - SQLite index used for filtered queries. Rebuildable
//!   from the log at any time via [`Storage::rebuild_cache`].

use crate::models::{Issue, IssueFilter, IssuePatch, Tombstone};
use crate::{Error, Result};
use chrono::Utc;
use rusqlite::{Connection, params};
use sha2::{Digest, Sha256};
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Prefix for issue identifiers.
pub const ISSUE_ID_PREFIX: &str = "cpn";

/// Number of hex characters in an issue ID suffix.
const ISSUE_ID_HEX_LEN: usize = 12;

/// Document store for the issue collection.
pub struct Storage {
    /// Root directory for this store's data
    pub root: PathBuf,
    /// SQLite connection for indexed queries
    conn: Connection,
}

impl Storage {
    /// Open existing storage rooted at the given data directory.
    pub fn open(data_dir: &Path) -> Result<Self> {
        if !data_dir.join("cache.db").exists() {
            return Err(Error::Other(format!(
                "No store at {}: run `cpn serve` to initialize",
                data_dir.display()
            )));
        }

        let conn = Connection::open(data_dir.join("cache.db"))?;
        Self::init_schema(&conn)?;

        Ok(Self {
            root: data_dir.to_path_buf(),
            conn,
        })
    }

    /// Initialize storage at the given data directory.
    ///
    /// Idempotent: existing files are left alone.
    pub fn init(data_dir: &Path) -> Result<Self> {
        fs::create_dir_all(data_dir)?;

        let issues_path = data_dir.join("issues.jsonl");
        if !issues_path.exists() {
            File::create(&issues_path)?;
        }

        let conn = Connection::open(data_dir.join("cache.db"))?;
        Self::init_schema(&conn)?;

        Ok(Self {
            root: data_dir.to_path_buf(),
            conn,
        })
    }

    /// Open storage, initializing it on first use.
    pub fn open_or_init(data_dir: &Path) -> Result<Self> {
        if Self::exists(data_dir) {
            Self::open(data_dir)
        } else {
            Self::init(data_dir)
        }
    }

    /// Check if storage exists at the given data directory.
    pub fn exists(data_dir: &Path) -> bool {
        data_dir.join("cache.db").exists()
    }

    /// Initialize the SQLite schema.
    fn init_schema(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS issues (
                id TEXT PRIMARY KEY,
                project TEXT NOT NULL,
                issue_title TEXT NOT NULL,
                issue_text TEXT NOT NULL,
                created_by TEXT NOT NULL,
                assigned_to TEXT NOT NULL DEFAULT '',
                status_text TEXT NOT NULL DEFAULT '',
                open INTEGER NOT NULL DEFAULT 1,
                created_on TEXT NOT NULL,
                updated_on TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_issues_project ON issues(project);
            CREATE INDEX IF NOT EXISTS idx_issues_open ON issues(open);
            CREATE INDEX IF NOT EXISTS idx_issues_created_by ON issues(created_by);
            "#,
        )?;
        Ok(())
    }

    /// Cache an issue in SQLite for fast querying.
    fn cache_issue(&self, issue: &Issue) -> Result<()> {
        self.conn.execute(
            r#"
            INSERT OR REPLACE INTO issues
            (id, project, issue_title, issue_text, created_by, assigned_to, status_text, open, created_on, updated_on)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
            params![
                issue.id,
                issue.project,
                issue.issue_title,
                issue.issue_text,
                issue.created_by,
                issue.assigned_to,
                issue.status_text,
                issue.open as i64,
                issue.created_on.to_rfc3339(),
                issue.updated_on.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// Append a record to the JSONL log.
    fn append_record(&self, json: &str) -> Result<()> {
        let issues_path = self.root.join("issues.jsonl");
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&issues_path)?;
        writeln!(file, "{}", json)?;
        Ok(())
    }

    // === Issue Operations ===

    /// Insert a new issue.
    pub fn create_issue(&mut self, issue: &Issue) -> Result<()> {
        let json = serde_json::to_string(issue)?;
        self.append_record(&json)?;
        self.cache_issue(issue)?;
        Ok(())
    }

    /// Get an issue by ID.
    ///
    /// Scans the log for the latest record with this ID; a later
    /// tombstone makes the issue not found.
    pub fn get_issue(&self, id: &str) -> Result<Issue> {
        let issues_path = self.root.join("issues.jsonl");
        if !issues_path.exists() {
            return Err(Error::NotFound(id.to_string()));
        }

        let file = File::open(&issues_path)?;
        let reader = BufReader::new(file);

        let mut latest: Option<Issue> = None;
        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            if let Ok(issue) = serde_json::from_str::<Issue>(&line) {
                if issue.id == id {
                    latest = Some(issue);
                }
            } else if let Ok(tombstone) = serde_json::from_str::<Tombstone>(&line) {
                if tombstone.is_tombstone() && tombstone.id == id {
                    latest = None;
                }
            }
        }

        latest.ok_or_else(|| Error::NotFound(id.to_string()))
    }

    /// Find all issues matching a filter.
    ///
    /// The filter always pins `project`; the remaining fields narrow the
    /// result by exact equality. No ordering is guaranteed.
    pub fn find_issues(&self, filter: &IssueFilter) -> Result<Vec<Issue>> {
        let mut sql = String::from("SELECT id FROM issues WHERE project = ?");
        let mut params_vec: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();
        params_vec.push(Box::new(filter.project.clone()));

        if let Some(id) = &filter.id {
            sql.push_str(" AND id = ?");
            params_vec.push(Box::new(id.clone()));
        }
        if let Some(title) = &filter.issue_title {
            sql.push_str(" AND issue_title = ?");
            params_vec.push(Box::new(title.clone()));
        }
        if let Some(text) = &filter.issue_text {
            sql.push_str(" AND issue_text = ?");
            params_vec.push(Box::new(text.clone()));
        }
        if let Some(author) = &filter.created_by {
            sql.push_str(" AND created_by = ?");
            params_vec.push(Box::new(author.clone()));
        }
        if let Some(assignee) = &filter.assigned_to {
            sql.push_str(" AND assigned_to = ?");
            params_vec.push(Box::new(assignee.clone()));
        }
        if let Some(status) = &filter.status_text {
            sql.push_str(" AND status_text = ?");
            params_vec.push(Box::new(status.clone()));
        }
        if let Some(open) = filter.open {
            sql.push_str(" AND open = ?");
            params_vec.push(Box::new(open as i64));
        }
        if let Some(created_on) = filter.created_on {
            sql.push_str(" AND created_on = ?");
            params_vec.push(Box::new(created_on.to_rfc3339()));
        }
        if let Some(updated_on) = filter.updated_on {
            sql.push_str(" AND updated_on = ?");
            params_vec.push(Box::new(updated_on.to_rfc3339()));
        }

        let params_refs: Vec<&dyn rusqlite::ToSql> =
            params_vec.iter().map(|p| p.as_ref()).collect();

        let mut stmt = self.conn.prepare(&sql)?;
        let ids: Vec<String> = stmt
            .query_map(params_refs.as_slice(), |row| row.get(0))?
            .filter_map(|r| r.ok())
            .collect();

        // Hydrate full issue objects from the log
        let mut issues = Vec::new();
        for id in ids {
            if let Ok(issue) = self.get_issue(&id) {
                issues.push(issue);
            }
        }

        Ok(issues)
    }

    /// Apply a partial update to the issue matching both ID and project.
    ///
    /// Find-one-and-update semantics: the match on `id` AND `project`
    /// happens together with the write, so an update naming the wrong
    /// project for a real ID fails as not found. `updated_on` is always
    /// refreshed.
    pub fn update_issue(&mut self, id: &str, project: &str, patch: &IssuePatch) -> Result<Issue> {
        let mut issue = self.get_issue(id)?;
        if issue.project != project {
            return Err(Error::NotFound(id.to_string()));
        }

        patch.apply(&mut issue);
        issue.updated_on = Utc::now();

        let json = serde_json::to_string(&issue)?;
        self.append_record(&json)?;
        self.cache_issue(&issue)?;

        Ok(issue)
    }

    /// Remove the issue matching both ID and project.
    ///
    /// Find-one-and-delete semantics, like [`Storage::update_issue`].
    /// Appends a tombstone so a cache rebuild replays the deletion.
    pub fn delete_issue(&mut self, id: &str, project: &str) -> Result<()> {
        let issue = self.get_issue(id)?;
        if issue.project != project {
            return Err(Error::NotFound(id.to_string()));
        }

        let tombstone = Tombstone::new(issue.id.clone(), issue.project.clone());
        let json = serde_json::to_string(&tombstone)?;
        self.append_record(&json)?;

        self.conn
            .execute("DELETE FROM issues WHERE id = ?", [id])?;

        Ok(())
    }

    /// Rebuild the SQLite cache from the JSONL log.
    ///
    /// Replays the log in order: issue records upsert, tombstones delete.
    pub fn rebuild_cache(&mut self) -> Result<()> {
        self.conn.execute("DELETE FROM issues", [])?;

        let issues_path = self.root.join("issues.jsonl");
        if !issues_path.exists() {
            return Ok(());
        }

        let file = File::open(&issues_path)?;
        let reader = BufReader::new(file);

        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            if let Ok(issue) = serde_json::from_str::<Issue>(&line) {
                self.cache_issue(&issue)?;
            } else if let Ok(tombstone) = serde_json::from_str::<Tombstone>(&line) {
                if tombstone.is_tombstone() {
                    self.conn
                        .execute("DELETE FROM issues WHERE id = ?", [tombstone.id.as_str()])?;
                }
            }
        }

        Ok(())
    }
}

/// Resolve the data directory: explicit path or the platform default.
pub fn resolve_data_dir(explicit: Option<&Path>) -> Result<PathBuf> {
    match explicit {
        Some(path) => Ok(path.to_path_buf()),
        None => {
            let data_dir = dirs::data_dir()
                .ok_or_else(|| Error::Other("Could not determine data directory".to_string()))?;
            Ok(data_dir.join("capstan"))
        }
    }
}

/// Generate a unique issue ID.
///
/// Format: `cpn-<12 hex chars>`, hashed from a random UUID and the
/// current time so IDs are unique across the whole collection.
pub fn generate_issue_id() -> String {
    let mut hasher = Sha256::new();
    hasher.update(Uuid::new_v4().as_bytes());
    hasher.update(
        Utc::now()
            .timestamp_nanos_opt()
            .unwrap_or(0)
            .to_le_bytes(),
    );
    let hash = hasher.finalize();
    let hash_hex = format!("{:x}", hash);
    format!("{}-{}", ISSUE_ID_PREFIX, &hash_hex[..ISSUE_ID_HEX_LEN])
}

/// Validate that an ID matches the issue ID format.
pub fn validate_issue_id(id: &str) -> Result<()> {
    let prefix = format!("{}-", ISSUE_ID_PREFIX);
    if !id.starts_with(&prefix) {
        return Err(Error::InvalidId(format!(
            "ID must start with '{}', got: {}",
            prefix, id
        )));
    }

    let suffix = &id[prefix.len()..];
    if suffix.len() != ISSUE_ID_HEX_LEN || !suffix.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(Error::InvalidId(format!(
            "ID suffix must be {} hex characters, got: {}",
            ISSUE_ID_HEX_LEN, suffix
        )));
    }

    Ok(())
}
