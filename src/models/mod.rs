//! Data models for Capstan entities.
//!
//! This module defines the core data structures:
//! - `Issue` - The tracked record, partitioned by project
//! - `IssuePatch` - Partial update applied by PUT requests
//! - `IssueFilter` - Typed filter built from list query parameters
//! - `Tombstone` - Deletion marker persisted to the append-only log

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// An issue tracked by Capstan.
///
/// The serialized shape is both the wire format (`_id` on the outside)
/// and the JSONL persistence format.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Issue {
    /// Unique identifier (e.g., "cpn-3f9a12bc04de"), storage-assigned
    #[serde(rename = "_id")]
    pub id: String,

    /// Issue title
    pub issue_title: String,

    /// Detailed description
    pub issue_text: String,

    /// Author of the issue
    pub created_by: String,

    /// Assigned user or agent (empty when unassigned)
    #[serde(default)]
    pub assigned_to: String,

    /// Free-form status note (e.g., "In QA")
    #[serde(default)]
    pub status_text: String,

    /// Creation timestamp, immutable after creation
    pub created_on: DateTime<Utc>,

    /// Last update timestamp, refreshed on every successful update
    pub updated_on: DateTime<Utc>,

    /// Whether the issue is still open
    #[serde(default = "default_open")]
    pub open: bool,

    /// Owning project, taken from the URL path, immutable
    pub project: String,
}

fn default_open() -> bool {
    true
}

impl Issue {
    /// Create a new open issue with both timestamps set to now.
    pub fn new(
        id: String,
        project: String,
        issue_title: String,
        issue_text: String,
        created_by: String,
        assigned_to: String,
        status_text: String,
    ) -> Self {
        let now = Utc::now();
        Self {
            id,
            issue_title,
            issue_text,
            created_by,
            assigned_to,
            status_text,
            created_on: now,
            updated_on: now,
            open: true,
            project,
        }
    }
}

/// A partial update to an issue, as sent by a PUT request.
///
/// Every field is optional; an all-`None` patch is a no-op request and
/// rejected before it reaches storage. `updated_on` is not part of the
/// patch, the store refreshes it on every successful update.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct IssuePatch {
    pub issue_title: Option<String>,
    pub issue_text: Option<String>,
    pub created_by: Option<String>,
    pub assigned_to: Option<String>,
    pub status_text: Option<String>,
    pub open: Option<bool>,
}

impl IssuePatch {
    /// Returns true if no mutable field was supplied.
    pub fn is_empty(&self) -> bool {
        self.issue_title.is_none()
            && self.issue_text.is_none()
            && self.created_by.is_none()
            && self.assigned_to.is_none()
            && self.status_text.is_none()
            && self.open.is_none()
    }

    /// Apply this patch to an issue in place.
    pub fn apply(&self, issue: &mut Issue) {
        if let Some(v) = &self.issue_title {
            issue.issue_title = v.clone();
        }
        if let Some(v) = &self.issue_text {
            issue.issue_text = v.clone();
        }
        if let Some(v) = &self.created_by {
            issue.created_by = v.clone();
        }
        if let Some(v) = &self.assigned_to {
            issue.assigned_to = v.clone();
        }
        if let Some(v) = &self.status_text {
            issue.status_text = v.clone();
        }
        if let Some(v) = self.open {
            issue.open = v;
        }
    }
}

/// A typed filter over the issue collection.
///
/// Built from list query parameters via an allow-list: known field names
/// map to typed comparators, everything else is ignored. `project` always
/// comes from the URL path and overrides any query parameter of the same
/// name.
#[derive(Debug, Clone)]
pub struct IssueFilter {
    pub project: String,
    pub id: Option<String>,
    pub issue_title: Option<String>,
    pub issue_text: Option<String>,
    pub created_by: Option<String>,
    pub assigned_to: Option<String>,
    pub status_text: Option<String>,
    pub open: Option<bool>,
    pub created_on: Option<DateTime<Utc>>,
    pub updated_on: Option<DateTime<Utc>>,
}

impl IssueFilter {
    /// Filter that matches every issue in a project.
    pub fn for_project(project: &str) -> Self {
        Self {
            project: project.to_string(),
            id: None,
            issue_title: None,
            issue_text: None,
            created_by: None,
            assigned_to: None,
            status_text: None,
            open: None,
            created_on: None,
            updated_on: None,
        }
    }

    /// Build a filter from query parameters.
    ///
    /// String fields match by exact equality. `open` is coerced from
    /// "true"/"false" (case-insensitive) and timestamps from RFC 3339; a
    /// value that fails to coerce is ignored the same way an unknown key
    /// is.
    pub fn from_params(project: &str, params: &HashMap<String, String>) -> Self {
        let mut filter = Self::for_project(project);
        for (key, value) in params {
            match key.as_str() {
                "_id" => filter.id = Some(value.clone()),
                "issue_title" => filter.issue_title = Some(value.clone()),
                "issue_text" => filter.issue_text = Some(value.clone()),
                "created_by" => filter.created_by = Some(value.clone()),
                "assigned_to" => filter.assigned_to = Some(value.clone()),
                "status_text" => filter.status_text = Some(value.clone()),
                "open" => filter.open = parse_bool(value),
                "created_on" => filter.created_on = parse_timestamp(value),
                "updated_on" => filter.updated_on = parse_timestamp(value),
                // "project" is pinned to the path segment; unknown keys
                // are dropped rather than passed through to storage.
                _ => {}
            }
        }
        filter
    }
}

fn parse_bool(s: &str) -> Option<bool> {
    if s.eq_ignore_ascii_case("true") {
        Some(true)
    } else if s.eq_ignore_ascii_case("false") {
        Some(false)
    } else {
        None
    }
}

fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// A deletion marker appended to the JSONL log.
///
/// Lets `rebuild_cache` replay deletions instead of resurrecting deleted
/// issues. Never serialized onto the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tombstone {
    /// Entity type marker, always "tombstone"
    #[serde(rename = "type")]
    pub entity_type: String,

    /// ID of the deleted issue
    #[serde(rename = "_id")]
    pub id: String,

    /// Project the issue belonged to
    pub project: String,

    /// Deletion timestamp
    pub deleted_on: DateTime<Utc>,
}

impl Tombstone {
    /// Create a tombstone for the given issue.
    pub fn new(id: String, project: String) -> Self {
        Self {
            entity_type: "tombstone".to_string(),
            id,
            project,
            deleted_on: Utc::now(),
        }
    }

    /// Returns true if this record really is a tombstone.
    ///
    /// Guards against an `Issue` line that happens to deserialize into
    /// this shape via unknown-field tolerance.
    pub fn is_tombstone(&self) -> bool {
        self.entity_type == "tombstone"
    }
}
