//! # Domain Models
//!
//! These structs represent the core entities of a course feed.
//! We use UUID v7 for time-ordered, globally unique identification.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;

/// What a feed item is for. Stored and serialized in lowercase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PostKind {
    Lecture,
    Reminder,
    Homework,
}

impl PostKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Lecture => "lecture",
            Self::Reminder => "reminder",
            Self::Homework => "homework",
        }
    }
}

impl fmt::Display for PostKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PostKind {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "lecture" => Ok(Self::Lecture),
            "reminder" => Ok(Self::Reminder),
            "homework" => Ok(Self::Homework),
            other => Err(AppError::ValidationError(format!("unknown post type `{other}`"))),
        }
    }
}

/// One item in a course's content feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
    pub id: Uuid,
    /// Owning course; never changes after creation
    pub course_id: Uuid,
    pub author_id: Uuid,
    pub title: String,
    pub content: String,
    #[serde(rename = "type")]
    pub kind: PostKind,
    /// Handle issued by the BlobStore
    pub file_id: Option<String>,
    /// Only meaningful for homework, but not enforced by kind
    pub due_date: Option<DateTime<Utc>>,
    /// Dense `1..=N` among the course's unpinned posts
    pub position: i64,
    pub pinned: bool,
    /// Present iff `pinned`
    pub pinned_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// The author-controlled fields of a post, used for both create and edit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostDraft {
    pub title: String,
    pub content: String,
    #[serde(rename = "type")]
    pub kind: PostKind,
    #[serde(default)]
    pub file_id: Option<String>,
    #[serde(default)]
    pub due_date: Option<DateTime<Utc>>,
}

impl PostDraft {
    pub const MAX_TITLE_LEN: usize = 200;

    pub fn validate(&self) -> Result<(), AppError> {
        let title = self.title.trim();
        if title.is_empty() {
            return Err(AppError::ValidationError("title must not be blank".into()));
        }
        if title.chars().count() > Self::MAX_TITLE_LEN {
            return Err(AppError::ValidationError(format!(
                "title exceeds {} characters",
                Self::MAX_TITLE_LEN
            )));
        }
        if matches!(self.file_id.as_deref(), Some(handle) if handle.trim().is_empty()) {
            return Err(AppError::ValidationError("file handle must not be blank".into()));
        }
        Ok(())
    }
}

/// Lifecycle state of a submission. `Graded` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubmissionStatus {
    Submitted,
    Late,
    Graded,
}

impl SubmissionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Submitted => "submitted",
            Self::Late => "late",
            Self::Graded => "graded",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Graded)
    }

    /// Initial status for a submission created at `now` against `due_date`.
    /// Submitting exactly at the deadline is on time.
    pub fn classify(due_date: Option<DateTime<Utc>>, now: DateTime<Utc>) -> Self {
        match due_date {
            Some(due) if now > due => Self::Late,
            _ => Self::Submitted,
        }
    }
}

impl fmt::Display for SubmissionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SubmissionStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "submitted" => Ok(Self::Submitted),
            "late" => Ok(Self::Late),
            "graded" => Ok(Self::Graded),
            other => Err(AppError::ValidationError(format!("unknown submission status `{other}`"))),
        }
    }
}

/// One student's attempt at a homework post.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Submission {
    pub id: Uuid,
    pub course_id: Uuid,
    pub post_id: Uuid,
    pub student_id: Uuid,
    pub file_id: String,
    pub status: SubmissionStatus,
    /// Present iff `status == Graded`
    pub grade: Option<i64>,
    /// Present iff `status == Graded`
    pub comment: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A submission as shown to graders, with names resolved from collaborators.
/// Unresolvable names are `None` rather than an error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmissionView {
    #[serde(flatten)]
    pub submission: Submission,
    pub student_name: Option<String>,
    pub file_name: Option<String>,
}

/// Coarse role set supplied by the identity provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Student,
    Teacher,
    Admin,
}

/// An authenticated caller. The engines never look at roles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub user_id: Uuid,
    pub roles: Vec<Role>,
}

impl Identity {
    /// Whether the caller may author, reorder, and grade.
    pub fn can_manage_course(&self) -> bool {
        self.roles.iter().any(|r| matches!(r, Role::Teacher | Role::Admin))
    }
}

/// A fire-and-forget activity entry for the audit sink.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityRecord {
    pub id: Uuid,
    pub user_id: Option<Uuid>,
    /// e.g. "post.pin", "submission.grade"
    pub action: String,
    pub timestamp: DateTime<Utc>,
    pub metadata: serde_json::Value,
}

impl ActivityRecord {
    pub fn new(
        user_id: Option<Uuid>,
        action: &str,
        timestamp: DateTime<Utc>,
        metadata: serde_json::Value,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            user_id,
            action: action.to_string(),
            timestamp,
            metadata,
        }
    }
}

/// Metadata the blob store keeps alongside each uploaded file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlobMeta {
    pub handle: String,
    pub original_name: String,
    pub content_type: String,
    pub size: u64,
    /// Hex SHA-256 of the stored bytes
    pub sha256: String,
    pub created_at: DateTime<Utc>,
}
