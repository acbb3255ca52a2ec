//! # Core Traits (Ports)
//!
//! Any plugin must implement these traits to be used by the binary.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::StoreError;
use crate::models::{ActivityRecord, BlobMeta, Identity, Post, PostDraft, Submission, SubmissionStatus};

/// A consistent read of one course's posts, stamped with the feed revision
/// it was taken at. Courses without any write yet are at revision 0.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeedSnapshot {
    pub revision: i64,
    pub posts: Vec<Post>,
}

impl FeedSnapshot {
    pub fn post(&self, post_id: Uuid) -> Option<&Post> {
        self.posts.iter().find(|p| p.id == post_id)
    }
}

/// A single mutation inside a [`FeedCommit`].
#[derive(Debug, Clone, PartialEq)]
pub enum FeedChange {
    Insert(Post),
    Reposition { post_id: Uuid, position: i64 },
    Pin { post_id: Uuid, pinned_at: DateTime<Utc> },
    Unpin { post_id: Uuid, position: i64 },
    Edit { post_id: Uuid, draft: PostDraft },
    Remove { post_id: Uuid },
}

impl FeedChange {
    pub fn post_id(&self) -> Uuid {
        match self {
            Self::Insert(post) => post.id,
            Self::Reposition { post_id, .. }
            | Self::Pin { post_id, .. }
            | Self::Unpin { post_id, .. }
            | Self::Edit { post_id, .. }
            | Self::Remove { post_id } => *post_id,
        }
    }
}

/// A batch of changes planned against `expected_revision`.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedCommit {
    pub course_id: Uuid,
    pub expected_revision: i64,
    pub changes: Vec<FeedChange>,
    /// Written to `updated_at` of every touched post
    pub at: DateTime<Utc>,
}

/// Persistence contract for the posts of every course.
///
/// `commit` is the only write path. It must apply the whole batch or nothing,
/// and must fail with [`StoreError::Conflict`] if the course's revision is no
/// longer `expected_revision` or if any change targets a post that is not in
/// that course.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait FeedStore: Send + Sync {
    async fn snapshot(&self, course_id: Uuid) -> Result<FeedSnapshot, StoreError>;
    async fn find_post(&self, post_id: Uuid) -> Result<Option<Post>, StoreError>;
    /// Returns the new revision.
    async fn commit(&self, commit: FeedCommit) -> Result<i64, StoreError>;
}

/// A status write guarded by the status the caller last read.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusTransition {
    pub submission_id: Uuid,
    pub expected: SubmissionStatus,
    pub status: SubmissionStatus,
    pub grade: Option<i64>,
    pub comment: Option<String>,
    pub at: DateTime<Utc>,
}

/// Persistence contract for submissions.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait SubmissionStore: Send + Sync {
    async fn insert_submission(&self, submission: &Submission) -> Result<(), StoreError>;
    async fn find_submission(&self, id: Uuid) -> Result<Option<Submission>, StoreError>;
    async fn list_submissions(&self, course_id: Uuid, post_id: Uuid) -> Result<Vec<Submission>, StoreError>;
    /// Applies the transition only if the stored status still equals
    /// `expected`. `None` means the row is gone or has moved on.
    async fn transition(&self, transition: StatusTransition) -> Result<Option<Submission>, StoreError>;
    /// Returns whether a row was removed.
    async fn delete_submission(&self, id: Uuid) -> Result<bool, StoreError>;
}

/// Read-only view of the course catalogue owned elsewhere.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait CourseDirectory: Send + Sync {
    async fn course_exists(&self, course_id: Uuid) -> anyhow::Result<bool>;
}

/// Read-only view of user profiles owned elsewhere.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn display_name(&self, user_id: Uuid) -> anyhow::Result<Option<String>>;
}

/// File storage contract for homework attachments and submissions.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Saves raw bytes and returns the handle stored on posts/submissions.
    async fn save(&self, data: Vec<u8>, original_name: &str, content_type: &str) -> anyhow::Result<BlobMeta>;
    /// Returns the bytes and metadata, or `None` for an unknown handle.
    async fn open(&self, handle: &str) -> anyhow::Result<Option<(BlobMeta, Vec<u8>)>>;
    async fn original_name(&self, handle: &str) -> anyhow::Result<Option<String>>;
}

/// Activity logging contract. Implementations must not block or fail the caller.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
pub trait AuditSink: Send + Sync {
    fn record(&self, record: ActivityRecord);
}

/// Which part of the activity trail to read back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActivityQuery {
    /// Only entries attributed to this user
    pub user_id: Option<Uuid>,
    pub limit: i64,
}

/// Read side of the activity trail. Entries come back newest first.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait ActivityLog: Send + Sync {
    async fn recent(&self, query: ActivityQuery) -> anyhow::Result<Vec<ActivityRecord>>;
}

/// Identity contract. The core trusts whatever identity this returns.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// `None` for an unknown, expired, or forged token.
    async fn authenticate(&self, token: &str) -> anyhow::Result<Option<Identity>>;
}
