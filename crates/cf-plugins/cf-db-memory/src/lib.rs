//! # cf-db-memory
//!
//! In-process implementation of every store port, backed by `DashMap`.
//! Used by tests and by ephemeral demo runs (`database.url = "memory"`).
//! Nothing survives a restart.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use cf_core::error::StoreError;
use cf_core::models::{ActivityRecord, Post, Submission};
use cf_core::traits::{
    ActivityLog, ActivityQuery, AuditSink, CourseDirectory, FeedChange, FeedCommit, FeedSnapshot, FeedStore,
    StatusTransition, SubmissionStore, UserDirectory,
};
use chrono::{DateTime, Utc};
use dashmap::{DashMap, DashSet};
use uuid::Uuid;

#[derive(Debug, Default)]
struct CourseFeed {
    revision: i64,
    posts: HashMap<Uuid, Post>,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    /// The per-course entry lock is what serializes commits for one course.
    feeds: DashMap<Uuid, CourseFeed>,
    /// post id → course id
    post_courses: DashMap<Uuid, Uuid>,
    submissions: DashMap<Uuid, Submission>,
    courses: DashSet<Uuid>,
    users: DashMap<Uuid, String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_course(&self, course_id: Uuid) {
        self.courses.insert(course_id);
    }

    pub fn register_user(&self, user_id: Uuid, display_name: &str) {
        self.users.insert(user_id, display_name.to_string());
    }
}

#[async_trait]
impl FeedStore for MemoryStore {
    async fn snapshot(&self, course_id: Uuid) -> Result<FeedSnapshot, StoreError> {
        let Some(feed) = self.feeds.get(&course_id) else {
            return Ok(FeedSnapshot::default());
        };
        let mut posts: Vec<Post> = feed.posts.values().cloned().collect();
        posts.sort_by_key(|p| (p.pinned, p.position, p.id));
        Ok(FeedSnapshot {
            revision: feed.revision,
            posts,
        })
    }

    async fn find_post(&self, post_id: Uuid) -> Result<Option<Post>, StoreError> {
        let Some(course_id) = self.post_courses.get(&post_id).map(|c| *c.value()) else {
            return Ok(None);
        };
        Ok(self
            .feeds
            .get(&course_id)
            .and_then(|feed| feed.posts.get(&post_id).cloned()))
    }

    async fn commit(&self, commit: FeedCommit) -> Result<i64, StoreError> {
        let mut feed = self.feeds.entry(commit.course_id).or_default();
        if feed.revision != commit.expected_revision {
            return Err(StoreError::Conflict);
        }

        // Work on a copy so a failing change leaves the feed untouched.
        let mut posts = feed.posts.clone();
        for change in &commit.changes {
            apply_change(&mut posts, commit.course_id, change, commit.at)?;
        }

        for change in &commit.changes {
            match change {
                FeedChange::Insert(post) => {
                    self.post_courses.insert(post.id, commit.course_id);
                }
                FeedChange::Remove { post_id } => {
                    self.post_courses.remove(post_id);
                }
                _ => {}
            }
        }
        feed.posts = posts;
        feed.revision += 1;
        Ok(feed.revision)
    }
}

fn apply_change(
    posts: &mut HashMap<Uuid, Post>,
    course_id: Uuid,
    change: &FeedChange,
    at: DateTime<Utc>,
) -> Result<(), StoreError> {
    if let FeedChange::Insert(post) = change {
        if post.course_id != course_id || posts.contains_key(&post.id) {
            return Err(StoreError::Conflict);
        }
        posts.insert(post.id, post.clone());
        return Ok(());
    }
    if let FeedChange::Remove { post_id } = change {
        return posts.remove(post_id).map(|_| ()).ok_or(StoreError::Conflict);
    }

    let post = posts.get_mut(&change.post_id()).ok_or(StoreError::Conflict)?;
    match change {
        FeedChange::Reposition { position, .. } => post.position = *position,
        FeedChange::Pin { pinned_at, .. } => {
            post.pinned = true;
            post.pinned_at = Some(*pinned_at);
        }
        FeedChange::Unpin { position, .. } => {
            post.pinned = false;
            post.pinned_at = None;
            post.position = *position;
        }
        FeedChange::Edit { draft, .. } => {
            post.title = draft.title.clone();
            post.content = draft.content.clone();
            post.kind = draft.kind;
            post.file_id = draft.file_id.clone();
            post.due_date = draft.due_date;
        }
        FeedChange::Insert(_) | FeedChange::Remove { .. } => {}
    }
    post.updated_at = at;
    Ok(())
}

#[async_trait]
impl SubmissionStore for MemoryStore {
    async fn insert_submission(&self, submission: &Submission) -> Result<(), StoreError> {
        if self.submissions.contains_key(&submission.id) {
            return Err(StoreError::Conflict);
        }
        self.submissions.insert(submission.id, submission.clone());
        Ok(())
    }

    async fn find_submission(&self, id: Uuid) -> Result<Option<Submission>, StoreError> {
        Ok(self.submissions.get(&id).map(|s| s.value().clone()))
    }

    async fn list_submissions(&self, course_id: Uuid, post_id: Uuid) -> Result<Vec<Submission>, StoreError> {
        let mut found: Vec<Submission> = self
            .submissions
            .iter()
            .filter(|s| s.course_id == course_id && s.post_id == post_id)
            .map(|s| s.value().clone())
            .collect();
        found.sort_by_key(|s| (s.created_at, s.id));
        Ok(found)
    }

    async fn transition(&self, transition: StatusTransition) -> Result<Option<Submission>, StoreError> {
        let Some(mut stored) = self.submissions.get_mut(&transition.submission_id) else {
            return Ok(None);
        };
        if stored.status != transition.expected {
            return Ok(None);
        }
        stored.status = transition.status;
        stored.grade = transition.grade;
        stored.comment = transition.comment;
        stored.updated_at = transition.at;
        Ok(Some(stored.value().clone()))
    }

    async fn delete_submission(&self, id: Uuid) -> Result<bool, StoreError> {
        Ok(self.submissions.remove(&id).is_some())
    }
}

#[async_trait]
impl CourseDirectory for MemoryStore {
    async fn course_exists(&self, course_id: Uuid) -> anyhow::Result<bool> {
        Ok(self.courses.contains(&course_id))
    }
}

#[async_trait]
impl UserDirectory for MemoryStore {
    async fn display_name(&self, user_id: Uuid) -> anyhow::Result<Option<String>> {
        Ok(self.users.get(&user_id).map(|name| name.value().clone()))
    }
}

/// Keeps activity records in memory, oldest first.
#[derive(Debug, Default)]
pub struct MemoryAuditSink {
    records: Mutex<Vec<ActivityRecord>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<ActivityRecord> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn actions(&self) -> Vec<String> {
        self.records().into_iter().map(|r| r.action).collect()
    }
}

impl AuditSink for MemoryAuditSink {
    fn record(&self, record: ActivityRecord) {
        tracing::trace!(action = %record.action, "activity recorded in memory");
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(record);
    }
}

#[async_trait]
impl ActivityLog for MemoryAuditSink {
    async fn recent(&self, query: ActivityQuery) -> anyhow::Result<Vec<ActivityRecord>> {
        let limit = usize::try_from(query.limit).unwrap_or(0);
        let mut records: Vec<ActivityRecord> = self
            .records()
            .into_iter()
            .filter(|r| query.user_id.is_none() || r.user_id == query.user_id)
            .collect();
        records.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then_with(|| b.id.cmp(&a.id)));
        records.truncate(limit);
        Ok(records)
    }
}
