//! # Post Ordering Engine
//!
//! Owns the `position`/`pinned` state of posts within a course.
//!
//! Every mutation is planned from a [`FeedSnapshot`] and committed as one
//! batch guarded by the snapshot's revision, so a concurrent writer on the
//! same course turns into a retryable conflict instead of a duplicate or
//! missing position.

use std::cmp::Ordering;
use std::sync::Arc;

use serde_json::json;
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::models::{ActivityRecord, Post, PostDraft};
use crate::retry::RetryPolicy;
use crate::SharedClock;
use crate::traits::{AuditSink, CourseDirectory, FeedChange, FeedCommit, FeedSnapshot, FeedStore};

/// Which unpinned neighbour a move swaps with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Up,
    Down,
}

impl Direction {
    fn action(self) -> &'static str {
        match self {
            Self::Up => "post.move_up",
            Self::Down => "post.move_down",
        }
    }
}

/// Sorts posts for display: pinned first, most recently pinned on top, then
/// unpinned by ascending position.
pub fn display_order(mut posts: Vec<Post>) -> Vec<Post> {
    posts.sort_by(|a, b| match (a.pinned, b.pinned) {
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        (true, true) => b
            .pinned_at
            .cmp(&a.pinned_at)
            .then_with(|| a.id.cmp(&b.id)),
        (false, false) => a
            .position
            .cmp(&b.position)
            .then_with(|| a.created_at.cmp(&b.created_at))
            .then_with(|| a.id.cmp(&b.id)),
    });
    posts
}

/// One past the highest unpinned position, or 1 for an empty feed.
pub fn next_position<'a>(posts: impl IntoIterator<Item = &'a Post>) -> i64 {
    posts
        .into_iter()
        .filter(|p| !p.pinned)
        .map(|p| p.position)
        .max()
        .unwrap_or(0)
        + 1
}

/// Repositions that renumber the unpinned posts, minus `excluded`, to
/// `1..=len` while keeping their relative order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Compaction {
    /// Only posts whose position actually changes
    pub changes: Vec<FeedChange>,
    pub len: i64,
}

pub fn compaction_plan(posts: &[Post], excluded: Uuid) -> Compaction {
    let mut unpinned: Vec<&Post> = posts
        .iter()
        .filter(|p| !p.pinned && p.id != excluded)
        .collect();
    unpinned.sort_by(|a, b| {
        a.position
            .cmp(&b.position)
            .then_with(|| a.created_at.cmp(&b.created_at))
            .then_with(|| a.id.cmp(&b.id))
    });

    let mut plan = Compaction::default();
    for (post, position) in unpinned.into_iter().zip(1_i64..) {
        if post.position != position {
            plan.changes.push(FeedChange::Reposition {
                post_id: post.id,
                position,
            });
        }
        plan.len = position;
    }
    plan
}

/// The unpinned sibling at exactly `position ∓ 1` in the same course.
pub fn neighbour<'a>(posts: &'a [Post], post: &Post, direction: Direction) -> Option<&'a Post> {
    let target = match direction {
        Direction::Up => post.position - 1,
        Direction::Down => post.position + 1,
    };
    posts.iter().find(|p| {
        p.id != post.id && !p.pinned && p.course_id == post.course_id && p.position == target
    })
}

/// Pin, order, and compact posts of a course.
pub struct FeedEngine {
    store: Arc<dyn FeedStore>,
    courses: Arc<dyn CourseDirectory>,
    audit: Arc<dyn AuditSink>,
    clock: SharedClock,
    retry: RetryPolicy,
}

impl FeedEngine {
    pub fn new(
        store: Arc<dyn FeedStore>,
        courses: Arc<dyn CourseDirectory>,
        audit: Arc<dyn AuditSink>,
        clock: SharedClock,
    ) -> Self {
        Self {
            store,
            courses,
            audit,
            clock,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Adds a post as the last unpinned item of the course.
    #[tracing::instrument(skip(self, draft), err)]
    pub async fn append(&self, course_id: Uuid, author_id: Uuid, draft: PostDraft) -> Result<Post> {
        draft.validate()?;
        self.ensure_course(course_id).await?;

        let post = self
            .retry
            .run("post.append", || self.try_append(course_id, author_id, &draft))
            .await?;
        self.record(Some(author_id), "post.create", &post);
        Ok(post)
    }

    async fn try_append(&self, course_id: Uuid, author_id: Uuid, draft: &PostDraft) -> Result<Post> {
        let snapshot = self.store.snapshot(course_id).await?;
        let now = self.clock.utc();
        let post = Post {
            id: Uuid::now_v7(),
            course_id,
            author_id,
            title: draft.title.trim().to_string(),
            content: draft.content.clone(),
            kind: draft.kind,
            file_id: draft.file_id.clone(),
            due_date: draft.due_date,
            position: next_position(&snapshot.posts),
            pinned: false,
            pinned_at: None,
            created_at: now,
            updated_at: now,
        };
        self.commit(&snapshot, course_id, vec![FeedChange::Insert(post.clone())], now)
            .await?;
        Ok(post)
    }

    /// Pinned posts first (latest pin on top), then unpinned by position.
    #[tracing::instrument(skip(self), err)]
    pub async fn list(&self, course_id: Uuid) -> Result<Vec<Post>> {
        let snapshot = self.store.snapshot(course_id).await?;
        Ok(display_order(snapshot.posts))
    }

    #[tracing::instrument(skip(self), err)]
    pub async fn get(&self, course_id: Uuid, post_id: Uuid) -> Result<Post> {
        match self.store.find_post(post_id).await? {
            Some(post) if post.course_id == course_id => Ok(post),
            _ => Err(AppError::not_found("Post", post_id)),
        }
    }

    /// Replaces the author-controlled fields; ordering state is untouched.
    #[tracing::instrument(skip(self, draft), err)]
    pub async fn edit(
        &self,
        course_id: Uuid,
        post_id: Uuid,
        actor_id: Uuid,
        draft: PostDraft,
    ) -> Result<Post> {
        draft.validate()?;
        let draft = PostDraft {
            title: draft.title.trim().to_string(),
            ..draft
        };

        let post = self
            .retry
            .run("post.edit", || async {
                let (snapshot, post) = self.load(course_id, post_id).await?;
                let now = self.clock.utc();
                let change = FeedChange::Edit {
                    post_id,
                    draft: draft.clone(),
                };
                self.commit(&snapshot, course_id, vec![change], now).await?;
                Ok(Post {
                    title: draft.title.clone(),
                    content: draft.content.clone(),
                    kind: draft.kind,
                    file_id: draft.file_id.clone(),
                    due_date: draft.due_date,
                    updated_at: now,
                    ..post
                })
            })
            .await?;
        self.record(Some(actor_id), "post.edit", &post);
        Ok(post)
    }

    /// Moves the post to the pinned group. Its position is left as is, so the
    /// unpinned sequence may have a gap until the next compaction.
    #[tracing::instrument(skip(self), err)]
    pub async fn pin(&self, course_id: Uuid, post_id: Uuid, actor_id: Uuid) -> Result<Post> {
        let post = self
            .retry
            .run("post.pin", || async {
                let (snapshot, post) = self.load(course_id, post_id).await?;
                let now = self.clock.utc();
                let change = FeedChange::Pin {
                    post_id,
                    pinned_at: now,
                };
                self.commit(&snapshot, course_id, vec![change], now).await?;
                Ok(Post {
                    pinned: true,
                    pinned_at: Some(now),
                    updated_at: now,
                    ..post
                })
            })
            .await?;
        self.record(Some(actor_id), "post.pin", &post);
        Ok(post)
    }

    /// Returns the post to the end of the unpinned order, compacting the
    /// remaining unpinned posts first.
    #[tracing::instrument(skip(self), err)]
    pub async fn unpin(&self, course_id: Uuid, post_id: Uuid, actor_id: Uuid) -> Result<Post> {
        let (post, changed) = self
            .retry
            .run("post.unpin", || async {
                let (snapshot, post) = self.load(course_id, post_id).await?;
                if !post.pinned {
                    return Ok((post, false));
                }

                let now = self.clock.utc();
                let plan = compaction_plan(&snapshot.posts, post_id);
                let position = plan.len + 1;
                let mut changes = plan.changes;
                changes.push(FeedChange::Unpin { post_id, position });
                self.commit(&snapshot, course_id, changes, now).await?;
                Ok((
                    Post {
                        pinned: false,
                        pinned_at: None,
                        position,
                        updated_at: now,
                        ..post
                    },
                    true,
                ))
            })
            .await?;
        if changed {
            self.record(Some(actor_id), "post.unpin", &post);
        }
        Ok(post)
    }

    pub async fn move_up(&self, course_id: Uuid, post_id: Uuid, actor_id: Uuid) -> Result<Post> {
        self.shift(course_id, post_id, actor_id, Direction::Up).await
    }

    pub async fn move_down(&self, course_id: Uuid, post_id: Uuid, actor_id: Uuid) -> Result<Post> {
        self.shift(course_id, post_id, actor_id, Direction::Down).await
    }

    /// Swaps positions with the adjacent unpinned post. At either end of the
    /// order, or when no post holds the adjacent position, the post comes back
    /// unchanged.
    #[tracing::instrument(skip(self), err)]
    pub async fn shift(
        &self,
        course_id: Uuid,
        post_id: Uuid,
        actor_id: Uuid,
        direction: Direction,
    ) -> Result<Post> {
        let (post, changed) = self
            .retry
            .run(direction.action(), || async {
                let (snapshot, post) = self.load(course_id, post_id).await?;
                if post.pinned {
                    return Err(AppError::InvalidTransition(
                        "pinned posts are ordered by pin time and cannot be moved".into(),
                    ));
                }
                let Some(other) = neighbour(&snapshot.posts, &post, direction) else {
                    return Ok((post, false));
                };

                let now = self.clock.utc();
                let changes = vec![
                    FeedChange::Reposition {
                        post_id: post.id,
                        position: other.position,
                    },
                    FeedChange::Reposition {
                        post_id: other.id,
                        position: post.position,
                    },
                ];
                let position = other.position;
                self.commit(&snapshot, course_id, changes, now).await?;
                Ok((
                    Post {
                        position,
                        updated_at: now,
                        ..post
                    },
                    true,
                ))
            })
            .await?;
        if changed {
            self.record(Some(actor_id), direction.action(), &post);
        }
        Ok(post)
    }

    /// Removes the post; removing an unpinned post compacts the rest to `1..=N`.
    #[tracing::instrument(skip(self), err)]
    pub async fn delete(&self, course_id: Uuid, post_id: Uuid, actor_id: Uuid) -> Result<()> {
        let post = self
            .retry
            .run("post.delete", || async {
                let (snapshot, post) = self.load(course_id, post_id).await?;
                let mut changes = vec![FeedChange::Remove { post_id }];
                if !post.pinned {
                    changes.extend(compaction_plan(&snapshot.posts, post_id).changes);
                }
                self.commit(&snapshot, course_id, changes, self.clock.utc()).await?;
                Ok(post)
            })
            .await?;
        self.record(Some(actor_id), "post.delete", &post);
        Ok(())
    }

    async fn load(&self, course_id: Uuid, post_id: Uuid) -> Result<(FeedSnapshot, Post)> {
        let snapshot = self.store.snapshot(course_id).await?;
        let post = snapshot
            .post(post_id)
            .cloned()
            .ok_or_else(|| AppError::not_found("Post", post_id))?;
        Ok((snapshot, post))
    }

    async fn commit(
        &self,
        snapshot: &FeedSnapshot,
        course_id: Uuid,
        changes: Vec<FeedChange>,
        at: chrono::DateTime<chrono::Utc>,
    ) -> Result<i64> {
        let revision = self
            .store
            .commit(FeedCommit {
                course_id,
                expected_revision: snapshot.revision,
                changes,
                at,
            })
            .await?;
        Ok(revision)
    }

    async fn ensure_course(&self, course_id: Uuid) -> Result<()> {
        match self.courses.course_exists(course_id).await {
            Ok(true) => Ok(()),
            Ok(false) => Err(AppError::not_found("Course", course_id)),
            Err(err) => Err(AppError::UpstreamUnavailable(format!(
                "course directory: {err:#}"
            ))),
        }
    }

    fn record(&self, user_id: Option<Uuid>, action: &str, post: &Post) {
        self.audit.record(ActivityRecord::new(
            user_id,
            action,
            self.clock.utc(),
            json!({
                "course_id": post.course_id,
                "post_id": post.id,
                "position": post.position,
                "pinned": post.pinned,
            }),
        ));
    }
}
