//! `FeedStore` over the `posts` and `course_feeds` tables.

use async_trait::async_trait;
use cf_core::error::StoreError;
use cf_core::models::Post;
use cf_core::traits::{FeedChange, FeedCommit, FeedSnapshot, FeedStore};
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection};
use uuid::Uuid;

use crate::{unavailable, SqliteStore};

const POST_COLUMNS: &str = "id, course_id, author_id, title, content, kind, file_id, due_date, \
                            position, pinned, pinned_at, created_at, updated_at";

fn row_to_post(row: &SqliteRow) -> anyhow::Result<Post> {
    Ok(Post {
        id: row.try_get("id")?,
        course_id: row.try_get("course_id")?,
        author_id: row.try_get("author_id")?,
        title: row.try_get("title")?,
        content: row.try_get("content")?,
        kind: row.try_get::<String, _>("kind")?.parse()?,
        file_id: row.try_get("file_id")?,
        due_date: row.try_get("due_date")?,
        position: row.try_get("position")?,
        pinned: row.try_get("pinned")?,
        pinned_at: row.try_get("pinned_at")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

#[async_trait]
impl FeedStore for SqliteStore {
    /// Reads the revision and the posts inside one transaction so both
    /// describe the same moment.
    async fn snapshot(&self, course_id: Uuid) -> Result<FeedSnapshot, StoreError> {
        let mut tx = self.pool.begin().await.map_err(unavailable)?;

        let revision: Option<i64> =
            sqlx::query_scalar("SELECT revision FROM course_feeds WHERE course_id = ?")
                .bind(course_id)
                .fetch_optional(&mut *tx)
                .await
                .map_err(unavailable)?;

        let rows = sqlx::query(&format!(
            "SELECT {POST_COLUMNS} FROM posts WHERE course_id = ? ORDER BY pinned, position"
        ))
        .bind(course_id)
        .fetch_all(&mut *tx)
        .await
        .map_err(unavailable)?;

        tx.commit().await.map_err(unavailable)?;

        let posts = rows.iter().map(row_to_post).collect::<anyhow::Result<Vec<_>>>()?;
        Ok(FeedSnapshot {
            revision: revision.unwrap_or(0),
            posts,
        })
    }

    async fn find_post(&self, post_id: Uuid) -> Result<Option<Post>, StoreError> {
        let row = sqlx::query(&format!("SELECT {POST_COLUMNS} FROM posts WHERE id = ?"))
            .bind(post_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(unavailable)?;

        Ok(row.as_ref().map(row_to_post).transpose()?)
    }

    /// Atomic compare-and-swap on the course revision followed by the batch.
    ///
    /// # Developer Note
    /// The revision bump is the first statement so the transaction takes the
    /// write lock before reading anything; a second writer waits on the busy
    /// timeout and then sees the bumped revision.
    async fn commit(&self, commit: FeedCommit) -> Result<i64, StoreError> {
        let mut tx = self.pool.begin().await.map_err(unavailable)?;

        sqlx::query(
            "INSERT INTO course_feeds (course_id, revision) VALUES (?, 0) \
             ON CONFLICT (course_id) DO NOTHING",
        )
        .bind(commit.course_id)
        .execute(&mut *tx)
        .await
        .map_err(unavailable)?;

        let bumped = sqlx::query(
            "UPDATE course_feeds SET revision = revision + 1 WHERE course_id = ? AND revision = ?",
        )
        .bind(commit.course_id)
        .bind(commit.expected_revision)
        .execute(&mut *tx)
        .await
        .map_err(unavailable)?;

        if bumped.rows_affected() != 1 {
            tx.rollback().await.map_err(unavailable)?;
            tracing::debug!(course_id = %commit.course_id, expected = commit.expected_revision, "stale feed revision");
            return Err(StoreError::Conflict);
        }

        for change in &commit.changes {
            if let Err(err) = apply_change(&mut tx, commit.course_id, change, commit.at).await {
                tx.rollback().await.map_err(unavailable)?;
                return Err(err);
            }
        }

        tx.commit().await.map_err(unavailable)?;
        Ok(commit.expected_revision + 1)
    }
}

/// Applies one change; a change that matches no row of this course is a conflict.
async fn apply_change(
    conn: &mut SqliteConnection,
    course_id: Uuid,
    change: &FeedChange,
    at: DateTime<Utc>,
) -> Result<(), StoreError> {
    let result = match change {
        FeedChange::Insert(post) => {
            if post.course_id != course_id {
                return Err(StoreError::Conflict);
            }
            sqlx::query(&format!(
                "INSERT INTO posts ({POST_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
            ))
            .bind(post.id)
            .bind(post.course_id)
            .bind(post.author_id)
            .bind(&post.title)
            .bind(&post.content)
            .bind(post.kind.as_str())
            .bind(&post.file_id)
            .bind(post.due_date)
            .bind(post.position)
            .bind(post.pinned)
            .bind(post.pinned_at)
            .bind(post.created_at)
            .bind(post.updated_at)
            .execute(&mut *conn)
            .await
        }
        FeedChange::Reposition { post_id, position } => {
            sqlx::query("UPDATE posts SET position = ?, updated_at = ? WHERE id = ? AND course_id = ?")
                .bind(position)
                .bind(at)
                .bind(post_id)
                .bind(course_id)
                .execute(&mut *conn)
                .await
        }
        FeedChange::Pin { post_id, pinned_at } => {
            sqlx::query(
                "UPDATE posts SET pinned = 1, pinned_at = ?, updated_at = ? WHERE id = ? AND course_id = ?",
            )
            .bind(pinned_at)
            .bind(at)
            .bind(post_id)
            .bind(course_id)
            .execute(&mut *conn)
            .await
        }
        FeedChange::Unpin { post_id, position } => {
            sqlx::query(
                "UPDATE posts SET pinned = 0, pinned_at = NULL, position = ?, updated_at = ? \
                 WHERE id = ? AND course_id = ?",
            )
            .bind(position)
            .bind(at)
            .bind(post_id)
            .bind(course_id)
            .execute(&mut *conn)
            .await
        }
        FeedChange::Edit { post_id, draft } => {
            sqlx::query(
                "UPDATE posts SET title = ?, content = ?, kind = ?, file_id = ?, due_date = ?, updated_at = ? \
                 WHERE id = ? AND course_id = ?",
            )
            .bind(&draft.title)
            .bind(&draft.content)
            .bind(draft.kind.as_str())
            .bind(&draft.file_id)
            .bind(draft.due_date)
            .bind(at)
            .bind(post_id)
            .bind(course_id)
            .execute(&mut *conn)
            .await
        }
        FeedChange::Remove { post_id } => {
            sqlx::query("DELETE FROM posts WHERE id = ? AND course_id = ?")
                .bind(post_id)
                .bind(course_id)
                .execute(&mut *conn)
                .await
        }
    }
    .map_err(unavailable)?;

    if result.rows_affected() != 1 {
        tracing::debug!(post_id = %change.post_id(), "feed change matched no row");
        return Err(StoreError::Conflict);
    }
    Ok(())
}
