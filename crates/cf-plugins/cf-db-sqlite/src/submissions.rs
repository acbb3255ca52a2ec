//! `SubmissionStore` over the `submissions` table.

use async_trait::async_trait;
use cf_core::error::StoreError;
use cf_core::models::Submission;
use cf_core::traits::{StatusTransition, SubmissionStore};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use uuid::Uuid;

use crate::{unavailable, SqliteStore};

const SUBMISSION_COLUMNS: &str =
    "id, course_id, post_id, student_id, file_id, status, grade, comment, created_at, updated_at";

fn row_to_submission(row: &SqliteRow) -> anyhow::Result<Submission> {
    Ok(Submission {
        id: row.try_get("id")?,
        course_id: row.try_get("course_id")?,
        post_id: row.try_get("post_id")?,
        student_id: row.try_get("student_id")?,
        file_id: row.try_get("file_id")?,
        status: row.try_get::<String, _>("status")?.parse()?,
        grade: row.try_get("grade")?,
        comment: row.try_get("comment")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

#[async_trait]
impl SubmissionStore for SqliteStore {
    async fn insert_submission(&self, submission: &Submission) -> Result<(), StoreError> {
        sqlx::query(&format!(
            "INSERT INTO submissions ({SUBMISSION_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
        ))
        .bind(submission.id)
        .bind(submission.course_id)
        .bind(submission.post_id)
        .bind(submission.student_id)
        .bind(&submission.file_id)
        .bind(submission.status.as_str())
        .bind(submission.grade)
        .bind(&submission.comment)
        .bind(submission.created_at)
        .bind(submission.updated_at)
        .execute(&self.pool)
        .await
        .map_err(unavailable)?;
        Ok(())
    }

    async fn find_submission(&self, id: Uuid) -> Result<Option<Submission>, StoreError> {
        let row = sqlx::query(&format!("SELECT {SUBMISSION_COLUMNS} FROM submissions WHERE id = ?"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(unavailable)?;
        Ok(row.as_ref().map(row_to_submission).transpose()?)
    }

    async fn list_submissions(&self, course_id: Uuid, post_id: Uuid) -> Result<Vec<Submission>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {SUBMISSION_COLUMNS} FROM submissions \
             WHERE course_id = ? AND post_id = ? ORDER BY created_at, id"
        ))
        .bind(course_id)
        .bind(post_id)
        .fetch_all(&self.pool)
        .await
        .map_err(unavailable)?;

        Ok(rows.iter().map(row_to_submission).collect::<anyhow::Result<Vec<_>>>()?)
    }

    /// Single guarded UPDATE, so the status check and the write cannot be
    /// separated by another writer.
    async fn transition(&self, transition: StatusTransition) -> Result<Option<Submission>, StoreError> {
        let row = sqlx::query(&format!(
            "UPDATE submissions SET status = ?, grade = ?, comment = ?, updated_at = ? \
             WHERE id = ? AND status = ? RETURNING {SUBMISSION_COLUMNS}"
        ))
        .bind(transition.status.as_str())
        .bind(transition.grade)
        .bind(&transition.comment)
        .bind(transition.at)
        .bind(transition.submission_id)
        .bind(transition.expected.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(unavailable)?;

        Ok(row.as_ref().map(row_to_submission).transpose()?)
    }

    async fn delete_submission(&self, id: Uuid) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM submissions WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(unavailable)?;
        Ok(result.rows_affected() == 1)
    }
}
