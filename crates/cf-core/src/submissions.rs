//! # Submission Lifecycle Engine
//!
//! `submitted`/`late` are decided once, at creation, against the parent
//! post's due date. Both lead to `graded`, which is terminal: only re-grading
//! may touch a graded submission.

use std::sync::Arc;

use futures_util::future::join_all;
use serde_json::json;
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::models::{ActivityRecord, Submission, SubmissionStatus, SubmissionView};
use crate::retry::RetryPolicy;
use crate::traits::{AuditSink, BlobStore, FeedStore, StatusTransition, SubmissionStore, UserDirectory};
use crate::SharedClock;

pub struct SubmissionEngine {
    submissions: Arc<dyn SubmissionStore>,
    posts: Arc<dyn FeedStore>,
    users: Arc<dyn UserDirectory>,
    blobs: Arc<dyn BlobStore>,
    audit: Arc<dyn AuditSink>,
    clock: SharedClock,
    retry: RetryPolicy,
}

impl SubmissionEngine {
    pub fn new(
        submissions: Arc<dyn SubmissionStore>,
        posts: Arc<dyn FeedStore>,
        users: Arc<dyn UserDirectory>,
        blobs: Arc<dyn BlobStore>,
        audit: Arc<dyn AuditSink>,
        clock: SharedClock,
    ) -> Self {
        Self {
            submissions,
            posts,
            users,
            blobs,
            audit,
            clock,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Records a student's file against a post. The parent post must exist in
    /// `course_id`; a missing post is `NotFound`, never a silent default.
    #[tracing::instrument(skip(self), err)]
    pub async fn submit(
        &self,
        course_id: Uuid,
        post_id: Uuid,
        student_id: Uuid,
        file_id: String,
    ) -> Result<Submission> {
        let file_id = file_id.trim().to_string();
        if file_id.is_empty() {
            return Err(AppError::ValidationError("file handle must not be blank".into()));
        }

        let post = match self.posts.find_post(post_id).await? {
            Some(post) if post.course_id == course_id => post,
            _ => return Err(AppError::not_found("Post", post_id)),
        };

        let now = self.clock.utc();
        let submission = Submission {
            id: Uuid::now_v7(),
            course_id,
            post_id,
            student_id,
            file_id,
            status: SubmissionStatus::classify(post.due_date, now),
            grade: None,
            comment: None,
            created_at: now,
            updated_at: now,
        };
        self.submissions.insert_submission(&submission).await?;

        tracing::debug!(submission_id = %submission.id, status = %submission.status, "submission stored");
        self.record(Some(student_id), "submission.create", &submission);
        Ok(submission)
    }

    /// Every submission for the post, with student and file names resolved.
    /// A name that cannot be resolved comes back as `None`.
    #[tracing::instrument(skip(self), err)]
    pub async fn list(&self, course_id: Uuid, post_id: Uuid) -> Result<Vec<SubmissionView>> {
        let submissions = self.submissions.list_submissions(course_id, post_id).await?;
        Ok(join_all(submissions.into_iter().map(|s| self.enrich(s))).await)
    }

    #[tracing::instrument(skip(self), err)]
    pub async fn get(&self, course_id: Uuid, post_id: Uuid, submission_id: Uuid) -> Result<Submission> {
        self.load(course_id, post_id, submission_id).await
    }

    /// Sets the grade from any state. Re-grading overwrites grade and comment.
    #[tracing::instrument(skip(self, comment), err)]
    pub async fn grade(
        &self,
        course_id: Uuid,
        post_id: Uuid,
        submission_id: Uuid,
        grader_id: Uuid,
        grade: i64,
        comment: String,
    ) -> Result<Submission> {
        let graded = self
            .retry
            .run("submission.grade", || async {
                let current = self.load(course_id, post_id, submission_id).await?;
                self.apply(StatusTransition {
                    submission_id,
                    expected: current.status,
                    status: SubmissionStatus::Graded,
                    grade: Some(grade),
                    comment: Some(comment.clone()),
                    at: self.clock.utc(),
                })
                .await
            })
            .await?;
        self.record(Some(grader_id), "submission.grade", &graded);
        Ok(graded)
    }

    /// Moves an ungraded submission between `submitted` and `late`.
    /// A graded submission is final.
    #[tracing::instrument(skip(self), err)]
    pub async fn update_status(
        &self,
        course_id: Uuid,
        post_id: Uuid,
        submission_id: Uuid,
        actor_id: Uuid,
        status: SubmissionStatus,
    ) -> Result<Submission> {
        if status.is_terminal() {
            return Err(AppError::ValidationError(
                "a submission becomes graded only by grading it".into(),
            ));
        }

        let updated = self
            .retry
            .run("submission.update_status", || async {
                let current = self.load(course_id, post_id, submission_id).await?;
                if current.status.is_terminal() {
                    return Err(AppError::InvalidTransition(format!(
                        "submission {submission_id} is graded; cannot become {status}"
                    )));
                }
                self.apply(StatusTransition {
                    submission_id,
                    expected: current.status,
                    status,
                    grade: None,
                    comment: None,
                    at: self.clock.utc(),
                })
                .await
            })
            .await?;
        self.record(Some(actor_id), "submission.update_status", &updated);
        Ok(updated)
    }

    #[tracing::instrument(skip(self), err)]
    pub async fn delete(
        &self,
        course_id: Uuid,
        post_id: Uuid,
        submission_id: Uuid,
        actor_id: Uuid,
    ) -> Result<()> {
        let submission = self.load(course_id, post_id, submission_id).await?;
        if !self.submissions.delete_submission(submission_id).await? {
            return Err(AppError::not_found("Submission", submission_id));
        }
        self.record(Some(actor_id), "submission.delete", &submission);
        Ok(())
    }

    async fn load(&self, course_id: Uuid, post_id: Uuid, submission_id: Uuid) -> Result<Submission> {
        match self.submissions.find_submission(submission_id).await? {
            Some(s) if s.course_id == course_id && s.post_id == post_id => Ok(s),
            _ => Err(AppError::not_found("Submission", submission_id)),
        }
    }

    /// A guarded write that found the row changed is reported as a conflict so
    /// the caller re-reads and re-checks the transition.
    async fn apply(&self, transition: StatusTransition) -> Result<Submission> {
        self.submissions
            .transition(transition)
            .await?
            .ok_or_else(|| AppError::Conflict("submission changed concurrently".into()))
    }

    async fn enrich(&self, submission: Submission) -> SubmissionView {
        let (student_name, file_name) = futures_util::join!(
            self.users.display_name(submission.student_id),
            self.blobs.original_name(&submission.file_id),
        );
        let student_name = student_name.unwrap_or_else(|err| {
            tracing::warn!(student_id = %submission.student_id, error = %err, "student name unavailable");
            None
        });
        let file_name = file_name.unwrap_or_else(|err| {
            tracing::warn!(file_id = %submission.file_id, error = %err, "file name unavailable");
            None
        });
        SubmissionView {
            submission,
            student_name,
            file_name,
        }
    }

    fn record(&self, user_id: Option<Uuid>, action: &str, submission: &Submission) {
        self.audit.record(ActivityRecord::new(
            user_id,
            action,
            self.clock.utc(),
            json!({
                "course_id": submission.course_id,
                "post_id": submission.post_id,
                "submission_id": submission.id,
                "status": submission.status,
            }),
        ));
    }
}
