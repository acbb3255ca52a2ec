//! # cf-api Handlers
//!
//! This module coordinates the flow between HTTP requests and the engines.
//! Handlers check capabilities, then delegate; ordering and lifecycle rules
//! live in `cf-core`.

use axum::extract::{Multipart, Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use cf_core::error::AppError;
use cf_core::models::{ActivityRecord, BlobMeta, Post, PostDraft, Submission, SubmissionStatus, SubmissionView};
use cf_core::traits::ActivityQuery;
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use crate::auth::CurrentUser;
use crate::error::ApiResult;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct SubmitRequest {
    pub file_id: String,
}

#[derive(Debug, Deserialize)]
pub struct GradeRequest {
    pub grade: i64,
    #[serde(default)]
    pub comment: String,
}

#[derive(Debug, Deserialize)]
pub struct StatusRequest {
    pub status: SubmissionStatus,
}

const DEFAULT_ACTIVITY_LIMIT: i64 = 50;
const MAX_ACTIVITY_LIMIT: i64 = 500;

#[derive(Debug, Deserialize)]
pub struct ActivityParams {
    pub user_id: Option<Uuid>,
    pub limit: Option<i64>,
}

pub async fn health() -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "service": "classfeed",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

// ── Files ───────────────────────────────────────────────────────────────────

/// Stores the `file` field of a multipart form and returns its handle.
pub async fn upload_file(
    State(state): State<AppState>,
    user: CurrentUser,
    mut multipart: Multipart,
) -> ApiResult<(StatusCode, Json<BlobMeta>)> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::ValidationError(format!("malformed multipart body: {e}")))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let original_name = field.file_name().unwrap_or("upload").to_string();
        let content_type = field
            .content_type()
            .unwrap_or("application/octet-stream")
            .to_string();
        let data = field
            .bytes()
            .await
            .map_err(|e| AppError::ValidationError(format!("unreadable file field: {e}")))?;
        if data.is_empty() {
            return Err(AppError::ValidationError("uploaded file is empty".into()).into());
        }

        let meta = state
            .blobs
            .save(data.to_vec(), &original_name, &content_type)
            .await
            .map_err(|e| AppError::UpstreamUnavailable(format!("blob store: {e:#}")))?;
        tracing::info!(user_id = %user.0.user_id, handle = %meta.handle, size = meta.size, "file uploaded");
        return Ok((StatusCode::CREATED, Json(meta)));
    }
    Err(AppError::ValidationError("multipart body has no `file` field".into()).into())
}

pub async fn download_file(
    State(state): State<AppState>,
    _user: CurrentUser,
    Path(handle): Path<String>,
) -> ApiResult<Response> {
    let (meta, data) = state
        .blobs
        .open(&handle)
        .await
        .map_err(|e| AppError::UpstreamUnavailable(format!("blob store: {e:#}")))?
        .ok_or_else(|| AppError::not_found("File", &handle))?;

    let disposition = format!("attachment; filename=\"{}\"", meta.original_name.replace('"', "_"));
    Ok((
        [
            (header::CONTENT_TYPE, meta.content_type),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        data,
    )
        .into_response())
}

// ── Posts ───────────────────────────────────────────────────────────────────

pub async fn list_posts(
    State(state): State<AppState>,
    _user: CurrentUser,
    Path(course_id): Path<Uuid>,
) -> ApiResult<Json<Vec<Post>>> {
    Ok(Json(state.feed.list(course_id).await?))
}

pub async fn create_post(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(course_id): Path<Uuid>,
    Json(draft): Json<PostDraft>,
) -> ApiResult<(StatusCode, Json<Post>)> {
    user.require_manage()?;
    let post = state.feed.append(course_id, user.0.user_id, draft).await?;
    Ok((StatusCode::CREATED, Json(post)))
}

pub async fn get_post(
    State(state): State<AppState>,
    _user: CurrentUser,
    Path((course_id, post_id)): Path<(Uuid, Uuid)>,
) -> ApiResult<Json<Post>> {
    Ok(Json(state.feed.get(course_id, post_id).await?))
}

pub async fn update_post(
    State(state): State<AppState>,
    user: CurrentUser,
    Path((course_id, post_id)): Path<(Uuid, Uuid)>,
    Json(draft): Json<PostDraft>,
) -> ApiResult<Json<Post>> {
    user.require_manage()?;
    Ok(Json(state.feed.edit(course_id, post_id, user.0.user_id, draft).await?))
}

pub async fn delete_post(
    State(state): State<AppState>,
    user: CurrentUser,
    Path((course_id, post_id)): Path<(Uuid, Uuid)>,
) -> ApiResult<StatusCode> {
    user.require_manage()?;
    state.feed.delete(course_id, post_id, user.0.user_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn pin_post(
    State(state): State<AppState>,
    user: CurrentUser,
    Path((course_id, post_id)): Path<(Uuid, Uuid)>,
) -> ApiResult<Json<Post>> {
    user.require_manage()?;
    Ok(Json(state.feed.pin(course_id, post_id, user.0.user_id).await?))
}

pub async fn unpin_post(
    State(state): State<AppState>,
    user: CurrentUser,
    Path((course_id, post_id)): Path<(Uuid, Uuid)>,
) -> ApiResult<Json<Post>> {
    user.require_manage()?;
    Ok(Json(state.feed.unpin(course_id, post_id, user.0.user_id).await?))
}

pub async fn move_post_up(
    State(state): State<AppState>,
    user: CurrentUser,
    Path((course_id, post_id)): Path<(Uuid, Uuid)>,
) -> ApiResult<Json<Post>> {
    user.require_manage()?;
    Ok(Json(state.feed.move_up(course_id, post_id, user.0.user_id).await?))
}

pub async fn move_post_down(
    State(state): State<AppState>,
    user: CurrentUser,
    Path((course_id, post_id)): Path<(Uuid, Uuid)>,
) -> ApiResult<Json<Post>> {
    user.require_manage()?;
    Ok(Json(state.feed.move_down(course_id, post_id, user.0.user_id).await?))
}

// ── Submissions ─────────────────────────────────────────────────────────────

pub async fn list_submissions(
    State(state): State<AppState>,
    user: CurrentUser,
    Path((course_id, post_id)): Path<(Uuid, Uuid)>,
) -> ApiResult<Json<Vec<SubmissionView>>> {
    user.require_manage()?;
    Ok(Json(state.submissions.list(course_id, post_id).await?))
}

/// The caller is always the submitting student.
pub async fn create_submission(
    State(state): State<AppState>,
    user: CurrentUser,
    Path((course_id, post_id)): Path<(Uuid, Uuid)>,
    Json(body): Json<SubmitRequest>,
) -> ApiResult<(StatusCode, Json<Submission>)> {
    let submission = state
        .submissions
        .submit(course_id, post_id, user.0.user_id, body.file_id)
        .await?;
    Ok((StatusCode::CREATED, Json(submission)))
}

pub async fn get_submission(
    State(state): State<AppState>,
    user: CurrentUser,
    Path((course_id, post_id, submission_id)): Path<(Uuid, Uuid, Uuid)>,
) -> ApiResult<Json<Submission>> {
    let submission = state.submissions.get(course_id, post_id, submission_id).await?;
    user.require_owner_or_manage(&submission)?;
    Ok(Json(submission))
}

pub async fn grade_submission(
    State(state): State<AppState>,
    user: CurrentUser,
    Path((course_id, post_id, submission_id)): Path<(Uuid, Uuid, Uuid)>,
    Json(body): Json<GradeRequest>,
) -> ApiResult<Json<Submission>> {
    user.require_manage()?;
    let graded = state
        .submissions
        .grade(course_id, post_id, submission_id, user.0.user_id, body.grade, body.comment)
        .await?;
    Ok(Json(graded))
}

pub async fn update_submission_status(
    State(state): State<AppState>,
    user: CurrentUser,
    Path((course_id, post_id, submission_id)): Path<(Uuid, Uuid, Uuid)>,
    Json(body): Json<StatusRequest>,
) -> ApiResult<Json<Submission>> {
    user.require_manage()?;
    let updated = state
        .submissions
        .update_status(course_id, post_id, submission_id, user.0.user_id, body.status)
        .await?;
    Ok(Json(updated))
}

pub async fn delete_submission(
    State(state): State<AppState>,
    user: CurrentUser,
    Path((course_id, post_id, submission_id)): Path<(Uuid, Uuid, Uuid)>,
) -> ApiResult<StatusCode> {
    let submission = state.submissions.get(course_id, post_id, submission_id).await?;
    user.require_owner_or_manage(&submission)?;
    state
        .submissions
        .delete(course_id, post_id, submission_id, user.0.user_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

// ── Activity ────────────────────────────────────────────────────────────────

/// Newest entries of the activity trail, optionally for one user.
pub async fn list_activity(
    State(state): State<AppState>,
    user: CurrentUser,
    Query(params): Query<ActivityParams>,
) -> ApiResult<Json<Vec<ActivityRecord>>> {
    user.require_manage()?;
    let query = ActivityQuery {
        user_id: params.user_id,
        limit: params
            .limit
            .unwrap_or(DEFAULT_ACTIVITY_LIMIT)
            .clamp(1, MAX_ACTIVITY_LIMIT),
    };
    let records = state
        .activity
        .recent(query)
        .await
        .map_err(|err| AppError::UpstreamUnavailable(format!("activity log: {err:#}")))?;
    Ok(Json(records))
}
