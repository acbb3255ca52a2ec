//! # cf-api
//!
//! The HTTP routing and orchestration layer for classfeed.

pub mod auth;
pub mod error;
pub mod handlers;
pub mod middleware;

use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, patch, post};
use axum::Router;
use cf_core::traits::{ActivityLog, BlobStore, IdentityProvider};
use cf_core::{FeedEngine, SubmissionEngine};

pub use auth::CurrentUser;
pub use error::ApiError;

/// State shared across all request handlers.
#[derive(Clone)]
pub struct AppState {
    pub feed: Arc<FeedEngine>,
    pub submissions: Arc<SubmissionEngine>,
    pub identity: Arc<dyn IdentityProvider>,
    pub blobs: Arc<dyn BlobStore>,
    pub activity: Arc<dyn ActivityLog>,
    pub max_upload_bytes: usize,
}

/// Builds the full router, middleware included.
///
/// # Developer Note
/// Routes are nested under `/courses/{course_id}` so every post and
/// submission id is resolved within the course named in the path.
pub fn router(state: AppState) -> Router {
    let upload_limit = DefaultBodyLimit::max(state.max_upload_bytes);

    let submissions = Router::new()
        .route(
            "/",
            get(handlers::list_submissions).post(handlers::create_submission),
        )
        .route(
            "/{submission_id}",
            get(handlers::get_submission)
                .patch(handlers::grade_submission)
                .delete(handlers::delete_submission),
        )
        .route(
            "/{submission_id}/status",
            patch(handlers::update_submission_status),
        );

    let posts = Router::new()
        .route("/", get(handlers::list_posts).post(handlers::create_post))
        .route(
            "/{post_id}",
            get(handlers::get_post)
                .put(handlers::update_post)
                .delete(handlers::delete_post),
        )
        .route("/{post_id}/pin", patch(handlers::pin_post))
        .route("/{post_id}/unpin", patch(handlers::unpin_post))
        .route("/{post_id}/move-up", patch(handlers::move_post_up))
        .route("/{post_id}/move-down", patch(handlers::move_post_down))
        .nest("/{post_id}/submissions", submissions);

    let app = Router::new()
        .route("/health", get(handlers::health))
        .route("/files", post(handlers::upload_file).layer(upload_limit))
        .route("/files/{handle}", get(handlers::download_file))
        .route("/activity-logs", get(handlers::list_activity))
        .nest("/courses/{course_id}/posts", posts)
        .with_state(state);

    middleware::apply(app)
}
