//! Bearer-token extraction and capability checks.
//!
//! Roles stop here: handlers decide what a caller may do, the engines only
//! ever see user ids.

use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use cf_core::error::AppError;
use cf_core::models::{Identity, Submission};

use crate::error::ApiError;
use crate::AppState;

/// The authenticated caller of a request.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub Identity);

impl CurrentUser {
    /// Teachers and admins author, reorder, and grade.
    pub fn require_manage(&self) -> Result<(), ApiError> {
        if self.0.can_manage_course() {
            Ok(())
        } else {
            Err(AppError::Forbidden("course management requires a teacher or admin".into()).into())
        }
    }

    /// Graders see every submission; students only their own.
    pub fn require_owner_or_manage(&self, submission: &Submission) -> Result<(), ApiError> {
        if self.0.can_manage_course() || submission.student_id == self.0.user_id {
            Ok(())
        } else {
            Err(AppError::Forbidden("submission belongs to another student".into()).into())
        }
    }
}

impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .ok_or_else(|| AppError::Unauthorized("missing bearer token".into()))?;

        match state.identity.authenticate(token).await {
            Ok(Some(identity)) => Ok(Self(identity)),
            Ok(None) => Err(AppError::Unauthorized("invalid or expired token".into()).into()),
            Err(err) => {
                tracing::error!(error = ?err, "identity provider failed");
                Err(AppError::UpstreamUnavailable("identity provider unavailable".into()).into())
            }
        }
    }
}
