//! HTTP round trips through the full router, middleware included.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use cf_api::AppState;
use cf_auth_simple::SimpleIdentityProvider;
use cf_core::models::{Identity, Role};
use cf_core::FeedEngine;
use secrecy::SecretString;
use serde_json::Value;
use tower::ServiceExt;
use uuid::Uuid;

use super::{Backend, Harness};

const SECRET: &str = "integration-secret";
const BOUNDARY: &str = "classfeed-test-boundary";

pub struct Response {
    pub status: StatusCode,
    pub headers: axum::http::HeaderMap,
    pub json: Value,
}

pub struct ApiHarness {
    pub app: Router,
    pub h: Harness,
    pub teacher: String,
    pub student: String,
    pub other_student: String,
    pub other_student_id: Uuid,
}

fn provider() -> SimpleIdentityProvider {
    SimpleIdentityProvider::new(SecretString::from(SECRET.to_string()), chrono::Duration::hours(1))
}

fn build_router(h: &Harness, feed: Arc<FeedEngine>) -> Router {
    cf_api::router(AppState {
        feed,
        submissions: h.submissions.clone(),
        identity: Arc::new(provider()),
        blobs: h.blobs.clone(),
        activity: h.audit.clone(),
        max_upload_bytes: 64 * 1024,
    })
}

impl ApiHarness {
    pub async fn new() -> Self {
        let h = Harness::new(Backend::Memory).await;
        let app = build_router(&h, h.feed.clone());

        let issuer = provider();
        let token = |user_id: Uuid, role: Role| {
            issuer
                .issue_token(&Identity { user_id, roles: vec![role] })
                .expect("token")
        };
        let other_student_id = Uuid::now_v7();
        Self {
            teacher: token(h.teacher_id, Role::Teacher),
            student: token(h.student_id, Role::Student),
            other_student: token(other_student_id, Role::Student),
            other_student_id,
            app,
            h,
        }
    }

    /// Serves the same harness through a different feed engine.
    pub fn with_feed(mut self, feed: FeedEngine) -> Self {
        self.app = build_router(&self.h, Arc::new(feed));
        self
    }

    pub fn posts_uri(&self) -> String {
        format!("/courses/{}/posts", self.h.course_id)
    }

    pub async fn send(&self, method: Method, uri: &str, token: Option<&str>, body: Option<Value>) -> Response {
        let mut request = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            request = request.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let request = match body {
            Some(json) => request
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json.to_string())),
            None => request.body(Body::empty()),
        }
        .expect("request");
        self.dispatch(request).await
    }

    pub async fn upload(&self, token: &str, file_name: &str, bytes: &[u8]) -> Response {
        let mut body = format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{file_name}\"\r\n\
             Content-Type: text/plain\r\n\r\n"
        )
        .into_bytes();
        body.extend_from_slice(bytes);
        body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());

        let request = Request::builder()
            .method(Method::POST)
            .uri("/files")
            .header(header::AUTHORIZATION, format!("Bearer {token}"))
            .header(header::CONTENT_TYPE, format!("multipart/form-data; boundary={BOUNDARY}"))
            .body(Body::from(body))
            .expect("request");
        self.dispatch(request).await
    }

    async fn dispatch(&self, request: Request<Body>) -> Response {
        let response = self.app.clone().oneshot(request).await.expect("infallible");
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body");
        let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        Response { status, headers, json }
    }
}
