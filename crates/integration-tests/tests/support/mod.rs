//! Shared harness: both engines wired over a chosen store backend, a
//! controllable clock, a recording audit sink and a throwaway upload dir.
#![allow(dead_code)]

pub mod api;

use std::sync::{Arc, Mutex};

use cf_core::models::{Post, PostDraft, PostKind};
use cf_core::traits::{BlobStore, CourseDirectory, FeedStore, SubmissionStore, UserDirectory};
use cf_core::{FeedEngine, RetryPolicy, SubmissionEngine};
use cf_db_memory::{MemoryAuditSink, MemoryStore};
use cf_db_sqlite::SqliteStore;
use cf_storage_local::LocalBlobStore;
use chrono::{DateTime, Duration, Local, TimeZone, Utc};
use mockable::Clock;
use tempfile::TempDir;
use uuid::Uuid;

pub struct MutableClock(Mutex<DateTime<Utc>>);

impl MutableClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self(Mutex::new(now))
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *self.0.lock().expect("clock mutex") = now;
    }

    pub fn advance_seconds(&self, seconds: i64) {
        *self.0.lock().expect("clock mutex") += Duration::seconds(seconds);
    }
}

impl Clock for MutableClock {
    fn local(&self) -> DateTime<Local> {
        self.utc().with_timezone(&Local)
    }

    fn utc(&self) -> DateTime<Utc> {
        *self.0.lock().expect("clock mutex")
    }
}

pub fn start_of_term() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 9, 1, 9, 0, 0).unwrap()
}

#[derive(Debug, Clone, Copy)]
pub enum Backend {
    Memory,
    Sqlite,
}

struct Ports {
    feed: Arc<dyn FeedStore>,
    submissions: Arc<dyn SubmissionStore>,
    courses: Arc<dyn CourseDirectory>,
    users: Arc<dyn UserDirectory>,
}

pub struct Harness {
    pub feed: Arc<FeedEngine>,
    pub submissions: Arc<SubmissionEngine>,
    pub clock: Arc<MutableClock>,
    pub audit: Arc<MemoryAuditSink>,
    pub blobs: Arc<LocalBlobStore>,
    pub course_id: Uuid,
    pub other_course_id: Uuid,
    pub teacher_id: Uuid,
    pub student_id: Uuid,
    _workdir: TempDir,
}

impl Harness {
    pub async fn new(backend: Backend) -> Self {
        Self::with_retry(backend, RetryPolicy::default()).await
    }

    /// Generous retries for tests that hammer one course from many tasks.
    pub async fn for_contention(backend: Backend) -> Self {
        Self::with_retry(
            backend,
            RetryPolicy {
                max_attempts: 200,
                backoff: std::time::Duration::from_millis(1),
            },
        )
        .await
    }

    pub async fn with_retry(backend: Backend, retry: RetryPolicy) -> Self {
        let workdir = tempfile::tempdir().expect("tempdir");
        let course_id = Uuid::now_v7();
        let other_course_id = Uuid::now_v7();
        let teacher_id = Uuid::now_v7();
        let student_id = Uuid::now_v7();

        let ports = match backend {
            Backend::Memory => {
                let store = Arc::new(MemoryStore::new());
                store.register_course(course_id);
                store.register_course(other_course_id);
                store.register_user(teacher_id, "Ada Teacher");
                store.register_user(student_id, "Sam Student");
                Ports {
                    feed: store.clone(),
                    submissions: store.clone(),
                    courses: store.clone(),
                    users: store,
                }
            }
            Backend::Sqlite => {
                let url = format!("sqlite://{}", workdir.path().join("classfeed.db").display());
                let store = Arc::new(SqliteStore::new(&url, 4).await.expect("sqlite store"));
                store.register_course(course_id, "Systems Programming").await.unwrap();
                store.register_course(other_course_id, "Compilers").await.unwrap();
                store.register_user(teacher_id, "Ada Teacher").await.unwrap();
                store.register_user(student_id, "Sam Student").await.unwrap();
                Ports {
                    feed: store.clone(),
                    submissions: store.clone(),
                    courses: store.clone(),
                    users: store,
                }
            }
        };

        let clock = Arc::new(MutableClock::new(start_of_term()));
        let audit = Arc::new(MemoryAuditSink::new());
        let blobs = Arc::new(LocalBlobStore::new(workdir.path().join("uploads")));

        let feed = FeedEngine::new(ports.feed.clone(), ports.courses, audit.clone(), clock.clone())
            .with_retry(retry);
        let submissions = SubmissionEngine::new(
            ports.submissions,
            ports.feed,
            ports.users,
            blobs.clone(),
            audit.clone(),
            clock.clone(),
        )
        .with_retry(retry);

        Self {
            feed: Arc::new(feed),
            submissions: Arc::new(submissions),
            clock,
            audit,
            blobs,
            course_id,
            other_course_id,
            teacher_id,
            student_id,
            _workdir: workdir,
        }
    }

    pub async fn append(&self, title: &str) -> Post {
        self.feed
            .append(self.course_id, self.teacher_id, lecture(title))
            .await
            .expect("append")
    }

    pub async fn append_homework(&self, title: &str, due: Option<DateTime<Utc>>) -> Post {
        self.feed
            .append(self.course_id, self.teacher_id, homework(title, due))
            .await
            .expect("append homework")
    }

    /// Titles in display order.
    pub async fn titles(&self) -> Vec<String> {
        self.feed
            .list(self.course_id)
            .await
            .expect("list")
            .into_iter()
            .map(|p| p.title)
            .collect()
    }

    /// `(title, position)` of unpinned posts, sorted by position.
    pub async fn unpinned(&self) -> Vec<(String, i64)> {
        let mut posts: Vec<(String, i64)> = self
            .feed
            .list(self.course_id)
            .await
            .expect("list")
            .into_iter()
            .filter(|p| !p.pinned)
            .map(|p| (p.title, p.position))
            .collect();
        posts.sort_by_key(|(_, position)| *position);
        posts
    }

    pub async fn upload(&self, name: &str) -> String {
        self.blobs
            .save(b"solution".to_vec(), name, "text/plain")
            .await
            .expect("upload")
            .handle
    }
}

pub fn lecture(title: &str) -> PostDraft {
    PostDraft {
        title: title.to_string(),
        content: format!("{title} notes"),
        kind: PostKind::Lecture,
        file_id: None,
        due_date: None,
    }
}

pub fn homework(title: &str, due: Option<DateTime<Utc>>) -> PostDraft {
    PostDraft {
        title: title.to_string(),
        content: "Submit a single file".to_string(),
        kind: PostKind::Homework,
        file_id: None,
        due_date: due,
    }
}

/// The unpinned positions form exactly `1..=N`.
pub fn assert_dense(positions: &[(String, i64)]) {
    let got: Vec<i64> = positions.iter().map(|(_, p)| *p).collect();
    let expected: Vec<i64> = (1..=positions.len() as i64).collect();
    assert_eq!(got, expected, "unpinned positions are not dense: {positions:?}");
}
