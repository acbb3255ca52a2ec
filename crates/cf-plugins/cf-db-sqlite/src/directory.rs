//! Course and user directories plus the persistent activity log.

use async_trait::async_trait;
use cf_core::models::ActivityRecord;
use cf_core::traits::{ActivityLog, ActivityQuery, AuditSink, CourseDirectory, UserDirectory};
use chrono::Utc;
use sqlx::sqlite::SqlitePool;
use sqlx::Row;
use uuid::Uuid;

use crate::SqliteStore;

impl SqliteStore {
    /// Mirrors a course from the catalogue so the feed can accept posts for it.
    pub async fn register_course(&self, id: Uuid, title: &str) -> anyhow::Result<()> {
        sqlx::query(
            "INSERT INTO courses (id, title, created_at) VALUES (?, ?, ?) \
             ON CONFLICT (id) DO UPDATE SET title = excluded.title",
        )
        .bind(id)
        .bind(title)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn register_user(&self, id: Uuid, display_name: &str) -> anyhow::Result<()> {
        sqlx::query(
            "INSERT INTO users (id, display_name, created_at) VALUES (?, ?, ?) \
             ON CONFLICT (id) DO UPDATE SET display_name = excluded.display_name",
        )
        .bind(id)
        .bind(display_name)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl ActivityLog for SqliteStore {
    async fn recent(&self, query: ActivityQuery) -> anyhow::Result<Vec<ActivityRecord>> {
        let rows = sqlx::query(
            "SELECT id, user_id, action, timestamp, metadata FROM activity_logs \
             WHERE (?1 IS NULL OR user_id = ?1) \
             ORDER BY timestamp DESC, id DESC LIMIT ?2",
        )
        .bind(query.user_id)
        .bind(query.limit)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| -> anyhow::Result<ActivityRecord> {
                Ok(ActivityRecord {
                    id: row.try_get("id")?,
                    user_id: row.try_get("user_id")?,
                    action: row.try_get("action")?,
                    timestamp: row.try_get("timestamp")?,
                    metadata: serde_json::from_str(&row.try_get::<String, _>("metadata")?)?,
                })
            })
            .collect()
    }
}

#[async_trait]
impl CourseDirectory for SqliteStore {
    async fn course_exists(&self, course_id: Uuid) -> anyhow::Result<bool> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM courses WHERE id = ?")
            .bind(course_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(count > 0)
    }
}

#[async_trait]
impl UserDirectory for SqliteStore {
    async fn display_name(&self, user_id: Uuid) -> anyhow::Result<Option<String>> {
        let name: Option<String> = sqlx::query_scalar("SELECT display_name FROM users WHERE id = ?")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(name)
    }
}

/// Writes activity records on a detached task; failures are logged and dropped.
#[derive(Clone)]
pub struct SqliteAuditSink {
    pool: SqlitePool,
}

impl SqliteAuditSink {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

impl AuditSink for SqliteAuditSink {
    fn record(&self, record: ActivityRecord) {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            tracing::warn!(action = %record.action, "no runtime; activity record dropped");
            return;
        };
        let pool = self.pool.clone();
        handle.spawn(async move {
            let inserted = sqlx::query(
                "INSERT INTO activity_logs (id, user_id, action, timestamp, metadata) VALUES (?, ?, ?, ?, ?)",
            )
            .bind(record.id)
            .bind(record.user_id)
            .bind(&record.action)
            .bind(record.timestamp)
            .bind(record.metadata.to_string())
            .execute(&pool)
            .await;
            if let Err(err) = inserted {
                tracing::warn!(action = %record.action, error = %err, "failed to persist activity record");
            }
        });
    }
}
