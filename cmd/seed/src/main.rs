//! Development seeding: one course, one teacher, one student, and a bearer
//! token for each.
//!
//! Usage: `seed [course title]`. Reads the same configuration as the server.

use anyhow::Context;
use cf_auth_simple::SimpleIdentityProvider;
use cf_configs::Settings;
use cf_core::models::{Identity, Role};
use cf_db_sqlite::SqliteStore;
use uuid::Uuid;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_env_filter("info").init();

    let settings = Settings::load().context("loading configuration")?;
    anyhow::ensure!(
        !settings.database.is_memory(),
        "seeding an in-memory store is pointless; point CLASSFEED__DATABASE__URL at a SQLite file"
    );

    let title = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "Introduction to Rust".to_string());

    let store = SqliteStore::new(&settings.database.url, settings.database.max_connections)
        .await
        .with_context(|| format!("opening {}", settings.database.url))?;

    let course_id = Uuid::now_v7();
    let teacher = Identity {
        user_id: Uuid::now_v7(),
        roles: vec![Role::Teacher],
    };
    let student = Identity {
        user_id: Uuid::now_v7(),
        roles: vec![Role::Student],
    };

    store.register_course(course_id, &title).await?;
    store.register_user(teacher.user_id, "Ada Teacher").await?;
    store.register_user(student.user_id, "Sam Student").await?;
    tracing::info!(%course_id, %title, "course seeded");

    let auth = SimpleIdentityProvider::new(
        settings.auth.token_secret.clone(),
        chrono::Duration::seconds(settings.auth.token_ttl_secs),
    );

    println!("course_id     = {course_id}");
    println!("teacher_id    = {}", teacher.user_id);
    println!("teacher_token = {}", auth.issue_token(&teacher)?);
    println!("student_id    = {}", student.user_id);
    println!("student_token = {}", auth.issue_token(&student)?);
    Ok(())
}
