//! # classfeed Binary
//!
//! The entry point that assembles the server from configuration and the
//! store plugins compiled in through features.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use cf_api::AppState;
use cf_auth_simple::SimpleIdentityProvider;
use cf_configs::{LogFormat, Settings};
use cf_core::traits::{ActivityLog, AuditSink, BlobStore, CourseDirectory, FeedStore, SubmissionStore, UserDirectory};
use cf_core::{FanoutAuditSink, FeedEngine, RetryPolicy, SharedClock, SubmissionEngine, TracingAuditSink};
use cf_storage_local::LocalBlobStore;
use tracing_subscriber::EnvFilter;

/// Every store port, possibly served by the same plugin instance.
struct Stores {
    feed: Arc<dyn FeedStore>,
    submissions: Arc<dyn SubmissionStore>,
    courses: Arc<dyn CourseDirectory>,
    users: Arc<dyn UserDirectory>,
    audit: Arc<dyn AuditSink>,
    activity: Arc<dyn ActivityLog>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = Settings::load().context("loading configuration")?;
    init_tracing(&settings);

    if settings.auth.uses_dev_secret() {
        tracing::warn!("auth.token_secret is the development default; set CLASSFEED__AUTH__TOKEN_SECRET");
    }

    // 1. Stores
    let stores = open_stores(&settings).await?;

    // 2. Blob storage and identity
    let blobs: Arc<dyn BlobStore> = Arc::new(LocalBlobStore::new(&settings.storage.upload_dir));
    let identity = Arc::new(SimpleIdentityProvider::new(
        settings.auth.token_secret.clone(),
        chrono::Duration::seconds(settings.auth.token_ttl_secs),
    ));

    // 3. Engines
    let clock: SharedClock = Arc::new(mockable::DefaultClock);
    let retry = RetryPolicy {
        max_attempts: settings.feed.max_attempts,
        backoff: Duration::from_millis(settings.feed.retry_backoff_ms),
    };
    let feed = FeedEngine::new(
        stores.feed.clone(),
        stores.courses,
        stores.audit.clone(),
        clock.clone(),
    )
    .with_retry(retry);
    let submissions = SubmissionEngine::new(
        stores.submissions,
        stores.feed,
        stores.users,
        blobs.clone(),
        stores.audit,
        clock,
    )
    .with_retry(retry);

    let app = cf_api::router(AppState {
        feed: Arc::new(feed),
        submissions: Arc::new(submissions),
        identity,
        blobs,
        activity: stores.activity,
        max_upload_bytes: settings.storage.max_upload_bytes,
    });

    let address = settings.bind_address();
    let listener = tokio::net::TcpListener::bind(&address)
        .await
        .with_context(|| format!("binding {address}"))?;
    tracing::info!(%address, "classfeed listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    tracing::info!("classfeed stopped");
    Ok(())
}

fn init_tracing(settings: &Settings) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&settings.log.filter));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match settings.log.format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Pretty => builder.pretty().init(),
    }
}

async fn open_stores(settings: &Settings) -> anyhow::Result<Stores> {
    if settings.database.is_memory() {
        return open_memory();
    }
    open_sqlite(settings).await
}

#[cfg(feature = "db-memory")]
fn open_memory() -> anyhow::Result<Stores> {
    let store = Arc::new(cf_db_memory::MemoryStore::new());
    let trail = Arc::new(cf_db_memory::MemoryAuditSink::new());
    let sinks: Vec<Arc<dyn AuditSink>> = vec![Arc::new(TracingAuditSink), trail.clone()];
    tracing::warn!("using the in-memory store; nothing survives a restart");
    Ok(Stores {
        feed: store.clone(),
        submissions: store.clone(),
        courses: store.clone(),
        users: store,
        audit: Arc::new(FanoutAuditSink::new(sinks)),
        activity: trail,
    })
}

#[cfg(not(feature = "db-memory"))]
fn open_memory() -> anyhow::Result<Stores> {
    anyhow::bail!("database.url = \"memory\" needs the `db-memory` feature")
}

#[cfg(feature = "db-sqlite")]
async fn open_sqlite(settings: &Settings) -> anyhow::Result<Stores> {
    let store = cf_db_sqlite::SqliteStore::new(&settings.database.url, settings.database.max_connections)
        .await
        .with_context(|| format!("opening {}", settings.database.url))?;
    let audit = FanoutAuditSink::new(vec![Arc::new(TracingAuditSink), Arc::new(store.audit_sink())]);
    let store = Arc::new(store);
    Ok(Stores {
        feed: store.clone(),
        submissions: store.clone(),
        courses: store.clone(),
        users: store.clone(),
        audit: Arc::new(audit),
        activity: store,
    })
}

#[cfg(not(feature = "db-sqlite"))]
async fn open_sqlite(_settings: &Settings) -> anyhow::Result<Stores> {
    anyhow::bail!("SQLite urls need the `db-sqlite` feature")
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown requested");
}
