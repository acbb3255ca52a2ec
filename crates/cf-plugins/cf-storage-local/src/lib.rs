//! # cf-storage-local
//!
//! Local filesystem implementation of `BlobStore`.
//! Files are sharded by the tail of their handle; each blob gets a JSON
//! sidecar with its `BlobMeta`.

use std::path::PathBuf;

use async_trait::async_trait;
use cf_core::models::BlobMeta;
use cf_core::traits::BlobStore;
use chrono::Utc;
use sha2::{Digest, Sha256};
use tokio::fs;
use uuid::Uuid;

pub struct LocalBlobStore {
    /// Root directory for all uploads (e.g., "./data/uploads")
    root_path: PathBuf,
}

impl LocalBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root_path: root.into() }
    }

    /// Handles are simple-format UUIDs. Anything else never touches the disk.
    fn is_valid_handle(handle: &str) -> bool {
        handle.len() == 32 && handle.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
    }

    /// "root/ef/cd/<handle>". v7 handles share their leading timestamp bytes,
    /// so the shards come from the random tail.
    fn sharded_dir(&self, handle: &str) -> PathBuf {
        let mut path = self.root_path.clone();
        path.push(&handle[30..32]);
        path.push(&handle[28..30]);
        path
    }

    fn data_path(&self, handle: &str) -> PathBuf {
        self.sharded_dir(handle).join(handle)
    }

    fn meta_path(&self, handle: &str) -> PathBuf {
        self.sharded_dir(handle).join(format!("{handle}.json"))
    }

    async fn read_meta(&self, handle: &str) -> anyhow::Result<Option<BlobMeta>> {
        if !Self::is_valid_handle(handle) {
            return Ok(None);
        }
        match fs::read(self.meta_path(handle)).await {
            Ok(raw) => Ok(Some(serde_json::from_slice(&raw)?)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }
}

#[async_trait]
impl BlobStore for LocalBlobStore {
    /// Writes the bytes first and the sidecar last, so a handle is only
    /// visible once its data is complete.
    async fn save(&self, data: Vec<u8>, original_name: &str, content_type: &str) -> anyhow::Result<BlobMeta> {
        let handle = Uuid::now_v7().simple().to_string();

        let mut hasher = Sha256::new();
        hasher.update(&data);
        let sha256 = hex::encode(hasher.finalize());

        fs::create_dir_all(self.sharded_dir(&handle)).await?;
        fs::write(self.data_path(&handle), &data).await?;

        let meta = BlobMeta {
            handle: handle.clone(),
            original_name: original_name.to_string(),
            content_type: content_type.to_string(),
            size: data.len() as u64,
            sha256,
            created_at: Utc::now(),
        };
        fs::write(self.meta_path(&handle), serde_json::to_vec(&meta)?).await?;

        tracing::debug!(handle = %meta.handle, size = meta.size, "blob stored");
        Ok(meta)
    }

    async fn open(&self, handle: &str) -> anyhow::Result<Option<(BlobMeta, Vec<u8>)>> {
        let Some(meta) = self.read_meta(handle).await? else {
            return Ok(None);
        };
        let data = fs::read(self.data_path(handle)).await?;
        Ok(Some((meta, data)))
    }

    async fn original_name(&self, handle: &str) -> anyhow::Result<Option<String>> {
        Ok(self.read_meta(handle).await?.map(|meta| meta.original_name))
    }
}
