//! Permanent storage for finished artifacts.
//!
//! Two backends: the local filesystem (served by a static file route or a
//! CDN in front of it) and S3. Both name objects by a fresh UUID, so a
//! store never overwrites an existing artifact.

use std::path::PathBuf;

use async_trait::async_trait;
use aws_sdk_s3::config::Region;
use aws_sdk_s3::primitives::ByteStream;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Storage backend error: {0}")]
    Backend(String),

    #[error("Reference '{0}' does not belong to this storage")]
    ForeignReference(String),
}

/// Stores artifact bytes and hands back a permanent, client-facing reference.
#[async_trait]
pub trait ArtifactStorage: Send + Sync {
    /// Persist `bytes` under a new name with extension `ext` (no dot).
    async fn store(&self, bytes: Vec<u8>, ext: &str) -> Result<String, StorageError>;

    /// Remove a previously stored artifact. Missing objects are not an error.
    async fn delete(&self, output_ref: &str) -> Result<(), StorageError>;
}

fn object_name(ext: &str) -> String {
    format!("{}.{}", uuid::Uuid::new_v4(), ext.trim_start_matches('.'))
}

fn content_type(ext: &str) -> &'static str {
    match ext.trim_start_matches('.').to_ascii_lowercase().as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "webp" => "image/webp",
        _ => "application/octet-stream",
    }
}

// ---------------------------------------------------------------------------
// Local filesystem
// ---------------------------------------------------------------------------

/// Writes artifacts to a directory; references are `{public_prefix}/{name}`.
pub struct LocalStorage {
    root: PathBuf,
    public_prefix: String,
}

impl LocalStorage {
    pub fn new(root: impl Into<PathBuf>, public_prefix: &str) -> Self {
        Self {
            root: root.into(),
            public_prefix: public_prefix.trim_end_matches('/').to_string(),
        }
    }

    /// File name behind a reference, rejecting anything that could escape `root`.
    fn file_name_of<'a>(&self, output_ref: &'a str) -> Result<&'a str, StorageError> {
        let name = output_ref
            .strip_prefix(&self.public_prefix)
            .and_then(|rest| rest.strip_prefix('/'))
            .filter(|name| !name.is_empty() && !name.contains(['/', '\\']) && *name != "..")
            .ok_or_else(|| StorageError::ForeignReference(output_ref.to_string()))?;
        Ok(name)
    }
}

#[async_trait]
impl ArtifactStorage for LocalStorage {
    async fn store(&self, bytes: Vec<u8>, ext: &str) -> Result<String, StorageError> {
        tokio::fs::create_dir_all(&self.root).await?;
        let name = object_name(ext);
        tokio::fs::write(self.root.join(&name), bytes).await?;
        Ok(format!("{}/{}", self.public_prefix, name))
    }

    async fn delete(&self, output_ref: &str) -> Result<(), StorageError> {
        let name = self.file_name_of(output_ref)?;
        match tokio::fs::remove_file(self.root.join(name)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

// ---------------------------------------------------------------------------
// S3
// ---------------------------------------------------------------------------

/// Key prefix for generated artifacts inside the bucket.
const S3_KEY_PREFIX: &str = "generations";

/// Uploads artifacts to a bucket; references are the public object URL.
pub struct S3Storage {
    client: aws_sdk_s3::Client,
    bucket: String,
    base_url: String,
}

impl S3Storage {
    /// Build a client from the ambient AWS credential chain.
    pub async fn connect(bucket: String, region: String) -> Self {
        let sdk_config = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(Region::new(region.clone()))
            .load()
            .await;
        Self::with_client(aws_sdk_s3::Client::new(&sdk_config), bucket, &region)
    }

    pub fn with_client(client: aws_sdk_s3::Client, bucket: String, region: &str) -> Self {
        let base_url = format!("https://{bucket}.s3.{region}.amazonaws.com");
        Self {
            client,
            bucket,
            base_url,
        }
    }

    fn key_of<'a>(&self, output_ref: &'a str) -> Result<&'a str, StorageError> {
        output_ref
            .strip_prefix(&self.base_url)
            .and_then(|rest| rest.strip_prefix('/'))
            .filter(|key| !key.is_empty())
            .ok_or_else(|| StorageError::ForeignReference(output_ref.to_string()))
    }
}

#[async_trait]
impl ArtifactStorage for S3Storage {
    async fn store(&self, bytes: Vec<u8>, ext: &str) -> Result<String, StorageError> {
        let key = format!("{S3_KEY_PREFIX}/{}", object_name(ext));
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&key)
            .content_type(content_type(ext))
            .body(ByteStream::from(bytes))
            .send()
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok(format!("{}/{}", self.base_url, key))
    }

    async fn delete(&self, output_ref: &str) -> Result<(), StorageError> {
        let key = self.key_of(output_ref)?;
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok(())
    }
}
