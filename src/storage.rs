use async_trait::async_trait;
use aws_sdk_s3 as s3;
use s3::{presigning::PresigningConfig, primitives::ByteStream};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;

use crate::error::AppError;

#[derive(Debug, Error)]
#[error("storage error: {0}")]
pub struct StorageError(pub String);

impl From<StorageError> for AppError {
    fn from(value: StorageError) -> Self {
        AppError::internal(value)
    }
}

// 1. StorageService Contract
/// StorageService
///
/// Contract for the attachment bucket. The workflow writes uploaded files through it and
/// removes them again when a submit has to be undone; handlers use it to hand out
/// short-lived download links.
#[async_trait]
pub trait StorageService: Send + Sync {
    /// Ensures the configured bucket exists. Used in the `Env::Local` setup to provision
    /// the bucket in MinIO.
    async fn ensure_bucket_exists(&self);

    async fn put_object(
        &self,
        key: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<(), StorageError>;

    async fn delete_object(&self, key: &str) -> Result<(), StorageError>;

    /// A signed GET URL for `key`, valid for `expires_in`.
    async fn presigned_download_url(
        &self,
        key: &str,
        expires_in: Duration,
    ) -> Result<String, StorageError>;
}

// 2. The Real Implementation (S3/MinIO)
/// S3StorageClient
///
/// `StorageService` over the AWS SDK. Path-style addressing keeps it compatible with MinIO.
#[derive(Clone)]
pub struct S3StorageClient {
    client: s3::Client,
    bucket_name: String,
}

impl S3StorageClient {
    /// new
    ///
    /// Constructs the S3 client using credentials and configuration from AppConfig.
    pub async fn new(
        endpoint: &str,
        region: &str,
        access_key: &str,
        secret_key: &str,
        bucket: &str,
    ) -> Self {
        let credentials =
            s3::config::Credentials::new(access_key, secret_key, None, None, "static");

        let config = s3::Config::builder()
            .credentials_provider(credentials)
            .endpoint_url(endpoint)
            .region(s3::config::Region::new(region.to_string()))
            .behavior_version_latest()
            .force_path_style(true)
            .build();

        Self {
            client: s3::Client::from_conf(config),
            bucket_name: bucket.to_string(),
        }
    }
}

#[async_trait]
impl StorageService for S3StorageClient {
    /// ensure_bucket_exists
    ///
    /// CreateBucket is idempotent, so this is safe to call at startup. An "already owned"
    /// answer is expected and only logged at debug level.
    async fn ensure_bucket_exists(&self) {
        if let Err(e) = self
            .client
            .create_bucket()
            .bucket(&self.bucket_name)
            .send()
            .await
        {
            tracing::debug!(bucket = %self.bucket_name, error = %e, "create_bucket skipped");
        }
    }

    async fn put_object(
        &self,
        key: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<(), StorageError> {
        self.client
            .put_object()
            .bucket(&self.bucket_name)
            .key(key)
            .content_type(content_type)
            .body(ByteStream::from(bytes))
            .send()
            .await
            .map_err(|e| StorageError(format!("put_object {key}: {e}")))?;
        Ok(())
    }

    async fn delete_object(&self, key: &str) -> Result<(), StorageError> {
        self.client
            .delete_object()
            .bucket(&self.bucket_name)
            .key(key)
            .send()
            .await
            .map_err(|e| StorageError(format!("delete_object {key}: {e}")))?;
        Ok(())
    }

    async fn presigned_download_url(
        &self,
        key: &str,
        expires_in: Duration,
    ) -> Result<String, StorageError> {
        let presign = PresigningConfig::expires_in(expires_in)
            .map_err(|e| StorageError(format!("presigning config: {e}")))?;

        let presigned_req = self
            .client
            .get_object()
            .bucket(&self.bucket_name)
            .key(key)
            .presigned(presign)
            .await
            .map_err(|e| StorageError(format!("presign {key}: {e}")))?;

        Ok(presigned_req.uri().to_string())
    }
}

/// sanitize_key
///
/// Removes directory navigation components (`..`, `.`) and empty segments from a
/// user-provided key segment.
pub fn sanitize_key(key: &str) -> String {
    key.split('/')
        .filter(|segment| !segment.is_empty() && *segment != ".." && *segment != ".")
        .collect::<Vec<_>>()
        .join("/")
}

/// Object key for one attachment: `achievements/<student>/<achievement>/<n>-<filename>`.
/// Only the last path segment of the client filename survives.
pub fn attachment_key(student_id: &str, achievement_id: &str, index: usize, filename: &str) -> String {
    let cleaned = sanitize_key(&filename.replace('\\', "/"));
    let name = cleaned.rsplit('/').next().filter(|n| !n.is_empty()).unwrap_or("file");
    format!("achievements/{student_id}/{achievement_id}/{index}-{name}")
}

// 3. The Mock Implementation (For Tests)
/// MockStorageService
///
/// In-memory `StorageService` for tests. Objects are kept in a shared map so a test can
/// assert what was written and what was cleaned up. `should_fail` fails every call;
/// `fail_puts_after` lets that many uploads succeed and fails the rest.
#[derive(Clone, Default)]
pub struct MockStorageService {
    pub should_fail: bool,
    pub fail_puts_after: Option<usize>,
    objects: Arc<Mutex<HashMap<String, Vec<u8>>>>,
    puts: Arc<Mutex<usize>>,
}

impl MockStorageService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn new_failing() -> Self {
        Self {
            should_fail: true,
            ..Self::default()
        }
    }

    pub fn failing_after(successful_puts: usize) -> Self {
        Self {
            fail_puts_after: Some(successful_puts),
            ..Self::default()
        }
    }

    /// Keys currently stored, sorted.
    pub fn object_keys(&self) -> Vec<String> {
        let objects = self.objects.lock().unwrap_or_else(|p| p.into_inner());
        let mut keys: Vec<String> = objects.keys().cloned().collect();
        keys.sort();
        keys
    }
}

#[async_trait]
impl StorageService for MockStorageService {
    async fn ensure_bucket_exists(&self) {}

    async fn put_object(
        &self,
        key: &str,
        bytes: Vec<u8>,
        _content_type: &str,
    ) -> Result<(), StorageError> {
        if self.should_fail {
            return Err(StorageError("mock storage failure".to_string()));
        }
        {
            let mut puts = self.puts.lock().unwrap_or_else(|p| p.into_inner());
            if self.fail_puts_after.is_some_and(|limit| *puts >= limit) {
                return Err(StorageError("mock storage failure".to_string()));
            }
            *puts += 1;
        }
        self.objects
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .insert(sanitize_key(key), bytes);
        Ok(())
    }

    async fn delete_object(&self, key: &str) -> Result<(), StorageError> {
        if self.should_fail {
            return Err(StorageError("mock storage failure".to_string()));
        }
        self.objects
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .remove(&sanitize_key(key));
        Ok(())
    }

    async fn presigned_download_url(
        &self,
        key: &str,
        expires_in: Duration,
    ) -> Result<String, StorageError> {
        if self.should_fail {
            return Err(StorageError("mock storage failure".to_string()));
        }
        Ok(format!(
            "http://localhost:9000/mock-bucket/{}?expires={}&signature=fake",
            sanitize_key(key),
            expires_in.as_secs()
        ))
    }
}

/// StorageState
///
/// The concrete type used to share the storage service access across the application state.
pub type StorageState = Arc<dyn StorageService>;
