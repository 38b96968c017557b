//! S3-compatible object storage backend.
//!
//! Works against AWS S3 and anything speaking its API (Qiniu Kodo, MinIO,
//! Backblaze B2, ...). Bucket, credentials and endpoint all come from the
//! [`StorageConfig`] of each call, so a single backend serves every target.
//!
//! # Credentials
//!
//! Credentials are provided explicitly via `access_key` and `secret_key`. The
//! AWS credential chain is not consulted, since it is single-account and the
//! configured targets are typically heterogeneous.

use crate::backend::{StorageBackend, UploadStream};
use crate::error::{ErrorKind, Result};
use crate::models::{StorageConfig, StorageType};
use crate::path::validate as validate_path;
use async_trait::async_trait;
use aws_sdk_s3::{
    Client,
    config::{BehaviorVersion, Credentials, Region, retry::RetryConfig, timeout::TimeoutConfig},
    error::SdkError,
    primitives::ByteStream,
};
use exn::ResultExt;
use std::path::Component;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tracing::instrument;

/// Region used when the configuration names none.
const DEFAULT_REGION: &str = "us-east-1";

/// S3-compatible storage backend.
///
/// The object key is the configured `base_path` (treated as a key prefix)
/// joined with the destination name. The body is buffered in memory before
/// the single `PutObject` request, and SDK retries are disabled so exactly one
/// attempt is made.
///
/// # Examples
///
/// ```no_run
/// use memorix_storage::{StorageConfig, backend::{S3Backend, StorageBackend}, error::Result};
///
/// async fn save(bytes: &'static [u8]) -> Result<u64> {
///     let mut config = StorageConfig::new("kodo", "qiniu");
///     config.bucket = Some("photos".to_string());
///     config.access_key = Some("AK".to_string());
///     config.secret_key = Some("SK".to_string());
///     config.endpoint = Some("https://s3.cn-east-1.qiniucs.com".to_string());
///     S3Backend.upload(Box::new(bytes), "2024/IMG_0001.jpg", &config).await
/// }
/// ```
#[derive(Clone, Copy, Debug, Default)]
pub struct S3Backend;

impl S3Backend {
    fn client(config: &StorageConfig) -> Result<Client> {
        let access_key = config.required("access_key", &config.access_key)?;
        let secret_key = config.required("secret_key", &config.secret_key)?;
        let region = config
            .region
            .as_deref()
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .unwrap_or(DEFAULT_REGION);
        let credentials = Credentials::new(access_key, secret_key, None, None, "memorix-config");
        let mut builder = aws_sdk_s3::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .credentials_provider(credentials)
            .region(Region::new(region.to_string()))
            .retry_config(RetryConfig::disabled())
            // Path-style addressing for S3-compatible services.
            .force_path_style(true);
        if let Some(endpoint) = config.endpoint.as_deref().map(str::trim).filter(|e| !e.is_empty()) {
            builder = builder.endpoint_url(endpoint);
        }
        if let Some(secs) = config.timeout_secs {
            builder = builder.timeout_config(
                TimeoutConfig::builder().operation_timeout(Duration::from_secs(secs)).build(),
            );
        }
        Ok(Client::from_conf(builder.build()))
    }

    /// Construct the full object key for `file_name` under an optional prefix.
    fn object_key(prefix: Option<&str>, file_name: &str) -> Result<String> {
        let validated = validate_path(file_name)?;
        let mut segments: Vec<String> = prefix
            .into_iter()
            .flat_map(|p| p.split(['/', '\\']))
            .filter(|s| !s.is_empty() && *s != ".")
            .map(str::to_string)
            .collect();
        for component in validated.components() {
            if let Component::Normal(segment) = component {
                segments.push(segment.to_string_lossy().into_owned());
            }
        }
        Ok(segments.join("/"))
    }
}

#[async_trait]
impl StorageBackend for S3Backend {
    fn kind(&self) -> StorageType {
        StorageType::ObjectStorage
    }

    #[instrument(skip(self, stream, config), fields(storage = %config.name))]
    async fn upload(&self, mut stream: UploadStream, file_name: &str, config: &StorageConfig) -> Result<u64> {
        let key = Self::object_key(config.base_path.as_deref(), file_name)?;
        let bucket = config.required("bucket", &config.bucket)?;
        let client = Self::client(config)?;

        let mut body = Vec::new();
        stream.read_to_end(&mut body).await.map_err(ErrorKind::Io)?;
        let written = body.len() as u64;

        let result = client
            .put_object()
            .bucket(bucket)
            .key(&key)
            .content_length(body.len() as i64)
            .body(ByteStream::from(body))
            .send()
            .await;
        if let Err(e) = result {
            let kind = match &e {
                SdkError::DispatchFailure(_) | SdkError::TimeoutError(_) => {
                    ErrorKind::Network(format!("{bucket}/{key}"))
                },
                _ => ErrorKind::BackendError(format!("put object {bucket}/{key}")),
            };
            return Err(e).or_raise(|| kind);
        }
        tracing::debug!(bucket, key = %key, bytes = written, "Stored upload in object storage");
        Ok(written)
    }
}
