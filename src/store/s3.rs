//! S3 implementation of [`ObjectStore`]

use super::error::{StoreError, StoreResult};
use super::{DeleteFailure, DeleteReport, ObjectStore, RemoteObject, Visibility, DELETE_BATCH_LIMIT};
use async_trait::async_trait;
use aws_config::meta::region::RegionProviderChain;
use aws_config::BehaviorVersion;
use aws_sdk_s3::config::{Credentials, Region};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{Delete, ObjectCannedAcl, ObjectIdentifier};
use aws_sdk_s3::Client as AwsS3Client;
use bytes::Bytes;
use secrecy::{ExposeSecret, SecretString};
use std::fmt;
use std::path::Path;
use std::time::Duration;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tracing::debug;

/// Connection settings for [`S3Store`]
#[derive(Clone)]
pub struct S3StoreConfig {
    /// S3 bucket name
    pub bucket: String,

    /// AWS region (e.g., "us-east-1")
    pub region: String,

    /// Custom endpoint URL (for S3-compatible services like MinIO)
    pub endpoint: Option<String>,

    /// Path-style addressing (required for some S3-compatible services)
    pub force_path_style: bool,

    pub access_key: String,
    pub secret_key: SecretString,

    /// Per-operation timeout in seconds
    pub timeout_seconds: u64,
}

impl S3StoreConfig {
    pub fn new(bucket: impl Into<String>, access_key: impl Into<String>, secret_key: SecretString) -> Self {
        Self {
            bucket: bucket.into(),
            region: "us-east-1".to_string(),
            endpoint: None,
            force_path_style: false,
            access_key: access_key.into(),
            secret_key,
            timeout_seconds: 300,
        }
    }

    pub fn validate(&self) -> StoreResult<()> {
        if self.bucket.trim().is_empty() {
            return Err(StoreError::InvalidConfig("bucket name cannot be empty".to_string()));
        }
        if self.access_key.is_empty() || self.secret_key.expose_secret().is_empty() {
            return Err(StoreError::InvalidConfig(
                "both access key and secret key must be provided".to_string(),
            ));
        }
        Ok(())
    }
}

impl fmt::Debug for S3StoreConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("S3StoreConfig")
            .field("bucket", &self.bucket)
            .field("region", &self.region)
            .field("endpoint", &self.endpoint)
            .field("force_path_style", &self.force_path_style)
            .field("access_key", &self.access_key)
            .field("secret_key", &"[REDACTED]")
            .field("timeout_seconds", &self.timeout_seconds)
            .finish()
    }
}

/// Object store backed by AWS S3 or an S3-compatible service
#[derive(Clone)]
pub struct S3Store {
    client: AwsS3Client,
    bucket: String,
}

impl S3Store {
    pub async fn connect(config: &S3StoreConfig) -> StoreResult<Self> {
        config.validate()?;
        let client = Self::build_aws_client(config).await;
        Ok(Self {
            client,
            bucket: config.bucket.clone(),
        })
    }

    async fn build_aws_client(config: &S3StoreConfig) -> AwsS3Client {
        let region_provider = RegionProviderChain::first_try(Region::new(config.region.clone()));
        let credentials = Credentials::new(
            config.access_key.clone(),
            config.secret_key.expose_secret().to_string(),
            None,
            None,
            "rpmrepo-explicit",
        );

        let aws_config = aws_config::defaults(BehaviorVersion::latest())
            .region(region_provider)
            .credentials_provider(credentials)
            .load()
            .await;

        let mut builder = aws_sdk_s3::config::Builder::from(&aws_config);
        if let Some(endpoint) = &config.endpoint {
            builder = builder.endpoint_url(endpoint);
        }
        if config.force_path_style {
            builder = builder.force_path_style(true);
        }
        let timeout_config = aws_sdk_s3::config::timeout::TimeoutConfig::builder()
            .operation_timeout(Duration::from_secs(config.timeout_seconds))
            .build();
        builder = builder.timeout_config(timeout_config);

        AwsS3Client::from_conf(builder.build())
    }

    fn not_found(&self, key: &str) -> StoreError {
        StoreError::NotFound {
            bucket: self.bucket.clone(),
            key: key.to_string(),
        }
    }

    async fn delete_chunk(&self, chunk: &[String]) -> DeleteReport {
        let mut report = DeleteReport::default();

        let mut identifiers = Vec::with_capacity(chunk.len());
        for key in chunk {
            match ObjectIdentifier::builder().key(key).build() {
                Ok(id) => identifiers.push(id),
                Err(e) => report.failures.push(DeleteFailure {
                    key: key.clone(),
                    message: e.to_string(),
                }),
            }
        }
        if identifiers.is_empty() {
            return report;
        }

        let delete = match Delete::builder().set_objects(Some(identifiers)).build() {
            Ok(delete) => delete,
            Err(e) => {
                report.failures.extend(chunk.iter().map(|key| DeleteFailure {
                    key: key.clone(),
                    message: e.to_string(),
                }));
                return report;
            }
        };

        match self
            .client
            .delete_objects()
            .bucket(&self.bucket)
            .delete(delete)
            .send()
            .await
        {
            Ok(output) => {
                report
                    .deleted
                    .extend(output.deleted().iter().filter_map(|d| d.key().map(str::to_string)));
                for error in output.errors() {
                    if let Some(key) = error.key() {
                        report.failures.push(DeleteFailure {
                            key: key.to_string(),
                            message: error.message().unwrap_or("unknown error").to_string(),
                        });
                    }
                }
            }
            Err(e) => {
                // the whole request failed, so every key in it did
                let message = format!("batch delete failed: {}", StoreError::from(e));
                report.failures.extend(chunk.iter().map(|key| DeleteFailure {
                    key: key.clone(),
                    message: message.clone(),
                }));
            }
        }
        report
    }
}

/// Content-Type for an uploaded repository file
pub(crate) fn content_type_for(key: &str) -> String {
    if key.ends_with(".asc") {
        return "text/plain".to_string();
    }
    if key.ends_with(".xml") {
        return "application/xml".to_string();
    }
    if key.ends_with(".rpm") {
        return "application/x-rpm".to_string();
    }
    mime_guess::from_path(key)
        .first_or_octet_stream()
        .essence_str()
        .to_string()
}

#[async_trait]
impl ObjectStore for S3Store {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    async fn list(&self, prefix: &str) -> StoreResult<Vec<RemoteObject>> {
        let mut objects = Vec::new();
        let mut continuation_token: Option<String> = None;

        loop {
            let mut request = self.client.list_objects_v2().bucket(&self.bucket);
            if !prefix.is_empty() {
                request = request.prefix(prefix);
            }
            if let Some(token) = continuation_token.take() {
                request = request.continuation_token(token);
            }

            let response = request.send().await.map_err(StoreError::from)?;
            objects.extend(response.contents().iter().filter_map(|obj| {
                Some(RemoteObject {
                    key: obj.key()?.to_string(),
                    size: obj.size().unwrap_or(0).max(0) as u64,
                })
            }));

            match response.next_continuation_token() {
                Some(token) if response.is_truncated().unwrap_or(false) => {
                    continuation_token = Some(token.to_string());
                }
                _ => break,
            }
        }

        debug!(bucket = %self.bucket, prefix, count = objects.len(), "listed objects");
        Ok(objects)
    }

    async fn get(&self, key: &str, dest: &Path) -> StoreResult<()> {
        let response = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(StoreError::from)
            .map_err(|e| if e.is_not_found() { self.not_found(key) } else { e })?;

        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut file = File::create(dest).await?;
        let mut body = response.body;
        while let Some(chunk) = body
            .try_next()
            .await
            .map_err(|e| StoreError::Network(format!("failed to read response body: {}", e)))?
        {
            file.write_all(&chunk).await?;
        }
        file.flush().await?;

        debug!(key, dest = %dest.display(), "downloaded object");
        Ok(())
    }

    async fn put(&self, key: &str, src: &Path, visibility: Visibility) -> StoreResult<()> {
        let body = ByteStream::from_path(src)
            .await
            .map_err(|e| StoreError::Io(format!("{}: {}", src.display(), e)))?;

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .acl(ObjectCannedAcl::from(visibility.canned_acl()))
            .content_type(content_type_for(key))
            .body(body)
            .send()
            .await
            .map_err(StoreError::from)?;

        debug!(key, src = %src.display(), %visibility, "uploaded object");
        Ok(())
    }

    async fn delete_batch(&self, keys: &[String]) -> DeleteReport {
        let mut report = DeleteReport::default();
        for chunk in keys.chunks(DELETE_BATCH_LIMIT) {
            report.merge(self.delete_chunk(chunk).await);
        }
        report
    }

    async fn put_if_absent(&self, key: &str, body: Bytes) -> StoreResult<bool> {
        let result = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .if_none_match("*")
            .content_type("application/json")
            .body(ByteStream::from(body))
            .send()
            .await;

        match result {
            Ok(_) => Ok(true),
            Err(e) => {
                let err = StoreError::from(e);
                if err.is_precondition_failed() {
                    Ok(false)
                } else {
                    Err(err)
                }
            }
        }
    }

    async fn get_bytes(&self, key: &str) -> StoreResult<Option<Bytes>> {
        let response = match self.client.get_object().bucket(&self.bucket).key(key).send().await {
            Ok(response) => response,
            Err(e) => {
                let err = StoreError::from(e);
                return if err.is_not_found() { Ok(None) } else { Err(err) };
            }
        };

        let body = response
            .body
            .collect()
            .await
            .map_err(|e| StoreError::Network(format!("failed to collect response body: {}", e)))?;
        Ok(Some(body.into_bytes()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> S3StoreConfig {
        S3StoreConfig::new("repo-bucket", "AKIA", SecretString::from("secret".to_string()))
    }

    #[test]
    fn test_config_validation() {
        assert!(config().validate().is_ok());

        let mut missing_bucket = config();
        missing_bucket.bucket = " ".to_string();
        assert!(missing_bucket.validate().is_err());

        let missing_secret = S3StoreConfig::new("b", "AKIA", SecretString::from(String::new()));
        assert!(missing_secret.validate().is_err());
    }

    #[test]
    fn test_debug_redacts_secret() {
        let rendered = format!("{:?}", config());
        assert!(rendered.contains("[REDACTED]"));
        assert!(!rendered.contains("\"secret\""));
    }

    #[test]
    fn test_content_types() {
        assert_eq!(content_type_for("repodata/repomd.xml"), "application/xml");
        assert_eq!(content_type_for("repodata/repomd.xml.asc"), "text/plain");
        assert_eq!(content_type_for("foo-1.0-1.x86_64.rpm"), "application/x-rpm");
        assert_eq!(content_type_for("repodata/blob.unknownext"), "application/octet-stream");
    }

    #[tokio::test]
    async fn test_connect_does_not_touch_network() {
        let store = S3Store::connect(&config()).await.unwrap();
        assert_eq!(store.bucket(), "repo-bucket");
    }
}
