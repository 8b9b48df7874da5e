//! S3-compatible object store client.
//!
//! Talks to MinIO, AWS S3 or any other S3-compatible endpoint through the
//! AWS SDK.  When no static credentials are configured, credentials are
//! resolved via the standard AWS credential chain (env vars,
//! `~/.aws/credentials`, IAM role, etc.).

use aws_sdk_s3::primitives::DateTime as SdkDateTime;
use aws_sdk_s3::Client;
use chrono::{DateTime, Utc};
use std::future::Future;
use std::pin::Pin;
use tracing::{debug, info};

use super::backend::{ListEntry, ObjectStore};
use crate::config::MinioConfig;
use crate::resource::{ByteStream, ResourceInfo};

/// Object store backed by an S3-compatible endpoint.
pub struct S3Backend {
    /// AWS S3 SDK client.
    client: Client,
}

impl S3Backend {
    /// Create a new S3 backend from the `minio` configuration section.
    pub async fn new(config: &MinioConfig) -> anyhow::Result<Self> {
        let region = if config.region.is_empty() {
            "us-east-1".to_string()
        } else {
            config.region.clone()
        };

        let mut config_loader = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(aws_config::Region::new(region.clone()));

        if let Some(endpoint) = endpoint_url(&config.endpoint, config.secure) {
            config_loader = config_loader.endpoint_url(endpoint);
        }

        // If explicit credentials are provided, inject them as static credentials.
        if !config.access_key.is_empty() || !config.secret_key.is_empty() {
            let creds = aws_sdk_s3::config::Credentials::new(
                &config.access_key,
                &config.secret_key,
                None, // session_token
                None, // expiry
                "minio-web-config",
            );
            config_loader = config_loader.credentials_provider(creds);
        }

        let sdk_config = config_loader.load().await;

        let s3_config_builder =
            aws_sdk_s3::config::Builder::from(&sdk_config).force_path_style(config.path_style);

        let client = Client::from_conf(s3_config_builder.build());

        info!(
            "S3 backend initialized: endpoint='{}' region={} secure={}",
            config.endpoint, region, config.secure
        );

        Ok(Self { client })
    }

    /// Map an AWS SDK error to an anyhow error with context.
    fn map_sdk_error(context: &str, err: impl std::fmt::Display) -> anyhow::Error {
        anyhow::anyhow!("S3 {context}: {err}")
    }
}

/// Build the endpoint URL from a `host:port` endpoint and the secure flag.
///
/// Endpoints that already carry a scheme are used as-is.  An empty
/// endpoint means "use the AWS default endpoint for the region".
fn endpoint_url(endpoint: &str, secure: bool) -> Option<String> {
    if endpoint.is_empty() {
        return None;
    }
    if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
        return Some(endpoint.to_string());
    }
    let scheme = if secure { "https" } else { "http" };
    Some(format!("{scheme}://{endpoint}"))
}

fn to_chrono(dt: Option<&SdkDateTime>) -> Option<DateTime<Utc>> {
    dt.and_then(|dt| DateTime::from_timestamp(dt.secs(), dt.subsec_nanos()))
}

impl ObjectStore for S3Backend {
    fn stat_object(
        &self,
        bucket: &str,
        key: &str,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<ResourceInfo>> + Send + '_>> {
        let bucket = bucket.to_string();
        let key = key.to_string();
        Box::pin(async move {
            debug!("S3 head_object: bucket={} key={}", bucket, key);

            let resp = self
                .client
                .head_object()
                .bucket(&bucket)
                .key(&key)
                .send()
                .await
                .map_err(|e| {
                    let service_err = e.into_service_error();
                    if service_err.is_not_found() {
                        anyhow::anyhow!("The specified key does not exist: {bucket}/{key}")
                    } else {
                        Self::map_sdk_error("head_object", service_err)
                    }
                })?;

            Ok(ResourceInfo {
                size: resp.content_length().unwrap_or(0).max(0) as u64,
                etag: resp.e_tag().unwrap_or_default().to_string(),
                content_type: resp.content_type().unwrap_or_default().to_string(),
                last_modified: to_chrono(resp.last_modified()),
                key,
            })
        })
    }

    fn get_object(
        &self,
        bucket: &str,
        key: &str,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<ByteStream>> + Send + '_>> {
        let bucket = bucket.to_string();
        let key = key.to_string();
        Box::pin(async move {
            debug!("S3 get_object: bucket={} key={}", bucket, key);

            let resp = self
                .client
                .get_object()
                .bucket(&bucket)
                .key(&key)
                .send()
                .await
                .map_err(|e| {
                    let service_err = e.into_service_error();
                    if service_err.is_no_such_key() {
                        anyhow::anyhow!("The specified key does not exist: {bucket}/{key}")
                    } else {
                        Self::map_sdk_error("get_object", service_err)
                    }
                })?;

            let stream: ByteStream = Box::pin(resp.body.into_async_read());
            Ok(stream)
        })
    }

    fn list_objects(
        &self,
        bucket: &str,
        prefix: &str,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<Vec<ListEntry>>> + Send + '_>> {
        let bucket = bucket.to_string();
        let prefix = prefix.to_string();
        Box::pin(async move {
            debug!("S3 list_objects_v2: bucket={} prefix='{}'", bucket, prefix);

            let mut entries = Vec::new();
            let mut continuation: Option<String> = None;
            loop {
                let resp = self
                    .client
                    .list_objects_v2()
                    .bucket(&bucket)
                    .prefix(&prefix)
                    .delimiter("/")
                    .set_continuation_token(continuation.take())
                    .send()
                    .await
                    .map_err(|e| Self::map_sdk_error("list_objects_v2", e.into_service_error()))?;

                for common in resp.common_prefixes() {
                    if let Some(p) = common.prefix() {
                        entries.push(ListEntry {
                            key: p.to_string(),
                            size: 0,
                            last_modified: None,
                        });
                    }
                }
                for obj in resp.contents() {
                    if let Some(key) = obj.key() {
                        entries.push(ListEntry {
                            key: key.to_string(),
                            size: obj.size().unwrap_or(0).max(0) as u64,
                            last_modified: to_chrono(obj.last_modified()),
                        });
                    }
                }

                match (resp.is_truncated(), resp.next_continuation_token()) {
                    (Some(true), Some(token)) => continuation = Some(token.to_string()),
                    _ => break,
                }
            }

            entries.sort_by(|a, b| a.key.cmp(&b.key));
            Ok(entries)
        })
    }

    fn bucket_exists(
        &self,
        bucket: &str,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<bool>> + Send + '_>> {
        let bucket = bucket.to_string();
        Box::pin(async move {
            debug!("S3 head_bucket: bucket={}", bucket);

            match self.client.head_bucket().bucket(&bucket).send().await {
                Ok(_) => Ok(true),
                Err(e) => {
                    let service_err = e.into_service_error();
                    if service_err.is_not_found() {
                        Ok(false)
                    } else {
                        Err(Self::map_sdk_error("head_bucket", service_err))
                    }
                }
            }
        })
    }

    fn list_buckets(&self) -> Pin<Box<dyn Future<Output = anyhow::Result<Vec<String>>> + Send + '_>> {
        Box::pin(async move {
            let resp = self
                .client
                .list_buckets()
                .send()
                .await
                .map_err(|e| Self::map_sdk_error("list_buckets", e.into_service_error()))?;
            Ok(resp
                .buckets()
                .iter()
                .filter_map(|b| b.name().map(str::to_string))
                .collect())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_url_plain() {
        assert_eq!(
            endpoint_url("localhost:9000", false),
            Some("http://localhost:9000".to_string())
        );
    }

    #[test]
    fn test_endpoint_url_secure() {
        assert_eq!(
            endpoint_url("minio.example.com", true),
            Some("https://minio.example.com".to_string())
        );
    }

    #[test]
    fn test_endpoint_url_with_scheme_is_kept() {
        assert_eq!(
            endpoint_url("https://s3.example.com:9443", false),
            Some("https://s3.example.com:9443".to_string())
        );
    }

    #[test]
    fn test_endpoint_url_empty_uses_default() {
        assert_eq!(endpoint_url("", true), None);
    }

    #[test]
    fn test_to_chrono_conversion() {
        let dt = SdkDateTime::from_secs(1_700_000_000);
        let converted = to_chrono(Some(&dt)).unwrap();
        assert_eq!(converted.timestamp(), 1_700_000_000);
        assert!(to_chrono(None).is_none());
    }
}
