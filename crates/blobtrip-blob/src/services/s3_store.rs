//! BlobStore implementation for S3-compatible services (AWS S3, MinIO, RustFS)

use std::path::Path;

use async_trait::async_trait;
use aws_config::meta::region::RegionProviderChain;
use aws_sdk_s3::config::{Credentials, Region, SharedCredentialsProvider};
use aws_sdk_s3::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{BucketLocationConstraint, CreateBucketConfiguration};
use aws_sdk_s3::Client;
use blobtrip_config::{ConnectionDescriptor, DEFAULT_REGION};
use chrono::{DateTime, Utc};
use tracing::debug;

use super::store::{
    AccessPolicy, BlobDescriptor, BlobReader, BlobStore, Cursor, ListOptions, ListPage,
};
use crate::error::BlobError;

/// S3 bucket-backed blob store. Container = bucket, blob = object.
pub struct S3BlobStore {
    client: Client,
    endpoint: Option<String>,
    region: String,
    force_path_style: bool,
}

impl S3BlobStore {
    /// Build a client from a parsed connection descriptor
    pub async fn connect(descriptor: &ConnectionDescriptor) -> Result<Self, BlobError> {
        let access_key = descriptor
            .access_key_id()
            .ok_or_else(|| BlobError::Service("missing access key id".to_string()))?;
        let secret_key = descriptor
            .secret_access_key()
            .ok_or_else(|| BlobError::Service("missing secret access key".to_string()))?;

        debug!(
            "Creating S3 client for region {} endpoint {:?}",
            descriptor.region(),
            descriptor.endpoint()
        );

        let credentials = Credentials::new(access_key, secret_key, None, None, "blobtrip");
        let region_provider =
            RegionProviderChain::first_try(Region::new(descriptor.region().to_string()));

        let mut config_builder = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(region_provider)
            .credentials_provider(SharedCredentialsProvider::new(credentials));

        if let Some(endpoint) = descriptor.endpoint() {
            config_builder = config_builder.endpoint_url(endpoint);
        }

        let config = config_builder.load().await;
        let s3_config = aws_sdk_s3::config::Builder::from(&config)
            .force_path_style(descriptor.force_path_style())
            .build();

        Ok(Self::from_client(
            Client::from_conf(s3_config),
            descriptor.endpoint().map(str::to_string),
            descriptor.region().to_string(),
            descriptor.force_path_style(),
        ))
    }

    /// Wrap an already configured client
    pub fn from_client(
        client: Client,
        endpoint: Option<String>,
        region: String,
        force_path_style: bool,
    ) -> Self {
        Self {
            client,
            endpoint,
            region,
            force_path_style,
        }
    }

    fn base_uri(&self, bucket: &str) -> String {
        match (&self.endpoint, self.force_path_style) {
            (Some(endpoint), true) => format!("{}/{}", endpoint, bucket),
            (Some(endpoint), false) => match endpoint.split_once("://") {
                Some((scheme, host)) => format!("{}://{}.{}", scheme, bucket, host),
                None => format!("{}.{}", bucket, endpoint),
            },
            (None, true) => format!("https://s3.{}.amazonaws.com/{}", self.region, bucket),
            (None, false) => format!("https://{}.s3.{}.amazonaws.com", bucket, self.region),
        }
    }

    /// New AWS buckets block public bucket policies by default. MinIO and
    /// RustFS have no such setting and answer with an error code we accept.
    async fn allow_public_policies(&self, bucket: &str) -> Result<(), BlobError> {
        debug!("DELETE PUBLIC ACCESS BLOCK {}", bucket);

        match self
            .client
            .delete_public_access_block()
            .bucket(bucket)
            .send()
            .await
        {
            Ok(_) => Ok(()),
            Err(e) => {
                let code = e.as_service_error().and_then(|se| se.code());
                let status = e.raw_response().map(|r| r.status().as_u16());
                if public_access_block_absent(code, status) {
                    debug!("No public access block on {} ({:?})", bucket, code);
                    Ok(())
                } else {
                    Err(map_sdk_error("DELETE PUBLIC ACCESS BLOCK", bucket, e))
                }
            }
        }
    }

    /// Every key in the bucket, following continuation tokens
    async fn all_keys(&self, bucket: &str) -> Result<Vec<String>, BlobError> {
        let mut keys = Vec::new();
        let mut token: Option<String> = None;

        loop {
            let response = self
                .client
                .list_objects_v2()
                .bucket(bucket)
                .set_continuation_token(token.take())
                .send()
                .await
                .map_err(|e| map_sdk_error("LIST", bucket, e))?;

            keys.extend(
                response
                    .contents()
                    .iter()
                    .filter_map(|obj| obj.key().map(str::to_string)),
            );

            match response.next_continuation_token() {
                Some(next) => token = Some(next.to_string()),
                None => break,
            }
        }

        Ok(keys)
    }
}

#[async_trait]
impl BlobStore for S3BlobStore {
    fn kind(&self) -> &'static str {
        "s3"
    }

    fn container_uri(&self, container: &str) -> String {
        self.base_uri(container)
    }

    fn blob_uri(&self, container: &str, blob: &str) -> String {
        let encoded: Vec<String> = blob
            .split('/')
            .map(|segment| urlencoding::encode(segment).into_owned())
            .collect();
        format!("{}/{}", self.base_uri(container), encoded.join("/"))
    }

    async fn create_container(&self, container: &str) -> Result<(), BlobError> {
        debug!("CREATE BUCKET {}", container);

        let mut request = self.client.create_bucket().bucket(container);

        // us-east-1 is the implicit location and AWS rejects it as an explicit constraint
        if self.endpoint.is_none() && self.region != DEFAULT_REGION {
            request = request.create_bucket_configuration(
                CreateBucketConfiguration::builder()
                    .location_constraint(BucketLocationConstraint::from(self.region.as_str()))
                    .build(),
            );
        }

        request
            .send()
            .await
            .map_err(|e| map_sdk_error("CREATE BUCKET", container, e))?;
        Ok(())
    }

    async fn set_access_policy(
        &self,
        container: &str,
        policy: AccessPolicy,
    ) -> Result<(), BlobError> {
        debug!("SET POLICY {} {:?}", container, policy);

        match policy {
            AccessPolicy::PublicReadBlob => {
                self.allow_public_policies(container).await?;
                self.client
                    .put_bucket_policy()
                    .bucket(container)
                    .policy(public_read_policy(container))
                    .send()
                    .await
                    .map_err(|e| map_sdk_error("PUT POLICY", container, e))?;
            }
            AccessPolicy::Private => {
                self.client
                    .delete_bucket_policy()
                    .bucket(container)
                    .send()
                    .await
                    .map_err(|e| map_sdk_error("DELETE POLICY", container, e))?;
            }
        }
        Ok(())
    }

    async fn container_exists(&self, container: &str) -> Result<bool, BlobError> {
        debug!("HEAD BUCKET {}", container);

        match self.client.head_bucket().bucket(container).send().await {
            Ok(_) => Ok(true),
            Err(e) => {
                let missing = e.as_service_error().map(|se| se.is_not_found()).unwrap_or(false)
                    || e.raw_response().map(|r| r.status().as_u16() == 404).unwrap_or(false);
                if missing {
                    Ok(false)
                } else {
                    Err(map_sdk_error("HEAD BUCKET", container, e))
                }
            }
        }
    }

    async fn delete_container(&self, container: &str) -> Result<(), BlobError> {
        // S3 refuses to delete a bucket that still holds objects
        let keys = self.all_keys(container).await?;
        for key in &keys {
            debug!("DELETE {}/{}", container, key);
            match self
                .client
                .delete_object()
                .bucket(container)
                .key(key)
                .send()
                .await
            {
                Ok(_) => {}
                Err(e) => {
                    let err = map_sdk_error("DELETE", key, e);
                    if !err.is_not_found() {
                        return Err(err);
                    }
                }
            }
        }

        debug!("DELETE BUCKET {} ({} objects removed)", container, keys.len());
        self.client
            .delete_bucket()
            .bucket(container)
            .send()
            .await
            .map_err(|e| map_sdk_error("DELETE BUCKET", container, e))?;
        Ok(())
    }

    async fn put_blob(
        &self,
        container: &str,
        blob: &str,
        source: &Path,
        content_type: &str,
    ) -> Result<u64, BlobError> {
        let size = tokio::fs::metadata(source)
            .await
            .map_err(|e| BlobError::local_io(source, e))?
            .len();

        // Streams from disk; the file is never read into memory as a whole
        let body = ByteStream::from_path(source)
            .await
            .map_err(|e| BlobError::local_io(source, std::io::Error::other(e)))?;

        debug!("PUT {}/{} ({} bytes, {})", container, blob, size, content_type);

        self.client
            .put_object()
            .bucket(container)
            .key(blob)
            .body(body)
            .content_type(content_type)
            .content_length(size as i64)
            .send()
            .await
            .map_err(|e| map_sdk_error("PUT", blob, e))?;

        Ok(size)
    }

    async fn open_blob(&self, container: &str, blob: &str) -> Result<BlobReader, BlobError> {
        debug!("GET {}/{}", container, blob);

        let response = self
            .client
            .get_object()
            .bucket(container)
            .key(blob)
            .send()
            .await
            .map_err(|e| map_sdk_error("GET", blob, e))?;

        Ok(Box::pin(response.body.into_async_read()))
    }

    async fn list_blobs(
        &self,
        container: &str,
        options: &ListOptions,
        cursor: Option<Cursor>,
    ) -> Result<ListPage, BlobError> {
        debug!("LIST {} prefix={:?} cursor={:?}", container, options.prefix, cursor);

        let response = self
            .client
            .list_objects_v2()
            .bucket(container)
            .set_prefix(options.prefix.clone())
            .set_max_keys(options.page_size_hint)
            .set_continuation_token(cursor.map(|c| c.as_str().to_string()))
            .send()
            .await
            .map_err(|e| map_sdk_error("LIST", container, e))?;

        let blobs = response
            .contents()
            .iter()
            .filter_map(|obj| {
                let key = obj.key()?;
                Some(BlobDescriptor {
                    name: key.to_string(),
                    uri: self.blob_uri(container, key),
                    size: obj.size().and_then(|s| u64::try_from(s).ok()),
                    last_modified: obj
                        .last_modified()
                        .and_then(|dt| DateTime::<Utc>::from_timestamp(dt.secs(), dt.subsec_nanos())),
                })
            })
            .collect();

        Ok(ListPage {
            blobs,
            next_cursor: response.next_continuation_token().map(Cursor::new),
        })
    }
}

/// Bucket policy letting anonymous callers read objects (not list them)
fn public_read_policy(bucket: &str) -> String {
    serde_json::json!({
        "Version": "2012-10-17",
        "Statement": [{
            "Sid": "PublicReadBlob",
            "Effect": "Allow",
            "Principal": { "AWS": ["*"] },
            "Action": ["s3:GetObject"],
            "Resource": [format!("arn:aws:s3:::{}/*", bucket)],
        }]
    })
    .to_string()
}

/// Codes and statuses meaning the bucket has no public access block to lift
fn public_access_block_absent(code: Option<&str>, status: Option<u16>) -> bool {
    matches!(
        code,
        Some("NoSuchPublicAccessBlockConfiguration") | Some("NotImplemented")
    ) || status == Some(501)
}

fn map_sdk_error<E, R>(operation: &str, target: &str, err: SdkError<E, R>) -> BlobError
where
    E: ProvideErrorMetadata + std::error::Error + 'static,
    R: std::fmt::Debug,
{
    let code = err
        .as_service_error()
        .and_then(|se| se.code())
        .map(str::to_string);

    match code.as_deref() {
        Some("NoSuchBucket") => BlobError::ContainerNotFound(target.to_string()),
        Some("NoSuchKey") | Some("NotFound") => BlobError::NotFound(target.to_string()),
        Some("BucketAlreadyExists") | Some("BucketAlreadyOwnedByYou") => {
            BlobError::ContainerAlreadyExists(target.to_string())
        }
        _ => BlobError::Service(format!(
            "{} {} failed: {}",
            operation,
            target,
            DisplayErrorContext(&err)
        )),
    }
}
