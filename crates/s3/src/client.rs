//! S3 client implementation
//!
//! Wraps aws-sdk-s3 and implements the ObjectStore trait from isd-core.

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use aws_config::profile::profile_file::{ProfileFileKind, ProfileFiles};
use aws_sdk_s3::error::{ProvideErrorMetadata, SdkError};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{CompletedMultipartUpload, CompletedPart, MetadataDirective};
use aws_smithy_runtime_api::client::orchestrator::HttpResponse;
use aws_smithy_types::DateTime;
use aws_smithy_types::byte_stream::Length;
use futures::stream::{self, StreamExt, TryStreamExt};
use jiff::Timestamp;
use tokio::io::AsyncWriteExt;

use isd_core::{
    BucketInfo, Config, CopyRequest, Error, ListPage, ListRequest, Metadata, ObjectHead,
    ObjectInfo, ObjectStore, PutOptions, Result, TransferConfig,
};

/// S3 client wrapper
pub struct S3Client {
    inner: aws_sdk_s3::Client,
}

impl S3Client {
    /// Create a new S3 client from the resolved configuration
    pub async fn new(config: &Config) -> Result<Self> {
        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(aws_config::Region::new(config.region.clone()))
            .endpoint_url(&config.s3_url);

        if let Some(creds) = &config.static_credentials {
            let credentials = aws_credential_types::Credentials::new(
                creds.access_key.clone(),
                creds.secret_key.clone(),
                None, // session token
                None, // expiry
                "isd-static-credentials",
            );
            loader = loader.credentials_provider(credentials);
        } else if let Some(path) = &config.credentials_file {
            if !path.is_file() {
                return Err(Error::Config(format!(
                    "credentials file not found: {}",
                    path.display()
                )));
            }
            let files = ProfileFiles::builder()
                .with_file(ProfileFileKind::Credentials, path)
                .build();
            loader = loader.profile_files(files);
        }

        let sdk_config = loader.load().await;

        // Path-style addressing for S3-compatible stores
        let s3_config = aws_sdk_s3::config::Builder::from(&sdk_config)
            .force_path_style(true)
            .build();

        tracing::debug!(endpoint = %config.s3_url, region = %config.region, "Created S3 client");
        Ok(Self {
            inner: aws_sdk_s3::Client::from_conf(s3_config),
        })
    }

    /// Get the underlying aws-sdk-s3 client
    pub fn inner(&self) -> &aws_sdk_s3::Client {
        &self.inner
    }

    /// Format AWS SDK error into a detailed error message
    fn format_sdk_error<E: std::fmt::Display>(error: &SdkError<E, HttpResponse>) -> String {
        match error {
            SdkError::ServiceError(service_err) => {
                let err = service_err.err();
                let meta = service_err.raw();
                let mut msg = format!("Service error: {}", err);
                // Try to extract additional error information from headers
                if let Some(code) = meta.headers().get("x-amz-error-code") {
                    msg.push_str(&format!(" (code: {})", code));
                }
                msg
            }
            SdkError::ConstructionFailure(err) => {
                format!("Request construction failed: {:?}", err)
            }
            SdkError::TimeoutError(_) => "Request timeout".to_string(),
            SdkError::DispatchFailure(err) => {
                format!("Network dispatch error: {:?}", err)
            }
            SdkError::ResponseError(err) => {
                format!("Response error: {:?}", err)
            }
            _ => error.to_string(),
        }
    }

    /// Map an SDK error onto the core error taxonomy
    fn map_sdk_error<E>(error: SdkError<E, HttpResponse>, context: &str) -> Error
    where
        E: ProvideErrorMetadata + std::fmt::Display,
    {
        let status = error.raw_response().map(|r| r.status().as_u16());
        let code = error.code().map(str::to_string);
        let message = Self::format_sdk_error(&error);
        classify_error(status, code.as_deref(), context, message)
    }

    async fn put_single(
        &self,
        bucket: &str,
        key: &str,
        local_file: &Path,
        content_type: &str,
        metadata: &Metadata,
    ) -> Result<Option<String>> {
        let body = ByteStream::from_path(local_file)
            .await
            .map_err(|e| Error::Io(std::io::Error::other(e)))?;

        let response = self
            .inner
            .put_object()
            .bucket(bucket)
            .key(key)
            .content_type(content_type)
            .set_metadata(sdk_metadata(metadata))
            .body(body)
            .send()
            .await
            .map_err(|e| Self::map_sdk_error(e, &format!("{bucket}/{key}")))?;

        Ok(response.e_tag().map(|e| e.trim_matches('"').to_string()))
    }

    async fn put_multipart(
        &self,
        bucket: &str,
        key: &str,
        local_file: &Path,
        size: u64,
        content_type: &str,
        options: &PutOptions,
    ) -> Result<Option<String>> {
        let context = format!("{bucket}/{key}");
        let create = self
            .inner
            .create_multipart_upload()
            .bucket(bucket)
            .key(key)
            .content_type(content_type)
            .set_metadata(sdk_metadata(&options.metadata))
            .send()
            .await
            .map_err(|e| Self::map_sdk_error(e, &context))?;

        let upload_id = create
            .upload_id()
            .ok_or_else(|| Error::General(format!("no upload id returned for {context}")))?
            .to_string();

        let parts = match self
            .upload_parts(bucket, key, &upload_id, local_file, size, &options.transfer)
            .await
        {
            Ok(parts) => parts,
            Err(e) => {
                tracing::warn!(key = %key, upload_id = %upload_id, error = %e, "Aborting multipart upload");
                if let Err(abort_err) = self
                    .inner
                    .abort_multipart_upload()
                    .bucket(bucket)
                    .key(key)
                    .upload_id(&upload_id)
                    .send()
                    .await
                {
                    tracing::warn!(
                        upload_id = %upload_id,
                        error = %Self::format_sdk_error(&abort_err),
                        "Failed to abort multipart upload"
                    );
                }
                return Err(e);
            }
        };

        let completed = CompletedMultipartUpload::builder()
            .set_parts(Some(parts))
            .build();
        let response = self
            .inner
            .complete_multipart_upload()
            .bucket(bucket)
            .key(key)
            .upload_id(&upload_id)
            .multipart_upload(completed)
            .send()
            .await
            .map_err(|e| Self::map_sdk_error(e, &context))?;

        Ok(response.e_tag().map(|e| e.trim_matches('"').to_string()))
    }

    async fn upload_parts(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        local_file: &Path,
        size: u64,
        transfer: &TransferConfig,
    ) -> Result<Vec<CompletedPart>> {
        let ranges = part_ranges(size, transfer.multipart_chunksize);
        tracing::debug!(key = %key, parts = ranges.len(), "Uploading parts");

        let mut parts: Vec<CompletedPart> = stream::iter(ranges)
            .map(|range| self.upload_part(bucket, key, upload_id, local_file, range))
            .buffer_unordered(transfer.max_concurrency.max(1))
            .try_collect()
            .await?;

        parts.sort_by_key(|p| p.part_number());
        Ok(parts)
    }

    async fn upload_part(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        local_file: &Path,
        range: PartRange,
    ) -> Result<CompletedPart> {
        let body = ByteStream::read_from()
            .path(local_file)
            .offset(range.offset)
            .length(Length::Exact(range.length))
            .build()
            .await
            .map_err(|e| Error::Io(std::io::Error::other(e)))?;

        let response = self
            .inner
            .upload_part()
            .bucket(bucket)
            .key(key)
            .upload_id(upload_id)
            .part_number(range.part_number)
            .content_length(range.length as i64)
            .body(body)
            .send()
            .await
            .map_err(|e| {
                Self::map_sdk_error(e, &format!("{bucket}/{key} part {}", range.part_number))
            })?;

        Ok(CompletedPart::builder()
            .part_number(range.part_number)
            .set_e_tag(response.e_tag().map(str::to_string))
            .build())
    }
}

#[async_trait]
impl ObjectStore for S3Client {
    async fn list_buckets(&self) -> Result<Vec<BucketInfo>> {
        let response = self
            .inner
            .list_buckets()
            .send()
            .await
            .map_err(|e| Self::map_sdk_error(e, "list buckets"))?;

        let buckets = response
            .buckets()
            .iter()
            .map(|b| BucketInfo {
                name: b.name().unwrap_or_default().to_string(),
                creation_date: b.creation_date().and_then(to_timestamp),
            })
            .collect();

        Ok(buckets)
    }

    async fn list_objects_page(&self, request: &ListRequest) -> Result<ListPage> {
        let mut builder = self
            .inner
            .list_objects_v2()
            .bucket(&request.bucket)
            .prefix(&request.prefix);

        if let Some(delimiter) = &request.delimiter {
            builder = builder.delimiter(delimiter);
        }
        if let Some(max) = request.max_keys {
            builder = builder.max_keys(max);
        }
        if let Some(token) = &request.continuation_token {
            builder = builder.continuation_token(token);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| Self::map_sdk_error(e, &format!("bucket {}", request.bucket)))?;

        let objects = response
            .contents()
            .iter()
            .map(|object| {
                let mut info = ObjectInfo::file(
                    object.key().unwrap_or_default(),
                    object.size().unwrap_or(0),
                );
                info.last_modified = object.last_modified().and_then(to_timestamp);
                info.etag = object.e_tag().map(|e| e.trim_matches('"').to_string());
                info.storage_class = object.storage_class().map(|sc| sc.as_str().to_string());
                info
            })
            .collect();

        let common_prefixes = response
            .common_prefixes()
            .iter()
            .filter_map(|p| p.prefix().map(str::to_string))
            .collect();

        Ok(ListPage {
            objects,
            common_prefixes,
            is_truncated: response.is_truncated(),
            next_continuation_token: response.next_continuation_token().map(str::to_string),
        })
    }

    async fn head_object(&self, bucket: &str, key: &str) -> Result<ObjectHead> {
        let response = self
            .inner
            .head_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| Self::map_sdk_error(e, &format!("{bucket}/{key}")))?;

        Ok(ObjectHead {
            size_bytes: response.content_length().unwrap_or(0),
            etag: response.e_tag().map(|e| e.trim_matches('"').to_string()),
            content_type: response.content_type().map(str::to_string),
            last_modified: response.last_modified().and_then(to_timestamp),
            metadata: response
                .metadata()
                .map(|m| m.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
                .unwrap_or_default(),
        })
    }

    async fn upload_file(
        &self,
        bucket: &str,
        key: &str,
        local_file: &Path,
        options: &PutOptions,
    ) -> Result<Option<String>> {
        let size = tokio::fs::metadata(local_file).await?.len();
        let content_type = options.content_type.clone().unwrap_or_else(|| {
            mime_guess::from_path(local_file)
                .first_or_octet_stream()
                .to_string()
        });

        if options.transfer.part_count(size) <= 1 {
            self.put_single(bucket, key, local_file, &content_type, &options.metadata)
                .await
        } else {
            self.put_multipart(bucket, key, local_file, size, &content_type, options)
                .await
        }
    }

    async fn download_file(&self, bucket: &str, key: &str, dest: &Path) -> Result<u64> {
        let response = self
            .inner
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| Self::map_sdk_error(e, &format!("{bucket}/{key}")))?;

        let mut reader = response.body.into_async_read();
        let mut file = tokio::fs::File::create(dest).await?;
        let written = match tokio::io::copy(&mut reader, &mut file).await {
            Ok(n) => n,
            Err(e) => {
                drop(file);
                let _ = tokio::fs::remove_file(dest).await;
                return Err(Error::Network(format!("download of {bucket}/{key} failed: {e}")));
            }
        };
        file.flush().await?;

        Ok(written)
    }

    async fn delete_object(&self, bucket: &str, key: &str) -> Result<()> {
        self.inner
            .delete_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| Self::map_sdk_error(e, &format!("{bucket}/{key}")))?;

        Ok(())
    }

    async fn copy_object(&self, request: &CopyRequest) -> Result<()> {
        let copy_source = copy_source(&request.source_bucket, &request.source_key);

        let mut builder = self
            .inner
            .copy_object()
            .copy_source(&copy_source)
            .bucket(&request.dest_bucket)
            .key(&request.dest_key);

        builder = match &request.metadata {
            Some(metadata) => builder
                .metadata_directive(MetadataDirective::Replace)
                .set_metadata(Some(to_hash_map(metadata))),
            None => builder.metadata_directive(MetadataDirective::Copy),
        };

        builder
            .send()
            .await
            .map_err(|e| Self::map_sdk_error(e, &copy_source))?;

        Ok(())
    }
}

/// `x-amz-copy-source` value: the key is percent-encoded, its `/` kept
fn copy_source(bucket: &str, key: &str) -> String {
    let key: Vec<_> = key.split('/').map(urlencoding::encode).collect();
    format!("{bucket}/{}", key.join("/"))
}

/// One part of a multipart upload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PartRange {
    part_number: i32,
    offset: u64,
    length: u64,
}

/// Split `size` bytes into consecutive parts of `chunk_size`, numbered from 1
fn part_ranges(size: u64, chunk_size: u64) -> Vec<PartRange> {
    let chunk_size = chunk_size.max(1);
    let mut ranges = Vec::new();
    let mut offset = 0;
    let mut part_number = 1;
    while offset < size {
        let length = chunk_size.min(size - offset);
        ranges.push(PartRange {
            part_number,
            offset,
            length,
        });
        offset += length;
        part_number += 1;
    }
    ranges
}

fn classify_error(status: Option<u16>, code: Option<&str>, context: &str, message: String) -> Error {
    let message = format!("{context}: {message}");
    match (status, code) {
        (Some(404), _) | (_, Some("NoSuchKey" | "NoSuchBucket" | "NotFound")) => {
            Error::NotFound(message)
        }
        (Some(401 | 403), _)
        | (_, Some("AccessDenied" | "InvalidAccessKeyId" | "SignatureDoesNotMatch")) => {
            Error::Auth(message)
        }
        _ => Error::Network(message),
    }
}

fn to_hash_map(metadata: &Metadata) -> HashMap<String, String> {
    metadata
        .iter()
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

fn sdk_metadata(metadata: &Metadata) -> Option<HashMap<String, String>> {
    (!metadata.is_empty()).then(|| to_hash_map(metadata))
}

fn to_timestamp(dt: &DateTime) -> Option<Timestamp> {
    Timestamp::new(dt.secs(), dt.subsec_nanos() as i32).ok()
}
