//! The object-store client façade
//!
//! [`StoreClient`] is the session every command goes through. It owns the
//! store handle, the default bucket and the transfer/verification settings,
//! and turns each high-level operation into paged listings and single-object
//! calls on the [`ObjectStore`].

use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use serde::Serialize;

use crate::block_size::parse_block_size;
use crate::checksum;
use crate::error::{Error, Result};
use crate::filter::{self, ListingMode};
use crate::metadata::{CONTENT_MD5_KEY, Metadata, add_required_metadata};
use crate::pagination::{list_all, list_directory};
use crate::retry::{RetryConfig, is_retryable_error, retry_with_backoff};
use crate::traits::{
    BucketInfo, CopyRequest, ObjectHead, ObjectInfo, ObjectStore, PutOptions, TransferConfig,
};
use crate::uploader::{self, BatchReport, BatchUploadOptions};

/// Shape of an object listing
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListObjectsOptions {
    pub prefix: String,
    /// Start-anchored key regex; incompatible with `single_level`
    pub regex: Option<String>,
    /// Only entries directly under the prefix, directories first
    pub single_level: bool,
    pub keys_only: bool,
}

/// A listing as returned to callers
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Listing {
    Objects(Vec<ObjectInfo>),
    Keys(Vec<String>),
}

impl Listing {
    pub fn len(&self) -> usize {
        match self {
            Listing::Objects(objects) => objects.len(),
            Listing::Keys(keys) => keys.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Keys in listing order
    pub fn keys(&self) -> Vec<&str> {
        match self {
            Listing::Objects(objects) => objects.iter().map(|o| o.key.as_str()).collect(),
            Listing::Keys(keys) => keys.iter().map(String::as_str).collect(),
        }
    }
}

/// Total size of a set of objects in `units`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiskUsage {
    pub disk_usage: f64,
    pub units: String,
}

/// A single-file upload
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UploadRequest {
    pub local_file: PathBuf,
    pub key: String,
    pub metadata: Option<Metadata>,
    /// Record the whole-file MD5 under `ContentMD5`
    pub md5: bool,
    /// Compare the store's ETag with the local multipart ETag
    pub verify: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UploadResult {
    pub bucket: String,
    pub key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub etag: Option<String>,
    pub attempts: u32,
    pub verified: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DownloadResult {
    pub result: String,
    pub bucket: String,
    pub key: String,
    pub path: PathBuf,
    pub bytes: u64,
}

/// A key that could not be processed and why
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KeyFailure {
    pub key: String,
    pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DeleteReport {
    pub bucket: String,
    pub dry_run: bool,
    /// Deleted keys, or the keys that would be deleted on a dry run
    pub deleted: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub failed: Vec<KeyFailure>,
}

impl DeleteReport {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Source and destination of a copy or move
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CopyOptions {
    pub source_key: String,
    pub dest_key: String,
    /// Falls back to the default bucket
    pub source_bucket: Option<String>,
    /// Falls back to the source bucket
    pub dest_bucket: Option<String>,
    /// Replace the destination metadata instead of carrying it over
    pub metadata: Option<Metadata>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CopyResult {
    pub source_bucket: String,
    pub source_key: String,
    pub dest_bucket: String,
    pub dest_key: String,
    pub metadata_replaced: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MovedObject {
    pub source_key: String,
    pub dest_key: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MoveReport {
    pub source_bucket: String,
    pub dest_bucket: String,
    pub moved: Vec<MovedObject>,
}

/// Session over one object store
#[derive(Clone)]
pub struct StoreClient {
    store: Arc<dyn ObjectStore>,
    default_bucket: Option<String>,
    transfer: TransferConfig,
    retry: RetryConfig,
}

impl std::fmt::Debug for StoreClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreClient")
            .field("default_bucket", &self.default_bucket)
            .field("transfer", &self.transfer)
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

impl StoreClient {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self {
            store,
            default_bucket: None,
            transfer: TransferConfig::default(),
            retry: RetryConfig::default(),
        }
    }

    pub fn with_default_bucket(mut self, bucket: Option<String>) -> Self {
        self.default_bucket = bucket.filter(|b| !b.is_empty());
        self
    }

    pub fn with_transfer(mut self, transfer: TransferConfig) -> Self {
        self.transfer = transfer;
        self
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn default_bucket(&self) -> Option<&str> {
        self.default_bucket.as_deref()
    }

    pub fn transfer(&self) -> &TransferConfig {
        &self.transfer
    }

    /// Explicit bucket, else the default bucket, else a configuration error
    pub fn resolve_bucket(&self, bucket: Option<&str>) -> Result<String> {
        bucket
            .filter(|b| !b.is_empty())
            .or(self.default_bucket.as_deref())
            .map(str::to_string)
            .ok_or_else(|| {
                Error::Config(format!(
                    "no bucket given and no default bucket configured (set {} or use --default_bucket)",
                    crate::config::ENV_DEFAULT_BUCKET
                ))
            })
    }

    pub async fn list_buckets(&self) -> Result<Vec<BucketInfo>> {
        self.store.list_buckets().await
    }

    pub async fn bucket_names(&self) -> Result<Vec<String>> {
        Ok(self
            .list_buckets()
            .await?
            .into_iter()
            .map(|b| b.name)
            .collect())
    }

    pub async fn list_objects(
        &self,
        bucket: Option<&str>,
        options: &ListObjectsOptions,
    ) -> Result<Listing> {
        let mode = ListingMode::from_flags(options.regex.as_deref(), options.single_level)?;
        let bucket = self.resolve_bucket(bucket)?;
        let objects = self.collect_objects(&bucket, &options.prefix, mode).await?;
        tracing::debug!(bucket = %bucket, prefix = %options.prefix, count = objects.len(), "Listed objects");

        if options.keys_only {
            Ok(Listing::Keys(objects.into_iter().map(|o| o.key).collect()))
        } else {
            Ok(Listing::Objects(objects))
        }
    }

    async fn collect_objects(
        &self,
        bucket: &str,
        prefix: &str,
        mode: ListingMode,
    ) -> Result<Vec<ObjectInfo>> {
        match mode {
            ListingMode::Recursive => list_all(self.store.as_ref(), bucket, prefix).await,
            ListingMode::Regex(regex) => Ok(filter::filter_regex(
                list_all(self.store.as_ref(), bucket, prefix).await?,
                &regex,
            )),
            ListingMode::SingleLevel => list_directory(self.store.as_ref(), bucket, prefix).await,
        }
    }

    /// Sum of object sizes under `prefix`, divided by the block size
    pub async fn disk_usage(
        &self,
        bucket: Option<&str>,
        prefix: &str,
        regex: Option<&str>,
        block_size: &str,
    ) -> Result<DiskUsage> {
        let mode = ListingMode::from_flags(regex, false)?;
        let bucket = self.resolve_bucket(bucket)?;
        let divisor = parse_block_size(block_size) as f64;
        let objects = self.collect_objects(&bucket, prefix, mode).await?;

        let disk_usage = objects
            .iter()
            .map(|o| o.size_bytes as f64 / divisor)
            .sum();
        Ok(DiskUsage {
            disk_usage,
            units: block_size.to_string(),
        })
    }

    pub async fn head(&self, bucket: Option<&str>, key: &str) -> Result<ObjectHead> {
        let bucket = self.resolve_bucket(bucket)?;
        self.store.head_object(&bucket, key).await
    }

    pub async fn get_metadata(&self, bucket: Option<&str>, key: &str) -> Result<Metadata> {
        Ok(self.head(bucket, key).await?.metadata)
    }

    /// Upload one file, optionally verifying the stored ETag.
    ///
    /// With verification on, a mismatch uploads the file again with
    /// exponential backoff until the retry ceiling, after which the last
    /// [`Error::Integrity`] is returned.
    pub async fn upload_object(
        &self,
        bucket: Option<&str>,
        request: UploadRequest,
    ) -> Result<UploadResult> {
        let bucket = self.resolve_bucket(bucket)?;

        let mut metadata = request.metadata.clone().unwrap_or_default();
        add_required_metadata(&mut metadata);
        if request.md5 {
            let digest = checksum::md5_file(&request.local_file).await?;
            metadata.insert(CONTENT_MD5_KEY.to_string(), digest);
        }
        let options = PutOptions {
            metadata,
            content_type: None,
            transfer: self.transfer,
        };

        tracing::info!(
            bucket = %bucket,
            key = %request.key,
            file = %request.local_file.display(),
            "Uploading object"
        );

        if !request.verify {
            let etag = self
                .store
                .upload_file(&bucket, &request.key, &request.local_file, &options)
                .await?;
            return Ok(UploadResult {
                bucket,
                key: request.key,
                etag: etag.map(|e| e.trim_matches('"').to_string()),
                attempts: 1,
                verified: false,
            });
        }

        let expected =
            checksum::multipart_etag(&request.local_file, self.transfer.multipart_chunksize)
                .await?;

        let (bucket_ref, request_ref, options_ref, expected_ref) =
            (bucket.as_str(), &request, &options, expected.as_str());
        let (etag, attempts) = retry_with_backoff(
            &self.retry,
            move |attempt| async move {
                let etag = self
                    .upload_and_verify(bucket_ref, request_ref, options_ref, expected_ref, attempt)
                    .await?;
                Ok((etag, attempt))
            },
            is_retryable_error,
        )
        .await?;

        Ok(UploadResult {
            bucket,
            key: request.key,
            etag: Some(etag),
            attempts,
            verified: true,
        })
    }

    async fn upload_and_verify(
        &self,
        bucket: &str,
        request: &UploadRequest,
        options: &PutOptions,
        expected: &str,
        attempt: u32,
    ) -> Result<String> {
        self.store
            .upload_file(bucket, &request.key, &request.local_file, options)
            .await?;

        let head = self.store.head_object(bucket, &request.key).await?;
        let actual = head.etag.unwrap_or_default();
        if checksum::etags_match(&actual, expected) {
            tracing::debug!(key = %request.key, attempt, "Upload verified");
            return Ok(actual.trim_matches('"').to_string());
        }

        tracing::warn!(
            key = %request.key,
            attempt,
            expected = %expected,
            actual = %actual,
            "Stored ETag does not match local checksum"
        );
        Err(Error::Integrity {
            key: request.key.clone(),
            expected: expected.trim_matches('"').to_string(),
            actual: actual.trim_matches('"').to_string(),
            attempts: attempt,
        })
    }

    /// Upload every file of a directory; see [`uploader::upload_batch`]
    pub async fn upload_mult_objects(
        &self,
        bucket: Option<&str>,
        options: BatchUploadOptions,
    ) -> Result<BatchReport> {
        uploader::upload_batch(self, bucket, options).await
    }

    /// Download `key` into `local_dir`, named after the key's last segment
    /// unless `local_filename` is given
    pub async fn get_object(
        &self,
        bucket: Option<&str>,
        key: &str,
        local_dir: &Path,
        local_filename: Option<&str>,
    ) -> Result<DownloadResult> {
        let bucket = self.resolve_bucket(bucket)?;
        let filename = match local_filename {
            Some(name) if !name.is_empty() => name,
            _ => key.rsplit('/').next().unwrap_or(key),
        };
        if filename.is_empty() {
            return Err(Error::InvalidInput(format!(
                "cannot derive a local file name from key '{key}'"
            )));
        }

        tokio::fs::create_dir_all(local_dir).await?;
        let path = local_dir.join(filename);
        tracing::info!(bucket = %bucket, key = %key, dest = %path.display(), "Downloading object");
        let bytes = self.store.download_file(&bucket, key, &path).await?;

        Ok(DownloadResult {
            result: "successful".to_string(),
            bucket,
            key: key.to_string(),
            path,
            bytes,
        })
    }

    /// Delete the given keys.
    ///
    /// A single key propagates its error; with several keys each failure is
    /// recorded and the remaining keys are still attempted.
    pub async fn delete(
        &self,
        bucket: Option<&str>,
        keys: &[String],
        dry_run: bool,
    ) -> Result<DeleteReport> {
        if keys.is_empty() {
            return Err(Error::Precondition("no keys given to delete".to_string()));
        }
        let bucket = self.resolve_bucket(bucket)?;
        let mut report = DeleteReport {
            bucket: bucket.clone(),
            dry_run,
            ..Default::default()
        };

        for key in keys {
            if dry_run {
                tracing::info!(bucket = %bucket, key = %key, "(dry run) would delete");
                report.deleted.push(key.clone());
                continue;
            }

            match self.store.delete_object(&bucket, key).await {
                Ok(()) => {
                    tracing::info!(bucket = %bucket, key = %key, "Deleted object");
                    report.deleted.push(key.clone());
                }
                Err(e) if keys.len() == 1 => return Err(e),
                Err(e) => {
                    tracing::warn!(bucket = %bucket, key = %key, error = %e, "Delete failed");
                    report.failed.push(KeyFailure {
                        key: key.clone(),
                        error: e.to_string(),
                    });
                }
            }
        }

        Ok(report)
    }

    /// Delete every key under `prefix`.
    ///
    /// Non-recursive deletes only touch keys directly under the prefix and
    /// cannot be combined with a regex.
    pub async fn delete_mult(
        &self,
        bucket: Option<&str>,
        prefix: &str,
        regex: Option<&str>,
        recursive: bool,
        dry_run: bool,
    ) -> Result<DeleteReport> {
        let mode = ListingMode::from_flags(regex, !recursive)?;
        let bucket = self.resolve_bucket(bucket)?;

        let objects = list_all(self.store.as_ref(), &bucket, prefix).await?;
        let objects = match mode {
            ListingMode::Recursive => objects,
            ListingMode::Regex(regex) => filter::filter_regex(objects, &regex),
            ListingMode::SingleLevel => filter::single_level(objects, prefix),
        };
        let keys: Vec<String> = objects.into_iter().map(|o| o.key).collect();

        if keys.is_empty() {
            tracing::info!(bucket = %bucket, prefix = %prefix, "No matching keys to delete");
            return Ok(DeleteReport {
                bucket,
                dry_run,
                ..Default::default()
            });
        }

        self.delete(Some(&bucket), &keys, dry_run).await
    }

    /// Server-side copy.
    ///
    /// With metadata the destination's metadata is replaced (required keys
    /// injected); without, the source metadata is carried over.
    pub async fn copy_object(&self, options: &CopyOptions) -> Result<CopyResult> {
        let source_bucket = self.resolve_bucket(options.source_bucket.as_deref())?;
        let dest_bucket = options
            .dest_bucket
            .clone()
            .filter(|b| !b.is_empty())
            .unwrap_or_else(|| source_bucket.clone());

        self.copy_resolved(
            &source_bucket,
            &options.source_key,
            &dest_bucket,
            &options.dest_key,
            options.metadata.clone(),
        )
        .await
    }

    async fn copy_resolved(
        &self,
        source_bucket: &str,
        source_key: &str,
        dest_bucket: &str,
        dest_key: &str,
        metadata: Option<Metadata>,
    ) -> Result<CopyResult> {
        let metadata = metadata.map(|mut m| {
            add_required_metadata(&mut m);
            m
        });
        let metadata_replaced = metadata.is_some();

        tracing::info!(
            source = %format!("{source_bucket}/{source_key}"),
            dest = %format!("{dest_bucket}/{dest_key}"),
            replace_metadata = metadata_replaced,
            "Copying object"
        );
        self.store
            .copy_object(&CopyRequest {
                source_bucket: source_bucket.to_string(),
                source_key: source_key.to_string(),
                dest_bucket: dest_bucket.to_string(),
                dest_key: dest_key.to_string(),
                metadata,
            })
            .await?;

        Ok(CopyResult {
            source_bucket: source_bucket.to_string(),
            source_key: source_key.to_string(),
            dest_bucket: dest_bucket.to_string(),
            dest_key: dest_key.to_string(),
            metadata_replaced,
        })
    }

    /// Replace an object's metadata by copying it onto itself
    pub async fn replace_metadata(
        &self,
        bucket: Option<&str>,
        key: &str,
        metadata: Metadata,
    ) -> Result<CopyResult> {
        let bucket = self.resolve_bucket(bucket)?;
        self.copy_resolved(&bucket, key, &bucket, key, Some(metadata))
            .await
    }

    /// Move every object under `source_key` to `dest_key`.
    ///
    /// Each match keeps the part of its key after `source_key`, so moving
    /// `old/` to `new/` maps `old/a` to `new/a`.
    pub async fn move_object(&self, options: &CopyOptions) -> Result<MoveReport> {
        let source_bucket = self.resolve_bucket(options.source_bucket.as_deref())?;
        let dest_bucket = options
            .dest_bucket
            .clone()
            .filter(|b| !b.is_empty())
            .unwrap_or_else(|| source_bucket.clone());

        let matches = list_all(self.store.as_ref(), &source_bucket, &options.source_key).await?;
        if matches.is_empty() {
            return Err(Error::Precondition(format!(
                "no objects found under {source_bucket}/{}",
                options.source_key
            )));
        }

        let mut moved = Vec::with_capacity(matches.len());
        for object in matches {
            let suffix = object
                .key
                .strip_prefix(options.source_key.as_str())
                .unwrap_or_default();
            let dest_key = format!("{}{suffix}", options.dest_key);

            self.copy_resolved(
                &source_bucket,
                &object.key,
                &dest_bucket,
                &dest_key,
                options.metadata.clone(),
            )
            .await?;
            // Copied onto itself: the copy is the object now
            if source_bucket != dest_bucket || dest_key != object.key {
                self.store.delete_object(&source_bucket, &object.key).await?;
            }
            moved.push(MovedObject {
                source_key: object.key,
                dest_key,
            });
        }

        Ok(MoveReport {
            source_bucket,
            dest_bucket,
            moved,
        })
    }

    /// Keys (optionally regex filtered) whose metadata contains `metadata_key`.
    ///
    /// Objects whose metadata cannot be read are logged and skipped.
    pub async fn search_metadata(
        &self,
        bucket: Option<&str>,
        regex: Option<&str>,
        metadata_key: &str,
    ) -> Result<Vec<String>> {
        let options = ListObjectsOptions {
            regex: regex.map(str::to_string),
            keys_only: true,
            ..Default::default()
        };
        let bucket = self.resolve_bucket(bucket)?;
        let listing = self.list_objects(Some(&bucket), &options).await?;
        let keys: Vec<String> = listing.keys().into_iter().map(str::to_string).collect();

        let bucket = bucket.as_str();
        let heads: Vec<(String, Result<ObjectHead>)> = stream::iter(keys)
            .map(move |key| async move {
                let head = self.store.head_object(bucket, &key).await;
                (key, head)
            })
            .buffered(self.transfer.max_concurrency.max(1))
            .collect()
            .await;

        let mut matching = Vec::new();
        for (key, head) in heads {
            match head {
                Ok(head) if head.metadata.contains_key(metadata_key) => matching.push(key),
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(bucket = %bucket, key = %key, error = %e, "Skipping object, metadata unavailable");
                }
            }
        }
        Ok(matching)
    }
}
