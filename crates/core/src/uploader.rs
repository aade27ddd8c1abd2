//! Directory batch upload
//!
//! Files are discovered up front, mapped to keys, and uploaded by a bounded
//! pool of tasks. A failing file is recorded in the [`BatchReport`] and never
//! stops the others; only configuration problems (no bucket, unusable
//! directory) abort the batch, and they do so before the first upload.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use walkdir::WalkDir;

use crate::client::{StoreClient, UploadRequest, UploadResult};
use crate::error::{Error, Result};
use crate::metadata::MetadataSource;

/// Options for [`upload_batch`]
#[derive(Debug, Clone, Default)]
pub struct BatchUploadOptions {
    pub local_dir: PathBuf,
    pub recursive: bool,
    /// Skip files whose full path contains any of these substrings
    pub ignore: Vec<String>,
    /// Prepended verbatim to each relative path
    pub key_prefix: String,
    pub metadata: Option<MetadataSource>,
    pub dry_run: bool,
    pub verify: bool,
    pub md5: bool,
    /// Concurrent uploads; defaults to the available parallelism
    pub workers: Option<usize>,
}

/// A file and the key it uploads to
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlannedUpload {
    pub local_file: PathBuf,
    pub key: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UploadFailure {
    pub local_file: PathBuf,
    pub key: String,
    pub error: String,
}

/// Outcome of a batch upload, sorted by key
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    pub bucket: String,
    pub dry_run: bool,
    pub planned: Vec<PlannedUpload>,
    pub uploaded: Vec<UploadResult>,
    pub failed: Vec<UploadFailure>,
}

impl BatchReport {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Worker count used when none is configured
pub fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

/// Regular files under `root` in a deterministic order.
///
/// Non-recursive discovery only looks at `root` itself. Symlinks are not
/// followed.
pub fn discover_files(root: &Path, recursive: bool, ignore: &[String]) -> Result<Vec<PathBuf>> {
    if !root.is_dir() {
        return Err(Error::Config(format!(
            "local directory does not exist: {}",
            root.display()
        )));
    }

    let mut walker = WalkDir::new(root).follow_links(false).sort_by_file_name();
    if !recursive {
        walker = walker.max_depth(1);
    }

    let mut files = Vec::new();
    for entry in walker {
        let entry = entry.map_err(|e| Error::Io(e.into()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.into_path();
        let full = path.to_string_lossy();
        if let Some(pattern) = ignore.iter().find(|p| full.contains(p.as_str())) {
            tracing::debug!(file = %full, pattern = %pattern, "Ignoring file");
            continue;
        }
        files.push(path);
    }
    Ok(files)
}

/// `prefix` followed by the `/`-separated path of `file` relative to `root`
pub fn derive_key(root: &Path, file: &Path, prefix: &str) -> Result<String> {
    let relative = file.strip_prefix(root).map_err(|_| {
        Error::InvalidInput(format!(
            "{} is not under {}",
            file.display(),
            root.display()
        ))
    })?;
    let segments: Vec<String> = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    Ok(format!("{prefix}{}", segments.join("/")))
}

/// Plan every upload of a batch without touching the store
pub fn plan_uploads(options: &BatchUploadOptions) -> Result<Vec<PlannedUpload>> {
    discover_files(&options.local_dir, options.recursive, &options.ignore)?
        .into_iter()
        .map(|local_file| {
            let key = derive_key(&options.local_dir, &local_file, &options.key_prefix)?;
            Ok(PlannedUpload { local_file, key })
        })
        .collect()
}

/// Upload a directory through `client`
pub async fn upload_batch(
    client: &StoreClient,
    bucket: Option<&str>,
    options: BatchUploadOptions,
) -> Result<BatchReport> {
    let bucket = client.resolve_bucket(bucket)?;
    let planned = plan_uploads(&options)?;

    tracing::info!(
        bucket = %bucket,
        dir = %options.local_dir.display(),
        files = planned.len(),
        dry_run = options.dry_run,
        "Starting batch upload"
    );

    if options.dry_run {
        for job in &planned {
            tracing::info!(
                "(dry run) would upload {} to {bucket}/{}",
                job.local_file.display(),
                job.key
            );
        }
        return Ok(BatchReport {
            bucket,
            dry_run: true,
            planned,
            ..Default::default()
        });
    }

    let workers = options.workers.unwrap_or_else(default_workers).max(1);
    let semaphore = Arc::new(Semaphore::new(workers));
    let mut tasks = JoinSet::new();

    for job in planned.iter().cloned() {
        let permit = semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|e| Error::General(format!("upload pool closed: {e}")))?;
        let client = client.clone();
        let bucket = bucket.clone();
        let metadata = options.metadata.clone();
        let (verify, md5) = (options.verify, options.md5);

        tasks.spawn(async move {
            let _permit = permit;
            let outcome = upload_one(&client, &bucket, &job, metadata.as_ref(), verify, md5).await;
            (job, outcome)
        });
    }

    let mut report = BatchReport {
        bucket,
        planned,
        ..Default::default()
    };
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((_, Ok(result))) => report.uploaded.push(result),
            Ok((job, Err(e))) => {
                tracing::error!(file = %job.local_file.display(), key = %job.key, error = %e, "Upload failed");
                report.failed.push(UploadFailure {
                    local_file: job.local_file,
                    key: job.key,
                    error: e.to_string(),
                });
            }
            Err(e) => {
                return Err(Error::General(format!("upload task panicked: {e}")));
            }
        }
    }

    report.uploaded.sort_by(|a, b| a.key.cmp(&b.key));
    report.failed.sort_by(|a, b| a.key.cmp(&b.key));
    tracing::info!(
        uploaded = report.uploaded.len(),
        failed = report.failed.len(),
        "Batch upload finished"
    );
    Ok(report)
}

async fn upload_one(
    client: &StoreClient,
    bucket: &str,
    job: &PlannedUpload,
    metadata: Option<&MetadataSource>,
    verify: bool,
    md5: bool,
) -> Result<UploadResult> {
    let metadata = match metadata {
        Some(source) => Some(source.metadata_for(&job.local_file).await?),
        None => None,
    };
    client
        .upload_object(
            Some(bucket),
            UploadRequest {
                local_file: job.local_file.clone(),
                key: job.key.clone(),
                metadata,
                md5,
                verify,
            },
        )
        .await
}
