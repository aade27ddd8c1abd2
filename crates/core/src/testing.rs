//! In-memory object store for stateful client tests

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;

use crate::checksum;
use crate::error::{Error, Result};
use crate::metadata::Metadata;
use crate::traits::{
    BucketInfo, CopyRequest, ListPage, ListRequest, ObjectHead, ObjectInfo, ObjectStore,
    PutOptions,
};

#[derive(Debug, Clone)]
struct StoredObject {
    data: Vec<u8>,
    etag: String,
    metadata: Metadata,
}

/// A bucket/key map with S3-like listing, paging and copy semantics
#[derive(Debug, Default)]
pub struct InMemoryStore {
    objects: Mutex<BTreeMap<(String, String), StoredObject>>,
    failing_keys: Mutex<BTreeSet<String>>,
    calls: Mutex<Vec<String>>,
    page_size: usize,
    corrupt_uploads: AtomicU32,
    uploads: AtomicU32,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            page_size: 1000,
            ..Default::default()
        }
    }

    /// Return listings in pages of at most `page_size` entries
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn put(&self, bucket: &str, key: &str, data: &[u8]) {
        self.put_with_metadata(bucket, key, data, Metadata::new());
    }

    pub fn put_with_metadata(&self, bucket: &str, key: &str, data: &[u8], metadata: Metadata) {
        let object = StoredObject {
            data: data.to_vec(),
            etag: format!("{:x}", md5::compute(data)),
            metadata,
        };
        self.objects
            .lock()
            .unwrap()
            .insert((bucket.to_string(), key.to_string()), object);
    }

    /// Make head and delete requests for `key` fail
    pub fn fail_key(&self, key: &str) {
        self.failing_keys.lock().unwrap().insert(key.to_string());
    }

    /// Report a wrong ETag for the next `n` uploads
    pub fn corrupt_next_uploads(&self, n: u32) {
        self.corrupt_uploads.store(n, Ordering::SeqCst);
    }

    pub fn upload_count(&self) -> u32 {
        self.uploads.load(Ordering::SeqCst)
    }

    /// Every store call so far, as `op:bucket/key`
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn keys(&self, bucket: &str) -> Vec<String> {
        self.objects
            .lock()
            .unwrap()
            .keys()
            .filter(|(b, _)| b == bucket)
            .map(|(_, k)| k.clone())
            .collect()
    }

    pub fn metadata(&self, bucket: &str, key: &str) -> Option<Metadata> {
        self.objects
            .lock()
            .unwrap()
            .get(&(bucket.to_string(), key.to_string()))
            .map(|o| o.metadata.clone())
    }

    fn record(&self, op: &str, bucket: &str, key: &str) {
        self.calls
            .lock()
            .unwrap()
            .push(format!("{op}:{bucket}/{key}"));
    }

    fn check_failing(&self, key: &str) -> Result<()> {
        if self.failing_keys.lock().unwrap().contains(key) {
            return Err(Error::NotFound(format!("injected failure for {key}")));
        }
        Ok(())
    }

    fn get(&self, bucket: &str, key: &str) -> Result<StoredObject> {
        self.objects
            .lock()
            .unwrap()
            .get(&(bucket.to_string(), key.to_string()))
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("{bucket}/{key}")))
    }
}

enum Entry {
    Object(ObjectInfo),
    Prefix(String),
}

#[async_trait]
impl ObjectStore for InMemoryStore {
    async fn list_buckets(&self) -> Result<Vec<BucketInfo>> {
        self.record("list_buckets", "", "");
        let names: BTreeSet<String> = self
            .objects
            .lock()
            .unwrap()
            .keys()
            .map(|(b, _)| b.clone())
            .collect();
        Ok(names.into_iter().map(BucketInfo::new).collect())
    }

    async fn list_objects_page(&self, request: &ListRequest) -> Result<ListPage> {
        self.record("list", &request.bucket, &request.prefix);

        let mut entries = Vec::new();
        let mut seen_prefixes = BTreeSet::new();
        for ((bucket, key), object) in self.objects.lock().unwrap().iter() {
            if bucket != &request.bucket || !key.starts_with(&request.prefix) {
                continue;
            }
            let rest = &key[request.prefix.len()..];
            if let Some(delimiter) = &request.delimiter
                && let Some(pos) = rest.find(delimiter.as_str())
            {
                let common = format!("{}{}", request.prefix, &rest[..pos + delimiter.len()]);
                if seen_prefixes.insert(common.clone()) {
                    entries.push(Entry::Prefix(common));
                }
                continue;
            }
            let mut info = ObjectInfo::file(key.clone(), object.data.len() as i64);
            info.etag = Some(object.etag.clone());
            entries.push(Entry::Object(info));
        }

        let start: usize = match &request.continuation_token {
            Some(token) => token
                .parse()
                .map_err(|_| Error::InvalidInput(format!("bad token {token}")))?,
            None => 0,
        };
        let end = (start + self.page_size).min(entries.len());
        let truncated = end < entries.len();

        let mut page = ListPage {
            is_truncated: Some(truncated),
            next_continuation_token: truncated.then(|| end.to_string()),
            ..Default::default()
        };
        for entry in entries.drain(start.min(end)..end) {
            match entry {
                Entry::Object(info) => page.objects.push(info),
                Entry::Prefix(prefix) => page.common_prefixes.push(prefix),
            }
        }
        Ok(page)
    }

    async fn head_object(&self, bucket: &str, key: &str) -> Result<ObjectHead> {
        self.record("head", bucket, key);
        self.check_failing(key)?;
        let object = self.get(bucket, key)?;
        Ok(ObjectHead {
            size_bytes: object.data.len() as i64,
            etag: Some(object.etag),
            metadata: object.metadata,
            ..Default::default()
        })
    }

    async fn upload_file(
        &self,
        bucket: &str,
        key: &str,
        local_file: &Path,
        options: &PutOptions,
    ) -> Result<Option<String>> {
        self.record("upload", bucket, key);
        self.uploads.fetch_add(1, Ordering::SeqCst);

        let data = tokio::fs::read(local_file).await?;
        let mut etag = checksum::multipart_etag(local_file, options.transfer.multipart_chunksize)
            .await?
            .trim_matches('"')
            .to_string();
        let corrupt = self
            .corrupt_uploads
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if corrupt {
            etag = "corrupted".to_string();
        }

        self.objects.lock().unwrap().insert(
            (bucket.to_string(), key.to_string()),
            StoredObject {
                data,
                etag: etag.clone(),
                metadata: options.metadata.clone(),
            },
        );
        Ok(Some(etag))
    }

    async fn download_file(&self, bucket: &str, key: &str, dest: &Path) -> Result<u64> {
        self.record("download", bucket, key);
        let object = self.get(bucket, key)?;
        tokio::fs::write(dest, &object.data).await?;
        Ok(object.data.len() as u64)
    }

    async fn delete_object(&self, bucket: &str, key: &str) -> Result<()> {
        self.record("delete", bucket, key);
        self.check_failing(key)?;
        self.objects
            .lock()
            .unwrap()
            .remove(&(bucket.to_string(), key.to_string()));
        Ok(())
    }

    async fn copy_object(&self, request: &CopyRequest) -> Result<()> {
        self.record("copy", &request.source_bucket, &request.source_key);
        let mut object = self.get(&request.source_bucket, &request.source_key)?;
        if let Some(metadata) = &request.metadata {
            object.metadata = metadata.clone();
        }
        self.objects.lock().unwrap().insert(
            (request.dest_bucket.clone(), request.dest_key.clone()),
            object,
        );
        Ok(())
    }
}
