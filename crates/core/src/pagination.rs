//! Continuation-token pagination over object listings
//!
//! Pages are requested strictly one after another, each with the token the
//! previous page returned. The loop ends when the store stops reporting
//! truncation, and also when a truncated page carries no usable token, so a
//! misbehaving store can never make a listing spin forever.

use futures::stream::{self, Stream, TryStreamExt};

use crate::error::{Error, Result};
use crate::traits::{ListPage, ListRequest, ObjectInfo, ObjectStore};

/// Stream every page of a listing, lazily
pub fn page_stream<S>(store: &S, request: ListRequest) -> impl Stream<Item = Result<ListPage>> + '_
where
    S: ObjectStore + ?Sized,
{
    stream::try_unfold(Some(request), move |state| async move {
        let Some(request) = state else {
            return Ok::<_, Error>(None);
        };

        tracing::debug!(
            bucket = %request.bucket,
            prefix = %request.prefix,
            token = ?request.continuation_token,
            "Requesting listing page"
        );
        let page = store.list_objects_page(&request).await?;
        let next = next_request(request, &page);
        Ok::<_, Error>(Some((page, next)))
    })
}

/// Stream every object record under the request's prefix, lazily
pub fn object_stream<S>(store: &S, request: ListRequest) -> impl Stream<Item = Result<ObjectInfo>> + '_
where
    S: ObjectStore + ?Sized,
{
    page_stream(store, request)
        .map_ok(|page| stream::iter(page.objects.into_iter().map(Ok)))
        .try_flatten()
}

/// Materialize the complete listing of `bucket` under `prefix`
pub async fn list_all<S>(store: &S, bucket: &str, prefix: &str) -> Result<Vec<ObjectInfo>>
where
    S: ObjectStore + ?Sized,
{
    object_stream(store, ListRequest::new(bucket, prefix))
        .try_collect()
        .await
}

/// Single-level listing using the store's `/` delimiter grouping.
///
/// Common prefixes come first as directory entries, followed by the objects
/// directly under `prefix`.
pub async fn list_directory<S>(store: &S, bucket: &str, prefix: &str) -> Result<Vec<ObjectInfo>>
where
    S: ObjectStore + ?Sized,
{
    let request = ListRequest::new(bucket, prefix).with_delimiter("/");
    let pages: Vec<ListPage> = page_stream(store, request).try_collect().await?;

    let mut dirs = Vec::new();
    let mut files = Vec::new();
    for page in pages {
        dirs.extend(page.common_prefixes.into_iter().map(ObjectInfo::dir));
        files.extend(page.objects);
    }
    dirs.extend(files);
    Ok(dirs)
}

fn next_request(mut request: ListRequest, page: &ListPage) -> Option<ListRequest> {
    if page.is_truncated != Some(true) {
        return None;
    }

    match &page.next_continuation_token {
        None => {
            tracing::warn!(
                bucket = %request.bucket,
                "Truncated listing page without continuation token; stopping"
            );
            None
        }
        Some(token) if request.continuation_token.as_ref() == Some(token) => {
            tracing::warn!(
                bucket = %request.bucket,
                "Store repeated the previous continuation token; stopping"
            );
            None
        }
        Some(token) => {
            request.continuation_token = Some(token.clone());
            Some(request)
        }
    }
}
