use std::future::Future;
use tracing::debug;

use crate::collect::UniqueById;
use crate::error::{Result, SyncError};
use crate::types::{Identified, RemoteId};

/// Fetch records for `ids` in batches of at most `chunk_size`.
///
/// Batches keep the order of `ids` and run one after another. The merged
/// result holds each record once, in order of first appearance. The first
/// failing batch aborts the whole fetch.
pub async fn fetch_chunks<T, F, Fut>(
    ids: &[RemoteId],
    chunk_size: usize,
    mut fetch_one_chunk: F,
) -> Result<Vec<T>>
where
    T: Identified,
    F: FnMut(Vec<RemoteId>) -> Fut,
    Fut: Future<Output = Result<Vec<T>>>,
{
    if chunk_size == 0 {
        return Err(SyncError::InvalidArgument(
            "chunk size must be greater than zero".to_string(),
        ));
    }

    let mut merged = UniqueById::new();
    for (index, chunk) in ids.chunks(chunk_size).enumerate() {
        debug!(chunk = index + 1, size = chunk.len(), "Fetching id chunk");
        let records = fetch_one_chunk(chunk.to_vec()).await?;
        merged.extend(records);
    }
    Ok(merged.into_vec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Debug, Clone, PartialEq)]
    struct Item(RemoteId);

    impl Identified for Item {
        fn remote_id(&self) -> RemoteId {
            self.0
        }
    }

    #[tokio::test]
    async fn splits_into_ceil_chunks() {
        let ids: Vec<RemoteId> = (1..=250).collect();
        let seen = Mutex::new(Vec::new());

        let items = fetch_chunks(&ids, 100, |chunk| {
            seen.lock().unwrap().push(chunk.clone());
            async move { Ok(chunk.into_iter().map(Item).collect()) }
        })
        .await
        .expect("fetch");

        let seen = seen.into_inner().unwrap();
        assert_eq!(seen.len(), 3);
        assert_eq!(
            seen.iter().map(Vec::len).collect::<Vec<_>>(),
            vec![100, 100, 50]
        );
        assert_eq!(seen[1][0], 101);
        assert_eq!(items.len(), 250);
        assert_eq!(items.first(), Some(&Item(1)));
        assert_eq!(items.last(), Some(&Item(250)));
    }

    #[tokio::test]
    async fn merged_result_has_no_duplicates() {
        let ids = vec![1, 2, 3, 4];
        let items = fetch_chunks(&ids, 2, |chunk| async move {
            // every batch also echoes id 1
            let mut out = vec![Item(1)];
            out.extend(chunk.into_iter().map(Item));
            Ok(out)
        })
        .await
        .expect("fetch");

        assert_eq!(items, vec![Item(1), Item(2), Item(3), Item(4)]);
    }

    #[tokio::test]
    async fn first_failure_aborts() {
        let ids: Vec<RemoteId> = (1..=5).collect();
        let calls = Mutex::new(0);

        let result: Result<Vec<Item>> = fetch_chunks(&ids, 2, |_chunk| {
            *calls.lock().unwrap() += 1;
            async { Err(SyncError::DataShape("bad chunk".to_string())) }
        })
        .await;

        assert!(matches!(result, Err(SyncError::DataShape(_))));
        assert_eq!(*calls.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn zero_chunk_size_is_rejected() {
        let result: Result<Vec<Item>> =
            fetch_chunks(&[1, 2], 0, |_chunk| async { Ok(Vec::new()) }).await;
        assert!(matches!(result, Err(SyncError::InvalidArgument(_))));
    }

    #[tokio::test]
    async fn empty_ids_make_no_calls() {
        let calls = Mutex::new(0);
        let items: Vec<Item> = fetch_chunks(&[], 10, |_chunk| {
            *calls.lock().unwrap() += 1;
            async { Ok(Vec::new()) }
        })
        .await
        .expect("fetch");
        assert!(items.is_empty());
        assert_eq!(*calls.lock().unwrap(), 0);
    }
}
