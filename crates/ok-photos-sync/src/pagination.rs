//! Cursor-following pagination over a remote list method.

use serde_json::Value;
use tracing::debug;

use crate::collect::UniqueById;
use crate::error::{Result, SyncError};
use crate::parse::{peek_id, Resource};
use crate::remote::{ApiParams, RemoteApi};
use crate::types::Limit;

/// Where the pagination anchor lives in responses and requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CursorKeys {
    pub response_key: &'static str,
    pub param_key: &'static str,
}

impl CursorKeys {
    /// Used by `getAlbums`.
    pub const PAGING_ANCHOR: CursorKeys = CursorKeys {
        response_key: "pagingAnchor",
        param_key: "pagingAnchor",
    };

    /// Used by `getPhotos` and the like listings.
    pub const ANCHOR: CursorKeys = CursorKeys {
        response_key: "anchor",
        param_key: "anchor",
    };
}

#[derive(Debug, Clone)]
pub struct PageRequest {
    pub method: String,
    pub params: ApiParams,
    /// Response key holding the list of resources
    pub items_key: &'static str,
    /// Resource key holding the remote id
    pub id_key: &'static str,
    pub cursor: CursorKeys,
    /// Largest `count` a single call accepts
    pub page_size: usize,
    pub limit: Limit,
}

/// Outcome of a pagination run.
#[derive(Debug, Clone)]
pub struct Paged {
    /// Distinct resources in order of first appearance
    pub resources: Vec<Resource>,
    /// The last response, with its item list removed
    pub response: Resource,
    pub calls: usize,
}

/// Walk a paginated method until the cursor runs out or the limit is met.
///
/// A single call is made unless the limit is [`Limit::All`] or asks for more
/// than one page. Any failed call aborts the whole run.
pub async fn paginate<A>(api: &A, request: PageRequest) -> Result<Paged>
where
    A: RemoteApi + ?Sized,
{
    let PageRequest {
        method,
        mut params,
        items_key,
        id_key,
        cursor,
        page_size,
        limit,
    } = request;

    if page_size == 0 {
        return Err(SyncError::InvalidArgument(
            "page size must be greater than zero".to_string(),
        ));
    }

    let (target, follow_cursor) = match limit {
        Limit::All => (None, true),
        Limit::Count(0) => {
            return Ok(Paged {
                resources: Vec::new(),
                response: Resource::new(),
                calls: 0,
            })
        }
        Limit::Count(n) => (Some(n), n > page_size),
    };

    let mut collected = UniqueById::new();
    let mut calls = 0;
    let mut last_cursor: Option<String> = None;

    loop {
        let count = match target {
            Some(n) => page_size.min(n - collected.len()),
            None => page_size,
        };
        params.insert("count".to_string(), count.to_string());

        let mut response = api.call(&method, &params).await?;
        calls += 1;

        let items = take_items(&mut response, items_key)?;
        let received = items.len();
        let mut added = 0;
        for item in items {
            let id = peek_id(&item, id_key)?.ok_or_else(|| {
                SyncError::DataShape(format!("{} item without `{}`", method, id_key))
            })?;
            if collected.push(id, item) {
                added += 1;
            }
        }

        debug!(
            method = %method,
            page = calls,
            received,
            added,
            total = collected.len(),
            "Fetched page"
        );

        let satisfied = target.is_some_and(|n| collected.len() >= n);
        if !follow_cursor || satisfied || received == 0 {
            return Ok(finish(collected, response, calls, target));
        }

        match next_cursor(&response, cursor.response_key) {
            Some(next) if last_cursor.as_deref() != Some(next.as_str()) => {
                params.insert(cursor.param_key.to_string(), next.clone());
                last_cursor = Some(next);
            }
            _ => return Ok(finish(collected, response, calls, target)),
        }
    }
}

fn finish(
    collected: UniqueById<Resource>,
    response: Resource,
    calls: usize,
    target: Option<usize>,
) -> Paged {
    let mut resources = collected.into_vec();
    if let Some(n) = target {
        resources.truncate(n);
    }
    Paged {
        resources,
        response,
        calls,
    }
}

/// Remove and return the resource list stored under `key`.
///
/// A missing or null list is an empty page.
pub fn take_items(response: &mut Resource, key: &str) -> Result<Vec<Resource>> {
    match response.remove(key) {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::Array(items)) => items
            .into_iter()
            .map(|item| match item {
                Value::Object(map) => Ok(map),
                other => Err(SyncError::DataShape(format!(
                    "`{}` contains a non-object item: {}",
                    key, other
                ))),
            })
            .collect(),
        Some(other) => Err(SyncError::DataShape(format!(
            "`{}` is not a list: {}",
            key, other
        ))),
    }
}

/// The anchor for the next page, if the response says there is one.
pub fn next_cursor(response: &Resource, key: &str) -> Option<String> {
    let exhausted = ["hasMore", "has_more"]
        .iter()
        .any(|flag| matches!(response.get(*flag), Some(Value::Bool(false))));
    if exhausted {
        return None;
    }

    match response.get(key)? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RemoteError;
    use crate::test_utils::ScriptedApi;
    use serde_json::json;

    fn request(limit: Limit) -> PageRequest {
        PageRequest {
            method: "photos.getPhotos".to_string(),
            params: ApiParams::new(),
            items_key: "photos",
            id_key: "id",
            cursor: CursorKeys::ANCHOR,
            page_size: 3,
            limit,
        }
    }

    fn ids(paged: &Paged) -> Vec<i64> {
        paged
            .resources
            .iter()
            .map(|r| peek_id(r, "id").unwrap().unwrap())
            .collect()
    }

    #[tokio::test]
    async fn follows_cursor_until_it_is_omitted() {
        let api = ScriptedApi::new()
            .with_response(
                "photos.getPhotos",
                json!({"photos": [{"id": 1}, {"id": 2}, {"id": 3}], "anchor": "a1"}),
            )
            .with_response(
                "photos.getPhotos",
                json!({"photos": [{"id": 4}, {"id": 5}, {"id": 6}], "anchor": "a2"}),
            )
            .with_response("photos.getPhotos", json!({"photos": [{"id": 7}]}));

        let paged = paginate(&api, request(Limit::All)).await.expect("paginate");

        assert_eq!(paged.calls, 3);
        assert_eq!(ids(&paged), vec![1, 2, 3, 4, 5, 6, 7]);
        let calls = api.calls_to("photos.getPhotos");
        assert_eq!(calls.len(), 3);
        assert_eq!(calls[0].get("anchor"), None);
        assert_eq!(calls[1].get("anchor").map(String::as_str), Some("a1"));
        assert_eq!(calls[2].get("anchor").map(String::as_str), Some("a2"));
        assert!(calls.iter().all(|p| p.get("count").map(String::as_str) == Some("3")));
    }

    #[tokio::test]
    async fn overlapping_pages_are_deduplicated() {
        let api = ScriptedApi::new()
            .with_response(
                "photos.getPhotos",
                json!({"photos": [{"id": 1}, {"id": 2}, {"id": 3}], "anchor": "a1"}),
            )
            .with_response(
                "photos.getPhotos",
                json!({"photos": [{"id": 3, "text": "dup"}, {"id": 4}], "anchor": ""}),
            );

        let paged = paginate(&api, request(Limit::All)).await.expect("paginate");

        assert_eq!(ids(&paged), vec![1, 2, 3, 4]);
        assert!(paged.resources[2].get("text").is_none());
    }

    #[tokio::test]
    async fn count_within_one_page_makes_single_call() {
        let api = ScriptedApi::new().with_response(
            "photos.getPhotos",
            json!({"photos": [{"id": 1}, {"id": 2}], "anchor": "more"}),
        );

        let paged = paginate(&api, request(Limit::Count(2))).await.expect("paginate");

        assert_eq!(paged.calls, 1);
        assert_eq!(
            api.calls_to("photos.getPhotos")[0].get("count").map(String::as_str),
            Some("2")
        );
    }

    #[tokio::test]
    async fn count_beyond_one_page_stops_when_satisfied() {
        let api = ScriptedApi::new()
            .with_response(
                "photos.getPhotos",
                json!({"photos": [{"id": 1}, {"id": 2}, {"id": 3}], "anchor": "a1"}),
            )
            .with_response(
                "photos.getPhotos",
                json!({"photos": [{"id": 4}, {"id": 5}], "anchor": "a2"}),
            );

        let paged = paginate(&api, request(Limit::Count(5))).await.expect("paginate");

        assert_eq!(paged.calls, 2);
        assert_eq!(ids(&paged), vec![1, 2, 3, 4, 5]);
        let calls = api.calls_to("photos.getPhotos");
        assert_eq!(calls[1].get("count").map(String::as_str), Some("2"));
    }

    #[tokio::test]
    async fn has_more_false_ends_pagination() {
        let api = ScriptedApi::new().with_response(
            "photos.getPhotos",
            json!({"photos": [{"id": 1}], "anchor": "stale", "hasMore": false}),
        );

        let paged = paginate(&api, request(Limit::All)).await.expect("paginate");
        assert_eq!(paged.calls, 1);
        assert_eq!(paged.response.get("anchor"), Some(&json!("stale")));
    }

    #[tokio::test]
    async fn repeated_cursor_does_not_loop() {
        let api = ScriptedApi::new()
            .with_response(
                "photos.getPhotos",
                json!({"photos": [{"id": 1}], "anchor": "same"}),
            )
            .with_response(
                "photos.getPhotos",
                json!({"photos": [{"id": 1}], "anchor": "same"}),
            );

        let paged = paginate(&api, request(Limit::All)).await.expect("paginate");
        assert_eq!(paged.calls, 2);
        assert_eq!(ids(&paged), vec![1]);
    }

    #[tokio::test]
    async fn failure_mid_way_discards_pages() {
        let api = ScriptedApi::new()
            .with_response(
                "photos.getPhotos",
                json!({"photos": [{"id": 1}], "anchor": "a1"}),
            )
            .with_failure(
                "photos.getPhotos",
                RemoteError::Transport("connection reset".to_string()),
            );

        let err = paginate(&api, request(Limit::All)).await.unwrap_err();
        assert!(matches!(err, SyncError::Remote(RemoteError::Transport(_))));
    }

    #[tokio::test]
    async fn zero_count_makes_no_call() {
        let api = ScriptedApi::new();
        let paged = paginate(&api, request(Limit::Count(0))).await.expect("paginate");
        assert!(paged.resources.is_empty());
        assert!(api.calls().is_empty());
    }

    #[test]
    fn non_list_items_are_a_shape_error() {
        let mut response = json!({"photos": {"id": 1}}).as_object().cloned().unwrap();
        assert!(matches!(
            take_items(&mut response, "photos"),
            Err(SyncError::DataShape(_))
        ));
    }
}
