use ok_photos_config::FieldKind;
use serde_json::Value;
use tracing::{debug, info};

use crate::collect::UniqueById;
use crate::error::{Result, SyncError};
use crate::pagination::{paginate, CursorKeys, PageRequest};
use crate::parse::{materialize, Resource};
use crate::remote::{params, ApiMethod, RemoteApi};
use crate::store::{RecordStore, Transaction};
use crate::sync::{check_group, PhotoSync};
use crate::types::{Album, EntityKind, Group, Limit, RemoteId};

impl<A, S> PhotoSync<A, S>
where
    A: RemoteApi,
    S: RecordStore,
{
    /// Fetch the albums of `group` via `getAlbums`.
    ///
    /// Without a limit one page of `album_page` albums is fetched.
    pub async fn fetch_albums_for_group(
        &self,
        group: &Group,
        limit: Option<Limit>,
    ) -> Result<Vec<Album>> {
        check_group(group)?;
        let limit = limit.unwrap_or(Limit::Count(self.settings.limits.album_page));

        let tx = Transaction::begin(&self.store)?;
        let outcome = self.albums_for_group(group, limit).await;
        let albums = tx.finish(outcome)?;

        info!(group = group.id, albums = albums.len(), "Fetched group albums");
        Ok(albums)
    }

    /// Fetch specific albums of `group`, one `getAlbumInfo` call per id.
    ///
    /// `count` keeps only the first `count` ids.
    pub async fn fetch_albums_by_ids(
        &self,
        group: &Group,
        ids: &[RemoteId],
        count: Option<usize>,
    ) -> Result<Vec<Album>> {
        check_group(group)?;
        let ids = match count {
            Some(n) => &ids[..n.min(ids.len())],
            None => ids,
        };

        let tx = Transaction::begin(&self.store)?;
        let outcome = self.albums_by_ids(group, ids).await;
        let albums = tx.finish(outcome)?;

        info!(group = group.id, albums = albums.len(), "Fetched albums by id");
        Ok(albums)
    }

    /// Album listing without a transaction of its own, shared with the
    /// group photo cascade.
    pub(crate) async fn albums_for_group(&self, group: &Group, limit: Limit) -> Result<Vec<Album>> {
        let request = PageRequest {
            method: self.method(ApiMethod::GetAlbums),
            params: params([
                ("gid", group.id.to_string()),
                ("fields", self.request_fields(FieldKind::GroupAlbum)),
            ]),
            items_key: "albums",
            id_key: "aid",
            cursor: CursorKeys::PAGING_ANCHOR,
            page_size: self.settings.limits.album_page,
            limit,
        };
        let paged = paginate(&self.api, request).await?;

        let ctx = self.parse_context(group);
        paged
            .resources
            .into_iter()
            .map(|raw| materialize::<Album>(raw, &ctx))
            .collect()
    }

    async fn albums_by_ids(&self, group: &Group, ids: &[RemoteId]) -> Result<Vec<Album>> {
        let method = self.method(ApiMethod::GetAlbumInfo);
        let fields = self.request_fields(FieldKind::GroupAlbum);

        let mut resources = UniqueById::new();
        for &aid in ids {
            let call_params = params([
                ("gid", group.id.to_string()),
                ("aid", aid.to_string()),
                ("fields", fields.clone()),
            ]);
            let mut response = self.api.call(&method, &call_params).await?;
            debug!(method = %method, aid, "Fetched album info");
            resources.push(aid, take_album(&mut response, aid)?);
        }

        let ctx = self.parse_context(group);
        resources
            .into_vec()
            .into_iter()
            .map(|raw| materialize::<Album>(raw, &ctx))
            .collect()
    }
}

fn take_album(response: &mut Resource, aid: RemoteId) -> Result<Resource> {
    match response.remove("album") {
        Some(Value::Object(album)) => Ok(album),
        None | Some(Value::Null) => Err(SyncError::NotFound {
            kind: EntityKind::Album,
            id: aid,
        }),
        Some(other) => Err(SyncError::DataShape(format!(
            "`album` is not an object: {}",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use crate::error::{RemoteError, SyncError};
    use crate::store::{MemoryStore, RecordStore};
    use crate::sync::{PhotoSync, SyncSettings};
    use crate::test_utils::{album_resource, ScriptedApi};
    use crate::types::{Group, Limit, Owner};
    use serde_json::json;

    const GROUP: i64 = 53038939046008;

    fn engine(api: ScriptedApi) -> PhotoSync<ScriptedApi, MemoryStore> {
        let store = MemoryStore::new();
        store.upsert_group(&Group::new(GROUP, "Club")).expect("group");
        PhotoSync::new(api, store, SyncSettings::default())
    }

    #[tokio::test]
    async fn default_limit_fetches_one_page() {
        let api = ScriptedApi::new().with_response(
            "photos.getAlbums",
            json!({
                "albums": [album_resource(1, GROUP, "One"), album_resource(2, GROUP, "Two")],
                "pagingAnchor": "next",
                "hasMore": true
            }),
        );
        let sync = engine(api);
        let group = Group::new(GROUP, "Club");

        let albums = sync.fetch_albums_for_group(&group, None).await.expect("albums");

        assert_eq!(albums.len(), 2);
        let calls = sync.api().calls_to("photos.getAlbums");
        assert_eq!(calls.len(), 1);
        let call = &calls[0];
        assert_eq!(call.get("gid").map(String::as_str), Some("53038939046008"));
        assert_eq!(call.get("count").map(String::as_str), Some("100"));
        assert!(call["fields"].starts_with("group_album."));

        let stored = sync.store().albums_for_owner(Owner::group(GROUP)).expect("stored");
        assert_eq!(stored.len(), 2);
        assert_eq!(stored[0].title, "One");
    }

    #[tokio::test]
    async fn all_follows_paging_anchor() {
        let api = ScriptedApi::new()
            .with_response(
                "photos.getAlbums",
                json!({"albums": [album_resource(1, GROUP, "One")], "pagingAnchor": "p1", "hasMore": true}),
            )
            .with_response(
                "photos.getAlbums",
                json!({"albums": [album_resource(2, GROUP, "Two")], "hasMore": false}),
            );
        let sync = engine(api);

        let albums = sync
            .fetch_albums_for_group(&Group::new(GROUP, "Club"), Some(Limit::All))
            .await
            .expect("albums");

        assert_eq!(albums.iter().map(|a| a.id).collect::<Vec<_>>(), vec![1, 2]);
        let calls = sync.api().calls_to("photos.getAlbums");
        assert_eq!(calls[1].get("pagingAnchor").map(String::as_str), Some("p1"));
    }

    #[tokio::test]
    async fn by_ids_truncates_and_calls_once_per_id() {
        let api = ScriptedApi::new()
            .with_response("photos.getAlbumInfo", json!({"album": album_resource(10, GROUP, "Ten")}))
            .with_response("photos.getAlbumInfo", json!({"album": album_resource(11, GROUP, "Eleven")}));
        let sync = engine(api);

        let albums = sync
            .fetch_albums_by_ids(&Group::new(GROUP, "Club"), &[10, 11, 12], Some(2))
            .await
            .expect("albums");

        assert_eq!(albums.len(), 2);
        let calls = sync.api().calls_to("photos.getAlbumInfo");
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].get("aid").map(String::as_str), Some("10"));
        assert_eq!(calls[1].get("aid").map(String::as_str), Some("11"));
    }

    #[tokio::test]
    async fn missing_album_in_info_rolls_back() {
        let api = ScriptedApi::new()
            .with_response("photos.getAlbumInfo", json!({"album": album_resource(10, GROUP, "Ten")}))
            .with_response("photos.getAlbumInfo", json!({}));
        let sync = engine(api);

        let err = sync
            .fetch_albums_by_ids(&Group::new(GROUP, "Club"), &[10, 11], None)
            .await
            .unwrap_err();

        assert!(matches!(err, SyncError::NotFound { id: 11, .. }));
        assert!(sync.store().get_album(10).expect("get").is_none());
    }

    #[tokio::test]
    async fn remote_failure_propagates_unchanged() {
        let failure = RemoteError::Api {
            code: 100,
            message: "PARAM: gid".to_string(),
        };
        let api = ScriptedApi::new().with_failure("photos.getAlbums", failure.clone());
        let sync = engine(api);

        let err = sync
            .fetch_albums_for_group(&Group::new(GROUP, "Club"), None)
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::Remote(inner) if inner == failure));
    }

    #[tokio::test]
    async fn invalid_group_makes_no_call() {
        let sync = engine(ScriptedApi::new());
        let err = sync
            .fetch_albums_for_group(&Group::new(-1, "Broken"), None)
            .await
            .unwrap_err();

        assert!(matches!(err, SyncError::InvalidArgument(_)));
        assert!(sync.api().calls().is_empty());
    }
}
