//! Photo fetch strategies: specific ids, one album, or every album of a
//! group.

use ok_photos_config::FieldKind;
use tracing::{debug, info};

use crate::chunked::fetch_chunks;
use crate::collect::UniqueById;
use crate::error::{Result, SyncError};
use crate::pagination::{next_cursor, paginate, take_items, CursorKeys, PageRequest};
use crate::parse::{materialize, peek_id, Resource};
use crate::remote::{params, ApiMethod, ApiParams, RemoteApi};
use crate::store::{RecordStore, Transaction};
use crate::sync::{check_group, PhotoSync};
use crate::types::{Album, EntityKind, Group, Limit, Owner, Photo, RemoteId};

/// Selects which photos [`PhotoSync::fetch_photos`] fetches.
///
/// With `ids` the photos are looked up directly (an album is required).
/// With only `album` its photos are listed. With neither, every album of
/// the group is listed first and walked in order.
#[derive(Debug, Clone, Default)]
pub struct PhotoQuery<'a> {
    pub album: Option<&'a Album>,
    pub ids: Option<Vec<RemoteId>>,
    pub limit: Option<Limit>,
}

impl<'a> PhotoQuery<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn album(mut self, album: &'a Album) -> Self {
        self.album = Some(album);
        self
    }

    pub fn ids(mut self, ids: impl IntoIterator<Item = RemoteId>) -> Self {
        self.ids = Some(ids.into_iter().collect());
        self
    }

    pub fn limit(mut self, limit: Limit) -> Self {
        self.limit = Some(limit);
        self
    }
}

impl<A, S> PhotoSync<A, S>
where
    A: RemoteApi,
    S: RecordStore,
{
    pub async fn fetch_photos(&self, group: &Group, query: PhotoQuery<'_>) -> Result<Vec<Photo>> {
        check_group(group)?;
        if let Some(album) = query.album {
            if album.owner != Owner::group(group.id) {
                return Err(SyncError::InvalidArgument(format!(
                    "album {} is not owned by group {}",
                    album.id, group.id
                )));
            }
        }
        if query.ids.is_some() && query.album.is_none() {
            return Err(SyncError::InvalidArgument(
                "fetching photos by id requires an album".to_string(),
            ));
        }

        let tx = Transaction::begin(&self.store)?;
        let outcome = match (query.album, query.ids) {
            (Some(album), Some(ids)) => self.photos_by_ids(group, album, &ids).await,
            (Some(album), None) => {
                self.album_photos(group, album, query.limit.unwrap_or(Limit::All))
                    .await
            }
            (None, _) => self.group_photos(group, query.limit).await,
        };
        let photos = tx.finish(outcome)?;

        info!(group = group.id, photos = photos.len(), "Fetched photos");
        Ok(photos)
    }

    /// Fetch the photos of `album`, resolving its owning group locally.
    pub async fn fetch_album_photos(&self, album: &Album, limit: Option<Limit>) -> Result<Vec<Photo>> {
        let group = self.store.get_group(album.owner.id)?.ok_or(SyncError::NotFound {
            kind: EntityKind::Group,
            id: album.owner.id,
        })?;

        let mut query = PhotoQuery::new().album(album);
        query.limit = limit;
        self.fetch_photos(&group, query).await
    }

    fn album_params(&self, group: &Group, album: &Album) -> ApiParams {
        params([
            ("gid", group.id.to_string()),
            ("aid", album.id.to_string()),
            ("fields", self.request_fields(FieldKind::GroupPhoto)),
        ])
    }

    fn materialize_photos(
        &self,
        group: &Group,
        album: &Album,
        resources: Vec<Resource>,
    ) -> Result<Vec<Photo>> {
        let ctx = self.parse_context(group).with_album(album.id);
        resources
            .into_iter()
            .map(|raw| materialize::<Photo>(raw, &ctx))
            .collect()
    }

    /// `getInfo` in chunks of `photo_page` ids.
    async fn photos_by_ids(&self, group: &Group, album: &Album, ids: &[RemoteId]) -> Result<Vec<Photo>> {
        let method = self.method(ApiMethod::GetInfo);
        fetch_chunks(ids, self.settings.limits.photo_page, |chunk| {
            let mut call_params = self.album_params(group, album);
            call_params.insert("photo_ids".to_string(), join_ids(&chunk));
            let method = &method;
            async move {
                let mut response = self.api.call(method, &call_params).await?;
                let resources = take_items(&mut response, "photos")?;
                self.materialize_photos(group, album, resources)
            }
        })
        .await
    }

    /// Photos of one album.
    ///
    /// `Count(k)` issues sub-requests of at most `photo_page` until `k` were
    /// requested or the response carries no anchor. `All` walks every page.
    pub(crate) async fn album_photos(&self, group: &Group, album: &Album, limit: Limit) -> Result<Vec<Photo>> {
        let method = self.method(ApiMethod::GetPhotos);
        let page_size = self.settings.limits.photo_page;

        let resources = match limit {
            Limit::All => {
                let request = PageRequest {
                    method,
                    params: self.album_params(group, album),
                    items_key: "photos",
                    id_key: "id",
                    cursor: CursorKeys::ANCHOR,
                    page_size,
                    limit: Limit::All,
                };
                paginate(&self.api, request).await?.resources
            }
            Limit::Count(wanted) => {
                let mut collected = UniqueById::new();
                let mut remaining = wanted;
                let mut anchor: Option<String> = None;

                while remaining > 0 {
                    let count = page_size.min(remaining);
                    remaining -= count;

                    let mut call_params = self.album_params(group, album);
                    call_params.insert("count".to_string(), count.to_string());
                    if let Some(anchor) = &anchor {
                        call_params.insert(CursorKeys::ANCHOR.param_key.to_string(), anchor.clone());
                    }

                    let mut response = self.api.call(&method, &call_params).await?;
                    let items = take_items(&mut response, "photos")?;
                    debug!(album = album.id, requested = count, received = items.len(), "Fetched album photos");
                    for item in items {
                        let id = peek_id(&item, "id")?.ok_or_else(|| {
                            SyncError::DataShape(format!("photo in album {} without `id`", album.id))
                        })?;
                        collected.push(id, item);
                    }

                    match next_cursor(&response, CursorKeys::ANCHOR.response_key) {
                        Some(next) => anchor = Some(next),
                        None => break,
                    }
                }

                let mut resources = collected.into_vec();
                resources.truncate(wanted);
                resources
            }
        };

        self.materialize_photos(group, album, resources)
    }

    /// Walk every album of `group`.
    ///
    /// With `Count(n)` the budget left for the next album is reduced by the
    /// number of photos the previous album returned, and the walk stops once
    /// it is used up.
    async fn group_photos(&self, group: &Group, limit: Option<Limit>) -> Result<Vec<Photo>> {
        let albums = self.albums_for_group(group, Limit::All).await?;
        let page_size = self.settings.limits.photo_page;
        let mut photos = UniqueById::new();

        match limit {
            Some(Limit::Count(total)) => {
                let mut remaining = total;
                let mut previous = 0;
                for album in &albums {
                    remaining = remaining.saturating_sub(previous);
                    if remaining == 0 {
                        debug!(group = group.id, album = album.id, "Photo budget used up");
                        break;
                    }
                    let batch = self
                        .album_photos(group, album, Limit::Count(page_size.min(remaining)))
                        .await?;
                    previous = batch.len();
                    photos.extend(batch);
                }
            }
            _ => {
                for album in &albums {
                    photos.extend(self.album_photos(group, album, Limit::All).await?);
                }
            }
        }

        Ok(photos.into_vec())
    }
}

fn join_ids(ids: &[RemoteId]) -> String {
    ids.iter()
        .map(RemoteId::to_string)
        .collect::<Vec<_>>()
        .join(",")
}
