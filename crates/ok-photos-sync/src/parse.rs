//! Mapping raw API resources onto records.
//!
//! Every entity consumes the keys it recognizes from the raw object. What is
//! left over after parsing is ignored and traced.

use chrono::{DateTime, NaiveDate, Utc};
use serde_json::{Map, Value};
use tracing::trace;

use crate::error::{Result, SyncError};
use crate::store::RecordStore;
use crate::types::{
    Album, EntityKind, Identified, Owner, OwnerKind, Photo, PictureSize, RemoteId, User,
};

/// A raw JSON object as returned by the remote API.
pub type Resource = Map<String, Value>;

/// What a parser may consult while mapping a resource.
pub struct ParseContext<'a> {
    pub store: &'a dyn RecordStore,
    /// Owner assumed when the resource does not name one.
    pub owner: Option<Owner>,
    /// Album assumed for photos that do not carry `album_id`.
    pub album: Option<RemoteId>,
    pub now: DateTime<Utc>,
}

impl<'a> ParseContext<'a> {
    pub fn new(store: &'a dyn RecordStore, now: DateTime<Utc>) -> Self {
        Self {
            store,
            owner: None,
            album: None,
            now,
        }
    }

    pub fn with_owner(mut self, owner: Owner) -> Self {
        self.owner = Some(owner);
        self
    }

    pub fn with_album(mut self, album: RemoteId) -> Self {
        self.album = Some(album);
        self
    }
}

/// A locally persisted mirror of a remote object.
pub trait RemoteEntity: Identified + Sized {
    const KIND: EntityKind;
    /// Key carrying the primary key in raw resources.
    const REMOTE_PK_FIELD: &'static str;

    /// A fresh record for an id not yet in the store.
    fn blank(id: RemoteId, raw: &Resource, ctx: &ParseContext<'_>) -> Result<Self>;

    /// Move recognized keys of `raw` onto this record.
    fn parse(&mut self, raw: &mut Resource, ctx: &ParseContext<'_>) -> Result<()>;

    fn fetched(&self) -> Option<DateTime<Utc>>;

    fn mark_fetched(&mut self, at: DateTime<Utc>);

    fn load(store: &dyn RecordStore, id: RemoteId) -> Result<Option<Self>>;

    fn persist(&self, store: &dyn RecordStore) -> Result<()>;
}

/// Parse `raw` into its record and upsert it.
///
/// An existing record with the same id is updated in place; its primary key
/// never changes.
pub fn materialize<E: RemoteEntity>(mut raw: Resource, ctx: &ParseContext<'_>) -> Result<E> {
    let id = take_id(&mut raw, E::REMOTE_PK_FIELD)?.ok_or_else(|| {
        SyncError::DataShape(format!(
            "{} resource without `{}`",
            E::KIND,
            E::REMOTE_PK_FIELD
        ))
    })?;

    let mut record = match E::load(ctx.store, id)? {
        Some(existing) => existing,
        None => E::blank(id, &raw, ctx)?,
    };
    record.parse(&mut raw, ctx)?;

    if !raw.is_empty() {
        trace!(
            kind = %E::KIND,
            id,
            ignored = ?raw.keys().collect::<Vec<_>>(),
            "Ignoring unrecognized resource keys"
        );
    }

    record.mark_fetched(ctx.now);
    record.persist(ctx.store)?;
    Ok(record)
}

/// Read a remote id without consuming it. Ids arrive as numbers or strings.
pub fn peek_id(raw: &Resource, key: &str) -> Result<Option<RemoteId>> {
    match raw.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => n
            .as_i64()
            .map(Some)
            .ok_or_else(|| SyncError::DataShape(format!("`{}` is not an integer id: {}", key, n))),
        Some(Value::String(s)) => s
            .trim()
            .parse::<RemoteId>()
            .map(Some)
            .map_err(|_| SyncError::DataShape(format!("`{}` is not an integer id: {:?}", key, s))),
        Some(other) => Err(SyncError::DataShape(format!(
            "`{}` is not an integer id: {}",
            key, other
        ))),
    }
}

pub fn take_id(raw: &mut Resource, key: &str) -> Result<Option<RemoteId>> {
    let id = peek_id(raw, key)?;
    raw.remove(key);
    Ok(id)
}

pub fn take_string(raw: &mut Resource, key: &str) -> Result<Option<String>> {
    match raw.remove(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s)),
        Some(Value::Number(n)) => Ok(Some(n.to_string())),
        Some(other) => Err(SyncError::DataShape(format!(
            "`{}` is not a string: {}",
            key, other
        ))),
    }
}

pub fn take_u32(raw: &mut Resource, key: &str) -> Result<Option<u32>> {
    match raw.remove(key) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => value_to_u32(&value)
            .map(Some)
            .ok_or_else(|| SyncError::DataShape(format!("`{}` is not a count: {}", key, value))),
    }
}

fn value_to_u32(value: &Value) -> Option<u32> {
    match value {
        Value::Number(n) => n.as_u64().and_then(|v| u32::try_from(v).ok()),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn value_to_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn millis_to_datetime(value: &Value) -> Option<DateTime<Utc>> {
    value_to_i64(value).and_then(DateTime::from_timestamp_millis)
}

/// Fields shared by albums and photos: owner and like summary.
struct OwnedFields<'r> {
    owner: &'r mut Owner,
    owner_name: &'r mut String,
    likes_count: &'r mut u32,
    last_like_date: &'r mut Option<DateTime<Utc>>,
}

fn parse_owned(raw: &mut Resource, fields: OwnedFields<'_>, ctx: &ParseContext<'_>) -> Result<()> {
    if let Some(name) = take_string(raw, "author_name")? {
        *fields.owner_name = name;
    }

    if let Some(author_type) = take_string(raw, "author_type")? {
        if OwnerKind::parse(&author_type).is_none() {
            return Err(SyncError::NotImplemented(format!(
                "author_type {} is not supported, only GROUP",
                author_type
            )));
        }
    }

    if let Some(group_id) = take_id(raw, "group_id")? {
        let owner = Owner::group(group_id);
        resolve_owner(ctx.store, owner)?;
        *fields.owner = owner;
    }

    if let Some(summary) = raw.remove("like_summary") {
        let summary = match summary {
            Value::Object(map) => map,
            Value::Null => Map::new(),
            other => {
                return Err(SyncError::DataShape(format!(
                    "`like_summary` is not an object: {}",
                    other
                )))
            }
        };
        *fields.likes_count = summary.get("count").and_then(value_to_u32).unwrap_or(0);
        *fields.last_like_date = summary.get("last_like_date_ms").and_then(millis_to_datetime);
    }

    Ok(())
}

/// Check that the owner a record points at exists locally.
pub fn resolve_owner(store: &dyn RecordStore, owner: Owner) -> Result<()> {
    match owner.kind {
        OwnerKind::Group => store
            .get_group(owner.id)?
            .map(|_| ())
            .ok_or(SyncError::NotFound {
                kind: EntityKind::Group,
                id: owner.id,
            }),
    }
}

fn default_owner(raw: &Resource, ctx: &ParseContext<'_>, kind: EntityKind, id: RemoteId) -> Result<Owner> {
    let owner = match peek_id(raw, "group_id")? {
        Some(group_id) => Owner::group(group_id),
        None => ctx
            .owner
            .ok_or_else(|| SyncError::DataShape(format!("{} {} has no owner", kind, id)))?,
    };
    resolve_owner(ctx.store, owner)?;
    Ok(owner)
}

/// Check that the album a photo points at exists locally.
fn resolve_album(store: &dyn RecordStore, album_id: RemoteId) -> Result<()> {
    store.get_album(album_id)?.map(|_| ()).ok_or(SyncError::NotFound {
        kind: EntityKind::Album,
        id: album_id,
    })
}

impl RemoteEntity for Album {
    const KIND: EntityKind = EntityKind::Album;
    const REMOTE_PK_FIELD: &'static str = "aid";

    fn blank(id: RemoteId, raw: &Resource, ctx: &ParseContext<'_>) -> Result<Self> {
        let owner = default_owner(raw, ctx, Self::KIND, id)?;
        Ok(Album::new(id, owner))
    }

    fn parse(&mut self, raw: &mut Resource, ctx: &ParseContext<'_>) -> Result<()> {
        parse_owned(
            raw,
            OwnedFields {
                owner: &mut self.owner,
                owner_name: &mut self.owner_name,
                likes_count: &mut self.likes_count,
                last_like_date: &mut self.last_like_date,
            },
            ctx,
        )?;

        if let Some(title) = take_string(raw, "title")? {
            self.title = title;
        }
        if let Some(created) = take_string(raw, "created")? {
            let date = NaiveDate::parse_from_str(created.trim(), "%Y-%m-%d").map_err(|_| {
                SyncError::DataShape(format!("album {} has malformed `created`: {}", self.id, created))
            })?;
            self.created = Some(date);
        }
        if let Some(count) = take_u32(raw, "photos_count")? {
            self.photos_count = count;
        }
        Ok(())
    }

    fn fetched(&self) -> Option<DateTime<Utc>> {
        self.fetched
    }

    fn mark_fetched(&mut self, at: DateTime<Utc>) {
        self.fetched = Some(at);
    }

    fn load(store: &dyn RecordStore, id: RemoteId) -> Result<Option<Self>> {
        store.get_album(id)
    }

    fn persist(&self, store: &dyn RecordStore) -> Result<()> {
        store.upsert_album(self)
    }
}

impl Identified for Album {
    fn remote_id(&self) -> RemoteId {
        self.id
    }
}

impl RemoteEntity for Photo {
    const KIND: EntityKind = EntityKind::Photo;
    const REMOTE_PK_FIELD: &'static str = "id";

    fn blank(id: RemoteId, raw: &Resource, ctx: &ParseContext<'_>) -> Result<Self> {
        let owner = default_owner(raw, ctx, Self::KIND, id)?;
        let album_id = match peek_id(raw, "album_id")? {
            Some(album_id) => album_id,
            None => ctx.album.ok_or_else(|| {
                SyncError::DataShape(format!("photo {} has no album", id))
            })?,
        };
        resolve_album(ctx.store, album_id)?;
        Ok(Photo::new(id, album_id, owner))
    }

    fn parse(&mut self, raw: &mut Resource, ctx: &ParseContext<'_>) -> Result<()> {
        if let Some(created_ms) = raw.remove("created_ms") {
            self.created = millis_to_datetime(&created_ms);
        }

        if let Some(album_id) = take_id(raw, "album_id")? {
            resolve_album(ctx.store, album_id)?;
            self.album_id = album_id;
        }

        parse_owned(
            raw,
            OwnedFields {
                owner: &mut self.owner,
                owner_name: &mut self.owner_name,
                likes_count: &mut self.likes_count,
                last_like_date: &mut self.last_like_date,
            },
            ctx,
        )?;

        if let Some(text) = take_string(raw, "text")? {
            self.text = text;
        }
        if let Some(count) = take_u32(raw, "comments_count")? {
            self.comments_count = count;
        }
        if let Some(width) = take_u32(raw, "standard_width")? {
            self.standard_width = width;
        }
        if let Some(height) = take_u32(raw, "standard_height")? {
            self.standard_height = height;
        }
        for size in PictureSize::ALL {
            if let Some(url) = take_string(raw, size.key())? {
                self.pictures.insert(size, url);
            }
        }
        Ok(())
    }

    fn fetched(&self) -> Option<DateTime<Utc>> {
        self.fetched
    }

    fn mark_fetched(&mut self, at: DateTime<Utc>) {
        self.fetched = Some(at);
    }

    fn load(store: &dyn RecordStore, id: RemoteId) -> Result<Option<Self>> {
        store.get_photo(id)
    }

    fn persist(&self, store: &dyn RecordStore) -> Result<()> {
        store.upsert_photo(self)
    }
}

impl Identified for Photo {
    fn remote_id(&self) -> RemoteId {
        self.id
    }
}

impl RemoteEntity for User {
    const KIND: EntityKind = EntityKind::User;
    const REMOTE_PK_FIELD: &'static str = "uid";

    fn blank(id: RemoteId, _raw: &Resource, _ctx: &ParseContext<'_>) -> Result<Self> {
        Ok(User::new(id))
    }

    fn parse(&mut self, raw: &mut Resource, _ctx: &ParseContext<'_>) -> Result<()> {
        if let Some(name) = take_string(raw, "name")? {
            self.name = name;
        }
        if let Some(first_name) = take_string(raw, "first_name")? {
            self.first_name = Some(first_name);
        }
        if let Some(last_name) = take_string(raw, "last_name")? {
            self.last_name = Some(last_name);
        }
        if let Some(gender) = take_string(raw, "gender")? {
            self.gender = Some(gender);
        }
        if let Some(pic) = take_string(raw, "pic128x128")? {
            self.pic = Some(pic);
        }
        Ok(())
    }

    fn fetched(&self) -> Option<DateTime<Utc>> {
        self.fetched
    }

    fn mark_fetched(&mut self, at: DateTime<Utc>) {
        self.fetched = Some(at);
    }

    fn load(store: &dyn RecordStore, id: RemoteId) -> Result<Option<Self>> {
        store.get_user(id)
    }

    fn persist(&self, store: &dyn RecordStore) -> Result<()> {
        store.upsert_user(self)
    }
}

impl Identified for User {
    fn remote_id(&self) -> RemoteId {
        self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use crate::types::Group;
    use serde_json::json;

    fn resource(value: Value) -> Resource {
        value.as_object().cloned().expect("object fixture")
    }

    fn store_with_group(gid: RemoteId) -> MemoryStore {
        let store = MemoryStore::new();
        store.upsert_group(&Group::new(gid, "Group")).expect("group");
        store
    }

    #[test]
    fn album_parse_maps_known_fields() {
        let store = store_with_group(10);
        let ctx = ParseContext::new(&store, Utc::now());
        let raw = resource(json!({
            "aid": "501",
            "group_id": "10",
            "title": "Summer",
            "created": "2013-05-21",
            "photos_count": 12,
            "author_name": "Group",
            "author_type": "GROUP",
            "like_summary": {"count": 3, "last_like_date_ms": 1369130400000i64},
            "type": "PUBLIC"
        }));

        let album: Album = materialize(raw, &ctx).expect("album");

        assert_eq!(album.id, 501);
        assert_eq!(album.owner, Owner::group(10));
        assert_eq!(album.title, "Summer");
        assert_eq!(album.created, NaiveDate::from_ymd_opt(2013, 5, 21));
        assert_eq!(album.photos_count, 12);
        assert_eq!(album.likes_count, 3);
        assert_eq!(
            album.last_like_date,
            DateTime::from_timestamp_millis(1369130400000)
        );
        assert!(album.fetched.is_some());
        assert_eq!(store.get_album(501).expect("get"), Some(album));
    }

    #[test]
    fn reparse_updates_in_place() {
        let store = store_with_group(10);
        let ctx = ParseContext::new(&store, Utc::now()).with_owner(Owner::group(10));

        let _: Album = materialize(resource(json!({"aid": 1, "title": "Old"})), &ctx).expect("first");
        let _: Album = materialize(resource(json!({"aid": 1, "title": "New"})), &ctx).expect("second");

        let albums = store.albums_for_owner(Owner::group(10)).expect("albums");
        assert_eq!(albums.len(), 1);
        assert_eq!(albums[0].title, "New");
    }

    #[test]
    fn unparsable_like_date_is_dropped() {
        let store = store_with_group(10);
        let ctx = ParseContext::new(&store, Utc::now()).with_owner(Owner::group(10));
        let album: Album = materialize(
            resource(json!({"aid": 1, "like_summary": {"count": "4", "last_like_date_ms": "soon"}})),
            &ctx,
        )
        .expect("album");

        assert_eq!(album.likes_count, 4);
        assert_eq!(album.last_like_date, None);
    }

    #[test]
    fn unsupported_author_type_is_not_implemented() {
        let store = store_with_group(10);
        let ctx = ParseContext::new(&store, Utc::now()).with_owner(Owner::group(10));
        let err = materialize::<Album>(resource(json!({"aid": 1, "author_type": "USER"})), &ctx)
            .unwrap_err();

        assert!(matches!(err, SyncError::NotImplemented(_)));
        assert_eq!(store.get_album(1).expect("get"), None);
    }

    #[test]
    fn unknown_owner_group_is_not_found() {
        let store = MemoryStore::new();
        let ctx = ParseContext::new(&store, Utc::now());
        let err = materialize::<Album>(resource(json!({"aid": 1, "group_id": 99})), &ctx)
            .unwrap_err();

        assert!(matches!(
            err,
            SyncError::NotFound { kind: EntityKind::Group, id: 99 }
        ));
    }

    #[test]
    fn fallback_owner_must_exist() {
        let store = MemoryStore::new();
        let ctx = ParseContext::new(&store, Utc::now()).with_owner(Owner::group(99));
        let err = materialize::<Album>(resource(json!({"aid": 1, "title": "Orphan"})), &ctx)
            .unwrap_err();

        assert!(matches!(
            err,
            SyncError::NotFound { kind: EntityKind::Group, id: 99 }
        ));
        assert_eq!(store.get_album(1).expect("get"), None);
    }

    #[test]
    fn fallback_album_must_exist() {
        let store = store_with_group(10);
        let ctx = ParseContext::new(&store, Utc::now())
            .with_owner(Owner::group(10))
            .with_album(999);
        let err = materialize::<Photo>(resource(json!({"id": 7, "text": "t"})), &ctx)
            .unwrap_err();

        assert!(matches!(
            err,
            SyncError::NotFound { kind: EntityKind::Album, id: 999 }
        ));
        assert_eq!(store.get_photo(7).expect("get"), None);
    }

    #[test]
    fn photo_requires_persisted_album() {
        let store = store_with_group(10);
        let ctx = ParseContext::new(&store, Utc::now()).with_owner(Owner::group(10));
        let err = materialize::<Photo>(resource(json!({"id": 7, "album_id": "501"})), &ctx)
            .unwrap_err();

        assert!(matches!(
            err,
            SyncError::NotFound { kind: EntityKind::Album, id: 501 }
        ));
    }

    #[test]
    fn photo_parse_maps_pictures_and_created() {
        let store = store_with_group(10);
        store
            .upsert_album(&Album::new(501, Owner::group(10)))
            .expect("album");
        let ctx = ParseContext::new(&store, Utc::now()).with_owner(Owner::group(10));

        let photo: Photo = materialize(
            resource(json!({
                "id": "7",
                "album_id": "501",
                "text": "Sunset",
                "created_ms": 1369130400000i64,
                "standard_width": 640,
                "standard_height": "480",
                "pic50x50": "http://i.mycdn.me/50",
                "pic1024max": "http://i.mycdn.me/1024",
                "comments_count": 2
            })),
            &ctx,
        )
        .expect("photo");

        assert_eq!(photo.album_id, 501);
        assert_eq!(photo.text, "Sunset");
        assert_eq!(photo.created, DateTime::from_timestamp_millis(1369130400000));
        assert_eq!(photo.standard_width, 640);
        assert_eq!(photo.standard_height, 480);
        assert_eq!(photo.comments_count, 2);
        assert_eq!(photo.picture(PictureSize::Pic50x50), Some("http://i.mycdn.me/50"));
        assert_eq!(photo.picture(PictureSize::Pic1024Max), Some("http://i.mycdn.me/1024"));
        assert_eq!(photo.picture(PictureSize::Pic640x480), None);
    }

    #[test]
    fn missing_primary_key_is_a_shape_error() {
        let store = MemoryStore::new();
        let ctx = ParseContext::new(&store, Utc::now());
        let err = materialize::<User>(resource(json!({"name": "Anna"})), &ctx).unwrap_err();
        assert!(matches!(err, SyncError::DataShape(_)));
    }
}
