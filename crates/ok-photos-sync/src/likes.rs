use chrono::Utc;
use ok_photos_config::FieldKind;
use std::collections::BTreeSet;
use tracing::info;

use crate::error::{Result, SyncError};
use crate::history::apply_likers;
use crate::pagination::{paginate, CursorKeys, PageRequest};
use crate::parse::RemoteEntity;
use crate::remote::{params, ApiMethod, RemoteApi};
use crate::store::{RecordStore, Transaction};
use crate::sync::PhotoSync;
use crate::types::{Album, LikeTarget, Limit, OwnerKind, Photo, RemoteId, User};

/// An entity carrying a time-versioned liker set.
pub trait Likable: RemoteEntity {
    /// Group passed as `gid` when listing likers.
    fn owning_group_id(&self) -> RemoteId;

    /// Request parameter scoping the like listing to this entity.
    fn like_scope_key(&self) -> (&'static str, RemoteId);

    fn like_target(&self) -> LikeTarget;

    fn likes_method() -> ApiMethod;

    fn save(&self, store: &dyn RecordStore) -> Result<()> {
        self.persist(store)
    }
}

impl Likable for Album {
    fn owning_group_id(&self) -> RemoteId {
        match self.owner.kind {
            OwnerKind::Group => self.owner.id,
        }
    }

    fn like_scope_key(&self) -> (&'static str, RemoteId) {
        ("aid", self.id)
    }

    fn like_target(&self) -> LikeTarget {
        LikeTarget::Album(self.id)
    }

    fn likes_method() -> ApiMethod {
        ApiMethod::GetAlbumLikes
    }
}

impl Likable for Photo {
    fn owning_group_id(&self) -> RemoteId {
        match self.owner.kind {
            OwnerKind::Group => self.owner.id,
        }
    }

    fn like_scope_key(&self) -> (&'static str, RemoteId) {
        ("photo_id", self.id)
    }

    fn like_target(&self) -> LikeTarget {
        LikeTarget::Photo(self.id)
    }

    fn likes_method() -> ApiMethod {
        ApiMethod::GetPhotoLikes
    }
}

impl<A, S> PhotoSync<A, S>
where
    A: RemoteApi,
    S: RecordStore,
{
    /// Fetch who likes `entity` and record it as the current liker set.
    ///
    /// Without a limit one page of `like_users_page` users is fetched.
    /// Returns the users in the order the remote side listed them.
    pub async fn fetch_likes<E: Likable>(&self, entity: &E, limit: Option<Limit>) -> Result<Vec<User>> {
        let gid = entity.owning_group_id();
        if gid <= 0 {
            return Err(SyncError::InvalidArgument(format!(
                "{} has no valid owning group",
                entity.like_target()
            )));
        }
        let limit = limit.unwrap_or(Limit::Count(self.settings.limits.like_users_page));

        let tx = Transaction::begin(&self.store)?;
        let outcome = self.reconcile_likes(entity, gid, limit).await;
        tx.finish(outcome)
    }

    async fn reconcile_likes<E: Likable>(&self, entity: &E, gid: RemoteId, limit: Limit) -> Result<Vec<User>> {
        let (scope_key, scope_id) = entity.like_scope_key();
        let request = PageRequest {
            method: self.method(E::likes_method()),
            params: params([
                ("gid", gid.to_string()),
                (scope_key, scope_id.to_string()),
                ("fields", self.request_fields(FieldKind::User)),
            ]),
            items_key: "users",
            id_key: "uid",
            cursor: CursorKeys::ANCHOR,
            page_size: self.settings.limits.like_users_page,
            limit,
        };
        let paged = paginate(&self.api, request).await?;

        let now = Utc::now();
        let users = self.store.get_or_create_users_from_resources(paged.resources, now)?;
        let fetched: BTreeSet<RemoteId> = users.iter().map(|user| user.id).collect();

        let target = entity.like_target();
        let delta = apply_likers(&self.store, target, &fetched, now)?;
        entity.save(&self.store)?;

        info!(
            target = %target,
            likers = fetched.len(),
            opened = delta.opened.len(),
            closed = delta.closed.len(),
            "Reconciled likes"
        );
        Ok(users)
    }
}
