use anyhow::anyhow;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use super::RecordStore;
use crate::error::{Result, SyncError};
use crate::types::{Album, Group, LikeEdge, LikeTarget, Owner, Photo, RemoteId, User};

#[derive(Debug, Clone, Default)]
struct State {
    groups: BTreeMap<RemoteId, Group>,
    albums: BTreeMap<RemoteId, Album>,
    photos: BTreeMap<RemoteId, Photo>,
    users: BTreeMap<RemoteId, User>,
    edges: Vec<LikeEdge>,
}

#[derive(Debug, Default)]
struct Inner {
    state: State,
    /// State as of `begin`, restored on rollback.
    snapshot: Option<State>,
}

/// In-process record store. Transactions snapshot the whole state.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>> {
        self.inner
            .lock()
            .map_err(|_| SyncError::Storage(anyhow!("memory store lock poisoned")))
    }

    pub fn in_transaction(&self) -> bool {
        self.lock().map(|inner| inner.snapshot.is_some()).unwrap_or(false)
    }
}

impl RecordStore for MemoryStore {
    fn begin(&self) -> Result<()> {
        let mut inner = self.lock()?;
        if inner.snapshot.is_some() {
            return Err(SyncError::Storage(anyhow!("transaction already open")));
        }
        inner.snapshot = Some(inner.state.clone());
        Ok(())
    }

    fn commit(&self) -> Result<()> {
        let mut inner = self.lock()?;
        inner
            .snapshot
            .take()
            .map(|_| ())
            .ok_or_else(|| SyncError::Storage(anyhow!("commit without open transaction")))
    }

    fn rollback(&self) -> Result<()> {
        let mut inner = self.lock()?;
        if let Some(snapshot) = inner.snapshot.take() {
            inner.state = snapshot;
        }
        Ok(())
    }

    fn upsert_group(&self, group: &Group) -> Result<()> {
        self.lock()?.state.groups.insert(group.id, group.clone());
        Ok(())
    }

    fn get_group(&self, id: RemoteId) -> Result<Option<Group>> {
        Ok(self.lock()?.state.groups.get(&id).cloned())
    }

    fn upsert_album(&self, album: &Album) -> Result<()> {
        self.lock()?.state.albums.insert(album.id, album.clone());
        Ok(())
    }

    fn get_album(&self, id: RemoteId) -> Result<Option<Album>> {
        Ok(self.lock()?.state.albums.get(&id).cloned())
    }

    fn albums_for_owner(&self, owner: Owner) -> Result<Vec<Album>> {
        Ok(self
            .lock()?
            .state
            .albums
            .values()
            .filter(|album| album.owner == owner)
            .cloned()
            .collect())
    }

    fn upsert_photo(&self, photo: &Photo) -> Result<()> {
        self.lock()?.state.photos.insert(photo.id, photo.clone());
        Ok(())
    }

    fn get_photo(&self, id: RemoteId) -> Result<Option<Photo>> {
        Ok(self.lock()?.state.photos.get(&id).cloned())
    }

    fn photos_in_album(&self, album_id: RemoteId) -> Result<Vec<Photo>> {
        Ok(self
            .lock()?
            .state
            .photos
            .values()
            .filter(|photo| photo.album_id == album_id)
            .cloned()
            .collect())
    }

    fn upsert_user(&self, user: &User) -> Result<()> {
        self.lock()?.state.users.insert(user.id, user.clone());
        Ok(())
    }

    fn get_user(&self, id: RemoteId) -> Result<Option<User>> {
        Ok(self.lock()?.state.users.get(&id).cloned())
    }

    fn like_edges(&self, target: LikeTarget) -> Result<Vec<LikeEdge>> {
        let mut edges: Vec<LikeEdge> = self
            .lock()?
            .state
            .edges
            .iter()
            .filter(|edge| edge.target == target)
            .cloned()
            .collect();
        edges.sort_by_key(|edge| (edge.time_from, edge.user_id));
        Ok(edges)
    }

    fn open_like(&self, target: LikeTarget, user_id: RemoteId, at: DateTime<Utc>) -> Result<()> {
        let mut inner = self.lock()?;
        let already_open = inner
            .state
            .edges
            .iter()
            .any(|edge| edge.target == target && edge.user_id == user_id && edge.is_open());
        if !already_open {
            inner.state.edges.push(LikeEdge {
                target,
                user_id,
                time_from: at,
                time_to: None,
            });
        }
        Ok(())
    }

    fn close_like(&self, target: LikeTarget, user_id: RemoteId, at: DateTime<Utc>) -> Result<()> {
        let mut inner = self.lock()?;
        if let Some(edge) = inner
            .state
            .edges
            .iter_mut()
            .find(|edge| edge.target == target && edge.user_id == user_id && edge.is_open())
        {
            edge.time_to = Some(at);
        }
        Ok(())
    }
}
