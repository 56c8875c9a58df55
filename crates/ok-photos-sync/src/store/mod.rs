//! Record store contract.
//!
//! This module defines the trait that any storage backend must implement to
//! be driven by the sync engine, plus the transaction guard the engine wraps
//! around every entry point.

mod duck;
mod memory;

pub use self::duck::DuckDbStore;
pub use self::memory::MemoryStore;

use chrono::{DateTime, Utc};
use std::collections::BTreeSet;
use tracing::{error, warn};

use crate::error::Result;
use crate::parse::{materialize, ParseContext, Resource};
use crate::types::{Album, Group, LikeEdge, LikeTarget, Owner, Photo, RemoteId, User};

/// Persistence operations required by the sync engine.
pub trait RecordStore: Send + Sync {
    // ========== Transactions ==========

    /// Open a transaction. Transactions do not nest.
    fn begin(&self) -> Result<()>;

    fn commit(&self) -> Result<()>;

    /// Discard everything written since [`RecordStore::begin`].
    fn rollback(&self) -> Result<()>;

    // ========== Records ==========

    fn upsert_group(&self, group: &Group) -> Result<()>;

    fn get_group(&self, id: RemoteId) -> Result<Option<Group>>;

    fn upsert_album(&self, album: &Album) -> Result<()>;

    fn get_album(&self, id: RemoteId) -> Result<Option<Album>>;

    /// Albums owned by `owner`, ordered by id.
    fn albums_for_owner(&self, owner: Owner) -> Result<Vec<Album>>;

    fn upsert_photo(&self, photo: &Photo) -> Result<()>;

    fn get_photo(&self, id: RemoteId) -> Result<Option<Photo>>;

    /// Photos of one album, ordered by id.
    fn photos_in_album(&self, album_id: RemoteId) -> Result<Vec<Photo>>;

    fn upsert_user(&self, user: &User) -> Result<()>;

    fn get_user(&self, id: RemoteId) -> Result<Option<User>>;

    // ========== Time-versioned like relation ==========

    /// Every edge of `target`, open and closed, ordered by `time_from`.
    fn like_edges(&self, target: LikeTarget) -> Result<Vec<LikeEdge>>;

    /// Open a membership edge at `at`. No-op when one is already open.
    fn open_like(&self, target: LikeTarget, user_id: RemoteId, at: DateTime<Utc>) -> Result<()>;

    /// Close the open membership edge at `at`. No-op when none is open.
    fn close_like(&self, target: LikeTarget, user_id: RemoteId, at: DateTime<Utc>) -> Result<()>;

    /// Users with an open edge on `target`.
    fn current_likers(&self, target: LikeTarget) -> Result<BTreeSet<RemoteId>> {
        Ok(self
            .like_edges(target)?
            .into_iter()
            .filter(LikeEdge::is_open)
            .map(|edge| edge.user_id)
            .collect())
    }

    /// Users whose membership interval covers `at`.
    fn likers_at(&self, target: LikeTarget, at: DateTime<Utc>) -> Result<BTreeSet<RemoteId>> {
        Ok(self
            .like_edges(target)?
            .into_iter()
            .filter(|edge| edge.covers(at))
            .map(|edge| edge.user_id)
            .collect())
    }

    /// Upsert users from raw `uid`-keyed resources, in input order.
    fn get_or_create_users_from_resources(
        &self,
        resources: Vec<Resource>,
        now: DateTime<Utc>,
    ) -> Result<Vec<User>>
    where
        Self: Sized,
    {
        let ctx = ParseContext::new(self, now);
        resources
            .into_iter()
            .map(|raw| materialize::<User>(raw, &ctx))
            .collect()
    }
}

/// Scope guard around one atomic fetch.
///
/// [`Transaction::finish`] commits on `Ok` and rolls back on `Err`. A guard
/// dropped without finishing (a cancelled future) rolls back.
pub struct Transaction<'a> {
    store: &'a dyn RecordStore,
    finished: bool,
}

impl<'a> Transaction<'a> {
    pub fn begin(store: &'a dyn RecordStore) -> Result<Self> {
        store.begin()?;
        Ok(Self {
            store,
            finished: false,
        })
    }

    pub fn finish<T>(mut self, outcome: Result<T>) -> Result<T> {
        self.finished = true;
        match outcome {
            Ok(value) => match self.store.commit() {
                Ok(()) => Ok(value),
                Err(err) => {
                    error!("Commit failed: {}", err);
                    if let Err(rollback_err) = self.store.rollback() {
                        error!("Rollback failed: {}", rollback_err);
                    }
                    Err(err)
                }
            },
            Err(err) => {
                warn!("Rolling back fetch: {}", err);
                if let Err(rollback_err) = self.store.rollback() {
                    error!("Rollback failed: {}", rollback_err);
                }
                Err(err)
            }
        }
    }
}

impl Drop for Transaction<'_> {
    fn drop(&mut self) {
        if !self.finished {
            warn!("Transaction dropped before completion, rolling back");
            if let Err(err) = self.store.rollback() {
                error!("Rollback failed: {}", err);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SyncError;

    #[test]
    fn finish_commits_success() {
        let store = MemoryStore::new();
        let tx = Transaction::begin(&store).expect("begin");
        store.upsert_group(&Group::new(1, "kept")).expect("write");
        tx.finish(Ok(())).expect("commit");

        assert!(store.get_group(1).expect("get").is_some());
    }

    #[test]
    fn finish_rolls_back_failure() {
        let store = MemoryStore::new();
        let tx = Transaction::begin(&store).expect("begin");
        store.upsert_group(&Group::new(1, "discarded")).expect("write");
        let outcome: Result<()> = tx.finish(Err(SyncError::DataShape("boom".into())));

        assert!(matches!(outcome, Err(SyncError::DataShape(_))));
        assert!(store.get_group(1).expect("get").is_none());
    }

    #[test]
    fn dropped_guard_rolls_back() {
        let store = MemoryStore::new();
        {
            let _tx = Transaction::begin(&store).expect("begin");
            store.upsert_group(&Group::new(1, "discarded")).expect("write");
        }
        assert!(store.get_group(1).expect("get").is_none());
        // a fresh transaction can be opened afterwards
        let tx = Transaction::begin(&store).expect("begin again");
        tx.finish(Ok(())).expect("commit");
    }
}
