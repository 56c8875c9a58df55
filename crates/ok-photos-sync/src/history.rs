//! Reconciliation of a fetched liker set against the time-versioned
//! like relation.

use chrono::{DateTime, Utc};
use std::collections::BTreeSet;

use crate::error::Result;
use crate::store::RecordStore;
use crate::types::{LikeTarget, RemoteId};

/// How a fetched liker set differs from the current membership.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LikeDelta {
    /// Fetched but not currently open
    pub opened: BTreeSet<RemoteId>,
    /// Currently open but not fetched
    pub closed: BTreeSet<RemoteId>,
    pub kept: BTreeSet<RemoteId>,
}

impl LikeDelta {
    pub fn is_unchanged(&self) -> bool {
        self.opened.is_empty() && self.closed.is_empty()
    }
}

pub fn diff_likers(current: &BTreeSet<RemoteId>, fetched: &BTreeSet<RemoteId>) -> LikeDelta {
    LikeDelta {
        opened: fetched.difference(current).copied().collect(),
        closed: current.difference(fetched).copied().collect(),
        kept: current.intersection(fetched).copied().collect(),
    }
}

/// Make `fetched` the current liker set of `target` as of `at`.
///
/// Users who stopped liking get their open edge closed, new likers get a
/// fresh edge, everyone else is left untouched.
pub fn apply_likers(
    store: &dyn RecordStore,
    target: LikeTarget,
    fetched: &BTreeSet<RemoteId>,
    at: DateTime<Utc>,
) -> Result<LikeDelta> {
    let current = store.current_likers(target)?;
    let delta = diff_likers(&current, fetched);

    for &user_id in &delta.closed {
        store.close_like(target, user_id, at)?;
    }
    for &user_id in &delta.opened {
        store.open_like(target, user_id, at)?;
    }
    Ok(delta)
}
