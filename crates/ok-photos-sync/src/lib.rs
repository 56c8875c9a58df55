//! Album, photo and like synchronization for Odnoklassniki groups.
//!
//! This crate walks the paginated `photos.*` API, merges chunked and paged
//! results without duplicates, and mirrors them into a local record store.
//! Likes are kept as a time-versioned relation so past liker sets remain
//! queryable.
//!
//! # Features
//!
//! - **Pagination**: cursor-following fetches bounded by a [`Limit`].
//! - **Chunking**: id lists split into batches the API accepts.
//! - **Cascade**: photos of a whole group fetched album by album under one
//!   shared budget.
//! - **Like history**: open and closed membership intervals per liker.
//! - **Atomic fetches**: each entry point commits fully or rolls back.
//!
//! # Usage
//!
//! Implement [`RemoteApi`] for your API client, pick a [`RecordStore`] and
//! create a [`PhotoSync`]:
//!
//! ```ignore
//! use ok_photos_sync::{DuckDbStore, PhotoSync, SyncSettings, Group, Limit};
//!
//! let store = DuckDbStore::open("ok-photos.duckdb")?;
//! let sync = PhotoSync::new(client, store, SyncSettings::default());
//!
//! let group = Group::new(53038939046008, "Club");
//! let albums = sync.fetch_albums_for_group(&group, Some(Limit::All)).await?;
//! for album in &albums {
//!     sync.fetch_likes(album, None).await?;
//! }
//! ```

pub mod albums;
pub mod chunked;
pub mod collect;
pub mod error;
pub mod history;
pub mod likes;
pub mod pagination;
pub mod parse;
pub mod photos;
pub mod remote;
pub mod store;
pub mod sync;
pub mod test_utils;
pub mod types;

// Re-export main types for convenience
pub use chunked::fetch_chunks;
pub use collect::UniqueById;
pub use error::{RemoteError, Result, SyncError};
pub use history::{apply_likers, diff_likers, LikeDelta};
pub use likes::Likable;
pub use pagination::{paginate, CursorKeys, PageRequest, Paged};
pub use parse::{materialize, ParseContext, RemoteEntity, Resource};
pub use photos::PhotoQuery;
pub use remote::{params, ApiMethod, ApiParams, RemoteApi};
pub use store::{DuckDbStore, MemoryStore, RecordStore, Transaction};
pub use sync::{PhotoSync, SyncSettings};
pub use types::{
    Album, EntityKind, Group, Identified, LikeEdge, LikeTarget, Limit, Owner, OwnerKind, Photo,
    PictureSize, RemoteId, User,
};
