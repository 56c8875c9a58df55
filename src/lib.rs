//! Incremental sync of Odnoklassniki photo albums, photos and likes into a
//! local store.
//!
//! This crate bundles the configuration layer and the sync engine behind a
//! single dependency and offers [`open`] to wire them up from an
//! [`AppConfig`].

pub use ok_photos_config as config;
pub use ok_photos_sync as sync;

pub use ok_photos_config::{AppConfig, FetchLimits, FieldKind, FieldSets};
pub use ok_photos_sync::{
    Album, DuckDbStore, Group, Likable, Limit, MemoryStore, Photo, PhotoQuery, PhotoSync,
    RecordStore, RemoteApi, RemoteError, SyncError, SyncSettings, User,
};

use anyhow::{Context, Result};
use tracing::info;

/// Validate `config`, install logging and open the DuckDB store it names.
pub fn open<A: RemoteApi>(api: A, config: &AppConfig) -> Result<PhotoSync<A, DuckDbStore>> {
    config.validate().context("Invalid configuration")?;
    ok_photos_config::init_logging(&config.logging);

    let path = &config.database.path;
    let store = DuckDbStore::open(path)
        .with_context(|| format!("Failed to open store at {}", path.display()))?;
    info!("Opened photo store at {}", path.display());

    Ok(PhotoSync::from_config(api, store, config))
}
