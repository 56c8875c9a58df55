//! DuckDB-backed record store.

use anyhow::{anyhow, Context};
use chrono::{DateTime, NaiveDate, Utc};
use duckdb::{params, Connection};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

use super::RecordStore;
use crate::error::{Result, SyncError};
use crate::types::{
    Album, Group, LikeEdge, LikeTarget, Owner, OwnerKind, Photo, PictureSize, RemoteId, User,
};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS owner_groups (
    id BIGINT PRIMARY KEY,
    name TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS albums (
    id BIGINT PRIMARY KEY,
    owner_kind TEXT NOT NULL,
    owner_id BIGINT NOT NULL,
    owner_name TEXT NOT NULL,
    title TEXT NOT NULL,
    created TEXT,
    photos_count BIGINT NOT NULL,
    likes_count BIGINT NOT NULL,
    last_like_date BIGINT,
    fetched BIGINT
);

CREATE TABLE IF NOT EXISTS photos (
    id BIGINT PRIMARY KEY,
    album_id BIGINT NOT NULL,
    owner_kind TEXT NOT NULL,
    owner_id BIGINT NOT NULL,
    owner_name TEXT NOT NULL,
    text TEXT NOT NULL,
    created BIGINT,
    comments_count BIGINT NOT NULL,
    likes_count BIGINT NOT NULL,
    last_like_date BIGINT,
    standard_width BIGINT NOT NULL,
    standard_height BIGINT NOT NULL,
    pictures TEXT NOT NULL,
    fetched BIGINT
);

CREATE TABLE IF NOT EXISTS users (
    id BIGINT PRIMARY KEY,
    name TEXT NOT NULL,
    first_name TEXT,
    last_name TEXT,
    gender TEXT,
    pic TEXT,
    fetched BIGINT
);

CREATE TABLE IF NOT EXISTS album_like_users (
    target_id BIGINT NOT NULL,
    user_id BIGINT NOT NULL,
    time_from BIGINT NOT NULL,
    time_to BIGINT
);

CREATE TABLE IF NOT EXISTS photo_like_users (
    target_id BIGINT NOT NULL,
    user_id BIGINT NOT NULL,
    time_from BIGINT NOT NULL,
    time_to BIGINT
);
"#;

const ALBUM_COLUMNS: &str = "id, owner_kind, owner_id, owner_name, title, created, photos_count, \
     likes_count, last_like_date, fetched";

const PHOTO_COLUMNS: &str = "id, album_id, owner_kind, owner_id, owner_name, text, created, \
     comments_count, likes_count, last_like_date, standard_width, standard_height, pictures, fetched";

/// Record store persisted in a DuckDB database file.
///
/// Timestamps are stored as microseconds since the Unix epoch.
#[derive(Clone)]
pub struct DuckDbStore {
    conn: Arc<Mutex<Connection>>,
}

impl DuckDbStore {
    /// Open (or create) the database at `path` and ensure the schema exists.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("creating database directory {}", parent.display()))?;
            }
        }
        let conn = Connection::open(path)
            .with_context(|| format!("opening database {}", path.display()))?;
        debug!("Opened record store at {}", path.display());
        Self::with_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("opening in-memory database")?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA).context("creating schema")?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| SyncError::Storage(anyhow!("database connection lock poisoned")))
    }
}

fn edge_table(target: LikeTarget) -> &'static str {
    match target {
        LikeTarget::Album(_) => "album_like_users",
        LikeTarget::Photo(_) => "photo_like_users",
    }
}

fn to_micros(at: DateTime<Utc>) -> i64 {
    at.timestamp_micros()
}

fn from_micros(raw: Option<i64>) -> Option<DateTime<Utc>> {
    raw.and_then(DateTime::from_timestamp_micros)
}

fn required_micros(raw: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp_micros(raw)
        .ok_or_else(|| SyncError::Storage(anyhow!("timestamp out of range: {}", raw)))
}

fn owner_from_row(kind: &str, id: RemoteId) -> Result<Owner> {
    let kind = OwnerKind::parse(kind)
        .ok_or_else(|| SyncError::Storage(anyhow!("unknown owner kind in store: {}", kind)))?;
    Ok(Owner { kind, id })
}

fn count_from_row(raw: i64) -> u32 {
    u32::try_from(raw).unwrap_or(u32::MAX)
}

struct AlbumRow {
    id: i64,
    owner_kind: String,
    owner_id: i64,
    owner_name: String,
    title: String,
    created: Option<String>,
    photos_count: i64,
    likes_count: i64,
    last_like_date: Option<i64>,
    fetched: Option<i64>,
}

impl AlbumRow {
    fn from_row(row: &duckdb::Row<'_>) -> duckdb::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            owner_kind: row.get(1)?,
            owner_id: row.get(2)?,
            owner_name: row.get(3)?,
            title: row.get(4)?,
            created: row.get(5)?,
            photos_count: row.get(6)?,
            likes_count: row.get(7)?,
            last_like_date: row.get(8)?,
            fetched: row.get(9)?,
        })
    }

    fn into_album(self) -> Result<Album> {
        let created = self
            .created
            .map(|raw| {
                NaiveDate::parse_from_str(&raw, "%Y-%m-%d")
                    .with_context(|| format!("malformed album date {}", raw))
            })
            .transpose()?;
        Ok(Album {
            id: self.id,
            owner: owner_from_row(&self.owner_kind, self.owner_id)?,
            owner_name: self.owner_name,
            title: self.title,
            created,
            photos_count: count_from_row(self.photos_count),
            likes_count: count_from_row(self.likes_count),
            last_like_date: from_micros(self.last_like_date),
            fetched: from_micros(self.fetched),
        })
    }
}

struct PhotoRow {
    id: i64,
    album_id: i64,
    owner_kind: String,
    owner_id: i64,
    owner_name: String,
    text: String,
    created: Option<i64>,
    comments_count: i64,
    likes_count: i64,
    last_like_date: Option<i64>,
    standard_width: i64,
    standard_height: i64,
    pictures: String,
    fetched: Option<i64>,
}

impl PhotoRow {
    fn from_row(row: &duckdb::Row<'_>) -> duckdb::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            album_id: row.get(1)?,
            owner_kind: row.get(2)?,
            owner_id: row.get(3)?,
            owner_name: row.get(4)?,
            text: row.get(5)?,
            created: row.get(6)?,
            comments_count: row.get(7)?,
            likes_count: row.get(8)?,
            last_like_date: row.get(9)?,
            standard_width: row.get(10)?,
            standard_height: row.get(11)?,
            pictures: row.get(12)?,
            fetched: row.get(13)?,
        })
    }

    fn into_photo(self) -> Result<Photo> {
        let pictures: BTreeMap<PictureSize, String> = serde_json::from_str(&self.pictures)
            .with_context(|| format!("malformed pictures of photo {}", self.id))?;
        Ok(Photo {
            id: self.id,
            album_id: self.album_id,
            owner: owner_from_row(&self.owner_kind, self.owner_id)?,
            owner_name: self.owner_name,
            text: self.text,
            created: from_micros(self.created),
            comments_count: count_from_row(self.comments_count),
            likes_count: count_from_row(self.likes_count),
            last_like_date: from_micros(self.last_like_date),
            standard_width: count_from_row(self.standard_width),
            standard_height: count_from_row(self.standard_height),
            pictures,
            fetched: from_micros(self.fetched),
        })
    }
}

fn user_from_row(row: &duckdb::Row<'_>) -> duckdb::Result<(User, Option<i64>)> {
    Ok((
        User {
            id: row.get(0)?,
            name: row.get(1)?,
            first_name: row.get(2)?,
            last_name: row.get(3)?,
            gender: row.get(4)?,
            pic: row.get(5)?,
            fetched: None,
        },
        row.get(6)?,
    ))
}

impl RecordStore for DuckDbStore {
    fn begin(&self) -> Result<()> {
        self.conn()?
            .execute_batch("BEGIN TRANSACTION")
            .context("beginning transaction")?;
        Ok(())
    }

    fn commit(&self) -> Result<()> {
        self.conn()?
            .execute_batch("COMMIT")
            .context("committing transaction")?;
        Ok(())
    }

    fn rollback(&self) -> Result<()> {
        self.conn()?
            .execute_batch("ROLLBACK")
            .context("rolling back transaction")?;
        Ok(())
    }

    fn upsert_group(&self, group: &Group) -> Result<()> {
        self.conn()?
            .execute(
                "INSERT OR REPLACE INTO owner_groups (id, name) VALUES (?, ?)",
                params![group.id, group.name],
            )
            .with_context(|| format!("upserting group {}", group.id))?;
        Ok(())
    }

    fn get_group(&self, id: RemoteId) -> Result<Option<Group>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare("SELECT id, name FROM owner_groups WHERE id = ?")
            .context("preparing group lookup")?;
        let mut rows = stmt
            .query_map(params![id], |row| {
                Ok(Group {
                    id: row.get(0)?,
                    name: row.get(1)?,
                })
            })
            .with_context(|| format!("loading group {}", id))?;
        Ok(rows.next().transpose().context("reading group row")?)
    }

    fn upsert_album(&self, album: &Album) -> Result<()> {
        let sql = format!(
            "INSERT OR REPLACE INTO albums ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            ALBUM_COLUMNS
        );
        self.conn()?
            .execute(
                &sql,
                params![
                    album.id,
                    album.owner.kind.as_str(),
                    album.owner.id,
                    album.owner_name,
                    album.title,
                    album.created.map(|date| date.format("%Y-%m-%d").to_string()),
                    i64::from(album.photos_count),
                    i64::from(album.likes_count),
                    album.last_like_date.map(to_micros),
                    album.fetched.map(to_micros),
                ],
            )
            .with_context(|| format!("upserting album {}", album.id))?;
        Ok(())
    }

    fn get_album(&self, id: RemoteId) -> Result<Option<Album>> {
        let conn = self.conn()?;
        let sql = format!("SELECT {} FROM albums WHERE id = ?", ALBUM_COLUMNS);
        let mut stmt = conn.prepare(&sql).context("preparing album lookup")?;
        let mut rows = stmt
            .query_map(params![id], AlbumRow::from_row)
            .with_context(|| format!("loading album {}", id))?;
        match rows.next().transpose().context("reading album row")? {
            Some(row) => row.into_album().map(Some),
            None => Ok(None),
        }
    }

    fn albums_for_owner(&self, owner: Owner) -> Result<Vec<Album>> {
        let conn = self.conn()?;
        let sql = format!(
            "SELECT {} FROM albums WHERE owner_kind = ? AND owner_id = ? ORDER BY id",
            ALBUM_COLUMNS
        );
        let mut stmt = conn.prepare(&sql).context("preparing album query")?;
        let rows = stmt
            .query_map(params![owner.kind.as_str(), owner.id], AlbumRow::from_row)
            .context("querying albums")?
            .collect::<duckdb::Result<Vec<_>>>()
            .context("reading album rows")?;
        rows.into_iter().map(AlbumRow::into_album).collect()
    }

    fn upsert_photo(&self, photo: &Photo) -> Result<()> {
        let pictures = serde_json::to_string(&photo.pictures)
            .with_context(|| format!("encoding pictures of photo {}", photo.id))?;
        let sql = format!(
            "INSERT OR REPLACE INTO photos ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            PHOTO_COLUMNS
        );
        self.conn()?
            .execute(
                &sql,
                params![
                    photo.id,
                    photo.album_id,
                    photo.owner.kind.as_str(),
                    photo.owner.id,
                    photo.owner_name,
                    photo.text,
                    photo.created.map(to_micros),
                    i64::from(photo.comments_count),
                    i64::from(photo.likes_count),
                    photo.last_like_date.map(to_micros),
                    i64::from(photo.standard_width),
                    i64::from(photo.standard_height),
                    pictures,
                    photo.fetched.map(to_micros),
                ],
            )
            .with_context(|| format!("upserting photo {}", photo.id))?;
        Ok(())
    }

    fn get_photo(&self, id: RemoteId) -> Result<Option<Photo>> {
        let conn = self.conn()?;
        let sql = format!("SELECT {} FROM photos WHERE id = ?", PHOTO_COLUMNS);
        let mut stmt = conn.prepare(&sql).context("preparing photo lookup")?;
        let mut rows = stmt
            .query_map(params![id], PhotoRow::from_row)
            .with_context(|| format!("loading photo {}", id))?;
        match rows.next().transpose().context("reading photo row")? {
            Some(row) => row.into_photo().map(Some),
            None => Ok(None),
        }
    }

    fn photos_in_album(&self, album_id: RemoteId) -> Result<Vec<Photo>> {
        let conn = self.conn()?;
        let sql = format!(
            "SELECT {} FROM photos WHERE album_id = ? ORDER BY id",
            PHOTO_COLUMNS
        );
        let mut stmt = conn.prepare(&sql).context("preparing photo query")?;
        let rows = stmt
            .query_map(params![album_id], PhotoRow::from_row)
            .context("querying photos")?
            .collect::<duckdb::Result<Vec<_>>>()
            .context("reading photo rows")?;
        rows.into_iter().map(PhotoRow::into_photo).collect()
    }

    fn upsert_user(&self, user: &User) -> Result<()> {
        self.conn()?
            .execute(
                "INSERT OR REPLACE INTO users (id, name, first_name, last_name, gender, pic, fetched) \
                 VALUES (?, ?, ?, ?, ?, ?, ?)",
                params![
                    user.id,
                    user.name,
                    user.first_name,
                    user.last_name,
                    user.gender,
                    user.pic,
                    user.fetched.map(to_micros),
                ],
            )
            .with_context(|| format!("upserting user {}", user.id))?;
        Ok(())
    }

    fn get_user(&self, id: RemoteId) -> Result<Option<User>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT id, name, first_name, last_name, gender, pic, fetched FROM users WHERE id = ?",
            )
            .context("preparing user lookup")?;
        let mut rows = stmt
            .query_map(params![id], user_from_row)
            .with_context(|| format!("loading user {}", id))?;
        Ok(rows
            .next()
            .transpose()
            .context("reading user row")?
            .map(|(mut user, fetched)| {
                user.fetched = from_micros(fetched);
                user
            }))
    }

    fn like_edges(&self, target: LikeTarget) -> Result<Vec<LikeEdge>> {
        let conn = self.conn()?;
        let sql = format!(
            "SELECT user_id, time_from, time_to FROM {} WHERE target_id = ? ORDER BY time_from, user_id",
            edge_table(target)
        );
        let mut stmt = conn.prepare(&sql).context("preparing like edge query")?;
        let rows = stmt
            .query_map(params![target.id()], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, Option<i64>>(2)?,
                ))
            })
            .with_context(|| format!("querying likes of {}", target))?
            .collect::<duckdb::Result<Vec<_>>>()
            .context("reading like edge rows")?;

        rows.into_iter()
            .map(|(user_id, time_from, time_to)| {
                Ok(LikeEdge {
                    target,
                    user_id,
                    time_from: required_micros(time_from)?,
                    time_to: from_micros(time_to),
                })
            })
            .collect()
    }

    fn open_like(&self, target: LikeTarget, user_id: RemoteId, at: DateTime<Utc>) -> Result<()> {
        let conn = self.conn()?;
        let table = edge_table(target);
        let open: i64 = conn
            .query_row(
                &format!(
                    "SELECT COUNT(*) FROM {} WHERE target_id = ? AND user_id = ? AND time_to IS NULL",
                    table
                ),
                params![target.id(), user_id],
                |row| row.get(0),
            )
            .with_context(|| format!("checking like of user {} on {}", user_id, target))?;
        if open == 0 {
            conn.execute(
                &format!(
                    "INSERT INTO {} (target_id, user_id, time_from, time_to) VALUES (?, ?, ?, NULL)",
                    table
                ),
                params![target.id(), user_id, to_micros(at)],
            )
            .with_context(|| format!("opening like of user {} on {}", user_id, target))?;
        }
        Ok(())
    }

    fn close_like(&self, target: LikeTarget, user_id: RemoteId, at: DateTime<Utc>) -> Result<()> {
        self.conn()?
            .execute(
                &format!(
                    "UPDATE {} SET time_to = ? WHERE target_id = ? AND user_id = ? AND time_to IS NULL",
                    edge_table(target)
                ),
                params![to_micros(at), target.id(), user_id],
            )
            .with_context(|| format!("closing like of user {} on {}", user_id, target))?;
        Ok(())
    }
}
