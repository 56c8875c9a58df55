//! Records mirrored from the remote API.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Remote numeric primary key.
pub type RemoteId = i64;

/// How many items a fetch should return.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Limit {
    /// Follow the pagination cursor until the remote side is exhausted.
    All,
    /// Stop once this many distinct items were collected.
    Count(usize),
}

/// Anything keyed by a remote id.
pub trait Identified {
    fn remote_id(&self) -> RemoteId;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Group,
    Album,
    Photo,
    User,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EntityKind::Group => "group",
            EntityKind::Album => "album",
            EntityKind::Photo => "photo",
            EntityKind::User => "user",
        };
        f.write_str(name)
    }
}

/// Kinds of owners an album or photo can have.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OwnerKind {
    Group,
}

impl OwnerKind {
    /// Value of the remote `author_type` field.
    pub fn as_str(self) -> &'static str {
        match self {
            OwnerKind::Group => "GROUP",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "GROUP" => Some(OwnerKind::Group),
            _ => None,
        }
    }
}

/// Reference to the owner of an album or photo.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Owner {
    pub kind: OwnerKind,
    pub id: RemoteId,
}

impl Owner {
    pub fn group(id: RemoteId) -> Self {
        Self {
            kind: OwnerKind::Group,
            id,
        }
    }
}

/// A group as known to the local store. Created by callers, resolved as
/// the owner of albums and photos.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    pub id: RemoteId,
    pub name: String,
}

impl Group {
    pub fn new(id: RemoteId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
        }
    }
}

impl Identified for Group {
    fn remote_id(&self) -> RemoteId {
        self.id
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Album {
    pub id: RemoteId,
    pub owner: Owner,
    pub owner_name: String,
    pub title: String,
    pub created: Option<NaiveDate>,
    pub photos_count: u32,
    pub likes_count: u32,
    pub last_like_date: Option<DateTime<Utc>>,
    pub fetched: Option<DateTime<Utc>>,
}

impl Album {
    pub fn new(id: RemoteId, owner: Owner) -> Self {
        Self {
            id,
            owner,
            owner_name: String::new(),
            title: String::new(),
            created: None,
            photos_count: 0,
            likes_count: 0,
            last_like_date: None,
            fetched: None,
        }
    }
}

/// The fixed resolution slots a photo is published in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum PictureSize {
    #[serde(rename = "pic50x50")]
    Pic50x50,
    #[serde(rename = "pic128x128")]
    Pic128x128,
    #[serde(rename = "pic190x190")]
    Pic190x190,
    #[serde(rename = "pic640x480")]
    Pic640x480,
    #[serde(rename = "pic1024x768")]
    Pic1024x768,
    #[serde(rename = "pic128max")]
    Pic128Max,
    #[serde(rename = "pic1024max")]
    Pic1024Max,
    #[serde(rename = "pic180min")]
    Pic180Min,
    #[serde(rename = "pic240min")]
    Pic240Min,
    #[serde(rename = "pic320min")]
    Pic320Min,
}

impl PictureSize {
    pub const ALL: [PictureSize; 10] = [
        PictureSize::Pic50x50,
        PictureSize::Pic128x128,
        PictureSize::Pic190x190,
        PictureSize::Pic640x480,
        PictureSize::Pic1024x768,
        PictureSize::Pic128Max,
        PictureSize::Pic1024Max,
        PictureSize::Pic180Min,
        PictureSize::Pic240Min,
        PictureSize::Pic320Min,
    ];

    /// Remote field name of this slot
    pub fn key(self) -> &'static str {
        match self {
            PictureSize::Pic50x50 => "pic50x50",
            PictureSize::Pic128x128 => "pic128x128",
            PictureSize::Pic190x190 => "pic190x190",
            PictureSize::Pic640x480 => "pic640x480",
            PictureSize::Pic1024x768 => "pic1024x768",
            PictureSize::Pic128Max => "pic128max",
            PictureSize::Pic1024Max => "pic1024max",
            PictureSize::Pic180Min => "pic180min",
            PictureSize::Pic240Min => "pic240min",
            PictureSize::Pic320Min => "pic320min",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Photo {
    pub id: RemoteId,
    pub album_id: RemoteId,
    pub owner: Owner,
    pub owner_name: String,
    pub text: String,
    pub created: Option<DateTime<Utc>>,
    pub comments_count: u32,
    pub likes_count: u32,
    pub last_like_date: Option<DateTime<Utc>>,
    pub standard_width: u32,
    pub standard_height: u32,
    pub pictures: BTreeMap<PictureSize, String>,
    pub fetched: Option<DateTime<Utc>>,
}

impl Photo {
    pub fn new(id: RemoteId, album_id: RemoteId, owner: Owner) -> Self {
        Self {
            id,
            album_id,
            owner,
            owner_name: String::new(),
            text: String::new(),
            created: None,
            comments_count: 0,
            likes_count: 0,
            last_like_date: None,
            standard_width: 0,
            standard_height: 0,
            pictures: BTreeMap::new(),
            fetched: None,
        }
    }

    pub fn picture(&self, size: PictureSize) -> Option<&str> {
        self.pictures.get(&size).map(String::as_str)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: RemoteId,
    pub name: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub gender: Option<String>,
    pub pic: Option<String>,
    pub fetched: Option<DateTime<Utc>>,
}

impl User {
    pub fn new(id: RemoteId) -> Self {
        Self {
            id,
            name: String::new(),
            first_name: None,
            last_name: None,
            gender: None,
            pic: None,
            fetched: None,
        }
    }
}

/// The entity side of a time-versioned like relation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum LikeTarget {
    Album(RemoteId),
    Photo(RemoteId),
}

impl LikeTarget {
    pub fn id(self) -> RemoteId {
        match self {
            LikeTarget::Album(id) | LikeTarget::Photo(id) => id,
        }
    }
}

impl fmt::Display for LikeTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LikeTarget::Album(id) => write!(f, "album {}", id),
            LikeTarget::Photo(id) => write!(f, "photo {}", id),
        }
    }
}

/// One membership interval `[time_from, time_to)` of a user in a like
/// relation. `time_to = None` marks the current membership.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LikeEdge {
    pub target: LikeTarget,
    pub user_id: RemoteId,
    pub time_from: DateTime<Utc>,
    pub time_to: Option<DateTime<Utc>>,
}

impl LikeEdge {
    pub fn is_open(&self) -> bool {
        self.time_to.is_none()
    }

    pub fn covers(&self, at: DateTime<Utc>) -> bool {
        self.time_from <= at && self.time_to.map_or(true, |end| at < end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn edge_interval_is_half_open() {
        let start = Utc::now();
        let end = start + Duration::seconds(10);
        let edge = LikeEdge {
            target: LikeTarget::Album(1),
            user_id: 7,
            time_from: start,
            time_to: Some(end),
        };

        assert!(edge.covers(start));
        assert!(edge.covers(start + Duration::seconds(5)));
        assert!(!edge.covers(end));
        assert!(!edge.covers(start - Duration::seconds(1)));
        assert!(!edge.is_open());
    }

    #[test]
    fn picture_sizes_serialize_as_remote_keys() {
        for size in PictureSize::ALL {
            let encoded = serde_json::to_value(size).expect("serialize");
            assert_eq!(encoded, serde_json::Value::String(size.key().to_string()));
        }
    }

    #[test]
    fn owner_kind_round_trips_author_type() {
        assert_eq!(OwnerKind::parse("GROUP"), Some(OwnerKind::Group));
        assert_eq!(OwnerKind::parse("USER"), None);
        assert_eq!(OwnerKind::Group.as_str(), "GROUP");
    }
}
