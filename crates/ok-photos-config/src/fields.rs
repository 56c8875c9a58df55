//! Remote field-set resolution.
//!
//! The `photos.*` methods only return the fields named in the `fields`
//! request parameter. Each entity kind has its own set, and the API expects
//! them scoped by the kind prefix (`group_album.title`).

use serde::{Deserialize, Serialize};
use std::fmt;

/// Entity kinds that have a requestable field set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    GroupAlbum,
    GroupPhoto,
    User,
}

impl FieldKind {
    pub fn prefix(self) -> &'static str {
        match self {
            FieldKind::GroupAlbum => "group_album",
            FieldKind::GroupPhoto => "group_photo",
            FieldKind::User => "user",
        }
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.prefix())
    }
}

/// Field names requested per entity kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FieldSets {
    pub group_album: Vec<String>,
    pub group_photo: Vec<String>,
    pub user: Vec<String>,
}

impl Default for FieldSets {
    fn default() -> Self {
        Self {
            group_album: to_owned(&[
                "aid",
                "title",
                "created",
                "photos_count",
                "like_summary",
                "author_name",
                "author_type",
                "group_id",
            ]),
            group_photo: to_owned(&[
                "id",
                "album_id",
                "text",
                "created_ms",
                "comments_count",
                "like_summary",
                "standard_width",
                "standard_height",
                "author_name",
                "author_type",
                "group_id",
                "pic50x50",
                "pic128x128",
                "pic190x190",
                "pic640x480",
                "pic1024x768",
                "pic128max",
                "pic1024max",
                "pic180min",
                "pic240min",
                "pic320min",
            ]),
            user: to_owned(&[
                "uid",
                "name",
                "first_name",
                "last_name",
                "gender",
                "pic128x128",
            ]),
        }
    }
}

impl FieldSets {
    pub fn fields(&self, kind: FieldKind) -> &[String] {
        match kind {
            FieldKind::GroupAlbum => &self.group_album,
            FieldKind::GroupPhoto => &self.group_photo,
            FieldKind::User => &self.user,
        }
    }

    /// Comma-joined value for the `fields` request parameter.
    ///
    /// With `prefixed` every name is scoped by the kind prefix, which is what
    /// the group-scoped `photos.*` methods expect.
    pub fn request_fields(&self, kind: FieldKind, prefixed: bool) -> String {
        self.fields(kind)
            .iter()
            .map(|name| {
                if prefixed {
                    format!("{}.{}", kind.prefix(), name)
                } else {
                    name.clone()
                }
            })
            .collect::<Vec<_>>()
            .join(",")
    }

    pub(crate) fn empty_kinds(&self) -> Vec<FieldKind> {
        [FieldKind::GroupAlbum, FieldKind::GroupPhoto, FieldKind::User]
            .into_iter()
            .filter(|kind| self.fields(*kind).is_empty())
            .collect()
    }
}

fn to_owned(names: &[&str]) -> Vec<String> {
    names.iter().map(|name| name.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefixed_fields_are_scoped_by_kind() {
        let sets = FieldSets {
            group_album: vec!["aid".into(), "title".into()],
            ..FieldSets::default()
        };

        assert_eq!(
            sets.request_fields(FieldKind::GroupAlbum, true),
            "group_album.aid,group_album.title"
        );
        assert_eq!(sets.request_fields(FieldKind::GroupAlbum, false), "aid,title");
    }

    #[test]
    fn defaults_cover_every_picture_slot() {
        let sets = FieldSets::default();
        let pics = sets
            .fields(FieldKind::GroupPhoto)
            .iter()
            .filter(|name| name.starts_with("pic"))
            .count();
        assert_eq!(pics, 10);
        assert!(sets.empty_kinds().is_empty());
    }
}
