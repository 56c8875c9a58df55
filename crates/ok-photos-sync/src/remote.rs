//! Remote API client contract.
//!
//! Transport, request signing and session handling live behind
//! [`RemoteApi`]; the engine only ever sees method names, string parameters
//! and JSON object responses.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::RemoteError;
use crate::parse::Resource;

/// Request parameters of a remote call.
pub type ApiParams = BTreeMap<String, String>;

#[async_trait]
pub trait RemoteApi: Send + Sync {
    /// Execute `method` and return the decoded response object.
    async fn call(&self, method: &str, params: &ApiParams) -> Result<Resource, RemoteError>;
}

#[async_trait]
impl<T: RemoteApi + ?Sized> RemoteApi for Arc<T> {
    async fn call(&self, method: &str, params: &ApiParams) -> Result<Resource, RemoteError> {
        (**self).call(method, params).await
    }
}

/// Methods of the `photos` namespace used by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiMethod {
    GetAlbums,
    GetAlbumInfo,
    GetAlbumLikes,
    GetPhotos,
    GetInfo,
    GetPhotoLikes,
}

impl ApiMethod {
    pub fn name(self) -> &'static str {
        match self {
            ApiMethod::GetAlbums => "getAlbums",
            ApiMethod::GetAlbumInfo => "getAlbumInfo",
            ApiMethod::GetAlbumLikes => "getAlbumLikes",
            ApiMethod::GetPhotos => "getPhotos",
            ApiMethod::GetInfo => "getInfo",
            ApiMethod::GetPhotoLikes => "getPhotoLikes",
        }
    }

    /// Fully qualified method name, e.g. `photos.getAlbums`.
    pub fn qualified(self, namespace: &str) -> String {
        format!("{}.{}", namespace, self.name())
    }
}

/// Build an [`ApiParams`] map from key/value pairs.
pub fn params<I, K, V>(pairs: I) -> ApiParams
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: ToString,
{
    pairs
        .into_iter()
        .map(|(key, value)| (key.into(), value.to_string()))
        .collect()
}
