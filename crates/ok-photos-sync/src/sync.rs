//! The fetch orchestrator shared by album, photo and like synchronization.

use chrono::Utc;
use ok_photos_config::{AppConfig, FetchLimits, FieldKind, FieldSets};

use crate::error::{Result, SyncError};
use crate::parse::ParseContext;
use crate::remote::{ApiMethod, RemoteApi};
use crate::store::RecordStore;
use crate::types::{Group, Owner};

/// Settings the orchestrator reads on every call.
#[derive(Debug, Clone)]
pub struct SyncSettings {
    pub limits: FetchLimits,
    pub fields: FieldSets,
    /// Prefix of every remote method name
    pub namespace: String,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

impl From<&AppConfig> for SyncSettings {
    fn from(config: &AppConfig) -> Self {
        Self {
            limits: config.limits.clone(),
            fields: config.fields.clone(),
            namespace: config.api.methods_namespace.clone(),
        }
    }
}

/// Synchronizes albums, photos and likes of groups into a record store.
///
/// Every public fetch runs inside one store transaction: the store either
/// reflects the whole fetch or nothing of it. Calls are issued one at a
/// time.
pub struct PhotoSync<A, S> {
    pub(crate) api: A,
    pub(crate) store: S,
    pub(crate) settings: SyncSettings,
}

impl<A, S> PhotoSync<A, S>
where
    A: RemoteApi,
    S: RecordStore,
{
    pub fn new(api: A, store: S, settings: SyncSettings) -> Self {
        Self {
            api,
            store,
            settings,
        }
    }

    pub fn from_config(api: A, store: S, config: &AppConfig) -> Self {
        Self::new(api, store, SyncSettings::from(config))
    }

    pub fn api(&self) -> &A {
        &self.api
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn settings(&self) -> &SyncSettings {
        &self.settings
    }

    pub(crate) fn method(&self, method: ApiMethod) -> String {
        method.qualified(&self.settings.namespace)
    }

    /// The prefixed `fields` parameter for `kind`.
    pub(crate) fn request_fields(&self, kind: FieldKind) -> String {
        self.settings.fields.request_fields(kind, true)
    }

    pub(crate) fn parse_context(&self, group: &Group) -> ParseContext<'_> {
        ParseContext::new(&self.store, Utc::now()).with_owner(Owner::group(group.id))
    }
}

pub(crate) fn check_group(group: &Group) -> Result<()> {
    if group.id <= 0 {
        return Err(SyncError::InvalidArgument(format!(
            "group id must be positive, got {}",
            group.id
        )));
    }
    Ok(())
}
