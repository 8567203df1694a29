use std::sync::Arc;

use crate::config::ArchZeroConfig;
use crate::error::ArchZeroError;
use crate::guard::AccessGuard;
use crate::http::ApiClient;
use crate::imports::ImportJobService;
use crate::models::Role;
use crate::relationships::RelationshipService;
use crate::session::SessionStore;
use crate::storage::{FileStorage, KeyValueStorage};

/// Everything a UI layer needs, wired to one storage and one API gateway.
pub struct ArchZeroClient {
    pub session: SessionStore,
    pub relationships: RelationshipService,
    pub imports: ImportJobService,
    config: ArchZeroConfig,
}

impl ArchZeroClient {
    /// Load configuration from `path` (see [`ArchZeroConfig::load`]) and build
    /// against it.
    pub fn load(path: &str) -> Result<Self, ArchZeroError> {
        let config = ArchZeroConfig::load(path)?;
        Self::from_config(config)
    }

    /// Build against file storage in the configured directory, rehydrating
    /// any persisted session.
    pub fn from_config(config: ArchZeroConfig) -> Result<Self, ArchZeroError> {
        let dir = config.storage.resolved_dir();
        tracing::debug!(storage_dir = %dir.display(), base_url = %config.api.base_url, "Building ArchZero client");
        let storage: Arc<dyn KeyValueStorage> = Arc::new(FileStorage::new(dir));
        Self::with_storage(config, storage)
    }

    pub fn with_storage(
        config: ArchZeroConfig,
        storage: Arc<dyn KeyValueStorage>,
    ) -> Result<Self, ArchZeroError> {
        let api = ApiClient::new(&config.api, storage)?;
        Ok(Self {
            session: SessionStore::open(api.clone()),
            relationships: RelationshipService::new(api.clone()),
            imports: ImportJobService::new(api),
            config,
        })
    }

    /// A guard for a view restricted to `allowed_roles`, honouring the
    /// configured enforcement flag.
    pub fn guard(&self, allowed_roles: impl IntoIterator<Item = Role>) -> AccessGuard {
        AccessGuard::from_config(&self.config.guard, allowed_roles)
    }

    pub fn config(&self) -> &ArchZeroConfig {
        &self.config
    }
}
