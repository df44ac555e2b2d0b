//! Runtime wiring
//!
//! Builds the production collaborators from configuration so binary crates
//! import `service::runtime::Runtime` without depending directly on
//! `common` or on the storage layout.

use std::sync::Arc;

use tracing::info;

use configs::AppConfig;
use models::Role;

use crate::api::HttpMarketplaceApi;
use crate::auth::{RouteGuard, RouteTable, SessionManager};
use crate::booking::BookingListController;
use crate::storage::JsonTokenStore;

pub type HttpSessionManager = SessionManager<HttpMarketplaceApi, JsonTokenStore>;

/// Process-wide context: one API client and the single session owner.
pub struct Runtime {
    pub api: Arc<HttpMarketplaceApi>,
    pub sessions: HttpSessionManager,
}

impl Runtime {
    /// Ensure the data directory exists, open the credential file and build
    /// the HTTP client. The session is left uninitialized.
    pub async fn bootstrap(cfg: &AppConfig) -> anyhow::Result<Self> {
        common::env::ensure_data_dir(&cfg.storage.data_dir).await?;
        let store = Arc::new(JsonTokenStore::open(cfg.token_path(), cfg.storage.token_key.clone())?);
        let api = Arc::new(HttpMarketplaceApi::new(&cfg.api)?);
        info!(api = %cfg.api.base_url, token_file = %cfg.token_path().display(), "runtime ready");
        Ok(Self { sessions: SessionManager::new(api.clone(), store), api })
    }

    /// A fresh controller for the `scope` dashboard.
    pub fn bookings(&self, scope: Role) -> BookingListController<HttpMarketplaceApi> {
        BookingListController::new(self.api.clone(), self.sessions.handle(), scope)
    }

    pub fn guard(&self) -> RouteGuard {
        RouteGuard::new(self.sessions.handle(), RouteTable::marketplace())
    }
}
