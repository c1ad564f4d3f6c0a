//! Shared state handed to every handler.

use crate::{
    repository::sqlite::SqliteRepository,
    services::{
        catalog::CatalogService,
        delivery::DeliveryService,
        ingest::IngestService,
        photo_store::{CdnStore, LocalStore},
    },
};

#[derive(Clone)]
pub struct AppState {
    pub repo: SqliteRepository,
    pub catalog: CatalogService<SqliteRepository>,
    pub delivery: DeliveryService<SqliteRepository>,
    pub ingest: IngestService<SqliteRepository>,
    pub local: LocalStore,
    /// `None` when no CDN credentials were configured.
    pub cdn: Option<CdnStore>,
}

impl AppState {
    pub fn new(repo: SqliteRepository, local: LocalStore, cdn: Option<CdnStore>) -> Self {
        Self {
            catalog: CatalogService::new(repo.clone()),
            delivery: DeliveryService::new(repo.clone(), local.clone()),
            ingest: IngestService::new(repo.clone()),
            repo,
            local,
            cdn,
        }
    }
}
