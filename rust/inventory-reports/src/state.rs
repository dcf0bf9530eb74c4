use crate::{config::AppConfig, listing::InventoryListing, reports::ReportEngine};
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub reports: ReportEngine,
    pub listing: InventoryListing,
}

impl AppState {
    pub fn new(config: Arc<AppConfig>, reports: ReportEngine, listing: InventoryListing) -> Self {
        Self {
            config,
            reports,
            listing,
        }
    }
}
