use std::sync::Arc;

use crate::ledger::Ledger;
use crate::observability::Metrics;
use crate::store::FjallStore;

#[derive(Clone)]
pub struct AppState {
    pub ledger: Ledger,
    pub metrics: Arc<Metrics>,
    /// Present with the fjall backend; drives the store health component
    pub disk: Option<Arc<FjallStore>>,
}

impl AppState {
    pub fn new(ledger: Ledger, metrics: Arc<Metrics>) -> Self {
        Self {
            ledger,
            metrics,
            disk: None,
        }
    }

    pub fn with_disk(mut self, disk: Arc<FjallStore>) -> Self {
        self.disk = Some(disk);
        self
    }
}
