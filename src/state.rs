use dashmap::DashMap;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::models::driver::Driver;
use crate::models::order::{LocationSample, Order};
use crate::observability::metrics::Metrics;

/// A location publish bound for the single writer task.
#[derive(Debug, Clone, Copy)]
pub struct LocationUpdate {
    pub order_id: Uuid,
    pub sample: LocationSample,
}

pub struct AppState {
    pub orders: DashMap<Uuid, Order>,
    pub drivers: DashMap<Uuid, Driver>,
    /// driver id -> order id for the one order a driver may actively hold.
    /// Written only by ledger operations, so it stays consistent with the
    /// assignment histories.
    pub active_assignments: DashMap<Uuid, Uuid>,
    pub location_tx: mpsc::Sender<LocationUpdate>,
    pub metrics: Metrics,
}

impl AppState {
    pub fn new(location_queue_size: usize) -> (Self, mpsc::Receiver<LocationUpdate>) {
        let (location_tx, location_rx) = mpsc::channel(location_queue_size);

        (
            Self {
                orders: DashMap::new(),
                drivers: DashMap::new(),
                active_assignments: DashMap::new(),
                location_tx,
                metrics: Metrics::new(),
            },
            location_rx,
        )
    }
}
