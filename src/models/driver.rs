use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::order::LocationSample;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OnlineStatus {
    Online,
    Offline,
}

/// Registry entry for a delivery driver. Operational fields (online status,
/// current order, current location) are derived from the orders the driver
/// holds, not stored here, so they cannot drift.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Driver {
    pub id: Uuid,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

impl Driver {
    pub fn new(name: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            name,
            created_at: Utc::now(),
        }
    }
}

/// Driver as the roster endpoints report it: registry fields plus state
/// derived from the active assignment, if any.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriverView {
    pub id: Uuid,
    pub name: String,
    pub online_status: OnlineStatus,
    pub current_order: Option<Uuid>,
    pub current_location: Option<LocationSample>,
}
