use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AssignmentStatus {
    Unassigned,
    Assigned,
    Completed,
    Revoked,
}

impl AssignmentStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            AssignmentStatus::Unassigned => "unassigned",
            AssignmentStatus::Assigned => "assigned",
            AssignmentStatus::Completed => "completed",
            AssignmentStatus::Revoked => "revoked",
        }
    }
}

/// One accepted change to an order's driver assignment. Events are only ever
/// appended to `assignment_history`; rejected preconditions append nothing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssignmentEvent {
    pub order_id: Uuid,
    pub driver_id: Uuid,
    pub status: AssignmentStatus,
    pub timestamp: DateTime<Utc>,
}

/// Per-driver delivery statistics, derived by replaying assignment histories.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriverStats {
    pub driver_id: Uuid,
    pub assigned: u64,
    pub completed: u64,
    pub revoked: u64,
    pub completion_rate: f64,
}
