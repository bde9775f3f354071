use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::geo::GeoPoint;
use crate::models::assignment::{AssignmentEvent, AssignmentStatus};

/// Canonical lifecycle states. `ready_for_pickup` and `on_the_way` are
/// presentation names accepted on input and mapped to `picked_up` /
/// `in_transit`; stored data only ever uses the canonical scheme.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    DriverAssigned,
    #[serde(alias = "ready_for_pickup")]
    PickedUp,
    #[serde(alias = "on_the_way")]
    InTransit,
    Delivered,
    Cancelled,
}

impl OrderStatus {
    /// Next state in the forward chain, if any. `Cancelled` is reachable
    /// separately from any non-terminal state.
    pub fn successor(self) -> Option<OrderStatus> {
        match self {
            OrderStatus::Pending => Some(OrderStatus::DriverAssigned),
            OrderStatus::DriverAssigned => Some(OrderStatus::PickedUp),
            OrderStatus::PickedUp => Some(OrderStatus::InTransit),
            OrderStatus::InTransit => Some(OrderStatus::Delivered),
            OrderStatus::Delivered | OrderStatus::Cancelled => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, OrderStatus::Delivered | OrderStatus::Cancelled)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::DriverAssigned => "driver_assigned",
            OrderStatus::PickedUp => "picked_up",
            OrderStatus::InTransit => "in_transit",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Cancelled => "cancelled",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusStamp {
    pub status: OrderStatus,
    pub at: DateTime<Utc>,
}

/// Insertion-ordered, write-once map of status -> timestamp. The first
/// transition into a status wins; replays keep the original stamp, so the
/// sequence doubles as the transition history.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StatusTimestamps(Vec<StatusStamp>);

impl StatusTimestamps {
    pub fn record(&mut self, status: OrderStatus, at: DateTime<Utc>) {
        if self.get(status).is_none() {
            self.0.push(StatusStamp { status, at });
        }
    }

    pub fn get(&self, status: OrderStatus) -> Option<DateTime<Utc>> {
        self.0.iter().find(|s| s.status == status).map(|s| s.at)
    }

    pub fn iter(&self) -> impl Iterator<Item = &StatusStamp> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    CashOnDelivery,
    Card,
    Online,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Completed,
    Failed,
}

/// Most recent published driver position. Advisory only; never consulted by
/// transition validity.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct LocationSample {
    pub latitude: f64,
    pub longitude: f64,
    pub sampled_at: DateTime<Utc>,
}

impl LocationSample {
    pub fn point(&self) -> GeoPoint {
        GeoPoint {
            lat: self.latitude,
            lng: self.longitude,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: Uuid,
    pub status: OrderStatus,
    pub status_timestamps: StatusTimestamps,
    pub driver_id: Option<Uuid>,
    pub driver_assignment_status: AssignmentStatus,
    pub assignment_history: Vec<AssignmentEvent>,
    pub driver_current_location: Option<LocationSample>,
    pub payment_method: PaymentMethod,
    pub payment_status: PaymentStatus,
    pub collected_by: Option<Uuid>,
    pub collected_at: Option<DateTime<Utc>>,
    pub total_amount: f64,
    pub restaurant_location: GeoPoint,
    pub customer_location: GeoPoint,
    pub created_at: DateTime<Utc>,
}

impl Order {
    pub fn new(
        payment_method: PaymentMethod,
        total_amount: f64,
        restaurant_location: GeoPoint,
        customer_location: GeoPoint,
    ) -> Self {
        let now = Utc::now();
        let mut status_timestamps = StatusTimestamps::default();
        status_timestamps.record(OrderStatus::Pending, now);

        Self {
            id: Uuid::new_v4(),
            status: OrderStatus::Pending,
            status_timestamps,
            driver_id: None,
            driver_assignment_status: AssignmentStatus::Unassigned,
            assignment_history: Vec::new(),
            driver_current_location: None,
            payment_method,
            payment_status: PaymentStatus::Pending,
            collected_by: None,
            collected_at: None,
            total_amount,
            restaurant_location,
            customer_location,
            created_at: now,
        }
    }
}
