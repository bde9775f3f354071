use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{error, info};
use uuid::Uuid;

use crate::engine::payment;
use crate::error::AppError;
use crate::models::order::{Order, OrderStatus};
use crate::state::AppState;

/// Who asked for the change. Authorization is delegated externally; the
/// actor is carried for logging only.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Actor {
    Driver,
    Restaurant,
    Admin,
    Customer,
    System,
}

impl Actor {
    pub fn as_str(self) -> &'static str {
        match self {
            Actor::Driver => "driver",
            Actor::Restaurant => "restaurant",
            Actor::Admin => "admin",
            Actor::Customer => "customer",
            Actor::System => "system",
        }
    }
}

/// Applies a status transition with compare-and-set semantics: the validity
/// rule is evaluated against the stored status under the same entry guard
/// that performs the write, so of two racing requests for the same step
/// exactly one wins and the loser fails with `InvalidTransition`.
///
/// Reaching `delivered` triggers payment reconciliation after the write
/// commits; a reconciliation failure is logged and never rolls the status
/// back.
pub fn transition(
    state: &AppState,
    order_id: Uuid,
    target: OrderStatus,
    actor: Actor,
) -> Result<Order, AppError> {
    let snapshot = {
        let mut order = state
            .orders
            .get_mut(&order_id)
            .ok_or_else(|| AppError::NotFound(format!("order {order_id} not found")))?;

        let current = order.status;
        let accepted = if target == OrderStatus::Cancelled {
            !current.is_terminal()
        } else {
            current.successor() == Some(target)
        };

        if !accepted {
            state
                .metrics
                .transitions_total
                .with_label_values(&["rejected"])
                .inc();
            return Err(AppError::InvalidTransition(format!(
                "cannot move order {order_id} from {} to {}",
                current.as_str(),
                target.as_str()
            )));
        }

        order.status = target;
        // Write-once: a replayed request finds the stamp already recorded.
        order.status_timestamps.record(target, Utc::now());
        order.clone()
    };

    state
        .metrics
        .transitions_total
        .with_label_values(&["accepted"])
        .inc();

    info!(
        order_id = %order_id,
        status = target.as_str(),
        actor = actor.as_str(),
        "order status changed"
    );

    if target == OrderStatus::Delivered {
        match payment::reconcile_on_delivered(state, order_id) {
            Ok(result) => {
                info!(order_id = %order_id, result = result.as_str(), "payment reconciled on delivery");
            }
            Err(err) => {
                // Delivery is authoritative; payment follow-up is retryable
                // via the finalize endpoint.
                error!(order_id = %order_id, error = %err, "payment reconciliation failed");
            }
        }
        return state
            .orders
            .get(&order_id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| AppError::NotFound(format!("order {order_id} not found")));
    }

    Ok(snapshot)
}
