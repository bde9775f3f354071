use chrono::Utc;
use dashmap::mapref::entry::Entry;
use tracing::info;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::assignment::{AssignmentEvent, AssignmentStatus, DriverStats};
use crate::state::AppState;

/// Binds a free driver to an unassigned order and appends the `assigned`
/// event. The one-active-order-per-driver invariant is serialized through
/// the `active_assignments` entry: of two racing assigns for the same
/// driver, exactly one claims the slot and the loser appends nothing.
pub fn assign(state: &AppState, order_id: Uuid, driver_id: Uuid) -> Result<AssignmentEvent, AppError> {
    if !state.drivers.contains_key(&driver_id) {
        return Err(AppError::NotFound(format!("driver {driver_id} not found")));
    }

    let mut order = state
        .orders
        .get_mut(&order_id)
        .ok_or_else(|| AppError::NotFound(format!("order {order_id} not found")))?;

    if order.driver_assignment_status != AssignmentStatus::Unassigned {
        return Err(AppError::Conflict(format!(
            "order {order_id} already has an assignment record"
        )));
    }

    match state.active_assignments.entry(driver_id) {
        Entry::Occupied(held) => {
            return Err(AppError::Conflict(format!(
                "driver {driver_id} already holds order {}",
                held.get()
            )));
        }
        Entry::Vacant(slot) => {
            slot.insert(order_id);
        }
    }

    let event = AssignmentEvent {
        order_id,
        driver_id,
        status: AssignmentStatus::Assigned,
        timestamp: Utc::now(),
    };

    order.driver_id = Some(driver_id);
    order.driver_assignment_status = AssignmentStatus::Assigned;
    order.assignment_history.push(event.clone());
    drop(order);

    state
        .metrics
        .ledger_events_total
        .with_label_values(&["assigned"])
        .inc();
    info!(order_id = %order_id, driver_id = %driver_id, "driver assigned");

    Ok(event)
}

pub fn complete(
    state: &AppState,
    order_id: Uuid,
    driver_id: Uuid,
) -> Result<AssignmentEvent, AppError> {
    settle(state, order_id, driver_id, AssignmentStatus::Completed)
}

pub fn revoke(
    state: &AppState,
    order_id: Uuid,
    driver_id: Uuid,
) -> Result<AssignmentEvent, AppError> {
    settle(state, order_id, driver_id, AssignmentStatus::Revoked)
}

fn settle(
    state: &AppState,
    order_id: Uuid,
    driver_id: Uuid,
    outcome: AssignmentStatus,
) -> Result<AssignmentEvent, AppError> {
    let event = {
        let mut order = state
            .orders
            .get_mut(&order_id)
            .ok_or_else(|| AppError::NotFound(format!("order {order_id} not found")))?;

        if order.driver_assignment_status != AssignmentStatus::Assigned
            || order.driver_id != Some(driver_id)
        {
            return Err(AppError::NotAssignedToDriver(format!(
                "order {order_id} is not actively assigned to driver {driver_id}"
            )));
        }

        let event = AssignmentEvent {
            order_id,
            driver_id,
            status: outcome,
            timestamp: Utc::now(),
        };

        order.driver_assignment_status = outcome;
        order.assignment_history.push(event.clone());
        event
    };

    state
        .active_assignments
        .remove_if(&driver_id, |_, held| *held == order_id);

    state
        .metrics
        .ledger_events_total
        .with_label_values(&[outcome.as_str()])
        .inc();
    info!(order_id = %order_id, driver_id = %driver_id, kind = outcome.as_str(), "assignment settled");

    Ok(event)
}

/// Delivery counts derived by replaying every order's assignment history.
/// Counters are never maintained as separately mutable fields, so they
/// cannot drift from the ledger.
pub fn driver_stats(state: &AppState, driver_id: Uuid) -> Result<DriverStats, AppError> {
    if !state.drivers.contains_key(&driver_id) {
        return Err(AppError::NotFound(format!("driver {driver_id} not found")));
    }

    let mut assigned = 0u64;
    let mut completed = 0u64;
    let mut revoked = 0u64;

    for entry in state.orders.iter() {
        for event in &entry.value().assignment_history {
            if event.driver_id != driver_id {
                continue;
            }
            match event.status {
                AssignmentStatus::Assigned => assigned += 1,
                AssignmentStatus::Completed => completed += 1,
                AssignmentStatus::Revoked => revoked += 1,
                AssignmentStatus::Unassigned => {}
            }
        }
    }

    let completion_rate = if assigned == 0 {
        0.0
    } else {
        completed as f64 / assigned as f64
    };

    Ok(DriverStats {
        driver_id,
        assigned,
        completed,
        revoked,
        completion_rate,
    })
}
