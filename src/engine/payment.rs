use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::order::{OrderStatus, PaymentMethod, PaymentStatus};
use crate::state::AppState;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ReconciliationResult {
    /// Cash collected on delivery; payment marked completed exactly once.
    Collected {
        collected_by: Option<Uuid>,
        collected_at: chrono::DateTime<Utc>,
    },
    /// Payment was already finalized; replay observed and ignored.
    AlreadyCompleted,
    /// Card/online payments (and failed ones) belong to the external
    /// gateway, not this component.
    NotApplicable,
    /// The order has not reached `delivered` yet.
    NotDelivered,
}

impl ReconciliationResult {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReconciliationResult::Collected { .. } => "collected",
            ReconciliationResult::AlreadyCompleted => "already_completed",
            ReconciliationResult::NotApplicable => "not_applicable",
            ReconciliationResult::NotDelivered => "not_delivered",
        }
    }
}

/// Finalizes a pending cash-on-delivery payment once the order is
/// delivered. Idempotent: the decision is made against the payment status
/// read under the same entry guard that writes it, so concurrent calls
/// collect at most once and replays observe `AlreadyCompleted`.
pub fn reconcile_on_delivered(
    state: &AppState,
    order_id: Uuid,
) -> Result<ReconciliationResult, AppError> {
    let result = {
        let mut order = state.orders.get_mut(&order_id).ok_or_else(|| {
            AppError::ReconciliationFailed(format!("order {order_id} missing during reconciliation"))
        })?;

        if order.status != OrderStatus::Delivered {
            ReconciliationResult::NotDelivered
        } else if order.payment_status == PaymentStatus::Completed {
            ReconciliationResult::AlreadyCompleted
        } else if order.payment_method != PaymentMethod::CashOnDelivery
            || order.payment_status != PaymentStatus::Pending
        {
            ReconciliationResult::NotApplicable
        } else {
            let collected_at = Utc::now();
            order.payment_status = PaymentStatus::Completed;
            order.collected_by = order.driver_id;
            order.collected_at = Some(collected_at);
            ReconciliationResult::Collected {
                collected_by: order.driver_id,
                collected_at,
            }
        }
    };

    state
        .metrics
        .reconciliations_total
        .with_label_values(&[result.as_str()])
        .inc();

    if let ReconciliationResult::Collected { collected_by, .. } = &result {
        info!(
            order_id = %order_id,
            collected_by = ?collected_by,
            "cash on delivery payment collected"
        );
    }

    Ok(result)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use futures::future::join_all;

    use super::{reconcile_on_delivered, ReconciliationResult};
    use crate::engine::ledger;
    use crate::engine::lifecycle::{transition, Actor};
    use crate::error::AppError;
    use crate::geo::GeoPoint;
    use crate::models::driver::Driver;
    use crate::models::order::{Order, OrderStatus, PaymentMethod, PaymentStatus};
    use crate::state::AppState;

    fn delivered_order(state: &AppState, payment_method: PaymentMethod) -> uuid::Uuid {
        let order = Order::new(
            payment_method,
            18.75,
            GeoPoint { lat: 28.61, lng: 77.21 },
            GeoPoint { lat: 28.54, lng: 77.39 },
        );
        let id = order.id;
        state.orders.insert(id, order);

        for target in [
            OrderStatus::DriverAssigned,
            OrderStatus::PickedUp,
            OrderStatus::InTransit,
            OrderStatus::Delivered,
        ] {
            transition(state, id, target, Actor::System).unwrap();
        }
        id
    }

    #[test]
    fn delivery_transition_collects_cash_payment() {
        let (state, _rx) = AppState::new(16);
        let driver = Driver::new("Asha".to_string());
        let driver_id = driver.id;
        state.drivers.insert(driver_id, driver);

        let order = Order::new(
            PaymentMethod::CashOnDelivery,
            18.75,
            GeoPoint { lat: 28.61, lng: 77.21 },
            GeoPoint { lat: 28.54, lng: 77.39 },
        );
        let id = order.id;
        state.orders.insert(id, order);
        ledger::assign(&state, id, driver_id).unwrap();

        for target in [
            OrderStatus::DriverAssigned,
            OrderStatus::PickedUp,
            OrderStatus::InTransit,
            OrderStatus::Delivered,
        ] {
            transition(&state, id, target, Actor::Driver).unwrap();
        }

        let order = state.orders.get(&id).unwrap();
        assert_eq!(order.payment_status, PaymentStatus::Completed);
        assert_eq!(order.collected_by, Some(driver_id));
        assert!(order.collected_at.is_some());
    }

    #[test]
    fn replay_does_not_change_collected_at() {
        let (state, _rx) = AppState::new(16);
        let id = delivered_order(&state, PaymentMethod::CashOnDelivery);

        let first_collected_at = state.orders.get(&id).unwrap().collected_at.unwrap();

        let replay = reconcile_on_delivered(&state, id).unwrap();
        assert_eq!(replay, ReconciliationResult::AlreadyCompleted);

        let order = state.orders.get(&id).unwrap();
        assert_eq!(order.collected_at, Some(first_collected_at));
        assert_eq!(order.payment_status, PaymentStatus::Completed);
    }

    #[test]
    fn card_payment_is_left_to_the_gateway() {
        let (state, _rx) = AppState::new(16);
        let id = delivered_order(&state, PaymentMethod::Card);

        let result = reconcile_on_delivered(&state, id).unwrap();
        assert_eq!(result, ReconciliationResult::NotApplicable);

        let order = state.orders.get(&id).unwrap();
        assert_eq!(order.payment_status, PaymentStatus::Pending);
        assert!(order.collected_at.is_none());
    }

    #[test]
    fn undelivered_order_is_a_reported_noop() {
        let (state, _rx) = AppState::new(16);
        let order = Order::new(
            PaymentMethod::CashOnDelivery,
            18.75,
            GeoPoint { lat: 28.61, lng: 77.21 },
            GeoPoint { lat: 28.54, lng: 77.39 },
        );
        let id = order.id;
        state.orders.insert(id, order);

        let result = reconcile_on_delivered(&state, id).unwrap();
        assert_eq!(result, ReconciliationResult::NotDelivered);
        assert_eq!(
            state.orders.get(&id).unwrap().payment_status,
            PaymentStatus::Pending
        );
    }

    #[test]
    fn missing_order_reports_reconciliation_failure() {
        let (state, _rx) = AppState::new(16);
        let err = reconcile_on_delivered(&state, uuid::Uuid::new_v4()).unwrap_err();
        assert!(matches!(err, AppError::ReconciliationFailed(_)));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_finalize_collects_exactly_once() {
        let (state, _rx) = AppState::new(16);
        let state = Arc::new(state);
        let id = {
            let order = Order::new(
                PaymentMethod::CashOnDelivery,
                18.75,
                GeoPoint { lat: 28.61, lng: 77.21 },
                GeoPoint { lat: 28.54, lng: 77.39 },
            );
            let id = order.id;
            // Insert already delivered but unreconciled, so the racing
            // finalize calls below are the first to touch payment.
            let mut delivered = state.orders.entry(id).or_insert(order);
            delivered.status = OrderStatus::Delivered;
            drop(delivered);
            id
        };

        let outcomes = join_all((0..8).map(|_| {
            let state = state.clone();
            tokio::task::spawn_blocking(move || reconcile_on_delivered(&state, id))
        }))
        .await;

        let collected = outcomes
            .into_iter()
            .map(|joined| joined.unwrap().unwrap())
            .filter(|result| matches!(result, ReconciliationResult::Collected { .. }))
            .count();

        assert_eq!(collected, 1);
        let order = state.orders.get(&id).unwrap();
        assert_eq!(order.payment_status, PaymentStatus::Completed);
        assert!(order.collected_at.is_some());
    }
}
