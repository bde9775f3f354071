use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::debug;

use crate::geo::haversine_km;
use crate::models::order::OrderStatus;
use crate::state::AppState;

/// Handle for a scheduled poll loop. Cancellation is immediate: a run that
/// is already in flight finishes, but nothing is rescheduled after
/// `cancel` returns.
pub struct PollHandle {
    cancel_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl PollHandle {
    pub fn cancel(&self) {
        let _ = self.cancel_tx.send(true);
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Cancels and waits for the loop to wind down.
    pub async fn stop(self) {
        self.cancel();
        let _ = self.task.await;
    }
}

/// Runs `task` immediately, then once per `every` until cancelled. Ticks
/// that fall due while a run is still in flight are skipped, never queued,
/// so runs cannot overlap.
pub fn schedule<F, Fut>(name: &'static str, every: Duration, mut task: F) -> PollHandle
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let (cancel_tx, mut cancel_rx) = watch::channel(false);

    let join = tokio::spawn(async move {
        let mut ticker = interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = cancel_rx.changed() => break,
                _ = ticker.tick() => {}
            }
            if *cancel_rx.borrow() {
                break;
            }

            task().await;
        }

        debug!(task = name, "poll loop stopped");
    });

    PollHandle {
        cancel_tx,
        task: join,
    }
}

/// Pending-order counter refresh. Read-only observer: reads the order store
/// and updates gauges, never the model.
pub async fn refresh_pending_orders(state: Arc<AppState>) {
    let pending = state
        .orders
        .iter()
        .filter(|entry| entry.value().status == OrderStatus::Pending)
        .count();

    state.metrics.pending_orders.set(pending as i64);
    state
        .metrics
        .poll_runs_total
        .with_label_values(&["pending_orders"])
        .inc();
    debug!(pending, "pending order count refreshed");
}

/// Driver roster and active-delivery refresh. Read-only observer.
pub async fn refresh_roster(state: Arc<AppState>) {
    let online = state.active_assignments.len();

    let mut active = 0usize;
    for entry in state.orders.iter() {
        let order = entry.value();
        if !matches!(order.status, OrderStatus::PickedUp | OrderStatus::InTransit) {
            continue;
        }
        active += 1;

        if let Some(position) = &order.driver_current_location {
            let remaining_km = haversine_km(&position.point(), &order.customer_location);
            debug!(order_id = %order.id, remaining_km, "delivery in progress");
        }
    }

    state.metrics.online_drivers.set(online as i64);
    state.metrics.active_deliveries.set(active as i64);
    state
        .metrics
        .poll_runs_total
        .with_label_values(&["roster"])
        .inc();
    debug!(online, active, "roster refreshed");
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use super::{refresh_pending_orders, refresh_roster, schedule};
    use crate::geo::GeoPoint;
    use crate::models::order::{Order, PaymentMethod};
    use crate::state::AppState;

    #[tokio::test]
    async fn task_runs_immediately_and_then_per_interval() {
        let runs = Arc::new(AtomicUsize::new(0));
        let counted = runs.clone();

        let handle = schedule("test", Duration::from_millis(40), move || {
            let counted = counted.clone();
            async move {
                counted.fetch_add(1, Ordering::SeqCst);
            }
        });

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 1);

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(runs.load(Ordering::SeqCst) >= 3);

        handle.stop().await;
    }

    #[tokio::test]
    async fn cancelled_loop_schedules_no_further_runs() {
        let runs = Arc::new(AtomicUsize::new(0));
        let counted = runs.clone();

        let handle = schedule("test", Duration::from_millis(20), move || {
            let counted = counted.clone();
            async move {
                counted.fetch_add(1, Ordering::SeqCst);
            }
        });

        tokio::time::sleep(Duration::from_millis(10)).await;
        handle.stop().await;

        let at_stop = runs.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(runs.load(Ordering::SeqCst), at_stop);
    }

    #[tokio::test]
    async fn slow_runs_do_not_overlap() {
        let in_flight = Arc::new(AtomicUsize::new(0));
        let overlaps = Arc::new(AtomicUsize::new(0));
        let flight = in_flight.clone();
        let seen = overlaps.clone();

        let handle = schedule("test", Duration::from_millis(10), move || {
            let flight = flight.clone();
            let seen = seen.clone();
            async move {
                if flight.fetch_add(1, Ordering::SeqCst) > 0 {
                    seen.fetch_add(1, Ordering::SeqCst);
                }
                // Longer than several intervals.
                tokio::time::sleep(Duration::from_millis(35)).await;
                flight.fetch_sub(1, Ordering::SeqCst);
            }
        });

        tokio::time::sleep(Duration::from_millis(150)).await;
        handle.stop().await;

        assert_eq!(overlaps.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn observers_update_gauges_without_touching_the_model() {
        let (state, _rx) = AppState::new(4);
        let state = Arc::new(state);

        let order = Order::new(
            PaymentMethod::Card,
            11.0,
            GeoPoint { lat: 28.61, lng: 77.21 },
            GeoPoint { lat: 28.54, lng: 77.39 },
        );
        let id = order.id;
        state.orders.insert(id, order);
        let before = serde_json::to_string(state.orders.get(&id).unwrap().value()).unwrap();

        refresh_pending_orders(state.clone()).await;
        refresh_roster(state.clone()).await;

        assert_eq!(state.metrics.pending_orders.get(), 1);
        assert_eq!(state.metrics.active_deliveries.get(), 0);

        let after = serde_json::to_string(state.orders.get(&id).unwrap().value()).unwrap();
        assert_eq!(after, before);
    }
}
