use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::AppError;
use crate::location::sampler::{LocationSampler, PositionSource};
use crate::models::order::LocationSample;
use crate::state::{AppState, LocationUpdate};

/// Hands a sample to the location writer. Fire-and-forget from the caller's
/// point of view: a full or closed queue is a transient failure the next
/// sample supersedes.
pub fn publish(state: &AppState, order_id: Uuid, sample: LocationSample) -> Result<(), AppError> {
    if !state.orders.contains_key(&order_id) {
        return Err(AppError::NotFound(format!("order {order_id} not found")));
    }

    state
        .location_tx
        .try_send(LocationUpdate { order_id, sample })
        .map_err(|err| AppError::StorageUnavailable(format!("location queue: {err}")))
}

/// Drives a sampler for one order until the order reaches a terminal status
/// or disappears. Publish failures are logged and never retried for that
/// sample; capability errors are logged and sampling continues.
pub async fn run_publisher<S: PositionSource>(
    mut sampler: LocationSampler<S>,
    state: Arc<AppState>,
    order_id: Uuid,
) {
    info!(order_id = %order_id, "location publisher started");

    loop {
        let done = state
            .orders
            .get(&order_id)
            .map(|order| order.status.is_terminal())
            .unwrap_or(true);
        if done {
            break;
        }

        match sampler.next_sample().await {
            Ok(sample) => {
                if let Err(err) = publish(&state, order_id, sample) {
                    state
                        .metrics
                        .location_samples_total
                        .with_label_values(&["dropped"])
                        .inc();
                    warn!(order_id = %order_id, error = %err, "location publish dropped");
                }
            }
            Err(err) => {
                state
                    .metrics
                    .location_samples_total
                    .with_label_values(&["capability_error"])
                    .inc();
                warn!(order_id = %order_id, error = %err, "position sample failed");
            }
        }
    }

    info!(order_id = %order_id, "location publisher stopped");
}

/// Single consumer of the location queue. Applies last-write-wins with a
/// staleness guard: a sample older than the stored one is dropped, so a
/// reordered publish cannot overwrite a newer position.
pub async fn run_location_writer(state: Arc<AppState>, rx: mpsc::Receiver<LocationUpdate>) {
    info!("location writer started");

    let mut updates = ReceiverStream::new(rx);
    while let Some(update) = updates.next().await {
        apply_update(&state, update);
    }

    warn!("location writer stopped: queue closed");
}

pub fn apply_update(state: &AppState, update: LocationUpdate) {
    let Some(mut order) = state.orders.get_mut(&update.order_id) else {
        state
            .metrics
            .location_samples_total
            .with_label_values(&["unknown_order"])
            .inc();
        debug!(order_id = %update.order_id, "location for unknown order discarded");
        return;
    };

    if let Some(stored) = &order.driver_current_location {
        if update.sample.sampled_at <= stored.sampled_at {
            state
                .metrics
                .location_samples_total
                .with_label_values(&["stale"])
                .inc();
            debug!(order_id = %update.order_id, "stale location sample dropped");
            return;
        }
    }

    order.driver_current_location = Some(update.sample);
    state
        .metrics
        .location_samples_total
        .with_label_values(&["accepted"])
        .inc();
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use chrono::Utc;

    use super::{apply_update, publish, run_location_writer, run_publisher};
    use crate::engine::lifecycle::{transition, Actor};
    use crate::error::AppError;
    use crate::geo::GeoPoint;
    use crate::location::sampler::{LocationSampler, PositionError, PositionSource, SamplerConfig};
    use crate::models::order::{LocationSample, Order, OrderStatus, PaymentMethod};
    use crate::state::{AppState, LocationUpdate};

    fn sample(lat: f64, lng: f64, offset_ms: i64) -> LocationSample {
        LocationSample {
            latitude: lat,
            longitude: lng,
            sampled_at: Utc::now() + chrono::Duration::milliseconds(offset_ms),
        }
    }

    fn add_order(state: &AppState) -> uuid::Uuid {
        let order = Order::new(
            PaymentMethod::Card,
            9.5,
            GeoPoint { lat: 28.61, lng: 77.21 },
            GeoPoint { lat: 28.54, lng: 77.39 },
        );
        let id = order.id;
        state.orders.insert(id, order);
        id
    }

    #[test]
    fn newer_sample_overwrites_older_one() {
        let (state, _rx) = AppState::new(4);
        let id = add_order(&state);

        apply_update(&state, LocationUpdate { order_id: id, sample: sample(28.60, 77.22, 0) });
        apply_update(&state, LocationUpdate { order_id: id, sample: sample(28.59, 77.24, 100) });

        let stored = state.orders.get(&id).unwrap().driver_current_location.unwrap();
        assert_eq!(stored.latitude, 28.59);
    }

    #[test]
    fn reordered_stale_sample_is_dropped() {
        let (state, _rx) = AppState::new(4);
        let id = add_order(&state);

        apply_update(&state, LocationUpdate { order_id: id, sample: sample(28.59, 77.24, 100) });
        // Arrives late with an older fix time.
        apply_update(&state, LocationUpdate { order_id: id, sample: sample(28.60, 77.22, 0) });

        let stored = state.orders.get(&id).unwrap().driver_current_location.unwrap();
        assert_eq!(stored.latitude, 28.59);
    }

    #[test]
    fn publish_to_unknown_order_is_not_found() {
        let (state, _rx) = AppState::new(4);
        let err = publish(&state, uuid::Uuid::new_v4(), sample(28.6, 77.2, 0)).unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[test]
    fn full_queue_reports_storage_unavailable() {
        let (state, _rx) = AppState::new(1);
        let id = add_order(&state);

        publish(&state, id, sample(28.6, 77.2, 0)).unwrap();
        let err = publish(&state, id, sample(28.6, 77.2, 1)).unwrap_err();
        assert!(matches!(err, AppError::StorageUnavailable(_)));
    }

    #[tokio::test]
    async fn writer_drains_the_queue_into_the_order() {
        let (state, rx) = AppState::new(16);
        let state = Arc::new(state);
        let id = add_order(&state);

        publish(&state, id, sample(28.60, 77.22, 0)).unwrap();
        publish(&state, id, sample(28.58, 77.26, 50)).unwrap();

        let writer = tokio::spawn(run_location_writer(state.clone(), rx));
        tokio::time::sleep(Duration::from_millis(100)).await;

        let stored = state.orders.get(&id).unwrap().driver_current_location.unwrap();
        assert_eq!(stored.latitude, 28.58);

        writer.abort();
    }

    struct FixedSource {
        lat: f64,
        lng: f64,
    }

    impl PositionSource for FixedSource {
        async fn current_position(&mut self) -> Result<GeoPoint, PositionError> {
            Ok(GeoPoint {
                lat: self.lat,
                lng: self.lng,
            })
        }

        async fn position_changed(&mut self) -> Result<GeoPoint, PositionError> {
            std::future::pending().await
        }
    }

    #[tokio::test]
    async fn publisher_stops_once_the_order_is_terminal() {
        let (state, rx) = AppState::new(64);
        let state = Arc::new(state);
        let id = add_order(&state);
        tokio::spawn(run_location_writer(state.clone(), rx));

        let sampler = LocationSampler::new(
            FixedSource { lat: 28.6, lng: 77.2 },
            SamplerConfig {
                refresh_ceiling: Duration::from_millis(10),
                max_fix_age: Duration::from_millis(0),
                attempt_timeout: Duration::from_millis(100),
            },
        );
        let publisher = tokio::spawn(run_publisher(sampler, state.clone(), id));

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(state.orders.get(&id).unwrap().driver_current_location.is_some());

        transition(&state, id, OrderStatus::Cancelled, Actor::Admin).unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(publisher.is_finished());
    }
}
