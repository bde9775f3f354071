use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::Json;
use axum::Router;
use serde::Deserialize;
use uuid::Uuid;

use crate::engine::ledger;
use crate::error::AppError;
use crate::models::assignment::DriverStats;
use crate::models::driver::{Driver, DriverView, OnlineStatus};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/drivers", post(create_driver).get(list_drivers))
        .route("/drivers/:id/stats", get(get_driver_stats))
}

#[derive(Deserialize)]
pub struct CreateDriverRequest {
    pub name: String,
}

async fn create_driver(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreateDriverRequest>,
) -> Result<Json<Driver>, AppError> {
    if payload.name.trim().is_empty() {
        return Err(AppError::BadRequest("name cannot be empty".to_string()));
    }

    let driver = Driver::new(payload.name);
    state.drivers.insert(driver.id, driver.clone());
    Ok(Json(driver))
}

async fn list_drivers(State(state): State<Arc<AppState>>) -> Json<Vec<DriverView>> {
    let views = state
        .drivers
        .iter()
        .map(|entry| view_of(&state, entry.value()))
        .collect();

    Json(views)
}

async fn get_driver_stats(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<DriverStats>, AppError> {
    let stats = ledger::driver_stats(&state, id)?;
    Ok(Json(stats))
}

fn view_of(state: &AppState, driver: &Driver) -> DriverView {
    // Copy the order id out before touching the orders map; holding the
    // active-assignment guard across the lookup could cross shard locks
    // with a concurrent assign.
    let current_order = state
        .active_assignments
        .get(&driver.id)
        .map(|entry| *entry.value());

    let current_location =
        current_order.and_then(|order_id| {
            state
                .orders
                .get(&order_id)
                .and_then(|order| order.driver_current_location)
        });

    DriverView {
        id: driver.id,
        name: driver.name.clone(),
        online_status: if current_order.is_some() {
            OnlineStatus::Online
        } else {
            OnlineStatus::Offline
        },
        current_order,
        current_location,
    }
}
