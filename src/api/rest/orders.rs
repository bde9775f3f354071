use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::Json;
use axum::Router;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use uuid::Uuid;

use crate::engine::{ledger, lifecycle, payment};
use crate::error::AppError;
use crate::geo::GeoPoint;
use crate::location::publisher;
use crate::models::assignment::AssignmentEvent;
use crate::models::order::{LocationSample, Order, OrderStatus, PaymentMethod};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/orders", post(create_order).get(list_orders))
        .route("/orders/:id", get(get_order))
        .route("/orders/:id/transition", post(apply_transition))
        .route("/orders/:id/location", post(publish_location))
        .route("/orders/:id/assign", post(assign_driver))
        .route("/orders/:id/complete", post(complete_assignment))
        .route("/orders/:id/revoke", post(revoke_assignment))
        .route("/orders/:id/payment/finalize", post(finalize_payment))
}

#[derive(Deserialize)]
pub struct CreateOrderRequest {
    pub payment_method: PaymentMethod,
    pub total_amount: f64,
    pub restaurant_location: GeoPoint,
    pub customer_location: GeoPoint,
}

#[derive(Deserialize)]
pub struct ListOrdersQuery {
    pub status: Option<OrderStatus>,
}

#[derive(Deserialize)]
pub struct TransitionRequest {
    pub target_status: OrderStatus,
    pub actor: lifecycle::Actor,
}

#[derive(Deserialize)]
pub struct PublishLocationRequest {
    pub latitude: f64,
    pub longitude: f64,
    pub sampled_at: Option<DateTime<Utc>>,
}

#[derive(Deserialize)]
pub struct DriverRef {
    pub driver_id: Uuid,
}

async fn create_order(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreateOrderRequest>,
) -> Result<Json<Order>, AppError> {
    if payload.total_amount < 0.0 {
        return Err(AppError::BadRequest("total_amount cannot be negative".to_string()));
    }

    let order = Order::new(
        payload.payment_method,
        payload.total_amount,
        payload.restaurant_location,
        payload.customer_location,
    );

    state.orders.insert(order.id, order.clone());
    Ok(Json(order))
}

async fn get_order(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Order>, AppError> {
    let order = state
        .orders
        .get(&id)
        .ok_or_else(|| AppError::NotFound(format!("order {} not found", id)))?;

    Ok(Json(order.value().clone()))
}

async fn list_orders(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListOrdersQuery>,
) -> Json<Vec<Order>> {
    let orders = state
        .orders
        .iter()
        .filter(|entry| match query.status {
            Some(status) => entry.value().status == status,
            None => true,
        })
        .map(|entry| entry.value().clone())
        .collect();

    Json(orders)
}

async fn apply_transition(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<TransitionRequest>,
) -> Result<Json<Order>, AppError> {
    let order = lifecycle::transition(&state, id, payload.target_status, payload.actor)?;
    Ok(Json(order))
}

async fn publish_location(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<PublishLocationRequest>,
) -> Result<StatusCode, AppError> {
    let sample = LocationSample {
        latitude: payload.latitude,
        longitude: payload.longitude,
        sampled_at: payload.sampled_at.unwrap_or_else(Utc::now),
    };

    publisher::publish(&state, id, sample)?;
    Ok(StatusCode::ACCEPTED)
}

async fn assign_driver(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<DriverRef>,
) -> Result<Json<AssignmentEvent>, AppError> {
    let event = ledger::assign(&state, id, payload.driver_id)?;
    Ok(Json(event))
}

async fn complete_assignment(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<DriverRef>,
) -> Result<Json<AssignmentEvent>, AppError> {
    let event = ledger::complete(&state, id, payload.driver_id)?;
    Ok(Json(event))
}

async fn revoke_assignment(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<DriverRef>,
) -> Result<Json<AssignmentEvent>, AppError> {
    let event = ledger::revoke(&state, id, payload.driver_id)?;
    Ok(Json(event))
}

async fn finalize_payment(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<payment::ReconciliationResult>, AppError> {
    if !state.orders.contains_key(&id) {
        return Err(AppError::NotFound(format!("order {} not found", id)));
    }

    let result = payment::reconcile_on_delivered(&state, id)?;
    Ok(Json(result))
}
