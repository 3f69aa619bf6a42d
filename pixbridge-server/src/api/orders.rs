//! Off-ramp order handlers.

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::{
        IntoResponse,
        sse::{Event, KeepAlive, Sse},
    },
    routing::{get, post},
};
use futures_util::stream::{self, Stream};
use pixbridge_core::service::{OrderService, ServiceError};
use pixbridge_sdk::objects::{
    CreateOrderRequest, DepositNotification, NotificationAck, OrderResponse, PayoutNotification,
    StatusFrame,
};
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::api::ApiError;
use crate::api::extractors::{IdempotencyKey, NotificationSecret, SignedBody};
use crate::state::AppState;

/// How often the status stream re-reads the order.
const STREAM_POLL_INTERVAL: Duration = Duration::from_secs(2);

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/orders", post(create_order))
        .route("/orders/{order_id}", get(get_order))
        .route("/orders/{order_id}/stream", get(stream_order))
        .route("/orders/{order_id}/deposit", post(notify_deposit))
        .route("/orders/{order_id}/payout", post(notify_payout))
}

/// `POST /orders` — create an off-ramp order.
async fn create_order(
    State(state): State<AppState>,
    Json(request): Json<CreateOrderRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let order = state.service.create_order(request).await?;
    Ok((StatusCode::CREATED, Json(OrderResponse::from(order))))
}

/// `GET /orders/{order_id}`
async fn get_order(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
) -> Result<Json<OrderResponse>, ApiError> {
    let order = state.service.get_order(order_id).await?;
    Ok(Json(order.into()))
}

struct StreamCursor {
    service: Arc<OrderService>,
    order_id: Uuid,
    last: Option<StatusFrame>,
    first: bool,
    finished: bool,
}

/// Poll the order until its status frame changes, yielding each new frame.
/// The stream ends after a terminal status or when the order disappears.
fn status_frames(cursor: StreamCursor) -> impl Stream<Item = Result<Event, Infallible>> {
    stream::unfold(cursor, |mut cursor| async move {
        if cursor.finished {
            return None;
        }
        loop {
            if !cursor.first {
                tokio::time::sleep(STREAM_POLL_INTERVAL).await;
            }
            cursor.first = false;

            let order = match cursor.service.get_order(cursor.order_id).await {
                Ok(order) => order,
                Err(ServiceError::NotFound(_)) => return None,
                Err(e) => {
                    tracing::warn!(order_id = %cursor.order_id, error = %e, "Status stream poll failed");
                    continue;
                }
            };
            let frame = StatusFrame {
                status: order.status.into(),
                tx_hash: order.tx_hash,
            };
            if cursor.last.as_ref() == Some(&frame) {
                continue;
            }
            let event = match Event::default().event("status").json_data(&frame) {
                Ok(event) => event,
                Err(e) => {
                    tracing::error!(order_id = %cursor.order_id, error = %e, "Failed to encode status frame");
                    return None;
                }
            };
            cursor.finished = frame.status.is_terminal();
            cursor.last = Some(frame);
            return Some((Ok(event), cursor));
        }
    })
}

/// `GET /orders/{order_id}/stream` — server-sent status frames.
async fn stream_order(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    state.service.get_order(order_id).await?;
    let cursor = StreamCursor {
        service: state.service.clone(),
        order_id,
        last: None,
        first: true,
        finished: false,
    };
    Ok(Sse::new(status_frames(cursor)).keep_alive(KeepAlive::default()))
}

/// `POST /orders/{order_id}/deposit` — deposit reported out of band.
async fn notify_deposit(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
    idempotency_key: IdempotencyKey,
    SignedBody(notification, _): SignedBody<DepositNotification, NotificationSecret>,
) -> Result<Json<NotificationAck>, ApiError> {
    let ack = state
        .service
        .record_deposit(order_id, notification, idempotency_key.as_deref())
        .await?;
    Ok(Json(ack))
}

/// `POST /orders/{order_id}/payout` — payout result reported out of band.
async fn notify_payout(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
    idempotency_key: IdempotencyKey,
    SignedBody(notification, _): SignedBody<PayoutNotification, NotificationSecret>,
) -> Result<Json<NotificationAck>, ApiError> {
    let ack = state
        .service
        .record_payout(order_id, notification, idempotency_key.as_deref())
        .await?;
    Ok(Json(ack))
}
