use crate::api::error::{api_internal, api_invalid_id, api_not_found, ApiError};
use crate::api::AppState;
use crate::model::OrderView;
use axum::extract::{Path, State};
use axum::Json;

/// `GET /order/{id}`: the downstream order with its assigned driver, if any.
pub(crate) async fn get_order(
    State(state): State<AppState>,
    Path(raw_id): Path<String>,
) -> Result<Json<OrderView>, ApiError> {
    let order_id = parse_order_id(&raw_id).ok_or_else(api_invalid_id)?;
    let view = state
        .orders
        .order_view(order_id)
        .await
        .map_err(|err| api_internal("order lookup", &err))?;
    view.map(Json).ok_or_else(|| api_not_found("order not found"))
}

fn parse_order_id(raw: &str) -> Option<u64> {
    raw.parse::<u64>().ok().filter(|id| *id > 0)
}
