use axum::extract::State;
use serde_json::{Value, json};

use super::AppState;
use crate::error::{ApiResponse, ApiResult};

pub(super) async fn healthcheck(State(state): State<AppState>) -> ApiResult<ApiResponse<Value>> {
    state.store.ping().await?;
    Ok(ApiResponse::ok(
        "OK",
        json!({ "status": "ok", "media": state.media.backend_name() }),
    ))
}
