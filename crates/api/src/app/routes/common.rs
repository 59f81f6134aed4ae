use axum::{Json, http::StatusCode, response::IntoResponse};
use serde_json::Value as JsonValue;

use retailerp_infra::command_dispatcher::DispatchError;

use crate::app::errors;

/// Map a workflow result to `status` + JSON body, or to the error response.
pub fn reply<T>(
    status: StatusCode,
    result: Result<T, DispatchError>,
    to_json: impl FnOnce(&T) -> JsonValue,
) -> axum::response::Response {
    match result {
        Ok(value) => (status, Json(to_json(&value))).into_response(),
        Err(e) => errors::dispatch_error_to_response(e),
    }
}

/// Map a list result to `{ "items": [...] }`.
pub fn reply_list<T>(
    result: Result<Vec<T>, DispatchError>,
    to_json: impl Fn(&T) -> JsonValue,
) -> axum::response::Response {
    reply(StatusCode::OK, result, |items| {
        serde_json::json!({ "items": items.iter().map(&to_json).collect::<Vec<_>>() })
    })
}
