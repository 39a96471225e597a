//! Hooks called by the account service.

use crate::{errors::AppError, handlers::AppService};
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};

/// PUT `/internal/users/{id}/root` — create the namespace of a user that
/// has just been registered.
pub async fn create_user_root(
    State(service): State<AppService>,
    Path(user_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    if user_id <= 0 {
        return Err(AppError::bad_request("user id must be positive"));
    }
    let record = service.create_root_directory_for_user(user_id).await?;
    Ok((StatusCode::CREATED, Json(record)))
}
