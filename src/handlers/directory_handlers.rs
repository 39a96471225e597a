//! HTTP handlers for directory listing and creation.

use crate::{
    errors::AppError,
    handlers::{AppService, extract::UserRoot, resource_handlers::PathQuery},
    models::resource::ResourceRecord,
};
use axum::{
    Json,
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
};

/// GET `/api/directory?path=` — direct children; the empty path is the root.
pub async fn get_directory(
    State(service): State<AppService>,
    user: UserRoot,
    Query(q): Query<PathQuery>,
) -> Result<Json<Vec<ResourceRecord>>, AppError> {
    let path = user.directory(&q.path)?;
    let children = service.get_directory_info(&path).await?;
    Ok(Json(
        children
            .into_iter()
            .map(|record| record.relative_to(&user.root))
            .collect(),
    ))
}

/// POST `/api/directory?path=`
pub async fn create_directory(
    State(service): State<AppService>,
    user: UserRoot,
    Query(q): Query<PathQuery>,
) -> Result<impl IntoResponse, AppError> {
    if q.path.is_empty() {
        return Err(AppError::bad_request("directory path must not be empty"));
    }
    let path = user.directory(&q.path)?;
    let record = service.create_directory(&path).await?;
    Ok((StatusCode::CREATED, Json(record.relative_to(&user.root))))
}
