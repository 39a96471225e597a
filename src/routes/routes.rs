//! Defines the HTTP surface of the storage service.
//!
//! ## Structure
//! - **Directory endpoints**
//!   - `GET    /api/directory?path=` — list direct children
//!   - `POST   /api/directory?path=` — create an empty directory
//!
//! - **Resource endpoints**
//!   - `GET    /api/resource?path=` — resource info
//!   - `POST   /api/resource?path=` — multipart upload into a directory
//!   - `DELETE /api/resource?path=` — delete a file or a whole folder
//!   - `GET    /api/resource/download?path=` — file bytes or folder zip
//!   - `GET    /api/resource/move?from=&to=` — move / rename
//!   - `GET    /api/resource/search?query=` — name search under the user root
//!
//! - **Internal**
//!   - `PUT    /internal/users/{id}/root` — create a new user's root directory
//!
//! Every `/api` route identifies the caller through the `X-User-Id` header.

use crate::handlers::{
    AppService,
    directory_handlers::{create_directory, get_directory},
    health_handlers::{healthz, readyz},
    resource_handlers::{
        delete_resource, download_resource, get_resource, move_resource, search_resources,
        upload_resource,
    },
    user_handlers::create_user_root,
};
use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, put},
};

/// Build the router. `max_upload_bytes` bounds every request body.
pub fn routes(max_upload_bytes: usize) -> Router<AppService> {
    Router::new()
        // health endpoints (mounted at root)
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/api/directory", get(get_directory).post(create_directory))
        .route(
            "/api/resource",
            get(get_resource)
                .post(upload_resource)
                .delete(delete_resource),
        )
        .route("/api/resource/download", get(download_resource))
        .route("/api/resource/move", get(move_resource))
        .route("/api/resource/search", get(search_resources))
        .route("/internal/users/{id}/root", put(create_user_root))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
}
