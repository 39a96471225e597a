//! HTTP handlers for single resources: info, delete, download, move, search
//! and multipart upload. Client paths are relative to the caller's root;
//! records go back out relative to it as well.

use crate::{
    errors::AppError,
    handlers::{
        AppService,
        extract::{UserRoot, is_allowed_upload_name},
    },
    models::resource::ResourceRecord,
    services::{download::CHUNK_SIZE, upload::UploadFile},
};
use axum::{
    Json,
    body::Body,
    extract::{Multipart, Query, State},
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use tokio_util::io::ReaderStream;
use tracing::{debug, warn};

/// Multipart field carrying the uploaded files.
const FILES_FIELD: &str = "files";

#[derive(Debug, Deserialize)]
pub struct PathQuery {
    #[serde(default)]
    pub path: String,
}

#[derive(Debug, Deserialize)]
pub struct MoveQuery {
    pub from: String,
    pub to: String,
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    pub query: String,
}

/// GET `/api/resource?path=`
pub async fn get_resource(
    State(service): State<AppService>,
    user: UserRoot,
    Query(q): Query<PathQuery>,
) -> Result<Json<ResourceRecord>, AppError> {
    let path = user.resource(&q.path)?;
    let record = service.get_resource_info(&path).await?;
    Ok(Json(record.relative_to(&user.root)))
}

/// DELETE `/api/resource?path=`
pub async fn delete_resource(
    State(service): State<AppService>,
    user: UserRoot,
    Query(q): Query<PathQuery>,
) -> Result<StatusCode, AppError> {
    let path = user.resource(&q.path)?;
    service.delete_resource(&path).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET `/api/resource/download?path=`
///
/// The download runs as its own task writing into a bounded pipe; the
/// response body reads the other end. A client that goes away closes the
/// pipe and the task stops on its next write.
pub async fn download_resource(
    State(service): State<AppService>,
    user: UserRoot,
    Query(q): Query<PathQuery>,
) -> Result<Response, AppError> {
    let path = user.resource(&q.path)?;
    let download = service.download_resource(&path).await?;
    let disposition = content_disposition(&download.filename());
    let content_type = download.content_type();

    let (writer, reader) = tokio::io::duplex(CHUNK_SIZE * 4);
    tokio::spawn(async move {
        let path = download.path().to_string();
        match download.stream_to(writer).await {
            Ok(sent) => debug!(path = %path, sent, "download streamed"),
            Err(err) => warn!(path = %path, error = %err, "download aborted"),
        }
    });

    let mut response = Response::new(Body::from_stream(ReaderStream::new(reader)));
    *response.status_mut() = StatusCode::OK;
    let headers = response.headers_mut();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
    if let Ok(value) = HeaderValue::from_str(&disposition) {
        headers.insert(header::CONTENT_DISPOSITION, value);
    }
    Ok(response)
}

/// GET `/api/resource/move?from=&to=`
pub async fn move_resource(
    State(service): State<AppService>,
    user: UserRoot,
    Query(q): Query<MoveQuery>,
) -> Result<Json<ResourceRecord>, AppError> {
    let from = user.resource(&q.from)?;
    let to = user.resource(&q.to)?;
    let record = service.move_resource(&from, &to).await?;
    Ok(Json(record.relative_to(&user.root)))
}

/// GET `/api/resource/search?query=`
pub async fn search_resources(
    State(service): State<AppService>,
    user: UserRoot,
    Query(q): Query<SearchQuery>,
) -> Result<Json<Vec<ResourceRecord>>, AppError> {
    if q.query.trim().is_empty() {
        return Err(AppError::bad_request("search query must not be empty"));
    }
    let found = service
        .search_resources_by_query(q.query.trim(), &user.root)
        .await?;
    Ok(Json(
        found
            .into_iter()
            .map(|record| record.relative_to(&user.root))
            .collect(),
    ))
}

/// POST `/api/resource?path=` with one or more multipart `files` fields.
pub async fn upload_resource(
    State(service): State<AppService>,
    user: UserRoot,
    Query(q): Query<PathQuery>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, AppError> {
    let target = user.directory(&q.path)?;

    let mut files = Vec::new();
    while let Some(field) = multipart.next_field().await.map_err(|e| {
        warn!("Failed to read multipart field: {}", e);
        AppError::bad_request("Invalid multipart data")
    })? {
        if field.name() != Some(FILES_FIELD) {
            continue;
        }
        let filename = field
            .file_name()
            .map(str::to_string)
            .ok_or_else(|| AppError::bad_request("file name is missing"))?;
        if !is_allowed_upload_name(&filename) {
            return Err(AppError::bad_request(format!(
                "file name `{filename}` contains unsupported characters"
            )));
        }
        let content_type = field.content_type().map(str::to_string);
        let content = field.bytes().await.map_err(|e| {
            warn!("Failed to read file content: {}", e);
            AppError::bad_request("Failed to read file")
        })?;
        files.push(UploadFile::new(filename, content_type.as_deref(), content));
    }

    if files.is_empty() {
        return Err(AppError::bad_request("No file provided"));
    }

    let uploaded = service.upload_resource(files, &target).await?;
    let records: Vec<ResourceRecord> = uploaded
        .into_iter()
        .map(|record| record.relative_to(&user.root))
        .collect();
    Ok((StatusCode::CREATED, Json(records)))
}

/// `attachment; filename*=UTF-8''<name>` with the name percent-encoded.
pub fn content_disposition(filename: &str) -> String {
    format!(
        "attachment; filename*=UTF-8''{}",
        urlencoding::encode(filename)
    )
}
