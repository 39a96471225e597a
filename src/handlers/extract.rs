//! Request extractors shared by the API handlers.

use crate::{errors::AppError, paths};
use axum::{extract::FromRequestParts, http::request::Parts};

/// Header carrying the authenticated user id, set by the upstream auth layer.
pub const USER_ID_HEADER: &str = "x-user-id";

/// The caller's namespace. Every client path is resolved against it.
#[derive(Debug, Clone)]
pub struct UserRoot {
    pub user_id: i64,
    pub root: String,
}

impl UserRoot {
    pub fn new(user_id: i64) -> Self {
        Self {
            user_id,
            root: paths::user_root(user_id),
        }
    }

    /// Full key for a client directory path. The empty path is the root.
    pub fn directory(&self, path: &str) -> Result<String, AppError> {
        check_path(path)?;
        if !paths::is_valid_directory_end(path) {
            return Err(AppError::bad_request(format!(
                "directory path `{path}` must end with `/`"
            )));
        }
        Ok(format!("{}{}", self.root, path))
    }

    /// Full key for a client path naming a file or a folder.
    pub fn resource(&self, path: &str) -> Result<String, AppError> {
        if path.is_empty() {
            return Err(AppError::bad_request("path must not be empty"));
        }
        check_path(path)?;
        Ok(format!("{}{}", self.root, path))
    }
}

/// Shape checks shared by directory and resource paths.
fn check_path(path: &str) -> Result<(), AppError> {
    if !paths::has_valid_characters(path) {
        return Err(AppError::bad_request(format!(
            "path `{path}` contains invalid characters"
        )));
    }
    if path.starts_with(paths::SEPARATOR) {
        return Err(AppError::bad_request("path must be relative to the user root"));
    }
    let mut segments = path.split(paths::SEPARATOR).peekable();
    while let Some(segment) = segments.next() {
        let last = segments.peek().is_none();
        if segment == "." || segment == ".." || (segment.is_empty() && !last) {
            return Err(AppError::bad_request(format!(
                "path `{path}` contains an empty or relative segment"
            )));
        }
    }
    Ok(())
}

/// Upload names may only use letters, digits, space and `!-_.'()/`.
pub fn is_allowed_upload_name(name: &str) -> bool {
    !name.trim().is_empty()
        && name
            .chars()
            .all(|c| c.is_alphanumeric() || " !-_.'()/".contains(c))
}

impl<S> FromRequestParts<S> for UserRoot
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let raw = parts
            .headers
            .get(USER_ID_HEADER)
            .ok_or_else(|| AppError::unauthorized("missing authenticated user"))?;
        let user_id = raw
            .to_str()
            .ok()
            .and_then(|v| v.trim().parse::<i64>().ok())
            .filter(|id| *id > 0)
            .ok_or_else(|| AppError::unauthorized("invalid authenticated user"))?;
        Ok(Self::new(user_id))
    }
}
