pub mod directory_handlers;
pub mod extract;
pub mod health_handlers;
pub mod resource_handlers;
pub mod user_handlers;

use crate::{services::filesystem::FileSystemService, store::LocalObjectStore};

/// Router state shared by every handler.
pub type AppService = FileSystemService<LocalObjectStore>;
