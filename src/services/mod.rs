pub mod download;
pub mod filesystem;
pub mod mapper;
pub mod upload;
