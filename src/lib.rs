//! Per-user cloud file storage: a hierarchical filesystem emulated on a
//! flat object store, served over HTTP.

pub mod config;
pub mod db;
pub mod errors;
pub mod handlers;
pub mod models;
pub mod paths;
pub mod routes;
pub mod services;
pub mod store;
