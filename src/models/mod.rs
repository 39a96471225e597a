//! Data models for the cloud storage service.
//!
//! `bucket` and `object` are rows of the metadata database behind the local
//! object store. `resource` is the user-facing record derived from them on
//! every read.

pub mod bucket;
pub mod object;
pub mod resource;
