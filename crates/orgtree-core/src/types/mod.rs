//! Core type definitions used across the OrgTree workspace.

pub mod pagination;

pub use pagination::{PageRequest, PageResponse};
