//! # orgtree-core
//!
//! Core crate for OrgTree. Contains configuration schemas, pagination
//! types, and the unified error system shared by every other crate.
//!
//! This crate has **no** internal dependencies on other OrgTree crates.

pub mod config;
pub mod error;
pub mod result;
pub mod types;

pub use error::{AppError, ErrorKind};
pub use result::AppResult;
