//! Convenience result type alias for OrgTree.

use crate::error::AppError;

/// A specialized `Result` type for OrgTree operations.
pub type AppResult<T> = Result<T, AppError>;
