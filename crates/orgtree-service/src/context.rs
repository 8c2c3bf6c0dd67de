//! Request context carrying the acting user.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Context for the current operation.
///
/// Passed into every service method so that audit fields record *who*
/// made a change.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestContext {
    /// The acting user, if known.
    pub actor_id: Option<Uuid>,
    /// When the request was received.
    pub request_time: DateTime<Utc>,
}

impl RequestContext {
    /// Creates a context for the given user.
    pub fn new(actor_id: Uuid) -> Self {
        Self {
            actor_id: Some(actor_id),
            request_time: Utc::now(),
        }
    }

    /// Creates a context for maintenance work with no acting user.
    pub fn system() -> Self {
        Self {
            actor_id: None,
            request_time: Utc::now(),
        }
    }
}
