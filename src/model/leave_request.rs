use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::{DataError, DataResult};

/// Lifecycle of a leave request. Transitions are one-directional: a request
/// leaves `Pending` for a terminal state and never returns.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LeaveStatus {
    Pending,
    Approved,
    Rejected,
}

impl LeaveStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LeaveStatus::Pending => "pending",
            LeaveStatus::Approved => "approved",
            LeaveStatus::Rejected => "rejected",
        }
    }
}

/// Status filter for leave-request reads. `All` omits the status predicate.
/// Part of the cache key, so differently-filtered reads never collide.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum StatusFilter {
    All,
    Pending,
    Approved,
    Rejected,
}

impl StatusFilter {
    pub const ALL: [StatusFilter; 4] = [
        StatusFilter::All,
        StatusFilter::Pending,
        StatusFilter::Approved,
        StatusFilter::Rejected,
    ];

    /// The status predicate this filter selects, if any.
    pub fn status(&self) -> Option<LeaveStatus> {
        match self {
            StatusFilter::All => None,
            StatusFilter::Pending => Some(LeaveStatus::Pending),
            StatusFilter::Approved => Some(LeaveStatus::Approved),
            StatusFilter::Rejected => Some(LeaveStatus::Rejected),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StatusFilter::All => "all",
            StatusFilter::Pending => "pending",
            StatusFilter::Approved => "approved",
            StatusFilter::Rejected => "rejected",
        }
    }
}

/// Leave request record, belongs to one profile.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LeaveRequest {
    pub id: Uuid,
    pub profile_id: Uuid,
    /// Raw leave-type tag as stored; display labels come from
    /// [`leave_type_label`].
    pub leave_type: String,
    pub days: f64,
    pub status: LeaveStatus,
    pub created_at: DateTime<Utc>,
}

impl LeaveRequest {
    pub fn from_row(row: Value) -> DataResult<LeaveRequest> {
        serde_json::from_value(row)
            .map_err(|e| DataError::Internal(format!("malformed leave_requests row: {e}")))
    }
}

/// A leave request joined with the minimal requester projection needed for
/// display. The name is absent when row-level security hides the requester's
/// profile from the caller.
#[derive(Debug, Clone, PartialEq)]
pub struct LeaveRequestWithRequester {
    pub request: LeaveRequest,
    pub requester_name: Option<String>,
}

/// Payload for submitting a new leave request.
#[derive(Debug, Clone)]
pub struct NewLeaveRequest {
    pub leave_type: String,
    pub days: f64,
}

/// The single source of truth for leave-type display labels. Total: every
/// defined tag maps to its label, anything else falls back to the generic one.
pub fn leave_type_label(tag: &str) -> &'static str {
    match tag {
        "vacation" => "Annual Leave",
        "sick" => "Sick Leave",
        _ => "Leave",
    }
}
