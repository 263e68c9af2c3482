use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::{DataError, DataResult};

/// Employee profile record, exactly one per user id.
///
/// Coerced from the store's wire rows at the repository boundary so internal
/// code never handles loosely-typed maps. `avatar_url` holds the full inlined
/// image as a `data:` URL, so every profile read carries the avatar payload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Profile {
    pub id: Uuid,
    pub user_id: Uuid,
    pub full_name: String,
    pub email: String,
    pub phone: Option<String>,
    pub department: Option<String>,
    pub position: Option<String>,
    pub status: Option<String>,
    pub salary: Option<f64>,
    pub join_date: Option<NaiveDate>,
    /// Remaining leave balances, whole or half days, never negative.
    pub remaining_annual_leave: Option<f64>,
    pub remaining_sick_leave: Option<f64>,
    pub avatar_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Profile {
    /// Validates and coerces one wire row into the record schema.
    pub fn from_row(row: Value) -> DataResult<Profile> {
        serde_json::from_value(row)
            .map_err(|e| DataError::Internal(format!("malformed profiles row: {e}")))
    }
}

/// Partial profile update. Unset fields are omitted from the patch sent to
/// the store.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ProfilePatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub department: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub salary: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub join_date: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remaining_annual_leave: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remaining_sick_leave: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
}

impl ProfilePatch {
    /// Serializes the patch, rejecting an empty one.
    pub fn into_value(self) -> DataResult<Value> {
        let value = serde_json::to_value(&self)
            .map_err(|e| DataError::Internal(format!("patch serialization: {e}")))?;
        match value.as_object() {
            Some(map) if !map.is_empty() => Ok(value),
            _ => Err(DataError::Validation(
                "no fields provided for update".into(),
            )),
        }
    }
}
