//! Remote store contract.
//!
//! The hosted database is an external collaborator: table-scoped CRUD with
//! filter/order/select projections, errors carrying a message, and row-level
//! security keyed on the caller's identity. Row-level security lives here —
//! in the store, bound to the authenticated identity — and is the only
//! authorization boundary that cannot be bypassed; any role checks in the
//! repositories are a UX short-circuit on top of it.
//!
//! Rows cross this boundary as JSON values. Repositories coerce them into the
//! typed record schemas immediately, so nothing past the boundary works on
//! loose maps.

pub mod memory;
pub mod mysql;

use async_trait::async_trait;
use serde_json::Value;
use uuid::Uuid;

use crate::model::Role;

pub use memory::MemoryRemoteStore;
pub use mysql::MySqlRemoteStore;

/// Store-defined error carrying a message.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum StoreError {
    /// Row-level security or a role policy rejected the call.
    #[error("store authorization: {0}")]
    Authorization(String),
    /// A write violated a column or table constraint.
    #[error("store constraint: {0}")]
    Constraint(String),
    /// Transport failure, store unreachable.
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("store error: {0}")]
    Other(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// The authenticated identity a store connection is bound to. Row-level
/// security keys on this, never on any session-local view override.
#[derive(Debug, Clone)]
pub struct StoreIdentity {
    pub user_id: Uuid,
    pub role: Role,
}

impl StoreIdentity {
    pub fn new(user_id: Uuid, role: Role) -> Self {
        Self { user_id, role }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FilterOp {
    Eq,
    In,
}

/// One AND-combined predicate on a select or update.
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub column: String,
    pub op: FilterOp,
    pub value: Value,
}

impl Filter {
    pub fn eq(column: &str, value: impl Into<Value>) -> Self {
        Filter {
            column: column.to_string(),
            op: FilterOp::Eq,
            value: value.into(),
        }
    }

    /// `column IN (values)`.
    pub fn is_in(column: &str, values: Vec<Value>) -> Self {
        Filter {
            column: column.to_string(),
            op: FilterOp::In,
            value: Value::Array(values),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Order {
    pub column: String,
    pub ascending: bool,
}

/// Projection, predicates and ordering for a table read.
#[derive(Debug, Clone, Default)]
pub struct SelectQuery {
    /// Projected columns; empty means all.
    pub columns: Vec<String>,
    pub filters: Vec<Filter>,
    pub order: Option<Order>,
}

impl SelectQuery {
    pub fn all() -> Self {
        SelectQuery::default()
    }

    pub fn columns(mut self, columns: &[&str]) -> Self {
        self.columns = columns.iter().map(|c| c.to_string()).collect();
        self
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn order_by(mut self, column: &str, ascending: bool) -> Self {
        self.order = Some(Order {
            column: column.to_string(),
            ascending,
        });
        self
    }
}

/// Table-scoped CRUD against the hosted database.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Reads rows matching the query, subject to row-level security.
    async fn select(&self, table: &str, query: SelectQuery) -> StoreResult<Vec<Value>>;

    /// Applies a partial update to rows matching the filters and returns the
    /// updated row, or `None` when no row matched.
    ///
    /// Matching is judged against the pre-write state: a row that satisfied
    /// the filters when the update ran is returned even when the patch
    /// changed the very column a filter selected on. The pending-only
    /// transition guard in the leave workflow relies on this. Callers should
    /// include at least one filter on a column the patch does not touch, so
    /// the row stays identifiable after the write.
    async fn update(
        &self,
        table: &str,
        filters: Vec<Filter>,
        patch: Value,
    ) -> StoreResult<Option<Value>>;

    /// Inserts one row and returns it as stored.
    async fn insert(&self, table: &str, row: Value) -> StoreResult<Value>;
}
