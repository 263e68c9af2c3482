//! In-memory [`RemoteStore`] with the same filter and row-level-security
//! semantics as the SQL-backed store. Used by tests and local development;
//! counts issued selects so cache coalescing is observable.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};

use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use serde_json::{Map, Value};

use super::{Filter, FilterOp, RemoteStore, SelectQuery, StoreError, StoreIdentity, StoreResult};
use crate::model::Role;

pub struct MemoryRemoteStore {
    identity: StoreIdentity,
    tables: Mutex<HashMap<String, Vec<Value>>>,
    select_calls: AtomicUsize,
}

impl MemoryRemoteStore {
    pub fn new(identity: StoreIdentity) -> Self {
        Self {
            identity,
            tables: Mutex::new(HashMap::new()),
            select_calls: AtomicUsize::new(0),
        }
    }

    /// Seeds rows directly, bypassing row-level security.
    pub fn seed(&self, table: &str, rows: Vec<Value>) {
        let mut tables = self.tables.lock().expect("store lock");
        tables.entry(table.to_string()).or_default().extend(rows);
    }

    /// Number of `select` calls that reached the store.
    pub fn select_count(&self) -> usize {
        self.select_calls.load(AtomicOrdering::SeqCst)
    }

    /// Whether row-level security lets this identity see the row.
    fn visible(&self, table: &str, row: &Value, tables: &HashMap<String, Vec<Value>>) -> bool {
        if self.identity.role == Role::Hr {
            return true;
        }
        let uid = Value::String(self.identity.user_id.to_string());
        match table {
            "profiles" => row.get("user_id") == Some(&uid),
            "leave_requests" => {
                let own_profile_ids: Vec<&Value> = tables
                    .get("profiles")
                    .map(|rows| {
                        rows.iter()
                            .filter(|p| p.get("user_id") == Some(&uid))
                            .filter_map(|p| p.get("id"))
                            .collect()
                    })
                    .unwrap_or_default();
                row.get("profile_id")
                    .map(|pid| own_profile_ids.contains(&pid))
                    .unwrap_or(false)
            }
            _ => true,
        }
    }

    fn check_constraints(table: &str, row: &Map<String, Value>) -> StoreResult<()> {
        if table == "profiles" {
            if let Some(name) = row.get("full_name") {
                if name.as_str().map(|s| s.trim().is_empty()).unwrap_or(true) {
                    return Err(StoreError::Constraint("full_name must not be empty".into()));
                }
            }
            for column in ["remaining_annual_leave", "remaining_sick_leave"] {
                if let Some(balance) = row.get(column).and_then(Value::as_f64) {
                    if balance < 0.0 {
                        return Err(StoreError::Constraint(format!(
                            "{column} must be non-negative"
                        )));
                    }
                }
            }
        }
        Ok(())
    }
}

fn matches(row: &Value, filters: &[Filter]) -> bool {
    filters.iter().all(|filter| {
        let field = row.get(&filter.column).unwrap_or(&Value::Null);
        match filter.op {
            FilterOp::Eq => field == &filter.value,
            FilterOp::In => filter
                .value
                .as_array()
                .map(|items| items.contains(field))
                .unwrap_or(false),
        }
    })
}

fn compare(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Number(x), Value::Number(y)) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        _ => Ordering::Equal,
    }
}

fn project(row: &Value, columns: &[String]) -> Value {
    if columns.is_empty() {
        return row.clone();
    }
    let mut out = Map::new();
    if let Some(obj) = row.as_object() {
        for column in columns {
            out.insert(
                column.clone(),
                obj.get(column).cloned().unwrap_or(Value::Null),
            );
        }
    }
    Value::Object(out)
}

#[async_trait]
impl RemoteStore for MemoryRemoteStore {
    async fn select(&self, table: &str, query: SelectQuery) -> StoreResult<Vec<Value>> {
        self.select_calls.fetch_add(1, AtomicOrdering::SeqCst);
        let tables = self.tables.lock().expect("store lock");
        let mut rows: Vec<Value> = tables
            .get(table)
            .map(|rows| {
                rows.iter()
                    .filter(|row| self.visible(table, row, &tables))
                    .filter(|row| matches(row, &query.filters))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        if let Some(order) = &query.order {
            rows.sort_by(|a, b| {
                let ord = compare(
                    a.get(&order.column).unwrap_or(&Value::Null),
                    b.get(&order.column).unwrap_or(&Value::Null),
                );
                if order.ascending { ord } else { ord.reverse() }
            });
        }

        Ok(rows.iter().map(|row| project(row, &query.columns)).collect())
    }

    async fn update(
        &self,
        table: &str,
        filters: Vec<Filter>,
        patch: Value,
    ) -> StoreResult<Option<Value>> {
        let patch = patch
            .as_object()
            .cloned()
            .ok_or_else(|| StoreError::Constraint("patch must be a JSON object".into()))?;
        Self::check_constraints(table, &patch)?;

        let mut tables = self.tables.lock().expect("store lock");
        let visibility = tables.clone();
        let rows = match tables.get_mut(table) {
            Some(rows) => rows,
            None => return Ok(None),
        };

        let mut updated = None;
        for row in rows.iter_mut() {
            if !matches(row, &filters) {
                continue;
            }
            if !self.visible(table, row, &visibility) {
                return Err(StoreError::Authorization(format!(
                    "row-level security rejected update on {table}"
                )));
            }
            if let Some(obj) = row.as_object_mut() {
                for (key, value) in &patch {
                    obj.insert(key.clone(), value.clone());
                }
                if obj.contains_key("updated_at") {
                    obj.insert(
                        "updated_at".into(),
                        Value::String(Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)),
                    );
                }
            }
            updated = Some(row.clone());
        }
        Ok(updated)
    }

    async fn insert(&self, table: &str, row: Value) -> StoreResult<Value> {
        let obj = row
            .as_object()
            .cloned()
            .ok_or_else(|| StoreError::Constraint("row must be a JSON object".into()))?;
        Self::check_constraints(table, &obj)?;

        let mut tables = self.tables.lock().expect("store lock");
        tables.entry(table.to_string()).or_default().push(row.clone());
        Ok(row)
    }
}
