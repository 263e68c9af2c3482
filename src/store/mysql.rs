//! MySQL-backed [`RemoteStore`].
//!
//! The connection is bound to one authenticated identity; non-HR callers are
//! scoped to their own rows before any SQL runs. MySQL has no RETURNING, so
//! updates and inserts re-read the affected row.

use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use serde_json::{Map, Value};
use sqlx::mysql::MySqlRow;
use sqlx::{Column, MySqlPool, Row, TypeInfo};

use super::{Filter, FilterOp, RemoteStore, SelectQuery, StoreError, StoreIdentity, StoreResult};
use crate::model::Role;
use async_trait::async_trait;

/// SQL bindable value, converted from the JSON the trait hands us.
#[derive(Debug)]
enum SqlValue {
    String(String),
    I64(i64),
    F64(f64),
    Bool(bool),
    Date(NaiveDate),
    DateTime(NaiveDateTime),
    Null,
}

/// Columns bound with temporal types. Strings for any other column stay
/// text, even when the value happens to look like a date.
const TEMPORAL_COLUMNS: [&str; 3] = ["join_date", "created_at", "updated_at"];

impl SqlValue {
    fn from_json(column: &str, value: &Value) -> StoreResult<SqlValue> {
        Ok(match value {
            Value::String(s) if TEMPORAL_COLUMNS.contains(&column) => {
                if let Ok(d) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
                    SqlValue::Date(d)
                } else if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S") {
                    SqlValue::DateTime(dt)
                } else if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
                    SqlValue::DateTime(dt.naive_utc())
                } else {
                    return Err(StoreError::Constraint(format!(
                        "{column} expects a date, got '{s}'"
                    )));
                }
            }
            Value::String(s) => SqlValue::String(s.clone()),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    SqlValue::I64(i)
                } else if let Some(f) = n.as_f64() {
                    SqlValue::F64(f)
                } else {
                    return Err(StoreError::Constraint(format!("unbindable number: {n}")));
                }
            }
            Value::Bool(b) => SqlValue::Bool(*b),
            Value::Null => SqlValue::Null,
            other => {
                return Err(StoreError::Constraint(format!(
                    "unsupported value type: {other}"
                )));
            }
        })
    }
}

fn bind<'q>(
    query: sqlx::query::Query<'q, sqlx::MySql, sqlx::mysql::MySqlArguments>,
    value: SqlValue,
) -> sqlx::query::Query<'q, sqlx::MySql, sqlx::mysql::MySqlArguments> {
    match value {
        SqlValue::String(v) => query.bind(v),
        SqlValue::I64(v) => query.bind(v),
        SqlValue::F64(v) => query.bind(v),
        SqlValue::Bool(v) => query.bind(v),
        SqlValue::Date(v) => query.bind(v),
        SqlValue::DateTime(v) => query.bind(v),
        SqlValue::Null => query.bind(None::<String>),
    }
}

fn map_sqlx_error(err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db) => StoreError::Constraint(db.message().to_string()),
        sqlx::Error::Io(e) => StoreError::Unavailable(e.to_string()),
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed => {
            StoreError::Unavailable("connection pool exhausted".into())
        }
        sqlx::Error::Tls(e) => StoreError::Unavailable(e.to_string()),
        other => StoreError::Other(other.to_string()),
    }
}

fn row_to_json(row: &MySqlRow) -> StoreResult<Value> {
    let mut map = Map::with_capacity(row.columns().len());
    for (i, col) in row.columns().iter().enumerate() {
        let type_name = col.type_info().name().to_uppercase();
        let value = decode_column(row, i, &type_name)
            .map_err(|e| StoreError::Other(format!("decode column {}: {e}", col.name())))?;
        map.insert(col.name().to_string(), value);
    }
    Ok(Value::Object(map))
}

fn decode_column(row: &MySqlRow, i: usize, type_name: &str) -> Result<Value, sqlx::Error> {
    let value = match type_name {
        "BOOLEAN" => row.try_get::<Option<bool>, _>(i)?.map(Value::Bool),
        t if t.contains("INT") && t.contains("UNSIGNED") => {
            row.try_get::<Option<u64>, _>(i)?.map(Value::from)
        }
        t if t.contains("INT") => row.try_get::<Option<i64>, _>(i)?.map(Value::from),
        "FLOAT" | "DOUBLE" => row.try_get::<Option<f64>, _>(i)?.map(Value::from),
        "DATE" => row
            .try_get::<Option<NaiveDate>, _>(i)?
            .map(|d| Value::String(d.format("%Y-%m-%d").to_string())),
        "DATETIME" | "TIMESTAMP" => row.try_get::<Option<DateTime<Utc>>, _>(i)?.map(|dt| {
            Value::String(dt.to_rfc3339_opts(SecondsFormat::Secs, true))
        }),
        _ => row.try_get::<Option<String>, _>(i)?.map(Value::String),
    };
    Ok(value.unwrap_or(Value::Null))
}

/// Filters that still identify a row after `patch` has been applied. Any
/// predicate on a patched column is dropped: the write may have changed the
/// very value the predicate matched on, and re-reading with it would report
/// a successful update as no match.
fn reread_filters(filters: &[Filter], patch: &Map<String, Value>) -> Vec<Filter> {
    filters
        .iter()
        .filter(|f| !patch.contains_key(&f.column))
        .cloned()
        .collect()
}

pub struct MySqlRemoteStore {
    pool: MySqlPool,
    identity: StoreIdentity,
}

impl MySqlRemoteStore {
    pub fn new(pool: MySqlPool, identity: StoreIdentity) -> Self {
        Self { pool, identity }
    }

    /// Row-level scoping for non-HR identities. Appended to every statement
    /// regardless of what the caller asked for.
    fn scope_sql(&self, table: &str) -> Option<(String, Vec<SqlValue>)> {
        if self.identity.role == Role::Hr {
            return None;
        }
        let uid = self.identity.user_id.to_string();
        match table {
            "profiles" => Some((" AND user_id = ?".into(), vec![SqlValue::String(uid)])),
            "leave_requests" => Some((
                " AND profile_id IN (SELECT id FROM profiles WHERE user_id = ?)".into(),
                vec![SqlValue::String(uid)],
            )),
            _ => None,
        }
    }

    fn build_where(
        &self,
        table: &str,
        filters: &[Filter],
    ) -> StoreResult<(String, Vec<SqlValue>)> {
        let mut sql = String::from(" WHERE 1=1");
        let mut values = Vec::new();

        for filter in filters {
            match filter.op {
                FilterOp::Eq => {
                    sql.push_str(&format!(" AND {} = ?", filter.column));
                    values.push(SqlValue::from_json(&filter.column, &filter.value)?);
                }
                FilterOp::In => {
                    let items = filter.value.as_array().cloned().unwrap_or_default();
                    if items.is_empty() {
                        sql.push_str(" AND 1=0");
                        continue;
                    }
                    let marks = vec!["?"; items.len()].join(", ");
                    sql.push_str(&format!(" AND {} IN ({})", filter.column, marks));
                    for item in &items {
                        values.push(SqlValue::from_json(&filter.column, item)?);
                    }
                }
            }
        }

        if let Some((scope, scope_values)) = self.scope_sql(table) {
            sql.push_str(&scope);
            values.extend(scope_values);
        }

        Ok((sql, values))
    }

    async fn fetch_rows(
        &self,
        table: &str,
        query: &SelectQuery,
    ) -> StoreResult<Vec<Value>> {
        let columns = if query.columns.is_empty() {
            "*".to_string()
        } else {
            query.columns.join(", ")
        };

        let (where_sql, values) = self.build_where(table, &query.filters)?;

        let mut sql = format!("SELECT {columns} FROM {table}{where_sql}");
        if let Some(order) = &query.order {
            sql.push_str(&format!(
                " ORDER BY {} {}",
                order.column,
                if order.ascending { "ASC" } else { "DESC" }
            ));
        }

        let mut q = sqlx::query(&sql);
        for value in values {
            q = bind(q, value);
        }

        let rows = q.fetch_all(&self.pool).await.map_err(map_sqlx_error)?;
        rows.iter().map(row_to_json).collect()
    }
}

#[async_trait]
impl RemoteStore for MySqlRemoteStore {
    async fn select(&self, table: &str, query: SelectQuery) -> StoreResult<Vec<Value>> {
        self.fetch_rows(table, &query).await
    }

    async fn update(
        &self,
        table: &str,
        filters: Vec<Filter>,
        patch: Value,
    ) -> StoreResult<Option<Value>> {
        let obj = patch
            .as_object()
            .ok_or_else(|| StoreError::Constraint("patch must be a JSON object".into()))?;
        if obj.is_empty() {
            return Err(StoreError::Constraint("no fields provided for update".into()));
        }

        let set_clause = obj
            .keys()
            .map(|k| format!("{k} = ?"))
            .collect::<Vec<_>>()
            .join(", ");
        let (where_sql, where_values) = self.build_where(table, &filters)?;
        let sql = format!("UPDATE {table} SET {set_clause}{where_sql}");

        let mut q = sqlx::query(&sql);
        for (column, value) in obj {
            q = bind(q, SqlValue::from_json(column, value)?);
        }
        for value in where_values {
            q = bind(q, value);
        }
        let result = q.execute(&self.pool).await.map_err(map_sqlx_error)?;

        if result.rows_affected() > 0 {
            // A predicate on a patched column no longer holds after the
            // write, so the fresh row is re-read by the untouched filters.
            let query = SelectQuery {
                filters: reread_filters(&filters, obj),
                ..Default::default()
            };
            let rows = self.fetch_rows(table, &query).await?;
            return Ok(rows.into_iter().next());
        }

        // MySQL also reports zero affected rows for a no-op write; a match
        // with unchanged values still satisfies the original predicates.
        let rows = self
            .fetch_rows(table, &SelectQuery { filters, ..Default::default() })
            .await?;
        Ok(rows.into_iter().next())
    }

    async fn insert(&self, table: &str, row: Value) -> StoreResult<Value> {
        let obj = row
            .as_object()
            .ok_or_else(|| StoreError::Constraint("row must be a JSON object".into()))?;
        if obj.is_empty() {
            return Err(StoreError::Constraint("empty row".into()));
        }

        let columns = obj.keys().cloned().collect::<Vec<_>>().join(", ");
        let marks = vec!["?"; obj.len()].join(", ");
        let sql = format!("INSERT INTO {table} ({columns}) VALUES ({marks})");

        let mut q = sqlx::query(&sql);
        for (column, value) in obj {
            q = bind(q, SqlValue::from_json(column, value)?);
        }
        q.execute(&self.pool).await.map_err(map_sqlx_error)?;

        if let Some(id) = obj.get("id") {
            let query = SelectQuery::all().filter(Filter::eq("id", id.clone()));
            if let Some(stored) = self.fetch_rows(table, &query).await?.into_iter().next() {
                return Ok(stored);
            }
        }
        Ok(row)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn reread_drops_predicates_on_patched_columns() {
        let filters = vec![Filter::eq("id", "abc"), Filter::eq("status", "pending")];
        let patch = json!({ "status": "approved" });

        let kept = reread_filters(&filters, patch.as_object().unwrap());
        assert_eq!(kept, vec![Filter::eq("id", "abc")]);
    }

    #[test]
    fn reread_keeps_everything_when_no_filter_column_is_patched() {
        let filters = vec![Filter::eq("user_id", "u-1")];
        let patch = json!({ "department": "Finance" });

        let kept = reread_filters(&filters, patch.as_object().unwrap());
        assert_eq!(kept, filters);
    }

    #[test]
    fn date_shaped_strings_bind_as_text_outside_temporal_columns() {
        let date_like = json!("2024-01-01");
        assert!(matches!(
            SqlValue::from_json("department", &date_like).unwrap(),
            SqlValue::String(_)
        ));
        assert!(matches!(
            SqlValue::from_json("join_date", &date_like).unwrap(),
            SqlValue::Date(_)
        ));
        assert!(matches!(
            SqlValue::from_json("created_at", &json!("2024-01-01T08:00:00Z")).unwrap(),
            SqlValue::DateTime(_)
        ));
    }

    #[test]
    fn temporal_columns_reject_non_date_strings() {
        assert!(SqlValue::from_json("join_date", &json!("next tuesday")).is_err());
    }
}
