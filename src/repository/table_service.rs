#![allow(dead_code)]

use chrono::{DateTime, FixedOffset, NaiveDate};
use serde_json::{Map, Value};
use sqlx::{postgres::PgRow, Postgres, QueryBuilder, Row};

use crate::error::AppError;

const ALLOWED_TABLES: &[&str] = &[
    "audit_logs",
    "concern_messages",
    "concerns",
    "properties",
    "rent_ledger",
    "room_tenants",
    "rooms",
    "users",
    "utility_bills",
];

pub async fn list_rows(
    pool: &sqlx::PgPool,
    table: &str,
    filters: Option<&Map<String, Value>>,
    limit: i64,
    offset: i64,
    order_by: &str,
    ascending: bool,
) -> Result<Vec<Value>, AppError> {
    let table_name = validate_table(table)?;
    let order_name = if order_by.trim().is_empty() {
        "created_at"
    } else {
        validate_identifier(order_by)?
    };

    let mut query = QueryBuilder::<Postgres>::new("SELECT row_to_json(t) AS row FROM ");
    query.push(table_name).push(" t WHERE 1=1");

    if let Some(filter_map) = filters {
        for (key, value) in filter_map {
            push_filter_clause(&mut query, key, value)?;
        }
    }

    query.push(" ORDER BY t.").push(order_name);
    if ascending {
        query.push(" ASC");
    } else {
        query.push(" DESC");
    }
    query
        .push(" LIMIT ")
        .push_bind(limit.clamp(1, 1000))
        .push(" OFFSET ")
        .push_bind(offset.max(0));

    let rows = query.build().fetch_all(pool).await?;
    Ok(read_rows(rows))
}

pub async fn get_row(pool: &sqlx::PgPool, table: &str, row_id: i64) -> Result<Value, AppError> {
    let table_name = validate_table(table)?;

    let mut query = QueryBuilder::<Postgres>::new("SELECT row_to_json(t) AS row FROM ");
    query
        .push(table_name)
        .push(" t WHERE t.id = ")
        .push_bind(row_id)
        .push(" LIMIT 1");

    let row = query.build().fetch_optional(pool).await?;

    row.and_then(|value| value.try_get::<Option<Value>, _>("row").ok().flatten())
        .ok_or_else(|| AppError::NotFound(format!("{table_name} record not found.")))
}

pub async fn create_row(
    pool: &sqlx::PgPool,
    table: &str,
    payload: &Map<String, Value>,
) -> Result<Value, AppError> {
    let table_name = validate_table(table)?;
    if payload.is_empty() {
        return Err(AppError::BadRequest(format!(
            "Could not create {table_name} record."
        )));
    }

    let mut keys = payload.keys().cloned().collect::<Vec<_>>();
    keys.sort_unstable();
    for key in &keys {
        validate_identifier(key)?;
    }

    // jsonb_populate_record lets PostgreSQL resolve column types (bigint,
    // date, numeric, boolean ...) from the table definition.
    let mut query = QueryBuilder::<Postgres>::new("INSERT INTO ");
    query.push(table_name).push(" (");
    {
        let mut separated = query.separated(", ");
        for key in &keys {
            separated.push(validate_identifier(key)?);
        }
    }
    query.push(") SELECT ");
    {
        let mut separated = query.separated(", ");
        for key in &keys {
            separated.push("r.");
            separated.push_unseparated(validate_identifier(key)?);
        }
    }
    query
        .push(" FROM jsonb_populate_record(NULL::")
        .push(table_name)
        .push(", ");
    query.push_bind(Value::Object(payload.clone()));
    query
        .push(") r RETURNING row_to_json(")
        .push(table_name)
        .push(".*) AS row");

    let row = query.build().fetch_optional(pool).await?;

    row.and_then(|value| value.try_get::<Option<Value>, _>("row").ok().flatten())
        .ok_or_else(|| AppError::Internal(format!("Could not create {table_name} record.")))
}

pub async fn update_row(
    pool: &sqlx::PgPool,
    table: &str,
    row_id: i64,
    payload: &Map<String, Value>,
) -> Result<Value, AppError> {
    let table_name = validate_table(table)?;
    if payload.is_empty() {
        return Err(AppError::BadRequest("No fields to update.".to_string()));
    }

    let mut keys = payload.keys().cloned().collect::<Vec<_>>();
    keys.sort_unstable();
    for key in &keys {
        validate_identifier(key)?;
    }

    let mut query = QueryBuilder::<Postgres>::new("UPDATE ");
    query.push(table_name).push(" t SET ");
    {
        let mut separated = query.separated(", ");
        for key in &keys {
            let column = validate_identifier(key)?;
            separated.push(column);
            separated.push_unseparated(" = r.");
            separated.push_unseparated(column);
        }
    }
    query
        .push(" FROM jsonb_populate_record(NULL::")
        .push(table_name)
        .push(", ");
    query.push_bind(Value::Object(payload.clone()));
    query
        .push(") r WHERE t.id = ")
        .push_bind(row_id)
        .push(" RETURNING row_to_json(t) AS row");

    let row = query.build().fetch_optional(pool).await?;

    row.and_then(|value| value.try_get::<Option<Value>, _>("row").ok().flatten())
        .ok_or_else(|| AppError::NotFound(format!("{table_name} record not found.")))
}

pub async fn delete_row(pool: &sqlx::PgPool, table: &str, row_id: i64) -> Result<Value, AppError> {
    let existing = get_row(pool, table, row_id).await?;
    let table_name = validate_table(table)?;

    let mut query = QueryBuilder::<Postgres>::new("DELETE FROM ");
    query
        .push(table_name)
        .push(" t WHERE t.id = ")
        .push_bind(row_id);
    query.build().execute(pool).await?;

    Ok(existing)
}

pub async fn count_rows(
    pool: &sqlx::PgPool,
    table: &str,
    filters: Option<&Map<String, Value>>,
) -> Result<i64, AppError> {
    let table_name = validate_table(table)?;

    let mut query = QueryBuilder::<Postgres>::new("SELECT COUNT(*)::bigint AS total FROM ");
    query.push(table_name).push(" t WHERE 1=1");

    if let Some(filter_map) = filters {
        for (key, value) in filter_map {
            push_filter_clause(&mut query, key, value)?;
        }
    }

    let row = query.build().fetch_one(pool).await?;

    Ok(row.try_get::<i64, _>("total").unwrap_or(0))
}

fn read_rows(rows: Vec<PgRow>) -> Vec<Value> {
    rows.into_iter()
        .filter_map(|row| row.try_get::<Option<Value>, _>("row").ok().flatten())
        .collect()
}

fn validate_table(table: &str) -> Result<&str, AppError> {
    let normalized = validate_identifier(table)?;
    if ALLOWED_TABLES.contains(&normalized) {
        return Ok(normalized);
    }
    Err(AppError::Forbidden(format!(
        "Table '{normalized}' is not allowed."
    )))
}

fn validate_identifier(identifier: &str) -> Result<&str, AppError> {
    let trimmed = identifier.trim();
    if trimmed.is_empty() {
        return Err(AppError::BadRequest(
            "Identifier cannot be empty.".to_string(),
        ));
    }
    if !trimmed.chars().all(|character| {
        character.is_ascii_lowercase() || character.is_ascii_digit() || character == '_'
    }) {
        return Err(AppError::BadRequest(format!(
            "Invalid identifier '{trimmed}'."
        )));
    }
    if trimmed
        .chars()
        .next()
        .is_some_and(|first| first.is_ascii_digit())
    {
        return Err(AppError::BadRequest(format!(
            "Invalid identifier '{trimmed}'."
        )));
    }
    Ok(trimmed)
}

#[derive(Debug, Clone)]
enum ScalarFilter {
    Text(String),
    Bool(bool),
    I64(i64),
    F64(f64),
    Date(NaiveDate),
    Timestamp(DateTime<FixedOffset>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FilterOperator {
    Eq,
    Gt,
    Gte,
    Lt,
    Lte,
    Like,
    ILike,
    IsNull,
}

fn parse_filter_key(filter_key: &str) -> Result<(&str, FilterOperator), AppError> {
    let mut column = filter_key;
    let mut operator = FilterOperator::Eq;

    if let Some((candidate_column, suffix)) = filter_key.rsplit_once("__") {
        operator = match suffix {
            "gt" => FilterOperator::Gt,
            "gte" => FilterOperator::Gte,
            "lt" => FilterOperator::Lt,
            "lte" => FilterOperator::Lte,
            "like" => FilterOperator::Like,
            "ilike" => FilterOperator::ILike,
            "is_null" => FilterOperator::IsNull,
            _ => FilterOperator::Eq,
        };
        if !matches!(operator, FilterOperator::Eq) {
            column = candidate_column;
        }
    }

    Ok((validate_identifier(column)?, operator))
}

fn push_filter_clause(
    query: &mut QueryBuilder<Postgres>,
    filter_key: &str,
    value: &Value,
) -> Result<(), AppError> {
    let (column, operator) = parse_filter_key(filter_key)?;

    if matches!(operator, FilterOperator::IsNull) {
        let should_be_null = matches!(value, Value::Null | Value::Bool(true));
        query.push(" AND t.").push(column);
        if should_be_null {
            query.push(" IS NULL");
        } else {
            query.push(" IS NOT NULL");
        }
        return Ok(());
    }

    match value {
        Value::Null => Ok(()),
        Value::Array(_) | Value::Object(_) => Err(AppError::BadRequest(format!(
            "Filter '{filter_key}' does not support structured values."
        ))),
        _ => {
            query.push(" AND ");
            let filter = infer_scalar_filter(column, value);
            push_scalar_filter(query, column, operator, &filter);
            Ok(())
        }
    }
}

fn push_scalar_filter(
    query: &mut QueryBuilder<Postgres>,
    column: &str,
    operator: FilterOperator,
    value: &ScalarFilter,
) {
    query.push("t.").push(column);
    let sql_operator = match operator {
        FilterOperator::Gt => " > ",
        FilterOperator::Gte => " >= ",
        FilterOperator::Lt => " < ",
        FilterOperator::Lte => " <= ",
        FilterOperator::Like => " LIKE ",
        FilterOperator::ILike => " ILIKE ",
        _ => " = ",
    };

    if matches!(operator, FilterOperator::Like | FilterOperator::ILike) {
        query
            .push("::text")
            .push(sql_operator)
            .push_bind(scalar_to_text(value));
        return;
    }

    match value {
        ScalarFilter::Text(text) => {
            query
                .push("::text")
                .push(sql_operator)
                .push_bind(text.clone());
        }
        ScalarFilter::Bool(flag) => {
            query.push(sql_operator).push_bind(*flag);
        }
        ScalarFilter::I64(number) => {
            query.push(sql_operator).push_bind(*number);
        }
        ScalarFilter::F64(number) => {
            query.push(sql_operator).push_bind(*number);
        }
        ScalarFilter::Date(date) => {
            query.push(sql_operator).push_bind(*date);
        }
        ScalarFilter::Timestamp(timestamp) => {
            query.push(sql_operator).push_bind(timestamp.to_owned());
        }
    }
}

fn scalar_to_text(value: &ScalarFilter) -> String {
    match value {
        ScalarFilter::Text(text) => text.clone(),
        ScalarFilter::Bool(flag) => flag.to_string(),
        ScalarFilter::I64(number) => number.to_string(),
        ScalarFilter::F64(number) => number.to_string(),
        ScalarFilter::Date(date) => date.to_string(),
        ScalarFilter::Timestamp(timestamp) => timestamp.to_rfc3339(),
    }
}

fn infer_scalar_filter(filter_key: &str, value: &Value) -> ScalarFilter {
    match value {
        Value::Bool(flag) => ScalarFilter::Bool(*flag),
        Value::Number(number) => {
            if let Some(as_i64) = number.as_i64() {
                return ScalarFilter::I64(as_i64);
            }
            if let Some(as_f64) = number.as_f64() {
                return ScalarFilter::F64(as_f64);
            }
            ScalarFilter::Text(number.to_string())
        }
        Value::String(text) => {
            let trimmed = text.trim();
            if is_id_identifier(filter_key) {
                if let Ok(parsed) = trimmed.parse::<i64>() {
                    return ScalarFilter::I64(parsed);
                }
            }
            if is_timestamp_identifier(filter_key) {
                if let Ok(parsed) = DateTime::parse_from_rfc3339(trimmed) {
                    return ScalarFilter::Timestamp(parsed);
                }
            }
            if is_date_identifier(filter_key) {
                if let Ok(parsed) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
                    return ScalarFilter::Date(parsed);
                }
            }
            ScalarFilter::Text(text.clone())
        }
        _ => ScalarFilter::Text(value.to_string()),
    }
}

fn is_id_identifier(identifier: &str) -> bool {
    let normalized = identifier.trim();
    normalized == "id" || normalized.ends_with("_id")
}

fn is_date_identifier(identifier: &str) -> bool {
    let normalized = identifier.trim();
    normalized.ends_with("_date") || matches!(normalized, "move_in" | "due_date")
}

fn is_timestamp_identifier(identifier: &str) -> bool {
    identifier.trim().ends_with("_at")
}

#[cfg(test)]
mod tests {
    use serde_json::{Map, Value};
    use sqlx::{Postgres, QueryBuilder};

    use super::{
        infer_scalar_filter, parse_filter_key, validate_identifier, validate_table,
        FilterOperator, ScalarFilter,
    };

    #[test]
    fn only_known_tables_are_allowed() {
        assert!(validate_table("rent_ledger").is_ok());
        assert!(validate_table("room_tenants").is_ok());
        assert!(validate_table("pg_catalog").is_err());
        assert!(validate_table("rent_ledger; drop table users").is_err());
    }

    #[test]
    fn identifiers_reject_unsafe_characters() {
        assert!(validate_identifier("due_date").is_ok());
        assert!(validate_identifier("1column").is_err());
        assert!(validate_identifier("col umn").is_err());
        assert!(validate_identifier("").is_err());
    }

    #[test]
    fn filter_suffixes_map_to_operators() {
        assert_eq!(
            parse_filter_key("created_at__gte").unwrap(),
            ("created_at", FilterOperator::Gte)
        );
        assert_eq!(
            parse_filter_key("message__ilike").unwrap(),
            ("message", FilterOperator::ILike)
        );
        assert_eq!(
            parse_filter_key("status").unwrap(),
            ("status", FilterOperator::Eq)
        );
    }

    #[test]
    fn string_values_are_inferred_by_column_name() {
        let inferred = infer_scalar_filter("tenant_id", &Value::String("42".to_string()));
        assert!(matches!(inferred, ScalarFilter::I64(42)));

        let inferred = infer_scalar_filter("move_in", &Value::String("2024-01-15".to_string()));
        assert!(matches!(inferred, ScalarFilter::Date(_)));

        let inferred = infer_scalar_filter("status", &Value::String("unpaid".to_string()));
        assert!(matches!(inferred, ScalarFilter::Text(_)));
    }

    #[test]
    fn insert_sql_uses_jsonb_populate_record() {
        let mut payload = Map::new();
        payload.insert(
            "property_name".to_string(),
            Value::String("Hive A".to_string()),
        );
        payload.insert("owner_id".to_string(), Value::Number(7.into()));

        let mut keys = payload.keys().cloned().collect::<Vec<_>>();
        keys.sort_unstable();

        let mut query = QueryBuilder::<Postgres>::new("INSERT INTO properties (");
        {
            let mut separated = query.separated(", ");
            for key in &keys {
                separated.push(key.as_str());
            }
        }
        query.push(") SELECT ");
        {
            let mut separated = query.separated(", ");
            for key in &keys {
                separated.push("r.");
                separated.push_unseparated(key.as_str());
            }
        }
        query.push(" FROM jsonb_populate_record(NULL::properties, ");
        query.push_bind(Value::Object(payload));
        query.push(") r");

        let sql = query.sql();
        assert!(
            sql.contains("jsonb_populate_record(NULL::properties"),
            "Expected jsonb_populate_record in SQL but got: {sql}"
        );
        assert!(
            sql.contains("SELECT r.owner_id, r.property_name"),
            "Expected r.col references in SQL but got: {sql}"
        );
    }
}
