#![forbid(unsafe_code)]

use crate::{ScanOrder, StoreError};
use fleetlog_core::{Column, Predicate, SortDirection, Value};
use rusqlite::types::Value as SqlValue;

const MAX_TABLE_NAME_LEN: usize = 64;

/// Quotes a table name after checking it is a plain identifier.
pub(crate) fn quote_table(table: &str) -> Result<String, StoreError> {
    let mut chars = table.chars();
    let valid_first = chars
        .next()
        .is_some_and(|ch| ch.is_ascii_alphabetic() || ch == '_');
    let valid_rest = chars.all(|ch| ch.is_ascii_alphanumeric() || ch == '_');
    if !valid_first || !valid_rest || table.len() > MAX_TABLE_NAME_LEN {
        return Err(StoreError::InvalidTable(table.to_string()));
    }
    if table.to_ascii_lowercase().starts_with("sqlite_") {
        return Err(StoreError::InvalidTable(table.to_string()));
    }
    Ok(format!("\"{table}\""))
}

pub(crate) fn append_predicate(sql: &mut String, params: &mut Vec<SqlValue>, predicate: &Predicate) {
    match predicate {
        Predicate::And(parts) => append_group(sql, params, parts, " AND ", "1"),
        Predicate::Or(parts) => append_group(sql, params, parts, " OR ", "0"),
        Predicate::Eq(column, value) => append_compare(sql, params, *column, "=", value),
        Predicate::Ne(column, value) => append_compare(sql, params, *column, "!=", value),
        Predicate::Ge(column, value) => append_compare(sql, params, *column, ">=", value),
        Predicate::Le(column, value) => append_compare(sql, params, *column, "<=", value),
        Predicate::Lt(column, value) => append_compare(sql, params, *column, "<", value),
        Predicate::In(column, values) => {
            if values.is_empty() {
                sql.push('0');
                return;
            }
            sql.push_str(column.name());
            sql.push_str(" IN (");
            for (index, value) in values.iter().enumerate() {
                if index > 0 {
                    sql.push_str(", ");
                }
                sql.push('?');
                params.push(to_sql_value(value));
            }
            sql.push(')');
        }
    }
}

fn append_group(
    sql: &mut String,
    params: &mut Vec<SqlValue>,
    parts: &[Predicate],
    joiner: &str,
    empty: &str,
) {
    if parts.is_empty() {
        sql.push_str(empty);
        return;
    }
    sql.push('(');
    for (index, part) in parts.iter().enumerate() {
        if index > 0 {
            sql.push_str(joiner);
        }
        append_predicate(sql, params, part);
    }
    sql.push(')');
}

fn append_compare(
    sql: &mut String,
    params: &mut Vec<SqlValue>,
    column: Column,
    op: &str,
    value: &Value,
) {
    sql.push_str(column.name());
    sql.push(' ');
    sql.push_str(op);
    sql.push_str(" ?");
    params.push(to_sql_value(value));
}

fn to_sql_value(value: &Value) -> SqlValue {
    match value {
        Value::Text(text) => SqlValue::Text(text.clone()),
        Value::Integer(number) => SqlValue::Integer(*number),
        Value::Real(number) => SqlValue::Real(*number),
    }
}

/// `ORDER BY` tail with deterministic tie-breaks on the rest of the key.
pub(crate) fn append_order(sql: &mut String, order: ScanOrder) {
    let dir = match order.direction {
        SortDirection::Ascending => "ASC",
        SortDirection::Descending => "DESC",
    };
    sql.push_str(" ORDER BY ");
    let key = order.key.column();
    if key != Column::Timestamp {
        sql.push_str(key.name());
        sql.push(' ');
        sql.push_str(dir);
        sql.push_str(", ");
    }
    sql.push_str(&format!("timestamp {dir}, status_code {dir}"));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::OrderKey;

    fn render(predicate: &Predicate) -> (String, Vec<SqlValue>) {
        let mut sql = String::new();
        let mut params = Vec::new();
        append_predicate(&mut sql, &mut params, predicate);
        (sql, params)
    }

    #[test]
    fn renders_nested_tree_with_placeholders() {
        let predicate = Predicate::And(vec![
            Predicate::eq(Column::AccountId, "acme"),
            Predicate::is_in(Column::StatusCode, [1_u32, 2]),
            Predicate::Or(vec![
                Predicate::ne(Column::Latitude, 0.0),
                Predicate::ne(Column::Longitude, 0.0),
            ]),
        ]);
        let (sql, params) = render(&predicate);
        assert_eq!(
            sql,
            "(account_id = ? AND status_code IN (?, ?) AND (latitude != ? OR longitude != ?))"
        );
        assert_eq!(params.len(), 5);
        assert_eq!(params[0], SqlValue::Text("acme".to_string()));
    }

    #[test]
    fn empty_groups_are_constants() {
        assert_eq!(render(&Predicate::all()).0, "1");
        assert_eq!(render(&Predicate::Or(Vec::new())).0, "0");
        assert_eq!(render(&Predicate::In(Column::StatusCode, Vec::new())).0, "0");
    }

    #[test]
    fn table_names_must_be_identifiers() {
        assert_eq!(quote_table("EventData").unwrap(), "\"EventData\"");
        assert!(quote_table("Event\"Data").is_err());
        assert!(quote_table("1events").is_err());
        assert!(quote_table("sqlite_master").is_err());
        assert!(quote_table("").is_err());
    }

    #[test]
    fn order_breaks_ties_on_key() {
        let mut sql = String::new();
        append_order(
            &mut sql,
            ScanOrder {
                key: OrderKey::CreationTime,
                direction: SortDirection::Descending,
            },
        );
        assert_eq!(
            sql,
            " ORDER BY creation_time DESC, timestamp DESC, status_code DESC"
        );
    }
}
