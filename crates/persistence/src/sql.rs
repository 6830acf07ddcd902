//! Pure SQL statement assembly.
//!
//! Everything here is text + ordered parameters; no IO. `Null` values never
//! become placeholders: they are emitted as `NULL` literals (or `IS NULL`
//! predicates) so the engine never has to infer a parameter type for them.

use crate::model::TableDef;
use crate::query::FilterOp;
use crate::value::SqlValue;

/// A statement with its ordered parameters.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct SqlStatement {
    pub sql: String,
    pub params: Vec<SqlValue>,
}

/// Double-quote an identifier, doubling embedded quotes.
pub(crate) fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

pub(crate) fn qualified_table(schema: Option<&str>, table: &str) -> String {
    match schema {
        Some(schema) => format!("{}.{}", quote_ident(schema), quote_ident(table)),
        None => quote_ident(table),
    }
}

pub(crate) fn insert_statement(table: &str, columns: &[(String, SqlValue)]) -> SqlStatement {
    let mut names = Vec::with_capacity(columns.len());
    let mut placeholders = Vec::with_capacity(columns.len());
    let mut params = Vec::new();

    for (name, value) in columns {
        names.push(quote_ident(name));
        if value.is_null() {
            placeholders.push("NULL".to_string());
        } else {
            params.push(value.clone());
            placeholders.push(format!("${}", params.len()));
        }
    }

    SqlStatement {
        sql: format!(
            "INSERT INTO {table} ({}) VALUES ({})",
            names.join(", "),
            placeholders.join(", ")
        ),
        params,
    }
}

pub(crate) fn update_statement(
    table: &str,
    sets: &[(String, SqlValue)],
    predicates: &[(String, SqlValue)],
) -> SqlStatement {
    let mut params = Vec::new();
    let mut assignments = Vec::with_capacity(sets.len());
    for (name, value) in sets {
        if value.is_null() {
            assignments.push(format!("{} = NULL", quote_ident(name)));
        } else {
            params.push(value.clone());
            assignments.push(format!("{} = ${}", quote_ident(name), params.len()));
        }
    }

    let where_clause = predicate_clause(predicates, &mut params);
    SqlStatement {
        sql: format!(
            "UPDATE {table} SET {}{where_clause}",
            assignments.join(", ")
        ),
        params,
    }
}

pub(crate) fn delete_statement(table: &str, predicates: &[(String, SqlValue)]) -> SqlStatement {
    let mut params = Vec::new();
    let where_clause = predicate_clause(predicates, &mut params);
    SqlStatement {
        sql: format!("DELETE FROM {table}{where_clause}"),
        params,
    }
}

pub(crate) fn select_statement(
    table: &str,
    columns: &[String],
    filters: &[(String, FilterOp, SqlValue)],
    order: &[(String, bool)],
    limit: Option<u64>,
    offset: Option<u64>,
) -> SqlStatement {
    let mut params = Vec::new();
    let column_list = columns
        .iter()
        .map(|c| quote_ident(c))
        .collect::<Vec<_>>()
        .join(", ");

    let mut sql = format!("SELECT {column_list} FROM {table}");
    sql.push_str(&filter_clause(filters, &mut params));

    if !order.is_empty() {
        let order_list = order
            .iter()
            .map(|(column, descending)| {
                format!(
                    "{} {}",
                    quote_ident(column),
                    if *descending { "DESC" } else { "ASC" }
                )
            })
            .collect::<Vec<_>>()
            .join(", ");
        sql.push_str(&format!(" ORDER BY {order_list}"));
    }
    if let Some(limit) = limit {
        sql.push_str(&format!(" LIMIT {limit}"));
    }
    if let Some(offset) = offset {
        sql.push_str(&format!(" OFFSET {offset}"));
    }

    SqlStatement { sql, params }
}

pub(crate) fn count_statement(
    table: &str,
    filters: &[(String, FilterOp, SqlValue)],
) -> SqlStatement {
    let mut params = Vec::new();
    let mut sql = format!("SELECT COUNT(*) FROM {table}");
    sql.push_str(&filter_clause(filters, &mut params));
    SqlStatement { sql, params }
}

pub(crate) fn create_table_statement(table: &TableDef) -> String {
    let mut definitions: Vec<String> = Vec::with_capacity(table.columns.len() + 1);
    for column in &table.columns {
        let mut definition = format!(
            "{} {}",
            quote_ident(&column.name),
            column.column_type.postgres_type()
        );
        if !column.nullable {
            definition.push_str(" NOT NULL");
        }
        definitions.push(definition);
    }
    if let Some(key) = table.columns.iter().find(|c| c.primary_key) {
        definitions.push(format!("PRIMARY KEY ({})", quote_ident(&key.name)));
    }

    format!(
        "CREATE TABLE IF NOT EXISTS {} ({})",
        table.qualified_name(),
        definitions.join(", ")
    )
}

fn predicate_clause(predicates: &[(String, SqlValue)], params: &mut Vec<SqlValue>) -> String {
    if predicates.is_empty() {
        return String::new();
    }
    let clauses = predicates
        .iter()
        .map(|(name, value)| {
            if value.is_null() {
                format!("{} IS NULL", quote_ident(name))
            } else {
                params.push(value.clone());
                format!("{} = ${}", quote_ident(name), params.len())
            }
        })
        .collect::<Vec<_>>()
        .join(" AND ");
    format!(" WHERE {clauses}")
}

fn filter_clause(
    filters: &[(String, FilterOp, SqlValue)],
    params: &mut Vec<SqlValue>,
) -> String {
    if filters.is_empty() {
        return String::new();
    }
    let clauses = filters
        .iter()
        .map(|(column, op, value)| match op {
            FilterOp::IsNull => format!("{} IS NULL", quote_ident(column)),
            FilterOp::IsNotNull => format!("{} IS NOT NULL", quote_ident(column)),
            _ => {
                params.push(value.clone());
                format!("{} {} ${}", quote_ident(column), op.sql(), params.len())
            }
        })
        .collect::<Vec<_>>()
        .join(" AND ");
    format!(" WHERE {clauses}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ColumnDef, ColumnType, TableDef, ValueGeneration, ValueSource};

    fn column(name: &str, column_type: ColumnType, nullable: bool, pk: bool) -> ColumnDef {
        ColumnDef {
            name: name.to_string(),
            column_type,
            nullable,
            generation: ValueGeneration::Never,
            source: ValueSource::None,
            concurrency_token: false,
            primary_key: pk,
        }
    }

    #[test]
    fn quoting_doubles_embedded_quotes() {
        assert_eq!(quote_ident("plain"), "\"plain\"");
        assert_eq!(quote_ident("we\"ird"), "\"we\"\"ird\"");
        assert_eq!(
            qualified_table(Some("sales"), "customer"),
            "\"sales\".\"customer\""
        );
        assert_eq!(qualified_table(None, "customer"), "\"customer\"");
    }

    #[test]
    fn insert_emits_null_literal_without_parameter() {
        let statement = insert_statement(
            "\"customer\"",
            &[
                ("id".to_string(), SqlValue::BigInt(7)),
                ("nickname".to_string(), SqlValue::Null),
                ("name".to_string(), SqlValue::Text("Ada".into())),
            ],
        );

        assert_eq!(
            statement.sql,
            "INSERT INTO \"customer\" (\"id\", \"nickname\", \"name\") VALUES ($1, NULL, $2)"
        );
        assert_eq!(statement.params.len(), 2);
    }

    #[test]
    fn update_appends_predicates_after_sets() {
        let statement = update_statement(
            "\"customer\"",
            &[
                ("name".to_string(), SqlValue::Text("Ada".into())),
                ("nickname".to_string(), SqlValue::Null),
            ],
            &[
                ("id".to_string(), SqlValue::BigInt(7)),
                ("row_version".to_string(), SqlValue::Bytes(vec![1])),
            ],
        );

        assert_eq!(
            statement.sql,
            "UPDATE \"customer\" SET \"name\" = $1, \"nickname\" = NULL \
             WHERE \"id\" = $2 AND \"row_version\" = $3"
        );
        assert_eq!(statement.params.len(), 3);
    }

    #[test]
    fn delete_filters_by_predicates() {
        let statement = delete_statement(
            "\"customer\"",
            &[("id".to_string(), SqlValue::BigInt(7))],
        );

        assert_eq!(statement.sql, "DELETE FROM \"customer\" WHERE \"id\" = $1");
        assert_eq!(statement.params, vec![SqlValue::BigInt(7)]);
    }

    #[test]
    fn select_orders_and_pages() {
        let statement = select_statement(
            "\"customer\"",
            &["id".to_string(), "name".to_string()],
            &[(
                "name".to_string(),
                FilterOp::Like,
                SqlValue::Text("A%".into()),
            )],
            &[("name".to_string(), false), ("id".to_string(), true)],
            Some(10),
            Some(20),
        );

        assert_eq!(
            statement.sql,
            "SELECT \"id\", \"name\" FROM \"customer\" WHERE \"name\" LIKE $1 \
             ORDER BY \"name\" ASC, \"id\" DESC LIMIT 10 OFFSET 20"
        );
    }

    #[test]
    fn null_operators_take_no_parameter() {
        let statement = count_statement(
            "\"customer\"",
            &[
                ("deleted_at".to_string(), FilterOp::IsNull, SqlValue::Null),
                ("name".to_string(), FilterOp::Ne, SqlValue::Text("x".into())),
            ],
        );

        assert_eq!(
            statement.sql,
            "SELECT COUNT(*) FROM \"customer\" WHERE \"deleted_at\" IS NULL AND \"name\" != $1"
        );
        assert_eq!(statement.params.len(), 1);
    }

    #[test]
    fn create_table_renders_constraints() {
        let table = TableDef {
            table: "customer".to_string(),
            schema: Some("sales".to_string()),
            columns: vec![
                column("id", ColumnType::Uuid, false, true),
                column("name", ColumnType::Text, false, false),
                column("nickname", ColumnType::Text, true, false),
            ],
        };

        assert_eq!(
            create_table_statement(&table),
            "CREATE TABLE IF NOT EXISTS \"sales\".\"customer\" (\
             \"id\" uuid NOT NULL, \"name\" text NOT NULL, \"nickname\" text, \
             PRIMARY KEY (\"id\"))"
        );
    }

    mod placeholder_properties {
        use super::*;
        use proptest::prelude::*;

        fn placeholders(sql: &str) -> Vec<u32> {
            let mut out = Vec::new();
            let bytes = sql.as_bytes();
            let mut i = 0;
            while i < bytes.len() {
                if bytes[i] == b'$' {
                    let mut j = i + 1;
                    while j < bytes.len() && bytes[j].is_ascii_digit() {
                        j += 1;
                    }
                    if j > i + 1 {
                        out.push(sql[i + 1..j].parse().unwrap());
                    }
                    i = j;
                } else {
                    i += 1;
                }
            }
            out
        }

        proptest! {
            /// Placeholders are always `$1..$n` in order, with exactly one
            /// parameter each, regardless of where NULLs land.
            #[test]
            fn placeholders_are_sequential(
                values in proptest::collection::vec(
                    prop_oneof![
                        Just(SqlValue::Null),
                        any::<i64>().prop_map(SqlValue::BigInt),
                        "[a-z]{0,8}".prop_map(SqlValue::Text),
                    ],
                    1..12,
                )
            ) {
                let columns: Vec<(String, SqlValue)> = values
                    .into_iter()
                    .enumerate()
                    .map(|(i, v)| (format!("col_{i}"), v))
                    .collect();

                let statement = insert_statement("\"t\"", &columns);
                let seen = placeholders(&statement.sql);
                prop_assert_eq!(seen.len(), statement.params.len());
                for (index, n) in seen.iter().enumerate() {
                    prop_assert_eq!(*n as usize, index + 1);
                }
            }
        }
    }
}
