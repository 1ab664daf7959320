use crate::elements::{DecodedSet, ElementSpec, TagValue};
use crate::normalize::LIST_DELIMITER;
use crate::schema;

/// A value bound to one insert placeholder. Absence markers travel as `Null`.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnValue {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
}

/// A parameterized insert and its bound values, in matching order.
#[derive(Debug, Clone)]
pub struct InsertStatement {
    pub sql: String,
    pub values: Vec<ColumnValue>,
}

/// Assemble the insert for one file: identity values first, then every
/// persisted entry in specification order.
///
/// The column order comes from [`schema::column_names`], so it always matches
/// the derived table. Values are bound through placeholders, never inlined;
/// file-derived text must not reach the statement body.
pub fn build_insert(
    table: &str,
    spec: &ElementSpec,
    decoded: &DecodedSet,
    file_name: &str,
    file_path: &str,
) -> InsertStatement {
    let names = schema::column_names(spec);
    let placeholders: Vec<String> = (1..=names.len()).map(|i| format!("?{i}")).collect();

    let mut values = Vec::with_capacity(names.len());
    values.push(ColumnValue::Text(file_name.to_string()));
    values.push(ColumnValue::Text(file_path.to_string()));
    for entry in spec.persisted() {
        values.push(match decoded.get(&entry.name) {
            Some(value) => bind_value(value),
            None => ColumnValue::Null,
        });
    }

    let sql = format!(
        "INSERT INTO {table} ({})\nVALUES ({});",
        names.join(", "),
        placeholders.join(", ")
    );

    InsertStatement { sql, values }
}

fn bind_value(value: &TagValue) -> ColumnValue {
    match value {
        TagValue::Int(value) => ColumnValue::Integer(*value),
        TagValue::Real(value) => ColumnValue::Real(*value),
        TagValue::Text(value) => ColumnValue::Text(value.clone()),
        // A sequence that survived normalization collapses the same way the
        // orientation rule does.
        TagValue::List(_) => ColumnValue::Text(value.render(LIST_DELIMITER)),
    }
}
