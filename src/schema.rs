use crate::elements::ElementSpec;

/// Synthetic column prepended to every derived schema.
#[derive(Debug, Clone, Copy)]
pub struct IdentityColumn {
    pub name: &'static str,
    pub datatype: &'static str,
    pub primary_key: bool,
}

/// Identity columns, in declared order. The file base name is the primary
/// key; a duplicate base name across subdirectories is a conflict the store
/// rejects. The path column holds the path relative to the configured root.
pub const IDENTITY_COLUMNS: [IdentityColumn; 2] = [
    IdentityColumn {
        name: "file_name",
        datatype: "VARCHAR(255)",
        primary_key: true,
    },
    IdentityColumn {
        name: "file_path",
        datatype: "VARCHAR(255)",
        primary_key: false,
    },
];

/// Column order shared by the derived schema and every insert built against
/// it. Both sides call this, neither re-derives the order on its own.
pub fn column_names(spec: &ElementSpec) -> Vec<&str> {
    let mut names: Vec<&str> = IDENTITY_COLUMNS.iter().map(|column| column.name).collect();
    names.extend(spec.persisted().map(|entry| entry.name.as_str()));
    names
}

/// Derive the CREATE TABLE statement for an element specification.
///
/// Identifier templating only; the caller guards idempotency with a table
/// existence check before executing. A specification with zero persisted
/// entries yields a table with only the identity columns.
pub fn create_table_sql(table: &str, spec: &ElementSpec) -> String {
    let mut columns: Vec<String> = IDENTITY_COLUMNS
        .iter()
        .map(|column| {
            if column.primary_key {
                format!("{} {} PRIMARY KEY", column.name, column.datatype)
            } else {
                format!("{} {}", column.name, column.datatype)
            }
        })
        .collect();
    columns.extend(spec.persisted().map(|entry| format!("{} {}", entry.name, entry.db_datatype)));

    format!("CREATE TABLE {table} (\n{}\n);", columns.join(",\n"))
}
