//! Schema Builder - DSL for creating database schema changes
//!
//! Provides a fluent interface for building dialect-specific schema
//! modification statements used by migration units.

use crate::backends::SqlDialect;

/// Ordered list of schema statements for one dialect
pub struct SchemaBuilder {
    dialect: SqlDialect,
    statements: Vec<String>,
}

impl SchemaBuilder {
    /// Create a new schema builder
    pub fn new(dialect: SqlDialect) -> Self {
        Self {
            dialect,
            statements: Vec::new(),
        }
    }

    /// Create a new table
    pub fn create_table<F>(&mut self, table_name: &str, callback: F) -> &mut Self
    where
        F: FnOnce(&mut TableBuilder),
    {
        let mut table_builder = TableBuilder::new(self.dialect, table_name);
        callback(&mut table_builder);

        self.statements.push(table_builder.to_sql());
        self
    }

    /// Drop a table
    pub fn drop_table(&mut self, table_name: &str) -> &mut Self {
        self.statements.push(format!("DROP TABLE IF EXISTS {}", table_name));
        self
    }

    /// Create an index
    pub fn create_index<F>(&mut self, table_name: &str, columns: &[&str], callback: F) -> &mut Self
    where
        F: FnOnce(&mut IndexBuilder),
    {
        let mut index_builder = IndexBuilder::new(table_name, columns);
        callback(&mut index_builder);

        self.statements.push(index_builder.to_sql());
        self
    }

    /// Drop an index
    pub fn drop_index(&mut self, index_name: &str) -> &mut Self {
        self.statements.push(format!("DROP INDEX IF EXISTS {}", index_name));
        self
    }

    /// Get all SQL statements
    pub fn statements(&self) -> &[String] {
        &self.statements
    }

    pub fn into_statements(self) -> Vec<String> {
        self.statements
    }
}

/// Table builder for CREATE TABLE statements
pub struct TableBuilder {
    dialect: SqlDialect,
    table_name: String,
    if_not_exists: bool,
    columns: Vec<String>,
    constraints: Vec<String>,
}

impl TableBuilder {
    pub fn new(dialect: SqlDialect, table_name: &str) -> Self {
        Self {
            dialect,
            table_name: table_name.to_string(),
            if_not_exists: false,
            columns: Vec::new(),
            constraints: Vec::new(),
        }
    }

    /// Emit `CREATE TABLE IF NOT EXISTS`
    pub fn if_not_exists(&mut self) -> &mut Self {
        self.if_not_exists = true;
        self
    }

    /// Add a column with an explicit type
    pub fn column(&mut self, name: &str, column_type: &str) -> &mut Self {
        self.columns.push(format!("{} {}", name, column_type));
        self
    }

    /// Add an ID column (auto-increment primary key)
    pub fn id(&mut self, name: &str) -> &mut Self {
        self.columns.push(self.dialect.primary_key(name));
        self
    }

    /// Add a string column
    pub fn string(&mut self, name: &str, length: Option<u32>) -> &mut Self {
        let column_type = match length {
            Some(len) => format!("VARCHAR({})", len),
            None => "TEXT".to_string(),
        };
        self.columns.push(format!("{} {}", name, column_type));
        self
    }

    /// Add a required string column
    pub fn string_not_null(&mut self, name: &str, length: Option<u32>) -> &mut Self {
        self.string(name, length);
        if let Some(last) = self.columns.last_mut() {
            last.push_str(" NOT NULL");
        }
        self
    }

    /// Add a text column
    pub fn text(&mut self, name: &str) -> &mut Self {
        self.string(name, None)
    }

    /// Add an integer column
    pub fn integer(&mut self, name: &str) -> &mut Self {
        self.columns.push(format!("{} INTEGER", name));
        self
    }

    /// Add an integer column with a default
    pub fn integer_default(&mut self, name: &str, default: i64) -> &mut Self {
        self.columns
            .push(format!("{} INTEGER NOT NULL DEFAULT {}", name, default));
        self
    }

    /// Add a boolean column
    pub fn boolean(&mut self, name: &str, default: Option<bool>) -> &mut Self {
        let mut column = format!("{} {}", name, self.dialect.boolean());
        if let Some(value) = default {
            column.push_str(&format!(" DEFAULT {}", self.dialect.boolean_value(value)));
        }
        self.columns.push(column);
        self
    }

    /// Add a timestamp column defaulting to the current time
    pub fn timestamp(&mut self, name: &str) -> &mut Self {
        self.columns
            .push(format!("{} {}", name, self.dialect.timestamp()));
        self
    }

    /// Add timestamp columns
    pub fn timestamps(&mut self) -> &mut Self {
        self.timestamp("created_at");
        self.timestamp("updated_at")
    }

    /// Add a primary key constraint
    pub fn primary_key(&mut self, columns: &[&str]) -> &mut Self {
        self.constraints
            .push(format!("PRIMARY KEY ({})", columns.join(", ")));
        self
    }

    /// Add a foreign key constraint
    pub fn foreign_key(&mut self, column: &str, references_table: &str, references_column: &str) -> &mut Self {
        self.constraints.push(format!(
            "FOREIGN KEY ({}) REFERENCES {} ({})",
            column, references_table, references_column
        ));
        self
    }

    /// Add a unique constraint
    pub fn unique(&mut self, columns: &[&str]) -> &mut Self {
        self.constraints
            .push(format!("UNIQUE ({})", columns.join(", ")));
        self
    }

    /// Build the CREATE TABLE SQL
    pub fn to_sql(&self) -> String {
        let mut parts = self.columns.clone();
        parts.extend(self.constraints.iter().cloned());

        format!(
            "CREATE TABLE {}{} (\n    {}\n)",
            if self.if_not_exists { "IF NOT EXISTS " } else { "" },
            self.table_name,
            parts.join(",\n    ")
        )
    }
}

/// Index builder for CREATE INDEX statements
pub struct IndexBuilder {
    table_name: String,
    columns: Vec<String>,
    name: Option<String>,
    unique: bool,
    if_not_exists: bool,
}

impl IndexBuilder {
    pub fn new(table_name: &str, columns: &[&str]) -> Self {
        Self {
            table_name: table_name.to_string(),
            columns: columns.iter().map(|c| c.to_string()).collect(),
            name: None,
            unique: false,
            if_not_exists: false,
        }
    }

    /// Override the generated `idx_<table>_<columns>` name
    pub fn name(&mut self, name: &str) -> &mut Self {
        self.name = Some(name.to_string());
        self
    }

    pub fn unique(&mut self) -> &mut Self {
        self.unique = true;
        self
    }

    pub fn if_not_exists(&mut self) -> &mut Self {
        self.if_not_exists = true;
        self
    }

    /// Name the index will be created under
    pub fn index_name(&self) -> String {
        self.name
            .clone()
            .unwrap_or_else(|| format!("idx_{}_{}", self.table_name, self.columns.join("_")))
    }

    /// Build the CREATE INDEX SQL
    pub fn to_sql(&self) -> String {
        format!(
            "CREATE {}INDEX {}{} ON {} ({})",
            if self.unique { "UNIQUE " } else { "" },
            if self.if_not_exists { "IF NOT EXISTS " } else { "" },
            self.index_name(),
            self.table_name,
            self.columns.join(", ")
        )
    }
}
