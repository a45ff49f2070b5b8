//! Discovery of the text columns a run will rewrite.

use std::fmt;

use serde::Serialize;

use crate::{
    charset::validate_charset_name,
    connection::{Connection, Row, Value},
    dialect::Dialect,
    error::{DriverError, EncodeError, Result},
    runner::{Rows, StatementRunner},
};

/// A single text column, as reported by the metadata catalog.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct ColumnRef {
    pub table: String,
    pub column: String,
}

impl ColumnRef {
    pub fn new(table: impl Into<String>, column: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            column: column.into(),
        }
    }
}

impl fmt::Display for ColumnRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.table, self.column)
    }
}

pub struct SchemaInspector<'a, D: Dialect> {
    dialect: &'a D,
    runner: StatementRunner<'a>,
}

impl<'a, D: Dialect> SchemaInspector<'a, D> {
    pub fn new(dialect: &'a D, runner: StatementRunner<'a>) -> Self {
        Self { dialect, runner }
    }

    /// Name of the schema the connection currently works in.
    pub fn current_schema<C: Connection>(&self, conn: &mut C) -> Result<String> {
        let sql = self.dialect.current_schema_query();
        match self.runner.fetch_scalar(conn, sql)? {
            Some(schema) => Ok(schema),
            None => {
                let err = EncodeError::execute(sql, &[], DriverError::new("no database selected"));
                self.runner.sink().critical(&err.to_string());
                Err(err)
            }
        }
    }

    /// Columns of the current schema whose declared charset is
    /// `source_charset`, ordered by table name. Rows are pulled from the
    /// catalog one at a time as the returned iterator advances; calling this
    /// again starts a fresh pass.
    pub fn find_encoded_columns<'c, C: Connection>(
        &self,
        conn: &'c mut C,
        source_charset: &str,
    ) -> Result<EncodedColumns<'c>>
    where
        'a: 'c,
    {
        let charset = validate_charset_name(source_charset)?;
        let schema = self.current_schema(conn)?;
        let stmt = self
            .runner
            .prepare(conn, self.dialect.encoded_columns_query())?;
        let rows = self.runner.query(
            conn,
            &stmt,
            &[Value::from(schema), Value::from(charset)],
        )?;
        Ok(EncodedColumns { rows })
    }
}

impl<D: Dialect> SchemaInspector<'_, D> {
    /// Up to `limit` non-NULL values currently stored in `column`.
    pub fn sample_values<C: Connection>(
        &self,
        conn: &mut C,
        column: &ColumnRef,
        limit: usize,
    ) -> Result<Vec<String>> {
        let sql = self
            .dialect
            .sample_values_query(&column.table, &column.column, limit)?;
        let stmt = self.runner.prepare(conn, &sql)?;
        let rows = self.runner.query(conn, &stmt, &[])?;
        rows.map(|row| row.map(|row| row.first().map(sample_text).unwrap_or_default()))
            .collect()
    }
}

fn sample_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Int(value) => value.to_string(),
        Value::Text(text) => text.clone(),
        Value::Bytes(bytes) => String::from_utf8_lossy(bytes).into_owned(),
    }
}

/// Forward-only stream of discovered columns.
pub struct EncodedColumns<'c> {
    rows: Rows<'c>,
}

impl EncodedColumns<'_> {
    fn column_ref(&self, row: &Row) -> Result<ColumnRef> {
        let table = self.text_field(row, "table_name")?;
        let column = self.text_field(row, "column_name")?;
        Ok(ColumnRef::new(table, column))
    }

    fn text_field<'r>(&self, row: &'r Row, name: &str) -> Result<&'r str> {
        match row.get(name) {
            Some(value) => value
                .as_text()
                .ok_or_else(|| self.rows.malformed(format!("field '{name}' is not text"))),
            None => Err(self.rows.malformed(format!("field '{name}' is missing"))),
        }
    }
}

impl Iterator for EncodedColumns<'_> {
    type Item = Result<ColumnRef>;

    fn next(&mut self) -> Option<Self::Item> {
        let row = match self.rows.next()? {
            Ok(row) => row,
            Err(err) => return Some(Err(err)),
        };
        Some(self.column_ref(&row))
    }
}
