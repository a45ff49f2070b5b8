//! SQL text for each supported database engine.
//!
//! The pipeline needs a handful of engine-specific SQL: how to ask for the
//! active schema, how to list columns carrying a charset, how to sample and
//! rewrite one column, and how to quote identifiers. A new engine is a new [`Dialect`]
//! implementation; the coordinator does not change.

mod mysql;

pub use mysql::MySqlDialect;

use crate::{
    charset::{LEGACY_CHARSET, Reinterpretation},
    error::Result,
};

pub trait Dialect {
    fn name(&self) -> &'static str;

    /// Single-row, single-column query returning the active schema name.
    fn current_schema_query(&self) -> &'static str;

    /// Catalog query bound with `[schema, charset]`, yielding `table_name`
    /// and `column_name` ordered by table.
    fn encoded_columns_query(&self) -> &'static str;

    fn quote_identifier(&self, identifier: &str) -> Result<String>;

    /// Statement reinterpreting the column's stored bytes as `target_charset`.
    fn rewrite_statement(&self, table: &str, column: &str, target_charset: &str)
    -> Result<String>;

    /// Up to `limit` non-NULL values of the column, as a single `value` field.
    fn sample_values_query(&self, table: &str, column: &str, limit: usize) -> Result<String>;

    /// Encoding the stored text is converted to before its bytes are re-read.
    fn legacy_charset(&self) -> &'static str {
        LEGACY_CHARSET
    }

    fn reinterpretation(&self, target_charset: &str) -> Result<Reinterpretation> {
        Reinterpretation::new(self.legacy_charset(), target_charset)
    }
}
