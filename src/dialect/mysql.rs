use crate::{
    charset::validate_charset_name,
    error::{EncodeError, Result},
};

use super::Dialect;

const CURRENT_SCHEMA: &str = "SELECT DATABASE()";

const ENCODED_COLUMNS: &str = "SELECT `TABLE_NAME` AS table_name, `COLUMN_NAME` AS column_name \
     FROM `information_schema`.`COLUMNS` \
     WHERE `TABLE_SCHEMA` = ? AND `CHARACTER_SET_NAME` = ? \
     ORDER BY `TABLE_NAME`";

#[derive(Debug, Clone, Copy, Default)]
pub struct MySqlDialect;

impl Dialect for MySqlDialect {
    fn name(&self) -> &'static str {
        "mysql"
    }

    fn current_schema_query(&self) -> &'static str {
        CURRENT_SCHEMA
    }

    fn encoded_columns_query(&self) -> &'static str {
        ENCODED_COLUMNS
    }

    /// Backtick quoting with embedded backticks doubled. NUL cannot appear in
    /// a MySQL identifier and an empty name is never valid.
    fn quote_identifier(&self, identifier: &str) -> Result<String> {
        if identifier.is_empty() || identifier.contains('\0') {
            return Err(EncodeError::InvalidIdentifier {
                name: identifier.to_string(),
            });
        }
        Ok(format!("`{}`", identifier.replace('`', "``")))
    }

    fn rewrite_statement(
        &self,
        table: &str,
        column: &str,
        target_charset: &str,
    ) -> Result<String> {
        let target = validate_charset_name(target_charset)?;
        let table = self.quote_identifier(table)?;
        let column = self.quote_identifier(column)?;
        Ok(format!(
            "UPDATE {table} SET {column} = CONVERT(CAST(CONVERT({column} USING {legacy}) AS BINARY) USING {target})",
            legacy = self.legacy_charset(),
        ))
    }

    fn sample_values_query(&self, table: &str, column: &str, limit: usize) -> Result<String> {
        let table = self.quote_identifier(table)?;
        let column = self.quote_identifier(column)?;
        Ok(format!(
            "SELECT {column} AS value FROM {table} WHERE {column} IS NOT NULL LIMIT {limit}"
        ))
    }
}
