//! Per-column rewrite.
//!
//! The rewrite re-labels the bytes a column already stores: the text is
//! converted to the dialect's single-byte legacy charset, cast to binary and
//! read back as the target charset. No byte is altered by the statement
//! itself; only the charset the engine decodes them with changes.

use crate::{
    charset::Reinterpretation,
    connection::{Connection, Statement},
    dialect::Dialect,
    error::Result,
    runner::StatementRunner,
};

pub struct ColumnEncoder<'a, D: Dialect> {
    dialect: &'a D,
    runner: StatementRunner<'a>,
}

impl<'a, D: Dialect> ColumnEncoder<'a, D> {
    pub fn new(dialect: &'a D, runner: StatementRunner<'a>) -> Self {
        Self { dialect, runner }
    }

    /// Rewrite statement text for one column, without touching the database.
    pub fn build_statement(&self, table: &str, column: &str, target_charset: &str) -> Result<String> {
        self.dialect.rewrite_statement(table, column, target_charset)
    }

    /// What the rewrite does to a single stored value.
    pub fn reinterpretation(&self, target_charset: &str) -> Result<Reinterpretation> {
        self.dialect.reinterpretation(target_charset)
    }

    /// Prepares the rewrite for `table`.`column` and runs it unless `dry_run`.
    /// The prepared statement is returned so callers can inspect its text.
    pub fn encode<C: Connection>(
        &self,
        conn: &mut C,
        table: &str,
        column: &str,
        target_charset: &str,
        dry_run: bool,
    ) -> Result<Statement<C::Handle>> {
        let sql = self.build_statement(table, column, target_charset)?;
        let stmt = self.runner.prepare(conn, &sql)?;
        self.runner.execute(conn, &stmt, &[], dry_run)?;
        Ok(stmt)
    }
}
