//! Statement preparation and execution with uniform error reporting.
//!
//! Every statement the pipeline issues goes through [`StatementRunner`], which
//! attaches the statement text and bound parameters to driver failures, logs
//! them at critical level, and writes an audit line for each successful
//! execution.

use std::time::Instant;

use crate::{
    connection::{Connection, Row, RowStream, Statement, Value, render_statement},
    error::{DriverError, EncodeError, Result},
    log_sink::{LogSink, Severity},
};

#[derive(Clone, Copy)]
pub struct StatementRunner<'s> {
    sink: &'s dyn LogSink,
}

impl<'s> StatementRunner<'s> {
    pub fn new(sink: &'s dyn LogSink) -> Self {
        Self { sink }
    }

    pub fn sink(&self) -> &'s dyn LogSink {
        self.sink
    }

    pub fn prepare<C: Connection>(&self, conn: &mut C, sql: &str) -> Result<Statement<C::Handle>> {
        match conn.prepare(sql) {
            Ok(handle) => Ok(Statement::new(sql, handle)),
            Err(err) => {
                let failure = EncodeError::prepare(sql, err);
                self.sink.log(
                    Severity::Critical,
                    &failure.to_string(),
                    &[("code", display_code(failure.driver_code()))],
                );
                Err(failure)
            }
        }
    }

    /// Runs a mutating statement. In dry-run mode the driver is never called;
    /// the statement is only written to the log.
    pub fn execute<C: Connection>(
        &self,
        conn: &mut C,
        stmt: &Statement<C::Handle>,
        params: &[Value],
        dry_run: bool,
    ) -> Result<()> {
        if dry_run {
            self.sink.notice(&format!(
                "[dry-run] {}",
                render_statement(stmt.sql(), params)
            ));
            return Ok(());
        }
        let started = Instant::now();
        conn.execute(stmt.handle(), params)
            .map_err(|err| self.execute_failed(stmt.sql(), params, err))?;
        self.sink.debug(&format!(
            "Executed in {} ms: {}",
            started.elapsed().as_millis(),
            render_statement(stmt.sql(), params)
        ));
        Ok(())
    }

    /// Runs a read statement and hands back its rows lazily.
    pub fn query<'c, C: Connection>(
        &self,
        conn: &'c mut C,
        stmt: &Statement<C::Handle>,
        params: &[Value],
    ) -> Result<Rows<'c>>
    where
        's: 'c,
    {
        let started = Instant::now();
        let stream = conn
            .query(stmt.handle(), params)
            .map_err(|err| self.execute_failed(stmt.sql(), params, err))?;
        self.sink.debug(&format!(
            "Executed in {} ms: {}",
            started.elapsed().as_millis(),
            render_statement(stmt.sql(), params)
        ));
        Ok(Rows {
            stream,
            sql: stmt.sql().to_string(),
            params: params.to_vec(),
            sink: self.sink,
        })
    }

    /// First column of the first row as text; `None` for NULL or no rows.
    pub fn fetch_scalar<C: Connection>(&self, conn: &mut C, sql: &str) -> Result<Option<String>> {
        let stmt = self.prepare(conn, sql)?;
        let mut rows = self.query(conn, &stmt, &[])?;
        match rows.next().transpose()? {
            Some(row) => Ok(row
                .first()
                .and_then(Value::as_text)
                .map(str::to_string)),
            None => Ok(None),
        }
    }

    fn execute_failed(&self, sql: &str, params: &[Value], err: DriverError) -> EncodeError {
        let failure = EncodeError::execute(sql, params, err);
        self.sink.log(
            Severity::Critical,
            &failure.to_string(),
            &[("code", display_code(failure.driver_code()))],
        );
        failure
    }
}

fn display_code(code: Option<u32>) -> String {
    code.map(|code| code.to_string()).unwrap_or_default()
}

/// Rows of a running query. Driver failures while fetching surface as
/// [`EncodeError::Execute`] against the query that produced them.
pub struct Rows<'c> {
    stream: RowStream<'c>,
    sql: String,
    params: Vec<Value>,
    sink: &'c dyn LogSink,
}

impl Rows<'_> {
    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn params(&self) -> &[Value] {
        &self.params
    }

    /// Failure for a row the caller could not make sense of.
    pub fn malformed(&self, message: impl Into<String>) -> EncodeError {
        let failure = EncodeError::execute(&self.sql, &self.params, DriverError::new(message));
        self.sink.critical(&failure.to_string());
        failure
    }
}

impl Iterator for Rows<'_> {
    type Item = Result<Row>;

    fn next(&mut self) -> Option<Self::Item> {
        let next = self.stream.next()?;
        Some(next.map_err(|err| {
            let failure = EncodeError::execute(&self.sql, &self.params, err);
            self.sink.critical(&failure.to_string());
            failure
        }))
    }
}
