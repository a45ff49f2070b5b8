//! [`Connection`] for the blocking `mysql` client.

use anyhow::{Context, Result};
use mysql::{Conn, Opts, OptsBuilder, Params, prelude::Queryable};

use crate::{
    connection::{Connection, Row, RowStream, Value},
    error::DriverError,
    redact_url,
};

/// Opens a connection from a `mysql://` URL, with optional credential
/// overrides.
pub fn connect(url: &str, user: Option<&str>, password: Option<&str>) -> Result<Conn> {
    let opts = Opts::from_url(url)
        .with_context(|| format!("Parsing connection URL '{}'", redact_url(url)))?;
    let mut builder = OptsBuilder::from_opts(opts);
    if let Some(user) = user {
        builder = builder.user(Some(user));
    }
    if let Some(password) = password {
        builder = builder.pass(Some(password));
    }
    Conn::new(builder).context("Connecting to MySQL")
}

impl Connection for Conn {
    type Handle = mysql::Statement;

    fn prepare(&mut self, sql: &str) -> std::result::Result<mysql::Statement, DriverError> {
        Queryable::prep(self, sql).map_err(driver_error)
    }

    fn execute(
        &mut self,
        handle: &mysql::Statement,
        params: &[Value],
    ) -> std::result::Result<(), DriverError> {
        Queryable::exec_drop(self, handle, bind(params)).map_err(driver_error)
    }

    fn query(
        &mut self,
        handle: &mysql::Statement,
        params: &[Value],
    ) -> std::result::Result<RowStream<'_>, DriverError> {
        let result = Queryable::exec_iter(self, handle, bind(params)).map_err(driver_error)?;
        Ok(Box::new(
            result.map(|row| row.map(convert_row).map_err(driver_error)),
        ))
    }

    fn begin(&mut self) -> std::result::Result<(), DriverError> {
        Queryable::query_drop(self, "START TRANSACTION").map_err(driver_error)
    }

    fn commit(&mut self) -> std::result::Result<(), DriverError> {
        Queryable::query_drop(self, "COMMIT").map_err(driver_error)
    }

    fn rollback(&mut self) -> std::result::Result<(), DriverError> {
        Queryable::query_drop(self, "ROLLBACK").map_err(driver_error)
    }
}

fn bind(params: &[Value]) -> Params {
    if params.is_empty() {
        return Params::Empty;
    }
    Params::Positional(params.iter().map(to_mysql).collect())
}

fn to_mysql(value: &Value) -> mysql::Value {
    match value {
        Value::Null => mysql::Value::NULL,
        Value::Int(value) => mysql::Value::Int(*value),
        Value::Text(text) => mysql::Value::Bytes(text.as_bytes().to_vec()),
        Value::Bytes(bytes) => mysql::Value::Bytes(bytes.clone()),
    }
}

fn from_mysql(value: mysql::Value) -> Value {
    match value {
        mysql::Value::NULL => Value::Null,
        mysql::Value::Bytes(bytes) => Value::Bytes(bytes),
        mysql::Value::Int(value) => Value::Int(value),
        mysql::Value::UInt(value) => match i64::try_from(value) {
            Ok(value) => Value::Int(value),
            Err(_) => Value::Text(value.to_string()),
        },
        other => Value::Text(other.as_sql(true)),
    }
}

fn convert_row(row: mysql::Row) -> Row {
    let names = row
        .columns_ref()
        .iter()
        .map(|column| column.name_str().into_owned())
        .collect::<Vec<_>>();
    names.into_iter().zip(row.unwrap().into_iter().map(from_mysql)).collect()
}

fn driver_error(err: mysql::Error) -> DriverError {
    match err {
        mysql::Error::MySqlError(err) => DriverError::with_code(u32::from(err.code), err.message),
        other => DriverError::new(other.to_string()),
    }
}
