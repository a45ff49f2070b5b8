//! Database capability required by the encode pipeline.
//!
//! The pipeline never talks to a driver directly. Anything that can prepare a
//! statement, run it with positional parameters, stream rows back and manage a
//! transaction implements [`Connection`] and can be handed to the coordinator.
//! The MySQL binding lives in `mysql_driver` behind the `mysql` feature.

use std::ops::{Deref, DerefMut};

use log::error;
use serde::{Serialize, Serializer};

use crate::error::{DriverError, EncodeError, Result};

/// Lazily produced result rows; each row is pulled from the driver on demand.
pub type RowStream<'c> = Box<dyn Iterator<Item = std::result::Result<Row, DriverError>> + 'c>;

pub trait Connection {
    /// Driver-side prepared statement.
    type Handle;

    fn prepare(&mut self, sql: &str) -> std::result::Result<Self::Handle, DriverError>;

    fn execute(
        &mut self,
        handle: &Self::Handle,
        params: &[Value],
    ) -> std::result::Result<(), DriverError>;

    fn query(
        &mut self,
        handle: &Self::Handle,
        params: &[Value],
    ) -> std::result::Result<RowStream<'_>, DriverError>;

    fn begin(&mut self) -> std::result::Result<(), DriverError>;

    fn commit(&mut self) -> std::result::Result<(), DriverError>;

    fn rollback(&mut self) -> std::result::Result<(), DriverError>;
}

/// Bound parameter or fetched field value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Null,
    Int(i64),
    Text(String),
    Bytes(Vec<u8>),
}

impl Value {
    /// Text view of the value; byte strings must be valid UTF-8.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(text) => Some(text),
            Value::Bytes(bytes) => std::str::from_utf8(bytes).ok(),
            Value::Null | Value::Int(_) => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Text(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Text(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Value::Null => serializer.serialize_none(),
            Value::Int(value) => serializer.serialize_i64(*value),
            Value::Text(text) => serializer.serialize_str(text),
            Value::Bytes(bytes) => serializer.serialize_str(&String::from_utf8_lossy(bytes)),
        }
    }
}

/// One result row as an ordered field-name to value mapping.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Row {
    fields: Vec<(String, Value)>,
}

impl Row {
    pub fn new(fields: Vec<(String, Value)>) -> Self {
        Self { fields }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields
            .iter()
            .find(|(field, _)| field == name)
            .map(|(_, value)| value)
    }

    pub fn first(&self) -> Option<&Value> {
        self.fields.first().map(|(_, value)| value)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields
            .iter()
            .map(|(name, value)| (name.as_str(), value))
    }
}

impl FromIterator<(String, Value)> for Row {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Row::new(iter.into_iter().collect())
    }
}

/// Prepared statement together with the SQL text it was prepared from.
#[derive(Debug)]
pub struct Statement<H> {
    sql: String,
    handle: H,
}

impl<H> Statement<H> {
    pub fn new(sql: impl Into<String>, handle: H) -> Self {
        Self {
            sql: sql.into(),
            handle,
        }
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn handle(&self) -> &H {
        &self.handle
    }
}

/// Renders a statement and its parameters the way it is written to the log:
/// the SQL text followed by the parameter values as a JSON array.
pub fn render_statement(sql: &str, params: &[Value]) -> String {
    let rendered = serde_json::to_string(params).unwrap_or_else(|_| "[]".to_string());
    format!("{sql} {rendered}")
}

const BEGIN: &str = "START TRANSACTION";
const COMMIT: &str = "COMMIT";
const ROLLBACK: &str = "ROLLBACK";

/// Open transaction on a borrowed connection.
///
/// The transaction resolves exactly once: [`Transaction::commit`] or
/// [`Transaction::rollback`] consume the guard, and dropping an unresolved
/// guard (early return or unwinding) rolls back.
pub struct Transaction<'c, C: Connection> {
    conn: &'c mut C,
    resolved: bool,
}

impl<'c, C: Connection> Transaction<'c, C> {
    pub fn begin(conn: &'c mut C) -> Result<Self> {
        conn.begin()
            .map_err(|err| EncodeError::execute(BEGIN, &[], err))?;
        Ok(Self {
            conn,
            resolved: false,
        })
    }

    /// A failed COMMIT leaves the guard unresolved, so dropping it rolls back.
    pub fn commit(mut self) -> Result<()> {
        self.conn
            .commit()
            .map_err(|err| EncodeError::execute(COMMIT, &[], err))?;
        self.resolved = true;
        Ok(())
    }

    pub fn rollback(mut self) -> Result<()> {
        self.resolved = true;
        self.conn
            .rollback()
            .map_err(|err| EncodeError::execute(ROLLBACK, &[], err))
    }
}

impl<C: Connection> Deref for Transaction<'_, C> {
    type Target = C;

    fn deref(&self) -> &C {
        self.conn
    }
}

impl<C: Connection> DerefMut for Transaction<'_, C> {
    fn deref_mut(&mut self) -> &mut C {
        self.conn
    }
}

impl<C: Connection> Drop for Transaction<'_, C> {
    fn drop(&mut self) {
        if self.resolved {
            return;
        }
        if let Err(err) = self.conn.rollback() {
            error!("Rollback of abandoned transaction failed: {err}");
        }
    }
}
