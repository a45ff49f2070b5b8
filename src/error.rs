//! Error types shared by every layer of the encode pipeline.
//!
//! Drivers report failures as [`DriverError`]; the statement runner ties them
//! to the statement that failed and surfaces an [`EncodeError`]. Errors are
//! propagated unchanged from there up to the caller.

use std::fmt;

use thiserror::Error;

use crate::connection::{Value, render_statement};

pub type Result<T, E = EncodeError> = std::result::Result<T, E>;

/// Failure reported by a database driver, before it is tied to a statement.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct DriverError {
    pub code: Option<u32>,
    pub message: String,
}

impl DriverError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            code: None,
            message: message.into(),
        }
    }

    pub fn with_code(code: u32, message: impl Into<String>) -> Self {
        Self {
            code: Some(code),
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum EncodeError {
    /// The driver refused the statement text.
    #[error(
        "Unable to prepare {sql} - Error code: {} - Error message: {message}",
        DisplayCode(.code)
    )]
    Prepare {
        sql: String,
        code: Option<u32>,
        message: String,
    },
    /// The statement was accepted but failed while running.
    #[error(
        "Unable to execute {} - Error code: {} - Error message: {message}",
        render_statement(.sql, .params),
        DisplayCode(.code)
    )]
    Execute {
        sql: String,
        params: Vec<Value>,
        code: Option<u32>,
        message: String,
    },
    #[error("Invalid character set name '{name}'")]
    InvalidCharset { name: String },
    #[error("Invalid identifier '{name}'")]
    InvalidIdentifier { name: String },
}

impl EncodeError {
    pub fn prepare(sql: &str, err: DriverError) -> Self {
        EncodeError::Prepare {
            sql: sql.to_string(),
            code: err.code,
            message: err.message,
        }
    }

    pub fn execute(sql: &str, params: &[Value], err: DriverError) -> Self {
        EncodeError::Execute {
            sql: sql.to_string(),
            params: params.to_vec(),
            code: err.code,
            message: err.message,
        }
    }

    /// Statement text the error is attached to, if any.
    pub fn sql(&self) -> Option<&str> {
        match self {
            EncodeError::Prepare { sql, .. } | EncodeError::Execute { sql, .. } => Some(sql),
            _ => None,
        }
    }

    pub fn driver_code(&self) -> Option<u32> {
        match self {
            EncodeError::Prepare { code, .. } | EncodeError::Execute { code, .. } => *code,
            _ => None,
        }
    }

    pub fn driver_message(&self) -> Option<&str> {
        match self {
            EncodeError::Prepare { message, .. } | EncodeError::Execute { message, .. } => {
                Some(message)
            }
            _ => None,
        }
    }
}

struct DisplayCode<'a>(&'a Option<u32>);

impl fmt::Display for DisplayCode<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(code) => write!(f, "{code}"),
            None => f.write_str("n/a"),
        }
    }
}
