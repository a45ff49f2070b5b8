#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::sync::OnceLock;

use db_encoder::charset::Reinterpretation;
use db_encoder::connection::{Connection, Row, RowStream, Value};
use db_encoder::error::DriverError;
use db_encoder::log_sink::{LogContext, LogSink, Severity};
use regex::Regex;

/// Statement kinds the fake engine understands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FakeStatement {
    CurrentSchema,
    Catalog,
    Sample {
        table: String,
        column: String,
        limit: usize,
    },
    Rewrite {
        table: String,
        column: String,
        legacy: String,
        target: String,
    },
}

#[derive(Debug, Clone)]
pub struct CatalogEntry {
    pub schema: String,
    pub table: String,
    pub column: String,
    pub charset: String,
}

/// In-memory stand-in for a MySQL server: a column catalog, per-column cell
/// values, and snapshot-based transactions.
#[derive(Debug, Default)]
pub struct FakeConnection {
    pub schema: Option<String>,
    pub catalog: Vec<CatalogEntry>,
    pub data: BTreeMap<(String, String), Vec<Option<String>>>,
    pub prepared: Vec<String>,
    pub executed: Vec<String>,
    pub begins: usize,
    pub commits: usize,
    pub rollbacks: usize,
    /// Execution of the rewrite for this column fails.
    pub fail_on: Option<(String, String)>,
    /// Preparing any statement containing this text fails.
    pub reject_prepare: Option<String>,
    /// Catalog streaming fails after this many rows.
    pub fail_catalog_after: Option<usize>,
    pub fail_commit: bool,
    /// ROLLBACK fails and leaves the data as it was.
    pub fail_rollback: bool,
    snapshot: Option<BTreeMap<(String, String), Vec<Option<String>>>>,
}

impl FakeConnection {
    pub fn new(schema: &str) -> Self {
        Self {
            schema: Some(schema.to_string()),
            ..Self::default()
        }
    }

    /// Adds a column to the catalog of the current schema with its cells.
    pub fn with_column(mut self, table: &str, column: &str, charset: &str, cells: &[&str]) -> Self {
        let schema = self.schema.clone().unwrap_or_default();
        self.catalog.push(CatalogEntry {
            schema,
            table: table.to_string(),
            column: column.to_string(),
            charset: charset.to_string(),
        });
        self.data.insert(
            (table.to_string(), column.to_string()),
            cells.iter().map(|cell| Some(cell.to_string())).collect(),
        );
        self
    }

    pub fn with_foreign_column(mut self, schema: &str, table: &str, column: &str, charset: &str) -> Self {
        self.catalog.push(CatalogEntry {
            schema: schema.to_string(),
            table: table.to_string(),
            column: column.to_string(),
            charset: charset.to_string(),
        });
        self
    }

    pub fn cells(&self, table: &str, column: &str) -> Vec<Option<String>> {
        self.data
            .get(&(table.to_string(), column.to_string()))
            .cloned()
            .unwrap_or_default()
    }

    pub fn in_transaction(&self) -> bool {
        self.snapshot.is_some()
    }

    fn parse(sql: &str) -> Option<FakeStatement> {
        static REWRITE: OnceLock<Regex> = OnceLock::new();
        let rewrite = REWRITE.get_or_init(|| {
            Regex::new(
                r"^UPDATE `((?:[^`]|``)+)` SET `((?:[^`]|``)+)` = CONVERT\(CAST\(CONVERT\(`(?:[^`]|``)+` USING (\w+)\) AS BINARY\) USING (\w+)\)$",
            )
            .expect("rewrite pattern")
        });
        if sql == "SELECT DATABASE()" {
            return Some(FakeStatement::CurrentSchema);
        }
        if sql.contains("`information_schema`.`COLUMNS`") {
            return Some(FakeStatement::Catalog);
        }
        static SAMPLE: OnceLock<Regex> = OnceLock::new();
        let sample = SAMPLE.get_or_init(|| {
            Regex::new(
                r"^SELECT `((?:[^`]|``)+)` AS value FROM `((?:[^`]|``)+)` WHERE `(?:[^`]|``)+` IS NOT NULL LIMIT (\d+)$",
            )
            .expect("sample pattern")
        });
        if let Some(captures) = sample.captures(sql) {
            return Some(FakeStatement::Sample {
                table: captures[2].replace("``", "`"),
                column: captures[1].replace("``", "`"),
                limit: captures[3].parse().ok()?,
            });
        }
        let captures = rewrite.captures(sql)?;
        Some(FakeStatement::Rewrite {
            table: captures[1].replace("``", "`"),
            column: captures[2].replace("``", "`"),
            legacy: captures[3].to_string(),
            target: captures[4].to_string(),
        })
    }

    fn text_param(params: &[Value], idx: usize) -> Result<String, DriverError> {
        params
            .get(idx)
            .and_then(Value::as_text)
            .map(str::to_string)
            .ok_or_else(|| DriverError::with_code(1210, "Incorrect arguments to EXECUTE"))
    }
}

impl Connection for FakeConnection {
    type Handle = FakeStatement;

    fn prepare(&mut self, sql: &str) -> Result<FakeStatement, DriverError> {
        if let Some(needle) = &self.reject_prepare {
            if sql.contains(needle.as_str()) {
                return Err(DriverError::with_code(
                    1064,
                    "You have an error in your SQL syntax",
                ));
            }
        }
        let stmt = Self::parse(sql).ok_or_else(|| {
            DriverError::with_code(1064, "You have an error in your SQL syntax")
        })?;
        self.prepared.push(sql.to_string());
        Ok(stmt)
    }

    fn execute(&mut self, handle: &FakeStatement, _params: &[Value]) -> Result<(), DriverError> {
        let FakeStatement::Rewrite {
            table,
            column,
            legacy,
            target,
        } = handle
        else {
            return Ok(());
        };
        if self.fail_on.as_ref() == Some(&(table.clone(), column.clone())) {
            return Err(DriverError::with_code(
                1366,
                format!("Incorrect string value for column '{column}'"),
            ));
        }
        let fix = Reinterpretation::new(legacy, target)
            .map_err(|err| DriverError::with_code(1115, err.to_string()))?;
        let cells = self
            .data
            .get_mut(&(table.clone(), column.clone()))
            .ok_or_else(|| DriverError::with_code(1146, format!("Table '{table}' doesn't exist")))?;
        for cell in cells.iter_mut() {
            *cell = cell.as_deref().and_then(|value| fix.apply(value));
        }
        self.executed.push(format!("{table}.{column}"));
        Ok(())
    }

    fn query(&mut self, handle: &FakeStatement, params: &[Value]) -> Result<RowStream<'_>, DriverError> {
        match handle {
            FakeStatement::CurrentSchema => {
                let value = match &self.schema {
                    Some(schema) => Value::Text(schema.clone()),
                    None => Value::Null,
                };
                let row = Row::new(vec![("DATABASE()".to_string(), value)]);
                Ok(Box::new(std::iter::once(Ok::<Row, DriverError>(row))))
            }
            FakeStatement::Catalog => {
                let schema = Self::text_param(params, 0)?;
                let charset = Self::text_param(params, 1)?;
                let mut matches = self
                    .catalog
                    .iter()
                    .filter(|entry| entry.schema == schema && entry.charset == charset)
                    .collect::<Vec<_>>();
                matches.sort_by(|a, b| a.table.cmp(&b.table));
                let rows = matches
                    .into_iter()
                    .map(|entry| {
                        Row::new(vec![
                            ("table_name".to_string(), Value::Bytes(entry.table.as_bytes().to_vec())),
                            ("column_name".to_string(), Value::Bytes(entry.column.as_bytes().to_vec())),
                        ])
                    })
                    .collect::<Vec<_>>();
                let fail_after = self.fail_catalog_after;
                Ok(Box::new(rows.into_iter().enumerate().map(move |(idx, row)| {
                    match fail_after {
                        Some(limit) if idx >= limit => {
                            Err(DriverError::with_code(2013, "Lost connection to MySQL server during query"))
                        }
                        _ => Ok(row),
                    }
                })))
            }
            FakeStatement::Sample {
                table,
                column,
                limit,
            } => {
                let values = self
                    .cells(table, column)
                    .into_iter()
                    .flatten()
                    .take(*limit)
                    .map(|value| Ok(Row::new(vec![("value".to_string(), Value::Text(value))])))
                    .collect::<Vec<Result<Row, DriverError>>>();
                Ok(Box::new(values.into_iter()))
            }
            FakeStatement::Rewrite { .. } => Ok(Box::new(std::iter::empty::<Result<Row, DriverError>>())),
        }
    }

    fn begin(&mut self) -> Result<(), DriverError> {
        self.begins += 1;
        self.snapshot = Some(self.data.clone());
        Ok(())
    }

    fn commit(&mut self) -> Result<(), DriverError> {
        self.commits += 1;
        if self.fail_commit {
            return Err(DriverError::with_code(1180, "Got error 6 during COMMIT"));
        }
        self.snapshot = None;
        Ok(())
    }

    fn rollback(&mut self) -> Result<(), DriverError> {
        self.rollbacks += 1;
        if self.fail_rollback {
            return Err(DriverError::with_code(2006, "MySQL server has gone away"));
        }
        if let Some(snapshot) = self.snapshot.take() {
            self.data = snapshot;
        }
        Ok(())
    }
}

/// Sink that keeps every message for later assertions.
#[derive(Debug, Default)]
pub struct RecordingSink {
    entries: RefCell<Vec<(Severity, String)>>,
}

impl RecordingSink {
    pub fn entries(&self) -> Vec<(Severity, String)> {
        self.entries.borrow().clone()
    }

    pub fn messages(&self, severity: Severity) -> Vec<String> {
        self.entries
            .borrow()
            .iter()
            .filter(|(level, _)| *level == severity)
            .map(|(_, message)| message.clone())
            .collect()
    }
}

impl LogSink for RecordingSink {
    fn log(&self, severity: Severity, message: &str, _context: LogContext<'_>) {
        self.entries.borrow_mut().push((severity, message.to_string()));
    }
}
