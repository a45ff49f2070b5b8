//! Orchestration of a complete encode run.
//!
//! A run discovers the affected columns once, groups them by table, and then
//! rewrites every column inside a single transaction. Any failure rolls the
//! transaction back and is returned exactly as it was raised. Dry runs skip
//! the transaction and every mutating call but log the statements that would
//! have run.

use std::collections::HashMap;

use itertools::Itertools;

use crate::{
    charset::{DEFAULT_SOURCE_CHARSET, DEFAULT_TARGET_CHARSET, validate_charset_name},
    connection::{Connection, Transaction},
    dialect::Dialect,
    encoder::ColumnEncoder,
    error::Result,
    inspector::{ColumnRef, SchemaInspector},
    log_sink::{LogSink, NOOP_SINK},
    runner::StatementRunner,
};

/// Caller-supplied settings for one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodeRequest {
    target_encoding: String,
    source_charset: String,
    dry_run: bool,
}

impl EncodeRequest {
    pub fn new(target_encoding: &str, dry_run: bool) -> Result<Self> {
        Ok(Self {
            target_encoding: validate_charset_name(target_encoding)?.to_string(),
            source_charset: DEFAULT_SOURCE_CHARSET.to_string(),
            dry_run,
        })
    }

    /// Overrides the charset tag used to find the broken columns.
    pub fn with_source_charset(mut self, source_charset: &str) -> Result<Self> {
        self.source_charset = validate_charset_name(source_charset)?.to_string();
        Ok(self)
    }

    pub fn target_encoding(&self) -> &str {
        &self.target_encoding
    }

    pub fn source_charset(&self) -> &str {
        &self.source_charset
    }

    pub fn dry_run(&self) -> bool {
        self.dry_run
    }
}

impl Default for EncodeRequest {
    fn default() -> Self {
        Self {
            target_encoding: DEFAULT_TARGET_CHARSET.to_string(),
            source_charset: DEFAULT_SOURCE_CHARSET.to_string(),
            dry_run: false,
        }
    }
}

/// Columns grouped by table, in the order they were discovered.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TableColumnMap {
    tables: Vec<(String, Vec<String>)>,
    positions: HashMap<String, usize>,
}

impl TableColumnMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends the column to its table, creating the table entry on first
    /// sight.
    pub fn insert(&mut self, table: impl Into<String>, column: impl Into<String>) {
        let table = table.into();
        let position = match self.positions.get(&table) {
            Some(position) => *position,
            None => {
                self.tables.push((table.clone(), Vec::new()));
                self.positions.insert(table, self.tables.len() - 1);
                self.tables.len() - 1
            }
        };
        self.tables[position].1.push(column.into());
    }

    /// Folds a discovery stream, stopping at the first failure.
    pub fn try_from_columns<I>(columns: I) -> Result<Self>
    where
        I: IntoIterator<Item = Result<ColumnRef>>,
    {
        let mut map = Self::new();
        for column in columns {
            let ColumnRef { table, column } = column?;
            map.insert(table, column);
        }
        Ok(map)
    }

    /// Number of tables.
    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    pub fn total_columns(&self) -> usize {
        self.tables.iter().map(|(_, columns)| columns.len()).sum()
    }

    pub fn columns(&self, table: &str) -> Option<&[String]> {
        self.positions
            .get(table)
            .map(|position| self.tables[*position].1.as_slice())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.tables
            .iter()
            .map(|(table, columns)| (table.as_str(), columns.as_slice()))
    }

    /// Every column in encode order.
    pub fn column_refs(&self) -> impl Iterator<Item = ColumnRef> + '_ {
        self.iter().flat_map(|(table, columns)| {
            columns
                .iter()
                .map(move |column| ColumnRef::new(table, column.as_str()))
        })
    }
}

impl FromIterator<ColumnRef> for TableColumnMap {
    fn from_iter<I: IntoIterator<Item = ColumnRef>>(iter: I) -> Self {
        let mut map = Self::new();
        for ColumnRef { table, column } in iter {
            map.insert(table, column);
        }
        map
    }
}

/// Outcome of a successful run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodeSummary {
    pub tables: usize,
    /// Rewrite statements in the order they ran (or would have run).
    pub statements: Vec<String>,
    pub dry_run: bool,
}

impl EncodeSummary {
    pub fn statement_count(&self) -> usize {
        self.statements.len()
    }
}

/// A stored value next to what the rewrite would leave in its place.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreviewRow {
    pub column: ColumnRef,
    pub stored: String,
    /// `None` when the recovered bytes are invalid in the target charset.
    pub encoded: Option<String>,
}

pub struct EncodeCoordinator<'s, D: Dialect> {
    dialect: D,
    sink: &'s dyn LogSink,
}

impl<D: Dialect> EncodeCoordinator<'static, D> {
    pub fn new(dialect: D) -> Self {
        Self {
            dialect,
            sink: &NOOP_SINK,
        }
    }
}

impl<'s, D: Dialect> EncodeCoordinator<'s, D> {
    pub fn with_sink<'t>(self, sink: &'t dyn LogSink) -> EncodeCoordinator<'t, D> {
        EncodeCoordinator {
            dialect: self.dialect,
            sink,
        }
    }

    pub fn dialect(&self) -> &D {
        &self.dialect
    }

    fn runner(&self) -> StatementRunner<'s> {
        StatementRunner::new(self.sink)
    }

    /// Discovers the columns tagged with `source_charset` and groups them.
    pub fn discover<C: Connection>(
        &self,
        conn: &mut C,
        source_charset: &str,
    ) -> Result<TableColumnMap> {
        let inspector = SchemaInspector::new(&self.dialect, self.runner());
        let columns = inspector.find_encoded_columns(conn, source_charset)?;
        TableColumnMap::try_from_columns(columns)
    }

    /// Samples up to `limit` values per column and shows each one as it
    /// would read after a rewrite to `target_charset`. Nothing is modified.
    pub fn preview<C: Connection>(
        &self,
        conn: &mut C,
        tables: &TableColumnMap,
        target_charset: &str,
        limit: usize,
    ) -> Result<Vec<PreviewRow>> {
        let fix = ColumnEncoder::new(&self.dialect, self.runner()).reinterpretation(target_charset)?;
        let inspector = SchemaInspector::new(&self.dialect, self.runner());
        let mut rows = Vec::new();
        for column in tables.column_refs() {
            for stored in inspector.sample_values(conn, &column, limit)? {
                rows.push(PreviewRow {
                    column: column.clone(),
                    encoded: fix.apply(&stored),
                    stored,
                });
            }
        }
        Ok(rows)
    }

    pub fn run<C: Connection>(&self, conn: &mut C, request: &EncodeRequest) -> Result<EncodeSummary> {
        self.sink.notice("Retrieving string columns...");
        let tables = self.discover(conn, request.source_charset())?;
        self.encode_tables(conn, &tables, request)
    }

    /// Rewrites the given columns as one batch: everything commits or
    /// nothing does.
    pub fn encode_tables<C: Connection>(
        &self,
        conn: &mut C,
        tables: &TableColumnMap,
        request: &EncodeRequest,
    ) -> Result<EncodeSummary> {
        let total = tables.total_columns();
        self.sink
            .notice(&format!("Starting encoding ({total} queries)..."));
        let encoder = ColumnEncoder::new(&self.dialect, self.runner());

        let statements = if request.dry_run() {
            self.encode_all(&encoder, conn, tables, request)?
        } else {
            let mut tx = Transaction::begin(conn)
                .inspect_err(|err| self.sink.critical(&err.to_string()))?;
            match self.encode_all(&encoder, &mut *tx, tables, request) {
                Ok(statements) => {
                    if let Err(err) = tx.commit() {
                        self.sink.critical(&err.to_string());
                        return Err(err);
                    }
                    statements
                }
                Err(err) => {
                    if let Err(rollback_err) = tx.rollback() {
                        self.sink
                            .critical(&format!("Rollback failed: {rollback_err}"));
                    }
                    return Err(err);
                }
            }
        };

        self.sink.notice("Done!");
        Ok(EncodeSummary {
            tables: tables.len(),
            statements,
            dry_run: request.dry_run(),
        })
    }

    fn encode_all<C: Connection>(
        &self,
        encoder: &ColumnEncoder<'_, D>,
        conn: &mut C,
        tables: &TableColumnMap,
        request: &EncodeRequest,
    ) -> Result<Vec<String>> {
        let total = tables.total_columns();
        let mut statements = Vec::with_capacity(total);
        for (table, columns) in tables.iter() {
            self.sink
                .debug(&format!("Table {table}: {}", columns.iter().join(", ")));
            for column in columns {
                self.sink.debug(&format!(
                    "Encoding {table}.{column} ({}/{total})",
                    statements.len() + 1
                ));
                let stmt = encoder.encode(
                    conn,
                    table,
                    column,
                    request.target_encoding(),
                    request.dry_run(),
                )?;
                statements.push(stmt.sql().to_string());
            }
        }
        Ok(statements)
    }
}
