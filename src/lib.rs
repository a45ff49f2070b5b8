pub mod charset;
pub mod cli;
pub mod connection;
pub mod coordinator;
pub mod dialect;
pub mod encoder;
pub mod error;
pub mod inspector;
pub mod log_sink;
#[cfg(feature = "mysql")]
pub mod mysql_driver;
pub mod runner;
pub mod table;

use std::{env, io, sync::OnceLock};

use anyhow::{Context, Result};
use clap::Parser;
use log::{LevelFilter, debug, info};

use crate::{
    cli::{Cli, ColumnsArgs, Commands, ConnectionArgs, EncodeArgs, ListingFormat},
    coordinator::{EncodeCoordinator, EncodeRequest},
    dialect::{Dialect, MySqlDialect},
    log_sink::FacadeSink,
};

static LOGGER: OnceLock<()> = OnceLock::new();

fn init_logging(verbose: bool) {
    LOGGER.get_or_init(|| {
        let mut builder = env_logger::Builder::from_env(env_logger::Env::default());
        if verbose {
            builder.filter_module("db_encoder", LevelFilter::Debug);
        } else if env::var("RUST_LOG").is_err() {
            builder.filter_module("db_encoder", LevelFilter::Info);
        }
        let _ = builder.format_timestamp_millis().try_init();
    });
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    match cli.command {
        Commands::Encode(args) => handle_encode(&args),
        Commands::Columns(args) => handle_columns(&args),
    }
}

fn handle_encode(args: &EncodeArgs) -> Result<()> {
    let request = EncodeRequest::new(&args.encoding, args.dry_run)
        .and_then(|request| request.with_source_charset(&args.source_charset))
        .context("Validating encode options")?;
    let mut conn = open_connection(&args.connection)?;
    let coordinator = EncodeCoordinator::new(MySqlDialect).with_sink(&FacadeSink);
    info!(
        "Encoding '{}' columns of {} as {}{}",
        request.source_charset(),
        coordinator.dialect().name(),
        request.target_encoding(),
        if request.dry_run() { " (dry run)" } else { "" }
    );
    let summary = coordinator
        .run(&mut conn, &request)
        .context("Encoding database")?;
    if summary.dry_run {
        info!(
            "Dry run: {} statement(s) across {} table(s) were not executed",
            summary.statement_count(),
            summary.tables
        );
    } else {
        info!(
            "Re-encoded {} column(s) across {} table(s)",
            summary.statement_count(),
            summary.tables
        );
    }
    Ok(())
}

fn handle_columns(args: &ColumnsArgs) -> Result<()> {
    let source = charset::validate_charset_name(&args.source_charset)
        .context("Validating listing options")?;
    let target = charset::resolve_charset(&args.encoding)
        .map(|_| args.encoding.trim())
        .context("Validating listing options")?;
    let mut conn = open_connection(&args.connection)?;
    let coordinator = EncodeCoordinator::new(MySqlDialect).with_sink(&FacadeSink);
    let tables = coordinator
        .discover(&mut conn, source)
        .context("Retrieving string columns")?;
    debug!("Discovered {} table(s)", tables.len());
    if let Some(limit) = args.preview {
        let rows = coordinator
            .preview(&mut conn, &tables, target, limit)
            .context("Sampling column values")?;
        match args.format {
            ListingFormat::Table => table::print_preview(&rows),
            ListingFormat::Csv => table::write_preview_csv(&rows, io::stdout().lock())?,
        }
        let lost = rows.iter().filter(|row| row.encoded.is_none()).count();
        if lost > 0 {
            info!("{lost} sampled value(s) would become NULL as {target}");
        }
        return Ok(());
    }
    match args.format {
        ListingFormat::Table => table::print_columns(&tables),
        ListingFormat::Csv => table::write_columns_csv(&tables, io::stdout().lock())?,
    }
    info!(
        "Listed {} column(s) across {} table(s)",
        tables.total_columns(),
        tables.len()
    );
    Ok(())
}

#[cfg(feature = "mysql")]
fn open_connection(args: &ConnectionArgs) -> Result<mysql::Conn> {
    debug!("Connecting to {}", redact_url(&args.url));
    mysql_driver::connect(&args.url, args.user.as_deref(), args.password.as_deref())
        .with_context(|| format!("Opening connection to {}", redact_url(&args.url)))
}

#[cfg(not(feature = "mysql"))]
fn open_connection(args: &ConnectionArgs) -> Result<Unavailable> {
    anyhow::bail!(
        "Cannot connect to {}: built without MySQL support (enable the `mysql` feature)",
        redact_url(&args.url)
    )
}

/// Stand-in connection type for builds without a driver; it has no values.
#[cfg(not(feature = "mysql"))]
enum Unavailable {}

#[cfg(not(feature = "mysql"))]
impl connection::Connection for Unavailable {
    type Handle = std::convert::Infallible;

    fn prepare(&mut self, _sql: &str) -> std::result::Result<Self::Handle, error::DriverError> {
        match *self {}
    }

    fn execute(
        &mut self,
        _handle: &Self::Handle,
        _params: &[connection::Value],
    ) -> std::result::Result<(), error::DriverError> {
        match *self {}
    }

    fn query(
        &mut self,
        _handle: &Self::Handle,
        _params: &[connection::Value],
    ) -> std::result::Result<connection::RowStream<'_>, error::DriverError> {
        match *self {}
    }

    fn begin(&mut self) -> std::result::Result<(), error::DriverError> {
        match *self {}
    }

    fn commit(&mut self) -> std::result::Result<(), error::DriverError> {
        match *self {}
    }

    fn rollback(&mut self) -> std::result::Result<(), error::DriverError> {
        match *self {}
    }
}

/// Connection URL with any password replaced, for logs and error messages.
pub(crate) fn redact_url(url: &str) -> String {
    let Some((scheme, rest)) = url.split_once("://") else {
        return url.to_string();
    };
    let Some((credentials, host)) = rest.rsplit_once('@') else {
        return url.to_string();
    };
    match credentials.split_once(':') {
        Some((user, _)) => format!("{scheme}://{user}:***@{host}"),
        None => url.to_string(),
    }
}
