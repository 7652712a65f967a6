//! sqlbridge CLI - query, inspect and bulk-transfer PostgreSQL and SQL Server.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Instant;

use clap::{Parser, Subcommand, ValueEnum};
use sqlbridge::transfer::{export_query, write_to};
use sqlbridge::{
    annotate_databases, AllowAll, AllowList, BridgeError, BulkImportPipeline, Config, Connector,
    ConnectorFactory, ConnectorImpl, DatabaseAccessPolicy, EngineType, ImportOptions,
    ImportStatus, QueryResult, QuoteDoubling, SchemaIntrospector,
};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::sync::CancellationToken;
use tracing::{info, Level};

#[cfg(unix)]
use tokio::signal::unix::{signal, SignalKind};

#[derive(Parser)]
#[command(name = "sqlbridge")]
#[command(about = "Query, inspect and bulk-transfer PostgreSQL and SQL Server databases")]
#[command(version)]
struct Cli {
    /// Path to YAML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Database engine: postgres or mssql (overrides the config file)
    #[arg(long)]
    engine: Option<String>,

    /// Connection string (overrides the config file)
    #[arg(long)]
    connection_string: Option<String>,

    /// Output JSON result to stdout
    #[arg(long)]
    output_json: bool,

    /// Log format: text or json
    #[arg(long, default_value = "text")]
    log_format: String,

    /// Log verbosity: debug, info, warn, error
    #[arg(long, default_value = "info")]
    verbosity: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum NewlineArg {
    Lf,
    Crlf,
}

impl NewlineArg {
    fn as_str(self) -> &'static str {
        match self {
            NewlineArg::Lf => "\n",
            NewlineArg::Crlf => "\r\n",
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Execute a SQL statement and print its result
    Query {
        /// Statement to execute
        #[arg(long)]
        sql: String,
    },

    /// Export a query result as delimiter-separated values
    Export {
        /// Query whose result is exported
        #[arg(long)]
        sql: String,

        /// Field separator: ',', ';' or tab
        #[arg(long, value_parser = parse_separator)]
        separator: Option<char>,

        /// Line ending
        #[arg(long, value_enum)]
        newline: Option<NewlineArg>,

        /// Write a header line with column names
        #[arg(long)]
        header: bool,

        /// Wrap every non-null field in double quotes
        #[arg(long)]
        quotes: bool,

        /// Token written for NULL values
        #[arg(long)]
        null_output: Option<String>,

        /// Output file [default: stdout]
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Import delimiter-separated values into a table
    Import {
        /// Target table
        #[arg(long)]
        table: String,

        /// Target schema
        #[arg(long)]
        schema: Option<String>,

        /// Input file, or '-' for stdin
        #[arg(long)]
        file: PathBuf,

        /// Field separator: ',', ';' or tab
        #[arg(long, value_parser = parse_separator)]
        separator: Option<char>,

        /// Rows per INSERT statement (1-10000)
        #[arg(long)]
        chunk_size: Option<usize>,

        /// Honor double-quoted fields
        #[arg(long)]
        double_quotes: bool,

        /// Roll back the whole import on the first error
        #[arg(long)]
        rollback_on_error: bool,

        /// Data rows to skip after the header
        #[arg(long, default_value = "0")]
        rows_to_skip: u64,

        /// Input has no header line; columns map by position
        #[arg(long)]
        no_header: bool,
    },

    /// Print the database schema as JSON
    Schema,

    /// List databases on the server
    Databases {
        /// Comma-separated databases to mark as allowed [default: all]
        #[arg(long, value_delimiter = ',')]
        allow: Vec<String>,
    },

    /// Test the database connection
    HealthCheck,
}

fn parse_separator(s: &str) -> Result<char, String> {
    match s {
        "," | "comma" => Ok(','),
        ";" | "semicolon" => Ok(';'),
        "\t" | "\\t" | "tab" => Ok('\t'),
        other => Err(format!(
            "unsupported separator '{}': use ',', ';' or 'tab'",
            other
        )),
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{}", e.format_detailed());
            ExitCode::from(e.exit_code())
        }
    }
}

async fn run() -> Result<ExitCode, BridgeError> {
    let cli = Cli::parse();

    setup_logging(&cli.verbosity, &cli.log_format);

    let config = resolve_config(&cli)?;
    info!(
        "Using {} connection (command timeout {}s)",
        config.connection.engine, config.connection.command_timeout_secs
    );

    match cli.command {
        Commands::Query { ref sql } => {
            let mut connector = connect(&config).await?;
            let start = Instant::now();
            let mut result = connector.execute(sql).await?;
            result.elapsed_time_ms = start.elapsed().as_millis() as u64;
            connector.close().await?;

            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                print_table(&result);
            }
        }

        Commands::Export {
            ref sql,
            separator,
            newline,
            header,
            quotes,
            ref null_output,
            ref output,
        } => {
            let mut options = config.transfer.export_options();
            if let Some(sep) = separator {
                options.separator = sep;
            }
            if let Some(nl) = newline {
                options.newline = nl.as_str().to_string();
            }
            if let Some(token) = null_output {
                options.null_output = token.clone();
            }
            options.include_header = header;
            options.add_quotes = quotes;
            options.validate()?;

            let mut connector = connect(&config).await?;
            let stream = export_query(&mut connector, sql, options).await?;
            let mut writer: Box<dyn AsyncWrite + Unpin + Send> = match output {
                Some(path) => Box::new(tokio::fs::File::create(path).await?),
                None => Box::new(tokio::io::stdout()),
            };
            let written = write_to(stream, &mut writer).await?;
            connector.close().await?;
            info!("Exported {} bytes", written);
        }

        Commands::Import {
            ref table,
            ref schema,
            ref file,
            separator,
            chunk_size,
            double_quotes,
            rollback_on_error,
            rows_to_skip,
            no_header,
        } => {
            let options = ImportOptions {
                schema: schema.clone(),
                separator: separator.unwrap_or(config.transfer.separator),
                chunk_size: chunk_size.unwrap_or(config.transfer.chunk_size),
                double_quotes,
                rollback_on_error,
                rows_to_skip,
                has_header: !no_header,
                ..ImportOptions::new(table.clone())
            };
            let mut pipeline =
                BulkImportPipeline::new(options)?.with_sanitizer(Arc::new(QuoteDoubling));

            let input: Box<dyn AsyncRead + Unpin + Send> = if file.as_os_str() == "-" {
                Box::new(tokio::io::stdin())
            } else {
                Box::new(tokio::fs::File::open(file).await?)
            };

            let cancel = setup_signal_handler()?;
            let mut connector = connect(&config).await?;
            let outcome = pipeline.import(&mut connector, input, &cancel).await?;
            connector.close().await?;

            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(&outcome)?);
            } else {
                println!("Import {:?}", outcome.status);
                println!("  Rows read: {}", outcome.total_rows_read);
                println!("  Rows committed: {}", outcome.rows_committed);
                println!("  Batches: {}", outcome.batches_executed);
                if outcome.cancelled {
                    println!("  Cancelled before completion");
                }
                for (row, message) in &outcome.per_row_errors {
                    println!("  Row {}: {}", row, message);
                }
            }

            if outcome.cancelled {
                return Ok(ExitCode::from(BridgeError::Cancelled.exit_code()));
            }
            if outcome.status != ImportStatus::Committed {
                return Ok(ExitCode::from(4));
            }
        }

        Commands::Schema => {
            let mut connector = connect(&config).await?;
            let model = SchemaIntrospector::describe(&mut connector).await?;
            connector.close().await?;
            println!("{}", serde_json::to_string_pretty(&model)?);
        }

        Commands::Databases { ref allow } => {
            let mut connector = connect(&config).await?;
            let names = SchemaIntrospector::describe_database_names(&mut connector).await?;
            connector.close().await?;

            let policy: Box<dyn DatabaseAccessPolicy> = if allow.is_empty() {
                Box::new(AllowAll)
            } else {
                Box::new(AllowList::new(allow))
            };
            let entries = annotate_databases(&names, policy.as_ref());

            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(&entries)?);
            } else {
                for entry in &entries {
                    println!(
                        "{}\t{}",
                        entry.name,
                        if entry.allowed { "allowed" } else { "denied" }
                    );
                }
            }
        }

        Commands::HealthCheck => {
            let start = Instant::now();
            let check = async {
                let mut connector = connect(&config).await?;
                connector.execute("SELECT 1").await?;
                connector.close().await
            };
            let result: Result<(), BridgeError> = check.await;
            let latency_ms = start.elapsed().as_millis() as u64;

            if cli.output_json {
                let report = serde_json::json!({
                    "engine": config.connection.engine.as_str(),
                    "connected": result.is_ok(),
                    "latencyMs": latency_ms,
                    "error": result.as_ref().err().map(|e| e.to_string()),
                });
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!("Health Check Results:");
                println!(
                    "  {}: {} ({}ms)",
                    config.connection.engine,
                    if result.is_ok() { "OK" } else { "FAILED" },
                    latency_ms
                );
                if let Err(ref e) = result {
                    println!("    Error: {}", e);
                }
            }
            result?;
        }
    }

    Ok(ExitCode::SUCCESS)
}

/// Merge the config file with command-line overrides.
fn resolve_config(cli: &Cli) -> Result<Config, BridgeError> {
    let engine = cli
        .engine
        .as_deref()
        .map(str::parse::<EngineType>)
        .transpose()?;

    let mut config = match (&cli.config, engine, &cli.connection_string) {
        (Some(path), _, _) => {
            let config = Config::load(path)?;
            info!("Loaded configuration from {:?}", path);
            config
        }
        (None, Some(engine), Some(conn)) => Config::from_connection_string(engine, conn.clone()),
        _ => {
            return Err(BridgeError::Config(
                "either --config or both --engine and --connection-string are required".into(),
            ))
        }
    };

    if let Some(engine) = engine {
        config.connection.engine = engine;
    }
    if let Some(conn) = &cli.connection_string {
        config.connection.connection_string = Some(conn.clone());
    }
    config.validate()?;
    Ok(config)
}

async fn connect(config: &Config) -> Result<ConnectorImpl, BridgeError> {
    let conn = &config.connection;
    ConnectorFactory::create(
        conn.engine,
        &conn.connection_string(),
        &conn.connect_options(),
    )
    .await
}

fn print_table(result: &QueryResult) {
    if result.columns.is_empty() {
        match result.records_affected {
            Some(n) => println!("{} rows affected", n),
            None => println!("OK"),
        }
        return;
    }
    println!("{}", result.column_names().join("\t"));
    for row in &result.rows {
        let cells: Vec<&str> = row
            .iter()
            .map(|c| c.as_deref().unwrap_or("NULL"))
            .collect();
        println!("{}", cells.join("\t"));
    }
    println!("({} rows, {}ms)", result.rows.len(), result.elapsed_time_ms);
}

/// Logs go to stderr so stdout carries only command output.
fn setup_logging(verbosity: &str, format: &str) {
    let level = match verbosity.to_lowercase().as_str() {
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .with_target(false);

    if format == "json" {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}

/// Cancel the returned token on SIGINT or SIGTERM.
#[cfg(unix)]
fn setup_signal_handler() -> Result<CancellationToken, BridgeError> {
    let cancel_token = CancellationToken::new();
    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;

    let token = cancel_token.clone();
    tokio::spawn(async move {
        tokio::select! {
            _ = sigint.recv() => eprintln!("\nReceived SIGINT. Stopping import..."),
            _ = sigterm.recv() => eprintln!("\nReceived SIGTERM. Stopping import..."),
        }
        token.cancel();
    });

    Ok(cancel_token)
}

/// Cancel the returned token on Ctrl-C.
#[cfg(not(unix))]
fn setup_signal_handler() -> Result<CancellationToken, BridgeError> {
    let cancel_token = CancellationToken::new();
    let token = cancel_token.clone();

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\nReceived Ctrl-C. Stopping import...");
            token.cancel();
        }
    });

    Ok(cancel_token)
}
