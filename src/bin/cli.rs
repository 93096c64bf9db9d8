//! memstore CLI
//!
//! Bootstraps a table store from a SQLite database, runs one command and
//! flushes the write-behind queue before exiting.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use clap::{Parser, Subcommand};
use memstore::backend::SqliteBackend;
use memstore::{ColumnType, Result, Row, StoreConfig, StoreError, TableSchema, TableStore, Value};
use tracing_subscriber::{fmt, EnvFilter};

/// memstore CLI
#[derive(Parser, Debug)]
#[command(name = "memstore-cli")]
#[command(about = "Memory-resident table store over SQLite")]
#[command(version)]
struct Args {
    /// SQLite database file
    #[arg(short, long, default_value = "./memstore.db")]
    db: PathBuf,

    /// JSON schema descriptor
    #[arg(short, long)]
    schema: PathBuf,

    /// Persistence queue capacity
    #[arg(short, long, default_value = "100")]
    queue_capacity: usize,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create the table if it does not exist
    Init,

    /// Insert a row given as column=value pairs
    Insert {
        /// Pairs like `csrf_token=abc created_at=now`
        values: Vec<String>,
    },

    /// Get a row by id
    Get {
        #[arg(allow_negative_numbers = true)]
        id: i64,
    },

    /// Get a row by its unique key
    GetKey {
        key: String,
    },

    /// Delete a row by id
    Delete {
        #[arg(allow_negative_numbers = true)]
        id: i64,
    },

    /// List ids that ever held a key in an indexed column
    Select {
        column: String,
        key: String,
    },

    /// Print table statistics
    Stats,
}

fn main() {
    // Initialize tracing/logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,memstore=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    tracing::debug!("memstore CLI v{}", memstore::VERSION);

    if let Err(e) = run(args) {
        tracing::error!("{}", e);
        std::process::exit(1);
    }
}

fn run(args: Args) -> Result<()> {
    let schema = TableSchema::from_path(&args.schema)?;
    let backend = Arc::new(SqliteBackend::open(&args.db)?);

    if let Commands::Init = args.command {
        backend.create_table(&schema)?;
        println!("table {} ready", schema.table_name);
        return Ok(());
    }

    let config = StoreConfig::builder()
        .queue_capacity(args.queue_capacity)
        .initial_capacity(1024)
        .build()?;
    let store = TableStore::open(backend, schema, config)?;

    let outcome = execute(&store, args.command);

    // Flush durable writes even when the command failed
    let stats = store.close()?;
    tracing::debug!("Queue stats: {:?}", stats);

    outcome
}

fn execute(store: &TableStore, command: Commands) -> Result<()> {
    match command {
        Commands::Init => Ok(()),
        Commands::Insert { values } => {
            let row = parse_row(store.schema(), &values)?;
            let id = store.insert(row)?;
            println!("{}", id);
            Ok(())
        }
        Commands::Get { id } => {
            print_row(store.schema(), &store.get(id)?);
            Ok(())
        }
        Commands::GetKey { key } => {
            let schema = store.schema();
            let position = schema.unique_key_position().ok_or(StoreError::NoUniqueKey)?;
            let column_type = schema.value_columns()[position].column_type;
            let key = Value::parse(column_type, &key)?
                .index_key()
                .ok_or_else(|| StoreError::InvalidRow("key must not be NULL".to_string()))?;
            print_row(schema, &store.get_by_key(key)?);
            Ok(())
        }
        Commands::Delete { id } => {
            store.delete(id)?;
            println!("deleted {}", id);
            Ok(())
        }
        Commands::Select { column, key } => {
            let schema = store.schema();
            let position = schema
                .value_position(&column)
                .ok_or_else(|| StoreError::NotIndexed(column.clone()))?;
            let column_type = schema.value_columns()[position].column_type;
            let key = Value::parse(column_type, &key)?
                .index_key()
                .ok_or_else(|| StoreError::InvalidRow("key must not be NULL".to_string()))?;
            let ids: Vec<String> = store
                .select_ids(&column, key)?
                .iter()
                .map(|id| id.to_string())
                .collect();
            println!("{}", ids.join(" "));
            Ok(())
        }
        Commands::Stats => {
            println!("table:        {}", store.schema().table_name);
            println!("length:       {}", store.len());
            println!("live rows:    {}", store.live_count());
            println!("unique keys:  {}", store.unique_index_len());
            Ok(())
        }
    }
}

/// Build a row from `column=value` pairs; missing columns become NULL
fn parse_row(schema: &TableSchema, pairs: &[String]) -> Result<Row> {
    let mut values = vec![Value::Null; schema.value_width()];

    for pair in pairs {
        let (name, raw) = pair
            .split_once('=')
            .ok_or_else(|| StoreError::InvalidRow(format!("expected column=value, got {}", pair)))?;
        let position = schema
            .value_position(name)
            .ok_or_else(|| StoreError::InvalidRow(format!("unknown column {}", name)))?;

        let column_type = schema.value_columns()[position].column_type;
        values[position] = if column_type == ColumnType::Timestamp && raw == "now" {
            Value::Timestamp(now_millis())
        } else {
            Value::parse(column_type, raw)?
        };
    }

    Ok(Row::new(values))
}

fn print_row(schema: &TableSchema, row: &Row) {
    println!("id = {}", row.id);
    for (col, value) in schema.value_columns().iter().zip(&row.values) {
        println!("{} = {}", col.name, value);
    }
}

fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
