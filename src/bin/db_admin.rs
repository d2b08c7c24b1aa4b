//! src/bin/db_admin.rs
//!
//! Common actions for management of application data. Connection settings
//! come from `DATABASE_`-prefixed environment variables (a `.env` file is
//! honored), e.g. DATABASE_HOST, DATABASE_PORT, DATABASE_USERNAME,
//! DATABASE_PASSWORD, DATABASE_DATABASE_NAME.
use std::path::Path;
use std::process::ExitCode;

use plinth::configuration::{self, DatabaseSettings};
use plinth::database::Database;
use plinth::inputs;
use plinth::telemetry;

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    telemetry::init_console_subscriber("db_admin");

    let arguments: Vec<String> = std::env::args().skip(1).collect();

    match run(&arguments).await {
        Ok(code) => code,
        Err(error) => {
            eprintln!("{:#}", error);
            ExitCode::FAILURE
        }
    }
}

async fn run(arguments: &[String]) -> anyhow::Result<ExitCode> {
    let Some(command) = arguments.first() else {
        print_usage();
        return Ok(ExitCode::FAILURE);
    };
    let flags = &arguments[1..];

    let settings: DatabaseSettings = configuration::from_env("DATABASE_")?;
    let database = build_database(&settings)?;

    // Every command except ping itself needs a reachable database.
    if command != "ping" && !database.ping().await {
        println!("Unable to connect to the database.");
        return Ok(ExitCode::FAILURE);
    }

    let code = match command.as_str() {
        "ping" => {
            if database.ping().await {
                println!("Able to connect to the database.");
                ExitCode::SUCCESS
            } else {
                println!("Unable to connect to the database.");
                ExitCode::FAILURE
            }
        }
        "tables" => {
            let tables = database
                .tables(const_filter(flags), empty_filter(flags))
                .await?;
            for table in &tables {
                let count = database.row_count(table).await?;
                println!("* {} ({})", table, count);
            }
            ExitCode::SUCCESS
        }
        "clear" => {
            let include_const = flags.iter().any(|flag| flag == "--include-const");

            println!("This action will truncate the following tables:");
            let affected = database
                .tables(if include_const { None } else { Some(false) }, None)
                .await?;
            for table in &affected {
                println!("* {}", table);
            }

            if !inputs::confirm("Continue?", Some(false))? {
                println!("Action cancelled. No data was lost.");
                return Ok(ExitCode::FAILURE);
            }

            let cleared = database.clear(include_const).await?;
            println!("Truncated {} table(s).", cleared.len());
            ExitCode::SUCCESS
        }
        "schema" => {
            let report = database.schema().await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            ExitCode::SUCCESS
        }
        "dump" => {
            let Some(destination) = positional(flags) else {
                println!("Usage: db-admin dump <destination> [--const|--non-const]");
                return Ok(ExitCode::FAILURE);
            };
            let dump_file = database
                .dump(Path::new(destination), const_filter(flags))
                .await?;
            println!("Dumped data to {}.", dump_file.display());
            ExitCode::SUCCESS
        }
        "load" => {
            let Some(dump_file) = positional(flags) else {
                println!("Usage: db-admin load <dump-file>");
                return Ok(ExitCode::FAILURE);
            };
            database.load(Path::new(dump_file)).await?;
            println!("Loaded data from {}.", dump_file);
            ExitCode::SUCCESS
        }
        unknown => {
            println!("Unknown command: {}", unknown);
            print_usage();
            ExitCode::FAILURE
        }
    };

    database.dispose().await;

    Ok(code)
}

fn build_database(settings: &DatabaseSettings) -> anyhow::Result<Database> {
    let mut database = Database::connect(settings)?;

    if let Ok(names) = std::env::var("DATABASE_CONST_TABLES") {
        database = database.with_const_tables(
            names
                .split(',')
                .map(|name| name.trim().to_string())
                .filter(|name| !name.is_empty()),
        );
    }

    if let Ok(patterns) = std::env::var("DATABASE_CONST_TABLE_PATTERNS") {
        database = database.with_const_table_patterns(
            patterns.split(',').map(str::trim).filter(|p| !p.is_empty()),
        )?;
    }

    if let Ok(value) = std::env::var("DATABASE_SAFE_MODE") {
        database = database.with_safe_mode(value == "1" || value.eq_ignore_ascii_case("true"));
    }

    Ok(database)
}

fn const_filter(flags: &[String]) -> Option<bool> {
    if flags.iter().any(|flag| flag == "--const") {
        Some(true)
    } else if flags.iter().any(|flag| flag == "--non-const") {
        Some(false)
    } else {
        None
    }
}

fn empty_filter(flags: &[String]) -> Option<bool> {
    if flags.iter().any(|flag| flag == "--empty") {
        Some(true)
    } else if flags.iter().any(|flag| flag == "--non-empty") {
        Some(false)
    } else {
        None
    }
}

fn positional(flags: &[String]) -> Option<&String> {
    flags.iter().find(|flag| !flag.starts_with("--"))
}

fn print_usage() {
    println!("Usage: db-admin <command> [options]");
    println!();
    println!("Commands:");
    println!("  ping                      verify the database is accessible");
    println!("  tables [--const|--non-const] [--empty|--non-empty]");
    println!("                            list tables with their row counts");
    println!("  clear [--include-const]   truncate database tables");
    println!("  dump <dest> [--const|--non-const]");
    println!("                            export all data to a dump file");
    println!("  load <file>               import all data from a dump file");
    println!("  schema                    show the current database schema");
}
