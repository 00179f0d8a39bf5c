mod commands;
mod logging;
mod progress;
mod server;

use std::io::{self, Write};
use std::process;

use anyhow::Context;
use clap::{CommandFactory, Parser};
use colored::*;
use commands::{Cli, Commands};
use dotenv::dotenv;
use logging::Console;
use progress::CliReporter;
use shelf_core::probe::Ffmpeg;
use shelf_core::storage::models::{EntryType, SearchOptions};
use shelf_core::storage::Database;
use shelf_core::{AppConfig, ScanEngine, SilentReporter};
use tracing::{error, info};

fn main() -> anyhow::Result<()> {
    dotenv().ok();

    let args = Cli::parse();
    let console = match args.command {
        Some(Commands::Run) | Some(Commands::Serve { .. }) => Console::Compact,
        _ => Console::Pretty,
    };
    let _guard = logging::init_logger(console);

    let config = match shelf_core::config::load_configuration() {
        Ok(config) => config,
        Err(err) => {
            error!("Error loading configuration: {}", err);
            process::exit(1);
        }
    };

    match args.command {
        Some(Commands::Run) => run_forever(&config)?,
        Some(Commands::Scan) => run_scan(&config)?,
        Some(Commands::Serve { listen }) => {
            let db = open_database(&config)?;
            let addr = listen.unwrap_or_else(|| config.listen_addr.clone());
            tokio::runtime::Runtime::new()?.block_on(server::serve(db, &addr))?;
        }
        Some(Commands::Search {
            query,
            entry_type,
            limit,
        }) => run_search(&config, &query, entry_type, limit)?,
        Some(Commands::Tags { prefix, limit }) => {
            let db = open_database(&config)?;
            for tag in db.get_tag_cloud(prefix.as_deref(), limit)? {
                println!("{:>6}  {}", tag.count.to_string().cyan(), tag.tag);
            }
        }
        Some(Commands::SetPassword { id, password }) => {
            let db = open_database(&config)?;
            db.set_file_password(&id, &password)?;
            println!("Password set for {}", id.green());
        }
        Some(Commands::RemovePassword { id }) => {
            let db = open_database(&config)?;
            if db.remove_file_password(&id)? {
                println!("Password removed from {}", id.green());
            } else {
                println!("{} had no password", id.yellow());
            }
        }
        Some(Commands::PrintConfig) => {
            println!("Configuration: {:?}", config);
        }
        Some(Commands::TruncateDb) => {
            match prompt_confirm(
                "Are you SURE you want to COMPLETELY DELETE the Database?",
                Some(false),
            ) {
                Ok(true) => {
                    open_database(&config)?.truncate_all()?;
                    println!("All tables truncated");
                }
                _ => {
                    process::exit(0);
                }
            }
        }
        None => {
            let _ = Cli::command().print_long_help();
        }
    }

    Ok(())
}

fn open_database(config: &AppConfig) -> anyhow::Result<Database> {
    Database::open(&config.db_path).with_context(|| format!("opening database {}", config.db_path))
}

fn engine(config: &AppConfig) -> anyhow::Result<ScanEngine<Ffmpeg>> {
    Ok(ScanEngine::new(config.clone(), Ffmpeg::from_config(config))?)
}

fn run_forever(config: &AppConfig) -> anyhow::Result<()> {
    let db = open_database(config)?;
    let engine = engine(config)?;
    info!(
        "Scheduler started: {} roots, every {}s",
        config.root_paths.len(),
        config.rescan_interval_secs
    );
    engine.run_forever(&db, &SilentReporter)
}

fn run_scan(config: &AppConfig) -> anyhow::Result<()> {
    let db = open_database(config)?;
    let report = engine(config)?.run_pass(&db, &CliReporter::new())?;

    println!();
    for walk in &report.walks {
        info!(
            "{}: {} folders, {} files, {} links; {} new, {} updated, {} removed in {}",
            walk.root.bold(),
            walk.folders,
            walk.files,
            walk.links,
            format!("{}", walk.created).green(),
            format!("{}", walk.updated).yellow(),
            format!("{}", walk.deleted).red(),
            format!("{:.2}s", walk.duration.as_secs_f64()).green(),
        );
    }
    for root in &report.failed_roots {
        error!("Root {} could not be walked", root.red());
    }
    for catalog in &report.failed_catalogs {
        error!("The {} catalog pass did not finish", catalog.red());
    }
    info!(
        "Video: {} new, {} corrupted, {} rejected. Audio: {} new, {} corrupted",
        format!("{}", report.video.inserted).cyan(),
        format!("{}", report.video.corrupted).red(),
        report.video.rejected,
        format!("{}", report.audio.inserted).cyan(),
        format!("{}", report.audio.corrupted).red(),
    );
    info!(
        "Pass: {}",
        format!("{:.2}s", report.duration.as_secs_f64()).green()
    );

    Ok(())
}

fn run_search(
    config: &AppConfig,
    query: &str,
    entry_type: Option<EntryType>,
    limit: usize,
) -> anyhow::Result<()> {
    let db = open_database(config)?;
    let entries = db.search_entries(query, SearchOptions { entry_type, limit })?;
    if entries.is_empty() {
        println!("No entries match {}", query.yellow());
        return Ok(());
    }
    for entry in entries {
        let kind = match entry.entry_type {
            EntryType::Folder => entry.entry_type.as_str().blue(),
            EntryType::File => entry.entry_type.as_str().normal(),
            EntryType::Link => entry.entry_type.as_str().magenta(),
        };
        let tags = if entry.tags.is_empty() {
            String::new()
        } else {
            format!(" [{}]", entry.tags.join(", ")).dimmed().to_string()
        };
        println!("{:<6} {}  {}{}", kind, entry.id.dimmed(), entry.path, tags);
    }
    Ok(())
}

fn prompt_confirm(prompt: &str, default: Option<bool>) -> io::Result<bool> {
    let mut input = String::new();

    loop {
        input.clear();

        match default {
            Some(true) => print!("{} (Y/n): ", prompt),
            Some(false) | None => print!("{} (y/N): ", prompt),
        }
        io::stdout().flush()?;

        io::stdin().read_line(&mut input)?;

        match input.trim().to_uppercase().as_str() {
            "Y" => return Ok(true),
            "N" => return Ok(false),
            "" => match default {
                Some(default) => return Ok(default),
                None => continue,
            },
            _ => continue,
        }
    }
}
