use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;

use fieldqueue::cli::args::{Cli, Commands};
use fieldqueue::cli::commands;
use fieldqueue::config::{ColorSetting, Config, Paths};
use fieldqueue::logging;
use fieldqueue::queue::{QueueManager, SqliteStore};

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("{}: {:#}", "error".red().bold(), e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();

    let paths = Paths::new()?;
    let config = Config::load_from_path(&paths.config_file)?;

    match config.general.color {
        ColorSetting::Always => colored::control::set_override(true),
        ColorSetting::Never => colored::control::set_override(false),
        ColorSetting::Auto => {}
    }
    logging::init(&config.logging.level, cli.verbose);

    let format = cli.output.unwrap_or(config.general.default_output);
    let db_path = cli.db.clone().unwrap_or_else(|| config.database_path(&paths));
    let queue = QueueManager::new(SqliteStore::open_at(&db_path));
    tracing::debug!(db = %db_path.display(), "using queue database");

    let output = match cli.command {
        Commands::Enqueue(args) => commands::enqueue(&queue, &args, format).await?,
        Commands::Send(args) => commands::send(queue, &config, &args, format).await?,
        Commands::List { limit } => commands::list(&queue, limit, format).await?,
        Commands::Show { id } => commands::show(&queue, &id, format).await?,
        Commands::Remove { id } => commands::remove(&queue, &id, format).await?,
        Commands::Size => commands::size(&queue, format).await?,
        Commands::Status => {
            commands::status(&queue, config.replay.max_retries, format).await?
        }
        Commands::Replay(args) => commands::replay(queue, &config, &args, format)
            .await
            .context("replay failed")?,
        Commands::Watch(args) => commands::watch(queue, &config, &args, format).await?,
        Commands::Clear { force } => commands::clear(&queue, force, format).await?,
        Commands::Init { force } => commands::init(&paths, force, format)?,
        Commands::Completions { shell } => commands::completions(shell)?,
    };

    if !output.is_empty() {
        println!("{output}");
    }
    Ok(())
}
