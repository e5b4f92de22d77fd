use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use chat_archive::cli::{
    handle_backup_command, handle_export_command, handle_import_command, handle_init_command,
    handle_status_command, handle_validate_command, BackupCommands, ExportArgs, ImportArgs,
    InitArgs, Session, ValidateArgs,
};
use chat_archive::config::{paths::ArchivePaths, settings::Settings};

#[derive(Parser)]
#[command(
    name = "chat-archive",
    version,
    about = "Encrypted backup export, import and restore for a messaging client's local state"
)]
struct Cli {
    /// Log at debug level (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the data directory and an account identity
    Init(InitArgs),

    /// Write an archive of the current state to a file
    Export(ExportArgs),

    /// Replace the current state with the contents of an archive
    Import(ImportArgs),

    /// Decode an archive and check it without importing
    Validate(ValidateArgs),

    /// Local backup management
    #[command(subcommand)]
    Backup(BackupCommands),

    /// Show paths, account and store status
    Status,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let paths = ArchivePaths::new()?;
    let settings = Settings::load_or_create(&paths)?;

    let default_level = if cli.verbose {
        "debug".to_string()
    } else {
        settings.log_level.clone()
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Init(args) => handle_init_command(paths, settings, args)?,
        Commands::Status => handle_status_command(paths, settings)?,
        Commands::Export(args) => {
            let session = Session::open_initialized(paths, settings)?;
            handle_export_command(&session, args)?;
        }
        Commands::Import(args) => {
            let session = Session::open_initialized(paths, settings)?;
            handle_import_command(&session, args)?;
        }
        Commands::Validate(args) => {
            let session = Session::open_initialized(paths, settings)?;
            handle_validate_command(&session, args)?;
        }
        Commands::Backup(cmd) => {
            let session = Session::open_initialized(paths, settings)?;
            handle_backup_command(&session, cmd)?;
        }
    }

    Ok(())
}
