//! Archive file commands: export, import and validate

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

use clap::Args;

use super::{format_size, Session};
use crate::archive::{open_plaintext_reader, open_reader, validate, ArchiveReader, BackupMode};
use crate::cancel::CancellationToken;
use crate::error::{ArchiveError, ArchiveResult};
use crate::export::{ExportSummary, NoProgress};
use crate::import::ImportResult;

/// Arguments for `export`
#[derive(Args, Debug)]
pub struct ExportArgs {
    /// Output file path
    pub output: PathBuf,

    /// Write an unencrypted diagnostic archive
    #[arg(long)]
    pub plaintext: bool,

    /// Skip chat items sent before this time (ms since epoch)
    #[arg(long, default_value_t = 0, requires = "plaintext")]
    pub cutoff: i64,
}

/// Arguments for `import`
#[derive(Args, Debug)]
pub struct ImportArgs {
    /// Archive file to import
    pub input: PathBuf,

    /// The archive is an unencrypted diagnostic archive
    #[arg(long)]
    pub plaintext: bool,

    /// Skip confirmation prompt
    #[arg(short, long)]
    pub force: bool,
}

/// Arguments for `validate`
#[derive(Args, Debug)]
pub struct ValidateArgs {
    /// Archive file to check
    pub input: PathBuf,

    /// The archive is an unencrypted diagnostic archive
    #[arg(long)]
    pub plaintext: bool,
}

pub fn handle_export_command(session: &Session, args: ExportArgs) -> ArchiveResult<()> {
    let file = File::create(&args.output)
        .map_err(|e| ArchiveError::Io(format!("Failed to create {}: {}", args.output.display(), e)))?;
    let sink = BufWriter::new(file);
    let pipeline = session.export_pipeline();
    let now_ms = chrono::Utc::now().timestamp_millis();
    let cancel = CancellationToken::new();

    let summary = if args.plaintext {
        pipeline.export_for_debugging(now_ms, true, args.cutoff, sink, &NoProgress, &cancel)?
    } else {
        pipeline.export_for_local_backup(now_ms, sink, &NoProgress, &cancel)?
    };

    let size = std::fs::metadata(&args.output).map(|m| m.len()).unwrap_or(0);
    println!("Exported to {} ({})", args.output.display(), format_size(size));
    print_export_summary(&summary);
    Ok(())
}

pub(crate) fn print_export_summary(summary: &ExportSummary) {
    println!("  Recipients:             {}", summary.recipients);
    println!("  Chats:                  {}", summary.chats);
    println!("  Calls:                  {}", summary.calls);
    println!("  Sticker packs:          {}", summary.sticker_packs);
    println!("  Notification profiles:  {}", summary.notification_profiles);
    println!("  Chat folders:           {}", summary.chat_folders);
    println!("  Messages:               {}", summary.chat_items);
}

/// Open `path` for reading with the account's key, or as plaintext
pub(crate) fn open_archive(
    session: &Session,
    path: &Path,
    plaintext: bool,
) -> ArchiveResult<Box<dyn ArchiveReader>> {
    let length = std::fs::metadata(path)
        .map_err(|_| ArchiveError::backup_not_found(path.display().to_string()))?
        .len();

    if plaintext {
        let source = BufReader::new(File::open(path)?);
        return Ok(Box::new(open_plaintext_reader(BackupMode::Local, length, source)?));
    }

    let identity = session.identity()?;
    let key = session.account().require_backup_key()?;
    let owned = path.to_path_buf();
    let reader = open_reader(&key, &identity.aci, BackupMode::Local, None, length, move || {
        File::open(&owned)
    })?;
    Ok(Box::new(reader))
}

pub fn handle_validate_command(session: &Session, args: ValidateArgs) -> ArchiveResult<()> {
    let mut reader = open_archive(session, &args.input, args.plaintext)?;
    let summary = validate(reader.as_mut())?;
    println!("{}: OK", args.input.display());
    println!("  {}", summary.summary());
    println!("  Frames: {}", summary.total_frames());
    Ok(())
}

pub fn handle_import_command(session: &Session, args: ImportArgs) -> ArchiveResult<()> {
    let summary = {
        let mut reader = open_archive(session, &args.input, args.plaintext)?;
        validate(reader.as_mut())?
    };
    println!("Archive: {}", args.input.display());
    println!("Contents: {}", summary.summary());
    println!();

    if !args.force {
        println!("WARNING: This will replace ALL current messages, chats and contacts!");
        println!("To proceed, run again with --force flag:");
        println!("  chat-archive import {} --force", args.input.display());
        return Ok(());
    }

    let identity = session.identity()?;
    let pipeline = session.import_pipeline();
    let cancel = CancellationToken::new();
    let length = std::fs::metadata(&args.input)?.len();

    let result = if args.plaintext {
        let source = BufReader::new(File::open(&args.input)?);
        pipeline.import_for_debugging(length, source, &identity, &cancel)?
    } else {
        let path = args.input.clone();
        pipeline.import_local(length, move || File::open(&path), &identity, &cancel)?
    };

    match result {
        ImportResult::Success { backup_time_ms } => {
            println!("Import complete (archive written at {} ms).", backup_time_ms);
            session.report_jobs();
            Ok(())
        }
        ImportResult::Failure => Err(ArchiveError::Validation(format!(
            "{} was not imported",
            args.input.display()
        ))),
    }
}
