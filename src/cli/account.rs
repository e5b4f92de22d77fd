//! Account setup and status commands

use clap::Args;
use rand::RngCore;
use uuid::Uuid;

use super::{format_size, Session};
use crate::config::paths::ArchivePaths;
use crate::config::settings::Settings;
use crate::crypto::{derive_backup_key, BackupKey, SecureString};
use crate::error::{ArchiveError, ArchiveResult};
use crate::kv::BackupValues;
use crate::models::{RecipientRecord, RecipientType};
use crate::storage::{recipients, structure};

/// Arguments for `init`
#[derive(Args, Debug, Default)]
pub struct InitArgs {
    /// Profile given name
    #[arg(long, default_value = "")]
    pub given_name: String,

    /// Profile family name
    #[arg(long, default_value = "")]
    pub family_name: String,

    /// Phone number in E.164 form
    #[arg(long)]
    pub e164: Option<String>,

    /// Derive the backup key from a recovery phrase (prompted) instead of
    /// generating one
    #[arg(long)]
    pub recovery_phrase: bool,
}

/// Create the data directory, the account identity and its backup key
pub fn handle_init_command(paths: ArchivePaths, settings: Settings, args: InitArgs) -> ArchiveResult<()> {
    let session = Session::open(paths, settings)?;
    let account = session.account();

    if let Some(aci) = account.aci()? {
        println!("Already initialized at {}", session.paths.base_dir().display());
        println!("Account: {}", aci);
        return Ok(());
    }

    let aci = Uuid::new_v4();
    let mut profile_key = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut profile_key);

    let backup_key = if args.recovery_phrase {
        let phrase = prompt_recovery_phrase()?;
        println!("Deriving backup key...");
        derive_backup_key(&phrase, &aci, &session.settings.recovery_key_params)?
    } else {
        BackupKey::generate()
    };

    account.set_aci(&aci)?;
    if let Some(e164) = &args.e164 {
        account.set_e164(e164)?;
    }
    account.set_profile_key(&profile_key)?;
    account.set_profile_name(&args.given_name, &args.family_name)?;
    account.set_backup_key(&backup_key)?;

    {
        let conn = session.db.lock()?;
        if recipients::find_self(&conn)?.is_none() {
            recipients::insert(
                &conn,
                &RecipientRecord {
                    aci: Some(aci),
                    e164: args.e164.clone(),
                    profile_key: Some(profile_key.to_vec()),
                    profile_given_name: Some(args.given_name.clone()).filter(|n| !n.is_empty()),
                    profile_family_name: Some(args.family_name.clone()).filter(|n| !n.is_empty()),
                    ..RecipientRecord::new(RecipientType::SelfRecipient)
                },
            )?;
        }
    }
    session.settings.save(&session.paths)?;

    println!("Initialized chat-archive at: {}", session.paths.base_dir().display());
    println!("Account: {}", aci);
    if !args.recovery_phrase {
        println!("A random backup key was generated; local archives can only be read on this device.");
    }
    Ok(())
}

fn prompt_recovery_phrase() -> ArchiveResult<SecureString> {
    let phrase = read_secret("Recovery phrase: ")?;
    if phrase.is_blank() {
        return Err(ArchiveError::Encryption("Recovery phrase cannot be empty".into()));
    }
    let confirm = read_secret("Confirm recovery phrase: ")?;
    if phrase.as_str() != confirm.as_str() {
        return Err(ArchiveError::Encryption("Recovery phrases do not match".into()));
    }
    Ok(phrase)
}

fn read_secret(prompt: &str) -> ArchiveResult<SecureString> {
    rpassword::prompt_password(prompt)
        .map(SecureString::from)
        .map_err(|e| ArchiveError::Encryption(format!("Failed to read recovery phrase: {}", e)))
}

/// Show paths, identity, store sizes and backup bookkeeping
pub fn handle_status_command(paths: ArchivePaths, settings: Settings) -> ArchiveResult<()> {
    println!("chat-archive status");
    println!("===================");
    println!("Data directory:   {}", paths.base_dir().display());
    println!("Backup directory: {}", paths.backups_dir().display());

    if !paths.is_initialized() {
        println!();
        println!("Not initialized. Run 'chat-archive init' first.");
        return Ok(());
    }

    let session = Session::open(paths, settings)?;
    let account = session.account();
    let backup = BackupValues::new(session.kv.clone());

    println!();
    match account.aci()? {
        Some(aci) => println!("Account:          {}", aci),
        None => println!("Account:          (none)"),
    }
    println!(
        "Backup key:       {}",
        if account.backup_key()?.is_some() { "present" } else { "missing" }
    );

    {
        let conn = session.db.lock()?;
        println!();
        for (label, table) in [
            ("Recipients", "recipient"),
            ("Chats", "thread"),
            ("Messages", "message"),
            ("Calls", "call"),
            ("Sticker packs", "sticker_pack"),
            ("Chat folders", "chat_folder"),
        ] {
            println!("{:<17} {}", format!("{}:", label), structure::row_count(&conn, table)?);
        }
    }

    println!();
    println!("Restore state:    {:?}", backup.restore_state()?);
    match backup.last_backup_time()? {
        Some(time_ms) if time_ms > 0 => {
            let when = chrono::DateTime::from_timestamp_millis(time_ms)
                .map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
                .unwrap_or_else(|| time_ms.to_string());
            println!("Last backup:      {}", when);
        }
        _ => println!("Last backup:      never"),
    }
    if backup.has_invalid_backup_version()? {
        println!("WARNING: the last archive was written by a newer version and was not imported.");
    }

    let pending = {
        let conn = session.db.lock()?;
        crate::storage::messages::pending_restore_bytes(&conn)?
    };
    if pending > 0 {
        println!("Media to restore: {}", format_size(pending));
    }
    Ok(())
}
