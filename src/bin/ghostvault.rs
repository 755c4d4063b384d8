//! GhostVault CLI — thin host glue around [`ghostvault_core::VaultCoordinator`].
//!
//! This binary exists so the core is runnable and demoable end-to-end; it
//! is a minimal host, not a full front-end. Each invocation is a fresh
//! process: there is no long-lived session, so every command that needs
//! vault access re-authenticates before acting.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use ghostvault_core::backup::{BackupOptions, RestoreOptions};
use ghostvault_core::coordinator::{AuthOutcome, InitPasswords, VaultCoordinator};
use ghostvault_core::config::VaultLocation;

#[derive(Parser, Debug)]
#[command(name = "ghostvault")]
#[command(about = "Encrypted local file vault", long_about = None)]
struct Cli {
    /// Path to the vault directory. Defaults to the platform data directory.
    #[arg(long, global = true)]
    vault: Option<PathBuf>,

    /// Increase log verbosity (-v, -vv).
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// First-time setup: sets the master, decoy, and panic passwords.
    Init,
    /// Authenticate and print which role the password matched.
    Unlock,
    /// Encrypt and store a file.
    Upload { path: PathBuf },
    /// Decrypt a stored file to a destination path.
    Retrieve { file_id: uuid::Uuid, destination: PathBuf },
    /// List everything in the registry.
    List,
    /// Substring search over name and tags.
    Search { query: String },
    /// Securely delete a stored file.
    Delete { file_id: uuid::Uuid },
    /// Create a sealed backup archive.
    Backup { output: PathBuf },
    /// Restore a vault from a sealed backup archive.
    Restore { archive: PathBuf, #[arg(long)] overwrite: bool },
    /// Verify a backup archive without touching the live vault.
    VerifyBackup { archive: PathBuf },
    /// Upgrade legacy unframed blobs to the current format.
    Migrate,
}

fn prompt_password(label: &str) -> anyhow::Result<String> {
    Ok(rpassword::prompt_password(format!("{label}: "))?)
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let vault_root = VaultLocation::resolve(cli.vault)?;

    match cli.command {
        Command::Init => {
            let master = prompt_password("master password")?;
            let decoy = prompt_password("decoy password")?;
            let panic = prompt_password("panic password")?;
            VaultCoordinator::init(vault_root, InitPasswords { master: &master, decoy: &decoy, panic: &panic })?;
            println!("vault initialized");
        }
        Command::Unlock => {
            let password = prompt_password("password")?;
            let mut coordinator = VaultCoordinator::open(vault_root)?;
            match coordinator.authenticate(&password)? {
                AuthOutcome::Master => println!("unlocked: master"),
                AuthOutcome::Decoy => println!("unlocked: decoy"),
                AuthOutcome::Invalid => println!("invalid password"),
            }
        }
        Command::Upload { path } => {
            let password = prompt_password("master password")?;
            let mut coordinator = VaultCoordinator::open(vault_root)?;
            require_master(coordinator.authenticate(&password)?)?;
            let id = coordinator.upload(&path)?;
            println!("{id}");
        }
        Command::Retrieve { file_id, destination } => {
            let password = prompt_password("master password")?;
            let mut coordinator = VaultCoordinator::open(vault_root)?;
            require_master(coordinator.authenticate(&password)?)?;
            coordinator.export(file_id, &destination)?;
            println!("wrote {}", destination.display());
        }
        Command::List => {
            let password = prompt_password("password")?;
            let mut coordinator = VaultCoordinator::open(vault_root)?;
            coordinator.authenticate(&password)?;
            for descriptor in coordinator.list()? {
                println!("{}\t{}\t{} bytes", descriptor.file_id, descriptor.original_name, descriptor.plaintext_size);
            }
        }
        Command::Search { query } => {
            let password = prompt_password("master password")?;
            let mut coordinator = VaultCoordinator::open(vault_root)?;
            require_master(coordinator.authenticate(&password)?)?;
            for descriptor in coordinator.search(&query)? {
                println!("{}\t{}", descriptor.file_id, descriptor.original_name);
            }
        }
        Command::Delete { file_id } => {
            let password = prompt_password("master password")?;
            let mut coordinator = VaultCoordinator::open(vault_root)?;
            require_master(coordinator.authenticate(&password)?)?;
            coordinator.delete(file_id)?;
            println!("deleted {file_id}");
        }
        Command::Backup { output } => {
            let password = prompt_password("master password")?;
            let backup_key = prompt_password("backup archive password")?;
            let mut coordinator = VaultCoordinator::open(vault_root)?;
            require_master(coordinator.authenticate(&password)?)?;
            let manifest = coordinator.create_backup(&output, &BackupOptions::default(), backup_key.as_bytes())?;
            println!("backed up {} files to {}", manifest.file_count, output.display());
        }
        Command::Restore { archive, overwrite } => {
            let password = prompt_password("master password")?;
            let backup_key = prompt_password("backup archive password")?;
            let mut coordinator = VaultCoordinator::open(vault_root)?;
            require_master(coordinator.authenticate(&password)?)?;
            let options = RestoreOptions { overwrite_existing: overwrite, ..Default::default() };
            let (manifest, report) = coordinator.restore_backup(&archive, &options, backup_key.as_bytes())?;
            println!(
                "restored {} of {} files ({} skipped)",
                report.restored, manifest.file_count, report.skipped
            );
        }
        Command::VerifyBackup { archive } => {
            let backup_key = prompt_password("backup archive password")?;
            let coordinator = VaultCoordinator::open(vault_root)?;
            let manifest = coordinator.verify_backup(&archive, backup_key.as_bytes())?;
            println!("archive contains {} files, {} bytes total", manifest.file_count, manifest.total_plaintext_size);
        }
        Command::Migrate => {
            let password = prompt_password("master password")?;
            let mut coordinator = VaultCoordinator::open(vault_root)?;
            require_master(coordinator.authenticate(&password)?)?;
            let result = coordinator.migration_utility().migrate(password.as_bytes())?;
            println!("{result:?}");
        }
    }

    Ok(())
}

fn require_master(outcome: AuthOutcome) -> anyhow::Result<()> {
    match outcome {
        AuthOutcome::Master => Ok(()),
        AuthOutcome::Decoy => anyhow::bail!("decoy mode does not permit this operation"),
        AuthOutcome::Invalid => anyhow::bail!("invalid credentials"),
    }
}
