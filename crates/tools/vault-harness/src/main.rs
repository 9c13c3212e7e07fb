//! CLI harness for the app password gate and the navigation guard
//!
//! Operates on a real SQLite secret store so the persisted layout can be
//! inspected and exercised outside the app:
//! - set, verify, query and clear the app password
//! - check a navigation target against a mini-app manifest

use anam_bridge::NavigationGuard;
use anam_params::{KdfParams, MiniAppManifest, VaultConfig};
use anam_vault::{CredentialGate, SoftwareKeystore, SqliteSecretStore};
use anyhow::Context;
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::io::BufRead;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use zeroize::Zeroizing;

const KEYSTORE_FILE_NAME: &str = "keystore.bin";

#[derive(Parser)]
#[command(name = "vault-harness")]
#[command(about = "Anam wallet vault testing harness", long_about = None)]
struct Cli {
    /// Config file (JSON); defaults apply when absent
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Data directory override
    #[arg(short, long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Set (or replace) the app password, read from stdin
    SetPassword,

    /// Verify a password read from stdin against the stored verifier
    VerifyPassword,

    /// Report whether an app password is set
    HasPassword,

    /// Remove the stored verifier
    ClearPassword,

    /// Check a navigation target against a manifest
    CheckNav {
        /// Manifest file (JSON)
        #[arg(short, long)]
        manifest: PathBuf,

        /// Requested page path, optionally with `?query`
        path: String,
    },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => VaultConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => VaultConfig::default(),
    };
    if let Some(dir) = cli.data_dir {
        config.data_dir = Some(dir);
    }

    match cli.command {
        Commands::SetPassword => {
            let gate = open_gate(&config)?;
            let password = read_password()?;
            with_spinner("Deriving verifier", &config.kdf, || {
                gate.set_password(&password)
            })?;
            info!("App password set");
        }
        Commands::VerifyPassword => {
            let gate = open_gate(&config)?;
            let password = read_password()?;
            let matched = with_spinner("Verifying", &config.kdf, || {
                gate.verify_password(&password)
            })?;
            if matched {
                println!("password ok");
            } else {
                println!("password mismatch");
                std::process::exit(1);
            }
        }
        Commands::HasPassword => {
            let gate = open_gate(&config)?;
            println!("{}", gate.has_password()?);
        }
        Commands::ClearPassword => {
            let gate = open_gate(&config)?;
            gate.clear()?;
            info!("App password cleared");
        }
        Commands::CheckNav { manifest, path } => {
            let manifest = MiniAppManifest::load(&manifest)
                .with_context(|| format!("loading manifest {}", manifest.display()))?;
            let guard = NavigationGuard::from_config(&manifest, &config);
            match guard.resolve(&path) {
                Some(url) => println!("allowed {}", url),
                None => {
                    println!("blocked {}", path);
                    std::process::exit(1);
                }
            }
        }
    }

    Ok(())
}

fn open_gate(config: &VaultConfig) -> anyhow::Result<CredentialGate> {
    let data_dir = config.resolved_data_dir()?;
    let keystore = SoftwareKeystore::open_file(data_dir.join(KEYSTORE_FILE_NAME))
        .context("opening software keystore")?;
    let db_path = config.database_path()?;
    info!("Secret store: {}", db_path.display());

    let store = SqliteSecretStore::open(&db_path, &keystore).context("opening secret store")?;
    Ok(CredentialGate::new(Arc::new(store), config.kdf)?)
}

/// First line of stdin; passwords never go through argv
fn read_password() -> anyhow::Result<Zeroizing<String>> {
    let mut line = Zeroizing::new(String::new());
    std::io::stdin()
        .lock()
        .read_line(&mut line)
        .context("reading password from stdin")?;
    Ok(Zeroizing::new(line.trim_end_matches(['\r', '\n']).to_string()))
}

fn with_spinner<T, E>(
    message: &str,
    params: &KdfParams,
    f: impl FnOnce() -> Result<T, E>,
) -> anyhow::Result<T>
where
    E: std::error::Error + Send + Sync + 'static,
{
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner} {msg} [{elapsed}]")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    spinner.set_message(format!(
        "{} (scrypt N=2^{}, r={}, p={}, ~{} MiB)",
        message,
        params.cost,
        params.block_size,
        params.parallelism,
        params.memory_bytes() / (1024 * 1024)
    ));
    spinner.enable_steady_tick(Duration::from_millis(100));

    let result = f();
    spinner.finish_and_clear();
    Ok(result?)
}
