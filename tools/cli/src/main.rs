//! Cipherbox CLI - serve an encrypted directory tree over HTTP, or convert
//! one offline.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use cipherbox_crypto::{Kdf, KdfParams};
use cipherbox_store::{Store, StoreConfig};

#[derive(Parser)]
#[command(name = "cipherbox")]
#[command(about = "Cipherbox - password-protected encrypted file serving")]
#[command(version)]
struct Cli {
    /// Enable verbose logging.
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve a store over HTTP.
    Serve {
        /// Directory tree to serve.
        #[arg(short, long)]
        content: PathBuf,

        /// Metadata directory holding the wrapped key.
        #[arg(short, long)]
        meta: PathBuf,

        /// Port to listen on.
        #[arg(short, long, default_value_t = 8000)]
        port: u16,

        /// Idle seconds before the session key is cleared.
        #[arg(long, default_value_t = 900)]
        idle_timeout: u64,

        /// Password derivation for new stores: "blake2b" or "argon2id".
        #[arg(long, default_value = "blake2b")]
        kdf: String,
    },

    /// Encrypt every unmanaged entry of a content tree, without the server.
    Migrate {
        /// Directory tree to convert.
        #[arg(short, long)]
        content: PathBuf,

        /// Metadata directory holding the wrapped key.
        #[arg(short, long)]
        meta: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    tracing::subscriber::set_global_default(subscriber).context("Failed to set up logging")?;

    match cli.command {
        Commands::Serve {
            content,
            meta,
            port,
            idle_timeout,
            kdf,
        } => cmd_serve(content, meta, port, idle_timeout, &kdf).await,
        Commands::Migrate { content, meta } => cmd_migrate(content, meta).await,
    }
}

fn parse_kdf(name: &str) -> Result<Kdf> {
    match name {
        "blake2b" => Ok(Kdf::Blake2b),
        "argon2id" => Ok(Kdf::argon2id(KdfParams::interactive())),
        other => anyhow::bail!("unknown KDF '{}': expected blake2b or argon2id", other),
    }
}

async fn cmd_serve(
    content: PathBuf,
    meta: PathBuf,
    port: u16,
    idle_timeout: u64,
    kdf: &str,
) -> Result<()> {
    let config = StoreConfig::new(content, meta)
        .with_kdf(parse_kdf(kdf)?)
        .with_idle_timeout(Duration::from_secs(idle_timeout));

    let store = Arc::new(Store::open(config).context("Failed to open store")?);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!("open http://localhost:{}/ to log in", port);

    cipherbox_server::serve(store, addr)
        .await
        .context("Server failed")?;
    Ok(())
}

async fn cmd_migrate(content: PathBuf, meta: PathBuf) -> Result<()> {
    let password = rpassword::prompt_password("Enter password: ")
        .context("Failed to read password")?;

    let store = Store::open(StoreConfig::new(content, meta)).context("Failed to open store")?;
    store.login(&password).context("Login failed")?;

    let report = tokio::task::spawn_blocking(move || store.migrate("/"))
        .await
        .context("Migration task failed")??;

    println!(
        "Encrypted {} files, renamed {} directories, skipped {} already-encrypted entries",
        report.files_encrypted, report.dirs_renamed, report.skipped
    );

    if !report.is_clean() {
        for (path, err) in &report.failures {
            eprintln!("failed: {}: {}", path.display(), err);
        }
        anyhow::bail!("{} entries failed to convert", report.failures.len());
    }

    Ok(())
}
