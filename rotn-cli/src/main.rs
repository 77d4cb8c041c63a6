//! `rotn` CLI tool for record encryption and key directories.

#![warn(clippy::pedantic, clippy::nursery)]

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use rotn::prelude::*;
use rotn::ROTN_NAME;
use rotn_key_file::FileKeyPolicy;
use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "rotn")]
#[command(about = "Rotation record encryptor CLI", long_about = None)]
struct Cli {
    /// Key directory (built-in key table when omitted)
    #[arg(long, global = true)]
    key_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct KeyArgs {
    /// Key identifier
    #[arg(long)]
    keyid: String,
    /// Secret for privileged key identifiers
    #[arg(long, env = "ROTN_SECRETKEY", hide_env_values = true)]
    secretkey: Option<String>,
}

#[derive(Args)]
struct IoArgs {
    /// Input file (stdin when omitted)
    #[arg(short, long)]
    input: Option<PathBuf>,
    /// Output file (stdout when omitted)
    #[arg(short, long)]
    output: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a key directory with the default key set
    Keygen {
        /// Output directory for keys
        #[arg(short, long, default_value = "./keys")]
        output: PathBuf,
    },
    /// Encrypt a record and write it hex encoded
    Encrypt {
        #[command(flatten)]
        key: KeyArgs,
        #[command(flatten)]
        io: IoArgs,
    },
    /// Decrypt a hex encoded record
    Decrypt {
        #[command(flatten)]
        key: KeyArgs,
        #[command(flatten)]
        io: IoArgs,
    },
    /// Print how many bytes encryption adds to a record
    Sizing,
    /// Check that a key identifier and secret are accepted
    Check {
        #[command(flatten)]
        key: KeyArgs,
    },
}

fn main() -> Result<()> {
    init_tracing()?;
    let cli = Cli::parse();
    run(cli)
}

fn init_tracing() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to initialise tracing subscriber: {e}"))
}

fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Keygen { output } => {
            let password = FileKeyPolicy::init(&output)
                .with_context(|| format!("failed to initialise keys in {}", output.display()))?;
            println!("Generated keys in: {}", output.display());
            println!("System password: {}", password.expose_secret());
        }
        Commands::Encrypt { key, io } => {
            let registry = registry(cli.key_dir.as_deref())?;
            let plaintext = read_input(io.input.as_deref())?;
            let record = encrypt(&registry, &key, &plaintext)?;
            let mut encoded = hex::encode(record);
            encoded.push('\n');
            write_output(io.output.as_deref(), encoded.as_bytes())?;
        }
        Commands::Decrypt { key, io } => {
            let registry = registry(cli.key_dir.as_deref())?;
            let input = read_input(io.input.as_deref())?;
            let record = hex::decode(String::from_utf8_lossy(&input).trim())
                .context("input is not a hex encoded record")?;
            let plaintext = decrypt(&registry, &key, &record)?;
            write_output(io.output.as_deref(), &plaintext)?;
        }
        Commands::Sizing => {
            println!("{}", RotNEncryptor::with_default_policy().sizing());
        }
        Commands::Check { key } => {
            let registry = registry(cli.key_dir.as_deref())?;
            println!("{}", check(&registry, &key)?);
        }
    }

    Ok(())
}

/// Builds the registry, backed by a key directory when one is given.
fn registry(key_dir: Option<&Path>) -> Result<EncryptorRegistry> {
    let Some(key_dir) = key_dir else {
        return Ok(EncryptorRegistry::with_rotn());
    };

    let policy = FileKeyPolicy::new(key_dir)
        .with_context(|| format!("failed to open key directory {}", key_dir.display()))?;
    let mut registry = EncryptorRegistry::new();
    registry.add_encryptor(ROTN_NAME, RotNEncryptor::new(policy))?;
    Ok(registry)
}

fn customize(registry: &EncryptorRegistry, key: &KeyArgs) -> Result<Box<dyn Encryptor>> {
    let mut config = EncryptionConfig::new().with_name(ROTN_NAME).with_keyid(&key.keyid);
    if let Some(secretkey) = &key.secretkey {
        config = config.with_secretkey(secretkey);
    }
    registry
        .customize(&config)
        .with_context(|| format!("key {} rejected", key.keyid))
}

fn encrypt(registry: &EncryptorRegistry, key: &KeyArgs, plaintext: &[u8]) -> Result<Vec<u8>> {
    let encryptor = customize(registry, key)?;
    let mut record = vec![0u8; plaintext.len() + encryptor.sizing()];
    let written = encryptor.encrypt(Some(plaintext), &mut record)?;
    record.truncate(written);

    let calls = encryptor.terminate();
    info!(keyid = %key.keyid, bytes = written, calls, "record encrypted");
    Ok(record)
}

fn decrypt(registry: &EncryptorRegistry, key: &KeyArgs, record: &[u8]) -> Result<Vec<u8>> {
    let encryptor = customize(registry, key)?;
    let mut plaintext = vec![0u8; record.len().saturating_sub(encryptor.sizing())];
    let read = encryptor.decrypt(Some(record), &mut plaintext)?;
    plaintext.truncate(read);

    let calls = encryptor.terminate();
    info!(keyid = %key.keyid, bytes = read, calls, "record decrypted");
    Ok(plaintext)
}

fn check(registry: &EncryptorRegistry, key: &KeyArgs) -> Result<String> {
    let encryptor = customize(registry, key)?;
    encryptor.terminate();
    Ok(format!("{}: accepted", key.keyid))
}

fn read_input(path: Option<&Path>) -> Result<Vec<u8>> {
    match path {
        Some(path) => fs::read(path).with_context(|| format!("failed to read {}", path.display())),
        None => {
            let mut buf = Vec::new();
            io::stdin().read_to_end(&mut buf).context("failed to read stdin")?;
            Ok(buf)
        }
    }
}

fn write_output(path: Option<&Path>, data: &[u8]) -> Result<()> {
    match path {
        Some(path) => {
            fs::write(path, data).with_context(|| format!("failed to write {}", path.display()))
        }
        None => {
            let mut stdout = io::stdout().lock();
            stdout.write_all(data)?;
            stdout.flush()?;
            Ok(())
        }
    }
}
