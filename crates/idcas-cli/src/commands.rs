use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use colored::Colorize;
use serde_json::json;

use idcas_crypto::{SerializerRegistry, SigningKey};
use idcas_session::{
    Credentials, FileSessionStore, IdentityTrackingView, LoginStateMachine, SignatureAuthenticator,
};
use idcas_store::{ContentStore, FileBackend};
use idcas_types::{ContentAddress, PublicKey, UserTrackingInfo};

use crate::cli::*;
use crate::config::AppConfig;

pub async fn run_command(cli: Cli) -> anyhow::Result<()> {
    let config = AppConfig::load(cli.config.as_deref())?;
    let format = cli.format;
    match cli.command {
        Command::Hash(args) => cmd_hash(&config, format, args),
        Command::Put(args) => cmd_put(&config, format, args).await,
        Command::Get(args) => cmd_get(&config, args).await,
        Command::Exists(args) => cmd_exists(&config, format, args).await,
        Command::Track(args) => cmd_track(&config, format, args).await,
        Command::Stats => cmd_stats(&config, format).await,
        Command::Keygen => cmd_keygen(format),
        Command::Sign(args) => cmd_sign(format, args),
        Command::Login(args) => cmd_login(&config, format, args).await,
    }
}

async fn open_store(config: &AppConfig) -> anyhow::Result<ContentStore<FileBackend>> {
    config
        .store
        .open_file_store(SerializerRegistry::new())
        .await
        .with_context(|| format!("failed to open store at {}", config.store.root.display()))
}

fn parse_address(text: &str) -> anyhow::Result<ContentAddress> {
    ContentAddress::parse(text).with_context(|| format!("invalid address {text:?}"))
}

fn print_json(value: &serde_json::Value) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn cmd_hash(config: &AppConfig, format: OutputFormat, args: HashArgs) -> anyhow::Result<()> {
    let bytes = match (args.text, args.file) {
        (Some(text), _) => text.into_bytes(),
        (None, Some(file)) => {
            std::fs::read(&file).with_context(|| format!("failed to read {}", file.display()))?
        }
        (None, None) => anyhow::bail!("nothing to hash: pass FILE or --text"),
    };
    let hasher = config.store.hash_service(SerializerRegistry::new());
    let address = hasher.hash_bytes(&bytes)?;
    match format {
        OutputFormat::Json => print_json(&json!({
            "address": address,
            "algorithm": hasher.algorithm_name(),
            "size": bytes.len(),
        })),
        OutputFormat::Text => {
            println!("{address}");
            Ok(())
        }
    }
}

async fn cmd_put(config: &AppConfig, format: OutputFormat, args: PutArgs) -> anyhow::Result<()> {
    let bytes = tokio::fs::read(&args.file)
        .await
        .with_context(|| format!("failed to read {}", args.file.display()))?;
    let owner = args
        .owner
        .as_deref()
        .map(PublicKey::from_base64)
        .transpose()
        .context("invalid --owner key")?;

    let store = open_store(config).await?;
    let address = match &owner {
        Some(owner) => store.put_owned(&bytes, owner).await?,
        None => store.put(&bytes).await?,
    };

    match format {
        OutputFormat::Json => print_json(&json!({
            "address": address,
            "size": bytes.len(),
            "owner": owner.map(|k| k.to_base64()),
        })),
        OutputFormat::Text => {
            println!("{} Stored {}", "✓".green().bold(), address.to_string().yellow());
            if let Some(owner) = owner {
                println!("  Owner: {}", owner.to_base64().cyan());
            }
            Ok(())
        }
    }
}

async fn cmd_get(config: &AppConfig, args: GetArgs) -> anyhow::Result<()> {
    let address = parse_address(&args.address)?;
    let store = open_store(config).await?;
    let bytes = store.get(&address).await?;
    match args.output {
        Some(path) => write_output(&path, &bytes).await,
        None => {
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(&bytes)?;
            stdout.flush()?;
            Ok(())
        }
    }
}

async fn write_output(path: &Path, bytes: &[u8]) -> anyhow::Result<()> {
    tokio::fs::write(path, bytes)
        .await
        .with_context(|| format!("failed to write {}", path.display()))
}

async fn cmd_exists(config: &AppConfig, format: OutputFormat, args: ExistsArgs) -> anyhow::Result<()> {
    let address = parse_address(&args.address)?;
    let store = open_store(config).await?;
    let exists = store.exists(&address).await?;
    match format {
        OutputFormat::Json => print_json(&json!({ "address": address, "exists": exists })),
        OutputFormat::Text => {
            if exists {
                println!("{} {}", "✓".green().bold(), address);
            } else {
                println!("{} {} not stored", "✗".red().bold(), address);
            }
            Ok(())
        }
    }
}

async fn cmd_track(config: &AppConfig, format: OutputFormat, args: TrackArgs) -> anyhow::Result<()> {
    let store = Arc::new(open_store(config).await?);
    let info = IdentityTrackingView::new(store).track(&args.key).await?;
    match format {
        OutputFormat::Json => print_json(&serde_json::to_value(&info)?),
        OutputFormat::Text => {
            print_tracking(&info);
            Ok(())
        }
    }
}

fn print_tracking(info: &UserTrackingInfo) {
    println!("Key: {}", info.public_key_base64.cyan());
    if !info.exists {
        println!("  {}", "never seen".yellow());
        return;
    }
    println!("  Content: {}", info.content_count.to_string().bold());
    if let (Some(first), Some(last)) = (info.first_seen, info.last_seen) {
        println!("  First seen: {}", first.to_rfc3339());
        println!("  Last seen:  {}", last.to_rfc3339());
    }
}

async fn cmd_stats(config: &AppConfig, format: OutputFormat) -> anyhow::Result<()> {
    let store = open_store(config).await?;
    let stats = store.stats().await?;
    match format {
        OutputFormat::Json => print_json(&json!({
            "algorithm": store.algorithm(),
            "objects": stats.object_count,
            "bytes": stats.total_bytes,
            "owners": stats.owner_count,
        })),
        OutputFormat::Text => {
            println!("Store: {}", config.store.root.display().to_string().bold());
            println!("  Algorithm: {}", store.algorithm().cyan());
            println!("  Objects: {}", stats.object_count);
            println!("  Bytes: {}", stats.total_bytes);
            println!("  Owners: {}", stats.owner_count);
            Ok(())
        }
    }
}

fn cmd_keygen(format: OutputFormat) -> anyhow::Result<()> {
    let key = SigningKey::generate();
    let public = key.public_key().to_base64();
    match format {
        OutputFormat::Json => print_json(&json!({
            "secret": key.to_base64(),
            "public": public,
        })),
        OutputFormat::Text => {
            println!("Secret: {}", key.to_base64().red());
            println!("Public: {}", public.cyan());
            Ok(())
        }
    }
}

fn cmd_sign(format: OutputFormat, args: SignArgs) -> anyhow::Result<()> {
    let key = SigningKey::from_base64(&args.secret).context("invalid --secret")?;
    let signature = key.sign(args.challenge.as_bytes()).to_base64();
    match format {
        OutputFormat::Json => print_json(&json!({
            "public": key.public_key().to_base64(),
            "challenge": args.challenge,
            "signature": signature,
        })),
        OutputFormat::Text => {
            println!("{signature}");
            Ok(())
        }
    }
}

async fn cmd_login(config: &AppConfig, format: OutputFormat, args: LoginArgs) -> anyhow::Result<()> {
    let key = SigningKey::from_base64(&args.secret).context("invalid --secret")?;
    let store = Arc::new(open_store(config).await?);

    let mut machine = LoginStateMachine::new(
        Arc::new(SignatureAuthenticator),
        IdentityTrackingView::new(store),
        &config.session,
    );
    if let Some(path) = &config.session.session_file {
        machine = machine.with_persistence(Arc::new(FileSessionStore::new(path)));
    }

    let challenge = uuid::Uuid::now_v7().to_string();
    let credentials = Credentials::sign(&key, args.username, challenge);
    let result = machine.login(&credentials).await?;

    match format {
        OutputFormat::Json => print_json(&serde_json::to_value(&result)?)?,
        OutputFormat::Text => {
            if result.success() {
                let kind = if result.is_new_user() { "new user" } else { "returning user" };
                println!("{} Logged in ({})", "✓".green().bold(), kind.yellow());
                if let Some(session) = result.session() {
                    if let Some(name) = &session.username {
                        println!("  Username: {}", name.bold());
                    }
                    if let Some(key) = &session.public_key_base64 {
                        println!("  Key: {}", key.cyan());
                    }
                }
                if let Some(info) = result.user_info() {
                    println!("  Content: {}", info.content_count);
                }
            } else {
                println!(
                    "{} Login failed: {}",
                    "✗".red().bold(),
                    result.error_message().unwrap_or("unknown error")
                );
            }
        }
    }

    if !result.success() {
        anyhow::bail!("login rejected");
    }
    Ok(())
}
