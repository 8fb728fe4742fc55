use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "idcas",
    about = "IDCAS: content-addressable identity store",
    version,
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Configuration file (defaults to ./idcas.toml when present)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Print the content address of a file or text
    Hash(HashArgs),
    /// Store a file and print its address
    Put(PutArgs),
    /// Read content back by address
    Get(GetArgs),
    /// Check whether an address is stored
    Exists(ExistsArgs),
    /// Show identity-tracking facts for a public key
    Track(TrackArgs),
    /// Show store statistics
    Stats,
    /// Generate a new Ed25519 key pair
    Keygen,
    /// Sign a challenge with a secret key
    Sign(SignArgs),
    /// Log in with a secret key against the store
    Login(LoginArgs),
}

#[derive(Args)]
pub struct HashArgs {
    /// File to hash
    #[arg(required_unless_present = "text", conflicts_with = "text")]
    pub file: Option<PathBuf>,
    /// Hash this text instead of a file
    #[arg(long)]
    pub text: Option<String>,
}

#[derive(Args)]
pub struct PutArgs {
    pub file: PathBuf,
    /// Link the content to this public key (base64)
    #[arg(long)]
    pub owner: Option<String>,
}

#[derive(Args)]
pub struct GetArgs {
    pub address: String,
    /// Write the content here instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

#[derive(Args)]
pub struct ExistsArgs {
    pub address: String,
}

#[derive(Args)]
pub struct TrackArgs {
    /// Public key (base64, standard or URL-safe)
    pub key: String,
}

#[derive(Args)]
pub struct SignArgs {
    /// Secret key (base64)
    #[arg(long)]
    pub secret: String,
    #[arg(long)]
    pub challenge: String,
}

#[derive(Args)]
pub struct LoginArgs {
    /// Secret key (base64)
    #[arg(long)]
    pub secret: String,
    #[arg(short, long)]
    pub username: Option<String>,
}
