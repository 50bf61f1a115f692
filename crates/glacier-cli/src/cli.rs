use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use glacier_store::CompressionCodec;

#[derive(Parser)]
#[command(
    name = "glacier",
    about = "Glacier: time-bucketed storage for small objects",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,

    /// TOML configuration file
    #[arg(short, long, global = true, env = "GLACIER_CONFIG")]
    pub config: Option<PathBuf>,
}

#[derive(Clone, Debug, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run the HTTP server with eviction and disk monitoring
    Serve(ServeArgs),
    /// Store a payload under an identifier
    Put(PutArgs),
    /// Write a stored payload to stdout or a file
    Get(GetArgs),
    /// Generate time-encoded identifiers
    Uuid(UuidArgs),
    /// Show the container an identifier maps to
    Resolve(ResolveArgs),
    /// List the entries of a container
    Inspect(InspectArgs),
    /// Delete the oldest containers while disk usage is above the threshold
    Evict(EvictArgs),
    /// Show disk usage and the retention window
    Status(StatusArgs),
}

/// Overrides for the `[store]` section of the configuration.
#[derive(Args, Clone, Debug, Default)]
pub struct StoreArgs {
    /// Root of the container tree
    #[arg(long, env = "DATA_FOLDER")]
    pub data_folder: Option<PathBuf>,
    /// Disk usage percentage (5-99) above which eviction starts
    #[arg(long, env = "DISK_USAGE_ALLOWED")]
    pub disk_usage_allowed: Option<String>,
    /// Honour the retention-extension byte of time-encoded identifiers
    #[arg(long, env = "EXTEND_LIFE_SUPPORT")]
    pub extend_life_support: Option<String>,
    /// Codec for compressed entries (gzip or zstd)
    #[arg(long)]
    pub codec: Option<CompressionCodec>,
}

#[derive(Args)]
pub struct ServeArgs {
    #[command(flatten)]
    pub store: StoreArgs,
    #[arg(long, env = "GLACIER_BIND")]
    pub bind: Option<SocketAddr>,
    #[arg(long, env = "READ_TOKEN", hide_env_values = true)]
    pub read_token: Option<String>,
    #[arg(long, env = "WRITE_TOKEN", hide_env_values = true)]
    pub write_token: Option<String>,
    /// Largest accepted request body in bytes
    #[arg(long)]
    pub max_upload_size: Option<usize>,
}

#[derive(Args)]
pub struct PutArgs {
    #[command(flatten)]
    pub store: StoreArgs,
    /// Identifier to store under; generated when omitted
    #[arg(long)]
    pub id: Option<String>,
    /// File to read; stdin when omitted or `-`
    pub input: Option<PathBuf>,
}

#[derive(Args)]
pub struct GetArgs {
    #[command(flatten)]
    pub store: StoreArgs,
    pub id: String,
    /// Destination file; stdout when omitted
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

#[derive(Args)]
pub struct UuidArgs {
    #[command(flatten)]
    pub store: StoreArgs,
    #[arg(short = 'n', long, default_value = "1")]
    pub count: usize,
}

#[derive(Args)]
pub struct ResolveArgs {
    #[command(flatten)]
    pub store: StoreArgs,
    pub id: String,
}

#[derive(Args)]
pub struct InspectArgs {
    #[command(flatten)]
    pub store: StoreArgs,
    /// Container path, absolute or relative to the data folder
    pub container: PathBuf,
}

#[derive(Args)]
pub struct EvictArgs {
    #[command(flatten)]
    pub store: StoreArgs,
    /// Run a single pass and exit
    #[arg(long)]
    pub once: bool,
}

#[derive(Args)]
pub struct StatusArgs {
    #[command(flatten)]
    pub store: StoreArgs,
}
