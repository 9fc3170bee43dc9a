use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use fetchlock_verify::Algorithm;
use url::Url;

pub const DEFAULT_LOCK_FILE: &str = "fetchlock.lock";

#[derive(Clone, Debug, Parser)]
#[command(name = "fetchlock", version = env!("CARGO_PKG_VERSION"), about, long_about = None, propagate_version = true)]
pub struct App {
    /// Lock file to read and write [default: ./fetchlock.lock]
    #[arg(short = 'f', long, global = true)]
    pub lock_file: Option<PathBuf>,

    /// Log filter, e.g. `debug` or `fetchlock_lock=trace`. RUST_LOG wins when set.
    #[arg(short = 'l', long, global = true, default_value = "info")]
    pub log_level: String,

    /// Total per-request timeout in seconds
    #[arg(long, global = true)]
    pub timeout: Option<u64>,

    /// Connection timeout in seconds
    #[arg(long, global = true)]
    pub connect_timeout: Option<u64>,

    /// Proxy for outgoing requests; may be repeated
    #[arg(long = "proxy", global = true)]
    pub proxies: Vec<Url>,

    #[command(subcommand)]
    pub cmd: Commands,
}

#[derive(Clone, Debug, Subcommand)]
pub enum Commands {
    /// Fetch a resource once and lock its integrity
    #[command(alias = "a")]
    Add(AddArg),
    /// Download locked resources into a directory
    #[command(alias = "dl")]
    Download(DownloadArg),
    /// Remove every resource that lists one of the URLs
    #[command(alias = "rm")]
    Delete(DeleteArg),
    /// Re-fetch a resource and lock its new integrity
    #[command(alias = "up")]
    Update(UpdateArg),
    /// Check downloaded files against the lock file without network access
    Verify(VerifyArg),
    /// Show the locked resources
    #[command(alias = "ls")]
    List,
    /// Print the version
    Version,
}

#[derive(Clone, Debug, Args)]
pub struct AddArg {
    /// Source URL followed by optional mirrors
    #[arg(required = true)]
    pub urls: Vec<String>,

    #[arg(long, default_value_t = Algorithm::RECOMMENDED)]
    pub algo: Algorithm,

    #[arg(short, long = "tag")]
    pub tags: Vec<String>,

    /// Local file name, instead of the last segment of the first URL
    #[arg(long)]
    pub filename: Option<String>,

    /// Base URL of a content-addressed cache to seed
    #[arg(long, alias = "artifactory-cache-url")]
    pub cache_url: Option<String>,

    /// The upstream content is expected to change
    #[arg(long)]
    pub dynamic: bool,
}

#[derive(Clone, Debug, Args)]
pub struct Selection {
    /// Only resources carrying every one of these tags
    #[arg(short, long = "tag")]
    pub tags: Vec<String>,

    /// Skip resources carrying any of these tags
    #[arg(long = "notag")]
    pub notags: Vec<String>,
}

#[derive(Clone, Debug, Args)]
pub struct DownloadArg {
    #[arg(short, long, default_value = ".")]
    pub dir: PathBuf,

    #[command(flatten)]
    pub selection: Selection,

    /// Octal permission for placed files, e.g. 644
    #[arg(long, default_value = "")]
    pub perm: String,

    /// Maximum number of resources in flight
    #[arg(short, long)]
    pub jobs: Option<usize>,

    /// Replace local files whose content does not match instead of failing
    #[arg(long)]
    pub replace_corrupt: bool,

    /// Show a progress bar
    #[arg(short = 'v', long, alias = "verbose")]
    pub status: bool,
}

#[derive(Clone, Debug, Args)]
pub struct DeleteArg {
    #[arg(required = true)]
    pub urls: Vec<String>,
}

#[derive(Clone, Debug, Args)]
pub struct UpdateArg {
    pub url: String,
}

#[derive(Clone, Debug, Args)]
pub struct VerifyArg {
    #[arg(short, long, default_value = ".")]
    pub dir: PathBuf,

    #[command(flatten)]
    pub selection: Selection,
}
