use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Define CLI arguments
#[derive(Parser)]
#[command(
    version,
    about = "Offline portal item provisioning tool",
    long_about = "Downloads portal items into a local cache and keeps them fresh.\n\
                  \n\
                  Items are addressed by their portal id. A cached item is reused\n\
                  until the remote copy changes; zip payloads are expanded in place\n\
                  next to the downloaded archive."
)]
pub struct CliArgs {
    /// Root of the portal's sharing REST API
    #[arg(
        long,
        default_value = "https://www.arcgis.com/sharing/rest",
        help = "Portal sharing REST endpoint, e.g. \"https://portal.example.com/sharing/rest\""
    )]
    pub portal: String,

    /// Cache directory override
    #[arg(
        long,
        help = "Directory for cached items (default: the per-user app data directory)"
    )]
    pub cache_dir: Option<PathBuf>,

    /// Bearer token for authenticated portal access
    #[arg(long, help = "Access token sent as a bearer credential with each request")]
    pub token: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, help = "Enable detailed debug logging")]
    pub verbose: bool,

    /// Log file path
    #[arg(long, help = "Also write logs to this file")]
    pub log_file: Option<PathBuf>,

    /// Overall timeout in seconds
    #[arg(
        long,
        default_value = "3600",
        help = "Overall timeout in seconds for HTTP requests. Use 0 for unlimited."
    )]
    pub timeout: u64,

    /// Connection timeout in seconds
    #[arg(
        long,
        default_value = "10",
        help = "Connection timeout in seconds (time to establish initial connection)"
    )]
    pub connect_timeout: u64,

    /// Read timeout in seconds
    #[arg(
        long,
        default_value = "30",
        help = "Read timeout in seconds (maximum time between receiving data chunks)"
    )]
    pub read_timeout: u64,

    /// Proxy URL (e.g., "http://proxy.example.com:8080")
    #[arg(
        long,
        help = "Proxy server URL for downloads (e.g., \"http://proxy.example.com:8080\")"
    )]
    pub proxy: Option<String>,

    /// Proxy type (http, https, socks5)
    #[arg(
        long,
        default_value = "http",
        help = "Proxy type (http, https, socks5)",
        value_parser = ["http", "https", "socks5"]
    )]
    pub proxy_type: String,

    /// Proxy username
    #[arg(long, help = "Username for proxy authentication")]
    pub proxy_user: Option<String>,

    /// Proxy password
    #[arg(long, help = "Password for proxy authentication")]
    pub proxy_pass: Option<String>,

    /// Use system proxy settings for downloads
    #[arg(
        long,
        default_value = "true",
        help = "Use system proxy settings for downloads if no explicit proxy is configured"
    )]
    pub use_system_proxy: bool,

    /// Disable all proxy settings for downloads
    #[arg(
        long,
        help = "Disable all proxy settings (including system proxy) for downloads"
    )]
    pub no_proxy: bool,

    /// Custom HTTP headers for download requests
    #[arg(
        long = "header",
        short = 'H',
        help = "Add custom HTTP header to requests (can be used multiple times). Format: 'Name: Value'",
        value_name = "HEADER"
    )]
    pub headers: Vec<String>,

    /// Show progress bars for downloads
    #[arg(
        short = 'P',
        long = "progress",
        default_value = "true",
        help = "Show progress bars for item downloads"
    )]
    pub show_progress: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Ensure items are cached locally, downloading what is missing or stale
    Fetch {
        /// Portal item id(s) to provision
        #[arg(required = true, help = "One or more portal item ids")]
        items: Vec<String>,
    },

    /// Report the cache freshness of items without downloading anything
    Status {
        /// Portal item id(s) to inspect
        #[arg(required = true, help = "One or more portal item ids")]
        items: Vec<String>,
    },

    /// Print the local path of a cached item (or a file inside it)
    Path {
        /// Portal item id
        item: String,

        /// Optional path components inside the item directory
        #[arg(help = "Path components under the item's cache directory")]
        parts: Vec<String>,
    },
}
