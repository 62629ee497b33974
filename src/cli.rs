use clap::Parser;
use std::path::PathBuf;

#[derive(Debug, Clone, Default, Parser)]
#[command(
    name = "transterm",
    version,
    about = "Browse TransIP products from the terminal."
)]
pub struct CliArgs {
    /// Account name used to sign authentication requests
    #[arg(short, long, env = "TRANSIP_ACCOUNT")]
    pub account: Option<String>,

    /// Private key belonging to the account (PEM)
    #[arg(short = 'k', long)]
    pub private_key: Option<PathBuf>,

    /// Pre-issued access token, skips key based authentication
    #[arg(long, env = "TRANSIP_ACCESS_TOKEN", hide_env_values = true)]
    pub access_token: Option<String>,

    /// File used to cache access tokens between runs
    #[arg(long)]
    pub token_cache: Option<PathBuf>,

    /// Talk to the API without the test flag
    #[arg(long)]
    pub live: bool,

    /// API base URL
    #[arg(long)]
    pub endpoint: Option<String>,

    /// Config file (defaults to transterm.yaml or ~/.config/transterm/config.yaml)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Log file
    #[arg(long)]
    pub log_file: Option<PathBuf>,

    /// tracing filter (for example: info,debug,trace)
    #[arg(long)]
    pub log_filter: Option<String>,

    /// Serve request statistics on this address (for example: localhost:6060)
    #[arg(long)]
    pub debug_addr: Option<String>,
}
