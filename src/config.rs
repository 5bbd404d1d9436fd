//! CLI arguments and server configuration defaults.

use clap::Parser;

pub const DEFAULT_AUTH_USER: &str = "drop";
pub const DEFAULT_AUTH_PASS: &str = "drop";
pub const DEFAULT_UPLOAD_MAX_SIZE: u64 = 50 * 1024 * 1024;
pub const DEFAULT_TOKEN_TTL_SECS: u64 = 12 * 60 * 60;
pub const TOKEN_PRUNE_INTERVAL_SECS: u64 = 300;
/// Capacity of the in-process pipe between the zip writer and the HTTP
/// response; a full pipe backpressures the writer.
pub const ZIP_PIPE_BUFFER: usize = 64 * 1024;

/// CLI arguments and environment configuration for the server.
#[derive(Parser, Debug)]
#[command(name = "dropbay", version, about = "DropBay file-drop server")]
pub struct Args {
    #[arg(
        short = 's',
        long,
        env = "DROPBAY_STORAGE_DIR",
        default_value = "uploads",
        help = "Storage directory for files"
    )]
    pub storage_dir: String,
    #[arg(
        short = 'b',
        long,
        env = "DROPBAY_BIND",
        default_value = "0.0.0.0",
        help = "Bind address"
    )]
    pub host: String,
    #[arg(
        short = 'p',
        long,
        env = "DROPBAY_PORT",
        default_value_t = 5007,
        help = "HTTP port"
    )]
    pub port: u16,
    #[arg(
        long,
        env = "DROPBAY_AUTH_USER",
        default_value = DEFAULT_AUTH_USER,
        help = "Auth username for the API"
    )]
    pub auth_user: String,
    #[arg(
        long,
        env = "DROPBAY_AUTH_PASS",
        default_value = DEFAULT_AUTH_PASS,
        help = "Auth password for the API"
    )]
    pub auth_pass: String,
    #[arg(
        long,
        env = "DROPBAY_UPLOAD_MAX_SIZE",
        default_value_t = DEFAULT_UPLOAD_MAX_SIZE,
        help = "Max upload size in bytes (0 to disable)"
    )]
    pub upload_max_size: u64,
    #[arg(
        long,
        env = "DROPBAY_TOKEN_TTL_SECS",
        default_value_t = DEFAULT_TOKEN_TTL_SECS,
        help = "Bearer token expiration in seconds"
    )]
    pub token_ttl_secs: u64,
    #[arg(
        long,
        env = "DROPBAY_CORS_ORIGINS",
        help = "Comma separated CORS origins"
    )]
    pub cors_origins: Option<String>,
}
