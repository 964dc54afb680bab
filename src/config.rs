//! Runtime settings
//!
//! Every flag can also be set through the environment, so the server runs
//! unchanged from a shell, a container, or a `.env`-driven process manager.

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;

use crate::state::library::Library;

pub const APP_NAME: &str = "Mirai Puzzle API";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

const DEFAULT_MAX_IMAGE_SIZE: usize = 10 * 1024 * 1024;

#[derive(Debug, Clone, Parser)]
#[command(name = "mirai-puzzle-api", version, about = "Image converter and puzzle level store")]
pub struct Settings {
    /// Interface to bind
    #[arg(long, env = "APP_HOST", default_value = "0.0.0.0")]
    pub host: String,

    #[arg(long, env = "APP_PORT", default_value_t = 8000)]
    pub port: u16,

    /// SQLite database file (defaults to the user data directory)
    #[arg(long, env = "DATABASE_PATH")]
    pub database_path: Option<PathBuf>,

    /// Largest accepted upload, in bytes
    #[arg(long, env = "MAX_IMAGE_SIZE", default_value_t = DEFAULT_MAX_IMAGE_SIZE)]
    pub max_image_size: usize,

    #[arg(long, env = "DEFAULT_COLS", default_value_t = 30)]
    pub default_cols: u32,

    #[arg(long, env = "DEFAULT_ROWS", default_value_t = 30)]
    pub default_rows: u32,

    /// Upper bound for `cols` and `rows` on conversion requests
    #[arg(long, env = "MAX_GRID_DIM", default_value_t = 500)]
    pub max_grid_dim: u32,

    /// Allowed CORS origins, comma separated; `*` allows any
    #[arg(long, env = "CORS_ORIGINS", value_delimiter = ',', default_value = "*")]
    pub cors_origins: Vec<String>,

    /// Emit logs as JSON lines
    #[arg(long, env = "LOG_JSON")]
    pub log_json: bool,
}

impl Settings {
    pub fn bind_addr(&self) -> Result<SocketAddr, std::net::AddrParseError> {
        format!("{}:{}", self.host, self.port).parse()
    }

    pub fn database_path(&self) -> PathBuf {
        self.database_path
            .clone()
            .unwrap_or_else(Library::default_db_path)
    }

    /// True when any origin may call the API
    pub fn cors_allows_any(&self) -> bool {
        self.cors_origins.is_empty() || self.cors_origins.iter().any(|o| o.trim() == "*")
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            database_path: None,
            max_image_size: DEFAULT_MAX_IMAGE_SIZE,
            default_cols: 30,
            default_rows: 30,
            max_grid_dim: 500,
            cors_origins: vec!["*".to_string()],
            log_json: false,
        }
    }
}
