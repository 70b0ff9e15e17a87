use std::net::{IpAddr, SocketAddr};

use clap::Args;

use attachments_core::form::DEFAULT_MAX_UPLOAD_BYTES;
use attachments_core::UploadLimits;
use attachments_db::DbConfig;
use attachments_store::StoreConfig;

/// Server settings, read from flags or `ATTACHMENTS_*` env vars.
#[derive(Debug, Clone, Args)]
pub struct ServerConfig {
    /// Address to bind
    #[arg(long, env = "ATTACHMENTS_BIND", default_value = "0.0.0.0")]
    pub bind: IpAddr,

    /// Port to listen on
    #[arg(long, env = "ATTACHMENTS_PORT", default_value = "3720")]
    pub port: u16,

    /// SQLite database path (default: <data dir>/attachments.db)
    #[arg(long, env = "ATTACHMENTS_DB_PATH")]
    pub db_path: Option<String>,

    /// Base directory for stored files (default: the shared data dir)
    #[arg(long, env = "ATTACHMENTS_DATA_DIR")]
    pub data_dir: Option<String>,

    /// Superuser API key. Enables authentication when set.
    #[arg(long, env = "ATTACHMENTS_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Largest accepted upload, in bytes
    #[arg(long, env = "ATTACHMENTS_MAX_UPLOAD_BYTES", default_value_t = DEFAULT_MAX_UPLOAD_BYTES)]
    pub max_upload_bytes: usize,
}

impl ServerConfig {
    pub fn addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind, self.port)
    }

    pub fn db_config(&self) -> DbConfig {
        DbConfig {
            sqlite_path: self.db_path.clone(),
        }
    }

    pub fn store_config(&self) -> StoreConfig {
        StoreConfig {
            local_data_dir: self.data_dir.clone(),
        }
    }

    pub fn upload_limits(&self) -> UploadLimits {
        UploadLimits {
            max_upload_bytes: self.max_upload_bytes,
        }
    }
}
