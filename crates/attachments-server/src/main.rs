use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::net::TcpListener;
use tracing::info;

use attachments_core::Capability;
use attachments_db::{Database, SqliteDatabase};
use attachments_server::auth;
use attachments_server::config::ServerConfig;
use attachments_service::AttachmentService;

#[derive(Parser)]
#[command(name = "attachments-server", about = "File attachment service")]
struct Cli {
    #[command(flatten)]
    config: ServerConfig,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a new API key
    Keygen {
        /// Username the key authenticates as
        #[arg(long)]
        name: String,
        /// Capability to grant (repeatable). Defaults to add_attachment and
        /// delete_attachment.
        #[arg(long = "capability", short = 'c')]
        capabilities: Vec<Capability>,
    },
    /// List all API keys (metadata only, no secrets)
    ListKeys,
    /// Revoke (delete) an API key by ID
    RevokeKey {
        /// The API key ID to revoke
        id: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = cli.config;
    let db = Arc::new(SqliteDatabase::open(&config.db_config())?);

    match cli.command {
        Some(Commands::Keygen { name, capabilities }) => {
            let capabilities = if capabilities.is_empty() {
                vec![Capability::AddAttachment, Capability::DeleteAttachment]
            } else {
                capabilities
            };
            let raw_key = auth::generate_api_key();
            let hash = auth::sha256_hex(&raw_key);
            let api_key = db.insert_api_key(&name, &hash, &capabilities).await?;
            eprintln!("Created API key (id: {})", api_key.id);
            eprintln!("  name: {name}");
            let caps: Vec<&str> = capabilities.iter().map(|c| c.as_str()).collect();
            eprintln!("  capabilities: {}", caps.join(", "));
            // Print the raw key to stdout so it can be captured
            println!("{raw_key}");
            eprintln!("\nSave this key, it cannot be retrieved again.");
        }
        Some(Commands::ListKeys) => {
            let keys = db.list_api_keys().await?;
            if keys.is_empty() {
                eprintln!("No API keys found.");
            } else {
                println!(
                    "{:<38} {:<20} {:<28} {:<28} CAPABILITIES",
                    "ID", "NAME", "CREATED", "LAST USED"
                );
                for key in keys {
                    let caps: Vec<&str> = key.capabilities.iter().map(|c| c.as_str()).collect();
                    println!(
                        "{:<38} {:<20} {:<28} {:<28} {}",
                        key.id,
                        key.name,
                        key.created_at,
                        key.last_used_at.as_deref().unwrap_or("never"),
                        caps.join(","),
                    );
                }
            }
        }
        Some(Commands::RevokeKey { id }) => {
            db.delete_api_key(&id).await?;
            eprintln!("Revoked API key {id}");
        }
        None => {
            let addr = config.addr();
            let store = attachments_store::create_store(&config.store_config())?;
            let service =
                AttachmentService::new(db.clone(), store).with_limits(config.upload_limits());

            let auth = auth::build_auth_config_with_key(db, config.api_key.as_deref())
                .await
                .context("checking for API keys")?;
            if auth.is_some() {
                info!("authentication enabled");
            } else {
                info!(
                    user = auth::LOCAL_USER,
                    "authentication disabled (no ATTACHMENTS_API_KEY or DB keys), requests run as superuser"
                );
            }

            let listener = TcpListener::bind(addr).await?;
            info!("attachments-server listening on http://{addr}");

            attachments_server::serve(listener, service, auth).await?;
        }
    }

    Ok(())
}
