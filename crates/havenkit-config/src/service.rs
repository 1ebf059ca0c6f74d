use std::path::{Path, PathBuf};

use serde_derive::{Deserialize, Serialize};
use thiserror::Error;
use tokio::fs;
use tracing::debug;

// Well-known file names inside the config directory (shared volume with the
// relay container)
pub const ENV_FILE_NAME: &str = ".env";
pub const RELAYS_BLASTR_FILE: &str = "relays_blastr.json";
pub const RELAYS_IMPORT_FILE: &str = "relays_import.json";

/// Default `.env` written when the config directory is empty, so a fresh
/// install has something to edit in the browser.
const DEFAULT_ENV: &str = r#"# Owner Configuration (REQUIRED)
# Your Nostr public key (npub format)
# Get this from your Nostr client or generate one at https://nostr.how
OWNER_NPUB=npub1YOUR_PUBLIC_KEY_HERE

# Relay URL (REQUIRED)
# The public WebSocket URL where your relay can be accessed
# For local testing: ws://localhost:3355
# For production: wss://your-domain.com
RELAY_URL=ws://localhost:3355

# Database Configuration
DB_ENGINE=badger
# LMDB_MAPSIZE=273000000000

# Backup Configuration
BACKUP_PROVIDER=none
# BACKUP_INTERVAL_HOURS=24

# S3 Cloud Backup (optional)
# S3_ACCESS_KEY_ID=
# S3_SECRET_KEY=
# S3_ENDPOINT=
# S3_REGION=
# S3_BUCKET_NAME=

# Media Storage Path
BLOSSOM_PATH=/haven/blossom
"#;

#[derive(Error, Debug)]
pub enum ConfigServiceError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid JSON in {file}: {details}")]
    InvalidJson { file: String, details: String },

    #[error("Invalid relay list kind: {0}")]
    InvalidRelayKind(String),
}

/// Result type alias for configuration operations
pub type ConfigServiceResult<T> = Result<T, ConfigServiceError>;

/// Server-level configuration resolved once at startup and shared `Arc`-wrapped
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Address the console binds to
    pub address: String,
    /// Directory holding the relay's configuration files (shared volume)
    pub config_dir: PathBuf,
    /// Base data directory providing the `config/`, `blossom/` and `db/`
    /// subdirectories mounted into the import container
    pub data_dir: PathBuf,
    /// Name of the relay container under administration
    pub relay_container: String,
    /// Explicit image for the import container; introspected from the relay
    /// when unset
    pub import_image: Option<String>,
    /// Explicit network for the import container; introspected from the relay
    /// when unset
    pub import_network: Option<String>,
}

impl ServerConfig {
    pub fn new(
        address: String,
        config_dir: PathBuf,
        data_dir: PathBuf,
        relay_container: String,
        import_image: Option<String>,
        import_network: Option<String>,
    ) -> anyhow::Result<Self> {
        // The data dir is handed to the container runtime as a bind mount
        // source, which requires an absolute path
        let data_dir = if data_dir.is_absolute() {
            data_dir
        } else {
            std::env::current_dir()?.join(data_dir)
        };

        Ok(Self {
            address,
            config_dir,
            data_dir,
            relay_container,
            import_image,
            import_network,
        })
    }
}

/// The relay-list files managed by the console
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayListKind {
    Blastr,
    Import,
}

impl RelayListKind {
    pub fn parse(value: &str) -> ConfigServiceResult<Self> {
        match value {
            "blastr" => Ok(RelayListKind::Blastr),
            "import" => Ok(RelayListKind::Import),
            other => Err(ConfigServiceError::InvalidRelayKind(other.to_string())),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RelayListKind::Blastr => "blastr",
            RelayListKind::Import => "import",
        }
    }

    pub fn file_name(&self) -> &'static str {
        match self {
            RelayListKind::Blastr => RELAYS_BLASTR_FILE,
            RelayListKind::Import => RELAYS_IMPORT_FILE,
        }
    }
}

/// Service that provides access to the relay's configuration files
///
/// All files live in a single directory shared with the relay container;
/// the console reads and writes them in place.
pub struct ConfigService {
    config_dir: PathBuf,
}

impl ConfigService {
    pub fn new(config_dir: PathBuf) -> Self {
        Self { config_dir }
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    pub fn env_file_path(&self) -> PathBuf {
        self.config_dir.join(ENV_FILE_NAME)
    }

    fn relay_file_path(&self, kind: RelayListKind) -> PathBuf {
        self.config_dir.join(kind.file_name())
    }

    /// Create default config files if they don't exist
    pub async fn ensure_config_files(&self) -> ConfigServiceResult<()> {
        fs::create_dir_all(&self.config_dir).await?;

        let env_path = self.env_file_path();
        if fs::metadata(&env_path).await.is_err() {
            debug!("Writing default .env to {}", env_path.display());
            fs::write(&env_path, DEFAULT_ENV).await?;
        }

        for kind in [RelayListKind::Blastr, RelayListKind::Import] {
            let path = self.relay_file_path(kind);
            if fs::metadata(&path).await.is_err() {
                fs::write(&path, "[]").await?;
            }
        }

        Ok(())
    }

    /// Read the raw `.env` contents
    pub async fn read_env(&self) -> ConfigServiceResult<String> {
        self.ensure_config_files().await?;
        Ok(fs::read_to_string(self.env_file_path()).await?)
    }

    /// Overwrite the `.env` file with the given contents
    pub async fn write_env(&self, content: &str) -> ConfigServiceResult<()> {
        fs::create_dir_all(&self.config_dir).await?;
        fs::write(self.env_file_path(), content).await?;
        Ok(())
    }

    /// Read a relay list file as a JSON array of relay URLs
    pub async fn read_relays(&self, kind: RelayListKind) -> ConfigServiceResult<Vec<String>> {
        self.ensure_config_files().await?;
        let path = self.relay_file_path(kind);
        let content = fs::read_to_string(&path).await?;
        serde_json::from_str(&content).map_err(|e| ConfigServiceError::InvalidJson {
            file: kind.file_name().to_string(),
            details: e.to_string(),
        })
    }

    /// Overwrite a relay list file, pretty-printed
    pub async fn write_relays(
        &self,
        kind: RelayListKind,
        relays: &[String],
    ) -> ConfigServiceResult<()> {
        fs::create_dir_all(&self.config_dir).await?;
        let content = serde_json::to_string_pretty(relays).map_err(|e| {
            ConfigServiceError::InvalidJson {
                file: kind.file_name().to_string(),
                details: e.to_string(),
            }
        })?;
        fs::write(self.relay_file_path(kind), content).await?;
        Ok(())
    }

    /// Parse the `.env` file into `KEY=VALUE` pairs for the import container
    ///
    /// Blank lines and `#` comments are skipped; each remaining line splits
    /// on the first `=`; a single layer of surrounding single or double
    /// quotes is stripped from the value.
    pub async fn env_pairs(&self) -> ConfigServiceResult<Vec<(String, String)>> {
        let content = self.read_env().await?;
        Ok(parse_env_pairs(&content))
    }

    /// The configured `IMPORT_START_DATE`, if any
    pub async fn import_start_date(&self) -> ConfigServiceResult<Option<String>> {
        let content = self.read_env().await?;
        for line in content.lines() {
            let line = line.trim();
            if let Some(value) = line.strip_prefix("IMPORT_START_DATE=") {
                return Ok(Some(value.trim().to_string()));
            }
        }
        Ok(None)
    }
}

fn strip_quotes(value: &str) -> &str {
    for quote in ['"', '\''] {
        if value.len() >= 2 && value.starts_with(quote) && value.ends_with(quote) {
            return &value[1..value.len() - 1];
        }
    }
    value
}

fn parse_env_pairs(content: &str) -> Vec<(String, String)> {
    let mut pairs = Vec::new();
    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        pairs.push((key.to_string(), strip_quotes(value).to_string()));
    }
    pairs
}
