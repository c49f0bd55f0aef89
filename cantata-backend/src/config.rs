use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand};
use url::Url;

#[derive(Args, serde::Deserialize, Clone)]
pub struct Config {
    #[arg(long, default_value_t)]
    #[serde(default)]
    dev: bool,
    #[arg(long, env = "CANTATA_HOST", default_value_t = String::from("localhost"))]
    host: String,
    #[arg(long, env = "CANTATA_PORT", default_value_t = 8080)]
    port: u16,
    /// Base URL of the object-storage service consulted before publication.
    /// When absent, an in-memory stand-in is used instead.
    #[arg(long, env = "CANTATA_STORAGE_URL")]
    #[serde(default)]
    storage_url: Option<Url>,
    #[arg(long, env = "CANTATA_STORAGE_TOKEN")]
    #[serde(default)]
    storage_token: Option<String>,
    /// Overrides the clock-derived identifier seed. Only useful for
    /// reproducing identifier sequences.
    #[arg(long, env = "CANTATA_ID_SEED")]
    #[serde(default)]
    id_seed: Option<u64>,
}

impl Config {
    #[must_use]
    pub fn dev(host: String, port: u16) -> Self {
        Self {
            dev: true,
            host,
            port,
            storage_url: None,
            storage_token: None,
            id_seed: None,
        }
    }

    #[must_use]
    pub fn is_dev(&self) -> bool {
        self.dev
    }

    #[must_use]
    pub fn app_address(&self) -> String {
        let Self { host, port, .. } = self;

        format!("{host}:{port}")
    }

    #[must_use]
    pub fn storage_url(&self) -> Option<&Url> {
        self.storage_url.as_ref()
    }

    #[must_use]
    pub fn storage_token(&self) -> Option<&str> {
        self.storage_token.as_deref()
    }

    #[must_use]
    pub fn id_seed(&self) -> Option<u64> {
        self.id_seed
    }
}

#[derive(Parser)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Serve with an in-memory object store and pretty console logs.
    Dev {
        #[arg(long, default_value_t = String::from("localhost"))]
        host: String,
        #[arg(long, default_value_t = 8080)]
        port: u16,
    },
    /// Serve against a real object store, logging to rolling files.
    Prod {
        #[command(flatten)]
        config: Config,
        #[arg(long, env = "CANTATA_LOG_DIR")]
        log_dir: Utf8PathBuf,
    },
}
