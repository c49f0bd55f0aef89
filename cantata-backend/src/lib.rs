use camino::Utf8PathBuf;

pub mod config;
pub mod db;
pub mod id;
pub mod model;
pub mod server;
pub mod service;

use config::Config;

/// # Errors
pub async fn serve_dev_app(host: String, port: u16) -> anyhow::Result<()> {
    server::serve(Config::dev(host, port), None).await
}

/// # Errors
pub async fn serve_prod_app(config: Config, log_dir: Option<Utf8PathBuf>) -> anyhow::Result<()> {
    server::serve(config, log_dir).await
}
