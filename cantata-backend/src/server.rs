use std::sync::Arc;

use anyhow::Context;
use axum::{Router, routing::get};
use camino::Utf8PathBuf;
use tokio::{net::TcpListener, signal};
use tower_http::trace::TraceLayer;

use crate::{
    config::Config,
    db::Metastore,
    id::IdGenerator,
    service::{
        analysis::AnalysisOrchestrator, existence::ExistenceChecker,
        reconcile::CompositeEntityReconciler, upload::UploadService,
        validation::PayloadValidator,
    },
};

mod api;

/// # Errors
pub async fn serve(config: Config, log_dir: Option<Utf8PathBuf>) -> anyhow::Result<()> {
    initialize_logging(log_dir);

    let app_addr = config.app_address();
    let app_state = AppState::new(&config);
    tracing::info!("initialized app state");

    let app = app(app_state);

    let listener = TcpListener::bind(&app_addr)
        .await
        .context(format!("failed to listen on {app_addr}"))?;
    tracing::info!("cantata listening on {app_addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("failed to serve app")?;

    Ok(())
}

fn initialize_logging(log_dir: Option<Utf8PathBuf>) {
    use tracing::Level;
    use tracing_subscriber::{filter::Targets, prelude::*};

    let log_layer = tracing_subscriber::fmt::layer();

    match log_dir {
        None => {
            let dev_test_log_filter = Targets::new()
                .with_target("cantata_backend", Level::DEBUG)
                .with_target("tower_http", Level::TRACE);
            let log_layer = log_layer.pretty().with_filter(dev_test_log_filter);

            tracing_subscriber::registry().with(log_layer).init();
        }
        Some(path) => {
            let log_writer = tracing_appender::rolling::daily(path, "cantata.log");
            let prod_log_filter = Targets::new().with_target("cantata", Level::INFO);
            let log_layer = log_layer
                .json()
                .with_writer(log_writer)
                .with_filter(prod_log_filter);

            tracing_subscriber::registry().with(log_layer).init();
        }
    }
}

/// The service graph shared across request handlers. Everything hangs off
/// the one in-memory store, so cloning the state is cheap.
#[derive(Clone)]
pub(crate) struct AppState {
    store: Arc<Metastore>,
    existence: Arc<ExistenceChecker>,
    uploads: Arc<UploadService>,
    analyses: Arc<AnalysisOrchestrator>,
    dev: bool,
}

impl AppState {
    fn new(config: &Config) -> Self {
        let store = Arc::new(Metastore::new());
        let ids = Arc::new(
            config
                .id_seed()
                .map_or_else(IdGenerator::new, IdGenerator::with_seed),
        );
        let existence = Arc::new(match config.storage_url() {
            Some(url) => ExistenceChecker::http(
                url.clone(),
                config.storage_token().map(str::to_string),
            ),
            None => ExistenceChecker::fixed(),
        });

        let reconciler = CompositeEntityReconciler::new(Arc::clone(&store), Arc::clone(&ids));
        let analyses = Arc::new(AnalysisOrchestrator::new(
            Arc::clone(&store),
            Arc::clone(&ids),
            reconciler,
            Arc::clone(&existence),
        ));
        let validator = Arc::new(PayloadValidator::new(Arc::clone(&store)));
        let uploads = Arc::new(UploadService::new(
            Arc::clone(&store),
            Arc::clone(&ids),
            validator,
            Arc::clone(&analyses),
        ));

        Self {
            store,
            existence,
            uploads,
            analyses,
            dev: config.is_dev(),
        }
    }

    pub(crate) fn store(&self) -> &Metastore {
        &self.store
    }

    pub(crate) fn existence(&self) -> &ExistenceChecker {
        &self.existence
    }

    pub(crate) fn uploads(&self) -> &UploadService {
        &self.uploads
    }

    pub(crate) fn analyses(&self) -> &AnalysisOrchestrator {
        &self.analyses
    }

    pub(crate) fn is_dev(&self) -> bool {
        self.dev
    }
}

fn app(app_state: AppState) -> Router {
    api::router()
        .layer(axum::middleware::from_fn(api::error_body))
        .layer(TraceLayer::new_for_http())
        .route("/health", get(async || ()))
        .with_state(app_state)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}
