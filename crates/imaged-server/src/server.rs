use std::sync::Arc;

use imaged_store::Store;
use tokio::net::TcpListener;
use tracing::info;

use crate::config::ServerConfig;
use crate::error::ServerResult;
use crate::handler::AppState;
use crate::router::build_router;
use crate::tls;

/// Image store server.
pub struct ImagedServer {
    config: ServerConfig,
    store: Arc<Store>,
}

impl ImagedServer {
    /// Open the store at `config.root` and prepare to serve it.
    pub fn new(config: ServerConfig) -> ServerResult<Self> {
        let store = Store::open_with(&config.root, config.store.clone())?;
        Ok(Self::with_store(config, Arc::new(store)))
    }

    pub fn with_store(config: ServerConfig, store: Arc<Store>) -> Self {
        Self { config, store }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    /// Build the router (useful for testing).
    pub fn router(&self) -> axum::Router {
        build_router(AppState {
            store: Arc::clone(&self.store),
            max_message_size: self.config.max_message_size,
        })
    }

    /// Start serving requests, over HTTPS when a certificate is configured
    /// or generated.
    pub async fn serve(self) -> ServerResult<()> {
        let app = self.router();
        let addr = self.config.bind_addr;
        let tls = tls::resolve(&self.config.root, self.config.tls.as_ref(), self.config.generate_self_signed)?;

        match tls {
            Some(paths) => {
                let rustls = tls::load_rustls_config(&paths).await?;
                info!(%addr, root = %self.store.root().display(), "imaged listening (https)");
                axum_server::bind_rustls(addr, rustls).serve(app.into_make_service()).await?;
            }
            None => {
                let listener = TcpListener::bind(addr).await?;
                info!(%addr, root = %self.store.root().display(), "imaged listening");
                axum::serve(listener, app).await?;
            }
        }
        Ok(())
    }
}
