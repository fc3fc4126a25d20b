//! HTTP server for imaged.
//!
//! Serves one [`Store`](imaged_store::Store) over axum: framed protocol
//! requests on `POST /v1/rpc`, encoded images on `GET /v1/export`, plus
//! health and info endpoints. HTTPS is provided by `axum-server` with a
//! configured or self-signed certificate.

pub mod config;
pub mod dispatch;
pub mod error;
pub mod handler;
pub mod router;
pub mod server;
pub mod tls;

pub use config::{ServerConfig, TlsConfig};
pub use dispatch::dispatch;
pub use error::{ServerError, ServerResult};
pub use handler::AppState;
pub use router::build_router;
pub use server::ImagedServer;
