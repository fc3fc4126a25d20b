//! Certificate handling for HTTPS.
//!
//! Either loads a configured PEM pair or generates a self-signed one under
//! `<root>/tls`.

use std::path::Path;

use axum_server::tls_rustls::RustlsConfig;
use tracing::info;

use crate::config::TlsConfig;
use crate::error::{ServerError, ServerResult};

/// Where a generated certificate is kept.
pub fn self_signed_paths(root: &Path) -> TlsConfig {
    let dir = root.join("tls");
    TlsConfig { cert_path: dir.join("cert.pem"), key_path: dir.join("key.pem") }
}

/// Generate a self-signed certificate for `hostnames` plus the loopback
/// names and write it as PEM. Existing files are overwritten.
pub fn generate_self_signed(hostnames: &[String], paths: &TlsConfig) -> ServerResult<()> {
    use rcgen::{generate_simple_self_signed, CertifiedKey};

    for path in [&paths.cert_path, &paths.key_path] {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let mut names: Vec<String> = hostnames.to_vec();
    for local in ["localhost", "127.0.0.1"] {
        if !names.iter().any(|n| n == local) {
            names.push(local.to_string());
        }
    }

    let CertifiedKey { cert, key_pair } =
        generate_simple_self_signed(names).map_err(|e| ServerError::Tls(e.to_string()))?;
    std::fs::write(&paths.cert_path, cert.pem())?;
    std::fs::write(&paths.key_path, key_pair.serialize_pem())?;
    info!(cert = %paths.cert_path.display(), "generated self-signed certificate");
    Ok(())
}

/// Resolve the certificate pair the server should use, generating one when
/// asked to. `None` means plain HTTP.
pub fn resolve(root: &Path, tls: Option<&TlsConfig>, generate: bool) -> ServerResult<Option<TlsConfig>> {
    if let Some(tls) = tls {
        for path in [&tls.cert_path, &tls.key_path] {
            if !path.exists() {
                return Err(ServerError::Tls(format!("missing {}", path.display())));
            }
        }
        return Ok(Some(tls.clone()));
    }
    if !generate {
        return Ok(None);
    }
    let paths = self_signed_paths(root);
    generate_self_signed(&[], &paths)?;
    Ok(Some(paths))
}

pub async fn load_rustls_config(paths: &TlsConfig) -> ServerResult<RustlsConfig> {
    RustlsConfig::from_pem_file(&paths.cert_path, &paths.key_path)
        .await
        .map_err(|e| {
            ServerError::Tls(format!(
                "loading {} and {}: {e}",
                paths.cert_path.display(),
                paths.key_path.display()
            ))
        })
}
