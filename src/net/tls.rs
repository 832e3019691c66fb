//! TLS configuration and certificate loading.

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use axum_server::tls_rustls::RustlsConfig;
use thiserror::Error;

use crate::config::TlsConfig;

#[derive(Debug, Error)]
pub enum TlsError {
    #[error("cannot read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("no certificate found in {0}")]
    NoCertificate(PathBuf),

    #[error("no private key found in {0}")]
    NoPrivateKey(PathBuf),

    #[error("invalid tls configuration: {0}")]
    Config(std::io::Error),
}

fn open(path: &Path) -> Result<BufReader<File>, TlsError> {
    File::open(path)
        .map(BufReader::new)
        .map_err(|source| TlsError::Read {
            path: path.to_path_buf(),
            source,
        })
}

/// Check that the certificate chain and private key are present and parse.
pub fn check_tls_material(cert_path: &Path, key_path: &Path) -> Result<(), TlsError> {
    let certs = rustls_pemfile::certs(&mut open(cert_path)?)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|source| TlsError::Read {
            path: cert_path.to_path_buf(),
            source,
        })?;
    if certs.is_empty() {
        return Err(TlsError::NoCertificate(cert_path.to_path_buf()));
    }

    let key = rustls_pemfile::private_key(&mut open(key_path)?).map_err(|source| {
        TlsError::Read {
            path: key_path.to_path_buf(),
            source,
        }
    })?;
    if key.is_none() {
        return Err(TlsError::NoPrivateKey(key_path.to_path_buf()));
    }
    Ok(())
}

/// Load TLS configuration from certificate and key files.
pub async fn load_tls_config(tls: &TlsConfig) -> Result<RustlsConfig, TlsError> {
    let (cert_path, key_path) = (Path::new(&tls.cert_path), Path::new(&tls.key_path));
    check_tls_material(cert_path, key_path)?;
    RustlsConfig::from_pem_file(cert_path, key_path)
        .await
        .map_err(TlsError::Config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_files() {
        let err = check_tls_material(Path::new("/no/cert.pem"), Path::new("/no/key.pem"))
            .unwrap_err();
        assert!(matches!(err, TlsError::Read { .. }));
    }

    #[test]
    fn test_files_without_pem_blocks() {
        let dir = std::env::temp_dir().join(format!("gatehouse-tls-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let cert = dir.join("cert.pem");
        let key = dir.join("key.pem");
        std::fs::write(&cert, "not a certificate").unwrap();
        std::fs::write(&key, "not a key").unwrap();

        assert!(matches!(
            check_tls_material(&cert, &key),
            Err(TlsError::NoCertificate(_))
        ));
        std::fs::remove_dir_all(dir).unwrap();
    }

    #[tokio::test]
    async fn test_load_certificate_and_key() {
        let dir = concat!(env!("CARGO_MANIFEST_DIR"), "/tests/fixtures/tls");
        let tls = TlsConfig {
            cert_path: format!("{dir}/cert.pem"),
            key_path: format!("{dir}/key.pem"),
        };
        assert!(load_tls_config(&tls).await.is_ok());
    }
}
