//! # TLS Server Configuration
//!
//! Builds the rustls acceptor used for every client connection.
//!
//! ## Responsibilities
//! - Load the certificate chain and private key from PEM files
//! - Generate a throwaway self-signed certificate for development
//! - Enforce a protocol floor (TLS 1.2 or TLS 1.3)
//! - Optionally verify client certificates against a CA bundle; clients
//!   without a certificate are still accepted

use std::fs::File;
use std::io::{self, BufReader, Write};
use std::path::Path;
use std::sync::Arc;

use rustls::server::AllowAnyAnonymousOrAuthenticatedClient;
use rustls::{Certificate, PrivateKey, RootCertStore, ServerConfig, SupportedProtocolVersion};
use rustls_pemfile::{certs, pkcs8_private_keys, rsa_private_keys};
use tokio_rustls::TlsAcceptor;
use tracing::{debug, info};

use crate::config::TlsConfig;
use crate::error::{GatewayError, Result};

/// Lowest TLS protocol version accepted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TlsVersion {
    /// TLS 1.2 and 1.3
    Tls12,
    /// TLS 1.3 only
    Tls13,
}

impl TlsVersion {
    pub fn parse(text: &str) -> Result<Self> {
        match text {
            "1.2" => Ok(Self::Tls12),
            "1.3" => Ok(Self::Tls13),
            other => Err(GatewayError::TlsError(format!(
                "Unsupported TLS version: {other}"
            ))),
        }
    }

    fn protocol_versions(self) -> &'static [&'static SupportedProtocolVersion] {
        static TLS12_AND_UP: &[&SupportedProtocolVersion] =
            &[&rustls::version::TLS13, &rustls::version::TLS12];
        static TLS13_ONLY: &[&SupportedProtocolVersion] = &[&rustls::version::TLS13];
        match self {
            Self::Tls12 => TLS12_AND_UP,
            Self::Tls13 => TLS13_ONLY,
        }
    }
}

#[derive(Debug, Clone)]
enum CertSource {
    Files { cert_path: String, key_path: String },
    SelfSigned,
}

/// TLS server configuration
#[derive(Debug, Clone)]
pub struct TlsServerConfig {
    source: CertSource,
    min_version: TlsVersion,
    /// CA bundle for optional client certificates
    client_ca_path: Option<String>,
}

impl TlsServerConfig {
    /// Serve the PEM certificate chain and key at the given paths
    pub fn new<P: AsRef<Path>>(cert_path: P, key_path: P) -> Self {
        Self {
            source: CertSource::Files {
                cert_path: cert_path.as_ref().to_string_lossy().to_string(),
                key_path: key_path.as_ref().to_string_lossy().to_string(),
            },
            min_version: TlsVersion::Tls12,
            client_ca_path: None,
        }
    }

    /// Serve a certificate for `localhost` generated in memory at load time
    pub fn self_signed() -> Self {
        Self {
            source: CertSource::SelfSigned,
            min_version: TlsVersion::Tls12,
            client_ca_path: None,
        }
    }

    /// Build from the `[tls]` configuration section
    pub fn from_config(config: &TlsConfig) -> Result<Self> {
        let base = match (&config.cert_path, &config.key_path) {
            (Some(cert), Some(key)) => Self::new(cert, key),
            (None, None) if config.self_signed => Self::self_signed(),
            _ => {
                return Err(GatewayError::TlsError(
                    "cert_path and key_path must both be set, or self_signed enabled".into(),
                ))
            }
        };
        let mut tls = base.with_min_version(TlsVersion::parse(&config.min_version)?);
        if let Some(ca) = &config.client_ca_path {
            tls = tls.with_optional_client_auth(ca.clone());
        }
        Ok(tls)
    }

    pub fn with_min_version(mut self, version: TlsVersion) -> Self {
        self.min_version = version;
        self
    }

    /// Verify client certificates that are presented, without requiring one
    pub fn with_optional_client_auth<S: Into<String>>(mut self, client_ca_path: S) -> Self {
        self.client_ca_path = Some(client_ca_path.into());
        self
    }

    /// Generate a self-signed certificate for development/testing purposes
    pub fn generate_self_signed<P: AsRef<Path>>(cert_path: P, key_path: P) -> io::Result<Self> {
        let cert = rcgen::generate_simple_self_signed(vec!["localhost".into()])
            .map_err(|e| io::Error::other(format!("Certificate generation error: {e}")))?;

        let mut cert_file = File::create(&cert_path)?;
        cert_file.write_all(cert.cert.pem().as_bytes())?;

        let mut key_file = File::create(&key_path)?;
        key_file.write_all(cert.signing_key.serialize_pem().as_bytes())?;

        Ok(Self::new(cert_path, key_path))
    }

    /// Build the rustls server configuration
    pub fn load_server_config(&self) -> Result<ServerConfig> {
        let (cert_chain, private_key) = match &self.source {
            CertSource::Files {
                cert_path,
                key_path,
            } => (load_certs(cert_path)?, load_private_key(key_path)?),
            CertSource::SelfSigned => generate_in_memory()?,
        };

        let builder = ServerConfig::builder()
            .with_safe_default_cipher_suites()
            .with_safe_default_kx_groups()
            .with_protocol_versions(self.min_version.protocol_versions())
            .map_err(|e| GatewayError::TlsError(format!("Unsupported protocol versions: {e}")))?;

        let config = match &self.client_ca_path {
            Some(ca_path) => {
                let mut roots = RootCertStore::empty();
                for cert in load_certs(ca_path)? {
                    roots.add(&cert).map_err(|e| {
                        GatewayError::TlsError(format!("Failed to add client CA cert: {e}"))
                    })?;
                }
                debug!("optional client certificate verification enabled");
                builder
                    .with_client_cert_verifier(Arc::new(
                        AllowAnyAnonymousOrAuthenticatedClient::new(roots),
                    ))
                    .with_single_cert(cert_chain, private_key)
            }
            None => builder
                .with_no_client_auth()
                .with_single_cert(cert_chain, private_key),
        }
        .map_err(|e| GatewayError::TlsError(format!("TLS error: {e}")))?;

        info!(min_version = ?self.min_version, "TLS server configuration loaded");
        Ok(config)
    }

    /// Acceptor ready for the listener
    pub fn acceptor(&self) -> Result<TlsAcceptor> {
        Ok(TlsAcceptor::from(Arc::new(self.load_server_config()?)))
    }
}

fn load_certs(path: &str) -> Result<Vec<Certificate>> {
    let file = File::open(path)
        .map_err(|e| GatewayError::TlsError(format!("Failed to open cert file {path}: {e}")))?;
    let chain = certs(&mut BufReader::new(file))
        .map_err(|_| GatewayError::TlsError(format!("Failed to parse certificate {path}")))?;
    if chain.is_empty() {
        return Err(GatewayError::TlsError(format!("No certificates in {path}")));
    }
    Ok(chain.into_iter().map(Certificate).collect())
}

fn load_private_key(path: &str) -> Result<PrivateKey> {
    let open = || {
        File::open(path)
            .map(BufReader::new)
            .map_err(|e| GatewayError::TlsError(format!("Failed to open key file {path}: {e}")))
    };
    let parse_failed = |_| GatewayError::TlsError(format!("Failed to parse private key {path}"));

    let mut keys = pkcs8_private_keys(&mut open()?).map_err(parse_failed)?;
    if keys.is_empty() {
        keys = rsa_private_keys(&mut open()?).map_err(parse_failed)?;
    }
    keys.into_iter()
        .next()
        .map(PrivateKey)
        .ok_or_else(|| GatewayError::TlsError(format!("No private keys found in {path}")))
}

fn generate_in_memory() -> Result<(Vec<Certificate>, PrivateKey)> {
    let cert = rcgen::generate_simple_self_signed(vec!["localhost".into()])
        .map_err(|e| GatewayError::TlsError(format!("Certificate generation error: {e}")))?;
    Ok((
        vec![Certificate(cert.cert.der().to_vec())],
        PrivateKey(cert.signing_key.serialize_der()),
    ))
}
