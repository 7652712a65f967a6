//! TLS for PostgreSQL connections.
//!
//! SQL Server encryption is negotiated by tiberius from the ADO string's
//! `Encrypt` and `TrustServerCertificate` keys, so only PostgreSQL needs a
//! rustls connector.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::client::WebPkiServerVerifier;
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{CertificateError, ClientConfig, DigitallySignedStruct, RootCertStore};
use serde::{Deserialize, Serialize};
use tokio_postgres_rustls::MakeRustlsConnect;
use tracing::{debug, warn};

use crate::error::{BridgeError, Result};

/// PostgreSQL `sslmode` values understood by the connector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SslMode {
    #[default]
    Disable,
    /// Encrypt, accept any server certificate.
    Require,
    /// Encrypt, check the chain against the web PKI roots but not the name.
    VerifyCa,
    /// Encrypt, check chain and host name.
    VerifyFull,
}

impl SslMode {
    pub fn requires_tls(&self) -> bool {
        !matches!(self, SslMode::Disable)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SslMode::Disable => "disable",
            SslMode::Require => "require",
            SslMode::VerifyCa => "verify-ca",
            SslMode::VerifyFull => "verify-full",
        }
    }

    /// Map the mode tokio-postgres parsed from a connection string.
    pub fn from_pg(mode: tokio_postgres::config::SslMode) -> Self {
        match mode {
            tokio_postgres::config::SslMode::Require => SslMode::Require,
            _ => SslMode::Disable,
        }
    }

    /// rustls connector for this mode, `None` when TLS is off.
    pub fn connector(self) -> Result<Option<MakeRustlsConnect>> {
        if !self.requires_tls() {
            return Ok(None);
        }
        Ok(Some(MakeRustlsConnect::new(client_config(self)?)))
    }
}

impl FromStr for SslMode {
    type Err = BridgeError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "" | "disable" => Ok(SslMode::Disable),
            "require" => Ok(SslMode::Require),
            "verify-ca" => Ok(SslMode::VerifyCa),
            "verify-full" => Ok(SslMode::VerifyFull),
            other => Err(BridgeError::Config(format!(
                "unknown ssl_mode '{}' (expected disable, require, verify-ca or verify-full)",
                other
            ))),
        }
    }
}

impl fmt::Display for SslMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn client_config(mode: SslMode) -> Result<ClientConfig> {
    let mut roots = RootCertStore::empty();
    roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    let webpki = WebPkiServerVerifier::builder(Arc::new(roots))
        .build()
        .map_err(|e| BridgeError::Config(format!("cannot build certificate verifier: {}", e)))?;

    let check = match mode {
        SslMode::Disable => {
            return Err(BridgeError::Config("ssl_mode=disable has no TLS config".into()))
        }
        SslMode::Require => {
            warn!("ssl_mode=require: server certificate is not verified");
            CertCheck::Skip
        }
        SslMode::VerifyCa => CertCheck::ChainOnly,
        SslMode::VerifyFull => CertCheck::Full,
    };
    debug!("PostgreSQL TLS with ssl_mode={}", mode);

    let config = match check {
        CertCheck::Full => ClientConfig::builder()
            .with_webpki_verifier(webpki)
            .with_no_client_auth(),
        check => ClientConfig::builder()
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(ModeVerifier { webpki, check }))
            .with_no_client_auth(),
    };
    Ok(config)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CertCheck {
    Skip,
    ChainOnly,
    Full,
}

/// Web PKI verification relaxed per `sslmode`. Handshake signatures are
/// always checked.
#[derive(Debug)]
struct ModeVerifier {
    webpki: Arc<WebPkiServerVerifier>,
    check: CertCheck,
}

impl ServerCertVerifier for ModeVerifier {
    fn verify_server_cert(
        &self,
        end_entity: &CertificateDer<'_>,
        intermediates: &[CertificateDer<'_>],
        server_name: &ServerName<'_>,
        ocsp_response: &[u8],
        now: UnixTime,
    ) -> std::result::Result<ServerCertVerified, rustls::Error> {
        if self.check == CertCheck::Skip {
            return Ok(ServerCertVerified::assertion());
        }
        match self.webpki.verify_server_cert(
            end_entity,
            intermediates,
            server_name,
            ocsp_response,
            now,
        ) {
            Err(rustls::Error::InvalidCertificate(CertificateError::NotValidForName))
                if self.check == CertCheck::ChainOnly =>
            {
                Ok(ServerCertVerified::assertion())
            }
            other => other,
        }
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        self.webpki.verify_tls12_signature(message, cert, dss)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        self.webpki.verify_tls13_signature(message, cert, dss)
    }

    fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
        self.webpki.supported_verify_schemes()
    }
}
