//! Client-side connect-with-optional-TLS-upgrade (the client half of C2),
//! grounded in `gel-stream::client::connection::Connector::connect`.

use std::sync::Arc;
use std::time::Duration;

use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::{DigitallySignedStruct, SignatureScheme};
use rustls_pki_types::{CertificateDer, ServerName, UnixTime};
use tracing::debug;

use crate::error::{Result, TransportError};
use crate::stream::{Stream, TlsSide};
use crate::target::{Target, TlsTarget};

/// Connects a [`Target`] to a byte stream, performing the TLS handshake
/// when the target calls for it. Unlike `gel-stream::Connector`, this is a
/// plain function rather than a reusable builder type, since nothing here
/// needs to be constructed once and connected multiple times.
pub struct Connector {
    target: Target,
}

impl Connector {
    pub fn new(target: Target) -> Self {
        Self { target }
    }

    pub async fn connect(&self, timeout: Duration) -> Result<Stream> {
        let resolved = self.target.resolve().await?;
        let stream = Stream::connect_timeout(&resolved, timeout).await?;

        let Some(tls) = self.target.tls_params() else {
            return Ok(stream);
        };
        let Stream::Tcp(tcp) = stream else {
            // UNIX targets never carry TLS in this design.
            return Ok(stream);
        };

        let sni = self.target.sni_name().unwrap_or("localhost");
        let config = client_tls_config(tls);
        let connector = tokio_rustls::TlsConnector::from(config);
        let server_name = ServerName::try_from(sni.to_string())
            .map_err(|_| TransportError::TlsHandshake(format!("invalid server name: {sni}")))?;

        debug!(sni, "starting TLS handshake");
        let tls_stream = connector
            .connect(server_name, tcp)
            .await
            .map_err(|e| TransportError::TlsHandshake(e.to_string()))?;
        Ok(Stream::Tls(Box::new(TlsSide::Client(tls_stream))))
    }
}

fn client_tls_config(params: &TlsTarget) -> Arc<rustls::ClientConfig> {
    let builder = rustls::ClientConfig::builder();
    let config = if params.insecure {
        builder
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(AcceptAnyCertificate))
            .with_no_client_auth()
    } else {
        let mut roots = rustls::RootCertStore::empty();
        roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        builder.with_root_certificates(roots).with_no_client_auth()
    };
    Arc::new(config)
}

/// Backing `client.verify_ssl = false` (§6): disables certificate
/// verification entirely. Only ever reachable when the caller explicitly
/// opted out.
#[derive(Debug)]
struct AcceptAnyCertificate;

impl ServerCertVerifier for AcceptAnyCertificate {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> std::result::Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        vec![
            SignatureScheme::RSA_PKCS1_SHA256,
            SignatureScheme::RSA_PKCS1_SHA384,
            SignatureScheme::RSA_PKCS1_SHA512,
            SignatureScheme::ECDSA_NISTP256_SHA256,
            SignatureScheme::ECDSA_NISTP384_SHA384,
            SignatureScheme::ED25519,
            SignatureScheme::RSA_PSS_SHA256,
            SignatureScheme::RSA_PSS_SHA384,
            SignatureScheme::RSA_PSS_SHA512,
        ]
    }
}
