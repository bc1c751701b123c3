use std::{fmt, io, sync::Arc};

use tokio::net::TcpStream;
use tokio_rustls::{
    TlsConnector,
    client::TlsStream,
    rustls::{
        self, ClientConfig, DigitallySignedStruct, RootCertStore, SignatureScheme,
        client::{
            WebPkiServerVerifier,
            danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier},
        },
        crypto::{CryptoProvider, ring, verify_tls12_signature, verify_tls13_signature},
        pki_types::{CertificateDer, ServerName, UnixTime},
    },
};

/// How far the server certificate is checked during the handshake.
///
/// Which level applies is decided by the configured ssl mode:
/// `prefer` (and below) encrypts without verification, `require` and
/// `verify-ca` verify the chain, `verify-full` additionally verifies that
/// the certificate matches the host connected to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Verification {
    None,
    ChainOnly,
    Full,
}

/// Perform the TLS handshake over an already connected stream.
///
/// Called after the server answered `'S'` to the `SSLRequest`.
pub(crate) async fn tls_handshake(
    stream: TcpStream,
    host: &str,
    verification: Verification,
    root_cert: Option<&str>,
) -> Result<TlsStream<TcpStream>, TlsError> {
    let provider = Arc::new(ring::default_provider());

    let roots = root_store(root_cert)?;

    let builder = ClientConfig::builder_with_provider(provider.clone())
        .with_safe_default_protocol_versions()
        .map_err(TlsError::Rustls)?;

    let config = match verification {
        Verification::None => builder
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(AcceptAll { provider }))
            .with_no_client_auth(),
        Verification::ChainOnly => {
            let webpki = WebPkiServerVerifier::builder_with_provider(Arc::new(roots), provider)
                .build()
                .map_err(|e| TlsError::Verifier(e.to_string()))?;
            builder
                .dangerous()
                .with_custom_certificate_verifier(Arc::new(ChainOnly { inner: webpki }))
                .with_no_client_auth()
        },
        Verification::Full => builder
            .with_root_certificates(roots)
            .with_no_client_auth(),
    };

    let server_name = ServerName::try_from(host.to_owned())
        .map_err(|_| TlsError::InvalidHost)?;

    let stream = TlsConnector::from(Arc::new(config))
        .connect(server_name, stream)
        .await
        .map_err(TlsError::Handshake)?;

    log::debug!("TLS handshake complete");

    Ok(stream)
}

/// The bundled `webpki-roots` anchors, plus every certificate from the
/// `sslrootcert` PEM file when one is configured.
fn root_store(root_cert: Option<&str>) -> Result<RootCertStore, TlsError> {
    let mut roots = RootCertStore::empty();
    roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

    if let Some(path) = root_cert {
        let pem = std::fs::read(path).map_err(|e| TlsError::RootCert(path.to_owned(), e))?;
        for cert in rustls_pemfile::certs(&mut &pem[..]) {
            let cert = cert.map_err(|e| TlsError::RootCert(path.to_owned(), e))?;
            roots
                .add(cert)
                .map_err(TlsError::Rustls)?;
        }
    }

    Ok(roots)
}

/// Encrypt without certificate verification, for `sslmode=prefer` and below.
#[derive(Debug)]
struct AcceptAll {
    provider: Arc<CryptoProvider>,
}

impl ServerCertVerifier for AcceptAll {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls12_signature(message, cert, dss, &self.provider.signature_verification_algorithms)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls13_signature(message, cert, dss, &self.provider.signature_verification_algorithms)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.provider.signature_verification_algorithms.supported_schemes()
    }
}

/// Verify the certificate chain but not the host name, for
/// `sslmode=require` and `sslmode=verify-ca`.
#[derive(Debug)]
struct ChainOnly {
    inner: Arc<WebPkiServerVerifier>,
}

impl ServerCertVerifier for ChainOnly {
    fn verify_server_cert(
        &self,
        end_entity: &CertificateDer<'_>,
        intermediates: &[CertificateDer<'_>],
        server_name: &ServerName<'_>,
        ocsp_response: &[u8],
        now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        match self.inner.verify_server_cert(end_entity, intermediates, server_name, ocsp_response, now) {
            Err(rustls::Error::InvalidCertificate(reason))
                if matches!(
                    reason,
                    rustls::CertificateError::NotValidForName
                        | rustls::CertificateError::NotValidForNameContext { .. },
                ) =>
            {
                Ok(ServerCertVerified::assertion())
            },
            other => other,
        }
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        self.inner.verify_tls12_signature(message, cert, dss)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        self.inner.verify_tls13_signature(message, cert, dss)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.inner.supported_verify_schemes()
    }
}

/// An error while securing the channel.
pub enum TlsError {
    /// Server answered `'N'` to `SSLRequest` while the ssl mode requires encryption.
    Refused,
    /// Server answered something else than `'S'` or `'N'` to `SSLRequest`.
    UnexpectedResponse(u8),
    /// Host name is not valid for TLS.
    InvalidHost,
    /// `sslrootcert` file cannot be read or parsed.
    RootCert(String, io::Error),
    /// Building the certificate verifier failed.
    Verifier(String),
    /// TLS configuration was rejected.
    Rustls(rustls::Error),
    /// The handshake itself failed.
    Handshake(io::Error),
}

impl std::error::Error for TlsError { }

impl fmt::Display for TlsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Refused => f.write_str("server does not support TLS"),
            Self::UnexpectedResponse(b) => {
                write!(f, "unexpected SSLRequest response {:?}", *b as char)
            },
            Self::InvalidHost => f.write_str("host name is not valid for TLS"),
            Self::RootCert(path, e) => write!(f, "failed to load sslrootcert {path:?}: {e}"),
            Self::Verifier(e) => write!(f, "failed to build certificate verifier: {e}"),
            Self::Rustls(e) => write!(f, "TLS configuration rejected: {e}"),
            Self::Handshake(e) => write!(f, "TLS handshake failed: {e}"),
        }
    }
}

impl fmt::Debug for TlsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"{self}\"")
    }
}
