//! Quinn-based QUIC transport.
//!
//! TLS 1.3 over UDP with ALPN `huddle`. A certificate/key pair in PEM form is
//! used when given; otherwise a self-signed certificate is generated, which
//! is only good for local development.

use std::{net::SocketAddr, path::Path, sync::Arc};

use huddle_proto::{ALPN_PROTOCOL, CloseCode};
use quinn::{Endpoint, RecvStream, SendStream, ServerConfig, VarInt};
use rustls::pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer};

use crate::error::ServerError;

/// QUIC endpoint accepting client connections.
pub struct QuinnTransport {
    endpoint: Endpoint,
}

impl QuinnTransport {
    /// Create and bind a new QUIC transport.
    ///
    /// Uses `cert_path` and `key_path` when both are given. Otherwise a
    /// self-signed certificate for `localhost` is generated.
    pub fn bind(
        address: &str,
        cert_path: Option<&Path>,
        key_path: Option<&Path>,
    ) -> Result<Self, ServerError> {
        let addr: SocketAddr = address
            .parse()
            .map_err(|e| ServerError::Config(format!("invalid bind address '{address}': {e}")))?;

        let material = match (cert_path, key_path) {
            (Some(cert), Some(key)) => read_pem_material(cert, key)?,
            _ => self_signed_material()?,
        };
        let server_config = server_config(material)?;

        let endpoint = Endpoint::server(server_config, addr)
            .map_err(|e| ServerError::Transport(format!("failed to create endpoint: {e}")))?;

        tracing::info!(%addr, "QUIC transport bound");

        Ok(Self { endpoint })
    }

    /// Wait for the next completed QUIC handshake.
    ///
    /// `None` once the endpoint is closed.
    pub async fn accept(&self) -> Result<Option<QuinnConnection>, ServerError> {
        let Some(incoming) = self.endpoint.accept().await else {
            return Ok(None);
        };

        let connection = incoming
            .await
            .map_err(|e| ServerError::Transport(format!("connection failed: {e}")))?;

        Ok(Some(QuinnConnection { connection }))
    }

    /// Local address the transport is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        self.endpoint
            .local_addr()
            .map_err(|e| ServerError::Transport(format!("failed to get local address: {e}")))
    }
}

/// One client connection.
///
/// Clones share the underlying QUIC connection. The server writes every
/// outbound event to a single unidirectional stream and reads client frames
/// from bidirectional streams the client opens.
#[derive(Clone)]
pub struct QuinnConnection {
    connection: quinn::Connection,
}

impl QuinnConnection {
    /// Accept the next client-opened bidirectional stream.
    pub async fn accept_bi(&self) -> Result<(SendStream, RecvStream), ServerError> {
        self.connection
            .accept_bi()
            .await
            .map_err(|e| ServerError::Transport(format!("accept_bi failed: {e}")))
    }

    /// Open the outbound event stream.
    pub async fn open_uni(&self) -> Result<SendStream, ServerError> {
        self.connection
            .open_uni()
            .await
            .map_err(|e| ServerError::Transport(format!("open_uni failed: {e}")))
    }

    /// Remote peer address.
    pub fn remote_addr(&self) -> SocketAddr {
        self.connection.remote_address()
    }

    /// Close with an application close code and reason phrase.
    pub fn close(&self, code: CloseCode, reason: &str) {
        self.connection.close(VarInt::from_u32(code.code()), reason.as_bytes());
    }
}

type TlsMaterial = (Vec<CertificateDer<'static>>, PrivateKeyDer<'static>);

/// Read a PEM certificate chain and private key.
fn read_pem_material(cert_path: &Path, key_path: &Path) -> Result<TlsMaterial, ServerError> {
    let read = |path: &Path| {
        std::fs::read(path)
            .map_err(|e| ServerError::Config(format!("cannot read '{}': {e}", path.display())))
    };
    let cert_pem = read(cert_path)?;
    let key_pem = read(key_path)?;

    let chain = rustls_pemfile::certs(&mut cert_pem.as_slice())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| ServerError::Config(format!("bad certificate PEM: {e}")))?;
    if chain.is_empty() {
        return Err(ServerError::Config(format!(
            "no certificate in '{}'",
            cert_path.display()
        )));
    }

    let key = rustls_pemfile::private_key(&mut key_pem.as_slice())
        .map_err(|e| ServerError::Config(format!("bad private key PEM: {e}")))?
        .ok_or_else(|| {
            ServerError::Config(format!("no private key in '{}'", key_path.display()))
        })?;

    Ok((chain, key))
}

/// Self-signed `localhost` certificate for development.
fn self_signed_material() -> Result<TlsMaterial, ServerError> {
    let generated = rcgen::generate_simple_self_signed(vec!["localhost".to_string()])
        .map_err(|e| ServerError::Config(format!("cannot generate certificate: {e}")))?;

    tracing::warn!("serving a self-signed certificate; clients must pin or skip verification");

    let key = PrivatePkcs8KeyDer::from(generated.key_pair.serialize_der());
    Ok((vec![generated.cert.der().clone()], key.into()))
}

/// TLS 1.3 server config with the huddle ALPN, wrapped for QUIC.
fn server_config((chain, key): TlsMaterial) -> Result<ServerConfig, ServerError> {
    let mut tls = rustls::ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(chain, key)
        .map_err(|e| ServerError::Config(format!("certificate rejected: {e}")))?;
    tls.alpn_protocols = vec![ALPN_PROTOCOL.to_vec()];

    let crypto = quinn::crypto::rustls::QuicServerConfig::try_from(tls)
        .map_err(|e| ServerError::Config(format!("TLS config unusable for QUIC: {e}")))?;

    Ok(ServerConfig::with_crypto(Arc::new(crypto)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn binds_with_self_signed() {
        let transport = QuinnTransport::bind("127.0.0.1:0", None, None).unwrap();
        let addr = transport.local_addr().unwrap();
        assert_ne!(addr.port(), 0);
    }

    #[tokio::test]
    async fn rejects_invalid_address() {
        let result = QuinnTransport::bind("invalid:address:format", None, None);
        assert!(matches!(result, Err(ServerError::Config(_))));
    }

    #[tokio::test]
    async fn missing_cert_file_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let cert = dir.path().join("cert.pem");
        let key = dir.path().join("key.pem");

        let result = QuinnTransport::bind("127.0.0.1:0", Some(&cert), Some(&key));
        assert!(matches!(result, Err(ServerError::Config(_))));
    }

    #[test]
    fn empty_pem_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let cert = dir.path().join("cert.pem");
        let key = dir.path().join("key.pem");
        std::fs::write(&cert, b"").unwrap();
        std::fs::write(&key, b"").unwrap();

        let err = read_pem_material(&cert, &key).unwrap_err();
        assert!(matches!(err, ServerError::Config(msg) if msg.starts_with("no certificate")));
    }

    #[test]
    fn self_signed_config_builds() {
        let material = self_signed_material().unwrap();
        assert_eq!(material.0.len(), 1);
        server_config(material).unwrap();
    }
}
