//! TLS transport to the IMAP server.

use crate::error::{Error, Result};
use rustls::{ClientConfig, OwnedTrustAnchor, RootCertStore, ServerName};
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tracing::{debug, instrument};
use webpki_roots::TLS_SERVER_ROOTS;

/// A TLS stream over TCP, used for IMAP communication.
pub(crate) type TlsStream = tokio_rustls::client::TlsStream<TcpStream>;

/// Builds a TLS client trusting the Mozilla root set.
///
/// Built once per connector and shared by every attempt.
pub(crate) fn tls_connector() -> TlsConnector {
    let anchors = TLS_SERVER_ROOTS.iter().map(|ta| {
        OwnedTrustAnchor::from_subject_spki_name_constraints(
            ta.subject,
            ta.spki,
            ta.name_constraints,
        )
    });
    let mut roots = RootCertStore::empty();
    roots.add_trust_anchors(anchors);

    let config = ClientConfig::builder()
        .with_safe_defaults()
        .with_root_certificates(roots)
        .with_no_client_auth();

    TlsConnector::from(Arc::new(config))
}

/// Connects to `target_addr` and performs the TLS handshake for `host`.
#[instrument(
    name = "connection::establish_tls",
    skip_all,
    fields(imap_host = %host, target_addr = %target_addr)
)]
pub(crate) async fn establish_tls_connection(
    tls: &TlsConnector,
    host: &str,
    target_addr: &str,
) -> Result<TlsStream> {
    let server_name = server_name(host)?;

    let tcp = TcpStream::connect(target_addr)
        .await
        .map_err(|source| Error::TcpConnect {
            target: target_addr.to_string(),
            source,
        })?;

    debug!("TCP connected, starting TLS handshake");

    tls.connect(server_name, tcp)
        .await
        .map_err(|source| Error::TlsConnect {
            target: target_addr.to_string(),
            source,
        })
}

/// SNI name for `host`. IP literals are accepted.
fn server_name(host: &str) -> Result<ServerName> {
    ServerName::try_from(host).map_err(|source| Error::InvalidDnsName {
        host: host.to_string(),
        source,
    })
}
