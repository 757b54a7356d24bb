//! TLS contract the initiator consumes.
//!
//! Peers authenticate with self-signed certificates: the chain is
//! never validated against a root store, identity is instead the
//! SHA-256 of the presented certificate compared against the expected
//! device id after the handshake.

use std::io::{self, Read, Write};
use std::sync::Arc;

use bep_util::device::DeviceId;
use futures::{Future, Poll};
use rustls::{
    Certificate, ClientCertVerified, ClientCertVerifier, ClientConfig, ClientSession,
    DistinguishedNames, PrivateKey, RootCertStore, ServerCertVerified, ServerCertVerifier,
    ServerConfig, ServerSession, Session, TLSError,
};
use tokio_core::net::TcpStream;
use tokio_io::{AsyncRead, AsyncWrite};
use tokio_rustls::{TlsAcceptor, TlsConnector, TlsStream};

use crate::error::{DialError, DialErrorKind, DialResult};
use crate::BEP_ALPN;

type ClientTlsStream = TlsStream<TcpStream, ClientSession>;
type ServerTlsStream = TlsStream<TcpStream, ServerSession>;

/// Client and server TLS configurations built around one local
/// certificate, shared by every connection attempt.
#[derive(Clone)]
pub struct TlsContext {
    connector: TlsConnector,
    acceptor: TlsAcceptor,
}

impl TlsContext {
    /// Build a context from the local DER certificate and key.
    pub fn new(cert_der: &[u8], key_der: &[u8]) -> TlsContext {
        let cert = Certificate(cert_der.to_vec());
        let key = PrivateKey(key_der.to_vec());

        let mut client = ClientConfig::new();
        client.set_single_client_cert(vec![cert.clone()], key.clone());
        client.alpn_protocols.push(BEP_ALPN.as_bytes().to_vec());
        client
            .dangerous()
            .set_certificate_verifier(Arc::new(AcceptAnyServerCert));

        let mut server = ServerConfig::new(Arc::new(RequireAnyClientCert));
        server.set_single_cert(vec![cert], key);
        server.alpn_protocols.push(BEP_ALPN.as_bytes().to_vec());

        TlsContext {
            connector: TlsConnector::from(Arc::new(client)),
            acceptor: TlsAcceptor::from(Arc::new(server)),
        }
    }

    /// Run the client side of a handshake over the connected stream.
    pub fn connect(
        &self,
        stream: TcpStream,
    ) -> Box<dyn Future<Item = PeerStream, Error = DialError>> {
        // Peers are addressed by ip and authenticated by device id, so
        // sni carries a fixed placeholder name
        let name = webpki::DNSNameRef::try_from_ascii_str("bep.invalid")
            .expect("bep_dial: Placeholder Sni Name Was Rejected");

        Box::new(
            self.connector
                .connect(name, stream)
                .map(PeerStream::Client)
                .map_err(tls_failure),
        )
    }

    /// Run the server side of a handshake over an accepted stream.
    pub fn accept(
        &self,
        stream: TcpStream,
    ) -> Box<dyn Future<Item = PeerStream, Error = DialError>> {
        Box::new(
            self.acceptor
                .accept(stream)
                .map(PeerStream::Server)
                .map_err(tls_failure),
        )
    }
}

fn tls_failure(error: io::Error) -> DialError {
    DialErrorKind::TlsFailure {
        cause: error.to_string(),
    }
    .into()
}

//----------------------------------------------------------------------------//

/// An established TLS stream to a peer, client or server side.
pub enum PeerStream {
    Client(ClientTlsStream),
    Server(ServerTlsStream),
}

impl PeerStream {
    /// Device id derived from the peer's presented certificate.
    pub fn peer_device_id(&self) -> Option<DeviceId> {
        let certs = match *self {
            PeerStream::Client(ref stream) => stream.get_ref().1.get_peer_certificates(),
            PeerStream::Server(ref stream) => stream.get_ref().1.get_peer_certificates(),
        };

        certs
            .and_then(|certs| certs.into_iter().next())
            .map(|cert| DeviceId::from_der_cert(&cert.0))
    }

    /// Check the peer's certificate-derived identity against the one
    /// we meant to reach.
    pub fn verify_device_id(&self, expected: &DeviceId) -> DialResult<DeviceId> {
        let actual = self
            .peer_device_id()
            .ok_or_else(|| DialError::from(DialErrorKind::MissingDeviceId))?;

        if actual == *expected {
            Ok(actual)
        } else {
            Err(DialErrorKind::WrongDeviceId {
                expected: *expected,
                actual,
            }
            .into())
        }
    }
}

impl Read for PeerStream {
    fn read(&mut self, buffer: &mut [u8]) -> io::Result<usize> {
        match *self {
            PeerStream::Client(ref mut stream) => stream.read(buffer),
            PeerStream::Server(ref mut stream) => stream.read(buffer),
        }
    }
}

impl Write for PeerStream {
    fn write(&mut self, buffer: &[u8]) -> io::Result<usize> {
        match *self {
            PeerStream::Client(ref mut stream) => stream.write(buffer),
            PeerStream::Server(ref mut stream) => stream.write(buffer),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match *self {
            PeerStream::Client(ref mut stream) => stream.flush(),
            PeerStream::Server(ref mut stream) => stream.flush(),
        }
    }
}

impl AsyncRead for PeerStream {}

impl AsyncWrite for PeerStream {
    fn shutdown(&mut self) -> Poll<(), io::Error> {
        match *self {
            PeerStream::Client(ref mut stream) => stream.shutdown(),
            PeerStream::Server(ref mut stream) => stream.shutdown(),
        }
    }
}

//----------------------------------------------------------------------------//

/// Accepts any server certificate; identity is checked afterwards by
/// comparing the certificate hash against the dialed device id.
struct AcceptAnyServerCert;

impl ServerCertVerifier for AcceptAnyServerCert {
    fn verify_server_cert(
        &self,
        _roots: &RootCertStore,
        presented_certs: &[Certificate],
        _dns_name: webpki::DNSNameRef,
        _ocsp_response: &[u8],
    ) -> Result<ServerCertVerified, TLSError> {
        if presented_certs.is_empty() {
            Err(TLSError::NoCertificatesPresented)
        } else {
            Ok(ServerCertVerified::assertion())
        }
    }
}

/// Demands a client certificate but accepts any; identity is checked
/// afterwards the same way as for outgoing connections.
struct RequireAnyClientCert;

impl ClientCertVerifier for RequireAnyClientCert {
    fn offer_client_auth(&self) -> bool {
        true
    }

    fn client_auth_root_subjects(&self) -> DistinguishedNames {
        DistinguishedNames::new()
    }

    fn verify_client_cert(
        &self,
        presented_certs: &[Certificate],
    ) -> Result<ClientCertVerified, TLSError> {
        if presented_certs.is_empty() {
            Err(TLSError::NoCertificatesPresented)
        } else {
            Ok(ClientCertVerified::assertion())
        }
    }
}
