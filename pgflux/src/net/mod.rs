//! Transport channel, a duplex byte stream over TCP, TLS or a unix socket.
mod socket;
mod tls;

pub use socket::Socket;
pub use tls::TlsError;

pub(crate) use tls::{Verification, tls_handshake};
