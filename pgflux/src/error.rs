//! `pgflux` error types.
use std::{backtrace::Backtrace, fmt, io};

use crate::{
    codec::EncodeError,
    connection::{AuthError, ParseError},
    net::TlsError,
    postgres::{DatabaseError, ErrorClass, ErrorResponse, ProtocolError},
    row::{DecodeError, RowNotFound},
    transaction::InvalidSavepoint,
};

/// A specialized [`Result`] type for `pgflux` operation.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// All possible error from `pgflux` library.
pub struct Error {
    backtrace: Backtrace,
    kind: ErrorKind,
}

impl Error {
    pub fn kind(&self) -> &ErrorKind {
        &self.kind
    }

    pub fn backtrace(&self) -> &Backtrace {
        &self.backtrace
    }

    /// Whether retrying could succeed, and on what scale.
    ///
    /// Transport failures are retryable on a fresh connection; database
    /// errors answer per their [`ErrorClass`]; everything else is final.
    pub fn is_retryable(&self) -> bool {
        match &self.kind {
            ErrorKind::Io(_) => true,
            ErrorKind::Database(db) => db.is_retryable(),
            _ => false,
        }
    }

    /// The SQLSTATE driven class of a database error.
    pub fn class(&self) -> Option<ErrorClass> {
        match &self.kind {
            ErrorKind::Database(db) => Some(db.class()),
            _ => None,
        }
    }
}

/// All possible error kind from `pgflux` library.
pub enum ErrorKind {
    /// Configuration or url parsing failed.
    Config(ParseError),
    /// Backend bytes violate the protocol; the connection is closed.
    Protocol(ProtocolError),
    /// Transport failure.
    Io(io::Error),
    /// Securing the channel failed.
    Tls(TlsError),
    /// Authentication handshake failed.
    Auth(AuthError),
    /// The backend reported an `ErrorResponse`.
    Database(DatabaseError),
    /// Decoding a row value failed.
    Decode(DecodeError),
    /// Encoding a bind parameter failed.
    Encode(EncodeError),
    /// `fetch_one` on a statement that returned nothing.
    RowNotFound(RowNotFound),
    /// Savepoint name is not a plain identifier.
    InvalidSavepoint(InvalidSavepoint),
}

macro_rules! from {
    (<$ty:ty>$pat:pat => $body:expr) => {
        impl From<$ty> for Error {
            fn from($pat: $ty) -> Self {
                let backtrace = std::backtrace::Backtrace::capture();
                Self { backtrace, kind: $body }
            }
        }
    };
}

from!(<ErrorKind>e => e);
from!(<ParseError>e => ErrorKind::Config(e));
from!(<ProtocolError>e => ErrorKind::Protocol(e));
from!(<io::Error>e => ErrorKind::Io(e));
from!(<TlsError>e => ErrorKind::Tls(e));
from!(<AuthError>e => ErrorKind::Auth(e));
from!(<DatabaseError>e => ErrorKind::Database(e));
from!(<ErrorResponse>e => ErrorKind::Database(e.into()));
from!(<DecodeError>e => ErrorKind::Decode(e));
from!(<EncodeError>e => ErrorKind::Encode(e));
from!(<RowNotFound>e => ErrorKind::RowNotFound(e));
from!(<InvalidSavepoint>e => ErrorKind::InvalidSavepoint(e));

impl std::error::Error for Error { }

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.kind, f)?;

        if let std::backtrace::BacktraceStatus::Captured = self.backtrace.status() {
            let mut backtrace = self.backtrace.to_string();
            write!(f, "\n\n")?;
            writeln!(f, "Stack backtrace:")?;
            backtrace.truncate(backtrace.trim_end().len());
            write!(f, "{}", backtrace)?;
        }

        Ok(())
    }
}

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"{self}\"")
    }
}

impl std::error::Error for ErrorKind { }

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(e) => e.fmt(f),
            Self::Protocol(e) => e.fmt(f),
            Self::Io(e) => e.fmt(f),
            Self::Tls(e) => e.fmt(f),
            Self::Auth(e) => e.fmt(f),
            Self::Database(e) => e.fmt(f),
            Self::Decode(e) => e.fmt(f),
            Self::Encode(e) => e.fmt(f),
            Self::RowNotFound(e) => e.fmt(f),
            Self::InvalidSavepoint(e) => e.fmt(f),
        }
    }
}

impl fmt::Debug for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"{self}\"")
    }
}
