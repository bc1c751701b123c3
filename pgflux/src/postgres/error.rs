//! Protocol and database errors.
use bytes::{Buf, Bytes};
use std::{fmt, str::Utf8Error};

use super::backend::{BackendMessage, ErrorResponse, NoticeResponse};

/// An error when translating buffer from postgres.
///
/// Any of these fail the channel: the inbound stream can no longer be trusted
/// to be aligned on message boundaries.
pub enum ProtocolError {
    /// Message type is not any of the known backend messages.
    Unknown { found: u8 },
    /// Message type differ from what the current phase expects.
    Unexpected {
        expect: Option<u8>,
        found: u8,
        phase: Option<&'static str>,
    },
    /// Authentication request type is not any of the known variants.
    UnknownAuth { auth: u32 },
    /// Declared message length cannot even cover the length field.
    Length { len: i32 },
    /// A protocol string is not nul terminated.
    MissingNul,
    /// A protocol string is not valid utf-8.
    Utf8(Utf8Error),
}

impl ProtocolError {
    pub(crate) fn unknown(found: u8) -> ProtocolError {
        Self::Unknown { found }
    }

    pub(crate) fn unexpected(expect: u8, found: u8) -> ProtocolError {
        Self::Unexpected { expect: Some(expect), found, phase: None }
    }

    pub(crate) fn unexpected_phase(found: u8, phase: &'static str) -> ProtocolError {
        Self::Unexpected { expect: None, found, phase: Some(phase) }
    }

    pub(crate) fn unknown_auth(auth: u32) -> ProtocolError {
        Self::UnknownAuth { auth }
    }

    pub(crate) fn length(len: i32) -> ProtocolError {
        Self::Length { len }
    }

    pub(crate) fn missing_nul() -> ProtocolError {
        Self::MissingNul
    }
}

impl From<Utf8Error> for ProtocolError {
    fn from(err: Utf8Error) -> Self {
        Self::Utf8(err)
    }
}

impl std::error::Error for ProtocolError { }

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unknown { found } => {
                write!(f, "unknown backend message type {:?}", *found as char)
            },
            Self::Unexpected { expect, found, phase } => {
                write!(f, "unexpected message {}", BackendMessage::message_name(*found))?;
                if let Some(expect) = expect {
                    write!(f, ", expecting {}", BackendMessage::message_name(*expect))?;
                }
                if let Some(phase) = phase {
                    write!(f, " in {phase}")?;
                }
                Ok(())
            },
            Self::UnknownAuth { auth } => write!(f, "unknown authentication request {auth}"),
            Self::Length { len } => write!(f, "message length {len} is shorter than the length field"),
            Self::MissingNul => f.write_str("protocol string is not nul terminated"),
            Self::Utf8(err) => write!(f, "protocol string is not utf-8: {err}"),
        }
    }
}

impl fmt::Debug for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"{self}\"")
    }
}

/// Abstract error kind selected by the SQLSTATE class.
///
/// <https://www.postgresql.org/docs/current/errcodes-appendix.html>
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Constraint violation, SQLSTATE class `23`.
    DataIntegrity,
    /// Syntax error or access rule violation, SQLSTATE class `42`.
    BadGrammar,
    /// Serialization failure `40001` or deadlock `40P01`; safe to re-execute.
    Transient,
    /// Transaction rollback, rest of SQLSTATE class `40`; retry in a new transaction.
    Rollback,
    /// Everything else; not retryable on the same connection state.
    NonTransientResource,
}

impl ErrorClass {
    /// Classify a five character SQLSTATE code.
    pub fn from_sqlstate(code: &str) -> ErrorClass {
        match (code.get(..2), code) {
            (_, "40001" | "40P01") => Self::Transient,
            (Some("40"), _) => Self::Rollback,
            (Some("23"), _) => Self::DataIntegrity,
            (Some("42"), _) => Self::BadGrammar,
            _ => Self::NonTransientResource,
        }
    }

    /// Whether the failed operation may succeed when retried.
    ///
    /// [`Transient`][Self::Transient] retries the statement,
    /// [`Rollback`][Self::Rollback] retries in a new transaction.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient | Self::Rollback)
    }
}

/// Decoded error fields from an [`ErrorResponse`] or [`NoticeResponse`] body.
///
/// Each field type has a single-byte identification token and should appear
/// at most once per message.
///
/// <https://www.postgresql.org/docs/current/protocol-error-fields.html>
#[derive(Debug, Clone, Default)]
pub struct DatabaseError {
    /// Severity, one of `ERROR`, `FATAL`, `PANIC` (or localized); always present.
    ///
    /// id token: `b'S'`
    pub severity: String,
    /// The SQLSTATE code for the error. Not localizable. Always present.
    ///
    /// id token: `b'C'`
    pub code: String,
    /// The primary human-readable error message. Always present.
    ///
    /// id token: `b'M'`
    pub message: String,
    /// An optional secondary error message carrying more detail about the problem.
    ///
    /// id token: `b'D'`
    pub detail: Option<String>,
    /// An optional suggestion what to do about the problem.
    ///
    /// id token: `b'H'`
    pub hint: Option<String>,
    /// Error cursor position as an index into the original query string,
    /// decimal ASCII, first character has index 1, measured in characters.
    ///
    /// id token: `b'P'`
    pub position: Option<String>,
    /// An indication of the context in which the error occurred.
    ///
    /// id token: `b'W'`
    pub where_: Option<String>,
    /// Schema associated with the error, if any.
    ///
    /// id token: `b's'`
    pub schema_name: Option<String>,
    /// Table associated with the error, if any.
    ///
    /// id token: `b't'`
    pub table_name: Option<String>,
    /// Column associated with the error, if any.
    ///
    /// id token: `b'c'`
    pub column_name: Option<String>,
    /// Constraint associated with the error, if any.
    ///
    /// id token: `b'n'`
    pub constraint_name: Option<String>,
    /// Source routine reporting the error.
    ///
    /// id token: `b'R'`
    pub routine: Option<String>,
}

impl DatabaseError {
    /// Decode error fields from a raw message body.
    ///
    /// Unrecognized field types are silently ignored, as the protocol requires.
    pub fn parse(mut body: Bytes) -> DatabaseError {
        let mut me = DatabaseError::default();

        while body.has_remaining() {
            let token = body.get_u8();
            if token == 0 {
                break;
            }
            let Some(nul) = body.iter().position(|e| matches!(e, b'\0')) else {
                break;
            };
            let value = body.split_to(nul);
            body.advance(1); // nul
            let value = String::from_utf8_lossy(&value).into_owned();

            match token {
                b'S' => me.severity = value,
                b'C' => me.code = value,
                b'M' => me.message = value,
                b'D' => me.detail = Some(value),
                b'H' => me.hint = Some(value),
                b'P' => me.position = Some(value),
                b'W' => me.where_ = Some(value),
                b's' => me.schema_name = Some(value),
                b't' => me.table_name = Some(value),
                b'c' => me.column_name = Some(value),
                b'n' => me.constraint_name = Some(value),
                b'R' => me.routine = Some(value),
                _ => { },
            }
        }

        me
    }

    /// Abstract error kind selected by the SQLSTATE class.
    pub fn class(&self) -> ErrorClass {
        ErrorClass::from_sqlstate(&self.code)
    }

    /// Whether the failed operation may succeed when retried.
    pub fn is_retryable(&self) -> bool {
        self.class().is_retryable()
    }
}

impl From<ErrorResponse> for DatabaseError {
    fn from(err: ErrorResponse) -> Self {
        Self::parse(err.body)
    }
}

impl From<NoticeResponse> for DatabaseError {
    fn from(err: NoticeResponse) -> Self {
        Self::parse(err.body)
    }
}

impl std::error::Error for DatabaseError { }

impl fmt::Display for DatabaseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)?;
        if !self.code.is_empty() {
            write!(f, " (SQLSTATE {})", self.code)?;
        }
        if let Some(detail) = &self.detail {
            write!(f, ": {detail}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn parse_error_fields() {
        let body = Bytes::from_static(
            b"SERROR\0C23505\0Mduplicate key value violates unique constraint\0nfoo_pkey\0\0",
        );
        let err = DatabaseError::parse(body);
        assert_eq!(err.severity, "ERROR");
        assert_eq!(err.code, "23505");
        assert_eq!(err.constraint_name.as_deref(), Some("foo_pkey"));
        assert_eq!(err.class(), ErrorClass::DataIntegrity);
        assert!(!err.is_retryable());
    }

    #[test]
    fn sqlstate_classes() {
        assert_eq!(ErrorClass::from_sqlstate("23505"), ErrorClass::DataIntegrity);
        assert_eq!(ErrorClass::from_sqlstate("42601"), ErrorClass::BadGrammar);
        assert_eq!(ErrorClass::from_sqlstate("40001"), ErrorClass::Transient);
        assert_eq!(ErrorClass::from_sqlstate("40P01"), ErrorClass::Transient);
        assert_eq!(ErrorClass::from_sqlstate("40000"), ErrorClass::Rollback);
        assert_eq!(ErrorClass::from_sqlstate("28P01"), ErrorClass::NonTransientResource);
        assert!(ErrorClass::from_sqlstate("40001").is_retryable());
        assert!(ErrorClass::from_sqlstate("40002").is_retryable());
        assert!(!ErrorClass::from_sqlstate("42601").is_retryable());
    }
}
