//! The startup and authentication phase.
//!
//! <https://www.postgresql.org/docs/current/protocol-flow.html#PROTOCOL-FLOW-START-UP>
use std::fmt;

use super::Config;
use crate::{
    Result,
    postgres::{
        BackendMessage, ProtocolError, backend, frontend,
        sasl::{SCRAM_SHA_256, SaslError, ScramClient},
    },
    transport::{PgTransport, PgTransportExt},
};

/// Startup phase successful response.
pub struct StartupResponse {
    /// This message provides secret-key data that the frontend must
    /// save if it wants to be able to issue cancel requests later.
    pub backend_key_data: backend::BackendKeyData,
}

/// Perform the startup message and the authentication handshake.
pub(crate) async fn startup<IO: PgTransport>(config: &Config, mut io: IO) -> Result<StartupResponse> {
    // To begin a session, a frontend opens a connection to the server and sends a startup message.

    // (Optionally, the startup message can include additional settings for run-time parameters.)

    io.send_startup(frontend::Startup {
        user: &config.user,
        database: Some(&config.dbname),
        application_name: Some(&config.application_name),
        options: &config.options,
    });
    io.flush().await?;

    // The server then sends an appropriate authentication request message,
    // to which the frontend must reply with an appropriate authentication response message (such as a password).
    //
    // For all authentication methods except GSSAPI, SSPI and SASL, there is at most one request and one response.
    // In some methods, no response at all is needed from the frontend, and so no authentication request occurs.
    // For GSSAPI, SSPI and SASL, multiple exchanges of packets may be needed to complete the authentication.

    loop {
        use backend::Authentication::*;
        match io.recv().await? {
            // we gucci
            Ok => break,
            // The frontend must now send a PasswordMessage containing the password in clear-text form.
            CleartextPassword => {
                io.send(frontend::PasswordMessage { password: &config.pass });
                io.flush().await?;
            },
            // Concatenate password and user, md5 hash it, then md5 hash
            // again with the salt, and send with the "md5" prefix.
            MD5Password { salt } => {
                let hash = md5_password(&config.user, &config.pass, salt);
                io.send(frontend::PasswordMessage { password: &hash });
                io.flush().await?;
            },
            auth @ SASL { .. } => {
                if !auth.advertises(SCRAM_SHA_256) {
                    return Err(AuthError::UnsupportedSasl.into());
                }
                scram(config, &mut io).await?;
            },
            auth => return Err(AuthError::Unsupported(auth_name(&auth)).into()),
        }
    }

    // After having received AuthenticationOk, the frontend must wait for further messages from the server.
    // In this phase a backend process is being started, and the frontend is just an interested bystander.
    // It is still possible for the startup attempt to fail (ErrorResponse) or the server to decline support
    // for the requested minor protocol version (NegotiateProtocolVersion), but in the normal case the backend
    // will send some ParameterStatus messages, BackendKeyData, and finally ReadyForQuery.
    //
    // During this phase the backend will attempt to apply any additional run-time parameter settings that
    // were given in the startup message. If successful, these values become session defaults.
    // An error causes ErrorResponse and exit.

    let mut key_data = None;

    loop {
        use BackendMessage::*;
        match io.recv().await? {
            ReadyForQuery(_) => break,
            BackendKeyData(new_key_data) => key_data = Some(new_key_data),
            NegotiateProtocolVersion(v) => {
                log::debug!("server negotiated protocol minor version {}", v.minor);
            },
            // NOTE: ParameterStatus will get eaten by the IO
            f => Err(f.unexpected("startup phase"))?,
        }
    }

    Ok(StartupResponse {
        backend_key_data: key_data.expect("postgres never send backend key data"),
    })
}

/// The SCRAM-SHA-256 sub-flow: initial response, continue, final.
async fn scram<IO: PgTransport>(config: &Config, io: &mut IO) -> Result<()> {
    if config.pass.is_empty() {
        return Err(AuthError::PasswordRequired.into());
    }

    let mut client = ScramClient::new(&config.pass);

    let client_first = client.client_first();
    io.send(frontend::SaslInitialResponse {
        mechanism: SCRAM_SHA_256,
        data: client_first.as_bytes(),
    });
    io.flush().await?;

    let challenge = match io.recv::<backend::Authentication>().await? {
        backend::Authentication::SASLContinue { data } => data,
        _ => return Err(ProtocolError::unexpected_phase(b'R', "SASL challenge").into()),
    };
    let challenge = std::str::from_utf8(&challenge).map_err(ProtocolError::from)?;

    let client_final = client.server_first(challenge).map_err(AuthError::Sasl)?;
    io.send(frontend::SaslResponse { data: client_final.as_bytes() });
    io.flush().await?;

    let outcome = match io.recv::<backend::Authentication>().await? {
        backend::Authentication::SASLFinal { data } => data,
        _ => return Err(ProtocolError::unexpected_phase(b'R', "SASL outcome").into()),
    };
    let outcome = std::str::from_utf8(&outcome).map_err(ProtocolError::from)?;

    // a forged server can pass every step up to here; the signature proves
    // it also knows the stored key
    client.server_final(outcome).map_err(AuthError::Sasl)?;

    Ok(())
}

/// `"md5" || hex(md5(hex(md5(password || user)) || salt))`
fn md5_password(user: &str, password: &str, salt: [u8; 4]) -> String {
    let inner = md5::compute(format!("{password}{user}").as_bytes());

    let mut outer = format!("{inner:x}").into_bytes();
    outer.extend_from_slice(&salt);

    format!("md5{:x}", md5::compute(&outer))
}

fn auth_name(auth: &backend::Authentication) -> &'static str {
    use backend::Authentication::*;
    match auth {
        Ok => "Ok",
        KerberosV5 => "KerberosV5",
        CleartextPassword => "CleartextPassword",
        MD5Password { .. } => "MD5Password",
        GSS => "GSS",
        GSSContinue { .. } => "GSSContinue",
        SSPI => "SSPI",
        SASL { .. } => "SASL",
        SASLContinue { .. } => "SASLContinue",
        SASLFinal { .. } => "SASLFinal",
    }
}

/// An error during the authentication handshake.
///
/// None of these are retryable with the same credentials.
pub enum AuthError {
    /// Server requested an authentication method this library does not speak.
    Unsupported(&'static str),
    /// Server offered SASL without the `SCRAM-SHA-256` mechanism.
    UnsupportedSasl,
    /// The requested method needs a password and none is configured.
    PasswordRequired,
    /// The SCRAM exchange failed.
    Sasl(SaslError),
}

impl std::error::Error for AuthError { }

impl fmt::Display for AuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unsupported(method) => {
                write!(f, "authentication method {method} is not supported")
            },
            Self::UnsupportedSasl => {
                f.write_str("server offered no supported SASL mechanism")
            },
            Self::PasswordRequired => f.write_str("password required but not configured"),
            Self::Sasl(e) => e.fmt(f),
        }
    }
}

impl fmt::Debug for AuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"{self}\"")
    }
}

#[cfg(test)]
mod test {
    use super::*;

    // salt 1A2B3C4D, password "secret", user "alice"
    #[test]
    fn md5_password_message() {
        assert_eq!(
            md5_password("alice", "secret", [0x1A, 0x2B, 0x3C, 0x4D]),
            "md57ebaa254a0ff3a0207457356039aa9ff",
        );
    }
}
