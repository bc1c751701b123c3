//! SCRAM-SHA-256 client, RFC 5802 / RFC 7677.
//!
//! The exchange goes:
//!
//! 1. client-first: `n,,n=,r=<client-nonce>`
//! 2. server-first: `r=<nonce>,s=<salt>,i=<iterations>`
//! 3. client-final: `c=biws,r=<nonce>,p=<proof>`
//! 4. server-final: `v=<signature>` or `e=<error>`
//!
//! Channel binding is not offered (`n,,`), `biws` is its base64 form.
use std::fmt;

use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use hmac::{Hmac, Mac};
use rand::{Rng, distributions::Alphanumeric, thread_rng};
use sha2::{Digest, Sha256};

const GS2_HEADER: &str = "n,,";
const CHANNEL_BINDING: &str = "c=biws";
const NONCE_LEN: usize = 24;

/// The SASL mechanism this client implements.
pub const SCRAM_SHA_256: &str = "SCRAM-SHA-256";

type HmacSha256 = Hmac<Sha256>;

/// `Hi(str, salt, i)`, which is PBKDF2 with HMAC-SHA-256 as the PRF.
fn hi(password: &[u8], salt: &[u8], iterations: u32) -> [u8; 32] {
    let mut prev = hmac(password, &[salt, &[0, 0, 0, 1]]);
    let mut out = prev;

    for _ in 1..iterations {
        prev = hmac(password, &[&prev]);
        for (out, prev) in out.iter_mut().zip(prev) {
            *out ^= prev;
        }
    }

    out
}

fn hmac(key: &[u8], data: &[&[u8]]) -> [u8; 32] {
    let mut mac = HmacSha256::new_from_slice(key).expect("hmac accepts any key length");
    for chunk in data {
        mac.update(chunk);
    }
    mac.finalize().into_bytes().into()
}

/// Client side of a single SCRAM-SHA-256 exchange.
pub struct ScramClient {
    password: String,
    nonce: String,
    state: State,
}

enum State {
    ClientFirst,
    ServerFirst,
    /// Keyed material retained to verify the server signature.
    ServerFinal {
        salted_password: [u8; 32],
        auth_message: String,
    },
}

impl ScramClient {
    /// Create a client with a fresh random nonce.
    pub fn new(password: &str) -> ScramClient {
        let nonce = thread_rng()
            .sample_iter(&Alphanumeric)
            .take(NONCE_LEN)
            .map(char::from)
            .collect::<String>();
        Self::with_nonce(password, nonce)
    }

    fn with_nonce(password: &str, nonce: String) -> ScramClient {
        ScramClient {
            password: password.to_owned(),
            nonce,
            state: State::ClientFirst,
        }
    }

    fn client_first_bare(&self) -> String {
        format!("n=,r={}", self.nonce)
    }

    /// The `client-first-message`, the payload of `SASLInitialResponse`.
    pub fn client_first(&mut self) -> String {
        self.state = State::ServerFirst;
        format!("{GS2_HEADER}{}", self.client_first_bare())
    }

    /// Process the `server-first-message` from `SASLContinue` and
    /// produce the `client-final-message` for `SASLResponse`.
    pub fn server_first(&mut self, server_first: &str) -> Result<String, SaslError> {
        assert!(
            matches!(self.state, State::ServerFirst),
            "SCRAM messages exchanged out of order",
        );

        let mut parts = server_first.splitn(3, ',');

        let server_nonce = parts
            .next()
            .and_then(|v| v.strip_prefix("r="))
            .ok_or(SaslError::Malformed("nonce"))?;

        // The server nonce must extend the one this client sent.
        if !server_nonce.starts_with(self.nonce.as_str()) || server_nonce.len() <= self.nonce.len() {
            return Err(SaslError::NonceMismatch);
        }

        let salt = parts
            .next()
            .and_then(|v| v.strip_prefix("s="))
            .and_then(|v| BASE64.decode(v).ok())
            .ok_or(SaslError::Malformed("salt"))?;

        let iterations = parts
            .next()
            .and_then(|v| v.strip_prefix("i="))
            .and_then(|v| v.parse::<u32>().ok())
            .filter(|i| *i > 0)
            .ok_or(SaslError::Malformed("iteration count"))?;

        let salted_password = hi(self.password.as_bytes(), &salt, iterations);

        let client_key = hmac(&salted_password, &[b"Client Key"]);
        let stored_key: [u8; 32] = Sha256::digest(client_key).into();

        let client_final_without_proof = format!("{CHANNEL_BINDING},r={server_nonce}");
        let auth_message = format!(
            "{},{server_first},{client_final_without_proof}",
            self.client_first_bare(),
        );

        let client_signature = hmac(&stored_key, &[auth_message.as_bytes()]);

        let mut client_proof = client_key;
        for (proof, signature) in client_proof.iter_mut().zip(client_signature) {
            *proof ^= signature;
        }

        self.state = State::ServerFinal { salted_password, auth_message };

        Ok(format!(
            "{client_final_without_proof},p={}",
            BASE64.encode(client_proof),
        ))
    }

    /// Verify the `server-final-message` from `SASLFinal`.
    pub fn server_final(&self, server_final: &str) -> Result<(), SaslError> {
        let State::ServerFinal { salted_password, auth_message } = &self.state else {
            panic!("SCRAM messages exchanged out of order");
        };

        if let Some(err) = server_final.strip_prefix("e=") {
            return Err(SaslError::Server(err.to_owned()));
        }

        let verifier = server_final
            .strip_prefix("v=")
            .and_then(|v| BASE64.decode(v).ok())
            .ok_or(SaslError::Malformed("verifier"))?;

        let server_key = hmac(salted_password, &[b"Server Key"]);

        HmacSha256::new_from_slice(&server_key)
            .expect("hmac accepts any key length")
            .chain_update(auth_message.as_bytes())
            .verify_slice(&verifier)
            .map_err(|_| SaslError::SignatureMismatch)
    }
}

impl fmt::Debug for ScramClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScramClient")
            .field("nonce", &self.nonce)
            .field("password", &"<REDACTED>")
            .finish()
    }
}

/// An error during the SCRAM exchange.
///
/// Authentication errors are not recoverable on this connection.
pub enum SaslError {
    /// A field of a server message cannot be parsed.
    Malformed(&'static str),
    /// Server nonce does not extend the client nonce.
    NonceMismatch,
    /// Server signature verification failed; the server does not know
    /// the password it asked the client to prove.
    SignatureMismatch,
    /// Server reported an `e=` outcome.
    Server(String),
}

impl std::error::Error for SaslError { }

impl fmt::Display for SaslError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Malformed(what) => write!(f, "malformed SCRAM {what}"),
            Self::NonceMismatch => f.write_str("SCRAM server nonce does not extend the client nonce"),
            Self::SignatureMismatch => f.write_str("SCRAM server signature mismatch"),
            Self::Server(e) => write!(f, "SCRAM authentication failed: {e}"),
        }
    }
}

impl fmt::Debug for SaslError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"{self}\"")
    }
}

#[cfg(test)]
mod test {
    use super::*;

    // RFC 7677 test vector, adjusted for the empty username this client
    // sends (postgres supplies the user in the startup message instead).
    #[test]
    fn scram_exchange() {
        let mut client = ScramClient::with_nonce("pencil", "rOprNGfwEbeRWgbNEkqO".into());

        assert_eq!(client.client_first(), "n,,n=,r=rOprNGfwEbeRWgbNEkqO");

        let client_final = client
            .server_first(
                "r=rOprNGfwEbeRWgbNEkqO%hvYDpWUa2RaTCAfuxFIlj)hNlF$k0,\
                 s=W22ZaJ0SNY7soEsUEjb6gQ==,i=4096",
            )
            .unwrap();

        assert_eq!(
            client_final,
            "c=biws,r=rOprNGfwEbeRWgbNEkqO%hvYDpWUa2RaTCAfuxFIlj)hNlF$k0,\
             p=qvT2SWdEH5Q06albL+hjSYuUhCG7VndFyzIb7CK4n9k=",
        );

        client
            .server_final("v=3HO6Qt1M4MKJrmlKaoOqLAI0/0TV0HZe7J9H3MBtSOg=")
            .unwrap();
    }

    #[test]
    fn rejects_replayed_nonce() {
        let mut client = ScramClient::with_nonce("pencil", "abcdef".into());
        client.client_first();
        let err = client.server_first("r=abcdef,s=W22ZaJ0SNY7soEsUEjb6gQ==,i=4096");
        assert!(matches!(err, Err(SaslError::NonceMismatch)));
    }

    #[test]
    fn rejects_bad_server_signature() {
        let mut client = ScramClient::with_nonce("pencil", "rOprNGfwEbeRWgbNEkqO".into());
        client.client_first();
        client
            .server_first(
                "r=rOprNGfwEbeRWgbNEkqO%hvYDpWUa2RaTCAfuxFIlj)hNlF$k0,\
                 s=W22ZaJ0SNY7soEsUEjb6gQ==,i=4096",
            )
            .unwrap();
        let err = client.server_final("v=aW52YWxpZCBzaWduYXR1cmUgYWJjZGVmZ2hpamts");
        assert!(matches!(err, Err(SaslError::SignatureMismatch)));
    }

    #[test]
    fn surfaces_server_error() {
        let mut client = ScramClient::with_nonce("pencil", "rOprNGfwEbeRWgbNEkqO".into());
        client.client_first();
        client
            .server_first(
                "r=rOprNGfwEbeRWgbNEkqO%hvYDpWUa2RaTCAfuxFIlj)hNlF$k0,\
                 s=W22ZaJ0SNY7soEsUEjb6gQ==,i=4096",
            )
            .unwrap();
        let err = client.server_final("e=invalid-proof");
        assert!(matches!(err, Err(SaslError::Server(e)) if e == "invalid-proof"));
    }
}
