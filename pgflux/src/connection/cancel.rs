//! The cancel-request side channel.
use bytes::BytesMut;
use std::time::Duration;

use tokio::io::AsyncWriteExt;

use crate::{Result, common::ByteStr, net::Socket, postgres::frontend};

/// Where the connection this handle belongs to is reachable.
#[derive(Debug, Clone)]
pub(crate) enum Target {
    Tcp { host: ByteStr, port: u16 },
    Unix { path: ByteStr },
}

/// A handle that can ask the server to abort whatever the connection it was
/// taken from is currently executing.
///
/// The request travels over its own short lived connection, so it can be
/// issued while the originating connection is busy. The server may or may
/// not honor it; no reply is ever sent.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    pub(crate) target: Target,
    pub(crate) process_id: u32,
    pub(crate) secret_key: u32,
    pub(crate) connect_timeout: Option<Duration>,
}

impl CancelHandle {
    /// Open a dedicated connection, write the 16 byte `CancelRequest` and
    /// close. Returns as soon as the request is on the wire.
    ///
    /// The originating connection is untouched: its exchange keeps
    /// consuming frames up to `ReadyForQuery` whether or not the server
    /// aborts the query.
    pub async fn cancel(self) -> Result<()> {
        let mut socket = match &self.target {
            Target::Tcp { host, port } => {
                Socket::tcp(Socket::connect_tcp(host, *port, self.connect_timeout).await?)
            },
            Target::Unix { path } => Socket::connect_unix(path, self.connect_timeout).await?,
        };

        let mut buf = BytesMut::with_capacity(16);
        frontend::CancelRequest {
            process_id: self.process_id,
            secret_key: self.secret_key,
        }
        .write(&mut buf);

        socket.write_all(&buf).await?;
        socket.shutdown().await?;

        Ok(())
    }
}
