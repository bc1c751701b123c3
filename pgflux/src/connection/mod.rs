//! Postgres Connection.
use bytes::{Buf, BytesMut};
use std::{
    collections::HashMap,
    io,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    task::{Context, Poll, ready},
    time::{Duration, Instant},
};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    sync::mpsc,
};

mod config;
mod startup;
mod cancel;

pub use cancel::CancelHandle;
pub use config::{CacheStrategy, Config, ParseError, SslMode};
pub use startup::{AuthError, StartupResponse};

use crate::{
    Result,
    codec::Registry,
    common::{ByteStr, verbose},
    net::{Socket, Verification, tls_handshake},
    postgres::{
        BackendProtocol, DatabaseError, ErrorResponse, FrontendProtocol, NoticeResponse,
        ProtocolError, backend, frontend,
    },
    simple,
    statement::{CacheKey, StatementCache, StatementName},
    transaction::TransactionStatus,
    transport::PgTransport,
};

const DEFAULT_BUF_CAPACITY: usize = 1024;

/// Buffered notifications before the stream starts lagging; overflow drops
/// the payload and counts the loss.
const NOTIFY_BUFFER: usize = 1024;

/// Postgres Connection.
///
/// One connection is one cooperatively scheduled protocol engine: every
/// outstanding operation is an **exchange** whose response window ends at
/// `ReadyForQuery`, and exchanges run strictly one after another through the
/// exclusive `&mut` borrow.
///
/// # Features
///
/// Connection caches prepared statements per the configured
/// [`CacheStrategy`]. To opt out per query, use [`once`][1].
///
/// `NoticeResponse` is logged and never surfaces. `NotificationResponse`
/// routes to the [`notifications`][Connection::notifications] stream.
/// `ParameterStatus` maintains the live [server parameter
/// map][Connection::server_parameter].
///
/// After an `ErrorResponse` the rest of the exchange window is discarded
/// transparently so the next exchange starts aligned.
///
/// [1]: crate::sql::SqlExt::once
#[derive(Debug)]
pub struct Connection {
    // io
    socket: Socket,
    read_buf: BytesMut,
    write_buf: BytesMut,
    closed: bool,

    // exchange bookkeeping
    sync_pending: usize,
    tx_status: TransactionStatus,

    // feature
    stmts: StatementCache,
    codecs: Arc<Registry>,
    force_binary: bool,

    // side channels
    params: HashMap<ByteStr, ByteStr>,
    notify: Option<mpsc::Sender<backend::NotificationResponse>>,
    notify_lost: Arc<AtomicU64>,

    // cancel
    key_data: Option<backend::BackendKeyData>,
    target: cancel::Target,
    connect_timeout: Option<Duration>,

    // diagnostic
    connected_at: Instant,
}

impl Connection {
    /// Connect to postgres server via environment variables.
    ///
    /// See [`Config::from_env`] for more details.
    pub fn connect_env() -> impl Future<Output = Result<Connection>> {
        Self::connect_with(Config::from_env())
    }

    /// Connect to postgres server via url.
    pub async fn connect(url: &str) -> Result<Self> {
        Self::connect_with(Config::parse(url)?).await
    }

    /// Connect to postgres server with provided config.
    pub async fn connect_with(config: Config) -> Result<Self> {
        let socket = match &config.socket {
            // unix socket transport skips the TLS negotiation entirely
            Some(path) => Socket::connect_unix(path, config.connect_timeout).await?,
            None => {
                let tcp = Socket::connect_tcp(&config.host, config.port, config.connect_timeout).await?;
                match config.ssl_mode >= SslMode::Prefer {
                    true => secure(tcp, &config).await?,
                    false => Socket::tcp(tcp),
                }
            },
        };

        let mut me = Self::new(socket, &config);

        let StartupResponse { backend_key_data } = startup::startup(&config, &mut me).await?;
        me.key_data = Some(backend_key_data);

        if let Some(schema) = &config.schema {
            simple::simple_query(&format!("SET search_path TO {schema}"), &mut me).await?;
        }

        Ok(me)
    }

    fn new(socket: Socket, config: &Config) -> Connection {
        Self {
            socket,
            read_buf: BytesMut::with_capacity(DEFAULT_BUF_CAPACITY),
            write_buf: BytesMut::with_capacity(DEFAULT_BUF_CAPACITY),
            closed: false,
            sync_pending: 0,
            tx_status: TransactionStatus::Idle,
            stmts: config.statement_cache.build(),
            codecs: Registry::shared(),
            force_binary: config.force_binary,
            params: HashMap::new(),
            notify: None,
            notify_lost: Arc::new(AtomicU64::new(0)),
            key_data: None,
            target: match &config.socket {
                Some(path) => cancel::Target::Unix { path: path.clone() },
                None => cancel::Target::Tcp { host: config.host.clone(), port: config.port },
            },
            connect_timeout: config.connect_timeout,
            connected_at: Instant::now(),
        }
    }
}

/// `SSLRequest` negotiation: `'S'` upgrades, `'N'` falls back or fails
/// depending on the ssl mode.
async fn secure(mut tcp: tokio::net::TcpStream, config: &Config) -> Result<Socket> {
    use crate::net::TlsError;

    let mut buf = BytesMut::with_capacity(8);
    frontend::SslRequest.write(&mut buf);
    tcp.write_all(&buf).await?;

    let mut answer = [0u8; 1];
    tcp.read_exact(&mut answer).await?;

    match answer[0] {
        b'S' => {
            let verification = match config.ssl_mode {
                SslMode::VerifyFull => Verification::Full,
                SslMode::Require | SslMode::VerifyCa => Verification::ChainOnly,
                _ => Verification::None,
            };
            let tls = tls_handshake(
                tcp,
                &config.host,
                verification,
                config.ssl_root_cert.as_deref(),
            )
            .await?;
            Ok(Socket::tls(tls))
        },
        b'N' if config.ssl_mode <= SslMode::Prefer => Ok(Socket::tcp(tcp)),
        b'N' => Err(TlsError::Refused.into()),
        other => Err(TlsError::UnexpectedResponse(other).into()),
    }
}

impl Connection {
    /// Get the [`Instant`] value of when the socket is connected to postgres server.
    pub fn connected_at(&self) -> Instant {
        self.connected_at
    }

    /// Returns `true` if the channel is encrypted.
    pub fn is_tls(&self) -> bool {
        self.socket.is_tls()
    }

    /// Transaction status from the last `ReadyForQuery`.
    pub fn status(&self) -> TransactionStatus {
        self.tx_status
    }

    /// Last reported value of a server run-time parameter.
    pub fn server_parameter(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(|v| v.as_str())
    }

    /// The raw `server_version` string.
    pub fn server_version(&self) -> Option<&str> {
        self.server_parameter("server_version")
    }

    /// Server version in the `server_version_num` integer form.
    ///
    /// The reported `server_version_num` parameter is authoritative when a
    /// pooler injects it; otherwise `server_version` is parsed as
    /// `M.m[.p]`, mapping to `M*10000 + m*100 + p` before version 10 and
    /// `M*10000 + m` after.
    pub fn server_version_num(&self) -> Option<i32> {
        if let Some(num) = self.server_parameter("server_version_num") {
            if let Ok(num) = num.parse() {
                return Some(num);
            }
        }
        parse_version(self.server_version()?)
    }

    /// Replace the codec registry rows of this connection decode through.
    pub fn set_codecs(&mut self, codecs: Arc<Registry>) {
        self.codecs = codecs;
    }

    /// Subscribe to `NOTIFY` messages.
    ///
    /// Notifications arriving while nobody subscribes are dropped. A slow
    /// subscriber never stalls the protocol: past the buffer capacity,
    /// payloads are dropped and counted on [`NotificationStream::lost`].
    pub fn notifications(&mut self) -> NotificationStream {
        let (send, recv) = mpsc::channel(NOTIFY_BUFFER);
        self.notify = Some(send);
        NotificationStream {
            recv,
            lost: Arc::clone(&self.notify_lost),
        }
    }

    /// A handle to cancel the query this connection is executing, usable
    /// from another task.
    ///
    /// Cancelling does not withdraw anything already written: the running
    /// exchange still consumes its window up to `ReadyForQuery`, usually
    /// ending with a `57014 query_canceled` error.
    pub fn cancel_handle(&self) -> Option<CancelHandle> {
        let key = self.key_data.as_ref()?;
        Some(CancelHandle {
            target: self.target.clone(),
            process_id: key.process_id,
            secret_key: key.secret_key,
            connect_timeout: self.connect_timeout,
        })
    }

    /// `SET statement_timeout`, a server side setting; the client enforces
    /// nothing locally.
    pub async fn set_statement_timeout(&mut self, timeout: Duration) -> Result<()> {
        simple::simple_query(
            &format!("SET statement_timeout = {}", timeout.as_millis()),
            &mut *self,
        )
        .await
        .map(drop)
    }

    /// `SET lock_timeout`, a server side setting.
    pub async fn set_lock_timeout(&mut self, timeout: Duration) -> Result<()> {
        simple::simple_query(
            &format!("SET lock_timeout = {}", timeout.as_millis()),
            &mut *self,
        )
        .await
        .map(drop)
    }
}

impl Connection {
    /// Initiates or attempts to shut down socket, returning success when
    /// the I/O connection has completely shut down.
    pub fn poll_shutdown(&mut self, cx: &mut Context) -> Poll<io::Result<()>> {
        self.socket.poll_shutdown(cx)
    }

    /// Close connection cleanly: `Terminate`, then half-close.
    pub async fn close(mut self) -> io::Result<()> {
        frontend::write(frontend::Terminate, &mut self.write_buf);
        std::future::poll_fn(|cx| {
            crate::io::poll_write_all(&mut self.socket, &mut self.write_buf, cx)
        })
        .await?;
        self.closed = true;
        self.socket.shutdown().await
    }
}

fn closed_error() -> io::Error {
    io::Error::new(io::ErrorKind::ConnectionAborted, "connection is closed")
}

/// Decode version strings like `16.4`, `9.6.2` or `14.11 (Debian 14.11-1)`.
fn parse_version(version: &str) -> Option<i32> {
    let mut parts = version
        .split(|c: char| !c.is_ascii_digit())
        .filter(|p| !p.is_empty())
        .map(|p| p.parse::<i32>().ok());

    let major = parts.next()??;
    let minor = parts.next().flatten().unwrap_or(0);

    match major >= 10 {
        true => Some(major * 10_000 + minor),
        false => {
            let patch = parts.next().flatten().unwrap_or(0);
            Some(major * 10_000 + minor * 100 + patch)
        },
    }
}

/// Read into the buffer; an io error or EOF fails and closes the channel.
macro_rules! poll_read {
    ($io:ident, $cx:ident) => {
        match ready!(crate::io::poll_read(&mut $io.socket, &mut $io.read_buf, $cx)) {
            Ok(0) => {
                $io.closed = true;
                return Poll::Ready(Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "connection closed by server",
                ).into()));
            },
            Ok(_) => { },
            Err(err) => {
                $io.closed = true;
                return Poll::Ready(Err(err.into()));
            },
        }
    };
}

macro_rules! poll_message {
    (
        poll($io:ident, $cx:ident);
        let $msgtype:ident;
        let $body:ident;
    ) => {
        let Some(mut header) = $io.read_buf.get(..5) else {
            $io.read_buf.reserve(1024);
            poll_read!($io, $cx);
            continue;
        };

        let $msgtype = header.get_u8();
        let len = header.get_i32();

        if len < 4 {
            // framing can no longer be trusted
            $io.closed = true;
            return Poll::Ready(Err(ProtocolError::length(len).into()));
        }
        let len = len as usize;

        if $io.read_buf.len() - 1/*msgtype*/ < len {
            $io.read_buf.reserve(1 + len);
            poll_read!($io, $cx);
            continue;
        }

        $io.read_buf.advance(5);
        let $body = $io.read_buf.split_to(len - 4).freeze();

        // Message fully acquired
        verbose!("(B){}", backend::BackendMessage::message_name($msgtype));
    };
}

impl Connection {
    /// Execute all queued action: flush buffered frames and discard every
    /// response window a [`ready_request`][PgTransport::ready_request] gave
    /// up on.
    pub fn ready(&mut self) -> impl Future<Output = Result<()>> {
        std::future::poll_fn(|cx| self.poll_ready(cx))
    }

    /// Attempt to execute all queued action.
    pub(crate) fn poll_ready(&mut self, cx: &mut Context) -> Poll<Result<()>> {
        if !self.write_buf.is_empty() {
            ready!(PgTransport::poll_flush(self, cx)?)
        }

        while self.sync_pending != 0 {
            poll_message! {
                poll(self, cx);
                let msgtype;
                let body;
            }

            match msgtype {
                ErrorResponse::MSGTYPE => {
                    log::error!("{}", DatabaseError::parse(body));
                },
                NoticeResponse::MSGTYPE => {
                    log::warn!("{}", DatabaseError::parse(body));
                },
                backend::NotificationResponse::MSGTYPE => {
                    self.route_notification(body)?;
                },
                backend::ParameterStatus::MSGTYPE => {
                    self.update_parameter(body)?;
                },
                backend::ReadyForQuery::MSGTYPE => {
                    self.tx_status = TransactionStatus::from_code(body[0]);
                    self.sync_pending -= 1;
                },
                // everything else until `ReadyForQuery` is discarded
                _ => { },
            }
        }

        Poll::Ready(Ok(()))
    }

    fn route_notification(&mut self, body: bytes::Bytes) -> Result<()> {
        let notification =
            match backend::NotificationResponse::decode(backend::NotificationResponse::MSGTYPE, body) {
                Ok(ok) => ok,
                Err(err) => {
                    self.closed = true;
                    return Err(err.into());
                },
            };

        let Some(notify) = &self.notify else {
            log::debug!("notification on {:?} dropped, nobody listens", notification.channel());
            return Ok(());
        };

        match notify.try_send(notification) {
            Ok(()) => { },
            Err(mpsc::error::TrySendError::Full(n)) => {
                self.notify_lost.fetch_add(1, Ordering::Relaxed);
                log::error!("notification buffer full, dropped message on {:?}", n.channel());
            },
            Err(mpsc::error::TrySendError::Closed(_)) => {
                self.notify = None;
            },
        }

        Ok(())
    }

    fn update_parameter(&mut self, body: bytes::Bytes) -> Result<()> {
        match backend::ParameterStatus::decode(backend::ParameterStatus::MSGTYPE, body) {
            Ok(status) => {
                self.params.insert(status.name, status.value);
                Ok(())
            },
            Err(err) => {
                self.closed = true;
                Err(err.into())
            },
        }
    }
}

impl PgTransport for Connection {
    fn poll_flush(&mut self, cx: &mut Context) -> Poll<io::Result<()>> {
        if self.closed {
            return Poll::Ready(Err(closed_error()));
        }
        let result = ready!(crate::io::poll_write_all(&mut self.socket, &mut self.write_buf, cx));
        if let Err(err) = result {
            self.closed = true;
            return Poll::Ready(Err(err));
        }
        Poll::Ready(Ok(()))
    }

    fn poll_recv<B: BackendProtocol>(&mut self, cx: &mut Context) -> Poll<Result<B>> {
        if self.closed {
            return Poll::Ready(Err(closed_error().into()));
        }

        ready!(self.poll_ready(cx)?);

        loop {
            poll_message! {
                poll(self, cx);
                let msgtype;
                let body;
            }

            match msgtype {
                ErrorResponse::MSGTYPE => {
                    return Poll::Ready(Err(DatabaseError::parse(body).into()));
                },
                NoticeResponse::MSGTYPE => {
                    log::warn!("{}", DatabaseError::parse(body));
                    continue;
                },
                backend::NotificationResponse::MSGTYPE => {
                    self.route_notification(body)?;
                    continue;
                },
                backend::ParameterStatus::MSGTYPE => {
                    self.update_parameter(body)?;
                    continue;
                },
                // tracked connection state, still forwarded to the exchange
                backend::ReadyForQuery::MSGTYPE => {
                    self.tx_status = TransactionStatus::from_code(body[0]);
                },
                backend::BackendKeyData::MSGTYPE => {
                    self.key_data = Some(backend::BackendKeyData::decode(msgtype, body.clone())?);
                },
                _ => { },
            }

            return match B::decode(msgtype, body) {
                Ok(message) => Poll::Ready(Ok(message)),
                Err(err) => {
                    // unknown or misshapen message, the stream is misaligned
                    self.closed = true;
                    Poll::Ready(Err(err.into()))
                },
            };
        }
    }

    fn ready_request(&mut self) {
        self.sync_pending += 1;
    }

    fn send<F: FrontendProtocol>(&mut self, message: F) {
        verbose!("(F){}", std::any::type_name::<F>());
        frontend::write(message, &mut self.write_buf);
    }

    fn send_startup(&mut self, startup: frontend::Startup) {
        verbose!("(F){startup:?}");
        startup.write(&mut self.write_buf);
    }

    fn get_stmt(&mut self, key: &CacheKey) -> Option<StatementName> {
        self.stmts.get(key)
    }

    fn reserve_stmt(&mut self) -> (StatementName, Option<StatementName>) {
        self.stmts.reserve()
    }

    fn add_stmt(&mut self, key: CacheKey, name: StatementName) {
        self.stmts.insert(key, name);
    }

    fn codecs(&self) -> Arc<Registry> {
        Arc::clone(&self.codecs)
    }

    fn force_binary(&self) -> bool {
        self.force_binary
    }

    fn transaction_status(&self) -> TransactionStatus {
        self.tx_status
    }
}

impl crate::executor::Executor for Connection {
    type Transport = Self;

    type Future = std::future::Ready<Result<Self::Transport>>;

    fn connection(self) -> Self::Future {
        std::future::ready(Ok(self))
    }
}

/// Hot stream of `NOTIFY` messages, from
/// [`Connection::notifications`].
#[derive(Debug)]
pub struct NotificationStream {
    recv: mpsc::Receiver<backend::NotificationResponse>,
    lost: Arc<AtomicU64>,
}

impl NotificationStream {
    /// Receive the next notification.
    ///
    /// Returns [`None`] once the connection is gone or a newer subscriber
    /// replaced this one.
    pub async fn recv(&mut self) -> Option<backend::NotificationResponse> {
        self.recv.recv().await
    }

    /// How many notifications overflowed the buffer and were dropped.
    pub fn lost(&self) -> u64 {
        self.lost.load(Ordering::Relaxed)
    }
}

impl futures_core::Stream for NotificationStream {
    type Item = backend::NotificationResponse;

    fn poll_next(
        mut self: std::pin::Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Self::Item>> {
        self.recv.poll_recv(cx)
    }
}

#[cfg(test)]
mod test {
    use tokio::{io::AsyncWriteExt, net::TcpStream};

    use super::*;
    use crate::{ErrorKind, postgres::ErrorClass, testing::*};

    async fn pair() -> (Connection, TcpStream) {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let client = TcpStream::connect(addr).await.unwrap();
        let (server, _) = listener.accept().await.unwrap();
        client.set_nodelay(true).unwrap();
        (Connection::new(Socket::tcp(client), &Config::default()), server)
    }

    // while an exchange is active, NOTIFY messages interleaved between data
    // rows reach the subscriber and never the exchange results
    #[tokio::test]
    async fn notification_routing() {
        let (mut conn, mut server) = pair().await;
        let mut notifications = conn.notifications();

        let mut script = Vec::new();
        script.extend(frame(row_description(&[("v", crate::postgres::oid::INT4, 0)])));
        script.extend(frame(data_row(&[b"1"])));
        script.extend(frame(notification(42, "c", "hi")));
        script.extend(frame(data_row(&[b"2"])));
        script.extend(frame(command_complete_msg("SELECT 2")));
        script.extend(frame(ready_for_query(b'I')));
        server.write_all(&script).await.unwrap();

        let results = simple::simple_query("SELECT v FROM t", &mut conn).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].rows.len(), 2);
        assert_eq!(results[0].rows[0].try_get::<_, i32>(0).unwrap(), 1);
        assert_eq!(results[0].rows[1].try_get::<_, i32>(0).unwrap(), 2);

        let n = notifications.recv().await.unwrap();
        assert_eq!(n.process_id, 42);
        assert_eq!(n.channel(), "c");
        assert_eq!(n.payload(), "hi");
        assert_eq!(notifications.lost(), 0);
    }

    // an errored exchange leaves the channel aligned for the next one, and
    // `ReadyForQuery` keeps driving the transaction status
    #[tokio::test]
    async fn error_keeps_channel_usable() {
        let (mut conn, mut server) = pair().await;

        let mut script = Vec::new();
        script.extend(frame(error_response("23505")));
        script.extend(frame(ready_for_query(b'I')));
        script.extend(frame(command_complete_msg("BEGIN")));
        script.extend(frame(ready_for_query(b'T')));
        server.write_all(&script).await.unwrap();

        let err = simple::simple_query("INSERT ...", &mut conn).await.unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::Database(db) if db.code == "23505"));
        assert_eq!(err.class(), Some(ErrorClass::DataIntegrity));

        // next exchange proceeds normally
        simple::simple_query("BEGIN", &mut conn).await.unwrap();
        assert_eq!(conn.status(), TransactionStatus::Open);
    }

    // two back-to-back exchanges never observe each other's frames
    #[tokio::test]
    async fn exchange_isolation() {
        let (mut conn, mut server) = pair().await;

        let mut script = Vec::new();
        for v in [b"1", b"2"] {
            script.extend(frame(row_description(&[("v", crate::postgres::oid::INT4, 0)])));
            script.extend(frame(data_row(&[v])));
            script.extend(frame(command_complete_msg("SELECT 1")));
            script.extend(frame(ready_for_query(b'I')));
        }
        server.write_all(&script).await.unwrap();

        let first = simple::simple_query("A", &mut conn).await.unwrap();
        let second = simple::simple_query("B", &mut conn).await.unwrap();
        assert_eq!(first[0].rows[0].try_get::<_, i32>(0).unwrap(), 1);
        assert_eq!(second[0].rows[0].try_get::<_, i32>(0).unwrap(), 2);
    }

    #[tokio::test]
    async fn parameter_status_feeds_version() {
        let (mut conn, mut server) = pair().await;

        let mut status = bytes::BytesMut::new();
        crate::ext::BufMutExt::put_nul_string(&mut status, "server_version");
        crate::ext::BufMutExt::put_nul_string(&mut status, "16.4 (Debian 16.4-1)");

        let mut script = Vec::new();
        script.extend(frame((b'S', status.freeze())));
        script.extend(frame(command_complete_msg("SET")));
        script.extend(frame(ready_for_query(b'I')));
        server.write_all(&script).await.unwrap();

        simple::simple_query("SET application_name = 'x'", &mut conn).await.unwrap();

        assert_eq!(conn.server_version(), Some("16.4 (Debian 16.4-1)"));
        assert_eq!(conn.server_version_num(), Some(160_004));
    }

    #[tokio::test]
    async fn closed_by_server_then_fails_fast() {
        let (mut conn, server) = pair().await;
        drop(server);

        let err = simple::simple_query("SELECT 1", &mut conn).await.unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::Io(_)));

        // every further exchange fails without touching the socket
        let err = simple::simple_query("SELECT 1", &mut conn).await.unwrap_err();
        let ErrorKind::Io(io) = err.kind() else {
            panic!("expected io error");
        };
        assert_eq!(io.to_string(), "connection is closed");
    }

    // cancel opens a fresh connection, writes exactly the 16 byte
    // CancelRequest, closes without reading anything
    #[tokio::test]
    async fn cancel_request_on_side_channel() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let handle = CancelHandle {
            target: cancel::Target::Tcp {
                host: "127.0.0.1".into(),
                port: addr.port(),
            },
            process_id: 42,
            secret_key: 0xDEAD_BEEF,
            connect_timeout: None,
        };

        let server = tokio::spawn(async move {
            let (mut server, _) = listener.accept().await.unwrap();
            let mut buf = Vec::new();
            tokio::io::AsyncReadExt::read_to_end(&mut server, &mut buf).await.unwrap();
            buf
        });

        handle.cancel().await.unwrap();

        let wire = server.await.unwrap();
        assert_eq!(wire.len(), 16);
        assert_eq!(&wire[..8], &[0x00, 0x00, 0x00, 0x10, 0x04, 0xD2, 0x16, 0x2E]);
        assert_eq!(&wire[8..12], &42u32.to_be_bytes());
        assert_eq!(&wire[12..], &0xDEAD_BEEFu32.to_be_bytes());
    }

    #[test]
    fn version_parsing() {
        assert_eq!(parse_version("16.4"), Some(160_004));
        assert_eq!(parse_version("10.5"), Some(100_005));
        assert_eq!(parse_version("9.6.2"), Some(90_602));
        assert_eq!(parse_version("9.4"), Some(90_400));
        assert_eq!(parse_version("14.11 (Debian 14.11-1)"), Some(140_011));
        assert_eq!(parse_version("beta"), None);
    }
}
