//! The [`PgTransport`] trait.
use std::{
    io,
    sync::Arc,
    task::{Context, Poll},
};

use crate::{
    Result,
    codec::Registry,
    postgres::{BackendProtocol, FrontendProtocol, frontend},
    statement::{CacheKey, StatementName},
    transaction::TransactionStatus,
};

/// A buffered stream which can send and receive postgres message.
pub trait PgTransport: Unpin {
    /// Poll to flush the underlying io.
    fn poll_flush(&mut self, cx: &mut Context) -> Poll<io::Result<()>>;

    /// Poll to receive a message.
    ///
    /// Calling `poll_recv` will also try to [`poll_flush`][1] if there is buffered message.
    ///
    /// Implementor should route `NoticeResponse`, `NotificationResponse` and
    /// `ParameterStatus` to their side channels and never return them.
    ///
    /// Implementor also should handle `ErrorResponse` and return it as [`Err`].
    ///
    /// [1]: PgTransport::poll_flush
    fn poll_recv<B: BackendProtocol>(&mut self, cx: &mut Context) -> Poll<Result<B>>;

    /// Request implementor to ignore all backend messages until `ReadyForQuery` is received.
    ///
    /// `ReadyForQuery` consumed this way still updates the transaction status.
    fn ready_request(&mut self);

    /// Send message to the backend.
    ///
    /// Note that this send is buffered, caller must also call
    /// [`poll_flush`][1] or [`flush`][2] afterwards.
    ///
    /// [1]: PgTransport::poll_flush
    /// [2]: PgTransportExt::flush
    fn send<F: FrontendProtocol>(&mut self, message: F);

    /// Send [`Startup`][1] message to the backend.
    ///
    /// For historical reasons, the very first message sent by the client (the startup message)
    /// has no initial message-type byte.
    ///
    /// Thus, [`Startup`][1] does not implement [`FrontendProtocol`]
    ///
    /// [1]: frontend::Startup
    fn send_startup(&mut self, startup: frontend::Startup);

    /// Check for already prepared statement.
    fn get_stmt(&mut self, key: &CacheKey) -> Option<StatementName>;

    /// Reserve a statement name for a new `Parse`.
    ///
    /// Returns the name and, for a bounded cache at capacity, the evicted
    /// name that must be closed on the server.
    fn reserve_stmt(&mut self) -> (StatementName, Option<StatementName>);

    /// Add new prepared statement after its `ParseComplete` arrived.
    fn add_stmt(&mut self, key: CacheKey, name: StatementName);

    /// The codec registry rows of this transport decode through.
    fn codecs(&self) -> Arc<Registry>;

    /// Whether every result column is requested in the binary transmission
    /// format instead of the protocol's text default.
    fn force_binary(&self) -> bool;

    /// Transaction status from the last `ReadyForQuery`.
    fn transaction_status(&self) -> TransactionStatus;
}

impl<P> PgTransport for &mut P where P: PgTransport {
    fn poll_flush(&mut self, cx: &mut Context) -> Poll<io::Result<()>> {
        P::poll_flush(self, cx)
    }

    fn poll_recv<B: BackendProtocol>(&mut self, cx: &mut Context) -> Poll<Result<B>> {
        P::poll_recv(self, cx)
    }

    fn ready_request(&mut self) {
        P::ready_request(self);
    }

    fn send<F: FrontendProtocol>(&mut self, message: F) {
        P::send(self, message);
    }

    fn send_startup(&mut self, startup: frontend::Startup) {
        P::send_startup(self, startup);
    }

    fn get_stmt(&mut self, key: &CacheKey) -> Option<StatementName> {
        P::get_stmt(self, key)
    }

    fn reserve_stmt(&mut self) -> (StatementName, Option<StatementName>) {
        P::reserve_stmt(self)
    }

    fn add_stmt(&mut self, key: CacheKey, name: StatementName) {
        P::add_stmt(self, key, name);
    }

    fn codecs(&self) -> Arc<Registry> {
        P::codecs(self)
    }

    fn force_binary(&self) -> bool {
        P::force_binary(self)
    }

    fn transaction_status(&self) -> TransactionStatus {
        P::transaction_status(self)
    }
}

/// An extension trait to provide `Future` API for [`PgTransport`].
pub trait PgTransportExt: PgTransport {
    /// Flush the underlying io.
    fn flush(&mut self) -> impl Future<Output = io::Result<()>> {
        std::future::poll_fn(|cx| self.poll_flush(cx))
    }

    /// Receive a backend message.
    fn recv<B: BackendProtocol>(&mut self) -> impl Future<Output = Result<B>> {
        std::future::poll_fn(|cx| self.poll_recv(cx))
    }
}

impl<T> PgTransportExt for T where T: PgTransport { }
