//! The [`Transaction`] type and transaction status tracking.
use std::io;

use crate::{
    Result,
    common::unit_error,
    executor::Executor,
    postgres::{
        BackendProtocol, backend,
        frontend::{self, FrontendProtocol},
    },
    statement::{CacheKey, StatementName},
    transport::{PgTransport, PgTransportExt},
};

/// Backend transaction status, sourced from `ReadyForQuery`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionStatus {
    /// Not in a transaction block.
    Idle,
    /// In a transaction block.
    Open,
    /// In a failed transaction block; statements are rejected until the
    /// block ends with `ROLLBACK`.
    Failed,
}

impl TransactionStatus {
    pub(crate) fn from_code(code: u8) -> TransactionStatus {
        match code {
            b'T' => Self::Open,
            b'E' => Self::Failed,
            _ => Self::Idle,
        }
    }
}

unit_error! {
    /// Savepoint names are used as bare identifiers and cannot be quoted in.
    pub struct InvalidSavepoint("savepoint name must be a plain identifier");
}

/// Run one transaction-control statement over the simple query flow.
async fn control<IO: PgTransport>(io: &mut IO, sql: &str) -> Result<TransactionStatus> {
    io.send(frontend::Query { sql });
    io.flush().await?;
    if let Err(err) = io.recv::<backend::CommandComplete>().await {
        // the backend still terminates the window with ReadyForQuery
        io.ready_request();
        return Err(err);
    }
    let r = io.recv::<backend::ReadyForQuery>().await?;
    Ok(TransactionStatus::from_code(r.tx_status))
}

fn check_savepoint(name: &str) -> Result<()> {
    let ident = !name.is_empty()
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
        && !name.starts_with(|c: char| c.is_ascii_digit());
    match ident {
        true => Ok(()),
        false => Err(InvalidSavepoint.into()),
    }
}

/// Begin transaction with given executor.
///
/// A no-op when a transaction block is already open: the returned guard
/// joins it instead of nesting.
pub async fn begin<Exec: Executor>(exec: Exec) -> Result<Transaction<Exec::Transport>> {
    let mut io = exec.connection().await?;
    if io.transaction_status() != TransactionStatus::Open {
        let status = control(&mut io, "BEGIN").await?;
        debug_assert_eq!(status, TransactionStatus::Open);
    }
    Ok(Transaction::new(io))
}

/// An RAII implementation of transaction scope.
///
/// To begin a transaction, use the [`begin`] function.
///
/// To commit transaction, use [`Transaction::commit`].
///
/// If not commited, when this structure is dropped, transaction will be
/// rolled back.
///
/// # Example
///
/// ```no_run
/// # async fn test(mut conn: pgflux::Connection) -> pgflux::Result<()> {
/// let mut tx = pgflux::begin(&mut conn).await?;
///
/// pgflux::execute("insert into post(name) values('foo')", &mut tx)
///     .execute()
///     .await?;
///
/// tx.commit().await?;
/// # Ok(())
/// # }
/// ```
pub struct Transaction<IO: PgTransport> {
    io: IO,
    completed: bool,
}

impl<IO> Transaction<IO>
where
    IO: PgTransport,
{
    pub(crate) fn new(io: IO) -> Self {
        Self { io, completed: false }
    }

    /// Commit transaction.
    ///
    /// A no-op when no transaction block is open.
    pub async fn commit(mut self) -> Result<()> {
        if self.io.transaction_status() == TransactionStatus::Idle {
            self.completed = true;
            return Ok(());
        }
        control(&mut self.io, "COMMIT").await?;
        self.completed = true;
        Ok(())
    }

    /// Roll the transaction back now instead of on drop.
    ///
    /// A no-op when no transaction block is open.
    pub async fn rollback(mut self) -> Result<()> {
        if self.io.transaction_status() == TransactionStatus::Idle {
            self.completed = true;
            return Ok(());
        }
        control(&mut self.io, "ROLLBACK").await?;
        self.completed = true;
        Ok(())
    }

    /// Establish a savepoint within the current transaction.
    pub async fn savepoint(&mut self, name: &str) -> Result<()> {
        check_savepoint(name)?;
        control(&mut self.io, &format!("SAVEPOINT {name}")).await?;
        Ok(())
    }

    /// Roll back all statements executed after the savepoint.
    pub async fn rollback_to(&mut self, name: &str) -> Result<()> {
        check_savepoint(name)?;
        control(&mut self.io, &format!("ROLLBACK TO SAVEPOINT {name}")).await?;
        Ok(())
    }

    /// Destroy a savepoint, keeping its effects.
    pub async fn release(&mut self, name: &str) -> Result<()> {
        check_savepoint(name)?;
        control(&mut self.io, &format!("RELEASE SAVEPOINT {name}")).await?;
        Ok(())
    }
}

impl<IO> Drop for Transaction<IO>
where
    IO: PgTransport,
{
    fn drop(&mut self) {
        if !self.completed {
            self.io.send(frontend::Query { sql: "ROLLBACK" });
            self.io.ready_request();
        }
    }
}

impl<IO> PgTransport for Transaction<IO>
where
    IO: PgTransport,
{
    fn poll_flush(&mut self, cx: &mut std::task::Context) -> std::task::Poll<io::Result<()>> {
        IO::poll_flush(&mut self.io, cx)
    }

    fn poll_recv<B: BackendProtocol>(&mut self, cx: &mut std::task::Context) -> std::task::Poll<Result<B>> {
        IO::poll_recv(&mut self.io, cx)
    }

    fn ready_request(&mut self) {
        IO::ready_request(&mut self.io)
    }

    fn send<F: FrontendProtocol>(&mut self, message: F) {
        IO::send(&mut self.io, message)
    }

    fn send_startup(&mut self, startup: frontend::Startup) {
        IO::send_startup(&mut self.io, startup)
    }

    fn get_stmt(&mut self, key: &CacheKey) -> Option<StatementName> {
        IO::get_stmt(&mut self.io, key)
    }

    fn reserve_stmt(&mut self) -> (StatementName, Option<StatementName>) {
        IO::reserve_stmt(&mut self.io)
    }

    fn add_stmt(&mut self, key: CacheKey, name: StatementName) {
        IO::add_stmt(&mut self.io, key, name)
    }

    fn codecs(&self) -> std::sync::Arc<crate::codec::Registry> {
        IO::codecs(&self.io)
    }

    fn force_binary(&self) -> bool {
        IO::force_binary(&self.io)
    }

    fn transaction_status(&self) -> TransactionStatus {
        IO::transaction_status(&self.io)
    }
}

#[cfg(test)]
mod test {
    use std::{pin::Pin, task::{Context, Poll}};

    use super::*;
    use crate::{statement::StatementCache, testing::*};

    fn run<F: Future>(mut f: Pin<&mut F>) -> F::Output {
        let waker = std::task::Waker::noop();
        let mut cx = Context::from_waker(waker);
        loop {
            if let Poll::Ready(out) = f.as_mut().poll(&mut cx) {
                return out;
            }
        }
    }

    #[test]
    fn begin_and_commit() {
        let mut io = MockIo::new(StatementCache::disabled(), vec![
            command_complete_msg("BEGIN"),
            ready_for_query(b'T'),
            command_complete_msg("COMMIT"),
            ready_for_query(b'I'),
        ]);

        let tx = run(std::pin::pin!(begin(&mut io))).unwrap();
        run(std::pin::pin!(tx.commit())).unwrap();

        assert_eq!(io.sent_tags(), "QQ");
        assert_eq!(io.transaction_status(), TransactionStatus::Idle);
    }

    #[test]
    fn begin_is_noop_when_open() {
        let mut io = MockIo::new(StatementCache::disabled(), vec![
            command_complete_msg("BEGIN"),
            ready_for_query(b'T'),
        ]);

        let mut tx = run(std::pin::pin!(begin(&mut io))).unwrap();
        // a second begin over the open transaction issues nothing
        let tx2 = run(std::pin::pin!(begin(&mut tx))).unwrap();
        std::mem::forget(tx2);
        std::mem::forget(tx);

        assert_eq!(io.sent_tags(), "Q");
    }

    #[test]
    fn commit_is_noop_when_idle() {
        let mut io = MockIo::new(StatementCache::disabled(), vec![]);

        let tx = Transaction::new(&mut io);
        run(std::pin::pin!(tx.commit())).unwrap();

        assert_eq!(io.sent_tags(), "");
    }

    #[test]
    fn drop_rolls_back() {
        let mut io = MockIo::new(StatementCache::disabled(), vec![
            command_complete_msg("BEGIN"),
            ready_for_query(b'T'),
        ]);

        let tx = run(std::pin::pin!(begin(&mut io))).unwrap();
        drop(tx);

        assert_eq!(io.sent_tags(), "QQ");
        assert_eq!(io.discarding, 1);
    }

    #[test]
    fn savepoint_names_are_validated() {
        let mut io = MockIo::new(StatementCache::disabled(), vec![
            command_complete_msg("BEGIN"),
            ready_for_query(b'T'),
        ]);

        let mut tx = run(std::pin::pin!(begin(&mut io))).unwrap();
        assert!(run(std::pin::pin!(tx.savepoint("sp1; DROP TABLE users"))).is_err());
        assert!(run(std::pin::pin!(tx.savepoint("1digit"))).is_err());
        assert!(run(std::pin::pin!(tx.savepoint(""))).is_err());
        std::mem::forget(tx);
    }
}
