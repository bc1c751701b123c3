//! Query API types.
use std::marker::PhantomData;

use crate::{
    FromRow, Result,
    encode::{Encode, Encoded},
    executor::Executor,
    fetch::{Execute, FetchAll, FetchOne, FetchOptional, FetchStream},
    row::{Row, RowResult},
    sql::Sql,
};

/// Entrypoint of the query API.
///
/// ```no_run
/// # async fn app(mut conn: pgflux::Connection) -> pgflux::Result<()> {
/// let pairs = pgflux::query::<_, _, (i32, String)>("SELECT id, name FROM users WHERE id > $1", &mut conn)
///     .bind(10)
///     .fetch_all()
///     .await?;
/// # Ok(())
/// # }
/// ```
#[inline]
pub fn query<'val, SQL, Exe, R>(sql: SQL, exe: Exe) -> Query<'val, SQL, Exe, R> {
    Query { sql, exe, params: Vec::new(), _p: PhantomData }
}

/// Entrypoint of the query API for statements without interesting rows.
#[inline]
pub fn execute<'val, SQL, Exe>(sql: SQL, exe: Exe) -> Query<'val, SQL, Exe, ()> {
    Query { sql, exe, params: Vec::new(), _p: PhantomData }
}

/// The query API.
#[derive(Debug)]
#[must_use = "futures do nothing unless you `.await` or poll them"]
pub struct Query<'val, SQL, Exe, R> {
    sql: SQL,
    exe: Exe,
    params: Vec<Encoded<'val>>,
    _p: PhantomData<R>,
}

impl<'val, SQL, Exe, R> Query<'val, SQL, Exe, R> {
    /// Bind query parameter.
    #[inline]
    pub fn bind<V: Encode<'val>>(mut self, value: V) -> Self {
        self.params.push(value.encode());
        self
    }

    /// Bind an already encoded parameter, e.g. one produced by the
    /// [codec registry][crate::codec::Registry].
    #[inline]
    pub fn bind_encoded(mut self, value: Encoded<'val>) -> Self {
        self.params.push(value);
        self
    }
}

impl<'val, SQL, Exe, R> Query<'val, SQL, Exe, R>
where
    Exe: Executor,
{
    /// Fetch rows using [`Stream`][futures_core::Stream] api.
    ///
    /// The returned `Stream` must be polled/awaited until completion,
    /// otherwise it will disturb subsequent query.
    #[inline]
    pub fn fetch(self) -> FetchStream<'val, SQL, Exe::Future, Exe::Transport, R> {
        FetchStream::new(self.sql, self.exe.connection(), self.params, 0)
    }

    /// Fetch all rows into [`Vec`].
    #[inline]
    pub fn fetch_all(self) -> FetchAll<'val, SQL, Exe::Future, Exe::Transport, R> {
        FetchAll::new(self.sql, self.exe.connection(), self.params)
    }

    /// Fetch one row.
    ///
    /// Fails with [`RowNotFound`][crate::row::RowNotFound] if the statement
    /// returns nothing.
    #[inline]
    pub fn fetch_one(self) -> FetchOne<'val, SQL, Exe::Future, Exe::Transport, R> {
        FetchOne::new(self.sql, self.exe.connection(), self.params)
    }

    /// Optionally fetch one row.
    #[inline]
    pub fn fetch_optional(self) -> FetchOptional<'val, SQL, Exe::Future, Exe::Transport, R> {
        FetchOptional::new(self.sql, self.exe.connection(), self.params)
    }

    /// Execute statement and return number of rows affected.
    #[inline]
    pub fn execute(self) -> Execute<'val, SQL, Exe::Future, Exe::Transport> {
        Execute::new(self.sql, self.exe.connection(), self.params)
    }
}

impl<'val, SQL, Exe, R> IntoFuture for Query<'val, SQL, Exe, R>
where
    SQL: Sql + Unpin,
    Exe: Executor + Unpin,
    Exe::Future: Unpin,
    Exe::Transport: Unpin,
    R: FromRow + Unpin,
{
    type Output = Result<RowResult>;

    type IntoFuture = Execute<'val, SQL, Exe::Future, Exe::Transport>;

    #[inline]
    fn into_future(self) -> Self::IntoFuture {
        self.execute()
    }
}

/// Fetch a single value of the first column.
#[inline]
pub fn query_scalar<'val, SQL, Exe, D>(sql: SQL, exe: Exe) -> Query<'val, SQL, Exe, (D,)>
where
    D: crate::row::Decode,
{
    Query { sql, exe, params: Vec::new(), _p: PhantomData }
}

/// Entrypoint of the query API returning dynamically typed [`Row`]s.
#[inline]
pub fn query_raw<'val, SQL, Exe>(sql: SQL, exe: Exe) -> Query<'val, SQL, Exe, Row> {
    Query { sql, exe, params: Vec::new(), _p: PhantomData }
}
