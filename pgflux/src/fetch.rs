//! The extended query flow.
//!
//! `Parse` (on statement cache miss), then `Bind`, `Describe`, `Execute`,
//! `Close` of the portal and `Sync` in one pipeline. Rows stream out on
//! demand; nothing is read off the socket faster than the consumer pulls.
use futures_core::Stream;
use std::{
    marker::PhantomData,
    mem,
    pin::Pin,
    task::{
        Context,
        Poll::{self, *},
        ready,
    },
};

use crate::{
    Error, ErrorKind, FromRow, Result, Row,
    encode::Encoded,
    ext::UsizeExt,
    postgres::{
        PgFormat,
        backend::{self, CommandComplete},
        frontend,
    },
    row::{RowNotFound, RowResult},
    sql::Sql,
    statement::{CacheKey, PortalName, StatementName},
    transport::PgTransport,
};

#[derive(Debug)]
pub struct PrepareData {
    pub key: CacheKey,
    pub stmt: StatementName,
    pub cache_hit: bool,
    pub evicted: bool,
    /// this field intended to be edited by caller for `portal` params.
    pub max_row: u32,
}

/// Write Prepare statement to `io`.
///
/// If cache hit, no further action is required.
///
/// If cache miss, flushing is required, with responses possible:
/// - `CloseComplete` when a least recently used statement got evicted
/// - `ParseComplete` from `Parse`
///
/// Caller caches the statement once `ParseComplete` arrives.
fn prepare(
    sql: &impl Sql,
    params: &[Encoded],
    mut io: impl PgTransport,
) -> PrepareData {
    let persist = sql.persistent();
    let sql = sql.sql().trim();

    let key = CacheKey::new(sql, params.iter().map(Encoded::oid).collect::<Vec<_>>());

    if persist {
        if let Some(stmt) = io.get_stmt(&key) {
            return PrepareData { key, stmt, cache_hit: true, evicted: false, max_row: 0 };
        }
    }

    let (stmt, evicted) = match persist {
        true => io.reserve_stmt(),
        false => (StatementName::unnamed(), None),
    };

    if let Some(evicted) = &evicted {
        io.send(frontend::Close {
            variant: b'S',
            name: evicted.as_str(),
        });
    }

    io.send(frontend::Parse {
        prepare_name: stmt.as_str(),
        sql,
        oids_len: params.len().to_u16(),
        oids: params.iter().map(Encoded::oid),
    });
    io.send(frontend::Flush);

    PrepareData { key, stmt, cache_hit: false, evicted: evicted.is_some(), max_row: 0 }
}

/// Write the portal pipeline to `io`.
///
/// Flushing is required after call.
///
/// Responses possible:
/// - `BindComplete` from `Bind`
/// - `RowDescription` or `NoData` from `Describe`
/// - `DataRow` from `Execute`
/// - `Execute` phase is always terminated by the appearance of exactly one of these messages:
///   - `CommandComplete`
///   - `EmptyQueryResponse`
///   - `ErrorResponse`
///   - `PortalSuspended`
/// - `CloseComplete` from `Close`
/// - `ReadyForQuery` from `Sync`
fn portal(data: &PrepareData, params: &mut Vec<Encoded>, mut io: impl PgTransport) {
    let portal = PortalName::next();
    let param_formats = params.iter().map(Encoded::format).collect::<Vec<_>>();

    // all binary when forced; zero format codes otherwise, which is the
    // protocol's "every column in text" default
    let result_formats = match io.force_binary() {
        true => vec![PgFormat::Binary],
        false => Vec::new(),
    };

    io.send(frontend::Bind {
        portal_name: portal.as_str(),
        stmt_name: data.stmt.as_str(),
        param_formats_len: param_formats.len().to_u16(),
        param_formats,
        params_len: params.len().to_u16(),
        params_size_hint: params
            .iter()
            .fold(0, |acc, n| acc + 4 + n.value().len().to_u32()),
        params: mem::take(params).into_iter(),
        result_formats_len: result_formats.len().to_u16(),
        result_formats,
    });
    io.send(frontend::Describe {
        kind: b'P',
        name: portal.as_str(),
    });
    io.send(frontend::Execute {
        portal_name: portal.as_str(),
        max_row: data.max_row,
    });
    io.send(frontend::Close {
        variant: b'P',
        name: portal.as_str(),
    });
    io.send(frontend::Sync);
}

/// Decode information from [`CommandComplete`][1] message.
///
/// [1]: backend::CommandComplete
pub(crate) fn command_complete(cmd: backend::CommandComplete) -> u64 {
    let mut whs = cmd.tag.split_whitespace();
    let Some(tag) = whs.next() else {
        return 0;
    };
    let Some(rows) = whs.next() else {
        return 0;
    };
    match tag {
        "INSERT" => whs.next().unwrap_or_default(),
        "SELECT" => rows,
        "UPDATE" => rows,
        "DELETE" => rows,
        "MERGE" => rows,
        "FETCH" => rows,
        "MOVE" => rows,
        "COPY" => rows,
        _ => return 0,
    }
    .parse()
    .unwrap_or_default()
}

#[derive(Debug)]
#[must_use = "futures do nothing unless you `.await` or poll them"]
pub struct FetchStream<'val, SQL, ExeFut, IO, R> {
    sql: SQL,
    io: Option<IO>,
    data: Option<PrepareData>,
    phase: Phase<ExeFut>,
    params: Vec<Encoded<'val>>,
    max_row: u32,
    sync_sent: bool,
    cmd: Option<CommandComplete>,
    _p: PhantomData<R>,
}

#[derive(Debug)]
enum Phase<ExeFut> {
    Connect { f: ExeFut },
    Prepare,
    CloseEvicted,
    PrepareComplete,
    Portal,
    BindComplete,
    Description,
    DataRow(Row),
    PortalClose,
    ReadyForQuery,
    Complete,
}

impl<'val, SQL, ExeFut, IO, R> FetchStream<'val, SQL, ExeFut, IO, R> {
    pub fn new(
        sql: SQL,
        exe: ExeFut,
        params: Vec<Encoded<'val>>,
        max_row: u32,
    ) -> Self {
        Self {
            sql,
            io: None,
            data: None,
            phase: Phase::Connect { f: exe },
            params,
            max_row,
            sync_sent: false,
            cmd: None,
            _p: PhantomData,
        }
    }
}

impl<SQL, ExeFut, IO, R> FetchStream<'_, SQL, ExeFut, IO, R>
where
    IO: PgTransport,
{
    /// Terminal failure of the exchange.
    ///
    /// For a database error the server keeps streaming frames until the next
    /// `Sync`, so one is issued when none is in flight, and everything up to
    /// `ReadyForQuery` is discarded to keep the channel aligned.
    fn fail(&mut self, err: Error) -> Error {
        if matches!(err.kind(), ErrorKind::Database(_)) {
            if let Some(io) = self.io.as_mut() {
                if !self.sync_sent {
                    io.send(frontend::Sync);
                }
                io.ready_request();
            }
        }
        self.phase = Phase::Complete;
        err
    }
}

macro_rules! recv {
    ($me:ident, $cx:ident $(=> $ty:ty)?) => {
        match ready!($me.io.as_mut().unwrap().poll_recv$(::<$ty>)?($cx)) {
            Ok(ok) => ok,
            Err(err) => return Ready(Some(Err($me.fail(err)))),
        }
    };
}

impl<SQL, ExeFut, IO, R> Stream for FetchStream<'_, SQL, ExeFut, IO, R>
where
    SQL: Sql + Unpin,
    ExeFut: Future<Output = Result<IO>> + Unpin,
    IO: PgTransport + Unpin,
    R: FromRow + Unpin,
{
    type Item = Result<R>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let me = self.get_mut();

        loop {
            match &mut me.phase {
                Phase::Connect { f } => {
                    match ready!(Pin::new(f).poll(cx)) {
                        Ok(io) => {
                            me.io = Some(io);
                            me.phase = Phase::Prepare;
                        },
                        Err(err) => {
                            me.phase = Phase::Complete;
                            return Ready(Some(Err(err)));
                        },
                    }
                },
                Phase::Prepare => {
                    let data = prepare(&me.sql, &me.params, me.io.as_mut().unwrap());
                    me.phase = match (data.cache_hit, data.evicted) {
                        (true, _) => Phase::Portal,
                        (false, false) => Phase::PrepareComplete,
                        (false, true) => Phase::CloseEvicted,
                    };
                    me.data = Some(data);
                },
                Phase::CloseEvicted => {
                    recv!(me, cx => backend::CloseComplete);
                    me.phase = Phase::PrepareComplete;
                },
                Phase::PrepareComplete => {
                    recv!(me, cx => backend::ParseComplete);
                    let io = me.io.as_mut().unwrap();
                    let data = me.data.as_ref().unwrap();
                    if !data.stmt.is_unnamed() {
                        io.add_stmt(data.key.clone(), data.stmt.clone());
                    }
                    me.phase = Phase::Portal;
                },
                Phase::Portal => {
                    let data = me.data.as_mut().unwrap();
                    data.max_row = me.max_row;
                    portal(data, &mut me.params, me.io.as_mut().unwrap());
                    me.sync_sent = true;
                    me.phase = Phase::BindComplete;
                },
                Phase::BindComplete => {
                    recv!(me, cx => backend::BindComplete);
                    me.phase = Phase::Description;
                },
                Phase::Description => {
                    use backend::BackendMessage::*;
                    match recv!(me, cx) {
                        NoData(_) => { },
                        // received after `NoData`
                        CommandComplete(cmd) => {
                            me.cmd = Some(cmd);
                            me.phase = Phase::PortalClose;
                        },
                        EmptyQueryResponse(_) => {
                            me.phase = Phase::PortalClose;
                        },
                        RowDescription(rd) => {
                            let codecs = me.io.as_ref().unwrap().codecs();
                            me.phase = Phase::DataRow(Row::new(rd.body, codecs));
                        },
                        f => {
                            let err = me.fail(f.unexpected("description recv").into());
                            return Ready(Some(Err(err)));
                        },
                    }
                },
                Phase::DataRow(row) => {
                    use backend::BackendMessage::*;
                    // the error paths must not overlap the `row` borrow
                    match ready!(me.io.as_mut().unwrap().poll_recv(cx)) {
                        Ok(DataRow(dr)) => {
                            let row = match row.inner_clone(dr.body) {
                                Ok(ok) => ok,
                                Err(err) => {
                                    me.io.as_mut().unwrap().ready_request();
                                    me.phase = Phase::Complete;
                                    return Ready(Some(Err(err.into())));
                                },
                            };
                            let result = row.decode();
                            if result.is_err() {
                                me.io.as_mut().unwrap().ready_request();
                                me.phase = Phase::Complete;
                            }
                            return Ready(Some(result.map_err(Into::into)));
                        },

                        // `Execute` phase terminations:
                        Ok(CommandComplete(cmd)) => {
                            me.cmd = Some(cmd);
                            me.phase = Phase::PortalClose;
                        },
                        Ok(PortalSuspended(_)) => {
                            me.phase = Phase::PortalClose;
                        },
                        Ok(EmptyQueryResponse(_)) => {
                            me.phase = Phase::PortalClose;
                        },
                        Ok(f) => {
                            let err = me.fail(f.unexpected("fetching data rows").into());
                            return Ready(Some(Err(err)));
                        },
                        Err(err) => {
                            let err = me.fail(err);
                            return Ready(Some(Err(err)));
                        },
                    }
                },
                Phase::PortalClose => {
                    recv!(me, cx => backend::CloseComplete);
                    me.phase = Phase::ReadyForQuery;
                },
                Phase::ReadyForQuery => {
                    recv!(me, cx => backend::ReadyForQuery);
                    me.phase = Phase::Complete;
                },
                Phase::Complete => return Ready(None),
            }
        }
    }
}

#[derive(Debug)]
#[must_use = "futures do nothing unless you `.await` or poll them"]
pub struct FetchAll<'val, SQL, ExeFut, IO, R> {
    fetch: FetchStream<'val, SQL, ExeFut, IO, R>,
    output: Vec<R>,
}

impl<'val, SQL, ExeFut, IO, R> FetchAll<'val, SQL, ExeFut, IO, R> {
    pub fn new(sql: SQL, exe: ExeFut, params: Vec<Encoded<'val>>) -> Self {
        Self {
            fetch: FetchStream::new(sql, exe, params, 0),
            output: vec![],
        }
    }
}

impl<SQL, ExeFut, IO, R> Future for FetchAll<'_, SQL, ExeFut, IO, R>
where
    SQL: Sql + Unpin,
    ExeFut: Future<Output = Result<IO>> + Unpin,
    IO: PgTransport + Unpin,
    R: FromRow + Unpin,
{
    type Output = Result<Vec<R>>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context) -> Poll<Self::Output> {
        let me = self.get_mut();

        while let Some(r) = ready!(Pin::new(&mut me.fetch).poll_next(cx)?) {
            me.output.push(r);
        }

        Poll::Ready(Ok(std::mem::take(&mut me.output)))
    }
}

#[derive(Debug)]
#[must_use = "futures do nothing unless you `.await` or poll them"]
pub struct FetchOne<'val, SQL, ExeFut, IO, R> {
    fetch: FetchStream<'val, SQL, ExeFut, IO, R>,
    output: Option<R>,
}

impl<'val, SQL, ExeFut, IO, R> FetchOne<'val, SQL, ExeFut, IO, R> {
    pub fn new(sql: SQL, exe: ExeFut, params: Vec<Encoded<'val>>) -> Self {
        Self {
            fetch: FetchStream::new(sql, exe, params, 1),
            output: None,
        }
    }
}

impl<SQL, ExeFut, IO, R> Future for FetchOne<'_, SQL, ExeFut, IO, R>
where
    SQL: Sql + Unpin,
    ExeFut: Future<Output = Result<IO>> + Unpin,
    IO: PgTransport + Unpin,
    R: FromRow + Unpin,
{
    type Output = Result<R>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context) -> Poll<Self::Output> {
        let me = self.get_mut();

        while let Some(r) = ready!(Pin::new(&mut me.fetch).poll_next(cx)?) {
            me.output = Some(r);
        }

        match me.output.take() {
            Some(row) => Ready(Ok(row)),
            None => Ready(Err(RowNotFound.into())),
        }
    }
}

#[derive(Debug)]
#[must_use = "futures do nothing unless you `.await` or poll them"]
pub struct FetchOptional<'val, SQL, ExeFut, IO, R> {
    fetch: FetchStream<'val, SQL, ExeFut, IO, R>,
    output: Option<R>,
}

impl<'val, SQL, ExeFut, IO, R> FetchOptional<'val, SQL, ExeFut, IO, R> {
    pub fn new(sql: SQL, exe: ExeFut, params: Vec<Encoded<'val>>) -> Self {
        Self {
            fetch: FetchStream::new(sql, exe, params, 1),
            output: None,
        }
    }
}

impl<SQL, ExeFut, IO, R> Future for FetchOptional<'_, SQL, ExeFut, IO, R>
where
    SQL: Sql + Unpin,
    ExeFut: Future<Output = Result<IO>> + Unpin,
    IO: PgTransport + Unpin,
    R: FromRow + Unpin,
{
    type Output = Result<Option<R>>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context) -> Poll<Self::Output> {
        let me = self.get_mut();

        while let Some(r) = ready!(Pin::new(&mut me.fetch).poll_next(cx)?) {
            me.output = Some(r);
        }

        Ready(Ok(me.output.take()))
    }
}

#[derive(Debug)]
#[must_use = "futures do nothing unless you `.await` or poll them"]
pub struct Execute<'val, SQL, ExeFut, IO> {
    fetch: FetchStream<'val, SQL, ExeFut, IO, ()>,
}

impl<'val, SQL, ExeFut, IO> Execute<'val, SQL, ExeFut, IO> {
    pub fn new(sql: SQL, exe: ExeFut, params: Vec<Encoded<'val>>) -> Self {
        Self {
            fetch: FetchStream::new(sql, exe, params, 0),
        }
    }
}

impl<SQL, ExeFut, IO> Future for Execute<'_, SQL, ExeFut, IO>
where
    SQL: Sql + Unpin,
    ExeFut: Future<Output = Result<IO>> + Unpin,
    IO: PgTransport + Unpin,
{
    type Output = Result<RowResult>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context) -> Poll<Self::Output> {
        let me = self.get_mut();

        while ready!(Pin::new(&mut me.fetch).poll_next(cx)?).is_some() { }

        // statements without a command tag, `NoData` flows, affect no rows
        let rows_affected = me.fetch.cmd.take().map(command_complete).unwrap_or_default();
        Poll::Ready(Ok(RowResult { rows_affected }))
    }
}

#[cfg(test)]
mod test {
    use std::{num::NonZeroUsize, pin::Pin, task::{Context, Poll}};

    use super::*;
    use crate::{
        Encode, ErrorKind,
        common::ByteStr,
        executor::Executor,
        postgres::oid,
        statement::StatementCache,
        testing::*,
    };

    fn fetch_all<R: FromRow + Unpin>(
        io: &mut MockIo,
        sql: &'static str,
        params: Vec<Encoded<'static>>,
    ) -> crate::Result<Vec<R>> {
        block_on(FetchAll::new(sql, io.connection(), params))
    }

    #[test]
    fn pipeline_emits_in_order_and_closes_portal() {
        let mut io = MockIo::new(StatementCache::unbounded(), vec![
            unit(b'1'), // ParseComplete
            unit(b'2'), // BindComplete
            row_description(&[("v", oid::INT4, 1)]),
            data_row(&[&7i32.to_be_bytes()]),
            command_complete_msg("SELECT 1"),
            unit(b'3'), // CloseComplete
            ready_for_query(b'I'),
        ]);

        let rows = fetch_all::<(i32,)>(&mut io, "SELECT $1", vec![7i32.encode()]).unwrap();
        assert_eq!(rows, vec![(7,)]);

        // Parse, Flush, then Bind, Describe, Execute, Close portal, Sync
        assert_eq!(io.sent_tags(), "PHBDECS");

        let (_, close_body) = &io.sent[5];
        assert_eq!(close_body[0], b'P');
    }

    // with force_binary off the Bind carries zero result-format codes, the
    // protocol's all-text default; with it on, one binary code covers every
    // column
    #[test]
    fn force_binary_selects_result_formats() {
        let mut io = MockIo::new(StatementCache::unbounded(), vec![
            unit(b'1'),
            unit(b'2'),
            row_description(&[("v", oid::INT4, 0)]),
            data_row(&[b"7"]),
            command_complete_msg("SELECT 1"),
            unit(b'3'),
            ready_for_query(b'I'),
        ]);

        let rows = fetch_all::<(i32,)>(&mut io, "SELECT $1", vec![7i32.encode()]).unwrap();
        assert_eq!(rows, vec![(7,)]);
        let (_, bind) = &io.sent[2];
        assert_eq!(&bind[bind.len() - 2..], &[0, 0]);

        let mut io = MockIo::new(StatementCache::unbounded(), vec![
            unit(b'1'),
            unit(b'2'),
            row_description(&[("v", oid::INT4, 1)]),
            data_row(&[&7i32.to_be_bytes()]),
            command_complete_msg("SELECT 1"),
            unit(b'3'),
            ready_for_query(b'I'),
        ]);
        io.force_binary = true;

        let rows = fetch_all::<(i32,)>(&mut io, "SELECT $1", vec![7i32.encode()]).unwrap();
        assert_eq!(rows, vec![(7,)]);
        let (_, bind) = &io.sent[2];
        assert_eq!(&bind[bind.len() - 4..], &[0, 1, 0, 1]);
    }

    #[test]
    fn cache_hit_skips_parse() {
        let mut io = MockIo::new(StatementCache::unbounded(), vec![
            unit(b'1'),
            unit(b'2'),
            row_description(&[("v", oid::INT4, 1)]),
            command_complete_msg("SELECT 0"),
            unit(b'3'),
            ready_for_query(b'I'),
            // second run, no ParseComplete
            unit(b'2'),
            row_description(&[("v", oid::INT4, 1)]),
            command_complete_msg("SELECT 0"),
            unit(b'3'),
            ready_for_query(b'I'),
        ]);

        fetch_all::<(Option<i32>,)>(&mut io, "SELECT $1", vec![1i32.encode()]).unwrap();
        io.sent.clear();
        fetch_all::<(Option<i32>,)>(&mut io, "SELECT $1", vec![2i32.encode()]).unwrap();

        assert_eq!(io.sent_tags(), "BDECS");
        let (_, bind) = &io.sent[0];
        // portal name, then the cached statement name
        let stmt = bind.split(|b| *b == 0).nth(1).unwrap();
        assert_eq!(stmt, b"S_0");
    }

    #[test]
    fn same_sql_different_types_parses_again() {
        let mut io = MockIo::new(StatementCache::unbounded(), vec![
            unit(b'1'),
            unit(b'2'),
            row_description(&[("v", oid::INT4, 1)]),
            command_complete_msg("SELECT 0"),
            unit(b'3'),
            ready_for_query(b'I'),
            unit(b'1'),
            unit(b'2'),
            row_description(&[("v", oid::INT4, 1)]),
            command_complete_msg("SELECT 0"),
            unit(b'3'),
            ready_for_query(b'I'),
        ]);

        fetch_all::<(Option<i32>,)>(&mut io, "SELECT $1", vec![1i32.encode()]).unwrap();
        io.sent.clear();
        fetch_all::<(Option<i32>,)>(&mut io, "SELECT $1", vec![1i64.encode()]).unwrap();

        // (sql, [INT8]) is a distinct cache key from (sql, [INT4])
        assert_eq!(io.sent_tags(), "PHBDECS");
    }

    // limit=2, access A, B, A, C: C evicts B with a Close(Statement, "S_1")
    // right before its own Parse
    #[test]
    fn bounded_cache_eviction_closes_eldest() {
        let ok_flow = |stmt_rows: &[(u8, bytes::Bytes)]| {
            let mut v = vec![];
            v.extend_from_slice(stmt_rows);
            v.extend_from_slice(&[
                unit(b'2'),
                row_description(&[("v", oid::INT4, 1)]),
                command_complete_msg("SELECT 0"),
                unit(b'3'),
                ready_for_query(b'I'),
            ]);
            v
        };

        let mut script = vec![];
        script.extend(ok_flow(&[unit(b'1')])); // A: Parse
        script.extend(ok_flow(&[unit(b'1')])); // B: Parse
        script.extend(ok_flow(&[])); // A: hit
        script.extend(ok_flow(&[unit(b'3'), unit(b'1')])); // C: Close evicted + Parse

        let mut io = MockIo::new(
            StatementCache::bounded(NonZeroUsize::new(2).unwrap()),
            script,
        );

        for sql in ["A", "B", "A"] {
            fetch_all::<(Option<i32>,)>(&mut io, sql, vec![1i32.encode()]).unwrap();
        }

        io.sent.clear();
        fetch_all::<(Option<i32>,)>(&mut io, "C", vec![1i32.encode()]).unwrap();

        // Close(Statement, S_1), Parse(S_2), Flush, then the portal pipeline
        assert_eq!(io.sent_tags(), "CPHBDECS");
        let (_, close) = &io.sent[0];
        assert_eq!(&close[..], b"SS_1\0");
        let (_, parse) = &io.sent[1];
        assert!(parse.starts_with(b"S_2\0"));
    }

    // the stream yields the row that arrived before the error, then fails
    // with the database error, and the transport discards until
    // `ReadyForQuery` so the next exchange starts aligned
    #[test]
    fn error_mid_stream_yields_then_fails() {
        let mut io = MockIo::new(StatementCache::unbounded(), vec![
            unit(b'1'),
            unit(b'2'),
            row_description(&[("v", oid::INT4, 1)]),
            data_row(&[&1i32.to_be_bytes()]),
            error_response("23505"),
            ready_for_query(b'I'),
            // next exchange runs clean
            unit(b'1'),
            unit(b'2'),
            row_description(&[("v", oid::INT4, 1)]),
            command_complete_msg("SELECT 0"),
            unit(b'3'),
            ready_for_query(b'I'),
        ]);

        let mut stream = FetchStream::<_, _, _, (i32,)>::new(
            "SELECT $1",
            (&mut io).connection(),
            vec![1i32.encode()],
            0,
        );

        let waker = std::task::Waker::noop();
        let mut cx = Context::from_waker(waker);

        let Poll::Ready(Some(Ok(row))) = Pin::new(&mut stream).poll_next(&mut cx) else {
            panic!("expected first row");
        };
        assert_eq!(row, (1,));

        let Poll::Ready(Some(Err(err))) = Pin::new(&mut stream).poll_next(&mut cx) else {
            panic!("expected stream failure");
        };
        let ErrorKind::Database(db) = err.kind() else {
            panic!("expected database error");
        };
        assert_eq!(db.code, "23505");
        assert!(!db.is_retryable());

        assert!(matches!(Pin::new(&mut stream).poll_next(&mut cx), Poll::Ready(None)));
        drop(stream);

        // the pending discard swallows frames up to ReadyForQuery, so the
        // next exchange sees only its own frames
        let rows = fetch_all::<(Option<i32>,)>(&mut io, "NEXT", vec![1i32.encode()]).unwrap();
        assert!(rows.is_empty());
    }

    // a Parse error arrives before Sync is on the wire, so the executor
    // must issue one itself
    #[test]
    fn parse_error_sends_sync() {
        let mut io = MockIo::new(StatementCache::unbounded(), vec![
            error_response("42601"),
            ready_for_query(b'I'),
        ]);

        let err = fetch_all::<(i32,)>(&mut io, "SELEC 1", vec![]).unwrap_err();
        let ErrorKind::Database(db) = err.kind() else {
            panic!("expected database error");
        };
        assert_eq!(db.code, "42601");

        // Parse, Flush, then the recovery Sync
        assert_eq!(io.sent_tags(), "PHS");
        // nothing cached for the failed statement
        assert!(io.stmts.is_empty());
        // discard-until-ReadyForQuery is pending for the next operation
        assert_eq!(io.discarding, 1);
    }

    #[test]
    fn non_persistent_sql_parses_unnamed() {
        use crate::sql::SqlExt;

        let mut io = MockIo::new(StatementCache::unbounded(), vec![
            unit(b'1'),
            unit(b'2'),
            row_description(&[("v", oid::INT4, 1)]),
            command_complete_msg("SELECT 0"),
            unit(b'3'),
            ready_for_query(b'I'),
        ]);

        block_on(FetchAll::<_, _, _, (Option<i32>,)>::new(
            "SELECT $1".once(),
            (&mut io).connection(),
            vec![1i32.encode()],
        ))
        .unwrap();

        let (_, parse) = &io.sent[0];
        // empty statement name
        assert_eq!(parse[0], 0);
        assert!(io.stmts.is_empty());
    }

    #[test]
    fn command_complete_tags() {
        let cmd = |tag: &str| {
            command_complete(backend::CommandComplete { tag: ByteStr::copy_from_str(tag) })
        };
        assert_eq!(cmd("INSERT 0 42"), 42);
        assert_eq!(cmd("UPDATE 42"), 42);
        assert_eq!(cmd("SELECT 42"), 42);
        assert_eq!(cmd("DELETE 7"), 7);
        assert_eq!(cmd("CREATE TABLE"), 0);
        assert_eq!(cmd("BEGIN"), 0);
    }
}
