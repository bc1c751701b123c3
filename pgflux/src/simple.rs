//! The simple query flow.
//!
//! One `Query` message carries whole statements, possibly several separated
//! by `;`, each answered by its own `RowDescription`/`DataRow`s/
//! `CommandComplete`, with a single `ReadyForQuery` at the very end. Result
//! values always arrive in the text transmission format.
//!
//! This is the path for transaction control and session settings, where
//! parameters are not needed and prepared statements get in the way.
//!
//! <https://www.postgresql.org/docs/current/protocol-flow.html#PROTOCOL-FLOW-SIMPLE-QUERY>
use crate::{
    Result, Row,
    fetch::command_complete,
    postgres::{BackendMessage, ProtocolError, backend, frontend},
    transport::{PgTransport, PgTransportExt},
};

/// Result of one statement in a simple query.
#[derive(Debug)]
pub struct StatementResult {
    pub rows: Vec<Row>,
    pub rows_affected: u64,
}

/// Perform a simple query, one result per `;` separated statement.
pub async fn simple_query<IO: PgTransport>(sql: &str, mut io: IO) -> Result<Vec<StatementResult>> {
    io.send(frontend::Query { sql });
    io.flush().await?;

    let mut results = Vec::new();
    let mut template: Option<Row> = None;
    let mut rows = Vec::new();

    loop {
        use BackendMessage::*;
        let message = match io.recv().await {
            Ok(ok) => ok,
            Err(err) => {
                // the backend follows an in-query error with its own
                // ReadyForQuery, let the transport consume it
                io.ready_request();
                return Err(err);
            },
        };
        match message {
            // Indicates that rows are about to be returned in response to a SELECT, FETCH, etc. query.
            // The contents of this message describe the column layout of the rows.
            RowDescription(rd) => {
                let codecs = io.codecs();
                template = Some(Row::new(rd.body, codecs));
            },
            // One of the set of rows returned by a SELECT, FETCH, etc. query.
            DataRow(dr) => {
                let Some(template) = template.as_ref() else {
                    return Err(ProtocolError::unexpected_phase(
                        backend::DataRow::MSGTYPE,
                        "simple query",
                    )
                    .into());
                };
                rows.push(template.inner_clone(dr.body)?);
            },
            // An SQL command completed normally.
            CommandComplete(cmd) => {
                template = None;
                results.push(StatementResult {
                    rows: std::mem::take(&mut rows),
                    rows_affected: command_complete(cmd),
                });
            },
            // An empty query string substitutes CommandComplete.
            EmptyQueryResponse(_) => {
                template = None;
                results.push(StatementResult {
                    rows: std::mem::take(&mut rows),
                    rows_affected: 0,
                });
            },
            // COPY is not driven over this path; refuse the transfer and let
            // the backend report the failure.
            CopyInResponse(_) => {
                io.send(frontend::CopyFail { message: "COPY is not supported here" });
                io.flush().await?;
            },
            // drain an unsolicited copy-out stream to stay aligned
            CopyOutResponse(_) | CopyData(_) | CopyDone(_) => { },
            ReadyForQuery(_) => break,
            f => return Err(f.unexpected("simple query").into()),
        }
    }

    Ok(results)
}

#[cfg(test)]
mod test {
    use std::{future::Future, task::{Context, Poll}};

    use super::*;
    use crate::{ErrorKind, postgres::oid, statement::StatementCache, testing::*};

    fn run(io: &mut MockIo, sql: &str) -> Result<Vec<StatementResult>> {
        let mut f = Box::pin(simple_query(sql, io));
        let waker = std::task::Waker::noop();
        let mut cx = Context::from_waker(waker);
        loop {
            if let Poll::Ready(out) = f.as_mut().poll(&mut cx) {
                return out;
            }
        }
    }

    #[test]
    fn multi_statement_results() {
        let mut io = MockIo::new(StatementCache::disabled(), vec![
            row_description(&[("v", oid::INT4, 0)]),
            data_row(&[b"1"]),
            data_row(&[b"2"]),
            command_complete_msg("SELECT 2"),
            command_complete_msg("SET"),
            ready_for_query(b'I'),
        ]);

        let results = run(&mut io, "SELECT v FROM t; SET search_path TO public").unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].rows.len(), 2);
        assert_eq!(results[0].rows_affected, 2);
        // simple query rows arrive in the text format
        assert_eq!(results[0].rows[1].try_get::<_, i32>("v").unwrap(), 2);
        assert!(results[1].rows.is_empty());

        assert_eq!(io.sent_tags(), "Q");
    }

    #[test]
    fn error_requests_discard() {
        let mut io = MockIo::new(StatementCache::disabled(), vec![
            row_description(&[("v", oid::INT4, 0)]),
            data_row(&[b"1"]),
            error_response("42601"),
            ready_for_query(b'I'),
        ]);

        let err = run(&mut io, "SELECT syntax error").unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::Database(db) if db.code == "42601"));
        // the trailing ReadyForQuery is consumed by the requested discard
        assert_eq!(io.discarding, 1);
    }

    #[test]
    fn empty_query_acknowledged() {
        let mut io = MockIo::new(StatementCache::disabled(), vec![
            unit(b'I'),
            ready_for_query(b'I'),
        ]);

        let results = run(&mut io, "").unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].rows_affected, 0);
    }

    #[test]
    fn copy_in_is_refused() {
        let mut io = MockIo::new(StatementCache::disabled(), vec![
            // CopyInResponse: text format, one column
            (b'G', bytes::Bytes::from_static(&[0, 0, 1, 0, 0])),
            error_response("57014"),
            ready_for_query(b'I'),
        ]);

        let err = run(&mut io, "COPY t FROM STDIN").unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::Database(_)));
        // Query then CopyFail
        assert_eq!(io.sent_tags(), "Qf");
    }
}
