//! Test support: a scripted in-memory transport and message builders.
use bytes::{BufMut, Bytes, BytesMut};
use std::{
    collections::VecDeque,
    io,
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
};

use crate::{
    Result,
    codec::Registry,
    ext::BufMutExt,
    postgres::{BackendProtocol, DatabaseError, FrontendProtocol, Oid, backend, frontend},
    statement::{CacheKey, StatementCache, StatementName},
    transaction::TransactionStatus,
    transport::PgTransport,
};

/// Scripted transport: responses queued up front, sent frames recorded.
pub(crate) struct MockIo {
    pub incoming: VecDeque<(u8, Bytes)>,
    pub sent: Vec<(u8, Bytes)>,
    pub stmts: StatementCache,
    pub discarding: usize,
    pub tx_status: TransactionStatus,
    pub force_binary: bool,
}

impl MockIo {
    pub fn new(stmts: StatementCache, script: Vec<(u8, Bytes)>) -> Self {
        Self {
            incoming: script.into(),
            sent: Vec::new(),
            stmts,
            discarding: 0,
            tx_status: TransactionStatus::Idle,
            force_binary: false,
        }
    }

    pub fn sent_tags(&self) -> String {
        self.sent.iter().map(|(tag, _)| *tag as char).collect()
    }
}

impl PgTransport for MockIo {
    fn poll_flush(&mut self, _: &mut Context) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_recv<B: BackendProtocol>(&mut self, _: &mut Context) -> Poll<Result<B>> {
        loop {
            let (msgtype, body) = self.incoming.pop_front().expect("script exhausted");
            if msgtype == backend::ReadyForQuery::MSGTYPE {
                self.tx_status = TransactionStatus::from_code(body[0]);
            }
            if self.discarding > 0 {
                if msgtype == backend::ReadyForQuery::MSGTYPE {
                    self.discarding -= 1;
                }
                continue;
            }
            if msgtype == backend::ErrorResponse::MSGTYPE {
                return Poll::Ready(Err(DatabaseError::parse(body).into()));
            }
            return Poll::Ready(Ok(B::decode(msgtype, body).unwrap()));
        }
    }

    fn ready_request(&mut self) {
        self.discarding += 1;
    }

    fn send<F: FrontendProtocol>(&mut self, message: F) {
        let mut buf = BytesMut::new();
        frontend::write(message, &mut buf);
        let mut buf = buf.freeze();
        let tag = bytes::Buf::get_u8(&mut buf);
        let len = bytes::Buf::get_u32(&mut buf) as usize;
        assert_eq!(len - 4, buf.len());
        self.sent.push((tag, buf));
    }

    fn send_startup(&mut self, _: frontend::Startup) {
        unreachable!("scripted transports begin past the startup phase")
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
        Registry::shared()
    }

    fn force_binary(&self) -> bool {
        self.force_binary
    }

    fn transaction_status(&self) -> TransactionStatus {
        self.tx_status
    }
}

pub(crate) fn unit(tag: u8) -> (u8, Bytes) {
    (tag, Bytes::new())
}

pub(crate) fn command_complete_msg(tag: &str) -> (u8, Bytes) {
    let mut body = BytesMut::new();
    body.put_nul_string(tag);
    (b'C', body.freeze())
}

pub(crate) fn ready_for_query(tx_status: u8) -> (u8, Bytes) {
    (b'Z', Bytes::copy_from_slice(&[tx_status]))
}

pub(crate) fn row_description(fields: &[(&str, Oid, u16)]) -> (u8, Bytes) {
    let mut body = BytesMut::new();
    body.put_u16(fields.len() as u16);
    for (name, oid, format) in fields {
        body.put_nul_string(name);
        body.put_u32(0); // table oid
        body.put_u16(0); // column number
        body.put_u32(*oid);
        body.put_i16(-1); // data type size
        body.put_i32(-1); // type modifier
        body.put_u16(*format);
    }
    (b'T', body.freeze())
}

pub(crate) fn data_row(values: &[&[u8]]) -> (u8, Bytes) {
    let mut body = BytesMut::new();
    body.put_u16(values.len() as u16);
    for value in values {
        body.put_i32(value.len() as i32);
        body.put(*value);
    }
    (b'D', body.freeze())
}

pub(crate) fn error_response(code: &str) -> (u8, Bytes) {
    let mut body = BytesMut::new();
    body.put_u8(b'S');
    body.put_nul_string("ERROR");
    body.put_u8(b'C');
    body.put_nul_string(code);
    body.put_u8(b'M');
    body.put_nul_string("boom");
    body.put_u8(0);
    (b'E', body.freeze())
}

pub(crate) fn notification(process_id: u32, channel: &str, payload: &str) -> (u8, Bytes) {
    let mut body = BytesMut::new();
    body.put_u32(process_id);
    body.put_nul_string(channel);
    body.put_nul_string(payload);
    (b'A', body.freeze())
}

/// Wrap a scripted message into its wire envelope.
pub(crate) fn frame(msg: (u8, Bytes)) -> Vec<u8> {
    let (tag, body) = msg;
    let mut out = Vec::with_capacity(5 + body.len());
    out.push(tag);
    out.extend_from_slice(&(body.len() as u32 + 4).to_be_bytes());
    out.extend_from_slice(&body);
    out
}

/// Drive a future that never returns `Pending` for real (scripted
/// transports resolve immediately).
pub(crate) fn block_on<F: Future + Unpin>(mut f: F) -> F::Output {
    let waker = std::task::Waker::noop();
    let mut cx = Context::from_waker(waker);
    loop {
        if let Poll::Ready(out) = Pin::new(&mut f).poll(&mut cx) {
            return out;
        }
    }
}
