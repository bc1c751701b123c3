//! Reactive Postgres Driver
//!
//! A demand-driven client for the PostgreSQL frontend/backend protocol 3.0
//! over TCP, TLS or a unix socket.
//!
//! # Examples
//!
//! Single connection:
//!
//! ```no_run
//! use pgflux::Connection;
//!
//! # async fn app() -> pgflux::Result<()> {
//! let mut conn = Connection::connect_env().await?;
//!
//! let res = pgflux::query::<_, _, (i32, String)>("SELECT 420,$1", &mut conn)
//!     .bind("Foo")
//!     .fetch_one()
//!     .await?;
//!
//! assert_eq!(res.0, 420);
//! assert_eq!(res.1.as_str(), "Foo");
//! # Ok(())
//! # }
//! ```
//!
//! Listening for notifications:
//!
//! ```no_run
//! use pgflux::Connection;
//!
//! # async fn app() -> pgflux::Result<()> {
//! let mut conn = Connection::connect_env().await?;
//! let mut notices = conn.notifications();
//!
//! pgflux::simple::simple_query("LISTEN updates", &mut conn).await?;
//!
//! while let Some(n) = notices.recv().await {
//!     println!("{}: {}", n.channel(), n.payload());
//! }
//! # Ok(())
//! # }
//! ```

pub mod common;
mod io;
mod net;
mod ext;

// Protocol
pub mod postgres;

// Encoding
mod value;
pub mod encode;
pub mod codec;

// Component
pub mod statement;
pub mod sql;
pub mod row;
pub mod types;

// Operation
pub mod transport;
pub mod executor;
pub mod fetch;
pub mod query;
pub mod simple;
pub mod transaction;

// Connection
pub mod connection;

mod error;

#[cfg(test)]
mod testing;

pub use codec::{PgValue, Registry};
pub use encode::Encode;
pub use row::{Row, FromRow, Decode, DecodeError};
pub use sql::SqlExt;

pub use executor::Executor;
pub use connection::{Config, Connection, SslMode};
pub use net::TlsError;
pub use transaction::TransactionStatus;
#[doc(inline)]
pub use query::{query, execute};
#[doc(inline)]
pub use transaction::begin;
pub use error::{Error, ErrorKind, Result};
