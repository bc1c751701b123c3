//! Type integration with external types
//!
//! Implementation [`Decode`][d] and [`Encode`][e] for external types.
//!
//! Available for:
//!
//! - [`serde`]'s [`Deserialize`][sd] and [`Serialize`][ss] via [`Json`]
//! - [`time`][::time]'s [`Date`][td], [`Time`][tt], [`PrimitiveDateTime`][tp]
//!   and [`UtcDateTime`][tu]
//!
//! [d]: crate::Decode
//! [e]: crate::Encode
//! [sd]: serde::Deserialize
//! [ss]: serde::Serialize
//! [td]: ::time::Date
//! [tt]: ::time::Time
//! [tp]: ::time::PrimitiveDateTime
//! [tu]: ::time::UtcDateTime

mod json;
pub use json::Json;

mod time;
