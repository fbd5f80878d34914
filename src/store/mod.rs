//! Storage layer - embedded KV engine with TTL.
//!
//! ## Architecture
//!
//! - `engine` - `redb`-backed ordered store with deadlines, prefix scans
//!   and closure-scoped transactions
//! - `clock` - injectable time source for expiry decisions
//! - `keys` - key layout for members, messages and the author index
//! - `codec` - value serialization
//! - `error` - `CacheError` and helpers

pub mod codec;
pub mod keys;

mod clock;
mod engine;
mod error;

pub use clock::{Clock, ManualClock, SystemClock};
pub use engine::{Entry, KvEngine, ReadView, WriteBatch};
pub use error::{CacheError, CacheResult, OptionalExt};
