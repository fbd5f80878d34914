//! modlog - retention-bounded audit cache for a moderation-log bot.
//!
//! Remembers what the platform forgets: member roles after they leave,
//! message content after it is edited or deleted, and recent messages of
//! a user at ban time.
//!
//! ## Architecture
//!
//! - `store` - TTL-aware key-value engine on redb
//! - `models` - stored records and inbound payloads
//! - `fetcher` - bounded attachment downloads
//! - `cache` - member snapshots, message records and the author index
//! - `sweeper` - periodic reclamation of expired entries
//! - `events` - gateway event routing and moderation reports
//! - `config` - environment configuration

pub mod cache;
pub mod config;
pub mod events;
pub mod fetcher;
pub mod models;
pub mod store;
pub mod sweeper;

pub use cache::{AuditCache, AuditConfig, CacheStats};
pub use config::{Config, ConfigError};
pub use events::{AuditEvent, AuditEvents, AuditReport};
pub use fetcher::{AttachmentFetcher, HttpFetcher};
pub use store::{CacheError, CacheResult, KvEngine};
pub use sweeper::{RetentionSweeper, SweepReport, SweeperConfig};
