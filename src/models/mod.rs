//! Data objects exchanged with the gateway and moderation layers.

pub mod member;
pub mod message;
pub mod snowflake;

pub use member::MemberSnapshot;
pub use message::{Attachment, AttachmentRef, IncomingMessage, MessageRecord};
pub use snowflake::Snowflake;
