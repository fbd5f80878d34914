//! Member snapshot model.
//!
//! Last-known state of a guild member, kept so the leave handler can
//! report roles after the platform has forgotten them.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberSnapshot {
    pub guild_id: String,
    pub user_id: String,
    /// Role IDs. A set, so role order never affects equality.
    pub roles: BTreeSet<String>,
    #[serde(default)]
    pub nickname: Option<String>,
    pub joined_at: DateTime<Utc>,
}

impl MemberSnapshot {
    /// Create a snapshot with no roles and no nickname.
    pub fn new(
        guild_id: impl Into<String>,
        user_id: impl Into<String>,
        joined_at: DateTime<Utc>,
    ) -> Self {
        Self {
            guild_id: guild_id.into(),
            user_id: user_id.into(),
            roles: BTreeSet::new(),
            nickname: None,
            joined_at,
        }
    }

    #[must_use]
    pub fn with_roles<I, S>(mut self, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.roles = roles.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn with_nickname(mut self, nickname: impl Into<String>) -> Self {
        self.nickname = Some(nickname.into());
        self
    }
}
