// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Job tags: `(type, name, scope)` tuples attached via a link table.

use serde::{Deserialize, Serialize};

/// Visibility scope of a tag.
///
/// `global` tags are visible to everyone, `admin` tags to administrators;
/// any other value is the owning username.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TagScope {
    Global,
    Admin,
    User(String),
}

impl TagScope {
    pub fn parse(s: &str) -> TagScope {
        match s {
            "global" => TagScope::Global,
            "admin" => TagScope::Admin,
            user => TagScope::User(user.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            TagScope::Global => "global",
            TagScope::Admin => "admin",
            TagScope::User(u) => u,
        }
    }

    /// Whether a user operating in `user_scope` may see or detach this tag.
    pub fn readable_by(&self, user: &str, is_admin: bool) -> bool {
        match self {
            TagScope::Global => true,
            TagScope::Admin => is_admin,
            TagScope::User(owner) => owner == user,
        }
    }
}

impl std::fmt::Display for TagScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A tag row. `id` is zero until persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    #[serde(default, skip_serializing_if = "is_zero")]
    pub id: i64,
    #[serde(rename = "type")]
    pub tag_type: String,
    pub name: String,
    #[serde(default = "default_scope")]
    pub scope: String,
}

fn is_zero(v: &i64) -> bool {
    *v == 0
}

fn default_scope() -> String {
    "global".to_string()
}

impl Tag {
    pub fn new(tag_type: impl Into<String>, name: impl Into<String>, scope: impl Into<String>) -> Self {
        Self { id: 0, tag_type: tag_type.into(), name: name.into(), scope: scope.into() }
    }
}

#[cfg(test)]
#[path = "tag_tests.rs"]
mod tests;
