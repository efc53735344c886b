//! Strongly-typed identifiers
//!
//! Every identifier wraps a UUID. Fresh identifiers are time-ordered (v7)
//! so rows created later also sort later, which keeps "newest first"
//! listings stable when two claims share a creation timestamp.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

/// Rejected identifier text
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("invalid {kind} identifier: {value}")]
pub struct IdParseError {
    pub kind: &'static str,
    pub value: String,
}

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::now_v7())
            }

            /// Alias of [`Self::new`] kept for call sites that want the
            /// ordering guarantee spelled out
            pub fn new_v7() -> Self {
                Self::new()
            }

            pub fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            pub fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        /// Renders as `PREFIX-uuid`
        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}-{}", $prefix, self.0)
            }
        }

        /// Accepts both the prefixed form and a bare UUID
        impl FromStr for $name {
            type Err = IdParseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let bare = s.strip_prefix(concat!($prefix, "-")).unwrap_or(s);
                Uuid::parse_str(bare).map(Self).map_err(|_| IdParseError {
                    kind: stringify!($name),
                    value: s.to_string(),
                })
            }
        }

        impl From<Uuid> for $name {
            fn from(uuid: Uuid) -> Self {
                Self(uuid)
            }
        }

        impl From<$name> for Uuid {
            fn from(id: $name) -> Uuid {
                id.0
            }
        }
    };
}

define_id!(
    /// An expense claim
    ExpenseId,
    "EXP"
);

define_id!(
    /// A user known to the identity directory
    UserId,
    "USR"
);

define_id!(
    /// One reconciliation pass
    RunId,
    "RUN"
);
