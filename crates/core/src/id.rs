// SPDX-License-Identifier: MIT

//! Identifier types and generation abstractions.
//!
//! Rows in the store carry sequential numeric ids assigned at creation;
//! job runs (external dispatches) carry string ids so they can embed a
//! UUID that survives round-trips through the external executor.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Trait for truncating identifiers to a short prefix.
pub trait ShortId {
    /// Returns a string slice truncated to at most `n` characters.
    fn short(&self, n: usize) -> &str;
}

impl ShortId for str {
    fn short(&self, n: usize) -> &str {
        if self.len() <= n {
            self
        } else {
            &self[..n]
        }
    }
}

/// Define a newtype ID wrapper around `u64`.
///
/// Generates `new()`, `value()`, `Display`, `From<u64>`, and ordering
/// implementations. Store-assigned ids start at 1; `0` never names a row.
#[macro_export]
macro_rules! define_row_id {
    (
        $(#[$meta:meta])*
        pub struct $name:ident;
    ) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord,
            serde::Serialize, serde::Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl $name {
            pub fn new(id: u64) -> Self {
                Self(id)
            }

            pub fn value(&self) -> u64 {
                self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<u64> for $name {
            fn from(id: u64) -> Self {
                Self(id)
            }
        }
    };
}

/// Identifier of a job run (one dispatch to an executor).
///
/// String-valued so external systems can hand it back verbatim; in
/// production it is a UUID from [`UuidRunIdGen`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunId(pub String);

impl RunId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns a string slice truncated to at most `n` characters.
    pub fn short(&self, n: usize) -> &str {
        self.0.short(n)
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for RunId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for RunId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl std::borrow::Borrow<str> for RunId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// Generates unique run identifiers.
pub trait RunIdGen: Clone + Send + Sync {
    fn next(&self) -> RunId;
}

/// UUID-based generator for production use.
#[derive(Clone, Default)]
pub struct UuidRunIdGen;

impl RunIdGen for UuidRunIdGen {
    fn next(&self) -> RunId {
        RunId::new(uuid::Uuid::new_v4().to_string())
    }
}

/// Sequential generator for deterministic tests.
#[derive(Clone)]
pub struct SequentialRunIdGen {
    prefix: String,
    counter: Arc<AtomicU64>,
}

impl SequentialRunIdGen {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            counter: Arc::new(AtomicU64::new(1)),
        }
    }
}

impl Default for SequentialRunIdGen {
    fn default() -> Self {
        Self::new("run")
    }
}

impl RunIdGen for SequentialRunIdGen {
    fn next(&self) -> RunId {
        let n = self.counter.fetch_add(1, Ordering::SeqCst);
        RunId::new(format!("{}-{}", self.prefix, n))
    }
}

#[cfg(test)]
#[path = "id_tests.rs"]
mod tests;
