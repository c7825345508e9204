// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Session identifiers.
//!
//! Every successful claim hands out a fresh __session identifier__. Holding
//! the identifier is what proves ownership of an in-progress work item, so
//! two claims must never receive the same one, even when many processes race
//! to claim within the same millisecond.
//!
//! An identifier is built from three parts: the current time in
//! milliseconds, a random component, and the process identifier mixed with a
//! per-process sequence number. Everything is rendered in lowercase base36 so
//! the result stays a single alphanumeric word.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::{
    fmt::{Display, Formatter, Result as FmtResult},
    process,
    sync::atomic::{AtomicU32, Ordering},
};

static SEQUENCE: AtomicU32 = AtomicU32::new(0);

/// Opaque ownership token for a claimed work item.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    /// Generate a new unique session identifier.
    pub fn generate() -> Self {
        Self(unique_token())
    }

    /// Treat session identifier as string slice.
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl From<String> for SessionId {
    fn from(raw: String) -> Self {
        Self(raw)
    }
}

impl From<&str> for SessionId {
    fn from(raw: &str) -> Self {
        Self(raw.to_owned())
    }
}

impl PartialEq<str> for SessionId {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl Display for SessionId {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(self.as_str())
    }
}

/// Produce a token that is unique across processes with high probability.
///
/// Used for session identifiers and for naming temporary files.
pub fn unique_token() -> String {
    let millis = Utc::now().timestamp_millis().max(0) as u64;
    let random: u64 = rand::random();
    let sequence = SEQUENCE.fetch_add(1, Ordering::Relaxed);

    // INVARIANT: Fixed width random part, so concatenation stays unambiguous.
    format!(
        "{}{:0>13}{}{}",
        base36(millis),
        base36(random),
        base36(u64::from(process::id())),
        base36(u64::from(sequence)),
    )
}

fn base36(mut value: u64) -> String {
    const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";

    if value == 0 {
        return "0".into();
    }

    let mut out = Vec::new();
    while value > 0 {
        out.push(DIGITS[(value % 36) as usize]);
        value /= 36;
    }
    out.reverse();
    String::from_utf8_lossy(&out).into_owned()
}
