//! Opaque identifier generation.
//!
//! Identifiers look like `pl-3k9x0qzm`: a kind prefix followed by eight
//! base36 characters taken from a blake3 digest of the record's seed (its
//! name), the wall clock, and a process-local counter.

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;

const ID_BODY_LEN: usize = 8;
const ALPHABET: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// The kind of record an identifier names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdKind {
    OrgUnit,
    Category,
    Relationship,
}

impl IdKind {
    #[must_use]
    pub const fn prefix(self) -> &'static str {
        match self {
            Self::OrgUnit => "pl",
            Self::Category => "cat",
            Self::Relationship => "rel",
        }
    }
}

/// Generate a fresh identifier for `kind`.
#[must_use]
pub fn generate(kind: IdKind, seed: &str) -> String {
    static COUNTER: AtomicU64 = AtomicU64::new(0);

    let nanos = Utc::now().timestamp_nanos_opt().unwrap_or_default();
    let counter = COUNTER.fetch_add(1, Ordering::Relaxed);

    let mut hasher = blake3::Hasher::new();
    hasher.update(kind.prefix().as_bytes());
    hasher.update(seed.as_bytes());
    hasher.update(&nanos.to_le_bytes());
    hasher.update(&counter.to_le_bytes());
    let digest = hasher.finalize();

    let mut word = [0u8; 8];
    word.copy_from_slice(&digest.as_bytes()[..8]);
    format!("{}-{}", kind.prefix(), base36(u64::from_le_bytes(word)))
}

/// Returns `true` if `id` has the shape produced by [`generate`] for `kind`.
#[must_use]
pub fn is_well_formed(kind: IdKind, id: &str) -> bool {
    id.strip_prefix(kind.prefix())
        .and_then(|rest| rest.strip_prefix('-'))
        .is_some_and(|body| {
            body.len() == ID_BODY_LEN
                && body
                    .bytes()
                    .all(|b| b.is_ascii_digit() || b.is_ascii_lowercase())
        })
}

fn base36(mut value: u64) -> String {
    let mut out = [b'0'; ID_BODY_LEN];
    for slot in out.iter_mut().rev() {
        *slot = ALPHABET[(value % 36) as usize];
        value /= 36;
    }
    out.iter().map(|&b| char::from(b)).collect()
}
