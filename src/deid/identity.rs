//! Output filenames.
//!
//! With pseudonymization on, a slide's stem is replaced by a one-way digest
//! and its extension kept: `Smith_John_2024.svs` becomes
//! `5d41402abc4b2a76b9719d911017c592.svs`. Names handed out within one batch
//! never collide; a clash gets a `_1`, `_2`, ... suffix on the stem.

use std::collections::HashSet;

use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};

use crate::slide::SlideRef;

type HmacSha256 = Hmac<Sha256>;

/// Bytes of the digest kept in the name (32 hex characters).
const DIGEST_BYTES: usize = 16;

// =============================================================================
// StemDigest
// =============================================================================

/// One-way mapping from an original stem to a pseudonymous one.
pub trait StemDigest: Send + Sync {
    fn digest(&self, stem: &str) -> String;
}

/// SHA-256 of the stem, truncated to 128 bits.
#[derive(Debug, Clone, Copy, Default)]
pub struct Sha256Digest;

impl StemDigest for Sha256Digest {
    fn digest(&self, stem: &str) -> String {
        let hash = Sha256::digest(stem.as_bytes());
        hex::encode(&hash[..DIGEST_BYTES])
    }
}

/// HMAC-SHA256 of the stem under a secret key, truncated to 128 bits.
///
/// Without the key, names cannot be recovered by hashing candidate stems.
#[derive(Clone)]
pub struct KeyedDigest {
    key: Vec<u8>,
}

impl KeyedDigest {
    pub fn new(key: impl Into<Vec<u8>>) -> Self {
        Self { key: key.into() }
    }
}

impl std::fmt::Debug for KeyedDigest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyedDigest").finish_non_exhaustive()
    }
}

impl StemDigest for KeyedDigest {
    fn digest(&self, stem: &str) -> String {
        let mut mac =
            HmacSha256::new_from_slice(&self.key).expect("HMAC can take key of any size");
        mac.update(stem.as_bytes());
        let result = mac.finalize().into_bytes();
        hex::encode(&result[..DIGEST_BYTES])
    }
}

// =============================================================================
// IdentityMapper
// =============================================================================

/// The name a slide gets in the destination folder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputIdentity {
    pub new_filename: String,
    pub pseudonymized: bool,
    pub source: SlideRef,
}

impl OutputIdentity {
    /// `new_filename` without its extension; MRXS data directories take this name.
    pub fn new_stem(&self) -> &str {
        split_name(&self.new_filename).0
    }
}

/// Split a file name into stem and extension at the last dot.
fn split_name(name: &str) -> (&str, Option<&str>) {
    match name.rsplit_once('.') {
        Some((stem, extension)) if !stem.is_empty() => (stem, Some(extension)),
        _ => (name, None),
    }
}

fn join_name(stem: &str, extension: Option<&str>) -> String {
    match extension {
        Some(extension) => format!("{}.{}", stem, extension),
        None => stem.to_string(),
    }
}

/// Hands out output names for one batch.
pub struct IdentityMapper {
    pseudonymize: bool,
    digest: Box<dyn StemDigest>,
    taken: HashSet<String>,
}

impl IdentityMapper {
    pub fn new(pseudonymize: bool, digest: Box<dyn StemDigest>) -> Self {
        Self {
            pseudonymize,
            digest,
            taken: HashSet::new(),
        }
    }

    /// Choose the output name for a slide.
    pub fn assign(&mut self, slide: &SlideRef) -> OutputIdentity {
        OutputIdentity {
            new_filename: self.assign_name(slide.file_name()),
            pseudonymized: self.pseudonymize,
            source: slide.clone(),
        }
    }

    /// Choose the output name for a file name.
    ///
    /// Pseudonymized names are compared case-insensitively, since digests
    /// of stems differing only in case would otherwise land on the same
    /// file on case-insensitive filesystems.
    pub fn assign_name(&mut self, original: &str) -> String {
        let (stem, extension) = split_name(original);
        let stem = if self.pseudonymize {
            self.digest.digest(stem)
        } else {
            stem.to_string()
        };

        let mut candidate = join_name(&stem, extension);
        let mut suffix = 0;
        while !self.taken.insert(self.uniqueness_key(&candidate)) {
            suffix += 1;
            candidate = join_name(&format!("{}_{}", stem, suffix), extension);
        }
        candidate
    }

    fn uniqueness_key(&self, name: &str) -> String {
        if self.pseudonymize {
            name.to_lowercase()
        } else {
            name.to_string()
        }
    }
}

impl std::fmt::Debug for IdentityMapper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentityMapper")
            .field("pseudonymize", &self.pseudonymize)
            .field("assigned", &self.taken.len())
            .finish()
    }
}
