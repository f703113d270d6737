//! Filename hash registry
//!
//! Responsibilities:
//! - Produce fresh hasher instances that digest a file's root-relative path
//!   into a filename-safe string plus a 64-bit integer used as the inode base
//!   of its chunks.
//! - Enumerate the closed set of supported algorithm/encoding combinations,
//!   selected by name at startup.
//!
//! Digest strings never contain `_`, `.`, `/` or padding characters, so they
//! compose safely with the chunk filename codec. 64-bit hashes in hex use the
//! sum itself as the inode base; base-32/64 encodings use the first eight
//! digest bytes, little-endian.

use base64::engine::general_purpose::NO_PAD;
use base64::engine::GeneralPurpose;
use base64::{alphabet::Alphabet, Engine as _};
use data_encoding::BASE32_NOPAD;
use fnv::FnvHasher;
use once_cell::sync::Lazy;
use sha2::{Digest, Sha224, Sha256, Sha384, Sha512};
use std::hash::Hasher as _;

// Filename-safe variant of base64: `-` and `+` instead of `/`, no `=` padding.
static FILENAME_BASE64: Lazy<GeneralPurpose> = Lazy::new(|| {
    let alphabet =
        Alphabet::new("ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789-+")
            .expect("static alphabet");
    GeneralPurpose::new(&alphabet, NO_PAD)
});

/// One in-flight filename digest. Fed the root-relative path bytes, then
/// consumed by [`FilenameHash::digest`].
pub trait FilenameHash: Send {
    fn update(&mut self, bytes: &[u8]);

    /// Finalize into the filename digest and the inode base.
    fn digest(self: Box<Self>) -> (String, u64);
}

/// Produces a fresh hasher per lookup.
pub type HashFactory = fn() -> Box<dyn FilenameHash>;

/// Every supported `--filename_hash` value, sorted.
pub const HASH_NAMES: &[&str] = &[
    "fnv64a-b32",
    "fnv64a-hex",
    "sha224-b32",
    "sha224-b64",
    "sha256-b32",
    "sha256-b64",
    "sha384-b32",
    "sha384-b64",
    "sha512-b32",
    "sha512-b64",
];

/// Look up a hash factory by name; `None` for anything outside [`HASH_NAMES`].
pub fn hash_factory(name: &str) -> Option<HashFactory> {
    let factory: HashFactory = match name {
        "fnv64a-hex" => || Box::new(Fnv64Hex(FnvHasher::default())),
        "fnv64a-b32" => || Box::new(Fnv64Base32(FnvHasher::default())),
        "sha224-b32" => || Box::new(DigestBase32(Sha224::new())),
        "sha224-b64" => || Box::new(DigestBase64(Sha224::new())),
        "sha256-b32" => || Box::new(DigestBase32(Sha256::new())),
        "sha256-b64" => || Box::new(DigestBase64(Sha256::new())),
        "sha384-b32" => || Box::new(DigestBase32(Sha384::new())),
        "sha384-b64" => || Box::new(DigestBase64(Sha384::new())),
        "sha512-b32" => || Box::new(DigestBase32(Sha512::new())),
        "sha512-b64" => || Box::new(DigestBase64(Sha512::new())),
        _ => return None,
    };
    Some(factory)
}

// FNV-1a 64 rendered as zero-padded hex; the sum doubles as the inode base.
struct Fnv64Hex(FnvHasher);

impl FilenameHash for Fnv64Hex {
    fn update(&mut self, bytes: &[u8]) {
        self.0.write(bytes);
    }

    fn digest(self: Box<Self>) -> (String, u64) {
        let sum = self.0.finish();
        (hex::encode(sum.to_be_bytes()), sum)
    }
}

// FNV-1a 64 rendered as base-32 of the big-endian sum bytes.
struct Fnv64Base32(FnvHasher);

impl FilenameHash for Fnv64Base32 {
    fn update(&mut self, bytes: &[u8]) {
        self.0.write(bytes);
    }

    fn digest(self: Box<Self>) -> (String, u64) {
        let bytes = self.0.finish().to_be_bytes();
        (BASE32_NOPAD.encode(&bytes), inode_base(&bytes))
    }
}

struct DigestBase32<D: Digest>(D);

impl<D: Digest + Send> FilenameHash for DigestBase32<D> {
    fn update(&mut self, bytes: &[u8]) {
        self.0.update(bytes);
    }

    fn digest(self: Box<Self>) -> (String, u64) {
        let DigestBase32(hasher) = *self;
        let sum = hasher.finalize();
        (BASE32_NOPAD.encode(&sum), inode_base(&sum))
    }
}

struct DigestBase64<D: Digest>(D);

impl<D: Digest + Send> FilenameHash for DigestBase64<D> {
    fn update(&mut self, bytes: &[u8]) {
        self.0.update(bytes);
    }

    fn digest(self: Box<Self>) -> (String, u64) {
        let DigestBase64(hasher) = *self;
        let sum = hasher.finalize();
        (FILENAME_BASE64.encode(&sum), inode_base(&sum))
    }
}

// Every digest in the registry is at least eight bytes wide.
fn inode_base(sum: &[u8]) -> u64 {
    let mut eight = [0u8; 8];
    eight.copy_from_slice(&sum[..8]);
    u64::from_le_bytes(eight)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn digest_of(name: &str, input: &[u8]) -> (String, u64) {
        let mut hasher = hash_factory(name).expect(name)();
        hasher.update(input);
        hasher.digest()
    }

    #[test]
    fn test_registry_is_closed_and_sorted() {
        for name in HASH_NAMES {
            assert!(hash_factory(name).is_some(), "{name}");
        }
        assert!(hash_factory("md5-hex").is_none());
        assert!(hash_factory("").is_none());
        let mut sorted = HASH_NAMES.to_vec();
        sorted.sort_unstable();
        assert_eq!(sorted, HASH_NAMES);
    }

    #[test]
    fn test_fnv64a_known_vectors() {
        // Reference values for FNV-1a 64.
        let (hex, sum) = digest_of("fnv64a-hex", b"");
        assert_eq!(hex, "cbf29ce484222325");
        assert_eq!(sum, 0xcbf29ce484222325);

        let (hex, sum) = digest_of("fnv64a-hex", b"a");
        assert_eq!(hex, "af63dc4c8601ec8c");
        assert_eq!(sum, 0xaf63dc4c8601ec8c);
    }

    #[test]
    fn test_fnv64a_b32_inode_base_is_byte_swapped_sum() {
        let (_, hex_sum) = digest_of("fnv64a-hex", b"some/path");
        let (b32, b32_base) = digest_of("fnv64a-b32", b"some/path");
        assert_eq!(b32_base, hex_sum.swap_bytes());
        assert_eq!(b32.len(), 13); // ceil(64 / 5)
    }

    #[test]
    fn test_digest_strings_are_filename_safe() {
        for name in HASH_NAMES {
            let (digest, _) = digest_of(name, b"splitfs/some file.bin");
            assert!(!digest.is_empty(), "{name}");
            for forbidden in ['_', '.', '/', '=', '\0'] {
                assert!(!digest.contains(forbidden), "{name}: {digest}");
            }
        }
    }

    #[test]
    fn test_digest_lengths_match_the_encoding() {
        // 32 digest bytes -> ceil(256/5) base-32 chars, ceil(256/6) base-64 chars.
        assert_eq!(digest_of("sha256-b32", b"x").0.len(), 52);
        assert_eq!(digest_of("sha256-b64", b"x").0.len(), 43);
        assert_eq!(digest_of("sha224-b32", b"x").0.len(), 45);
        assert_eq!(digest_of("sha224-b64", b"x").0.len(), 38);
        assert_eq!(digest_of("sha512-b32", b"x").0.len(), 103);
    }

    #[test]
    fn test_fresh_instances_are_deterministic() {
        for name in HASH_NAMES {
            assert_eq!(
                digest_of(name, b"payload"),
                digest_of(name, b"payload"),
                "{name}"
            );
            assert_ne!(
                digest_of(name, b"payload").0,
                digest_of(name, b"payloae").0,
                "{name}"
            );
        }
    }

    #[test]
    fn test_incremental_updates_match_one_shot() {
        let mut hasher = hash_factory("sha256-b32").unwrap()();
        hasher.update(b"split");
        hasher.update(b"fs");
        assert_eq!(hasher.digest(), digest_of("sha256-b32", b"splitfs"));
    }
}
