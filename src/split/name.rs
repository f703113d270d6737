//! Chunk filename codec.
//!
//! A chunk file is named after its parent file's digest, its 1-based index,
//! and (depending on the mount policy) the total chunk count and the parent's
//! mtime:
//!
//! ```text
//! <hash>_<index>.splitfs.chunk
//! <hash>_<index>_of_<total>.splitfs.chunk
//! <hash>_<index>.mtime=<unix_seconds>.splitfs.chunk
//! <hash>_<index>_of_<total>.mtime=<unix_seconds>.splitfs.chunk
//! ```
//!
//! Index and total are zero-padded to at least eight digits; wider values
//! extend naturally and are accepted on parse. Parsing is the strict reverse
//! of formatting under the same policy: anything `format_chunk_name` cannot
//! have produced is rejected.

use std::fmt::Write as _;

/// Extension shared by every synthetic chunk file.
pub const CHUNK_FILE_EXTENSION: &str = ".splitfs.chunk";

const MTIME_SEPARATOR: &str = ".mtime=";

/// Which optional components chunk filenames carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FilenamePolicy {
    pub includes_total_chunks: bool,
    pub includes_mtime: bool,
}

impl Default for FilenamePolicy {
    fn default() -> Self {
        Self {
            includes_total_chunks: true,
            includes_mtime: false,
        }
    }
}

/// Components recovered from a well-formed chunk filename.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedChunkName<'a> {
    pub hash: &'a str,
    /// 1-based chunk index as it appears in the filename.
    pub index: u64,
    pub total: Option<u64>,
    pub mtime_secs: Option<i64>,
}

/// Render the filename of chunk `index` (1-based) under `policy`.
///
/// `total` and `mtime_secs` are ignored when the policy excludes them.
pub fn format_chunk_name(
    policy: FilenamePolicy,
    hash: &str,
    index: u64,
    total: u64,
    mtime_secs: i64,
) -> String {
    let mut name = format!("{hash}_{index:08}");
    if policy.includes_total_chunks {
        let _ = write!(name, "_of_{total:08}");
    }
    if policy.includes_mtime {
        let _ = write!(name, "{MTIME_SEPARATOR}{mtime_secs}");
    }
    name.push_str(CHUNK_FILE_EXTENSION);
    name
}

/// Parse `name` back into its components under `policy`.
///
/// Returns `None` for any string `format_chunk_name` cannot produce under the
/// same policy; the caller maps that to ENOENT.
pub fn parse_chunk_name(policy: FilenamePolicy, name: &str) -> Option<ParsedChunkName<'_>> {
    let rest = name.strip_suffix(CHUNK_FILE_EXTENSION)?;

    let (rest, mtime_secs) = if policy.includes_mtime {
        let at = rest.rfind(MTIME_SEPARATOR)?;
        let digits = &rest[at + MTIME_SEPARATOR.len()..];
        (&rest[..at], Some(parse_decimal(digits)? as i64))
    } else {
        (rest, None)
    };

    let mut parts = rest.split('_');
    let hash = parts.next()?;
    let index = parse_decimal(parts.next()?)?;
    let total = if policy.includes_total_chunks {
        if parts.next()? != "of" {
            return None;
        }
        Some(parse_decimal(parts.next()?)?)
    } else {
        None
    };
    if parts.next().is_some() {
        return None;
    }

    Some(ParsedChunkName {
        hash,
        index,
        total,
        mtime_secs,
    })
}

// Strict decimal parse: digits only, no signs or whitespace.
fn parse_decimal(digits: &str) -> Option<u64> {
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_POLICIES: [FilenamePolicy; 4] = [
        FilenamePolicy {
            includes_total_chunks: false,
            includes_mtime: false,
        },
        FilenamePolicy {
            includes_total_chunks: true,
            includes_mtime: false,
        },
        FilenamePolicy {
            includes_total_chunks: false,
            includes_mtime: true,
        },
        FilenamePolicy {
            includes_total_chunks: true,
            includes_mtime: true,
        },
    ];

    #[test]
    fn test_format_with_total() {
        let policy = FilenamePolicy::default();
        assert_eq!(
            format_chunk_name(policy, "d00d", 1, 2, 0),
            "d00d_00000001_of_00000002.splitfs.chunk"
        );
        assert_eq!(
            format_chunk_name(policy, "d00d", 2, 2, 0),
            "d00d_00000002_of_00000002.splitfs.chunk"
        );
    }

    #[test]
    fn test_format_with_mtime() {
        let policy = FilenamePolicy {
            includes_total_chunks: true,
            includes_mtime: true,
        };
        assert_eq!(
            format_chunk_name(policy, "CAFE", 1, 1, 1_700_000_000),
            "CAFE_00000001_of_00000001.mtime=1700000000.splitfs.chunk"
        );
    }

    #[test]
    fn test_round_trip_under_every_policy() {
        for policy in ALL_POLICIES {
            let name = format_chunk_name(policy, "abc123", 7, 42, 1_700_000_000);
            let parsed = parse_chunk_name(policy, &name).expect("round trip");
            assert_eq!(parsed.hash, "abc123");
            assert_eq!(parsed.index, 7);
            assert_eq!(
                parsed.total,
                policy.includes_total_chunks.then_some(42),
                "{name}"
            );
            assert_eq!(
                parsed.mtime_secs,
                policy.includes_mtime.then_some(1_700_000_000),
                "{name}"
            );
        }
    }

    #[test]
    fn test_wide_indices_extend_past_the_padding() {
        let policy = FilenamePolicy::default();
        let name = format_chunk_name(policy, "h", 123_456_789, 987_654_321, 0);
        assert_eq!(name, "h_123456789_of_987654321.splitfs.chunk");
        let parsed = parse_chunk_name(policy, &name).unwrap();
        assert_eq!(parsed.index, 123_456_789);
        assert_eq!(parsed.total, Some(987_654_321));
    }

    #[test]
    fn test_rejects_malformed_names() {
        let policy = FilenamePolicy::default();
        for name in [
            "",
            "d00d_00000001_of_00000002",            // missing extension
            "d00d_00000001.splitfs.chunk",          // missing total under total policy
            "d00d_00000001_to_00000002.splitfs.chunk", // wrong separator word
            "d00d_00000001_of_00000002_x.splitfs.chunk", // trailing component
            "d00d_of_00000002.splitfs.chunk",       // missing index
            "d00d_+1_of_00000002.splitfs.chunk",    // signs not producible
            "d00d_0000000a_of_00000002.splitfs.chunk", // non-decimal index
            ".splitfs.chunk",
        ] {
            assert!(parse_chunk_name(policy, name).is_none(), "{name:?}");
        }
    }

    #[test]
    fn test_policy_mismatch_is_rejected() {
        let with_total = FilenamePolicy::default();
        let without_total = FilenamePolicy {
            includes_total_chunks: false,
            includes_mtime: false,
        };
        let with_mtime = FilenamePolicy {
            includes_total_chunks: true,
            includes_mtime: true,
        };

        let plain = format_chunk_name(without_total, "d00d", 1, 0, 0);
        assert!(parse_chunk_name(with_total, &plain).is_none());

        let total = format_chunk_name(with_total, "d00d", 1, 2, 0);
        assert!(parse_chunk_name(without_total, &total).is_none());

        let timed = format_chunk_name(with_mtime, "d00d", 1, 2, 99);
        assert!(parse_chunk_name(with_total, &timed).is_none());

        let untimed = format_chunk_name(with_total, "d00d", 1, 2, 99);
        assert!(parse_chunk_name(with_mtime, &untimed).is_none());
    }

    #[test]
    fn test_mtime_digits_are_strict() {
        let policy = FilenamePolicy {
            includes_total_chunks: false,
            includes_mtime: true,
        };
        for name in [
            "d00d_00000001.mtime=.splitfs.chunk",
            "d00d_00000001.mtime=-5.splitfs.chunk",
            "d00d_00000001.mtime=5x.splitfs.chunk",
            "d00d_00000001.splitfs.chunk",
        ] {
            assert!(parse_chunk_name(policy, name).is_none(), "{name:?}");
        }
        let ok = parse_chunk_name(policy, "d00d_00000001.mtime=1700000000.splitfs.chunk").unwrap();
        assert_eq!(ok.mtime_secs, Some(1_700_000_000));
    }

    #[test]
    fn test_index_zero_parses_and_is_left_to_range_checks() {
        // "00000000" is formattable in principle, so the parser accepts it;
        // lookup rejects it against the 1-based range.
        let policy = FilenamePolicy::default();
        let parsed = parse_chunk_name(policy, "d00d_00000000_of_00000001.splitfs.chunk").unwrap();
        assert_eq!(parsed.index, 0);
    }
}
